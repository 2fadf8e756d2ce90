use crate::domain::commission::{Commission, CommissionStatus};
use crate::domain::ledger::{LedgerEntry, NewLedgerEntry};
use crate::domain::money::{Money, SellerId};
use crate::domain::payout::{NewPayout, Payout, PayoutId, PayoutStatus};
use crate::domain::ports::{BalanceStore, BalanceTransaction, CommissionStore, PayoutStore};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Column Family for the current balance of each seller.
pub const CF_BALANCES: &str = "balances";
/// Column Family for ledger entries, keyed by seller then entry id.
pub const CF_LEDGER: &str = "ledger";
/// Column Family for payouts.
pub const CF_PAYOUTS: &str = "payouts";
/// Column Family for commissions, keyed by order item id.
pub const CF_COMMISSIONS: &str = "commissions";

/// A persistent store implementation using RocksDB.
///
/// Implements every store port over separate Column Families. A balance mutation
/// writes the new balance and its ledger entry in one `WriteBatch`, so a crash can
/// never leave one without the other. Seller locks live in process: the database
/// is opened by a single process at a time.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>` and locks).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    seller_locks: Arc<std::sync::Mutex<HashMap<SellerId, Arc<Mutex<()>>>>>,
    payout_lock: Arc<Mutex<()>>,
    commission_lock: Arc<Mutex<()>>,
    next_entry_id: Arc<AtomicU64>,
    next_commission_seq: Arc<AtomicU64>,
}

#[derive(Serialize, serde::Deserialize)]
struct StoredCommission {
    seq: u64,
    commission: Commission,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures the column families exist and resumes id sequences from the
    /// stored data.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_BALANCES, CF_LEDGER, CF_PAYOUTS, CF_COMMISSIONS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        let store = Self {
            db: Arc::new(db),
            seller_locks: Arc::default(),
            payout_lock: Arc::default(),
            commission_lock: Arc::default(),
            next_entry_id: Arc::default(),
            next_commission_seq: Arc::default(),
        };

        let last_entry = store
            .scan::<LedgerEntry>(CF_LEDGER)?
            .iter()
            .map(|e| e.id)
            .max()
            .unwrap_or(0);
        store.next_entry_id.store(last_entry, Ordering::SeqCst);
        let last_seq = store
            .scan::<StoredCommission>(CF_COMMISSIONS)?
            .iter()
            .map(|c| c.seq + 1)
            .max()
            .unwrap_or(0);
        store.next_commission_seq.store(last_seq, Ordering::SeqCst);

        Ok(store)
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            LedgerError::Storage(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        self.db.put_cf(self.cf(cf)?, key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let mut values = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn seller_lock(&self, seller: SellerId) -> Arc<Mutex<()>> {
        let mut locks = self
            .seller_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(seller).or_default())
    }
}

fn ledger_key(seller: SellerId, id: u64) -> [u8; 12] {
    let mut key = [0u8; 12];
    key[..4].copy_from_slice(&seller.0.to_be_bytes());
    key[4..].copy_from_slice(&id.to_be_bytes());
    key
}

struct RocksDBBalanceTransaction {
    store: RocksDBStore,
    seller: SellerId,
    balance: Money,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl BalanceTransaction for RocksDBBalanceTransaction {
    fn seller(&self) -> SellerId {
        self.seller
    }

    fn current_balance(&self) -> Money {
        self.balance
    }

    async fn commit(self: Box<Self>, entry: NewLedgerEntry) -> Result<LedgerEntry> {
        let id = self.store.next_entry_id.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = entry.into_entry(id, self.seller);

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.store.cf(CF_BALANCES)?,
            self.seller.0.to_be_bytes(),
            serde_json::to_vec(&entry.balance_after)?,
        );
        batch.put_cf(
            self.store.cf(CF_LEDGER)?,
            ledger_key(self.seller, id),
            serde_json::to_vec(&entry)?,
        );
        self.store.db.write(batch)?;
        Ok(entry)
    }
}

#[async_trait]
impl BalanceStore for RocksDBStore {
    async fn begin(&self, seller: SellerId) -> Result<Box<dyn BalanceTransaction>> {
        let guard = self.seller_lock(seller).lock_owned().await;
        // Read only after the lock is held.
        let balance = self.balance(seller).await?;
        Ok(Box::new(RocksDBBalanceTransaction {
            store: self.clone(),
            seller,
            balance,
            _guard: guard,
        }))
    }

    async fn balance(&self, seller: SellerId) -> Result<Money> {
        Ok(self
            .get_json(CF_BALANCES, &seller.0.to_be_bytes())?
            .unwrap_or(Money::ZERO))
    }

    async fn entries(&self, seller: SellerId) -> Result<Vec<LedgerEntry>> {
        let prefix = seller.0.to_be_bytes();
        let mut entries = Vec::new();
        let iter = self.db.iterator_cf(
            self.cf(CF_LEDGER)?,
            IteratorMode::From(&prefix, Direction::Forward),
        );
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            entries.push(serde_json::from_slice(&value)?);
        }
        Ok(entries)
    }

    async fn balances(&self) -> Result<Vec<(SellerId, Money)>> {
        let mut balances = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_BALANCES)?, IteratorMode::Start) {
            let (key, value) = item?;
            let seller: [u8; 4] = key.as_ref().try_into().map_err(|_| {
                LedgerError::Storage(Box::new(std::io::Error::other("malformed balance key")))
            })?;
            balances.push((
                SellerId(u32::from_be_bytes(seller)),
                serde_json::from_slice(&value)?,
            ));
        }
        Ok(balances)
    }
}

#[async_trait]
impl PayoutStore for RocksDBStore {
    async fn insert(&self, payout: NewPayout) -> Result<Payout> {
        let _guard = self.payout_lock.lock().await;
        let last = self
            .db
            .iterator_cf(self.cf(CF_PAYOUTS)?, IteratorMode::End)
            .next()
            .transpose()?
            .map(|(key, _)| {
                let mut id = [0u8; 8];
                id.copy_from_slice(&key[..8]);
                u64::from_be_bytes(id)
            })
            .unwrap_or(0);
        let payout = payout.into_payout(PayoutId(last + 1));
        self.put_json(CF_PAYOUTS, &payout.id.0.to_be_bytes(), &payout)?;
        Ok(payout)
    }

    async fn get(&self, id: PayoutId) -> Result<Option<Payout>> {
        self.get_json(CF_PAYOUTS, &id.0.to_be_bytes())
    }

    async fn for_seller(&self, seller: SellerId) -> Result<Vec<Payout>> {
        Ok(self
            .scan::<Payout>(CF_PAYOUTS)?
            .into_iter()
            .filter(|p| p.seller == seller)
            .collect())
    }

    async fn all(&self) -> Result<Vec<Payout>> {
        self.scan(CF_PAYOUTS)
    }

    async fn compare_and_swap(&self, expected: PayoutStatus, payout: &Payout) -> Result<bool> {
        let _guard = self.payout_lock.lock().await;
        let key = payout.id.0.to_be_bytes();
        match self.get_json::<Payout>(CF_PAYOUTS, &key)? {
            Some(stored) if stored.status == expected => {
                self.put_json(CF_PAYOUTS, &key, payout)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl CommissionStore for RocksDBStore {
    async fn record(&self, commission: Commission) -> Result<bool> {
        let _guard = self.commission_lock.lock().await;
        let key = commission.order_item_id.clone().into_bytes();
        if self.db.get_pinned_cf(self.cf(CF_COMMISSIONS)?, &key)?.is_some() {
            return Ok(false);
        }
        let seq = self.next_commission_seq.fetch_add(1, Ordering::SeqCst);
        self.put_json(CF_COMMISSIONS, &key, &StoredCommission { seq, commission })?;
        Ok(true)
    }

    async fn get(&self, order_item_id: &str) -> Result<Option<Commission>> {
        Ok(self
            .get_json::<StoredCommission>(CF_COMMISSIONS, order_item_id.as_bytes())?
            .map(|stored| stored.commission))
    }

    async fn for_seller(&self, seller: SellerId) -> Result<Vec<Commission>> {
        let mut found: Vec<StoredCommission> = self
            .scan::<StoredCommission>(CF_COMMISSIONS)?
            .into_iter()
            .filter(|stored| stored.commission.seller == seller)
            .collect();
        found.sort_by_key(|stored| stored.seq);
        Ok(found.into_iter().map(|stored| stored.commission).collect())
    }

    async fn transition(
        &self,
        order_item_id: &str,
        from: CommissionStatus,
        to: CommissionStatus,
    ) -> Result<bool> {
        let _guard = self.commission_lock.lock().await;
        let key = order_item_id.as_bytes();
        match self.get_json::<StoredCommission>(CF_COMMISSIONS, key)? {
            Some(mut stored) if stored.commission.status == from => {
                stored.commission.status = to;
                self.put_json(CF_COMMISSIONS, key, &stored)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_disbursed(&self, order_item_ids: &[String], payout: PayoutId) -> Result<()> {
        let _guard = self.commission_lock.lock().await;
        let mut batch = WriteBatch::default();
        for id in order_item_ids {
            let Some(mut stored) = self.get_json::<StoredCommission>(CF_COMMISSIONS, id.as_bytes())?
            else {
                continue;
            };
            if stored.commission.status != CommissionStatus::Credited {
                continue;
            }
            stored.commission.status = CommissionStatus::Disbursed;
            stored.commission.payout_id = Some(payout);
            batch.put_cf(self.cf(CF_COMMISSIONS)?, id.as_bytes(), serde_json::to_vec(&stored)?);
        }
        self.db.write(batch)?;
        Ok(())
    }
}
