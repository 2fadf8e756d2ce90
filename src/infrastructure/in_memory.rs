use crate::domain::commission::{Commission, CommissionStatus};
use crate::domain::ledger::{LedgerEntry, NewLedgerEntry};
use crate::domain::money::{Money, SellerId};
use crate::domain::payout::{NewPayout, Payout, PayoutId, PayoutStatus};
use crate::domain::ports::{BalanceStore, BalanceTransaction, CommissionStore, PayoutStore};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Debug, Default)]
struct SellerRecord {
    balance: Money,
    entries: Vec<LedgerEntry>,
}

/// A thread-safe in-memory balance store.
///
/// Each seller's balance and ledger live behind their own `tokio::sync::Mutex`,
/// which plays the role of the row lock: a transaction owns the guard until it
/// commits or is dropped. The outer map lock is only held while looking up or
/// inserting a record, never across a transaction.
#[derive(Default, Clone)]
pub struct InMemoryBalanceStore {
    sellers: Arc<RwLock<HashMap<SellerId, Arc<Mutex<SellerRecord>>>>>,
    next_entry_id: Arc<AtomicU64>,
}

impl InMemoryBalanceStore {
    /// Creates a new, empty in-memory balance store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, seller: SellerId) -> Arc<Mutex<SellerRecord>> {
        if let Some(record) = self.sellers.read().await.get(&seller) {
            return Arc::clone(record);
        }
        let mut sellers = self.sellers.write().await;
        Arc::clone(sellers.entry(seller).or_default())
    }

    async fn existing(&self, seller: SellerId) -> Option<Arc<Mutex<SellerRecord>>> {
        self.sellers.read().await.get(&seller).cloned()
    }
}

struct InMemoryBalanceTransaction {
    seller: SellerId,
    record: OwnedMutexGuard<SellerRecord>,
    next_entry_id: Arc<AtomicU64>,
}

#[async_trait]
impl BalanceTransaction for InMemoryBalanceTransaction {
    fn seller(&self) -> SellerId {
        self.seller
    }

    fn current_balance(&self) -> Money {
        self.record.balance
    }

    async fn commit(mut self: Box<Self>, entry: NewLedgerEntry) -> Result<LedgerEntry> {
        let id = self.next_entry_id.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = entry.into_entry(id, self.seller);
        self.record.balance = entry.balance_after;
        self.record.entries.push(entry.clone());
        Ok(entry)
    }
}

#[async_trait]
impl BalanceStore for InMemoryBalanceStore {
    async fn begin(&self, seller: SellerId) -> Result<Box<dyn BalanceTransaction>> {
        let record = self.record(seller).await.lock_owned().await;
        Ok(Box::new(InMemoryBalanceTransaction {
            seller,
            record,
            next_entry_id: Arc::clone(&self.next_entry_id),
        }))
    }

    async fn balance(&self, seller: SellerId) -> Result<Money> {
        match self.existing(seller).await {
            Some(record) => Ok(record.lock().await.balance),
            None => Ok(Money::ZERO),
        }
    }

    async fn entries(&self, seller: SellerId) -> Result<Vec<LedgerEntry>> {
        match self.existing(seller).await {
            Some(record) => Ok(record.lock().await.entries.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn balances(&self) -> Result<Vec<(SellerId, Money)>> {
        let records: Vec<(SellerId, Arc<Mutex<SellerRecord>>)> = self
            .sellers
            .read()
            .await
            .iter()
            .map(|(seller, record)| (*seller, Arc::clone(record)))
            .collect();

        let mut balances = Vec::with_capacity(records.len());
        for (seller, record) in records {
            let record = record.lock().await;
            if !record.entries.is_empty() {
                balances.push((seller, record.balance));
            }
        }
        balances.sort_by_key(|(seller, _)| *seller);
        Ok(balances)
    }
}

/// A thread-safe in-memory payout store. Ids are assigned sequentially from 1.
#[derive(Default, Clone)]
pub struct InMemoryPayoutStore {
    payouts: Arc<RwLock<BTreeMap<PayoutId, Payout>>>,
}

impl InMemoryPayoutStore {
    /// Creates a new, empty in-memory payout store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PayoutStore for InMemoryPayoutStore {
    async fn insert(&self, payout: NewPayout) -> Result<Payout> {
        let mut payouts = self.payouts.write().await;
        let id = PayoutId(payouts.len() as u64 + 1);
        let payout = payout.into_payout(id);
        payouts.insert(id, payout.clone());
        Ok(payout)
    }

    async fn get(&self, id: PayoutId) -> Result<Option<Payout>> {
        Ok(self.payouts.read().await.get(&id).cloned())
    }

    async fn for_seller(&self, seller: SellerId) -> Result<Vec<Payout>> {
        let payouts = self.payouts.read().await;
        Ok(payouts
            .values()
            .filter(|p| p.seller == seller)
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<Payout>> {
        Ok(self.payouts.read().await.values().cloned().collect())
    }

    async fn compare_and_swap(&self, expected: PayoutStatus, payout: &Payout) -> Result<bool> {
        let mut payouts = self.payouts.write().await;
        match payouts.get_mut(&payout.id) {
            Some(stored) if stored.status == expected => {
                *stored = payout.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// A thread-safe in-memory commission store keyed by order item.
#[derive(Default, Clone)]
pub struct InMemoryCommissionStore {
    commissions: Arc<RwLock<HashMap<String, (u64, Commission)>>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryCommissionStore {
    /// Creates a new, empty in-memory commission store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommissionStore for InMemoryCommissionStore {
    async fn record(&self, commission: Commission) -> Result<bool> {
        let mut commissions = self.commissions.write().await;
        if commissions.contains_key(&commission.order_item_id) {
            return Ok(false);
        }
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        commissions.insert(commission.order_item_id.clone(), (seq, commission));
        Ok(true)
    }

    async fn get(&self, order_item_id: &str) -> Result<Option<Commission>> {
        let commissions = self.commissions.read().await;
        Ok(commissions.get(order_item_id).map(|(_, c)| c.clone()))
    }

    async fn for_seller(&self, seller: SellerId) -> Result<Vec<Commission>> {
        let commissions = self.commissions.read().await;
        let mut found: Vec<&(u64, Commission)> = commissions
            .values()
            .filter(|(_, c)| c.seller == seller)
            .collect();
        found.sort_by_key(|(seq, _)| *seq);
        Ok(found.into_iter().map(|(_, c)| c.clone()).collect())
    }

    async fn transition(
        &self,
        order_item_id: &str,
        from: CommissionStatus,
        to: CommissionStatus,
    ) -> Result<bool> {
        let mut commissions = self.commissions.write().await;
        match commissions.get_mut(order_item_id) {
            Some((_, commission)) if commission.status == from => {
                commission.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_disbursed(&self, order_item_ids: &[String], payout: PayoutId) -> Result<()> {
        let mut commissions = self.commissions.write().await;
        for id in order_item_ids {
            if let Some((_, commission)) = commissions.get_mut(id)
                && commission.status == CommissionStatus::Credited
            {
                commission.status = CommissionStatus::Disbursed;
                commission.payout_id = Some(payout);
            }
        }
        Ok(())
    }
}
