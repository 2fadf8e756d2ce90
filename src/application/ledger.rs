use crate::domain::ledger::{LedgerEntry, NewLedgerEntry, PAYOUT_DEDUCTION};
use crate::domain::money::{ActorId, Money, SellerId};
use crate::domain::payout::{Payout, PayoutId};
use crate::domain::ports::BalanceStoreBox;
use crate::error::{LedgerError, Result};
use tracing::info;

/// The only writer of seller balances.
///
/// Every credit and debit runs as one transaction on the seller's balance record:
/// lock, re-read, compute, write balance, append entry, commit. Mutations for one
/// seller are totally ordered by the store's lock; different sellers never contend.
pub struct BalanceLedger {
    store: BalanceStoreBox,
}

impl BalanceLedger {
    pub fn new(store: BalanceStoreBox) -> Self {
        Self { store }
    }

    /// Adds `amount` to the seller's balance and returns the new balance.
    pub async fn credit(
        &self,
        seller: SellerId,
        amount: Money,
        reason: &str,
        actor: Option<ActorId>,
    ) -> Result<Money> {
        self.post_credit(seller, amount, reason, actor, None).await
    }

    /// Subtracts `amount` from the seller's balance and returns the new balance.
    ///
    /// The sufficiency check uses the balance read under the lock, never a value
    /// observed earlier by the caller.
    pub async fn debit(
        &self,
        seller: SellerId,
        amount: Money,
        reason: &str,
        actor: Option<ActorId>,
    ) -> Result<Money> {
        self.post_debit(seller, amount, reason, actor, None).await
    }

    /// Debits the payout amount; the entry records which payout it belongs to.
    pub async fn debit_for_payout(&self, payout: &Payout, actor: Option<ActorId>) -> Result<Money> {
        self.post_debit(payout.seller, payout.amount, PAYOUT_DEDUCTION, actor, Some(payout.id))
            .await
    }

    /// Credits `amount` back to the payout's seller, tagged with the payout.
    pub async fn refund_payout(
        &self,
        payout: &Payout,
        amount: Money,
        reason: &str,
        actor: Option<ActorId>,
    ) -> Result<Money> {
        self.post_credit(payout.seller, amount, reason, actor, Some(payout.id))
            .await
    }

    /// What the payout's deductions currently hold back from the seller, net of
    /// its refunds. Zero when every debit has been refunded or none was taken.
    pub async fn outstanding_for_payout(&self, payout: &Payout) -> Result<Money> {
        let net: Money = self
            .store
            .entries(payout.seller)
            .await?
            .iter()
            .filter(|entry| entry.payout == Some(payout.id))
            .map(|entry| entry.delta)
            .sum();
        Ok(-net)
    }

    async fn post_credit(
        &self,
        seller: SellerId,
        amount: Money,
        reason: &str,
        actor: Option<ActorId>,
        payout: Option<PayoutId>,
    ) -> Result<Money> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let tx = self.store.begin(seller).await?;
        let new_balance = tx
            .current_balance()
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow { seller, amount })?;
        let entry = tx
            .commit(NewLedgerEntry {
                delta: amount,
                reason: reason.to_string(),
                balance_after: new_balance,
                actor,
                payout,
            })
            .await?;
        log_entry(&entry);
        Ok(entry.balance_after)
    }

    async fn post_debit(
        &self,
        seller: SellerId,
        amount: Money,
        reason: &str,
        actor: Option<ActorId>,
        payout: Option<PayoutId>,
    ) -> Result<Money> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let tx = self.store.begin(seller).await?;
        let available = tx.current_balance();
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                seller: tx.seller(),
                requested: amount,
                available,
            });
        }
        let entry = tx
            .commit(NewLedgerEntry {
                delta: -amount,
                reason: reason.to_string(),
                balance_after: available - amount,
                actor,
                payout,
            })
            .await?;
        log_entry(&entry);
        Ok(entry.balance_after)
    }

    /// Committed balance; zero for sellers without ledger history.
    pub async fn balance(&self, seller: SellerId) -> Result<Money> {
        self.store.balance(seller).await
    }

    /// Ledger entries of the seller in the order they were applied.
    pub async fn entries(&self, seller: SellerId) -> Result<Vec<LedgerEntry>> {
        self.store.entries(seller).await
    }

    pub async fn balances(&self) -> Result<Vec<(SellerId, Money)>> {
        self.store.balances().await
    }
}

fn log_entry(entry: &LedgerEntry) {
    info!(
        seller = %entry.seller,
        delta = %entry.delta,
        reason = %entry.reason,
        balance = %entry.balance_after,
        actor = ?entry.actor.map(|a| a.0),
        payout = ?entry.payout.map(|p| p.0),
        entry_id = entry.id,
        "balance mutated"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryBalanceStore;

    fn ledger() -> BalanceLedger {
        BalanceLedger::new(Box::new(InMemoryBalanceStore::new()))
    }

    #[tokio::test]
    async fn test_credit_then_debit() {
        let ledger = ledger();
        let seller = SellerId(1);

        let balance = ledger
            .credit(seller, Money::from_minor(1000), "commission_credit", None)
            .await
            .unwrap();
        assert_eq!(balance, Money::from_minor(1000));

        let balance = ledger
            .debit(seller, Money::from_minor(400), "payout_deduction", Some(ActorId(9)))
            .await
            .unwrap();
        assert_eq!(balance, Money::from_minor(600));

        let entries = ledger.entries(seller).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].delta, Money::from_minor(1000));
        assert_eq!(entries[1].delta, Money::from_minor(-400));
        assert_eq!(entries[1].balance_after, Money::from_minor(600));
        assert_eq!(entries[1].actor, Some(ActorId(9)));
        assert_eq!(entries[1].reason, "payout_deduction");
    }

    #[tokio::test]
    async fn test_non_positive_amounts_rejected() {
        let ledger = ledger();
        let seller = SellerId(1);

        for amount in [Money::ZERO, Money::from_minor(-5)] {
            assert!(matches!(
                ledger.credit(seller, amount, "x", None).await,
                Err(LedgerError::InvalidAmount(_))
            ));
            assert!(matches!(
                ledger.debit(seller, amount, "x", None).await,
                Err(LedgerError::InvalidAmount(_))
            ));
        }
        assert!(ledger.entries(seller).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_balance_leaves_state_untouched() {
        let ledger = ledger();
        let seller = SellerId(2);
        ledger
            .credit(seller, Money::from_minor(500), "seed", None)
            .await
            .unwrap();

        let result = ledger
            .debit(seller, Money::from_minor(501), "payout_deduction", None)
            .await;
        match result {
            Err(LedgerError::InsufficientBalance {
                requested,
                available,
                ..
            }) => {
                assert_eq!(requested, Money::from_minor(501));
                assert_eq!(available, Money::from_minor(500));
            }
            other => panic!("Expected InsufficientBalance, got {:?}", other),
        }
        assert_eq!(ledger.balance(seller).await.unwrap(), Money::from_minor(500));
        assert_eq!(ledger.entries(seller).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_debit_of_entire_balance() {
        let ledger = ledger();
        let seller = SellerId(3);
        ledger
            .credit(seller, Money::from_minor(700), "seed", None)
            .await
            .unwrap();
        let balance = ledger
            .debit(seller, Money::from_minor(700), "payout_deduction", None)
            .await
            .unwrap();
        assert_eq!(balance, Money::ZERO);
    }

    #[tokio::test]
    async fn test_credit_overflow_is_reported_as_overflow() {
        let ledger = ledger();
        let seller = SellerId(4);
        ledger
            .credit(seller, Money::from_minor(i64::MAX - 10), "seed", None)
            .await
            .unwrap();

        let err = ledger
            .credit(seller, Money::from_minor(1_000), "commission_credit", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::BalanceOverflow { seller: SellerId(4), amount }
                if amount == Money::from_minor(1_000)
        ));
        assert!(err.to_string().contains("would overflow the balance of seller 4"));
        assert_eq!(ledger.entries(seller).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_outstanding_for_payout_nets_its_own_entries() {
        use crate::domain::payout::NewPayout;

        let ledger = ledger();
        let seller = SellerId(5);
        let payout = NewPayout {
            seller,
            amount: Money::from_minor(300),
            method: "manual".to_string(),
            notes: None,
        }
        .into_payout(PayoutId(8));
        ledger
            .credit(seller, Money::from_minor(1_000), "seed", None)
            .await
            .unwrap();
        assert_eq!(ledger.outstanding_for_payout(&payout).await.unwrap(), Money::ZERO);

        ledger.debit_for_payout(&payout, None).await.unwrap();
        ledger
            .debit(seller, Money::from_minor(100), "manual_adjustment", None)
            .await
            .unwrap();
        assert_eq!(
            ledger.outstanding_for_payout(&payout).await.unwrap(),
            Money::from_minor(300)
        );

        ledger
            .refund_payout(&payout, Money::from_minor(300), "payout_failed_refund", None)
            .await
            .unwrap();
        assert_eq!(ledger.outstanding_for_payout(&payout).await.unwrap(), Money::ZERO);
        let entries = ledger.entries(seller).await.unwrap();
        assert_eq!(entries[1].payout, Some(PayoutId(8)));
        assert_eq!(entries[2].payout, None);
    }
}
