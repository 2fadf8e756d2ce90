use super::commission::{Commission, CommissionStatus};
use super::events::LedgerEvent;
use super::ledger::{LedgerEntry, NewLedgerEntry};
use super::money::{Money, SellerId};
use super::payout::{NewPayout, Payout, PayoutId, PayoutStatus};
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Storage for seller balances and their append-only ledger.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Acquires the seller's exclusive lock and opens a transaction on the balance
    /// record. The lock is held until the transaction is committed or dropped;
    /// dropping without commit discards the mutation.
    async fn begin(&self, seller: SellerId) -> Result<Box<dyn BalanceTransaction>>;
    async fn balance(&self, seller: SellerId) -> Result<Money>;
    async fn entries(&self, seller: SellerId) -> Result<Vec<LedgerEntry>>;
    async fn balances(&self) -> Result<Vec<(SellerId, Money)>>;
}

/// An open, locked balance transaction for a single seller.
#[async_trait]
pub trait BalanceTransaction: Send {
    fn seller(&self) -> SellerId;
    /// Balance as read under the lock.
    fn current_balance(&self) -> Money;
    /// Writes `entry.balance_after` as the new balance and appends the entry,
    /// both or neither.
    async fn commit(self: Box<Self>, entry: NewLedgerEntry) -> Result<LedgerEntry>;
}

#[async_trait]
pub trait PayoutStore: Send + Sync {
    async fn insert(&self, payout: NewPayout) -> Result<Payout>;
    async fn get(&self, id: PayoutId) -> Result<Option<Payout>>;
    async fn for_seller(&self, seller: SellerId) -> Result<Vec<Payout>>;
    async fn all(&self) -> Result<Vec<Payout>>;
    /// Replaces the stored payout with `payout` only if the stored status is still
    /// `expected`. Returns `false` when another transition got there first.
    async fn compare_and_swap(&self, expected: PayoutStatus, payout: &Payout) -> Result<bool>;
}

#[async_trait]
pub trait CommissionStore: Send + Sync {
    /// Inserts the commission unless one already exists for the same order item.
    async fn record(&self, commission: Commission) -> Result<bool>;
    async fn get(&self, order_item_id: &str) -> Result<Option<Commission>>;
    /// Commissions of a seller, oldest first.
    async fn for_seller(&self, seller: SellerId) -> Result<Vec<Commission>>;
    /// Sets the status to `to` only if it is still `from`.
    async fn transition(
        &self,
        order_item_id: &str,
        from: CommissionStatus,
        to: CommissionStatus,
    ) -> Result<bool>;
    /// Links `Credited` commissions to a completed payout; other rows are left alone.
    async fn mark_disbursed(&self, order_item_ids: &[String], payout: PayoutId) -> Result<()>;
}

/// Result of a processor call that produced a definitive answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorOutcome {
    Success { external_id: String },
    Failure { reason: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessorError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("unexpected processor response: {0}")]
    Parse(String),
    #[error("processor did not answer within {0:?}")]
    Timeout(Duration),
}

/// External disbursement service. Implementations must not assume any lock is held.
#[async_trait]
pub trait PayoutProcessor: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    async fn submit(
        &self,
        payout: &Payout,
    ) -> std::result::Result<ProcessorOutcome, ProcessorError>;

    /// Whether the seller has finished any account setup the processor needs.
    async fn is_seller_onboarded(
        &self,
        _seller: SellerId,
    ) -> std::result::Result<bool, ProcessorError> {
        Ok(true)
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: LedgerEvent);
}

pub type BalanceStoreBox = Box<dyn BalanceStore>;
pub type PayoutStoreBox = Box<dyn PayoutStore>;
/// Commissions are written by crediting and read back when payouts complete.
pub type SharedCommissionStore = Arc<dyn CommissionStore>;
pub type EventSinkBox = Box<dyn EventSink>;
