use super::money::{ActorId, Money, SellerId};
use super::payout::PayoutId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason code for the debit taken when a payout starts processing.
pub const PAYOUT_DEDUCTION: &str = "payout_deduction";
/// Reason code for the refund after the processor reported a failure.
pub const PAYOUT_FAILED_REFUND: &str = "payout_failed_refund";
/// Reason code for the refund after the processor call errored or timed out.
pub const PAYOUT_EXCEPTION_REFUND: &str = "payout_exception_refund";
/// Generic reason code for commission credits without an order reference.
pub const COMMISSION_CREDIT: &str = "commission_credit";
/// Reason code for operator adjustments.
pub const MANUAL_ADJUSTMENT: &str = "manual_adjustment";

pub fn commission_reason(order_reference: &str) -> String {
    if order_reference.is_empty() {
        COMMISSION_CREDIT.to_string()
    } else {
        format!("commission from order {order_reference}")
    }
}

/// An immutable audit record of one balance mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Monotonic per-store sequence number.
    pub id: u64,
    pub seller: SellerId,
    /// Signed change applied to the balance: positive for credits.
    pub delta: Money,
    pub reason: String,
    /// Balance immediately after this entry was applied.
    pub balance_after: Money,
    pub actor: Option<ActorId>,
    /// Payout this entry debits or refunds, if any.
    #[serde(default)]
    pub payout: Option<PayoutId>,
    pub created_at: DateTime<Utc>,
}

/// The mutation a ledger transaction is about to commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub delta: Money,
    pub reason: String,
    pub balance_after: Money,
    pub actor: Option<ActorId>,
    pub payout: Option<PayoutId>,
}

impl NewLedgerEntry {
    pub fn into_entry(self, id: u64, seller: SellerId) -> LedgerEntry {
        LedgerEntry {
            id,
            seller,
            delta: self.delta,
            reason: self.reason,
            balance_after: self.balance_after,
            actor: self.actor,
            payout: self.payout,
            created_at: Utc::now(),
        }
    }
}
