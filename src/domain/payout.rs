use super::money::{ActorId, Money, SellerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayoutId(pub u64);

impl fmt::Display for PayoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a payout.
///
/// ```text
/// Pending -> Processing -> Completed
///    |           \-------> Failed -> Pending (retry)
///    \-> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl PayoutStatus {
    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: PayoutStatus) -> bool {
        use PayoutStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Pending)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Completed => "completed",
            PayoutStatus::Failed => "failed",
            PayoutStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to disburse part of a seller's balance. Kept forever as a financial
/// record; only `PayoutLifecycle` mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub id: PayoutId,
    pub seller: SellerId,
    pub amount: Money,
    pub status: PayoutStatus,
    pub method: String,
    pub external_id: Option<String>,
    pub failure_reason: Option<String>,
    pub notes: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<ActorId>,
    pub created_at: DateTime<Utc>,
    /// Number of times processing has started for this payout.
    pub attempts: u32,
}

impl Payout {
    /// Key handed to the processor so a repeated submission of the same attempt
    /// is recognised on the processor side.
    pub fn idempotency_key(&self) -> String {
        format!("payout-{}-attempt-{}", self.id, self.attempts)
    }

    pub fn append_note(&mut self, note: &str) {
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{note}"),
            _ => note.to_string(),
        });
    }
}

/// Fields supplied when a payout is requested; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayout {
    pub seller: SellerId,
    pub amount: Money,
    pub method: String,
    pub notes: Option<String>,
}

impl NewPayout {
    pub fn into_payout(self, id: PayoutId) -> Payout {
        Payout {
            id,
            seller: self.seller,
            amount: self.amount,
            status: PayoutStatus::Pending,
            method: self.method,
            external_id: None,
            failure_reason: None,
            notes: self.notes,
            processed_at: None,
            processed_by: None,
            created_at: Utc::now(),
            attempts: 0,
        }
    }
}
