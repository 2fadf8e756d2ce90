use super::money::{Money, SellerId};
use super::payout::Payout;
use serde::Serialize;

/// One line of a seller's sales summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoldItem {
    pub order_item_id: String,
    pub product: String,
    pub amount: Money,
    pub commission: Money,
}

/// Notifications handed to out-of-process collaborators (mail, audit trail).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    PayoutCreated(Payout),
    PayoutProcessed(Payout),
    PayoutFailed(Payout),
    PayoutCancelled(Payout),
    CommissionsEarned {
        seller: SellerId,
        order_reference: String,
        items: Vec<SoldItem>,
        total: Money,
    },
}

impl LedgerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::PayoutCreated(_) => "payout_created",
            LedgerEvent::PayoutProcessed(_) => "payout_processed",
            LedgerEvent::PayoutFailed(_) => "payout_failed",
            LedgerEvent::PayoutCancelled(_) => "payout_cancelled",
            LedgerEvent::CommissionsEarned { .. } => "commissions_earned",
        }
    }

    pub fn seller(&self) -> SellerId {
        match self {
            LedgerEvent::PayoutCreated(p)
            | LedgerEvent::PayoutProcessed(p)
            | LedgerEvent::PayoutFailed(p)
            | LedgerEvent::PayoutCancelled(p) => p.seller,
            LedgerEvent::CommissionsEarned { seller, .. } => *seller,
        }
    }
}
