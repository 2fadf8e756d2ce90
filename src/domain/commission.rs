use super::money::{Money, SellerId};
use super::payout::PayoutId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

/// A line item as delivered by the order system, together with the commission
/// terms of its product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: String,
    pub product: String,
    pub amount: Money,
    pub commission_recipient: Option<SellerId>,
    pub commission_rate: Option<Decimal>,
}

impl OrderItem {
    /// Recipient and rate when this item earns a commission at all.
    pub fn commission_terms(&self) -> Option<(SellerId, Decimal)> {
        match (self.commission_recipient, self.commission_rate) {
            (Some(seller), Some(rate)) if rate > Decimal::ZERO => Some((seller, rate)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub reference: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
}

/// `Pending -> Credited -> Disbursed`, with `CreditFailed` when the balance credit
/// was rejected. Only `Credited` rows stand for money in the seller's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    /// Recorded; the balance credit has not been applied yet.
    Pending,
    /// Credited to the seller balance, not yet paid out.
    Credited,
    /// The balance credit was rejected. A redelivery of the order tries again.
    CreditFailed,
    /// Covered by a completed payout.
    Disbursed,
}

/// Commission earned on one order item. At most one exists per item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commission {
    pub order_item_id: String,
    pub order_reference: String,
    pub seller: SellerId,
    pub amount: Money,
    pub rate: Decimal,
    pub status: CommissionStatus,
    pub payout_id: Option<PayoutId>,
    pub created_at: DateTime<Utc>,
}

impl Commission {
    pub fn for_item(
        order: &Order,
        item: &OrderItem,
        seller: SellerId,
        rate: Decimal,
        amount: Money,
    ) -> Self {
        Self {
            order_item_id: item.id.clone(),
            order_reference: order.reference.clone(),
            seller,
            amount,
            rate,
            status: CommissionStatus::Pending,
            payout_id: None,
            created_at: Utc::now(),
        }
    }
}
