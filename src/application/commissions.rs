use super::ledger::BalanceLedger;
use crate::domain::commission::{
    Commission, CommissionStatus, Order, OrderItem, OrderStatus,
};
use crate::domain::events::{LedgerEvent, SoldItem};
use crate::domain::ledger::commission_reason;
use crate::domain::money::{Money, SellerId};
use crate::domain::ports::{EventSinkBox, SharedCommissionStore};
use crate::error::Result;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happened to the items of one order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CreditingReport {
    pub credited: usize,
    /// Items that already carried a commission or rounded to nothing.
    pub skipped: usize,
    /// `(order item id, error message)` for items whose credit failed.
    pub failed: Vec<(String, String)>,
}

/// Turns succeeded orders into seller balance credits.
pub struct CommissionCrediting {
    ledger: Arc<BalanceLedger>,
    commissions: SharedCommissionStore,
    events: EventSinkBox,
}

impl CommissionCrediting {
    pub fn new(
        ledger: Arc<BalanceLedger>,
        commissions: SharedCommissionStore,
        events: EventSinkBox,
    ) -> Self {
        Self {
            ledger,
            commissions,
            events,
        }
    }

    /// Credits the commission of every eligible item of a succeeded order and sends
    /// each seller one summary of what they sold.
    ///
    /// Safe to call again for the same order: items that already have a commission
    /// are skipped, except those whose credit failed, which are credited again. Each
    /// item is its own ledger transaction, so one failing credit does not hold back
    /// the others.
    pub async fn handle_order_succeeded(&self, order: &Order) -> CreditingReport {
        let mut report = CreditingReport::default();
        if order.status != OrderStatus::Succeeded {
            debug!(
                order = %order.reference,
                status = ?order.status,
                "order not succeeded, no commissions"
            );
            return report;
        }

        let mut sold: BTreeMap<SellerId, Vec<SoldItem>> = BTreeMap::new();
        for item in &order.items {
            let Some((seller, rate)) = item.commission_terms() else {
                continue;
            };
            match self.credit_item(order, item, seller, rate).await {
                Ok(Some(sold_item)) => {
                    report.credited += 1;
                    sold.entry(seller).or_default().push(sold_item);
                }
                Ok(None) => report.skipped += 1,
                Err(err) => {
                    error!(
                        order = %order.reference,
                        item = %item.id,
                        seller = %seller,
                        error = %err,
                        "commission credit failed"
                    );
                    report.failed.push((item.id.clone(), err.to_string()));
                }
            }
        }

        for (seller, items) in sold {
            let total: Money = items.iter().map(|i| i.commission).sum();
            info!(
                order = %order.reference,
                seller = %seller,
                items = items.len(),
                total = %total,
                "commissions credited"
            );
            self.events
                .publish(LedgerEvent::CommissionsEarned {
                    seller,
                    order_reference: order.reference.clone(),
                    items,
                    total,
                })
                .await;
        }

        report
    }

    pub async fn commissions_for(&self, seller: SellerId) -> Result<Vec<Commission>> {
        self.commissions.for_seller(seller).await
    }

    async fn credit_item(
        &self,
        order: &Order,
        item: &OrderItem,
        seller: SellerId,
        rate: Decimal,
    ) -> Result<Option<SoldItem>> {
        let amount = match self.commissions.get(&item.id).await? {
            Some(existing) if existing.status == CommissionStatus::CreditFailed => {
                if !self
                    .commissions
                    .transition(&item.id, CommissionStatus::CreditFailed, CommissionStatus::Pending)
                    .await?
                {
                    return Ok(None);
                }
                debug!(
                    order = %order.reference,
                    item = %item.id,
                    "retrying failed commission credit"
                );
                existing.amount
            }
            Some(_) => {
                debug!(order = %order.reference, item = %item.id, "commission already recorded");
                return Ok(None);
            }
            None => {
                let amount = item.amount.apply_rate(rate)?;
                if !amount.is_positive() {
                    debug!(order = %order.reference, item = %item.id, "commission rounds to zero");
                    return Ok(None);
                }
                // Recording first makes a concurrently delivered duplicate lose the race
                // here instead of crediting a second time.
                if !self
                    .commissions
                    .record(Commission::for_item(order, item, seller, rate, amount))
                    .await?
                {
                    return Ok(None);
                }
                amount
            }
        };

        if let Err(err) = self
            .ledger
            .credit(seller, amount, &commission_reason(&order.reference), None)
            .await
        {
            if let Err(mark) = self
                .commissions
                .transition(&item.id, CommissionStatus::Pending, CommissionStatus::CreditFailed)
                .await
            {
                warn!(item = %item.id, error = %mark, "could not flag commission as not credited");
            }
            return Err(err);
        }
        if let Err(err) = self
            .commissions
            .transition(&item.id, CommissionStatus::Pending, CommissionStatus::Credited)
            .await
        {
            // The money is in the balance; the row just will not be linked to a payout.
            warn!(item = %item.id, error = %err, "commission credited but not marked credited");
        }

        Ok(Some(SoldItem {
            order_item_id: item.id.clone(),
            product: item.product.clone(),
            amount: item.amount,
            commission: amount,
        }))
    }
}
