use super::operation_reader::{Operation, OperationType};
use crate::application::commissions::CommissionCrediting;
use crate::application::ledger::BalanceLedger;
use crate::application::payouts::PayoutLifecycle;
use crate::domain::commission::{Order, OrderItem, OrderStatus};
use crate::domain::ledger::MANUAL_ADJUSTMENT;
use crate::domain::money::{Money, SellerId};
use crate::domain::payout::PayoutId;
use crate::error::{LedgerError, Result};
use std::sync::Arc;
use tracing::info;

/// Applies operations read from a file to the ledger, in order.
///
/// Consecutive `sale` rows sharing a reference are collected into one succeeded
/// order, which is credited as soon as a row for another order (or any other
/// operation) arrives, or when `finish` is called.
pub struct OperationRunner {
    ledger: Arc<BalanceLedger>,
    payouts: PayoutLifecycle,
    commissions: CommissionCrediting,
    method: Option<String>,
    open_order: Option<Order>,
}

impl OperationRunner {
    pub fn new(
        ledger: Arc<BalanceLedger>,
        payouts: PayoutLifecycle,
        commissions: CommissionCrediting,
        method: Option<String>,
    ) -> Self {
        Self {
            ledger,
            payouts,
            commissions,
            method,
            open_order: None,
        }
    }

    pub async fn apply(&mut self, op: Operation) -> Result<()> {
        if op.r#type != OperationType::Sale {
            self.flush_order().await;
        }

        match op.r#type {
            OperationType::Sale => self.add_sale(&op).await?,
            OperationType::Credit => {
                let (seller, amount) = (required_seller(&op)?, required_amount(&op)?);
                let reason = op.reference().unwrap_or(MANUAL_ADJUSTMENT);
                self.ledger.credit(seller, amount, reason, None).await?;
            }
            OperationType::Debit => {
                let (seller, amount) = (required_seller(&op)?, required_amount(&op)?);
                let reason = op.reference().unwrap_or(MANUAL_ADJUSTMENT);
                self.ledger.debit(seller, amount, reason, None).await?;
            }
            OperationType::Payout => {
                let (seller, amount) = (required_seller(&op)?, required_amount(&op)?);
                let notes = op.reference().map(str::to_string);
                self.payouts
                    .create(seller, amount, self.method.as_deref(), notes)
                    .await?;
            }
            OperationType::Process => {
                let id = required_payout(&op)?;
                let completed = self.payouts.process(id, None).await?;
                info!(payout = %id, completed, "processed");
            }
            OperationType::Cancel => {
                self.payouts.cancel(required_payout(&op)?, None).await?;
            }
            OperationType::Retry => {
                let id = required_payout(&op)?;
                let completed = self.payouts.retry(id, None).await?;
                info!(payout = %id, completed, "retried");
            }
        }
        Ok(())
    }

    /// Credits any order still being collected.
    pub async fn finish(&mut self) {
        self.flush_order().await;
    }

    pub async fn balances(&self) -> Result<Vec<(SellerId, Money)>> {
        self.ledger.balances().await
    }

    pub fn payouts(&self) -> &PayoutLifecycle {
        &self.payouts
    }

    async fn add_sale(&mut self, op: &Operation) -> Result<()> {
        let reference = op
            .reference()
            .ok_or_else(|| {
                LedgerError::ValidationError("sale requires an order reference".to_string())
            })?
            .to_string();
        let amount = required_amount(op)?;

        if self
            .open_order
            .as_ref()
            .is_some_and(|order| order.reference != reference)
        {
            self.flush_order().await;
        }
        let order = self.open_order.get_or_insert_with(|| Order {
            reference: reference.clone(),
            status: OrderStatus::Succeeded,
            items: Vec::new(),
        });
        let line = order.items.len() + 1;
        order.items.push(OrderItem {
            id: format!("{reference}#{line}"),
            product: format!("{reference} item {line}"),
            amount,
            commission_recipient: op.seller,
            commission_rate: op.rate,
        });
        Ok(())
    }

    async fn flush_order(&mut self) {
        if let Some(order) = self.open_order.take() {
            let report = self.commissions.handle_order_succeeded(&order).await;
            info!(
                order = %order.reference,
                credited = report.credited,
                skipped = report.skipped,
                failed = report.failed.len(),
                "order credited"
            );
        }
    }
}

fn required_seller(op: &Operation) -> Result<SellerId> {
    op.seller
        .ok_or_else(|| LedgerError::ValidationError(format!("{:?} requires a seller", op.r#type)))
}

fn required_amount(op: &Operation) -> Result<Money> {
    let amount = op
        .amount
        .ok_or_else(|| {
            LedgerError::ValidationError(format!("{:?} requires an amount", op.r#type))
        })?;
    Money::from_decimal(amount)
}

fn required_payout(op: &Operation) -> Result<PayoutId> {
    op.reference()
        .and_then(|r| r.parse::<u64>().ok())
        .map(PayoutId)
        .ok_or_else(|| {
            LedgerError::ValidationError(format!(
                "{:?} requires a payout id in the reference column",
                op.r#type
            ))
        })
}
