use crate::domain::money::{Money, SellerId};
use crate::domain::payout::Payout;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct BalanceRow {
    seller: u32,
    balance: String,
}

#[derive(Serialize)]
struct PayoutRow<'a> {
    id: u64,
    seller: u32,
    amount: String,
    status: &'a str,
    method: &'a str,
    external_id: &'a str,
    failure_reason: &'a str,
}

/// Writes end-of-run reports as CSV.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// `seller,balance` rows, balances with two decimals.
    pub fn write_balances(&mut self, balances: &[(SellerId, Money)]) -> Result<()> {
        for (seller, balance) in balances {
            self.writer.serialize(BalanceRow {
                seller: seller.0,
                balance: balance.to_string(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_payouts(&mut self, payouts: &[Payout]) -> Result<()> {
        for payout in payouts {
            self.writer.serialize(PayoutRow {
                id: payout.id.0,
                seller: payout.seller.0,
                amount: payout.amount.to_string(),
                status: payout.status.as_str(),
                method: &payout.method,
                external_id: payout.external_id.as_deref().unwrap_or_default(),
                failure_reason: payout.failure_reason.as_deref().unwrap_or_default(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
