//! Application layer containing the ledger orchestration.
//!
//! `BalanceLedger` is the single writer of seller balances. `PayoutLifecycle` and
//! `CommissionCrediting` share it through an `Arc` and never touch balance storage
//! directly.

pub mod commissions;
pub mod ledger;
pub mod payouts;
pub mod registry;
