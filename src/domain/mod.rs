//! Domain types of the seller ledger and the ports the application layer depends on.

pub mod commission;
pub mod events;
pub mod ledger;
pub mod money;
pub mod payout;
pub mod ports;
