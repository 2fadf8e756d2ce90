//! Outer adapters driving the ledger from files.

pub mod csv;
