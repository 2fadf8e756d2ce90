use crate::config::ConfigError;
use crate::domain::money::{Money, SellerId};
use crate::domain::payout::{PayoutId, PayoutStatus};
use crate::domain::ports::ProcessorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid amount: {0} (must be positive)")]
    InvalidAmount(Money),
    #[error(
        "Insufficient balance for seller {seller}: requested {requested}, available {available}"
    )]
    InsufficientBalance {
        seller: SellerId,
        requested: Money,
        available: Money,
    },
    #[error("Crediting {amount} would overflow the balance of seller {seller}")]
    BalanceOverflow { seller: SellerId, amount: Money },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Payout {payout} cannot be {operation} while {status}")]
    InvalidState {
        payout: PayoutId,
        status: PayoutStatus,
        operation: &'static str,
    },
    /// A processor error that reached the caller instead of being compensated.
    #[error("Payout processor failure: {0}")]
    ProcessorFailure(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(Box<dyn std::error::Error + Send + Sync>),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(err: rocksdb::Error) -> Self {
        LedgerError::Storage(Box::new(err))
    }
}

impl From<ProcessorError> for LedgerError {
    fn from(err: ProcessorError) -> Self {
        LedgerError::ProcessorFailure(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Storage(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
