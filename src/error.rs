//! Error types for the keymaster

use crate::chain::RpcFailure;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{operation} on {network} failed after {attempts} attempt(s): {source}")]
    ChainCommunication {
        network: String,
        operation: &'static str,
        attempts: u32,
        #[source]
        source: RpcFailure,
    },

    #[error("Transaction rejected by {network}: {reason}")]
    TransactionRejected { network: String, reason: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Metrics server error: {0}")]
    Metrics(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Short, stable label for this error, suitable as a metric label value
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "configuration",
            Error::ChainCommunication { .. } => "chain_communication",
            Error::TransactionRejected { .. } => "transaction_rejected",
            Error::Wallet(_) => "wallet",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::Metrics(_) => "metrics",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
