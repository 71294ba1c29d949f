//! Keymaster
//!
//! Keeps a fleet of multi-chain agent wallets funded:
//! - Sweeps every configured home and its replicas for agent balances
//! - Tops up agents that fell below a quarter of their network's threshold
//! - Exposes balances, nonces, block heights and top-up outcomes to Prometheus
//!
//! # Security Model
//!
//! - Bank keys are read from configuration into `SecretString` and only ever
//!   leave it inside the wallet module
//! - Transactions are signed locally; the node only sees raw signed bytes
//! - Banks are never topped up automatically

pub mod chain;
pub mod config;
pub mod dispatch;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod report;
pub mod status;
pub mod units;
pub mod wallet;

mod error;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use monitor::{Monitor, SweepReport, SweepSummary};
pub use status::{AccountStatus, Role};
