//! Bank key management
//!
//! Holds the per-network bank signing keys. Keys never leave this module
//! and are never logged or serialised.

mod signer;

pub use signer::BankSigner;
