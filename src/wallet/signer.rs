//! Bank signer
//!
//! SECURITY: this is the only place where bank private keys exist.
//! - Keys are held in alloy's PrivateKeySigner
//! - Keys are never serialized
//! - Keys are never logged

use crate::{Error, Result};
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::network::TxSignerSync;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use secrecy::{ExposeSecret, SecretString};

/// Signing key of a network's bank account
#[derive(Clone)]
pub struct BankSigner {
    signer: PrivateKeySigner,
    /// Public address (safe to expose)
    address: Address,
}

impl BankSigner {
    /// Create a signer from a hex-encoded private key, with or without `0x`
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let key_hex = key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| Error::Wallet(format!("Invalid private key: {}", e)))?;
        let address = signer.address();

        Ok(Self { signer, address })
    }

    /// Create a signer from a key held in configuration
    pub fn from_secret(key: &SecretString) -> Result<Self> {
        Self::from_hex(key.expose_secret())
    }

    /// Get the public address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a legacy transaction and wrap it in an envelope ready for 2718 encoding
    pub fn sign_legacy(&self, mut tx: TxLegacy) -> Result<TxEnvelope> {
        let signature = self
            .signer
            .sign_transaction_sync(&mut tx)
            .map_err(|e| Error::Wallet(format!("Signing failed: {}", e)))?;

        Ok(TxEnvelope::Legacy(tx.into_signed(signature)))
    }
}

// Implement Debug manually to avoid exposing the key
impl std::fmt::Debug for BankSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BankSigner")
            .field("address", &self.address)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}
