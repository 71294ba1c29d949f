//! Top-up transaction dispatch
//!
//! Builds, signs and sends funding transfers from a network's bank to an
//! under-funded agent. Failures are counted and logged here and never escape
//! to the sweep.

use crate::chain::{ChainClient, TransferRequest};
use crate::metrics::MetricsSink;
use crate::status::AccountStatus;
use crate::units::format_ether;
use crate::wallet::BankSigner;
use crate::Result;
use alloy::primitives::{Address, TxHash, U256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Next nonce per bank, owned by one sweep's dispatch phase
///
/// A bank's nonce is read from the chain the first time that bank pays in a
/// sweep and advanced locally afterwards, since the chain has not yet seen the
/// sweep's earlier, still pending transfers. It is never re-read within the
/// sweep: a failed transfer leaves the cached value where it was.
#[derive(Debug, Default)]
pub struct BankNonces {
    next: HashMap<String, u64>,
}

impl BankNonces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nonce for the bank's next transfer on the client's network
    pub async fn lease(&mut self, client: &ChainClient, bank: Address) -> Result<u64> {
        if let Some(nonce) = self.next.get(client.network()) {
            return Ok(*nonce);
        }
        let nonce = client.nonce(bank).await?;
        self.next.insert(client.network().to_string(), nonce);
        Ok(nonce)
    }

    /// The leased nonce was consumed by an accepted transaction
    pub fn commit(&mut self, network: &str, used: u64) {
        self.next.insert(network.to_string(), used.saturating_add(1));
    }

    #[cfg(test)]
    pub fn peek(&self, network: &str) -> Option<u64> {
        self.next.get(network).copied()
    }
}

/// A network's funding account
#[derive(Debug, Clone)]
pub struct Bank {
    pub address: Address,
    pub signer: BankSigner,
}

/// Result of one top-up attempt
#[derive(Debug)]
pub enum DispatchOutcome {
    Sent(TxHash),
    Failed(crate::Error),
}

/// Sends top-ups and reports their outcome
pub struct Dispatcher {
    metrics: Arc<dyn MetricsSink>,
    post_dispatch_pause: Duration,
}

impl Dispatcher {
    pub fn new(metrics: Arc<dyn MetricsSink>, post_dispatch_pause: Duration) -> Self {
        Self {
            metrics,
            post_dispatch_pause,
        }
    }

    /// Sign and broadcast one transfer with an explicit nonce
    pub async fn dispatch_top_up(
        &self,
        client: &ChainClient,
        signer: &BankSigner,
        nonce: u64,
        recipient: Address,
        amount: U256,
    ) -> Result<TxHash> {
        let request = TransferRequest {
            recipient,
            amount,
            nonce,
        };
        client.sign_and_broadcast(signer, &request).await
    }

    /// Top up the account behind `status` from `bank`
    ///
    /// On success the bank's nonce advances and the dispatcher pauses before
    /// returning. On failure the failed-top-up counter is incremented and the
    /// bank's nonce stays put, so the next top-up reuses it.
    pub async fn fund(
        &self,
        client: &ChainClient,
        bank: &Bank,
        nonces: &mut BankNonces,
        status: &AccountStatus,
    ) -> DispatchOutcome {
        let network = client.network();
        let recipient = status.address;
        let amount = status.top_up_amount;

        let result = match nonces.lease(client, bank.address).await {
            Ok(nonce) => {
                debug!(
                    home = %status.home,
                    role = %status.role,
                    address = %recipient,
                    network,
                    nonce,
                    amount = %format_ether(amount),
                    "Attempting top-up"
                );
                self.dispatch_top_up(client, &bank.signer, nonce, recipient, amount)
                    .await
                    .map(|hash| (hash, nonce))
            }
            Err(e) => Err(e),
        };

        match result {
            Ok((hash, nonce)) => {
                nonces.commit(network, nonce);
                self.metrics.record_top_up(network, recipient, amount);
                info!(
                    home = %status.home,
                    role = %status.role,
                    address = %recipient,
                    network,
                    nonce,
                    amount = %format_ether(amount),
                    tx_hash = %hash,
                    "Dispatched top-up"
                );
                tokio::time::sleep(self.post_dispatch_pause).await;
                DispatchOutcome::Sent(hash)
            }
            Err(e) => {
                self.metrics
                    .record_failed_top_up(network, recipient, e.kind());
                error!(
                    home = %status.home,
                    role = %status.role,
                    address = %recipient,
                    network,
                    bank = %bank.address,
                    amount = %format_ether(amount),
                    error = %e,
                    "Top-up failed"
                );
                DispatchOutcome::Failed(e)
            }
        }
    }
}
