//! Chain client adapter
//!
//! Uniform balance / nonce / block-height / transfer operations against one
//! network, each wrapped in the retry policy for its call weight.

mod retry;
mod rpc;

#[cfg(test)]
pub(crate) mod mock;

pub use retry::{RetryExhausted, RetryPolicies, RetryPolicy};
pub use rpc::{ChainRpc, HttpChainRpc, RpcFailure};

use crate::wallet::BankSigner;
use crate::{Error, Result};
use alloy::consensus::TxLegacy;
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, TxHash, TxKind, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Gas-limit class of a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasClass {
    #[default]
    Standard,
    /// Networks whose plain transfers need far more gas than L1 (Arbitrum testnets)
    Extended,
}

/// Endpoint fragments that mark a network as [`GasClass::Extended`]
const EXTENDED_ENDPOINT_MARKERS: &[&str] = &["arb-rinkeby"];

impl GasClass {
    /// Classify a network by its RPC endpoint
    pub fn infer(endpoint: &str) -> Self {
        let endpoint = endpoint.to_lowercase();
        if EXTENDED_ENDPOINT_MARKERS
            .iter()
            .any(|marker| endpoint.contains(marker))
        {
            GasClass::Extended
        } else {
            GasClass::Standard
        }
    }
}

/// Fixed gas pricing for top-up transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSchedule {
    pub gas_price_wei: u128,
    pub gas_limit: u64,
    pub extended_multiplier: u64,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            gas_price_wei: 500_000_000_000, // 500 gwei
            gas_limit: 100_000,
            extended_multiplier: 100,
        }
    }
}

impl GasSchedule {
    pub fn gas_limit_for(&self, class: GasClass) -> u64 {
        match class {
            GasClass::Standard => self.gas_limit,
            GasClass::Extended => self.gas_limit.saturating_mul(self.extended_multiplier),
        }
    }
}

/// A value transfer from a bank to one recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    pub recipient: Address,
    pub amount: U256,
    pub nonce: u64,
}

/// Retrying client for a single network
pub struct ChainClient {
    network: String,
    rpc: Arc<dyn ChainRpc>,
    retry: RetryPolicies,
    gas: GasSchedule,
    gas_class: GasClass,
    chain_id: OnceCell<u64>,
}

impl ChainClient {
    pub fn new(network: impl Into<String>, rpc: Arc<dyn ChainRpc>) -> Self {
        Self {
            network: network.into(),
            rpc,
            retry: RetryPolicies::default(),
            gas: GasSchedule::default(),
            gas_class: GasClass::Standard,
            chain_id: OnceCell::new(),
        }
    }

    /// Client over HTTP JSON-RPC
    pub fn connect(network: impl Into<String>, endpoint: &str) -> Result<Self> {
        let rpc = HttpChainRpc::connect(endpoint)?;
        Ok(Self::new(network, Arc::new(rpc)))
    }

    pub fn with_retry(mut self, retry: RetryPolicies) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_gas(mut self, gas: GasSchedule, gas_class: GasClass) -> Self {
        self.gas = gas;
        self.gas_class = gas_class;
        self
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas.gas_limit_for(self.gas_class)
    }

    fn communication_error(&self, operation: &'static str, exhausted: RetryExhausted) -> Error {
        Error::ChainCommunication {
            network: self.network.clone(),
            operation,
            attempts: exhausted.attempts,
            source: exhausted.last,
        }
    }

    /// Latest block number
    pub async fn block_height(&self) -> Result<u64> {
        let rpc = &self.rpc;
        self.retry
            .block_height
            .run("eth_blockNumber", || rpc.block_number())
            .await
            .map_err(|e| self.communication_error("eth_blockNumber", e))
    }

    /// Balance in wei
    pub async fn balance(&self, address: Address) -> Result<U256> {
        let rpc = &self.rpc;
        self.retry
            .balance
            .run("eth_getBalance", || rpc.balance(address))
            .await
            .map_err(|e| self.communication_error("eth_getBalance", e))
    }

    /// Next unused transaction sequence number
    pub async fn nonce(&self, address: Address) -> Result<u64> {
        let rpc = &self.rpc;
        self.retry
            .nonce
            .run("eth_getTransactionCount", || rpc.transaction_count(address))
            .await
            .map_err(|e| self.communication_error("eth_getTransactionCount", e))
    }

    async fn chain_id(&self) -> Result<u64> {
        self.chain_id
            .get_or_try_init(|| async {
                let rpc = &self.rpc;
                self.retry
                    .chain_id
                    .run("eth_chainId", || rpc.chain_id())
                    .await
                    .map_err(|e| self.communication_error("eth_chainId", e))
            })
            .await
            .copied()
    }

    /// Unsigned legacy transaction for a transfer on this network
    pub fn build_transfer(&self, chain_id: u64, request: &TransferRequest) -> TxLegacy {
        TxLegacy {
            chain_id: Some(chain_id),
            nonce: request.nonce,
            gas_price: self.gas.gas_price_wei,
            gas_limit: self.gas_limit(),
            to: TxKind::Call(request.recipient),
            value: request.amount,
            input: Bytes::new(),
        }
    }

    /// Sign a transfer locally and submit it
    ///
    /// The transaction is signed once; transport retries resubmit the same
    /// bytes. A node-side rejection surfaces as [`Error::TransactionRejected`].
    pub async fn sign_and_broadcast(
        &self,
        signer: &BankSigner,
        request: &TransferRequest,
    ) -> Result<TxHash> {
        let chain_id = self.chain_id().await?;
        let envelope = signer.sign_legacy(self.build_transfer(chain_id, request))?;
        let local_hash = *envelope.tx_hash();
        let raw = envelope.encoded_2718();

        let rpc = &self.rpc;
        let raw_ref = raw.as_slice();
        let hash = self
            .retry
            .broadcast
            .run("eth_sendRawTransaction", || rpc.send_raw_transaction(raw_ref))
            .await
            .map_err(|e| {
                if e.last.is_rejection() {
                    Error::TransactionRejected {
                        network: self.network.clone(),
                        reason: e.last.to_string(),
                    }
                } else {
                    self.communication_error("eth_sendRawTransaction", e)
                }
            })?;

        if hash != local_hash {
            tracing::warn!(
                network = %self.network,
                node_hash = %hash,
                local_hash = %local_hash,
                "Node reported a different transaction hash than the one signed"
            );
        }

        Ok(hash)
    }
}

impl std::fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClient")
            .field("network", &self.network)
            .field("gas_class", &self.gas_class)
            .finish()
    }
}
