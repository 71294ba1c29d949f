//! Raw JSON-RPC transport for one network endpoint
//!
//! Every method here is a single attempt. Retrying is the caller's job
//! (see [`super::retry`]).

use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::transports::TransportError;
use async_trait::async_trait;

/// Why a single RPC attempt failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcFailure {
    /// The request never produced a JSON-RPC response (connect, timeout, bad HTTP status, decode)
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error object
    #[error("node returned error: {0}")]
    Rejected(String),
}

impl RpcFailure {
    pub fn is_rejection(&self) -> bool {
        matches!(self, RpcFailure::Rejected(_))
    }
}

impl From<TransportError> for RpcFailure {
    fn from(err: TransportError) -> Self {
        match err.as_error_resp() {
            Some(payload) => RpcFailure::Rejected(payload.message.to_string()),
            None => RpcFailure::Transport(err.to_string()),
        }
    }
}

/// Account-model chain RPC, one attempt per call
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// `eth_blockNumber`
    async fn block_number(&self) -> Result<u64, RpcFailure>;

    /// `eth_chainId`
    async fn chain_id(&self) -> Result<u64, RpcFailure>;

    /// `eth_getBalance` at the latest block
    async fn balance(&self, address: Address) -> Result<U256, RpcFailure>;

    /// `eth_getTransactionCount` at the latest block
    async fn transaction_count(&self, address: Address) -> Result<u64, RpcFailure>;

    /// `eth_sendRawTransaction`
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, RpcFailure>;
}

/// [`ChainRpc`] over an alloy HTTP provider
pub struct HttpChainRpc {
    provider: DynProvider,
}

impl HttpChainRpc {
    /// Connect to an `http(s)` endpoint. No request is made until the first call.
    pub fn connect(endpoint: &str) -> crate::Result<Self> {
        let url: url::Url = endpoint
            .parse()
            .map_err(|e| crate::Error::Config(format!("Invalid RPC URL {}: {}", endpoint, e)))?;

        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_http(url)
            .erased();

        Ok(Self { provider })
    }
}

#[async_trait]
impl ChainRpc for HttpChainRpc {
    async fn block_number(&self) -> Result<u64, RpcFailure> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn chain_id(&self) -> Result<u64, RpcFailure> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn balance(&self, address: Address) -> Result<U256, RpcFailure> {
        Ok(self.provider.get_balance(address).await?)
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, RpcFailure> {
        Ok(self.provider.get_transaction_count(address).await?)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, RpcFailure> {
        let pending = self.provider.send_raw_transaction(raw).await?;
        Ok(*pending.tx_hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_rejects_malformed_url() {
        let err = HttpChainRpc::connect("not a url").err().expect("must fail");
        assert!(err.to_string().contains("Invalid RPC URL"));
    }

    #[test]
    fn connect_is_lazy() {
        // Nothing listens here; construction must still succeed
        assert!(HttpChainRpc::connect("http://127.0.0.1:1").is_ok());
    }

    #[test]
    fn rejection_classification() {
        assert!(RpcFailure::Rejected("nonce too low".into()).is_rejection());
        assert!(!RpcFailure::Transport("timeout".into()).is_rejection());
    }
}
