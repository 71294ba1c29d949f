//! Scriptable in-memory chain RPC

use super::rpc::{ChainRpc, RpcFailure};
use alloy::consensus::{Signed, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{keccak256, Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct MockState {
    block_number: u64,
    chain_id: u64,
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, u64>,
    failing_balances: HashSet<Address>,
    fail_block_number: bool,
    broadcast_failure: Option<RpcFailure>,
    rejected_submissions: HashMap<usize, RpcFailure>,
    raw_submissions: Vec<Bytes>,
    accepted: Vec<Bytes>,
    calls: HashMap<&'static str, u32>,
}

/// In-memory [`ChainRpc`] whose answers and failures are set up front
pub struct MockRpc {
    state: Mutex<MockState>,
}

impl MockRpc {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                block_number: 1,
                chain_id: 31337,
                ..Default::default()
            }),
        }
    }

    fn update(self, f: impl FnOnce(&mut MockState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn with_block_number(self, block_number: u64) -> Self {
        self.update(|s| s.block_number = block_number)
    }

    pub fn with_chain_id(self, chain_id: u64) -> Self {
        self.update(|s| s.chain_id = chain_id)
    }

    pub fn with_balance(self, address: Address, wei: U256) -> Self {
        self.update(|s| {
            s.balances.insert(address, wei);
        })
    }

    pub fn with_nonce(self, address: Address, nonce: u64) -> Self {
        self.update(|s| {
            s.nonces.insert(address, nonce);
        })
    }

    /// Every balance read for `address` fails at the transport level
    pub fn fail_balance_for(self, address: Address) -> Self {
        self.update(|s| {
            s.failing_balances.insert(address);
        })
    }

    pub fn fail_block_number(self) -> Self {
        self.update(|s| s.fail_block_number = true)
    }

    /// Every broadcast is answered with a JSON-RPC error
    pub fn reject_broadcasts(self, reason: &str) -> Self {
        let failure = RpcFailure::Rejected(reason.to_string());
        self.update(|s| s.broadcast_failure = Some(failure))
    }

    /// Only the `nth` broadcast (1-based) is answered with a JSON-RPC error
    pub fn reject_broadcast_number(self, nth: usize, reason: &str) -> Self {
        let failure = RpcFailure::Rejected(reason.to_string());
        self.update(|s| {
            s.rejected_submissions.insert(nth, failure);
        })
    }

    /// Every broadcast fails at the transport level
    pub fn drop_broadcasts(self) -> Self {
        self.update(|s| {
            s.broadcast_failure = Some(RpcFailure::Transport("connection reset".to_string()))
        })
    }

    pub fn set_balance(&self, address: Address, wei: U256) {
        self.state.lock().unwrap().balances.insert(address, wei);
    }

    /// Number of attempts made for one RPC method
    pub fn calls(&self, method: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(method)
            .copied()
            .unwrap_or(0)
    }

    /// Raw bytes of every submission, including failed ones
    pub fn raw_submissions(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().raw_submissions.clone()
    }

    /// Successfully accepted transactions, decoded
    pub fn sent_transactions(&self) -> Vec<Signed<TxLegacy>> {
        self.state
            .lock()
            .unwrap()
            .accepted
            .iter()
            .map(|raw| {
                let envelope = TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap();
                envelope.as_legacy().cloned().unwrap()
            })
            .collect()
    }

    fn record(&self, method: &'static str) -> std::sync::MutexGuard<'_, MockState> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(method).or_default() += 1;
        state
    }
}

#[async_trait]
impl ChainRpc for MockRpc {
    async fn block_number(&self) -> Result<u64, RpcFailure> {
        let state = self.record("block_number");
        if state.fail_block_number {
            return Err(RpcFailure::Transport("connection refused".to_string()));
        }
        Ok(state.block_number)
    }

    async fn chain_id(&self) -> Result<u64, RpcFailure> {
        Ok(self.record("chain_id").chain_id)
    }

    async fn balance(&self, address: Address) -> Result<U256, RpcFailure> {
        let state = self.record("balance");
        if state.failing_balances.contains(&address) {
            return Err(RpcFailure::Transport("connection refused".to_string()));
        }
        Ok(state.balances.get(&address).copied().unwrap_or(U256::ZERO))
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, RpcFailure> {
        let state = self.record("transaction_count");
        Ok(state.nonces.get(&address).copied().unwrap_or(0))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, RpcFailure> {
        let mut state = self.record("send_raw_transaction");
        state.raw_submissions.push(Bytes::copy_from_slice(raw));
        let nth = state.raw_submissions.len();
        let failure = state
            .rejected_submissions
            .get(&nth)
            .or(state.broadcast_failure.as_ref())
            .cloned();
        match failure {
            Some(failure) => Err(failure),
            None => {
                state.accepted.push(Bytes::copy_from_slice(raw));
                Ok(keccak256(raw))
            }
        }
    }
}
