//! Exponential-backoff retry policies for chain calls

use super::rpc::RpcFailure;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// How a single kind of call is retried
///
/// Delays start around `base_delay_ms`, double after every failure and stop
/// growing at `max_delay_ms`. Each delay is jittered by the backoff crate's
/// default randomization factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Whether a JSON-RPC error response is worth another attempt
    #[serde(default = "default_true")]
    pub retry_rejections: bool,
}

fn default_true() -> bool {
    true
}

/// Retry budget was spent without a success
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last: RpcFailure,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            retry_rejections: true,
        }
    }

    pub const fn no_retry_on_rejection(mut self) -> Self {
        self.retry_rejections = false;
        self
    }

    pub const fn with_delays(mut self, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Fresh delay schedule for one run of a call.
    ///
    /// The attempt bound belongs to the policy, so the schedule itself never
    /// runs out.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.base_delay_ms))
            .with_max_interval(Duration::from_millis(self.max_delay_ms))
            .with_multiplier(2.0)
            .with_max_elapsed_time(None)
            .build()
    }

    fn should_retry(&self, failure: &RpcFailure) -> bool {
        self.retry_rejections || !failure.is_rejection()
    }

    /// Run `call` until it succeeds, the budget is spent, or a failure the
    /// policy does not retry comes back.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RpcFailure>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut backoff = self.backoff();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(failure) => {
                    if attempt >= max_attempts || !self.should_retry(&failure) {
                        return Err(RetryExhausted {
                            attempts: attempt,
                            last: failure,
                        });
                    }
                    let delay = backoff
                        .next_backoff()
                        .unwrap_or_else(|| Duration::from_millis(self.max_delay_ms));
                    tracing::debug!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "RPC call failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// One policy per call weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicies {
    pub block_height: RetryPolicy,
    pub balance: RetryPolicy,
    pub nonce: RetryPolicy,
    pub chain_id: RetryPolicy,
    pub broadcast: RetryPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            block_height: RetryPolicy::new(8),
            balance: RetryPolicy::new(12),
            nonce: RetryPolicy::new(18),
            chain_id: RetryPolicy::new(8),
            broadcast: RetryPolicy::new(3).no_retry_on_rejection(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transport() -> RpcFailure {
        RpcFailure::Transport("connection reset".to_string())
    }

    #[test]
    fn backoff_doubles_within_jitter_and_caps() {
        let policy = RetryPolicy::new(10).with_delays(100, 1_000);
        let mut backoff = policy.backoff();

        // Randomization keeps each delay within half of the nominal interval
        for nominal in [100u128, 200, 400, 800, 1_000, 1_000, 1_000] {
            let delay = backoff.next_backoff().expect("schedule never runs out").as_millis();
            assert!(delay >= nominal / 2, "{delay}ms below {nominal}ms window");
            assert!(delay <= nominal * 3 / 2, "{delay}ms above {nominal}ms window");
        }
    }

    #[test]
    fn default_bounds_order_by_call_weight() {
        let p = RetryPolicies::default();
        assert!(p.block_height.max_attempts < p.balance.max_attempts);
        assert!(p.balance.max_attempts <= p.nonce.max_attempts);
        assert!(p.broadcast.max_attempts < p.block_height.max_attempts);
        assert!(!p.broadcast.retry_rejections);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(4);

        let counter = calls.clone();
        let result: Result<u64, _> = policy
            .run("eth_blockNumber", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(transport()) }
            })
            .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 4);
        assert_eq!(exhausted.last, transport());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_with_backoff_between_attempts() {
        let policy = RetryPolicy::new(3).with_delays(1_000, 60_000);
        let start = tokio::time::Instant::now();

        let _: Result<u64, _> = policy.run("eth_getBalance", || async { Err(transport()) }).await;

        // ~1s after the first failure, ~2s after the second, none after the last
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1_500), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(4_600), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_from_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(5);

        let counter = calls.clone();
        let result = policy
            .run("eth_getTransactionCount", || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(transport())
                    } else {
                        Ok(7u64)
                    }
                }
            })
            .await;

        let value = tokio_test::assert_ok!(result);
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_short_circuits_when_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3).no_retry_on_rejection();

        let counter = calls.clone();
        let result: Result<u64, _> = policy
            .run("eth_sendRawTransaction", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(RpcFailure::Rejected("nonce too low".to_string())) }
            })
            .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn policies_deserialize_partial_overrides() {
        let parsed: RetryPolicies = serde_json::from_value(serde_json::json!({
            "nonce": { "max_attempts": 5, "base_delay_ms": 10, "max_delay_ms": 100 }
        }))
        .expect("parse policies");

        assert_eq!(parsed.nonce.max_attempts, 5);
        assert!(parsed.nonce.retry_rejections);
        assert_eq!(parsed.balance, RetryPolicies::default().balance);
    }
}
