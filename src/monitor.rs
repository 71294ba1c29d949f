//! Sweep orchestration
//!
//! One sweep walks every configured home: the home's block height, its bank,
//! the agents acting on the home network and the agents acting on each
//! replica. Statuses are sorted with banks first, reported as metrics, and
//! under-funded agents are topped up from their target network's bank.

use crate::chain::ChainClient;
use crate::config::{Config, HomeConfig};
use crate::dispatch::{Bank, BankNonces, DispatchOutcome, Dispatcher};
use crate::metrics::MetricsSink;
use crate::status::{evaluate, AccountStatus, Role};
use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Everything the monitor needs to talk to one network
struct NetworkHandle {
    client: ChainClient,
    threshold: U256,
    bank: Bank,
}

/// Statuses gathered by one collection pass
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Sorted with banks first
    pub statuses: Vec<AccountStatus>,
    /// Latest block of every reachable home network
    pub block_heights: Vec<(String, u64)>,
    /// Homes whose network could not be reached
    pub skipped_homes: Vec<String>,
    /// Accounts whose evaluation failed
    pub failed_evaluations: usize,
}

/// Outcome counts of one full sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub evaluated: usize,
    /// Accounts and homes that could not be evaluated
    pub skipped: usize,
    pub dispatched: usize,
    pub failed: usize,
}

/// Drives collection and top-up dispatch for the whole topology
pub struct Monitor {
    environment: String,
    networks: BTreeMap<String, NetworkHandle>,
    homes: BTreeMap<String, HomeConfig>,
    metrics: Arc<dyn MetricsSink>,
    dispatcher: Dispatcher,
}

impl Monitor {
    /// Monitor with HTTP clients for every configured network
    pub fn connect(config: &Config, metrics: Arc<dyn MetricsSink>) -> Result<Self> {
        let mut clients = HashMap::new();
        for (name, network) in &config.networks {
            clients.insert(name.clone(), ChainClient::connect(name.as_str(), &network.endpoint)?);
        }
        Self::with_clients(config, clients, metrics)
    }

    /// Monitor over already constructed clients, one per configured network
    ///
    /// Retry policies and gas settings from `config` are applied to each client.
    pub fn with_clients(
        config: &Config,
        mut clients: HashMap<String, ChainClient>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        let gas = config.dispatch.gas_schedule();
        let mut networks = BTreeMap::new();

        for (name, network) in &config.networks {
            let client = clients
                .remove(name)
                .ok_or_else(|| Error::Config(format!("No chain client for network {}", name)))?
                .with_retry(config.retry)
                .with_gas(gas, network.gas_class());
            let signer = network.bank_signer()?;

            debug!(
                network = %name,
                bank = %network.bank.address,
                gas_limit = client.gas_limit(),
                "Network ready"
            );

            networks.insert(
                name.clone(),
                NetworkHandle {
                    client,
                    threshold: network.threshold,
                    bank: Bank {
                        address: network.bank.address,
                        signer,
                    },
                },
            );
        }

        let dispatcher = Dispatcher::new(metrics.clone(), config.dispatch.post_dispatch_pause());

        Ok(Self {
            environment: config.environment.clone(),
            networks,
            homes: config.homes.clone(),
            metrics,
            dispatcher,
        })
    }

    async fn evaluate_into(
        &self,
        report: &mut SweepReport,
        home: &str,
        network: &NetworkHandle,
        role: Role,
        address: Address,
        threshold: U256,
    ) {
        match evaluate(&network.client, home, role, address, threshold).await {
            Ok(status) => report.statuses.push(status),
            Err(e) => {
                report.failed_evaluations += 1;
                error!(
                    home,
                    role = %role,
                    address = %address,
                    network = network.client.network(),
                    error = %e,
                    "Failed to evaluate account, skipping it this sweep"
                );
            }
        }
    }

    /// Evaluate every configured account without dispatching anything
    pub async fn collect(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for (home_name, home) in &self.homes {
            let Some(home_network) = self.networks.get(home_name) else {
                error!(home = %home_name, "Home is not a configured network");
                report.skipped_homes.push(home_name.clone());
                continue;
            };

            match home_network.client.block_height().await {
                Ok(height) => report.block_heights.push((home_name.clone(), height)),
                Err(e) => {
                    error!(
                        home = %home_name,
                        error = %e,
                        "Home network unreachable, skipping home this sweep"
                    );
                    report.skipped_homes.push(home_name.clone());
                    continue;
                }
            }

            self.evaluate_into(
                &mut report,
                home_name,
                home_network,
                Role::Bank,
                home_network.bank.address,
                home_network.threshold,
            )
            .await;

            for (&role, &address) in &home.addresses {
                if role.acts_on_home() {
                    let threshold = role.effective_threshold(home_network.threshold);
                    self.evaluate_into(&mut report, home_name, home_network, role, address, threshold)
                        .await;
                } else if role.acts_on_replicas() {
                    for replica in &home.replicas {
                        let Some(replica_network) = self.networks.get(replica) else {
                            warn!(home = %home_name, replica = %replica, "Replica is not a configured network");
                            report.failed_evaluations += 1;
                            continue;
                        };
                        self.evaluate_into(
                            &mut report,
                            home_name,
                            replica_network,
                            role,
                            address,
                            replica_network.threshold,
                        )
                        .await;
                    }
                }
            }
        }

        report.statuses.sort_by_key(|status| status.role.sort_key());
        report
    }

    /// One full pass: collect, report, dispatch top-ups, report block heights
    pub async fn run_sweep(&self) -> SweepSummary {
        let report = self.collect().await;
        info!(
            accounts = report.statuses.len(),
            "Done inspecting wallets, processing top-ups"
        );

        let mut summary = SweepSummary {
            evaluated: report.statuses.len(),
            skipped: report.failed_evaluations + report.skipped_homes.len(),
            ..SweepSummary::default()
        };
        let mut nonces = BankNonces::new();

        for status in &report.statuses {
            self.metrics.record_account(status);

            if !status.needs_dispatch() {
                continue;
            }

            let Some(network) = self.networks.get(&status.target_network) else {
                error!(
                    network = %status.target_network,
                    "No bank configured for target network"
                );
                summary.failed += 1;
                continue;
            };

            match self
                .dispatcher
                .fund(&network.client, &network.bank, &mut nonces, status)
                .await
            {
                DispatchOutcome::Sent(_) => summary.dispatched += 1,
                DispatchOutcome::Failed(_) => summary.failed += 1,
            }
        }

        for (network, height) in &report.block_heights {
            self.metrics.record_block_height(network, *height);
        }

        summary
    }

    /// Sweep forever with `pause` between sweeps
    pub async fn run_forever(&self, pause: Duration) {
        info!(
            pause_secs = pause.as_secs(),
            "Executing event loop, Ctrl+C to exit"
        );

        let mut sweep: u64 = 0;
        loop {
            sweep += 1;
            let span = info_span!("sweep", environment = %self.environment, sweep);

            async {
                info!("Starting sweep");
                let summary = self.run_sweep().await;
                info!(
                    evaluated = summary.evaluated,
                    skipped = summary.skipped,
                    dispatched = summary.dispatched,
                    failed = summary.failed,
                    pause_secs = pause.as_secs(),
                    "Sweep complete, sleeping"
                );
            }
            .instrument(span)
            .await;

            tokio::time::sleep(pause).await;
        }
    }
}
