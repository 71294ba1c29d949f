//! Prometheus metrics
//!
//! The monitor reports through the [`MetricsSink`] trait. [`Registry`] is the
//! in-process implementation: it keeps every series in memory and renders the
//! Prometheus text exposition format for the `/metrics` endpoint.

mod server;

pub use server::MetricsServer;

use crate::status::AccountStatus;
use crate::units::to_f64;
use alloy::primitives::{Address, U256};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Mutex;

pub const WALLET_BALANCE: &str = "ethereum_wallet_balance";
pub const TRANSACTION_COUNT: &str = "ethereum_transaction_count";
pub const BLOCK_HEIGHT: &str = "ethereum_block_height";
pub const FAILED_TOP_UPS: &str = "keymaster_failed_tx_count_total";
pub const TOP_UPS: &str = "keymaster_top_up_count_total";
pub const TOP_UP_WEI: &str = "keymaster_top_up_wei_total";

/// Destination for everything the monitor measures
pub trait MetricsSink: Send + Sync {
    /// Balance and transaction-count gauges for one evaluated account
    fn record_account(&self, status: &AccountStatus);

    fn record_block_height(&self, network: &str, height: u64);

    /// A top-up that could not be sent
    fn record_failed_top_up(&self, network: &str, recipient: Address, error: &str);

    /// A top-up that was accepted by the node
    fn record_top_up(&self, network: &str, recipient: Address, amount: U256);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

type LabelSet = Vec<(&'static str, String)>;

#[derive(Debug)]
struct Family {
    help: &'static str,
    kind: MetricKind,
    series: BTreeMap<LabelSet, f64>,
}

/// In-memory metric store labelled with one deployment environment
#[derive(Debug)]
pub struct Registry {
    environment: String,
    families: Mutex<BTreeMap<&'static str, Family>>,
}

impl Registry {
    pub fn new(environment: impl Into<String>) -> Self {
        let mut families = BTreeMap::new();
        for (name, help, kind) in [
            (WALLET_BALANCE, "ETH Wallet Balance", MetricKind::Gauge),
            (TRANSACTION_COUNT, "ETH Wallet Transaction Count", MetricKind::Gauge),
            (BLOCK_HEIGHT, "Block Height", MetricKind::Gauge),
            (
                FAILED_TOP_UPS,
                "Number of Failed Keymaster Top-Ups",
                MetricKind::Counter,
            ),
            (TOP_UPS, "Number of Dispatched Keymaster Top-Ups", MetricKind::Counter),
            (TOP_UP_WEI, "Wei Sent by Keymaster Top-Ups", MetricKind::Counter),
        ] {
            families.insert(
                name,
                Family {
                    help,
                    kind,
                    series: BTreeMap::new(),
                },
            );
        }

        Self {
            environment: environment.into(),
            families: Mutex::new(families),
        }
    }

    fn with_environment(&self, mut labels: LabelSet) -> LabelSet {
        labels.push(("environment", self.environment.clone()));
        labels
    }

    fn set(&self, name: &'static str, labels: LabelSet, value: f64) {
        let labels = self.with_environment(labels);
        let mut families = self.families.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(family) = families.get_mut(name) {
            family.series.insert(labels, value);
        }
    }

    fn add(&self, name: &'static str, labels: LabelSet, by: f64) {
        let labels = self.with_environment(labels);
        let mut families = self.families.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(family) = families.get_mut(name) {
            *family.series.entry(labels).or_insert(0.0) += by;
        }
    }

    fn inc(&self, name: &'static str, labels: LabelSet) {
        self.add(name, labels, 1.0);
    }

    /// Current value of one series; labels are given without `environment`
    pub fn value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let families = self.families.lock().unwrap_or_else(|e| e.into_inner());
        let family = families.get(name)?;
        family.series.iter().find_map(|(set, value)| {
            let matches = set.len() == labels.len() + 1
                && labels
                    .iter()
                    .all(|(k, v)| set.iter().any(|(sk, sv)| sk == k && sv == v));
            matches.then_some(*value)
        })
    }

    /// Number of series recorded for a family
    pub fn series_count(&self, name: &str) -> usize {
        let families = self.families.lock().unwrap_or_else(|e| e.into_inner());
        families.get(name).map(|f| f.series.len()).unwrap_or(0)
    }

    /// Render every family in the Prometheus text format
    pub fn render(&self) -> String {
        let families = self.families.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = String::new();
        for (name, family) in families.iter() {
            let _ = writeln!(out, "# HELP {} {}", name, family.help);
            let _ = writeln!(out, "# TYPE {} {}", name, family.kind.as_str());
            for (labels, value) in &family.series {
                let rendered: Vec<String> = labels
                    .iter()
                    .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
                    .collect();
                let _ = writeln!(out, "{}{{{}}} {}", name, rendered.join(","), value);
            }
        }
        out
    }
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

impl MetricsSink for Registry {
    fn record_account(&self, status: &AccountStatus) {
        let labels = || -> LabelSet {
            vec![
                ("role", status.role.name().to_string()),
                ("home", status.home.clone()),
                ("address", status.address.to_string()),
                ("network", status.target_network.clone()),
            ]
        };
        self.set(WALLET_BALANCE, labels(), to_f64(status.wallet_balance));
        self.set(
            TRANSACTION_COUNT,
            labels(),
            status.transaction_count as f64,
        );
    }

    fn record_block_height(&self, network: &str, height: u64) {
        self.set(
            BLOCK_HEIGHT,
            vec![("network", network.to_string())],
            height as f64,
        );
    }

    fn record_failed_top_up(&self, network: &str, recipient: Address, error: &str) {
        self.inc(
            FAILED_TOP_UPS,
            vec![
                ("network", network.to_string()),
                ("to", recipient.to_string()),
                ("error", error.to_string()),
            ],
        );
    }

    fn record_top_up(&self, network: &str, recipient: Address, amount: U256) {
        let labels = || {
            vec![
                ("network", network.to_string()),
                ("to", recipient.to_string()),
            ]
        };
        self.inc(TOP_UPS, labels());
        self.add(TOP_UP_WEI, labels(), to_f64(amount));
    }
}
