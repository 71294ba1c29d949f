//! Account status evaluation
//!
//! Turns a balance and a threshold into a top-up decision:
//! - agents are topped up to the full threshold once they fall below a quarter of it
//! - banks raise a low-balance warning below four thresholds, and are never topped up

use crate::chain::ChainClient;
use crate::units::format_ether;
use crate::Result;
use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of account being watched
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Bank,
    Updater,
    Kathy,
    Watcher,
    Relayer,
    Processor,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Bank,
        Role::Updater,
        Role::Kathy,
        Role::Watcher,
        Role::Relayer,
        Role::Processor,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Role::Bank => "bank",
            Role::Updater => "updater",
            Role::Kathy => "kathy",
            Role::Watcher => "watcher",
            Role::Relayer => "relayer",
            Role::Processor => "processor",
        }
    }

    /// Roles that act on the home network itself
    pub fn acts_on_home(&self) -> bool {
        matches!(self, Role::Updater | Role::Kathy | Role::Watcher)
    }

    /// Roles that act on each of the home's replica networks
    pub fn acts_on_replicas(&self) -> bool {
        matches!(self, Role::Relayer | Role::Processor)
    }

    /// Threshold this role is held to, given its network's configured threshold
    ///
    /// Watchers send few transactions and only need a quarter of the funds.
    pub fn effective_threshold(&self, network_threshold: U256) -> U256 {
        match self {
            Role::Watcher => network_threshold / U256::from(4u8),
            _ => network_threshold,
        }
    }

    /// Processing order within a sweep: banks first, then by name
    pub fn sort_key(&self) -> (bool, &'static str) {
        (*self != Role::Bank, self.name())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        Role::ALL
            .into_iter()
            .find(|role| role.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| crate::Error::InvalidArgument(format!("Unknown role: {}", s)))
    }
}

/// Outcome of comparing a balance with a threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopUpDecision {
    pub should_top_up: bool,
    pub top_up_amount: U256,
}

impl TopUpDecision {
    pub fn decide(role: Role, balance: U256, threshold: U256) -> Self {
        match role {
            Role::Bank => Self {
                should_top_up: balance < threshold.saturating_mul(U256::from(4u8)),
                top_up_amount: U256::ZERO,
            },
            _ => {
                // balance < threshold / 4, without losing the fractional part
                let below_quarter = balance.saturating_mul(U256::from(4u8)) < threshold;
                Self {
                    should_top_up: below_quarter,
                    top_up_amount: if below_quarter {
                        threshold - balance
                    } else {
                        U256::ZERO
                    },
                }
            }
        }
    }
}

/// One account's state as observed during a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountStatus {
    pub role: Role,
    pub address: Address,
    /// Network the account's home contracts live on
    pub home: String,
    /// Network the balance lives on
    pub target_network: String,
    pub wallet_balance: U256,
    pub transaction_count: u64,
    pub should_top_up: bool,
    pub top_up_amount: U256,
}

impl AccountStatus {
    /// Whether this status asks the dispatcher for a transfer
    pub fn needs_dispatch(&self) -> bool {
        self.role != Role::Bank && self.should_top_up
    }
}

/// Fetch balance and nonce for an account and decide whether it needs funds
///
/// `threshold` is the effective threshold for the role; see
/// [`Role::effective_threshold`].
pub async fn evaluate(
    client: &ChainClient,
    home: &str,
    role: Role,
    address: Address,
    threshold: U256,
) -> Result<AccountStatus> {
    let target_network = client.network();
    tracing::debug!(
        home,
        role = %role,
        address = %address,
        network = target_network,
        "Fetching account status"
    );

    let wallet_balance = client.balance(address).await?;
    let decision = TopUpDecision::decide(role, wallet_balance, threshold);

    if decision.should_top_up {
        if role == Role::Bank {
            tracing::warn!(
                home,
                address = %address,
                network = target_network,
                balance = %format_ether(wallet_balance),
                floor = %format_ether(threshold.saturating_mul(U256::from(4u8))),
                "Bank balance is low"
            );
        } else {
            tracing::debug!(
                home,
                role = %role,
                address = %address,
                network = target_network,
                balance = %format_ether(wallet_balance),
                top_up = %format_ether(decision.top_up_amount),
                "Balance is below a quarter of the threshold"
            );
        }
    }

    let transaction_count = client.nonce(address).await?;

    let status = AccountStatus {
        role,
        address,
        home: home.to_string(),
        target_network: target_network.to_string(),
        wallet_balance,
        transaction_count,
        should_top_up: decision.should_top_up,
        top_up_amount: decision.top_up_amount,
    };
    tracing::info!(
        home,
        role = %role,
        address = %address,
        network = target_network,
        balance = %wallet_balance,
        transaction_count,
        should_top_up = status.should_top_up,
        top_up_amount = %status.top_up_amount,
        "Account status"
    );

    Ok(status)
}
