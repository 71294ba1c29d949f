//! Funding report grouped by target network
//!
//! Read-only view of one collection pass: what each account holds, what it
//! would be topped up with, and how much each network's bank would pay.

use crate::monitor::SweepReport;
use crate::status::{AccountStatus, Role};
use crate::units::format_ether;
use alloy::primitives::{Address, U256};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Funding {
    Ok,
    Low,
    /// Needs funds and holds nothing at all
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    pub home: String,
    pub role: Role,
    pub address: Address,
    pub balance: U256,
    pub to_pay: U256,
    pub funding: Funding,
}

impl ReportLine {
    fn from_status(status: &AccountStatus) -> Self {
        let to_pay = if status.needs_dispatch() {
            status.top_up_amount
        } else {
            U256::ZERO
        };
        let funding = match (status.should_top_up, status.wallet_balance.is_zero()) {
            (false, _) => Funding::Ok,
            (true, true) => Funding::Empty,
            (true, false) => Funding::Low,
        };
        Self {
            home: status.home.clone(),
            role: status.role,
            address: status.address,
            balance: status.wallet_balance,
            to_pay,
            funding,
        }
    }
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{} {} ({})", self.home, self.role, self.address);
        match (self.role, self.funding) {
            (_, Funding::Ok) => write!(f, "{} is ok, has: {}", name, format_ether(self.balance)),
            (Role::Bank, _) => write!(
                f,
                "{} is low and needs a manual refill. Balance: {}",
                name,
                format_ether(self.balance)
            ),
            (_, Funding::Empty) => write!(
                f,
                "{} needs {} immediately, it is empty",
                name,
                format_ether(self.to_pay)
            ),
            (_, Funding::Low) => write!(
                f,
                "{} needs to be paid {}. Balance: {}",
                name,
                format_ether(self.to_pay),
                format_ether(self.balance)
            ),
        }
    }
}

/// Accounts living on one network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkReport {
    pub network: String,
    pub lines: Vec<ReportLine>,
    /// Sum the network's bank would send
    pub to_pay: U256,
}

impl fmt::Display for NetworkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Network: {}", self.network)?;
        for line in &self.lines {
            writeln!(f, "  {}", line)?;
        }
        writeln!(f, "  to pay: {}", format_ether(self.to_pay))
    }
}

/// Group a collection pass by target network
pub fn by_network(report: &SweepReport) -> Vec<NetworkReport> {
    let mut grouped: BTreeMap<&str, NetworkReport> = BTreeMap::new();

    for status in &report.statuses {
        let entry = grouped
            .entry(status.target_network.as_str())
            .or_insert_with(|| NetworkReport {
                network: status.target_network.clone(),
                lines: Vec::new(),
                to_pay: U256::ZERO,
            });
        let line = ReportLine::from_status(status);
        entry.to_pay = entry.to_pay.saturating_add(line.to_pay);
        entry.lines.push(line);
    }

    grouped.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn status(role: Role, network: &str, balance: u64, top_up: Option<u64>) -> AccountStatus {
        AccountStatus {
            role,
            address: address!("00000000000000000000000000000000000000a1"),
            home: "alpha".to_string(),
            target_network: network.to_string(),
            wallet_balance: U256::from(balance),
            transaction_count: 0,
            should_top_up: top_up.is_some(),
            top_up_amount: U256::from(top_up.unwrap_or(0)),
        }
    }

    #[test]
    fn groups_and_totals_per_network() {
        let report = SweepReport {
            statuses: vec![
                status(Role::Bank, "alpha", 5, Some(0)),
                status(Role::Updater, "alpha", 0, Some(100)),
                status(Role::Kathy, "alpha", 10, Some(90)),
                status(Role::Relayer, "beta", 100, None),
            ],
            ..SweepReport::default()
        };

        let networks = by_network(&report);

        assert_eq!(networks.len(), 2);
        assert_eq!(networks[0].network, "alpha");
        assert_eq!(networks[0].to_pay, U256::from(190u64));
        assert_eq!(networks[1].to_pay, U256::ZERO);

        let funding: Vec<Funding> = networks[0].lines.iter().map(|l| l.funding).collect();
        assert_eq!(funding, vec![Funding::Low, Funding::Empty, Funding::Low]);
    }

    #[test]
    fn renders_readable_lines() {
        let empty = ReportLine::from_status(&status(Role::Updater, "alpha", 0, Some(1_000_000_000_000_000_000)));
        assert!(empty.to_string().contains("needs 1 immediately"));

        let ok = ReportLine::from_status(&status(Role::Relayer, "beta", 500_000_000_000_000_000, None));
        assert!(ok.to_string().ends_with("is ok, has: 0.5"));

        let bank = ReportLine::from_status(&status(Role::Bank, "alpha", 0, Some(0)));
        assert!(bank.to_string().contains("manual refill"));
    }
}
