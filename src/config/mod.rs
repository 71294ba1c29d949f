//! Configuration for the keymaster
//!
//! A JSON document describing the deployment environment, the networks with
//! their banks, and the homes whose agents are kept funded. Environment
//! variables under [`env::ENV_PREFIX`] override individual values.

pub mod env;

use crate::chain::{GasClass, GasSchedule, RetryPolicies};
use crate::status::Role;
use crate::wallet::BankSigner;
use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use secrecy::SecretString;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Default location of the configuration document
pub const DEFAULT_CONFIG_PATH: &str = "./config/keymaster.json";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level directive, e.g. `info` or `keymaster=debug`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Transaction parameters for top-ups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub gas_price_gwei: u64,
    pub gas_limit: u64,
    /// Gas-limit multiplier for [`GasClass::Extended`] networks
    pub extended_gas_multiplier: u64,
    /// Pause after each accepted top-up
    pub post_dispatch_pause_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            gas_price_gwei: 500,
            gas_limit: 100_000,
            extended_gas_multiplier: 100,
            post_dispatch_pause_secs: 3,
        }
    }
}

impl DispatchConfig {
    pub fn gas_schedule(&self) -> GasSchedule {
        GasSchedule {
            gas_price_wei: u128::from(self.gas_price_gwei) * 1_000_000_000,
            gas_limit: self.gas_limit,
            extended_multiplier: self.extended_gas_multiplier,
        }
    }

    pub fn post_dispatch_pause(&self) -> Duration {
        Duration::from_secs(self.post_dispatch_pause_secs)
    }
}

/// A network's funding account
#[derive(Deserialize)]
pub struct BankConfig {
    pub address: Address,
    /// Hex private key
    #[serde(deserialize_with = "deserialize_secret")]
    pub signer: SecretString,
}

impl Serialize for BankConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("BankConfig", 2)?;
        state.serialize_field("address", &self.address)?;
        state.serialize_field("signer", "[REDACTED]")?;
        state.end()
    }
}

impl fmt::Debug for BankConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BankConfig")
            .field("address", &self.address)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}

fn deserialize_secret<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

/// One chain the keymaster talks to
#[derive(Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub endpoint: String,
    /// Target balance for agents on this network, in wei
    #[serde(
        deserialize_with = "deserialize_wei",
        serialize_with = "serialize_wei"
    )]
    pub threshold: U256,
    pub bank: BankConfig,
    /// Inferred from the endpoint when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_class: Option<GasClass>,
}

impl NetworkConfig {
    pub fn gas_class(&self) -> GasClass {
        self.gas_class
            .unwrap_or_else(|| GasClass::infer(&self.endpoint))
    }

    pub fn bank_signer(&self) -> Result<BankSigner> {
        BankSigner::from_secret(&self.bank.signer)
    }
}

/// Agents whose home contracts live on one network
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HomeConfig {
    #[serde(default)]
    pub addresses: BTreeMap<Role, Address>,
    #[serde(default)]
    pub replicas: Vec<String>,
}

/// Main configuration
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// Deployment name stamped on every metric and log record
    pub environment: String,
    pub networks: BTreeMap<String, NetworkConfig>,
    pub homes: BTreeMap<String, HomeConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub retry: RetryPolicies,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl Config {
    /// Read, merge environment overrides, parse and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let mut document: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        let applied = env::apply_overrides(
            &mut document,
            env::ENV_PREFIX,
            env::utf8_vars(std::env::vars_os()),
        );
        if applied > 0 {
            tracing::debug!(applied, "Merged environment overrides");
        }

        Self::from_value(document)
    }

    /// Parse and validate an already merged document
    pub fn from_value(document: serde_json::Value) -> Result<Self> {
        let config: Config = serde_json::from_value(document)
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.environment.trim().is_empty() {
            return Err(Error::Config("environment must not be empty".to_string()));
        }

        for (name, network) in &self.networks {
            if network.threshold.is_zero() {
                return Err(Error::Config(format!(
                    "networks.{}.threshold must be greater than zero",
                    name
                )));
            }

            let endpoint = url::Url::parse(&network.endpoint).map_err(|e| {
                Error::Config(format!("networks.{}.endpoint is not a URL: {}", name, e))
            })?;
            if !matches!(endpoint.scheme(), "http" | "https") {
                return Err(Error::Config(format!(
                    "networks.{}.endpoint must use http or https, got {}",
                    name,
                    endpoint.scheme()
                )));
            }

            let signer = network.bank_signer().map_err(|e| {
                Error::Config(format!("networks.{}.bank.signer: {}", name, e))
            })?;
            if signer.address() != network.bank.address {
                return Err(Error::Config(format!(
                    "networks.{}.bank.signer belongs to {}, not the declared bank {}",
                    name,
                    signer.address(),
                    network.bank.address
                )));
            }
        }

        for (name, home) in &self.homes {
            if !self.networks.contains_key(name) {
                return Err(Error::Config(format!(
                    "home {} is not a declared network",
                    name
                )));
            }
            if home.addresses.contains_key(&Role::Bank) {
                return Err(Error::Config(format!(
                    "homes.{}.addresses must not list a bank; banks are declared per network",
                    name
                )));
            }
            for replica in &home.replicas {
                if replica == name {
                    return Err(Error::Config(format!(
                        "home {} lists itself as a replica",
                        name
                    )));
                }
                if !self.networks.contains_key(replica) {
                    return Err(Error::Config(format!(
                        "replica {} of home {} is not a declared network",
                        replica, name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Pretty JSON with signing keys redacted
    pub fn redacted_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Parse a wei amount written in decimal or `0x` hex
pub fn parse_wei(value: &str) -> std::result::Result<U256, String> {
    let value = value.trim();
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(value, 10),
    };
    parsed.map_err(|e| format!("invalid wei amount {:?}: {}", value, e))
}

fn deserialize_wei<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<U256, D::Error> {
    struct WeiVisitor;

    impl<'de> Visitor<'de> for WeiVisitor {
        type Value = U256;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a wei amount as an integer or a decimal/hex string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<U256, E> {
            Ok(U256::from(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<U256, E> {
            u64::try_from(v)
                .map(U256::from)
                .map_err(|_| E::custom("wei amount cannot be negative"))
        }

        fn visit_f64<E: de::Error>(self, _v: f64) -> std::result::Result<U256, E> {
            Err(E::custom(
                "wei amount is not an exact JSON integer; write it as a string",
            ))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<U256, E> {
            parse_wei(v).map_err(E::custom)
        }
    }

    deserializer.deserialize_any(WeiVisitor)
}

fn serialize_wei<S: Serializer>(value: &U256, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}
