//! Keeper runtime configuration.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use keeper_chain::{ObjectId, DEFAULT_GAS_BUDGET};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::markets::{builtin_markets, MarketConfig};
use super::{env, expand_env};
use crate::calls::ProtocolObjects;
use crate::market::MarketSpec;

/// Config file read when `KEEPER_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/keeper.toml";

/// Main configuration structure.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct KeeperConfig {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub contracts: ContractsConfig,

    #[serde(default)]
    pub pyth: PythConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub gas: GasConfig,

    /// Markets to keep. The built-in set is used when empty.
    #[serde(default)]
    pub markets: Vec<MarketConfig>,

    /// Hex Ed25519 secret key, environment only.
    #[serde(skip)]
    private_key: Option<String>,
}

/// Node endpoint and network name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network name (`testnet`, `mainnet`, `devnet`, `localnet`).
    #[serde(default = "default_network")]
    pub name: String,

    /// Full node JSON-RPC endpoint. Derived from the network name when unset.
    #[serde(default)]
    pub rpc_url: Option<String>,
}

fn default_network() -> String {
    "testnet".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: default_network(),
            rpc_url: None,
        }
    }
}

impl NetworkConfig {
    pub fn rpc_url(&self) -> String {
        match &self.rpc_url {
            Some(url) => url.clone(),
            None if self.name == "localnet" => "http://127.0.0.1:9000".to_string(),
            None => format!("https://fullnode.{}.sui.io:443", self.name),
        }
    }
}

/// Deployed protocol packages and shared objects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractsConfig {
    #[serde(default)]
    pub package_id: String,
    #[serde(default)]
    pub global_markets_id: String,
    /// Package defining the USDC quote coin.
    #[serde(default)]
    pub usdc_package_id: String,
    /// Package defining the synthetic base assets.
    #[serde(default)]
    pub synths_package_id: String,
}

/// Pyth price service and on-chain state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythConfig {
    #[serde(default = "default_hermes_url")]
    pub hermes_url: String,
    #[serde(default)]
    pub pyth_state_id: String,
    #[serde(default)]
    pub wormhole_state_id: String,
}

fn default_hermes_url() -> String {
    "https://hermes-beta.pyth.network".to_string()
}

impl Default for PythConfig {
    fn default() -> Self {
        Self {
            hermes_url: default_hermes_url(),
            pyth_state_id: String::new(),
            wormhole_state_id: String::new(),
        }
    }
}

/// Cycle timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Delay from the end of a cycle to the start of the next (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Pause before every commit (milliseconds)
    #[serde(default = "default_rpc_backoff")]
    pub rpc_backoff_ms: u64,
}

fn default_poll_interval() -> u64 {
    5
}
fn default_rpc_backoff() -> u64 {
    100
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            rpc_backoff_ms: default_rpc_backoff(),
        }
    }
}

/// Gas settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasConfig {
    /// Budget per submitted batch (MIST)
    #[serde(default = "default_gas_budget")]
    pub budget: u64,
}

fn default_gas_budget() -> u64 {
    DEFAULT_GAS_BUDGET
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            budget: default_gas_budget(),
        }
    }
}

impl KeeperConfig {
    /// Load from `KEEPER_CONFIG` (or the default path) if the file exists,
    /// otherwise from the environment alone. Environment overrides apply either way.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(env::KEEPER_CONFIG).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            info!(path = %path, "Loading keeper configuration file");
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.private_key = [env::PK, env::PRIVATE_KEY]
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()));
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, expanding `${VAR}` references first.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&expand_env(&content)).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply every variable `lookup` returns a non-empty value for.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let strings: [(&str, &mut String); 7] = [
            (env::NETWORK, &mut self.network.name),
            (env::PACKAGE_ID, &mut self.contracts.package_id),
            (env::GLOBAL_MARKETS_ID, &mut self.contracts.global_markets_id),
            (env::USDC_PACKAGE_ID, &mut self.contracts.usdc_package_id),
            (env::SYNTHS_PACKAGE_ID, &mut self.contracts.synths_package_id),
            (env::PYTH_STATE_ID, &mut self.pyth.pyth_state_id),
            (env::WORMHOLE_STATE_ID, &mut self.pyth.wormhole_state_id),
        ];
        for (name, field) in strings {
            if let Some(value) = get(name) {
                *field = value;
            }
        }
        if let Some(url) = get(env::HERMES_URL) {
            self.pyth.hermes_url = url;
        }
        if let Some(url) = get(env::RPC_URL) {
            self.network.rpc_url = Some(url);
        }

        let numbers: [(&[&str], &mut u64); 3] = [
            (&[env::PROCESS_INTERVAL_SECONDS] as &[&str], &mut self.timing.poll_interval_secs),
            (&[env::RPC_BACKOFF_TIME_MS, env::RPC_BAKCOFF_TIME_MS] as &[&str], &mut self.timing.rpc_backoff_ms),
            (&[env::GAS_BUDGET] as &[&str], &mut self.gas.budget),
        ];
        for (names, field) in numbers {
            let Some((name, raw)) = names.iter().find_map(|n| get(*n).map(|v| (*n, v))) else {
                continue;
            };
            match raw.trim().parse() {
                Ok(value) => *field = value,
                Err(_) => warn!(var = name, value = %raw, "Ignoring non-numeric environment override"),
            }
        }
    }

    /// Check that every required id is present and well formed.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.private_key.is_none() {
            bail!("Missing env var: {} (or {})", env::PK, env::PRIVATE_KEY);
        }
        self.protocol_objects()?;
        self.wormhole_state_id()?;
        self.market_specs()?;
        if self.timing.poll_interval_secs == 0 {
            warn!("Poll interval is zero, cycles will run back to back");
        }
        Ok(())
    }

    pub fn private_key(&self) -> anyhow::Result<&str> {
        self.private_key
            .as_deref()
            .with_context(|| format!("Missing env var: {}", env::PK))
    }

    pub fn protocol_objects(&self) -> anyhow::Result<ProtocolObjects> {
        Ok(ProtocolObjects {
            package: parse_id("contracts.package_id", &self.contracts.package_id)?,
            global_markets: parse_id("contracts.global_markets_id", &self.contracts.global_markets_id)?,
            pyth_state: parse_id("pyth.pyth_state_id", &self.pyth.pyth_state_id)?,
        })
    }

    pub fn wormhole_state_id(&self) -> anyhow::Result<ObjectId> {
        parse_id("pyth.wormhole_state_id", &self.pyth.wormhole_state_id)
    }

    /// Enabled markets, falling back to the built-in set when none are configured.
    pub fn market_specs(&self) -> anyhow::Result<Vec<MarketSpec>> {
        let markets = if self.markets.is_empty() {
            if self.contracts.usdc_package_id.is_empty() || self.contracts.synths_package_id.is_empty() {
                bail!("built-in markets need contracts.usdc_package_id and contracts.synths_package_id");
            }
            builtin_markets(&self.contracts.usdc_package_id, &self.contracts.synths_package_id)
        } else {
            self.markets.clone()
        };
        markets.iter().filter(|m| m.enabled).map(MarketConfig::to_spec).collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.timing.poll_interval_secs)
    }

    pub fn rpc_backoff(&self) -> Duration {
        Duration::from_millis(self.timing.rpc_backoff_ms)
    }

    /// Log the effective configuration.
    pub fn log_config(&self) {
        let markets = if self.markets.is_empty() { "built-in" } else { "configured" };
        info!(
            network = %self.network.name,
            rpc = %self.network.rpc_url(),
            "Keeper configuration loaded"
        );
        info!(
            package = %self.contracts.package_id,
            global_markets = %self.contracts.global_markets_id,
            "Protocol contracts"
        );
        info!(
            hermes = %self.pyth.hermes_url,
            pyth_state = %self.pyth.pyth_state_id,
            wormhole_state = %self.pyth.wormhole_state_id,
            "Pyth oracle"
        );
        info!(
            poll_interval_secs = self.timing.poll_interval_secs,
            rpc_backoff_ms = self.timing.rpc_backoff_ms,
            gas_budget = self.gas.budget,
            markets,
            "Timing and gas"
        );
    }
}

fn parse_id(field: &str, value: &str) -> anyhow::Result<ObjectId> {
    if value.trim().is_empty() {
        bail!("{field} is not set");
    }
    value.parse::<ObjectId>().with_context(|| format!("{field} is not a valid object id"))
}

impl fmt::Debug for KeeperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeeperConfig")
            .field("network", &self.network)
            .field("contracts", &self.contracts)
            .field("pyth", &self.pyth)
            .field("timing", &self.timing)
            .field("gas", &self.gas)
            .field("markets", &self.markets)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
        [network]
        name = "devnet"

        [contracts]
        package_id = "0xa"
        global_markets_id = "0xb"

        [pyth]
        pyth_state_id = "0xc"
        wormhole_state_id = "0xd"

        [timing]
        poll_interval_secs = 2

        [[markets]]
        base_symbol = "BTC"
        base_type = "0x5e::base_assets::BTC"
        quote_type = "0x5dc::usdc6::USDC6"
        price_feed_id = "0xf9c0"

        [[markets]]
        base_symbol = "ETH"
        base_type = "0x5e::base_assets::ETH"
        quote_type = "0x5dc::usdc6::USDC6"
        price_feed_id = "0xca80"
        enabled = false
    "#;

    fn with_key(mut config: KeeperConfig) -> KeeperConfig {
        config.private_key = Some("11".repeat(32));
        config
    }

    #[test]
    fn test_defaults() {
        let config = KeeperConfig::default();
        assert_eq!(config.network.name, "testnet");
        assert_eq!(config.network.rpc_url(), "https://fullnode.testnet.sui.io:443");
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.rpc_backoff(), Duration::from_millis(100));
        assert_eq!(config.gas.budget, DEFAULT_GAS_BUDGET);
    }

    #[test]
    fn test_parse_file_contents() {
        let config = with_key(KeeperConfig::from_toml(SAMPLE).unwrap());
        assert_eq!(config.network.rpc_url(), "https://fullnode.devnet.sui.io:443");
        assert_eq!(config.timing.poll_interval_secs, 2);
        assert_eq!(config.timing.rpc_backoff_ms, 100);
        assert_eq!(config.pyth.hermes_url, "https://hermes-beta.pyth.network");

        let specs = config.market_specs().unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name(), "BTC-USDC");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (env::NETWORK, "mainnet"),
            (env::PACKAGE_ID, "0x99"),
            (env::RPC_BAKCOFF_TIME_MS, "250"),
            (env::PROCESS_INTERVAL_SECONDS, "not-a-number"),
            (env::HERMES_URL, ""),
        ]
        .into_iter()
        .collect();

        let mut config = KeeperConfig::from_toml(SAMPLE).unwrap();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.network.name, "mainnet");
        assert_eq!(config.contracts.package_id, "0x99");
        assert_eq!(config.rpc_backoff(), Duration::from_millis(250));
        assert_eq!(config.timing.poll_interval_secs, 2);
        assert_eq!(config.pyth.hermes_url, "https://hermes-beta.pyth.network");
    }

    #[test]
    fn test_correct_backoff_name_wins() {
        let vars: HashMap<&str, &str> =
            [(env::RPC_BACKOFF_TIME_MS, "50"), (env::RPC_BAKCOFF_TIME_MS, "250")].into_iter().collect();
        let mut config = KeeperConfig::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.timing.rpc_backoff_ms, 50);
    }

    #[test]
    fn test_builtin_markets_when_none_configured() {
        let mut config = KeeperConfig::default();
        assert!(config.market_specs().is_err());

        config.contracts.usdc_package_id = "0x5dc".to_string();
        config.contracts.synths_package_id = "0x5e".to_string();
        let names: Vec<_> = config.market_specs().unwrap().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["BTC-USDC", "ETH-USDC", "DOGE-USDC"]);
    }

    #[test]
    fn test_validation_requires_key_and_ids() {
        let config = KeeperConfig::from_toml(SAMPLE).unwrap();
        assert!(config.validate().is_err());

        let mut config = with_key(config);
        config.contracts.global_markets_id = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("global_markets_id"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = with_key(KeeperConfig::default());
        let debug = format!("{config:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(&"11".repeat(32)));
    }
}
