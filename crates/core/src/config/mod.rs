//! Keeper configuration.
//!
//! A TOML file (`KEEPER_CONFIG`) with `${VAR}` expansion, overridden field by
//! field from the environment. Without a file the environment alone is used.
//! The signing key is only ever read from the environment.

mod keeper;
mod markets;

pub use keeper::{
    ContractsConfig, GasConfig, KeeperConfig, NetworkConfig, PythConfig, TimingConfig, DEFAULT_CONFIG_PATH,
};
pub use markets::{builtin_markets, MarketConfig};

/// Environment variable names.
pub mod env {
    pub const KEEPER_CONFIG: &str = "KEEPER_CONFIG";
    pub const PK: &str = "PK";
    pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
    pub const NETWORK: &str = "NETWORK";
    pub const RPC_URL: &str = "RPC_URL";
    pub const PACKAGE_ID: &str = "NEXT_PUBLIC_PACKAGE_ID";
    pub const USDC_PACKAGE_ID: &str = "NEXT_PUBLIC_USDC_PACKAGE_ID";
    pub const SYNTHS_PACKAGE_ID: &str = "NEXT_PUBLIC_SYNTHS_PACKAGE_ID";
    pub const GLOBAL_MARKETS_ID: &str = "NEXT_PUBLIC_GLOBAL_MARKETS_ID";
    pub const PYTH_STATE_ID: &str = "NEXT_PUBLIC_PYTH_STATE_ID";
    pub const WORMHOLE_STATE_ID: &str = "NEXT_PUBLIC_WORMHOLE_STATE_ID";
    pub const HERMES_URL: &str = "NEXT_PUBLIC_PYTH_VAAS_API_URL";
    pub const PROCESS_INTERVAL_SECONDS: &str = "PROCESS_INTERVAL_SECONDS";
    pub const RPC_BACKOFF_TIME_MS: &str = "RPC_BACKOFF_TIME_MS";
    /// Misspelt name accepted for existing deployments.
    pub const RPC_BAKCOFF_TIME_MS: &str = "RPC_BAKCOFF_TIME_MS";
    pub const GAS_BUDGET: &str = "GAS_BUDGET";
}

/// Expand `${VAR_NAME}` patterns with environment variable values.
///
/// Unset variables are left as written.
pub(crate) fn expand_env(s: &str) -> String {
    expand_with(s, |name| std::env::var(name).ok())
}

fn expand_with(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return s.to_string(),
    };

    re.replace_all(s, |caps: &regex_lite::Captures<'_>| {
        lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env() {
        let lookup = |name: &str| (name == "KEEPER_TEST_VAR").then(|| "test_value".to_string());
        assert_eq!(expand_with("${KEEPER_TEST_VAR}", lookup), "test_value");
        assert_eq!(expand_with("prefix_${KEEPER_TEST_VAR}_suffix", lookup), "prefix_test_value_suffix");
        assert_eq!(expand_with("${KEEPER_UNSET_VAR}", lookup), "${KEEPER_UNSET_VAR}");
        assert_eq!(expand_with("no_vars", lookup), "no_vars");
    }
}
