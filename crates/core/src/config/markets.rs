//! Market entries and the built-in market set.

use anyhow::Context;
use keeper_chain::TypeTag;
use serde::{Deserialize, Serialize};

use crate::market::{Asset, MarketSpec};

/// One `[[markets]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub base_symbol: String,
    /// Move type of the base asset, e.g. `0x...::base_assets::BTC`.
    pub base_type: String,
    #[serde(default = "default_quote_symbol")]
    pub quote_symbol: String,
    pub quote_type: String,
    /// Pyth price feed id (hex).
    pub price_feed_id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_quote_symbol() -> String {
    "USDC".to_string()
}

fn default_enabled() -> bool {
    true
}

impl MarketConfig {
    pub fn to_spec(&self) -> anyhow::Result<MarketSpec> {
        let base_type = self
            .base_type
            .parse::<TypeTag>()
            .with_context(|| format!("invalid base type for {}", self.base_symbol))?;
        let quote_type = self
            .quote_type
            .parse::<TypeTag>()
            .with_context(|| format!("invalid quote type for {}", self.quote_symbol))?;
        Ok(MarketSpec {
            base: Asset::new(&self.base_symbol, base_type),
            quote: Asset::new(&self.quote_symbol, quote_type),
            price_feed_id: self.price_feed_id.clone(),
        })
    }
}

/// (symbol, Pyth feed id)
const BUILTIN_BASES: [(&str, &str); 3] = [
    ("BTC", "0xf9c0172ba10dfa4d19088d94f5bf61d3b54d5bd7483a322a982e1373ee8ea31b"),
    ("ETH", "0xca80ba6dc32e08d06f1aa886011eed1d77c77be9eb761cc10d72b7d0a2fd57a6"),
    ("DOGE", "0x31775e1d6897129e8a84eeba975778fb50015b88039e9bc140bbd839694ac0ae"),
];

/// BTC, ETH and DOGE against USDC, typed by the deployed synths and USDC packages.
pub fn builtin_markets(usdc_package: &str, synths_package: &str) -> Vec<MarketConfig> {
    BUILTIN_BASES
        .iter()
        .map(|(symbol, feed)| MarketConfig {
            base_symbol: symbol.to_string(),
            base_type: format!("{synths_package}::base_assets::{symbol}"),
            quote_symbol: default_quote_symbol(),
            quote_type: format!("{usdc_package}::usdc6::USDC6"),
            price_feed_id: feed.to_string(),
            enabled: true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_markets() {
        let markets = builtin_markets("0x5dc", "0x5e");
        let names: Vec<_> = markets
            .iter()
            .map(|m| m.to_spec().unwrap().name())
            .collect();
        assert_eq!(names, vec!["BTC-USDC", "ETH-USDC", "DOGE-USDC"]);
        assert_eq!(markets[1].base_type, "0x5e::base_assets::ETH");
        assert_eq!(markets[2].quote_type, "0x5dc::usdc6::USDC6");
    }

    #[test]
    fn test_invalid_type_is_rejected() {
        let mut market = builtin_markets("0x5dc", "0x5e").remove(0);
        market.base_type = "not a type".to_string();
        assert!(market.to_spec().is_err());
    }
}
