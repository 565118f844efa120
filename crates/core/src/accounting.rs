//! Keeper balance deltas from a committed batch.

use std::fmt;

use keeper_chain::{BalanceChange, SuiAddress, TypeTag};
use tracing::warn;

use crate::market::Asset;

/// Decimal precision of the gas coin.
pub const SUI_DECIMALS: u8 = 9;

/// Net change of one coin for the keeper, in smallest units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceDelta {
    pub symbol: String,
    pub raw: i128,
    pub decimals: u8,
}

impl BalanceDelta {
    pub fn new(symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            raw: 0,
            decimals,
        }
    }

    /// Human-readable amount.
    pub fn amount(&self) -> f64 {
        self.raw as f64 / 10f64.powi(self.decimals as i32)
    }

    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }
}

impl fmt::Display for BalanceDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount().abs(), self.symbol)
    }
}

/// Gas and quote deltas of the keeper's own address.
#[derive(Debug, Clone, PartialEq)]
pub struct KeeperDeltas {
    pub gas: BalanceDelta,
    pub quote: BalanceDelta,
}

impl KeeperDeltas {
    /// Sum the balance changes owned by `keeper`.
    ///
    /// Quote amounts are scaled by `quote_decimals`, the market's on-chain precision.
    pub fn from_changes(changes: &[BalanceChange], keeper: SuiAddress, quote: &Asset, quote_decimals: u8) -> Self {
        let sui = TypeTag::sui();
        let mut deltas = Self {
            gas: BalanceDelta::new("SUI", SUI_DECIMALS),
            quote: BalanceDelta::new(quote.symbol.clone(), quote_decimals),
        };

        for change in changes {
            if change.owner.address() != Some(keeper) {
                continue;
            }
            let coin_type = match change.coin_type.parse::<TypeTag>() {
                Ok(tag) => tag,
                Err(e) => {
                    warn!(coin_type = %change.coin_type, error = %e, "Unparseable coin type in balance changes");
                    continue;
                }
            };
            if coin_type == sui {
                deltas.gas.raw += change.amount.0;
            } else if coin_type == quote.type_tag {
                deltas.quote.raw += change.amount.0;
            }
        }

        deltas
    }

    /// `"<n> USDC, <m> SUI"` style list of positive deltas.
    pub fn earned(&self) -> Option<String> {
        join([&self.quote, &self.gas].into_iter().filter(|d| d.raw > 0))
    }

    /// Gas spent, as an absolute amount. A quote loss is not reported.
    pub fn paid(&self) -> Option<String> {
        join(std::iter::once(&self.gas).filter(|d| d.raw < 0))
    }
}

fn join<'a>(deltas: impl Iterator<Item = &'a BalanceDelta>) -> Option<String> {
    let parts: Vec<String> = deltas.map(ToString::to_string).collect();
    (!parts.is_empty()).then(|| parts.join(", "))
}
