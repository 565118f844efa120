//! Market descriptors and the startup-resolved registry.

use std::sync::Arc;

use keeper_chain::{CallBatch, Ledger, ObjectId, SuiAddress, TypeTag};
use tracing::{info, instrument, warn};

use crate::calls::MarketCalls;
use crate::codec::{DecodeKind, ResultTemplate};
use crate::error::{KeeperError, KeeperResult};
use crate::oracle::{json_u64, PythOracle};

/// An asset traded in a market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub symbol: String,
    pub type_tag: TypeTag,
}

impl Asset {
    pub fn new(symbol: impl Into<String>, type_tag: TypeTag) -> Self {
        Self {
            symbol: symbol.into(),
            type_tag,
        }
    }
}

/// A configured market before its on-chain state is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketSpec {
    pub base: Asset,
    pub quote: Asset,
    /// Pyth price feed id (hex).
    pub price_feed_id: String,
}

impl MarketSpec {
    /// `BASE-QUOTE`
    pub fn name(&self) -> String {
        format!("{}-{}", self.base.symbol, self.quote.symbol)
    }

    pub fn type_arguments(&self) -> Vec<TypeTag> {
        vec![self.base.type_tag.clone(), self.quote.type_tag.clone()]
    }
}

/// A market whose on-chain id, precision and oracle binding are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Market {
    pub name: String,
    pub id: ObjectId,
    pub base: Asset,
    pub quote: Asset,
    /// Decimal precision of the market's quote amounts.
    pub decimals: u8,
    pub price_feed_id: String,
    pub price_info_object: ObjectId,
}

impl Market {
    pub fn type_arguments(&self) -> Vec<TypeTag> {
        vec![self.base.type_tag.clone(), self.quote.type_tag.clone()]
    }

    /// `0x2::coin::Coin<Quote>`
    pub fn quote_coin_type(&self) -> TypeTag {
        TypeTag::coin_of(self.quote.type_tag.clone())
    }
}

/// Resolved markets, built once at startup and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct MarketRegistry {
    markets: Vec<Arc<Market>>,
}

impl MarketRegistry {
    pub fn new(markets: Vec<Market>) -> Self {
        Self {
            markets: markets.into_iter().map(Arc::new).collect(),
        }
    }

    /// Resolve every spec against the ledger. Markets that fail are logged and left out.
    pub async fn resolve(
        ledger: &dyn Ledger,
        calls: &MarketCalls,
        oracle: &PythOracle,
        specs: &[MarketSpec],
    ) -> Self {
        let mut markets = Vec::with_capacity(specs.len());
        for spec in specs {
            match resolve_market(ledger, calls, oracle, spec).await {
                Ok(Some(market)) => {
                    info!(
                        market = %market.name,
                        id = %market.id,
                        decimals = market.decimals,
                        price_info = %market.price_info_object,
                        "Market exists"
                    );
                    markets.push(market);
                }
                Ok(None) => info!(market = %spec.name(), "Market does not exist, ignoring it"),
                Err(e) => warn!(market = %spec.name(), error = %e, "Failed to resolve market, ignoring it"),
            }
        }
        Self::new(markets)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Market>> {
        self.markets.iter()
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Market>> {
        self.markets.iter().find(|m| m.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.markets.iter().map(|m| m.name.as_str()).collect()
    }
}

/// `None` when the protocol has no market for the spec's type pair.
#[instrument(skip_all, fields(market = %spec.name()))]
async fn resolve_market(
    ledger: &dyn Ledger,
    calls: &MarketCalls,
    oracle: &PythOracle,
    spec: &MarketSpec,
) -> KeeperResult<Option<Market>> {
    let name = spec.name();
    let market_err = |reason: String| KeeperError::Market {
        market: name.clone(),
        reason,
    };

    let mut batch = CallBatch::new();
    calls.get_market_id(&mut batch, spec.type_arguments());
    let simulation = ledger.simulate(&batch).await?;
    if let Some(error) = &simulation.error {
        warn!(error = %error, "Market id lookup reported an error");
    }

    let decoded = ResultTemplate::new()
        .slot("id", DecodeKind::Hex, 0)
        .decode(&simulation.outputs);
    let id = match decoded.hex("id") {
        Some(hex) => hex.parse::<SuiAddress>()?,
        None => return Ok(None),
    };
    if id.is_zero() {
        return Ok(None);
    }

    let object = ledger.get_object(id).await?;
    let decimals = object
        .fields()
        .and_then(|f| f.get("decimals"))
        .and_then(json_u64)
        .ok_or_else(|| market_err("market object has no decimals field".to_string()))?;
    let decimals = u8::try_from(decimals).map_err(|_| market_err(format!("decimals {decimals} out of range")))?;

    let price_info_object = oracle.price_info_object(ledger, &spec.price_feed_id).await?;

    Ok(Some(Market {
        name,
        id,
        base: spec.base.clone(),
        quote: spec.quote.clone(),
        decimals,
        price_feed_id: spec.price_feed_id.clone(),
        price_info_object,
    }))
}
