//! Market call builders.
//!
//! Every function here appends calls to a [`CallBatch`] for one market. Calls
//! that the keeper composes as fixed groups are [`SubBuilder`]s; their call
//! counts live in one table so result offsets can be computed without
//! inspecting results.

use keeper_chain::{Argument, CallBatch, MoveTarget, ObjectId, SuiAddress, TypeTag};

use crate::error::{KeeperError, KeeperResult};
use crate::market::Market;

const TRADE_MODULE: &str = "trade";
const MARKET_MODULE: &str = "market";
const STATE_MODULE: &str = "state";

/// Fixed groups of calls appended as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubBuilder {
    /// Oracle price refresh (verify VAA, authenticate, split fee, update feed, destroy).
    PriceFeedUpdate,
    /// Interest accrual refresh.
    InterestRateUpdate,
}

impl SubBuilder {
    /// Number of calls the sub-builder appends. The single source for offset arithmetic.
    pub const fn call_count(self) -> usize {
        match self {
            SubBuilder::PriceFeedUpdate => 5,
            SubBuilder::InterestRateUpdate => 1,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SubBuilder::PriceFeedUpdate => "price_feed_update",
            SubBuilder::InterestRateUpdate => "interest_rate_update",
        }
    }

    /// Verify that exactly `call_count()` calls were appended since `before`.
    pub(crate) fn check_appended(self, before: usize, batch: &CallBatch) -> KeeperResult<()> {
        let actual = batch.len() - before;
        if actual != self.call_count() {
            return Err(KeeperError::BatchLayout {
                builder: self.name(),
                declared: self.call_count(),
                actual,
            });
        }
        Ok(())
    }
}

/// Result offset of the `index`-th call appended after `prefix`.
pub fn result_offset(prefix: &[SubBuilder], index: usize) -> usize {
    prefix.iter().map(|b| b.call_count()).sum::<usize>() + index
}

/// Shared protocol objects referenced by market calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolObjects {
    /// Perps package.
    pub package: ObjectId,
    pub global_markets: ObjectId,
    pub pyth_state: ObjectId,
}

/// Builds the protocol's Move calls.
#[derive(Debug, Clone)]
pub struct MarketCalls {
    objects: ProtocolObjects,
}

impl MarketCalls {
    pub fn new(objects: ProtocolObjects) -> Self {
        Self { objects }
    }

    pub fn objects(&self) -> &ProtocolObjects {
        &self.objects
    }

    fn trade(&self, function: &str) -> MoveTarget {
        MoveTarget::new(self.objects.package, TRADE_MODULE, function)
    }

    /// `market::get_market_id<Base, Quote>(global_markets)`, returns the market `ID`.
    pub fn get_market_id(&self, batch: &mut CallBatch, type_arguments: Vec<TypeTag>) -> Argument {
        let global = batch.object(self.objects.global_markets, false);
        batch.move_call(
            MoveTarget::new(self.objects.package, MARKET_MODULE, "get_market_id"),
            type_arguments,
            vec![global],
        )
    }

    /// `trade::valid_order_addresses(market, clock)`, returns `vector<address>`.
    pub fn valid_order_addresses(&self, batch: &mut CallBatch, market: &Market) -> Argument {
        let market_obj = batch.object(market.id, true);
        let clock = batch.clock();
        batch.move_call(
            self.trade("valid_order_addresses"),
            market.type_arguments(),
            vec![market_obj, clock],
        )
    }

    /// `trade::position_addresses(market)`, returns `vector<address>`.
    pub fn position_addresses(&self, batch: &mut CallBatch, market: &Market) -> Argument {
        let market_obj = batch.object(market.id, true);
        batch.move_call(self.trade("position_addresses"), market.type_arguments(), vec![market_obj])
    }

    /// `trade::flagged_addresses(market)`, returns `vector<address>`.
    pub fn flagged_addresses(&self, batch: &mut CallBatch, market: &Market) -> Argument {
        let market_obj = batch.object(market.id, true);
        batch.move_call(self.trade("flagged_addresses"), market.type_arguments(), vec![market_obj])
    }

    /// `trade::num_liq_windows(market, address)`, returns `u64`.
    pub fn num_liq_windows(
        &self,
        batch: &mut CallBatch,
        market: &Market,
        address: SuiAddress,
    ) -> KeeperResult<Argument> {
        let market_obj = batch.object(market.id, true);
        let account = batch.pure(&address)?;
        Ok(batch.move_call(
            self.trade("num_liq_windows"),
            market.type_arguments(),
            vec![market_obj, account],
        ))
    }

    /// `state::has_position<Quote>(market::trade_state(market), address)`, returns `bool`.
    ///
    /// Appends two calls; the flag is the output of the second.
    pub fn has_position(&self, batch: &mut CallBatch, market: &Market, address: SuiAddress) -> KeeperResult<Argument> {
        let market_obj = batch.object(market.id, true);
        let state = batch.move_call(
            MoveTarget::new(self.objects.package, MARKET_MODULE, "trade_state"),
            market.type_arguments(),
            vec![market_obj],
        );
        let account = batch.pure(&address)?;
        Ok(batch.move_call(
            MoveTarget::new(self.objects.package, STATE_MODULE, "has_position"),
            vec![market.quote.type_tag.clone()],
            vec![state.nested(0), account],
        ))
    }

    /// `trade::can_liquidate(market, address, price_info, clock)`, returns `bool`.
    pub fn can_liquidate(
        &self,
        batch: &mut CallBatch,
        market: &Market,
        address: SuiAddress,
    ) -> KeeperResult<Argument> {
        let market_obj = batch.object(market.id, true);
        let account = batch.pure(&address)?;
        let price_info = batch.object(market.price_info_object, true);
        let clock = batch.clock();
        Ok(batch.move_call(
            self.trade("can_liquidate"),
            market.type_arguments(),
            vec![market_obj, account, price_info, clock],
        ))
    }

    /// Arguments shared by order execution and liquidation.
    fn account_call_args(
        &self,
        batch: &mut CallBatch,
        market: &Market,
        address: SuiAddress,
    ) -> KeeperResult<Vec<Argument>> {
        let account = batch.pure(&address)?;
        let market_obj = batch.object(market.id, true);
        let global = batch.object(self.objects.global_markets, true);
        let price_info = batch.object(market.price_info_object, true);
        let pyth_state = batch.object(self.objects.pyth_state, false);
        let clock = batch.clock();
        Ok(vec![account, market_obj, global, price_info, pyth_state, clock])
    }

    /// `trade::execute_order`, returns the keeper reward coin.
    pub fn execute_order(
        &self,
        batch: &mut CallBatch,
        market: &Market,
        address: SuiAddress,
    ) -> KeeperResult<Argument> {
        let args = self.account_call_args(batch, market, address)?;
        Ok(batch.move_call(self.trade("execute_order"), market.type_arguments(), args))
    }

    /// `trade::liquidate_position`, returns `(amount_liquidated, reward_coin)`.
    pub fn liquidate_position(
        &self,
        batch: &mut CallBatch,
        market: &Market,
        address: SuiAddress,
    ) -> KeeperResult<Argument> {
        let args = self.account_call_args(batch, market, address)?;
        Ok(batch.move_call(self.trade("liquidate_position"), market.type_arguments(), args))
    }

    /// Interest accrual refresh sub-builder.
    pub fn update_interest_rate(&self, batch: &mut CallBatch, market: &Market) -> KeeperResult<()> {
        let before = batch.len();
        let market_obj = batch.object(market.id, true);
        let global = batch.object(self.objects.global_markets, true);
        let price_info = batch.object(market.price_info_object, true);
        let pyth_state = batch.object(self.objects.pyth_state, false);
        let clock = batch.clock();
        batch.move_call(
            self.trade("update_interest_rate"),
            market.type_arguments(),
            vec![market_obj, global, price_info, pyth_state, clock],
        );
        SubBuilder::InterestRateUpdate.check_appended(before, batch)
    }

    /// `0x2::transfer::public_transfer<Coin<Quote>>(coin, recipient)`.
    pub fn transfer_coin(
        &self,
        batch: &mut CallBatch,
        market: &Market,
        coin: Argument,
        recipient: SuiAddress,
    ) -> KeeperResult<Argument> {
        let to = batch.pure(&recipient)?;
        Ok(batch.move_call(
            MoveTarget::new(SuiAddress::FRAMEWORK, "transfer", "public_transfer"),
            vec![market.quote_coin_type()],
            vec![coin, to],
        ))
    }
}
