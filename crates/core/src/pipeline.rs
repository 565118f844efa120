//! Per-market keeper workflows.
//!
//! Each cycle fetches candidates with a read-only simulation, optionally
//! filters them, builds one atomic batch and hands it to the
//! [`ExecutionGate`]. Every cycle ends in a [`CycleOutcome`] that is logged
//! exactly once.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use keeper_chain::{explorer_url, Argument, CallBatch, Ledger, SuiAddress};
use tracing::{debug, error, info, instrument, warn};

use crate::accounting::KeeperDeltas;
use crate::calls::{result_offset, MarketCalls, SubBuilder};
use crate::codec::{DecodeKind, ResultTemplate};
use crate::error::KeeperResult;
use crate::gate::{CommitFailure, ExecutionGate, ExecutionResult, SimulationFailure};
use crate::market::Market;
use crate::oracle::PythOracle;
use crate::scheduler::CycleRunner;
use crate::selection::LiquidationPolicy;

/// Sub-builders preceding the liquidatability predicates in the filter batch.
const FILTER_PREFIX: [SubBuilder; 2] = [SubBuilder::PriceFeedUpdate, SubBuilder::InterestRateUpdate];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Workflow {
    Orders,
    Liquidations,
}

impl Workflow {
    pub const ALL: [Workflow; 2] = [Workflow::Orders, Workflow::Liquidations];
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Workflow::Orders => write!(f, "orders"),
            Workflow::Liquidations => write!(f, "liquidations"),
        }
    }
}

/// Terminal state of one cycle.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    NoCandidates,
    /// Positions exist but none passed the liquidatability filter.
    NoneLiquidatable { candidates: usize },
    SimulationFailed {
        addresses: Vec<SuiAddress>,
        failure: SimulationFailure,
    },
    CommitFailed {
        addresses: Vec<SuiAddress>,
        failure: CommitFailure,
    },
    Committed {
        addresses: Vec<SuiAddress>,
        digest: String,
        deltas: KeeperDeltas,
    },
}

/// Dependencies shared by every pipeline.
#[derive(Debug, Clone)]
pub struct KeeperContext {
    pub ledger: Arc<dyn Ledger>,
    pub calls: MarketCalls,
    pub oracle: Arc<PythOracle>,
    pub gate: ExecutionGate,
    pub policy: Arc<dyn LiquidationPolicy>,
    /// Network name used in explorer links.
    pub network: String,
}

/// Runs both workflows for one market.
#[derive(Debug, Clone)]
pub struct MarketPipeline {
    ctx: Arc<KeeperContext>,
    market: Arc<Market>,
}

impl MarketPipeline {
    pub fn new(ctx: Arc<KeeperContext>, market: Arc<Market>) -> Self {
        Self { ctx, market }
    }

    /// Execute every order the market reports as executable.
    #[instrument(skip_all, fields(market = %self.market.name))]
    pub async fn run_orders(&self) -> KeeperResult<CycleOutcome> {
        let mut query = CallBatch::new();
        self.ctx.calls.valid_order_addresses(&mut query, &self.market);
        let orders = self.fetch_candidates(&query, "valid_order_addresses").await?;
        if orders.is_empty() {
            return Ok(CycleOutcome::NoCandidates);
        }

        self.execute_orders(&orders).await.map_err(|e| e.with_addresses(&orders))
    }

    async fn execute_orders(&self, orders: &[SuiAddress]) -> KeeperResult<CycleOutcome> {
        let mut batch = CallBatch::new();
        self.ctx.oracle.append_price_update(&mut batch, &self.market).await?;
        for address in orders {
            let reward = self.ctx.calls.execute_order(&mut batch, &self.market, *address)?;
            self.forward_reward(&mut batch, reward)?;
        }

        self.commit(batch, orders).await
    }

    /// Liquidate every open position that passes the on-chain predicate.
    #[instrument(skip_all, fields(market = %self.market.name))]
    pub async fn run_liquidations(&self) -> KeeperResult<CycleOutcome> {
        let mut query = CallBatch::new();
        self.ctx.calls.position_addresses(&mut query, &self.market);
        let positions = self.fetch_candidates(&query, "position_addresses").await?;
        if positions.is_empty() {
            return Ok(CycleOutcome::NoCandidates);
        }

        let liquidatable = self
            .filter_liquidatable(&positions)
            .await
            .map_err(|e| e.with_addresses(&positions))?;
        let selected = self.ctx.policy.select(&self.market, liquidatable);
        if selected.is_empty() {
            return Ok(CycleOutcome::NoneLiquidatable {
                candidates: positions.len(),
            });
        }

        self.liquidate(&selected).await.map_err(|e| e.with_addresses(&selected))
    }

    async fn liquidate(&self, selected: &[SuiAddress]) -> KeeperResult<CycleOutcome> {
        let mut batch = CallBatch::new();
        self.ctx.oracle.append_price_update(&mut batch, &self.market).await?;
        for address in selected {
            let result = self.ctx.calls.liquidate_position(&mut batch, &self.market, *address)?;
            // (amount_liquidated, reward_coin)
            self.forward_reward(&mut batch, result.nested(1))?;
        }

        self.commit(batch, selected).await
    }

    /// Simulate a single address-list query and parse its output.
    async fn fetch_candidates(&self, query: &CallBatch, slot: &str) -> KeeperResult<Vec<SuiAddress>> {
        let simulation = self.ctx.ledger.simulate(query).await?;
        if let Some(error) = &simulation.error {
            warn!(error = %error, "Candidate query reported an error");
        }

        let decoded = ResultTemplate::new()
            .slot(slot, DecodeKind::HexArray, 0)
            .decode(&simulation.outputs);

        Ok(decoded
            .hex_array(slot)
            .iter()
            .filter_map(|hex| match hex.parse::<SuiAddress>() {
                Ok(address) => Some(address),
                Err(e) => {
                    warn!(value = %hex, error = %e, "Skipping unparseable address");
                    None
                }
            })
            .collect())
    }

    /// One simulation of price refresh, interest refresh and a predicate per position.
    async fn filter_liquidatable(&self, positions: &[SuiAddress]) -> KeeperResult<Vec<SuiAddress>> {
        let mut batch = CallBatch::new();
        self.ctx.oracle.append_price_update(&mut batch, &self.market).await?;
        self.ctx.calls.update_interest_rate(&mut batch, &self.market)?;

        let mut template = ResultTemplate::new();
        for (i, address) in positions.iter().enumerate() {
            self.ctx.calls.can_liquidate(&mut batch, &self.market, *address)?;
            template = template.slot(format!("can_liquidate_{i}"), DecodeKind::Bool, result_offset(&FILTER_PREFIX, i));
        }

        let simulation = self.ctx.ledger.simulate(&batch).await?;
        if let Some(error) = &simulation.error {
            warn!(error = %error, "Liquidation filter reported an error");
        }
        let decoded = template.decode(&simulation.outputs);

        Ok(positions
            .iter()
            .enumerate()
            .filter(|(i, _)| decoded.bool(&format!("can_liquidate_{i}")))
            .map(|(_, address)| *address)
            .collect())
    }

    fn forward_reward(&self, batch: &mut CallBatch, coin: Argument) -> KeeperResult<()> {
        let keeper = self.ctx.ledger.sender();
        self.ctx.calls.transfer_coin(batch, &self.market, coin, keeper)?;
        Ok(())
    }

    async fn commit(&self, batch: CallBatch, addresses: &[SuiAddress]) -> KeeperResult<CycleOutcome> {
        let addresses = addresses.to_vec();
        Ok(match self.ctx.gate.execute(&batch).await? {
            ExecutionResult::Aborted(failure) => CycleOutcome::SimulationFailed { addresses, failure },
            ExecutionResult::Failed(failure) => CycleOutcome::CommitFailed { addresses, failure },
            ExecutionResult::Committed {
                digest,
                balance_changes,
                payload,
            } => {
                debug!(%digest, %payload, "Commit response");
                CycleOutcome::Committed {
                    deltas: KeeperDeltas::from_changes(
                        &balance_changes,
                        self.ctx.ledger.sender(),
                        &self.market.quote,
                        self.market.decimals,
                    ),
                    addresses,
                    digest,
                }
            }
        })
    }

    /// The one log line each cycle ends with.
    fn log_outcome(&self, workflow: Workflow, outcome: &CycleOutcome) {
        let market = self.market.name.as_str();
        match outcome {
            CycleOutcome::NoCandidates => match workflow {
                Workflow::Orders => info!(market, %workflow, "No orders to execute"),
                Workflow::Liquidations => info!(market, %workflow, "No open positions"),
            },
            CycleOutcome::NoneLiquidatable { candidates } => {
                info!(market, %workflow, candidates, "No positions to liquidate")
            }
            CycleOutcome::SimulationFailed { addresses, failure } => error!(
                market,
                %workflow,
                ?addresses,
                error = %failure.error,
                payload = %failure.payload,
                "Simulation failed, batch not committed"
            ),
            CycleOutcome::CommitFailed { addresses, failure } => error!(
                market,
                %workflow,
                ?addresses,
                digest = %failure.digest,
                confirmed = failure.confirmed,
                status = ?failure.status,
                explorer = %explorer_url(&self.ctx.network, &failure.digest),
                "Commit failed"
            ),
            CycleOutcome::Committed {
                addresses,
                digest,
                deltas,
            } => {
                let earned = deltas.earned();
                let paid = deltas.paid();
                let explorer = explorer_url(&self.ctx.network, digest);
                match workflow {
                    Workflow::Orders => info!(
                        market,
                        %workflow,
                        ?addresses,
                        %digest,
                        %explorer,
                        earned = earned.as_deref(),
                        paid = paid.as_deref(),
                        "Executed orders"
                    ),
                    Workflow::Liquidations => info!(
                        market,
                        %workflow,
                        ?addresses,
                        %digest,
                        %explorer,
                        earned = earned.as_deref(),
                        paid = paid.as_deref(),
                        "Liquidated positions"
                    ),
                }
            }
        }
    }
}

#[async_trait]
impl CycleRunner for MarketPipeline {
    fn market_name(&self) -> &str {
        &self.market.name
    }

    async fn run_cycle(&self, workflow: Workflow) -> KeeperResult<CycleOutcome> {
        let outcome = match workflow {
            Workflow::Orders => self.run_orders().await?,
            Workflow::Liquidations => self.run_liquidations().await?,
        };
        self.log_outcome(workflow, &outcome);
        Ok(outcome)
    }
}
