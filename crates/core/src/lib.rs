//! Keeper core logic.
//!
//! This crate provides the keeper's behavior on top of the ledger layer:
//! - Result templates decoding simulated call outputs
//! - Protocol call builders and the sub-builder call-count table
//! - Startup market resolution into an immutable registry
//! - Pyth price refresh sub-builder
//! - Simulate-then-commit execution gate and balance accounting
//! - Order and liquidation workflows per market
//! - A scheduler running one cycle loop per (market, workflow)

mod accounting;
mod calls;
mod codec;
pub mod config;
mod error;
mod gate;
mod market;
mod oracle;
mod pipeline;
mod scheduler;
mod selection;

#[cfg(test)]
mod testing;

pub use accounting::{BalanceDelta, KeeperDeltas, SUI_DECIMALS};
pub use calls::{result_offset, MarketCalls, ProtocolObjects, SubBuilder};
pub use codec::{decode_value, DecodeKind, Decoded, DecodedValue, OutputSlot, ResultTemplate};
pub use config::{KeeperConfig, MarketConfig};
pub use error::{DecodeError, KeeperError, KeeperResult};
pub use gate::{CommitFailure, ExecutionGate, ExecutionResult, SimulationFailure};
pub use market::{Asset, Market, MarketRegistry, MarketSpec};
pub use oracle::{PythDeployment, PythOracle};
pub use pipeline::{CycleOutcome, KeeperContext, MarketPipeline, Workflow};
pub use scheduler::{CycleRunner, Scheduler};
pub use selection::{LiquidationPolicy, ProcessAll};
