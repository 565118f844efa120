//! Repeating cycle per (market, workflow).
//!
//! Each pair gets its own task running `loop { cycle; sleep(interval) }`, so
//! the interval is measured from cycle completion. A cycle that errors or
//! panics is logged and the loop carries on.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::KeeperResult;
use crate::pipeline::{CycleOutcome, Workflow};

/// Something that can run one cycle of a workflow for a market.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    fn market_name(&self) -> &str;

    async fn run_cycle(&self, workflow: Workflow) -> KeeperResult<CycleOutcome>;
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Duration,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(interval: Duration, shutdown: CancellationToken) -> Self {
        Self { interval, shutdown }
    }

    /// Start one task per workflow for every runner.
    pub fn spawn_all<R>(&self, runners: Vec<Arc<R>>) -> Vec<JoinHandle<()>>
    where
        R: CycleRunner + 'static,
    {
        let mut handles = Vec::with_capacity(runners.len() * Workflow::ALL.len());
        for runner in runners {
            for workflow in Workflow::ALL {
                handles.push(self.spawn(runner.clone(), workflow));
            }
        }
        info!(
            tasks = handles.len(),
            interval_ms = self.interval.as_millis() as u64,
            "Scheduler started"
        );
        handles
    }

    pub fn spawn<R>(&self, runner: Arc<R>, workflow: Workflow) -> JoinHandle<()>
    where
        R: CycleRunner + 'static,
    {
        let interval = self.interval;
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move { run_loop(runner, workflow, interval, shutdown).await })
    }
}

async fn run_loop<R: CycleRunner>(runner: Arc<R>, workflow: Workflow, interval: Duration, shutdown: CancellationToken) {
    let market = runner.market_name().to_string();
    loop {
        if shutdown.is_cancelled() {
            break;
        }

        match AssertUnwindSafe(runner.run_cycle(workflow)).catch_unwind().await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!(
                market = %market,
                %workflow,
                addresses = ?e.addresses(),
                error = %e.root(),
                "Cycle failed"
            ),
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(market = %market, %workflow, panic = %reason, "Cycle panicked");
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!(market = %market, %workflow, "Cycle loop stopped");
}
