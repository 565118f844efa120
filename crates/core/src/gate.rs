//! Simulate-then-commit gate for state-changing batches.

use std::sync::Arc;
use std::time::Duration;

use keeper_chain::{BalanceChange, CallBatch, ExecutionStatus, Ledger};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::error::KeeperResult;

/// The speculative run of a batch failed; nothing was committed.
#[derive(Debug, Clone, Error)]
#[error("simulation failed: {error}")]
pub struct SimulationFailure {
    pub error: String,
    /// Node response for diagnostics.
    pub payload: Value,
}

/// A batch was submitted but not confirmed as successful.
#[derive(Debug, Clone, Error)]
#[error("commit {digest} failed (confirmed: {confirmed}): {status:?}")]
pub struct CommitFailure {
    pub digest: String,
    pub confirmed: bool,
    pub status: ExecutionStatus,
    pub payload: Value,
}

/// Result of passing a batch through the gate.
#[derive(Debug, Clone)]
pub enum ExecutionResult {
    /// Dry run failed, the batch was never submitted.
    Aborted(SimulationFailure),
    /// Submitted but rejected or unconfirmed.
    Failed(CommitFailure),
    Committed {
        digest: String,
        balance_changes: Vec<BalanceChange>,
        payload: Value,
    },
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Committed { .. })
    }

    /// Whether the node confirmed local execution of a submission.
    pub fn confirmed(&self) -> bool {
        match self {
            ExecutionResult::Committed { .. } => true,
            ExecutionResult::Failed(failure) => failure.confirmed,
            ExecutionResult::Aborted(_) => false,
        }
    }

    pub fn balance_changes(&self) -> &[BalanceChange] {
        match self {
            ExecutionResult::Committed { balance_changes, .. } => balance_changes,
            _ => &[],
        }
    }

    pub fn digest(&self) -> Option<&str> {
        match self {
            ExecutionResult::Committed { digest, .. } => Some(digest),
            ExecutionResult::Failed(failure) => Some(&failure.digest),
            ExecutionResult::Aborted(_) => None,
        }
    }
}

/// Every state-changing batch goes through here: dry run first, and only a
/// successful dry run is signed and submitted.
#[derive(Debug, Clone)]
pub struct ExecutionGate {
    ledger: Arc<dyn Ledger>,
    /// Pause between a passing dry run and the submission.
    commit_delay: Duration,
}

impl ExecutionGate {
    pub fn new(ledger: Arc<dyn Ledger>, commit_delay: Duration) -> Self {
        Self { ledger, commit_delay }
    }

    /// Network errors from either step are returned as `Err`; execution
    /// failures are reported in the [`ExecutionResult`].
    #[instrument(skip_all, fields(calls = batch.len()))]
    pub async fn execute(&self, batch: &CallBatch) -> KeeperResult<ExecutionResult> {
        let dry_run = self.ledger.dry_run(batch).await?;
        if let ExecutionStatus::Failure { error } = dry_run.status {
            return Ok(ExecutionResult::Aborted(SimulationFailure {
                error,
                payload: dry_run.payload,
            }));
        }

        if !self.commit_delay.is_zero() {
            debug!(delay_ms = self.commit_delay.as_millis() as u64, "Pacing before commit");
            tokio::time::sleep(self.commit_delay).await;
        }

        let submission = self.ledger.sign_and_submit(batch).await?;
        if !submission.confirmed || !submission.status.is_success() {
            return Ok(ExecutionResult::Failed(CommitFailure {
                digest: submission.digest,
                confirmed: submission.confirmed,
                status: submission.status,
                payload: submission.payload,
            }));
        }

        Ok(ExecutionResult::Committed {
            digest: submission.digest,
            balance_changes: submission.balance_changes,
            payload: submission.payload,
        })
    }
}
