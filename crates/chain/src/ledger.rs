//! Ledger surface used by the keeper.
//!
//! [`Ledger`] is the seam between keeper logic and the node: read-only
//! simulation with per-call outputs, a full dry run, signed submission, and
//! object reads. [`SuiLedger`] implements it over JSON-RPC.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::batch::{CallBatch, GasData, ObjectArg, TransactionData, TransactionDataV1, TransactionExpiration, TransactionKind};
use crate::error::ChainError;
use crate::rpc::{BigInt, ObjectData, Owner, SuiRpcClient};
use crate::signer::KeeperSigner;
use crate::types::{ObjectId, ObjectRef, SuiAddress};

/// Gas coin type.
pub const SUI_COIN_TYPE: &str = "0x2::sui::SUI";

/// Maximum number of coins the ledger accepts as gas payment.
const MAX_GAS_COINS: usize = 255;

/// How long a fetched reference gas price is reused.
const GAS_PRICE_TTL: Duration = Duration::from_secs(60);

/// Raw return values of one call in a simulated batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallOutput {
    pub return_values: Vec<Vec<u8>>,
}

impl CallOutput {
    pub fn single(bytes: Vec<u8>) -> Self {
        Self {
            return_values: vec![bytes],
        }
    }
}

/// Result of a read-only simulation.
#[derive(Clone, Debug, Default)]
pub struct Simulation {
    /// One entry per call, in batch order.
    pub outputs: Vec<CallOutput>,
    /// Execution error reported by the node, if any.
    pub error: Option<String>,
}

/// Execution status from effects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Failure { error: String },
}

impl ExecutionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Success)
    }

    fn from_effects(effects: Option<&Value>) -> Self {
        let status = effects.and_then(|e| e.get("status"));
        match status.and_then(|s| s.get("status")).and_then(Value::as_str) {
            Some("success") => ExecutionStatus::Success,
            _ => ExecutionStatus::Failure {
                error: status
                    .and_then(|s| s.get("error"))
                    .and_then(Value::as_str)
                    .unwrap_or("missing execution status")
                    .to_string(),
            },
        }
    }
}

/// Outcome of a speculative full execution.
#[derive(Clone, Debug)]
pub struct DryRun {
    pub status: ExecutionStatus,
    /// Full node response, kept for diagnostics.
    pub payload: Value,
}

/// One entry of a balance-change list.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange {
    pub owner: Owner,
    pub coin_type: String,
    pub amount: BigInt,
}

/// Outcome of a signed submission.
#[derive(Clone, Debug)]
pub struct Submission {
    pub digest: String,
    pub status: ExecutionStatus,
    /// Whether the node confirmed local execution before responding.
    pub confirmed: bool,
    pub balance_changes: Vec<BalanceChange>,
    pub payload: Value,
}

/// Node operations the keeper relies on.
#[async_trait]
pub trait Ledger: Send + Sync + std::fmt::Debug {
    /// Address that signs and pays for every submission.
    fn sender(&self) -> SuiAddress;

    /// Read-only simulation returning per-call outputs.
    async fn simulate(&self, batch: &CallBatch) -> Result<Simulation, ChainError>;

    /// Full speculative execution with gas, used right before committing.
    async fn dry_run(&self, batch: &CallBatch) -> Result<DryRun, ChainError>;

    /// Sign, submit and wait for local execution.
    async fn sign_and_submit(&self, batch: &CallBatch) -> Result<Submission, ChainError>;

    /// Current object state with content and owner.
    async fn get_object(&self, id: ObjectId) -> Result<ObjectData, ChainError>;

    /// Dynamic field object of `parent` keyed by `name` (`{ type, value }`).
    async fn get_dynamic_field(&self, parent: ObjectId, name: Value) -> Result<ObjectData, ChainError>;
}

/// [`Ledger`] backed by a Sui full node.
pub struct SuiLedger {
    rpc: Arc<SuiRpcClient>,
    signer: KeeperSigner,
    gas_budget: u64,
    /// Shared objects never change their initial version.
    shared_versions: DashMap<ObjectId, u64>,
    gas_price: RwLock<Option<(u64, Instant)>>,
}

impl std::fmt::Debug for SuiLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiLedger")
            .field("rpc", &self.rpc)
            .field("sender", &self.signer.address())
            .field("gas_budget", &self.gas_budget)
            .finish()
    }
}

/// Builder for [`SuiLedger`].
pub struct SuiLedgerBuilder {
    rpc_url: String,
    gas_budget: u64,
}

/// Default gas budget in MIST.
pub const DEFAULT_GAS_BUDGET: u64 = 500_000_000;

impl SuiLedgerBuilder {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            gas_budget: DEFAULT_GAS_BUDGET,
        }
    }

    pub fn gas_budget(mut self, budget: u64) -> Self {
        self.gas_budget = budget;
        self
    }

    pub fn build(self, signer: KeeperSigner) -> Result<SuiLedger, ChainError> {
        let rpc = Arc::new(SuiRpcClient::new(self.rpc_url)?);
        info!(
            rpc = %rpc.url(),
            sender = %signer.address(),
            gas_budget = self.gas_budget,
            "Ledger client initialized"
        );
        Ok(SuiLedger {
            rpc,
            signer,
            gas_budget: self.gas_budget,
            shared_versions: DashMap::new(),
            gas_price: RwLock::new(None),
        })
    }
}

#[derive(Deserialize)]
struct DevInspectResponse {
    #[serde(default)]
    results: Option<Vec<DevInspectResult>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DevInspectResult {
    #[serde(default)]
    return_values: Vec<(Vec<u8>, Value)>,
}

impl SuiLedger {
    async fn resolve_object(&self, id: ObjectId, mutable: bool) -> Result<ObjectArg, ChainError> {
        if let Some(version) = self.shared_versions.get(&id) {
            return Ok(ObjectArg::SharedObject {
                id,
                initial_shared_version: *version,
                mutable,
            });
        }

        let data = self.rpc.get_object(id).await?;
        match data.owner {
            Some(Owner::Shared { initial_shared_version }) => {
                let version = initial_shared_version.0 as u64;
                self.shared_versions.insert(id, version);
                Ok(ObjectArg::SharedObject {
                    id,
                    initial_shared_version: version,
                    mutable,
                })
            }
            _ => Ok(ObjectArg::ImmOrOwnedObject((id, data.version.0 as u64, data.digest))),
        }
    }

    async fn transaction_kind(&self, batch: &CallBatch) -> Result<TransactionKind, ChainError> {
        let mut resolved = Vec::new();
        for input in batch.inputs() {
            if let crate::batch::BatchInput::Object { id, mutable } = input {
                resolved.push((*id, self.resolve_object(*id, *mutable).await?));
            }
        }

        let ptb = batch.to_programmable(|id, _| {
            resolved
                .iter()
                .find(|(rid, _)| *rid == id)
                .map(|(_, arg)| arg.clone())
                .ok_or(ChainError::ObjectNotFound(id))
        })?;
        Ok(TransactionKind::ProgrammableTransaction(ptb))
    }

    async fn reference_gas_price(&self) -> Result<u64, ChainError> {
        if let Some((price, fetched_at)) = *self.gas_price.read() {
            if fetched_at.elapsed() < GAS_PRICE_TTL {
                return Ok(price);
            }
        }
        let price = self.rpc.reference_gas_price().await?;
        *self.gas_price.write() = Some((price, Instant::now()));
        debug!(price, "Refreshed reference gas price");
        Ok(price)
    }

    async fn gas_payment(&self) -> Result<Vec<ObjectRef>, ChainError> {
        let sender = self.signer.address();
        let mut coins = self.rpc.get_coins(sender, SUI_COIN_TYPE, MAX_GAS_COINS).await?;
        if coins.is_empty() {
            return Err(ChainError::NoGasCoins(sender));
        }
        coins.sort_by(|a, b| b.balance.0.cmp(&a.balance.0));
        Ok(coins
            .into_iter()
            .take(MAX_GAS_COINS)
            .map(|c| (c.coin_object_id, c.version.0 as u64, c.digest))
            .collect())
    }

    /// Encode a full transaction for dry run or submission.
    async fn transaction_bytes(&self, batch: &CallBatch) -> Result<Vec<u8>, ChainError> {
        let kind = self.transaction_kind(batch).await?;
        let price = match self.reference_gas_price().await {
            Ok(price) => price,
            Err(e) => {
                *self.gas_price.write() = None;
                return Err(e);
            }
        };
        let data = TransactionData::V1(TransactionDataV1 {
            kind,
            sender: self.signer.address(),
            gas_data: GasData {
                payment: self.gas_payment().await?,
                owner: self.signer.address(),
                price,
                budget: self.gas_budget,
            },
            expiration: TransactionExpiration::None,
        });
        Ok(bcs::to_bytes(&data)?)
    }
}

#[async_trait]
impl Ledger for SuiLedger {
    fn sender(&self) -> SuiAddress {
        self.signer.address()
    }

    #[instrument(skip(self, batch), fields(calls = batch.len()))]
    async fn simulate(&self, batch: &CallBatch) -> Result<Simulation, ChainError> {
        let kind = self.transaction_kind(batch).await?;
        let tx_bytes = BASE64.encode(bcs::to_bytes(&kind)?);
        let response: DevInspectResponse = self
            .rpc
            .call(
                "sui_devInspectTransactionBlock",
                json!([self.signer.address(), tx_bytes, null, null]),
            )
            .await?;

        let outputs = response
            .results
            .unwrap_or_default()
            .into_iter()
            .map(|r| CallOutput {
                return_values: r.return_values.into_iter().map(|(bytes, _)| bytes).collect(),
            })
            .collect();

        if let Some(error) = &response.error {
            debug!(error = %error, "Simulation reported an error");
        }

        Ok(Simulation {
            outputs,
            error: response.error,
        })
    }

    #[instrument(skip(self, batch), fields(calls = batch.len()))]
    async fn dry_run(&self, batch: &CallBatch) -> Result<DryRun, ChainError> {
        let tx_bytes = BASE64.encode(self.transaction_bytes(batch).await?);
        let payload: Value = self
            .rpc
            .call("sui_dryRunTransactionBlock", json!([tx_bytes]))
            .await?;
        let status = ExecutionStatus::from_effects(payload.get("effects"));
        Ok(DryRun { status, payload })
    }

    #[instrument(skip(self, batch), fields(calls = batch.len()))]
    async fn sign_and_submit(&self, batch: &CallBatch) -> Result<Submission, ChainError> {
        let tx_bytes = self.transaction_bytes(batch).await?;
        let signature = self.signer.sign_transaction(&tx_bytes);

        let payload: Value = self
            .rpc
            .call(
                "sui_executeTransactionBlock",
                json!([
                    BASE64.encode(&tx_bytes),
                    [signature],
                    { "showEffects": true, "showBalanceChanges": true },
                    "WaitForLocalExecution"
                ]),
            )
            .await?;

        let method = "sui_executeTransactionBlock";
        let digest = payload
            .get("digest")
            .and_then(Value::as_str)
            .ok_or_else(|| ChainError::invalid_response(method, "missing digest"))?
            .to_string();
        let balance_changes = match payload.get("balanceChanges") {
            Some(changes) => Vec::<BalanceChange>::deserialize(changes)
                .map_err(|e| ChainError::invalid_response(method, e.to_string()))?,
            None => Vec::new(),
        };
        let confirmed = payload
            .get("confirmedLocalExecution")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let status = ExecutionStatus::from_effects(payload.get("effects"));
        if !confirmed {
            warn!(digest = %digest, "Submission not confirmed by local execution");
        }

        Ok(Submission {
            digest,
            status,
            confirmed,
            balance_changes,
            payload,
        })
    }

    async fn get_object(&self, id: ObjectId) -> Result<ObjectData, ChainError> {
        self.rpc.get_object(id).await
    }

    async fn get_dynamic_field(&self, parent: ObjectId, name: Value) -> Result<ObjectData, ChainError> {
        self.rpc.get_dynamic_field_object(parent, name).await
    }
}

/// Block explorer link for a transaction digest.
pub fn explorer_url(network: &str, digest: &str) -> String {
    format!("https://suiexplorer.com/txblock/{digest}?network={network}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_effects() {
        let ok = json!({ "status": { "status": "success" } });
        assert!(ExecutionStatus::from_effects(Some(&ok)).is_success());

        let failed = json!({ "status": { "status": "failure", "error": "MoveAbort(7)" } });
        assert_eq!(
            ExecutionStatus::from_effects(Some(&failed)),
            ExecutionStatus::Failure {
                error: "MoveAbort(7)".to_string()
            }
        );

        assert!(!ExecutionStatus::from_effects(None).is_success());
    }

    #[test]
    fn test_balance_change_deserialize() {
        let change: BalanceChange = serde_json::from_value(json!({
            "owner": { "AddressOwner": "0x6" },
            "coinType": "0x2::sui::SUI",
            "amount": "-5000"
        }))
        .unwrap();
        assert_eq!(change.owner.address(), Some(SuiAddress::CLOCK));
        assert_eq!(change.amount, BigInt(-5000));
    }

    #[test]
    fn test_dev_inspect_response_shape() {
        let response: DevInspectResponse = serde_json::from_value(json!({
            "effects": {},
            "results": [
                { "returnValues": [[[1], "bool"]] },
                { "mutableReferenceOutputs": [] }
            ]
        }))
        .unwrap();
        let results = response.results.unwrap();
        assert_eq!(results[0].return_values[0].0, vec![1]);
        assert!(results[1].return_values.is_empty());
        assert!(response.error.is_none());
    }

    #[test]
    fn test_explorer_url() {
        assert_eq!(
            explorer_url("testnet", "Abc"),
            "https://suiexplorer.com/txblock/Abc?network=testnet"
        );
    }
}
