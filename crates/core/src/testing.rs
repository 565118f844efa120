//! Scripted ledger and price source for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use keeper_api::PriceUpdateSource;
use keeper_chain::{
    BalanceChange, BigInt, CallBatch, CallOutput, ChainError, DryRun, ExecutionStatus, Ledger, ObjectData,
    ObjectDigest, ObjectId, Owner, Simulation, Submission, SuiAddress, TypeTag,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use crate::calls::ProtocolObjects;
use crate::market::{Asset, Market, MarketSpec};
use crate::oracle::{PythDeployment, PythOracle};

pub const KEEPER: SuiAddress = SuiAddress::new([0xee; 32]);

/// Ledger request kinds in the order they were issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerCall {
    Simulate,
    DryRun,
    Submit,
}

#[derive(Debug, Default)]
pub struct MockLedger {
    simulations: Mutex<VecDeque<Simulation>>,
    dry_runs: Mutex<VecDeque<DryRun>>,
    submissions: Mutex<VecDeque<Result<Submission, String>>>,
    objects: Mutex<HashMap<ObjectId, ObjectData>>,
    dynamic_fields: Mutex<HashMap<ObjectId, ObjectData>>,
    calls: Mutex<Vec<(LedgerCall, Instant)>>,
    simulated: Mutex<Vec<CallBatch>>,
    dry_run_batches: Mutex<Vec<CallBatch>>,
    submitted: Mutex<Vec<CallBatch>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_simulation(&self, simulation: Simulation) {
        self.simulations.lock().push_back(simulation);
    }

    /// Queue a simulation whose calls each return one value.
    pub fn push_outputs(&self, outputs: Vec<Vec<u8>>) {
        self.push_simulation(Simulation {
            outputs: outputs.into_iter().map(CallOutput::single).collect(),
            error: None,
        });
    }

    pub fn push_dry_run(&self, status: ExecutionStatus) {
        self.dry_runs.lock().push_back(DryRun {
            status,
            payload: json!({ "source": "mock" }),
        });
    }

    pub fn push_submission(&self, submission: Submission) {
        self.submissions.lock().push_back(Ok(submission));
    }

    pub fn push_submit_error(&self, message: &str) {
        self.submissions.lock().push_back(Err(message.to_string()));
    }

    pub fn set_object(&self, data: ObjectData) {
        self.objects.lock().insert(data.object_id, data);
    }

    pub fn set_dynamic_field(&self, parent: ObjectId, data: ObjectData) {
        self.dynamic_fields.lock().insert(parent, data);
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.calls.lock().iter().map(|(c, _)| *c).collect()
    }

    pub fn call_times(&self) -> Vec<(LedgerCall, Instant)> {
        self.calls.lock().clone()
    }

    pub fn simulated(&self) -> Vec<CallBatch> {
        self.simulated.lock().clone()
    }

    pub fn dry_run_batches(&self) -> Vec<CallBatch> {
        self.dry_run_batches.lock().clone()
    }

    pub fn submitted(&self) -> Vec<CallBatch> {
        self.submitted.lock().clone()
    }

    fn record(&self, call: LedgerCall) {
        self.calls.lock().push((call, Instant::now()));
    }
}

#[async_trait]
impl Ledger for MockLedger {
    fn sender(&self) -> SuiAddress {
        KEEPER
    }

    async fn simulate(&self, batch: &CallBatch) -> Result<Simulation, ChainError> {
        self.record(LedgerCall::Simulate);
        self.simulated.lock().push(batch.clone());
        Ok(self.simulations.lock().pop_front().unwrap_or_default())
    }

    async fn dry_run(&self, batch: &CallBatch) -> Result<DryRun, ChainError> {
        self.record(LedgerCall::DryRun);
        self.dry_run_batches.lock().push(batch.clone());
        Ok(self.dry_runs.lock().pop_front().unwrap_or(DryRun {
            status: ExecutionStatus::Success,
            payload: Value::Null,
        }))
    }

    async fn sign_and_submit(&self, batch: &CallBatch) -> Result<Submission, ChainError> {
        self.record(LedgerCall::Submit);
        self.submitted.lock().push(batch.clone());
        match self.submissions.lock().pop_front() {
            Some(Ok(submission)) => Ok(submission),
            Some(Err(message)) => Err(ChainError::Rpc {
                method: "sui_executeTransactionBlock".to_string(),
                code: -32000,
                message,
            }),
            None => Ok(confirmed_submission(vec![])),
        }
    }

    async fn get_object(&self, id: ObjectId) -> Result<ObjectData, ChainError> {
        self.objects.lock().get(&id).cloned().ok_or(ChainError::ObjectNotFound(id))
    }

    async fn get_dynamic_field(&self, parent: ObjectId, _name: Value) -> Result<ObjectData, ChainError> {
        self.dynamic_fields
            .lock()
            .get(&parent)
            .cloned()
            .ok_or(ChainError::ObjectNotFound(parent))
    }
}

pub fn confirmed_submission(balance_changes: Vec<BalanceChange>) -> Submission {
    Submission {
        digest: "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin".to_string(),
        status: ExecutionStatus::Success,
        confirmed: true,
        balance_changes,
        payload: json!({ "confirmedLocalExecution": true }),
    }
}

pub fn balance_change(owner: SuiAddress, coin_type: &str, amount: i128) -> BalanceChange {
    BalanceChange {
        owner: Owner::AddressOwner(owner),
        coin_type: coin_type.to_string(),
        amount: BigInt(amount),
    }
}

pub fn object_data(id: ObjectId, object_type: Option<&str>, fields: Value) -> ObjectData {
    ObjectData {
        object_id: id,
        version: BigInt(1),
        digest: ObjectDigest::default(),
        object_type: object_type.map(str::to_string),
        owner: None,
        content: Some(json!({ "dataType": "moveObject", "fields": fields })),
    }
}

/// Accumulator update wrapping `vaa` with no trailing payload.
pub fn accumulator_update(vaa: &[u8]) -> Vec<u8> {
    let mut out = b"PNAU".to_vec();
    out.extend_from_slice(&[1, 0, 0, 0]);
    out.extend_from_slice(&(vaa.len() as u16).to_be_bytes());
    out.extend_from_slice(vaa);
    out.extend_from_slice(&[0xde, 0xad]);
    out
}

/// BCS `vector<address>`.
pub fn address_vector(addresses: &[SuiAddress]) -> Vec<u8> {
    bcs::to_bytes(addresses).unwrap()
}

#[derive(Debug)]
pub struct StaticPriceSource {
    update: Option<Vec<u8>>,
    requests: AtomicUsize,
}

impl StaticPriceSource {
    pub fn new(update: Vec<u8>) -> Self {
        Self {
            update: Some(update),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            update: None,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceUpdateSource for StaticPriceSource {
    async fn latest_price_update(&self, feed_id: &str) -> anyhow::Result<Vec<u8>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.update
            .clone()
            .ok_or_else(|| anyhow::anyhow!("price service unavailable for {feed_id}"))
    }
}

/// Formatted INFO-and-above log output of the current thread.
#[derive(Debug, Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Capture until the returned guard is dropped.
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock()).lines().map(str::to_string).collect()
    }

    /// Lines containing any of `messages`.
    pub fn matching(&self, messages: &[&str]) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| messages.iter().any(|m| line.contains(m)))
            .collect()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

pub fn sample_objects() -> ProtocolObjects {
    ProtocolObjects {
        package: SuiAddress::new([0x0a; 32]),
        global_markets: SuiAddress::new([0x0b; 32]),
        pyth_state: SuiAddress::new([0x0c; 32]),
    }
}

pub fn sample_deployment() -> PythDeployment {
    PythDeployment {
        pyth_state: sample_objects().pyth_state,
        wormhole_state: SuiAddress::new([0x0d; 32]),
        pyth_package: SuiAddress::new([0x0e; 32]),
        wormhole_package: SuiAddress::new([0x0f; 32]),
        base_update_fee: 1,
    }
}

pub fn sample_oracle(update: Vec<u8>) -> PythOracle {
    PythOracle::new(sample_deployment(), Arc::new(StaticPriceSource::new(update)))
}

pub fn usdc_type() -> TypeTag {
    "0x5dc::usdc6::USDC6".parse().unwrap()
}

pub fn sample_spec(base: &str) -> MarketSpec {
    MarketSpec {
        base: Asset::new(base, format!("0x5e::base_assets::{base}").parse().unwrap()),
        quote: Asset::new("USDC", usdc_type()),
        price_feed_id: format!("0x{}", "ab".repeat(32)),
    }
}

pub fn sample_market() -> Market {
    let spec = sample_spec("BTC");
    Market {
        name: spec.name(),
        id: SuiAddress::new([0x42; 32]),
        base: spec.base,
        quote: spec.quote,
        decimals: 6,
        price_feed_id: spec.price_feed_id,
        price_info_object: SuiAddress::new([0x43; 32]),
    }
}
