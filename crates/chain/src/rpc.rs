//! Minimal JSON-RPC 2.0 client for a Sui full node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::error::ChainError;
use crate::types::{ObjectDigest, ObjectId, SuiAddress};

/// Default request timeout for node calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC client bound to one node endpoint.
pub struct SuiRpcClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl std::fmt::Debug for SuiRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiRpcClient").field("url", &self.url).finish()
    }
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl SuiRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue one request and decode its `result`.
    #[instrument(skip(self, params), level = "trace")]
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response: RpcResponse<T> = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            debug!(method, code = err.code, message = %err.message, "RPC error");
            return Err(ChainError::Rpc {
                method: method.to_string(),
                code: err.code,
                message: err.message,
            });
        }

        response
            .result
            .ok_or_else(|| ChainError::invalid_response(method, "missing result"))
    }

    pub async fn reference_gas_price(&self) -> Result<u64, ChainError> {
        let price: BigInt = self.call("suix_getReferenceGasPrice", json!([])).await?;
        Ok(price.0 as u64)
    }

    pub async fn get_object(&self, id: ObjectId) -> Result<ObjectData, ChainError> {
        let response: ObjectResponse = self
            .call(
                "sui_getObject",
                json!([id, { "showContent": true, "showOwner": true, "showType": true }]),
            )
            .await?;
        response.data.ok_or(ChainError::ObjectNotFound(id))
    }

    pub async fn get_dynamic_field_object(&self, parent: ObjectId, name: Value) -> Result<ObjectData, ChainError> {
        let response: ObjectResponse = self
            .call("suix_getDynamicFieldObject", json!([parent, name]))
            .await?;
        response.data.ok_or(ChainError::ObjectNotFound(parent))
    }

    /// Coins of `coin_type` owned by `owner`, following the page cursor until
    /// at least `limit` coins are collected or the last page is reached.
    pub async fn get_coins(&self, owner: SuiAddress, coin_type: &str, limit: usize) -> Result<Vec<Coin>, ChainError> {
        let mut coins = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page: CoinPage = self
                .call("suix_getCoins", json!([owner, coin_type, cursor, null]))
                .await?;
            coins.extend(page.data);
            match page.next_cursor {
                Some(next) if page.has_next_page && coins.len() < limit => cursor = Some(next),
                _ => break,
            }
        }
        Ok(coins)
    }
}

/// Integer that the node may send either as a JSON number or a decimal string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BigInt(pub i128);

impl<'de> Deserialize<'de> for BigInt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => s.parse().map(BigInt).map_err(de::Error::custom),
            Value::Number(n) => n
                .as_i64()
                .map(|v| BigInt(v as i128))
                .or_else(|| n.as_u64().map(|v| BigInt(v as i128)))
                .ok_or_else(|| de::Error::custom(format!("not an integer: {n}"))),
            other => Err(de::Error::custom(format!("expected integer, got {other}"))),
        }
    }
}

/// Object owner as reported by the node.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub enum Owner {
    AddressOwner(SuiAddress),
    ObjectOwner(SuiAddress),
    Shared { initial_shared_version: BigInt },
    Immutable,
    ConsensusAddressOwner { start_version: BigInt, owner: SuiAddress },
    #[serde(untagged)]
    Other(Value),
}

impl Owner {
    /// The account address when the owner is a plain address.
    pub fn address(&self) -> Option<SuiAddress> {
        match self {
            Owner::AddressOwner(addr) => Some(*addr),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ObjectResponse {
    data: Option<ObjectData>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectData {
    pub object_id: ObjectId,
    pub version: BigInt,
    pub digest: ObjectDigest,
    #[serde(rename = "type", default)]
    pub object_type: Option<String>,
    #[serde(default)]
    pub owner: Option<Owner>,
    #[serde(default)]
    pub content: Option<Value>,
}

impl ObjectData {
    /// `content.fields` of a Move object.
    pub fn fields(&self) -> Option<&Value> {
        self.content.as_ref()?.get("fields")
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coin {
    pub coin_object_id: ObjectId,
    pub version: BigInt,
    pub digest: ObjectDigest,
    pub balance: BigInt,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinPage {
    data: Vec<Coin>,
    #[serde(default)]
    next_cursor: Option<String>,
    #[serde(default)]
    has_next_page: bool,
}
