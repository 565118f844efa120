//! Pyth Hermes price service client.
//!
//! Fetches signed accumulator updates that the on-chain Pyth package verifies
//! before refreshing a price feed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Magic prefix of an accumulator update ("PNAU").
const ACCUMULATOR_MAGIC: [u8; 4] = *b"PNAU";

/// Offset of the trailing-payload length byte in an accumulator update.
const TRAILING_SIZE_OFFSET: usize = 6;

/// Source of signed price updates keyed by feed id.
#[async_trait]
pub trait PriceUpdateSource: Send + Sync + std::fmt::Debug {
    /// Latest accumulator update covering `feed_id`.
    async fn latest_price_update(&self, feed_id: &str) -> Result<Vec<u8>>;
}

/// HTTP client for a Hermes endpoint.
#[derive(Clone)]
pub struct HermesClient {
    client: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for HermesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HermesClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct LatestUpdatesResponse {
    binary: BinaryUpdate,
}

#[derive(Debug, Deserialize)]
struct BinaryUpdate {
    encoding: String,
    data: Vec<String>,
}

impl HermesClient {
    /// Create a client for `base_url` (e.g. `https://hermes.pyth.network`).
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the latest updates for `feed_ids`, one decoded blob per returned entry.
    #[instrument(skip(self))]
    pub async fn latest_updates(&self, feed_ids: &[&str]) -> Result<Vec<Vec<u8>>> {
        let url = format!("{}/v2/updates/price/latest", self.base_url);
        let mut query: Vec<(&str, &str)> = feed_ids.iter().map(|id| ("ids[]", *id)).collect();
        query.push(("encoding", "base64"));

        let response = self.client.get(&url).query(&query).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Hermes API error: {} - {}", status, body);
        }

        let body: LatestUpdatesResponse = response.json().await?;
        if body.binary.encoding != "base64" {
            anyhow::bail!("Unexpected Hermes encoding: {}", body.binary.encoding);
        }

        let updates = body
            .binary
            .data
            .iter()
            .map(|blob| BASE64.decode(blob).context("Invalid base64 in Hermes response"))
            .collect::<Result<Vec<_>>>()?;

        debug!(feeds = feed_ids.len(), updates = updates.len(), "Fetched price updates");
        Ok(updates)
    }
}

#[async_trait]
impl PriceUpdateSource for HermesClient {
    async fn latest_price_update(&self, feed_id: &str) -> Result<Vec<u8>> {
        self.latest_updates(&[feed_id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Hermes returned no update for feed {}", feed_id))
    }
}

/// Extract the wormhole VAA embedded in an accumulator update.
///
/// Layout: magic(4) | major(1) | minor(1) | trailing_len(1) | trailing | proof_type(1) | vaa_len(u16 BE) | vaa
pub fn extract_vaa(update: &[u8]) -> Result<&[u8]> {
    if update.len() < 4 || update[..4] != ACCUMULATOR_MAGIC {
        anyhow::bail!("Not an accumulator update");
    }

    let trailing = *update
        .get(TRAILING_SIZE_OFFSET)
        .context("Accumulator update truncated before trailing size")? as usize;
    let size_offset = TRAILING_SIZE_OFFSET + 1 + trailing + 1;

    let size_bytes = update
        .get(size_offset..size_offset + 2)
        .context("Accumulator update truncated before VAA size")?;
    let vaa_len = u16::from_be_bytes([size_bytes[0], size_bytes[1]]) as usize;

    let start = size_offset + 2;
    update
        .get(start..start + vaa_len)
        .context("Accumulator update truncated inside VAA")
}
