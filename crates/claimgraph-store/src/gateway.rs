//! Remote gateway fallback.
//!
//! When a block is missing locally, retrieval may fetch it from an archival
//! gateway and import it into the local store. Requests are bounded by a
//! timeout; a timeout or non-success response fails the retrieval rather
//! than retrying indefinitely.

use std::time::Duration;

use async_trait::async_trait;
use claimgraph_model::{identify_bytes, Identifier};

use crate::{Block, ContentStore, StoreError};

/// Where and how to reach the archival gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the gateway, e.g. `http://127.0.0.1:8080`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP client for block fetches from the gateway.
pub struct GatewayClient {
    config: GatewayConfig,
    client: reqwest::Client,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Gateway(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// Fetch the raw bytes of one block.
    pub async fn fetch_block(&self, id: &Identifier) -> Result<Vec<u8>, StoreError> {
        let url = format!("{}/api/v0/block/get?arg={}", self.config.base_url, id);
        tracing::debug!(%id, url = %url, "fetching block from gateway");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::Gateway(e.to_string()))?;
        if !response.status().is_success() {
            return Err(StoreError::Gateway(format!(
                "unexpected response for {id}: {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StoreError::Gateway(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// A local store with a gateway behind it. `ensure_available` tries the local
/// store first, then fetches from the gateway and imports, verifying that the
/// fetched bytes hash to the requested identifier.
pub struct GatewayStore<S> {
    local: S,
    gateway: GatewayClient,
}

impl<S: ContentStore> GatewayStore<S> {
    pub fn new(local: S, gateway: GatewayClient) -> Self {
        Self { local, gateway }
    }

    pub fn local(&self) -> &S {
        &self.local
    }

    async fn import(&self, id: &Identifier) -> Result<Vec<u8>, StoreError> {
        tracing::warn!(%id, "block missing locally, falling back to gateway");
        let bytes = self.gateway.fetch_block(id).await?;
        if identify_bytes(&bytes) != *id {
            return Err(StoreError::DigestMismatch { id: id.clone() });
        }
        self.local.put_many(vec![(id.clone(), bytes.clone())]).await?;
        Ok(bytes)
    }
}

#[async_trait]
impl<S: ContentStore> ContentStore for GatewayStore<S> {
    async fn put(&self, bytes: Vec<u8>) -> Result<Identifier, StoreError> {
        self.local.put(bytes).await
    }

    async fn put_many(&self, blocks: Vec<Block>) -> Result<(), StoreError> {
        self.local.put_many(blocks).await
    }

    async fn get(&self, id: &Identifier) -> Result<Vec<u8>, StoreError> {
        match self.local.get(id).await {
            Ok(bytes) => Ok(bytes),
            Err(StoreError::NotFound(_)) => self.import(id).await,
            Err(other) => Err(other),
        }
    }

    async fn has(&self, id: &Identifier) -> bool {
        self.local.has(id).await
    }

    async fn ensure_available(&self, id: &Identifier) -> Result<(), StoreError> {
        if self.local.has(id).await {
            return Ok(());
        }
        self.import(id).await.map(|_| ())
    }
}
