//! Scheduler-backed source discovery.
//!
//! Schedulers speak JSON-RPC 2.0 over plain HTTP. Each agent is bound to one
//! area; jobs are resolved against the first scheduler registered for it.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use super::{DiscoveryError, SourceDiscovery, SourceEndpoint};
use crate::http_client::build_api_client;

/// JSON-RPC method returning the download sources of an asset.
pub const GET_SOURCES_METHOD: &str = "titan.GetAssetSourceDownloadInfo";

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<AssetSourceDownloadInfo>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssetSourceDownloadInfo {
    #[serde(default)]
    source_list: Option<Vec<RawSource>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawSource {
    address: String,
    #[serde(default)]
    tk: Option<Value>,
}

impl RawSource {
    /// Tokens may arrive as strings or structured objects; objects are passed
    /// along as compact JSON.
    fn into_endpoint(self) -> SourceEndpoint {
        let token = match self.tk {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(token)) => token,
            Some(other) => other.to_string(),
        };
        SourceEndpoint::new(self.address, token)
    }
}

/// JSON-RPC client for a single scheduler.
#[derive(Debug)]
pub struct SchedulerClient {
    client: Client,
    url: String,
    access_token: String,
    next_id: AtomicU64,
}

impl SchedulerClient {
    /// Creates a client for the scheduler at `url`.
    ///
    /// `https` scheduler URLs are downgraded to `http`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Network`] if the HTTP client cannot be built.
    pub fn new(
        url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, DiscoveryError> {
        let url = normalize_scheduler_url(&url.into());
        let client = build_api_client().map_err(|e| DiscoveryError::network(url.clone(), e))?;
        Ok(Self::with_client(client, url, access_token))
    }

    /// Creates a client reusing an existing `reqwest` client.
    #[must_use]
    pub fn with_client(
        client: Client,
        url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            url: normalize_scheduler_url(&url.into()),
            access_token: access_token.into(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Scheduler endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Asks the scheduler which nodes can serve `cid`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] on transport failure, non-success status,
    /// JSON-RPC error, or undecodable payload.
    #[instrument(skip(self), fields(scheduler = %self.url))]
    pub async fn asset_source_download_info(
        &self,
        cid: &str,
    ) -> Result<Vec<SourceEndpoint>, DiscoveryError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": GET_SOURCES_METHOD,
            "params": [cid],
            "id": id,
        });

        let mut request = self.client.post(&self.url).json(&body);
        if !self.access_token.is_empty() {
            request = request.header(AUTHORIZATION, format!("Bearer {}", self.access_token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| DiscoveryError::network(self.url.clone(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::http_status(self.url.clone(), status.as_u16()));
        }

        let payload: RpcResponse = response
            .json()
            .await
            .map_err(|e| DiscoveryError::invalid_response(self.url.clone(), e.to_string()))?;

        if let Some(error) = payload.error {
            return Err(DiscoveryError::Rpc {
                url: self.url.clone(),
                code: error.code,
                message: error.message,
            });
        }

        let info = payload.result.ok_or_else(|| {
            DiscoveryError::invalid_response(self.url.clone(), "missing result")
        })?;

        let sources: Vec<SourceEndpoint> = info
            .source_list
            .unwrap_or_default()
            .into_iter()
            .map(RawSource::into_endpoint)
            .collect();

        debug!(cid, sources = sources.len(), "resolved download sources");
        Ok(sources)
    }
}

/// A scheduler registered for an area.
#[derive(Debug)]
pub struct Scheduler {
    /// Area the scheduler serves.
    pub area_id: String,
    /// RPC client.
    pub client: SchedulerClient,
}

impl Scheduler {
    /// Creates a scheduler entry.
    #[must_use]
    pub fn new(area_id: impl Into<String>, client: SchedulerClient) -> Self {
        Self {
            area_id: area_id.into(),
            client,
        }
    }
}

/// Known schedulers plus the area this agent serves.
#[derive(Debug)]
pub struct SchedulerDirectory {
    schedulers: Vec<Scheduler>,
    area_id: String,
}

impl SchedulerDirectory {
    /// Builds the directory.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::NoSchedulers`] when `schedulers` is empty.
    pub fn new(
        schedulers: Vec<Scheduler>,
        area_id: impl Into<String>,
    ) -> Result<Self, DiscoveryError> {
        if schedulers.is_empty() {
            return Err(DiscoveryError::NoSchedulers);
        }
        let area_id = area_id.into();
        info!(count = schedulers.len(), area_id = %area_id, "loaded schedulers");
        Ok(Self {
            schedulers,
            area_id,
        })
    }

    /// Area this agent is bound to.
    #[must_use]
    pub fn area_id(&self) -> &str {
        &self.area_id
    }

    /// Returns the first scheduler registered for the agent's area.
    #[must_use]
    pub fn scheduler_for_area(&self) -> Option<&Scheduler> {
        self.schedulers.iter().find(|s| s.area_id == self.area_id)
    }
}

#[async_trait]
impl SourceDiscovery for SchedulerDirectory {
    async fn source_list(&self, cid: &str) -> Result<Vec<SourceEndpoint>, DiscoveryError> {
        let scheduler = self
            .scheduler_for_area()
            .ok_or_else(|| DiscoveryError::no_scheduler(self.area_id.clone()))?;
        scheduler.client.asset_source_download_info(cid).await
    }
}

fn normalize_scheduler_url(url: &str) -> String {
    match url.strip_prefix("https://") {
        Some(rest) => format!("http://{rest}"),
        None => url.to_string(),
    }
}
