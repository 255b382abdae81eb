use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use shared::{
    domain::RequestId,
    error::ApiError,
    protocol::{CreateRequest, RequestRecord, TransitionCommand},
};
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_API_PREFIX: &str = "/api";
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Where the request store and its event channel live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    server_url: String,
    api_prefix: String,
    ws_path: String,
}

impl Endpoints {
    pub fn new(server_url: &str, api_prefix: &str, ws_path: &str) -> Result<Self> {
        let parsed = Url::parse(server_url.trim())
            .with_context(|| format!("invalid server url: {server_url}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!("server_url must start with http:// or https://"));
        }
        Ok(Self {
            server_url: parsed.as_str().trim_end_matches('/').to_string(),
            api_prefix: normalize_path(api_prefix),
            ws_path: normalize_path(ws_path),
        })
    }

    pub fn with_defaults(server_url: &str) -> Result<Self> {
        Self::new(server_url, DEFAULT_API_PREFIX, DEFAULT_WS_PATH)
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn requests(&self) -> String {
        format!("{}{}/requests", self.server_url, self.api_prefix)
    }

    pub fn request(&self, id: RequestId) -> String {
        format!("{}/{}", self.requests(), id.0)
    }

    pub fn events(&self) -> String {
        let ws_base = if let Some(rest) = self.server_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.server_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.server_url.clone()
        };
        format!("{ws_base}{}", self.ws_path)
    }
}

fn normalize_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// The external store that persists and serves request records.
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn list_requests(&self) -> Result<Vec<RequestRecord>>;
    async fn patch_request(
        &self,
        id: RequestId,
        command: &TransitionCommand,
    ) -> Result<RequestRecord>;
    async fn create_request(&self, request: &CreateRequest) -> Result<RequestRecord>;
}

pub struct HttpRequestStore {
    http: Client,
    endpoints: Endpoints,
}

impl HttpRequestStore {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            http: Client::new(),
            endpoints,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

async fn ensure_success(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => Err(anyhow!("{status}: {api_error}")),
        Err(_) if body.trim().is_empty() => Err(anyhow!("{status}")),
        Err(_) => Err(anyhow!("{status}: {}", body.trim())),
    }
}

/// Decodes snapshot rows one by one so a single unreadable row does not
/// cost the whole board.
fn decode_snapshot_rows(rows: Vec<serde_json::Value>) -> Vec<RequestRecord> {
    let total = rows.len();
    let records: Vec<RequestRecord> = rows
        .into_iter()
        .filter_map(|row| {
            let id = row.get("id").cloned();
            match serde_json::from_value(row) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(id = ?id, error = %err, "transport: skipping undecodable snapshot row");
                    None
                }
            }
        })
        .collect();
    if records.len() < total {
        debug!(total, decoded = records.len(), "transport: snapshot partially decoded");
    }
    records
}

#[async_trait]
impl RequestStore for HttpRequestStore {
    async fn list_requests(&self) -> Result<Vec<RequestRecord>> {
        let url = self.endpoints.requests();
        let res = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let rows: Vec<serde_json::Value> = ensure_success(res)
            .await?
            .json()
            .await
            .context("decoding request snapshot")?;
        Ok(decode_snapshot_rows(rows))
    }

    async fn patch_request(
        &self,
        id: RequestId,
        command: &TransitionCommand,
    ) -> Result<RequestRecord> {
        let url = self.endpoints.request(id);
        let res = self
            .http
            .patch(&url)
            .json(command)
            .send()
            .await
            .with_context(|| format!("PATCH {url}"))?;
        let record = ensure_success(res)
            .await?
            .json()
            .await
            .with_context(|| format!("decoding updated request {id}"))?;
        Ok(record)
    }

    async fn create_request(&self, request: &CreateRequest) -> Result<RequestRecord> {
        let url = self.endpoints.requests();
        let res = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        let record = ensure_success(res)
            .await?
            .json()
            .await
            .context("decoding created request")?;
        Ok(record)
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
