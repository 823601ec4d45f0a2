//! HTTP implementation of the remote store against the backend REST API.

use crate::error::{Result, SyncError};
use crate::remote::RemoteStore;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use till_engine::{EntityKind, RecordData, Timestamp};

/// Remote store backed by the central backend's REST API.
#[derive(Clone)]
pub struct HttpRemoteStore {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpRemoteStore {
    /// Create a client for the given base URL. The URL must carry an
    /// explicit scheme; a trailing slash is tolerated.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let base_url = normalize_endpoint(base_url.into())?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SyncError::Connectivity(e.to_string()))?;
        Ok(Self {
            base_url,
            api_key,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, self.url(path))
            .header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let response = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .map_err(|e| SyncError::Connectivity(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::RemoteApi(parse_api_error(status, &body)));
        }
        response
            .json()
            .await
            .map_err(|e| SyncError::RemoteApi(e.to_string()))
    }

    async fn put_json(&self, path: &str, body: &Value) -> Result<()> {
        let response = self
            .request(reqwest::Method::PUT, path)
            .json(body)
            .send()
            .await
            .map_err(|e| SyncError::Connectivity(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::WriteRejected(parse_api_error(status, &body)));
        }
        Ok(())
    }

    fn parse_records(value: Value) -> Result<Vec<RecordData>> {
        let Value::Array(values) = value else {
            return Err(SyncError::RemoteApi("expected a JSON array".to_string()));
        };
        let mut records = Vec::with_capacity(values.len());
        for value in values {
            records.push(RecordData::from_wire(value)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn is_reachable(&self) -> bool {
        match self.request(reqwest::Method::GET, "health").send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn list_since(
        &self,
        kind: EntityKind,
        since: Option<Timestamp>,
    ) -> Result<Vec<RecordData>> {
        let path = match since {
            Some(since) => format!("{}?since={since}", kind.table_name()),
            None => kind.table_name().to_string(),
        };
        Self::parse_records(self.get_json(&path).await?)
    }

    async fn count_since(&self, kind: EntityKind, since: Option<Timestamp>) -> Result<u64> {
        let path = match since {
            Some(since) => format!("{}/count?since={since}", kind.table_name()),
            None => format!("{}/count", kind.table_name()),
        };
        let body: CountResponse = serde_json::from_value(self.get_json(&path).await?)
            .map_err(|e| SyncError::RemoteApi(e.to_string()))?;
        Ok(body.count)
    }

    async fn get_by_id(&self, kind: EntityKind, id: &str) -> Result<Option<RecordData>> {
        let path = format!("{}/{id}", kind.table_name());
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(|e| SyncError::Connectivity(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::RemoteApi(parse_api_error(status, &body)));
        }
        let value: Value = response
            .json()
            .await
            .map_err(|e| SyncError::RemoteApi(e.to_string()))?;
        Ok(Some(RecordData::from_wire(value)?))
    }

    async fn upsert(&self, kind: EntityKind, record: &RecordData) -> Result<()> {
        let path = format!("{}/{}", kind.table_name(), record.id);
        self.put_json(&path, &wire_payload(record)).await
    }

    async fn list_sale_items(&self, sale_id: &str) -> Result<Vec<RecordData>> {
        let path = format!("sales/{sale_id}/items");
        Self::parse_records(self.get_json(&path).await?)
    }

    async fn upsert_sale_items(&self, sale_id: &str, items: &[RecordData]) -> Result<()> {
        let path = format!("sales/{sale_id}/items");
        let body = Value::Array(items.iter().map(wire_payload).collect());
        self.put_json(&path, &body).await
    }
}

/// The outgoing wire shape: the flattened record with its remote copy
/// pre-marked as synced.
fn wire_payload(record: &RecordData) -> Value {
    let mut value = record.to_wire();
    if let Value::Object(object) = &mut value {
        object.insert(
            "sync_status".to_string(),
            Value::String("synced".to_string()),
        );
    }
    value
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> Result<String> {
    let endpoint = raw.trim();
    if endpoint.is_empty() {
        return Err(SyncError::Validation(
            "remote URL must not be empty".to_string(),
        ));
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(SyncError::Validation(
            "remote URL must include http:// or https://".to_string(),
        ))
    }
}
