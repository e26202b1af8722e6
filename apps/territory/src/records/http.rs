use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use super::{Fields, Filter, Record, RecordStore, StoreError, bounded, field_equals};
use crate::config::Config;

const MAX_PAGE_SIZE: usize = 100;
const WRITE_LOCK_STRIPES: usize = 64;

/// Airtable-compatible REST driver.
///
/// `patch_if` is a read-compare-write serialized per record within this
/// process. The REST API has no conditional update, so two service
/// instances can still interleave on the same row.
pub struct HttpRecordStore {
    client: reqwest::Client,
    base_url: Url,
    base_id: String,
    api_token: String,
    timeout: Duration,
    write_locks: Vec<Mutex<()>>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default)]
    offset: Option<String>,
}

impl HttpRecordStore {
    pub fn new(
        base_url: &str,
        base_id: impl Into<String>,
        api_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let base_url = Url::parse(base_url)
            .map_err(|error| StoreError::Transport(format!("invalid store base url: {error}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Transport(format!(
                "store base url cannot carry a path: {base_url}"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| StoreError::Transport(format!("client build failed: {error}")))?;
        Ok(Self {
            client,
            base_url,
            base_id: base_id.into(),
            api_token: api_token.into(),
            timeout,
            write_locks: (0..WRITE_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        let base_id = config
            .store_base_id
            .as_deref()
            .ok_or_else(|| StoreError::Transport("store base id is not configured".to_string()))?;
        let api_token = config
            .store_api_token
            .as_deref()
            .ok_or_else(|| StoreError::Transport("store api token is not configured".to_string()))?;
        Self::new(
            &config.store_base_url,
            base_id,
            api_token,
            Duration::from_millis(config.store_timeout_ms),
        )
    }

    fn table_url(&self, table: &str, record_id: Option<&str>) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                StoreError::Transport("store base url cannot carry a path".to_string())
            })?;
            segments.pop_if_empty().extend(["v0", self.base_id.as_str(), table]);
            if let Some(record_id) = record_id {
                segments.push(record_id);
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<Value, StoreError> {
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&self.api_token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                StoreError::Timeout {
                    ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                }
            } else {
                StoreError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(upstream_message(response).await));
        }
        if !status.is_success() {
            return Err(StoreError::Upstream {
                status: status.as_u16(),
                message: upstream_message(response).await,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|error| StoreError::Decode(error.to_string()))
    }

    async fn fetch(&self, table: &str, id: &str) -> Result<Record, StoreError> {
        let url = self.table_url(table, Some(id))?;
        let value = self.send(Method::GET, url, None).await?;
        decode_record(value)
    }

    fn write_lock(&self, table: &str, id: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        (table, id).hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.write_locks.len();
        &self.write_locks[index]
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        max_records: usize,
    ) -> Result<Vec<Record>, StoreError> {
        let formula = filter.to_formula();
        bounded(self.timeout, async {
            let mut records = Vec::new();
            let mut offset: Option<String> = None;
            loop {
                let mut url = self.table_url(table, None)?;
                {
                    let mut query = url.query_pairs_mut();
                    query
                        .append_pair("filterByFormula", &formula)
                        .append_pair("maxRecords", &max_records.to_string())
                        .append_pair("pageSize", &max_records.clamp(1, MAX_PAGE_SIZE).to_string());
                    if let Some(offset) = offset.as_deref() {
                        query.append_pair("offset", offset);
                    }
                }
                let value = self.send(Method::GET, url, None).await?;
                let page: ListResponse = serde_json::from_value(value)
                    .map_err(|error| StoreError::Decode(error.to_string()))?;
                records.extend(page.records);
                offset = page.offset;
                if offset.is_none() || records.len() >= max_records {
                    break;
                }
            }
            records.truncate(max_records);
            Ok::<_, StoreError>(records)
        })
        .await
    }

    async fn create(&self, table: &str, fields: Fields) -> Result<Record, StoreError> {
        bounded(self.timeout, async {
            let url = self.table_url(table, None)?;
            let value: Value = self
                .send(
                    Method::POST,
                    url,
                    Some(json!({ "fields": fields, "typecast": true })),
                )
                .await?;
            decode_record(value)
        })
        .await
    }

    async fn patch(&self, table: &str, id: &str, fields: Fields) -> Result<Record, StoreError> {
        bounded(self.timeout, async {
            let url = self.table_url(table, Some(id))?;
            let value = self
                .send(Method::PATCH, url, Some(json!({ "fields": fields })))
                .await?;
            decode_record(value)
        })
        .await
    }

    async fn patch_if(
        &self,
        table: &str,
        id: &str,
        guard_field: &str,
        expected: &Value,
        fields: Fields,
    ) -> Result<bool, StoreError> {
        bounded(self.timeout, async {
            let _guard = self.write_lock(table, id).lock().await;
            let current = self.fetch(table, id).await?;
            if !field_equals(current.fields.get(guard_field), expected) {
                return Ok::<bool, StoreError>(false);
            }
            let url = self.table_url(table, Some(id))?;
            self.send(Method::PATCH, url, Some(json!({ "fields": fields })))
                .await?;
            Ok(true)
        })
        .await
    }
}

fn decode_record(value: Value) -> Result<Record, StoreError> {
    serde_json::from_value(value).map_err(|error| StoreError::Decode(error.to_string()))
}

async fn upstream_message(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<Value>(&body).ok();
    let message = parsed.as_ref().and_then(|value| {
        let error = value.get("error")?;
        error
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| error.get("type").and_then(Value::as_str))
            .or_else(|| error.as_str())
            .map(ToString::to_string)
    });
    message.unwrap_or_else(|| format!("status {}", status.as_u16()))
}
