use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

mod filter;
mod http;
mod memory;

pub use filter::{Filter, fold_key};
pub use http::HttpRecordStore;
pub use memory::MemoryRecordStore;

pub type Fields = Map<String, Value>;

/// A row as the columnar store returns it: opaque id plus named fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
}

impl Record {
    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        match self.fields.get(field)? {
            Value::Number(number) => number.as_f64(),
            Value::String(raw) => raw.trim().parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record store transport error: {0}")]
    Transport(String),
    #[error("record store returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("record store response could not be decoded: {0}")]
    Decode(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("record store call exceeded {ms}ms")]
    Timeout { ms: u64 },
}

/// Minimal surface of the external key-columnar store.
///
/// Every method is a single suspend point from the caller's perspective and
/// is bounded by the store's configured timeout. Implementations never retry.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        max_records: usize,
    ) -> Result<Vec<Record>, StoreError>;

    async fn create(&self, table: &str, fields: Fields) -> Result<Record, StoreError>;

    async fn patch(&self, table: &str, id: &str, fields: Fields) -> Result<Record, StoreError>;

    /// Applies `fields` only while `guard_field` still equals `expected`.
    ///
    /// Returns `Ok(false)` without writing when the guard no longer holds.
    async fn patch_if(
        &self,
        table: &str,
        id: &str,
        guard_field: &str,
        expected: &Value,
        fields: Fields,
    ) -> Result<bool, StoreError>;
}

pub fn memory() -> Arc<MemoryRecordStore> {
    Arc::new(MemoryRecordStore::default())
}

pub(crate) async fn bounded<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Field equality as the store sees it: numbers compare by value so `1` and
/// `1.0` match, everything else compares structurally.
pub(crate) fn field_equals(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (Some(Value::Number(left)), Value::Number(right)) => left.as_f64() == right.as_f64(),
        (None | Some(Value::Null), Value::Null) => true,
        (Some(actual), expected) => actual == expected,
        (None, _) => false,
    }
}
