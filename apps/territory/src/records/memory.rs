use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Fields, Filter, Record, RecordStore, StoreError, field_equals};

/// In-process record store used for local development and tests.
///
/// Tables are created lazily on first write. `patch_if` holds the table lock
/// across compare and write, so conditional updates are atomic here.
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: Mutex<MemoryRecordStoreInner>,
}

#[derive(Default)]
struct MemoryRecordStoreInner {
    tables: HashMap<String, Vec<Record>>,
    unavailable: bool,
}

#[derive(Debug, Deserialize)]
struct SeedRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    fields: Fields,
}

impl MemoryRecordStore {
    /// Boots from a JSON document of the shape `{"<table>": [{"fields": {..}}]}`.
    ///
    /// A missing or unreadable seed file yields an empty store.
    pub fn from_seed_file(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(value) => value,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    target: "territory.store",
                    path = %path.display(),
                    "memory seed file not found; booting with empty tables",
                );
                return Self::default();
            }
            Err(error) => {
                tracing::warn!(
                    target: "territory.store",
                    path = %path.display(),
                    error = %error,
                    "failed to read memory seed file; booting with empty tables",
                );
                return Self::default();
            }
        };

        let seed = match serde_json::from_str::<HashMap<String, Vec<SeedRecord>>>(&raw) {
            Ok(seed) => seed,
            Err(error) => {
                tracing::warn!(
                    target: "territory.store",
                    path = %path.display(),
                    error = %error,
                    "failed to parse memory seed file; booting with empty tables",
                );
                return Self::default();
            }
        };

        let tables = seed
            .into_iter()
            .map(|(table, rows)| {
                let rows = rows
                    .into_iter()
                    .map(|row| Record {
                        id: row.id.unwrap_or_else(next_record_id),
                        fields: row.fields,
                    })
                    .collect();
                (table, rows)
            })
            .collect::<HashMap<_, _>>();
        tracing::info!(
            target: "territory.store",
            path = %path.display(),
            tables = tables.len(),
            "memory store seeded",
        );
        Self {
            inner: Mutex::new(MemoryRecordStoreInner {
                tables,
                ..MemoryRecordStoreInner::default()
            }),
        }
    }

    /// Makes every subsequent call fail with a transport error.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().await.unavailable = unavailable;
    }

    pub async fn rows(&self, table: &str) -> Vec<Record> {
        self.inner
            .lock()
            .await
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    async fn guard(&self) -> Result<(), StoreError> {
        if self.inner.lock().await.unavailable {
            return Err(StoreError::Transport(
                "memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn select(
        &self,
        table: &str,
        filter: &Filter,
        max_records: usize,
    ) -> Result<Vec<Record>, StoreError> {
        self.guard().await?;
        let inner = self.inner.lock().await;
        let rows: Vec<Record> = inner
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| filter.matches(&row.fields))
                    .take(max_records)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn create(&self, table: &str, fields: Fields) -> Result<Record, StoreError> {
        self.guard().await?;
        let record = Record {
            id: next_record_id(),
            fields,
        };
        self.inner
            .lock()
            .await
            .tables
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn patch(&self, table: &str, id: &str, fields: Fields) -> Result<Record, StoreError> {
        self.guard().await?;
        let mut inner = self.inner.lock().await;
        let row = find_row(&mut inner, table, id)?;
        row.fields.extend(fields);
        Ok(row.clone())
    }

    async fn patch_if(
        &self,
        table: &str,
        id: &str,
        guard_field: &str,
        expected: &Value,
        fields: Fields,
    ) -> Result<bool, StoreError> {
        self.guard().await?;
        let mut inner = self.inner.lock().await;
        let row = find_row(&mut inner, table, id)?;
        if !field_equals(row.fields.get(guard_field), expected) {
            return Ok(false);
        }
        row.fields.extend(fields);
        Ok(true)
    }
}

fn find_row<'a>(
    inner: &'a mut MemoryRecordStoreInner,
    table: &str,
    id: &str,
) -> Result<&'a mut Record, StoreError> {
    inner
        .tables
        .get_mut(table)
        .and_then(|rows| rows.iter_mut().find(|row| row.id == id))
        .ok_or_else(|| StoreError::NotFound(format!("{table}/{id}")))
}

fn next_record_id() -> String {
    format!("rec{}", Uuid::new_v4().simple())
}
