use std::sync::Arc;

use serde_json::Value;

use crate::listing::{FIELD_EMAIL, FIELD_REMAINING_USES};
use crate::records::{Fields, Filter, Record, RecordStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Denied,
    Indeterminate,
}

impl GateDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Denied => "denied",
            Self::Indeterminate => "indeterminate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseOutcome {
    Used { remaining: i64 },
    Denied,
    Indeterminate,
}

impl UseOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Used { .. })
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Used { .. } => "used",
            Self::Denied => "denied",
            Self::Indeterminate => "indeterminate",
        }
    }
}

/// Per-email usage credits guarding the search feature.
pub struct CreditGate {
    store: Arc<dyn RecordStore>,
    table: String,
}

impl CreditGate {
    pub fn new(store: Arc<dyn RecordStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    pub async fn check_credit(&self, email: &str) -> GateDecision {
        match self.account(email).await {
            Ok(Some((_, remaining))) if remaining > 0 => GateDecision::Allowed,
            Ok(_) => GateDecision::Denied,
            Err(error) => {
                tracing::warn!(
                    target: "territory.credit",
                    error = %error,
                    "credit lookup failed; denying",
                );
                GateDecision::Indeterminate
            }
        }
    }

    /// Decrements the counter by one, guarded on it still holding the value
    /// just read. A concurrent use that wins the race turns this call into a
    /// denial; there is no retry.
    pub async fn use_credit(&self, email: &str) -> UseOutcome {
        let (record, current) = match self.account(email).await {
            Ok(Some(account)) => account,
            Ok(None) => return UseOutcome::Denied,
            Err(error) => {
                tracing::warn!(
                    target: "territory.credit",
                    error = %error,
                    "credit lookup failed before use",
                );
                return UseOutcome::Indeterminate;
            }
        };
        if current <= 0 {
            return UseOutcome::Denied;
        }

        let remaining = current - 1;
        let stored = record
            .fields
            .get(FIELD_REMAINING_USES)
            .cloned()
            .unwrap_or(Value::Null);
        let mut fields = Fields::new();
        fields.insert(FIELD_REMAINING_USES.to_string(), Value::from(remaining));
        match self
            .store
            .patch_if(
                &self.table,
                &record.id,
                FIELD_REMAINING_USES,
                &stored,
                fields,
            )
            .await
        {
            Ok(true) => {
                tracing::info!(
                    target: "territory.credit",
                    record_id = %record.id,
                    remaining,
                    "credit used",
                );
                UseOutcome::Used { remaining }
            }
            Ok(false) => {
                tracing::info!(
                    target: "territory.credit",
                    record_id = %record.id,
                    "credit counter changed concurrently; denying",
                );
                UseOutcome::Denied
            }
            Err(error) => {
                tracing::warn!(
                    target: "territory.credit",
                    record_id = %record.id,
                    error = %error,
                    "credit decrement failed",
                );
                UseOutcome::Indeterminate
            }
        }
    }

    async fn account(&self, email: &str) -> Result<Option<(Record, i64)>, StoreError> {
        let email = email.trim();
        if email.is_empty() {
            return Ok(None);
        }
        let records = self
            .store
            .select(&self.table, &Filter::eq_ignore_case(FIELD_EMAIL, email), 1)
            .await?;
        Ok(records.into_iter().next().map(|record| {
            let remaining = record
                .number(FIELD_REMAINING_USES)
                .map_or(0, |value| value.floor() as i64);
            (record, remaining)
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{CreditGate, GateDecision, UseOutcome};
    use crate::records::{self, Fields, MemoryRecordStore, RecordStore};

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap_or_default()
    }

    async fn gate_with(remaining: i64) -> (Arc<MemoryRecordStore>, CreditGate) {
        let store = records::memory();
        store
            .create(
                "Credits",
                fields(json!({"Email": "Owner@Example.com", "Remaining Uses": remaining})),
            )
            .await
            .expect("seed");
        let gate = CreditGate::new(store.clone(), "Credits");
        (store, gate)
    }

    #[tokio::test]
    async fn last_credit_is_used_once() {
        let (store, gate) = gate_with(1).await;
        assert_eq!(gate.check_credit("owner@example.com").await, GateDecision::Allowed);
        assert_eq!(
            gate.use_credit("owner@example.com").await,
            UseOutcome::Used { remaining: 0 }
        );
        assert_eq!(gate.check_credit("owner@example.com").await, GateDecision::Denied);
        assert_eq!(gate.use_credit("owner@example.com").await, UseOutcome::Denied);
        let rows = store.rows("Credits").await;
        assert_eq!(rows[0].number("Remaining Uses"), Some(0.0));
    }

    #[tokio::test]
    async fn text_and_fractional_counters_can_be_used() {
        let store = records::memory();
        for row in [
            json!({"Email": "text@example.com", "Remaining Uses": "3"}),
            json!({"Email": "half@example.com", "Remaining Uses": 2.5}),
        ] {
            store.create("Credits", fields(row)).await.expect("seed");
        }
        let gate = CreditGate::new(store.clone(), "Credits");

        assert_eq!(gate.check_credit("text@example.com").await, GateDecision::Allowed);
        assert_eq!(
            gate.use_credit("text@example.com").await,
            UseOutcome::Used { remaining: 2 }
        );
        assert_eq!(
            gate.use_credit("text@example.com").await,
            UseOutcome::Used { remaining: 1 }
        );
        assert_eq!(
            gate.use_credit("half@example.com").await,
            UseOutcome::Used { remaining: 1 }
        );
        let rows = store.rows("Credits").await;
        assert_eq!(rows[0].number("Remaining Uses"), Some(1.0));
        assert_eq!(rows[1].number("Remaining Uses"), Some(1.0));
    }

    #[tokio::test]
    async fn unknown_identity_is_denied() {
        let (_store, gate) = gate_with(3).await;
        assert_eq!(gate.check_credit("stranger@example.com").await, GateDecision::Denied);
        assert_eq!(gate.check_credit("  ").await, GateDecision::Denied);
        assert_eq!(gate.use_credit("stranger@example.com").await, UseOutcome::Denied);
    }

    #[tokio::test]
    async fn concurrent_uses_never_overdraw() {
        let (store, gate) = gate_with(1).await;
        let gate = Arc::new(gate);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.use_credit("owner@example.com").await })
            })
            .collect();
        let mut used = 0;
        for handle in handles {
            if handle.await.expect("join").is_success() {
                used += 1;
            }
        }
        assert_eq!(used, 1);
        let rows = store.rows("Credits").await;
        assert_eq!(rows[0].number("Remaining Uses"), Some(0.0));
    }

    #[tokio::test]
    async fn store_fault_is_indeterminate_not_allowed() {
        let (store, gate) = gate_with(5).await;
        store.set_unavailable(true).await;
        let decision = gate.check_credit("owner@example.com").await;
        assert_eq!(decision, GateDecision::Indeterminate);
        assert!(!decision.is_allowed());
        assert_eq!(gate.use_credit("owner@example.com").await, UseOutcome::Indeterminate);
    }
}
