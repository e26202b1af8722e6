use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::category::{normalize_area_key, normalize_category, normalize_country};
use crate::listing::{
    FIELD_ADDRESS, FIELD_BUSINESS_NAME, FIELD_CATEGORY, FIELD_COUNTRY, FIELD_PHONE, FIELD_RATING,
    FIELD_REVEAL_COPY, FIELD_REVIEW_COUNT, FIELD_STATUS, FIELD_WEBSITE, FIELD_ZIP, ListingStatus,
};
use crate::records::{Fields, RecordStore, StoreError};

/// Intake payload for a new listing. Any `status` the caller sends is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingDraft {
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: Option<u64>,
    #[serde(default)]
    pub reveal_copy: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OnboardReceipt {
    pub record_id: String,
    pub business_name: String,
    pub category: String,
    pub zip: String,
}

#[derive(Debug, thiserror::Error)]
pub enum OnboardError {
    #[error("{field} is required")]
    Validation { field: &'static str },
    #[error("listing write failed: {0}")]
    Store(#[from] StoreError),
}

/// Creates listing rows. Promotion out of Pending Payment happens elsewhere.
pub struct SlotLifecycle {
    store: Arc<dyn RecordStore>,
    table: String,
    default_country: String,
}

impl SlotLifecycle {
    pub fn new(
        store: Arc<dyn RecordStore>,
        table: impl Into<String>,
        default_country: impl Into<String>,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            default_country: default_country.into(),
        }
    }

    pub async fn onboard(&self, draft: ListingDraft) -> Result<OnboardReceipt, OnboardError> {
        let business_name = required(draft.business_name.as_deref(), "business_name")?;
        let category = normalize_category(required(draft.category.as_deref(), "category")?);
        if category.is_empty() {
            return Err(OnboardError::Validation { field: "category" });
        }
        let zip = normalize_area_key(required(draft.zip.as_deref(), "zip")?);
        let country = normalize_country(draft.country.as_deref(), &self.default_country);

        let mut fields = Fields::new();
        fields.insert(FIELD_BUSINESS_NAME.to_string(), json!(business_name));
        fields.insert(FIELD_CATEGORY.to_string(), json!(category));
        fields.insert(FIELD_ZIP.to_string(), json!(zip));
        fields.insert(FIELD_COUNTRY.to_string(), json!(country));
        fields.insert(
            FIELD_STATUS.to_string(),
            json!(ListingStatus::PendingPayment.as_str()),
        );
        insert_text(&mut fields, FIELD_ADDRESS, draft.address.as_deref());
        insert_text(&mut fields, FIELD_PHONE, draft.phone.as_deref());
        insert_text(&mut fields, FIELD_WEBSITE, draft.website.as_deref());
        insert_text(&mut fields, FIELD_REVEAL_COPY, draft.reveal_copy.as_deref());
        if let Some(rating) = draft.rating.filter(|rating| rating.is_finite()) {
            fields.insert(FIELD_RATING.to_string(), json!(rating));
        }
        if let Some(review_count) = draft.review_count {
            fields.insert(FIELD_REVIEW_COUNT.to_string(), Value::from(review_count));
        }

        let record = self.store.create(&self.table, fields).await?;
        tracing::info!(
            target: "territory.lifecycle",
            record_id = %record.id,
            category = %category,
            zip = %zip,
            country = %country,
            "listing onboarded as pending payment",
        );
        Ok(OnboardReceipt {
            record_id: record.id,
            business_name: business_name.to_string(),
            category,
            zip,
        })
    }
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, OnboardError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(OnboardError::Validation { field })
}

fn insert_text(fields: &mut Fields, key: &str, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) {
        fields.insert(key.to_string(), json!(value));
    }
}
