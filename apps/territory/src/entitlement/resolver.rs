use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::category::{normalize_area_key, normalize_category, normalize_country};
use crate::listing::{
    FIELD_CATEGORY, FIELD_COUNTRY, FIELD_STATUS, FIELD_ZIP, Listing, ListingStatus,
};
use crate::records::{Filter, RecordStore, StoreError};

/// Upper bound on rows pulled when enumerating every occupied slot of an area.
const AREA_SCAN_LIMIT: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("{0} is required")]
    MissingInput(&'static str),
    #[error("listing query failed: {0}")]
    QueryFailed(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Active or Pending Payment rows hold the slot.
    Availability,
    /// Only Active rows count.
    Entitlement,
}

impl QueryMode {
    fn admits(self, status: &ListingStatus) -> bool {
        match self {
            Self::Availability => status.occupies_slot(),
            Self::Entitlement => status.entitles_content(),
        }
    }

    fn status_filter(self) -> Filter {
        match self {
            Self::Availability => Filter::Any(vec![
                Filter::eq_key(FIELD_STATUS, ListingStatus::Active.as_str()),
                Filter::eq_key(FIELD_STATUS, ListingStatus::PendingPayment.as_str()),
            ]),
            Self::Entitlement => Filter::eq_key(FIELD_STATUS, ListingStatus::Active.as_str()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Holder {
    pub business_name: String,
    pub expiry: Option<String>,
    pub status: ListingStatus,
}

impl From<&Listing> for Holder {
    fn from(listing: &Listing) -> Self {
        Self {
            business_name: listing.business_name.clone(),
            expiry: listing.expiry.clone(),
            status: listing.status.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SlotState {
    Free,
    Held(Holder),
}

/// Answers who holds a (category, area, country) slot.
pub struct EntitlementResolver {
    store: Arc<dyn RecordStore>,
    table: String,
    default_country: String,
}

impl EntitlementResolver {
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

    pub fn default_country(&self) -> &str {
        &self.default_country
    }

    pub fn normalized_country(&self, country: Option<&str>) -> String {
        normalize_country(country, &self.default_country)
    }

    pub async fn resolve_slot(
        &self,
        category: &str,
        area_key: &str,
        country: Option<&str>,
    ) -> Result<SlotState, ResolveError> {
        let matches = self
            .matching(QueryMode::Availability, Some(category), area_key, country, 1)
            .await?;
        Ok(matches
            .first()
            .map_or(SlotState::Free, |listing| SlotState::Held(Holder::from(listing))))
    }

    /// Every occupied category in an area, first row per category wins.
    pub async fn occupied_slots(
        &self,
        area_key: &str,
        country: Option<&str>,
    ) -> Result<BTreeMap<String, Holder>, ResolveError> {
        let matches = self
            .matching(QueryMode::Availability, None, area_key, country, AREA_SCAN_LIMIT)
            .await?;
        let mut slots = BTreeMap::new();
        for listing in &matches {
            let category = normalize_category(&listing.category);
            if category.is_empty() {
                continue;
            }
            slots.entry(category).or_insert_with(|| Holder::from(listing));
        }
        Ok(slots)
    }

    /// The first Active listing for the slot, if any.
    pub async fn active_listing(
        &self,
        category: &str,
        area_key: &str,
        country: Option<&str>,
    ) -> Result<Option<Listing>, ResolveError> {
        let mut matches = self.active_matches(category, area_key, country, 1).await?;
        Ok(matches.pop())
    }

    pub async fn active_matches(
        &self,
        category: &str,
        area_key: &str,
        country: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Listing>, ResolveError> {
        self.matching(QueryMode::Entitlement, Some(category), area_key, country, limit)
            .await
    }

    async fn matching(
        &self,
        mode: QueryMode,
        category: Option<&str>,
        area_key: &str,
        country: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Listing>, ResolveError> {
        let area_key = normalize_area_key(area_key);
        if area_key.is_empty() {
            return Err(ResolveError::MissingInput("zip"));
        }
        let category = match category {
            Some(raw) => {
                let normalized = normalize_category(raw);
                if normalized.is_empty() {
                    return Err(ResolveError::MissingInput("category"));
                }
                Some(normalized)
            }
            None => None,
        };
        let country = self.normalized_country(country);

        let filter = slot_filter(
            mode,
            category.as_deref(),
            &area_key,
            &country,
            &self.default_country,
        );
        let records = self
            .store
            .select(&self.table, &filter, limit)
            .await
            .map_err(|error| {
                tracing::warn!(
                    target: "territory.entitlement",
                    table = %self.table,
                    zip = %area_key,
                    error = %error,
                    "listing query failed",
                );
                ResolveError::QueryFailed(error)
            })?;

        Ok(records
            .iter()
            .map(Listing::from_record)
            .filter(|listing| mode.admits(&listing.status))
            .collect())
    }
}

pub(crate) fn slot_filter(
    mode: QueryMode,
    category: Option<&str>,
    area_key: &str,
    country: &str,
    default_country: &str,
) -> Filter {
    let country_filter = if country.eq_ignore_ascii_case(default_country) {
        Filter::Any(vec![
            Filter::eq_ignore_case(FIELD_COUNTRY, country),
            Filter::blank(FIELD_COUNTRY),
        ])
    } else {
        Filter::eq_ignore_case(FIELD_COUNTRY, country)
    };

    let mut parts = vec![Filter::eq(FIELD_ZIP, area_key), country_filter, mode.status_filter()];
    if let Some(category) = category {
        parts.push(Filter::eq_ignore_case(FIELD_CATEGORY, category));
    }
    Filter::All(parts)
}
