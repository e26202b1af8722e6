use std::sync::Arc;

use crate::category::normalize_category;
use crate::listing::Listing;

use super::resolver::{EntitlementResolver, ResolveError};

#[derive(Debug, Clone)]
pub enum ContentDecision {
    Allowed(Box<Listing>),
    Denied,
    Indeterminate(String),
}

/// Point-of-consumption entitlement check for badge and reveal content.
///
/// Nothing is cached: each call re-reads the store.
pub struct LiveGate {
    resolver: Arc<EntitlementResolver>,
}

impl LiveGate {
    pub fn new(resolver: Arc<EntitlementResolver>) -> Self {
        Self { resolver }
    }

    pub async fn authorize_content(
        &self,
        category: &str,
        area_key: &str,
        country: Option<&str>,
    ) -> ContentDecision {
        let mut matches = match self
            .resolver
            .active_matches(category, area_key, country, 2)
            .await
        {
            Ok(matches) => matches,
            Err(ResolveError::MissingInput(_)) => return ContentDecision::Denied,
            Err(ResolveError::QueryFailed(error)) => {
                return ContentDecision::Indeterminate(error.to_string());
            }
        };

        match matches.len() {
            0 => ContentDecision::Denied,
            1 => match matches.pop() {
                Some(listing) => ContentDecision::Allowed(Box::new(listing)),
                None => ContentDecision::Denied,
            },
            _ => {
                tracing::warn!(
                    target: "territory.entitlement",
                    category = %normalize_category(category),
                    zip = %area_key.trim(),
                    record_ids = ?matches.iter().map(|listing| listing.record_id.as_str()).collect::<Vec<_>>(),
                    "duplicate active listings for one slot; denying content",
                );
                ContentDecision::Denied
            }
        }
    }
}
