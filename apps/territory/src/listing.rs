use serde::Serialize;

use crate::records::{Record, fold_key};

pub const FIELD_BUSINESS_NAME: &str = "Business Name";
pub const FIELD_CATEGORY: &str = "Category";
pub const FIELD_ZIP: &str = "Zip";
pub const FIELD_COUNTRY: &str = "Country";
pub const FIELD_STATUS: &str = "Status";
pub const FIELD_EXPIRY: &str = "Expiry";
pub const FIELD_ADDRESS: &str = "Address";
pub const FIELD_PHONE: &str = "Phone";
pub const FIELD_WEBSITE: &str = "Website";
pub const FIELD_RATING: &str = "Rating";
pub const FIELD_REVIEW_COUNT: &str = "Review Count";
pub const FIELD_REVEAL_COPY: &str = "Reveal Copy";

pub const FIELD_EMAIL: &str = "Email";
pub const FIELD_REMAINING_USES: &str = "Remaining Uses";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingStatus {
    Active,
    PendingPayment,
    Expired,
    Cancelled,
    Unknown(String),
}

impl ListingStatus {
    pub fn parse(raw: &str) -> Self {
        match fold_key(raw).as_str() {
            "active" => Self::Active,
            "pendingpayment" => Self::PendingPayment,
            "expired" => Self::Expired,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Unknown(raw.trim().to_string()),
        }
    }

    /// Wire value as stored in the Status column.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "Active",
            Self::PendingPayment => "Pending Payment",
            Self::Expired => "Expired",
            Self::Cancelled => "Cancelled",
            Self::Unknown(raw) => raw.as_str(),
        }
    }

    /// Whether a row in this state makes the slot unavailable to new sign-ups.
    pub fn occupies_slot(&self) -> bool {
        matches!(self, Self::Active | Self::PendingPayment)
    }

    /// Whether a row in this state may have its content served.
    pub fn entitles_content(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl Serialize for ListingStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Typed view over a listings-table row.
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub record_id: String,
    pub business_name: String,
    pub category: String,
    pub zip: String,
    pub country: Option<String>,
    pub status: ListingStatus,
    pub expiry: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u64>,
    pub reveal_copy: Option<String>,
}

impl Listing {
    pub fn from_record(record: &Record) -> Self {
        Self {
            record_id: record.id.clone(),
            business_name: owned(record.text(FIELD_BUSINESS_NAME)).unwrap_or_default(),
            category: owned(record.text(FIELD_CATEGORY)).unwrap_or_default(),
            zip: owned(record.text(FIELD_ZIP)).unwrap_or_default(),
            country: owned(record.text(FIELD_COUNTRY)),
            status: record
                .text(FIELD_STATUS)
                .map_or_else(|| ListingStatus::Unknown(String::new()), ListingStatus::parse),
            expiry: owned(record.text(FIELD_EXPIRY)),
            address: owned(record.text(FIELD_ADDRESS)),
            phone: owned(record.text(FIELD_PHONE)),
            website: owned(record.text(FIELD_WEBSITE)),
            rating: record.number(FIELD_RATING),
            review_count: record
                .number(FIELD_REVIEW_COUNT)
                .filter(|count| *count >= 0.0)
                .map(|count| count as u64),
            reveal_copy: owned(record.text(FIELD_REVEAL_COPY)),
        }
    }
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(ToString::to_string)
}
