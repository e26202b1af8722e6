use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8790";
const DEFAULT_SERVICE_NAME: &str = "territory-service";
const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_STORE_BASE_URL: &str = "https://api.airtable.com";
const DEFAULT_LISTINGS_TABLE: &str = "Listings";
const DEFAULT_CREDITS_TABLE: &str = "Credits";
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;
const MIN_STORE_TIMEOUT_MS: u64 = 100;
const MAX_STORE_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_COUNTRY: &str = "CA";
const DEFAULT_BADGE_ASSET_BASE_URL: &str = "/assets/badges";
const DEFAULT_SITE_NAME: &str = "Local Pick";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_COPYWRITER_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_COPYWRITER_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_COPYWRITER_MAX_TOKENS: u32 = 300;
const DEFAULT_COPYWRITER_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreDriver {
    Memory,
    Airtable,
}

impl StoreDriver {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Airtable => "airtable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub service_name: String,
    pub log_filter: String,
    pub log_format: LogFormat,
    pub store_driver: StoreDriver,
    pub store_base_url: String,
    pub store_base_id: Option<String>,
    pub store_api_token: Option<String>,
    pub listings_table: String,
    pub credits_table: String,
    pub store_timeout_ms: u64,
    pub memory_seed_path: Option<PathBuf>,
    pub default_country: String,
    pub badge_asset_base_url: String,
    pub site_name: String,
    pub request_timeout_ms: u64,
    pub copywriter_api_key: Option<String>,
    pub copywriter_model: String,
    pub copywriter_base_url: String,
    pub copywriter_max_tokens: u32,
    pub copywriter_timeout_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid TERRITORY_BIND_ADDR value '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid TERRITORY_STORE_DRIVER value '{0}' (expected memory or airtable)")]
    InvalidStoreDriver(String),
    #[error("invalid TERRITORY_LOG_FORMAT value '{0}' (expected text or json)")]
    InvalidLogFormat(String),
    #[error("invalid {key}: {message}")]
    InvalidNumber { key: &'static str, message: String },
    #[error("{0} is required when TERRITORY_STORE_DRIVER=airtable")]
    MissingStoreSetting(&'static str),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_addr_raw =
            non_empty("TERRITORY_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr_raw
            .parse()
            .map_err(|source| ConfigError::InvalidBindAddr {
                value: bind_addr_raw,
                source,
            })?;

        let service_name =
            non_empty("TERRITORY_SERVICE_NAME").unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());
        let log_filter =
            non_empty("TERRITORY_LOG_FILTER").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        let log_format = match non_empty("TERRITORY_LOG_FORMAT")
            .map(|value| value.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(ConfigError::InvalidLogFormat(other.to_string())),
        };

        let store_driver = match non_empty("TERRITORY_STORE_DRIVER")
            .map(|value| value.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("memory") => StoreDriver::Memory,
            Some("airtable") => StoreDriver::Airtable,
            Some(other) => return Err(ConfigError::InvalidStoreDriver(other.to_string())),
        };

        let store_base_url = non_empty("TERRITORY_STORE_BASE_URL")
            .unwrap_or_else(|| DEFAULT_STORE_BASE_URL.to_string());
        let store_base_id = non_empty("TERRITORY_STORE_BASE_ID");
        let store_api_token = non_empty("TERRITORY_STORE_API_TOKEN");
        if store_driver == StoreDriver::Airtable {
            if store_base_id.is_none() {
                return Err(ConfigError::MissingStoreSetting("TERRITORY_STORE_BASE_ID"));
            }
            if store_api_token.is_none() {
                return Err(ConfigError::MissingStoreSetting(
                    "TERRITORY_STORE_API_TOKEN",
                ));
            }
        }

        let listings_table = non_empty("TERRITORY_LISTINGS_TABLE")
            .unwrap_or_else(|| DEFAULT_LISTINGS_TABLE.to_string());
        let credits_table = non_empty("TERRITORY_CREDITS_TABLE")
            .unwrap_or_else(|| DEFAULT_CREDITS_TABLE.to_string());
        let store_timeout_ms = parse_u64(
            non_empty("TERRITORY_STORE_TIMEOUT_MS"),
            "TERRITORY_STORE_TIMEOUT_MS",
            DEFAULT_STORE_TIMEOUT_MS,
        )?
        .clamp(MIN_STORE_TIMEOUT_MS, MAX_STORE_TIMEOUT_MS);
        let memory_seed_path = non_empty("TERRITORY_MEMORY_SEED_PATH").map(PathBuf::from);

        let default_country = non_empty("TERRITORY_DEFAULT_COUNTRY")
            .map(|value| value.to_ascii_uppercase())
            .unwrap_or_else(|| DEFAULT_COUNTRY.to_string());
        let badge_asset_base_url = non_empty("TERRITORY_BADGE_ASSET_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BADGE_ASSET_BASE_URL.to_string());
        let site_name =
            non_empty("TERRITORY_SITE_NAME").unwrap_or_else(|| DEFAULT_SITE_NAME.to_string());
        let request_timeout_ms = parse_u64(
            non_empty("TERRITORY_REQUEST_TIMEOUT_MS"),
            "TERRITORY_REQUEST_TIMEOUT_MS",
            DEFAULT_REQUEST_TIMEOUT_MS,
        )?
        .max(1_000);

        let copywriter_api_key = non_empty("ANTHROPIC_API_KEY");
        let copywriter_model = non_empty("TERRITORY_COPYWRITER_MODEL")
            .unwrap_or_else(|| DEFAULT_COPYWRITER_MODEL.to_string());
        let copywriter_base_url = non_empty("TERRITORY_COPYWRITER_BASE_URL")
            .unwrap_or_else(|| DEFAULT_COPYWRITER_BASE_URL.to_string());
        let copywriter_max_tokens = parse_u64(
            non_empty("TERRITORY_COPYWRITER_MAX_TOKENS"),
            "TERRITORY_COPYWRITER_MAX_TOKENS",
            u64::from(DEFAULT_COPYWRITER_MAX_TOKENS),
        )?
        .clamp(16, 4_096) as u32;
        let copywriter_timeout_ms = parse_u64(
            non_empty("TERRITORY_COPYWRITER_TIMEOUT_MS"),
            "TERRITORY_COPYWRITER_TIMEOUT_MS",
            DEFAULT_COPYWRITER_TIMEOUT_MS,
        )?
        .clamp(250, 120_000);

        Ok(Self {
            bind_addr,
            service_name,
            log_filter,
            log_format,
            store_driver,
            store_base_url,
            store_base_id,
            store_api_token,
            listings_table,
            credits_table,
            store_timeout_ms,
            memory_seed_path,
            default_country,
            badge_asset_base_url,
            site_name,
            request_timeout_ms,
            copywriter_api_key,
            copywriter_model,
            copywriter_base_url,
            copywriter_max_tokens,
            copywriter_timeout_ms,
        })
    }

    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            log_filter: "debug".to_string(),
            log_format: LogFormat::Text,
            store_driver: StoreDriver::Memory,
            store_base_url: DEFAULT_STORE_BASE_URL.to_string(),
            store_base_id: None,
            store_api_token: None,
            listings_table: DEFAULT_LISTINGS_TABLE.to_string(),
            credits_table: DEFAULT_CREDITS_TABLE.to_string(),
            store_timeout_ms: 1_000,
            memory_seed_path: None,
            default_country: DEFAULT_COUNTRY.to_string(),
            badge_asset_base_url: "https://cdn.territory.test/badges".to_string(),
            site_name: DEFAULT_SITE_NAME.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            copywriter_api_key: None,
            copywriter_model: DEFAULT_COPYWRITER_MODEL.to_string(),
            copywriter_base_url: DEFAULT_COPYWRITER_BASE_URL.to_string(),
            copywriter_max_tokens: DEFAULT_COPYWRITER_MAX_TOKENS,
            copywriter_timeout_ms: 1_000,
        }
    }
}

fn parse_u64(raw: Option<String>, key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match raw {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|error| ConfigError::InvalidNumber {
                key,
                message: error.to_string(),
            }),
        None => Ok(default),
    }
}
