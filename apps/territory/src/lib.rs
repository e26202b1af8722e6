#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use crate::{
    config::{Config, StoreDriver},
    copywriter::Copywriter,
    records::{HttpRecordStore, MemoryRecordStore, RecordStore},
    server::{AppState, build_router},
};

pub mod badge;
pub mod category;
pub mod config;
pub mod copywriter;
pub mod credit;
pub mod entitlement;
pub mod listing;
pub mod records;
pub mod reveal;
pub mod server;
pub mod web_maud;

pub fn build_state(config: Config) -> Result<AppState> {
    let store: Arc<dyn RecordStore> = match config.store_driver {
        StoreDriver::Memory => match config.memory_seed_path.as_deref() {
            Some(path) => Arc::new(MemoryRecordStore::from_seed_file(path)),
            None => Arc::new(MemoryRecordStore::default()),
        },
        StoreDriver::Airtable => Arc::new(
            HttpRecordStore::from_config(&config).context("configure airtable record store")?,
        ),
    };

    let copywriter = match Copywriter::from_config(&config) {
        Ok(copywriter) => copywriter,
        Err(error) => {
            tracing::warn!(
                target: "territory.copywriter",
                error = %error,
                "copywriter disabled",
            );
            Copywriter::disabled()
        }
    };
    info!(
        store_driver = config.store_driver.as_str(),
        listings_table = %config.listings_table,
        credits_table = %config.credits_table,
        copywriter_enabled = copywriter.is_enabled(),
        "territory state built"
    );
    Ok(AppState::new(config, store, copywriter))
}

pub fn build_app(config: Config) -> Result<axum::Router> {
    Ok(build_router(build_state(config)?))
}

pub async fn serve(config: Config) -> Result<()> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(
        service = %config.service_name,
        bind_addr = %config.bind_addr,
        "territory service listening"
    );
    axum::serve(listener, build_app(config)?).await?;
    Ok(())
}
