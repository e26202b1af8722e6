use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use territory_service::config::{Config, LogFormat};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "territory-service")]
#[command(about = "Territory exclusivity and live entitlement service")]
struct Args {
    /// Overrides TERRITORY_BIND_ADDR.
    #[arg(long)]
    bind_addr: Option<SocketAddr>,
    /// Overrides TERRITORY_LOG_FILTER when RUST_LOG is unset.
    #[arg(long)]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::from_env()?;
    if let Some(bind_addr) = args.bind_addr {
        config.bind_addr = bind_addr;
    }
    if let Some(log_filter) = args.log_filter {
        config.log_filter = log_filter;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    territory_service::serve(config).await
}
