use fpbridge::common::paths::sibling_helper_path;
use fpbridge::common::DataPaths;
use fpbridge::service::{build_router, FingerprintService};

use anyhow::Context as _;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "fpbridge-service")]
#[command(about = "Local HTTP service for the fingerprint bridge")]
struct Args {
    /// Run in development mode
    #[arg(long)]
    dev: bool,

    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(long)]
    host: Option<String>,

    /// Listen port, overrides the config file
    #[arg(long)]
    port: Option<u16>,

    /// Helper binary, overrides the config file
    #[arg(long)]
    helper: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let paths = DataPaths::new(args.dev);
    let mut config = paths
        .load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.service.host = host;
    }
    if let Some(port) = args.port {
        config.service.port = port;
    }

    setup_logging(args.dev, config.log_level());
    tracing::info!("Starting fpbridge service (dev_mode: {})", args.dev);

    let helper = match args.helper.or_else(|| config.service.helper_path.clone()) {
        Some(path) => path,
        None => sibling_helper_path().context("Failed to locate fingerprint helper")?,
    };

    let service = Arc::new(FingerprintService::from_config(&config, helper, args.config, args.dev));
    tracing::info!("Bridge mode: {:?}", service.mode().await);

    let app = build_router(service, &config.service.cors_origins);

    let addr = config.service.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("Service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown requested");
}

fn setup_logging(dev_mode: bool, level: tracing::Level) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(level)
            .init();
    }
}
