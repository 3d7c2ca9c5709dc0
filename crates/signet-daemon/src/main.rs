// SPDX-License-Identifier: MIT OR Apache-2.0
//! Signet daemon binary: load config, wire the pipeline, serve HTTP.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use signet_config::{ReservedConfig, SignetConfig};
use signet_daemon::{StateParts, build_app, build_state};
use signet_fallback::{HttpRepairProvider, RepairProvider};
use signet_hel::SystemResolver;
use signet_metering::{LogSink, metering_channel};
use signet_signer::SignetSigner;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "signet-daemon", about = "Verifiable exchange middleware")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, env = "SIGNET_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen address from the config.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => SignetConfig::load_from_path(path).context("load config")?,
        None => SignetConfig::default(),
    };
    signet_telemetry::init_tracing(config.log_level.as_deref());
    for warning in config.warnings() {
        warn!("config: {warning}");
    }

    let reserved = match &config.reserved_path {
        Some(path) => {
            ReservedConfig::load_from_path(path.as_ref()).context("load reserved config")?
        }
        None => ReservedConfig::default(),
    };

    let storage = signet_store::open_storage(&config.storage_dsn)
        .await
        .context("open storage")?;

    let signer = match &config.signing.private_key_hex {
        Some(seed) => SignetSigner::from_seed_hex(seed, config.signing.kid.clone())
            .context("load signing key")?,
        None => {
            warn!("no signing key configured; generating an ephemeral key");
            SignetSigner::generate(config.signing.kid.clone())
        }
    };

    let repair: Option<Arc<dyn RepairProvider>> = match &config.fallback.endpoint {
        Some(endpoint) => {
            let api_key = std::env::var(&config.fallback.api_key_env).unwrap_or_default();
            if api_key.is_empty() {
                warn!(
                    env = %config.fallback.api_key_env,
                    "repair provider configured without an API key"
                );
            }
            Some(Arc::new(HttpRepairProvider::new(
                endpoint.clone(),
                config.fallback.model.clone(),
                api_key,
            )))
        }
        None => None,
    };

    let (billing, flusher) =
        metering_channel(1024, Arc::new(LogSink), Duration::from_secs(30));
    let flusher_handle = tokio::spawn(flusher.run());

    let listen_addr = args
        .listen
        .clone()
        .unwrap_or_else(|| config.listen_addr.clone());
    let state = build_state(StateParts {
        config,
        reserved,
        config_path: args.config,
        storage,
        resolver: Arc::new(SystemResolver),
        repair,
        signer,
        billing,
    });
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("bind {listen_addr}"))?;
    info!(addr = %listen_addr, "signet daemon listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;

    // The router (and with it the billing buffer) is gone; wait for the
    // flusher to drain the final batch before exiting.
    flusher_handle.await.context("drain metering buffer")?;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
