//! `payment-svc` — service binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (tracing + optional OTEL).
//! 3. Connect to the KMS named by `KEY_URI` and generate the first data key.
//! 4. Build the record store and the rotation coordinator.
//! 5. Build the Axum router and serve until Ctrl-C / SIGTERM.

mod config;
mod crypto;
mod keys;
mod kms;
mod payment;
mod rotation;
mod server;
mod store;
mod telemetry;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use config::Config;
use crypto::FieldCipher;
use keys::KeyProvider;
use payment::FieldCodec;
use rotation::RotationCoordinator;
use server::state::AppState;
use store::{MemoryBackend, UserRepository};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        rotate_data_key = cfg.rotate_data_key,
        "payment-svc starting"
    );

    // -----------------------------------------------------------------------
    // 3. Key material
    // -----------------------------------------------------------------------
    let keys = Arc::new(
        KeyProvider::connect(&cfg.key_uri, cfg.kms_endpoint_url.as_deref())
            .await
            .context("failed to initialise data key")?,
    );

    // -----------------------------------------------------------------------
    // 4. Record store and rotation
    // -----------------------------------------------------------------------
    let codec = FieldCodec::new(FieldCipher::new(keys.clone()));
    let users = UserRepository::new(Arc::new(MemoryBackend::new()), codec);
    let rotation = RotationCoordinator::new(users.clone(), keys, cfg.rotate_data_key);

    // -----------------------------------------------------------------------
    // 5. HTTP server
    // -----------------------------------------------------------------------
    let shutdown = CancellationToken::new();
    let state = AppState::new(users, rotation, shutdown.clone(), cfg.request_timeout());
    let router = server::router::build(state);

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(server::shutdown_signal(shutdown))
        .await
        .context("server error")?;

    info!("payment-svc stopped");
    telemetry::shutdown_telemetry();
    Ok(())
}
