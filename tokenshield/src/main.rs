//! TokenShield core entry point.
//!
//! Wires the store, Key Manager (when KEK/DEK mode is selected), the
//! encryption façade, and the token engine, then runs the HTTP forwarder
//! and ICAP endpoint as two independent listeners sharing that engine,
//! per spec.md §2's dependency order.

use std::sync::Arc;

use rust_common::tracing_config::{init_tracing, TracingConfig};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use tokenshield::config::{Config, EncryptionMode};
use tokenshield::encryption::EncryptionFacade;
use tokenshield::http_forwarder::{self, ForwarderState};
use tokenshield::icap::{self, IcapState};
use tokenshield::key_manager::KeyManager;
use tokenshield::store::{PostgresStore, Store};
use tokenshield::token_engine::TokenEngine;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    config.validate()?;

    let tracing_config = TracingConfig::default()
        .with_service_name("tokenshield")
        .with_log_level(if config.debug_mode { "debug" } else { "info" })
        .with_json_output();
    init_tracing(&tracing_config);

    info!(
        http_port = config.http_port,
        icap_port = config.icap_port,
        token_format = ?config.token_format,
        encryption_mode = ?config.encryption_mode,
        "starting TokenShield core"
    );

    let store: Arc<dyn Store> = Arc::new(PostgresStore::connect(&config).await?);

    let facade = match config.encryption_mode {
        EncryptionMode::Legacy => EncryptionFacade::legacy(config.legacy_encryption_key),
        EncryptionMode::KekDek => {
            let key_manager = Arc::new(KeyManager::initialize(Arc::clone(&store)).await?);
            EncryptionFacade::envelope(key_manager)
        }
    };

    let engine = Arc::new(TokenEngine::new(store, facade, config.token_format));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let http_listener = TcpListener::bind(("0.0.0.0", config.http_port)).await?;
    let forwarder_state = Arc::new(ForwarderState::new(&config, Arc::clone(&engine))?);
    let http_router = http_forwarder::router(forwarder_state);
    info!(port = config.http_port, "HTTP forwarder listening");
    let http_server = tokio::spawn(async move {
        axum::serve(http_listener, http_router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    let icap_listener = TcpListener::bind(("0.0.0.0", config.icap_port)).await?;
    let icap_state = Arc::new(IcapState::new(Arc::clone(&engine), config.token_format));
    info!(port = config.icap_port, "ICAP endpoint listening");
    let icap_server = tokio::spawn(icap::serve(icap_listener, icap_state, shutdown_rx));

    shutdown_signal().await;
    info!("shutdown signal received, stopping listeners");
    let _ = shutdown_tx.send(true);

    if let Err(e) = http_server.await {
        error!(error = %e, "HTTP forwarder task panicked");
    }
    if let Err(e) = icap_server.await {
        error!(error = %e, "ICAP endpoint task panicked");
    }

    info!("TokenShield core stopped");
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM — whichever arrives first.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
