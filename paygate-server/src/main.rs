//! x402 paid API demo server.
//!
//! # Usage
//!
//! ```bash
//! EVM_PAY_TO=0x... EVM_FACILITATOR_URL=https://facilitator.example \
//! SOLANA_PAY_TO=... SOLANA_FACILITATOR_URL=https://facilitator.example \
//! cargo run -p paygate-server --release
//!
//! # Configure logging level
//! RUST_LOG=paygate=debug,info cargo run -p paygate-server
//! ```
//!
//! See [`paygate_server::config`] for every setting.

use std::sync::Arc;

use axum::http::Method;
use axum::http::header::{CONTENT_TYPE, HeaderName};
use paygate::nonce::spawn_sweeper;
use paygate_http::constants::{X_PAYMENT_HEADER, X_PAYMENT_RESPONSE_HEADER};
use paygate_server::{ServerConfig, app, build_gate};
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("paygate server failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load()?;
    tracing::info!(
        addr = %config.addr,
        base_url = ?config.base_url.as_ref().map(url::Url::as_str),
        evm_facilitator = %config.evm.facilitator_url,
        solana_facilitator = %config.solana.facilitator_url,
        "loaded configuration"
    );
    if config.base_url.is_none() {
        tracing::warn!("PAYGATE_BASE_URL not set; resource URLs will be derived from the Host header");
    }

    let gate = build_gate(&config)?;
    let sweeper = spawn_sweeper(Arc::clone(gate.nonces()), config.nonce_sweep_interval);

    let app = app(gate, config.base_url.clone())
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::HEAD, Method::POST])
                .allow_headers([
                    CONTENT_TYPE,
                    HeaderName::from_static("x-payment"),
                ])
                .expose_headers([HeaderName::from_static("x-payment-response")]),
        );

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(
        "paygate server listening on http://{}; payments travel in {X_PAYMENT_HEADER}, receipts in {X_PAYMENT_RESPONSE_HEADER}",
        config.addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("paygate server shut down gracefully");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        let sigterm = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!("failed to install SIGTERM handler: {e}");
                    std::future::pending::<()>().await;
                }
            }
        };
        tokio::select! {
            () = ctrl_c => tracing::info!("received Ctrl-C, shutting down"),
            () = sigterm => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        tracing::info!("received Ctrl-C, shutting down");
    }
}
