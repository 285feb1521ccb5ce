use anyhow::Result;
use axum::serve;
use server::create_app;
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vigil_core::{config::AppConfig, runtime::VigilRuntime};

/// Initializes the logging system based on the configuration.
///
/// `RUST_LOG` wins over `logging.level`; the shorthands `debug` and `trace` only raise
/// the vigil crates and keep dependencies at `warn`.
fn init_logging(config: &AppConfig) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(env_filter) if env_filter == "debug" || env_filter == "trace" => {
            EnvFilter::new(format!("warn,vigil_core={env_filter},server={env_filter},tests={env_filter}"))
        }
        Ok(_) => EnvFilter::try_from_env("RUST_LOG")
            .unwrap_or_else(|_| EnvFilter::new("warn,vigil_core=debug,server=debug")),
        Err(_) => {
            let level = &config.logging.level;
            EnvFilter::new(format!("warn,vigil_core={level},server={level}"))
        }
    };

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        // "pretty" and any other format default to pretty logging
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config =
        AppConfig::load().map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

    init_logging(&config);
    info!("Starting vigil validator");
    debug!(
        validator_id = ?config.node.validator_id,
        location = %config.node.location,
        targets = config.probe.targets.len(),
        gossip_peers = config.peers.gossip.len(),
        raft_peers = config.peers.raft.len(),
        bind_port = config.server.bind_port,
        "Configuration loaded"
    );

    let addr: SocketAddr = config.socket_addr().map_err(|e| anyhow::anyhow!(e))?;

    let runtime = Arc::new(
        VigilRuntime::builder()
            .with_config(config)
            .enable_prober()
            .enable_aggregator()
            .enable_raft()
            .build()
            .map_err(|e| anyhow::anyhow!("Runtime initialization failed: {e}"))?,
    );

    let app = create_app(runtime.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Vigil server listening");

    if let Err(e) = serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error occurred");
    }

    runtime.shutdown().await;
    info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");

                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
