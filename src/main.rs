//! Wyoming STT rewrite proxy
//!
//! Architecture:
//! - `rules/`: Rule file loading, normalization and matching
//! - `core/`: Event framing, transcript interception and the relay
//! - `handler`: Connection processing logic
//! - `server_runner`: Server startup and accept loop

// Use mimalloc as the global allocator for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use wyoming_rewrite_proxy::config::{CliArgs, ConnConfig, ServerConfig};
use wyoming_rewrite_proxy::core::{Server, TcpConnector};
use wyoming_rewrite_proxy::logger::{self, log};
use wyoming_rewrite_proxy::rules::RuleEngine;
use wyoming_rewrite_proxy::server_runner;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = CliArgs::parse_args();
    cli.validate()?;

    // Initialize logger
    logger::init_logger(&cli.log_level);

    let server_config = ServerConfig::from_cli(&cli);
    let conn_config = ConnConfig::from_cli(&cli);

    log::info!(
        listen = %server_config.listen_addr(),
        upstream = %server_config.upstream_addr(),
        rules = %server_config.rules_file.display(),
        "Starting Wyoming rewrite proxy"
    );

    // A missing or broken rules file is not fatal; the proxy forwards normalized text
    let engine = Arc::new(RuleEngine::load(&server_config.rules_file).await);

    let connector = TcpConnector::new(&server_config.upstream_host, server_config.upstream_port)
        .with_nodelay(conn_config.tcp_nodelay);

    let server = Arc::new(
        Server::builder()
            .engine(engine)
            .connector(Arc::new(connector))
            .conn_config(conn_config)
            .build(),
    );

    // Setup graceful shutdown
    let shutdown = CancellationToken::new();
    let shutdown_trigger = shutdown.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT");
            let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM");

            tokio::select! {
                _ = sigint.recv() => {
                    log::info!("SIGINT received, shutting down...");
                }
                _ = sigterm.recv() => {
                    log::info!("SIGTERM received, shutting down...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.ok();
            log::info!("Shutdown signal received...");
        }

        shutdown_trigger.cancel();
    });

    // Run server
    server_runner::run_server(server, &server_config, shutdown).await
}
