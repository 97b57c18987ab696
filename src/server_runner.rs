//! Server startup and accept loop
//!
//! This module binds the listener and runs the connection accept loop until
//! shutdown is requested.

use crate::config;
use crate::core::Server;
use crate::handler::process_connection;
use crate::logger::log;

use anyhow::{Context, Result};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Resolve the listen address (host may be a name, e.g. "localhost")
fn resolve_listen_addr(config: &config::ServerConfig) -> Result<SocketAddr> {
    let addr = config.listen_addr();
    addr.to_socket_addrs()
        .with_context(|| format!("Invalid listen address: {}", addr))?
        .next()
        .with_context(|| format!("Listen address resolved to nothing: {}", addr))
}

/// Bind TCP listener with SO_REUSEADDR for fast restarts
pub fn bind_listener(config: &config::ServerConfig, tcp_backlog: i32) -> Result<TcpListener> {
    let socket_addr = resolve_listen_addr(config)?;
    let socket = socket2::Socket::new(
        match socket_addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;
    // Allow immediate rebind after restart (skip TIME_WAIT)
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket
        .bind(&socket_addr.into())
        .with_context(|| format!("Failed to bind {}", socket_addr))?;
    socket.listen(tcp_backlog)?;

    Ok(TcpListener::from_std(socket.into())?)
}

/// Accept connections until `shutdown` is cancelled
///
/// In-flight connections are not drained; they end with the runtime.
pub async fn serve(
    server: Arc<Server>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<()> {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => {
                log::info!("Shutdown requested, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                let peer_addr = addr.to_string();
                let server = Arc::clone(&server);

                tokio::spawn(async move {
                    // Set TCP_NODELAY for lower latency
                    if server.conn_config.tcp_nodelay {
                        let _ = stream.set_nodelay(true);
                    }

                    if let Err(e) = process_connection(&server, stream, &peer_addr).await {
                        log::debug!(peer = %peer_addr, error = %e, "Connection error");
                    }
                });
            }
            Err(e) => {
                log::error!(error = %e, "Failed to accept connection");
            }
        }
    }

    Ok(())
}

/// Bind the configured address and run the accept loop
pub async fn run_server(
    server: Arc<Server>,
    config: &config::ServerConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = bind_listener(config, server.conn_config.tcp_backlog)?;
    let local_addr = listener.local_addr()?;

    log::info!(
        address = %local_addr,
        upstream = %server.connector.target(),
        rules = %server.engine.path().display(),
        min_request_interval = ?server.conn_config.min_request_interval,
        throttle_scope = %server.conn_config.throttle_scope,
        "Server started"
    );

    serve(server, listener, shutdown).await
}
