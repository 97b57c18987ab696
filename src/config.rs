//! Configuration module for the rewrite proxy
//!
//! This module handles CLI argument parsing with environment variable support.
//! Rules live in their own YAML file and are reloaded at runtime; everything
//! here is fixed for the lifetime of the process.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::codec::{DEFAULT_BUFFER_SIZE, DEFAULT_MAX_EVENT_SIZE};
use crate::core::ThrottleScope;

/// Smallest accepted event size limit
const MIN_EVENT_SIZE: usize = 1024;

/// Parse interval string: plain milliseconds (e.g., "250") or humantime ("250ms", "1s")
fn parse_interval(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Plain numbers are milliseconds, matching the MIN_REQUEST_INTERVAL_MS contract
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }
    humantime::parse_duration(s).map_err(|_| {
        format!(
            "Invalid interval '{}'. Use plain milliseconds or formats like '250ms', '1s'",
            s
        )
    })
}

/// CLI arguments for the rewrite proxy
///
/// Every flag can also be set through its environment variable
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Wyoming STT relay that rewrites transcripts with hot-reloaded phrase rules"
)]
#[command(rename_all = "snake_case")]
pub struct CliArgs {
    /// Host address to listen on
    #[arg(long, env = "LISTEN_HOST", default_value = "0.0.0.0")]
    pub listen_host: String,

    /// Port to listen on
    #[arg(long, env = "LISTEN_PORT", default_value_t = 10301)]
    pub listen_port: u16,

    /// Upstream STT server host
    #[arg(long, env = "UPSTREAM_HOST", default_value = "host.docker.internal")]
    pub upstream_host: String,

    /// Upstream STT server port
    #[arg(long, env = "UPSTREAM_PORT", default_value_t = 10300)]
    pub upstream_port: u16,

    /// Rewrite rules file (.yaml), reloaded when its modification time changes
    #[arg(long, env = "RULES_FILE", default_value = "/app/rules.yaml")]
    pub rules_file: PathBuf,

    /// Minimum interval between transcript rewrites (plain ms or "250ms", "1s"; 0 disables)
    #[arg(long, env = "MIN_REQUEST_INTERVAL_MS", default_value = "0", value_parser = parse_interval)]
    pub min_request_interval: Duration,

    /// Throttle scope: one timestamp for the process or one per connection
    #[arg(long, env = "THROTTLE_SCOPE", value_enum, default_value_t = ThrottleScope::Global)]
    pub throttle_scope: ThrottleScope,

    /// Log level: trace, debug, info, warn, error (default: info)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    // ==================== Performance Tuning ====================
    /// Maximum size of one event in bytes, header + data + payload (default: 8MB)
    #[arg(long, env = "MAX_EVENT_SIZE", default_value_t = DEFAULT_MAX_EVENT_SIZE, help_heading = "Performance")]
    pub max_event_size: usize,

    /// Socket read chunk size in bytes (default: 32KB)
    #[arg(long, env = "BUFFER_SIZE", default_value_t = DEFAULT_BUFFER_SIZE, help_heading = "Performance")]
    pub buffer_size: usize,

    /// TCP listen backlog for pending connections (default: 1024)
    #[arg(
        long,
        env = "TCP_BACKLOG",
        default_value_t = 1024,
        help_heading = "Performance"
    )]
    pub tcp_backlog: i32,

    /// Enable TCP_NODELAY on both legs (default: true)
    #[arg(
        long,
        env = "TCP_NODELAY",
        default_value_t = true,
        help_heading = "Performance"
    )]
    pub tcp_nodelay: bool,
}

impl CliArgs {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the CLI arguments
    pub fn validate(&self) -> Result<()> {
        if self.listen_host.trim().is_empty() {
            return Err(anyhow!("Listen host is required"));
        }
        if self.upstream_host.trim().is_empty() {
            return Err(anyhow!("Upstream host is required"));
        }
        if self.upstream_port == 0 {
            return Err(anyhow!("Upstream port must be a positive integer"));
        }
        if self.rules_file.as_os_str().is_empty() {
            return Err(anyhow!("Rules file path is required"));
        }
        if self.buffer_size == 0 {
            return Err(anyhow!("buffer_size must be greater than 0"));
        }
        if self.max_event_size < MIN_EVENT_SIZE {
            return Err(anyhow!(
                "max_event_size must be at least {} bytes",
                MIN_EVENT_SIZE
            ));
        }

        Ok(())
    }
}

/// Connection performance configuration
#[derive(Debug, Clone, Copy)]
pub struct ConnConfig {
    /// Read chunk size for event readers
    pub buffer_size: usize,
    /// Maximum bytes of one event
    pub max_event_size: usize,
    /// TCP listen backlog
    pub tcp_backlog: i32,
    /// Enable TCP_NODELAY
    pub tcp_nodelay: bool,
    /// Minimum interval between rewrites, zero disables throttling
    pub min_request_interval: Duration,
    /// Throttle scope
    pub throttle_scope: ThrottleScope,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_event_size: DEFAULT_MAX_EVENT_SIZE,
            tcp_backlog: 1024,
            tcp_nodelay: true,
            min_request_interval: Duration::ZERO,
            throttle_scope: ThrottleScope::Global,
        }
    }
}

impl ConnConfig {
    /// Create from CLI args
    pub fn from_cli(cli: &CliArgs) -> Self {
        Self {
            buffer_size: cli.buffer_size,
            max_event_size: cli.max_event_size,
            tcp_backlog: cli.tcp_backlog,
            tcp_nodelay: cli.tcp_nodelay,
            min_request_interval: cli.min_request_interval,
            throttle_scope: cli.throttle_scope,
        }
    }
}

/// Runtime server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind
    pub host: String,
    /// Port number
    pub port: u16,
    /// Upstream host
    pub upstream_host: String,
    /// Upstream port
    pub upstream_port: u16,
    /// Rules file path
    pub rules_file: PathBuf,
}

impl ServerConfig {
    /// Build ServerConfig from CLI args
    pub fn from_cli(cli: &CliArgs) -> Self {
        Self {
            host: cli.listen_host.clone(),
            port: cli.listen_port,
            upstream_host: cli.upstream_host.clone(),
            upstream_port: cli.upstream_port,
            rules_file: cli.rules_file.clone(),
        }
    }

    /// Listen address as "host:port"
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Upstream address as "host:port"
    pub fn upstream_addr(&self) -> String {
        format!("{}:{}", self.upstream_host, self.upstream_port)
    }
}
