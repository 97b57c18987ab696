//! Core proxy server state
//!
//! The Server struct holds everything relays share: the rule engine, the
//! upstream connector and the throttle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::hooks::UpstreamConnector;
use super::interceptor::TranscriptInterceptor;
use super::throttle::{Throttle, ThrottleScope};
use crate::config::ConnConfig;
use crate::rules::RuleEngine;

/// Core proxy server
pub struct Server {
    /// Rule engine shared by every connection
    pub engine: Arc<RuleEngine>,
    /// Upstream connector
    pub connector: Arc<dyn UpstreamConnector>,
    /// Process-wide throttle (only with `ThrottleScope::Global`)
    pub throttle: Option<Arc<Throttle>>,
    /// Connection performance configuration
    pub conn_config: ConnConfig,
    active: AtomicUsize,
}

impl Server {
    /// Create a new server builder
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Interceptor for one new connection.
    ///
    /// Global scope hands out the shared throttle, connection scope a fresh one.
    pub fn interceptor(&self) -> TranscriptInterceptor {
        let throttle = match self.conn_config.throttle_scope {
            ThrottleScope::Global => self.throttle.clone(),
            ThrottleScope::Connection => {
                Throttle::new(self.conn_config.min_request_interval).map(Arc::new)
            }
        };
        TranscriptInterceptor::new(Arc::clone(&self.engine), throttle)
    }

    /// Count a new connection, returning the active total
    pub fn connection_opened(&self) -> usize {
        self.active.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count a finished connection, returning the active total
    pub fn connection_closed(&self) -> usize {
        self.active.fetch_sub(1, Ordering::Relaxed).saturating_sub(1)
    }

    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

/// Builder for constructing a Server
#[derive(Default)]
pub struct ServerBuilder {
    engine: Option<Arc<RuleEngine>>,
    connector: Option<Arc<dyn UpstreamConnector>>,
    conn_config: Option<ConnConfig>,
}

impl ServerBuilder {
    /// Create a new server builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set rule engine
    pub fn engine(mut self, engine: Arc<RuleEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set upstream connector
    pub fn connector(mut self, connector: Arc<dyn UpstreamConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Set connection configuration
    pub fn conn_config(mut self, config: ConnConfig) -> Self {
        self.conn_config = Some(config);
        self
    }

    /// Build the server
    ///
    /// Panics if engine or connector is not set
    pub fn build(self) -> Server {
        let conn_config = self.conn_config.unwrap_or_default();
        let throttle = match conn_config.throttle_scope {
            ThrottleScope::Global => Throttle::new(conn_config.min_request_interval).map(Arc::new),
            ThrottleScope::Connection => None,
        };
        Server {
            engine: self.engine.expect("rule engine is required"),
            connector: self.connector.expect("upstream connector is required"),
            throttle,
            conn_config,
            active: AtomicUsize::new(0),
        }
    }
}
