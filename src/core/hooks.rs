//! Hook traits for extensibility
//!
//! The relay only needs "give me a fresh upstream stream"; tests and embedders
//! can swap the TCP connector for anything that produces a duplex stream.

use async_trait::async_trait;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::{ProxyError, Result};

/// Duplex byte stream usable on either leg of a relay
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// Boxed upstream stream
pub type UpstreamStream = Pin<Box<dyn AsyncStream>>;

/// Opens one upstream connection per accepted client
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Connect once. No retry, no backoff.
    async fn connect(&self) -> Result<UpstreamStream>;

    /// Human readable target for logs
    fn target(&self) -> String;
}

/// Plain TCP connector to a fixed host:port
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    nodelay: bool,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            nodelay: true,
        }
    }

    /// Set TCP_NODELAY on new connections
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

#[async_trait]
impl UpstreamConnector for TcpConnector {
    async fn connect(&self) -> Result<UpstreamStream> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| ProxyError::UpstreamConnect(format!("{}: {}", self.target(), e)))?;
        if self.nodelay {
            let _ = stream.set_nodelay(true);
        }
        Ok(Box::pin(stream))
    }

    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
