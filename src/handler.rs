//! Connection handling logic
//!
//! One accepted client maps to exactly one upstream connection. The handler
//! opens the upstream leg, runs the relay until either side ends and keeps the
//! active connection count in step on every exit path.

use crate::core::{PipeEnd, Relay, Server};
use crate::logger::log;

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};

/// Process a single client connection
pub async fn process_connection<C>(server: &Server, client: C, peer_addr: &str) -> Result<()>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    let active = server.connection_opened();
    log::connection(peer_addr, "connected", active);

    // Ensure the connection is counted out however the relay ends
    let _guard = scopeguard::guard((), |_| {
        let active = server.connection_closed();
        log::connection(peer_addr, "disconnected", active);
    });

    let conn_config = &server.conn_config;
    let interceptor = server.interceptor();
    let mut relay = Relay::new(
        peer_addr,
        &interceptor,
        conn_config.buffer_size,
        conn_config.max_event_size,
    );

    let upstream = match server.connector.connect().await {
        Ok(stream) => stream,
        Err(e) => {
            log::error!(
                peer = %peer_addr,
                upstream = %server.connector.target(),
                error = %e,
                "Upstream connect failed"
            );
            relay.abort(client).await;
            return Ok(());
        }
    };

    log::debug!(peer = %peer_addr, upstream = %server.connector.target(), "Upstream connected");

    let outcome = relay.run(client, upstream).await;
    match outcome.end {
        PipeEnd::Eof => {
            log::debug!(
                peer = %peer_addr,
                closed_by = %outcome.direction,
                to_upstream = outcome.to_upstream,
                to_client = outcome.to_client,
                "Relay completed"
            );
        }
        PipeEnd::Failed(e) => {
            log::debug!(
                peer = %peer_addr,
                failed = %outcome.direction,
                to_upstream = outcome.to_upstream,
                to_client = outcome.to_client,
                error = %e,
                "Relay ended with error"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnConfig;
    use crate::core::{TcpConnector, UpstreamConnector, UpstreamStream};
    use crate::error::ProxyError;
    use crate::rules::{Rule, RuleEngine, RuleSet};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    /// Hands out one pre-made duplex stream
    struct DuplexConnector {
        stream: Mutex<Option<DuplexStream>>,
    }

    #[async_trait]
    impl UpstreamConnector for DuplexConnector {
        async fn connect(&self) -> crate::error::Result<UpstreamStream> {
            let stream = self.stream.lock().unwrap().take();
            stream
                .map(|s| Box::pin(s) as UpstreamStream)
                .ok_or_else(|| ProxyError::UpstreamConnect("duplex: already used".to_string()))
        }

        fn target(&self) -> String {
            "duplex".to_string()
        }
    }

    fn server(connector: Arc<dyn UpstreamConnector>) -> Server {
        let engine = RuleEngine::with_rules(
            "/nonexistent/rules.yaml",
            RuleSet::new(vec![Rule::new(["turn off light"], "LIGHT_OFF")]),
        );
        Server::builder()
            .engine(Arc::new(engine))
            .connector(connector)
            .conn_config(ConnConfig::default())
            .build()
    }

    #[tokio::test]
    async fn test_upstream_connect_failure_closes_client() {
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let server = server(Arc::new(TcpConnector::new("127.0.0.1", port)));
        let (mut client, client_relay) = tokio::io::duplex(1024);

        process_connection(&server, client_relay, "test").await.unwrap();
        assert_eq!(server.active_connections(), 0);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_process_connection_relays_and_counts() {
        let (mut upstream, upstream_relay) = tokio::io::duplex(64 * 1024);
        let server = server(Arc::new(DuplexConnector {
            stream: Mutex::new(Some(upstream_relay)),
        }));
        let (mut client, client_relay) = tokio::io::duplex(64 * 1024);

        let handle = process_connection(&server, client_relay, "test");
        let driver = async {
            let data = "{\"text\":\"turn off light\",\"language\":\"en\"}";
            let event = format!(
                "{{\"type\":\"transcript\",\"data_length\":{}}}\n{}",
                data.len(),
                data
            );
            upstream.write_all(event.as_bytes()).await.unwrap();

            let mut header = vec![0u8; 1];
            let mut received = Vec::new();
            // read until the rewritten event has fully arrived
            while !String::from_utf8_lossy(&received).contains("LIGHT_OFF") {
                client.read_exact(&mut header).await.unwrap();
                received.push(header[0]);
            }
            assert_eq!(server.active_connections(), 1);

            client.shutdown().await.unwrap();
            let mut rest = Vec::new();
            tokio::time::timeout(Duration::from_secs(5), upstream.read_to_end(&mut rest))
                .await
                .expect("upstream was not closed")
                .unwrap();
        };

        let (result, ()) = tokio::join!(handle, driver);
        result.unwrap();
        assert_eq!(server.active_connections(), 0);
    }
}
