//! Duplex event relay with transcript interception
//!
//! Lifecycle of one connection: `Connecting -> Piping -> Closing -> Closed`.
//! Two pipes run concurrently while piping; whichever ends first (clean close
//! or error) cancels the other, then both streams are shut down.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use super::codec::{write_frame, EventReader};
use super::interceptor::TranscriptInterceptor;
use crate::error::{ProxyError, Result};
use crate::logger::log;

/// Relay lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Connecting,
    Piping,
    Closing,
    Closed,
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayState::Connecting => write!(f, "connecting"),
            RelayState::Piping => write!(f, "piping"),
            RelayState::Closing => write!(f, "closing"),
            RelayState::Closed => write!(f, "closed"),
        }
    }
}

/// Pipe direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client -> upstream, plain forwarding
    ClientToUpstream,
    /// Upstream -> client, through the interceptor
    UpstreamToClient,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::ClientToUpstream => write!(f, "client_to_upstream"),
            Direction::UpstreamToClient => write!(f, "upstream_to_client"),
        }
    }
}

/// How the first finished pipe ended
#[derive(Debug)]
pub enum PipeEnd {
    /// Reader reached a clean end of stream
    Eof,
    /// Read or write failed
    Failed(ProxyError),
}

/// Result of a finished relay
#[derive(Debug)]
pub struct RelayOutcome {
    /// The pipe that ended first and triggered teardown
    pub direction: Direction,
    pub end: PipeEnd,
    /// Events forwarded client -> upstream
    pub to_upstream: u64,
    /// Events forwarded upstream -> client
    pub to_client: u64,
}

/// One client connection bound to its upstream connection
pub struct Relay<'a> {
    peer: &'a str,
    state: RelayState,
    interceptor: &'a TranscriptInterceptor,
    buffer_size: usize,
    max_event_size: usize,
}

impl<'a> Relay<'a> {
    pub fn new(
        peer: &'a str,
        interceptor: &'a TranscriptInterceptor,
        buffer_size: usize,
        max_event_size: usize,
    ) -> Self {
        Self {
            peer,
            state: RelayState::Connecting,
            interceptor,
            buffer_size,
            max_event_size,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    fn transition(&mut self, next: RelayState) {
        log::trace!(peer = %self.peer, from = %self.state, to = %next, "Relay state");
        self.state = next;
    }

    /// Upstream connect failed: go straight to teardown of the client side
    pub async fn abort<C>(&mut self, mut client: C)
    where
        C: AsyncWrite + Unpin,
    {
        self.transition(RelayState::Closing);
        let _ = client.shutdown().await;
        self.transition(RelayState::Closed);
    }

    /// Pipe events both ways until either side ends, then close both streams.
    pub async fn run<C, U>(&mut self, client: C, upstream: U) -> RelayOutcome
    where
        C: AsyncRead + AsyncWrite + Unpin,
        U: AsyncRead + AsyncWrite + Unpin,
    {
        self.transition(RelayState::Piping);

        let (client_read, mut client_write) = tokio::io::split(client);
        let (upstream_read, mut upstream_write) = tokio::io::split(upstream);
        let mut client_events =
            EventReader::with_limits(client_read, self.buffer_size, self.max_event_size);
        let mut upstream_events =
            EventReader::with_limits(upstream_read, self.buffer_size, self.max_event_size);

        let mut to_upstream = 0u64;
        let mut to_client = 0u64;

        let (direction, end) = {
            let forward = pipe_forward(&mut client_events, &mut upstream_write, &mut to_upstream);
            let intercept = pipe_intercept(
                &mut upstream_events,
                &mut client_write,
                self.interceptor,
                &mut to_client,
            );

            // dropping the losing future cancels its in-flight read or write
            tokio::select! {
                end = forward => (Direction::ClientToUpstream, end),
                end = intercept => (Direction::UpstreamToClient, end),
            }
        };

        match &end {
            PipeEnd::Eof => {
                log::debug!(peer = %self.peer, direction = %direction, "Pipe closed")
            }
            PipeEnd::Failed(e) => {
                log::debug!(peer = %self.peer, direction = %direction, error = %e, "Pipe failed")
            }
        }

        self.transition(RelayState::Closing);
        // either stream may already be broken; close errors are not reported
        let _ = upstream_write.shutdown().await;
        let _ = client_write.shutdown().await;
        drop(upstream_events);
        drop(client_events);
        self.transition(RelayState::Closed);

        RelayOutcome {
            direction,
            end,
            to_upstream,
            to_client,
        }
    }
}

fn finish(result: Result<()>) -> PipeEnd {
    match result {
        Ok(()) => PipeEnd::Eof,
        Err(e) => PipeEnd::Failed(e),
    }
}

/// Client -> upstream: forward every event untouched
async fn pipe_forward<R, W>(reader: &mut EventReader<R>, writer: &mut W, count: &mut u64) -> PipeEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result: Result<()> = async {
        while let Some(frame) = reader.next_frame().await? {
            write_frame(writer, &frame).await?;
            *count += 1;
        }
        Ok(())
    }
    .await;
    finish(result)
}

/// Upstream -> client: transcripts go through the interceptor
async fn pipe_intercept<R, W>(
    reader: &mut EventReader<R>,
    writer: &mut W,
    interceptor: &TranscriptInterceptor,
    count: &mut u64,
) -> PipeEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result: Result<()> = async {
        while let Some(frame) = reader.next_frame().await? {
            let frame = interceptor.intercept(frame).await;
            write_frame(writer, &frame).await?;
            *count += 1;
        }
        Ok(())
    }
    .await;
    finish(result)
}
