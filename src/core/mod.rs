//! Core proxy module
//!
//! This module contains the relay machinery:
//! - Wyoming event framing
//! - Transcript interception and throttling
//! - Bidirectional relay
//! - Upstream connector hook

pub mod codec;
pub mod hooks;
mod interceptor;
pub mod protocol;
mod relay;
mod server;
pub mod throttle;

pub use hooks::{TcpConnector, UpstreamConnector, UpstreamStream};
pub use interceptor::{RewriteOutcome, TranscriptInterceptor};
pub use protocol::{DecodeResult, Event, Frame, Transcript};
pub use relay::{Direction, PipeEnd, Relay, RelayOutcome, RelayState};
pub use server::{Server, ServerBuilder};
pub use throttle::{Throttle, ThrottleScope};
