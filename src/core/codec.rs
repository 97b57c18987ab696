//! Async event reading and writing over a byte stream

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::protocol::{DecodeResult, Frame};
use crate::error::{ProxyError, Result};

/// Default read chunk size
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Default per-event size limit
pub const DEFAULT_MAX_EVENT_SIZE: usize = 8 * 1024 * 1024;

/// Reads whole frames from a stream, buffering partial events between calls.
///
/// `next_frame` is cancel-safe: bytes already read stay in the buffer.
pub struct EventReader<R> {
    inner: R,
    buf: BytesMut,
    buffer_size: usize,
    max_event_size: usize,
}

impl<R: AsyncRead + Unpin> EventReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_limits(inner, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_EVENT_SIZE)
    }

    pub fn with_limits(inner: R, buffer_size: usize, max_event_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(buffer_size),
            buffer_size,
            max_event_size,
        }
    }

    /// Read the next complete frame.
    ///
    /// Returns `Ok(None)` on a clean close between events. A close in the
    /// middle of an event is an error.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if !self.buf.is_empty() {
                if let DecodeResult::Ok(frame) = Frame::decode(&mut self.buf, self.max_event_size)? {
                    return Ok(Some(frame));
                }
            }

            self.buf.reserve(self.buffer_size);
            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(ProxyError::Protocol(format!(
                    "connection closed with incomplete event ({} bytes buffered)",
                    self.buf.len()
                )));
            }
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Write one frame and flush it
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> Result<()> {
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_reads_frames_then_eof() {
        let wire = b"{\"type\":\"a\"}\n{\"type\":\"b\",\"payload_length\":3}\nxyz".to_vec();
        let mut reader = EventReader::new(Cursor::new(wire));

        let a = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(a.kind(), "a");
        let b = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(b.kind(), "b");
        assert_eq!(b.as_bytes(), b"{\"type\":\"b\",\"payload_length\":3}\nxyz");
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_small_chunks_reassemble() {
        let (mut client, server) = tokio::io::duplex(4);
        let wire = b"{\"type\":\"transcript\",\"data\":{\"text\":\"hello world\"}}\n";

        let writer = tokio::spawn(async move {
            for chunk in wire.chunks(3) {
                client.write_all(chunk).await.unwrap();
            }
        });

        let mut reader = EventReader::with_limits(server, 2, 1024);
        let frame = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.as_bytes(), &wire[..]);
        writer.await.unwrap();
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_mid_event_is_error() {
        let mut reader = EventReader::new(Cursor::new(b"{\"type\":\"a\",\"data_len".to_vec()));
        assert!(matches!(
            reader.next_frame().await,
            Err(ProxyError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_event_is_error() {
        let wire = b"{\"type\":\"audio-chunk\",\"payload_length\":100000}\n".to_vec();
        let mut reader = EventReader::with_limits(Cursor::new(wire), 1024, 4096);
        assert!(matches!(
            reader.next_frame().await,
            Err(ProxyError::EventTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_write_frame_flushes_exact_bytes() {
        let wire = b"{\"type\":\"ping\"}\n".to_vec();
        let mut reader = EventReader::new(Cursor::new(wire.clone()));
        let frame = reader.next_frame().await.unwrap().unwrap();

        let mut out = Cursor::new(Vec::new());
        write_frame(&mut out, &frame).await.unwrap();
        assert_eq!(out.into_inner(), wire);
    }
}
