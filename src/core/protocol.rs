//! Wyoming event framing
//!
//! One event on the wire:
//! - JSON header line terminated by `\n` (`type`, optional `version`, `data`,
//!   `data_length`, `payload_length`)
//! - `data_length` bytes of JSON object (merged over the header's inline `data`)
//! - `payload_length` bytes of opaque payload
//!
//! Frames keep the exact bytes they were decoded from so pass-through is
//! byte-identical. Only `transcript` events are ever looked into.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{ProxyError, Result};

/// Event type of speech recognition results
pub const TRANSCRIPT_TYPE: &str = "transcript";

/// Version written on events built by the proxy when the original carried none
pub const PROTOCOL_VERSION: &str = "1.5.4";

/// Header line size limit, independent of the event size limit
pub const MAX_HEADER_LEN: usize = 64 * 1024;

/// Decode result for incremental parsing
#[derive(Debug)]
pub enum DecodeResult<T> {
    /// Successfully decoded
    Ok(T),
    /// Need more data
    NeedMoreData,
}

/// Parsed header line
#[derive(Debug, Clone, Deserialize)]
struct EventHeader {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    data: Option<Map<String, Value>>,
    #[serde(default)]
    data_length: Option<usize>,
    #[serde(default)]
    payload_length: Option<usize>,
}

/// One complete event exactly as read from the wire
#[derive(Debug, Clone)]
pub struct Frame {
    kind: String,
    version: Option<String>,
    inline_data: Option<Map<String, Value>>,
    header_len: usize,
    data_len: usize,
    raw: Bytes,
}

impl Frame {
    /// Try to take one complete frame off the front of `buf`.
    ///
    /// Leaves `buf` untouched on `NeedMoreData`. Errors are not recoverable:
    /// once framing is lost the stream cannot be resynchronized.
    pub fn decode(buf: &mut BytesMut, max_event_size: usize) -> Result<DecodeResult<Frame>> {
        let Some(newline) = buf.iter().position(|&b| b == b'\n') else {
            let limit = MAX_HEADER_LEN.min(max_event_size);
            if buf.len() > limit {
                return Err(ProxyError::EventTooLarge {
                    size: buf.len(),
                    limit,
                });
            }
            return Ok(DecodeResult::NeedMoreData);
        };

        let header_len = newline + 1;
        let header: EventHeader = serde_json::from_slice(&buf[..newline])
            .map_err(|e| ProxyError::Protocol(format!("invalid event header: {}", e)))?;

        let data_len = header.data_length.unwrap_or(0);
        let payload_len = header.payload_length.unwrap_or(0);
        let total = header_len
            .checked_add(data_len)
            .and_then(|n| n.checked_add(payload_len))
            .ok_or_else(|| ProxyError::Protocol("event length overflow".to_string()))?;

        if total > max_event_size {
            return Err(ProxyError::EventTooLarge {
                size: total,
                limit: max_event_size,
            });
        }
        if buf.len() < total {
            return Ok(DecodeResult::NeedMoreData);
        }

        let raw = buf.split_to(total).freeze();
        Ok(DecodeResult::Ok(Frame {
            kind: header.kind,
            version: header.version,
            inline_data: header.data,
            header_len,
            data_len,
            raw,
        }))
    }

    /// Type discriminator
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn is_transcript(&self) -> bool {
        self.kind == TRANSCRIPT_TYPE
    }

    /// Exact wire bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    fn data_section(&self) -> &[u8] {
        &self.raw[self.header_len..self.header_len + self.data_len]
    }

    fn payload(&self) -> Bytes {
        self.raw.slice(self.header_len + self.data_len..)
    }

    /// Inline header data overlaid with the data section
    fn merged_data(&self) -> Result<Map<String, Value>> {
        let mut data = self.inline_data.clone().unwrap_or_default();
        if self.data_len > 0 {
            let section: Map<String, Value> = serde_json::from_slice(self.data_section())?;
            data.extend(section);
        }
        Ok(data)
    }
}

/// Transcript text plus the rest of its data, decoded from a frame
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    data: Map<String, Value>,
    version: Option<String>,
    payload: Bytes,
}

impl Transcript {
    /// Decode the text payload of a `transcript` frame
    pub fn decode(frame: &Frame) -> Result<Self> {
        if !frame.is_transcript() {
            return Err(ProxyError::Protocol(format!(
                "expected transcript event, got '{}'",
                frame.kind()
            )));
        }

        let data = frame.merged_data()?;
        let text = match data.get("text") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) => String::new(),
            Some(other) => {
                return Err(ProxyError::Protocol(format!(
                    "transcript text is not a string: {}",
                    other
                )))
            }
            None => return Err(ProxyError::Protocol("transcript has no text".to_string())),
        };

        Ok(Self {
            text,
            data,
            version: frame.version.clone(),
            payload: frame.payload(),
        })
    }

    /// Any other field of the data object, e.g. `language`
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Build a transcript event carrying `text`; other data fields are kept
    pub fn encode_with_text(&self, text: &str) -> Result<Bytes> {
        let mut data = self.data.clone();
        data.insert("text".to_string(), Value::String(text.to_string()));
        let data_bytes = serde_json::to_vec(&data)?;

        let mut header = Map::new();
        header.insert("type".to_string(), Value::from(TRANSCRIPT_TYPE));
        header.insert(
            "version".to_string(),
            Value::from(self.version.as_deref().unwrap_or(PROTOCOL_VERSION)),
        );
        header.insert("data_length".to_string(), Value::from(data_bytes.len()));
        if !self.payload.is_empty() {
            header.insert("payload_length".to_string(), Value::from(self.payload.len()));
        }
        let header_bytes = serde_json::to_vec(&header)?;

        let mut buf =
            BytesMut::with_capacity(header_bytes.len() + 1 + data_bytes.len() + self.payload.len());
        buf.put_slice(&header_bytes);
        buf.put_u8(b'\n');
        buf.put_slice(&data_bytes);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Build a rewritten frame
    pub fn to_frame(&self, text: &str) -> Result<Frame> {
        let mut buf = BytesMut::from(&self.encode_with_text(text)?[..]);
        let limit = buf.len();
        match Frame::decode(&mut buf, limit)? {
            DecodeResult::Ok(frame) => Ok(frame),
            DecodeResult::NeedMoreData => Err(ProxyError::Protocol(
                "encoded transcript is incomplete".to_string(),
            )),
        }
    }
}

/// Events as seen by the relay: transcripts are decoded, everything else is opaque
#[derive(Debug, Clone)]
pub enum Event {
    /// A decodable transcript together with the frame it came from
    Transcript(Transcript, Frame),
    /// Any other event, or a transcript that failed to decode
    Passthrough(Frame),
}

impl Event {
    /// Classify a frame. Undecodable transcripts fall back to pass-through.
    pub fn from_frame(frame: Frame) -> (Self, Option<ProxyError>) {
        if !frame.is_transcript() {
            return (Event::Passthrough(frame), None);
        }
        match Transcript::decode(&frame) {
            Ok(transcript) => (Event::Transcript(transcript, frame), None),
            Err(e) => (Event::Passthrough(frame), Some(e)),
        }
    }
}
