//! Domain-specific error types for the scrcpy WebSocket client.
//!
//! All fallible operations return `Result<T, ScrcpyError>`.
//! Parsing failures are local to one message; only transport closure and
//! decoder unavailability end a session.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the client core.
#[derive(Debug, Error)]
pub enum ScrcpyError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// A message ended before a declared field or count could be read.
    #[error(
        "truncated {context}: needed {needed} bytes at offset {offset}, {available} available"
    )]
    TruncatedMessage {
        context: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A field held a value that cannot be valid (e.g. a negative count).
    #[error("malformed message: {0}")]
    MalformedMessage(&'static str),

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// A state transition or call order rule was broken.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// A caller-supplied argument is out of range for the wire format.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // ── Bitstream Errors ─────────────────────────────────────────
    /// A bit-level read ran past the end of its buffer.
    #[error("out of data: wanted {wanted} bits at bit {position}, {remaining} remaining")]
    OutOfData {
        wanted: u32,
        position: usize,
        remaining: usize,
    },

    /// An SPS could not be parsed; dimensions remain unknown.
    #[error("SPS parse failed: {0}")]
    ParseFailed(&'static str),

    // ── Decoder Errors ───────────────────────────────────────────
    /// The external decoder is missing or could not be (re)launched.
    #[error("decoder unavailable: {0}")]
    DecoderUnavailable(String),

    // ── Transport Errors ─────────────────────────────────────────
    /// The remote end closed the channel or the network failed.
    #[error("transport closed: {0}")]
    TransportClosed(String),

    /// The OS reported an I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Serialization Errors ─────────────────────────────────────
    /// JSON encoding of a snapshot failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl ScrcpyError {
    /// Whether this error ends the session.
    ///
    /// Everything else is logged and the offending message discarded.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::TransportClosed(_) | Self::DecoderUnavailable(_) | Self::ChannelClosed
        )
    }
}

// ── ReadFailure ───────────────────────────────────────────────────

/// Outcome of a decoder frame read that did not produce a full frame.
///
/// These are expected and bounded. They are counted toward the restart
/// threshold and never surfaced individually.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadFailure {
    /// No bytes arrived within the per-attempt timeout.
    #[error("decode timed out after {0:?}")]
    DecodeTimeout(Duration),

    /// Some bytes arrived but not a whole frame.
    #[error("short read: {received} of {expected} bytes")]
    ShortRead { received: usize, expected: usize },

    /// The decoder's output stream ended (process exited).
    #[error("decoder exited")]
    DecoderExited,
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for ScrcpyError {
    fn from(s: String) -> Self {
        ScrcpyError::Other(s)
    }
}

impl From<&str> for ScrcpyError {
    fn from(s: &str) -> Self {
        ScrcpyError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ScrcpyError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        ScrcpyError::ChannelClosed
    }
}

impl From<serde_json::Error> for ScrcpyError {
    fn from(e: serde_json::Error) -> Self {
        ScrcpyError::Encoding(e.to_string())
    }
}
