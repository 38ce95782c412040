//! Error types for framecast.

use thiserror::Error;

/// Main error type for all framecast operations.
#[derive(Debug, Error)]
pub enum FramecastError {
    /// I/O error on the underlying stream (reset, broken pipe, ...).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// A length prefix declared more bytes than the receiver accepts.
    #[error("Frame of {declared} bytes exceeds maximum {max}")]
    FrameTooLarge {
        /// Length declared by the peer (or requested by the sender).
        declared: u64,
        /// Configured upper bound.
        max: u32,
    },

    /// Any other protocol violation.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection negotiation failed or timed out.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The session or its writer is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - per-session write queue full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,
}

impl FramecastError {
    /// Whether the error was raised by a peer violating the framing rules.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            FramecastError::FrameTooLarge { .. } | FramecastError::Protocol(_)
        )
    }
}

/// Result type alias using FramecastError.
pub type Result<T> = std::result::Result<T, FramecastError>;
