//! Chat line payload used by the `framecast` binary.
//!
//! The transport never interprets payloads; this is just one format that
//! rides on top of it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::MsgPackCodec;
use crate::error::Result;

/// One line typed by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLine {
    /// Who wrote it.
    pub nickname: String,
    /// What they wrote.
    pub text: String,
}

impl ChatLine {
    /// Create a chat line.
    pub fn new(nickname: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            text: text.into(),
        }
    }

    /// Encode as a frame payload.
    pub fn encode(&self) -> Result<Bytes> {
        MsgPackCodec::encode_bytes(self)
    }

    /// Decode a frame payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        MsgPackCodec::decode(payload)
    }

    /// `<nickname> text`
    pub fn render(&self) -> String {
        format!("<{}> {}", self.nickname, self.text)
    }
}

/// Render any received payload for the terminal.
///
/// Chat lines are shown as `<nickname> text`; anything else as lossy UTF-8.
pub fn render_payload(payload: &[u8]) -> String {
    match ChatLine::decode(payload) {
        Ok(line) => line.render(),
        Err(_) => format!("[raw] {}", String::from_utf8_lossy(payload)),
    }
}
