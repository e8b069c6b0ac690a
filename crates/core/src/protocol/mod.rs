//! Wire formats for the two sockets of a relayed call.
//!
//! - `telephony`: Twilio Media Streams frames (the phone side).
//! - `agent`: ElevenLabs Conversational AI frames (the voice agent side).
//!
//! Each direction is a closed enum with an explicit `Unrecognized` arm, so
//! unknown tags decode successfully and are ignored by the session.

pub mod agent;
pub mod telephony;

use crate::error::RelayError;
use serde::de::DeserializeOwned;

/// Decodes one JSON frame, mapping any failure to a `ProtocolViolation`.
pub(crate) fn decode_frame<T: DeserializeOwned>(frame: &[u8], side: &str) -> Result<T, RelayError> {
    serde_json::from_slice(frame)
        .map_err(|e| RelayError::ProtocolViolation(format!("undecodable {} frame: {}", side, e)))
}

/// Best-effort lookup of a frame's tag, used only for diagnostics.
pub fn frame_tag(frame: &[u8], key: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(frame).ok()?;
    value.get(key)?.as_str().map(str::to_owned)
}
