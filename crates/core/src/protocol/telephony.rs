//! Twilio Media Streams frames.

use super::decode_frame;
use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Frames received from the telephony media stream.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyEvent {
    /// Sent once when the socket opens, before `start`.
    Connected,
    /// The stream has started; carries the stream identifier.
    Start { start: StreamStart },
    /// A chunk of caller audio (base64 mu-law, passed through untouched).
    Media { media: InboundMedia },
    /// The stream has ended.
    Stop,
    /// Acknowledgement of a previously sent mark.
    Mark,
    #[serde(other)]
    Unrecognized,
}

impl TelephonyEvent {
    /// Decodes a single text or binary frame.
    pub fn decode(frame: &[u8]) -> Result<Self, RelayError> {
        decode_frame(frame, "telephony")
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamStart {
    pub stream_sid: String,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct InboundMedia {
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Frames sent back to the telephony media stream.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyMessage {
    /// Agent audio to play to the caller.
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    /// Flush everything queued for playback (barge-in).
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

impl TelephonyMessage {
    pub fn media(stream_sid: impl Into<String>, payload: impl Into<String>) -> Self {
        TelephonyMessage::Media {
            stream_sid: stream_sid.into(),
            media: OutboundMedia {
                payload: payload.into(),
            },
        }
    }

    pub fn clear(stream_sid: impl Into<String>) -> Self {
        TelephonyMessage::Clear {
            stream_sid: stream_sid.into(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct OutboundMedia {
    pub payload: String,
}
