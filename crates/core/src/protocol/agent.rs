//! ElevenLabs Conversational AI frames.

use super::decode_frame;
use crate::error::RelayError;
use serde::{Deserialize, Serialize, Serializer, ser::SerializeMap};

/// Opaque token the agent expects echoed back in a pong.
///
/// Kept as raw JSON so the reply carries the exact value and type received.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct EchoToken(pub serde_json::Value);

/// Frames received from the voice agent socket.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A chunk of synthesized agent speech.
    Audio { audio_event: AudioEvent },
    /// Keep-alive; must be answered with a pong.
    Ping { ping_event: PingEvent },
    /// The caller started talking over the agent.
    Interruption,
    ConversationInitiationMetadata {
        conversation_initiation_metadata_event: InitiationMetadata,
    },
    UserTranscript {
        user_transcription_event: UserTranscription,
    },
    AgentResponse {
        agent_response_event: AgentResponseEvent,
    },
    #[serde(other)]
    Unrecognized,
}

impl AgentEvent {
    /// Decodes a single text or binary frame.
    pub fn decode(frame: &[u8]) -> Result<Self, RelayError> {
        decode_frame(frame, "agent")
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AudioEvent {
    pub audio_base_64: String,
    #[serde(default)]
    pub event_id: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PingEvent {
    pub event_id: EchoToken,
    #[serde(default)]
    pub ping_ms: Option<u64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct InitiationMetadata {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub agent_output_audio_format: Option<String>,
    #[serde(default)]
    pub user_input_audio_format: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct UserTranscription {
    #[serde(default)]
    pub user_transcript: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AgentResponseEvent {
    #[serde(default)]
    pub agent_response: String,
}

/// Frames sent to the voice agent socket.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    /// Caller audio, serialized as `{"user_audio_chunk": ...}`.
    UserAudioChunk(String),
    /// Keep-alive reply, serialized as `{"type": "pong", "event_id": ...}`.
    Pong(EchoToken),
}

impl Serialize for AgentMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AgentMessage::UserAudioChunk(payload) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("user_audio_chunk", payload)?;
                map.end()
            }
            AgentMessage::Pong(token) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "pong")?;
                map.serialize_entry("event_id", token)?;
                map.end()
            }
        }
    }
}
