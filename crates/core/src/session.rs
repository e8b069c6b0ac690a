//! Call Session state machine.
//!
//! `CallSession` owns the relay rules for one call and nothing else: it never
//! touches a socket. The runtime feeds it `SessionInput`s as they arrive from
//! either side and executes the `Action`s it returns, in order. This keeps
//! every transition synchronous and testable without any I/O.

use crate::error::RelayError;
use crate::protocol::{
    agent::{AgentEvent, AgentMessage},
    telephony::{TelephonyEvent, TelephonyMessage},
};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Default number of agent audio chunks held while the stream id is unknown.
pub const DEFAULT_PENDING_AUDIO_LIMIT: usize = 100;

/// Lifecycle of a relayed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Telephony socket accepted, bootstrap in flight.
    Idle,
    /// Bootstrap done; waiting for the agent socket and/or the stream start.
    AwaitingStreamStart,
    /// Both sockets open and the stream id known.
    Bridging,
    /// Teardown requested, waiting for sockets to confirm closure.
    Closing,
    /// Terminal.
    Closed,
}

/// One of the two sockets of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Telephony,
    Agent,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Telephony => write!(f, "telephony"),
            Side::Agent => write!(f, "agent"),
        }
    }
}

/// Everything that can happen to a call, in the order it was observed.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    /// The signed URL was issued; the agent socket is being opened.
    BootstrapResolved,
    /// The agent socket handshake completed.
    AgentConnected,
    /// Bootstrap or the agent socket handshake failed.
    SetupFailed(RelayError),
    Telephony(TelephonyEvent),
    Agent(AgentEvent),
    /// A socket closed, with the transport error if it did not close cleanly.
    SocketClosed {
        side: Side,
        error: Option<RelayError>,
    },
}

/// Side effects requested by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SendTelephony(TelephonyMessage),
    SendAgent(AgentMessage),
    /// Request a close; a no-op for sockets that are already gone.
    Close(Side),
    /// Abandon an agent connection that has not completed yet.
    CancelBootstrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketStatus {
    Pending,
    Open,
    CloseRequested,
    Closed,
}

/// Per-call counters, logged when the call ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub caller_chunks_forwarded: u64,
    pub caller_chunks_dropped: u64,
    pub agent_chunks_forwarded: u64,
    pub agent_chunks_dropped: u64,
    pub interruptions: u64,
    pub pings_answered: u64,
}

/// Relay rules for a single call.
#[derive(Debug)]
pub struct CallSession {
    agent_id: String,
    stream_sid: Option<String>,
    state: CallState,
    telephony: SocketStatus,
    agent: SocketStatus,
    pending_audio: VecDeque<String>,
    pending_limit: usize,
    stats: RelayStats,
}

impl CallSession {
    /// Creates a session for a freshly accepted telephony socket.
    ///
    /// # Arguments
    ///
    /// * `agent_id` - The agent persona this call talks to.
    /// * `pending_limit` - How many agent audio chunks to hold before the
    ///   stream id is known. Zero disables buffering.
    pub fn new(agent_id: impl Into<String>, pending_limit: usize) -> Self {
        Self {
            agent_id: agent_id.into(),
            stream_sid: None,
            state: CallState::Idle,
            telephony: SocketStatus::Open,
            agent: SocketStatus::Pending,
            pending_audio: VecDeque::new(),
            pending_limit,
            stats: RelayStats::default(),
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    #[cfg(test)]
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.stream_sid.as_deref()
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    #[cfg(test)]
    fn pending_audio_len(&self) -> usize {
        self.pending_audio.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state == CallState::Closed
    }

    fn is_tearing_down(&self) -> bool {
        matches!(self.state, CallState::Closing | CallState::Closed)
    }

    /// Applies one input and returns the side effects to perform, in order.
    pub fn handle(&mut self, input: SessionInput) -> Vec<Action> {
        // A late handshake must still be torn down, even after the call ended.
        if matches!(input, SessionInput::AgentConnected) && self.is_tearing_down() {
            debug!("Agent socket connected after teardown began; closing it.");
            return vec![Action::Close(Side::Agent)];
        }
        if self.is_closed() {
            debug!(?input, "Ignoring input for a closed call.");
            return Vec::new();
        }

        match input {
            SessionInput::BootstrapResolved => {
                if self.state == CallState::Idle {
                    self.state = CallState::AwaitingStreamStart;
                }
                Vec::new()
            }
            SessionInput::AgentConnected => {
                info!("Agent socket connected.");
                self.agent = SocketStatus::Open;
                self.state = if self.stream_sid.is_some() {
                    CallState::Bridging
                } else {
                    CallState::AwaitingStreamStart
                };
                Vec::new()
            }
            SessionInput::SetupFailed(err) => {
                error!(error = %err, "Agent connection setup failed.");
                self.agent = SocketStatus::Closed;
                self.begin_teardown()
            }
            SessionInput::Telephony(event) => self.on_telephony(event),
            SessionInput::Agent(event) => self.on_agent(event),
            SessionInput::SocketClosed { side, error } => self.on_socket_closed(side, error),
        }
    }

    fn on_telephony(&mut self, event: TelephonyEvent) -> Vec<Action> {
        match event {
            TelephonyEvent::Connected | TelephonyEvent::Mark => Vec::new(),
            TelephonyEvent::Start { start } => {
                if self.is_tearing_down() {
                    return Vec::new();
                }
                if let Some(current) = &self.stream_sid {
                    warn!(current = %current, ignored = %start.stream_sid, "Ignoring repeated stream start.");
                    return Vec::new();
                }
                info!(
                    stream_sid = %start.stream_sid,
                    call_sid = start.call_sid.as_deref().unwrap_or("-"),
                    "Telephony stream started."
                );
                let sid = start.stream_sid;
                let actions = self
                    .pending_audio
                    .drain(..)
                    .map(|payload| Action::SendTelephony(TelephonyMessage::media(sid.clone(), payload)))
                    .collect::<Vec<_>>();
                self.stats.agent_chunks_forwarded += actions.len() as u64;
                if !actions.is_empty() {
                    debug!(count = actions.len(), "Flushed buffered agent audio.");
                }
                self.stream_sid = Some(sid);
                if self.agent == SocketStatus::Open {
                    self.state = CallState::Bridging;
                }
                actions
            }
            TelephonyEvent::Media { media } => {
                if self.agent == SocketStatus::Open && !self.is_tearing_down() {
                    self.stats.caller_chunks_forwarded += 1;
                    vec![Action::SendAgent(AgentMessage::UserAudioChunk(media.payload))]
                } else {
                    self.stats.caller_chunks_dropped += 1;
                    if self.stats.caller_chunks_dropped == 1 {
                        debug!("Dropping caller audio: agent socket not open.");
                    }
                    Vec::new()
                }
            }
            TelephonyEvent::Stop => {
                info!("Telephony stream stopped.");
                self.begin_teardown()
            }
            TelephonyEvent::Unrecognized => {
                warn!("Ignoring unrecognized telephony event.");
                Vec::new()
            }
        }
    }

    fn on_agent(&mut self, event: AgentEvent) -> Vec<Action> {
        if self.is_tearing_down() {
            return Vec::new();
        }
        match event {
            AgentEvent::Audio { audio_event } => match &self.stream_sid {
                Some(sid) => {
                    self.stats.agent_chunks_forwarded += 1;
                    vec![Action::SendTelephony(TelephonyMessage::media(
                        sid.clone(),
                        audio_event.audio_base_64,
                    ))]
                }
                None => {
                    self.buffer_agent_audio(audio_event.audio_base_64);
                    Vec::new()
                }
            },
            AgentEvent::Ping { ping_event } => {
                self.stats.pings_answered += 1;
                vec![Action::SendAgent(AgentMessage::Pong(ping_event.event_id))]
            }
            AgentEvent::Interruption => {
                self.stats.interruptions += 1;
                match &self.stream_sid {
                    Some(sid) => vec![Action::SendTelephony(TelephonyMessage::clear(sid.clone()))],
                    None => {
                        let discarded = self.pending_audio.len();
                        self.pending_audio.clear();
                        debug!(discarded, "Interruption before stream start; discarded buffered audio.");
                        Vec::new()
                    }
                }
            }
            AgentEvent::ConversationInitiationMetadata {
                conversation_initiation_metadata_event: meta,
            } => {
                info!(
                    conversation_id = meta.conversation_id.as_deref().unwrap_or("-"),
                    output_format = meta.agent_output_audio_format.as_deref().unwrap_or("-"),
                    "Agent conversation initiated."
                );
                Vec::new()
            }
            AgentEvent::UserTranscript {
                user_transcription_event,
            } => {
                debug!(transcript = %user_transcription_event.user_transcript, "User transcript.");
                Vec::new()
            }
            AgentEvent::AgentResponse {
                agent_response_event,
            } => {
                debug!(response = %agent_response_event.agent_response, "Agent response.");
                Vec::new()
            }
            AgentEvent::Unrecognized => {
                debug!("Ignoring unrecognized agent event.");
                Vec::new()
            }
        }
    }

    /// Holds agent audio until the stream id is known, dropping the oldest
    /// chunk once the buffer is full.
    fn buffer_agent_audio(&mut self, payload: String) {
        if self.pending_limit == 0 {
            self.stats.agent_chunks_dropped += 1;
            return;
        }
        if self.pending_audio.len() >= self.pending_limit {
            self.pending_audio.pop_front();
            self.stats.agent_chunks_dropped += 1;
            warn!(
                limit = self.pending_limit,
                dropped = self.stats.agent_chunks_dropped,
                "Agent audio buffer full before stream start; dropped oldest chunk."
            );
        }
        self.pending_audio.push_back(payload);
    }

    fn on_socket_closed(&mut self, side: Side, error: Option<RelayError>) -> Vec<Action> {
        match &error {
            Some(err) => warn!(%side, error = %err, "Socket failed."),
            None => info!(%side, "Socket closed."),
        }
        match side {
            Side::Telephony => self.telephony = SocketStatus::Closed,
            Side::Agent => self.agent = SocketStatus::Closed,
        }
        if self.is_tearing_down() {
            self.finish_if_released();
            Vec::new()
        } else {
            self.begin_teardown()
        }
    }

    /// Moves to `Closing` and requests closure of every socket still open,
    /// the agent side first.
    fn begin_teardown(&mut self) -> Vec<Action> {
        if self.is_tearing_down() {
            return Vec::new();
        }
        self.state = CallState::Closing;
        self.pending_audio.clear();

        let mut actions = Vec::new();
        match self.agent {
            SocketStatus::Open => {
                self.agent = SocketStatus::CloseRequested;
                actions.push(Action::Close(Side::Agent));
            }
            SocketStatus::Pending => {
                self.agent = SocketStatus::Closed;
                actions.push(Action::CancelBootstrap);
            }
            SocketStatus::CloseRequested | SocketStatus::Closed => {}
        }
        if self.telephony == SocketStatus::Open {
            self.telephony = SocketStatus::CloseRequested;
            actions.push(Action::Close(Side::Telephony));
        }
        self.finish_if_released();
        actions
    }

    fn finish_if_released(&mut self) {
        if self.state == CallState::Closing
            && self.telephony == SocketStatus::Closed
            && self.agent == SocketStatus::Closed
        {
            self.state = CallState::Closed;
            let stats = self.stats;
            info!(
                agent_id = %self.agent_id,
                caller_forwarded = stats.caller_chunks_forwarded,
                caller_dropped = stats.caller_chunks_dropped,
                agent_forwarded = stats.agent_chunks_forwarded,
                agent_dropped = stats.agent_chunks_dropped,
                interruptions = stats.interruptions,
                pings_answered = stats.pings_answered,
                "Call closed."
            );
        }
    }
}
