//! Manages the lifecycle of one relayed call, from upgrade to teardown.

use super::{SocketCommand, agent, agent::AgentLink, telephony, write_loop};
use crate::{handlers::ApiError, models::MediaStreamParams, state::AppState};
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use callbridge_core::{
    protocol::telephony::TelephonyMessage,
    session::{Action, CallSession, CallState, SessionInput, Side},
};
use futures_util::StreamExt;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{Instrument, Span, debug, info, instrument, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long sockets get to confirm closure before they are abandoned.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Everything the reader and connector tasks report to the driver.
pub(crate) enum DriverEvent {
    Input(SessionInput),
    AgentLinked(AgentLink),
}

/// Axum handler that upgrades a Twilio media stream into a relayed call.
///
/// The agent comes from the `agentId` query parameter, falling back to the
/// configured default.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<MediaStreamParams>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let agent_id = params
        .agent_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .or_else(|| state.config.default_agent_id.clone())
        .ok_or_else(|| ApiError::BadRequest("`agentId` is required".to_string()))?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, agent_id)))
}

/// Runs one call: spawns the socket tasks and the bootstrap, then drives the
/// state machine until both sockets are released.
#[instrument(name = "call", skip_all, fields(agent_id = %agent_id, stream_sid = tracing::field::Empty))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, agent_id: String) {
    info!("Telephony media stream connected.");

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (telephony_sink, telephony_stream) = socket.split();
    let (telephony_tx, telephony_rx) = mpsc::unbounded_channel();

    let telephony_writer = tokio::spawn(
        write_loop(telephony_sink, telephony_rx, Side::Telephony, telephony_frame)
            .in_current_span(),
    );
    let telephony_reader =
        tokio::spawn(telephony::read_loop(telephony_stream, events_tx.clone()).in_current_span());
    let connector = tokio::spawn(
        agent::run(
            state.signed_urls.clone(),
            agent_id.clone(),
            state.config.bootstrap_timeout,
            events_tx,
        )
        .in_current_span(),
    );

    let driver = SessionDriver {
        session: CallSession::new(agent_id, state.config.pending_audio_limit),
        telephony: telephony_tx,
        agent: None,
        connector,
        stream_sid_recorded: false,
    };
    let released = driver.run(events_rx).await;

    if !released {
        telephony_writer.abort();
    }
    telephony_reader.abort();
    info!("Call finished.");
}

fn telephony_frame(text: String) -> Message {
    Message::Text(text.into())
}

/// Owns the state machine of one call and carries out its actions.
struct SessionDriver {
    session: CallSession,
    telephony: mpsc::UnboundedSender<SocketCommand<TelephonyMessage>>,
    agent: Option<AgentLink>,
    /// Bootstrap, then the agent socket reader.
    connector: JoinHandle<()>,
    stream_sid_recorded: bool,
}

impl SessionDriver {
    /// Processes events until the call is closed.
    ///
    /// Returns `false` when the sockets had to be abandoned because they did
    /// not confirm closure within `CLOSE_GRACE`.
    async fn run(mut self, mut events: mpsc::Receiver<DriverEvent>) -> bool {
        let mut deadline: Option<Instant> = None;
        let released = loop {
            let grace = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        // Every reader is gone; nothing can close the call any more.
                        break self.session.is_closed();
                    };
                    let input = match event {
                        DriverEvent::Input(input) => input,
                        DriverEvent::AgentLinked(link) => {
                            self.agent = Some(link);
                            SessionInput::AgentConnected
                        }
                    };
                    for action in self.session.handle(input) {
                        self.execute(action);
                    }
                    self.record_stream_sid();

                    if self.session.is_closed() {
                        break true;
                    }
                    if self.session.state() == CallState::Closing && deadline.is_none() {
                        deadline = Some(Instant::now() + CLOSE_GRACE);
                    }
                }
                _ = grace => {
                    warn!("Sockets did not confirm closure in time; abandoning them.");
                    break false;
                }
            }
        };

        self.connector.abort();
        if let Some(link) = self.agent.take() {
            if released {
                link.release();
            } else {
                link.abort();
            }
        }
        released
    }

    fn execute(&mut self, action: Action) {
        match action {
            Action::SendTelephony(message) => self.command_telephony(SocketCommand::Send(message)),
            Action::SendAgent(message) => match &self.agent {
                Some(link) => link.send(message),
                None => warn!("No agent socket for outgoing frame; dropping it."),
            },
            Action::Close(Side::Telephony) => self.command_telephony(SocketCommand::Close),
            Action::Close(Side::Agent) => {
                if let Some(link) = &self.agent {
                    link.close();
                }
            }
            Action::CancelBootstrap => {
                debug!("Cancelling agent bootstrap.");
                self.connector.abort();
            }
        }
    }

    fn command_telephony(&self, command: SocketCommand<TelephonyMessage>) {
        if self.telephony.send(command).is_err() {
            debug!("Telephony writer is gone; dropping command.");
        }
    }

    fn record_stream_sid(&mut self) {
        if self.stream_sid_recorded {
            return;
        }
        if let Some(sid) = self.session.stream_sid() {
            Span::current().record("stream_sid", sid);
            self.stream_sid_recorded = true;
        }
    }
}
