//! Handles the WebSocket connection to the ElevenLabs conversational agent.

use super::{SocketCommand, session::DriverEvent, write_loop};
use callbridge_core::{
    RelayError,
    bootstrap::{SignedUrl, SignedUrlIssuer},
    protocol::{
        agent::{AgentEvent, AgentMessage},
        frame_tag,
    },
    session::{SessionInput, Side},
};
use futures_util::{StreamExt, stream::SplitStream};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, protocol::Message as WsMessage},
};
use tracing::{Instrument, debug, info, warn};

type AgentSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The driver's handle on an open agent socket.
pub(crate) struct AgentLink {
    commands: mpsc::UnboundedSender<SocketCommand<AgentMessage>>,
    writer: JoinHandle<()>,
}

impl AgentLink {
    pub(crate) fn send(&self, message: AgentMessage) {
        if self.commands.send(SocketCommand::Send(message)).is_err() {
            debug!("Agent writer is gone; dropping frame.");
        }
    }

    /// Requests a close. Repeated calls are harmless.
    pub(crate) fn close(&self) {
        let _ = self.commands.send(SocketCommand::Close);
    }

    /// Requests a close and detaches; the writer finishes the close on its own.
    pub(crate) fn release(self) {
        self.close();
    }

    /// Stops the writer immediately, dropping the socket half it owns.
    pub(crate) fn abort(self) {
        self.writer.abort();
    }
}

/// Bootstraps and opens the agent socket, then reads it for the rest of the call.
///
/// Every outcome is reported to the driver as a `SessionInput`; this task
/// never closes the telephony side itself.
pub(super) async fn run(
    signed_urls: Arc<dyn SignedUrlIssuer>,
    agent_id: String,
    handshake_timeout: Duration,
    events: mpsc::Sender<DriverEvent>,
) {
    let signed_url = match signed_urls.resolve(&agent_id).await {
        Ok(url) => url,
        Err(e) => {
            let _ = events
                .send(DriverEvent::Input(SessionInput::SetupFailed(e)))
                .await;
            return;
        }
    };
    if events
        .send(DriverEvent::Input(SessionInput::BootstrapResolved))
        .await
        .is_err()
    {
        return;
    }

    let socket = match connect(&signed_url, handshake_timeout).await {
        Ok(socket) => socket,
        Err(e) => {
            let _ = events
                .send(DriverEvent::Input(SessionInput::SetupFailed(e)))
                .await;
            return;
        }
    };
    info!("Connected to agent WebSocket.");

    let (sink, stream) = socket.split();
    let (commands, command_rx) = mpsc::unbounded_channel();
    let writer =
        tokio::spawn(write_loop(sink, command_rx, Side::Agent, agent_frame).in_current_span());

    // Linking before reading guarantees the driver sees the socket open
    // before any event that arrived on it.
    let link = AgentLink { commands, writer };
    if events.send(DriverEvent::AgentLinked(link)).await.is_err() {
        return;
    }
    read_loop(stream, events).await;
}

fn agent_frame(text: String) -> WsMessage {
    WsMessage::Text(text.into())
}

async fn connect(url: &SignedUrl, timeout: Duration) -> Result<AgentSocket, RelayError> {
    match tokio::time::timeout(timeout, connect_async(url.as_str())).await {
        Ok(Ok((socket, _response))) => Ok(socket),
        Ok(Err(e)) => Err(RelayError::UpstreamUnavailable(format!(
            "agent socket handshake failed: {}",
            e
        ))),
        Err(_) => Err(RelayError::UpstreamUnavailable(format!(
            "agent socket handshake timed out after {:?}",
            timeout
        ))),
    }
}

async fn read_loop(mut stream: SplitStream<AgentSocket>, events: mpsc::Sender<DriverEvent>) {
    let mut failure = None;
    while let Some(result) = stream.next().await {
        let message = match result {
            Ok(message) => message,
            Err(WsError::ConnectionClosed) => break,
            Err(e) => {
                failure = Some(RelayError::SocketError(e.to_string()));
                break;
            }
        };
        let decoded = match &message {
            WsMessage::Text(text) => decode(text.as_str().as_bytes()),
            WsMessage::Binary(data) => decode(data),
            WsMessage::Close(frame) => {
                debug!(?frame, "Agent sent a close frame.");
                break;
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
        };
        let event = match decoded {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                failure = Some(e);
                break;
            }
        };
        if events
            .send(DriverEvent::Input(SessionInput::Agent(event)))
            .await
            .is_err()
        {
            return;
        }
    }
    let closed = SessionInput::SocketClosed {
        side: Side::Agent,
        error: failure,
    };
    let _ = events.send(DriverEvent::Input(closed)).await;
}

fn decode(frame: &[u8]) -> Result<Option<AgentEvent>, RelayError> {
    match AgentEvent::decode(frame) {
        Ok(AgentEvent::Unrecognized) => {
            debug!(
                event_type = frame_tag(frame, "type").as_deref().unwrap_or("<none>"),
                "Ignoring unrecognized agent event."
            );
            Ok(None)
        }
        Ok(event) => Ok(Some(event)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(error = %e, "Dropping agent frame.");
            Ok(None)
        }
    }
}
