//! Reader for the Twilio media stream socket.

use super::session::DriverEvent;
use axum::extract::ws::{Message, WebSocket};
use callbridge_core::{
    RelayError,
    protocol::{frame_tag, telephony::TelephonyEvent},
    session::{SessionInput, Side},
};
use futures_util::{StreamExt, stream::SplitStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Forwards decoded telephony events to the driver until the socket ends,
/// then reports the closure (with the transport error, if any).
pub(super) async fn read_loop(mut stream: SplitStream<WebSocket>, events: mpsc::Sender<DriverEvent>) {
    let mut failure = None;
    while let Some(result) = stream.next().await {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                failure = Some(RelayError::SocketError(e.to_string()));
                break;
            }
        };
        let decoded = match &message {
            Message::Text(text) => decode(text.as_str().as_bytes()),
            Message::Binary(data) => decode(data),
            Message::Close(frame) => {
                debug!(?frame, "Telephony sent a close frame.");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        let event = match decoded {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                failure = Some(e);
                break;
            }
        };
        let input = SessionInput::Telephony(event);
        if events.send(DriverEvent::Input(input)).await.is_err() {
            // The call is already over.
            return;
        }
    }
    let closed = SessionInput::SocketClosed {
        side: Side::Telephony,
        error: failure,
    };
    let _ = events.send(DriverEvent::Input(closed)).await;
}

/// `Ok(None)` for frames that are skipped; an error only when it is fatal.
fn decode(frame: &[u8]) -> Result<Option<TelephonyEvent>, RelayError> {
    match TelephonyEvent::decode(frame) {
        Ok(TelephonyEvent::Unrecognized) => {
            warn!(
                event = frame_tag(frame, "event").as_deref().unwrap_or("<none>"),
                "Ignoring unrecognized telephony event."
            );
            Ok(None)
        }
        Ok(event) => Ok(Some(event)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(error = %e, "Dropping telephony frame.");
            Ok(None)
        }
    }
}
