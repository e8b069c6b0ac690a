//! WebSocket Relay
//!
//! This module contains the socket side of a relayed call. The relay rules
//! themselves live in `callbridge_core::session`; everything here only moves
//! frames between sockets and the state machine:
//!
//! - `session`: Upgrades the telephony connection and drives the call.
//! - `telephony`: Reads Twilio media stream frames.
//! - `agent`: Bootstraps, connects to and reads the voice agent socket.

mod agent;
pub mod session;
mod telephony;

pub use session::media_stream_handler;

use callbridge_core::session::Side;
use futures_util::{Sink, SinkExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Instructions for a socket writer task.
#[derive(Debug)]
pub(crate) enum SocketCommand<T> {
    Send(T),
    Close,
}

/// Drains `commands` into `sink` until told to close or every sender is gone,
/// then closes the sink.
pub(crate) async fn write_loop<S, M, T>(
    mut sink: S,
    mut commands: mpsc::UnboundedReceiver<SocketCommand<T>>,
    side: Side,
    into_frame: fn(String) -> M,
) where
    S: Sink<M> + Unpin,
    S::Error: std::fmt::Display,
    T: Serialize,
{
    while let Some(command) = commands.recv().await {
        match command {
            SocketCommand::Send(message) => {
                let frame = match serde_json::to_string(&message) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!(%side, error = %e, "Failed to encode outgoing frame.");
                        continue;
                    }
                };
                if let Err(e) = sink.send(into_frame(frame)).await {
                    warn!(%side, error = %e, "Failed to send frame; stopping writer.");
                    break;
                }
            }
            SocketCommand::Close => {
                debug!(%side, "Closing socket.");
                break;
            }
        }
    }
    if let Err(e) = sink.close().await {
        debug!(%side, error = %e, "Socket was already closed.");
    }
}
