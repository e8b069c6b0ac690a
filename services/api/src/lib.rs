//! Callbridge API Library Crate
//!
//! This library contains the service side of the relay: configuration, the
//! application state, the REST glue for placing and answering calls, and the
//! WebSocket plumbing that connects a Twilio media stream to a voice agent.
//! The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod twilio;
pub mod twiml;
pub mod ws;
