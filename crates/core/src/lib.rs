//! Core relay logic for bridging a telephony media stream to a voice agent.
//!
//! Nothing in this crate owns a socket. The wire formats, the per-call state
//! machine and the bootstrap contract live here so that the service crate only
//! has to move frames between sockets and this logic.

pub mod bootstrap;
pub mod error;
pub mod protocol;
pub mod session;

pub use error::RelayError;
