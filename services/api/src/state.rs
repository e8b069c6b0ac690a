//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like configuration and outbound service clients.
//! Nothing in here is mutable: calls never share state with each other.

use crate::{config::Config, twilio::TwilioClient};
use anyhow::{Context, Result};
use callbridge_core::bootstrap::{ElevenLabsSignedUrlClient, SignedUrlIssuer};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub signed_urls: Arc<dyn SignedUrlIssuer>,
    /// `None` when Twilio credentials are not configured.
    pub twilio: Option<Arc<TwilioClient>>,
}

impl AppState {
    /// Builds the production clients described by `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let signed_urls = ElevenLabsSignedUrlClient::new(
            config.elevenlabs_api_base.clone(),
            config.elevenlabs_api_key.clone(),
            config.bootstrap_timeout,
        )
        .context("Failed to build signed URL client")?;

        let twilio = config
            .twilio
            .clone()
            .map(|twilio| TwilioClient::new(twilio, config.bootstrap_timeout))
            .transpose()?
            .map(Arc::new);

        Ok(Self {
            config: Arc::new(config),
            signed_urls: Arc::new(signed_urls),
            twilio,
        })
    }
}
