//! Connection bootstrap: resolves the session-scoped AI socket URL.

use crate::error::RelayError;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

/// A session-scoped `ws://` or `wss://` URL for one agent conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl(String);

impl SignedUrl {
    /// Accepts only WebSocket URLs.
    pub fn parse(url: impl Into<String>) -> Result<Self, RelayError> {
        let url = url.into();
        if url.starts_with("wss://") || url.starts_with("ws://") {
            Ok(Self(url))
        } else {
            Err(RelayError::MalformedResponse(format!(
                "`{}` is not a WebSocket URL",
                url
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Issues the signed WebSocket URL for one conversation with an agent.
///
/// The session only ever talks to this trait, so calls can be driven against
/// any endpoint that speaks the signed-URL contract.
#[async_trait]
pub trait SignedUrlIssuer: Send + Sync {
    /// Performs one round-trip and returns the URL to open the agent socket on.
    ///
    /// # Arguments
    ///
    /// * `agent_id` - The agent persona to converse with. Must be non-empty.
    async fn resolve(&self, agent_id: &str) -> Result<SignedUrl, RelayError>;
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    signed_url: Option<String>,
}

/// `SignedUrlIssuer` backed by the ElevenLabs Conversational AI REST API.
pub struct ElevenLabsSignedUrlClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl ElevenLabsSignedUrlClient {
    /// Creates a client whose every request is bounded by `timeout`.
    ///
    /// # Arguments
    ///
    /// * `api_base` - Base URL of the API (e.g. "https://api.elevenlabs.io").
    /// * `api_key` - Sent as the `xi-api-key` header.
    /// * `timeout` - Budget for the whole request, body included.
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl SignedUrlIssuer for ElevenLabsSignedUrlClient {
    #[instrument(name = "bootstrap", skip(self))]
    async fn resolve(&self, agent_id: &str) -> Result<SignedUrl, RelayError> {
        let endpoint = format!("{}/v1/convai/conversation/get-signed-url", self.api_base);
        let response = self
            .http
            .get(&endpoint)
            .query(&[("agent_id", agent_id)])
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| unavailable(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::UpstreamUnavailable(format!(
                "signed URL endpoint returned {}",
                status
            )));
        }

        let body: SignedUrlResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                RelayError::MalformedResponse(format!("signed URL body is not valid JSON: {}", e))
            } else {
                unavailable(&e)
            }
        })?;

        let signed_url = body
            .signed_url
            .ok_or_else(|| RelayError::MalformedResponse("`signed_url` missing".into()))
            .and_then(SignedUrl::parse)?;
        debug!("Signed URL issued.");
        Ok(signed_url)
    }
}

fn unavailable(err: &reqwest::Error) -> RelayError {
    if err.is_timeout() {
        RelayError::UpstreamUnavailable(format!("signed URL request timed out: {}", err))
    } else {
        RelayError::UpstreamUnavailable(format!("signed URL request failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SIGNED_URL_PATH: &str = "/v1/convai/conversation/get-signed-url";

    fn client_for(server: &MockServer, timeout: Duration) -> ElevenLabsSignedUrlClient {
        ElevenLabsSignedUrlClient::new(server.uri(), "test-key", timeout).unwrap()
    }

    #[tokio::test]
    async fn test_returns_signed_url_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SIGNED_URL_PATH))
            .and(query_param("agent_id", "agent-1"))
            .and(header("xi-api-key", "test-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "signed_url": "wss://agents.example/convai?token=t" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let url = client_for(&server, Duration::from_secs(5))
            .resolve("agent-1")
            .await
            .unwrap();
        assert_eq!(url.as_str(), "wss://agents.example/convai?token=t");
    }

    #[tokio::test]
    async fn test_non_success_status_is_upstream_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SIGNED_URL_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "detail": "bad key" })))
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_secs(5))
            .resolve("agent-1")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::UpstreamUnavailable(ref m) if m.contains("401")));
    }

    #[tokio::test]
    async fn test_missing_field_is_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SIGNED_URL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "url": "wss://x" })))
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_secs(5))
            .resolve("agent-1")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_non_websocket_url_is_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SIGNED_URL_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "signed_url": "https://x" })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_secs(5))
            .resolve("agent-1")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SIGNED_URL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_secs(5))
            .resolve("agent-1")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out_as_upstream_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SIGNED_URL_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "signed_url": "wss://late" }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, Duration::from_millis(200))
            .resolve("agent-1")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::UpstreamUnavailable(_)));
    }

    #[test]
    fn test_signed_url_accepts_only_websocket_schemes() {
        assert_eq!(
            SignedUrl::parse("ws://127.0.0.1:9000/convai").unwrap().as_str(),
            "ws://127.0.0.1:9000/convai"
        );
        let url = SignedUrl::parse("wss://agents.example/convai?token=t").unwrap();
        assert_eq!(url.to_string(), "wss://agents.example/convai?token=t");

        for bad in ["https://agents.example", "agents.example", ""] {
            assert!(matches!(
                SignedUrl::parse(bad),
                Err(RelayError::MalformedResponse(_))
            ));
        }
    }
}
