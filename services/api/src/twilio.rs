//! Minimal Twilio REST client for placing outbound calls.

use crate::config::TwilioConfig;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Deserialize)]
struct CreatedCall {
    sid: String,
}

#[derive(Deserialize, Default)]
struct TwilioErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<i64>,
}

/// Places calls whose media is streamed back to this service.
pub struct TwilioClient {
    http: reqwest::Client,
    config: TwilioConfig,
}

impl TwilioClient {
    pub fn new(config: TwilioConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Twilio HTTP client")?;
        Ok(Self { http, config })
    }

    /// Starts a call to `to`, executing `twiml` once it is answered.
    ///
    /// # Returns
    /// The call SID assigned by Twilio.
    #[instrument(skip(self, twiml))]
    pub async fn create_call(&self, to: &str, twiml: &str) -> Result<String> {
        let endpoint = format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        );
        let response = self
            .http
            .post(&endpoint)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to),
                ("From", self.config.from_number.as_str()),
                ("Twiml", twiml),
            ])
            .send()
            .await
            .context("Twilio request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body: TwilioErrorBody = response.json().await.unwrap_or_default();
            bail!(
                "Twilio rejected the call ({}{}): {}",
                status,
                body.code.map(|c| format!(", code {}", c)).unwrap_or_default(),
                body.message.unwrap_or_else(|| "no message".to_string())
            );
        }

        let call: CreatedCall = response
            .json()
            .await
            .context("Twilio response did not contain a call SID")?;
        info!(call_sid = %call.sid, "Outbound call created.");
        Ok(call.sid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> TwilioClient {
        TwilioClient::new(
            TwilioConfig {
                account_sid: "AC123".to_string(),
                auth_token: "secret".to_string(),
                from_number: "+15550001111".to_string(),
                api_base: server.uri(),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_call_returns_sid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC123/Calls.json"))
            .and(header_exists("authorization"))
            .and(body_string_contains("To=%2B15557654321"))
            .and(body_string_contains("From=%2B15550001111"))
            .and(body_string_contains("Twiml="))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sid": "CA999" })))
            .expect(1)
            .mount(&server)
            .await;

        let sid = client_for(&server)
            .create_call("+15557654321", "<Response/>")
            .await
            .unwrap();
        assert_eq!(sid, "CA999");
    }

    #[tokio::test]
    async fn test_create_call_surfaces_twilio_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": 21211,
                "message": "The 'To' number is not a valid phone number.",
                "status": 400
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .create_call("nope", "<Response/>")
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("21211"));
        assert!(message.contains("not a valid phone number"));
    }
}
