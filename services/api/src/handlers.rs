//! Axum Handlers for the REST API
//!
//! This module contains the HTTP glue around the relay: the stream-connect
//! markup for incoming calls and the trigger for outgoing ones. It uses
//! `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, warn};

use crate::{
    models::{ErrorResponse, StartOutgoingPayload, StartOutgoingResponse},
    state::AppState,
    twiml,
};

pub enum ApiError {
    BadRequest(String),
    ServiceUnavailable(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::ServiceUnavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}

/// Stream-connect markup for incoming calls, bound to the default agent.
#[utoipa::path(
    get,
    path = "/twiml/incoming",
    responses(
        (status = 200, description = "TwiML document", content_type = "text/xml", body = String),
        (status = 503, description = "No default agent configured", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn twiml_incoming(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let agent_id = state.config.default_agent_id.as_deref().ok_or_else(|| {
        ApiError::ServiceUnavailable("DEFAULT_AGENT_ID is not configured".to_string())
    })?;
    let document = twiml::stream_connect(&state.config.server_url, agent_id)?;
    Ok(([(header::CONTENT_TYPE, "text/xml")], document).into_response())
}

/// Place an outbound call connected to the given agent.
#[utoipa::path(
    post,
    path = "/start-outgoing",
    request_body = StartOutgoingPayload,
    responses(
        (status = 200, description = "Call placed", body = StartOutgoingResponse),
        (status = 400, description = "Missing parameters", body = StartOutgoingResponse),
        (status = 500, description = "Call could not be placed", body = StartOutgoingResponse),
        (status = 503, description = "Outbound calling not configured", body = StartOutgoingResponse)
    )
)]
pub async fn start_outgoing(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StartOutgoingPayload>,
) -> (StatusCode, Json<StartOutgoingResponse>) {
    let phone_number = payload.phone_number.trim();
    let agent_id = payload.agent_id.trim();
    if phone_number.is_empty() || agent_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(StartOutgoingResponse::failed("Missing parameters")),
        );
    }

    let Some(twilio) = state.twilio.as_ref() else {
        warn!("Outbound call requested but Twilio is not configured.");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(StartOutgoingResponse::failed("Outbound calling is not configured")),
        );
    };

    let result = match twiml::stream_connect(&state.config.server_url, agent_id) {
        Ok(document) => twilio.create_call(phone_number, &document).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(call_sid) => (StatusCode::OK, Json(StartOutgoingResponse::started(call_sid))),
        Err(e) => {
            error!(error = ?e, "Failed to place outbound call.");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StartOutgoingResponse::failed(e.to_string())),
            )
        }
    }
}
