//! API Models
//!
//! Request and response bodies for the REST glue around the relay, annotated
//! for OpenAPI generation with `utoipa`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StartOutgoingPayload {
    #[schema(example = "+15557654321")]
    #[serde(default)]
    pub phone_number: String,
    #[schema(example = "agent_01jx")]
    #[serde(default)]
    pub agent_id: String,
}

#[derive(Serialize, ToSchema, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartOutgoingResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_sid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StartOutgoingResponse {
    pub fn started(call_sid: String) -> Self {
        Self {
            success: true,
            call_sid: Some(call_sid),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            call_sid: None,
            error: Some(error.into()),
        }
    }
}

/// Query string of the media stream upgrade request.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct MediaStreamParams {
    pub agent_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
