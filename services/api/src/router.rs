//! HTTP routes of the relay service: the call-setup glue, the media stream
//! upgrade, and the OpenAPI document describing the glue.

use crate::{
    handlers,
    models::{ErrorResponse, StartOutgoingPayload, StartOutgoingResponse},
    state::AppState,
    ws::media_stream_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// OpenAPI description of the REST glue. The WebSocket route is not part of it.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::twiml_incoming,
        handlers::start_outgoing,
    ),
    components(
        schemas(StartOutgoingPayload, StartOutgoingResponse, ErrorResponse)
    ),
    tags(
        (name = "Callbridge API", description = "Call setup around the telephony to voice agent relay")
    )
)]
pub struct ApiDoc;

/// Builds the service router over the shared state.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let calls = Router::new()
        .route("/twiml/incoming", get(handlers::twiml_incoming))
        .route("/start-outgoing", post(handlers::start_outgoing))
        .route("/media-stream", get(media_stream_handler))
        .with_state(app_state);

    // Docs and the liveness probe need no state.
    Router::new()
        .route("/health", get(handlers::health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(calls)
}
