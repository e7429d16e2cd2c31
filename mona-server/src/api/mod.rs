//! HTTP and WebSocket handlers.
//!
//! # Endpoints
//!
//! - `GET /api/test`       – liveness probe with server time
//! - `GET /api/visibility` – which story windows have been revealed
//! - anything else         – WebSocket upgrade to the subscriber channel,
//!   or the plain-text liveness message for ordinary requests

use axum::{
    Router,
    extract::{FromRequestParts, Request, State, ws::WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::state::AppState;

pub(crate) mod info;
mod ws;

/// Build the `/api` router. Unmatched methods fall through to [`fallback`].
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/test", get(info::test).fallback(fallback))
        .route("/visibility", get(info::visibility).fallback(fallback))
}

/// Catch-all handler.
///
/// WebSocket upgrade requests become subscribers; everything else gets
/// the liveness message.
pub async fn fallback(State(state): State<AppState>, request: Request) -> Response {
    let (mut parts, _body) = request.into_parts();
    match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(upgrade) => ws::subscribe(state, upgrade),
        Err(_) => info::liveness().into_response(),
    }
}

/// Errors returned to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("subscriber limit reached, try again later")]
    AtCapacity,

    #[error("server is shutting down")]
    ShuttingDown,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::AtCapacity | ApiError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.to_string()).into_response()
    }
}
