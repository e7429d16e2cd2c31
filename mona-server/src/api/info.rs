use axum::{Json, extract::State, response::IntoResponse};
use mona_sdk::objects::{TestResponse, VisibilityResponse};

use crate::state::AppState;

pub(crate) const LIVENESS_MESSAGE: &str = "👋 MonaBackend is running!";

/// `GET /api/test`
pub(super) async fn test() -> Json<TestResponse> {
    Json(TestResponse::now())
}

/// `GET /api/visibility`: one flag per story window, `true` once any
/// event has named it.
pub(super) async fn visibility(State(state): State<AppState>) -> Json<VisibilityResponse> {
    let store = state.store();
    Json(VisibilityResponse::from_fn(|window| {
        store.contains(window.as_str())
    }))
}

/// Plain-text liveness message (`text/plain; charset=utf-8`).
pub(super) fn liveness() -> impl IntoResponse {
    LIVENESS_MESSAGE
}
