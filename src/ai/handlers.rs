use axum::{extract::State, http::StatusCode, routing::post, Router};
use tracing::{debug, instrument, warn};

use crate::state::AppState;

pub fn translator_routes() -> Router<AppState> {
    Router::new().route("/ai/translator", post(translate))
}

/// Always answers 200 with an empty body, whatever the model says.
#[instrument(skip(state, body))]
pub async fn translate(State(state): State<AppState>, body: String) -> StatusCode {
    match state.chat.answer(&body).await {
        Ok(answer) => debug!(answered = answer.is_some(), "translator"),
        Err(e) => warn!(error = %e, "chat model failed"),
    }
    StatusCode::OK
}
