use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let existed = state.rag.sessions().clear_session(&session_id).await?;
    if !existed {
        tracing::debug!("Session {} was already gone", session_id);
    }
    Ok(Json(json!({ "success": true })))
}
