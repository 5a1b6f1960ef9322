use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;
use crate::state::AppState;
use crate::tools::Source;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<Source>,
    pub session_id: String,
}

pub async fn query_documents(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let session_id = match payload.session_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => state.rag.sessions().create_session().await?,
    };

    let (answer, sources) = state.rag.query(&payload.query, Some(&session_id)).await?;

    Ok(Json(QueryResponse {
        answer,
        sources,
        session_id,
    }))
}
