use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

pub async fn root() -> impl IntoResponse {
    Json(json!({ "message": "Course Materials RAG System API" }))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
