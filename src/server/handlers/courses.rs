use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::core::errors::ApiError;
use crate::rag::CourseAnalytics;
use crate::state::AppState;

pub async fn get_course_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CourseAnalytics>, ApiError> {
    let analytics = state.rag.get_course_analytics().await?;
    Ok(Json(analytics))
}
