//! VectorStore trait: course catalog plus chunk content with semantic search.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;
use crate::documents::{Course, CourseChunk};

/// A single ranked chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    pub course_title: String,
    pub lesson_number: Option<u32>,
    pub chunk_index: usize,
    /// Cosine similarity (higher = better).
    pub score: f32,
}

/// Outcome of a content search.
///
/// Failures are carried as data in `error` so the caller (ultimately the
/// model) can read them instead of the request aborting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub error: Option<String>,
}

impl SearchResults {
    pub fn from_hits(hits: Vec<SearchHit>) -> Self {
        Self { hits, error: None }
    }

    pub fn empty(error: impl Into<String>) -> Self {
        Self {
            hits: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert catalog metadata for a course, keyed by title.
    async fn add_course_metadata(&self, course: &Course) -> Result<(), ApiError>;

    /// Embed and upsert chunks. Empty input is a no-op.
    async fn add_course_content(&self, chunks: &[CourseChunk]) -> Result<(), ApiError>;

    /// Semantic search over chunk content.
    ///
    /// `course_name` is resolved fuzzily first; `limit` overrides the
    /// configured default result count.
    async fn search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
        limit: Option<usize>,
    ) -> SearchResults;

    /// Map a user-supplied course name to a stored title.
    async fn resolve_course_name(&self, course_name: &str) -> Result<Option<String>, ApiError>;

    async fn get_existing_course_titles(&self) -> Result<Vec<String>, ApiError>;

    async fn get_course_count(&self) -> Result<usize, ApiError>;

    async fn get_all_courses_metadata(&self) -> Result<Vec<Course>, ApiError>;

    async fn get_course(&self, title: &str) -> Result<Option<Course>, ApiError>;

    async fn get_course_link(&self, title: &str) -> Result<Option<String>, ApiError>;

    async fn get_lesson_link(
        &self,
        title: &str,
        lesson_number: u32,
    ) -> Result<Option<String>, ApiError>;

    /// Remove one course's catalog row and all of its chunks.
    async fn remove_course(&self, title: &str) -> Result<(), ApiError>;

    /// Remove every course and chunk.
    async fn clear_all_data(&self) -> Result<(), ApiError>;
}
