//! SQLite-backed vector store.
//!
//! Catalog and chunk rows live in SQLite with embeddings as little-endian
//! f32 blobs; search is brute-force cosine similarity over the filtered rows.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};

use super::store::{SearchHit, SearchResults, VectorStore};
use crate::core::config::RagSettings;
use crate::core::errors::ApiError;
use crate::documents::{Course, CourseChunk, Lesson};
use crate::embed::{embed_in_batches, embed_one, Embedder};
use crate::vector_math::{
    cosine_similarity, deserialize_embedding, rank_descending_by_cosine, serialize_embedding,
};

const EMBEDDING_MODEL_KEY: &str = "embedding_model";

/// Tunables the store needs from the `rag` and `embedding` sections.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub max_results: usize,
    pub course_match_threshold: f32,
    pub batch_size: usize,
}

impl StoreOptions {
    pub fn from_settings(rag: &RagSettings, batch_size: usize) -> Self {
        Self {
            max_results: rag.max_results,
            course_match_threshold: rag.course_match_threshold,
            batch_size,
        }
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from_settings(&RagSettings::default(), 32)
    }
}

pub struct SqliteVectorStore {
    pool: SqlitePool,
    db_path: PathBuf,
    embedder: Arc<dyn Embedder>,
    options: StoreOptions,
}

impl SqliteVectorStore {
    pub async fn open(
        db_path: PathBuf,
        embedder: Arc<dyn Embedder>,
        options: StoreOptions,
    ) -> Result<Self, ApiError> {
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(connect_options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self {
            pool,
            db_path,
            embedder,
            options,
        };
        store.init_schema().await?;
        store.ensure_embedding_model().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS courses (
                title TEXT PRIMARY KEY,
                instructor TEXT,
                course_link TEXT,
                lessons TEXT NOT NULL DEFAULT '[]',
                lesson_count INTEGER NOT NULL DEFAULT 0,
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS course_chunks (
                chunk_id TEXT PRIMARY KEY,
                course_title TEXT NOT NULL,
                lesson_number INTEGER,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunks_course_lesson
             ON course_chunks(course_title, lesson_number)",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    /// Drops all vectors when they were produced by a different model.
    async fn ensure_embedding_model(&self) -> Result<(), ApiError> {
        let current = format!(
            "{}:{}",
            self.embedder.model_name(),
            self.embedder.dimension()
        );

        let stored: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = ?1")
                .bind(EMBEDDING_MODEL_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(ApiError::internal)?;

        if let Some(previous) = stored.as_deref() {
            if previous != current {
                tracing::warn!(
                    "Embedding model changed ({} -> {}); clearing vector store",
                    previous,
                    current
                );
                self.clear_all_data().await?;
            }
        }

        sqlx::query("INSERT OR REPLACE INTO store_meta (key, value) VALUES (?1, ?2)")
            .bind(EMBEDDING_MODEL_KEY)
            .bind(&current)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }

    async fn try_search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
        limit: Option<usize>,
    ) -> Result<SearchResults, ApiError> {
        let course_title = match course_name {
            Some(name) => match self.resolve_course_name(name).await? {
                Some(title) => Some(title),
                None => {
                    return Ok(SearchResults::empty(format!(
                        "No course found matching '{}'",
                        name
                    )))
                }
            },
            None => None,
        };

        let rows = sqlx::query(
            "SELECT course_title, lesson_number, chunk_index, content, embedding
             FROM course_chunks
             WHERE (?1 IS NULL OR course_title = ?1)
               AND (?2 IS NULL OR lesson_number = ?2)",
        )
        .bind(course_title.as_deref())
        .bind(lesson_number.map(i64::from))
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        if rows.is_empty() {
            return Ok(SearchResults::default());
        }

        let query_embedding = embed_one(self.embedder.as_ref(), query).await?;

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Option<Vec<u8>> = row.try_get("embedding").ok()?;
                let stored = deserialize_embedding(&embedding_bytes?);
                let score = cosine_similarity(&query_embedding, &stored);
                Some(SearchHit {
                    content: row.get("content"),
                    course_title: row.get("course_title"),
                    lesson_number: row_lesson_number(row),
                    chunk_index: row.get::<i64, _>("chunk_index").max(0) as usize,
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit.unwrap_or(self.options.max_results).max(1));

        Ok(SearchResults::from_hits(hits))
    }

    fn row_to_course(row: &SqliteRow) -> Course {
        let lessons_json: String = row.get("lessons");
        let lessons = serde_json::from_str::<Vec<Lesson>>(&lessons_json).unwrap_or_else(|e| {
            tracing::warn!("Corrupt lesson metadata in catalog: {}", e);
            Vec::new()
        });

        Course {
            title: row.get("title"),
            course_link: row.get("course_link"),
            instructor: row.get("instructor"),
            lessons,
        }
    }
}

fn row_lesson_number(row: &SqliteRow) -> Option<u32> {
    row.try_get::<Option<i64>, _>("lesson_number")
        .ok()
        .flatten()
        .and_then(|n| u32::try_from(n).ok())
}

/// Exact, then substring, match against `titles`; case-insensitive.
fn match_title_lexically(name: &str, titles: &[String]) -> Option<String> {
    let needle = name.trim().to_lowercase();

    if let Some(exact) = titles.iter().find(|t| t.to_lowercase() == needle) {
        return Some(exact.clone());
    }

    titles
        .iter()
        .filter(|t| {
            let hay = t.to_lowercase();
            hay.contains(&needle) || needle.contains(&hay)
        })
        .min_by(|a, b| {
            a.chars()
                .count()
                .cmp(&b.chars().count())
                .then_with(|| a.cmp(b))
        })
        .cloned()
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn add_course_metadata(&self, course: &Course) -> Result<(), ApiError> {
        let embedding = embed_one(self.embedder.as_ref(), &course.title).await?;
        let lessons_json = serde_json::to_string(&course.lessons).map_err(ApiError::internal)?;

        sqlx::query(
            "INSERT OR REPLACE INTO courses (title, instructor, course_link, lessons, lesson_count, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&course.title)
        .bind(&course.instructor)
        .bind(&course.course_link)
        .bind(&lessons_json)
        .bind(course.lessons.len() as i64)
        .bind(serialize_embedding(&embedding))
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    async fn add_course_content(&self, chunks: &[CourseChunk]) -> Result<(), ApiError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings =
            embed_in_batches(self.embedder.as_ref(), texts, self.options.batch_size).await?;

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            sqlx::query(
                "INSERT OR REPLACE INTO course_chunks
                    (chunk_id, course_title, lesson_number, chunk_index, content, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(chunk.id())
            .bind(&chunk.course_title)
            .bind(chunk.lesson_number.map(i64::from))
            .bind(chunk.chunk_index as i64)
            .bind(&chunk.content)
            .bind(serialize_embedding(embedding))
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
        limit: Option<usize>,
    ) -> SearchResults {
        match self
            .try_search(query, course_name, lesson_number, limit)
            .await
        {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!("Vector search failed: {}", err);
                SearchResults::empty(format!("Search error: {}", err))
            }
        }
    }

    async fn resolve_course_name(&self, course_name: &str) -> Result<Option<String>, ApiError> {
        if course_name.trim().is_empty() {
            return Ok(None);
        }

        let rows = sqlx::query("SELECT title, embedding FROM courses ORDER BY title ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        if rows.is_empty() {
            return Ok(None);
        }

        let titles: Vec<String> = rows.iter().map(|row| row.get("title")).collect();
        if let Some(title) = match_title_lexically(course_name, &titles) {
            return Ok(Some(title));
        }

        let query_embedding = embed_one(self.embedder.as_ref(), course_name).await?;
        let candidates: Vec<Vec<f32>> = rows
            .iter()
            .map(|row| {
                row.try_get::<Option<Vec<u8>>, _>("embedding")
                    .ok()
                    .flatten()
                    .map(|bytes| deserialize_embedding(&bytes))
                    .unwrap_or_default()
            })
            .collect();

        // Stable sort over alphabetical rows keeps ties alphabetical.
        let best = rank_descending_by_cosine(&query_embedding, &candidates)
            .into_iter()
            .next()
            .filter(|(_, score)| *score >= self.options.course_match_threshold)
            .map(|(idx, _)| titles[idx].clone());

        Ok(best)
    }

    async fn get_existing_course_titles(&self) -> Result<Vec<String>, ApiError> {
        sqlx::query_scalar("SELECT title FROM courses ORDER BY title ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)
    }

    async fn get_course_count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(count.max(0) as usize)
    }

    async fn get_all_courses_metadata(&self) -> Result<Vec<Course>, ApiError> {
        let rows = sqlx::query(
            "SELECT title, instructor, course_link, lessons FROM courses ORDER BY title ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows.iter().map(Self::row_to_course).collect())
    }

    async fn get_course(&self, title: &str) -> Result<Option<Course>, ApiError> {
        let row = sqlx::query(
            "SELECT title, instructor, course_link, lessons FROM courses WHERE title = ?1",
        )
        .bind(title)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(row.as_ref().map(Self::row_to_course))
    }

    async fn get_course_link(&self, title: &str) -> Result<Option<String>, ApiError> {
        let link: Option<Option<String>> =
            sqlx::query_scalar("SELECT course_link FROM courses WHERE title = ?1")
                .bind(title)
                .fetch_optional(&self.pool)
                .await
                .map_err(ApiError::internal)?;
        Ok(link.flatten())
    }

    async fn get_lesson_link(
        &self,
        title: &str,
        lesson_number: u32,
    ) -> Result<Option<String>, ApiError> {
        Ok(self
            .get_course(title)
            .await?
            .and_then(|course| course.lesson(lesson_number).cloned())
            .and_then(|lesson| lesson.lesson_link))
    }

    async fn remove_course(&self, title: &str) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        sqlx::query("DELETE FROM course_chunks WHERE course_title = ?1")
            .bind(title)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        sqlx::query("DELETE FROM courses WHERE title = ?1")
            .bind(title)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn clear_all_data(&self) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        sqlx::query("DELETE FROM course_chunks")
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        sqlx::query("DELETE FROM courses")
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }
}
