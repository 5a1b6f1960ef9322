use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use super::store::VectorStore;
use crate::core::errors::ApiError;
use crate::documents::{Course, CourseChunk, DocumentProcessor};
use crate::history::SessionManager;
use crate::llm::AiGenerator;
use crate::tools::{CourseOutlineTool, CourseSearchTool, Source, ToolManager};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseAnalytics {
    pub total_courses: usize,
    pub course_titles: Vec<String>,
}

/// Wires ingestion, retrieval tools, generation and session memory together.
pub struct RagSystem {
    processor: DocumentProcessor,
    store: Arc<dyn VectorStore>,
    generator: AiGenerator,
    sessions: SessionManager,
    tools: ToolManager,
}

impl RagSystem {
    pub fn new(
        processor: DocumentProcessor,
        store: Arc<dyn VectorStore>,
        generator: AiGenerator,
        sessions: SessionManager,
    ) -> Self {
        let mut tools = ToolManager::new();
        tools.register_tool(Arc::new(CourseSearchTool::new(store.clone())));
        tools.register_tool(Arc::new(CourseOutlineTool::new(store.clone())));

        Self {
            processor,
            store,
            generator,
            sessions,
            tools,
        }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn tools(&self) -> &ToolManager {
        &self.tools
    }

    /// Ingests one course file. Returns the parsed course and its chunk count.
    pub async fn add_course_document(&self, path: &Path) -> Result<(Course, usize), ApiError> {
        let (course, chunks) = self.processor.process_course_document(path).await?;
        self.store_course(&course, &chunks).await?;
        Ok((course, chunks.len()))
    }

    /// Writes a course's catalog row and chunks. A failed chunk write removes
    /// the catalog row again so a later ingest retries the course.
    async fn store_course(&self, course: &Course, chunks: &[CourseChunk]) -> Result<(), ApiError> {
        self.store.add_course_metadata(course).await?;
        if let Err(err) = self.store.add_course_content(chunks).await {
            if let Err(cleanup) = self.store.remove_course(&course.title).await {
                tracing::warn!(
                    "Failed to roll back partial course {}: {}",
                    course.title,
                    cleanup
                );
            }
            return Err(err);
        }
        Ok(())
    }

    /// Ingests every supported file in `folder`, skipping courses already stored.
    ///
    /// Returns `(courses_added, chunks_added)`.
    pub async fn add_course_folder(
        &self,
        folder: &Path,
        clear_existing: bool,
    ) -> Result<(usize, usize), ApiError> {
        if !tokio::fs::try_exists(folder).await.unwrap_or(false) {
            return Err(ApiError::NotFound(format!(
                "Folder {} does not exist",
                folder.display()
            )));
        }

        if clear_existing {
            tracing::info!("Clearing existing course data");
            self.store.clear_all_data().await?;
        }

        let mut existing: HashSet<String> = self
            .store
            .get_existing_course_titles()
            .await?
            .into_iter()
            .collect();

        let mut total_courses = 0;
        let mut total_chunks = 0;
        for path in course_files(folder).await? {
            let (course, chunks) = match self.processor.process_course_document(&path).await {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::warn!("Error processing {}: {}", path.display(), err);
                    continue;
                }
            };

            if existing.contains(&course.title) {
                tracing::info!("Course already exists: {} - skipping", course.title);
                continue;
            }

            if let Err(err) = self.store_course(&course, &chunks).await {
                tracing::warn!("Error storing {}: {}", path.display(), err);
                continue;
            }

            tracing::info!("Added new course: {} ({} chunks)", course.title, chunks.len());
            total_courses += 1;
            total_chunks += chunks.len();
            existing.insert(course.title);
        }

        tracing::info!(
            "Loaded {} courses with {} chunks from {}",
            total_courses,
            total_chunks,
            folder.display()
        );
        Ok((total_courses, total_chunks))
    }

    /// Answers `query` with tool-assisted generation, recording the exchange
    /// when a session is given.
    pub async fn query(
        &self,
        query: &str,
        session_id: Option<&str>,
    ) -> Result<(String, Vec<Source>), ApiError> {
        let prompt = format!("Answer this question about course materials: {}", query);

        let history = match session_id {
            Some(id) => self.sessions.get_conversation_history(id).await?,
            None => None,
        };

        let response = self
            .generator
            .generate_response(&prompt, history.as_deref(), Some(&self.tools))
            .await?;

        if let Some(id) = session_id {
            self.sessions
                .add_exchange(id, query, &response.answer)
                .await?;
        }

        Ok((response.answer, response.sources))
    }

    pub async fn get_course_analytics(&self) -> Result<CourseAnalytics, ApiError> {
        let course_titles = self.store.get_existing_course_titles().await?;
        Ok(CourseAnalytics {
            total_courses: course_titles.len(),
            course_titles,
        })
    }
}

/// Regular files in `folder` with a supported extension, in name order.
async fn course_files(folder: &Path) -> Result<Vec<PathBuf>, ApiError> {
    let mut entries = tokio::fs::read_dir(folder).await.map_err(ApiError::internal)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(ApiError::internal)? {
        let is_file = entry
            .file_type()
            .await
            .map(|kind| kind.is_file())
            .unwrap_or(false);
        let path = entry.path();
        if is_file && DocumentProcessor::is_supported(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
