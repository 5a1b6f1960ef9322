use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

use super::{parse_args, Source, Tool, ToolOutput};
use crate::core::errors::ApiError;
use crate::documents::Course;
use crate::llm::ToolDefinition;
use crate::rag::{SearchHit, VectorStore};

pub const SEARCH_TOOL_NAME: &str = "search_course_content";

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    course_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_lesson_number")]
    lesson_number: Option<u32>,
}

/// Accepts `3`, `"3"` or null; models occasionally quote integers.
fn lenient_lesson_number<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid lesson_number '{}'", s))),
    }
}

/// Semantic search over course content with optional course/lesson filters.
pub struct CourseSearchTool {
    store: Arc<dyn VectorStore>,
}

impl CourseSearchTool {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    async fn source_for(
        &self,
        hit: &SearchHit,
        catalog: &mut HashMap<String, Option<Course>>,
    ) -> Source {
        if !catalog.contains_key(&hit.course_title) {
            let course = match self.store.get_course(&hit.course_title).await {
                Ok(course) => course,
                Err(err) => {
                    tracing::warn!("Failed to load links for '{}': {}", hit.course_title, err);
                    None
                }
            };
            catalog.insert(hit.course_title.clone(), course);
        }
        let course = catalog.get(&hit.course_title).and_then(Option::as_ref);

        match hit.lesson_number {
            Some(number) => Source {
                text: format!("{} - Lesson {}", hit.course_title, number),
                link: course
                    .and_then(|c| c.lesson(number))
                    .and_then(|lesson| lesson.lesson_link.clone()),
            },
            None => Source {
                text: hit.course_title.clone(),
                link: course.and_then(|c| c.course_link.clone()),
            },
        }
    }
}

fn format_hit(hit: &SearchHit) -> String {
    match hit.lesson_number {
        Some(number) => format!("[{} - Lesson {}]\n{}", hit.course_title, number, hit.content),
        None => format!("[{}]\n{}", hit.course_title, hit.content),
    }
}

fn empty_message(course_name: Option<&str>, lesson_number: Option<u32>) -> String {
    let mut message = String::from("No relevant content found");
    if let Some(course) = course_name {
        message.push_str(&format!(" in course '{}'", course));
    }
    if let Some(lesson) = lesson_number {
        message.push_str(&format!(" in lesson {}", lesson));
    }
    message.push('.');
    message
}

#[async_trait]
impl Tool for CourseSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: SEARCH_TOOL_NAME.to_string(),
            description: "Search course materials with smart course name matching and lesson filtering"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to search for in the course content"
                    },
                    "course_name": {
                        "type": "string",
                        "description": "Course title (partial matches work, e.g. 'MCP', 'Introduction')"
                    },
                    "lesson_number": {
                        "type": "integer",
                        "description": "Specific lesson number to search within (e.g. 1, 2, 3)"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, input: &Value) -> Result<ToolOutput, ApiError> {
        let args: SearchArgs = parse_args(SEARCH_TOOL_NAME, input)?;
        let course_name = args
            .course_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());

        let results = self
            .store
            .search(&args.query, course_name, args.lesson_number, None)
            .await;

        if let Some(error) = results.error {
            return Ok(ToolOutput::text(error));
        }
        if results.is_empty() {
            return Ok(ToolOutput::text(empty_message(
                course_name,
                args.lesson_number,
            )));
        }

        let mut catalog = HashMap::new();
        let mut sources = Vec::with_capacity(results.hits.len());
        for hit in &results.hits {
            sources.push(self.source_for(hit, &mut catalog).await);
        }

        let content = results
            .hits
            .iter()
            .map(format_hit)
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(ToolOutput { content, sources })
    }
}
