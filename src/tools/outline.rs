use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, Source, Tool, ToolOutput};
use crate::core::errors::ApiError;
use crate::documents::Course;
use crate::llm::ToolDefinition;
use crate::rag::VectorStore;

pub const OUTLINE_TOOL_NAME: &str = "get_course_outline";

#[derive(Debug, Deserialize)]
struct OutlineArgs {
    #[serde(alias = "course_title")]
    course_name: String,
}

/// Returns a course's title, link, instructor and full lesson list.
pub struct CourseOutlineTool {
    store: Arc<dyn VectorStore>,
}

impl CourseOutlineTool {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }
}

fn format_outline(course: &Course) -> String {
    let mut lines = vec![format!("Course: {}", course.title)];
    if let Some(link) = &course.course_link {
        lines.push(format!("Course Link: {}", link));
    }
    if let Some(instructor) = &course.instructor {
        lines.push(format!("Instructor: {}", instructor));
    }

    let mut lessons: Vec<_> = course.lessons.iter().collect();
    lessons.sort_by_key(|lesson| lesson.lesson_number);

    lines.push(format!("Lessons ({} total):", lessons.len()));
    for lesson in lessons {
        lines.push(format!("Lesson {}: {}", lesson.lesson_number, lesson.title));
    }
    lines.join("\n")
}

#[async_trait]
impl Tool for CourseOutlineTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: OUTLINE_TOOL_NAME.to_string(),
            description: "Get the complete outline of a course: title, course link, instructor and every lesson with its number and title"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "course_name": {
                        "type": "string",
                        "description": "Course title (partial matches work, e.g. 'MCP', 'Computer Use')"
                    }
                },
                "required": ["course_name"]
            }),
        }
    }

    async fn execute(&self, input: &Value) -> Result<ToolOutput, ApiError> {
        let args: OutlineArgs = parse_args(OUTLINE_TOOL_NAME, input)?;

        let Some(title) = self.store.resolve_course_name(&args.course_name).await? else {
            return Ok(ToolOutput::text(format!(
                "No course found matching '{}'",
                args.course_name
            )));
        };
        let Some(course) = self.store.get_course(&title).await? else {
            return Ok(ToolOutput::text(format!(
                "No course found matching '{}'",
                args.course_name
            )));
        };

        Ok(ToolOutput {
            content: format_outline(&course),
            sources: vec![Source {
                text: course.title.clone(),
                link: course.course_link.clone(),
            }],
        })
    }
}
