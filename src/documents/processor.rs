use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use super::chunker::chunk_text;
use super::models::{Course, CourseChunk, Lesson};
use crate::core::errors::ApiError;

const SUPPORTED_EXTENSIONS: [&str; 2] = ["txt", "md"];

static LESSON_RE: OnceLock<Regex> = OnceLock::new();
static HEADER_RE: OnceLock<Regex> = OnceLock::new();

fn lesson_re() -> &'static Regex {
    LESSON_RE.get_or_init(|| {
        Regex::new(r"(?i)^lesson\s+(\d+):\s*(.+)$").expect("valid lesson regex")
    })
}

fn header_re() -> &'static Regex {
    HEADER_RE.get_or_init(|| {
        Regex::new(r"(?i)^(course title|course link|course instructor|lesson link)\s*:\s*(.*)$")
            .expect("valid header regex")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Header {
    CourseTitle,
    CourseLink,
    CourseInstructor,
    LessonLink,
}

fn parse_header(line: &str) -> Option<(Header, String)> {
    let caps = header_re().captures(line)?;
    let kind = match caps[1].to_ascii_lowercase().as_str() {
        "course title" => Header::CourseTitle,
        "course link" => Header::CourseLink,
        "course instructor" => Header::CourseInstructor,
        _ => Header::LessonLink,
    };
    Some((kind, caps[2].trim().to_string()))
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

struct LessonDraft {
    lesson: Lesson,
    body: Vec<String>,
}

/// Turns structured course files into a [`Course`] and its [`CourseChunk`]s.
#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl DocumentProcessor {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn is_supported(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|supported| ext.eq_ignore_ascii_case(supported))
            })
            .unwrap_or(false)
    }

    pub async fn process_course_document(
        &self,
        path: &Path,
    ) -> Result<(Course, Vec<CourseChunk>), ApiError> {
        if !Self::is_supported(path) {
            return Err(ApiError::BadRequest(format!(
                "Unsupported document type: {}",
                path.display()
            )));
        }

        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ApiError::Internal(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let text = String::from_utf8_lossy(&bytes);
        let fallback_title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(self.parse_course(&text, &fallback_title))
    }

    /// Parses the course header, splits lessons and chunks their bodies.
    pub fn parse_course(&self, text: &str, fallback_title: &str) -> (Course, Vec<CourseChunk>) {
        let mut title: Option<String> = None;
        let mut course_link = None;
        let mut instructor = None;
        let mut preamble: Vec<String> = Vec::new();
        let mut lessons: Vec<LessonDraft> = Vec::new();
        let mut expecting_lesson_link = false;

        for raw_line in text.lines() {
            let line = raw_line.trim();

            if let Some(caps) = lesson_re().captures(line) {
                if let Ok(lesson_number) = caps[1].parse::<u32>() {
                    lessons.push(LessonDraft {
                        lesson: Lesson {
                            lesson_number,
                            title: caps[2].trim().to_string(),
                            lesson_link: None,
                        },
                        body: Vec::new(),
                    });
                    expecting_lesson_link = true;
                    continue;
                }
            }

            if line.is_empty() {
                continue;
            }

            if let Some(current) = lessons.last_mut() {
                if expecting_lesson_link {
                    expecting_lesson_link = false;
                    if let Some((Header::LessonLink, link)) = parse_header(line) {
                        current.lesson.lesson_link = non_empty(link);
                        continue;
                    }
                }
                current.body.push(line.to_string());
                continue;
            }

            match parse_header(line) {
                Some((Header::CourseTitle, value)) if title.is_none() => {
                    title = non_empty(value);
                }
                Some((Header::CourseLink, value)) if course_link.is_none() => {
                    course_link = non_empty(value);
                }
                Some((Header::CourseInstructor, value)) if instructor.is_none() => {
                    instructor = non_empty(value);
                }
                _ if title.is_none() && preamble.is_empty() => {
                    title = Some(line.to_string());
                }
                _ => preamble.push(line.to_string()),
            }
        }

        let course_title = title.unwrap_or_else(|| fallback_title.to_string());
        let mut chunks = Vec::new();

        if lessons.is_empty() {
            for content in chunk_text(&preamble.join("\n"), self.chunk_size, self.chunk_overlap) {
                chunks.push(CourseChunk {
                    content,
                    course_title: course_title.clone(),
                    lesson_number: None,
                    chunk_index: chunks.len(),
                });
            }
        }

        for draft in &lessons {
            let number = draft.lesson.lesson_number;
            for piece in chunk_text(&draft.body.join("\n"), self.chunk_size, self.chunk_overlap) {
                chunks.push(CourseChunk {
                    content: format!("Course {} Lesson {} content: {}", course_title, number, piece),
                    course_title: course_title.clone(),
                    lesson_number: Some(number),
                    chunk_index: chunks.len(),
                });
            }
        }

        let course = Course {
            title: course_title,
            course_link,
            instructor,
            lessons: lessons.into_iter().map(|draft| draft.lesson).collect(),
        };

        (course, chunks)
    }
}
