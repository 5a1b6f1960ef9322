use serde::{Deserialize, Serialize};

/// A single lesson inside a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    /// Sequential lesson number as written in the source document.
    pub lesson_number: u32,
    pub title: String,
    pub lesson_link: Option<String>,
}

/// Course metadata. `title` is the unique identifier across the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub title: String,
    pub course_link: Option<String>,
    pub instructor: Option<String>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

impl Course {
    pub fn lesson(&self, lesson_number: u32) -> Option<&Lesson> {
        self.lessons
            .iter()
            .find(|lesson| lesson.lesson_number == lesson_number)
    }
}

/// A slice of course text, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseChunk {
    pub content: String,
    pub course_title: String,
    pub lesson_number: Option<u32>,
    /// Position of the chunk within its course, counted across all lessons.
    pub chunk_index: usize,
}

impl CourseChunk {
    /// Stable storage id, e.g. `Test_Course_3`.
    pub fn id(&self) -> String {
        format!("{}_{}", self.course_title.replace(' ', "_"), self.chunk_index)
    }
}
