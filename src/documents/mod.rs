//! Course document parsing and chunking.

pub mod chunker;
pub mod models;
pub mod processor;

pub use chunker::chunk_text;
pub use models::{Course, CourseChunk, Lesson};
pub use processor::DocumentProcessor;
