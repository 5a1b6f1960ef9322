//! Retrieval: the vector store and the system that ties ingestion, tools and
//! generation together.

mod sqlite;
mod store;
mod system;

pub use sqlite::{SqliteVectorStore, StoreOptions};
pub use store::{SearchHit, SearchResults, VectorStore};
pub use system::{CourseAnalytics, RagSystem};
