pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryTranscriptStore;
pub use sqlite::SqliteTranscriptStore;
