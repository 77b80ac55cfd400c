// Database module
// SQLite persistence for embeddings, keyed by (source id, source category)

pub mod sqlite;

pub use sqlite::*;
