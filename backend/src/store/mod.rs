//! Persistent storage for loaded student records.

pub mod sqlite;

pub use sqlite::{PageRequest, SqliteStore, StudentFilter};
