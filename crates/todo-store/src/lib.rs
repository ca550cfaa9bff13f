//! Durable todo storage backed by SQLite.

pub mod sqlite;

pub use sqlite::SqliteTodoRepo;
