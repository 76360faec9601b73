//! Persistence domain for the Fantabase demo widget.

pub mod keys;
pub mod sqlite;
pub mod store;

pub use sqlite::{open_or_memory, SqliteStore};
pub use store::{KeyValueStore, MemoryStore};
