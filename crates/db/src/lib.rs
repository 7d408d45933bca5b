//! Chunk Store (spec.md §4.5): LanceDB-backed storage for files, chunks,
//! and one dynamically named vector table per `(provider, model,
//! dimension)` tuple a project has embedded with.

pub mod chunks;
pub mod connection;
pub mod embeddings;
pub mod error;
pub mod files;
pub mod schema;
pub mod stats;

pub use chunks::ChunkDiff;
pub use connection::{ChunkStore, default_db_path};
pub use error::{DbError, Result};
pub use stats::ChunkStoreStats;
