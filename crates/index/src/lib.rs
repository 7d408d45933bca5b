//! File Watcher and Indexing Coordinator (spec.md §4.1, §4.3): the
//! debounced watch -> parse -> diff -> commit -> embed pipeline that keeps
//! the Chunk Store in sync with the filesystem.

pub mod backfill;
pub mod coordinator;
pub mod error;
pub mod exclude;
pub mod watcher;

pub use backfill::{ChunkStoreSink, ChunkStoreSource};
pub use coordinator::{Coordinator, CoordinatorStats};
pub use error::{IndexError, Result};
pub use exclude::ExcludeMatcher;
pub use watcher::{ChangeKind, WatchEvent, Watcher};
