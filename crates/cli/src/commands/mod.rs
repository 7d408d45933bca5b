//! CLI command implementations

mod health;
mod index;
mod search;
mod serve;
mod stats;

pub use health::cmd_health;
pub use index::cmd_index;
pub use search::{cmd_search_regex, cmd_search_semantic};
pub use serve::cmd_serve;
pub use stats::cmd_stats;
