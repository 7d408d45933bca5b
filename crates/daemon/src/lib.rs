//! The daemon process (spec.md §4.6, §4.7, §6): the Search Service, the
//! Task Coordinator, and the stdio/TCP server loop that exposes both over
//! JSON-RPC. `sourcelens-cli`'s `serve` subcommand is this crate's only
//! caller.

pub mod coordinator;
pub mod error;
pub mod search;
pub mod server;

pub use coordinator::{TaskCoordinator, TaskCoordinatorConfig};
pub use error::{DaemonError, Result};
pub use search::SearchService;
pub use server::{RequestHandler, Server, ServerError, ShutdownHandle};
