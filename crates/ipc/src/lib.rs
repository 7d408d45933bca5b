//! JSON-RPC-over-newlines wire types shared by `sourcelens-daemon` (which
//! serves them) and `sourcelens-cli` (which sends them): spec.md §6's
//! `Method`/`Request`/`Response`/`RpcError` plus the per-tool param/result
//! structs.

mod error;
mod method;
mod protocol;
mod request;
mod response;

pub use error::IpcError;
pub use method::Method;
pub use protocol::{Request, Response, RpcError, RpcErrorKind};
pub use request::*;
pub use response::*;
