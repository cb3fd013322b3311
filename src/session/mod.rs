//! The upstream session: actor, handle and supervisor.

mod actor;
mod context;
mod handle;
mod supervisor;
mod types;

pub use context::{STOP_TIMEOUT, SessionContext, SessionParams};
pub use handle::SessionHandle;
pub use supervisor::Supervisor;
pub use types::{SessionInput, SessionSnapshot};
