//! Request dispatch server.
//!
//! # Data Flow
//! ```text
//! Listener callback (RawContext)
//!     → dispatcher.rs (on_context: admit + spawn, never blocks the caller)
//!     → dispatcher.rs (process_request: outer failure domain, always closes)
//!         → FeatureContext::new
//!         → create_context → process_request → on_start → dispose_context
//!         → on failure: synthetic 500 or abort, then dispose with the failure
//!     → RawResponse::close (exactly once)
//! ```
//!
//! # Design Decisions
//! - Each request runs as its own tokio task on the runtime captured at start
//! - Panics inside the application are handler failures, not task crashes
//! - Stop halts accepting only; in-flight requests finish on their own

pub mod dispatcher;
pub mod error;
pub mod host;

pub use dispatcher::Dispatcher;
pub use error::{describe_failure, DispatchError, RequestError, ServerError};
pub use host::{DispatchOptions, DispatchServer, ServerState};
