//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! listener, server and feature layers produce:
//!     → tracing events (structured fields, `event` identifier per failure boundary)
//!     → per-request spans (connection id, method, target)
//!
//! logging.rs installs the subscriber:
//!     → EnvFilter (RUST_LOG, else configured level)
//!     → fmt layer (pretty or JSON)
//! ```
//!
//! # Design Decisions
//! - Structured logging only; this layer keeps no other global state
//! - Every failure boundary logs with a distinct `event` identifier

pub mod logging;

pub use logging::init_logging;

/// `event` field values, one per failure boundary in the dispatch path.
pub mod events {
    /// A request could not be scheduled onto a worker.
    pub const ON_CONTEXT: &str = "on_context";
    /// The feature context could not be built.
    pub const FEATURE_CONTEXT: &str = "feature_context";
    /// The application failed while handling the request.
    pub const PROCESS_REQUEST: &str = "process_request";
    /// Anything that escaped the handler failure path.
    pub const OUTER_PROCESS_REQUEST: &str = "outer_process_request";
    /// A completion callback failed.
    pub const ON_COMPLETED: &str = "on_completed";
}
