//! Listener-side subsystem: the raw request context and the listener contract.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → tcp.rs (accept loop, connection limit, hyper connection driver)
//!     → context.rs (RawContext: RawRequest + RawResponse over a ResponseSink)
//!     → listener.rs (ContextCallback handed the RawContext)
//!     → server dispatch
//!     → RawResponse::close / RawResponse::abort
//!     → sink completes or drops the hyper response
//! ```
//!
//! # Design Decisions
//! - The dispatch core only sees the `Listener` and `ResponseSink` traits
//! - A raw response is finalized exactly once; abandoning it aborts the sink
//! - The TCP listener buffers bodies in both directions

pub mod connection;
pub mod context;
pub mod listener;
pub mod tcp;

pub use connection::ConnectionId;
pub use context::{OutputStream, RawContext, RawRequest, RawResponse, ResponseHead, ResponseSink};
pub use listener::{ContextCallback, Listener, ListenerError, Prefixes};
pub use tcp::TcpHttpListener;
