//! Request dispatch host library.
//!
//! Bridges a socket-level HTTP listener to an application pipeline, isolating
//! every request's failures and always finalizing its connection.

// Leaf data types
pub mod headers;
pub mod net;

// Request pipeline
pub mod app;
pub mod features;
pub mod server;

// Cross-cutting concerns
pub mod config;
pub mod observability;

/// Boxed error returned by applications and lifecycle callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use app::{EchoApplication, HttpApplication};
pub use config::HostConfig;
pub use features::{FeatureContext, Features, HttpRequestFeature, HttpResponseFeature};
pub use headers::{HeaderDictionary, HeaderValues};
pub use net::{Listener, TcpHttpListener};
pub use server::{DispatchServer, RequestError, ServerError};
