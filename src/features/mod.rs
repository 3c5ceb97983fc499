//! Per-request feature layer.
//!
//! # Data Flow
//! ```text
//! RawContext
//!     → context.rs (FeatureContext::new: validate request line, build features)
//!     → collection.rs (Features: type map handed to the application)
//!         ├── request.rs  (HttpRequestFeature: method, path, headers, body)
//!         └── response.rs (HttpResponseFeature: status, headers, body, hooks)
//!     → on_start  (run on-starting callbacks, commit status/length to raw response)
//!     → on_completed (run completion callbacks, exactly once)
//! ```
//!
//! # Design Decisions
//! - Features are cheap handles; the application keeps clones in its context
//! - Response metadata is frozen once the response has started
//! - Completion callbacks never fail the request; their errors are logged

pub mod collection;
pub mod context;
pub mod request;
pub mod response;

use thiserror::Error;

use crate::headers::HeaderError;
use crate::BoxError;

pub use collection::Features;
pub use context::{panic_message, FeatureContext, PanicPayload};
pub use request::HttpRequestFeature;
pub use response::{HttpResponseFeature, LifecycleCallback};

/// Errors raised by the feature layer.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("invalid request method '{0}'")]
    InvalidMethod(String),

    #[error("invalid request target '{target}'")]
    InvalidRequestTarget {
        target: String,
        #[source]
        source: axum::http::uri::InvalidUri,
    },

    #[error("unsupported protocol '{0}'")]
    UnsupportedProtocol(String),

    #[error("the response has already started")]
    ResponseStarted,

    #[error("the response has already completed")]
    ResponseCompleted,

    #[error("status code {0} is out of range")]
    InvalidStatusCode(u16),

    #[error("invalid header")]
    Header(#[from] HeaderError),

    #[error("response lifecycle callback failed")]
    Callback(#[source] BoxError),

    #[error("failed to write the response body")]
    Io(#[from] std::io::Error),
}
