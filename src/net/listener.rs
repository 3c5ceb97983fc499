//! Listener contract consumed by the dispatch server.
//!
//! # Responsibilities
//! - Define the start/stop lifecycle of a socket-level listener
//! - Define the per-request callback the listener invokes
//! - Hold the prefix list consumed before start
//!
//! # Design Decisions
//! - The callback is synchronous; it must only schedule work, never run it
//! - Prefixes are plain data, normalized by the server before start

use std::sync::Arc;

use thiserror::Error;

use crate::net::context::RawContext;

/// Invoked once per accepted request.
pub type ContextCallback = Arc<dyn Fn(RawContext) + Send + Sync>;

/// Errors raised while starting a listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The listener was started twice.
    #[error("listener is already running")]
    AlreadyStarted,

    /// No prefix was registered before start.
    #[error("no listen prefixes registered")]
    NoPrefixes,

    /// A prefix could not be turned into a bind address.
    #[error("invalid prefix '{prefix}': {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    /// Binding a socket failed.
    #[error("failed to bind {address}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Start was called outside a tokio runtime.
    #[error("listener must be started inside a tokio runtime")]
    NoRuntime,
}

/// A socket-level HTTP listener.
pub trait Listener: Send {
    /// Mutable prefix list, read when [`start`](Self::start) is called.
    fn prefixes_mut(&mut self) -> &mut Prefixes;

    /// Begin accepting, handing every request to `on_context`.
    fn start(&mut self, on_context: ContextCallback) -> Result<(), ListenerError>;

    /// Stop accepting new connections. Safe to call repeatedly.
    fn stop(&mut self);
}

/// Ordered list of listen prefixes, e.g. `http://127.0.0.1:8080/api/`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prefixes(Vec<String>);

impl Prefixes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, prefix: impl Into<String>) {
        self.0.push(prefix.into());
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a Prefixes {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
