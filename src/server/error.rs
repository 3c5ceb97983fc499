//! Error types of the dispatch server.

use std::error::Error as StdError;

use thiserror::Error;

use crate::features::FeatureError;
use crate::net::ListenerError;
use crate::BoxError;

/// Why one request's handling failed. Handed to the application on dispose.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("failed to create the application context")]
    CreateContext(#[source] BoxError),

    #[error("application failed to process the request")]
    Process(#[source] BoxError),

    #[error("failed to start the response")]
    Start(#[source] FeatureError),

    #[error("request handler panicked: {0}")]
    Panicked(String),
}

/// Failures of the outer dispatch domain. Always end in an abort.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to build the feature context")]
    FeatureContext(#[source] FeatureError),

    #[error("failed to write the error response")]
    Recovery(#[source] std::io::Error),
}

/// Errors surfaced to the caller of the server lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server has already been started")]
    AlreadyStarted,

    #[error("server has been stopped")]
    Stopped,

    #[error("server must be started inside a tokio runtime")]
    NoRuntime,

    #[error("listener failed to start")]
    Listener(#[from] ListenerError),
}

/// An error and its source chain, joined with `": "`.
pub fn describe_failure(error: &(dyn StdError + 'static)) -> String {
    let mut description = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        description.push_str(": ");
        description.push_str(&cause.to_string());
        source = cause.source();
    }
    description
}
