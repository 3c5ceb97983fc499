//! Per-request dispatch.
//!
//! # Responsibilities
//! - Hand every raw context to its own task without blocking the listener
//! - Drive the application through create, process, start and dispose
//! - Recover handler failures with a synthetic 500, or abort once bytes are out
//! - Close the raw response exactly once, on every exit path
//!
//! # Failure Domains
//! ```text
//! on_context        scheduling failed           → log ON_CONTEXT, abandon
//! process_request   feature context failed      → log FEATURE_CONTEXT, abort
//!   dispatch        handler failed              → log PROCESS_REQUEST, 500 or abort
//!                   error response write failed → log OUTER_PROCESS_REQUEST, abort
//!                   anything that panics        → log OUTER_PROCESS_REQUEST, abort
//! ```

use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::app::{ApplicationContext, ErasedApplication};
use crate::features::{panic_message, FeatureContext, HttpResponseFeature};
use crate::headers::HeaderCollection;
use crate::net::{RawContext, RawResponse};
use crate::observability::events;
use crate::server::error::{describe_failure, DispatchError, RequestError};

/// Closes the raw response when dropped.
struct FinalizeGuard(RawResponse);

impl Drop for FinalizeGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// A handler failure together with the context the application must dispose.
struct HandlerFailure {
    context: Option<ApplicationContext>,
    error: RequestError,
}

/// Schedules and runs every accepted request.
pub struct Dispatcher {
    application: Box<dyn ErasedApplication>,
    runtime: Handle,
    admission: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    /// `max_in_flight` bounds concurrently running requests; `None` admits all.
    pub fn new(
        application: Box<dyn ErasedApplication>,
        runtime: Handle,
        max_in_flight: Option<usize>,
    ) -> Self {
        Self {
            application,
            runtime,
            admission: max_in_flight.map(|limit| Arc::new(Semaphore::new(limit))),
        }
    }

    /// Listener callback. Schedules the request and returns immediately.
    pub fn on_context(self: &Arc<Self>, raw: RawContext) {
        let connection_id = raw.connection_id();

        let permit = match &self.admission {
            Some(semaphore) => match Arc::clone(semaphore).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(e) => {
                    tracing::error!(
                        event = events::ON_CONTEXT,
                        connection_id = %connection_id,
                        error = %e,
                        "Failed to schedule request, abandoning connection"
                    );
                    return;
                }
            },
            None => None,
        };

        let span = tracing::info_span!(
            "request",
            connection_id = %connection_id,
            method = %raw.request.method,
            target = %raw.request.target,
        );
        let dispatcher = Arc::clone(self);
        self.runtime.spawn(
            async move {
                let _permit = permit;
                dispatcher.process_request(raw).await;
            }
            .instrument(span),
        );
    }

    /// Outer failure domain of one request. Aborts on any escaping failure.
    async fn process_request(&self, raw: RawContext) {
        let _finalize = FinalizeGuard(raw.response.clone());

        match AssertUnwindSafe(self.dispatch(&raw)).catch_unwind().await {
            Ok(Ok(())) => return,
            Ok(Err(DispatchError::FeatureContext(e))) => {
                tracing::error!(
                    event = events::FEATURE_CONTEXT,
                    error = %describe_failure(&e),
                    "Failed to build feature context, aborting connection"
                );
            }
            Ok(Err(e)) => {
                tracing::error!(
                    event = events::OUTER_PROCESS_REQUEST,
                    error = %describe_failure(&e),
                    "Request dispatch failed, aborting connection"
                );
            }
            Err(payload) => {
                tracing::error!(
                    event = events::OUTER_PROCESS_REQUEST,
                    panic = %panic_message(&payload),
                    "Request dispatch panicked, aborting connection"
                );
            }
        }

        raw.response.abort();
    }

    async fn dispatch(&self, raw: &RawContext) -> Result<(), DispatchError> {
        let context = FeatureContext::new(raw).map_err(DispatchError::FeatureContext)?;

        let outcome = context.run_to_completion(self.run_application(&context)).await;
        let (app_context, failure) = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(HandlerFailure { context, error })) => (context, error),
            Err(payload) => (None, RequestError::Panicked(panic_message(&payload))),
        };

        tracing::error!(
            event = events::PROCESS_REQUEST,
            error = %describe_failure(&failure),
            "Request processing failed"
        );

        let started = context
            .features()
            .get::<HttpResponseFeature>()
            .map_or(true, HttpResponseFeature::has_started);
        let recovery = if started {
            raw.response.abort();
            Ok(())
        } else {
            write_error_response(&raw.response, &failure)
        };

        if let Some(app_context) = app_context {
            self.application.dispose_context(app_context, Some(&failure));
        }

        recovery.map_err(DispatchError::Recovery)
    }

    /// Inner failure domain: create, process, start, dispose on success.
    ///
    /// Once a context exists, every failure after it, panics included, is
    /// returned with the context attached.
    async fn run_application(&self, features: &FeatureContext) -> Result<(), HandlerFailure> {
        let created = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.application.create_context(features.features())
        }));
        let mut app_context = match created {
            Ok(Ok(app_context)) => app_context,
            Ok(Err(e)) => {
                return Err(HandlerFailure {
                    context: None,
                    error: RequestError::CreateContext(e),
                })
            }
            Err(payload) => {
                return Err(HandlerFailure {
                    context: None,
                    error: RequestError::Panicked(panic_message(&payload)),
                })
            }
        };

        let processed = AssertUnwindSafe(async {
            self.application
                .process_request(&mut app_context)
                .await
                .map_err(RequestError::Process)?;
            features.on_start().await.map_err(RequestError::Start)
        })
        .catch_unwind()
        .await;

        let result = match processed {
            Ok(result) => result,
            Err(payload) => Err(RequestError::Panicked(panic_message(&payload))),
        };

        match result {
            Ok(()) => {
                self.application.dispose_context(app_context, None);
                Ok(())
            }
            Err(error) => Err(HandlerFailure {
                context: Some(app_context),
                error,
            }),
        }
    }
}

/// Replace whatever was staged with a 500 carrying the failure description.
fn write_error_response(response: &RawResponse, failure: &RequestError) -> std::io::Result<()> {
    response.headers().clear();
    response.set_status_code(500);
    response.set_content_length(Some(0));
    response
        .output_stream()
        .write_all(describe_failure(failure).as_bytes())
}
