//! Response feature: status, headers and body for one request.
//!
//! # Responsibilities
//! - Stage status and headers until the response starts
//! - Run on-starting callbacks, then commit the staged head to the raw response
//! - Run completion callbacks exactly once
//!
//! # Design Decisions
//! - Headers live in the raw response's store; only status and length are committed on start
//! - Callbacks run in reverse registration order
//! - No lock is held while a callback future is awaited

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::features::FeatureError;
use crate::headers::{HeaderDictionary, HeaderValues, SharedHeaders};
use crate::net::RawResponse;
use crate::observability::events;
use crate::BoxError;

/// A deferred response lifecycle action.
pub type LifecycleCallback = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

struct ResponseState {
    status_code: u16,
    headers: HeaderDictionary<SharedHeaders>,
    has_started: bool,
    completed: bool,
    on_starting: Vec<LifecycleCallback>,
    on_completed: Vec<LifecycleCallback>,
}

/// Write access to the outbound response.
#[derive(Clone)]
pub struct HttpResponseFeature {
    state: Arc<Mutex<ResponseState>>,
    raw: RawResponse,
}

fn boxed_callback<F, Fut>(f: F) -> LifecycleCallback
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Box::new(move || f().boxed())
}

impl HttpResponseFeature {
    pub fn new(raw: RawResponse) -> Self {
        Self {
            state: Arc::new(Mutex::new(ResponseState {
                status_code: 200,
                headers: HeaderDictionary::new(raw.headers()),
                has_started: false,
                completed: false,
                on_starting: Vec::new(),
                on_completed: Vec::new(),
            })),
            raw,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ResponseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether status and headers have been committed.
    pub fn has_started(&self) -> bool {
        self.lock().has_started
    }

    pub fn status_code(&self) -> u16 {
        self.lock().status_code
    }

    pub fn set_status_code(&self, status_code: u16) -> Result<(), FeatureError> {
        let mut state = self.lock();
        if state.has_started {
            return Err(FeatureError::ResponseStarted);
        }
        if !(100..=999).contains(&status_code) {
            return Err(FeatureError::InvalidStatusCode(status_code));
        }
        state.status_code = status_code;
        Ok(())
    }

    /// All values of a response header; empty when absent.
    pub fn header(&self, name: &str) -> HeaderValues {
        self.lock().headers.get(name)
    }

    /// Mutate the response headers. Fails once the response has started.
    pub fn with_headers<R>(
        &self,
        f: impl FnOnce(&mut HeaderDictionary<SharedHeaders>) -> R,
    ) -> Result<R, FeatureError> {
        let mut state = self.lock();
        if state.has_started {
            return Err(FeatureError::ResponseStarted);
        }
        Ok(f(&mut state.headers))
    }

    pub fn content_length(&self) -> Option<u64> {
        self.lock().headers.content_length()
    }

    pub fn set_content_length(&self, length: Option<i64>) -> Result<(), FeatureError> {
        self.with_headers(|headers| headers.set_content_length(length))??;
        Ok(())
    }

    /// Register an action to run just before the response starts.
    pub fn on_starting<F, Fut>(&self, f: F) -> Result<(), FeatureError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let mut state = self.lock();
        if state.has_started {
            return Err(FeatureError::ResponseStarted);
        }
        state.on_starting.push(boxed_callback(f));
        Ok(())
    }

    /// Register an action to run after the request has been processed.
    pub fn on_completed<F, Fut>(&self, f: F) -> Result<(), FeatureError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let mut state = self.lock();
        if state.completed {
            return Err(FeatureError::ResponseCompleted);
        }
        state.on_completed.push(boxed_callback(f));
        Ok(())
    }

    /// Start the response: run on-starting callbacks and commit the head.
    ///
    /// Does nothing when already started. A failing callback leaves the
    /// response unstarted.
    pub async fn start(&self) -> Result<(), FeatureError> {
        let callbacks = {
            let mut state = self.lock();
            if state.has_started {
                return Ok(());
            }
            std::mem::take(&mut state.on_starting)
        };

        for callback in callbacks.into_iter().rev() {
            callback().await.map_err(FeatureError::Callback)?;
        }

        let mut state = self.lock();
        state.has_started = true;
        self.raw.set_status_code(state.status_code);
        let length = state.headers.content_length();
        self.raw.set_content_length(length);
        Ok(())
    }

    /// Write body bytes, starting the response first if needed.
    pub async fn write(&self, chunk: &[u8]) -> Result<(), FeatureError> {
        self.start().await?;
        self.raw.write(chunk)?;
        Ok(())
    }

    /// Run completion callbacks. Only the first call has any effect.
    pub(crate) async fn complete(&self) {
        let callbacks = {
            let mut state = self.lock();
            if state.completed {
                return;
            }
            state.completed = true;
            std::mem::take(&mut state.on_completed)
        };

        for callback in callbacks.into_iter().rev() {
            if let Err(e) = callback().await {
                tracing::warn!(
                    event = events::ON_COMPLETED,
                    error = %e,
                    "Completion callback failed"
                );
            }
        }
    }
}

impl std::fmt::Debug for HttpResponseFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("HttpResponseFeature")
            .field("status_code", &state.status_code)
            .field("has_started", &state.has_started)
            .field("completed", &state.completed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{ResponseHead, ResponseSink};

    struct NullSink;

    impl ResponseSink for NullSink {
        fn write(&mut self, _chunk: &[u8]) -> std::io::Result<()> {
            Ok(())
        }

        fn abort(&mut self) {}

        fn close(&mut self, _head: ResponseHead) {}
    }

    fn feature() -> (HttpResponseFeature, RawResponse) {
        let raw = RawResponse::new(NullSink);
        (HttpResponseFeature::new(raw.clone()), raw)
    }

    #[tokio::test]
    async fn test_start_commits_status_and_length() {
        let (response, raw) = feature();
        response.set_status_code(201).unwrap();
        response.set_content_length(Some(5)).unwrap();

        response.write(b"hello").await.unwrap();

        assert!(response.has_started());
        assert_eq!(raw.status_code(), 201);
        assert_eq!(raw.content_length(), Some(5));
        assert_eq!(raw.bytes_written(), 5);
    }

    #[tokio::test]
    async fn test_head_frozen_after_start() {
        let (response, _raw) = feature();
        response.start().await.unwrap();

        assert!(matches!(
            response.set_status_code(404),
            Err(FeatureError::ResponseStarted)
        ));
        assert!(response.with_headers(|h| h.set("X-Late", "1")).is_err());
        assert!(response.on_starting(|| async { Ok(()) }).is_err());
    }

    #[test]
    fn test_status_code_range() {
        let (response, _raw) = feature();
        assert!(matches!(
            response.set_status_code(42),
            Err(FeatureError::InvalidStatusCode(42))
        ));
        assert_eq!(response.status_code(), 200);
    }

    #[tokio::test]
    async fn test_callbacks_run_in_reverse_order() {
        let (response, _raw) = feature();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second"] {
            let order = order.clone();
            response
                .on_starting(move || async move {
                    order.lock().unwrap().push(name);
                    Ok(())
                })
                .unwrap();
        }

        response.start().await.unwrap();
        response.start().await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_failing_on_starting_leaves_response_unstarted() {
        let (response, raw) = feature();
        response
            .on_starting(|| async { Err::<(), BoxError>("denied".into()) })
            .unwrap();

        assert!(matches!(
            response.start().await,
            Err(FeatureError::Callback(_))
        ));
        assert!(!response.has_started());
        assert_eq!(raw.bytes_written(), 0);
    }

    #[tokio::test]
    async fn test_complete_runs_once() {
        let (response, _raw) = feature();
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        response
            .on_completed(move || async move {
                *counter.lock().unwrap() += 1;
                Ok(())
            })
            .unwrap();

        response.complete().await;
        response.complete().await;

        assert_eq!(*count.lock().unwrap(), 1);
        assert!(matches!(
            response.on_completed(|| async { Ok(()) }),
            Err(FeatureError::ResponseCompleted)
        ));
    }
}
