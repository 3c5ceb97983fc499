//! Feature context built for every accepted request.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;

use crate::features::{FeatureError, Features, HttpRequestFeature, HttpResponseFeature};
use crate::net::RawContext;

/// Payload of a caught panic.
pub type PanicPayload = Box<dyn Any + Send>;

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &PanicPayload) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Capability bag plus the start/completed lifecycle of one request.
pub struct FeatureContext {
    features: Features,
    request: HttpRequestFeature,
    response: HttpResponseFeature,
}

impl FeatureContext {
    /// Wrap a raw context. Fails when the request line cannot be represented.
    pub fn new(raw: &RawContext) -> Result<Self, FeatureError> {
        let request = HttpRequestFeature::new(&raw.request)?;
        let response = HttpResponseFeature::new(raw.response.clone());

        let mut features = Features::new();
        features.set(request.clone());
        features.set(response.clone());

        Ok(Self {
            features,
            request,
            response,
        })
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    pub fn request(&self) -> &HttpRequestFeature {
        &self.request
    }

    pub fn response(&self) -> &HttpResponseFeature {
        &self.response
    }

    /// Start the response if the application has not already done so.
    pub async fn on_start(&self) -> Result<(), FeatureError> {
        self.response.start().await
    }

    /// Run completion callbacks. Idempotent.
    pub async fn on_completed(&self) {
        self.response.complete().await;
    }

    /// Drive `body`, then run [`on_completed`](Self::on_completed) whether it
    /// returned or panicked.
    pub async fn run_to_completion<F: Future>(&self, body: F) -> Result<F::Output, PanicPayload> {
        let outcome = AssertUnwindSafe(body).catch_unwind().await;
        self.on_completed().await;
        outcome
    }
}
