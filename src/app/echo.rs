//! Echo application served by the `dispatch-host` binary.
//!
//! Replies with the request line and body as plain text. Paths ending in
//! `/fail` error before writing; paths ending in `/fail-late` error after
//! writing part of the body.

use std::future::Future;

use crate::features::{Features, HttpRequestFeature, HttpResponseFeature};
use crate::server::RequestError;
use crate::BoxError;

use super::HttpApplication;

/// Per-request state of [`EchoApplication`].
pub struct EchoContext {
    request: HttpRequestFeature,
    response: HttpResponseFeature,
}

#[derive(Debug, Clone, Default)]
pub struct EchoApplication;

impl HttpApplication for EchoApplication {
    type Context = EchoContext;

    fn create_context(&self, features: &Features) -> Result<EchoContext, BoxError> {
        let request = features
            .get::<HttpRequestFeature>()
            .cloned()
            .ok_or_else(|| BoxError::from("request feature is missing"))?;
        let response = features
            .get::<HttpResponseFeature>()
            .cloned()
            .ok_or_else(|| BoxError::from("response feature is missing"))?;
        Ok(EchoContext { request, response })
    }

    fn process_request<'a>(
        &'a self,
        context: &'a mut EchoContext,
    ) -> impl Future<Output = Result<(), BoxError>> + Send + 'a {
        async move {
            let request = &context.request;
            let response = &context.response;
            let path = request.path();

            if path.ends_with("/fail") {
                return Err(BoxError::from("echo failure requested"));
            }
            if path.ends_with("/fail-late") {
                response.write(b"partial").await?;
                return Err(BoxError::from("echo failure requested after start"));
            }

            let mut body = format!("{} {}\n", request.method(), request.target()).into_bytes();
            body.extend_from_slice(&request.body());

            let length = i64::try_from(body.len())?;
            response.with_headers(|headers| {
                headers.set("Content-Type", "text/plain; charset=utf-8");
                headers.set_content_length(Some(length))
            })??;
            response.write(&body).await?;
            Ok(())
        }
    }

    fn dispose_context(&self, context: EchoContext, failure: Option<&RequestError>) {
        if let Some(failure) = failure {
            tracing::debug!(
                path = context.request.path(),
                error = %failure,
                "Echo request ended with a failure"
            );
        }
    }
}
