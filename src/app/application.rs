//! Typed application trait and its type-erased adapter.

use std::any::Any;
use std::future::Future;

use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;

use crate::features::Features;
use crate::server::RequestError;
use crate::BoxError;

/// A request-processing application with its own per-request context.
pub trait HttpApplication: Send + Sync + 'static {
    /// Per-request state, owned by the application between create and dispose.
    type Context: Send + 'static;

    /// Build the per-request context from the request's features.
    fn create_context(&self, features: &Features) -> Result<Self::Context, BoxError>;

    /// Process one request.
    fn process_request<'a>(
        &'a self,
        context: &'a mut Self::Context,
    ) -> impl Future<Output = Result<(), BoxError>> + Send + 'a;

    /// Release the context. `failure` is the error that ended the request, if any.
    fn dispose_context(&self, context: Self::Context, failure: Option<&RequestError>);
}

/// An application context with its concrete type erased.
pub struct ApplicationContext(Box<dyn Any + Send>);

impl ApplicationContext {
    fn new<T: Send + 'static>(context: T) -> Self {
        Self(Box::new(context))
    }
}

impl std::fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApplicationContext(..)")
    }
}

/// Object-safe form of [`HttpApplication`] used by the dispatcher.
pub trait ErasedApplication: Send + Sync {
    fn create_context(&self, features: &Features) -> Result<ApplicationContext, BoxError>;

    fn process_request<'a>(
        &'a self,
        context: &'a mut ApplicationContext,
    ) -> BoxFuture<'a, Result<(), BoxError>>;

    fn dispose_context(&self, context: ApplicationContext, failure: Option<&RequestError>);
}

/// Adapts an [`HttpApplication`] to [`ErasedApplication`].
pub struct ApplicationWrapper<A> {
    inner: A,
}

impl<A: HttpApplication> ApplicationWrapper<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: HttpApplication> ErasedApplication for ApplicationWrapper<A> {
    fn create_context(&self, features: &Features) -> Result<ApplicationContext, BoxError> {
        self.inner
            .create_context(features)
            .map(ApplicationContext::new)
    }

    fn process_request<'a>(
        &'a self,
        context: &'a mut ApplicationContext,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        match context.0.downcast_mut::<A::Context>() {
            Some(context) => self.inner.process_request(context).boxed(),
            None => future::ready(Err(BoxError::from(
                "application context has an unexpected type",
            )))
            .boxed(),
        }
    }

    fn dispose_context(&self, context: ApplicationContext, failure: Option<&RequestError>) {
        match context.0.downcast::<A::Context>() {
            Ok(context) => self.inner.dispose_context(*context, failure),
            Err(_) => {
                tracing::error!("Dropping application context of an unexpected type");
            }
        }
    }
}
