//! Request feature: the inbound request as handlers see it.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::body::Bytes;
use axum::http::{Method, Uri};

use crate::features::FeatureError;
use crate::headers::{HeaderDictionary, HeaderValues, SharedHeaders};
use crate::net::{ConnectionId, RawRequest};

const SUPPORTED_PROTOCOLS: &[&str] = &["HTTP/1.0", "HTTP/1.1", "HTTP/2.0", "HTTP/3.0"];

struct RequestInner {
    method: Method,
    target: String,
    path: String,
    query: Option<String>,
    protocol: String,
    headers: Mutex<HeaderDictionary<SharedHeaders>>,
    body: Bytes,
    local_addr: Option<SocketAddr>,
    remote_addr: Option<SocketAddr>,
    connection_id: ConnectionId,
}

/// Read access to the inbound request.
#[derive(Clone)]
pub struct HttpRequestFeature {
    inner: Arc<RequestInner>,
}

impl HttpRequestFeature {
    /// Validate the raw request line and wrap the request.
    pub fn new(raw: &RawRequest) -> Result<Self, FeatureError> {
        let method = Method::from_bytes(raw.method.as_bytes())
            .map_err(|_| FeatureError::InvalidMethod(raw.method.clone()))?;

        let uri = Uri::try_from(raw.target.as_str()).map_err(|source| {
            FeatureError::InvalidRequestTarget {
                target: raw.target.clone(),
                source,
            }
        })?;

        if !SUPPORTED_PROTOCOLS.contains(&raw.protocol.as_str()) {
            return Err(FeatureError::UnsupportedProtocol(raw.protocol.clone()));
        }

        let path = match uri.path() {
            "" => "/".to_string(),
            path => path.to_string(),
        };

        Ok(Self {
            inner: Arc::new(RequestInner {
                method,
                target: raw.target.clone(),
                path,
                query: uri.query().map(str::to_string),
                protocol: raw.protocol.clone(),
                headers: Mutex::new(HeaderDictionary::new(raw.headers.clone())),
                body: raw.body.clone(),
                local_addr: raw.local_addr,
                remote_addr: raw.remote_addr,
                connection_id: raw.connection_id,
            }),
        })
    }

    fn headers_lock(&self) -> MutexGuard<'_, HeaderDictionary<SharedHeaders>> {
        self.inner.headers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    /// The request target exactly as received.
    pub fn target(&self) -> &str {
        &self.inner.target
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn query(&self) -> Option<&str> {
        self.inner.query.as_deref()
    }

    pub fn protocol(&self) -> &str {
        &self.inner.protocol
    }

    /// All values of a request header; empty when absent.
    pub fn header(&self, name: &str) -> HeaderValues {
        self.headers_lock().get(name)
    }

    /// Run `f` against the request headers.
    pub fn with_headers<R>(&self, f: impl FnOnce(&mut HeaderDictionary<SharedHeaders>) -> R) -> R {
        f(&mut self.headers_lock())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers_lock().content_length()
    }

    pub fn body(&self) -> Bytes {
        self.inner.body.clone()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.inner.connection_id
    }
}

impl std::fmt::Debug for HttpRequestFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRequestFeature")
            .field("method", &self.inner.method)
            .field("target", &self.inner.target)
            .field("protocol", &self.inner.protocol)
            .field("connection_id", &self.inner.connection_id)
            .finish()
    }
}
