//! Raw request context handed over by a listener.
//!
//! # Responsibilities
//! - Carry the inbound request as the listener parsed it
//! - Expose the outbound response sink: status, headers, length, body, abort, close
//! - Enforce that the sink is finalized exactly once
//!
//! # Design Decisions
//! - `RawResponse` is a cheap handle; the feature layer and the dispatch worker
//!   reference the same response, as the listener owns it
//! - Writes after abort or close fail with `NotConnected` instead of panicking
//! - Dropping the last handle of an unfinished response aborts the sink

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::body::Bytes;

use crate::headers::{HeaderCollection, HeaderValues, RawHeaders, SharedHeaders};
use crate::net::connection::ConnectionId;

/// Transport behind one response, implemented by listeners.
pub trait ResponseSink: Send {
    /// Accept a chunk of body bytes.
    fn write(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Terminate the connection without a well-formed response.
    fn abort(&mut self);

    /// Finalize the response. Called exactly once, after any abort.
    fn close(&mut self, head: ResponseHead);
}

/// Response metadata handed to the sink on close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status_code: u16,
    pub headers: Vec<(String, HeaderValues)>,
    /// Length the handler declared, which may differ from the bytes written.
    pub content_length: Option<u64>,
    pub aborted: bool,
}

/// Inbound half of a raw request context.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: String,
    /// Request target as received (origin-form or absolute-form).
    pub target: String,
    /// Protocol version, e.g. `HTTP/1.1`.
    pub protocol: String,
    pub headers: SharedHeaders,
    pub body: Bytes,
    pub local_addr: Option<SocketAddr>,
    pub remote_addr: Option<SocketAddr>,
    pub connection_id: ConnectionId,
}

impl RawRequest {
    /// An HTTP/1.1 request with no headers and an empty body.
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            protocol: "HTTP/1.1".to_string(),
            headers: SharedHeaders::default(),
            body: Bytes::new(),
            local_addr: None,
            remote_addr: None,
            connection_id: ConnectionId::next(),
        }
    }

    /// Append a request header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.append_values(name, HeaderValues::from(value));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }
}

struct ResponseState {
    headers: SharedHeaders,
    status_code: u16,
    content_length: Option<u64>,
    bytes_written: u64,
    aborted: bool,
    closed: bool,
    sink: Box<dyn ResponseSink>,
}

impl Drop for ResponseState {
    fn drop(&mut self) {
        if !self.closed && !self.aborted {
            tracing::debug!("Raw response dropped without close, aborting");
            self.sink.abort();
        }
    }
}

/// Outbound half of a raw request context.
#[derive(Clone)]
pub struct RawResponse {
    state: Arc<Mutex<ResponseState>>,
}

impl RawResponse {
    /// Wrap a listener's sink. Status defaults to 200.
    pub fn new(sink: impl ResponseSink + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(ResponseState {
                headers: SharedHeaders::new(RawHeaders::new()),
                status_code: 200,
                content_length: None,
                bytes_written: 0,
                aborted: false,
                closed: false,
                sink: Box::new(sink),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ResponseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The outbound header collection.
    pub fn headers(&self) -> SharedHeaders {
        self.lock().headers.clone()
    }

    pub fn status_code(&self) -> u16 {
        self.lock().status_code
    }

    pub fn set_status_code(&self, status_code: u16) {
        self.lock().status_code = status_code;
    }

    pub fn content_length(&self) -> Option<u64> {
        self.lock().content_length
    }

    pub fn set_content_length(&self, length: Option<u64>) {
        self.lock().content_length = length;
    }

    /// Total body bytes accepted by the sink so far.
    pub fn bytes_written(&self) -> u64 {
        self.lock().bytes_written
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().aborted
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Write body bytes to the output stream.
    pub fn write(&self, chunk: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        if state.aborted || state.closed {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "response is already finalized",
            ));
        }
        state.sink.write(chunk)?;
        state.bytes_written += chunk.len() as u64;
        Ok(())
    }

    /// A `std::io::Write` adapter over [`write`](Self::write).
    pub fn output_stream(&self) -> OutputStream {
        OutputStream {
            response: self.clone(),
        }
    }

    /// Hard-terminate the connection. Later calls are no-ops.
    pub fn abort(&self) {
        let mut state = self.lock();
        if state.aborted || state.closed {
            return;
        }
        state.aborted = true;
        state.sink.abort();
    }

    /// Finalize the response sink. Only the first call reaches the sink.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            tracing::trace!("Raw response already closed");
            return;
        }
        state.closed = true;
        let head = ResponseHead {
            status_code: state.status_code,
            headers: state.headers.entries(),
            content_length: state.content_length,
            aborted: state.aborted,
        };
        state.sink.close(head);
    }
}

impl std::fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RawResponse")
            .field("status_code", &state.status_code)
            .field("content_length", &state.content_length)
            .field("bytes_written", &state.bytes_written)
            .field("aborted", &state.aborted)
            .field("closed", &state.closed)
            .finish()
    }
}

/// Writable output stream of a [`RawResponse`].
#[derive(Debug)]
pub struct OutputStream {
    response: RawResponse,
}

impl io::Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.response.write(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// One accepted request: inbound data plus its response sink.
#[derive(Debug, Clone)]
pub struct RawContext {
    pub request: RawRequest,
    pub response: RawResponse,
}

impl RawContext {
    pub fn new(request: RawRequest, sink: impl ResponseSink + 'static) -> Self {
        Self {
            request,
            response: RawResponse::new(sink),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.request.connection_id
    }
}
