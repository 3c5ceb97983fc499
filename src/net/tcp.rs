//! TCP listener over hyper.
//!
//! # Responsibilities
//! - Turn listen prefixes into bound sockets
//! - Accept connections under a connection limit
//! - Drive each connection with hyper, adapting every request into a `RawContext`
//! - Complete the hyper response when the raw response is closed or aborted
//!
//! # Design Decisions
//! - Semaphore backpressure: a permit is held for the lifetime of a connection
//! - Bodies are buffered in both directions up to `max_body_bytes`
//! - Abort is surfaced to hyper as a service error, which drops the connection
//! - Requests outside every registered prefix path are answered 404 here

use std::collections::BTreeMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use url::{Host, Url};

use crate::config::ListenerConfig;
use crate::headers::{HeaderCollection, RawHeaders, SharedHeaders, CONTENT_LENGTH};
use crate::net::connection::ConnectionId;
use crate::net::context::{RawContext, RawRequest, ResponseHead, ResponseSink};
use crate::net::listener::{ContextCallback, Listener, ListenerError, Prefixes};

/// Returned to hyper when a raw response was aborted.
#[derive(Debug, Error)]
#[error("connection aborted by the request handler")]
pub struct ConnectionAborted;

type Completion = Result<Response<Body>, ConnectionAborted>;

struct Running {
    shutdown: watch::Sender<bool>,
    accept_tasks: Vec<JoinHandle<()>>,
    local_addrs: Vec<SocketAddr>,
}

/// A [`Listener`] accepting HTTP/1.1 and HTTP/2 over plain TCP.
pub struct TcpHttpListener {
    prefixes: Prefixes,
    config: ListenerConfig,
    running: Option<Running>,
}

impl TcpHttpListener {
    pub fn new(config: ListenerConfig) -> Self {
        Self {
            prefixes: Prefixes::new(),
            config,
            running: None,
        }
    }

    /// Addresses actually bound, useful when a prefix asked for port 0.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.running
            .as_ref()
            .map(|running| running.local_addrs.clone())
            .unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl Listener for TcpHttpListener {
    fn prefixes_mut(&mut self) -> &mut Prefixes {
        &mut self.prefixes
    }

    fn start(&mut self, on_context: ContextCallback) -> Result<(), ListenerError> {
        if self.running.is_some() {
            return Err(ListenerError::AlreadyStarted);
        }
        if self.prefixes.is_empty() {
            return Err(ListenerError::NoPrefixes);
        }
        let runtime = Handle::try_current().map_err(|_| ListenerError::NoRuntime)?;

        // Bind everything before spawning so a failure leaves nothing running.
        let listeners = plan_bindings(&self.prefixes)?
            .into_iter()
            .map(|(address, paths)| bind(address).map(|listener| (listener, paths)))
            .collect::<Result<Vec<_>, _>>()?;

        let limit = Arc::new(Semaphore::new(self.config.max_connections));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut running = Running {
            shutdown,
            accept_tasks: Vec::with_capacity(listeners.len()),
            local_addrs: Vec::with_capacity(listeners.len()),
        };

        for (listener, paths) in listeners {
            let local_addr = listener.local_addr().map_err(|source| ListenerError::Bind {
                address: "<bound socket>".to_string(),
                source,
            })?;
            tracing::info!(
                address = %local_addr,
                paths = ?paths,
                max_connections = self.config.max_connections,
                "Listener bound"
            );
            running.local_addrs.push(local_addr);
            running.accept_tasks.push(runtime.spawn(accept_loop(
                listener,
                AcceptContext {
                    local_addr,
                    paths: Arc::new(paths),
                    on_context: Arc::clone(&on_context),
                    limit: Arc::clone(&limit),
                    max_body_bytes: self.config.max_body_bytes,
                },
                shutdown_rx.clone(),
            )));
        }

        self.running = Some(running);
        Ok(())
    }

    fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        tracing::info!(addresses = ?running.local_addrs, "Listener stopping");
        let _ = running.shutdown.send(true);
        for task in running.accept_tasks {
            task.abort();
        }
    }
}

impl Drop for TcpHttpListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Group prefixes by socket address, keeping each address's path prefixes.
fn plan_bindings(prefixes: &Prefixes) -> Result<BTreeMap<SocketAddr, Vec<String>>, ListenerError> {
    let mut bindings: BTreeMap<SocketAddr, Vec<String>> = BTreeMap::new();
    for prefix in prefixes {
        let (address, path) = parse_prefix(prefix)?;
        let paths = bindings.entry(address).or_default();
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    Ok(bindings)
}

/// Split `http://host:port/path/` into a socket address and a path prefix.
///
/// `+` and `*` hosts bind every interface.
fn parse_prefix(prefix: &str) -> Result<(SocketAddr, String), ListenerError> {
    let invalid = |reason: String| ListenerError::InvalidPrefix {
        prefix: prefix.to_string(),
        reason,
    };

    let normalized = prefix
        .replacen("://+", "://0.0.0.0", 1)
        .replacen("://*", "://0.0.0.0", 1);
    let url = Url::parse(&normalized).map_err(|e| invalid(e.to_string()))?;

    match url.scheme() {
        "http" => {}
        "https" => return Err(invalid("TLS termination is not supported".to_string())),
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    }

    let port = url
        .port_or_known_default()
        .ok_or_else(|| invalid("missing port".to_string()))?;
    let address = match url.host() {
        Some(Host::Ipv4(ip)) => SocketAddr::new(ip.into(), port),
        Some(Host::Ipv6(ip)) => SocketAddr::new(ip.into(), port),
        Some(Host::Domain(domain)) => (domain, port)
            .to_socket_addrs()
            .map_err(|e| invalid(e.to_string()))?
            .next()
            .ok_or_else(|| invalid(format!("'{domain}' did not resolve")))?,
        None => return Err(invalid("missing host".to_string())),
    };

    let mut path = url.path().to_string();
    if !path.ends_with('/') {
        path.push('/');
    }
    Ok((address, path))
}

fn bind(address: SocketAddr) -> Result<TcpListener, ListenerError> {
    let bind_error = |source: io::Error| ListenerError::Bind {
        address: address.to_string(),
        source,
    };
    let listener = std::net::TcpListener::bind(address).map_err(bind_error)?;
    listener.set_nonblocking(true).map_err(bind_error)?;
    TcpListener::from_std(listener).map_err(bind_error)
}

struct AcceptContext {
    local_addr: SocketAddr,
    paths: Arc<Vec<String>>,
    on_context: ContextCallback,
    limit: Arc<Semaphore>,
    max_body_bytes: usize,
}

async fn accept_loop(
    listener: TcpListener,
    context: AcceptContext,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        // Acquire permit first (backpressure)
        let permit = tokio::select! {
            _ = shutdown.changed() => break,
            permit = Arc::clone(&context.limit).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let (stream, remote_addr) = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            },
        };

        tracing::debug!(
            peer_addr = %remote_addr,
            available_permits = context.limit.available_permits(),
            "Connection accepted"
        );

        let connection = HttpConnection {
            connection_id: ConnectionId::next(),
            local_addr: context.local_addr,
            remote_addr,
            paths: Arc::clone(&context.paths),
            on_context: Arc::clone(&context.on_context),
            max_body_bytes: context.max_body_bytes,
        };
        tokio::spawn(serve_connection(stream, connection, permit));
    }

    tracing::info!(address = %context.local_addr, "Accept loop stopped");
}

#[derive(Clone)]
struct HttpConnection {
    connection_id: ConnectionId,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    paths: Arc<Vec<String>>,
    on_context: ContextCallback,
    max_body_bytes: usize,
}

async fn serve_connection(stream: TcpStream, connection: HttpConnection, _permit: OwnedSemaphorePermit) {
    let connection_id = connection.connection_id;
    let service = service_fn(move |request: Request<Incoming>| {
        let connection = connection.clone();
        async move { connection.handle(request).await }
    });

    let builder = Builder::new(TokioExecutor::new());
    if let Err(error) = builder.serve_connection(TokioIo::new(stream), service).await {
        tracing::debug!(connection_id = %connection_id, error = %error, "Connection ended with error");
    }
    tracing::trace!(connection_id = %connection_id, "Connection closed");
}

impl HttpConnection {
    fn accepts(&self, path: &str) -> bool {
        self.paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()) || prefix.strip_suffix('/') == Some(path))
    }

    async fn handle(self, request: Request<Incoming>) -> Completion {
        if !self.accepts(request.uri().path()) {
            return Ok(status_only(StatusCode::NOT_FOUND));
        }

        let (parts, body) = request.into_parts();
        let body = match axum::body::to_bytes(Body::new(body), self.max_body_bytes).await {
            Ok(body) => body,
            Err(error) => {
                tracing::debug!(connection_id = %self.connection_id, error = %error, "Request body rejected");
                return Ok(status_only(StatusCode::PAYLOAD_TOO_LARGE));
            }
        };

        let request = RawRequest {
            method: parts.method.to_string(),
            target: parts.uri.to_string(),
            protocol: format!("{:?}", parts.version),
            headers: SharedHeaders::new(RawHeaders::from_header_map(&parts.headers)),
            body,
            local_addr: Some(self.local_addr),
            remote_addr: Some(self.remote_addr),
            connection_id: self.connection_id,
        };

        let (sink, completion) = HyperSink::new(self.max_body_bytes);
        (self.on_context)(RawContext::new(request, sink));

        // A dropped sender means the context was abandoned.
        completion.await.unwrap_or(Err(ConnectionAborted))
    }
}

fn status_only(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

/// Buffers the body and completes the pending hyper response on close.
struct HyperSink {
    body: Vec<u8>,
    limit: usize,
    completion: Option<oneshot::Sender<Completion>>,
}

impl HyperSink {
    fn new(limit: usize) -> (Self, oneshot::Receiver<Completion>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                body: Vec::new(),
                limit,
                completion: Some(tx),
            },
            rx,
        )
    }
}

impl ResponseSink for HyperSink {
    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        if self.completion.is_none() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection is gone"));
        }
        if self.body.len() + chunk.len() > self.limit {
            return Err(io::Error::other(format!(
                "response body exceeds {} bytes",
                self.limit
            )));
        }
        self.body.extend_from_slice(chunk);
        Ok(())
    }

    fn abort(&mut self) {
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(Err(ConnectionAborted));
        }
    }

    fn close(&mut self, head: ResponseHead) {
        let Some(tx) = self.completion.take() else {
            return;
        };
        let body = std::mem::take(&mut self.body);
        let _ = tx.send(Ok(build_response(head, body)));
    }
}

fn build_response(head: ResponseHead, body: Vec<u8>) -> Response<Body> {
    let mut headers = RawHeaders::new();
    for (name, values) in head.headers {
        headers.set_values(&name, values);
    }
    // hyper frames the buffered body itself.
    headers.remove(CONTENT_LENGTH);
    headers.remove("Transfer-Encoding");

    if let Some(declared) = head.content_length {
        if declared != body.len() as u64 {
            tracing::debug!(
                declared,
                actual = body.len(),
                "Declared content length differs from body, sending actual length"
            );
        }
    }

    let status = StatusCode::from_u16(head.status_code).unwrap_or_else(|_| {
        tracing::warn!(status_code = head.status_code, "Invalid status code, sending 500");
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers.to_header_map();
    response
}
