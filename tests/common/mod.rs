//! Shared utilities for dispatch tests.

#![allow(dead_code)]

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{watch, Semaphore};

use dispatch_host::features::{Features, HttpRequestFeature, HttpResponseFeature};
use dispatch_host::net::{
    ContextCallback, Listener, ListenerError, Prefixes, RawContext, RawRequest, ResponseHead,
    ResponseSink,
};
use dispatch_host::server::{describe_failure, RequestError};
use dispatch_host::{BoxError, HttpApplication};

const WAIT: Duration = Duration::from_secs(5);

/// Everything a [`RecordingSink`] observed.
#[derive(Debug, Default)]
pub struct SinkLog {
    pub written: Vec<u8>,
    pub aborts: usize,
    pub closes: Vec<ResponseHead>,
}

/// A response sink that records every call.
#[derive(Clone)]
pub struct RecordingSink {
    log: Arc<Mutex<SinkLog>>,
    fail_writes: bool,
    // (aborts, closes)
    progress: Arc<watch::Sender<(usize, usize)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            log: Arc::default(),
            fail_writes: false,
            progress: Arc::new(watch::channel((0, 0)).0),
        }
    }

    /// A sink whose every body write fails.
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::new()
        }
    }

    pub fn log(&self) -> MutexGuard<'_, SinkLog> {
        self.log.lock().unwrap()
    }

    pub fn body(&self) -> String {
        String::from_utf8_lossy(&self.log().written).into_owned()
    }

    /// The single head handed over on close.
    pub fn head(&self) -> ResponseHead {
        let log = self.log();
        assert_eq!(log.closes.len(), 1, "expected exactly one close");
        log.closes[0].clone()
    }

    /// Wait until the response has been closed.
    pub async fn closed(&self) {
        self.wait_for(|(_, closes)| closes > 0).await;
    }

    /// Wait until the response has been aborted.
    pub async fn aborted(&self) {
        self.wait_for(|(aborts, _)| aborts > 0).await;
    }

    async fn wait_for(&self, done: impl Fn((usize, usize)) -> bool) {
        let mut rx = self.progress.subscribe();
        tokio::time::timeout(WAIT, rx.wait_for(|progress| done(*progress)))
            .await
            .expect("response never finished")
            .expect("progress channel closed");
    }

    /// A raw context for `method target` answered through this sink.
    pub fn context(&self, method: &str, target: &str) -> RawContext {
        RawContext::new(RawRequest::new(method, target), self.clone())
    }
}

impl ResponseSink for RecordingSink {
    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"));
        }
        self.log().written.extend_from_slice(chunk);
        Ok(())
    }

    fn abort(&mut self) {
        self.log().aborts += 1;
        self.progress.send_modify(|(aborts, _)| *aborts += 1);
    }

    fn close(&mut self, head: ResponseHead) {
        self.log().closes.push(head);
        self.progress.send_modify(|(_, closes)| *closes += 1);
    }
}

/// A listener driven by hand: tests deliver raw contexts directly.
#[derive(Default)]
pub struct ManualListener {
    prefixes: Prefixes,
    callback: Mutex<Option<ContextCallback>>,
    starts: AtomicUsize,
    stops: Arc<AtomicUsize>,
}

impl ManualListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefixes(&self) -> &Prefixes {
        &self.prefixes
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Stop counter that outlives the listener.
    pub fn stops(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.stops)
    }

    /// Hand a raw context to the server, as an accept loop would.
    pub fn deliver(&self, raw: RawContext) {
        let callback = self
            .callback
            .lock()
            .unwrap()
            .clone()
            .expect("listener has not been started");
        callback(raw);
    }
}

impl Listener for ManualListener {
    fn prefixes_mut(&mut self) -> &mut Prefixes {
        &mut self.prefixes
    }

    fn start(&mut self, on_context: ContextCallback) -> Result<(), ListenerError> {
        if self.prefixes.is_empty() {
            return Err(ListenerError::NoPrefixes);
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.callback.lock().unwrap() = Some(on_context);
        Ok(())
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.callback.lock().unwrap().take();
    }
}

/// Lifecycle events recorded by [`ScriptedApp`], as `(path, event)`.
pub type EventLog = Arc<Mutex<Vec<(String, String)>>>;

/// Test application whose behavior is picked by request path.
///
/// - `/ok` writes `ok`
/// - `/empty` sets status 204 and writes nothing
/// - `/fail-early` stages a header, then fails without writing
/// - `/fail-late` writes `partial`, then fails
/// - `/panic` panics inside process
/// - `/panic-on-start` registers an on-starting hook that panics
/// - `/create-fails` fails context creation
/// - `/create-panics` panics during context creation
/// - `/gated` waits for [`ScriptedApp::open_gate`], then writes `gated`
#[derive(Clone)]
pub struct ScriptedApp {
    events: EventLog,
    gate: Arc<Semaphore>,
}

pub struct ScriptedContext {
    path: String,
    response: HttpResponseFeature,
}

impl ScriptedApp {
    pub fn new() -> Self {
        Self {
            events: EventLog::default(),
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    pub fn events(&self) -> EventLog {
        Arc::clone(&self.events)
    }

    /// Events recorded for one path, in order.
    pub fn events_for(&self, path: &str) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Let `count` gated requests proceed.
    pub fn open_gate(&self, count: usize) {
        self.gate.add_permits(count);
    }

    fn record(&self, path: &str, event: impl Into<String>) {
        record(&self.events, path, event);
    }
}

async fn explode_on_start() -> Result<(), BoxError> {
    panic!("starting hook exploded")
}

fn record(events: &EventLog, path: &str, event: impl Into<String>) {
    events
        .lock()
        .unwrap()
        .push((path.to_string(), event.into()));
}

impl HttpApplication for ScriptedApp {
    type Context = ScriptedContext;

    fn create_context(&self, features: &Features) -> Result<ScriptedContext, BoxError> {
        let request = features
            .get::<HttpRequestFeature>()
            .ok_or("request feature is missing")?;
        let response = features
            .get::<HttpResponseFeature>()
            .cloned()
            .ok_or("response feature is missing")?;
        let path = request.path().to_string();

        self.record(&path, "create");
        match path.as_str() {
            "/create-fails" => return Err("context refused".into()),
            "/create-panics" => panic!("constructor exploded"),
            _ => {}
        }

        for event in ["on_starting", "on_completed"] {
            let events = self.events();
            let hook_path = path.clone();
            let hook = move || async move {
                record(&events, &hook_path, event);
                Ok(())
            };
            if event == "on_starting" {
                response.on_starting(hook)?;
            } else {
                response.on_completed(hook)?;
            }
        }
        // Registered last, so it runs before the recording hook.
        if path == "/panic-on-start" {
            response.on_starting(explode_on_start)?;
        }

        Ok(ScriptedContext { path, response })
    }

    fn process_request<'a>(
        &'a self,
        context: &'a mut ScriptedContext,
    ) -> impl Future<Output = Result<(), BoxError>> + Send + 'a {
        async move {
            self.record(&context.path, "process");
            let response = &context.response;
            match context.path.as_str() {
                "/ok" => {
                    response.with_headers(|headers| headers.set("Content-Type", "text/plain"))?;
                    response.write(b"ok").await?;
                    Ok(())
                }
                "/empty" => {
                    response.set_status_code(204)?;
                    Ok(())
                }
                "/fail-early" => {
                    response.with_headers(|headers| headers.set("X-Partial", "1"))?;
                    response.set_status_code(202)?;
                    Err("boom".into())
                }
                "/fail-late" => {
                    response.write(b"partial").await?;
                    Err("late boom".into())
                }
                "/panic" => panic!("handler exploded"),
                "/panic-on-start" => Ok(()),
                "/gated" => {
                    let permit = self.gate.acquire().await?;
                    permit.forget();
                    response.write(b"gated").await?;
                    Ok(())
                }
                other => Err(format!("no script for {other}").into()),
            }
        }
    }

    fn dispose_context(&self, context: ScriptedContext, failure: Option<&RequestError>) {
        let event = match failure {
            Some(failure) => format!("dispose: {}", describe_failure(failure)),
            None => "dispose".to_string(),
        };
        self.record(&context.path, event);
    }
}
