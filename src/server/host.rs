//! Server lifecycle over a listener.

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::app::{ApplicationWrapper, HttpApplication};
use crate::config::ServerConfig;
use crate::net::{ContextCallback, Listener, RawContext};
use crate::server::dispatcher::Dispatcher;
use crate::server::error::ServerError;

/// Lifecycle state of a [`DispatchServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Started,
    Stopped,
}

/// Scheduling options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Upper bound on concurrently running requests; `None` means unbounded.
    pub max_in_flight: Option<usize>,
}

impl From<&ServerConfig> for DispatchOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_in_flight: (config.max_in_flight > 0).then_some(config.max_in_flight),
        }
    }
}

/// Bridges a listener to an application.
pub struct DispatchServer<L: Listener> {
    listener: L,
    addresses: Vec<String>,
    options: DispatchOptions,
    state: ServerState,
}

impl<L: Listener> DispatchServer<L> {
    pub fn new(listener: L, addresses: Vec<String>, options: DispatchOptions) -> Self {
        Self {
            listener,
            addresses,
            options,
            state: ServerState::Created,
        }
    }

    pub fn from_config(listener: L, config: &ServerConfig) -> Self {
        Self::new(listener, config.addresses.clone(), DispatchOptions::from(config))
    }

    /// Listen addresses, as configured.
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Mutable listen addresses. Only consulted by [`start`](Self::start).
    pub fn addresses_mut(&mut self) -> &mut Vec<String> {
        &mut self.addresses
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Start serving `application`. Must run inside a tokio runtime.
    pub fn start<A: HttpApplication>(&mut self, application: A) -> Result<(), ServerError> {
        match self.state {
            ServerState::Created => {}
            ServerState::Started => return Err(ServerError::AlreadyStarted),
            ServerState::Stopped => return Err(ServerError::Stopped),
        }
        let runtime = Handle::try_current().map_err(|_| ServerError::NoRuntime)?;

        let dispatcher = Arc::new(Dispatcher::new(
            Box::new(ApplicationWrapper::new(application)),
            runtime,
            self.options.max_in_flight,
        ));

        let prefixes = self.listener.prefixes_mut();
        prefixes.clear();
        for address in &self.addresses {
            if address.ends_with('/') {
                prefixes.add(address.clone());
            } else {
                prefixes.add(format!("{address}/"));
            }
        }

        let on_context: ContextCallback =
            Arc::new(move |raw: RawContext| dispatcher.on_context(raw));
        self.listener.start(on_context)?;
        self.state = ServerState::Started;

        tracing::info!(
            addresses = ?self.addresses,
            max_in_flight = ?self.options.max_in_flight,
            "Dispatch server started"
        );
        Ok(())
    }

    /// Stop accepting. Safe to call in any state, any number of times.
    pub fn stop(&mut self) {
        if self.state == ServerState::Started {
            self.listener.stop();
            tracing::info!("Dispatch server stopped");
        }
        self.state = ServerState::Stopped;
    }
}

impl<L: Listener> Drop for DispatchServer<L> {
    fn drop(&mut self) {
        self.stop();
    }
}
