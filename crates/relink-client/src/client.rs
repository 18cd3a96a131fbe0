use relink_common::error::{RelinkError, Result};
use relink_common::{ClientConfig, Endpoints};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::ConnectionState;
use crate::connector::{Connector, Dialer, TcpDialer};
use crate::deadline::Deadline;
use crate::event::{ClientEvent, EventEmitter};
use crate::exchange::{Exchange, MessageSink, MessageSource};
use crate::lifecycle::{Lifecycle, Termination};
use crate::watchdog::Watchdog;

/// Relink client
///
/// Connects to the first reachable endpoint of a list, then exchanges
/// NUL-terminated messages with it until stopped. A single deadline
/// guards whichever connect, read or write is pending.
pub struct Client<D = TcpDialer> {
    config: ClientConfig,
    dialer: D,
    source: Box<dyn MessageSource>,
    sink: Box<dyn MessageSink>,
    events: EventEmitter,
}

impl Client<TcpDialer> {
    /// Create a client that dials plain TCP
    pub fn new(
        config: ClientConfig,
        source: impl MessageSource + 'static,
        sink: impl MessageSink + 'static,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            dialer: TcpDialer,
            source: Box::new(source),
            sink: Box::new(sink),
            events: EventEmitter::disabled(),
        })
    }
}

impl<D: Dialer> Client<D> {
    /// Replace the dialer used for connect attempts
    pub fn with_dialer<T: Dialer>(self, dialer: T) -> Client<T> {
        Client {
            config: self.config,
            dialer,
            source: self.source,
            sink: self.sink,
            events: self.events,
        }
    }

    /// Subscribe to [`ClientEvent`]s. Only the latest subscriber receives them.
    pub fn events(&mut self) -> UnboundedReceiver<ClientEvent> {
        let (emitter, rx) = EventEmitter::channel();
        self.events = emitter;
        rx
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start connecting to `endpoints`, in order.
    ///
    /// Spawns the watchdog and the session onto the current runtime and
    /// returns immediately.
    pub fn start(self, endpoints: Endpoints) -> ClientHandle {
        let Client {
            config,
            dialer,
            source,
            sink,
            events,
        } = self;

        let lifecycle = Lifecycle::new(events.clone());
        let deadline = Deadline::new(lifecycle.token());

        let watchdog = Watchdog::new(
            deadline.clone(),
            lifecycle.connection().clone(),
            lifecycle.token(),
            events.clone(),
        )
        .spawn();

        info!(endpoints = %endpoints, "Starting client");

        let session = {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move {
                let connector = Connector::new(
                    dialer,
                    config.connect_timeout,
                    lifecycle.clone(),
                    deadline.clone(),
                    events.clone(),
                );

                let Some(established) = connector.connect(&endpoints).await else {
                    return;
                };

                Exchange::new(
                    established.stream,
                    established.socket,
                    &config,
                    source,
                    sink,
                    lifecycle,
                    deadline,
                    events,
                )
                .run()
                .await;
            })
        };

        ClientHandle {
            lifecycle,
            session,
            watchdog,
        }
    }
}

/// Handle to a started client.
pub struct ClientHandle {
    lifecycle: Lifecycle,
    session: JoinHandle<()>,
    watchdog: JoinHandle<()>,
}

impl ClientHandle {
    /// Stop the client. Safe to call any number of times; only the first
    /// call returns true.
    pub fn stop(&self) -> bool {
        self.lifecycle.stop()
    }

    pub fn is_stopped(&self) -> bool {
        self.lifecycle.is_stopped()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.lifecycle.connection().state()
    }

    /// A second handle that can stop the client while another task joins it.
    pub fn stopper(&self) -> Stopper {
        Stopper {
            lifecycle: self.lifecycle.clone(),
        }
    }

    /// Wait for the client to stop and report why it did.
    pub async fn join(self) -> Termination {
        if let Err(e) = self.session.await {
            warn!(error = %e, "Client session task failed");
            self.lifecycle
                .stop_with(Termination::Failed(RelinkError::Connection(format!(
                    "Session task failed: {}",
                    e
                ))));
        }

        // The session only returns once stopped; make sure of it anyway
        self.lifecycle.stop();
        if let Err(e) = self.watchdog.await {
            debug!(error = %e, "Watchdog task failed");
        }

        self.lifecycle
            .take_termination()
            .unwrap_or(Termination::Requested)
    }
}

/// Cloneable stop switch for a started client.
#[derive(Clone)]
pub struct Stopper {
    lifecycle: Lifecycle,
}

impl Stopper {
    pub fn stop(&self) -> bool {
        self.lifecycle.stop()
    }

    pub fn is_stopped(&self) -> bool {
        self.lifecycle.is_stopped()
    }
}
