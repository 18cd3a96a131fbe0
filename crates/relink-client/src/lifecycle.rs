use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use relink_common::error::RelinkError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::event::{ClientEvent, EventEmitter};

/// Why a client stopped.
#[derive(Debug)]
pub enum Termination {
    /// `stop()` was called by the owner of the client
    Requested,
    /// Every candidate endpoint failed or timed out
    ConnectFailed { attempts: usize },
    /// The message source had nothing more to send
    InputClosed,
    /// An established session failed
    Failed(RelinkError),
}

impl Termination {
    pub fn is_error(&self) -> bool {
        matches!(self, Termination::ConnectFailed { .. } | Termination::Failed(_))
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Requested => write!(f, "stopped on request"),
            Termination::ConnectFailed { attempts } => {
                write!(f, "{}", RelinkError::AllEndpointsFailed { attempts: *attempts })
            }
            Termination::InputClosed => write!(f, "input closed"),
            Termination::Failed(e) => write!(f, "{}", e),
        }
    }
}

struct Inner {
    stopped: AtomicBool,
    token: CancellationToken,
    connection: Connection,
    termination: Mutex<Option<Termination>>,
    events: EventEmitter,
}

/// Owner of the stopped flag and the single shutdown path.
///
/// Cloned into every component; all clones share one state.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<Inner>,
}

impl Lifecycle {
    pub fn new(events: EventEmitter) -> Self {
        let token = CancellationToken::new();
        let connection = Connection::new(token.clone());
        Self {
            inner: Arc::new(Inner {
                stopped: AtomicBool::new(false),
                token,
                connection,
                termination: Mutex::new(None),
                events,
            }),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    /// Token cancelled by the shutdown path.
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    /// Completes once the client has been stopped.
    pub async fn stopped(&self) {
        self.inner.token.cancelled().await
    }

    pub fn stop(&self) -> bool {
        self.stop_with(Termination::Requested)
    }

    /// Shuts the client down, recording `reason`.
    ///
    /// Only the first call has any effect: it sets the stopped flag, closes
    /// the connection, and cancels the watchdog and the heartbeat timer.
    /// Later calls return false and leave the recorded reason untouched.
    pub fn stop_with(&self, reason: Termination) -> bool {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            debug!(ignored = %reason, "Client already stopped");
            return false;
        }

        if reason.is_error() {
            warn!(reason = %reason, "Stopping client");
        } else {
            info!(reason = %reason, "Stopping client");
        }

        *self
            .inner
            .termination
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(reason);

        self.inner.token.cancel();
        self.inner.connection.shutdown();
        self.inner.events.emit(ClientEvent::Stopped);
        true
    }

    /// Takes the recorded termination reason, if the client has stopped.
    pub fn take_termination(&self) -> Option<Termination> {
        self.inner
            .termination
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}
