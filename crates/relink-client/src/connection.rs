//! The single connection slot of a client.
//!
//! The slot holds at most one socket at a time. Closing a socket cancels
//! its token, and every suspendable operation on that socket races the
//! token, so closing is how a pending connect, read or write is aborted.

use std::sync::{Arc, Mutex, MutexGuard};

use relink_common::error::{RelinkError, Result};
use tokio_util::sync::CancellationToken;

/// Lifecycle of the connection slot.
///
/// `Closed` is terminal: a slot that held a live connection is never
/// reused. A failed connect attempt goes back to `Unconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Connected,
    Closed,
}

/// Handle on one opened socket.
///
/// Completions of an operation must check [`is_open`](Self::is_open)
/// before trusting the result: a closed socket means the watchdog (or a
/// stop) got there first.
#[derive(Debug, Clone)]
pub struct Socket {
    id: u64,
    token: CancellationToken,
}

impl Socket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_open(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Completes once the socket has been closed.
    pub async fn closed(&self) {
        self.token.cancelled().await
    }
}

struct Slot {
    state: ConnectionState,
    current: Option<Socket>,
    next_id: u64,
}

/// Shared connection slot.
///
/// Sockets are children of the client's stop token, so stopping the
/// client closes whatever socket is open.
#[derive(Clone)]
pub struct Connection {
    slot: Arc<Mutex<Slot>>,
    stopped: CancellationToken,
}

impl Connection {
    pub fn new(stopped: CancellationToken) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                state: ConnectionState::Unconnected,
                current: None,
                next_id: 0,
            })),
            stopped,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        // Slot updates cannot panic halfway, so a poisoned lock is still consistent
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> ConnectionState {
        self.slot().state
    }

    pub fn is_open(&self) -> bool {
        self.slot().current.as_ref().is_some_and(Socket::is_open)
    }

    /// Opens a fresh socket for a connect attempt.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` once the slot is closed or the client is
    /// stopped, and `Connection` if a socket is already open.
    pub fn open(&self) -> Result<Socket> {
        let mut slot = self.slot();
        if self.stopped.is_cancelled() || slot.state == ConnectionState::Closed {
            return Err(RelinkError::ConnectionClosed);
        }
        if slot.state != ConnectionState::Unconnected {
            return Err(RelinkError::Connection(format!(
                "cannot open a socket while {:?}",
                slot.state
            )));
        }

        let socket = Socket {
            id: slot.next_id,
            token: self.stopped.child_token(),
        };
        slot.next_id += 1;
        slot.state = ConnectionState::Connecting;
        slot.current = Some(socket.clone());
        Ok(socket)
    }

    /// Promotes a connecting socket to the live connection.
    ///
    /// Returns false if `socket` is no longer the current, open socket.
    pub fn mark_connected(&self, socket: &Socket) -> bool {
        let mut slot = self.slot();
        let current = slot.current.as_ref().is_some_and(|s| s.id == socket.id);
        if !current || !socket.is_open() || slot.state != ConnectionState::Connecting {
            return false;
        }
        slot.state = ConnectionState::Connected;
        true
    }

    /// Closes and forgets a socket whose connect attempt did not succeed.
    pub fn discard(&self, socket: &Socket) {
        socket.token.cancel();
        let mut slot = self.slot();
        if slot.current.as_ref().is_some_and(|s| s.id == socket.id) {
            slot.current = None;
            if slot.state == ConnectionState::Connecting {
                slot.state = ConnectionState::Unconnected;
            }
        }
    }

    /// Closes the current socket, aborting any operation pending on it.
    ///
    /// A connecting socket returns the slot to `Unconnected` so the next
    /// endpoint can be tried; a connected one closes the slot for good.
    /// Returns false if there was nothing open to close.
    pub fn close(&self) -> bool {
        let mut slot = self.slot();
        let Some(socket) = slot.current.take() else {
            return false;
        };
        let was_open = socket.is_open();
        socket.token.cancel();
        slot.state = match slot.state {
            ConnectionState::Connecting => ConnectionState::Unconnected,
            _ => ConnectionState::Closed,
        };
        was_open
    }

    /// Closes the slot permanently. Safe to call any number of times.
    pub fn shutdown(&self) {
        let mut slot = self.slot();
        if let Some(socket) = slot.current.take() {
            socket.token.cancel();
        }
        slot.state = ConnectionState::Closed;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot();
        f.debug_struct("Connection")
            .field("state", &slot.state)
            .field("socket", &slot.current.as_ref().map(Socket::id))
            .finish()
    }
}
