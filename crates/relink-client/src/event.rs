use std::net::SocketAddr;

use tokio::sync::mpsc;

/// Something observable that happened inside a client.
///
/// Events are best effort: they are dropped once the receiver is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Connecting { endpoint: SocketAddr },
    ConnectTimedOut { endpoint: SocketAddr },
    ConnectFailed { endpoint: SocketAddr, reason: String },
    Connected { endpoint: SocketAddr, attempts: usize },
    /// The watchdog closed the connection because a deadline passed
    DeadlineExpired,
    Sent { len: usize },
    Received { len: usize },
    Stopped,
}

/// Optional sender half of the event stream.
#[derive(Debug, Clone, Default)]
pub struct EventEmitter {
    tx: Option<mpsc::UnboundedSender<ClientEvent>>,
}

impl EventEmitter {
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn emit(&self, event: ClientEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
