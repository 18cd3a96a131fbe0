use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Shared expiry for whichever operation is currently pending.
///
/// `None` means no deadline (infinite). Whoever issues a blocking
/// operation sets the deadline right before it and clears it right after
/// it succeeds; the [`Watchdog`](crate::Watchdog) watches every change.
///
/// Once the owning client is stopped the deadline is frozen and every
/// mutation is ignored.
#[derive(Clone)]
pub struct Deadline {
    tx: Arc<watch::Sender<Option<Instant>>>,
    stopped: CancellationToken,
}

impl Deadline {
    pub fn new(stopped: CancellationToken) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            stopped,
        }
    }

    pub fn expires_after(&self, timeout: Duration) {
        self.expires_at(Instant::now() + timeout);
    }

    pub fn expires_at(&self, at: Instant) {
        if self.stopped.is_cancelled() {
            return;
        }
        self.tx.send_replace(Some(at));
    }

    /// Resets the deadline to infinite.
    pub fn clear(&self) {
        if self.stopped.is_cancelled() {
            return;
        }
        self.tx.send_if_modified(|expiry| expiry.take().is_some());
    }

    /// Resets the deadline only if it still equals `expired`.
    ///
    /// Returns false when a newer deadline was set in the meantime, which
    /// must then be left alone.
    pub fn clear_if(&self, expired: Instant) -> bool {
        if self.stopped.is_cancelled() {
            return false;
        }
        self.tx.send_if_modified(|expiry| {
            if *expiry == Some(expired) {
                *expiry = None;
                true
            } else {
                false
            }
        })
    }

    pub fn expiry(&self) -> Option<Instant> {
        *self.tx.borrow()
    }

    pub fn has_expired(&self) -> bool {
        self.expiry().is_some_and(|at| at <= Instant::now())
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Instant>> {
        self.tx.subscribe()
    }
}

impl std::fmt::Debug for Deadline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deadline")
            .field("expiry", &self.expiry())
            .field("stopped", &self.stopped.is_cancelled())
            .finish()
    }
}
