use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::deadline::Deadline;
use crate::event::{ClientEvent, EventEmitter};

/// Enforces the shared [`Deadline`] by closing the connection.
///
/// The watchdog never knows which operation is pending. When the deadline
/// passes it closes the current socket, which aborts whatever connect,
/// read or write was racing that socket, and resets the deadline to
/// infinite so it does not fire again until the next operation sets one.
pub struct Watchdog {
    deadline: Deadline,
    connection: Connection,
    stopped: CancellationToken,
    events: EventEmitter,
}

impl Watchdog {
    pub fn new(
        deadline: Deadline,
        connection: Connection,
        stopped: CancellationToken,
        events: EventEmitter,
    ) -> Self {
        Self {
            deadline,
            connection,
            stopped,
            events,
        }
    }

    /// Starts the watchdog task. It runs until the client is stopped.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Main loop: sleep until the current expiry or the next change to it
    async fn run(self) {
        let mut expiry_rx = self.deadline.subscribe();

        loop {
            let expiry = *expiry_rx.borrow_and_update();

            tokio::select! {
                biased;

                _ = self.stopped.cancelled() => {
                    debug!("Watchdog stopped");
                    break;
                }

                changed = expiry_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                _ = sleep_until(expiry) => self.check_deadline(),
            }
        }
    }

    /// Handles one wake-up, acting on the deadline as it is now
    fn check_deadline(&self) {
        if self.stopped.is_cancelled() {
            return;
        }

        // The pending operation may have moved or cleared it since the timer fired
        let Some(expired) = self.deadline.expiry() else {
            return;
        };
        if expired > Instant::now() {
            return;
        }

        if self.connection.close() {
            warn!("Deadline expired, closing connection");
            self.events.emit(ClientEvent::DeadlineExpired);
        }
        self.deadline.clear_if(expired);
    }
}

async fn sleep_until(expiry: Option<Instant>) {
    match expiry {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
