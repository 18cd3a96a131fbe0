use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use relink_common::Endpoints;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::connection::Socket;
use crate::deadline::Deadline;
use crate::event::{ClientEvent, EventEmitter};
use crate::lifecycle::{Lifecycle, Termination};

/// Opens transport streams to endpoints.
///
/// [`TcpDialer`] is the production implementation; tests plug in
/// in-memory streams.
pub trait Dialer: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn dial(&self, endpoint: SocketAddr) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Dials plain TCP connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

impl Dialer for TcpDialer {
    type Stream = TcpStream;

    fn dial(&self, endpoint: SocketAddr) -> impl Future<Output = io::Result<TcpStream>> + Send {
        TcpStream::connect(endpoint)
    }
}

/// A connection handed from the connector to the exchange loop.
pub struct Established<S> {
    pub stream: S,
    pub socket: Socket,
    pub endpoint: SocketAddr,
    pub attempts: usize,
}

/// Walks the endpoint list until one connect attempt succeeds.
pub struct Connector<D> {
    dialer: D,
    timeout: Duration,
    lifecycle: Lifecycle,
    deadline: Deadline,
    events: EventEmitter,
}

impl<D: Dialer> Connector<D> {
    pub fn new(
        dialer: D,
        timeout: Duration,
        lifecycle: Lifecycle,
        deadline: Deadline,
        events: EventEmitter,
    ) -> Self {
        Self {
            dialer,
            timeout,
            lifecycle,
            deadline,
            events,
        }
    }

    /// Tries each endpoint in order, each under its own deadline.
    ///
    /// A refused or unreachable endpoint and an endpoint whose attempt was
    /// closed by the watchdog are handled the same way: the attempt is
    /// discarded and the next endpoint is tried. When the list runs out
    /// the client is stopped with [`Termination::ConnectFailed`].
    ///
    /// Returns `None` if no connection was established, either because
    /// every endpoint failed or because the client was stopped meanwhile.
    pub async fn connect(&self, endpoints: &Endpoints) -> Option<Established<D::Stream>> {
        let connection = self.lifecycle.connection();

        for (index, &endpoint) in endpoints.iter().enumerate() {
            if self.lifecycle.is_stopped() {
                return None;
            }

            let attempt = index + 1;
            info!(endpoint = %endpoint, attempt, "Trying to connect");
            self.events.emit(ClientEvent::Connecting { endpoint });

            let socket = match connection.open() {
                Ok(socket) => socket,
                Err(e) => {
                    warn!(error = %e, "Cannot open socket");
                    return None;
                }
            };

            self.deadline.expires_after(self.timeout);

            let result = tokio::select! {
                biased;
                _ = socket.closed() => None,
                dialed = self.dialer.dial(endpoint) => Some(dialed),
            };

            if self.lifecycle.is_stopped() {
                return None;
            }

            match result {
                Some(Ok(stream)) if socket.is_open() && connection.mark_connected(&socket) => {
                    self.deadline.clear();
                    info!(endpoint = %endpoint, attempt, "Connected");
                    self.events.emit(ClientEvent::Connected { endpoint, attempts: attempt });
                    return Some(Established {
                        stream,
                        socket,
                        endpoint,
                        attempts: attempt,
                    });
                }
                Some(Err(e)) if socket.is_open() => {
                    self.deadline.clear();
                    warn!(endpoint = %endpoint, error = %e, "Connect error");
                    self.events.emit(ClientEvent::ConnectFailed {
                        endpoint,
                        reason: e.to_string(),
                    });
                    connection.discard(&socket);
                }
                _ => {
                    // The watchdog closed the socket first
                    warn!(endpoint = %endpoint, timeout_ms = self.timeout.as_millis() as u64, "Connect timed out");
                    self.events.emit(ClientEvent::ConnectTimedOut { endpoint });
                    connection.discard(&socket);
                }
            }
        }

        self.lifecycle.stop_with(Termination::ConnectFailed {
            attempts: endpoints.len(),
        });
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use crate::test_support::{Plan, ScriptedDialer};
    use crate::watchdog::Watchdog;
    use tokio::time::Instant;

    struct Fixture {
        connector: Connector<ScriptedDialer>,
        lifecycle: Lifecycle,
        events: tokio::sync::mpsc::UnboundedReceiver<ClientEvent>,
    }

    fn fixture(dialer: ScriptedDialer) -> Fixture {
        let (emitter, events) = EventEmitter::channel();
        let lifecycle = Lifecycle::new(emitter.clone());
        let deadline = Deadline::new(lifecycle.token());
        Watchdog::new(
            deadline.clone(),
            lifecycle.connection().clone(),
            lifecycle.token(),
            emitter.clone(),
        )
        .spawn();
        let connector = Connector::new(
            dialer,
            Duration::from_secs(60),
            lifecycle.clone(),
            deadline,
            emitter,
        );
        Fixture {
            connector,
            lifecycle,
            events,
        }
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ClientEvent>) -> Vec<ClientEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_connects_to_first_reachable_endpoint() {
        let endpoints = Endpoints::parse(["10.0.0.1:7000", "10.0.0.2:7000", "10.0.0.3:7000"]).unwrap();
        let addrs: Vec<SocketAddr> = endpoints.iter().copied().collect();
        let (peer, _remote) = tokio::io::duplex(64);
        let dialer = ScriptedDialer::new()
            .plan(addrs[0], Plan::Refuse)
            .plan(addrs[1], Plan::Hang)
            .plan(addrs[2], Plan::Accept(peer));

        let mut fx = fixture(dialer.clone());
        let started = Instant::now();
        let established = fx.connector.connect(&endpoints).await.expect("should connect");

        assert_eq!(established.endpoint, addrs[2]);
        assert_eq!(established.attempts, 3);
        assert!(established.socket.is_open());
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert_eq!(dialer.attempts(), addrs);
        assert_eq!(fx.lifecycle.connection().state(), ConnectionState::Connected);
        assert!(!fx.lifecycle.is_stopped());

        let events = drain(&mut fx.events);
        assert_eq!(events[0], ClientEvent::Connecting { endpoint: addrs[0] });
        assert!(matches!(events[1], ClientEvent::ConnectFailed { endpoint, .. } if endpoint == addrs[0]));
        assert_eq!(events[2], ClientEvent::Connecting { endpoint: addrs[1] });
        assert!(events.contains(&ClientEvent::ConnectTimedOut { endpoint: addrs[1] }));
        assert_eq!(
            events.last(),
            Some(&ClientEvent::Connected { endpoint: addrs[2], attempts: 3 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_endpoints_stop_once() {
        let endpoints = Endpoints::parse(["10.0.0.1:7000", "10.0.0.2:7000"]).unwrap();
        let addrs: Vec<SocketAddr> = endpoints.iter().copied().collect();
        let dialer = ScriptedDialer::new()
            .plan(addrs[0], Plan::Hang)
            .plan(addrs[1], Plan::Refuse);

        let mut fx = fixture(dialer.clone());
        assert!(fx.connector.connect(&endpoints).await.is_none());

        assert!(fx.lifecycle.is_stopped());
        assert_eq!(dialer.attempts(), addrs);
        match fx.lifecycle.take_termination() {
            Some(Termination::ConnectFailed { attempts }) => assert_eq!(attempts, 2),
            other => panic!("Expected ConnectFailed, got {:?}", other),
        }

        let events = drain(&mut fx.events);
        let stops = events.iter().filter(|e| **e == ClientEvent::Stopped).count();
        assert_eq!(stops, 1);
        assert!(!events.iter().any(|e| matches!(e, ClientEvent::Connected { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_endpoint_list() {
        let fx = fixture(ScriptedDialer::new());
        assert!(fx.connector.connect(&Endpoints::default()).await.is_none());
        assert!(matches!(
            fx.lifecycle.take_termination(),
            Some(Termination::ConnectFailed { attempts: 0 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_attempt_is_not_a_timeout() {
        let endpoints = Endpoints::parse(["10.0.0.1:7000", "10.0.0.2:7000"]).unwrap();
        let addrs: Vec<SocketAddr> = endpoints.iter().copied().collect();
        let dialer = ScriptedDialer::new().plan(addrs[0], Plan::Hang);

        let mut fx = fixture(dialer.clone());
        let lifecycle = fx.lifecycle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            lifecycle.stop();
        });

        assert!(fx.connector.connect(&endpoints).await.is_none());
        assert_eq!(dialer.attempts(), vec![addrs[0]]);
        assert!(matches!(fx.lifecycle.take_termination(), Some(Termination::Requested)));

        let events = drain(&mut fx.events);
        assert!(!events.iter().any(|e| matches!(e, ClientEvent::ConnectTimedOut { .. })));
    }

    #[tokio::test]
    async fn test_tcp_dialer_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(TcpDialer.dial(addr).await.is_err());
    }
}
