//! relink Client
//!
//! A TCP client that walks an ordered list of endpoints until one accepts,
//! then trades NUL-terminated messages with it, one request and one reply
//! at a time.
//!
//! # Architecture
//!
//! - **[`Connector`]**: tries endpoints in order, one deadline per attempt
//! - **[`Exchange`]**: the write-then-read loop over an established stream
//! - **[`Watchdog`]**: closes the connection when the shared [`Deadline`] passes
//! - **[`Lifecycle`]**: the stopped flag and the one shutdown path
//!
//! # Example
//!
//! ```no_run
//! use relink_client::{Client, Termination};
//! use relink_common::{ClientConfig, Endpoints};
//!
//! # async fn example() -> relink_common::Result<()> {
//! let endpoints = Endpoints::parse(["127.0.0.1:7000", "127.0.0.1:7001"])?;
//! let messages = vec![b"hello".to_vec()].into_iter();
//! let print = |reply: &[u8]| println!("{}", String::from_utf8_lossy(reply));
//!
//! let handle = Client::new(ClientConfig::default(), messages, print)?.start(endpoints);
//! match handle.join().await {
//!     Termination::InputClosed => println!("done"),
//!     other => eprintln!("stopped: {}", other),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod connector;
pub mod deadline;
pub mod event;
pub mod exchange;
pub mod lifecycle;
pub mod watchdog;

#[cfg(test)]
mod test_support;

pub use client::{Client, ClientHandle, Stopper};
pub use connection::{Connection, ConnectionState, Socket};
pub use connector::{Connector, Dialer, Established, TcpDialer};
pub use deadline::Deadline;
pub use event::{ClientEvent, EventEmitter};
pub use exchange::{Exchange, ExchangeState, Heartbeat, MessageSink, MessageSource};
pub use lifecycle::{Lifecycle, Termination};
pub use watchdog::Watchdog;
