//! The steady-state send/receive loop.
//!
//! Once connected, the client alternates strictly between writing one
//! outbound message and reading one inbound frame. Every step is raced
//! against the socket's close token, so the watchdog (or a stop) can abort
//! it at any point.
//!
//! ```text
//! Handshake ──> AwaitingOutbound ──> AwaitingInbound
//!                     ^                    │
//!                     └────────────────────┘
//! ```

use std::future::Future;
use std::io;
use std::time::Duration;

use bytes::BytesMut;
use relink_common::error::RelinkError;
use relink_common::transport::{FrameCodec, HANDSHAKE_PROBE};
use relink_common::ClientConfig;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::connection::Socket;
use crate::deadline::Deadline;
use crate::event::{ClientEvent, EventEmitter};
use crate::lifecycle::{Lifecycle, Termination};

/// Supplies outbound messages.
///
/// Called synchronously from the exchange loop and allowed to block
/// (e.g. waiting for a line of console input). `None` ends the session.
pub trait MessageSource: Send {
    fn next_message(&mut self) -> Option<Vec<u8>>;
}

impl<I> MessageSource for I
where
    I: Iterator<Item = Vec<u8>> + Send,
{
    fn next_message(&mut self) -> Option<Vec<u8>> {
        self.next()
    }
}

/// Receives every non-empty inbound message.
pub trait MessageSink: Send {
    fn deliver(&mut self, message: &[u8]);
}

impl<F> MessageSink for F
where
    F: FnMut(&[u8]) + Send,
{
    fn deliver(&mut self, message: &[u8]) {
        self(message)
    }
}

/// Source that only ever produces empty (heartbeat) messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct Heartbeat;

impl Iterator for Heartbeat {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        Some(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Handshake,
    AwaitingOutbound,
    AwaitingInbound,
}

/// Exchange loop over one established stream.
pub struct Exchange<S> {
    stream: S,
    socket: Socket,
    state: ExchangeState,
    codec: FrameCodec,
    buffer: BytesMut,
    source: Box<dyn MessageSource>,
    sink: Box<dyn MessageSink>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    heartbeat_interval: Option<Duration>,
    lifecycle: Lifecycle,
    deadline: Deadline,
    events: EventEmitter,
}

impl<S> Exchange<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stream: S,
        socket: Socket,
        config: &ClientConfig,
        source: Box<dyn MessageSource>,
        sink: Box<dyn MessageSink>,
        lifecycle: Lifecycle,
        deadline: Deadline,
        events: EventEmitter,
    ) -> Self {
        let state = if config.handshake {
            ExchangeState::Handshake
        } else {
            ExchangeState::AwaitingOutbound
        };

        Self {
            stream,
            socket,
            state,
            codec: FrameCodec::new(config.max_message_len, config.max_frame_len),
            buffer: BytesMut::with_capacity(1024),
            source,
            sink,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            heartbeat_interval: config.heartbeat_interval,
            lifecycle,
            deadline,
            events,
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Runs until the client is stopped.
    ///
    /// Every exit path goes through the lifecycle's shutdown, so when this
    /// returns the client is stopped.
    pub async fn run(mut self) {
        loop {
            if self.lifecycle.is_stopped() {
                return;
            }

            let next = match self.state {
                ExchangeState::Handshake => self.send_handshake().await,
                ExchangeState::AwaitingOutbound => self.send_next().await,
                ExchangeState::AwaitingInbound => self.receive_next().await,
            };

            match next {
                Some(state) => {
                    debug!(from = ?self.state, to = ?state, "Exchange transition");
                    self.state = state;
                }
                None => return,
            }
        }
    }

    async fn send_handshake(&mut self) -> Option<ExchangeState> {
        self.write_guarded(HANDSHAKE_PROBE, "writing handshake").await?;
        debug!("Handshake probe sent");
        Some(ExchangeState::AwaitingOutbound)
    }

    async fn send_next(&mut self) -> Option<ExchangeState> {
        if let Some(interval) = self.heartbeat_interval {
            let stopped = self.lifecycle.token();
            tokio::select! {
                biased;
                _ = stopped.cancelled() => return None,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        let Some(message) = next_outbound(self.source.as_mut()) else {
            self.lifecycle.stop_with(Termination::InputClosed);
            return None;
        };

        // The source may have blocked for a long time
        if self.lifecycle.is_stopped() {
            return None;
        }

        let mut frame = BytesMut::new();
        if let Err(e) = self.codec.encode(&message[..], &mut frame) {
            return self.fail(e);
        }

        self.write_guarded(&frame, "writing message").await?;

        let len = frame.len() - 1;
        debug!(len, "Message sent");
        self.events.emit(ClientEvent::Sent { len });
        Some(ExchangeState::AwaitingInbound)
    }

    async fn receive_next(&mut self) -> Option<ExchangeState> {
        if let Some(timeout) = self.read_timeout {
            self.deadline.expires_after(timeout);
        }

        loop {
            match self.codec.decode(&mut self.buffer) {
                Ok(Some(message)) => {
                    self.deadline.clear();
                    self.events.emit(ClientEvent::Received { len: message.len() });
                    // Empty messages are heartbeats
                    if !message.is_empty() {
                        debug!(len = message.len(), "Message received");
                        self.sink.deliver(&message);
                    }
                    return Some(ExchangeState::AwaitingOutbound);
                }
                Ok(None) => {}
                Err(e) => return self.fail(e),
            }

            let stream = &mut self.stream;
            let buffer = &mut self.buffer;
            let result = race_close(&self.socket, stream.read_buf(buffer)).await;

            if self.lifecycle.is_stopped() {
                return None;
            }

            match result {
                Some(Ok(0)) if self.socket.is_open() => {
                    return self.fail(RelinkError::ConnectionClosed);
                }
                Some(Ok(_)) if self.socket.is_open() => {}
                Some(Err(e)) if self.socket.is_open() => {
                    return self.fail(RelinkError::from_io(e, "reading frame", self.read_timeout));
                }
                _ => return self.fail(RelinkError::ConnectionClosed),
            }
        }
    }

    /// Writes `bytes` completely under the write deadline.
    async fn write_guarded(&mut self, bytes: &[u8], context: &str) -> Option<()> {
        if let Some(timeout) = self.write_timeout {
            self.deadline.expires_after(timeout);
        }

        let stream = &mut self.stream;
        let result = race_close(&self.socket, async move {
            stream.write_all(bytes).await?;
            stream.flush().await
        })
        .await;

        if self.lifecycle.is_stopped() {
            return None;
        }

        match result {
            Some(Ok(())) if self.socket.is_open() => {
                self.deadline.clear();
                Some(())
            }
            Some(Err(e)) if self.socket.is_open() => {
                self.fail(RelinkError::from_io(e, context, self.write_timeout))
            }
            _ => self.fail(RelinkError::ConnectionClosed),
        }
    }

    fn fail<T>(&self, error: RelinkError) -> Option<T> {
        match self.state {
            ExchangeState::AwaitingInbound => warn!(error = %error, "Error on receive"),
            _ => warn!(error = %error, "Error on send"),
        }
        self.lifecycle.stop_with(Termination::Failed(error));
        None
    }
}

/// Pulls the next message, letting the runtime move other tasks off this
/// worker while the source blocks.
///
/// `block_in_place` is only available on the multi-threaded runtime; on a
/// current-thread runtime the source is called directly.
fn next_outbound(source: &mut dyn MessageSource) -> Option<Vec<u8>> {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(|| source.next_message()),
        _ => source.next_message(),
    }
}

/// Runs `op` unless the socket is closed first (`None`).
async fn race_close<T, F>(socket: &Socket, op: F) -> Option<io::Result<T>>
where
    F: Future<Output = io::Result<T>>,
{
    tokio::select! {
        biased;
        _ = socket.closed() => None,
        result = op => Some(result),
    }
}
