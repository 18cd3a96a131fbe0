use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_MAX_FRAME_LEN;
use crate::error::{RelinkError, Result};
use crate::transport::codec::{encode_reply, FrameCodec, HANDSHAKE_PROBE};

/// Prefix byte the echo server puts in front of every reply
pub const ECHO_PREFIX: u8 = b'#';

/// Async TCP echo peer speaking the framed protocol.
///
/// Each NUL-terminated frame received is answered with
/// `[ECHO_PREFIX] [frame] [0x00]`. Handshake probe bytes at the start of a
/// frame are dropped before echoing, so a client's initial newline never
/// shows up in a reply.
pub struct EchoServer {
    listener: TcpListener,
    max_frame_len: usize,
}

impl EchoServer {
    /// Creates a new echo server bound to the specified address.
    ///
    /// # Arguments
    /// * `bind_addr` - The address to bind to (e.g., "127.0.0.1:0")
    pub async fn new(bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
            RelinkError::Connection(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;

        Ok(Self {
            listener,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        })
    }

    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| RelinkError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Accepts connections until `shutdown` is cancelled.
    ///
    /// Every connection is served on its own task and keeps echoing until
    /// the peer disconnects or the server shuts down.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(addr = ?self.listener.local_addr().ok(), "Echo server listening");

        loop {
            let (stream, peer_addr) = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Echo server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted.map_err(|e| {
                    RelinkError::Connection(format!("Failed to accept connection: {}", e))
                })?,
            };

            debug!(peer = %peer_addr, "Connection established");

            let codec = FrameCodec::new(self.max_frame_len, self.max_frame_len).without_prefix();
            let shutdown = shutdown.child_token();
            tokio::spawn(async move {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    result = handle_connection(stream, codec) => {
                        if let Err(e) = result {
                            warn!(peer = %peer_addr, error = %e, "Connection error");
                        }
                    }
                }
            });
        }
    }
}

/// Echoes frames on one connection until the peer closes it.
async fn handle_connection(mut stream: TcpStream, mut codec: FrameCodec) -> Result<()> {
    let mut buffer = BytesMut::with_capacity(1024);
    let mut reply = BytesMut::with_capacity(1024);

    loop {
        while let Some(frame) = codec.decode(&mut buffer)? {
            let payload = strip_probes(&frame);
            debug!(len = payload.len(), "Echoing frame");

            reply.clear();
            encode_reply(ECHO_PREFIX, payload, &mut reply);
            stream
                .write_all(&reply)
                .await
                .map_err(|e| RelinkError::from_io(e, "writing reply", None))?;
        }

        let read = stream
            .read_buf(&mut buffer)
            .await
            .map_err(|e| RelinkError::from_io(e, "reading frame", None))?;
        if read == 0 {
            debug!("Connection closed by peer");
            return Ok(());
        }
    }
}

fn strip_probes(frame: &[u8]) -> &[u8] {
    let start = frame
        .iter()
        .position(|b| !HANDSHAKE_PROBE.contains(b))
        .unwrap_or(frame.len());
    &frame[start..]
}
