//! In-memory dialer and peer used by the unit tests.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use relink_common::transport::{encode_reply, FrameCodec, HANDSHAKE_PROBE};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::codec::Decoder;

use crate::connector::Dialer;

/// What a dial to one address does.
pub enum Plan {
    Refuse,
    Hang,
    Accept(DuplexStream),
}

/// Dialer whose outcome per address is scripted up front.
///
/// Addresses without a plan are refused. An `Accept` plan is used once.
#[derive(Clone, Default)]
pub struct ScriptedDialer {
    plans: Arc<Mutex<HashMap<SocketAddr, Plan>>>,
    attempts: Arc<Mutex<Vec<SocketAddr>>>,
}

impl ScriptedDialer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(self, addr: SocketAddr, plan: Plan) -> Self {
        self.plans.lock().unwrap().insert(addr, plan);
        self
    }

    pub fn attempts(&self) -> Vec<SocketAddr> {
        self.attempts.lock().unwrap().clone()
    }
}

impl Dialer for ScriptedDialer {
    type Stream = DuplexStream;

    fn dial(&self, endpoint: SocketAddr) -> impl Future<Output = io::Result<DuplexStream>> + Send {
        self.attempts.lock().unwrap().push(endpoint);
        let plan = {
            let mut plans = self.plans.lock().unwrap();
            match plans.get(&endpoint) {
                Some(Plan::Hang) => Some(Plan::Hang),
                _ => plans.remove(&endpoint),
            }
        };

        async move {
            match plan {
                Some(Plan::Accept(stream)) => Ok(stream),
                Some(Plan::Hang) => std::future::pending::<io::Result<DuplexStream>>().await,
                _ => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
            }
        }
    }
}

/// Reads NUL-terminated frames from the client side of a duplex pipe.
pub struct Peer {
    stream: DuplexStream,
    codec: FrameCodec,
    buffer: BytesMut,
}

impl Peer {
    pub fn new(stream: DuplexStream) -> Self {
        Self {
            stream,
            codec: FrameCodec::default().without_prefix(),
            buffer: BytesMut::new(),
        }
    }

    /// Next frame with any handshake probe bytes removed; `None` on EOF.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buffer).unwrap() {
                let start = frame
                    .iter()
                    .position(|b| !HANDSHAKE_PROBE.contains(b))
                    .unwrap_or(frame.len());
                return Some(frame[start..].to_vec());
            }
            match self.stream.read_buf(&mut self.buffer).await {
                Ok(0) | Err(_) => return None,
                Ok(_) => {}
            }
        }
    }

    pub async fn reply(&mut self, prefix: u8, payload: &[u8]) {
        let mut out = BytesMut::new();
        encode_reply(prefix, payload, &mut out);
        self.stream.write_all(&out).await.unwrap();
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Everything received so far that has not been consumed as a frame.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Waits until at least `len` raw bytes are buffered.
    pub async fn fill(&mut self, len: usize) {
        while self.buffer.len() < len {
            if self.stream.read_buf(&mut self.buffer).await.unwrap() == 0 {
                return;
            }
        }
    }
}
