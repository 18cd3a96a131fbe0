use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::{DEFAULT_MAX_FRAME_LEN, DEFAULT_MAX_MESSAGE_LEN};
use crate::error::{RelinkError, Result};

/// Byte that terminates every frame on the wire
pub const TERMINATOR: u8 = 0x00;

/// One-time probe written right after connecting, before any framed message
pub const HANDSHAKE_PROBE: &[u8] = b"\n";

/// Length of the reserved prefix on frames sent by the server
pub const PREFIX_LEN: usize = 1;

/// Codec for NUL-terminated frames.
///
/// Outbound messages are written as `[message] [0x00]`. Inbound frames
/// from the server carry one reserved prefix byte, so they look like
/// `[prefix] [message] [0x00]`; decoding yields only `message`.
///
/// Bytes that follow a terminator are left in the buffer for the next
/// call, and a partially received frame is rescanned only from where the
/// previous scan stopped.
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use relink_common::transport::FrameCodec;
/// use tokio_util::codec::Decoder;
///
/// let mut codec = FrameCodec::default();
/// let mut buf = BytesMut::from(&b"xpong\0"[..]);
/// let message = codec.decode(&mut buf).unwrap().unwrap();
/// assert_eq!(&message[..], b"pong");
/// ```
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_message_len: usize,
    max_frame_len: usize,
    prefix_len: usize,
    /// Buffer offset already known to hold no terminator
    next_index: usize,
}

impl FrameCodec {
    /// Creates a codec for the client side of the connection.
    pub fn new(max_message_len: usize, max_frame_len: usize) -> Self {
        Self {
            max_message_len,
            max_frame_len,
            prefix_len: PREFIX_LEN,
            next_index: 0,
        }
    }

    /// Decodes frames that carry no prefix byte (what the server sees).
    pub fn without_prefix(mut self) -> Self {
        self.prefix_len = 0;
        self
    }

    pub fn max_message_len(&self) -> usize {
        self.max_message_len
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_LEN, DEFAULT_MAX_FRAME_LEN)
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = RelinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        let scan_from = self.next_index.min(src.len());
        match src[scan_from..].iter().position(|b| *b == TERMINATOR) {
            Some(offset) => {
                let end = scan_from + offset;
                self.next_index = 0;

                if end + 1 > self.max_frame_len {
                    return Err(RelinkError::FrameTooLarge {
                        len: end + 1,
                        max: self.max_frame_len,
                    });
                }

                let mut frame = src.split_to(end + 1);
                frame.truncate(end);
                // A bare terminator has no prefix to strip
                let skip = self.prefix_len.min(frame.len());
                frame.advance(skip);
                Ok(Some(frame.freeze()))
            }
            None => {
                if src.len() >= self.max_frame_len {
                    return Err(RelinkError::FrameTooLarge {
                        len: src.len(),
                        max: self.max_frame_len,
                    });
                }
                self.next_index = src.len();
                Ok(None)
            }
        }
    }
}

impl Encoder<&[u8]> for FrameCodec {
    type Error = RelinkError;

    fn encode(&mut self, message: &[u8], dst: &mut BytesMut) -> Result<()> {
        let message = bound_message(message, self.max_message_len);
        dst.reserve(message.len() + 1);
        dst.put_slice(message);
        dst.put_u8(TERMINATOR);
        Ok(())
    }
}

/// Clips a message the way a C string buffer would: at the first
/// terminator byte, then to at most `max_len` bytes.
pub fn bound_message(message: &[u8], max_len: usize) -> &[u8] {
    let message = match message.iter().position(|b| *b == TERMINATOR) {
        Some(nul) => &message[..nul],
        None => message,
    };
    &message[..message.len().min(max_len)]
}

/// Writes a server frame: `[prefix] [payload] [0x00]`.
pub fn encode_reply(prefix: u8, payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(payload.len() + 2);
    dst.put_u8(prefix);
    dst.put_slice(payload);
    dst.put_u8(TERMINATOR);
}
