//! Integration tests for the transport layer
//!
//! These tests run the echo server on a loopback port and talk to it
//! with raw sockets and the frame codec.

#[cfg(test)]
mod tests {
    use crate::transport::{EchoServer, FrameCodec, ECHO_PREFIX};
    use bytes::BytesMut;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_util::codec::Decoder;
    use tokio_util::sync::CancellationToken;

    async fn start_server() -> (SocketAddr, CancellationToken) {
        let server = EchoServer::new("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        tokio::spawn(server.run(shutdown.clone()));
        (addr, shutdown)
    }

    async fn read_frame(stream: &mut TcpStream, codec: &mut FrameCodec, buf: &mut BytesMut) -> Vec<u8> {
        loop {
            if let Some(frame) = codec.decode(buf).unwrap() {
                return frame.to_vec();
            }
            let n = stream.read_buf(buf).await.unwrap();
            assert!(n > 0, "server closed the connection");
        }
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let (addr, shutdown) = start_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(b"\nping\0").await.unwrap();

        let mut raw = [0u8; 6];
        stream.read_exact(&mut raw).await.unwrap();
        assert_eq!(raw[0], ECHO_PREFIX);
        assert_eq!(&raw[1..], b"ping\0");

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_echo_handles_split_and_batched_frames() {
        let (addr, shutdown) = start_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();

        stream.write_all(b"he").await.unwrap();
        stream.flush().await.unwrap();
        stream.write_all(b"llo\0one\0two\0").await.unwrap();

        assert_eq!(read_frame(&mut stream, &mut codec, &mut buf).await, b"hello");
        assert_eq!(read_frame(&mut stream, &mut codec, &mut buf).await, b"one");
        assert_eq!(read_frame(&mut stream, &mut codec, &mut buf).await, b"two");

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_echo_heartbeat_reply_is_empty() {
        let (addr, shutdown) = start_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();

        stream.write_all(b"\0").await.unwrap();
        assert!(read_frame(&mut stream, &mut codec, &mut buf).await.is_empty());

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_shutdown_closes_connections() {
        let (addr, shutdown) = start_server().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        // make sure the connection task is up before shutting down
        stream.write_all(b"x\0").await.unwrap();
        let mut raw = [0u8; 3];
        stream.read_exact(&mut raw).await.unwrap();

        shutdown.cancel();

        let mut rest = Vec::new();
        let n = tokio::time::timeout(std::time::Duration::from_secs(5), stream.read_to_end(&mut rest))
            .await
            .expect("connection should close after shutdown")
            .unwrap_or(0);
        assert_eq!(n, 0);
    }
}
