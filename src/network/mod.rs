//! Network Module
//!
//! Framed request/reply messaging over TCP. Every connection carries
//! exactly one request and at most one reply.

mod client;
pub mod protocol;

pub use client::NetworkClient;
pub use protocol::{FrameHeader, Reply, Request};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Read a framed message from a reader, refusing bodies over `max_frame_bytes`
pub async fn read_message<T, R>(reader: &mut R, max_frame_bytes: usize) -> Result<T>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    // Read header
    let mut header_bytes = [0u8; FrameHeader::SIZE];
    reader.read_exact(&mut header_bytes).await?;
    let header = FrameHeader::from_bytes(&header_bytes);

    let length = header.length as usize;
    if length > max_frame_bytes {
        return Err(Error::FrameTooLarge {
            size: length,
            limit: max_frame_bytes,
        });
    }

    // Read body
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;

    // Verify checksum
    let computed_checksum = crc32fast::hash(&body);
    if computed_checksum != header.checksum {
        return Err(Error::Network("Message checksum mismatch".into()));
    }

    Ok(serde_json::from_slice(&body)?)
}

/// Write a framed message to a writer
pub async fn write_message<T, W>(writer: &mut W, message: &T) -> Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(message)?;
    let header = FrameHeader::new(&body);

    writer.write_all(&header.to_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;

    #[tokio::test]
    async fn test_frame_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let request = Request::Client {
            operation: Operation::create_database("d"),
        };

        write_message(&mut a, &request).await.unwrap();
        let received: Request = read_message(&mut b, 1024).await.unwrap();
        assert_eq!(received, request);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64 * 1024);
        let request = Request::Client {
            operation: Operation::create_database("x".repeat(2000)),
        };

        write_message(&mut a, &request).await.unwrap();
        let result: Result<Request> = read_message(&mut b, 512).await;
        assert!(matches!(result, Err(Error::FrameTooLarge { limit: 512, .. })));
    }

    #[tokio::test]
    async fn test_corrupted_body_rejected() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let body = br#"{"type":"client"}"#;
        let mut header = FrameHeader::new(body);
        header.checksum ^= 1;
        a.write_all(&header.to_bytes()).await.unwrap();
        a.write_all(body).await.unwrap();

        let result: Result<Request> = read_message(&mut b, 1024).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_malformed_json_is_codec_error() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let body = b"not json";
        a.write_all(&FrameHeader::new(body).to_bytes()).await.unwrap();
        a.write_all(body).await.unwrap();

        let result: Result<Request> = read_message(&mut b, 1024).await;
        assert!(matches!(result, Err(Error::Codec(_))));
    }
}
