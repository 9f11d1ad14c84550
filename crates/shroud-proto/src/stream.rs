//! Packet I/O over async byte streams.
//!
//! Shared by the server and client runtimes. A stream that ends cleanly
//! between packets reads as `Ok(None)`; a stream that ends anywhere inside a
//! packet, header included, is an error.

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    Channel, PacketHeader,
    errors::ProtocolError,
    packet::{PACKET_HEADER_SIZE, encode_packet},
};

/// Failure reading or writing a packet on a byte stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Socket I/O failed, or the stream ended inside a packet body
    #[error("stream I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Stream ended part way through a packet header
    #[error("stream closed after {received} of {expected} header bytes")]
    TruncatedHeader {
        /// Header bytes read before the end of stream
        received: usize,
        /// Header size
        expected: usize,
    },

    /// Oversized frame announced by the peer or handed to the writer
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Read one packet. `Ok(None)` on a clean end of stream between packets.
///
/// # Errors
///
/// - `StreamError::TruncatedHeader` if the stream ends inside the header
/// - `StreamError::Protocol` if the header announces more than `max_len`;
///   the body is never allocated in that case
/// - `StreamError::Io` on I/O failure or end of stream inside the body
pub async fn read_packet<R>(reader: &mut R, max_len: usize) -> Result<Option<(Channel, Bytes)>, StreamError>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; PACKET_HEADER_SIZE];
    let mut filled = 0;
    while filled < PACKET_HEADER_SIZE {
        let n = reader.read(&mut header_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(StreamError::TruncatedHeader { received: filled, expected: PACKET_HEADER_SIZE });
        }
        filled += n;
    }

    let header = PacketHeader::from_bytes(&header_buf, max_len)?;

    let mut body = BytesMut::zeroed(header.length() as usize);
    reader.read_exact(&mut body).await?;

    Ok(Some((header.channel(), body.freeze())))
}

/// Write one packet and flush.
///
/// # Errors
///
/// - `StreamError::Protocol` if `frame` exceeds `max_len`; nothing is written
/// - `StreamError::Io` on I/O failure
pub async fn write_packet<W>(writer: &mut W, channel: Channel, frame: &[u8], max_len: usize) -> Result<(), StreamError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(PACKET_HEADER_SIZE + frame.len());
    encode_packet(channel, frame, &mut buf, max_len)?;

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn packet_roundtrip_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(256);

        write_packet(&mut a, Channel::UNRELIABLE, b"frame", 64).await.unwrap();
        let (channel, frame) = read_packet(&mut b, 64).await.unwrap().unwrap();

        assert_eq!(channel, Channel::UNRELIABLE);
        assert_eq!(&frame[..], b"frame");
    }

    #[tokio::test]
    async fn clean_eof_is_none() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);

        assert!(read_packet(&mut b, 64).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_inside_header_is_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&[0, 0]).await.unwrap();
        drop(a);

        let result = read_packet(&mut b, 64).await;
        assert!(matches!(result, Err(StreamError::TruncatedHeader { received: 2, expected: 5 })));
    }

    #[tokio::test]
    async fn header_split_across_writes_is_reassembled() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let header = PacketHeader::new(2, Channel::RELIABLE).to_bytes();

        let reader = tokio::spawn(async move { read_packet(&mut b, 64).await });
        a.write_all(&header[..3]).await.unwrap();
        tokio::task::yield_now().await;
        a.write_all(&header[3..]).await.unwrap();
        a.write_all(b"ok").await.unwrap();

        let (channel, frame) = reader.await.unwrap().unwrap().unwrap();
        assert_eq!(channel, Channel::RELIABLE);
        assert_eq!(&frame[..], b"ok");
    }

    #[tokio::test]
    async fn oversized_packet_is_protocol_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&PacketHeader::new(1000, Channel::RELIABLE).to_bytes()).await.unwrap();

        let result = read_packet(&mut b, 64).await;
        assert!(matches!(result, Err(StreamError::Protocol(ProtocolError::LengthTooLarge { len: 1000, max: 64 }))));
    }

    #[tokio::test]
    async fn eof_inside_body_is_io_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&PacketHeader::new(10, Channel::RELIABLE).to_bytes()).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);

        let result = read_packet(&mut b, 64).await;
        assert!(matches!(result, Err(StreamError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test]
    async fn oversized_write_sends_nothing() {
        let (mut a, mut b) = tokio::io::duplex(64);

        let result = write_packet(&mut a, Channel::RELIABLE, &[0u8; 32], 16).await;
        assert!(matches!(result, Err(StreamError::Protocol(_))));

        drop(a);
        assert!(read_packet(&mut b, 64).await.unwrap().is_none());
    }
}
