//! DNS-over-TCP message framing.
//!
//! Every message on a TCP connection is prefixed by its length as a 2-byte big-endian integer
//! ([RFC-1035 section 4.2.2][RFC-1035]). [`MessageReader`] and [`MessageWriter`] compose that
//! framing with the [`Message`] codec, one per direction of a connection.
//!
//! [RFC-1035]: https://www.rfc-editor.org/rfc/rfc1035#section-4.2.2

use crate::error::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use trust_dns_proto::op::Message;
use trust_dns_proto::serialize::binary::BinEncodable;

/// Default cap on the encoded size of a single outbound message.
pub const DEFAULT_PACKET_SIZE: usize = 4096;

const LENGTH_PREFIX_BYTES: usize = 2;

/// Split a connection into framed message halves.
pub fn framed(
    stream: TcpStream,
    packet_size: usize,
) -> (MessageReader<OwnedReadHalf>, MessageWriter<OwnedWriteHalf>) {
    let (read_half, write_half) = stream.into_split();
    (
        MessageReader::new(read_half),
        MessageWriter::new(write_half, packet_size),
    )
}

/// Encode `message` into a length-prefixed frame whose body is at most `packet_size` bytes.
///
/// # Errors
///
/// Returns [`Error::Encode`] if the codec rejects the message, and [`Error::MessageTooLarge`] if
/// it doesn't fit `packet_size` or the 2-byte length prefix.
pub fn encode_frame(message: &Message, packet_size: usize) -> Result<Vec<u8>, Error> {
    let body = message.to_bytes().map_err(Error::Encode)?;
    let len = body.len();
    if len > packet_size {
        return Err(Error::MessageTooLarge(len));
    }
    let prefix = u16::try_from(len).map_err(|_| Error::MessageTooLarge(len))?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_BYTES + len);
    frame.extend_from_slice(&prefix.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Reads length-prefixed DNS messages.
#[derive(Debug)]
pub struct MessageReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read the next message. Returns `None` when the peer closes the connection between
    /// messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if the connection fails or closes mid-frame, and [`Error::Decode`]
    /// if a complete frame doesn't hold a valid DNS message.
    pub async fn read_message(&mut self) -> Result<Option<Message>, Error> {
        let Some(bytes) = self.read_frame().await? else {
            return Ok(None);
        };
        Message::from_vec(&bytes).map(Some).map_err(Error::Decode)
    }

    /// Read the next raw frame body, without decoding it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if the connection fails or closes mid-frame.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, Error> {
        let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
        if self.inner.read(&mut prefix[..1]).await? == 0 {
            return Ok(None);
        }
        self.inner.read_exact(&mut prefix[1..]).await?;
        let mut body = vec![0u8; usize::from(u16::from_be_bytes(prefix))];
        self.inner.read_exact(&mut body).await?;
        Ok(Some(body))
    }
}

/// Writes length-prefixed DNS messages.
#[derive(Debug)]
pub struct MessageWriter<W> {
    inner: W,
    packet_size: usize,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(inner: W, packet_size: usize) -> Self {
        Self { inner, packet_size }
    }

    pub fn set_packet_size(&mut self, packet_size: usize) {
        self.packet_size = packet_size;
    }

    /// Encode, frame and write `message`, waiting until the socket accepted all of it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] or [`Error::MessageTooLarge`] if the message can't be encoded,
    /// and [`Error::IO`] if the write fails.
    pub async fn write_message(&mut self, message: &Message) -> Result<(), Error> {
        let frame = encode_frame(message, self.packet_size)?;
        self.write_frame(&frame).await
    }

    /// Write an already framed message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if the write fails.
    pub async fn write_frame(&mut self, frame: &[u8]) -> Result<(), Error> {
        self.inner.write_all(frame).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Flush and close the write direction of the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<(), Error> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
