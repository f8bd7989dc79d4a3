//! Framed connection over an async transport.

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use pg_protocol::BackendMessage;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Framed;

use crate::codec::PgCodec;
use crate::error::CodecError;

/// A message-oriented PostgreSQL connection.
///
/// Outgoing messages are buffered with [`Connection::feed`] and written with
/// [`Connection::flush`] (or [`Connection::send`], which does both), so a
/// whole extended-query pipeline goes out in one write.
pub struct Connection<T> {
    framed: Framed<T, PgCodec>,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a transport, using `read_buffer_capacity` as the initial size of
    /// the read buffer.
    pub fn new(transport: T, read_buffer_capacity: usize) -> Self {
        Self::with_codec(transport, PgCodec::new(), read_buffer_capacity)
    }

    /// Wrap a transport with a custom codec.
    pub fn with_codec(transport: T, codec: PgCodec, read_buffer_capacity: usize) -> Self {
        Self {
            framed: Framed::with_capacity(transport, codec, read_buffer_capacity),
        }
    }

    /// Queue encoded messages without flushing.
    pub async fn feed(&mut self, buf: BytesMut) -> Result<(), CodecError> {
        self.framed.feed(buf.freeze()).await
    }

    /// Queue encoded messages and flush.
    pub async fn send(&mut self, buf: BytesMut) -> Result<(), CodecError> {
        self.framed.send(buf.freeze()).await
    }

    /// Flush queued messages to the transport.
    pub async fn flush(&mut self) -> Result<(), CodecError> {
        self.framed.flush().await
    }

    /// Read and decode the next backend message.
    ///
    /// End of stream is reported as [`CodecError::ConnectionClosed`]: the
    /// server never closes a session between messages the client is
    /// waiting for.
    pub async fn read_message(&mut self) -> Result<BackendMessage, CodecError> {
        match self.framed.next().await {
            Some(Ok(frame)) => Ok(BackendMessage::parse(frame.tag, frame.body)?),
            Some(Err(e)) => Err(e),
            None => Err(CodecError::ConnectionClosed),
        }
    }

    /// Send raw, pre-framed bytes and flush.
    pub async fn send_raw(&mut self, bytes: Bytes) -> Result<(), CodecError> {
        self.framed.send(bytes).await
    }

    /// Shut down the write side of the transport.
    pub async fn close(&mut self) -> Result<(), CodecError> {
        self.framed.flush().await?;
        self.framed.get_mut().shutdown().await?;
        Ok(())
    }

    /// Reference to the underlying transport.
    pub fn get_ref(&self) -> &T {
        self.framed.get_ref()
    }

    /// Consume the connection, returning the transport. Buffered but
    /// undecoded input is discarded.
    pub fn into_inner(self) -> T {
        self.framed.into_inner()
    }
}

impl<T> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("read_buffered", &self.framed.read_buffer().len())
            .field("write_buffered", &self.framed.write_buffer().len())
            .finish_non_exhaustive()
    }
}
