//! In-band SSL negotiation.

use bytes::BytesMut;
use pg_protocol::frontend;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::SslMode;
use crate::connector::TlsConnector;
use crate::error::TlsError;
use crate::stream::MaybeTlsStream;

/// Negotiate encryption on a freshly connected stream.
///
/// With [`SslMode::Disable`], or when no connector is supplied under
/// [`SslMode::Prefer`], the stream is returned as-is without any traffic.
/// Otherwise an SSLRequest is sent and the single-byte reply decides:
/// `S` runs the handshake, `N` falls back to cleartext under `Prefer` and
/// fails under `Require`.
pub async fn negotiate<S>(
    mut stream: S,
    mode: SslMode,
    connector: Option<&TlsConnector>,
    host: &str,
) -> Result<MaybeTlsStream<S>, TlsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let connector = match (mode, connector) {
        (SslMode::Disable, _) | (SslMode::Prefer, None) => {
            return Ok(MaybeTlsStream::Plain { stream });
        }
        (SslMode::Require, None) => {
            return Err(TlsError::Configuration(
                "sslmode=require but no TLS connector configured".into(),
            ));
        }
        (_, Some(connector)) => connector,
    };

    let mut buf = BytesMut::new();
    frontend::ssl_request(&mut buf);
    stream.write_all(&buf).await?;
    stream.flush().await?;

    let response = match stream.read_u8().await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(TlsError::ConnectionClosed);
        }
        Err(e) => return Err(e.into()),
    };

    match (response, mode) {
        (b'S', _) => {
            let tls = connector.connect(stream, host).await?;
            Ok(MaybeTlsStream::Tls { stream: tls })
        }
        (b'N', SslMode::Require) => Err(TlsError::EncryptionNotSupported),
        (b'N', _) => {
            tracing::debug!(host = %host, "server declined SSL, continuing in cleartext");
            Ok(MaybeTlsStream::Plain { stream })
        }
        (other, _) => Err(TlsError::UnexpectedResponse(other)),
    }
}
