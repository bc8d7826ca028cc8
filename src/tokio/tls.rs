//! SSLRequest negotiation.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::opts::{ConnectOpts, SslMode};
use crate::protocol::frontend::FrontendMessage;

use super::stream::Stream;

/// Upgrade `stream` to TLS unless `sslmode=disable`.
///
/// The server's one-byte answer must be `S`. Anything else fails the attempt
/// with [`Error::FatalConnection`]; there is no plaintext fallback.
pub async fn negotiate(mut stream: Stream, opts: &ConnectOpts) -> Result<Stream> {
    if opts.ssl_mode == SslMode::Disable {
        return Ok(stream);
    }

    let mut buf = Vec::with_capacity(8);
    FrontendMessage::SslRequest.encode(&mut buf);
    stream.write_all(&buf).await?;
    stream.flush().await?;

    let response = stream.read_u8().await?;
    tracing::debug!(response = %(response as char), "SSLRequest answered");
    if response != b'S' {
        return Err(Error::FatalConnection(Box::new(Error::Protocol(format!(
            "server refused SSLRequest with '{}'",
            response as char
        )))));
    }

    handshake(stream, opts).await
}

#[cfg(feature = "tokio-tls")]
async fn handshake(stream: Stream, opts: &ConnectOpts) -> Result<Stream> {
    let mut builder = native_tls::TlsConnector::builder();
    builder
        .danger_accept_invalid_certs(opts.ssl_mode == SslMode::Require)
        .danger_accept_invalid_hostnames(opts.ssl_mode != SslMode::VerifyFull);
    let connector = builder.build()?;

    stream.upgrade_to_tls(connector, opts.tls_domain()).await
}

#[cfg(not(feature = "tokio-tls"))]
async fn handshake(_stream: Stream, _opts: &ConnectOpts) -> Result<Stream> {
    Err(Error::Unsupported(
        "TLS requested but tokio-tls feature not enabled".into(),
    ))
}
