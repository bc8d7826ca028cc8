//! Async stream abstraction for tokio.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};

#[cfg(feature = "tokio-tls")]
use tokio_native_tls::TlsStream;

use crate::opts::Target;

/// Any bidirectional byte stream that can carry the protocol.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

pub enum Stream {
    Tcp(TcpStream),
    #[cfg(feature = "tokio-tls")]
    Tls(Box<TlsStream<Stream>>),
    Unix(UnixStream),
    /// A caller-supplied transport, e.g. an in-memory duplex.
    Custom(Box<dyn Transport>),
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Stream::Tcp(_) => "Tcp",
            #[cfg(feature = "tokio-tls")]
            Stream::Tls(_) => "Tls",
            Stream::Unix(_) => "Unix",
            Stream::Custom(_) => "Custom",
        };
        f.debug_tuple("Stream").field(&kind).finish()
    }
}

impl Stream {
    /// Open a TCP or Unix socket connection to `target`.
    pub async fn connect(target: Target) -> io::Result<Self> {
        match target {
            Target::Tcp { host, port } => {
                let tcp = TcpStream::connect((host.as_str(), port)).await?;
                tcp.set_nodelay(true)?;
                Ok(Self::Tcp(tcp))
            }
            Target::Unix { .. } => {
                let path = target.socket_path().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "no socket path")
                })?;
                Ok(Self::Unix(UnixStream::connect(path).await?))
            }
        }
    }

    pub fn custom<T: Transport + 'static>(io: T) -> Self {
        Self::Custom(Box::new(io))
    }

    /// Run a TLS handshake over this stream.
    #[cfg(feature = "tokio-tls")]
    pub async fn upgrade_to_tls(
        self,
        connector: native_tls::TlsConnector,
        domain: &str,
    ) -> crate::error::Result<Self> {
        let connector = tokio_native_tls::TlsConnector::from(connector);
        let tls = connector.connect(domain, self).await?;
        Ok(Self::Tls(Box::new(tls)))
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(feature = "tokio-tls")]
            Stream::Tls(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Unix(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Custom(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(feature = "tokio-tls")]
            Stream::Tls(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Unix(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Custom(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(feature = "tokio-tls")]
            Stream::Tls(s) => Pin::new(s).poll_flush(cx),
            Stream::Unix(s) => Pin::new(s).poll_flush(cx),
            Stream::Custom(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(feature = "tokio-tls")]
            Stream::Tls(s) => Pin::new(s).poll_shutdown(cx),
            Stream::Unix(s) => Pin::new(s).poll_shutdown(cx),
            Stream::Custom(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
