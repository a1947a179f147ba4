use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use log::error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_native_tls::TlsStream;

use crate::core::{Result, RoutingError};

/// Base TLS trust options, shared across every node dial.
///
/// The server name is deliberately not part of the options: it is derived
/// per dial from the node address so certificate validation matches the
/// specific node being connected to.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    pub skip_verify: bool,
    pub ca_cert: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
}

/// An established byte stream to one node, plain or TLS.
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    /// Open the transport with a deadline covering TCP connect and, when
    /// configured, the TLS handshake.
    pub async fn connect(
        address: &str,
        tls: Option<&TlsOptions>,
        deadline: Instant,
    ) -> Result<Self> {
        let until = tokio::time::Instant::from_std(deadline);

        let stream = tokio::time::timeout_at(until, TcpStream::connect(address))
            .await
            .map_err(|_| RoutingError::Dial {
                address: address.to_string(),
                reason: "connect timed out".to_string(),
            })?
            .map_err(|e| RoutingError::Dial {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true).ok();

        let Some(options) = tls else {
            return Ok(Transport::Plain(stream));
        };

        let server_name = match host_portion(address) {
            Some(host) => host.to_string(),
            None => {
                error!("failed to parse {address} for a TLS server name");
                address.to_string()
            }
        };
        let connector = build_connector(options)?;
        let tls_stream = tokio::time::timeout_at(until, connector.connect(&server_name, stream))
            .await
            .map_err(|_| RoutingError::Dial {
                address: address.to_string(),
                reason: "tls handshake timed out".to_string(),
            })?
            .map_err(|e| RoutingError::Tls(e.to_string()))?;
        Ok(Transport::Tls(Box::new(tls_stream)))
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        AsyncWriteExt::shutdown(self).await
    }
}

/// Host part of a host:port address, with IPv6 brackets stripped.
fn host_portion(address: &str) -> Option<&str> {
    let (host, port) = address.rsplit_once(':')?;
    if host.is_empty() || port.is_empty() {
        return None;
    }
    Some(host.trim_start_matches('[').trim_end_matches(']'))
}

fn build_connector(options: &TlsOptions) -> Result<tokio_native_tls::TlsConnector> {
    let mut builder = native_tls::TlsConnector::builder();

    if options.skip_verify {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    }

    if let Some(path) = &options.ca_cert {
        let data = std::fs::read(path)
            .map_err(|e| RoutingError::Tls(format!("failed to read CA certificate: {e}")))?;
        let certificate = native_tls::Certificate::from_pem(&data)
            .map_err(|e| RoutingError::Tls(format!("invalid CA certificate: {e}")))?;
        builder.add_root_certificate(certificate);
    }

    if let (Some(cert_path), Some(key_path)) = (&options.client_cert, &options.client_key) {
        let cert_data = std::fs::read(cert_path)
            .map_err(|e| RoutingError::Tls(format!("failed to read client certificate: {e}")))?;
        let key_data = std::fs::read(key_path)
            .map_err(|e| RoutingError::Tls(format!("failed to read client key: {e}")))?;
        let identity = native_tls::Identity::from_pkcs8(&cert_data, &key_data)
            .map_err(|e| RoutingError::Tls(format!("invalid client identity: {e}")))?;
        builder.identity(identity);
    }

    let connector = builder
        .build()
        .map_err(|e| RoutingError::Tls(e.to_string()))?;
    Ok(tokio_native_tls::TlsConnector::from(connector))
}

impl AsyncRead for Transport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            Transport::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            Transport::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Transport::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Transport::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}
