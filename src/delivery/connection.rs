use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

pub const DEFAULT_INGEST_HOST: &str = "data.logentries.com";
pub const DEFAULT_INGEST_PORT: u16 = 443;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) const EMSGSIZE: i32 = 90;
#[cfg(windows)]
pub(crate) const EMSGSIZE: i32 = 10040;
#[cfg(not(any(target_os = "linux", target_os = "android", windows)))]
pub(crate) const EMSGSIZE: i32 = 40;

/// Failures that mean the socket is gone and a fresh one may succeed.
pub fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::UnexpectedEof
    )
}

pub fn is_message_too_large(e: &io::Error) -> bool {
    e.raw_os_error() == Some(EMSGSIZE)
}

/// Opens the byte stream log lines are written to.
pub trait Connect: Send + Sync {
    type Stream: AsyncWrite + Unpin + Send;

    fn connect(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

pub enum IngestStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncWrite for IngestStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            IngestStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            IngestStream::Tls(s) => Pin::new(&mut **s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            IngestStream::Plain(s) => Pin::new(s).poll_flush(cx),
            IngestStream::Tls(s) => Pin::new(&mut **s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            IngestStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            IngestStream::Tls(s) => Pin::new(&mut **s).poll_shutdown(cx),
        }
    }
}

/// TCP connector to the ingestion host, optionally wrapped in TLS.
#[derive(Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
    tls: Option<TlsConnector>,
}

impl TcpConnector {
    pub fn plain(host: &str, port: u16) -> Self {
        Self {
            host: host.to_owned(),
            port,
            tls: None,
        }
    }

    /// TLS connector trusting the platform's native root certificates.
    pub fn tls(host: &str, port: u16) -> io::Result<Self> {
        let native = rustls_native_certs::load_native_certs();
        for err in &native.errors {
            warn!("failed to load a native root certificate: {}", err);
        }
        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        debug!("loaded {} root certificates ({} ignored)", added, ignored);

        let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(io::Error::other)?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self {
            host: host.to_owned(),
            port,
            tls: Some(TlsConnector::from(Arc::new(config))),
        })
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }
}

impl Connect for TcpConnector {
    type Stream = IngestStream;

    async fn connect(&self) -> io::Result<IngestStream> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port)).await?;
        tcp.set_nodelay(true)?;
        match &self.tls {
            None => Ok(IngestStream::Plain(tcp)),
            Some(connector) => {
                let server_name = ServerName::try_from(self.host.clone())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                let stream = connector.connect(server_name, tcp).await?;
                Ok(IngestStream::Tls(Box::new(stream)))
            }
        }
    }
}

/// Owns at most one live connection. [`ConnectionManager::acquire`] is the only place a
/// connection is created, so two callers can never race into opening two sockets.
pub struct ConnectionManager<C: Connect> {
    connector: C,
    slot: Mutex<Option<C::Stream>>,
}

/// Exclusive use of the live connection until dropped.
pub struct Lease<'a, S> {
    slot: MutexGuard<'a, Option<S>>,
}

impl<S> Lease<'_, S> {
    pub fn stream(&mut self) -> io::Result<&mut S> {
        self.slot
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }

    /// Discard the connection; the next `acquire` opens a new one.
    pub fn invalidate(mut self) {
        self.slot.take();
    }
}

impl<C: Connect> ConnectionManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            slot: Mutex::new(None),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub async fn acquire(&self) -> io::Result<Lease<'_, C::Stream>> {
        let mut slot = self.slot.lock().await;
        if slot.is_none() {
            info!("opening ingestion connection");
            *slot = Some(self.connector.connect().await?);
        }
        Ok(Lease { slot })
    }

    pub async fn invalidate(&self) {
        self.slot.lock().await.take();
    }

    pub async fn is_connected(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Write one framed line. A failed write drops the connection before the lock is
    /// released, so no other caller can pick up the broken stream.
    pub async fn write_line(&self, line: &[u8]) -> io::Result<()> {
        let mut lease = self.acquire().await?;
        let result = async {
            let stream = lease.stream()?;
            stream.write_all(line).await?;
            stream.flush().await
        }
        .await;
        if result.is_err() {
            lease.invalidate();
        }
        result
    }
}
