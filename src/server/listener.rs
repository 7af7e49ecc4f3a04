//! Relay server listener
//!
//! Handles TCP (and optionally TLS) accept loops and serves each
//! connection with hyper over the shared registry.

use std::convert::Infallible;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;

use crate::error::{Error, Result};
use crate::registry::PathRegistry;

use super::config::{ServerConfig, TlsConfig};
use super::router::{self, ServerContext};

/// Streaming HTTP rendezvous relay server
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<PathRegistry>,
}

impl RelayServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(PathRegistry::new()),
        }
    }

    /// Get a reference to the path registry
    pub fn registry(&self) -> &Arc<PathRegistry> {
        &self.registry
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run the configured listeners
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        match self.config.tls.clone() {
            Some(tls) => {
                tokio::try_join!(self.run_http(), self.run_https(tls))?;
                Ok(())
            }
            None => self.run_http().await,
        }
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.run() => result,
        }
    }

    async fn run_http(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.http_addr).await?;
        tracing::info!(addr = %self.config.http_addr, "HTTP relay listening");
        self.serve(listener).await
    }

    /// Serve plain HTTP connections from an already-bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let ctx = self.context(false);
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(Arc::clone(&ctx), socket, peer_addr, None);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn run_https(&self, tls: TlsConfig) -> Result<()> {
        let acceptor = tls_acceptor(&tls)?;
        let listener = TcpListener::bind(tls.addr).await?;
        tracing::info!(addr = %tls.addr, "HTTPS relay listening");

        let ctx = self.context(true);
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(
                        Arc::clone(&ctx),
                        socket,
                        peer_addr,
                        Some(acceptor.clone()),
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn context(&self, uses_https: bool) -> Arc<ServerContext> {
        Arc::new(ServerContext {
            registry: Arc::clone(&self.registry),
            uses_https,
            enable_log: self.config.enable_log,
        })
    }

    fn handle_connection(
        &self,
        ctx: Arc<ServerContext>,
        socket: TcpStream,
        peer_addr: SocketAddr,
        acceptor: Option<TlsAcceptor>,
    ) {
        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(peer = %peer_addr, error = %e, "Failed to set TCP_NODELAY");
            }
        }

        if ctx.enable_log {
            tracing::debug!(peer = %peer_addr, "New connection");
        }

        tokio::spawn(async move {
            let served = match acceptor {
                Some(acceptor) => match acceptor.accept(socket).await {
                    Ok(stream) => serve_connection(TokioIo::new(stream), ctx).await,
                    Err(e) => {
                        tracing::debug!(peer = %peer_addr, error = %e, "TLS handshake failed");
                        return;
                    }
                },
                None => serve_connection(TokioIo::new(socket), ctx).await,
            };

            if let Err(e) = served {
                tracing::debug!(peer = %peer_addr, error = %e, "Connection error");
            }
        });
    }
}

async fn serve_connection<I>(
    io: I,
    ctx: Arc<ServerContext>,
) -> std::result::Result<(), hyper::Error>
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let service = service_fn(move |req| {
        let ctx = Arc::clone(&ctx);
        async move { Ok::<_, Infallible>(router::route(ctx, req).await) }
    });

    http1::Builder::new().serve_connection(io, service).await
}

/// Build a TLS acceptor from PEM certificate chain and private key files
fn tls_acceptor(tls: &TlsConfig) -> Result<TlsAcceptor> {
    let mut cert_reader = BufReader::new(File::open(&tls.cert_path)?);
    let certs = rustls_pemfile::certs(&mut cert_reader).collect::<std::io::Result<Vec<_>>>()?;

    let mut key_reader = BufReader::new(File::open(&tls.key_path)?);
    let key = rustls_pemfile::private_key(&mut key_reader)?
        .ok_or_else(|| Error::NoPrivateKey(tls.key_path.clone()))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
