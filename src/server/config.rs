//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the plain HTTP listener binds to
    pub http_addr: SocketAddr,

    /// Optional HTTPS listener, served alongside HTTP
    pub tls: Option<TlsConfig>,

    /// Emit per-request and per-connection log events
    pub enable_log: bool,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

/// HTTPS listener configuration
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Address the TLS listener binds to
    pub addr: SocketAddr,

    /// PEM file with the certificate chain
    pub cert_path: PathBuf,

    /// PEM file with the private key
    pub key_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".parse().unwrap(),
            tls: None,
            enable_log: true,
            tcp_nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom HTTP bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            http_addr: addr,
            ..Default::default()
        }
    }

    /// Set the HTTP bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.http_addr = addr;
        self
    }

    /// Add an HTTPS listener
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Toggle request logging
    pub fn enable_log(mut self, enabled: bool) -> Self {
        self.enable_log = enabled;
        self
    }

    /// Toggle TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }
}

impl TlsConfig {
    /// Create a TLS listener config
    pub fn new(
        addr: SocketAddr,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            addr,
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }
}
