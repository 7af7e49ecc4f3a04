//! Crate-wide error type
//!
//! Covers listener setup failures. Errors inside an active transfer never
//! surface here; they are reported in-band on the sender's status response.

use std::path::PathBuf;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level server error
#[derive(Debug)]
pub enum Error {
    /// I/O error (bind, accept, certificate files)
    Io(std::io::Error),
    /// TLS configuration error
    Tls(tokio_rustls::rustls::Error),
    /// The key file contained no usable private key
    NoPrivateKey(PathBuf),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Tls(e) => write!(f, "TLS error: {}", e),
            Error::NoPrivateKey(path) => {
                write!(f, "No private key found in {}", path.display())
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Tls(e) => Some(e),
            Error::NoPrivateKey(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<tokio_rustls::rustls::Error> for Error {
    fn from(e: tokio_rustls::rustls::Error) -> Self {
        Error::Tls(e)
    }
}
