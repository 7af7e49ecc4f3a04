//! HTTP server surface
//!
//! Listener setup, request routing, registration handlers and the static
//! reserved-path pages.

pub mod config;
pub mod handler;
pub mod listener;
pub mod pages;
pub mod router;

pub use config::{ServerConfig, TlsConfig};
pub use listener::RelayServer;
pub use router::ServerContext;
