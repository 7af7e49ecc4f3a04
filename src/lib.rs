//! Streaming HTTP rendezvous relay
//!
//! A sender uploads a body to an arbitrary path with `POST`/`PUT`; one or
//! more receivers download it from the same path with `GET`. Nothing is
//! persisted: the server pairs both sides in real time and streams bytes
//! straight through.
//!
//! # Architecture
//!
//! ```text
//!   POST /path ───► router ──► registry ◄── router ◄─── GET /path
//!                                │
//!                                │ sender + n receivers present
//!                                ▼
//!                           pipe engine
//!                     source ──► fan-out ──► receiver sinks
//! ```
//!
//! A rendezvous is keyed by its normalised path. The first arrival fixes
//! the declared receiver count (`?n=`, default 1); once the sender and
//! exactly that many receivers are present the rendezvous is established
//! and the engine streams the sender's body (or its first multipart part)
//! to every receiver concurrently. While pending, a participant that
//! disconnects simply withdraws; the path frees up again when the
//! transfer ends.
//!
//! # Example
//!
//! ```no_run
//! use relay_rs::{RelayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> relay_rs::Result<()> {
//!     let config = ServerConfig::with_addr("127.0.0.1:8080".parse().unwrap());
//!     RelayServer::new(config).run().await
//! }
//! ```

pub mod error;
pub mod pipe;
pub mod registry;
pub mod server;

pub use error::{Error, Result};
pub use registry::{PathRegistry, RegistryError, RelayPath};
pub use server::{RelayServer, ServerConfig, TlsConfig};
