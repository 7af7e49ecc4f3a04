//! Streaming pipe engine
//!
//! Once a rendezvous is established, the engine picks the source byte
//! stream from the sender's request (raw body or first multipart part),
//! answers every receiver with a streaming response, and fans the source
//! out to all of them.
//!
//! # Zero-Copy Design
//!
//! `bytes::Bytes` uses reference counting, so all receivers share the same
//! memory allocation. Each fan-out delivery clones the `Bytes` handle, not
//! the payload.

pub mod engine;
pub mod source;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use tokio::sync::mpsc;

pub use engine::Outcome;
pub use source::{Source, SourceHeaders};

/// Boxed error used across body streams
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Response body type served by the relay
pub type RelayBody = BoxBody<Bytes, BoxError>;

/// A boxed stream of body chunks
///
/// Boxed with an explicit `Sync` bound (unlike `futures_util::stream::BoxStream`)
/// because it is stored inside registry state shared behind `Arc<RwLock<_>>`
/// and crossed into spawned tasks.
pub type ByteStream =
    std::pin::Pin<Box<dyn futures_util::Stream<Item = Result<Bytes, BoxError>> + Send + Sync>>;

/// Box a stream into a [`ByteStream`]
pub fn box_byte_stream<S>(stream: S) -> ByteStream
where
    S: futures_util::Stream<Item = Result<Bytes, BoxError>> + Send + Sync + 'static,
{
    Box::pin(stream)
}

/// Fixed-size body from an in-memory buffer
pub fn full_body(data: impl Into<Bytes>) -> RelayBody {
    Full::new(data.into()).map_err(|e| match e {}).boxed()
}

/// Zero-length body
pub fn empty_body() -> RelayBody {
    Empty::new().map_err(|e| match e {}).boxed()
}

/// Streaming body fed from a bounded channel
///
/// An `Err` item aborts the response at the transport level, which is how
/// receivers learn about a broken source mid-transfer.
pub fn channel_body(mut rx: mpsc::Receiver<Result<Bytes, BoxError>>) -> RelayBody {
    let frames = stream::poll_fn(move |cx| rx.poll_recv(cx)).map(|item| item.map(Frame::data));
    BodyExt::boxed(StreamBody::new(frames))
}

/// Streaming body fed from an unbounded channel of text lines
///
/// Backs the sender's open status response. The body ends when every write
/// half has been dropped.
pub fn line_body(mut rx: mpsc::UnboundedReceiver<Bytes>) -> RelayBody {
    let frames = stream::poll_fn(move |cx| rx.poll_recv(cx)).map(|line| Ok(Frame::data(line)));
    BodyExt::boxed(StreamBody::new(frames))
}
