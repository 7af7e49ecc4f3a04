//! Per-path entries and participant ends
//!
//! This module defines the state stored in the registry for each path and
//! the handles through which the pipe engine talks to both sides of a
//! rendezvous.

use bytes::Bytes;
use http::HeaderMap;
use http::Response;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::pipe::{ByteStream, RelayBody};

use super::path::RelayPath;

/// Write half of the sender's open status response
///
/// Lines pushed here are streamed to the sender as response body text.
/// Sends to a disconnected sender are silently dropped.
#[derive(Debug, Clone)]
pub struct NoticeChannel {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl NoticeChannel {
    /// Create a channel; the receiving half backs the sender's response body
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Push one newline-terminated line to the sender
    pub fn send_line(&self, line: impl Into<Bytes>) -> bool {
        self.tx.send(line.into()).is_ok()
    }

    /// Resolves once the sender's connection has gone away
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

/// Sender side of a rendezvous
///
/// Holds the request headers (for source selection and header propagation),
/// the request body, and the status channel opened at registration time.
pub struct SenderEnd {
    /// Participant id assigned at registration
    pub id: u64,
    /// Headers of the sender's request
    pub headers: HeaderMap,
    /// The sender's request body
    pub body: ByteStream,
    /// Status channel to the sender's open response
    pub notices: NoticeChannel,
}

/// Receiver side of a rendezvous
///
/// The receiver's HTTP response is deferred until establishment; `reply`
/// resolves it. Dropping `reply` unanswered tells the waiting handler the
/// transfer collapsed before headers could be determined.
pub struct ReceiverEnd {
    /// Participant id assigned at registration
    pub id: u64,
    /// Resolves the receiver's pending HTTP response
    pub reply: oneshot::Sender<Response<RelayBody>>,
}

/// A waiting sender plus its armed abort watcher
pub(super) struct PendingSender {
    pub end: SenderEnd,
    pub abort: CancellationToken,
}

/// A rendezvous that has not reached its declared receiver count yet
pub(super) struct PendingPipe {
    /// Declared target count, fixed by the first arrival
    pub n_receivers: u32,
    /// At most one sender
    pub sender: Option<PendingSender>,
    /// Receivers in arrival order, never more than `n_receivers`
    pub receivers: Vec<ReceiverEnd>,
}

impl PendingPipe {
    pub fn is_complete(&self) -> bool {
        self.sender.is_some() && self.receivers.len() as u32 == self.n_receivers
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_none() && self.receivers.is_empty()
    }
}

/// Registry entry for a single path
pub(super) enum PathEntry {
    /// Accepting registrations and withdrawals
    Pending(PendingPipe),
    /// Transfer in progress; all registrations are rejected
    Established,
}

/// A promoted rendezvous, handed to the pipe engine
///
/// Receiver order matches arrival order and is preserved during fan-out.
pub struct EstablishedPipe {
    pub path: RelayPath,
    pub sender: SenderEnd,
    pub receivers: Vec<ReceiverEnd>,
}
