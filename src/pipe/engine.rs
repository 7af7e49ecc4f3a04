//! Fan-out engine
//!
//! Drives one established transfer: answers every receiver with a
//! streaming response, then copies the source stream into each receiver's
//! sink until the source ends, the source fails, or every receiver has
//! gone away. Whatever happens, the path is released afterwards.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::future;
use futures_util::stream::StreamExt;
use http::header::{
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE,
};
use http::{HeaderValue, Response};
use tokio::sync::mpsc;

use crate::registry::{EstablishedPipe, PathRegistry, SenderEnd};

use super::source::{self, SourceHeaders};
use super::{channel_body, BoxError, ByteStream, RelayBody};

/// Per-receiver sink buffer, in body chunks
///
/// Decouples receivers from each other for short bursts; once a buffer is
/// full the source waits, so the slowest receiver paces the transfer.
const SINK_BUFFER: usize = 16;

const SENDING_SUCCESSFUL: &str = "[INFO] Sending successful!\n";
const SENDING_FAILED: &str = "[ERROR] Sending failed.\n";
const RECEIVERS_CLOSED: &str = "[INFO] All receiver(s) was/were closed halfway.\n";

type Sink = mpsc::Sender<Result<Bytes, BoxError>>;

/// How a transfer ended
#[derive(Debug)]
pub enum Outcome {
    /// The source reached end-of-body and every open receiver was served
    Complete,
    /// The source stream failed (includes the sender disconnecting)
    SourceFailed(BoxError),
    /// Every receiver went away before the source finished
    AllReceiversClosed,
}

/// Run an established transfer to completion
pub async fn run(registry: Arc<PathRegistry>, pipe: EstablishedPipe) {
    let EstablishedPipe {
        path,
        sender,
        receivers,
    } = pipe;
    let SenderEnd {
        headers,
        body,
        notices,
        ..
    } = sender;
    let total = receivers.len();

    notices.send_line(format!("[INFO] Start sending with {total} receiver(s)!\n"));

    let source = match source::resolve(&headers, body).await {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Source selection failed");
            notices.send_line(SENDING_FAILED);
            // Receivers have no committed response yet; dropping their
            // reply handles tells the waiting handlers to give up.
            drop(receivers);
            registry.clear(&path).await;
            return;
        }
    };

    // Answer receivers in pairing order. A receiver whose handler is
    // already gone counts as closed from the start.
    let mut sinks: Vec<Option<Sink>> = Vec::with_capacity(total);
    for receiver in receivers {
        let (tx, rx) = mpsc::channel(SINK_BUFFER);
        let response = receiver_response(&source.headers, rx);
        sinks.push(receiver.reply.send(response).ok().map(|()| tx));
    }

    let outcome = pump(source.stream, &mut sinks).await;

    match &outcome {
        Outcome::Complete => {
            // Closing the sinks lets each receiver flush and finish.
            drop(sinks);
            notices.send_line(SENDING_SUCCESSFUL);
        }
        Outcome::SourceFailed(e) => {
            tracing::warn!(path = %path, error = %e, "Source stream failed");
            abort_sinks(&mut sinks).await;
            notices.send_line(SENDING_FAILED);
        }
        Outcome::AllReceiversClosed => {
            notices.send_line(RECEIVERS_CLOSED);
        }
    }

    registry.clear(&path).await;
    tracing::info!(path = %path, receivers = total, outcome = ?outcome, "Transfer finished");
}

/// Copy the source into every open sink until a termination event
async fn pump(mut source: ByteStream, sinks: &mut Vec<Option<Sink>>) -> Outcome {
    loop {
        if sinks.iter().all(Option::is_none) {
            return Outcome::AllReceiversClosed;
        }

        // Watch the open sinks so a transfer whose receivers all hang up
        // terminates even while the source is idle.
        let watched: Vec<Sink> = sinks.iter().flatten().cloned().collect();
        let all_closed = async move {
            future::join_all(watched.iter().map(|sink| sink.closed())).await;
        };

        tokio::select! {
            item = source.next() => match item {
                Some(Ok(chunk)) => deliver(sinks, chunk).await,
                Some(Err(e)) => return Outcome::SourceFailed(e),
                None => return Outcome::Complete,
            },
            _ = all_closed => return Outcome::AllReceiversClosed,
        }
    }
}

/// Deliver one chunk to every open sink, detaching sinks that hung up
async fn deliver(sinks: &mut [Option<Sink>], chunk: Bytes) {
    let sends = sinks.iter().map(|slot| {
        let chunk = chunk.clone();
        async move {
            match slot {
                Some(sink) => sink.send(Ok(chunk)).await.is_ok(),
                None => false,
            }
        }
    });

    let delivered = future::join_all(sends).await;
    for (slot, ok) in sinks.iter_mut().zip(delivered) {
        if !ok {
            *slot = None;
        }
    }
}

/// Abort the remaining receiver responses at the transport level
async fn abort_sinks(sinks: &mut [Option<Sink>]) {
    let aborts = sinks.iter().flatten().map(|sink| async move {
        let _ = sink.send(Err("transfer aborted".into())).await;
    });
    future::join_all(aborts).await;
}

/// Build a receiver's streaming response with the propagated headers
fn receiver_response(
    headers: &SourceHeaders,
    rx: mpsc::Receiver<Result<Bytes, BoxError>>,
) -> Response<RelayBody> {
    let mut response = Response::new(channel_body(rx));
    let map = response.headers_mut();
    map.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    if let Some(value) = &headers.content_length {
        map.insert(CONTENT_LENGTH, value.clone());
    }
    if let Some(value) = &headers.content_type {
        map.insert(CONTENT_TYPE, value.clone());
    }
    if let Some(value) = &headers.content_disposition {
        map.insert(CONTENT_DISPOSITION, value.clone());
    }
    response
}
