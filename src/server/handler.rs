//! Sender and receiver registration handlers
//!
//! Senders get an immediate 200 whose body stays open as a status channel;
//! receivers get their response deferred until the rendezvous establishes
//! and the transfer headers are known.

use bytes::Bytes;
use futures_util::stream::StreamExt;
use http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use http::{HeaderValue, Request, Response, StatusCode};
use http_body_util::BodyStream;
use hyper::body::Body;
use tokio::sync::oneshot;

use crate::pipe::{box_byte_stream, line_body, BoxError, ByteStream, RelayBody};
use crate::registry::{NoticeChannel, ReceiverEnd, RegistryError, RelayPath, SenderEnd};

use super::router::{text_response, ServerContext};

/// Register the request as a sender on the path
pub(super) async fn handle_send<B>(
    ctx: &ServerContext,
    path: RelayPath,
    req: Request<B>,
) -> Response<RelayBody>
where
    B: Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError> + Send + Sync,
{
    let n_receivers = receiver_count(req.uri().query());
    let (parts, body) = req.into_parts();

    let (notices, notice_rx) = NoticeChannel::new();
    let sender = SenderEnd {
        id: ctx.registry.next_participant_id(),
        headers: parts.headers,
        body: byte_stream(body),
        notices,
    };

    match ctx.registry.register_sender(path, n_receivers, sender).await {
        Ok(()) => {
            let mut response = Response::new(line_body(notice_rx));
            response
                .headers_mut()
                .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
            response
        }
        Err(error) => rejection(error),
    }
}

/// Register the request as a receiver and wait for the transfer to start
pub(super) async fn handle_receive<B>(
    ctx: &ServerContext,
    path: RelayPath,
    req: Request<B>,
) -> Response<RelayBody> {
    let n_receivers = receiver_count(req.uri().query());
    drop(req);

    let (reply, reply_rx) = oneshot::channel();
    let receiver = ReceiverEnd {
        id: ctx.registry.next_participant_id(),
        reply,
    };

    // The guard stays armed across the wait: if this future is dropped
    // because the connection aborted, the receiver withdraws itself.
    let guard = match ctx
        .registry
        .register_receiver(path, n_receivers, receiver)
        .await
    {
        Ok(guard) => guard,
        Err(error) => return rejection(error),
    };

    match reply_rx.await {
        Ok(response) => {
            guard.disarm();
            response
        }
        // The transfer collapsed before headers could be determined.
        Err(_) => {
            guard.disarm();
            text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "[ERROR] Sending failed.\n",
            )
        }
    }
}

/// Declared receiver count from the `n` query parameter
///
/// Missing or non-integer values substitute the default of 1. Zero and
/// negative values normalise to 0, which registration rejects.
fn receiver_count(query: Option<&str>) -> u32 {
    let value = query
        .into_iter()
        .flat_map(|q| q.split('&'))
        .find_map(|pair| pair.strip_prefix("n="));

    let Some(raw) = value else {
        return 1;
    };

    match raw.parse::<i64>() {
        Ok(n) if n > 0 => n.min(i64::from(u32::MAX)) as u32,
        Ok(_) => 0,
        Err(_) => 1,
    }
}

/// Flatten an HTTP body into a stream of data chunks
fn byte_stream<B>(body: B) -> ByteStream
where
    B: Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError> + Send + Sync,
{
    box_byte_stream(BodyStream::new(body).filter_map(|item| async move {
        match item {
            Ok(frame) => frame.into_data().ok().map(Ok),
            Err(e) => Some(Err(e.into())),
        }
    }))
}

fn rejection(error: RegistryError) -> Response<RelayBody> {
    text_response(StatusCode::BAD_REQUEST, format!("[ERROR] {error}\n"))
}
