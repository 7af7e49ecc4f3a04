//! Source stream selection
//!
//! The source of a transfer is either the sender's raw request body or the
//! body of the first part of a `multipart/form-data` request. The choice
//! also decides which headers are offered to the receivers: header
//! presence, not value truthiness, drives propagation, so an empty value
//! is still forwarded.

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};
use multer::Multipart;
use tokio::sync::{mpsc, oneshot};

use super::{box_byte_stream, BoxError, ByteStream};

/// Headers propagated from the chosen source to every receiver
#[derive(Debug, Clone, Default)]
pub struct SourceHeaders {
    pub content_length: Option<HeaderValue>,
    pub content_type: Option<HeaderValue>,
    pub content_disposition: Option<HeaderValue>,
}

impl SourceHeaders {
    fn extract(headers: &HeaderMap) -> Self {
        Self {
            content_length: headers.get(CONTENT_LENGTH).cloned(),
            content_type: headers.get(CONTENT_TYPE).cloned(),
            content_disposition: headers.get(CONTENT_DISPOSITION).cloned(),
        }
    }
}

/// The chosen source byte stream plus its receiver-facing headers
pub struct Source {
    pub headers: SourceHeaders,
    pub stream: ByteStream,
}

/// Choose the source stream for a transfer
///
/// For multipart senders, the body is parsed incrementally and only the
/// first part is streamed; whatever follows that part is discarded at the
/// sender end. Resolution completes once the part headers have been read,
/// so the transfer can start before the part body has arrived.
pub async fn resolve(request_headers: &HeaderMap, body: ByteStream) -> Result<Source, BoxError> {
    let content_type = request_headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    let Some(content_type) = content_type.filter(|ct| ct.contains("multipart/form-data")) else {
        return Ok(Source {
            headers: SourceHeaders::extract(request_headers),
            stream: body,
        });
    };

    let boundary = multer::parse_boundary(content_type)?;
    first_part(body, boundary).await
}

/// Stream the first multipart part through a relay channel
async fn first_part(body: ByteStream, boundary: String) -> Result<Source, BoxError> {
    let (chunk_tx, mut chunk_rx) = mpsc::channel::<Result<Bytes, BoxError>>(1);
    let (header_tx, header_rx) = oneshot::channel::<Result<SourceHeaders, BoxError>>();

    tokio::spawn(async move {
        let mut multipart = Multipart::new(body, boundary);

        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => {
                let _ = header_tx.send(Ok(SourceHeaders::extract(field.headers())));
                field
            }
            Ok(None) => {
                let _ = header_tx.send(Err("multipart body contains no parts".into()));
                return;
            }
            Err(e) => {
                let _ = header_tx.send(Err(e.into()));
                return;
            }
        };

        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    if chunk_tx.send(Ok(chunk)).await.is_err() {
                        return;
                    }
                }
                // First part finished; the rest of the body is not read.
                Ok(None) => return,
                Err(e) => {
                    let _ = chunk_tx.send(Err(e.into())).await;
                    return;
                }
            }
        }
    });

    let headers = match header_rx.await {
        Ok(result) => result?,
        Err(_) => return Err("multipart parser terminated unexpectedly".into()),
    };

    let stream = box_byte_stream(stream::poll_fn(move |cx| chunk_rx.poll_recv(cx)));
    Ok(Source { headers, stream })
}
