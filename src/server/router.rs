//! Request router
//!
//! Classifies requests by method and path: senders register with
//! `POST`/`PUT`, receivers with `GET`, the reserved set serves static
//! content, and `OPTIONS` answers CORS preflights.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, CONTENT_LENGTH, HOST,
};
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use hyper::body::Body;

use crate::pipe::{empty_body, full_body, BoxError, RelayBody};
use crate::registry::{PathRegistry, RelayPath};

use super::handler;
use super::pages;

/// Shared context for every request served by one listener
pub struct ServerContext {
    /// The process-wide rendezvous registry
    pub registry: Arc<PathRegistry>,
    /// Whether this listener terminates TLS (drives help-text scheme)
    pub uses_https: bool,
    /// Emit per-request log events
    pub enable_log: bool,
}

/// Dispatch one request to its handler
pub async fn route<B>(ctx: Arc<ServerContext>, req: Request<B>) -> Response<RelayBody>
where
    B: Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError> + Send + Sync,
{
    let path = RelayPath::normalise(req.uri().path());
    let method = req.method().clone();

    if ctx.enable_log {
        tracing::info!(method = %method, path = %path, "Request");
    }

    if method == Method::POST || method == Method::PUT {
        if path.is_reserved() {
            return text_response(
                StatusCode::BAD_REQUEST,
                format!("[ERROR] Cannot send to a reserved path '{path}'. (e.g. '/mypath123')\n"),
            );
        }
        handler::handle_send(&ctx, path, req).await
    } else if method == Method::GET {
        match path.as_str() {
            "/" => pages::index(),
            "/version" => pages::version(),
            "/help" => pages::help(scheme(&ctx, req.headers()), host(req.headers())),
            "/favicon.ico" => pages::favicon(),
            "/robots.txt" => pages::robots(),
            _ => handler::handle_receive(&ctx, path, req).await,
        }
    } else if method == Method::OPTIONS {
        preflight()
    } else {
        text_response(
            StatusCode::OK,
            format!("[ERROR] Unsupported method: {method}.\n"),
        )
    }
}

fn scheme(ctx: &ServerContext, headers: &HeaderMap) -> &'static str {
    let forwarded_https = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|proto| proto.contains("https"));

    if ctx.uses_https || forwarded_https {
        "https"
    } else {
        "http"
    }
}

fn host(headers: &HeaderMap) -> &str {
    headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("hostname")
}

/// CORS preflight response
fn preflight() -> Response<RelayBody> {
    let mut response = Response::new(empty_body());
    let map = response.headers_mut();
    map.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    map.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, HEAD, POST, PUT, OPTIONS"),
    );
    map.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Content-Disposition"),
    );
    map.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    map.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
    response
}

/// Plain-text response with the CORS header attached
pub(super) fn text_response(status: StatusCode, text: impl Into<String>) -> Response<RelayBody> {
    let mut response = Response::new(full_body(text.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}
