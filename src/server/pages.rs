//! Reserved-path responses
//!
//! Static content for the paths that can never host a rendezvous. Every
//! page with a body carries explicit Content-Length and Content-Type
//! headers.

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, Response, StatusCode};

use crate::pipe::{empty_body, full_body, RelayBody};

const INDEX_HTML: &str = concat!(
    "<!DOCTYPE html>\n",
    "<html>\n",
    "<head><title>HTTP relay</title></head>\n",
    "<body>\n",
    "<h1>HTTP relay</h1>\n",
    "<p>Send a body with <code>POST</code>/<code>PUT</code> to any path and ",
    "receive it with <code>GET</code> on the same path.</p>\n",
    "<p>See <a href=\"/help\">/help</a> for transfer examples.</p>\n",
    "</body>\n",
    "</html>\n",
);

const VERSION_TEXT: &str = concat!(env!("CARGO_PKG_VERSION"), "\n");

/// `GET /`: minimal HTML landing page
pub fn index() -> Response<RelayBody> {
    static_page("text/html", INDEX_HTML)
}

/// `GET /version`: version string plus newline
pub fn version() -> Response<RelayBody> {
    static_page("text/plain", VERSION_TEXT)
}

/// `GET /help`: transfer examples for the requested scheme and host
pub fn help(scheme: &str, host: &str) -> Response<RelayBody> {
    let base = format!("{scheme}://{host}");
    let text = format!(
        "Help for the HTTP relay (version {version})\n\
         \n\
         ======= Send =======\n\
         # Send a file\n\
         curl -T myfile {base}/mypath\n\
         \n\
         # Send from stdin\n\
         seq 10 | curl -T - {base}/mypath\n\
         \n\
         # Send to two receivers\n\
         curl -T myfile '{base}/mypath?n=2'\n\
         \n\
         ======= Receive =======\n\
         # Receive into a file\n\
         curl {base}/mypath > myfile\n\
         \n\
         # Receive to stdout\n\
         curl {base}/mypath\n",
        version = env!("CARGO_PKG_VERSION"),
    );

    static_page("text/plain", text)
}

/// `GET /favicon.ico`: nothing to serve
pub fn favicon() -> Response<RelayBody> {
    let mut response = Response::new(empty_body());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

/// `GET /robots.txt`: crawlers have nothing to index here
pub fn robots() -> Response<RelayBody> {
    let mut response = Response::new(empty_body());
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

fn static_page(content_type: &'static str, text: impl Into<Bytes>) -> Response<RelayBody> {
    let text = text.into();
    let length = HeaderValue::from(text.len());

    let mut response = Response::new(full_body(text));
    let map = response.headers_mut();
    map.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    map.insert(CONTENT_LENGTH, length);
    response
}
