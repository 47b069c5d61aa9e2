//! Shared inbound-request plumbing for the master's and chunk server's
//! HTTP routers: bounded-size body reads and uniform JSON responses.
//! Both routers are a hand-written `match` over `(Method, path)`.

use hyper::{Body, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Body size cap: one chunk's worth of payload plus headroom for JSON
/// framing and base64 overhead.
pub fn body_limit(chunk_size: u64) -> usize {
    (chunk_size as usize) * 4 / 3 + 4096
}

/// Reads `body` up to `limit` bytes, erroring instead of buffering an
/// unbounded malformed request.
pub async fn read_body_limited(body: Body, limit: usize) -> Result<bytes::Bytes, String> {
    use futures::StreamExt;

    let mut body = body;
    let mut buf = Vec::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| format!("error reading request body: {}", e))?;
        if buf.len() + chunk.len() > limit {
            return Err(format!("request body exceeds limit of {} bytes", limit));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.into())
}

pub async fn read_json<T: DeserializeOwned>(
    body: Body,
    limit: usize,
) -> Result<T, (StatusCode, String)> {
    let bytes = read_body_limited(body, limit)
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    serde_json::from_slice(&bytes).map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid json: {}", e)))
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(bytes) => Response::builder()
            .status(status)
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("static response builder never fails"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("json encode error: {}", e)),
    }
}

pub fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "text/plain")
        .body(Body::from(message.to_string()))
        .expect("static response builder never fails")
}

pub fn method_not_allowed() -> Response<Body> {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

pub fn not_found(message: &str) -> Response<Body> {
    error_response(StatusCode::NOT_FOUND, message)
}
