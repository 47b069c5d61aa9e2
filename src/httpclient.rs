//! Outbound HTTP/JSON plumbing shared by the master, the chunk server,
//! and the client driver: a plain `hyper::Client<HttpConnector>`
//! wrapped with small `post`/`get` helpers, each call bounded by an
//! explicit timeout.

use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

pub type HttpClient = Client<HttpConnector>;

pub fn new_client() -> HttpClient {
    Client::builder().build_http()
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("request error: {0}")]
    Request(#[from] hyper::Error),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("server returned status {0}: {1}")]
    BadStatus(StatusCode, String),
    #[error("invalid response body: {0}")]
    InvalidBody(#[from] serde_json::Error),
    #[error("invalid uri '{0}': {1}")]
    InvalidUri(String, http::uri::InvalidUri),
    #[error("failed to build request: {0}")]
    Build(#[from] http::Error),
}

/// POSTs `body` as JSON to `url`, returning the raw status and body bytes.
pub async fn post_json_raw<Req: Serialize>(
    client: &HttpClient,
    url: &str,
    body: &Req,
    timeout: Duration,
) -> Result<(StatusCode, bytes::Bytes), HttpError> {
    let payload = serde_json::to_vec(body)?;
    let req = Request::builder()
        .method(Method::POST)
        .uri(url)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload))?;

    let resp = tokio::time::timeout(timeout, client.request(req))
        .await
        .map_err(|_| HttpError::Timeout(timeout))??;
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body()).await?;
    Ok((status, body))
}

/// POSTs `body` as JSON and decodes a 200 response as `Resp`; any other
/// status is reported as `HttpError::BadStatus`.
pub async fn post_json<Req: Serialize, Resp: DeserializeOwned>(
    client: &HttpClient,
    url: &str,
    body: &Req,
    timeout: Duration,
) -> Result<Resp, HttpError> {
    let (status, bytes) = post_json_raw(client, url, body, timeout).await?;
    if status != StatusCode::OK {
        return Err(HttpError::BadStatus(
            status,
            String::from_utf8_lossy(&bytes).into_owned(),
        ));
    }
    Ok(serde_json::from_slice(&bytes)?)
}

/// GETs `url`, returning the raw status and body bytes (used by read
/// paths where a non-200 status, e.g. 404, is an expected outcome rather
/// than a transport failure).
pub async fn get_raw(
    client: &HttpClient,
    url: &str,
    timeout: Duration,
) -> Result<(StatusCode, bytes::Bytes), HttpError> {
    let req = Request::builder()
        .method(Method::GET)
        .uri(url)
        .body(Body::empty())?;
    let resp = tokio::time::timeout(timeout, client.request(req))
        .await
        .map_err(|_| HttpError::Timeout(timeout))??;
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body()).await?;
    Ok((status, body))
}
