//! Chunk server HTTP handlers: one function per endpoint, covering both
//! the single-shot storage path and the replicated write pipeline.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use hyper::{Body, Request, Response, StatusCode};

use crate::chunkserver::state::ChunkServerState;
use crate::error::ChunkServerError;
use crate::httpclient;
use crate::httpserver::{body_limit, error_response, json_response, read_json};
use crate::wire::*;

impl ChunkServerError {
    fn into_response(self) -> Response<Body> {
        error_response(self.status(), &self.to_string())
    }
}

fn limit(state: &ChunkServerState) -> usize {
    body_limit(state.common.chunk_size)
}

pub async fn hello(state: Arc<ChunkServerState>) -> Response<Body> {
    Response::new(Body::from(format!(
        "chunk-server {} online\n",
        state.self_id()
    )))
}

/// `/write_chunk`: unreplicated smoke-test path.
pub async fn write_chunk(state: Arc<ChunkServerState>, req: Request<Body>) -> Response<Body> {
    match read_json::<WriteChunkRequest>(req.into_body(), limit(&state)).await {
        Ok(body) => match state.write_stable(&body.chunk_id, &body.data).await {
            Ok(()) => json_response(StatusCode::OK, &StatusOkResponse::default()),
            Err(e) => e.into_response(),
        },
        Err((status, msg)) => error_response(status, &msg),
    }
}

/// `/read_chunk?chunk_id=...`.
pub async fn read_chunk(state: Arc<ChunkServerState>, req: Request<Body>) -> Response<Body> {
    let chunk_id = match req
        .uri()
        .query()
        .and_then(|q| url_query_param(q, "chunk_id"))
    {
        Some(id) => id,
        None => return error_response(StatusCode::BAD_REQUEST, "missing chunk_id query param"),
    };

    match state.read_stable(&chunk_id).await {
        Ok(bytes) => Response::builder()
            .status(StatusCode::OK)
            .body(Body::from(bytes))
            .expect("static response builder never fails"),
        Err(e) => e.into_response(),
    }
}

fn url_query_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let k = parts.next()?;
        let v = parts.next().unwrap_or("");
        if k == key {
            Some(v.to_string())
        } else {
            None
        }
    })
}

/// `/write_primary`: stage, fan out `apply_write` to every follower,
/// commit on full success.
pub async fn write_primary(state: Arc<ChunkServerState>, req: Request<Body>) -> Response<Body> {
    let body = match read_json::<WritePrimaryRequest>(req.into_body(), limit(&state)).await {
        Ok(b) => b,
        Err((status, msg)) => return error_response(status, &msg),
    };

    let seq = state.next_seq(&body.chunk_id).await;
    if let Err(e) = state.stage(&body.chunk_id, seq, &body.data).await {
        return e.into_response();
    }

    let replicas = match crate::httpclient::post_json::<_, ChunkLocationsResponse>(
        &state.http,
        &format!("http://{}/chunk_locations", state.config.master_addr),
        &ChunkLocationsRequest {
            chunk_id: body.chunk_id.clone(),
        },
        Duration::from_secs(state.common.apply_write_timeout),
    )
    .await
    {
        Ok(resp) => resp.locations,
        Err(e) => {
            state.discard_temp(&body.chunk_id, seq).await;
            return ChunkServerError::Downstream(format!("failed to resolve replicas: {}", e))
                .into_response();
        }
    };

    let self_id = state.self_id();
    let followers: Vec<String> = replicas.into_iter().filter(|r| *r != self_id).collect();

    let timeout = Duration::from_secs(state.common.apply_write_timeout);
    let apply_req = ApplyWriteRequest {
        chunk_id: body.chunk_id.clone(),
        seq,
        data: body.data.clone(),
    };

    let acks = join_all(followers.iter().map(|follower| {
        let client = state.http.clone();
        let url = format!("http://{}/apply_write", follower);
        let req = &apply_req;
        async move { httpclient::post_json::<_, SeqResponse>(&client, &url, req, timeout).await }
    }))
    .await;

    if let Some(err) = acks.iter().find_map(|r| r.as_ref().err()) {
        tracing::warn!(
            "write_primary: follower ack failed for chunk '{}': {}",
            body.chunk_id,
            err
        );
        state.discard_temp(&body.chunk_id, seq).await;
        return ChunkServerError::Downstream("follower ack failed".to_string()).into_response();
    }

    if let Err(e) = state.promote(&body.chunk_id, seq).await {
        return e.into_response();
    }
    state.record_committed(&body.chunk_id, seq).await;

    json_response(StatusCode::OK, &SeqResponse { status: "ok".into(), seq })
}

/// `/apply_write`: follower side, stage only.
pub async fn apply_write(state: Arc<ChunkServerState>, req: Request<Body>) -> Response<Body> {
    match read_json::<ApplyWriteRequest>(req.into_body(), limit(&state)).await {
        Ok(body) => {
            if let Err(e) = state.stage(&body.chunk_id, body.seq, &body.data).await {
                return e.into_response();
            }
            state.record_applied(&body.chunk_id, body.seq).await;
            json_response(
                StatusCode::OK,
                &SeqResponse {
                    status: "ok".into(),
                    seq: body.seq,
                },
            )
        }
        Err((status, msg)) => error_response(status, &msg),
    }
}

/// `/commit`: optional stage/commit split, promotes a follower's temp
/// file and advances `last_committed` monotonically.
pub async fn commit(state: Arc<ChunkServerState>, req: Request<Body>) -> Response<Body> {
    match read_json::<CommitRequest>(req.into_body(), limit(&state)).await {
        Ok(body) => {
            if let Err(e) = state.promote(&body.chunk_id, body.seq).await {
                return e.into_response();
            }
            state.record_committed(&body.chunk_id, body.seq).await;
            json_response(
                StatusCode::OK,
                &SeqResponse {
                    status: "ok".into(),
                    seq: body.seq,
                },
            )
        }
        Err((status, msg)) => error_response(status, &msg),
    }
}

/// `/copy_chunk`: read local stable bytes, push them to `target`'s
/// `/receive_chunk`.
pub async fn copy_chunk(state: Arc<ChunkServerState>, req: Request<Body>) -> Response<Body> {
    let body = match read_json::<CopyChunkRequest>(req.into_body(), limit(&state)).await {
        Ok(b) => b,
        Err((status, msg)) => return error_response(status, &msg),
    };

    let data = match state.read_stable(&body.chunk_id).await {
        Ok(d) => d,
        Err(e) => return e.into_response(),
    };

    let url = format!("http://{}/receive_chunk", body.target);
    let timeout = Duration::from_secs(state.common.copy_chunk_timeout);
    let receive_req = ReceiveChunkRequest {
        chunk_id: body.chunk_id.clone(),
        data,
    };

    match httpclient::post_json::<_, StatusMessageResponse>(&state.http, &url, &receive_req, timeout)
        .await
    {
        Ok(resp) if resp.status == "ok" => json_response(
            StatusCode::OK,
            &StatusMessageResponse {
                status: "ok".into(),
                message: None,
            },
        ),
        Ok(resp) => ChunkServerError::Downstream(format!(
            "target rejected copy: {}",
            resp.message.unwrap_or_default()
        ))
        .into_response(),
        Err(e) => ChunkServerError::Downstream(format!("copy to target failed: {}", e)).into_response(),
    }
}

/// `/receive_chunk`: write bytes directly to the stable name, used as
/// the repair target-side endpoint.
pub async fn receive_chunk(state: Arc<ChunkServerState>, req: Request<Body>) -> Response<Body> {
    match read_json::<ReceiveChunkRequest>(req.into_body(), limit(&state)).await {
        Ok(body) => match state.write_stable(&body.chunk_id, &body.data).await {
            Ok(()) => json_response(
                StatusCode::OK,
                &StatusMessageResponse {
                    status: "ok".into(),
                    message: None,
                },
            ),
            Err(e) => e.into_response(),
        },
        Err((status, msg)) => error_response(status, &msg),
    }
}
