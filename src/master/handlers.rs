//! Master HTTP handlers, one per endpoint: decode the request body,
//! call into `MasterState`, and translate the result into a response.

use std::sync::Arc;

use hyper::{Body, Request, Response, StatusCode};

use crate::error::MasterError;
use crate::httpserver::{body_limit, error_response, json_response, read_json};
use crate::master::state::{server_id, MasterState};
use crate::wire::*;

impl MasterError {
    fn into_response(self) -> Response<Body> {
        error_response(self.status(), &self.to_string())
    }
}

fn limit(state: &MasterState) -> usize {
    body_limit(state.common.chunk_size)
}

pub async fn register(state: Arc<MasterState>, req: Request<Body>) -> Response<Body> {
    match read_json::<RegisterRequest>(req.into_body(), limit(&state)).await {
        Ok(body) => {
            state.register_or_heartbeat(body.port).await;
            tracing::info!("registered chunk server '{}'", server_id(body.port));
            json_response(StatusCode::OK, &StatusOkResponse::default())
        }
        Err((status, msg)) => error_response(status, &msg),
    }
}

pub async fn heartbeat(state: Arc<MasterState>, req: Request<Body>) -> Response<Body> {
    match read_json::<HeartbeatRequest>(req.into_body(), limit(&state)).await {
        Ok(body) => {
            state.register_or_heartbeat(body.port).await;
            json_response(StatusCode::OK, &StatusOkResponse::default())
        }
        Err((status, msg)) => error_response(status, &msg),
    }
}

pub async fn list(state: Arc<MasterState>) -> Response<Body> {
    let servers = state.list_chunk_servers().await;
    let view: std::collections::HashMap<String, ChunkServerView> = servers
        .into_iter()
        .map(|(id, rec)| {
            let port = id
                .rsplit(':')
                .next()
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(0);
            (
                id,
                ChunkServerView {
                    port,
                    alive: rec.alive,
                    last_seen_unix: rec.last_seen,
                },
            )
        })
        .collect();
    json_response(StatusCode::OK, &view)
}

pub async fn allocate(state: Arc<MasterState>, req: Request<Body>) -> Response<Body> {
    match read_json::<AllocateRequest>(req.into_body(), limit(&state)).await {
        Ok(body) => match state.allocate(&body.file, body.size_bytes).await {
            Ok((chunk_ids, locations)) => json_response(
                StatusCode::OK,
                &AllocateResponse {
                    chunk_ids,
                    locations,
                },
            ),
            Err(e) => e.into_response(),
        },
        Err((status, msg)) => error_response(status, &msg),
    }
}

pub async fn chunk_locations(state: Arc<MasterState>, req: Request<Body>) -> Response<Body> {
    match read_json::<ChunkLocationsRequest>(req.into_body(), limit(&state)).await {
        Ok(body) => match state.chunk_locations(&body.chunk_id).await {
            Ok(locations) => json_response(StatusCode::OK, &ChunkLocationsResponse { locations }),
            Err(e) => e.into_response(),
        },
        Err((status, msg)) => error_response(status, &msg),
    }
}

pub async fn get_primary(state: Arc<MasterState>, req: Request<Body>) -> Response<Body> {
    match read_json::<PrimaryRequest>(req.into_body(), limit(&state)).await {
        Ok(body) => match state.get_primary(&body.chunk_id).await {
            Ok((primary, lease_seconds, replicas, version)) => json_response(
                StatusCode::OK,
                &PrimaryResponse {
                    primary,
                    lease_seconds,
                    replicas,
                    version,
                },
            ),
            Err(e) => e.into_response(),
        },
        Err((status, msg)) => error_response(status, &msg),
    }
}

pub async fn assign_primary(state: Arc<MasterState>, req: Request<Body>) -> Response<Body> {
    match read_json::<PrimaryRequest>(req.into_body(), limit(&state)).await {
        Ok(body) => match state
            .assign_primary(&body.chunk_id, body.preferred.as_deref())
            .await
        {
            Ok((primary, lease_seconds, replicas, version)) => json_response(
                StatusCode::OK,
                &PrimaryResponse {
                    primary,
                    lease_seconds,
                    replicas,
                    version,
                },
            ),
            Err(e) => e.into_response(),
        },
        Err((status, msg)) => error_response(status, &msg),
    }
}

pub async fn renew_lease(state: Arc<MasterState>, req: Request<Body>) -> Response<Body> {
    match read_json::<RenewLeaseRequest>(req.into_body(), limit(&state)).await {
        Ok(body) => match state.renew_lease(&body.chunk_id, &body.primary).await {
            Ok((ok, lease_seconds)) => {
                json_response(StatusCode::OK, &RenewLeaseResponse { ok, lease_seconds })
            }
            Err(e) => e.into_response(),
        },
        Err((status, msg)) => error_response(status, &msg),
    }
}

pub async fn cluster_info(state: Arc<MasterState>) -> Response<Body> {
    let ns = state.cluster_info().await;

    let chunkservers: std::collections::HashMap<String, ChunkServerView> = ns
        .chunk_servers
        .into_iter()
        .map(|(id, rec)| {
            let port = id
                .rsplit(':')
                .next()
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(0);
            (
                id,
                ChunkServerView {
                    port,
                    alive: rec.alive,
                    last_seen_unix: rec.last_seen,
                },
            )
        })
        .collect();

    let files: std::collections::HashMap<String, ClusterFileView> = ns
        .files
        .into_iter()
        .map(|(name, meta)| (name, ClusterFileView { chunks: meta.chunks }))
        .collect();

    let chunks: std::collections::HashMap<String, ClusterChunkView> = ns
        .chunks
        .into_iter()
        .map(|(id, meta)| {
            (
                id,
                ClusterChunkView {
                    file: meta.file,
                    index: meta.index,
                    replicas: meta.replicas,
                    primary: meta.primary,
                    version: meta.version,
                },
            )
        })
        .collect();

    json_response(
        StatusCode::OK,
        &ClusterInfoResponse {
            chunkservers,
            files,
            chunks,
        },
    )
}
