//! Chunk server HTTP bootstrap plus the registration/heartbeat client
//! loops.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server};

use crate::chunkserver::handlers;
use crate::chunkserver::state::ChunkServerState;
use crate::httpserver::{method_not_allowed, not_found};
use crate::wire::{HeartbeatRequest, RegisterRequest};

async fn route(
    state: Arc<ChunkServerState>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let response = match (req.method().clone(), req.uri().path()) {
        (Method::GET, "/hello") => handlers::hello(state).await,
        (Method::POST, "/write_chunk") => handlers::write_chunk(state, req).await,
        (Method::GET, "/read_chunk") => handlers::read_chunk(state, req).await,
        (Method::POST, "/write_primary") => handlers::write_primary(state, req).await,
        (Method::POST, "/apply_write") => handlers::apply_write(state, req).await,
        (Method::POST, "/commit") => handlers::commit(state, req).await,
        (Method::POST, "/copy_chunk") => handlers::copy_chunk(state, req).await,
        (Method::POST, "/receive_chunk") => handlers::receive_chunk(state, req).await,
        (_, path)
            if matches!(
                path,
                "/write_chunk"
                    | "/write_primary"
                    | "/apply_write"
                    | "/commit"
                    | "/copy_chunk"
                    | "/receive_chunk"
            ) =>
        {
            method_not_allowed()
        }
        _ => not_found("no such chunk server endpoint"),
    };
    Ok(response)
}

/// Registers with the master, retrying indefinitely on failure.
async fn register_with_retry(state: &Arc<ChunkServerState>) {
    let url = format!("http://{}/register", state.config.master_addr);
    let req = RegisterRequest { port: state.port };
    let timeout = Duration::from_secs(state.common.apply_write_timeout);

    loop {
        match crate::httpclient::post_json_raw(&state.http, &url, &req, timeout).await {
            Ok((status, _)) if status.is_success() => {
                tracing::info!("chunk-server: registered with master");
                return;
            }
            Ok((status, body)) => {
                tracing::warn!(
                    "register failed: master returned {} ({}) | retrying...",
                    status,
                    String::from_utf8_lossy(&body)
                );
            }
            Err(e) => {
                tracing::warn!("register failed: {} | retrying...", e);
            }
        }
        tokio::time::sleep(Duration::from_secs(state.common.register_retry_delay)).await;
    }
}

fn spawn_heartbeats(state: Arc<ChunkServerState>) {
    tokio::spawn(async move {
        let url = format!("http://{}/heartbeat", state.config.master_addr);
        let timeout = Duration::from_secs(state.common.apply_write_timeout);
        let mut ticker = tokio::time::interval(Duration::from_secs(state.common.heartbeat_interval));
        loop {
            ticker.tick().await;
            let req = HeartbeatRequest { port: state.port };
            match crate::httpclient::post_json_raw(&state.http, &url, &req, timeout).await {
                Ok((status, _)) if status.is_success() => {
                    tracing::debug!("heartbeat sent from port {}", state.port);
                }
                Ok((status, _)) => {
                    tracing::warn!("heartbeat rejected by master: {}", status);
                }
                Err(e) => {
                    tracing::warn!("heartbeat error: {}", e);
                }
            }
        }
    });
}

pub async fn run(state: Arc<ChunkServerState>) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", state.port).parse()?;
    let listener = std::net::TcpListener::bind(addr)?;
    serve(listener, state).await
}

/// Serves on an already-bound listener, registering with the master and
/// starting heartbeats first. Lets tests bind an ephemeral port and
/// pass it in directly.
pub async fn serve(
    listener: std::net::TcpListener,
    state: Arc<ChunkServerState>,
) -> Result<(), Box<dyn std::error::Error>> {
    register_with_retry(&state).await;
    spawn_heartbeats(state.clone());

    let svc_state = state.clone();
    let make_svc = make_service_fn(move |_conn| {
        let state = svc_state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let state = state.clone();
                async move { route(state, req).await }
            }))
        }
    });

    let server = Server::from_tcp(listener)?.serve(make_svc);
    tracing::info!("chunk-server {} listening on {}", state.self_id(), server.local_addr());

    if let Err(e) = server.with_graceful_shutdown(shutdown_signal()).await {
        tracing::error!("chunk server error: {}", e);
    }
    tracing::info!("chunk-server shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
