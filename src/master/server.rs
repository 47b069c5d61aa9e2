//! Master HTTP server bootstrap: a hand-rolled router over `(Method,
//! path)` plus graceful shutdown.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server};

use crate::httpserver::{method_not_allowed, not_found};
use crate::master::durability;
use crate::master::state::MasterState;
use crate::master::{handlers, sweeper};

async fn route(state: Arc<MasterState>, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let response = match (req.method().clone(), req.uri().path()) {
        (Method::POST, "/register") => handlers::register(state, req).await,
        (Method::POST, "/heartbeat") => handlers::heartbeat(state, req).await,
        (Method::GET, "/list") => handlers::list(state).await,
        (Method::POST, "/allocate") => handlers::allocate(state, req).await,
        (Method::POST, "/chunk_locations") => handlers::chunk_locations(state, req).await,
        (Method::POST, "/get_primary") => handlers::get_primary(state, req).await,
        (Method::POST, "/assign_primary") => handlers::assign_primary(state, req).await,
        (Method::POST, "/renew_lease") => handlers::renew_lease(state, req).await,
        (Method::GET, "/cluster_info") => handlers::cluster_info(state).await,
        (_, path)
            if matches!(
                path,
                "/register"
                    | "/heartbeat"
                    | "/allocate"
                    | "/chunk_locations"
                    | "/get_primary"
                    | "/assign_primary"
                    | "/renew_lease"
            ) =>
        {
            method_not_allowed()
        }
        _ => not_found("no such master endpoint"),
    };
    Ok(response)
}

/// Runs the master on its configured `bind_addr`.
pub async fn run(state: Arc<MasterState>) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = state.config.bind_addr.parse()?;
    let listener = std::net::TcpListener::bind(addr)?;
    serve(listener, state).await
}

/// Serves the master on an already-bound listener. Lets tests bind
/// `127.0.0.1:0` and learn the real ephemeral port via
/// `listener.local_addr()` before handing it off here.
pub async fn serve(
    listener: std::net::TcpListener,
    state: Arc<MasterState>,
) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown_grace = Duration::from_secs(state.common.shutdown_grace);

    sweeper::spawn(state.clone());

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
    tracing::info!("master listening on {}", server.local_addr());

    if let Err(e) = server.with_graceful_shutdown(shutdown_signal()).await {
        tracing::error!("master server error: {}", e);
    }

    // give in-flight repair/checkpoint tasks a moment before the final save
    tokio::time::sleep(shutdown_grace).await;
    let ns = state.snapshot().await;
    if let Err(e) = durability::save_checkpoint(&state.config.checkpoint_path, &ns).await {
        tracing::warn!("final checkpoint failed: {}", e);
    } else {
        tracing::info!("master: shutdown completed");
    }
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
    tracing::info!("master: shutdown signal received, shutting down...");
}
