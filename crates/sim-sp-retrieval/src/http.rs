//! HTTP retrieval server
//!
//! | route               | response                                        |
//! |---------------------|-------------------------------------------------|
//! | `GET /piece/:piece` | archive bytes, with `Range` and conditional GET |
//! | `GET /ipfs/:cid`    | one raw block from the overlay                  |
//! | `GET /deals`        | all deal records, JSON, zstd-compressed         |
//! | `GET /deals/:deal`  | one deal record as JSON                         |
//! | `GET /health`       | liveness                                        |

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use cid::Cid;
use sim_sp_core::{DealId, PieceId, ShutdownSignal, SimSpError, SimSpResult};
use sim_sp_deals::DealBook;
use sim_sp_store::{Blockstore, PieceRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::{services::ServeFile, trace::TraceLayer};
use tracing::{debug, error, info};

/// Content type of a single raw IPLD block
pub const RAW_BLOCK_CONTENT_TYPE: &str = "application/vnd.ipld.raw";

/// Content type of the compressed deal listing
pub const ZSTD_CONTENT_TYPE: &str = "application/zstd";

/// Shared state for the handlers
#[derive(Clone)]
pub struct RetrievalState {
    pub registry: Arc<PieceRegistry>,
    pub book: Arc<DealBook>,
}

/// Build the retrieval router
pub fn router(state: RetrievalState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/piece/:piece_id", get(serve_piece))
        .route("/ipfs/:cid", get(get_block))
        .route("/deals", get(list_deals))
        .route("/deals/:deal_id", get(get_deal))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A bound, not yet running, HTTP server
pub struct RetrievalServer {
    listener: TcpListener,
    router: Router,
}

impl RetrievalServer {
    pub async fn bind(addr: SocketAddr, state: RetrievalState) -> SimSpResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SimSpError::config(format!("cannot bind HTTP server to {addr}: {e}")))?;
        Ok(Self {
            listener,
            router: router(state),
        })
    }

    pub fn local_addr(&self) -> SimSpResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| SimSpError::transport(format!("cannot read HTTP listen address: {e}")))
    }

    /// Serve until `shutdown` fires, then drain in-flight requests
    pub async fn serve(self, mut shutdown: ShutdownSignal) -> SimSpResult<()> {
        let addr = self.local_addr()?;
        info!(%addr, "Starting HTTP server");
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { shutdown.triggered().await })
            .await
            .map_err(|e| SimSpError::transport(format!("HTTP server failed: {e}")))?;
        info!(%addr, "HTTP server stopped");
        Ok(())
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn serve_piece(
    State(state): State<RetrievalState>,
    Path(piece_id): Path<String>,
    request: Request,
) -> Response {
    let path = match piece_id
        .parse::<PieceId>()
        .and_then(|piece| state.registry.lookup(&piece))
    {
        Ok(path) => path,
        Err(_) => return (StatusCode::NOT_FOUND, "File not found").into_response(),
    };

    if let Err(e) = tokio::fs::metadata(&path).await {
        error!(piece_id = %piece_id, path = %path.display(), error = %e, "Cannot stat piece file");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Error opening file").into_response();
    }

    match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

async fn get_block(State(state): State<RetrievalState>, Path(cid): Path<String>) -> Response {
    let cid = match Cid::try_from(cid.as_str()) {
        Ok(cid) => cid,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("invalid CID: {e}")).into_response(),
    };

    let overlay = state.registry.overlay().clone();
    let read = tokio::task::spawn_blocking(move || overlay.get(&cid))
        .await
        .unwrap_or_else(|e| Err(SimSpError::transport(format!("block read task failed: {e}"))));
    match read {
        Ok(block) => {
            debug!(%cid, bytes = block.len(), "Serving block");
            (
                [(header::CONTENT_TYPE, RAW_BLOCK_CONTENT_TYPE)],
                block.into_data(),
            )
                .into_response()
        }
        Err(e) if e.is_not_found() => (StatusCode::NOT_FOUND, "Block not found").into_response(),
        Err(e) => {
            error!(%cid, error = %e, "Block read failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error reading block").into_response()
        }
    }
}

async fn list_deals(State(state): State<RetrievalState>) -> Response {
    let encoded = serde_json::to_vec(&state.book.snapshot())
        .map_err(|e| e.to_string())
        .and_then(|json| zstd::encode_all(json.as_slice(), 0).map_err(|e| e.to_string()));
    match encoded {
        Ok(compressed) => ([(header::CONTENT_TYPE, ZSTD_CONTENT_TYPE)], compressed).into_response(),
        Err(e) => {
            error!(error = %e, "Error marshalling deals");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error marshalling deals").into_response()
        }
    }
}

async fn get_deal(State(state): State<RetrievalState>, Path(deal_id): Path<String>) -> Response {
    match deal_id
        .parse::<DealId>()
        .ok()
        .and_then(|id| state.book.get(&id))
    {
        Some(record) => Json(record).into_response(),
        None => (StatusCode::NOT_FOUND, "Deal not found").into_response(),
    }
}
