//! Node assembly
//!
//! Startup order matters: the archive directory is scanned and the registry
//! rebuilt before any listener is bound, so nothing is served or accepted
//! against a half-populated registry. Every fallible step here is fatal.

use libp2p_identity::PeerId;
use multiaddr::Multiaddr;
use sim_sp_core::{ShutdownController, SimSpError, SimSpResult};
use sim_sp_deals::{ingest_pipeline, DealBook};
use sim_sp_protocol::{
    http_multiaddr, DealProposalHandler, StreamRouter, TcpStreamTransport,
    TransportQueryHandler, BLOCK_EXCHANGE_PROTOCOL, RETRIEVAL_TRANSPORTS_PROTOCOL,
    STORAGE_DEAL_PROTOCOL,
};
use sim_sp_retrieval::{BlockExchangeResponder, RetrievalServer, RetrievalState};
use sim_sp_store::{scan_archive_dir, ArchiveLayout, BlockOverlay, PieceRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::NodeConfig;
use crate::identity::NodeIdentity;

/// How long tasks get to finish after shutdown is triggered
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// A started node and its background tasks
pub struct RunningNode {
    peer_id: PeerId,
    http_addr: SocketAddr,
    listen_addrs: Vec<Multiaddr>,
    registry: Arc<PieceRegistry>,
    book: Arc<DealBook>,
    shutdown: ShutdownController,
    tasks: JoinSet<()>,
}

/// Bring up storage, ingestion, the HTTP server and the stream transport
pub async fn start(config: NodeConfig) -> SimSpResult<RunningNode> {
    config.validate()?;
    let identity = NodeIdentity::from_base64(&config.identity.key)?;
    let peer_id = identity.peer_id();
    info!(%peer_id, "Loaded node identity");

    let layout = ArchiveLayout::new(&config.storage.car_dir);
    layout.ensure_dir()?;
    let book = Arc::new(DealBook::open(config.deal_dir())?);
    let registry = Arc::new(PieceRegistry::new(Arc::new(BlockOverlay::new())));

    let scan_layout = layout.clone();
    let scan_registry = registry.clone();
    let policy = config.corrupt_archive_policy();
    let report = tokio::task::spawn_blocking(move || {
        scan_archive_dir(&scan_layout, &scan_registry, policy)
    })
    .await
    .map_err(|e| SimSpError::config(format!("archive scan task failed: {e}")))??;
    info!(
        pieces = report.registered.len(),
        quarantined = report.quarantined.len(),
        removed_temp = report.removed_temp,
        ignored = report.ignored,
        deals = book.len(),
        "Restored state from disk"
    );

    let shutdown = ShutdownController::new();
    let (queue, worker) = ingest_pipeline(
        &config.pipeline_config(),
        layout,
        registry.clone(),
        book.clone(),
        shutdown.signal(),
    )?;

    let http = RetrievalServer::bind(
        config.http_bind_addr()?,
        RetrievalState {
            registry: registry.clone(),
            book: book.clone(),
        },
    )
    .await?;
    let http_addr = http.local_addr()?;

    let transport = TcpStreamTransport::bind(&config.listen_multiaddrs()?).await?;
    let listen_addrs = transport.listen_addrs().to_vec();
    let advertised_http = http_multiaddr(config.network.http_advertise_host, http_addr.port());
    let router = StreamRouter::new()
        .with(
            RETRIEVAL_TRANSPORTS_PROTOCOL,
            Arc::new(TransportQueryHandler::new(advertised_http, &listen_addrs)),
        )
        .with(STORAGE_DEAL_PROTOCOL, Arc::new(DealProposalHandler::new(queue)))
        .with(
            BLOCK_EXCHANGE_PROTOCOL,
            Arc::new(BlockExchangeResponder::new(registry.overlay().clone())),
        );

    let mut tasks = JoinSet::new();
    tasks.spawn(worker.run());
    let http_shutdown = shutdown.signal();
    tasks.spawn(async move {
        if let Err(e) = http.serve(http_shutdown).await {
            error!(error = %e, "HTTP server stopped with an error");
        }
    });
    tasks.spawn(transport.run(Arc::new(router), shutdown.signal()));

    info!(%peer_id, %http_addr, listen = ?listen_addrs, "Storage provider node started");
    Ok(RunningNode {
        peer_id,
        http_addr,
        listen_addrs,
        registry,
        book,
        shutdown,
        tasks,
    })
}

impl RunningNode {
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Bound HTTP address (port 0 resolved)
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// Bound stream transport addresses
    pub fn listen_addrs(&self) -> &[Multiaddr] {
        &self.listen_addrs
    }

    pub fn registry(&self) -> &Arc<PieceRegistry> {
        &self.registry
    }

    pub fn book(&self) -> &Arc<DealBook> {
        &self.book
    }

    /// Resolves when any background task exits on its own
    pub async fn stopped(&mut self) {
        if self.tasks.join_next().await.is_some() {
            warn!("A node task exited before shutdown");
        }
    }

    /// Trigger shutdown and wait for the tasks, aborting stragglers after a grace period
    pub async fn shutdown(mut self) {
        info!("Shutting down");
        self.shutdown.trigger();
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while self.tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("Tasks still running after grace period; aborting");
            self.tasks.shutdown().await;
        }
        info!("Node stopped");
    }
}
