//! Deal ingestion pipeline
//!
//! Protocol handlers submit accepted proposals to a bounded queue; one worker
//! drains it serially. For each deal the worker downloads the payload to
//! `{dealId}.car.temp`, checks that it opens as an archive, renames it to
//! `{pieceId}.car` (the publish point) and registers it. A download that does
//! not open is quarantined from its temp name, so a published archive is never
//! replaced by an unreadable one. A failed deal is recorded and the worker
//! moves on.

use sim_sp_core::{DealId, PieceId, ShutdownSignal, SimSpError, SimSpResult};
use sim_sp_store::{ArchiveLayout, CarArchive, PieceRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::book::DealBook;
use crate::fetch::HttpFetcher;
use crate::status::DealStatus;
use crate::types::{DealParams, HttpTransferParams};

/// Default bound on queued deals
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Pipeline tuning
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub connect_timeout: Duration,
    pub download_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            connect_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(3600),
        }
    }
}

/// Result of submitting a proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Recorded and queued for the worker
    Queued,
    /// Recorded as failed without queueing: the transfer type is not HTTP
    Unsupported(String),
    /// No usable record could be written; the node holds nothing for the deal
    Rejected(String),
    /// The deal id was already proposed
    Duplicate,
    /// The node is shutting down; nothing was queued
    Abandoned,
}

/// Producer side of the ingestion queue
#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<DealParams>,
    book: Arc<DealBook>,
    shutdown: ShutdownSignal,
}

impl IngestQueue {
    /// Record `deal` and queue it for ingestion
    ///
    /// Waits for queue space, but gives up as soon as shutdown is signalled.
    pub async fn submit(&self, deal: DealParams) -> SubmitOutcome {
        let deal_id = deal.deal_id();

        let proposal = deal.proposal().clone();
        let recorded = self
            .book
            .blocking(move |book| {
                book.propose(deal_id, proposal)?;
                book.transition(deal_id, DealStatus::Accepted)
            })
            .await;
        match recorded {
            Ok(_) => {}
            Err(SimSpError::InvalidTransition { .. }) => {
                warn!(deal_id = %deal_id, "Rejecting duplicate proposal");
                return SubmitOutcome::Duplicate;
            }
            Err(e) => {
                error!(deal_id = %deal_id, error = %e, "Cannot record proposal");
                return SubmitOutcome::Rejected(e.to_string());
            }
        }

        if !deal.transfer.is_http() {
            let reason = format!("unsupported transfer type: {}", deal.transfer.transfer_type);
            record_failure(&self.book, deal_id, reason.clone()).await;
            return SubmitOutcome::Unsupported(reason);
        }

        let mut shutdown = self.shutdown.clone();
        if shutdown.is_triggered() {
            record_failure(&self.book, deal_id, "node shutting down").await;
            return SubmitOutcome::Abandoned;
        }

        let sent = tokio::select! {
            biased;
            _ = shutdown.triggered() => None,
            sent = self.tx.send(deal) => Some(sent.is_ok()),
        };
        match sent {
            Some(true) => {
                info!(deal_id = %deal_id, "Deal queued for ingestion");
                SubmitOutcome::Queued
            }
            Some(false) => {
                record_failure(&self.book, deal_id, "ingestion worker stopped").await;
                SubmitOutcome::Abandoned
            }
            None => {
                record_failure(&self.book, deal_id, "node shutting down").await;
                SubmitOutcome::Abandoned
            }
        }
    }
}

async fn record_failure(book: &Arc<DealBook>, deal_id: DealId, reason: impl Into<String>) {
    let reason = reason.into();
    if let Err(e) = book.blocking(move |book| book.fail(deal_id, reason)).await {
        error!(deal_id = %deal_id, error = %e, "Cannot record deal failure");
    }
}

async fn record_status(book: &Arc<DealBook>, deal_id: DealId, next: DealStatus) -> SimSpResult<()> {
    book.blocking(move |book| book.transition(deal_id, next)).await?;
    Ok(())
}

/// Consumer side: the single serial ingestion worker
pub struct IngestWorker {
    rx: mpsc::Receiver<DealParams>,
    layout: ArchiveLayout,
    registry: Arc<PieceRegistry>,
    book: Arc<DealBook>,
    fetcher: HttpFetcher,
    shutdown: ShutdownSignal,
}

/// Build the queue and its worker
pub fn ingest_pipeline(
    config: &PipelineConfig,
    layout: ArchiveLayout,
    registry: Arc<PieceRegistry>,
    book: Arc<DealBook>,
    shutdown: ShutdownSignal,
) -> SimSpResult<(IngestQueue, IngestWorker)> {
    if config.queue_capacity == 0 {
        return Err(SimSpError::config("ingest queue capacity must be positive"));
    }
    let fetcher = HttpFetcher::new(config.connect_timeout, config.download_timeout)?;
    let (tx, rx) = mpsc::channel(config.queue_capacity);

    let queue = IngestQueue {
        tx,
        book: book.clone(),
        shutdown: shutdown.clone(),
    };
    let worker = IngestWorker {
        rx,
        layout,
        registry,
        book,
        fetcher,
        shutdown,
    };
    Ok((queue, worker))
}

impl IngestWorker {
    /// Drain the queue until shutdown or until every producer is gone
    pub async fn run(mut self) {
        info!(dir = %self.layout.dir().display(), "Ingestion worker started");
        let mut shutdown = self.shutdown.clone();
        loop {
            let deal = tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                deal = self.rx.recv() => match deal {
                    Some(deal) => deal,
                    None => break,
                },
            };
            // a failed deal is already recorded; keep draining
            let _ = self.handle(deal).await;
        }
        info!("Ingestion worker stopped");
    }

    /// Ingest one deal, recording the outcome in the deal book
    pub async fn handle(&self, deal: DealParams) -> SimSpResult<PieceId> {
        let deal_id = deal.deal_id();
        info!(deal_id = %deal_id, piece_id = %deal.piece_id(), "Working on deal");

        match self.ingest(&deal).await {
            Ok(piece) => {
                info!(deal_id = %deal_id, piece_id = %piece, "Deal completed successfully");
                Ok(piece)
            }
            Err(e) => {
                record_failure(&self.book, deal_id, e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn ingest(&self, deal: &DealParams) -> SimSpResult<PieceId> {
        let deal_id = deal.deal_id();
        let piece = deal.piece_id();

        record_status(&self.book, deal_id, DealStatus::Downloading).await?;
        let params = HttpTransferParams::from_transfer(&deal.transfer)?;
        let temp = self.layout.temp_path(&deal_id);
        let bytes = self.fetcher.fetch_to_file(&params, &temp).await?;

        record_status(&self.book, deal_id, DealStatus::Publishing).await?;
        if let Err(e) = check_archive(temp.clone()).await {
            self.set_aside(&temp, &piece);
            return Err(e);
        }

        let was_registered = self.registry.contains(&piece);
        let published = self.layout.piece_path(&piece);
        if let Err(e) = tokio::fs::rename(&temp, &published).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(SimSpError::storage(&published, e));
        }
        info!(deal_id = %deal_id, piece_id = %piece, bytes, "Published piece");

        let registry = self.registry.clone();
        let path = published.clone();
        let registered = tokio::task::spawn_blocking(move || registry.add_piece(piece, path))
            .await
            .map_err(|e| SimSpError::archive(&published, format!("registration task failed: {e}")))
            .and_then(|result| result);
        if let Err(e) = registered {
            // the registry may still point at this name for an earlier deal
            if !was_registered {
                self.set_aside(&published, &piece);
            }
            return Err(e);
        }

        record_status(&self.book, deal_id, DealStatus::Registered).await?;
        Ok(piece)
    }

    fn set_aside(&self, path: &Path, piece: &PieceId) {
        match self.layout.quarantine(path, piece) {
            Ok(moved) => warn!(piece_id = %piece, path = %moved.display(), "Quarantined unreadable archive"),
            Err(e) => error!(piece_id = %piece, error = %e, "Cannot quarantine archive"),
        }
    }
}

/// Open the downloaded archive once so an unreadable payload never reaches the publish name
async fn check_archive(path: PathBuf) -> SimSpResult<()> {
    let display = path.clone();
    tokio::task::spawn_blocking(move || CarArchive::open_read_only(&path).map(drop))
        .await
        .map_err(|e| SimSpError::archive(&display, format!("archive check failed: {e}")))?
}
