//! Ingestion pipeline against a local HTTP source

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use sim_sp_core::{Cid, DealId, PieceId, ShutdownController};
use sim_sp_deals::{
    ingest_pipeline, ClientDealProposal, DealBook, DealParams, DealProposal, DealState,
    DealStatus, IngestQueue, IngestWorker, PipelineConfig, Signature, SubmitOutcome, Transfer,
};
use sim_sp_store::{
    raw_block, scan_archive_dir, ArchiveLayout, Block, BlockOverlay, Blockstore, CarWriter,
    CorruptArchivePolicy, PieceRegistry,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    layout: ArchiveLayout,
    registry: Arc<PieceRegistry>,
    book: Arc<DealBook>,
    queue: IngestQueue,
    worker: Option<IngestWorker>,
    shutdown: ShutdownController,
}

impl Harness {
    fn new(config: PipelineConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArchiveLayout::new(dir.path());
        let registry = Arc::new(PieceRegistry::new(Arc::new(BlockOverlay::new())));
        let book = Arc::new(DealBook::open(dir.path()).unwrap());
        let shutdown = ShutdownController::new();
        let (queue, worker) = ingest_pipeline(
            &config,
            layout.clone(),
            registry.clone(),
            book.clone(),
            shutdown.signal(),
        )
        .unwrap();
        Self {
            _dir: dir,
            layout,
            registry,
            book,
            queue,
            worker: Some(worker),
            shutdown,
        }
    }

    fn start(&mut self) {
        if let Some(worker) = self.worker.take() {
            tokio::spawn(worker.run());
        }
    }

    async fn wait_terminal(&self, deal_id: DealId) -> DealStatus {
        for _ in 0..500 {
            if let Some(record) = self.book.get(&deal_id) {
                if record.status.is_terminal() {
                    return record.status;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("deal {deal_id} did not finish");
    }
}

fn car_bytes(payloads: &[&str]) -> (Vec<u8>, Vec<Block>) {
    let blocks: Vec<Block> = payloads
        .iter()
        .map(|p| raw_block(p.as_bytes().to_vec()).unwrap())
        .collect();
    let mut out = Vec::new();
    let mut writer = CarWriter::new(&mut out, &[*blocks[0].cid()]).unwrap();
    for block in &blocks {
        writer.write_block(block).unwrap();
    }
    writer.finish().unwrap();
    (out, blocks)
}

fn piece_for(blocks: &[Block]) -> PieceId {
    PieceId::new(*blocks[0].cid())
}

fn deal(piece: PieceId, transfer: Transfer) -> DealParams {
    DealParams {
        deal_uuid: DealId::new(),
        is_offline: false,
        client_deal_proposal: ClientDealProposal {
            proposal: DealProposal {
                piece_cid: piece,
                piece_size: 1024,
                verified_deal: false,
                client: "f01234".to_string(),
                provider: "f02815405".to_string(),
                label: String::new(),
                start_epoch: 10,
                end_epoch: 20,
                storage_price_per_epoch: "0".to_string(),
                provider_collateral: "0".to_string(),
                client_collateral: "0".to_string(),
            },
            client_signature: Signature::default(),
        },
        transfer,
    }
}

fn http_deal(piece: PieceId, url: String) -> DealParams {
    deal(piece, Transfer::http(url, HashMap::new(), 0).unwrap())
}

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deal_is_downloaded_published_and_registered() {
    let (car, blocks) = car_bytes(&["root", "leaf-1", "leaf-2"]);
    let piece = piece_for(&blocks);
    let body = car.clone();
    let addr = serve(Router::new().route(
        "/piece.car",
        get(move |headers: HeaderMap| {
            let body = body.clone();
            async move {
                if headers.get("authorization").map(|v| v.as_bytes()) != Some(b"Bearer secret".as_slice()) {
                    return StatusCode::UNAUTHORIZED.into_response();
                }
                body.into_response()
            }
        }),
    ))
    .await;

    let mut harness = Harness::new(PipelineConfig::default());
    harness.start();

    let mut headers = HashMap::new();
    headers.insert("Authorization".to_string(), "Bearer secret".to_string());
    let transfer = Transfer::http(format!("http://{addr}/piece.car"), headers, car.len() as u64).unwrap();
    let deal = deal(piece, transfer);
    let deal_id = deal.deal_id();

    assert_eq!(harness.queue.submit(deal).await, SubmitOutcome::Queued);
    assert_eq!(harness.wait_terminal(deal_id).await, DealStatus::Registered);

    let path = harness.registry.lookup(&piece).unwrap();
    assert_eq!(path, harness.layout.piece_path(&piece));
    assert_eq!(std::fs::read(&path).unwrap(), car);
    assert!(!harness.layout.temp_path(&deal_id).exists());
    for block in &blocks {
        assert_eq!(harness.registry.overlay().get(block.cid()).unwrap(), *block);
    }

    let record = harness.book.get(&deal_id).unwrap();
    assert_eq!(record.state, DealState::ACTIVE);
    assert!(record.failure.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_non_http_transfer_is_never_queued() {
    let (_, blocks) = car_bytes(&["unused"]);
    let piece = piece_for(&blocks);
    let mut harness = Harness::new(PipelineConfig::default());
    harness.start();

    let transfer = Transfer {
        transfer_type: "libp2p".to_string(),
        client_id: String::new(),
        params: Vec::new(),
        size: 0,
    };
    let deal = deal(piece, transfer);
    let deal_id = deal.deal_id();

    let outcome = harness.queue.submit(deal).await;
    assert!(matches!(outcome, SubmitOutcome::Unsupported(reason) if reason.contains("libp2p")));
    let record = harness.book.get(&deal_id).unwrap();
    assert_eq!(record.status, DealStatus::Failed);
    assert_eq!(record.state, DealState::INACTIVE);
    assert!(harness.registry.is_empty());
    assert!(!harness.layout.piece_path(&piece).exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_non_200_source_fails_the_deal() {
    let (_, blocks) = car_bytes(&["missing"]);
    let piece = piece_for(&blocks);
    let addr = serve(Router::new().route("/gone", get(|| async { StatusCode::NOT_FOUND }))).await;

    let mut harness = Harness::new(PipelineConfig::default());
    harness.start();
    let deal = http_deal(piece, format!("http://{addr}/gone"));
    let deal_id = deal.deal_id();

    harness.queue.submit(deal).await;
    assert_eq!(harness.wait_terminal(deal_id).await, DealStatus::Failed);
    let failure = harness.book.get(&deal_id).unwrap().failure.unwrap();
    assert!(failure.contains("404"), "{failure}");
    assert!(!harness.layout.piece_path(&piece).exists());
    assert!(!harness.layout.temp_path(&deal_id).exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_mid_transfer_failure_leaves_no_piece_file() {
    let (car, blocks) = car_bytes(&["interrupted"]);
    let piece = piece_for(&blocks);
    let head = Bytes::from(car[..car.len() / 2].to_vec());
    let addr = serve(Router::new().route(
        "/broken",
        get(move || {
            let head = head.clone();
            async move {
                let chunks = stream::iter(vec![
                    Ok(head),
                    Err(std::io::Error::new(std::io::ErrorKind::Other, "source died")),
                ]);
                Body::from_stream(chunks)
            }
        }),
    ))
    .await;

    let mut harness = Harness::new(PipelineConfig::default());
    harness.start();
    let deal = http_deal(piece, format!("http://{addr}/broken"));
    let deal_id = deal.deal_id();

    harness.queue.submit(deal).await;
    assert_eq!(harness.wait_terminal(deal_id).await, DealStatus::Failed);
    assert!(!harness.layout.piece_path(&piece).exists());
    assert!(!harness.layout.temp_path(&deal_id).exists());
    assert!(harness.registry.lookup(&piece).unwrap_err().is_not_found());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stalled_source_times_out_and_worker_moves_on() {
    let (car, blocks) = car_bytes(&["after the stall"]);
    let good_piece = piece_for(&blocks);
    let (_, stalled_blocks) = car_bytes(&["stalled"]);
    let stalled_piece = piece_for(&stalled_blocks);

    let addr = serve(
        Router::new()
            .route(
                "/stall",
                get(|| async {
                    let chunks = stream::once(async {
                        Ok::<_, std::io::Error>(Bytes::from_static(b"partial"))
                    })
                    .chain(stream::pending());
                    Body::from_stream(chunks)
                }),
            )
            .route("/good", get(move || async move { car.clone() })),
    )
    .await;

    let config = PipelineConfig {
        download_timeout: Duration::from_millis(500),
        ..PipelineConfig::default()
    };
    let mut harness = Harness::new(config);
    harness.start();

    let stalled = http_deal(stalled_piece, format!("http://{addr}/stall"));
    let stalled_id = stalled.deal_id();
    let good = http_deal(good_piece, format!("http://{addr}/good"));
    let good_id = good.deal_id();

    harness.queue.submit(stalled).await;
    harness.queue.submit(good).await;

    assert_eq!(harness.wait_terminal(stalled_id).await, DealStatus::Failed);
    let failure = harness.book.get(&stalled_id).unwrap().failure.unwrap();
    assert!(failure.contains("timed out"), "{failure}");
    assert!(!harness.layout.temp_path(&stalled_id).exists());

    assert_eq!(harness.wait_terminal(good_id).await, DealStatus::Registered);
    assert!(harness.registry.contains(&good_piece));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_corrupt_payload_is_quarantined() {
    let (_, blocks) = car_bytes(&["claimed"]);
    let piece = piece_for(&blocks);
    let addr = serve(Router::new().route("/junk", get(|| async { "definitely not a car file" }))).await;

    let mut harness = Harness::new(PipelineConfig::default());
    harness.start();
    let deal = http_deal(piece, format!("http://{addr}/junk"));
    let deal_id = deal.deal_id();

    harness.queue.submit(deal).await;
    assert_eq!(harness.wait_terminal(deal_id).await, DealStatus::Failed);
    assert!(!harness.layout.piece_path(&piece).exists());
    assert!(harness.layout.quarantine_path(&piece).exists());
    assert!(!harness.registry.contains(&piece));

    // a restart does not pick the quarantined file back up
    let fresh = PieceRegistry::new(Arc::new(BlockOverlay::new()));
    let report = scan_archive_dir(&harness.layout, &fresh, CorruptArchivePolicy::Fail).unwrap();
    assert!(report.registered.is_empty());
    assert!(fresh.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_corrupt_download_for_registered_piece_keeps_existing_archive() {
    let (car, blocks) = car_bytes(&["kept root", "kept leaf"]);
    let piece = piece_for(&blocks);
    let addr = serve(
        Router::new()
            .route("/good", get(move || async move { car.clone() }))
            .route("/junk", get(|| async { "not a car" })),
    )
    .await;

    let mut harness = Harness::new(PipelineConfig::default());
    harness.start();

    let first = http_deal(piece, format!("http://{addr}/good"));
    let first_id = first.deal_id();
    harness.queue.submit(first).await;
    assert_eq!(harness.wait_terminal(first_id).await, DealStatus::Registered);
    let published = harness.layout.piece_path(&piece);
    let original = std::fs::read(&published).unwrap();

    let second = http_deal(piece, format!("http://{addr}/junk"));
    let second_id = second.deal_id();
    harness.queue.submit(second).await;
    assert_eq!(harness.wait_terminal(second_id).await, DealStatus::Failed);

    assert_eq!(std::fs::read(&published).unwrap(), original);
    assert_eq!(harness.registry.lookup(&piece).unwrap(), published);
    assert_eq!(
        std::fs::read(harness.layout.quarantine_path(&piece)).unwrap(),
        b"not a car"
    );
    assert!(!harness.layout.temp_path(&second_id).exists());
    assert_eq!(harness.book.get(&first_id).unwrap().status, DealStatus::Registered);

    let fresh = PieceRegistry::new(Arc::new(BlockOverlay::new()));
    let report = scan_archive_dir(&harness.layout, &fresh, CorruptArchivePolicy::Fail).unwrap();
    assert_eq!(report.registered, vec![piece]);
    assert_eq!(fresh.overlay().get(blocks[1].cid()).unwrap(), blocks[1]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_valid_download_of_a_piece_is_registered() {
    let (car, blocks) = car_bytes(&["twice"]);
    let piece = piece_for(&blocks);
    let body = car.clone();
    let addr = serve(Router::new().route("/piece.car", get(move || async move { body.clone() }))).await;

    let mut harness = Harness::new(PipelineConfig::default());
    harness.start();
    for _ in 0..2 {
        let deal = http_deal(piece, format!("http://{addr}/piece.car"));
        let deal_id = deal.deal_id();
        harness.queue.submit(deal).await;
        assert_eq!(harness.wait_terminal(deal_id).await, DealStatus::Registered);
    }
    assert_eq!(harness.registry.len(), 1);
    assert_eq!(std::fs::read(harness.layout.piece_path(&piece)).unwrap(), car);
    assert!(!harness.layout.quarantine_path(&piece).exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unrecordable_proposal_is_rejected() {
    let (_, blocks) = car_bytes(&["nowhere to write"]);
    let piece = piece_for(&blocks);
    let dir = tempfile::tempdir().unwrap();
    let book = Arc::new(DealBook::open(dir.path().join("deals")).unwrap());
    let shutdown = ShutdownController::new();
    let (queue, _worker) = ingest_pipeline(
        &PipelineConfig::default(),
        ArchiveLayout::new(dir.path()),
        Arc::new(PieceRegistry::new(Arc::new(BlockOverlay::new()))),
        book.clone(),
        shutdown.signal(),
    )
    .unwrap();
    std::fs::remove_dir_all(dir.path().join("deals")).unwrap();

    let deal = http_deal(piece, "http://127.0.0.1:9/a".to_string());
    let deal_id = deal.deal_id();
    assert!(matches!(queue.submit(deal).await, SubmitOutcome::Rejected(_)));
    assert!(book.get(&deal_id).is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_submit_after_shutdown_is_abandoned() {
    let (_, blocks) = car_bytes(&["late"]);
    let piece = piece_for(&blocks);
    let harness = Harness::new(PipelineConfig::default());
    harness.shutdown.trigger();

    let deal = http_deal(piece, "http://127.0.0.1:9/never".to_string());
    let deal_id = deal.deal_id();
    assert_eq!(harness.queue.submit(deal).await, SubmitOutcome::Abandoned);
    assert_eq!(harness.book.get(&deal_id).unwrap().status, DealStatus::Failed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_blocked_submit_is_released_by_shutdown() {
    let (_, blocks) = car_bytes(&["queued"]);
    let piece = piece_for(&blocks);
    let config = PipelineConfig {
        queue_capacity: 1,
        ..PipelineConfig::default()
    };
    // worker never started, so the queue stays full
    let harness = Harness::new(config);

    let first = http_deal(piece, "http://127.0.0.1:9/a".to_string());
    assert_eq!(harness.queue.submit(first).await, SubmitOutcome::Queued);

    let queue = harness.queue.clone();
    let second = http_deal(piece, "http://127.0.0.1:9/b".to_string());
    let pending = tokio::spawn(async move { queue.submit(second).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!pending.is_finished());
    harness.shutdown.trigger();

    let outcome = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome, SubmitOutcome::Abandoned);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_duplicate_deal_id_is_refused() {
    let (_, blocks) = car_bytes(&["dup"]);
    let piece = piece_for(&blocks);
    let harness = Harness::new(PipelineConfig::default());

    let deal = http_deal(piece, "http://127.0.0.1:9/a".to_string());
    assert_eq!(harness.queue.submit(deal.clone()).await, SubmitOutcome::Queued);
    assert_eq!(harness.queue.submit(deal).await, SubmitOutcome::Duplicate);
}

#[test]
fn test_proposal_survives_cbor() {
    let (_, blocks) = car_bytes(&["wire"]);
    let deal = http_deal(piece_for(&blocks), "http://example.com/x".to_string());
    let bytes = serde_ipld_dagcbor::to_vec(&deal).unwrap();
    let back: DealParams = serde_ipld_dagcbor::from_slice(&bytes).unwrap();
    assert_eq!(back, deal);
    let cid: Cid = *back.piece_id().cid();
    assert_eq!(cid, *blocks[0].cid());
}
