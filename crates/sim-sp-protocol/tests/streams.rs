//! Handlers reached over the TCP stream transport

use multiaddr::Multiaddr;
use sim_sp_core::codec;
use sim_sp_core::{DealId, PieceId, ShutdownController};
use sim_sp_deals::{
    ingest_pipeline, ClientDealProposal, DealBook, DealParams, DealProposal, DealStatus,
    IngestWorker, PipelineConfig, Signature, Transfer,
};
use sim_sp_protocol::{
    dial, http_multiaddr, DealProposalHandler, DealResponse, QueryResponse, StreamRouter,
    TcpStreamTransport, TransportQueryHandler, BLOCK_EXCHANGE_PROTOCOL,
    RETRIEVAL_TRANSPORTS_PROTOCOL, STORAGE_DEAL_PROTOCOL,
};
use sim_sp_retrieval::{BlockExchangeResponder, ExchangeResponse, WantEntry, WantList, WantType};
use sim_sp_store::{raw_block, ArchiveLayout, Block, BlockOverlay, CarWriter, PieceRegistry};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tempfile::TempDir;

struct Node {
    dir: TempDir,
    addr: Multiaddr,
    book: Arc<DealBook>,
    block: Block,
    // held so the queue stays open; never run
    _worker: IngestWorker,
    shutdown: ShutdownController,
}

async fn start() -> Node {
    let dir = tempfile::tempdir().unwrap();
    let layout = ArchiveLayout::new(dir.path());
    let registry = Arc::new(PieceRegistry::new(Arc::new(BlockOverlay::new())));
    let book = Arc::new(DealBook::open(dir.path()).unwrap());
    let shutdown = ShutdownController::new();

    let block = raw_block(b"exchanged block".to_vec()).unwrap();
    let piece = PieceId::new(*block.cid());
    let path = layout.piece_path(&piece);
    CarWriter::write_file(&path, &[*block.cid()], &[block.clone()]).unwrap();
    registry.add_piece(piece, &path).unwrap();

    let (queue, worker) = ingest_pipeline(
        &PipelineConfig::default(),
        layout,
        registry.clone(),
        book.clone(),
        shutdown.signal(),
    )
    .unwrap();

    let transport = TcpStreamTransport::bind(&["/ip4/127.0.0.1/tcp/0".parse().unwrap()])
        .await
        .unwrap();
    let addr = transport.listen_addrs()[0].clone();
    let router = StreamRouter::new()
        .with(
            RETRIEVAL_TRANSPORTS_PROTOCOL,
            Arc::new(TransportQueryHandler::new(
                http_multiaddr(IpAddr::V4(Ipv4Addr::LOCALHOST), 7778),
                transport.listen_addrs(),
            )),
        )
        .with(STORAGE_DEAL_PROTOCOL, Arc::new(DealProposalHandler::new(queue)))
        .with(
            BLOCK_EXCHANGE_PROTOCOL,
            Arc::new(BlockExchangeResponder::new(registry.overlay().clone())),
        );
    tokio::spawn(transport.run(Arc::new(router), shutdown.signal()));

    Node {
        dir,
        addr,
        book,
        block,
        _worker: worker,
        shutdown,
    }
}

fn proposal_message(transfer: Transfer) -> DealParams {
    let piece = PieceId::new(*raw_block(b"proposed piece".to_vec()).unwrap().cid());
    DealParams {
        deal_uuid: DealId::new(),
        is_offline: false,
        client_deal_proposal: ClientDealProposal {
            proposal: DealProposal {
                piece_cid: piece,
                piece_size: 4096,
                verified_deal: false,
                client: "f01000".to_string(),
                provider: "f02815405".to_string(),
                label: "sim".to_string(),
                start_epoch: 5,
                end_epoch: 50,
                storage_price_per_epoch: "0".to_string(),
                provider_collateral: "0".to_string(),
                client_collateral: "0".to_string(),
            },
            client_signature: Signature::default(),
        },
        transfer,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_transport_query_lists_http_and_bitswap() {
    let node = start().await;
    let mut stream = dial(&node.addr, RETRIEVAL_TRANSPORTS_PROTOCOL).await.unwrap();

    let response: QueryResponse = codec::read_message(&mut stream).await.unwrap().unwrap();
    let names: Vec<&str> = response.protocols.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["http", "bitswap"]);
    assert_eq!(
        response.protocols[0].multiaddrs()[0].to_string(),
        "/ip4/127.0.0.1/tcp/7778/http"
    );
    assert_eq!(response.protocols[1].multiaddrs(), vec![node.addr.clone()]);

    // the handler closes the stream after answering
    assert!(codec::read_message::<QueryResponse, _>(&mut stream)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_proposal_is_accepted_and_recorded() {
    let node = start().await;
    let deal = proposal_message(Transfer::http("http://127.0.0.1:9/x.car", HashMap::new(), 0).unwrap());
    let deal_id = deal.deal_id();

    let mut stream = dial(&node.addr, STORAGE_DEAL_PROTOCOL).await.unwrap();
    codec::write_message(&mut stream, &deal).await.unwrap();
    let response: DealResponse = codec::read_message(&mut stream).await.unwrap().unwrap();

    assert_eq!(response, DealResponse::accepted());
    assert_eq!(node.book.get(&deal_id).unwrap().status, DealStatus::Accepted);

    // the same deal id again is refused
    let mut stream = dial(&node.addr, STORAGE_DEAL_PROTOCOL).await.unwrap();
    codec::write_message(&mut stream, &deal).await.unwrap();
    let response: DealResponse = codec::read_message(&mut stream).await.unwrap().unwrap();
    assert!(!response.accepted);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_non_http_proposal_is_accepted_but_failed() {
    let node = start().await;
    let deal = proposal_message(Transfer {
        transfer_type: "graphsync".to_string(),
        client_id: String::new(),
        params: Vec::new(),
        size: 0,
    });
    let deal_id = deal.deal_id();

    let mut stream = dial(&node.addr, STORAGE_DEAL_PROTOCOL).await.unwrap();
    codec::write_message(&mut stream, &deal).await.unwrap();
    let response: DealResponse = codec::read_message(&mut stream).await.unwrap().unwrap();

    assert!(response.accepted);
    assert_eq!(node.book.get(&deal_id).unwrap().status, DealStatus::Failed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_proposal_that_cannot_be_recorded_is_rejected() {
    let node = start().await;
    std::fs::remove_dir_all(node.dir.path()).unwrap();
    let deal = proposal_message(Transfer::http("http://127.0.0.1:9/x.car", HashMap::new(), 0).unwrap());
    let deal_id = deal.deal_id();

    let mut stream = dial(&node.addr, STORAGE_DEAL_PROTOCOL).await.unwrap();
    codec::write_message(&mut stream, &deal).await.unwrap();
    let response: DealResponse = codec::read_message(&mut stream).await.unwrap().unwrap();

    assert!(!response.accepted);
    assert!(response.message.starts_with("cannot record deal"), "{}", response.message);
    assert!(node.book.get(&deal_id).is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_garbage_frame_aborts_only_its_stream() {
    let node = start().await;

    let mut bad = dial(&node.addr, STORAGE_DEAL_PROTOCOL).await.unwrap();
    codec::write_message(&mut bad, &"not a proposal").await.unwrap();
    let reply = codec::read_message::<DealResponse, _>(&mut bad).await;
    assert!(!matches!(reply, Ok(Some(_))));
    assert!(node.book.is_empty());

    let mut good = dial(&node.addr, RETRIEVAL_TRANSPORTS_PROTOCOL).await.unwrap();
    let response: QueryResponse = codec::read_message(&mut good).await.unwrap().unwrap();
    assert_eq!(response.protocols.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_block_exchange_over_tcp() {
    let node = start().await;
    let missing = *raw_block(b"not here".to_vec()).unwrap().cid();

    let mut stream = dial(&node.addr, BLOCK_EXCHANGE_PROTOCOL).await.unwrap();
    let wants = WantList {
        entries: vec![
            WantEntry {
                cid: *node.block.cid(),
                want: WantType::Block,
            },
            WantEntry {
                cid: missing,
                want: WantType::Have,
            },
        ],
    };
    codec::write_message(&mut stream, &wants).await.unwrap();
    let response: ExchangeResponse = codec::read_message(&mut stream).await.unwrap().unwrap();

    assert_eq!(response.blocks.len(), 1);
    assert_eq!(response.blocks[0].data, node.block.data().to_vec());
    assert_eq!(response.presences.len(), 1);
    assert!(!response.presences[0].have);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_protocol_is_dropped() {
    let node = start().await;
    let mut stream = dial(&node.addr, "/unknown/1.0.0").await.unwrap();
    let reply = codec::read_message::<QueryResponse, _>(&mut stream).await;
    assert!(!matches!(reply, Ok(Some(_))));
    node.shutdown.trigger();
}
