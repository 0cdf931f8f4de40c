//! # sim-sp deals
//!
//! Everything between an accepted proposal and a registered piece.
//!
//! - [`types`]: storage-market wire messages and the persisted [`DealRecord`]
//! - [`status`]: the ingestion state machine
//! - [`book`]: [`DealBook`], in-memory records with durable JSON side records
//! - [`fetch`]: [`HttpFetcher`], bounded-time downloads to a local file
//! - [`pipeline`]: [`IngestQueue`] producers and the serial [`IngestWorker`]

#![forbid(unsafe_code)]

pub mod book;
pub mod fetch;
pub mod pipeline;
pub mod status;
pub mod types;

pub use book::{DealBook, INTERRUPTED_BY_RESTART};
pub use fetch::HttpFetcher;
pub use pipeline::{
    ingest_pipeline, IngestQueue, IngestWorker, PipelineConfig, SubmitOutcome,
    DEFAULT_QUEUE_CAPACITY,
};
pub use status::DealStatus;
pub use types::{
    ClientDealProposal, DealParams, DealProposal, DealRecord, DealState, HttpTransferParams,
    Signature, Transfer, HTTP_TRANSFER,
};
