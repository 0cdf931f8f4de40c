//! # sim-sp retrieval
//!
//! Read-only consumers of the piece registry and block overlay:
//!
//! - [`http`]: axum server for whole pieces (byte ranges, conditional GET),
//!   single blocks and deal records
//! - [`block_exchange`]: want-list responder over framed streams

#![forbid(unsafe_code)]

pub mod block_exchange;
pub mod http;

pub use block_exchange::{
    BlockEntry, BlockExchangeResponder, ExchangeResponse, Presence, WantEntry, WantList,
    WantType, MAX_WANT_ENTRIES,
};
pub use http::{router, RetrievalServer, RetrievalState};
