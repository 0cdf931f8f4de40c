//! # sim-sp core
//!
//! Foundation types shared by every crate of the simulated storage provider:
//!
//! - **Identifiers**: [`PieceId`] (the CID naming a piece archive) and [`DealId`]
//! - **Errors**: the [`SimSpError`] taxonomy used across the node
//! - **Codec**: DAG-CBOR encoding and length-delimited stream framing
//! - **Shutdown**: a process-wide, cloneable shutdown signal
//!
//! This crate holds no state and performs no I/O beyond the stream helpers
//! handed to it by callers.

#![forbid(unsafe_code)]

pub mod codec;
pub mod error;
pub mod ids;
pub mod shutdown;

pub use cid::Cid;
pub use error::{SimSpError, SimSpResult};
pub use ids::{DealId, PieceId};
pub use shutdown::{ShutdownController, ShutdownSignal};
