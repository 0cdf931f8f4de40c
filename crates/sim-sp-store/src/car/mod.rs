//! CAR (content-addressed archive) files
//!
//! Version 1 layout: `varint(header_len) ‖ DAG-CBOR {roots, version: 1}`
//! followed by sections `varint(len) ‖ CID ‖ block bytes`.
//!
//! Version 2 wraps a version 1 payload: an 11-byte pragma (`{version: 2}`),
//! a 40-byte fixed header (characteristics, data offset, data size, index
//! offset; integers little-endian) and the payload at the data offset.

mod reader;
mod writer;

pub use reader::CarArchive;
pub use writer::CarWriter;

use cid::Cid;
use serde::{Deserialize, Serialize};

/// Length of the CARv2 fixed header that follows the pragma
pub(crate) const V2_HEADER_LEN: usize = 40;

/// Upper bound on a CAR header; anything larger is treated as corrupt
pub(crate) const MAX_HEADER_LEN: u64 = 1024 * 1024;

/// Decoded CAR header. The v2 pragma carries only `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CarHeader {
    #[serde(default)]
    pub roots: Vec<Cid>,
    pub version: u64,
}
