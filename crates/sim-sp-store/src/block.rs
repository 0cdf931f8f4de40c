//! Content-addressed blocks

use bytes::Bytes;
use cid::multihash::Multihash;
use cid::Cid;
use sha2::{Digest, Sha256};
use sim_sp_core::{SimSpError, SimSpResult};

/// Multicodec code for raw binary blocks
pub const RAW_CODEC: u64 = 0x55;

/// Multihash code for SHA2-256
pub const SHA2_256: u64 = 0x12;

/// A block: its CID and its bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    cid: Cid,
    data: Bytes,
}

impl Block {
    pub fn new(cid: Cid, data: impl Into<Bytes>) -> Self {
        Self {
            cid,
            data: data.into(),
        }
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }
}

/// Build a raw block addressed by the SHA2-256 of `data`
pub fn raw_block(data: impl Into<Bytes>) -> SimSpResult<Block> {
    let data = data.into();
    let digest = Sha256::digest(&data);
    let hash = Multihash::<64>::wrap(SHA2_256, &digest)
        .map_err(|e| SimSpError::decode(format!("cannot wrap digest: {e}")))?;
    Ok(Block::new(Cid::new_v1(RAW_CODEC, hash), data))
}
