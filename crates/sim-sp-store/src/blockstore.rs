//! Block store abstraction
//!
//! Read operations are required; mutation and enumeration default to an
//! unsupported-operation error so read-only stores only implement what they
//! can answer.

use cid::Cid;
use sim_sp_core::{SimSpError, SimSpResult};
use std::sync::Arc;

use crate::block::Block;

/// Block lookup by CID
///
/// `get` and `get_size` report a miss as [`SimSpError::NotFound`]; any other
/// error means the store itself failed.
pub trait Blockstore: Send + Sync {
    /// Whether the store holds `cid`
    fn has(&self, cid: &Cid) -> SimSpResult<bool>;

    /// Fetch the block named by `cid`
    fn get(&self, cid: &Cid) -> SimSpResult<Block>;

    /// Size in bytes of the block named by `cid`
    fn get_size(&self, cid: &Cid) -> SimSpResult<usize>;

    fn put(&self, _block: Block) -> SimSpResult<()> {
        Err(SimSpError::unsupported("put"))
    }

    fn put_many(&self, _blocks: Vec<Block>) -> SimSpResult<()> {
        Err(SimSpError::unsupported("put_many"))
    }

    fn delete_block(&self, _cid: &Cid) -> SimSpResult<()> {
        Err(SimSpError::unsupported("delete_block"))
    }

    /// Every CID held by the store
    fn all_keys(&self) -> SimSpResult<Vec<Cid>> {
        Err(SimSpError::unsupported("all_keys"))
    }
}

/// Opaque shared reference to an opened archive
pub type ArchiveHandle = Arc<dyn Blockstore>;
