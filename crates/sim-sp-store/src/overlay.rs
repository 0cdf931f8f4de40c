//! Block overlay index
//!
//! Merges block lookups across every archive added so far. Membership only
//! grows; lookups scan archives in insertion order and the first archive
//! holding a CID answers. The overlay is read-only: every mutation is
//! rejected with [`SimSpError::Unsupported`].

use cid::Cid;
use parking_lot::RwLock;
use sim_sp_core::{SimSpError, SimSpResult};

use crate::block::Block;
use crate::blockstore::{ArchiveHandle, Blockstore};

/// Append-only, first-match-wins union of archives
#[derive(Default)]
pub struct BlockOverlay {
    archives: RwLock<Vec<ArchiveHandle>>,
}

impl std::fmt::Debug for BlockOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockOverlay")
            .field("archives", &self.archive_count())
            .finish()
    }
}

impl BlockOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an archive; it is consulted after every earlier one
    pub fn add_archive(&self, archive: ArchiveHandle) {
        self.archives.write().push(archive);
    }

    /// Current number of archives
    pub fn archive_count(&self) -> usize {
        self.archives.read().len()
    }
}

impl Blockstore for BlockOverlay {
    fn has(&self, cid: &Cid) -> SimSpResult<bool> {
        let archives = self.archives.read();
        for archive in archives.iter() {
            if archive.has(cid)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn get(&self, cid: &Cid) -> SimSpResult<Block> {
        let archives = self.archives.read();
        for archive in archives.iter() {
            match archive.get(cid) {
                Ok(block) => return Ok(block),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(SimSpError::not_found(format!("block {cid}")))
    }

    /// A size of zero counts as absent and the scan continues, so an empty
    /// block is reported as not found.
    fn get_size(&self, cid: &Cid) -> SimSpResult<usize> {
        let archives = self.archives.read();
        for archive in archives.iter() {
            match archive.get_size(cid) {
                Ok(0) => continue,
                Ok(size) => return Ok(size),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(SimSpError::not_found(format!("block {cid}")))
    }

    fn put(&self, _block: Block) -> SimSpResult<()> {
        Err(SimSpError::unsupported("put on read-only overlay"))
    }

    fn put_many(&self, _blocks: Vec<Block>) -> SimSpResult<()> {
        Err(SimSpError::unsupported("put_many on read-only overlay"))
    }

    fn delete_block(&self, _cid: &Cid) -> SimSpResult<()> {
        Err(SimSpError::unsupported("delete_block on read-only overlay"))
    }

    fn all_keys(&self) -> SimSpResult<Vec<Cid>> {
        Err(SimSpError::unsupported("all_keys on read-only overlay"))
    }
}
