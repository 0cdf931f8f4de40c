//! Piece registry
//!
//! Maps piece identifiers to the archive files that hold them. Adding a piece
//! opens its archive, appends it to the [`BlockOverlay`] and records the path
//! under one exclusive lock, so a reader sees both registrations or neither.

use parking_lot::RwLock;
use sim_sp_core::{PieceId, SimSpError, SimSpResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::car::CarArchive;
use crate::overlay::BlockOverlay;

/// Concurrent piece id → archive path map
#[derive(Debug)]
pub struct PieceRegistry {
    overlay: Arc<BlockOverlay>,
    pieces: RwLock<HashMap<PieceId, PathBuf>>,
}

impl PieceRegistry {
    pub fn new(overlay: Arc<BlockOverlay>) -> Self {
        Self {
            overlay,
            pieces: RwLock::new(HashMap::new()),
        }
    }

    /// Open the archive at `path` and register it as `piece`
    ///
    /// A later add for the same piece replaces the path; the earlier archive
    /// stays in the overlay and keeps precedence for shared blocks. Opening
    /// reads the file, so async callers run this on a blocking thread.
    pub fn add_piece(&self, piece: PieceId, path: impl AsRef<Path>) -> SimSpResult<()> {
        let path = path.as_ref();
        let archive = CarArchive::open_read_only(path)?;
        let blocks = archive.block_count();

        let mut pieces = self.pieces.write();
        self.overlay.add_archive(Arc::new(archive));
        pieces.insert(piece, path.to_path_buf());
        drop(pieces);

        info!(piece_id = %piece, path = %path.display(), blocks, "Registered piece");
        Ok(())
    }

    /// Archive path for `piece`
    pub fn lookup(&self, piece: &PieceId) -> SimSpResult<PathBuf> {
        self.pieces
            .read()
            .get(piece)
            .cloned()
            .ok_or_else(|| SimSpError::not_found(format!("piece {piece}")))
    }

    pub fn contains(&self, piece: &PieceId) -> bool {
        self.pieces.read().contains_key(piece)
    }

    pub fn len(&self) -> usize {
        self.pieces.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.read().is_empty()
    }

    /// Snapshot of every registered piece, sorted by id
    pub fn pieces(&self) -> Vec<(PieceId, PathBuf)> {
        let mut pieces: Vec<_> = self
            .pieces
            .read()
            .iter()
            .map(|(id, path)| (*id, path.clone()))
            .collect();
        pieces.sort_by(|a, b| a.0.cmp(&b.0));
        pieces
    }

    /// The overlay every registered archive joins
    pub fn overlay(&self) -> &Arc<BlockOverlay> {
        &self.overlay
    }
}
