//! Archive directory layout
//!
//! | file                 | meaning                                   |
//! |----------------------|-------------------------------------------|
//! | `{pieceId}.car`      | published piece, registered at startup    |
//! | `{dealId}.car.temp`  | download in progress                      |
//! | `{pieceId}.car.corrupt` | archive that failed to open            |

use sim_sp_core::{DealId, PieceId, SimSpError, SimSpResult};
use std::path::{Path, PathBuf};

const PIECE_SUFFIX: &str = ".car";
const TEMP_SUFFIX: &str = ".car.temp";
const CORRUPT_SUFFIX: &str = ".car.corrupt";

/// Classification of a directory entry by file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// A published archive whose stem parses as a piece id
    Piece(PieceId),
    /// An interrupted download
    Temp,
    /// An archive set aside after failing to open
    Quarantined,
    /// Anything else; left alone
    Other,
}

/// Paths of archives under one directory
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    dir: PathBuf,
}

impl ArchiveLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory (and parents) if missing
    pub fn ensure_dir(&self) -> SimSpResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| SimSpError::storage(&self.dir, e))
    }

    pub fn piece_path(&self, piece: &PieceId) -> PathBuf {
        self.dir.join(format!("{piece}{PIECE_SUFFIX}"))
    }

    pub fn temp_path(&self, deal: &DealId) -> PathBuf {
        self.dir.join(format!("{deal}{TEMP_SUFFIX}"))
    }

    pub fn quarantine_path(&self, piece: &PieceId) -> PathBuf {
        self.dir.join(format!("{piece}{CORRUPT_SUFFIX}"))
    }

    /// Move the unreadable archive at `path` to `{pieceId}.car.corrupt`
    ///
    /// `path` is whatever file failed to open: a published archive under any
    /// spelling of its CID, or a download that never got published.
    pub fn quarantine(&self, path: &Path, piece: &PieceId) -> SimSpResult<PathBuf> {
        let to = self.quarantine_path(piece);
        std::fs::rename(path, &to).map_err(|e| SimSpError::storage(path, e))?;
        Ok(to)
    }

    /// Classify a file name found in the directory
    pub fn classify(name: &str) -> EntryKind {
        if name.ends_with(TEMP_SUFFIX) {
            return EntryKind::Temp;
        }
        if name.ends_with(CORRUPT_SUFFIX) {
            return EntryKind::Quarantined;
        }
        match name.strip_suffix(PIECE_SUFFIX) {
            Some(stem) => stem
                .parse::<PieceId>()
                .map(EntryKind::Piece)
                .unwrap_or(EntryKind::Other),
            None => EntryKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cid::multihash::Multihash;
    use cid::Cid;

    fn piece(seed: u8) -> PieceId {
        let hash = Multihash::<64>::wrap(0x12, &[seed; 32]).unwrap();
        PieceId::new(Cid::new_v1(0x55, hash))
    }

    #[test]
    fn test_paths_use_expected_suffixes() {
        let layout = ArchiveLayout::new("/data/cars");
        let piece = piece(1);
        let deal = DealId::new();

        assert_eq!(
            layout.piece_path(&piece),
            PathBuf::from(format!("/data/cars/{piece}.car"))
        );
        assert_eq!(
            layout.temp_path(&deal),
            PathBuf::from(format!("/data/cars/{deal}.car.temp"))
        );
        assert_eq!(
            layout.quarantine_path(&piece),
            PathBuf::from(format!("/data/cars/{piece}.car.corrupt"))
        );
    }

    #[test]
    fn test_classify() {
        let piece = piece(2);
        assert_eq!(
            ArchiveLayout::classify(&format!("{piece}.car")),
            EntryKind::Piece(piece)
        );
        assert_eq!(
            ArchiveLayout::classify(&format!("{}.car.temp", DealId::new())),
            EntryKind::Temp
        );
        assert_eq!(
            ArchiveLayout::classify(&format!("{piece}.car.corrupt")),
            EntryKind::Quarantined
        );
        assert_eq!(ArchiveLayout::classify("notes.txt"), EntryKind::Other);
        assert_eq!(ArchiveLayout::classify("not-a-cid.car"), EntryKind::Other);
        assert_eq!(ArchiveLayout::classify(".car"), EntryKind::Other);
    }

    #[test]
    fn test_quarantine_renames_published_file() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArchiveLayout::new(dir.path().join("nested"));
        layout.ensure_dir().unwrap();
        let piece = piece(3);
        std::fs::write(layout.piece_path(&piece), b"junk").unwrap();

        let moved = layout.quarantine(&layout.piece_path(&piece), &piece).unwrap();
        assert_eq!(moved, layout.quarantine_path(&piece));
        assert!(!layout.piece_path(&piece).exists());
        assert!(moved.exists());
    }

    #[test]
    fn test_quarantine_moves_the_given_file() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArchiveLayout::new(dir.path());
        let piece = piece(4);
        let temp = layout.temp_path(&DealId::new());
        std::fs::write(layout.piece_path(&piece), b"published").unwrap();
        std::fs::write(&temp, b"junk").unwrap();

        let moved = layout.quarantine(&temp, &piece).unwrap();
        assert!(!temp.exists());
        assert_eq!(std::fs::read(moved).unwrap(), b"junk");
        assert_eq!(std::fs::read(layout.piece_path(&piece)).unwrap(), b"published");
    }
}
