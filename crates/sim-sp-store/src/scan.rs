//! Startup scan of the archive directory
//!
//! Registers every published archive exactly the way the ingestion pipeline
//! does after a download, so a restarted node rebuilds the same registry.

use sim_sp_core::{PieceId, SimSpError, SimSpResult};
use tracing::{info, warn};

use crate::layout::{ArchiveLayout, EntryKind};
use crate::registry::PieceRegistry;

/// What to do with a published archive that fails to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptArchivePolicy {
    /// Rename it to `{pieceId}.car.corrupt` and carry on
    #[default]
    Quarantine,
    /// Abort the scan with the open error
    Fail,
}

/// Outcome of one scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub registered: Vec<PieceId>,
    pub ignored: usize,
    pub removed_temp: usize,
    pub quarantined: Vec<PieceId>,
}

/// Register every `{pieceId}.car` under `layout`
///
/// Entries are visited in name order. Leftover `.car.temp` files are deleted;
/// names that are not `{valid CID}.car` are skipped.
pub fn scan_archive_dir(
    layout: &ArchiveLayout,
    registry: &PieceRegistry,
    policy: CorruptArchivePolicy,
) -> SimSpResult<ScanReport> {
    let dir = layout.dir();
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| SimSpError::storage(dir, e))? {
        let entry = entry.map_err(|e| SimSpError::storage(dir, e))?;
        let is_file = entry
            .file_type()
            .map_err(|e| SimSpError::storage(entry.path(), e))?
            .is_file();
        if is_file {
            entries.push(entry.path());
        }
    }
    entries.sort();

    let mut report = ScanReport::default();
    for path in entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            report.ignored += 1;
            continue;
        };

        match ArchiveLayout::classify(name) {
            EntryKind::Piece(piece) => match registry.add_piece(piece, &path) {
                Ok(()) => report.registered.push(piece),
                Err(e) => match policy {
                    CorruptArchivePolicy::Fail => return Err(e),
                    CorruptArchivePolicy::Quarantine => {
                        warn!(piece_id = %piece, error = %e, "Quarantining unreadable archive");
                        layout.quarantine(&path, &piece)?;
                        report.quarantined.push(piece);
                    }
                },
            },
            EntryKind::Temp => {
                std::fs::remove_file(&path).map_err(|e| SimSpError::storage(&path, e))?;
                info!(path = %path.display(), "Removed interrupted download");
                report.removed_temp += 1;
            }
            EntryKind::Quarantined | EntryKind::Other => {
                report.ignored += 1;
            }
        }
    }

    info!(
        dir = %dir.display(),
        registered = report.registered.len(),
        quarantined = report.quarantined.len(),
        removed_temp = report.removed_temp,
        ignored = report.ignored,
        "Archive directory scanned"
    );
    Ok(report)
}
