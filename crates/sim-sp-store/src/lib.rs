//! # sim-sp store
//!
//! Local storage for pieces. A piece is a CAR archive on disk; every opened
//! archive joins the [`BlockOverlay`], which answers block lookups across all
//! of them, and the [`PieceRegistry`] maps piece identifiers to archive paths.
//!
//! ## Core Concepts
//!
//! - **Archives**: [`CarArchive`] opens a CAR (v1 or v2) read-only and indexes it
//! - **Overlay**: read-only, append-only, first-match-wins block index
//! - **Registry**: piece id → archive path, registered together with the overlay
//! - **Layout**: file naming of published, temporary and quarantined archives
//! - **Scan**: startup reconstruction of the registry from the archive directory

#![forbid(unsafe_code)]

pub mod block;
pub mod blockstore;
pub mod car;
pub mod layout;
pub mod overlay;
pub mod registry;
pub mod scan;

pub use block::{raw_block, Block};
pub use blockstore::{ArchiveHandle, Blockstore};
pub use car::{CarArchive, CarWriter};
pub use layout::{ArchiveLayout, EntryKind};
pub use overlay::BlockOverlay;
pub use registry::PieceRegistry;
pub use scan::{scan_archive_dir, CorruptArchivePolicy, ScanReport};
