//! # sim-sp node
//!
//! Wires the storage provider together: [`NodeConfig`] layering and
//! validation, [`NodeIdentity`] loading, and [`start`], which restores state
//! from disk and launches the ingestion worker, the HTTP server and the
//! stream transport as one [`RunningNode`].

#![forbid(unsafe_code)]

pub mod config;
pub mod identity;
pub mod node;

pub use config::{
    ConfigOverrides, IdentityConfig, IngestConfig, NetworkConfig, NodeConfig, StorageConfig,
};
pub use identity::{NodeIdentity, DEFAULT_IDENTITY_KEY};
pub use node::{start, RunningNode};
