//! Typed identifiers
//!
//! A [`PieceId`] is always a parsed CID, so its canonical string form is safe
//! to use as a file name. A [`DealId`] is the proposer-supplied deal UUID.

use cid::Cid;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::SimSpError;

/// Identifier of a piece: the CID naming its archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PieceId(Cid);

impl PieceId {
    /// Wrap an already parsed CID
    pub fn new(cid: Cid) -> Self {
        Self(cid)
    }

    /// The underlying CID
    pub fn cid(&self) -> &Cid {
        &self.0
    }
}

impl From<Cid> for PieceId {
    fn from(cid: Cid) -> Self {
        Self(cid)
    }
}

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PieceId {
    type Err = SimSpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cid::try_from(s)
            .map(Self)
            .map_err(|e| SimSpError::decode(format!("invalid piece CID '{s}': {e}")))
    }
}

/// Human-readable formats (JSON records, URLs) carry the CID string; binary
/// formats carry the CID itself, which DAG-CBOR encodes as a link.
impl Serialize for PieceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.0.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for PieceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            Cid::deserialize(deserializer).map(Self)
        }
    }
}

/// Identifier of a deal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealId(Uuid);

impl DealId {
    /// Generate a fresh random deal id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DealId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DealId {
    type Err = SimSpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SimSpError::decode(format!("invalid deal id '{s}': {e}")))
    }
}
