//! Deal ingestion lifecycle
//!
//! ```text
//! Proposed → Accepted → Downloading → Publishing → Registered
//!               │            │             │
//!               └────────────┴─────────────┴──→ Failed
//! ```

use serde::{Deserialize, Serialize};
use sim_sp_core::{SimSpError, SimSpResult};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DealStatus {
    Proposed,
    Accepted,
    Downloading,
    Publishing,
    Registered,
    Failed,
}

impl DealStatus {
    /// Whether the state machine allows `self → next`
    pub fn can_transition_to(self, next: DealStatus) -> bool {
        use DealStatus::*;
        matches!(
            (self, next),
            (Proposed, Accepted)
                | (Accepted, Downloading)
                | (Downloading, Publishing)
                | (Publishing, Registered)
                | (Accepted | Downloading | Publishing, Failed)
        )
    }

    /// Validate `self → next`
    pub fn transition(self, next: DealStatus) -> SimSpResult<DealStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(SimSpError::invalid_transition(self, next))
        }
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(self) -> bool {
        matches!(self, DealStatus::Registered | DealStatus::Failed)
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DealStatus::Proposed => "Proposed",
            DealStatus::Accepted => "Accepted",
            DealStatus::Downloading => "Downloading",
            DealStatus::Publishing => "Publishing",
            DealStatus::Registered => "Registered",
            DealStatus::Failed => "Failed",
        };
        f.write_str(name)
    }
}
