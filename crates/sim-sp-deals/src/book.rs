//! Deal book
//!
//! In-memory deal records backed by one `{dealId}.json` side record per deal.
//! Every change is written to disk (temp file, then rename) before it becomes
//! visible in memory. The methods block on that I/O; async code goes through
//! [`DealBook::blocking`].

use parking_lot::RwLock;
use sim_sp_core::{DealId, SimSpError, SimSpResult};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::status::DealStatus;
use crate::types::{DealProposal, DealRecord, DealState};

const RECORD_SUFFIX: &str = ".json";

/// Failure reason given to deals that were in flight when the node stopped
pub const INTERRUPTED_BY_RESTART: &str = "interrupted by restart";

/// Owned store of deal records
#[derive(Debug)]
pub struct DealBook {
    dir: PathBuf,
    deals: RwLock<HashMap<DealId, DealRecord>>,
}

impl DealBook {
    /// Open the book in `dir`, reloading every side record found there
    ///
    /// Records that were not terminal are marked failed: the download they
    /// describe did not survive the restart. Unreadable records are skipped.
    pub fn open(dir: impl Into<PathBuf>) -> SimSpResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| SimSpError::storage(&dir, e))?;

        let mut deals = HashMap::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| SimSpError::storage(&dir, e))? {
            let path = entry.map_err(|e| SimSpError::storage(&dir, e))?.path();
            let is_record = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(RECORD_SUFFIX))
                .is_some_and(|stem| stem.parse::<DealId>().is_ok());
            if !is_record || !path.is_file() {
                continue;
            }

            match read_record(&path) {
                Ok(mut record) => {
                    if !record.status.is_terminal() {
                        record.status = DealStatus::Failed;
                        record.failure = Some(INTERRUPTED_BY_RESTART.to_string());
                        write_record(&dir, &record)?;
                        warn!(deal_id = %record.deal_id, "Deal interrupted by restart");
                    }
                    deals.insert(record.deal_id, record);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable deal record"),
            }
        }

        info!(dir = %dir.display(), deals = deals.len(), "Deal book loaded");
        Ok(Self {
            dir,
            deals: RwLock::new(deals),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run `op` against the book on the blocking thread pool
    pub async fn blocking<T, F>(self: &Arc<Self>, op: F) -> SimSpResult<T>
    where
        F: FnOnce(&DealBook) -> SimSpResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let book = Arc::clone(self);
        tokio::task::spawn_blocking(move || op(&book))
            .await
            .map_err(|e| {
                SimSpError::storage(
                    &self.dir,
                    std::io::Error::other(format!("deal book task failed: {e}")),
                )
            })?
    }

    /// Record a new proposal; a deal id can be proposed once
    pub fn propose(&self, deal_id: DealId, proposal: DealProposal) -> SimSpResult<DealRecord> {
        let mut deals = self.deals.write();
        if let Some(existing) = deals.get(&deal_id) {
            return Err(SimSpError::invalid_transition(existing.status, DealStatus::Proposed));
        }
        let record = DealRecord::proposed(deal_id, proposal);
        write_record(&self.dir, &record)?;
        deals.insert(deal_id, record.clone());
        info!(deal_id = %deal_id, piece_id = %record.proposal.piece_cid, "Deal proposed");
        Ok(record)
    }

    /// Move a deal to `next`; reaching `Registered` activates it
    pub fn transition(&self, deal_id: DealId, next: DealStatus) -> SimSpResult<DealRecord> {
        self.update(deal_id, next, None)
    }

    /// Move a deal to `Failed` with `reason`
    pub fn fail(&self, deal_id: DealId, reason: impl Into<String>) -> SimSpResult<DealRecord> {
        self.update(deal_id, DealStatus::Failed, Some(reason.into()))
    }

    fn update(
        &self,
        deal_id: DealId,
        next: DealStatus,
        failure: Option<String>,
    ) -> SimSpResult<DealRecord> {
        let mut deals = self.deals.write();
        let current = deals
            .get(&deal_id)
            .ok_or_else(|| SimSpError::not_found(format!("deal {deal_id}")))?;

        let mut record = current.clone();
        record.status = current.status.transition(next)?;
        record.failure = failure;
        if next == DealStatus::Registered {
            record.state = DealState::ACTIVE;
        }
        write_record(&self.dir, &record)?;
        deals.insert(deal_id, record.clone());
        drop(deals);

        match &record.failure {
            Some(reason) => warn!(deal_id = %deal_id, reason = %reason, "Deal failed"),
            None => info!(deal_id = %deal_id, status = %next, "Deal status changed"),
        }
        Ok(record)
    }

    pub fn get(&self, deal_id: &DealId) -> Option<DealRecord> {
        self.deals.read().get(deal_id).cloned()
    }

    /// Every record keyed by deal id string, for serving
    pub fn snapshot(&self) -> BTreeMap<String, DealRecord> {
        self.deals
            .read()
            .iter()
            .map(|(id, record)| (id.to_string(), record.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.deals.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.deals.read().is_empty()
    }
}

fn record_path(dir: &Path, deal_id: &DealId) -> PathBuf {
    dir.join(format!("{deal_id}{RECORD_SUFFIX}"))
}

fn read_record(path: &Path) -> SimSpResult<DealRecord> {
    let bytes = std::fs::read(path).map_err(|e| SimSpError::storage(path, e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| SimSpError::decode(format!("invalid deal record {}: {e}", path.display())))
}

fn write_record(dir: &Path, record: &DealRecord) -> SimSpResult<()> {
    let path = record_path(dir, &record.deal_id);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_vec_pretty(record)
        .map_err(|e| SimSpError::decode(format!("cannot encode deal record: {e}")))?;
    std::fs::write(&tmp, json).map_err(|e| SimSpError::storage(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| SimSpError::storage(&path, e))
}
