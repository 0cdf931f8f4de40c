//! Block exchange responder
//!
//! A peer sends want-lists and receives, for each one, the wanted blocks that
//! resolve through the overlay plus presence answers for everything else. One
//! want-list may be answered over several frames: block data is packed up to
//! [`MAX_RESPONSE_BLOCK_BYTES`] per frame, every frame but the last has `more`
//! set, and the presences ride on the last one. The stream carries frames
//! until the peer closes it.

use cid::Cid;
use serde::{Deserialize, Serialize};
use sim_sp_core::codec::{self, MessageStream};
use sim_sp_core::{SimSpError, SimSpResult};
use sim_sp_store::{BlockOverlay, Blockstore};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

/// Largest want-list accepted
pub const MAX_WANT_ENTRIES: usize = 256;

/// Block bytes carried by one response frame
///
/// Leaves room under the codec frame limit for CIDs, presences and encoding
/// overhead. A block larger than this is answered with a presence instead.
pub const MAX_RESPONSE_BLOCK_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WantType {
    /// Send the block bytes
    Block,
    /// Only say whether the block is held
    Have,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WantEntry {
    pub cid: Cid,
    pub want: WantType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WantList {
    pub entries: Vec<WantEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntry {
    pub cid: Cid,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub cid: Cid,
    pub have: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeResponse {
    pub blocks: Vec<BlockEntry>,
    pub presences: Vec<Presence>,
    /// More frames follow for the same want-list
    #[serde(default)]
    pub more: bool,
}

impl ExchangeResponse {
    fn block_bytes(&self) -> usize {
        self.blocks.iter().map(|b| b.data.len()).sum()
    }
}

/// Answers want-lists from the block overlay
#[derive(Debug, Clone)]
pub struct BlockExchangeResponder {
    overlay: Arc<BlockOverlay>,
}

impl BlockExchangeResponder {
    pub fn new(overlay: Arc<BlockOverlay>) -> Self {
        Self { overlay }
    }

    /// Answer one want-list, as one or more frames in send order
    ///
    /// Reads archive files; async callers run this on a blocking thread.
    pub fn respond(&self, wants: &WantList) -> SimSpResult<Vec<ExchangeResponse>> {
        if wants.entries.len() > MAX_WANT_ENTRIES {
            return Err(SimSpError::decode(format!(
                "want-list has {} entries, limit is {MAX_WANT_ENTRIES}",
                wants.entries.len()
            )));
        }

        let mut frames = Vec::new();
        let mut current = ExchangeResponse::default();
        let mut presences = Vec::new();
        for entry in &wants.entries {
            match entry.want {
                WantType::Block => match self.overlay.get(&entry.cid) {
                    Ok(block) if block.data().len() > MAX_RESPONSE_BLOCK_BYTES => {
                        warn!(cid = %entry.cid, bytes = block.data().len(), "Block too large to send");
                        presences.push(Presence {
                            cid: entry.cid,
                            have: true,
                        });
                    }
                    Ok(block) => {
                        let len = block.data().len();
                        if !current.blocks.is_empty()
                            && current.block_bytes() + len > MAX_RESPONSE_BLOCK_BYTES
                        {
                            let mut full = std::mem::take(&mut current);
                            full.more = true;
                            frames.push(full);
                        }
                        current.blocks.push(BlockEntry {
                            cid: entry.cid,
                            data: block.into_data().to_vec(),
                        });
                    }
                    Err(e) => {
                        if !e.is_not_found() {
                            warn!(cid = %entry.cid, error = %e, "Block read failed");
                        }
                        presences.push(Presence {
                            cid: entry.cid,
                            have: false,
                        });
                    }
                },
                WantType::Have => {
                    let have = self.overlay.has(&entry.cid).unwrap_or_else(|e| {
                        warn!(cid = %entry.cid, error = %e, "Block lookup failed");
                        false
                    });
                    presences.push(Presence {
                        cid: entry.cid,
                        have,
                    });
                }
            }
        }
        current.presences = presences;
        frames.push(current);
        Ok(frames)
    }

    /// Serve want-lists on `stream` until the peer closes it
    ///
    /// An undecodable or oversized want-list ends the exchange with an error.
    pub async fn serve_stream<S>(&self, stream: &mut MessageStream<S>) -> SimSpResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while let Some(wants) = codec::read_message::<WantList, _>(stream).await? {
            let entries = wants.entries.len();
            let responder = self.clone();
            let frames = tokio::task::spawn_blocking(move || responder.respond(&wants))
                .await
                .map_err(|e| SimSpError::transport(format!("block exchange task failed: {e}")))??;
            debug!(
                wants = entries,
                blocks = frames.iter().map(|f| f.blocks.len()).sum::<usize>(),
                frames = frames.len(),
                "Answered want-list"
            );
            for frame in &frames {
                codec::write_message(stream, frame).await?;
            }
        }
        Ok(())
    }
}
