//! Storage deal proposal handler
//!
//! Decodes one proposal per stream and answers before ingestion starts. The
//! answer is a promise to try, not to succeed; callers poll the deal record
//! for the outcome.

use async_trait::async_trait;
use sim_sp_core::codec;
use sim_sp_core::{SimSpError, SimSpResult};
use sim_sp_deals::{DealParams, IngestQueue, SubmitOutcome};
use std::net::SocketAddr;
use tracing::{info, warn};

use crate::messages::DealResponse;
use crate::router::{InboundStream, StreamHandler};

pub struct DealProposalHandler {
    queue: IngestQueue,
}

impl DealProposalHandler {
    pub fn new(queue: IngestQueue) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl StreamHandler for DealProposalHandler {
    async fn handle(&self, mut stream: InboundStream, peer: SocketAddr) -> SimSpResult<()> {
        let deal: DealParams = codec::read_message(&mut stream)
            .await?
            .ok_or_else(|| SimSpError::decode("stream closed before a proposal arrived"))?;

        info!(
            %peer,
            deal_id = %deal.deal_id(),
            client = %deal.proposal().client,
            piece_id = %deal.piece_id(),
            "Received a deal proposal"
        );

        let response = match self.queue.submit(deal).await {
            // an unsupported transfer is failed locally; the proposer is not told
            SubmitOutcome::Queued | SubmitOutcome::Unsupported(_) => DealResponse::accepted(),
            SubmitOutcome::Rejected(reason) => {
                DealResponse::rejected(format!("cannot record deal: {reason}"))
            }
            SubmitOutcome::Duplicate => DealResponse::rejected("duplicate deal"),
            SubmitOutcome::Abandoned => {
                warn!(%peer, "Shutting down; dropping proposal stream without reply");
                return Ok(());
            }
        };

        codec::write_message(&mut stream, &response).await?;
        codec::close(&mut stream).await
    }
}
