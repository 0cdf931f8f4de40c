//! Block exchange over routed streams

use async_trait::async_trait;
use sim_sp_core::SimSpResult;
use sim_sp_retrieval::BlockExchangeResponder;
use std::net::SocketAddr;
use tracing::debug;

use crate::router::{InboundStream, StreamHandler};

#[async_trait]
impl StreamHandler for BlockExchangeResponder {
    async fn handle(&self, mut stream: InboundStream, peer: SocketAddr) -> SimSpResult<()> {
        debug!(%peer, "Block exchange stream opened");
        self.serve_stream(&mut stream).await?;
        debug!(%peer, "Block exchange stream closed");
        Ok(())
    }
}
