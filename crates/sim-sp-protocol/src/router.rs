//! Inbound stream dispatch by protocol identifier

use async_trait::async_trait;
use sim_sp_core::codec::MessageStream;
use sim_sp_core::SimSpResult;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, warn};

/// Any bidirectional byte stream a transport can deliver
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteStream for T {}

/// Framed inbound stream as handed to handlers
pub type InboundStream = MessageStream<Box<dyn ByteStream>>;

/// Per-protocol responder; one call per inbound stream
#[async_trait]
pub trait StreamHandler: Send + Sync {
    async fn handle(&self, stream: InboundStream, peer: SocketAddr) -> SimSpResult<()>;
}

/// Maps protocol identifiers to their handlers
#[derive(Default, Clone)]
pub struct StreamRouter {
    handlers: BTreeMap<String, Arc<dyn StreamHandler>>,
}

impl StreamRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `protocol`, replacing any earlier one
    pub fn register(&mut self, protocol: impl Into<String>, handler: Arc<dyn StreamHandler>) {
        self.handlers.insert(protocol.into(), handler);
    }

    pub fn with(mut self, protocol: impl Into<String>, handler: Arc<dyn StreamHandler>) -> Self {
        self.register(protocol, handler);
        self
    }

    /// Registered protocol identifiers, sorted
    pub fn protocols(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Run the handler for `protocol` on `stream`
    ///
    /// Unknown protocols drop the stream. Handler errors end only this stream.
    pub async fn dispatch(&self, protocol: &str, stream: InboundStream, peer: SocketAddr) {
        let Some(handler) = self.handlers.get(protocol) else {
            warn!(%peer, protocol, "No handler for protocol; dropping stream");
            return;
        };
        debug!(%peer, protocol, "Dispatching stream");
        if let Err(e) = handler.handle(stream, peer).await {
            error!(%peer, protocol, error = %e, "Stream handler failed");
        }
    }
}
