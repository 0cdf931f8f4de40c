//! Retrieval transport query handler
//!
//! Stateless: every inbound stream gets the same fixed answer, after which the
//! stream is closed.

use async_trait::async_trait;
use multiaddr::{Multiaddr, Protocol};
use sim_sp_core::codec;
use sim_sp_core::SimSpResult;
use std::net::{IpAddr, SocketAddr};
use tracing::info;

use crate::messages::{
    QueryResponse, TransportProtocol, BITSWAP_TRANSPORT_NAME, HTTP_TRANSPORT_NAME,
};
use crate::router::{InboundStream, StreamHandler};

/// Multiaddr advertising the HTTP server: `/ip4/<host>/tcp/<port>/http`
pub fn http_multiaddr(host: IpAddr, port: u16) -> Multiaddr {
    let ip = match host {
        IpAddr::V4(v4) => Protocol::Ip4(v4),
        IpAddr::V6(v6) => Protocol::Ip6(v6),
    };
    Multiaddr::empty()
        .with(ip)
        .with(Protocol::Tcp(port))
        .with(Protocol::Http)
}

pub struct TransportQueryHandler {
    response: QueryResponse,
}

impl TransportQueryHandler {
    /// Advertise `http` at `http_addr` and `bitswap` at `exchange_addrs`
    pub fn new(http_addr: Multiaddr, exchange_addrs: &[Multiaddr]) -> Self {
        Self {
            response: QueryResponse {
                protocols: vec![
                    TransportProtocol::new(HTTP_TRANSPORT_NAME, &[http_addr]),
                    TransportProtocol::new(BITSWAP_TRANSPORT_NAME, exchange_addrs),
                ],
            },
        }
    }

    pub fn response(&self) -> &QueryResponse {
        &self.response
    }
}

#[async_trait]
impl StreamHandler for TransportQueryHandler {
    async fn handle(&self, mut stream: InboundStream, peer: SocketAddr) -> SimSpResult<()> {
        info!(%peer, "Received transport protocol request");
        codec::write_message(&mut stream, &self.response).await?;
        codec::close(&mut stream).await
    }
}
