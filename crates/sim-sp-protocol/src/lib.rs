//! # sim-sp protocol
//!
//! The node's external stream interface. A [`TcpStreamTransport`] accepts
//! connections, reads the protocol header and hands the framed stream to the
//! [`StreamRouter`], which runs the handler registered for that protocol:
//!
//! - [`TransportQueryHandler`] on [`RETRIEVAL_TRANSPORTS_PROTOCOL`]
//! - [`DealProposalHandler`] on [`STORAGE_DEAL_PROTOCOL`]
//! - the block-exchange responder on [`BLOCK_EXCHANGE_PROTOCOL`]
//!
//! Handlers run one task per stream and reach the ingestion worker only
//! through its bounded queue.

#![forbid(unsafe_code)]

mod exchange;
pub mod messages;
pub mod proposal;
pub mod query;
pub mod router;
pub mod tcp;

pub use messages::{
    DealResponse, QueryResponse, TransportProtocol, BITSWAP_TRANSPORT_NAME,
    BLOCK_EXCHANGE_PROTOCOL, HTTP_TRANSPORT_NAME, RETRIEVAL_TRANSPORTS_PROTOCOL,
    STORAGE_DEAL_PROTOCOL,
};
pub use proposal::DealProposalHandler;
pub use query::{http_multiaddr, TransportQueryHandler};
pub use router::{ByteStream, InboundStream, StreamHandler, StreamRouter};
pub use tcp::{dial, multiaddr_to_socket_addr, socket_addr_to_multiaddr, TcpStreamTransport};
