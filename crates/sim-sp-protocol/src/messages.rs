//! Protocol identifiers and reply messages

use multiaddr::Multiaddr;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

/// Retrieval transport query
pub const RETRIEVAL_TRANSPORTS_PROTOCOL: &str = "/fil/retrieval/transports/1.0.0";

/// Storage deal proposal
pub const STORAGE_DEAL_PROTOCOL: &str = "/fil/storage/mk/1.2.0";

/// Block exchange want-lists
pub const BLOCK_EXCHANGE_PROTOCOL: &str = "/sim-sp/block-exchange/1.0.0";

/// Name advertised for the HTTP retrieval transport
pub const HTTP_TRANSPORT_NAME: &str = "http";

/// Name advertised for the block-exchange transport
pub const BITSWAP_TRANSPORT_NAME: &str = "bitswap";

/// One retrieval transport and the addresses it is reachable on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransportProtocol {
    pub name: String,
    /// Binary multiaddrs
    pub addresses: Vec<ByteBuf>,
}

impl TransportProtocol {
    pub fn new(name: impl Into<String>, addresses: &[Multiaddr]) -> Self {
        Self {
            name: name.into(),
            addresses: addresses.iter().map(|a| ByteBuf::from(a.to_vec())).collect(),
        }
    }

    /// Decode the advertised addresses, skipping any that do not parse
    pub fn multiaddrs(&self) -> Vec<Multiaddr> {
        self.addresses
            .iter()
            .filter_map(|bytes| Multiaddr::try_from(bytes.to_vec()).ok())
            .collect()
    }
}

/// Reply to a transport query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryResponse {
    pub protocols: Vec<TransportProtocol>,
}

/// Reply to a deal proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DealResponse {
    pub accepted: bool,
    pub message: String,
}

impl DealResponse {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            message: "accepted".to_string(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: message.into(),
        }
    }
}
