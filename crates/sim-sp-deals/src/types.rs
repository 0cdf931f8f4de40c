//! Deal wire messages and persisted records
//!
//! Wire messages use the storage-market field names (`PascalCase`, `PieceCID`,
//! `DealUUID`) and travel as DAG-CBOR. Records are stored and served as JSON.

use serde::{Deserialize, Serialize};
use sim_sp_core::{DealId, PieceId, SimSpError, SimSpResult};
use std::collections::HashMap;

use crate::status::DealStatus;

/// The only transfer method the pipeline can fetch
pub const HTTP_TRANSFER: &str = "http";

/// Terms of a storage deal as proposed by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DealProposal {
    #[serde(rename = "PieceCID")]
    pub piece_cid: PieceId,
    pub piece_size: u64,
    pub verified_deal: bool,
    /// Client address, recorded as proposed
    pub client: String,
    pub provider: String,
    #[serde(default)]
    pub label: String,
    pub start_epoch: i64,
    pub end_epoch: i64,
    /// Token amounts are kept as decimal attoFIL strings
    pub storage_price_per_epoch: String,
    pub provider_collateral: String,
    pub client_collateral: String,
}

/// Client signature over the proposal; not verified
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Signature {
    #[serde(rename = "Type")]
    pub sig_type: u8,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientDealProposal {
    pub proposal: DealProposal,
    #[serde(default)]
    pub client_signature: Signature,
}

/// How the provider should fetch the piece bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Transfer {
    #[serde(rename = "Type")]
    pub transfer_type: String,
    #[serde(rename = "ClientID", default)]
    pub client_id: String,
    /// Method-specific parameters; JSON [`HttpTransferParams`] for `http`
    #[serde(with = "serde_bytes")]
    pub params: Vec<u8>,
    #[serde(default)]
    pub size: u64,
}

impl Transfer {
    /// An `http` transfer fetching `url` with `headers`
    pub fn http(url: impl Into<String>, headers: HashMap<String, String>, size: u64) -> SimSpResult<Self> {
        let params = HttpTransferParams {
            url: url.into(),
            headers,
        };
        Ok(Self {
            transfer_type: HTTP_TRANSFER.to_string(),
            client_id: String::new(),
            params: serde_json::to_vec(&params)
                .map_err(|e| SimSpError::decode(format!("cannot encode transfer params: {e}")))?,
            size,
        })
    }

    pub fn is_http(&self) -> bool {
        self.transfer_type == HTTP_TRANSFER
    }
}

/// Parameters of an `http` transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTransferParams {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Headers", default)]
    pub headers: HashMap<String, String>,
}

impl HttpTransferParams {
    /// Parse the JSON parameters carried by `transfer`
    pub fn from_transfer(transfer: &Transfer) -> SimSpResult<Self> {
        serde_json::from_slice(&transfer.params)
            .map_err(|e| SimSpError::decode(format!("cannot parse http transfer params: {e}")))
    }
}

/// A deal proposal message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DealParams {
    #[serde(rename = "DealUUID")]
    pub deal_uuid: DealId,
    #[serde(default)]
    pub is_offline: bool,
    pub client_deal_proposal: ClientDealProposal,
    pub transfer: Transfer,
}

impl DealParams {
    pub fn deal_id(&self) -> DealId {
        self.deal_uuid
    }

    pub fn proposal(&self) -> &DealProposal {
        &self.client_deal_proposal.proposal
    }

    pub fn piece_id(&self) -> PieceId {
        self.client_deal_proposal.proposal.piece_cid
    }
}

/// Market lifecycle epochs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DealState {
    pub sector_start_epoch: i64,
    pub last_updated_epoch: i64,
    pub slash_epoch: i64,
}

impl DealState {
    /// Epochs of a deal that is not active
    pub const INACTIVE: Self = Self {
        sector_start_epoch: -1,
        last_updated_epoch: -1,
        slash_epoch: -1,
    };

    /// Epochs of a locally activated deal
    pub const ACTIVE: Self = Self {
        sector_start_epoch: 1,
        last_updated_epoch: 1,
        slash_epoch: -1,
    };

    pub fn is_active(&self) -> bool {
        self.sector_start_epoch > 0 && self.slash_epoch < 0
    }
}

impl Default for DealState {
    fn default() -> Self {
        Self::INACTIVE
    }
}

/// What the node remembers about one deal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DealRecord {
    #[serde(rename = "DealID")]
    pub deal_id: DealId,
    pub proposal: DealProposal,
    pub state: DealState,
    pub status: DealStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl DealRecord {
    /// A freshly proposed, inactive deal
    pub fn proposed(deal_id: DealId, proposal: DealProposal) -> Self {
        Self {
            deal_id,
            proposal,
            state: DealState::INACTIVE,
            status: DealStatus::Proposed,
            failure: None,
        }
    }
}
