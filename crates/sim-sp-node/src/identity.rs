//! Node identity
//!
//! Keys travel as base64 of the libp2p protobuf encoding, the same form the
//! `generate-peer` command prints.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use libp2p_identity::{Keypair, PeerId};
use sim_sp_core::{SimSpError, SimSpResult};

/// Built-in ed25519 key, peer `12D3KooWDeNSud283YaRmhqbZDynLNmtATBxjUPAUJxtPyEXXp9u`
pub const DEFAULT_IDENTITY_KEY: &str =
    "CAESQAUejksYdBAFfSKlJY5zgvOWJh/kQVrNgk73TFxMwryNON9BNYLizluGaTFx8KOT/yTTmy5ef9qOYpKS2J0EN1A=";

#[derive(Debug, Clone)]
pub struct NodeIdentity {
    keypair: Keypair,
    peer_id: PeerId,
}

impl NodeIdentity {
    /// Decode a base64 protobuf-encoded private key
    pub fn from_base64(encoded: &str) -> SimSpResult<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| SimSpError::config(format!("identity key is not base64: {e}")))?;
        let keypair = Keypair::from_protobuf_encoding(&bytes)
            .map_err(|e| SimSpError::config(format!("cannot decode identity key: {e}")))?;
        Ok(Self::from_keypair(keypair))
    }

    /// Fresh ed25519 identity
    pub fn generate() -> Self {
        Self::from_keypair(Keypair::generate_ed25519())
    }

    fn from_keypair(keypair: Keypair) -> Self {
        let peer_id = keypair.public().to_peer_id();
        Self { keypair, peer_id }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.keypair.public().encode_protobuf())
    }

    pub fn private_key_base64(&self) -> SimSpResult<String> {
        let bytes = self
            .keypair
            .to_protobuf_encoding()
            .map_err(|e| SimSpError::config(format!("cannot encode identity key: {e}")))?;
        Ok(STANDARD.encode(bytes))
    }
}
