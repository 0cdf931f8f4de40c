//! Node Configuration
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then command-line overrides (which also carry the `SIM_SP_*` environment
//! variables). [`NodeConfig::validate`] runs once on the merged result.

use multiaddr::Multiaddr;
use serde::{Deserialize, Serialize};
use sim_sp_core::{SimSpError, SimSpResult};
use sim_sp_deals::{PipelineConfig, DEFAULT_QUEUE_CAPACITY};
use sim_sp_store::CorruptArchivePolicy;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::identity::DEFAULT_IDENTITY_KEY;

fn default_true() -> bool {
    true
}

/// Node configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Listen and advertise addresses
    pub network: NetworkConfig,

    /// Archive and deal record directories
    pub storage: StorageConfig,

    /// Ingestion queue and download limits
    pub ingest: IngestConfig,

    /// Node identity
    pub identity: IdentityConfig,
}

/// Network configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Stream transport listen multiaddrs
    pub listen: Vec<String>,

    /// HTTP bind address; `":port"` binds all interfaces
    pub http_bind: String,

    /// Host placed in the advertised HTTP multiaddr
    pub http_advertise_host: IpAddr,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen: vec!["/ip4/0.0.0.0/tcp/24001".to_string()],
            http_bind: ":7778".to_string(),
            http_advertise_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding piece archives
    pub car_dir: PathBuf,

    /// Directory holding deal records; defaults to `car_dir`
    pub deal_dir: Option<PathBuf>,

    /// Quarantine archives that fail to open at startup instead of refusing to start
    #[serde(default = "default_true")]
    pub quarantine_corrupt: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            car_dir: PathBuf::from("./cars"),
            deal_dir: None,
            quarantine_corrupt: true,
        }
    }
}

/// Ingestion configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Deals that may wait for the worker
    pub queue_capacity: usize,

    /// Whole-download deadline in seconds
    pub download_timeout_secs: u64,

    /// TCP connect deadline in seconds
    pub connect_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            download_timeout_secs: 3600,
            connect_timeout_secs: 30,
        }
    }
}

/// Identity configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Base64 protobuf-encoded private key
    pub key: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_IDENTITY_KEY.to_string(),
        }
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub listen: Vec<String>,
    pub key: Option<String>,
    pub http: Option<String>,
    pub car_dir: Option<PathBuf>,
}

impl NodeConfig {
    /// Read a TOML configuration file
    pub fn load(path: &Path) -> SimSpResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SimSpError::config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        toml::from_str(&text).map_err(|e| {
            SimSpError::config(format!("invalid config file {}: {e}", path.display()))
        })
    }

    pub fn from_toml(text: &str) -> SimSpResult<Self> {
        toml::from_str(text).map_err(|e| SimSpError::config(format!("invalid config: {e}")))
    }

    /// Apply command-line overrides; empty values leave the field alone
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if !overrides.listen.is_empty() {
            self.network.listen = overrides.listen;
        }
        if let Some(key) = overrides.key {
            self.identity.key = key;
        }
        if let Some(http) = overrides.http {
            self.network.http_bind = http;
        }
        if let Some(car_dir) = overrides.car_dir {
            self.storage.car_dir = car_dir;
        }
    }

    pub fn validate(&self) -> SimSpResult<()> {
        if self.ingest.queue_capacity == 0 {
            return Err(SimSpError::config("ingest.queue_capacity must be positive"));
        }
        if self.ingest.download_timeout_secs == 0 {
            return Err(SimSpError::config(
                "ingest.download_timeout_secs must be positive",
            ));
        }
        if self.ingest.connect_timeout_secs == 0 {
            return Err(SimSpError::config(
                "ingest.connect_timeout_secs must be positive",
            ));
        }
        if self.identity.key.trim().is_empty() {
            return Err(SimSpError::config("identity.key is empty"));
        }
        self.listen_multiaddrs()?;
        self.http_bind_addr()?;
        Ok(())
    }

    /// Parsed listen addresses; an empty list is an error
    pub fn listen_multiaddrs(&self) -> SimSpResult<Vec<Multiaddr>> {
        if self.network.listen.is_empty() {
            return Err(SimSpError::config("network.listen is empty"));
        }
        self.network
            .listen
            .iter()
            .map(|text| {
                text.trim().parse::<Multiaddr>().map_err(|e| {
                    SimSpError::config(format!("invalid listen address {text:?}: {e}"))
                })
            })
            .collect()
    }

    /// HTTP bind address, expanding `":port"` to all interfaces
    pub fn http_bind_addr(&self) -> SimSpResult<SocketAddr> {
        let text = self.network.http_bind.trim();
        let parsed = match text.strip_prefix(':') {
            Some(port) => port
                .parse::<u16>()
                .map(|port| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port))
                .map_err(|e| e.to_string()),
            None => text.parse::<SocketAddr>().map_err(|e| e.to_string()),
        };
        parsed.map_err(|e| SimSpError::config(format!("invalid HTTP bind address {text:?}: {e}")))
    }

    pub fn deal_dir(&self) -> PathBuf {
        self.storage
            .deal_dir
            .clone()
            .unwrap_or_else(|| self.storage.car_dir.clone())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            queue_capacity: self.ingest.queue_capacity,
            connect_timeout: Duration::from_secs(self.ingest.connect_timeout_secs),
            download_timeout: Duration::from_secs(self.ingest.download_timeout_secs),
        }
    }

    pub fn corrupt_archive_policy(&self) -> CorruptArchivePolicy {
        if self.storage.quarantine_corrupt {
            CorruptArchivePolicy::Quarantine
        } else {
            CorruptArchivePolicy::Fail
        }
    }
}
