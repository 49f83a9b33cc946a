//! # Node Configuration
//!
//! A node is described by one JSON file:
//!
//! ```json
//! {
//!   "address": "node:00112233445566778899aabbccddeeff00112233",
//!   "listen": "127.0.0.1:7000",
//!   "peers": [ { "address": "node:…", "endpoint": "127.0.0.1:7001" } ],
//!   "rpc_timeout_secs": 30
//! }
//! ```
//!
//! `address` is optional (a random one is picked) and so is `rpc_timeout_secs`.
//! `peers` is the static routing table handed to the transport.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use hellorpc::Address;
use hellorpc::transport::tcp::TcpTransport;

fn default_timeout_secs() -> u64 {
    30
}

/// Errors loading a node configuration. All of them are fatal at startup.
#[derive(Debug)]
pub enum ConfigError {
    /// The file does not exist.
    Missing(PathBuf),
    /// The file exists but could not be read.
    Io(PathBuf, std::io::Error),
    /// The file is not a valid configuration document.
    Parse(serde_json::Error),
    /// The document parsed but is unusable.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(path) => write!(f, "{} does not exist", path.display()),
            Self::Io(path, e) => write!(f, "cannot read {}: {}", path.display(), e),
            Self::Parse(e) => write!(f, "{}", e),
            Self::Invalid(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(_, e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// A statically known peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub address: Address,
    pub endpoint: SocketAddr,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    #[serde(default)]
    pub address: Option<Address>,
    pub listen: SocketAddr,
    #[serde(default)]
    pub peers: Vec<PeerEntry>,
    #[serde(default = "default_timeout_secs")]
    pub rpc_timeout_secs: u64,
}

impl NodeConfig {
    /// Reads and validates the configuration at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }

        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::parse(&text)
    }

    /// Parses and validates a configuration document.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.rpc_timeout_secs == 0 {
            return Err(ConfigError::Invalid("rpc_timeout_secs must be positive".into()));
        }

        let mut seen = HashSet::new();
        for peer in &self.peers {
            if !seen.insert(peer.address) {
                return Err(ConfigError::Invalid(format!("peer {} listed twice", peer.address)));
            }
            if Some(peer.address) == self.address {
                return Err(ConfigError::Invalid(format!("peer {} is this node", peer.address)));
            }
        }
        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// A TCP transport for `local` that knows every configured peer.
    pub fn tcp_transport(&self, local: Address) -> TcpTransport {
        let transport = TcpTransport::new(local);
        for peer in &self.peers {
            transport.add_route(peer.address, peer.endpoint);
        }
        transport
    }

    /// The configured address, or a fresh random one.
    pub fn address_or_random(&self) -> Address {
        self.address.unwrap_or_else(Address::random)
    }
}
