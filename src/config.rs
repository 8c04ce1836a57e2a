use super::error::ConfigError;
use super::ServerId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::convert::TryFrom;
use std::time::Duration;

const ELECTION_TIMEOUT_MIN_MILLIS: u64 = 150;
const ELECTION_TIMEOUT_MAX_MILLIS: u64 = 300;

/// Static settings of one server in a cluster
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    pub server_id: ServerId,
    /// every other server of the cluster
    #[serde(default)]
    pub peers: Vec<ServerId>,
    #[serde(default)]
    pub election_timeout: ElectionTimeout,
}

/// Election timeouts are chosen randomly from a fixed interval (§5.2)
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ElectionTimeout {
    #[serde(default = "default_min_millis")]
    pub min_millis: u64,
    #[serde(default = "default_max_millis")]
    pub max_millis: u64,
}

fn default_min_millis() -> u64 {
    ELECTION_TIMEOUT_MIN_MILLIS
}

fn default_max_millis() -> u64 {
    ELECTION_TIMEOUT_MAX_MILLIS
}

impl Default for ElectionTimeout {
    fn default() -> Self {
        Self {
            min_millis: ELECTION_TIMEOUT_MIN_MILLIS,
            max_millis: ELECTION_TIMEOUT_MAX_MILLIS,
        }
    }
}

impl ElectionTimeout {
    pub fn new(min_millis: u64, max_millis: u64) -> Self {
        Self {
            min_millis,
            max_millis,
        }
    }

    pub fn random(&self) -> Duration {
        let rand: f64 = random_number::rand::random();
        let spread = self.max_millis.saturating_sub(self.min_millis) as f64;
        Duration::from_millis(self.min_millis + (rand * spread) as u64)
    }
}

impl Config {
    pub fn new(server_id: ServerId, peers: Vec<ServerId>) -> Self {
        Self {
            server_id,
            peers,
            election_timeout: ElectionTimeout::default(),
        }
    }

    /// Config for server `server_id` of a cluster with servers `0..num_servers`
    pub fn for_cluster(server_id: ServerId, num_servers: ServerId) -> Self {
        let peers = (0..num_servers).filter(|&id| id != server_id).collect();
        Self::new(server_id, peers)
    }

    pub fn election_timeout(mut self, election_timeout: ElectionTimeout) -> Self {
        self.election_timeout = election_timeout;
        self
    }

    /// Size of the full cluster, this server included
    pub fn num_servers(&self) -> ServerId {
        ServerId::try_from(self.peers.len() + 1).unwrap_or(ServerId::MAX)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ElectionTimeout {
            min_millis,
            max_millis,
        } = self.election_timeout;
        if min_millis == 0 || min_millis > max_millis {
            return Err(ConfigError::ElectionTimeoutRange {
                min_millis,
                max_millis,
            });
        }
        if self.peers.len() >= ServerId::MAX as usize {
            return Err(ConfigError::TooManyPeers(self.peers.len()));
        }
        let mut seen = HashSet::new();
        for &peer in &self.peers {
            if peer == self.server_id {
                return Err(ConfigError::SelfAsPeer(peer));
            }
            if !seen.insert(peer) {
                return Err(ConfigError::DuplicatePeer(peer));
            }
        }
        Ok(())
    }
}
