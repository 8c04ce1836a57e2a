use super::ServerId;

/// A vote request got no answer. This carries no information about the vote itself: the candidate neither
/// counts it as a denial nor retries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("server {0} is unreachable")]
    Unreachable(ServerId),
    #[error("request to or reply from server {0} was lost")]
    Dropped(ServerId),
    #[error("no reply from server {0} in time")]
    Timeout(ServerId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("election timeout must be a non-empty range, got {min_millis}..={max_millis}ms")]
    ElectionTimeoutRange { min_millis: u64, max_millis: u64 },
    #[error("server {0} lists itself as a peer")]
    SelfAsPeer(ServerId),
    #[error("peer {0} is listed more than once")]
    DuplicatePeer(ServerId),
    #[error("{0} peers do not fit the server id space")]
    TooManyPeers(usize),
}
