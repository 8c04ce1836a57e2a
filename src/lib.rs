//! The voter side of Raft leader election.
//!
//! [`state::ServerState`] holds the election state of one server and decides votes; [`voter::Voter`]
//! guards it with a single lock so the decision is atomic with respect to every other state change;
//! [`node::Node`] drives the election timer and the candidate side as an actix actor.

pub type ServerId = u8;
/// Time is divided into terms, and each term begins with an election. After a successful election, a single leader
/// manages the cluster until the end of the term. Some elections fail, in which case the term ends without choosing a leader.
/// The transitions between terms may be observed at different times on different servers.
pub type Term = u64;

pub mod config;
pub mod error;
pub mod log;
pub mod node;
pub mod rpc;
pub mod state;
pub mod transport;
pub mod voter;

pub use config::Config;
pub use error::{ConfigError, TransportError};
pub use state::{ElectionOutcome, HardState, Role, ServerState, VoteDecision};
pub use voter::Voter;
