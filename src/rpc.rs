//! Raft servers communicate using remote procedure calls (RPCs). RequestVote RPCs are initiated by candidates
//! during elections (Section 5.2). Delivery is the job of a [`Transport`](crate::transport::Transport); nothing
//! here fixes a wire encoding.

use super::log::{Index, LogPosition};
use super::{ServerId, Term};
use serde::{Deserialize, Serialize};

/// Anything carrying a term; a higher term than our own makes us a follower in that term (§5.1)
pub trait RPCMessage {
    fn term(&self) -> Term;
}

/// Invoked by candidates to gather votes (§5.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVoteRequest {
    /// candidate’s term
    pub term: Term,
    /// candidate requesting vote
    pub candidate_id: ServerId,
    /// index of candidate’s last log entry (§5.4)
    pub last_log_index: Index,
    /// term of candidate’s last log entry (§5.4)
    pub last_log_term: Term,
}

impl RequestVoteRequest {
    pub fn last_log(&self) -> LogPosition {
        LogPosition::new(self.last_log_term, self.last_log_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVoteResponse {
    /// currentTerm, for candidate to update itself
    pub term: Term,
    /// true means candidate received vote
    pub vote_granted: bool,
}

impl RPCMessage for RequestVoteRequest {
    fn term(&self) -> Term {
        self.term
    }
}

impl RPCMessage for RequestVoteResponse {
    fn term(&self) -> Term {
        self.term
    }
}
