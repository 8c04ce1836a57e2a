use super::log::{Index, Item, Log, LogPosition};
use super::rpc::{RequestVoteRequest, RequestVoteResponse};
use super::{ServerId, Term};
use core::cmp::Ordering;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Persistent state on all servers: (Updated on stable storage before responding to RPCs)
#[derive(Debug, Default)]
pub struct Persistent<Log> {
    /// latest term server has seen
    pub current_term: Term,
    /// candidateId that received vote in current term
    pub voted_for: Option<ServerId>,
    pub log: Log,
}

impl<Log> Persistent<Log> {
    /// Moving to a newer term forgets the vote cast in the old one.
    /// # Panics
    /// In case the term tries to decrease
    fn set_current_term(&mut self, current_term: Term) {
        assert!(
            current_term >= self.current_term,
            "Current term must increase monotonically, tried to decrease from {} to {}",
            self.current_term,
            current_term
        );
        if current_term > self.current_term {
            self.voted_for = None;
        }
        self.current_term = current_term;
    }

    pub fn hard_state(&self) -> HardState {
        HardState {
            current_term: self.current_term,
            voted_for: self.voted_for,
        }
    }
}

/// The part of [`Persistent`] that voting changes, and that has to reach stable storage before a vote response
/// is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HardState {
    pub current_term: Term,
    pub voted_for: Option<ServerId>,
}

/// Server roles. Followers only respond to requests from other servers. If a follower receives no communication,
/// it becomes a candidate and initiates an election. A candidate that receives votes from a majority of the full
/// cluster becomes the new leader. Leaders typically operate until they fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Follower,
    /// Servers which granted their vote this term, the candidate included
    Candidate(BTreeSet<ServerId>),
    Leader,
}

impl Default for Role {
    fn default() -> Self {
        Self::Follower
    }
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Follower => "follower",
            Role::Candidate(_) => "candidate",
            Role::Leader => "leader",
        }
    }
}

/// Why a vote request got the answer it did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteDecision {
    Granted,
    /// the candidate is behind our term
    StaleTerm { current_term: Term },
    /// a different candidate already has our vote this term
    AlreadyVoted { voted_for: ServerId },
    /// our log is more up-to-date than the candidate's
    LogBehind { own_last: Option<LogPosition> },
}

impl VoteDecision {
    pub fn is_granted(&self) -> bool {
        *self == VoteDecision::Granted
    }
}

/// Effect of a vote response on a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// a majority has voted for us, we are now leader
    Won,
    /// still a candidate, no majority yet
    Pending,
    /// the response carried a higher term, we are a follower in that term now
    SteppedDown,
    /// we are not a candidate in the response's term
    Ignored,
}

/// All of a server's election state, one instance per server. Every mutation goes through `&mut self`, so holding
/// the one exclusive borrow (see [`Voter`](crate::voter::Voter)) makes each operation atomic.
#[derive(Debug, Default)]
pub struct ServerState<Log> {
    role: Role,
    persistent_state: Persistent<Log>,
}

impl<L: Log> ServerState<L> {
    pub fn new(persistent_state: Persistent<L>) -> Self {
        Self {
            role: Role::Follower,
            persistent_state,
        }
    }

    pub fn current_term(&self) -> Term {
        self.persistent_state.current_term
    }

    pub fn voted_for(&self) -> Option<ServerId> {
        self.persistent_state.voted_for
    }

    pub fn hard_state(&self) -> HardState {
        self.persistent_state.hard_state()
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn is_follower(&self) -> bool {
        Role::Follower == self.role
    }

    pub fn is_candidate(&self) -> bool {
        matches!(self.role, Role::Candidate(_))
    }

    pub fn is_leader(&self) -> bool {
        Role::Leader == self.role
    }

    pub fn log(&self) -> &L {
        &self.persistent_state.log
    }

    pub fn last_log_position(&self) -> Option<LogPosition> {
        self.persistent_state.log.last_position()
    }

    /// If RPC request or response contains term T > currentTerm: set currentTerm = T, convert to follower (§5.1)
    ///
    /// Returns whether the term advanced.
    pub fn observe_term(&mut self, term: Term) -> bool {
        if term > self.persistent_state.current_term {
            self.persistent_state.set_current_term(term);
            self.role = Role::Follower;
            true
        } else {
            false
        }
    }

    /// Another server is acknowledged as leader of `term`
    ///
    /// A leader of an older term is ignored, as is one claiming our own term while we lead it. Returns whether we
    /// now follow.
    pub fn follow(&mut self, term: Term) -> bool {
        let current_term = self.persistent_state.current_term;
        if term < current_term || (term == current_term && self.is_leader()) {
            return false;
        }
        self.persistent_state.set_current_term(term);
        self.role = Role::Follower;
        true
    }

    /// No messages have been received over the election timeout. Start a new election term
    /// # Candidates (§5.2):
    /// - On conversion to candidate, start election:
    /// -- Increment currentTerm
    /// -- Vote for self
    /// -- Reset election timer (to be handled by caller)
    /// -- Send RequestVote RPCs to all other servers
    ///
    /// A cluster of one wins straight away.
    pub fn start_election(&mut self, server_id: ServerId, num_servers: ServerId) -> RequestVoteRequest {
        // Increment currentTerm
        let term = self.persistent_state.current_term + 1;
        self.persistent_state.set_current_term(term);
        // Vote for self
        self.persistent_state.voted_for = Some(server_id);
        let mut votes = BTreeSet::new();
        votes.insert(server_id);
        self.role = if majority(votes.len(), num_servers) {
            Role::Leader
        } else {
            Role::Candidate(votes)
        };
        // Send RequestVote RPCs to all other servers
        RequestVoteRequest {
            term,
            candidate_id: server_id,
            last_log_index: self.persistent_state.log.last_log_index(),
            last_log_term: self.persistent_state.log.last_log_term(),
        }
    }

    /// A peer answered our vote request.
    /// - If votes received from majority of servers: become leader
    /// - A response with a higher term ends the candidacy, whatever order responses arrive in
    ///
    /// Votes are counted per server, so a duplicated grant counts once.
    pub fn receive_vote(
        &mut self,
        from: ServerId,
        res: RequestVoteResponse,
        num_servers: ServerId,
    ) -> ElectionOutcome {
        if self.observe_term(res.term) {
            return ElectionOutcome::SteppedDown;
        }
        let current_term = self.persistent_state.current_term;
        let won = match &mut self.role {
            Role::Candidate(votes) if res.term == current_term => {
                if res.vote_granted {
                    votes.insert(from);
                }
                majority(votes.len(), num_servers)
            }
            _ => return ElectionOutcome::Ignored,
        };
        if won {
            self.role = Role::Leader;
            ElectionOutcome::Won
        } else {
            ElectionOutcome::Pending
        }
    }

    /// Requested to vote for candidate
    /// 1.  Reply false if term < currentTerm (§5.1)
    /// 2.  If votedFor is null or candidateId, and candidate’s log is at least as up-to-date as receiver’s log, grant vote (§5.2, §5.4)
    pub fn receive_request_vote(
        &mut self,
        req: &RequestVoteRequest,
    ) -> (RequestVoteResponse, VoteDecision) {
        // 1.  Reply false if term < currentTerm (§5.1)
        if req.term < self.persistent_state.current_term {
            let current_term = self.persistent_state.current_term;
            return (
                self.vote_response(false),
                VoteDecision::StaleTerm { current_term },
            );
        }
        // a newer term clears our vote before it is considered
        self.observe_term(req.term);
        // 2.  If votedFor is null or candidateId, and candidate’s log is at least as up-to-date as receiver’s log, grant vote (§5.2, §5.4)
        let log = &self.persistent_state.log;
        let decision = match self.persistent_state.voted_for {
            Some(voted_for) if voted_for != req.candidate_id => {
                VoteDecision::AlreadyVoted { voted_for }
            }
            _ if log.cmp_tail(req.last_log()) == Ordering::Greater => VoteDecision::LogBehind {
                own_last: log.last_position(),
            },
            _ => {
                self.persistent_state.voted_for = Some(req.candidate_id);
                VoteDecision::Granted
            }
        };
        (self.vote_response(decision.is_granted()), decision)
    }

    fn vote_response(&self, vote_granted: bool) -> RequestVoteResponse {
        RequestVoteResponse {
            term: self.persistent_state.current_term,
            vote_granted,
        }
    }

    /// Append a command in the current term, returns its index
    pub fn append(&mut self, command: L::Command) -> Index {
        let term = self.persistent_state.current_term;
        self.persistent_state.log.append(term, command)
    }

    /// Append entries received from a leader, returns the index of the last one
    pub fn append_entries<Entries: IntoIterator<Item = Item<L::Command>>>(
        &mut self,
        entries: Entries,
    ) -> Index {
        let log = &mut self.persistent_state.log;
        for Item { term, command } in entries {
            log.append(term, command);
        }
        log.last_log_index()
    }
}

fn majority(votes: usize, num_servers: ServerId) -> bool {
    votes > num_servers as usize / 2
}
