use super::log::{Index, Item, Log, LogPosition};
use super::rpc::{RequestVoteRequest, RequestVoteResponse};
use super::state::{ElectionOutcome, HardState, Persistent, Role, ServerState, VoteDecision};
use super::{ServerId, Term};
use ::log::{debug, info, trace};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared handle on one server's [`ServerState`].
///
/// Vote requests, heartbeats, election timeouts and log appends may arrive on different tasks or threads; each of
/// them runs start to finish under the one lock, so a vote decision always sees term, vote and log together.
/// Logging happens after the lock is released.
pub struct Voter<L> {
    id: ServerId,
    state: Arc<Mutex<ServerState<L>>>,
}

impl<L> Clone for Voter<L> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            state: self.state.clone(),
        }
    }
}

impl<L: Log + Default> Voter<L> {
    pub fn with_empty_log(id: ServerId) -> Self {
        Self::new(id, Persistent::default())
    }
}

impl<L: Log> Voter<L> {
    pub fn new(id: ServerId, persistent_state: Persistent<L>) -> Self {
        Self {
            id,
            state: Arc::new(Mutex::new(ServerState::new(persistent_state))),
        }
    }

    pub fn id(&self) -> ServerId {
        self.id
    }

    // State is only changed through `ServerState` methods which cannot leave it half updated, so a panic in
    // another holder does not make it unusable.
    fn lock(&self) -> MutexGuard<'_, ServerState<L>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` inside the critical section, for collaborators which need several steps to be atomic
    pub fn with_state<R>(&self, f: impl FnOnce(&mut ServerState<L>) -> R) -> R {
        f(&mut self.lock())
    }

    /// Handle a RequestVote RPC
    pub fn decide_vote(&self, req: &RequestVoteRequest) -> RequestVoteResponse {
        let (previous_term, res, decision) = {
            let mut state = self.lock();
            let previous_term = state.current_term();
            let (res, decision) = state.receive_request_vote(req);
            (previous_term, res, decision)
        };
        if res.term > previous_term {
            debug!(
                "{}; term {} -> {} from vote request of {}",
                self.id, previous_term, res.term, req.candidate_id
            );
        }
        match decision {
            VoteDecision::Granted => debug!(
                "{}; granted vote to {} in term {}",
                self.id, req.candidate_id, res.term
            ),
            VoteDecision::StaleTerm { current_term } => debug!(
                "{}; denied vote to {}: its term {} is behind {}",
                self.id, req.candidate_id, req.term, current_term
            ),
            VoteDecision::AlreadyVoted { voted_for } => debug!(
                "{}; denied vote to {}: already voted for {} in term {}",
                self.id, req.candidate_id, voted_for, res.term
            ),
            VoteDecision::LogBehind { own_last } => debug!(
                "{}; denied vote to {}: its log {:?} is behind ours {:?}",
                self.id,
                req.candidate_id,
                req.last_log(),
                own_last
            ),
        }
        res
    }

    /// Any message carrying a term newer than ours; returns whether we moved to it
    pub fn observe_term(&self, term: Term) -> bool {
        let advanced = self.lock().observe_term(term);
        if advanced {
            debug!("{}; observed newer term {}, now a follower", self.id, term);
        }
        advanced
    }

    /// A leader of `term` made itself known; returns whether we follow it
    pub fn follow(&self, term: Term) -> bool {
        let following = self.lock().follow(term);
        if following {
            trace!("{}; following leader of term {}", self.id, term);
        } else {
            trace!("{}; ignored stale leader of term {}", self.id, term);
        }
        following
    }

    pub fn start_election(&self, num_servers: ServerId) -> RequestVoteRequest {
        let (req, won) = {
            let mut state = self.lock();
            let req = state.start_election(self.id, num_servers);
            (req, state.is_leader())
        };
        info!("{}; became a candidate in term {}", self.id, req.term);
        if won {
            info!("{}; became the leader of term {}", self.id, req.term);
        }
        req
    }

    pub fn receive_vote(
        &self,
        from: ServerId,
        res: RequestVoteResponse,
        num_servers: ServerId,
    ) -> ElectionOutcome {
        let outcome = self.lock().receive_vote(from, res, num_servers);
        match outcome {
            ElectionOutcome::Won => info!("{}; became the leader of term {}", self.id, res.term),
            ElectionOutcome::SteppedDown => info!(
                "{}; {} answered with newer term {}, stepping down",
                self.id, from, res.term
            ),
            ElectionOutcome::Pending | ElectionOutcome::Ignored => trace!(
                "{}; vote from {} ({:?}) -> {:?}",
                self.id,
                from,
                res,
                outcome
            ),
        }
        outcome
    }

    pub fn append(&self, command: L::Command) -> Index {
        self.lock().append(command)
    }

    pub fn append_entries<Entries: IntoIterator<Item = Item<L::Command>>>(
        &self,
        entries: Entries,
    ) -> Index {
        self.lock().append_entries(entries)
    }

    pub fn current_term(&self) -> Term {
        self.lock().current_term()
    }

    pub fn voted_for(&self) -> Option<ServerId> {
        self.lock().voted_for()
    }

    pub fn hard_state(&self) -> HardState {
        self.lock().hard_state()
    }

    pub fn role(&self) -> Role {
        self.lock().role().clone()
    }

    pub fn last_log_position(&self) -> Option<LogPosition> {
        self.lock().last_log_position()
    }
}
