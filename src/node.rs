//! One server as an actix actor: answers vote requests through its [`Voter`], runs the election timer and asks its
//! peers for votes when it fires.

use super::config::Config;
use super::error::ConfigError;
use super::log::Log;
use super::rpc::{RequestVoteRequest, RequestVoteResponse};
use super::state::{ElectionOutcome, Role};
use super::transport::{Transport, VoteReply};
use super::voter::Voter;
use super::{ServerId, Term};
use ::log::{trace, warn};
use actix::prelude::*;

impl Message for RequestVoteRequest {
    type Result = RequestVoteResponse;
}

/// No messages have been received over the election timeout
#[derive(Message)]
#[rtype(result = "()")]
pub struct ElectionTimeout;

/// Any message seen carrying this term; answers whether our term advanced
pub struct ObserveTerm(pub Term);

impl Message for ObserveTerm {
    type Result = bool;
}

/// A leader made itself known; answers our term, so a stale leader can learn about newer terms
pub struct LeaderHeartbeat {
    pub term: Term,
    pub leader_id: ServerId,
}

impl Message for LeaderHeartbeat {
    type Result = Term;
}

pub struct GetStatus;

impl Message for GetStatus {
    type Result = Status;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub id: ServerId,
    pub term: Term,
    pub voted_for: Option<ServerId>,
    pub role: Role,
}

impl Status {
    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }
}

/// A peer's answer to our vote request arrived, or its transport gave up
#[derive(Message)]
#[rtype(result = "()")]
pub struct VoteReceived {
    from: ServerId,
    term: Term,
    reply: VoteReply,
}

pub struct Node<L, T> {
    config: Config,
    voter: Voter<L>,
    transport: T,
    election_timer: Option<SpawnHandle>,
}

impl<L, T> Node<L, T>
where
    L: Log + 'static,
    T: Transport + Unpin + 'static,
{
    pub fn new(config: Config, voter: Voter<L>, transport: T) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            voter,
            transport,
            election_timer: None,
        })
    }

    fn id(&self) -> ServerId {
        self.config.server_id
    }

    fn cancel_election_timer(&mut self, ctx: &mut Context<Self>) {
        if let Some(handle) = self.election_timer.take() {
            ctx.cancel_future(handle);
        }
    }

    fn reset_election_timer(&mut self, ctx: &mut Context<Self>) {
        self.cancel_election_timer(ctx);
        let timeout = self.config.election_timeout.random();
        self.election_timer = Some(ctx.notify_later(ElectionTimeout, timeout));
    }

    /// Leaders do not time out; everyone else has a timer running, restarted when `restart` is set
    fn update_election_timer(&mut self, ctx: &mut Context<Self>, restart: bool) {
        if self.voter.with_state(|state| state.is_leader()) {
            self.cancel_election_timer(ctx);
        } else if restart || self.election_timer.is_none() {
            self.reset_election_timer(ctx);
        }
    }
}

impl<L, T> Actor for Node<L, T>
where
    L: Log + 'static,
    T: Transport + Unpin + 'static,
{
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.update_election_timer(ctx, true);
    }
}

/// # Followers (§5.2):
/// -- If election timeout elapses without receiving AppendEntries RPC from current leader or granting vote to candidate: convert to candidate
/// # Candidates (§5.2):
/// -- If election timeout elapses: start new election
impl<L, T> Handler<ElectionTimeout> for Node<L, T>
where
    L: Log + 'static,
    T: Transport + Unpin + 'static,
{
    type Result = ();

    fn handle(&mut self, _: ElectionTimeout, ctx: &mut Self::Context) -> Self::Result {
        self.election_timer = None;
        let req = self.voter.start_election(self.config.num_servers());
        self.update_election_timer(ctx, true);

        let own_id = self.id();
        let term = req.term;
        for &peer in &self.config.peers {
            trace!("{}; requesting vote from {} for term {}", own_id, peer, term);
            let request = self.transport.request_vote(peer, req.clone());
            ctx.spawn(
                fut::wrap_future::<_, Self>(request).map(move |reply, _actor, ctx: &mut Self::Context| {
                    ctx.notify(VoteReceived {
                        from: peer,
                        term,
                        reply,
                    })
                }),
            );
        }
    }
}

impl<L, T> Handler<VoteReceived> for Node<L, T>
where
    L: Log + 'static,
    T: Transport + Unpin + 'static,
{
    type Result = ();

    fn handle(
        &mut self,
        VoteReceived { from, term, reply }: VoteReceived,
        ctx: &mut Self::Context,
    ) -> Self::Result {
        let res = match reply {
            Ok(res) => res,
            Err(e) => {
                warn!("{}; no answer to vote request for term {}: {}", self.id(), term, e);
                return;
            }
        };
        match self
            .voter
            .receive_vote(from, res, self.config.num_servers())
        {
            ElectionOutcome::Won => self.cancel_election_timer(ctx),
            ElectionOutcome::SteppedDown => self.update_election_timer(ctx, true),
            ElectionOutcome::Pending | ElectionOutcome::Ignored => {}
        }
    }
}

impl<L, T> Handler<RequestVoteRequest> for Node<L, T>
where
    L: Log + 'static,
    T: Transport + Unpin + 'static,
{
    type Result = MessageResult<RequestVoteRequest>;

    fn handle(&mut self, req: RequestVoteRequest, ctx: &mut Self::Context) -> Self::Result {
        trace!("{}; received vote request from {}", self.id(), req.candidate_id);
        let res = self.voter.decide_vote(&req);
        // only granting a vote holds back our own candidacy
        self.update_election_timer(ctx, res.vote_granted);
        MessageResult(res)
    }
}

impl<L, T> Handler<ObserveTerm> for Node<L, T>
where
    L: Log + 'static,
    T: Transport + Unpin + 'static,
{
    type Result = MessageResult<ObserveTerm>;

    fn handle(&mut self, ObserveTerm(term): ObserveTerm, ctx: &mut Self::Context) -> Self::Result {
        let advanced = self.voter.observe_term(term);
        self.update_election_timer(ctx, advanced);
        MessageResult(advanced)
    }
}

/// If the leader’s term is at least as large as our current term, we recognize the leader as legitimate and
/// follow it; an older leader is ignored
impl<L, T> Handler<LeaderHeartbeat> for Node<L, T>
where
    L: Log + 'static,
    T: Transport + Unpin + 'static,
{
    type Result = MessageResult<LeaderHeartbeat>;

    fn handle(
        &mut self,
        LeaderHeartbeat { term, leader_id }: LeaderHeartbeat,
        ctx: &mut Self::Context,
    ) -> Self::Result {
        if self.voter.follow(term) {
            trace!("{}; heartbeat from {} in term {}", self.id(), leader_id, term);
            self.update_election_timer(ctx, true);
        }
        MessageResult(self.voter.current_term())
    }
}

impl<L, T> Handler<GetStatus> for Node<L, T>
where
    L: Log + 'static,
    T: Transport + Unpin + 'static,
{
    type Result = MessageResult<GetStatus>;

    fn handle(&mut self, _: GetStatus, _ctx: &mut Self::Context) -> Self::Result {
        let id = self.id();
        MessageResult(self.voter.with_state(|state| Status {
            id,
            term: state.current_term(),
            voted_for: state.voted_for(),
            role: state.role().clone(),
        }))
    }
}
