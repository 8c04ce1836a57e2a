use super::error::TransportError;
use super::rpc::{RequestVoteRequest, RequestVoteResponse};
use super::ServerId;
use futures::future::LocalBoxFuture;

pub type VoteReply = Result<RequestVoteResponse, TransportError>;

/// Delivers vote requests to peers.
///
/// A call resolves once a reply arrived or the transport gave up on it. It is never retried here; an `Err` means
/// nothing was learnt from that peer, not that it denied the vote.
pub trait Transport {
    fn request_vote(
        &self,
        peer: ServerId,
        req: RequestVoteRequest,
    ) -> LocalBoxFuture<'static, VoteReply>;
}
