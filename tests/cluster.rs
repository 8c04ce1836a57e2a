//! Clusters of `Node` actors talking through an in-memory broker which can partition servers and drop messages

use actix::prelude::*;
use futures::future::{join_all, LocalBoxFuture};
use log::{info, trace};
use raft_voter::config::ElectionTimeout;
use raft_voter::log::InVec;
use raft_voter::node::{GetStatus, LeaderHeartbeat, Node, Status};
use raft_voter::rpc::RequestVoteRequest;
use raft_voter::transport::{Transport, VoteReply};
use raft_voter::{Config, ServerId, Term, TransportError, Voter};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::delay_for;

type TestNode = Node<InVec<u32>, BrokerTransport>;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Routes vote requests between the nodes of a cluster
#[derive(Default)]
struct ClusterBroker {
    addrs: HashMap<ServerId, Addr<TestNode>>,
    partitioned: HashSet<ServerId>,
    /// chance of losing any one request, 0 to 1
    loss: f64,
}

impl Actor for ClusterBroker {
    type Context = Context<Self>;
}

struct Register(ServerId, Addr<TestNode>);

impl Message for Register {
    type Result = ();
}

impl Handler<Register> for ClusterBroker {
    type Result = ();

    fn handle(&mut self, Register(id, addr): Register, _ctx: &mut Self::Context) -> Self::Result {
        self.addrs.insert(id, addr);
    }
}

/// Cut a server off from everyone else, or reconnect it
struct Partition(ServerId, bool);

impl Message for Partition {
    type Result = ();
}

impl Handler<Partition> for ClusterBroker {
    type Result = ();

    fn handle(&mut self, Partition(id, cut): Partition, _ctx: &mut Self::Context) -> Self::Result {
        if cut {
            self.partitioned.insert(id);
        } else {
            self.partitioned.remove(&id);
        }
    }
}

struct Routed {
    from: ServerId,
    to: ServerId,
    req: RequestVoteRequest,
}

impl Message for Routed {
    type Result = VoteReply;
}

impl Handler<Routed> for ClusterBroker {
    type Result = ResponseFuture<VoteReply>;

    fn handle(&mut self, Routed { from, to, req }: Routed, _ctx: &mut Self::Context) -> Self::Result {
        let addr = match self.addrs.get(&to) {
            Some(addr) if !self.partitioned.contains(&from) && !self.partitioned.contains(&to) => {
                addr.clone()
            }
            _ => return Box::pin(async move { Err(TransportError::Unreachable(to)) }),
        };
        let rand: f64 = random_number::rand::random();
        if rand < self.loss {
            return Box::pin(async move { Err(TransportError::Dropped(to)) });
        }
        trace!("R; {} -> {} - {:?}", from, to, req);
        let request = addr.send(req);
        Box::pin(async move {
            let res = request.await.map_err(|_| TransportError::Dropped(to));
            trace!("R; {} <- {} - {:?}", from, to, res);
            res
        })
    }
}

struct BrokerTransport {
    own_id: ServerId,
    broker: Addr<ClusterBroker>,
}

impl Transport for BrokerTransport {
    fn request_vote(&self, peer: ServerId, req: RequestVoteRequest) -> LocalBoxFuture<'static, VoteReply> {
        let request = self.broker.send(Routed {
            from: self.own_id,
            to: peer,
            req,
        });
        Box::pin(async move {
            match request.await {
                Ok(reply) => reply,
                Err(_) => Err(TransportError::Dropped(peer)),
            }
        })
    }
}

struct Cluster {
    broker: Addr<ClusterBroker>,
    nodes: Vec<Addr<TestNode>>,
}

impl Cluster {
    async fn start(size: ServerId, loss: f64) -> Cluster {
        let broker = ClusterBroker {
            loss,
            ..ClusterBroker::default()
        }
        .start();
        let mut nodes = vec![];
        for id in 0..size {
            let config = Config::for_cluster(id, size).election_timeout(ElectionTimeout::new(100, 200));
            let transport = BrokerTransport {
                own_id: id,
                broker: broker.clone(),
            };
            let addr = Node::new(config, Voter::with_empty_log(id), transport)
                .unwrap()
                .start();
            broker.send(Register(id, addr.clone())).await.unwrap();
            nodes.push(addr);
        }
        Cluster { broker, nodes }
    }

    async fn statuses(&self) -> Vec<Status> {
        join_all(self.nodes.iter().map(|addr| addr.send(GetStatus)))
            .await
            .into_iter()
            .map(|status| status.unwrap())
            .collect()
    }

    /// Poll the cluster for `duration`, recording every (term, leader) seen; panics on two leaders in one term
    async fn watch(&self, duration: Duration, leaders: &mut HashMap<Term, ServerId>) {
        let step = Duration::from_millis(5);
        let mut waited = Duration::from_millis(0);
        while waited < duration {
            for status in self.statuses().await {
                if status.is_leader() {
                    let leader = *leaders.entry(status.term).or_insert(status.id);
                    assert_eq!(
                        leader, status.id,
                        "two leaders in term {}: {} and {}",
                        status.term, leader, status.id
                    );
                }
            }
            delay_for(step).await;
            waited += step;
        }
    }

    /// Act as the current leader's heartbeat for `duration`, keeping the other servers from timing out
    async fn heartbeat(&self, duration: Duration) {
        let step = Duration::from_millis(10);
        let mut waited = Duration::from_millis(0);
        while waited < duration {
            let statuses = self.statuses().await;
            if let Some(leader) = statuses.iter().find(|s| s.is_leader()) {
                for addr in &self.nodes {
                    addr.send(LeaderHeartbeat {
                        term: leader.term,
                        leader_id: leader.id,
                    })
                    .await
                    .unwrap();
                }
            }
            delay_for(step).await;
            waited += step;
        }
    }

    async fn current_leader(&self) -> Option<Status> {
        let statuses = self.statuses().await;
        let top_term = statuses.iter().map(|s| s.term).max()?;
        statuses
            .into_iter()
            .find(|s| s.is_leader() && s.term == top_term)
    }
}

#[test]
fn elects_a_leader() {
    init_logger();
    let mut system = System::new("elects");
    system.block_on(async {
        let cluster = Cluster::start(3, 0.0).await;
        let mut leaders = HashMap::new();
        cluster.watch(Duration::from_millis(1000), &mut leaders).await;
        info!("leaders by term: {:?}", leaders);
        assert!(!leaders.is_empty(), "no leader elected");
    });
}

#[test]
fn one_leader_per_term_in_big_cluster() {
    init_logger();
    let mut system = System::new("big");
    system.block_on(async {
        let cluster = Cluster::start(9, 0.0).await;
        let mut leaders = HashMap::new();
        cluster.watch(Duration::from_millis(1500), &mut leaders).await;
        assert!(!leaders.is_empty(), "no leader elected");
    });
}

#[test]
fn one_leader_per_term_on_lossy_network() {
    init_logger();
    let mut system = System::new("lossy");
    system.block_on(async {
        let cluster = Cluster::start(5, 0.3).await;
        let mut leaders = HashMap::new();
        cluster.watch(Duration::from_millis(1500), &mut leaders).await;
        info!("leaders by term: {:?}", leaders);
    });
}

#[test]
fn heartbeats_keep_the_leader() {
    init_logger();
    let mut system = System::new("stable");
    system.block_on(async {
        let cluster = Cluster::start(3, 0.0).await;
        let mut leader = None;
        for _ in 0..50 {
            cluster.heartbeat(Duration::from_millis(50)).await;
            leader = cluster.current_leader().await;
            if leader.is_some() {
                break;
            }
        }
        let leader = leader.expect("no leader elected");
        cluster.heartbeat(Duration::from_millis(600)).await;
        let still = cluster.current_leader().await.expect("leader lost");
        assert_eq!((still.id, still.term), (leader.id, leader.term));
        for status in cluster.statuses().await {
            assert_eq!(status.term, leader.term);
        }
    });
}

#[test]
fn partitioned_leader_is_replaced() {
    init_logger();
    let mut system = System::new("partition");
    system.block_on(async {
        let cluster = Cluster::start(5, 0.0).await;
        let mut first = None;
        for _ in 0..50 {
            cluster.heartbeat(Duration::from_millis(50)).await;
            first = cluster.current_leader().await;
            if first.is_some() {
                break;
            }
        }
        let first = first.expect("no leader elected");
        cluster.broker.send(Partition(first.id, true)).await.unwrap();

        let mut leaders = HashMap::new();
        cluster.watch(Duration::from_millis(1500), &mut leaders).await;
        let replaced = leaders
            .iter()
            .any(|(&term, &id)| term > first.term && id != first.id);
        assert!(replaced, "no new leader after partition: {:?}", leaders);

        // back in contact, the old leader learns of the newer term as soon as someone asks for its vote
        cluster.broker.send(Partition(first.id, false)).await.unwrap();
        cluster.watch(Duration::from_millis(1000), &mut leaders).await;
        let old = &cluster.statuses().await[first.id as usize];
        assert!(old.term > first.term);
    });
}
