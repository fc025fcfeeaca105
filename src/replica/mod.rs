//! The replica state machine: role, term, log, and the single event loop
//! that drives all of it (design §3/§4).
//!
//! Each submodule implements one slice of the (role, message-type) →
//! role' transition table: [`election`] (§4.2), [`replication`] (§4.3,
//! leader side), [`follower`] (§4.4, follower side), [`client_iface`]
//! (§4.6, the get/put surface). This module owns the shared state and the
//! step loop; it deliberately keeps no protocol logic of its own beyond
//! generic term bookkeeping, so that every role transition lives in
//! exactly one place.

mod client_iface;
mod election;
mod follower;
mod replication;

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::client_table::{ClientTable, PendingQueue};
use crate::config::ReplicaConfig;
use crate::kv::KvStore;
use crate::log::Log;
use crate::message::{Body, Message, ReplicaId, BROADCAST_ID};
use crate::pf_info;
use crate::transport::Transport;
use crate::utils::{rand_timeout_ms, set_me, RaftKvResult};

/// A replica's current role, per the {FOLLOWER, CANDIDATE, LEADER} state
/// machine of §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// One replica's full state and its message loop, generic over the
/// transport it talks through so the same code drives both real UDP
/// sockets and the in-memory test cluster.
pub struct Replica<T: Transport> {
    id: ReplicaId,
    peers: Vec<ReplicaId>,
    config: ReplicaConfig,
    transport: T,

    role: Role,
    term: u64,
    voted_for: Option<ReplicaId>,
    log: Log,
    kv: KvStore,
    commit_index: usize,
    current_leader: ReplicaId,

    last_heartbeat: Instant,
    election_timeout: Duration,
    last_heartbeat_sent: Instant,

    votes_received: HashSet<ReplicaId>,
    next_index: HashMap<ReplicaId, usize>,
    match_index: HashMap<ReplicaId, usize>,

    pending: PendingQueue,
    client_table: ClientTable,
}

impl<T: Transport> Replica<T> {
    pub fn new(id: ReplicaId, peers: Vec<ReplicaId>, config: ReplicaConfig, transport: T) -> Self {
        set_me(&id);
        let election_timeout =
            rand_timeout_ms(config.election_timeout_min_ms, config.election_timeout_max_ms);
        Replica {
            id,
            peers,
            config,
            transport,
            role: Role::Follower,
            term: 0,
            voted_for: None,
            log: Log::new(),
            kv: KvStore::new(),
            commit_index: 0,
            current_leader: BROADCAST_ID.to_string(),
            last_heartbeat: Instant::now(),
            election_timeout,
            last_heartbeat_sent: Instant::now(),
            votes_received: HashSet::new(),
            next_index: HashMap::new(),
            match_index: HashMap::new(),
            pending: PendingQueue::new(),
            client_table: ClientTable::new(),
        }
    }

    /// Announces presence to the cluster on startup (§6: "a replica
    /// broadcasts `hello` once its transport is up").
    pub async fn start(&mut self) -> RaftKvResult<()> {
        pf_info!("starting as follower, term {}", self.term);
        self.broadcast(Body::Hello).await
    }

    /// Runs the event loop forever. Callers that need to stop on a signal
    /// should race this future against their own shutdown future instead
    /// of trying to break out of it.
    pub async fn run(&mut self) -> RaftKvResult<()> {
        loop {
            self.step().await?;
        }
    }

    /// Runs exactly one iteration: act on an expired timer if one fired,
    /// then wait for and handle at most one inbound message. Exposed
    /// separately from [`Self::run`] so tests can drive the state machine
    /// deterministically.
    pub async fn step(&mut self) -> RaftKvResult<()> {
        match self.role {
            Role::Leader => {
                let hb = Duration::from_millis(self.config.heartbeat_interval_ms);
                if self.last_heartbeat_sent.elapsed() >= hb {
                    self.broadcast_heartbeat().await?;
                }
                let wait = hb.saturating_sub(self.last_heartbeat_sent.elapsed());
                if let Some(msg) = self.transport.recv_timeout(wait).await? {
                    self.dispatch(msg).await?;
                }
            }
            Role::Follower | Role::Candidate => {
                if self.last_heartbeat.elapsed() >= self.election_timeout {
                    self.start_election().await?;
                }
                let wait = self.election_timeout.saturating_sub(self.last_heartbeat.elapsed());
                if let Some(msg) = self.transport.recv_timeout(wait).await? {
                    self.dispatch(msg).await?;
                }
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, msg: Message) -> RaftKvResult<()> {
        if let Some(t) = msg.body.term() {
            if t > self.term {
                self.become_follower(t);
            }
        }
        match &msg.body {
            Body::Hello => Ok(()),
            Body::Get { .. } => self.handle_get(msg).await,
            Body::Put { .. } => self.handle_put(msg).await,
            Body::VoteRequest { .. } => self.handle_vote_request(msg).await,
            Body::VoteResponse { .. } => self.handle_vote_response(msg).await,
            Body::AppendEntry { .. } => self.handle_append_entry(msg).await,
            Body::AppendEntryResponse { .. } => self.handle_append_entry_response(msg).await,
            Body::Update { .. } => self.handle_update(msg).await,
            Body::Ok { .. } | Body::Redirect { .. } | Body::Fail { .. } => Ok(()),
        }
    }

    fn reset_election_timer(&mut self) {
        self.last_heartbeat = Instant::now();
        self.election_timeout = rand_timeout_ms(
            self.config.election_timeout_min_ms,
            self.config.election_timeout_max_ms,
        );
    }

    /// Invariant 1 (§3): any message carrying a term greater than ours
    /// forces us back to FOLLOWER at that term with a clean vote.
    fn become_follower(&mut self, term: u64) {
        self.role = Role::Follower;
        self.term = term;
        self.voted_for = None;
        self.votes_received.clear();
    }

    fn quorum(&self) -> usize {
        (self.peers.len() + 1) / 2 + 1
    }

    async fn send(&self, msg: Message) -> RaftKvResult<()> {
        self.transport.send(&msg).await
    }

    async fn broadcast(&self, body: Body) -> RaftKvResult<()> {
        let msg = Message::new(
            self.id.clone(),
            BROADCAST_ID.to_string(),
            self.current_leader.clone(),
            body,
        );
        self.transport.send(&msg).await
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn term(&self) -> u64 {
        self.term
    }

    pub fn commit_index(&self) -> usize {
        self.commit_index
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    pub fn current_leader(&self) -> &str {
        &self.current_leader
    }

    pub fn kv_get(&self, key: &str) -> String {
        self.kv.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;

    fn solo_replica(id: &str, peers: &[&str]) -> Replica<ChannelTransport> {
        let all: Vec<ReplicaId> = std::iter::once(id.to_string())
            .chain(peers.iter().map(|p| p.to_string()))
            .collect();
        let mut transports = ChannelTransport::cluster(&all);
        let t = transports.remove(0);
        let peer_ids = peers.iter().map(|p| p.to_string()).collect();
        Replica::new(id.to_string(), peer_ids, ReplicaConfig::default(), t)
    }

    #[test]
    fn quorum_needs_a_strict_majority() {
        let three = solo_replica("r0", &["r1", "r2"]);
        assert_eq!(three.quorum(), 2);
        let five = solo_replica("r0", &["r1", "r2", "r3", "r4"]);
        assert_eq!(five.quorum(), 3);
    }

    #[test]
    fn new_replica_starts_as_follower_at_term_zero() {
        let r = solo_replica("r0", &["r1"]);
        assert_eq!(r.role(), Role::Follower);
        assert_eq!(r.term(), 0);
        assert_eq!(r.commit_index(), 0);
        assert_eq!(r.current_leader(), BROADCAST_ID);
    }
}
