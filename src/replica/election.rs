//! Leader election: starting a campaign, granting or refusing votes, and
//! becoming leader once a quorum is in (design §4.2).

use super::{Replica, Role};
use crate::message::{Body, Message};
use crate::pf_info;
use crate::transport::Transport;
use crate::utils::RaftKvResult;

impl<T: Transport> Replica<T> {
    /// Fires when the election timer expires on a FOLLOWER or CANDIDATE.
    /// Bumps the term, votes for self, and asks everyone else for a vote.
    pub(super) async fn start_election(&mut self) -> RaftKvResult<()> {
        self.term += 1;
        self.role = Role::Candidate;
        self.voted_for = Some(self.id.clone());
        self.votes_received.clear();
        self.votes_received.insert(self.id.clone());
        self.reset_election_timer();

        pf_info!("election timeout, starting campaign for term {}", self.term);

        self.broadcast(Body::VoteRequest {
            term: self.term,
            candidate: self.id.clone(),
            last_index: self.log.len(),
            last_term: self.log.last_term(),
        })
        .await
    }

    pub(super) async fn handle_vote_request(&mut self, msg: Message) -> RaftKvResult<()> {
        let (term, candidate, last_index, last_term) = match &msg.body {
            Body::VoteRequest { term, candidate, last_index, last_term } => {
                (*term, candidate.clone(), *last_index, *last_term)
            }
            _ => unreachable!("dispatch only routes VoteRequest here"),
        };

        let mut granted = false;
        if term == self.term {
            let log_ok = if self.log.is_empty() {
                last_index == 0
            } else {
                let my_last_term = self.log.last_term().unwrap();
                let cand_last_term = last_term.unwrap_or(0);
                cand_last_term > my_last_term
                    || (cand_last_term == my_last_term && last_index >= self.log.len())
            };
            let vote_ok = match &self.voted_for {
                None => true,
                Some(v) => v == &candidate,
            };
            if vote_ok && log_ok {
                self.voted_for = Some(candidate.clone());
                granted = true;
                self.reset_election_timer();
            }
        }

        pf_info!(
            "vote request from {} at term {}: granted={}",
            candidate,
            term,
            granted
        );
        self.send(Message::new(
            self.id.clone(),
            candidate,
            self.current_leader.clone(),
            Body::VoteResponse { term: self.term, granted },
        ))
        .await
    }

    pub(super) async fn handle_vote_response(&mut self, msg: Message) -> RaftKvResult<()> {
        let (term, granted) = match msg.body {
            Body::VoteResponse { term, granted } => (term, granted),
            _ => unreachable!("dispatch only routes VoteResponse here"),
        };

        if term > self.term {
            // already stepped down to FOLLOWER by the generic term check
            return Ok(());
        }
        if self.role == Role::Candidate && term == self.term && granted {
            self.votes_received.insert(msg.src.clone());
            if self.votes_received.len() >= self.quorum() {
                self.become_leader().await?;
            }
        }
        Ok(())
    }

    async fn become_leader(&mut self) -> RaftKvResult<()> {
        self.role = Role::Leader;
        self.current_leader = self.id.clone();
        let log_len = self.log.len();
        for p in self.peers.clone() {
            self.next_index.insert(p.clone(), log_len);
            self.match_index.insert(p, 0);
        }
        self.match_index.insert(self.id.clone(), log_len);

        pf_info!("won election, leader for term {}", self.term);

        self.broadcast_heartbeat().await?;
        self.drain_pending_as_redirects().await
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ReplicaConfig;
    use crate::message::{Body, Message, BROADCAST_ID};
    use crate::replica::{Replica, Role};
    use crate::transport::{ChannelTransport, Transport};
    use std::time::Duration;

    fn trio() -> Vec<Replica<ChannelTransport>> {
        let ids = vec!["r0".to_string(), "r1".to_string(), "r2".to_string()];
        let transports = ChannelTransport::cluster(&ids);
        ids.iter()
            .cloned()
            .zip(transports)
            .map(|(id, t)| {
                let peers = ids.iter().cloned().filter(|p| *p != id).collect();
                Replica::new(id, peers, ReplicaConfig::default(), t)
            })
            .collect()
    }

    #[tokio::test]
    async fn election_wins_with_unanimous_votes() {
        let mut cluster = trio();
        cluster[0].start_election().await.unwrap();
        assert_eq!(cluster[0].role(), Role::Candidate);
        assert_eq!(cluster[0].term(), 1);

        // r1 and r2 each receive and answer the VoteRequest.
        for follower in [1usize, 2] {
            let msg = cluster[follower]
                .transport
                .recv_timeout(Duration::from_millis(50))
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(msg.body, Body::VoteRequest { .. }));
            cluster[follower].dispatch(msg).await.unwrap();
        }

        // candidate collects both VoteResponses.
        for _ in 0..2 {
            let msg = cluster[0]
                .transport
                .recv_timeout(Duration::from_millis(50))
                .await
                .unwrap()
                .unwrap();
            cluster[0].dispatch(msg).await.unwrap();
        }

        assert_eq!(cluster[0].role(), Role::Leader);
        assert_eq!(cluster[0].current_leader(), "r0");
    }

    #[tokio::test]
    async fn stale_term_vote_request_is_refused() {
        let mut cluster = trio();
        cluster[0].term = 5;
        let msg = Message::new(
            "r1".into(),
            "r0".into(),
            BROADCAST_ID.into(),
            Body::VoteRequest {
                term: 2,
                candidate: "r1".into(),
                last_index: 0,
                last_term: None,
            },
        );
        cluster[0].dispatch(msg).await.unwrap();
        let reply = cluster[1]
            .transport
            .recv_timeout(Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        match reply.body {
            Body::VoteResponse { term, granted } => {
                assert_eq!(term, 5);
                assert!(!granted);
            }
            other => panic!("expected VoteResponse, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn second_vote_request_same_term_is_refused() {
        let mut cluster = trio();
        let first = Message::new(
            "r1".into(),
            "r0".into(),
            BROADCAST_ID.into(),
            Body::VoteRequest { term: 1, candidate: "r1".into(), last_index: 0, last_term: None },
        );
        cluster[0].dispatch(first).await.unwrap();
        let _ = cluster[1]
            .transport
            .recv_timeout(Duration::from_millis(50))
            .await
            .unwrap();

        let second = Message::new(
            "r2".into(),
            "r0".into(),
            BROADCAST_ID.into(),
            Body::VoteRequest { term: 1, candidate: "r2".into(), last_index: 0, last_term: None },
        );
        cluster[0].dispatch(second).await.unwrap();
        let reply = cluster[2]
            .transport
            .recv_timeout(Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        match reply.body {
            Body::VoteResponse { granted, .. } => assert!(!granted),
            other => panic!("expected VoteResponse, got {:?}", other),
        }
    }
}
