//! Leader-side log replication: building and sending `AppendEntry` batches,
//! handling the responses, and advancing `commit_index` (design §4.3).

use super::{Replica, Role};
use crate::message::{Body, Message};
use crate::pf_debug;
use crate::transport::Transport;
use crate::utils::RaftKvResult;

impl<T: Transport> Replica<T> {
    fn build_append_entry(&self, peer: &str) -> Body {
        let next_index = *self.next_index.get(peer).unwrap_or(&0);
        let gap = self.log.len().saturating_sub(next_index);
        let entries = if gap > self.config.batch_cap {
            Vec::new()
        } else {
            self.log.suffix_from(next_index)
        };
        Body::AppendEntry {
            term: self.term,
            commit_length: self.commit_index,
            entries,
            last_index: next_index,
            last_term: self.log.term_at(next_index),
            kvstore_len: None,
        }
    }

    pub(super) async fn replicate_to_peer(&self, peer: &str) -> RaftKvResult<()> {
        let body = self.build_append_entry(peer);
        self.send(Message::new(
            self.id.clone(),
            peer.to_string(),
            self.current_leader.clone(),
            body,
        ))
        .await
    }

    pub(super) async fn replicate_to_all(&self) -> RaftKvResult<()> {
        for p in self.peers.clone() {
            self.replicate_to_peer(&p).await?;
        }
        Ok(())
    }

    /// Broadcasts an `update` heartbeat and, as a side effect of that being
    /// the leader's only periodic action, resets the heartbeat clock.
    pub(super) async fn broadcast_heartbeat(&mut self) -> RaftKvResult<()> {
        self.last_heartbeat_sent = std::time::Instant::now();
        self.broadcast(Body::Update {
            term: self.term,
            commit_length: self.commit_index,
        })
        .await
    }

    pub(super) async fn handle_append_entry_response(&mut self, msg: Message) -> RaftKvResult<()> {
        let (term, success, log_length) = match msg.body {
            Body::AppendEntryResponse { term, success, log_length } => (term, success, log_length),
            _ => unreachable!("dispatch only routes AppendEntryResponse here"),
        };

        if term > self.term || self.role != Role::Leader {
            return Ok(());
        }

        let peer = msg.src.clone();
        if success {
            let reached = log_length.unwrap_or(0);
            self.match_index.insert(peer.clone(), reached);
            self.next_index.insert(peer, reached);
            self.advance_commit().await?;
        } else {
            let next = self.next_index.get(&peer).copied().unwrap_or(0);
            self.next_index.insert(peer.clone(), next.saturating_sub(1));
            pf_debug!("append rejected by {}, backing off next_index", peer);
            self.replicate_to_peer(&peer).await?;
        }
        Ok(())
    }

    /// Finds the highest index reachable by a current-term, majority-backed
    /// commit, then applies every entry up to it in order. A leader only
    /// ever *directly* commits an entry from its own term (invariant 6); it
    /// may count majorities over older-term entries while scanning, but it
    /// only actually moves `commit_index` past them once a current-term
    /// entry at or after them clears quorum too.
    pub(super) async fn advance_commit(&mut self) -> RaftKvResult<()> {
        let quorum = self.quorum();
        let mut target = self.commit_index;
        for n in (self.commit_index + 1)..=self.log.len() {
            if self.log.term_at(n) != Some(self.term) {
                continue;
            }
            let count = self.match_index.values().filter(|&&m| m >= n).count();
            if count >= quorum {
                target = n;
            }
        }

        while self.commit_index < target {
            self.commit_index += 1;
            let cmd = self.log.command_at(self.commit_index).unwrap().clone();
            self.kv.apply(&cmd);
            if self
                .client_table
                .mark_replied(&cmd.client, &cmd.mid, self.commit_index)
            {
                self.send(Message::new(
                    self.id.clone(),
                    cmd.client.clone(),
                    self.id.clone(),
                    Body::Ok { mid: cmd.mid.clone(), value: None },
                ))
                .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ReplicaConfig;
    use crate::log::{Command, Entry};
    use crate::message::{Body, Message, BROADCAST_ID};
    use crate::replica::{Replica, Role};
    use crate::transport::ChannelTransport;

    fn leader_with_two_followers() -> Vec<Replica<ChannelTransport>> {
        let ids = vec!["r0".to_string(), "r1".to_string(), "r2".to_string()];
        let transports = ChannelTransport::cluster(&ids);
        let mut replicas: Vec<_> = ids
            .iter()
            .cloned()
            .zip(transports)
            .map(|(id, t)| {
                let peers = ids.iter().cloned().filter(|p| *p != id).collect();
                Replica::new(id, peers, ReplicaConfig::default(), t)
            })
            .collect();
        replicas[0].role = Role::Leader;
        replicas[0].current_leader = "r0".into();
        replicas[0].term = 1;
        for p in ["r1", "r2"] {
            replicas[0].next_index.insert(p.to_string(), 0);
            replicas[0].match_index.insert(p.to_string(), 0);
        }
        replicas[0].match_index.insert("r0".into(), 0);
        replicas
    }

    #[tokio::test]
    async fn commit_advances_once_majority_of_current_term_entries_match() {
        let mut cluster = leader_with_two_followers();
        cluster[0]
            .log
            .append(Entry::new(Command::new("k", "v", "c1", "m1"), 1));
        cluster[0].match_index.insert("r0".into(), 1);

        let resp_r1 = Message::new(
            "r1".into(),
            "r0".into(),
            BROADCAST_ID.into(),
            Body::AppendEntryResponse { term: 1, success: true, log_length: Some(1) },
        );
        cluster[0].dispatch(resp_r1).await.unwrap();
        assert_eq!(cluster[0].commit_index(), 1);
        assert_eq!(cluster[0].kv_get("k"), "v");
    }

    #[tokio::test]
    async fn commit_does_not_advance_without_quorum() {
        let mut cluster = leader_with_two_followers();
        cluster[0]
            .log
            .append(Entry::new(Command::new("k", "v", "c1", "m1"), 1));
        cluster[0].match_index.insert("r0".into(), 1);
        assert_eq!(cluster[0].commit_index(), 0);
    }

    #[tokio::test]
    async fn failed_append_backs_off_next_index_and_retries() {
        let mut cluster = leader_with_two_followers();
        cluster[0].next_index.insert("r1".into(), 3);
        let resp = Message::new(
            "r1".into(),
            "r0".into(),
            BROADCAST_ID.into(),
            Body::AppendEntryResponse { term: 1, success: false, log_length: None },
        );
        cluster[0].dispatch(resp).await.unwrap();
        assert_eq!(*cluster[0].next_index.get("r1").unwrap(), 2);
    }
}
