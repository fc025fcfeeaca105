//! Follower-side handling of `AppendEntry` and the `update` heartbeat
//! (design §4.4).

use super::{Replica, Role};
use crate::message::{Body, Message};
use crate::pf_trace;
use crate::transport::Transport;
use crate::utils::RaftKvResult;

impl<T: Transport> Replica<T> {
    pub(super) async fn handle_append_entry(&mut self, msg: Message) -> RaftKvResult<()> {
        let (term, commit_length, entries, last_index, last_term) = match msg.body {
            Body::AppendEntry { term, commit_length, entries, last_index, last_term, .. } => {
                (term, commit_length, entries, last_index, last_term)
            }
            _ => unreachable!("dispatch only routes AppendEntry here"),
        };

        if term < self.term {
            return self.reply_append(&msg.src, false).await;
        }

        self.role = Role::Follower;
        self.current_leader = msg.leader.clone();
        self.reset_election_timer();
        self.drain_pending_as_redirects().await?;

        let consistent =
            self.log.len() >= last_index && (last_index == 0 || self.log.term_at(last_index) == last_term);
        if !consistent {
            return self.reply_append(&msg.src, false).await;
        }

        self.log.reconcile(last_index, &entries);
        while self.commit_index < commit_length && self.commit_index < self.log.len() {
            self.commit_index += 1;
            let cmd = self.log.command_at(self.commit_index).unwrap().clone();
            self.kv.apply(&cmd);
        }

        pf_trace!(
            "applied AppendEntry from {}, log_len={} commit_index={}",
            msg.src,
            self.log.len(),
            self.commit_index
        );
        self.reply_append(&msg.src, true).await
    }

    async fn reply_append(&self, to: &str, success: bool) -> RaftKvResult<()> {
        self.send(Message::new(
            self.id.clone(),
            to.to_string(),
            self.current_leader.clone(),
            Body::AppendEntryResponse {
                term: self.term,
                success,
                log_length: Some(self.log.len()),
            },
        ))
        .await
    }

    pub(super) async fn handle_update(&mut self, msg: Message) -> RaftKvResult<()> {
        let term = match msg.body {
            Body::Update { term, .. } => term,
            _ => unreachable!("dispatch only routes Update here"),
        };

        if term < self.term {
            return self.reply_append(&msg.src, false).await;
        }

        self.role = Role::Follower;
        self.current_leader = msg.leader.clone();
        self.reset_election_timer();
        self.drain_pending_as_redirects().await
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ReplicaConfig;
    use crate::log::{Command, Entry};
    use crate::message::{Body, Message, BROADCAST_ID};
    use crate::replica::{Replica, Role};
    use crate::transport::{ChannelTransport, Transport};
    use std::time::Duration;

    fn pair() -> (Replica<ChannelTransport>, Replica<ChannelTransport>) {
        let ids = vec!["r0".to_string(), "r1".to_string()];
        let mut transports = ChannelTransport::cluster(&ids);
        let t1 = transports.remove(1);
        let t0 = transports.remove(0);
        (
            Replica::new("r0".into(), vec!["r1".into()], ReplicaConfig::default(), t0),
            Replica::new("r1".into(), vec!["r0".into()], ReplicaConfig::default(), t1),
        )
    }

    #[tokio::test]
    async fn stale_term_append_is_rejected() {
        let (leader, mut follower) = pair();
        follower.term = 5;
        let msg = Message::new(
            "r0".into(),
            "r1".into(),
            "r0".into(),
            Body::AppendEntry {
                term: 2,
                commit_length: 0,
                entries: vec![],
                last_index: 0,
                last_term: None,
                kvstore_len: None,
            },
        );
        follower.dispatch(msg).await.unwrap();
        let reply = leader
            .transport
            .recv_timeout(Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        match reply.body {
            Body::AppendEntryResponse { success, term, .. } => {
                assert!(!success);
                assert_eq!(term, 5);
            }
            other => panic!("expected AppendEntryResponse, got {:?}", other),
        }
        assert_eq!(follower.term(), 5);
    }

    #[tokio::test]
    async fn inconsistent_prefix_is_rejected_then_reconciled() {
        let (mut leader, mut follower) = pair();
        leader.role = Role::Leader;
        leader.current_leader = "r0".into();
        leader.term = 1;

        // Follower has nothing; leader claims last_index=1 (a gap).
        let gap_msg = Message::new(
            "r0".into(),
            "r1".into(),
            "r0".into(),
            Body::AppendEntry {
                term: 1,
                commit_length: 0,
                entries: vec![Entry::new(Command::new("k", "v", "c", "m"), 1)],
                last_index: 1,
                last_term: Some(1),
                kvstore_len: None,
            },
        );
        follower.dispatch(gap_msg).await.unwrap();
        let reply = leader
            .transport
            .recv_timeout(Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        match reply.body {
            Body::AppendEntryResponse { success, .. } => assert!(!success),
            other => panic!("expected AppendEntryResponse, got {:?}", other),
        }

        // Leader retries from the start.
        let full_msg = Message::new(
            "r0".into(),
            "r1".into(),
            "r0".into(),
            Body::AppendEntry {
                term: 1,
                commit_length: 0,
                entries: vec![Entry::new(Command::new("k", "v", "c", "m"), 1)],
                last_index: 0,
                last_term: None,
                kvstore_len: None,
            },
        );
        follower.dispatch(full_msg).await.unwrap();
        let reply2 = leader
            .transport
            .recv_timeout(Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        match reply2.body {
            Body::AppendEntryResponse { success, log_length, .. } => {
                assert!(success);
                assert_eq!(log_length, Some(1));
            }
            other => panic!("expected AppendEntryResponse, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn update_heartbeat_sets_leader_and_resets_timer() {
        let (_leader, mut follower) = pair();
        assert_eq!(follower.current_leader(), BROADCAST_ID);
        let hb = Message::new(
            "r0".into(),
            "r1".into(),
            "r0".into(),
            Body::Update { term: 1, commit_length: 0 },
        );
        follower.dispatch(hb).await.unwrap();
        assert_eq!(follower.current_leader(), "r0");
        assert_eq!(follower.role(), Role::Follower);
    }
}
