//! The client-facing surface: `get`/`put` handling, leader redirects, and
//! draining the no-leader pending queue (design §4.6).

use super::{Replica, Role};
use crate::log::{Command, Entry};
use crate::message::{Body, Message, BROADCAST_ID};
use crate::pf_debug;
use crate::transport::Transport;
use crate::utils::RaftKvResult;

impl<T: Transport> Replica<T> {
    pub(super) async fn handle_get(&mut self, msg: Message) -> RaftKvResult<()> {
        let (key, mid) = match msg.body {
            Body::Get { key, mid } => (key, mid),
            _ => unreachable!("dispatch only routes Get here"),
        };

        match self.role {
            Role::Leader => {
                let value = self.kv.get(&key);
                self.send(Message::new(
                    self.id.clone(),
                    msg.src,
                    self.id.clone(),
                    Body::Ok { mid, value: Some(value) },
                ))
                .await
            }
            _ => self.redirect_or_queue(msg.src, mid).await,
        }
    }

    pub(super) async fn handle_put(&mut self, msg: Message) -> RaftKvResult<()> {
        let (key, value, mid) = match msg.body {
            Body::Put { key, value, mid } => (key, value, mid),
            _ => unreachable!("dispatch only routes Put here"),
        };

        match self.role {
            Role::Leader => {
                let client = msg.src;
                let index = self.log.len() + 1;
                if self.client_table.register_put(client.clone(), mid.clone(), index) {
                    self.log
                        .append(Entry::new(Command::new(key, value, client, mid), self.term));
                    self.match_index.insert(self.id.clone(), self.log.len());
                    pf_debug!("appended put at index {}", self.log.len());
                    self.replicate_to_all().await?;
                }
                Ok(())
            }
            _ => self.redirect_or_queue(msg.src, mid).await,
        }
    }

    async fn redirect_or_queue(&mut self, client: String, mid: String) -> RaftKvResult<()> {
        if self.current_leader != BROADCAST_ID {
            self.send(Message::new(
                self.id.clone(),
                client,
                self.current_leader.clone(),
                Body::Redirect { mid },
            ))
            .await
        } else {
            self.pending.push(client, mid);
            Ok(())
        }
    }

    /// Drains requests queued while no leader was known, now that one is.
    /// Nothing to do if we still don't know a leader either.
    pub(super) async fn drain_pending_as_redirects(&mut self) -> RaftKvResult<()> {
        if self.current_leader == BROADCAST_ID || self.pending.is_empty() {
            return Ok(());
        }
        for req in self.pending.drain() {
            self.send(Message::new(
                self.id.clone(),
                req.client,
                self.current_leader.clone(),
                Body::Redirect { mid: req.mid },
            ))
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ReplicaConfig;
    use crate::message::{Body, Message, BROADCAST_ID};
    use crate::replica::{Replica, Role};
    use crate::transport::{ChannelTransport, Transport};
    use std::time::Duration;

    fn follower_and_client_chan() -> (Replica<ChannelTransport>, ChannelTransport) {
        let ids = vec!["r0".to_string(), "c1".to_string()];
        let mut transports = ChannelTransport::cluster(&ids);
        let client = transports.remove(1);
        let t0 = transports.remove(0);
        (
            Replica::new("r0".into(), vec![], ReplicaConfig::default(), t0),
            client,
        )
    }

    #[tokio::test]
    async fn get_with_no_known_leader_is_queued_not_dropped() {
        let (mut r, _client) = follower_and_client_chan();
        let get = Message::new(
            "c1".into(),
            "r0".into(),
            BROADCAST_ID.into(),
            Body::Get { key: "k".into(), mid: "m1".into() },
        );
        r.dispatch(get).await.unwrap();
        assert!(!r.pending.is_empty());
    }

    #[tokio::test]
    async fn queued_request_is_redirected_once_leader_becomes_known() {
        let (mut r, client) = follower_and_client_chan();
        let get = Message::new(
            "c1".into(),
            "r0".into(),
            BROADCAST_ID.into(),
            Body::Get { key: "k".into(), mid: "m1".into() },
        );
        r.dispatch(get).await.unwrap();

        let hb = Message::new(
            "r1".into(),
            "r0".into(),
            "r1".into(),
            Body::Update { term: 1, commit_length: 0 },
        );
        r.dispatch(hb).await.unwrap();
        assert!(r.pending.is_empty());

        let reply = client
            .recv_timeout(Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        match reply.body {
            Body::Redirect { mid } => assert_eq!(mid, "m1"),
            other => panic!("expected Redirect, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn leader_answers_get_directly() {
        let (mut r, client) = follower_and_client_chan();
        r.role = Role::Leader;
        r.current_leader = "r0".into();
        r.kv.apply(&crate::log::Command::new("k", "v", "x", "y"));

        let get = Message::new(
            "c1".into(),
            "r0".into(),
            BROADCAST_ID.into(),
            Body::Get { key: "k".into(), mid: "m1".into() },
        );
        r.dispatch(get).await.unwrap();
        let reply = client
            .recv_timeout(Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        match reply.body {
            Body::Ok { value, .. } => assert_eq!(value.as_deref(), Some("v")),
            other => panic!("expected Ok, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn duplicate_put_does_not_append_twice() {
        let (mut r, _client) = follower_and_client_chan();
        r.role = Role::Leader;
        r.current_leader = "r0".into();

        for _ in 0..2 {
            let put = Message::new(
                "c1".into(),
                "r0".into(),
                BROADCAST_ID.into(),
                Body::Put { key: "k".into(), value: "v".into(), mid: "m1".into() },
            );
            r.dispatch(put).await.unwrap();
        }
        assert_eq!(r.log_len(), 1);
    }
}
