//! Tagged wire messages exchanged between replicas and clients.
//!
//! [`Message`] is the idiomatic sum type the rest of the crate dispatches
//! on; [`WireMessage`] is its flat, irregular JSON encoding (mixed
//! `snake_case`/`camelCase` field names, booleans spelled as `"true"`/
//! `"false"` strings) kept private to this module so the rest of the crate
//! never has to think about wire shape.

use serde::{Deserialize, Serialize};

use crate::log::Entry;
use crate::logged_err;
use crate::utils::{RaftKvError, RaftKvResult};

pub type ReplicaId = String;
pub type ClientId = String;
pub type RequestId = String;

/// Reserved id meaning "broadcast" or "no known leader".
pub const BROADCAST_ID: &str = "FFFF";

/// A fully-addressed message: routing envelope plus a typed body.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub src: ReplicaId,
    pub dst: ReplicaId,
    pub leader: ReplicaId,
    pub body: Body,
}

impl Message {
    pub fn new(src: ReplicaId, dst: ReplicaId, leader: ReplicaId, body: Body) -> Self {
        Message { src, dst, leader, body }
    }

    pub fn to_json(&self) -> RaftKvResult<String> {
        let wire = WireMessage::from_message(self);
        Ok(serde_json::to_string(&wire)?)
    }

    pub fn from_json(s: &str) -> RaftKvResult<Message> {
        let wire: WireMessage = serde_json::from_str(s)?;
        wire.into_message()
    }
}

/// The typed, per-variant payload of a [`Message`].
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Hello,
    Get {
        key: String,
        mid: RequestId,
    },
    Put {
        key: String,
        value: String,
        mid: RequestId,
    },
    Ok {
        mid: RequestId,
        value: Option<String>,
    },
    Redirect {
        mid: RequestId,
    },
    Fail {
        mid: RequestId,
    },
    Update {
        term: u64,
        commit_length: usize,
    },
    VoteRequest {
        term: u64,
        candidate: ReplicaId,
        last_index: usize,
        last_term: Option<u64>,
    },
    VoteResponse {
        term: u64,
        granted: bool,
    },
    AppendEntry {
        term: u64,
        commit_length: usize,
        entries: Vec<Entry>,
        last_index: usize,
        last_term: Option<u64>,
        kvstore_len: Option<usize>,
    },
    AppendEntryResponse {
        term: u64,
        success: bool,
        log_length: Option<usize>,
    },
}

impl Body {
    /// The term carried by this body, for message types that carry one.
    /// Used to apply the term-monotonicity rule uniformly before any
    /// variant-specific handling runs (design notes §9, "role transitions").
    pub fn term(&self) -> Option<u64> {
        match self {
            Body::VoteRequest { term, .. }
            | Body::VoteResponse { term, .. }
            | Body::Update { term, .. }
            | Body::AppendEntry { term, .. }
            | Body::AppendEntryResponse { term, .. } => Some(*term),
            _ => None,
        }
    }

    fn type_tag(&self) -> &'static str {
        match self {
            Body::Hello => "hello",
            Body::Get { .. } => "get",
            Body::Put { .. } => "put",
            Body::Ok { .. } => "ok",
            Body::Redirect { .. } => "redirect",
            Body::Fail { .. } => "fail",
            Body::Update { .. } => "update",
            Body::VoteRequest { .. } => "VoteRequest",
            Body::VoteResponse { .. } => "VoteResponse",
            Body::AppendEntry { .. } => "AppendEntry",
            Body::AppendEntryResponse { .. } => "AppendEntryResponse",
        }
    }
}

/// Serializes/deserializes an `Option<bool>` as the wire's `"true"`/
/// `"false"` strings instead of JSON booleans.
mod opt_bool_as_str {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<bool>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(true) => s.serialize_some("true"),
            Some(false) => s.serialize_some("false"),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw.as_deref() {
            Some("true") => Ok(Some(true)),
            Some("false") => Ok(Some(false)),
            Some(other) => Err(serde::de::Error::custom(format!(
                "invalid boolean string {:?}",
                other
            ))),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    src: ReplicaId,
    dst: ReplicaId,
    leader: ReplicaId,
    #[serde(rename = "type")]
    typ: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(rename = "MID", default, skip_serializing_if = "Option::is_none")]
    mid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    term: Option<u64>,
    #[serde(rename = "newterm", default, skip_serializing_if = "Option::is_none")]
    newterm: Option<u64>,
    #[serde(rename = "votedfor", default, skip_serializing_if = "Option::is_none")]
    votedfor: Option<ReplicaId>,
    #[serde(rename = "lastIndex", default, skip_serializing_if = "Option::is_none")]
    last_index: Option<usize>,
    #[serde(rename = "lastTerm", default, skip_serializing_if = "Option::is_none")]
    last_term: Option<u64>,

    #[serde(
        rename = "commitlength",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    commitlength: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    entries: Option<Vec<Entry>>,
    #[serde(
        rename = "kvstorelen",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    kvstorelen: Option<usize>,

    #[serde(rename = "loglength", default, skip_serializing_if = "Option::is_none")]
    loglength: Option<usize>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_bool_as_str"
    )]
    voted: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_bool_as_str"
    )]
    success: Option<bool>,
}

impl WireMessage {
    fn from_message(msg: &Message) -> Self {
        let mut wire = WireMessage {
            src: msg.src.clone(),
            dst: msg.dst.clone(),
            leader: msg.leader.clone(),
            typ: msg.body.type_tag().to_string(),
            key: None,
            value: None,
            mid: None,
            term: None,
            newterm: None,
            votedfor: None,
            last_index: None,
            last_term: None,
            commitlength: None,
            entries: None,
            kvstorelen: None,
            loglength: None,
            voted: None,
            success: None,
        };
        match &msg.body {
            Body::Hello => {}
            Body::Get { key, mid } => {
                wire.key = Some(key.clone());
                wire.mid = Some(mid.clone());
            }
            Body::Put { key, value, mid } => {
                wire.key = Some(key.clone());
                wire.value = Some(value.clone());
                wire.mid = Some(mid.clone());
            }
            Body::Ok { mid, value } => {
                wire.mid = Some(mid.clone());
                wire.value = value.clone();
            }
            Body::Redirect { mid } => {
                wire.mid = Some(mid.clone());
            }
            Body::Fail { mid } => {
                wire.mid = Some(mid.clone());
            }
            Body::Update { term, commit_length } => {
                wire.term = Some(*term);
                wire.commitlength = Some(*commit_length);
            }
            Body::VoteRequest {
                term,
                candidate,
                last_index,
                last_term,
            } => {
                wire.newterm = Some(*term);
                wire.votedfor = Some(candidate.clone());
                wire.last_index = Some(*last_index);
                wire.last_term = *last_term;
            }
            Body::VoteResponse { term, granted } => {
                wire.term = Some(*term);
                wire.voted = Some(*granted);
            }
            Body::AppendEntry {
                term,
                commit_length,
                entries,
                last_index,
                last_term,
                kvstore_len,
            } => {
                wire.term = Some(*term);
                wire.commitlength = Some(*commit_length);
                wire.entries = Some(entries.clone());
                wire.last_index = Some(*last_index);
                wire.last_term = *last_term;
                wire.kvstorelen = *kvstore_len;
            }
            Body::AppendEntryResponse {
                term,
                success,
                log_length,
            } => {
                wire.term = Some(*term);
                wire.success = Some(*success);
                wire.loglength = *log_length;
            }
        }
        wire
    }

    fn into_message(self) -> RaftKvResult<Message> {
        let missing = |field: &str| {
            RaftKvError::msg(format!(
                "message of type {:?} missing field {}",
                self.typ, field
            ))
        };
        let body = match self.typ.as_str() {
            "hello" => Body::Hello,
            "get" => Body::Get {
                key: self.key.ok_or_else(|| missing("key"))?,
                mid: self.mid.ok_or_else(|| missing("MID"))?,
            },
            "put" => Body::Put {
                key: self.key.ok_or_else(|| missing("key"))?,
                value: self.value.ok_or_else(|| missing("value"))?,
                mid: self.mid.ok_or_else(|| missing("MID"))?,
            },
            "ok" => Body::Ok {
                mid: self.mid.ok_or_else(|| missing("MID"))?,
                value: self.value,
            },
            "redirect" => Body::Redirect {
                mid: self.mid.ok_or_else(|| missing("MID"))?,
            },
            "fail" => Body::Fail {
                mid: self.mid.ok_or_else(|| missing("MID"))?,
            },
            "update" => Body::Update {
                term: self.term.ok_or_else(|| missing("term"))?,
                commit_length: self.commitlength.ok_or_else(|| missing("commitlength"))?,
            },
            "VoteRequest" => Body::VoteRequest {
                term: self.newterm.ok_or_else(|| missing("newterm"))?,
                candidate: self.votedfor.ok_or_else(|| missing("votedfor"))?,
                last_index: self.last_index.ok_or_else(|| missing("lastIndex"))?,
                last_term: self.last_term,
            },
            "VoteResponse" => Body::VoteResponse {
                term: self.term.ok_or_else(|| missing("term"))?,
                granted: self.voted.ok_or_else(|| missing("voted"))?,
            },
            "AppendEntry" => Body::AppendEntry {
                term: self.term.ok_or_else(|| missing("term"))?,
                commit_length: self.commitlength.ok_or_else(|| missing("commitlength"))?,
                entries: self.entries.unwrap_or_default(),
                last_index: self.last_index.ok_or_else(|| missing("lastIndex"))?,
                last_term: self.last_term,
                kvstore_len: self.kvstorelen,
            },
            "AppendEntryResponse" => Body::AppendEntryResponse {
                term: self.term.ok_or_else(|| missing("term"))?,
                success: self.success.ok_or_else(|| missing("success"))?,
                log_length: self.loglength,
            },
            other => return logged_err!("unknown message type {:?}", other),
        };
        Ok(Message {
            src: self.src,
            dst: self.dst,
            leader: self.leader,
            body,
        })
    }
}
