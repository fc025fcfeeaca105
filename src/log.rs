//! The replicated log: an ordered sequence of `(command, term)` entries.
//!
//! Conceptually 1-indexed, matching the design's vocabulary (`last_index`,
//! `commit_index` are counts of a log prefix). Internally stored 0-indexed;
//! all public accessors translate.

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::message::{ClientId, RequestId};

/// A client mutation: `(key, value, client_id, request_id)` on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub key: String,
    pub value: String,
    pub client: ClientId,
    pub mid: RequestId,
}

impl Command {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        client: impl Into<ClientId>,
        mid: impl Into<RequestId>,
    ) -> Self {
        Command {
            key: key.into(),
            value: value.into(),
            client: client.into(),
            mid: mid.into(),
        }
    }
}

// Commands are carried on the wire as a 4-element JSON array, not an object,
// so the (de)serialization is hand-rolled against a plain tuple rather than
// derived.
impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(4)?;
        tup.serialize_element(&self.key)?;
        tup.serialize_element(&self.value)?;
        tup.serialize_element(&self.client)?;
        tup.serialize_element(&self.mid)?;
        tup.end()
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CommandVisitor;
        impl<'de> Visitor<'de> for CommandVisitor {
            type Value = Command;
            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a 4-element [key, value, client, mid] array")
            }
            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Command, A::Error> {
                let key = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let value = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let client = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(2, &self))?;
                let mid = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(3, &self))?;
                Ok(Command { key, value, client, mid })
            }
        }
        deserializer.deserialize_tuple(4, CommandVisitor)
    }
}

/// A single entry in the replicated log: a command tagged with the term in
/// which the leader appended it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub command: Command,
    pub term: u64,
}

impl Entry {
    pub fn new(command: Command, term: u64) -> Self {
        Entry { command, term }
    }
}

// Entries are carried as `[command, term]` pairs on the wire.
impl Serialize for Entry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(&self.command)?;
        tup.serialize_element(&self.term)?;
        tup.end()
    }
}

impl<'de> Deserialize<'de> for Entry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntryVisitor;
        impl<'de> Visitor<'de> for EntryVisitor {
            type Value = Entry;
            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a 2-element [command, term] array")
            }
            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Entry, A::Error> {
                let command = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let term = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                Ok(Entry { command, term })
            }
        }
        deserializer.deserialize_tuple(2, EntryVisitor)
    }
}

/// The replica's replicated log.
#[derive(Debug, Default, Clone)]
pub struct Log {
    entries: Vec<Entry>,
}

impl Log {
    pub fn new() -> Self {
        Log { entries: Vec::new() }
    }

    /// `len(log)` in the design's vocabulary.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Term of the last entry, if the log is non-empty.
    pub fn last_term(&self) -> Option<u64> {
        self.entries.last().map(|e| e.term)
    }

    /// Term of the entry at 1-indexed `index`, or `None` if out of range.
    pub fn term_at(&self, index: usize) -> Option<u64> {
        if index == 0 || index > self.entries.len() {
            None
        } else {
            Some(self.entries[index - 1].term)
        }
    }

    /// The entry at 1-indexed `index`, or `None` if out of range.
    pub fn entry_at(&self, index: usize) -> Option<&Entry> {
        if index == 0 || index > self.entries.len() {
            None
        } else {
            Some(&self.entries[index - 1])
        }
    }

    /// Appends a brand-new entry at the end (leader-side, append-only).
    pub fn append(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Entries from 1-indexed `from` (inclusive) to the end, cloned for
    /// shipping out in an `AppendEntry` message.
    pub fn suffix_from(&self, from: usize) -> Vec<Entry> {
        if from >= self.entries.len() {
            Vec::new()
        } else {
            self.entries[from..].to_vec()
        }
    }

    /// Reconciles the local log against a leader's `AppendEntry` payload
    /// (design §4.5).
    ///
    /// `expected_index` is the leader's `last_index`: the prefix length the
    /// consistency check (§4.4 step 3) already established agrees with the
    /// leader. `incoming` is the suffix the leader sent starting right after
    /// that point.
    pub fn reconcile(&mut self, expected_index: usize, incoming: &[Entry]) {
        debug_assert!(self.entries.len() >= expected_index);

        if self.entries.len() > expected_index {
            let common_last =
                std::cmp::min(self.entries.len(), expected_index + incoming.len());
            if common_last > expected_index {
                let local_term = self.entries[common_last - 1].term;
                let incoming_term = incoming[common_last - expected_index - 1].term;
                if local_term != incoming_term {
                    self.entries.truncate(expected_index);
                }
            }
        }

        let k = self.entries.len() - expected_index;
        if k < incoming.len() {
            self.entries.extend_from_slice(&incoming[k..]);
        }
    }

    /// Command at 1-indexed `index`, used when applying a committed entry.
    pub fn command_at(&self, index: usize) -> Option<&Command> {
        self.entry_at(index).map(|e| &e.command)
    }
}
