//! The state machine applied to committed log entries: a flat string/string
//! key-value map.

use std::collections::HashMap;

use crate::log::Command;

/// In-memory key/value store. Populated only by applying committed log
/// entries in index order (§3 invariant 5).
#[derive(Debug, Default, Clone)]
pub struct KvStore {
    map: HashMap<String, String>,
}

impl KvStore {
    pub fn new() -> Self {
        KvStore { map: HashMap::new() }
    }

    /// Applies a committed command. Last-write-wins per key.
    pub fn apply(&mut self, cmd: &Command) {
        self.map.insert(cmd.key.clone(), cmd.value.clone());
    }

    /// Reads a key, returning `""` when absent (§4.6: missing is not an
    /// error, it's an empty-value `ok`).
    pub fn get(&self, key: &str) -> String {
        self.map.get(key).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_empty_string() {
        let kv = KvStore::new();
        assert_eq!(kv.get("nope"), "");
    }

    #[test]
    fn apply_is_last_write_wins() {
        let mut kv = KvStore::new();
        kv.apply(&Command::new("k", "v1", "c", "m1"));
        kv.apply(&Command::new("k", "v2", "c", "m2"));
        assert_eq!(kv.get("k"), "v2");
    }
}
