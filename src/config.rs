//! Tunable constants, with `Default` values matching §3/§4 of the design,
//! overridable from an optional TOML string the way the teacher's
//! per-protocol `config_str` works.

use serde::Deserialize;

use crate::utils::RaftKvResult;

/// Replica-side timing and sizing knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplicaConfig {
    /// Lower bound of the randomized election timeout, in milliseconds.
    pub election_timeout_min_ms: u64,
    /// Upper bound of the randomized election timeout, in milliseconds.
    pub election_timeout_max_ms: u64,
    /// Leader heartbeat period, in milliseconds. Must stay well below
    /// `election_timeout_min_ms`.
    pub heartbeat_interval_ms: u64,
    /// Max number of entries a leader will ever ship in one `AppendEntry`;
    /// beyond this gap the batch is sent empty (probe/throttle).
    pub batch_cap: usize,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        ReplicaConfig {
            election_timeout_min_ms: 300,
            election_timeout_max_ms: 500,
            heartbeat_interval_ms: 100,
            batch_cap: 80,
        }
    }
}

/// Test-client timing knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How long to wait for a reply before retrying against the same or a
    /// newly-redirected replica.
    pub retry_backoff_ms: u64,
    /// How many redirects/timeouts to follow before giving up.
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            retry_backoff_ms: 100,
            max_retries: 10,
        }
    }
}

/// Parses an optional TOML overrides string into a config struct, falling
/// back field-by-field to `Default::default()` for anything the string
/// doesn't mention (and to all defaults if `config_str` is `None`).
#[macro_export]
macro_rules! parsed_config {
    ($config_str:expr => $ty:ty) => {{
        match $config_str {
            None => Ok::<$ty, $crate::RaftKvError>(<$ty as Default>::default()),
            Some(s) => toml::from_str::<$ty>(s).map_err(|e| {
                $crate::RaftKvError::msg(format!("invalid config: {}", e))
            }),
        }
    }};
}

/// Parses the `--config` TOML override string for a replica, falling back
/// to [`ReplicaConfig::default`]. Kept as a plain function (rather than
/// calling [`parsed_config!`] directly from the binaries) so callers
/// outside this crate don't need their own `toml` dependency.
pub fn replica_config_from_str(config_str: Option<&str>) -> RaftKvResult<ReplicaConfig> {
    parsed_config!(config_str => ReplicaConfig)
}

/// Same as [`replica_config_from_str`] for the client-side knobs.
pub fn client_config_from_str(config_str: Option<&str>) -> RaftKvResult<ClientConfig> {
    parsed_config!(config_str => ClientConfig)
}
