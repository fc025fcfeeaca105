//! Randomized timer helpers.

use std::time::Duration;

use rand::Rng;

/// Samples a uniformly random duration in `[min_ms, max_ms]` milliseconds.
///
/// Used to re-sample the election timeout on every reset (§3 of the design:
/// re-sampled uniformly in `[300 ms, 500 ms]` by default) so that a cluster
/// of followers does not all time out in lockstep.
pub fn rand_timeout_ms(min_ms: u64, max_ms: u64) -> Duration {
    debug_assert!(min_ms <= max_ms);
    if min_ms == max_ms {
        return Duration::from_millis(min_ms);
    }
    let ms = rand::thread_rng().gen_range(min_ms..=max_ms);
    Duration::from_millis(ms)
}
