//! Logging helper macros, in the teacher's `pf_*!` style: every log line is
//! automatically prefixed with the calling replica's id so that interleaved
//! output from a multi-replica test run stays attributable.

use std::cell::RefCell;

thread_local! {
    /// Printable id of "me", set once by [`crate::utils::set_me`] at replica
    /// construction. Empty string before that point.
    pub static ME: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Sets the thread-local replica id used to prefix log lines.
pub fn set_me(id: &str) {
    ME.with(|me| *me.borrow_mut() = id.to_string());
}

/// Reads the thread-local replica id.
pub fn me() -> String {
    ME.with(|me| me.borrow().clone())
}

/// `trace!`-level log line prefixed with the replica id.
#[macro_export]
macro_rules! pf_trace {
    ($($arg:tt)*) => {
        log::trace!("<{}> {}", $crate::utils::me(), format!($($arg)*))
    };
}

/// `debug!`-level log line prefixed with the replica id.
#[macro_export]
macro_rules! pf_debug {
    ($($arg:tt)*) => {
        log::debug!("<{}> {}", $crate::utils::me(), format!($($arg)*))
    };
}

/// `info!`-level log line prefixed with the replica id.
#[macro_export]
macro_rules! pf_info {
    ($($arg:tt)*) => {
        log::info!("<{}> {}", $crate::utils::me(), format!($($arg)*))
    };
}

/// `warn!`-level log line prefixed with the replica id.
#[macro_export]
macro_rules! pf_warn {
    ($($arg:tt)*) => {
        log::warn!("<{}> {}", $crate::utils::me(), format!($($arg)*))
    };
}

/// `error!`-level log line prefixed with the replica id.
#[macro_export]
macro_rules! pf_error {
    ($($arg:tt)*) => {
        log::error!("<{}> {}", $crate::utils::me(), format!($($arg)*))
    };
}

/// Logs a `pf_error!` and returns an `Err(RaftKvError::Msg(...))` from the
/// enclosing function in one step.
#[macro_export]
macro_rules! logged_err {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::pf_error!("{}", msg);
        Err($crate::utils::RaftKvError::msg(msg))
    }};
}
