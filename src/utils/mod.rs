//! Helper utilities, functions, and macros.

mod macros;

mod error;
mod timer;

pub use error::{RaftKvError, RaftKvResult};
pub use macros::{me, set_me, ME};
pub use timer::rand_timeout_ms;
