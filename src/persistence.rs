//! Persistence boundary. The design keeps `term`, `voted_for`, and the log
//! in memory only (§9, "no persistence"); this trait is the seam a future
//! on-disk implementation would fill in, not exercised by anything shipped
//! here besides [`NullPersistence`].

use async_trait::async_trait;

use crate::log::Log;
use crate::utils::RaftKvResult;

/// Hook invoked whenever persistent state would need to be made durable
/// before a replica replies to a term- or log-changing message.
#[async_trait]
pub trait PersistenceHook: Send + Sync {
    async fn save_term_and_vote(&self, term: u64, voted_for: Option<&str>) -> RaftKvResult<()>;
    async fn save_log(&self, log: &Log) -> RaftKvResult<()>;
}

/// No-op implementation: the only one this crate ships.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPersistence;

#[async_trait]
impl PersistenceHook for NullPersistence {
    async fn save_term_and_vote(&self, _term: u64, _voted_for: Option<&str>) -> RaftKvResult<()> {
        Ok(())
    }

    async fn save_log(&self, _log: &Log) -> RaftKvResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_persistence_always_succeeds() {
        let hook = NullPersistence;
        hook.save_term_and_vote(3, Some("r1")).await.unwrap();
        hook.save_log(&Log::new()).await.unwrap();
    }
}
