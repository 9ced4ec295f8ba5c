//! The durable-commit boundary.
//!
//! The store never mutates memory until [`ReplicationGateway::propose`] has
//! returned `Ok` for the record describing the mutation. The consensus engine
//! behind a production gateway lives outside this crate; [`MemoryLog`] is an
//! in-process log used for tests and single-node tooling, and
//! [`FileJournal`](crate::FileJournal) persists records to a local file.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use keyward_core::{Error, Result};

use crate::operation::{Operation, Proposal};

/// Abstraction over the replicated log.
#[async_trait]
pub trait ReplicationGateway: Send + Sync {
    /// Durably commit a proposal.
    ///
    /// Blocks until the record is ordered and persisted, or fails with
    /// [`Error::Durability`]. Retrying is the caller's decision.
    async fn propose(&self, proposal: Proposal) -> Result<()>;
}

#[async_trait]
impl<G: ReplicationGateway + ?Sized> ReplicationGateway for Arc<G> {
    async fn propose(&self, proposal: Proposal) -> Result<()> {
        (**self).propose(proposal).await
    }
}

/// Encode `operation` and propose it through `gateway`.
pub(crate) async fn commit(gateway: &dyn ReplicationGateway, operation: &Operation) -> Result<()> {
    let proposal = Proposal::encode(operation)?;
    gateway.propose(proposal).await
}

/// In-memory ordered log with failure injection.
///
/// Clones share the same log, so a test can keep a handle for inspecting
/// commits and injecting failures after handing one to the store.
#[derive(Clone, Default)]
pub struct MemoryLog {
    state: Arc<Mutex<LogState>>,
}

#[derive(Default)]
struct LogState {
    committed: Vec<Proposal>,
    fail_next: usize,
    failing: bool,
}

impl MemoryLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` proposals.
    pub fn fail_next(&self, count: usize) {
        self.lock().fail_next = count;
    }

    /// Reject every proposal until switched off again.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Number of committed proposals.
    pub fn len(&self) -> usize {
        self.lock().committed.len()
    }

    /// Whether nothing has been committed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Committed proposals in commit order.
    pub fn proposals(&self) -> Vec<Proposal> {
        self.lock().committed.clone()
    }

    /// Committed records in commit order.
    pub fn operations(&self) -> Result<Vec<Operation>> {
        self.lock().committed.iter().map(Proposal::decode).collect()
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ReplicationGateway for MemoryLog {
    async fn propose(&self, proposal: Proposal) -> Result<()> {
        let mut state = self.lock();
        if state.failing || state.fail_next > 0 {
            state.fail_next = state.fail_next.saturating_sub(1);
            return Err(Error::durability(
                proposal.kind.as_str(),
                "proposal rejected: no quorum",
            ));
        }
        state.committed.push(proposal);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::operation::OperationKind;

    fn delete_volume(volume: &str) -> Proposal {
        Proposal::encode(&Operation::DeleteVolumeGrants {
            volume: volume.into(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_memory_log_commits_in_order() {
        let log = MemoryLog::new();
        log.propose(delete_volume("a")).await.unwrap();
        log.propose(delete_volume("b")).await.unwrap();

        let ops = log.operations().unwrap();
        assert_eq!(
            ops,
            vec![
                Operation::DeleteVolumeGrants { volume: "a".into() },
                Operation::DeleteVolumeGrants { volume: "b".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_fail_next_counts_down() {
        let log = MemoryLog::new();
        log.fail_next(2);

        for _ in 0..2 {
            let err = log.propose(delete_volume("a")).await.unwrap_err();
            assert!(err.is_durability());
            assert!(err.to_string().contains("delete_volume_grants"));
        }
        log.propose(delete_volume("a")).await.unwrap();
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_set_failing_persists() {
        let log = MemoryLog::new();
        log.set_failing(true);
        assert!(log.propose(delete_volume("a")).await.is_err());
        assert!(log.propose(delete_volume("a")).await.is_err());
        log.set_failing(false);
        log.propose(delete_volume("a")).await.unwrap();
        assert_eq!(log.proposals()[0].kind, OperationKind::DeleteVolumeGrants);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let log = MemoryLog::new();
        let handle: Arc<dyn ReplicationGateway> = Arc::new(log.clone());
        handle.propose(delete_volume("a")).await.unwrap();
        assert!(!log.is_empty());
    }
}
