//! Memory repository port (§4.8, §6: `memory_entries`, `optimization_snapshots`,
//! `adaptive_parameters`).

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AdaptiveParameters, MemoryEntry, OptimizationSnapshot};

/// Repository interface for memory-entry and optimizer-state persistence.
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    async fn store(&self, entry: &MemoryEntry) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<MemoryEntry>>;

    async fn update(&self, entry: &MemoryEntry) -> DomainResult<()>;

    async fn delete(&self, id: Uuid) -> DomainResult<()>;

    /// All entries belonging to a session.
    async fn list_by_session(&self, session_id: &str) -> DomainResult<Vec<MemoryEntry>>;

    /// The `limit` most-recently-active distinct session ids, newest first.
    async fn recent_session_ids(&self, limit: usize) -> DomainResult<Vec<String>>;

    /// Restore the last-persisted adaptive parameters, if any.
    async fn get_adaptive_parameters(&self) -> DomainResult<Option<AdaptiveParameters>>;

    /// Upsert by key.
    async fn set_adaptive_parameters(&self, params: &AdaptiveParameters) -> DomainResult<()>;

    async fn append_snapshot(&self, snapshot: &OptimizationSnapshot) -> DomainResult<()>;

    /// Prune snapshot history to the newest `keep` rows.
    async fn prune_snapshots(&self, keep: usize) -> DomainResult<()>;

    async fn list_snapshots(&self, limit: usize) -> DomainResult<Vec<OptimizationSnapshot>>;
}
