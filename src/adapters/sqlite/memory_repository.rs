//! SQLite implementation of the MemoryRepository (§4.8).

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_optional_datetime, parse_json_or_default, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AdaptiveParameters, MemoryEntry, MemoryType, OptimizationSnapshot};
use crate::domain::ports::memory_repository::MemoryRepository;

const ADAPTIVE_PARAMETERS_KEY: &str = "current";

pub struct SqliteMemoryRepository {
    pool: SqlitePool,
}

impl SqliteMemoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MemoryEntryRow {
    id: String,
    memory_type: String,
    session_id: String,
    content: String,
    role: String,
    metadata: Option<String>,
    relevance_score: f64,
    is_compressed: bool,
    compressed_at: Option<String>,
    compressed_token_count: Option<i64>,
    created_at: String,
}

impl TryFrom<MemoryEntryRow> for MemoryEntry {
    type Error = DomainError;

    fn try_from(row: MemoryEntryRow) -> DomainResult<Self> {
        Ok(MemoryEntry {
            id: parse_uuid(&row.id)?,
            memory_type: MemoryType::from_str(&row.memory_type).unwrap_or(MemoryType::ShortTerm),
            session_id: row.session_id,
            content: row.content,
            role: row.role,
            metadata: parse_json_or_default(row.metadata),
            relevance_score: row.relevance_score,
            is_compressed: row.is_compressed,
            compressed_at: parse_optional_datetime(row.compressed_at)?,
            compressed_token_count: row.compressed_token_count.map(|n| n as u64),
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[async_trait]
impl MemoryRepository for SqliteMemoryRepository {
    async fn store(&self, entry: &MemoryEntry) -> DomainResult<()> {
        let metadata_json = serde_json::to_string(&entry.metadata)?;
        sqlx::query(
            "INSERT INTO memory_entries (id, memory_type, session_id, content, role, metadata,
                relevance_score, is_compressed, compressed_at, compressed_token_count, created_at)
             VALUES (?,?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(entry.id.to_string())
        .bind(entry.memory_type.as_str())
        .bind(&entry.session_id)
        .bind(&entry.content)
        .bind(&entry.role)
        .bind(metadata_json)
        .bind(entry.relevance_score)
        .bind(entry.is_compressed)
        .bind(entry.compressed_at.map(|t| t.to_rfc3339()))
        .bind(entry.compressed_token_count.map(|n| n as i64))
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<MemoryEntry>> {
        let row: Option<MemoryEntryRow> = sqlx::query_as("SELECT * FROM memory_entries WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(MemoryEntry::try_from).transpose()
    }

    async fn update(&self, entry: &MemoryEntry) -> DomainResult<()> {
        let metadata_json = serde_json::to_string(&entry.metadata)?;
        let result = sqlx::query(
            "UPDATE memory_entries SET memory_type = ?, content = ?, metadata = ?,
                relevance_score = ?, is_compressed = ?, compressed_at = ?,
                compressed_token_count = ? WHERE id = ?",
        )
        .bind(entry.memory_type.as_str())
        .bind(&entry.content)
        .bind(metadata_json)
        .bind(entry.relevance_score)
        .bind(entry.is_compressed)
        .bind(entry.compressed_at.map(|t| t.to_rfc3339()))
        .bind(entry.compressed_token_count.map(|n| n as i64))
        .bind(entry.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::MemoryEntryNotFound(entry.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        sqlx::query("DELETE FROM memory_entries WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_by_session(&self, session_id: &str) -> DomainResult<Vec<MemoryEntry>> {
        let rows: Vec<MemoryEntryRow> =
            sqlx::query_as("SELECT * FROM memory_entries WHERE session_id = ? ORDER BY created_at ASC")
                .bind(session_id)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(MemoryEntry::try_from).collect()
    }

    async fn recent_session_ids(&self, limit: usize) -> DomainResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT session_id FROM memory_entries
             GROUP BY session_id ORDER BY MAX(created_at) DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    async fn get_adaptive_parameters(&self) -> DomainResult<Option<AdaptiveParameters>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM adaptive_parameters WHERE key = ?")
            .bind(ADAPTIVE_PARAMETERS_KEY)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(value,)| serde_json::from_str(&value).map_err(DomainError::from))
            .transpose()
    }

    async fn set_adaptive_parameters(&self, params: &AdaptiveParameters) -> DomainResult<()> {
        let value = serde_json::to_string(params)?;
        sqlx::query(
            "INSERT INTO adaptive_parameters (key, value, updated_at) VALUES (?,?,?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(ADAPTIVE_PARAMETERS_KEY)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_snapshot(&self, snapshot: &OptimizationSnapshot) -> DomainResult<()> {
        let parameters_json = serde_json::to_string(&snapshot.parameters)?;
        sqlx::query(
            "INSERT INTO optimization_snapshots (id, tokens_before, tokens_after, compressed,
                dropped, promoted, parameters, created_at) VALUES (?,?,?,?,?,?,?,?)",
        )
        .bind(snapshot.id.to_string())
        .bind(snapshot.tokens_before as i64)
        .bind(snapshot.tokens_after as i64)
        .bind(snapshot.compressed as i64)
        .bind(snapshot.dropped as i64)
        .bind(snapshot.promoted as i64)
        .bind(parameters_json)
        .bind(snapshot.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn prune_snapshots(&self, keep: usize) -> DomainResult<()> {
        sqlx::query(
            "DELETE FROM optimization_snapshots WHERE id NOT IN (
                SELECT id FROM optimization_snapshots ORDER BY created_at DESC LIMIT ?
            )",
        )
        .bind(keep as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_snapshots(&self, limit: usize) -> DomainResult<Vec<OptimizationSnapshot>> {
        #[derive(sqlx::FromRow)]
        struct Row {
            id: String,
            tokens_before: i64,
            tokens_after: i64,
            compressed: i64,
            dropped: i64,
            promoted: i64,
            parameters: String,
            created_at: String,
        }
        let rows: Vec<Row> =
            sqlx::query_as("SELECT * FROM optimization_snapshots ORDER BY created_at DESC LIMIT ?")
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|r| {
                Ok(OptimizationSnapshot {
                    id: parse_uuid(&r.id)?,
                    tokens_before: r.tokens_before as u64,
                    tokens_after: r.tokens_after as u64,
                    compressed: r.compressed as u64,
                    dropped: r.dropped as u64,
                    promoted: r.promoted as u64,
                    parameters: serde_json::from_str(&r.parameters)?,
                    created_at: parse_datetime(&r.created_at)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn repo() -> SqliteMemoryRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteMemoryRepository::new(pool)
    }

    #[tokio::test]
    async fn store_and_get_round_trips() {
        let repo = repo().await;
        let entry = MemoryEntry::new("session-1", "user", "hello world");
        repo.store(&entry).await.unwrap();

        let fetched = repo.get(entry.id).await.unwrap().unwrap();
        assert_eq!(fetched.content, "hello world");
        assert_eq!(fetched.memory_type, MemoryType::ShortTerm);
    }

    #[tokio::test]
    async fn update_missing_entry_errors() {
        let repo = repo().await;
        let entry = MemoryEntry::new("session-1", "user", "never stored");
        let err = repo.update(&entry).await.unwrap_err();
        assert!(matches!(err, DomainError::MemoryEntryNotFound(_)));
    }

    #[tokio::test]
    async fn adaptive_parameters_round_trip_and_upsert() {
        let repo = repo().await;
        assert!(repo.get_adaptive_parameters().await.unwrap().is_none());

        let mut params = AdaptiveParameters::default();
        repo.set_adaptive_parameters(&params).await.unwrap();
        params.compression_trigger = 0.80;
        repo.set_adaptive_parameters(&params).await.unwrap();

        let fetched = repo.get_adaptive_parameters().await.unwrap().unwrap();
        assert_eq!(fetched.compression_trigger, 0.80);
    }

    #[tokio::test]
    async fn prune_snapshots_keeps_newest() {
        let repo = repo().await;
        for _ in 0..5 {
            repo.append_snapshot(&OptimizationSnapshot {
                id: Uuid::new_v4(),
                tokens_before: 100,
                tokens_after: 80,
                compressed: 1,
                dropped: 0,
                promoted: 0,
                parameters: AdaptiveParameters::default(),
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        }
        repo.prune_snapshots(2).await.unwrap();
        let remaining = repo.list_snapshots(10).await.unwrap();
        assert_eq!(remaining.len(), 2);
    }
}
