pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Transactional destination for serialized event documents.
///
/// One sink serves one load run. `insert` writes into the currently open
/// transaction (opened on demand); `commit` and `rollback` close it and are
/// no-ops when no transaction is open.
#[async_trait]
pub trait StagingSink {
    /// Recreates the staging namespace and table, leaving an empty table.
    /// Runs in its own transaction; a failure here leaves nowhere to write.
    async fn prepare(&mut self) -> Result<()>;

    /// Inserts `documents` as one statement and returns the row count.
    /// An empty slice is a no-op returning zero.
    async fn insert(&mut self, documents: &[Value]) -> Result<u64>;

    /// Commits the open transaction, if any.
    async fn commit(&mut self) -> Result<()>;

    /// Rolls back the open transaction, if any, discarding every insert
    /// since the last commit.
    async fn rollback(&mut self) -> Result<()>;
}
