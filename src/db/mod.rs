//! Database module: row models, SQL repositories and the store seams.
//!
//! - `model`: rows returned by repositories.
//! - `repo`: SQL-only functions over the SQLite pool.
//!
//! The reconciler talks to storage through [`RecordStore`] and [`WatchStore`]
//! so tests can substitute doubles; [`SqliteStore`] is the real implementation.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{StoredRecord, UpsertRow, WatchEntry};

use crate::model::Domain;
use anyhow::Result;
use async_trait::async_trait;

/// One document collection per data domain, keyed by natural key.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_by_keys(&self, domain: Domain, keys: &[String]) -> Result<Vec<StoredRecord>>;

    async fn find_one(&self, domain: Domain, key: &str) -> Result<Option<StoredRecord>>;

    async fn find_all(&self, domain: Domain) -> Result<Vec<StoredRecord>>;

    /// Returns the number of rows actually written.
    async fn upsert_batch(&self, domain: Domain, rows: &[UpsertRow]) -> Result<u64>;
}

/// NOTAM watch-list table.
#[async_trait]
pub trait WatchStore: Send + Sync {
    /// Make the entry live with a new expiry. Returns `true` when it had been
    /// marked removed.
    async fn upsert_watch(&self, notam_id: &str, expires_at: i64) -> Result<bool>;

    async fn list_watches(&self) -> Result<Vec<WatchEntry>>;

    async fn mark_removed(&self, notam_id: &str) -> Result<()>;

    async fn delete_watch(&self, notam_id: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn find_by_keys(&self, domain: Domain, keys: &[String]) -> Result<Vec<StoredRecord>> {
        repo::find_by_keys(&self.pool, domain, keys).await
    }

    async fn find_one(&self, domain: Domain, key: &str) -> Result<Option<StoredRecord>> {
        repo::find_one(&self.pool, domain, key).await
    }

    async fn find_all(&self, domain: Domain) -> Result<Vec<StoredRecord>> {
        repo::find_all(&self.pool, domain).await
    }

    async fn upsert_batch(&self, domain: Domain, rows: &[UpsertRow]) -> Result<u64> {
        repo::upsert_batch(&self.pool, domain, rows).await
    }
}

#[async_trait]
impl WatchStore for SqliteStore {
    async fn upsert_watch(&self, notam_id: &str, expires_at: i64) -> Result<bool> {
        repo::upsert_watch(&self.pool, notam_id, expires_at).await
    }

    async fn list_watches(&self) -> Result<Vec<WatchEntry>> {
        repo::list_watches(&self.pool).await
    }

    async fn mark_removed(&self, notam_id: &str) -> Result<()> {
        repo::mark_watch_removed(&self.pool, notam_id).await
    }

    async fn delete_watch(&self, notam_id: &str) -> Result<()> {
        repo::delete_watch(&self.pool, notam_id).await
    }
}
