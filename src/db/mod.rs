pub mod migrations;
pub mod repository;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

use crate::error::StoreError;
use crate::models::{RankUpdate, UserRankState, Versioned};

/// Document-store boundary the synchronizer reads and writes member rank
/// records through.
pub trait RankStore {
    fn read_user_rank_state(&self, user_id: &str) -> Result<Versioned<UserRankState>, StoreError>;

    /// Apply `update` only if the stored record is still at
    /// `expected_version`. Returns the new version.
    fn write_user_rank_state(
        &self,
        user_id: &str,
        update: &RankUpdate,
        expected_version: u64,
    ) -> Result<u64, StoreError>;
}

/// Open the member database, bounding lock waits by `busy_timeout`, and bring
/// the schema up to date.
pub fn open(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn =
        Connection::open(path).with_context(|| format!("Opening database at {:?}", path))?;
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}
