//! AssignmentStore — redb-backed persistence for pool assignments.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StateError, StateResult};

/// Pool assignments keyed by `{pool_id}`.
const ASSIGNMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("assignments");

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// One deployed rendering pool and the infrastructure it was wired to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolAssignment {
    pub pool_id: String,
    /// TURN relay endpoint the pool's nodes were configured with.
    pub turn_endpoint: String,
    /// Job that ran the deployment tasks.
    pub job_id: String,
    /// Signaling server the pool's nodes report to.
    pub signaling_server: String,
    /// Unix timestamp (seconds) when the assignment was recorded.
    pub recorded_at: u64,
}

impl PoolAssignment {
    /// Build an assignment stamped with the current time.
    pub fn new(pool_id: &str, turn_endpoint: &str, job_id: &str, signaling_server: &str) -> Self {
        Self {
            pool_id: pool_id.to_string(),
            turn_endpoint: turn_endpoint.to_string(),
            job_id: job_id.to_string(),
            signaling_server: signaling_server.to_string(),
            recorded_at: epoch_secs(),
        }
    }
}

/// Thread-safe assignment store backed by redb.
#[derive(Clone)]
pub struct AssignmentStore {
    db: Arc<Database>,
}

impl AssignmentStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "assignment store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing and standalone mode).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert or update an assignment record.
    pub fn record(&self, assignment: &PoolAssignment) -> StateResult<()> {
        let value = serde_json::to_vec(assignment).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
            table
                .insert(assignment.pool_id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(pool_id = %assignment.pool_id, "assignment recorded");
        Ok(())
    }

    /// Get the assignment for a pool, if recorded.
    pub fn get(&self, pool_id: &str) -> StateResult<Option<PoolAssignment>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
        match table.get(pool_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let assignment: PoolAssignment =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(assignment))
            }
            None => Ok(None),
        }
    }

    /// List all recorded assignments.
    pub fn list(&self) -> StateResult<Vec<PoolAssignment>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let assignment: PoolAssignment =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(assignment);
        }
        Ok(results)
    }

    /// Remove an assignment. Returns true if it existed.
    pub fn remove(&self, pool_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
            existed = table.remove(pool_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
