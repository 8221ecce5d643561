//! Audit trail for simulation runs
//!
//! Every run leaves a record: request fingerprint, outcome, the failing
//! stages if any, the report fingerprint and the stage timeline. Records
//! never carry stage payloads.

use crate::models::StageId;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageEventKind {
    Started,
    Settled,
}

/// One point on a run's stage timeline
#[derive(Debug, Clone, Serialize)]
pub struct StageEvent {
    /// Position in the run's total order of events
    pub sequence: u64,
    pub stage: StageId,
    pub kind: StageEventKind,
    pub at: DateTime<Utc>,
}

/// Ordered stage timeline for a single run
#[derive(Debug, Clone, Default)]
pub struct RunTrace {
    events: Arc<Mutex<Vec<StageEvent>>>,
}

impl RunTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, stage: StageId, kind: StageEventKind) -> DateTime<Utc> {
        let mut events = self.events.lock().await;
        let at = Utc::now();
        let sequence = events.len() as u64;
        events.push(StageEvent {
            sequence,
            stage,
            kind,
            at,
        });
        at
    }

    pub async fn snapshot(&self) -> Vec<StageEvent> {
        self.events.lock().await.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Rejected,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub request_hash: String,
    pub status: RunStatus,
    pub error: Option<String>,
    pub failed_stages: Vec<StageId>,
    pub report_hash: Option<String>,
    pub events: Vec<StageEvent>,
    pub created_at: DateTime<Utc>,
    pub execution_time_ms: u64,
}

pub const DEFAULT_MAX_RECORDS: usize = 1_000;

#[derive(Debug, Default)]
struct AuditStore {
    records: HashMap<Uuid, RunRecord>,
    /// Insertion order, oldest first
    order: VecDeque<Uuid>,
}

/// Audit trail storage, bounded to the most recent `max_records` runs
pub struct AuditLog {
    store: Arc<RwLock<AuditStore>>,
    max_records: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_RECORDS)
    }

    pub fn with_capacity(max_records: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(AuditStore::default())),
            max_records: max_records.max(1),
        }
    }

    /// Store a run record, evicting the oldest past capacity
    pub async fn record(&self, record: RunRecord) -> Result<Uuid> {
        let run_id = record.run_id;
        let mut store = self.store.write().await;

        if store.records.insert(run_id, record).is_none() {
            store.order.push_back(run_id);
        }

        while store.order.len() > self.max_records {
            if let Some(evicted) = store.order.pop_front() {
                store.records.remove(&evicted);
                debug!(run_id = %evicted, "Audit: evicted oldest run record");
            }
        }

        Ok(run_id)
    }

    pub async fn get(&self, run_id: Uuid) -> Result<Option<RunRecord>> {
        let store = self.store.read().await;
        Ok(store.records.get(&run_id).cloned())
    }

    /// Retained run IDs, oldest first
    pub async fn list(&self) -> Result<Vec<Uuid>> {
        let store = self.store.read().await;
        Ok(store.order.iter().copied().collect())
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.records.len()
    }

    pub fn capacity(&self) -> usize {
        self.max_records
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 of the value's JSON encoding, hex encoded
/// Streams the serializer output straight into the hasher
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), value).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
