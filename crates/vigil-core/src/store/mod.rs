//! Persistence of resolved rounds.
//!
//! Every resolution writes one row per raw vote plus one synthetic aggregate row,
//! all keyed by `(target, round)`. The durable backing store is an external
//! collaborator; [`MemoryVoteStore`] keeps a bounded in-process history and
//! [`JsonlVoteStore`] appends rows to a JSON-lines journal.

use crate::types::{ConsensusVerdict, ValidatorId, VoteStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, path::PathBuf};
use thiserror::Error;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};

/// Rows retained by [`MemoryVoteStore`] unless configured otherwise.
pub const DEFAULT_MAX_RECORDS: usize = 10_000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Vote store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of a JSON-lines journal. When unset, rows are kept in memory only.
    #[serde(default)]
    pub path: Option<String>,
}

/// One persisted row. Aggregate rows carry no validator fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRecord {
    pub target: String,
    pub round: i64,
    pub status: VoteStatus,
    pub aggregate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator_id: Option<ValidatorId>,
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl VoteRecord {
    /// Rows for one resolution: every vote in arrival order, then the aggregate.
    #[must_use]
    pub fn rows_for(verdict: &ConsensusVerdict) -> Vec<Self> {
        let mut rows: Vec<Self> = verdict
            .votes
            .iter()
            .map(|vote| Self {
                target: verdict.target.clone(),
                round: verdict.round,
                status: vote.status,
                aggregate: false,
                validator_id: Some(vote.validator_id),
                weight: vote.weight,
                latency_ms: Some(vote.latency_ms),
                location: Some(vote.location.clone()),
                observed_at: vote.observed_at,
            })
            .collect();

        rows.push(Self {
            target: verdict.target.clone(),
            round: verdict.round,
            status: verdict.status,
            aggregate: true,
            validator_id: None,
            weight: verdict.up_weight + verdict.down_weight,
            latency_ms: None,
            location: None,
            observed_at: verdict.observed_at,
        });
        rows
    }
}

/// Sink for resolved rounds.
#[async_trait]
pub trait VoteStore: Send + Sync {
    async fn persist(&self, verdict: &ConsensusVerdict) -> Result<(), StoreError>;
}

/// Bounded in-memory history; oldest rows are evicted first.
pub struct MemoryVoteStore {
    records: RwLock<VecDeque<VoteRecord>>,
    max_records: usize,
}

impl MemoryVoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_RECORDS)
    }

    #[must_use]
    pub fn with_capacity(max_records: usize) -> Self {
        Self { records: RwLock::new(VecDeque::new()), max_records: max_records.max(1) }
    }

    #[must_use]
    pub fn records(&self) -> Vec<VoteRecord> {
        self.records.read().iter().cloned().collect()
    }

    #[must_use]
    pub fn records_for(&self, target: &str, round: i64) -> Vec<VoteRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.target == target && r.round == round)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for MemoryVoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VoteStore for MemoryVoteStore {
    async fn persist(&self, verdict: &ConsensusVerdict) -> Result<(), StoreError> {
        let rows = VoteRecord::rows_for(verdict);
        let mut records = self.records.write();
        for row in rows {
            if records.len() >= self.max_records {
                records.pop_front();
            }
            records.push_back(row);
        }
        Ok(())
    }
}

/// Appends rows to a JSON-lines journal, one row per line.
pub struct JsonlVoteStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlVoteStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl VoteStore for JsonlVoteStore {
    async fn persist(&self, verdict: &ConsensusVerdict) -> Result<(), StoreError> {
        let mut buffer = Vec::new();
        for row in VoteRecord::rows_for(verdict) {
            serde_json::to_writer(&mut buffer, &row)?;
            buffer.push(b'\n');
        }

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(())
    }
}
