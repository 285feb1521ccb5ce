//! Durable Raft state: current term, vote and log.
//!
//! Saved before any RPC response that depends on it is returned, so a restarted node
//! never votes twice in a term or forgets entries it acknowledged. Term and vote are
//! written separately from the log, so an election never rewrites entries.

use super::{
    errors::RaftError,
    types::{Command, LogEntry, NodeId},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use tracing::warn;

/// Term and vote, the part of the state that changes on elections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardState {
    pub current_term: u64,
    pub voted_for: Option<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentState {
    pub current_term: u64,
    pub voted_for: Option<NodeId>,
    #[serde(default)]
    pub entries: Vec<LogEntry>,
}

pub trait RaftStorage: Send + Sync {
    /// Returns the last saved state, or the default for a fresh node.
    ///
    /// # Errors
    ///
    /// Returns [`RaftError::Storage`] if saved state exists but cannot be read.
    fn load(&self) -> Result<PersistentState, RaftError>;

    /// # Errors
    ///
    /// Returns [`RaftError::Storage`] if the term and vote cannot be written.
    fn save_hard_state(&self, hard_state: &HardState) -> Result<(), RaftError>;

    /// Stores `entries` at `first_index` onward. Any stored entry at or after
    /// `first_index` is discarded first.
    ///
    /// # Errors
    ///
    /// Returns [`RaftError::Storage`] if the entries cannot be written.
    fn append_entries(&self, first_index: u64, entries: &[LogEntry]) -> Result<(), RaftError>;
}

/// Volatile storage for tests and single-process clusters.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<PersistentState>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RaftStorage for MemoryStorage {
    fn load(&self) -> Result<PersistentState, RaftError> {
        Ok(self.state.lock().clone())
    }

    fn save_hard_state(&self, hard_state: &HardState) -> Result<(), RaftError> {
        let mut state = self.state.lock();
        state.current_term = hard_state.current_term;
        state.voted_for = hard_state.voted_for;
        Ok(())
    }

    fn append_entries(&self, first_index: u64, entries: &[LogEntry]) -> Result<(), RaftError> {
        let mut state = self.state.lock();
        let keep = usize::try_from(first_index.max(1) - 1).unwrap_or(usize::MAX);
        if keep > state.entries.len() {
            return Err(gap(first_index, state.entries.len()));
        }
        state.entries.truncate(keep);
        state.entries.extend_from_slice(entries);
        Ok(())
    }
}

/// One journal line. A record at an index the journal already holds supersedes that
/// entry and everything after it.
#[derive(Debug, Serialize, Deserialize)]
struct JournalRecord {
    index: u64,
    term: u64,
    command: Command,
}

/// Term and vote in a small JSON file replaced through a temp file and rename, with
/// log entries in an append-only JSON-lines journal next to it (`<path>.log`).
///
/// Conflicting suffixes are never rewritten in place: the replacement records are
/// appended and replay truncates at their index. A torn final line left by a crash
/// is dropped on load.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    journal_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let journal_path = path.with_extension("log");
        Self { path, journal_path, write_lock: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    fn load_hard_state(&self) -> Result<HardState, RaftError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HardState::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn replay_journal(&self) -> Result<Vec<LogEntry>, RaftError> {
        let bytes = match fs::read(&self.journal_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        let mut offset = 0usize;
        let mut torn = false;
        for line in bytes.split_inclusive(|b| *b == b'\n') {
            let is_tail = offset + line.len() == bytes.len();
            match serde_json::from_slice::<JournalRecord>(line) {
                Ok(record) if line.ends_with(b"\n") => {
                    let keep = usize::try_from(record.index.max(1) - 1).unwrap_or(usize::MAX);
                    if keep > entries.len() {
                        return Err(gap(record.index, entries.len()));
                    }
                    entries.truncate(keep);
                    entries.push(LogEntry::new(record.term, record.command));
                }
                Ok(_) => {
                    torn = true;
                    break;
                }
                Err(_) if is_tail => {
                    torn = true;
                    break;
                }
                Err(e) => return Err(e.into()),
            }
            offset += line.len();
        }

        if torn {
            warn!(
                path = %self.journal_path.display(),
                dropped_bytes = bytes.len() - offset,
                "dropping torn record at the end of the raft journal"
            );
            let file = OpenOptions::new().write(true).open(&self.journal_path)?;
            file.set_len(offset as u64)?;
            file.sync_all()?;
        }
        Ok(entries)
    }
}

impl RaftStorage for FileStorage {
    fn load(&self) -> Result<PersistentState, RaftError> {
        let hard_state = self.load_hard_state()?;
        let entries = self.replay_journal()?;
        Ok(PersistentState {
            current_term: hard_state.current_term,
            voted_for: hard_state.voted_for,
            entries,
        })
    }

    fn save_hard_state(&self, hard_state: &HardState) -> Result<(), RaftError> {
        let _guard = self.write_lock.lock();
        create_parent(&self.path)?;

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&serde_json::to_vec(hard_state)?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn append_entries(&self, first_index: u64, entries: &[LogEntry]) -> Result<(), RaftError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut buffer = Vec::new();
        for (offset, entry) in entries.iter().enumerate() {
            let record = JournalRecord {
                index: first_index.max(1) + offset as u64,
                term: entry.term,
                command: entry.command.clone(),
            };
            serde_json::to_writer(&mut buffer, &record)?;
            buffer.push(b'\n');
        }

        let _guard = self.write_lock.lock();
        create_parent(&self.journal_path)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.journal_path)?;
        file.write_all(&buffer)?;
        file.sync_data()?;
        Ok(())
    }
}

fn create_parent(path: &Path) -> Result<(), RaftError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn gap(index: u64, stored: usize) -> RaftError {
    RaftError::Storage(format!("entry {index} leaves a gap after {stored} stored entries"))
}
