//! In-memory replicated log, indexed from 1. Index 0 is the empty-log sentinel with term 0.

use super::types::LogEntry;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RaftLog {
    entries: Vec<LogEntry>,
}

impl RaftLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_entries(entries: Vec<LogEntry>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn last_index(&self) -> u64 {
        self.entries.len() as u64
    }

    #[must_use]
    pub fn last_term(&self) -> u64 {
        self.entries.last().map_or(0, |e| e.term)
    }

    /// Term at `index`; `Some(0)` for the sentinel, `None` past the end.
    #[must_use]
    pub fn term_at(&self, index: u64) -> Option<u64> {
        if index == 0 {
            return Some(0);
        }
        self.get(index).map(|e| e.term)
    }

    #[must_use]
    pub fn get(&self, index: u64) -> Option<&LogEntry> {
        let position = usize::try_from(index.checked_sub(1)?).ok()?;
        self.entries.get(position)
    }

    /// Up to `max` entries starting at `index`.
    #[must_use]
    pub fn entries_from(&self, index: u64, max: usize) -> Vec<LogEntry> {
        let start = usize::try_from(index.max(1) - 1).unwrap_or(usize::MAX);
        self.entries.iter().skip(start).take(max).cloned().collect()
    }

    /// Appends one entry and returns its index.
    pub fn append(&mut self, entry: LogEntry) -> u64 {
        self.entries.push(entry);
        self.last_index()
    }

    /// Drops every entry after `last_index`.
    pub fn truncate(&mut self, last_index: u64) {
        self.entries.truncate(usize::try_from(last_index).unwrap_or(usize::MAX));
    }

    /// Whether the log holds an entry at `prev_index` with `prev_term`.
    #[must_use]
    pub fn matches(&self, prev_index: u64, prev_term: u64) -> bool {
        self.term_at(prev_index) == Some(prev_term)
    }

    /// Writes leader entries after `prev_index`.
    ///
    /// An existing entry that conflicts (same index, different term) is deleted along
    /// with everything after it. Entries already present are left alone, so a stale
    /// or reordered request never truncates a longer matching log.
    ///
    /// Returns the first index that was written; everything from there to the end of
    /// the log is new. `None` means the log already held every entry.
    pub fn merge(&mut self, prev_index: u64, entries: Vec<LogEntry>) -> Option<u64> {
        let mut first_written = None;
        for (offset, entry) in entries.into_iter().enumerate() {
            let index = prev_index + offset as u64 + 1;
            match self.term_at(index) {
                Some(term) if term == entry.term => continue,
                Some(_) => {
                    let keep = usize::try_from(index - 1).unwrap_or(usize::MAX);
                    self.entries.truncate(keep);
                    self.entries.push(entry);
                }
                None => self.entries.push(entry),
            }
            first_written.get_or_insert(index);
        }
        first_written
    }

    /// Election restriction: a candidate's log is at least as up to date as ours when its
    /// last term is higher, or equal with an index at least as long.
    #[must_use]
    pub fn is_up_to_date(&self, last_log_index: u64, last_log_term: u64) -> bool {
        let our_term = self.last_term();
        last_log_term > our_term || (last_log_term == our_term && last_log_index >= self.last_index())
    }
}
