//! # log
//!
//! why: manage the append-only log of commands that raft replicates
//! relations: owned by node.rs, persisted via raft-storage
//! what: LogEntry struct, RaftLog with consistency checks and suffix truncation

use serde::{Deserialize, Serialize};

use crate::RaftError;

/// A single entry in the replicated log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The term when this entry was created
    pub term: u64,
    /// The index of this entry in the log (1-indexed)
    pub index: u64,
    /// The command to be applied to the state machine
    pub command: Vec<u8>,
}

impl LogEntry {
    /// Create a new log entry
    pub fn new(term: u64, index: u64, command: Vec<u8>) -> Self {
        Self {
            term,
            index,
            command,
        }
    }

    /// An entry with no command, appended by a fresh leader so that entries
    /// from earlier terms can be committed through it.
    pub fn blank(term: u64, index: u64) -> Self {
        Self::new(term, index, Vec::new())
    }

    pub fn is_blank(&self) -> bool {
        self.command.is_empty()
    }
}

/// In-memory view of the replicated log.
///
/// Indices are 1-based and contiguous: the entry at position `i` of the
/// backing vector always has index `i + 1`. Index 0 is the empty prefix with
/// term 0.
#[derive(Debug, Clone, Default)]
pub struct RaftLog {
    entries: Vec<LogEntry>,
}

impl RaftLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from persisted entries. Entries must be contiguous from 1.
    pub fn from_entries(entries: Vec<LogEntry>) -> Result<Self, RaftError> {
        for (pos, entry) in entries.iter().enumerate() {
            let expected = pos as u64 + 1;
            if entry.index != expected {
                return Err(RaftError::LogGap {
                    expected,
                    found: entry.index,
                });
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_index(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn last_term(&self) -> u64 {
        self.entries.last().map_or(0, |e| e.term)
    }

    /// Term of the entry at `index`; `Some(0)` for index 0, `None` past the end.
    pub fn term_at(&self, index: u64) -> Option<u64> {
        if index == 0 {
            return Some(0);
        }
        self.get(index).map(|e| e.term)
    }

    pub fn get(&self, index: u64) -> Option<&LogEntry> {
        if index == 0 {
            return None;
        }
        self.entries.get(index as usize - 1)
    }

    /// Up to `max` entries starting at `index` (inclusive).
    pub fn entries_from(&self, index: u64, max: usize) -> Vec<LogEntry> {
        let start = index.max(1) as usize - 1;
        if start >= self.entries.len() {
            return Vec::new();
        }
        self.entries[start..].iter().take(max).cloned().collect()
    }

    /// Entries in `(after, through]`.
    pub fn slice(&self, after: u64, through: u64) -> &[LogEntry] {
        let start = (after as usize).min(self.entries.len());
        let end = (through as usize).min(self.entries.len());
        if start >= end {
            return &[];
        }
        &self.entries[start..end]
    }

    /// True if the log holds `prev_index` with `prev_term`.
    pub fn matches(&self, prev_index: u64, prev_term: u64) -> bool {
        self.term_at(prev_index) == Some(prev_term)
    }

    /// Raft's "at least as up to date" comparison from the point of view of
    /// a voter holding this log.
    pub fn is_up_to_date(&self, last_log_index: u64, last_log_term: u64) -> bool {
        let our_term = self.last_term();
        last_log_term > our_term || (last_log_term == our_term && last_log_index >= self.last_index())
    }

    pub fn push(&mut self, entry: LogEntry) {
        debug_assert_eq!(entry.index, self.last_index() + 1);
        self.entries.push(entry);
    }

    /// Drop every entry with index >= `from_index`.
    pub fn truncate_from(&mut self, from_index: u64) {
        let keep = from_index.saturating_sub(1) as usize;
        self.entries.truncate(keep);
    }
}
