//! # raft-storage
//!
//! why: keep term, vote and log durable so a restarted node rejoins with the state it voted with
//! relations: fed by raft-core's `Ready`, opened by seqlog-broker's cluster coordinator
//! what: Storage trait, FileStorage implementation, InMemoryStorage for testing

use raft_core::{HardState, LogEntry, NodeId, Ready};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage i/o failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode or decode stored state: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("stored log is corrupt at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// trait for durable storage of raft state
///
/// implementations must make every write durable before returning: the
/// caller answers votes and appends straight after.
pub trait Storage: Send {
    /// persist the current term and voted_for
    fn save_term_and_vote(&mut self, term: u64, voted_for: Option<NodeId>) -> StorageResult<()>;

    /// load the persisted term and voted_for
    fn load_term_and_vote(&self) -> StorageResult<(u64, Option<NodeId>)>;

    /// append entries to the end of the log
    fn append_entries(&mut self, entries: &[LogEntry]) -> StorageResult<()>;

    /// load all log entries (for crash recovery)
    fn load_log(&self) -> StorageResult<Vec<LogEntry>>;

    /// drop every entry with index >= from_index (for conflict resolution)
    fn truncate_log_from(&mut self, from_index: u64) -> StorageResult<()>;

    /// clear all persisted state
    fn clear(&mut self) -> StorageResult<()>;

    /// write out the durable part of a node's `Ready`, in order
    fn persist(&mut self, ready: &Ready) -> StorageResult<()> {
        if let Some(hs) = ready.hard_state {
            self.save_term_and_vote(hs.term, hs.voted_for)?;
        }
        if let Some(from) = ready.truncate_from {
            self.truncate_log_from(from)?;
        }
        if let Some(first) = ready.entries.first() {
            // entries always extend the stored log; drop anything they replace
            if ready.truncate_from.map_or(true, |t| t > first.index) {
                self.truncate_log_from(first.index)?;
            }
            self.append_entries(&ready.entries)?;
        }
        Ok(())
    }

    /// everything needed to rebuild a node after a restart
    fn load(&self) -> StorageResult<(HardState, Vec<LogEntry>)> {
        let (term, voted_for) = self.load_term_and_vote()?;
        Ok((HardState { term, voted_for }, self.load_log()?))
    }
}

// -- file storage implementation --

/// file-based storage implementation using std::fs
///
/// stores raft state in a directory with:
/// - meta.json: term and voted_for, replaced atomically
/// - log.jsonl: one log entry per line, append-only except on truncation
pub struct FileStorage {
    /// directory path for storing state files
    dir: PathBuf,
    /// highest index currently on disk, so truncation past the end is free
    last_index: u64,
}

/// metadata structure for term and vote
#[derive(serde::Serialize, serde::Deserialize, Default)]
struct MetaData {
    term: u64,
    voted_for: Option<NodeId>,
}

impl FileStorage {
    /// open (or create) a filestorage rooted at the given directory
    pub fn new(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        let mut storage = Self { dir, last_index: 0 };
        let (log, torn) = storage.read_log()?;
        if torn {
            // later appends must not land behind a half-written line
            storage.write_log(&log)?;
        }
        storage.last_index = log.last().map_or(0, |e| e.index);
        Ok(storage)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join("meta.json")
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join("log.jsonl")
    }

    /// parse log.jsonl; the flag is set if a torn final line was dropped
    fn read_log(&self) -> StorageResult<(Vec<LogEntry>, bool)> {
        let path = self.log_path();
        if !path.exists() {
            return Ok((Vec::new(), false));
        }
        let file = File::open(&path).map_err(|e| io_err(&path, e))?;
        let lines: Vec<String> = BufReader::new(file)
            .lines()
            .collect::<io::Result<_>>()
            .map_err(|e| io_err(&path, e))?;

        let mut log = Vec::with_capacity(lines.len());
        let count = lines.len();
        for (n, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogEntry>(line) {
                Ok(entry) => log.push(entry),
                // a torn final line is a write that never returned; drop it
                Err(_) if n + 1 == count => return Ok((log, true)),
                Err(e) => {
                    return Err(StorageError::Corrupt {
                        line: n + 1,
                        reason: e.to_string(),
                    })
                }
            }
        }
        Ok((log, false))
    }

    fn write_log(&self, log: &[LogEntry]) -> StorageResult<()> {
        let mut buf = Vec::new();
        for entry in log {
            serde_json::to_writer(&mut buf, entry)?;
            buf.push(b'\n');
        }
        self.replace_file(&self.log_path(), &buf)
    }

    /// write `bytes` to `target` via a synced temp file and a rename
    fn replace_file(&self, target: &Path, bytes: &[u8]) -> StorageResult<()> {
        let temp_path = target.with_extension("tmp");
        let mut file = File::create(&temp_path).map_err(|e| io_err(&temp_path, e))?;
        file.write_all(bytes).map_err(|e| io_err(&temp_path, e))?;
        file.sync_all().map_err(|e| io_err(&temp_path, e))?;
        fs::rename(&temp_path, target).map_err(|e| io_err(target, e))?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn save_term_and_vote(&mut self, term: u64, voted_for: Option<NodeId>) -> StorageResult<()> {
        let meta = MetaData { term, voted_for };
        let json = serde_json::to_vec_pretty(&meta)?;
        self.replace_file(&self.meta_path(), &json)
    }

    fn load_term_and_vote(&self) -> StorageResult<(u64, Option<NodeId>)> {
        let path = self.meta_path();
        if !path.exists() {
            return Ok((0, None)); // default for new nodes
        }
        let contents = fs::read(&path).map_err(|e| io_err(&path, e))?;
        let meta: MetaData = serde_json::from_slice(&contents)?;
        Ok((meta.term, meta.voted_for))
    }

    fn append_entries(&mut self, entries: &[LogEntry]) -> StorageResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let path = self.log_path();
        let mut buf = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buf, entry)?;
            buf.push(b'\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        file.write_all(&buf).map_err(|e| io_err(&path, e))?;
        file.sync_data().map_err(|e| io_err(&path, e))?;

        if let Some(last) = entries.last() {
            self.last_index = last.index;
        }
        Ok(())
    }

    fn load_log(&self) -> StorageResult<Vec<LogEntry>> {
        Ok(self.read_log()?.0)
    }

    fn truncate_log_from(&mut self, from_index: u64) -> StorageResult<()> {
        if from_index > self.last_index {
            return Ok(());
        }
        let mut log = self.load_log()?;
        log.retain(|e| e.index < from_index);
        self.write_log(&log)?;
        self.last_index = log.last().map_or(0, |e| e.index);
        Ok(())
    }

    fn clear(&mut self) -> StorageResult<()> {
        let _ = fs::remove_file(self.meta_path());
        let _ = fs::remove_file(self.log_path());
        self.last_index = 0;
        Ok(())
    }
}

fn io_err(path: &Path, source: io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// -- in-memory storage implementation --

/// in-memory storage for testing
///
/// stores all state in memory, no persistence across restarts
#[derive(Debug, Default, Clone)]
pub struct InMemoryStorage {
    term: u64,
    voted_for: Option<NodeId>,
    log: Vec<LogEntry>,
}

impl InMemoryStorage {
    /// create a new in-memory storage
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for InMemoryStorage {
    fn save_term_and_vote(&mut self, term: u64, voted_for: Option<NodeId>) -> StorageResult<()> {
        self.term = term;
        self.voted_for = voted_for;
        Ok(())
    }

    fn load_term_and_vote(&self) -> StorageResult<(u64, Option<NodeId>)> {
        Ok((self.term, self.voted_for))
    }

    fn append_entries(&mut self, entries: &[LogEntry]) -> StorageResult<()> {
        self.log.extend(entries.iter().cloned());
        Ok(())
    }

    fn load_log(&self) -> StorageResult<Vec<LogEntry>> {
        Ok(self.log.clone())
    }

    fn truncate_log_from(&mut self, from_index: u64) -> StorageResult<()> {
        self.log.retain(|e| e.index < from_index);
        Ok(())
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.term = 0;
        self.voted_for = None;
        self.log.clear();
        Ok(())
    }
}
