//! Audit sinks for storing audit records

use crate::error::{AuditError, AuditResult};
use crate::record::AuditRecord;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Trait for audit sinks
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append a record
    async fn append(&self, record: AuditRecord) -> AuditResult<()>;

    /// Number of records appended through this sink
    fn record_count(&self) -> u64;
}

/// In-memory audit sink
pub struct MemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Create a new memory sink
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    /// Get all records
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }

    /// Records of one kind
    pub fn records_of(&self, kind: &str) -> Vec<AuditRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.kind() == Some(kind))
            .cloned()
            .collect()
    }

    /// Clear all records
    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: AuditRecord) -> AuditResult<()> {
        self.records.write().push(record);
        Ok(())
    }

    fn record_count(&self) -> u64 {
        self.records.read().len() as u64
    }
}

/// File-based audit sink with append-only writes
pub struct FileAuditSink {
    path: PathBuf,
    // Serializes appends so concurrent writers never interleave lines
    write_lock: Mutex<()>,
    count: AtomicU64,
}

impl FileAuditSink {
    /// Create a new file sink, creating parent directories if needed
    pub async fn new(path: impl Into<PathBuf>) -> AuditResult<Self> {
        let path = path.into();
        let existing = if path.exists() {
            Self::count_lines(&path).await?
        } else {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            0
        };
        debug!(path = %path.display(), existing, "Opened audit log");

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
            count: AtomicU64::new(existing),
        })
    }

    async fn count_lines(path: &Path) -> AuditResult<u64> {
        let file = File::open(path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut count = 0u64;
        while let Some(line) = lines.next_line().await? {
            if !line.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all records from file. Lines that do not parse, such as a
    /// write torn by a crash, are skipped with a warning.
    pub async fn read_all(&self) -> AuditResult<Vec<AuditRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut records = Vec::new();

        let mut line_no = 0usize;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = line_no,
                    error = %e,
                    "Skipping malformed audit line"
                ),
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn append(&self, record: AuditRecord) -> AuditResult<()> {
        let mut line = record.to_line()?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        self.count.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    fn record_count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

/// Sink that discards every record
#[derive(Debug, Default)]
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn append(&self, _record: AuditRecord) -> AuditResult<()> {
        Ok(())
    }

    fn record_count(&self) -> u64 {
        0
    }
}

/// Sink that rejects every write
#[derive(Debug, Default)]
pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn append(&self, _record: AuditRecord) -> AuditResult<()> {
        Err(AuditError::Unavailable("sink rejects all writes".into()))
    }

    fn record_count(&self) -> u64 {
        0
    }
}
