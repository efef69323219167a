use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type SeqId = u64;

pub type Result<T> = std::result::Result<T, FileLogError>;

/// Default number of records per data segment.
pub const DEFAULT_ROWS_PER_SEGMENT: u64 = 1_000_000;

#[derive(Error, Debug)]
pub enum FileLogError {
    #[error("file log instance is closed")]
    Closed,
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed record: expected {expected} bytes, got {actual}")]
    MalformedRecord { expected: usize, actual: usize },
    #[error("corrupted data record in segment {segment} at offset {offset}: sentinel {found}")]
    SentinelMismatch { segment: u16, offset: u64, found: i16 },
    #[error("corrupted data record in segment {segment} at offset {offset}: {reason}")]
    CorruptData {
        segment: u16,
        offset: u64,
        reason: String,
    },
    #[error("corrupted index record {id}: {reason}")]
    CorruptIndex { id: SeqId, reason: String },
    #[error("unsupported index format tag: {0}")]
    UnsupportedFormat(u8),
    #[error("invalid partition date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("payload of {0} bytes does not fit the length field")]
    PayloadTooLarge(usize),
    #[error("segment number {0} exceeds the index format limit")]
    SegmentLimit(u64),
    #[error("writer poisoned: {0}")]
    Poisoned(String),
}

impl FileLogError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        FileLogError::Io {
            context: context.into(),
            source,
        }
    }

    /// True for failures that indicate on-disk damage rather than caller misuse
    /// or an environmental I/O problem.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            FileLogError::SentinelMismatch { .. }
                | FileLogError::CorruptData { .. }
                | FileLogError::CorruptIndex { .. }
                | FileLogError::UnsupportedFormat(_)
        )
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLogOptions {
    /// Records per data file before rotating to the next segment.
    pub rows_per_segment: u64,
    /// `sync_data` the finished segment and the index on rotation.
    pub sync_on_rotate: bool,
}

impl Default for FileLogOptions {
    fn default() -> Self {
        Self {
            rows_per_segment: DEFAULT_ROWS_PER_SEGMENT,
            sync_on_rotate: true,
        }
    }
}

impl FileLogOptions {
    pub fn with_rows_per_segment(mut self, rows: u64) -> Self {
        self.rows_per_segment = rows;
        self
    }

    pub fn with_sync_on_rotate(mut self, sync: bool) -> Self {
        self.sync_on_rotate = sync;
        self
    }
}

/// One record read back from a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Partition date, `YYYY-MM-DD`.
    pub date: String,
    pub id: SeqId,
    /// Seconds since the Unix epoch, as supplied on append.
    pub timestamp: i32,
    pub segment: u16,
    /// Byte offset of the data record header inside its segment file.
    pub offset: u64,
    pub type_tag: i16,
    pub length: u32,
    pub payload: Vec<u8>,
}

pub trait LogCommon: Send + Sync {
    /// Flush the index and every open segment to stable storage.
    fn sync(&self) -> Result<()>;

    /// Watch the committed record count. Each append publishes the new count.
    fn subscribe(&self) -> tokio::sync::watch::Receiver<u64>;

    /// Id the next append will receive, equal to the number of records.
    fn next_id(&self) -> Result<SeqId>;

    fn is_closed(&self) -> bool;
}

pub trait LogWriter: LogCommon {
    /// Append one record and return the id assigned to it.
    fn append(&self, timestamp: i32, type_tag: i16, payload: &[u8]) -> Result<SeqId>;

    /// Append one record stamped with the current UTC time.
    fn append_now(&self, type_tag: i16, payload: &[u8]) -> Result<SeqId> {
        let now = chrono::Utc::now().timestamp();
        let timestamp = i32::try_from(now).unwrap_or(i32::MAX);
        self.append(timestamp, type_tag, payload)
    }
}

pub trait LogReader: LogCommon {
    /// Read the record with the given id. `Ok(None)` marks the end of the log.
    fn read(&self, id: SeqId) -> Result<Option<Entry>>;

    /// Read records in id order starting at `from`, stopping at the end of the log.
    fn iter_from(&self, from: SeqId) -> Box<dyn Iterator<Item = Result<Entry>> + '_>;
}
