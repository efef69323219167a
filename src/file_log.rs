use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::{
    codec::DATA_HEADER_WIDTH,
    index::IndexStore,
    partition::Partition,
    segment::SegmentStore,
    types::{FileLogError, FileLogOptions, LogCommon, Result, SeqId},
};

/// Where the next record goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WriteCursor {
    pub(crate) next_id: SeqId,
    /// Byte offset for the next data record inside segment `next_id / rows_per_segment`.
    pub(crate) offset: u64,
}

#[derive(Debug)]
pub(crate) enum WriterState {
    Open(WriteCursor),
    Poisoned(String),
    Closed,
}

/// Append-only record log for one date partition.
///
/// Opening a partition recovers the write position from the index, so a
/// fresh instance on an existing directory continues where the last one
/// stopped. Appends are serialized by an internal lock; reads of committed
/// records run concurrently with appends.
pub struct FileLog {
    pub(crate) partition: Partition,
    pub(crate) date: String,
    pub(crate) options: FileLogOptions,
    pub(crate) index: IndexStore,
    pub(crate) segments: SegmentStore,
    pub(crate) writer: Mutex<WriterState>,
    pub(crate) closed: AtomicBool,
    /// Committed record count, published after every append.
    pub(crate) committed: watch::Sender<u64>,
}

impl FileLog {
    pub fn open(root: impl AsRef<Path>, date: &str) -> Result<Self> {
        Self::open_with_options(root, date, FileLogOptions::default())
    }

    pub fn open_with_options(
        root: impl AsRef<Path>,
        date: &str,
        mut options: FileLogOptions,
    ) -> Result<Self> {
        if options.rows_per_segment == 0 {
            warn!("rows_per_segment of 0 is not usable, using 1");
            options.rows_per_segment = 1;
        }
        let partition = Partition::new(root, date)?;
        let dir = partition.dir().to_path_buf();
        let (committed, _) = watch::channel(0);

        let log = Self {
            date: partition.date_string(),
            partition,
            options,
            index: IndexStore::new(dir.clone()),
            segments: SegmentStore::new(dir),
            writer: Mutex::new(WriterState::Closed),
            closed: AtomicBool::new(false),
            committed,
        };

        let cursor = log.recover()?;
        info!(
            "opened file log {:?}: {} records, next offset {} in segment {}",
            log.partition.dir(),
            cursor.next_id,
            cursor.offset,
            cursor.next_id / log.options.rows_per_segment
        );
        log.committed.send_replace(cursor.next_id);
        *log.writer.lock() = WriterState::Open(cursor);
        Ok(log)
    }

    /// Rebuild the write cursor from the index. The data offset comes from the
    /// last indexed record, so bytes a crash left past it are overwritten.
    fn recover(&self) -> Result<WriteCursor> {
        let count = self.index.recover_len()?;
        if count == 0 {
            return Ok(WriteCursor {
                next_id: 0,
                offset: 0,
            });
        }

        // The last record is checked even on a segment boundary, so a changed
        // rows_per_segment never resumes inside a segment that holds data.
        let rows = self.options.rows_per_segment;
        let last_id = count - 1;
        let entry = self
            .read_entry(last_id)?
            .ok_or_else(|| FileLogError::CorruptIndex {
                id: last_id,
                reason: "index ends before its own length".to_string(),
            })?;
        let expected = last_id / rows;
        if u64::from(entry.segment) != expected {
            return Err(FileLogError::CorruptIndex {
                id: last_id,
                reason: format!(
                    "stored in segment {} but rows_per_segment {rows} puts it in {expected}",
                    entry.segment
                ),
            });
        }

        let offset = if count % rows == 0 {
            0
        } else {
            entry.offset + DATA_HEADER_WIDTH as u64 + u64::from(entry.length)
        };
        Ok(WriteCursor {
            next_id: count,
            offset,
        })
    }

    /// Segment number holding `id`, bounded by the i16 field of the index record.
    pub(crate) fn segment_for(&self, id: SeqId) -> Result<u16> {
        let segment = id / self.options.rows_per_segment;
        match u16::try_from(segment) {
            Ok(s) if s <= i16::MAX as u16 => Ok(s),
            _ => Err(FileLogError::SegmentLimit(segment)),
        }
    }

    pub(crate) fn ensure_not_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FileLogError::Closed);
        }
        Ok(())
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Partition date as `YYYY-MM-DD`.
    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn options(&self) -> &FileLogOptions {
        &self.options
    }

    /// Release every file handle. Later operations fail with
    /// [`FileLogError::Closed`]; closing again does nothing.
    pub fn close(&self) {
        let mut writer = self.writer.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        *writer = WriterState::Closed;
        self.index.close();
        self.segments.close();
        info!("closed file log {:?}", self.partition.dir());
    }

    pub fn set_finished(&self) -> Result<()> {
        self.ensure_not_closed()?;
        self.partition.set_finished()
    }

    /// See [`Partition::is_finished`].
    pub fn is_finished(&self, strict: bool) -> Result<bool> {
        self.ensure_not_closed()?;
        self.partition.is_finished(strict)
    }
}

impl LogCommon for FileLog {
    fn sync(&self) -> Result<()> {
        self.ensure_not_closed()?;
        self.index.sync()?;
        self.segments.sync_all()
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.committed.subscribe()
    }

    fn next_id(&self) -> Result<SeqId> {
        self.ensure_not_closed()?;
        Ok(*self.committed.borrow())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for FileLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLog")
            .field("dir", &self.partition.dir())
            .field("options", &self.options)
            .field("committed", &*self.committed.borrow())
            .field("closed", &self.is_closed())
            .finish()
    }
}
