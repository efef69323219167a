use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::RwLock;

use crate::codec::{INDEX_FORMAT_V1, INDEX_HEADER_WIDTH, INDEX_RECORD_WIDTH, IndexRecord};
use crate::os::{read_full_at, write_all_at};
use crate::partition::ensure_dir;
use crate::types::{FileLogError, Result, SeqId};

pub const INDEX_FILENAME: &str = "index";

#[derive(Debug)]
enum Handle {
    Unopened,
    Open(Arc<File>),
    Closed,
}

/// The single index file of a partition. Record `id` lives at
/// `INDEX_HEADER_WIDTH + id * INDEX_RECORD_WIDTH`.
#[derive(Debug)]
pub(crate) struct IndexStore {
    dir: PathBuf,
    handle: RwLock<Handle>,
}

pub(crate) fn record_position(id: SeqId) -> u64 {
    INDEX_HEADER_WIDTH + id * INDEX_RECORD_WIDTH as u64
}

impl IndexStore {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            handle: RwLock::new(Handle::Unopened),
        }
    }

    pub(crate) fn path(&self) -> PathBuf {
        self.dir.join(INDEX_FILENAME)
    }

    /// Open the index file, creating the partition directory and stamping the
    /// format tag on a fresh file. Later calls return the same handle.
    pub(crate) fn ensure_open(&self) -> Result<Arc<File>> {
        match &*self.handle.read() {
            Handle::Open(file) => return Ok(file.clone()),
            Handle::Closed => return Err(FileLogError::Closed),
            Handle::Unopened => {}
        }

        let mut handle = self.handle.write();
        match &*handle {
            Handle::Open(file) => Ok(file.clone()),
            Handle::Closed => Err(FileLogError::Closed),
            Handle::Unopened => {
                let file = Arc::new(open_index_file(&self.dir)?);
                *handle = Handle::Open(file.clone());
                Ok(file)
            }
        }
    }

    /// Number of whole records in the file. A torn trailing record left by a
    /// crash mid-write is cut off so the next append lands on a record boundary.
    pub(crate) fn recover_len(&self) -> Result<u64> {
        let file = self.ensure_open()?;
        let path = self.path();
        let size = file
            .metadata()
            .map_err(|e| FileLogError::io(format!("reading metadata of {path:?}"), e))?
            .len();
        let body = size.saturating_sub(INDEX_HEADER_WIDTH);
        let count = body / INDEX_RECORD_WIDTH as u64;
        let torn = body % INDEX_RECORD_WIDTH as u64;
        if torn != 0 {
            warn!("index {path:?} has a torn trailing record of {torn} bytes, truncating");
            file.set_len(record_position(count))
                .map_err(|e| FileLogError::io(format!("truncating {path:?}"), e))?;
        }
        Ok(count)
    }

    pub(crate) fn write(&self, id: SeqId, record: &IndexRecord) -> Result<()> {
        let file = self.ensure_open()?;
        write_all_at(&file, &record.encode(), record_position(id))
            .map_err(|e| FileLogError::io(format!("writing index record {id}"), e))
    }

    /// `Ok(None)` when the file ends exactly at this record's position.
    pub(crate) fn read(&self, id: SeqId) -> Result<Option<IndexRecord>> {
        let file = self.ensure_open()?;
        let mut buf = [0u8; INDEX_RECORD_WIDTH];
        let n = read_full_at(&file, &mut buf, record_position(id))
            .map_err(|e| FileLogError::io(format!("reading index record {id}"), e))?;
        if n == 0 {
            return Ok(None);
        }
        IndexRecord::decode(&buf[..n]).map(Some)
    }

    pub(crate) fn sync(&self) -> Result<()> {
        if let Handle::Open(file) = &*self.handle.read() {
            file.sync_data()
                .map_err(|e| FileLogError::io("syncing index", e))?;
        }
        Ok(())
    }

    pub(crate) fn close(&self) {
        *self.handle.write() = Handle::Closed;
    }
}

fn open_index_file(dir: &Path) -> Result<File> {
    ensure_dir(dir)?;
    let path = dir.join(INDEX_FILENAME);
    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .map_err(|e| FileLogError::io(format!("opening index {path:?}"), e))?;

    let mut tag = [0u8; 1];
    let n = read_full_at(&file, &mut tag, 0)
        .map_err(|e| FileLogError::io(format!("reading format tag of {path:?}"), e))?;
    if n == 0 {
        write_all_at(&file, &[INDEX_FORMAT_V1], 0)
            .map_err(|e| FileLogError::io(format!("writing format tag of {path:?}"), e))?;
        debug!("created index {path:?}");
    } else if tag[0] != INDEX_FORMAT_V1 {
        return Err(FileLogError::UnsupportedFormat(tag[0]));
    } else {
        debug!("opened index {path:?}");
    }
    Ok(file)
}
