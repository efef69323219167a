use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::os::{read_full_at, write_all_at};
use crate::partition::ensure_dir;
use crate::types::{FileLogError, Result};

const SEGMENT_PREFIX: &str = "data";

/// Generate a segment filename, e.g. `data000001`
pub fn segment_filename(segment: u16) -> String {
    format!("{SEGMENT_PREFIX}{segment:06}")
}

/// Return the sorted segment numbers present in a partition directory.
pub fn list_segments(dir: &Path) -> Vec<u16> {
    let mut segments: Vec<u16> = std::fs::read_dir(dir)
        .ok()
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name().into_string().ok()?;
            let idx_str = name.strip_prefix(SEGMENT_PREFIX)?;
            if idx_str.len() != 6 {
                return None;
            }
            idx_str.parse().ok()
        })
        .collect();

    segments.sort_unstable();
    segments
}

/// Data file handles of one partition, opened on first reference and kept
/// until close. The write cursor is owned by the engine, not by this store.
#[derive(Debug)]
pub(crate) struct SegmentStore {
    dir: PathBuf,
    /// `None` once closed.
    handles: RwLock<Option<HashMap<u16, Arc<File>>>>,
}

impl SegmentStore {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            handles: RwLock::new(Some(HashMap::new())),
        }
    }

    pub(crate) fn ensure_open(&self, segment: u16) -> Result<Arc<File>> {
        // Try the read lock first
        {
            let map = self.handles.read();
            match map.as_ref() {
                None => return Err(FileLogError::Closed),
                Some(map) => {
                    if let Some(file) = map.get(&segment) {
                        return Ok(file.clone());
                    }
                }
            }
        }

        // Only take the write lock if we need to insert
        let mut map = self.handles.write();
        let map = map.as_mut().ok_or(FileLogError::Closed)?;
        if let Some(file) = map.get(&segment) {
            return Ok(file.clone());
        }
        ensure_dir(&self.dir)?;
        let path = self.dir.join(segment_filename(segment));
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| FileLogError::io(format!("opening segment {path:?}"), e))?;
        debug!("opened segment {path:?}");
        let file = Arc::new(file);
        map.insert(segment, file.clone());
        Ok(file)
    }

    pub(crate) fn write_at(&self, segment: u16, offset: u64, bytes: &[u8]) -> Result<()> {
        let file = self.ensure_open(segment)?;
        write_all_at(&file, bytes, offset).map_err(|e| {
            FileLogError::io(format!("writing segment {segment} at offset {offset}"), e)
        })
    }

    /// Read exactly `len` bytes. Hitting end of file first is an error, since
    /// the index only points at records that were fully written.
    pub(crate) fn read_at(&self, segment: u16, offset: u64, len: usize) -> Result<Vec<u8>> {
        let file = self.ensure_open(segment)?;
        let mut buf = vec![0u8; len];
        let n = read_full_at(&file, &mut buf, offset).map_err(|e| {
            FileLogError::io(format!("reading segment {segment} at offset {offset}"), e)
        })?;
        if n != len {
            return Err(FileLogError::io(
                format!("reading segment {segment} at offset {offset}"),
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("expected {len} bytes, file ended after {n}"),
                ),
            ));
        }
        Ok(buf)
    }

    /// Current size of a segment file in bytes.
    pub(crate) fn file_len(&self, segment: u16) -> Result<u64> {
        let file = self.ensure_open(segment)?;
        let meta = file
            .metadata()
            .map_err(|e| FileLogError::io(format!("reading metadata of segment {segment}"), e))?;
        Ok(meta.len())
    }

    /// Sync one segment if it is open.
    pub(crate) fn sync_segment(&self, segment: u16) -> Result<()> {
        let file = self
            .handles
            .read()
            .as_ref()
            .and_then(|map| map.get(&segment).cloned());
        if let Some(file) = file {
            file.sync_data()
                .map_err(|e| FileLogError::io(format!("syncing segment {segment}"), e))?;
        }
        Ok(())
    }

    pub(crate) fn sync_all(&self) -> Result<()> {
        let files: Vec<(u16, Arc<File>)> = match self.handles.read().as_ref() {
            Some(map) => map.iter().map(|(k, v)| (*k, v.clone())).collect(),
            None => return Err(FileLogError::Closed),
        };
        for (segment, file) in files {
            file.sync_data()
                .map_err(|e| FileLogError::io(format!("syncing segment {segment}"), e))?;
        }
        Ok(())
    }

    pub(crate) fn open_count(&self) -> usize {
        self.handles.read().as_ref().map_or(0, HashMap::len)
    }

    /// Drop every handle. Reads already holding a handle finish on it.
    pub(crate) fn close(&self) {
        self.handles.write().take();
    }
}
