use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::info;

use crate::types::{FileLogError, Result};

pub const FINISH_FILENAME: &str = "finish";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Create the partition directory if it is missing.
pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        std::fs::create_dir_all(dir)
            .map_err(|e| FileLogError::io(format!("creating partition dir {dir:?}"), e))?;
        info!("created partition dir {dir:?}");
    }
    Ok(())
}

/// One `(root, date)` pair and the directory `<root>/<YYYYMMDD>` holding its
/// files. The finish marker can be read and set through this type alone,
/// without opening the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    root: PathBuf,
    date: NaiveDate,
    dir: PathBuf,
}

impl Partition {
    /// `date` must be `YYYY-MM-DD`.
    pub fn new(root: impl AsRef<Path>, date: &str) -> Result<Self> {
        let parsed = NaiveDate::parse_from_str(date, DATE_FORMAT)
            .map_err(|_| FileLogError::InvalidDate(date.to_string()))?;
        Ok(Self::from_date(root, parsed))
    }

    pub fn from_date(root: impl AsRef<Path>, date: NaiveDate) -> Self {
        let root = root.as_ref().to_path_buf();
        let dir = root.join(date.format("%Y%m%d").to_string());
        Self { root, date, dir }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// The date as `YYYY-MM-DD`.
    pub fn date_string(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn marker_path(&self) -> PathBuf {
        self.dir.join(FINISH_FILENAME)
    }

    /// Mark the partition closed to further writers. Idempotent.
    pub fn set_finished(&self) -> Result<()> {
        ensure_dir(&self.dir)?;
        let path = self.marker_path();
        std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| FileLogError::io(format!("creating marker {path:?}"), e))?;
        info!("partition {} marked finished", self.date_string());
        Ok(())
    }

    /// With `strict`, only the marker file counts. Otherwise a partition
    /// dated before today is also treated as finished.
    pub fn is_finished(&self, strict: bool) -> Result<bool> {
        self.is_finished_on(strict, chrono::Local::now().date_naive())
    }

    pub(crate) fn is_finished_on(&self, strict: bool, today: NaiveDate) -> Result<bool> {
        let path = self.marker_path();
        let exists = path
            .try_exists()
            .map_err(|e| FileLogError::io(format!("checking marker {path:?}"), e))?;
        if exists {
            return Ok(true);
        }
        Ok(!strict && self.date < today)
    }
}
