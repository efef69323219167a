//! A date-partitioned, segmented, append-only record log.
//!
//! [`FileLog`] stores typed binary records for one calendar day under
//! `<root>/<YYYYMMDD>/`. Every record gets a dense, zero-based **sequence id**
//! and can be read back by that id after any number of restarts.
//!
//! # Layout
//!
//! ```text
//! <root>/<YYYYMMDD>/
//!   index         format tag + one 12-byte record per id
//!   data000000    payloads of ids 0 .. rows_per_segment
//!   data000001    payloads of the next rows_per_segment ids
//!   finish        empty marker, present once the day is closed
//! ```
//!
//! - **Fixed-width index** – id `i` is found at a computed offset, so reads
//!   never scan.
//! - **Segmented** – payloads rotate to a new data file every
//!   `rows_per_segment` records.
//! - **Recoverable** – opening an existing partition rebuilds the write
//!   position from the last indexed record.
//! - **Id watchers** – callers can follow the committed record count through
//!   a [`tokio::sync::watch`] channel.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use filelog::{FileLog, LogReader, LogWriter};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let log = FileLog::open("/tmp/filelog", "2024-01-31")?;
//!
//!     let id = log.append(1_706_659_200, 31, b"hello")?;
//!     let entry = log.read(id)?.expect("just written");
//!     assert_eq!(entry.payload, b"hello");
//!
//!     for entry in log.iter_from(0) {
//!         let entry = entry?;
//!         println!("{} {} {:?}", entry.id, entry.type_tag, entry.payload);
//!     }
//!
//!     log.set_finished()?;
//!     log.close();
//!     Ok(())
//! }
//! ```

#[cfg(test)]
mod tests;

pub mod codec;
mod file_log;
mod index;
mod os;
mod partition;
mod reader;
pub mod segment;
mod types;
mod writer;

pub use file_log::FileLog;
pub use index::INDEX_FILENAME;
pub use partition::{FINISH_FILENAME, Partition};
pub use types::*;
