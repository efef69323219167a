//! Fixed-layout, big-endian encoding of index records and data record headers.
//!
//! ```text
//! index record (12 bytes):  segment i16 | data offset i64 | type tag i16
//! data record (10 + len):   sentinel i16 | timestamp i32 | length i32 | payload
//! ```
//!
//! Decoders require input of exactly the fixed width and fail with
//! [`FileLogError::MalformedRecord`] otherwise. Value checks (sentinel,
//! sign of offsets) belong to the caller.

use bytes::{Buf, BufMut};

use crate::types::{FileLogError, Result};

/// Leading byte of every index file.
pub const INDEX_FORMAT_V1: u8 = 1;
pub const INDEX_HEADER_WIDTH: u64 = 1;
pub const INDEX_RECORD_WIDTH: usize = 12;
pub const DATA_HEADER_WIDTH: usize = 10;
/// Magic value at the start of every data record.
pub const DATA_SENTINEL: i16 = 19334;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRecord {
    pub segment: i16,
    pub offset: i64,
    pub type_tag: i16,
}

impl IndexRecord {
    pub fn encode(&self) -> [u8; INDEX_RECORD_WIDTH] {
        let mut out = [0u8; INDEX_RECORD_WIDTH];
        let mut buf = &mut out[..];
        buf.put_i16(self.segment);
        buf.put_i64(self.offset);
        buf.put_i16(self.type_tag);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        check_width(INDEX_RECORD_WIDTH, bytes.len())?;
        let mut buf = bytes;
        Ok(Self {
            segment: buf.get_i16(),
            offset: buf.get_i64(),
            type_tag: buf.get_i16(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    pub sentinel: i16,
    pub timestamp: i32,
    pub length: i32,
}

impl DataHeader {
    pub fn new(timestamp: i32, length: i32) -> Self {
        Self {
            sentinel: DATA_SENTINEL,
            timestamp,
            length,
        }
    }

    pub fn encode(&self) -> [u8; DATA_HEADER_WIDTH] {
        let mut out = [0u8; DATA_HEADER_WIDTH];
        let mut buf = &mut out[..];
        buf.put_i16(self.sentinel);
        buf.put_i32(self.timestamp);
        buf.put_i32(self.length);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        check_width(DATA_HEADER_WIDTH, bytes.len())?;
        let mut buf = bytes;
        Ok(Self {
            sentinel: buf.get_i16(),
            timestamp: buf.get_i32(),
            length: buf.get_i32(),
        })
    }

    pub fn is_intact(&self) -> bool {
        self.sentinel == DATA_SENTINEL
    }
}

/// Header and payload combined into one buffer so the segment sees a single write.
pub fn encode_data_record(timestamp: i32, payload: &[u8]) -> Result<Vec<u8>> {
    let length =
        i32::try_from(payload.len()).map_err(|_| FileLogError::PayloadTooLarge(payload.len()))?;
    let mut out = Vec::with_capacity(DATA_HEADER_WIDTH + payload.len());
    out.extend_from_slice(&DataHeader::new(timestamp, length).encode());
    out.extend_from_slice(payload);
    Ok(out)
}

fn check_width(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(FileLogError::MalformedRecord { expected, actual });
    }
    Ok(())
}
