use log::error;

use crate::{
    codec::{DATA_HEADER_WIDTH, DataHeader},
    file_log::FileLog,
    types::{Entry, FileLogError, LogReader, Result, SeqId},
};

impl LogReader for FileLog {
    fn read(&self, id: SeqId) -> Result<Option<Entry>> {
        self.ensure_not_closed()?;
        // Ids past the committed count may have a half-written index record.
        if id >= *self.committed.borrow() {
            return Ok(None);
        }
        self.read_entry(id)
    }

    fn iter_from(&self, from: SeqId) -> Box<dyn Iterator<Item = Result<Entry>> + '_> {
        let mut next = from;
        let mut failed = false;
        Box::new(std::iter::from_fn(move || {
            if failed {
                return None;
            }
            match self.read(next) {
                Ok(Some(entry)) => {
                    next += 1;
                    Some(Ok(entry))
                }
                Ok(None) => None,
                Err(e) => {
                    failed = true;
                    Some(Err(e))
                }
            }
        }))
    }
}

impl FileLog {
    /// Index lookup, then header and payload from the segment it points at.
    pub(crate) fn read_entry(&self, id: SeqId) -> Result<Option<Entry>> {
        let Some(pointer) = self.index.read(id)? else {
            return Ok(None);
        };
        let segment = u16::try_from(pointer.segment).map_err(|_| FileLogError::CorruptIndex {
            id,
            reason: format!("negative segment {}", pointer.segment),
        })?;
        let offset = u64::try_from(pointer.offset).map_err(|_| FileLogError::CorruptIndex {
            id,
            reason: format!("negative data offset {}", pointer.offset),
        })?;

        let header_bytes = self.segments.read_at(segment, offset, DATA_HEADER_WIDTH)?;
        let header = DataHeader::decode(&header_bytes)?;
        if !header.is_intact() {
            error!(
                "sentinel mismatch for record {id} in {:?} segment {segment} offset {offset}: {}",
                self.partition.dir(),
                header.sentinel
            );
            return Err(FileLogError::SentinelMismatch {
                segment,
                offset,
                found: header.sentinel,
            });
        }
        let length = u32::try_from(header.length).map_err(|_| FileLogError::CorruptData {
            segment,
            offset,
            reason: format!("negative payload length {}", header.length),
        })?;
        let payload_at = offset + DATA_HEADER_WIDTH as u64;
        let segment_len = self.segments.file_len(segment)?;
        if payload_at + u64::from(length) > segment_len {
            return Err(FileLogError::CorruptData {
                segment,
                offset,
                reason: format!(
                    "payload length {length} runs past the end of the segment ({segment_len} bytes)"
                ),
            });
        }

        let payload = self.segments.read_at(segment, payload_at, length as usize)?;

        Ok(Some(Entry {
            date: self.date.clone(),
            id,
            timestamp: header.timestamp,
            segment,
            offset,
            type_tag: pointer.type_tag,
            length,
            payload,
        }))
    }
}
