use log::{error, info, warn};

use crate::{
    codec::{IndexRecord, encode_data_record},
    file_log::{FileLog, WriteCursor, WriterState},
    types::{FileLogError, LogWriter, Result, SeqId},
};

impl LogWriter for FileLog {
    /// Returns the id of the record just written. [`LogCommon::next_id`]
    /// reports the record count, one past the last id.
    ///
    /// [`LogCommon::next_id`]: crate::LogCommon::next_id
    fn append(&self, timestamp: i32, type_tag: i16, payload: &[u8]) -> Result<SeqId> {
        let record = encode_data_record(timestamp, payload)?;

        let mut state = self.writer.lock();
        let result = match &mut *state {
            WriterState::Open(cursor) => self.append_at(cursor, type_tag, &record),
            WriterState::Poisoned(reason) => return Err(FileLogError::Poisoned(reason.clone())),
            WriterState::Closed => return Err(FileLogError::Closed),
        };

        if let Err(FileLogError::Poisoned(reason)) = &result {
            error!("file log {:?} writer poisoned: {reason}", self.partition.dir());
            *state = WriterState::Poisoned(reason.clone());
        }
        result
    }
}

impl FileLog {
    /// Data record first, index record second. A crash between the two leaves
    /// an unindexed data record that reads never reach.
    fn append_at(&self, cursor: &mut WriteCursor, type_tag: i16, record: &[u8]) -> Result<SeqId> {
        let id = cursor.next_id;
        let segment = self.segment_for(id)?;

        // The cursor may never point past the end of the segment, or the
        // record would land after a hole.
        let segment_len = self.segments.file_len(segment)?;
        if cursor.offset > segment_len {
            return Err(FileLogError::Poisoned(format!(
                "write offset {} is past the end of segment {segment} ({segment_len} bytes)",
                cursor.offset
            )));
        }

        self.segments.write_at(segment, cursor.offset, record)?;
        let pointer = IndexRecord {
            segment: segment as i16,
            offset: cursor.offset as i64,
            type_tag,
        };
        self.index.write(id, &pointer)?;

        cursor.next_id = id + 1;
        let rotated = cursor.next_id % self.options.rows_per_segment == 0;
        if rotated {
            cursor.offset = 0;
        } else {
            cursor.offset += record.len() as u64;
        }
        self.committed.send_replace(cursor.next_id);

        if rotated {
            self.finish_segment(segment);
        }
        Ok(id)
    }

    fn finish_segment(&self, segment: u16) {
        info!(
            "file log rotation: partition {} segment {} -> {}",
            self.date,
            segment,
            u32::from(segment) + 1
        );
        if !self.options.sync_on_rotate {
            return;
        }
        // The record is already committed, so a failed sync is only reported.
        if let Err(e) = self
            .segments
            .sync_segment(segment)
            .and_then(|_| self.index.sync())
        {
            warn!("failed to sync finished segment {segment}: {e}");
        }
    }
}
