use std::path::Path;
use std::time::Duration;

use crate::{
    Entry, FileLog, FileLogError, FileLogOptions, LogCommon, LogReader, LogWriter, Partition,
    codec::DATA_SENTINEL, segment::list_segments,
};

fn open_rows(root: &Path, date: &str, rows: u64) -> FileLog {
    FileLog::open_with_options(
        root,
        date,
        FileLogOptions::default().with_rows_per_segment(rows),
    )
    .unwrap()
}

#[test]
fn test_file_log() {
    let root = tempfile::tempdir().unwrap();
    let log = FileLog::open(root.path(), "2021-12-12").unwrap();

    let id = log.append(1_639_267_200, 31, b"2021-12-12 00:00:00").unwrap();
    assert_eq!(id, 0);
    let id = log.append(1_639_267_201, 32, b"2021-12-12 00:00:01").unwrap();
    assert_eq!(id, 1);
    assert_eq!(log.next_id().unwrap(), 2);

    let entry = log.read(0).unwrap().unwrap();
    assert_eq!(entry.date, "2021-12-12");
    assert_eq!(entry.timestamp, 1_639_267_200);
    assert_eq!(entry.type_tag, 31);
    assert_eq!(entry.payload, b"2021-12-12 00:00:00");

    // End of log is not an error.
    assert!(log.read(2).unwrap().is_none());

    log.close();
    assert!(matches!(log.read(0), Err(FileLogError::Closed)));
    assert!(root.path().join("20211212").join("index").exists());
    assert!(root.path().join("20211212").join("data000000").exists());
}

#[test]
fn test_round_trip_arbitrary_payloads() {
    let root = tempfile::tempdir().unwrap();
    let log = open_rows(root.path(), "2024-02-29", 5);

    let payloads: Vec<Vec<u8>> = vec![
        vec![],
        vec![0],
        (0..=255).collect(),
        vec![0xff; 4096],
        DATA_SENTINEL.to_be_bytes().repeat(20),
        b"\n\r\0 tail".to_vec(),
    ];
    for (i, payload) in payloads.iter().enumerate() {
        let id = log.append(-(i as i32), i16::MIN + i as i16, payload).unwrap();
        assert_eq!(id, i as u64);
    }
    for (i, payload) in payloads.iter().enumerate() {
        let entry = log.read(i as u64).unwrap().unwrap();
        assert_eq!(&entry.payload, payload);
        assert_eq!(entry.length as usize, payload.len());
        assert_eq!(entry.timestamp, -(i as i32));
        assert_eq!(entry.type_tag, i16::MIN + i as i16);
    }
}

#[test]
fn test_segment_rotation() {
    let root = tempfile::tempdir().unwrap();
    let log = open_rows(root.path(), "2024-06-15", 3);
    for i in 0..7 {
        log.append(i, 0, format!("record {i}").as_bytes()).unwrap();
    }

    assert_eq!(list_segments(log.partition().dir()), vec![0, 1, 2]);
    let segments: Vec<u16> = log.iter_from(0).map(|e| e.unwrap().segment).collect();
    assert_eq!(segments, vec![0, 0, 0, 1, 1, 1, 2]);

    // Every segment starts at offset 0.
    for id in [0, 3, 6] {
        assert_eq!(log.read(id).unwrap().unwrap().offset, 0);
    }
}

#[test]
fn test_recovery_continues_ids() {
    let root = tempfile::tempdir().unwrap();
    let date = "2024-06-16";
    let written: Vec<Vec<u8>> = (0..8).map(|i| vec![i as u8; i + 1]).collect();

    {
        let log = open_rows(root.path(), date, 3);
        for (i, payload) in written.iter().enumerate() {
            log.append(i as i32, 7, payload).unwrap();
        }
        log.sync().unwrap();
        log.close();
    }

    let log = open_rows(root.path(), date, 3);
    assert_eq!(log.next_id().unwrap(), 8);
    assert_eq!(log.append(99, 8, b"after restart").unwrap(), 8);

    for (i, payload) in written.iter().enumerate() {
        let entry = log.read(i as u64).unwrap().unwrap();
        assert_eq!(&entry.payload, payload);
        assert_eq!(entry.timestamp, i as i32);
    }
    assert_eq!(log.read(8).unwrap().unwrap().payload, b"after restart");
    assert!(log.read(9).unwrap().is_none());
}

#[test]
fn test_recovery_after_drop_without_close() {
    let root = tempfile::tempdir().unwrap();
    let date = "2024-06-17";
    {
        let log = FileLog::open(root.path(), date).unwrap();
        log.append(1, 1, b"one").unwrap();
        log.append(2, 1, b"two").unwrap();
    }
    let log = FileLog::open(root.path(), date).unwrap();
    assert_eq!(log.append(3, 1, b"three").unwrap(), 2);
    let payloads: Vec<Vec<u8>> = log.iter_from(0).map(|e| e.unwrap().payload).collect();
    assert_eq!(
        payloads,
        vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
    );
}

#[test]
fn test_corruption_detected() {
    let root = tempfile::tempdir().unwrap();
    let log = FileLog::open(root.path(), "2024-07-01").unwrap();
    log.append(1, 1, b"first").unwrap();
    log.append(2, 1, b"second").unwrap();

    // Overwrite the sentinel of record 1.
    let second = log.read(1).unwrap().unwrap();
    let data = log.partition().dir().join("data000000");
    let mut bytes = std::fs::read(&data).unwrap();
    let at = second.offset as usize;
    bytes[at..at + 2].copy_from_slice(&1234i16.to_be_bytes());
    std::fs::write(&data, bytes).unwrap();

    let err = log.read(1).unwrap_err();
    assert!(
        matches!(
            err,
            FileLogError::SentinelMismatch {
                segment: 0,
                found: 1234,
                ..
            }
        ),
        "{err}"
    );
    assert!(err.is_corruption());

    // Other records are unaffected.
    assert_eq!(log.read(0).unwrap().unwrap().payload, b"first");
}

#[test]
fn test_finish_marker_for_yesterday() {
    let root = tempfile::tempdir().unwrap();
    let today = chrono::NaiveDate::from_ymd_opt(2024, 6, 20).unwrap();
    let log = FileLog::open(root.path(), "2024-06-19").unwrap();
    let partition = log.partition();
    assert!(partition.is_finished_on(false, today).unwrap());
    assert!(!partition.is_finished_on(true, today).unwrap());
    assert!(!log.is_finished(true).unwrap());

    log.set_finished().unwrap();
    assert!(partition.is_finished_on(false, today).unwrap());
    assert!(partition.is_finished_on(true, today).unwrap());

    // A consumer without an engine sees the same marker.
    let partition = Partition::new(root.path(), "2024-06-19").unwrap();
    assert!(partition.is_finished(true).unwrap());
    assert!(partition.is_finished(false).unwrap());
}

#[test]
fn test_finish_marker_for_today() {
    let root = tempfile::tempdir().unwrap();
    let today = chrono::NaiveDate::from_ymd_opt(2024, 6, 20).unwrap();
    let log = FileLog::open(root.path(), "2024-06-20").unwrap();
    let partition = log.partition();
    assert!(!partition.is_finished_on(false, today).unwrap());
    assert!(!partition.is_finished_on(true, today).unwrap());

    log.set_finished().unwrap();
    assert!(partition.is_finished_on(false, today).unwrap());
    assert!(partition.is_finished_on(true, today).unwrap());
    assert!(log.is_finished(true).unwrap());
}

#[test]
fn test_concurrent_readers_open_segments() {
    let root = tempfile::tempdir().unwrap();
    let log = open_rows(root.path(), "2024-08-08", 2);
    for i in 0..20 {
        log.append(i, 0, format!("{i}").as_bytes()).unwrap();
    }
    log.close();

    // A fresh instance has no segment open, so readers race to open them.
    let log = open_rows(root.path(), "2024-08-08", 2);
    std::thread::scope(|s| {
        for t in 0..4u64 {
            let log = &log;
            s.spawn(move || {
                for id in (0..20u64).rev() {
                    let id = (id + t * 5) % 20;
                    let entry: Entry = log.read(id).unwrap().unwrap();
                    assert_eq!(entry.payload, id.to_string().as_bytes());
                }
            });
        }
        s.spawn(|| {
            for i in 20..40 {
                log.append(i, 0, format!("{i}").as_bytes()).unwrap();
            }
        });
    });
    assert_eq!(log.next_id().unwrap(), 40);
    assert_eq!(log.segments.open_count(), 20);
}

#[test]
fn test_options_from_config() {
    let options: FileLogOptions = serde_json::from_str(r#"{"rows_per_segment": 500}"#).unwrap();
    assert_eq!(options.rows_per_segment, 500);
    assert!(options.sync_on_rotate);

    let options: FileLogOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(options, FileLogOptions::default());
}

#[tokio::test]
async fn test_id_watcher() {
    let root = tempfile::tempdir().unwrap();
    let log = std::sync::Arc::new(FileLog::open(root.path(), "2024-09-09").unwrap());
    log.append(1, 1, b"before").unwrap();

    let mut watcher = log.subscribe();
    assert_eq!(*watcher.borrow_and_update(), 1);

    let writer = log.clone();
    let handle = tokio::task::spawn_blocking(move || {
        writer.append(2, 1, b"after").unwrap();
    });

    tokio::time::timeout(Duration::from_secs(5), watcher.changed())
        .await
        .unwrap()
        .unwrap();
    let count = *watcher.borrow_and_update();
    assert_eq!(count, 2);
    assert_eq!(log.read(count - 1).unwrap().unwrap().payload, b"after");
    handle.await.unwrap();
}
