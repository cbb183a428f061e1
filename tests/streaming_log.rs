//! # Streaming Log Integration Tests
//!
//! End-to-end coverage of the write/replay contract:
//! 1. Records are delivered to handlers in exact write order, across page
//!    boundaries, while appends continue concurrently
//! 2. A tailing reader started on an empty log delivers records appended
//!    later, within a bounded interval, without being restarted
//! 3. A finite reader replays a closed log byte-for-byte, including after
//!    reopening the directory
//! 4. Independent readers maintain independent cursors

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tempfile::tempdir;

use pagelog::{CancellationToken, Log, Slice};

const SMALL_PAGE: usize = 512;

fn small_log(path: &std::path::Path) -> Log {
    Log::builder()
        .path(path)
        .page_size(SMALL_PAGE)
        .cache_capacity(16)
        .background_tasks(false)
        .open()
        .unwrap()
}

fn collect_handler(
    sink: &Arc<Mutex<Vec<Vec<u8>>>>,
) -> impl FnMut(&Slice, u64, u32) + Send + 'static {
    let sink = Arc::clone(sink);
    move |record: &Slice, _page: u64, _position: u32| {
        sink.lock().push(record.to_vec());
    }
}

#[test]
fn finite_replay_preserves_order_and_bytes() {
    let dir = tempdir().unwrap();
    let log = small_log(dir.path());

    let records: Vec<Vec<u8>> = (0..200u32)
        .map(|i| format!("record-{:04}", i).into_bytes())
        .collect();
    for record in &records {
        log.append(record).unwrap();
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut reader = log.finite_reader(collect_handler(&seen));
    reader.process(&CancellationToken::new()).unwrap();

    assert_eq!(*seen.lock(), records);
    // 200 records of 11+4 bytes cannot fit one 512-byte page.
    assert!(log.page_cache().page_index().highest_page_number() > 0);
}

#[test]
fn tailing_reader_observes_concurrent_appends_in_order() {
    let dir = tempdir().unwrap();
    let log = Arc::new(small_log(dir.path()));

    let records: Vec<Vec<u8>> = (0..500u32)
        .map(|i| i.to_le_bytes().to_vec())
        .collect();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let token = CancellationToken::new();

    let mut reader = log.tailing_reader(collect_handler(&seen));
    let reader_token = token.clone();
    let reader_thread = std::thread::spawn(move || reader.process(&reader_token));

    for record in &records {
        log.append(record).unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while seen.lock().len() < records.len() {
        assert!(Instant::now() < deadline, "reader fell behind: {} of {}", seen.lock().len(), records.len());
        std::thread::sleep(Duration::from_millis(1));
    }

    token.cancel();
    reader_thread.join().unwrap().unwrap();

    assert_eq!(*seen.lock(), records);
}

#[test]
fn tailing_reader_started_before_any_data_gets_the_record() {
    let dir = tempdir().unwrap();
    let log = Arc::new(small_log(dir.path()));

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let token = CancellationToken::new();

    let mut reader = log.tailing_reader(move |record: &Slice, _: u64, _: u32| {
        assert_eq!(&**record, b"wake up");
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let reader_token = token.clone();
    let reader_thread = std::thread::spawn(move || reader.process(&reader_token));

    // Give the reader time to go idle on the empty log first.
    std::thread::sleep(Duration::from_millis(20));
    log.append(b"wake up").unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while delivered.load(Ordering::SeqCst) == 0 {
        assert!(Instant::now() < deadline, "record was never delivered");
        std::thread::sleep(Duration::from_millis(1));
    }

    token.cancel();
    reader_thread.join().unwrap().unwrap();
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
}

#[test]
fn independent_readers_keep_independent_cursors() {
    let dir = tempdir().unwrap();
    let log = small_log(dir.path());

    for i in 0..50u8 {
        log.append(&[i; 16]).unwrap();
    }

    let first_seen = Arc::new(Mutex::new(Vec::new()));
    let mut first = log.finite_reader(collect_handler(&first_seen));
    first.process(&CancellationToken::new()).unwrap();

    let second_seen = Arc::new(Mutex::new(Vec::new()));
    let mut second = log.finite_reader(collect_handler(&second_seen));
    second.process(&CancellationToken::new()).unwrap();

    assert_eq!(first_seen.lock().len(), 50);
    assert_eq!(*first_seen.lock(), *second_seen.lock());
}

#[test]
fn replay_after_reopen_is_byte_identical() {
    let dir = tempdir().unwrap();

    let records: Vec<Vec<u8>> = (0..80u32)
        .map(|i| vec![i as u8; (i % 23) as usize])
        .collect();

    {
        let log = small_log(dir.path());
        for record in &records {
            log.append(record).unwrap();
        }
        log.sync().unwrap();
        log.close();
    }

    let log = small_log(dir.path());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut reader = log.finite_reader(collect_handler(&seen));
    reader.process(&CancellationToken::new()).unwrap();

    assert_eq!(*seen.lock(), records);
}
