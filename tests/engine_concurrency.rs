//! # Engine Concurrency Tests
//!
//! Exercises the engine with every task live at once — writer, readers,
//! preloader, unmapper — plus direct reference-count races:
//! 1. Full-stack churn: records survive byte-identically while the
//!    preloader maps ahead and the unmapper reclaims behind
//! 2. Reference-count invariant under contention: the count never goes
//!    negative and a page is never unmapped while a successful acquire is
//!    outstanding

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tempfile::tempdir;

use pagelog::storage::Slab;
use pagelog::{CancellationToken, Log, Page, Slice};

#[test]
fn full_stack_churn_delivers_every_record_in_order() {
    let dir = tempdir().unwrap();
    let log = Arc::new(
        Log::builder()
            .path(dir.path())
            .page_size(1024)
            .cache_capacity(8)
            .preload_idle(Duration::from_micros(10))
            .unmap_idle(Duration::from_millis(1))
            .open()
            .unwrap(),
    );

    let records: Vec<Vec<u8>> = (0..400u32)
        .map(|i| format!("churn-{:05}", i).into_bytes())
        .collect();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let token = CancellationToken::new();

    let mut reader = log.tailing_reader(move |record: &Slice, _: u64, _: u32| {
        sink.lock().push(record.to_vec());
    });
    let reader_token = token.clone();
    let reader_thread = std::thread::spawn(move || reader.process(&reader_token));

    for record in &records {
        log.append(record).unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    while seen.lock().len() < records.len() {
        assert!(
            Instant::now() < deadline,
            "reader stalled at {} of {}",
            seen.lock().len(),
            records.len()
        );
        std::thread::sleep(Duration::from_millis(1));
    }

    token.cancel();
    reader_thread.join().unwrap().unwrap();

    assert_eq!(*seen.lock(), records);
}

#[test]
fn unmap_never_wins_against_a_held_reference() {
    let dir = tempdir().unwrap();
    let slab = Slab::create(dir.path().join("0000000000000000.page"), 4096).unwrap();
    let page = Arc::new(Page::new(slab, 0));

    let stop = Arc::new(AtomicBool::new(false));
    let mut holders = Vec::new();

    for _ in 0..4 {
        let page = Arc::clone(&page);
        let stop = Arc::clone(&stop);
        holders.push(std::thread::spawn(move || {
            let mut acquisitions = 0u64;
            while !stop.load(Ordering::Relaxed) {
                if page.acquire_reference() {
                    // A successful acquire must keep the slab mapped until
                    // the matching release.
                    assert!(page.is_mapped(), "slab reclaimed under a held reference");
                    acquisitions += 1;
                    page.release_reference();
                } else {
                    // Tombstoned: the page is gone for good.
                    assert!(page.is_unmapped());
                    break;
                }
            }
            acquisitions
        }));
    }

    let reclaimer = {
        let page = Arc::clone(&page);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !page.try_unmap() {
                if Instant::now() >= deadline {
                    break;
                }
                std::thread::yield_now();
            }
            stop.store(true, Ordering::Relaxed);
            page.is_unmapped()
        })
    };

    let unmapped = reclaimer.join().unwrap();
    for holder in holders {
        holder.join().unwrap();
    }

    assert!(unmapped, "reclaimer never found a zero-count window");
    assert_eq!(page.reference_count(), 0);
    assert!(!page.acquire_reference());
}
