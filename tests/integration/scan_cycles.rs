#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;

use bruma::{Direction, FillFlags, PageOffset, PageScan, PagedObject, MAX_BATCH};

fn object_with(offsets: impl IntoIterator<Item = u64>) -> PagedObject {
    let obj = PagedObject::new();
    {
        let mut pages = obj.write();
        for off in offsets {
            pages.insert(PageOffset(off)).expect("insert");
        }
    }
    obj
}

fn drain_forward(scan: &mut PageScan<'_>, from: PageOffset) -> Vec<u64> {
    let mut seen = Vec::new();
    let mut next = from;
    while let Some(pg) = scan.peek_or_fill(next, 0) {
        seen.push(pg.offset().0);
        next = pg.offset().next();
        scan.advance();
    }
    seen
}

fn drain_backward(scan: &mut PageScan<'_>, from: PageOffset) -> Vec<u64> {
    let mut seen = Vec::new();
    let mut next = from;
    while let Some(pg) = scan.peek_or_fill(next, 0) {
        seen.push(pg.offset().0);
        let Some(prev) = pg.offset().prev() else {
            scan.advance();
            break;
        };
        next = prev;
        scan.advance();
    }
    seen
}

#[test]
fn forward_scan_crosses_many_batches_in_order() {
    let count = 5 * MAX_BATCH as u64 + 7;
    let obj = object_with(0..count);
    let pages = obj.read();
    let mut scan = PageScan::new(&pages, FillFlags::empty());
    let seen = drain_forward(&mut scan, PageOffset(0));
    assert_eq!(seen.len(), count as usize);
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "strictly ascending");
}

#[test]
fn backward_scan_crosses_many_batches_in_order() {
    let count = 3 * MAX_BATCH as u64 + 4;
    let obj = object_with(0..count);
    let pages = obj.read();
    let mut scan = PageScan::new(&pages, FillFlags::BACKWARD);
    assert_eq!(scan.direction(), Direction::Backward);
    let seen = drain_backward(&mut scan, PageOffset(count - 1));
    assert_eq!(seen.len(), count as usize);
    assert!(seen.windows(2).all(|w| w[0] > w[1]), "strictly descending");
}

#[test]
fn sparse_object_scans_skip_holes_both_ways() {
    let offsets = [1u64, 4, 5, 9, 20, 21, 22, 40];
    let obj = object_with(offsets);
    let pages = obj.read();

    let mut scan = PageScan::new(&pages, FillFlags::empty());
    assert_eq!(drain_forward(&mut scan, PageOffset(0)), offsets);

    let mut back = PageScan::new(&pages, FillFlags::BACKWARD);
    let mut expected: Vec<u64> = offsets.to_vec();
    expected.reverse();
    assert_eq!(drain_backward(&mut back, PageOffset(64)), expected);
}

#[test]
fn clear_restarts_the_traversal_at_a_new_offset() {
    let obj = object_with([0u64, 1, 2, 10, 11, 12]);
    let pages = obj.read();
    let mut scan = PageScan::new(&pages, FillFlags::empty());

    // Consume the first two pages, then restart from the second cluster.
    scan.fill(PageOffset(0), 0).expect("fill");
    scan.advance();
    scan.advance();
    scan.clear();
    assert_eq!(drain_forward(&mut scan, PageOffset(10)), vec![10, 11, 12]);
}

#[test]
fn one_scan_per_reader_under_a_shared_lock() {
    let obj = Arc::new(object_with(0..64));
    let handles: Vec<_> = (0..4)
        .map(|reader| {
            let obj = Arc::clone(&obj);
            thread::spawn(move || {
                let pages = obj.read();
                let mut scan = PageScan::new(&pages, FillFlags::empty());
                let seen = drain_forward(&mut scan, PageOffset(reader * 8));
                assert_eq!(seen.len(), 64 - reader as usize * 8);
                assert!(seen.windows(2).all(|w| w[0] < w[1]));
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("reader thread");
    }
}

#[test]
fn cached_miss_spares_repeated_walks_across_retries() {
    let obj = object_with(0..4);
    let pages = obj.read();
    let mut scan = PageScan::new(&pages, FillFlags::empty());
    assert_eq!(drain_forward(&mut scan, PageOffset(0)).len(), 4);

    let walks = pages.lookups();
    for _ in 0..32 {
        assert!(scan.peek_or_fill(PageOffset(4), 0).is_none());
    }
    assert_eq!(pages.lookups(), walks, "retries answered from the scan");
}

#[test]
fn want_hint_limits_each_batch_but_not_the_traversal() {
    let obj = object_with(0..20);
    let pages = obj.read();
    let mut scan = PageScan::new(&pages, FillFlags::empty());

    let mut seen = Vec::new();
    let mut next = PageOffset(0);
    while let Some(pg) = scan.peek_or_fill(next, 3) {
        seen.push(pg.offset().0);
        next = pg.offset().next();
        scan.advance();
    }
    assert_eq!(seen, (0..20).collect::<Vec<u64>>());
    assert!(
        pages.lookups() >= 20 / 3,
        "small want means many small batches"
    );
}

#[test]
fn dense_scan_ends_at_the_first_gap_even_across_batches() {
    let run = 2 * MAX_BATCH as u64 + 3;
    let mut offsets: Vec<u64> = (0..run).collect();
    offsets.extend([run + 2, run + 3]);
    let obj = object_with(offsets);
    let pages = obj.read();

    let mut scan = PageScan::new(&pages, FillFlags::DENSE);
    let seen = drain_forward(&mut scan, PageOffset(0));
    assert_eq!(seen, (0..run).collect::<Vec<u64>>());
}
