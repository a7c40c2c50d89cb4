//! Residency probing for page-in.
//!
//! A page-in path asks "which pages of this request window are already
//! resident?" before deciding what to read from backing store. Probing
//! a window slot by slot would cost one tree walk per page; driving one
//! plain forward scan answers consecutive hits from a single batch, and
//! its cached negative lookup answers every trailing hole after the
//! last resident page without walking the tree again.

use tracing::trace;

use crate::scan::{FillFlags, PageScan};
use crate::tree::{PageRef, PageTree};
use crate::types::PageOffset;

/// Residency of the `want`-page window starting at `start`.
///
/// Slot `i` of the result is `Some` exactly when a page is resident at
/// `start + i`.
pub fn find_resident(pages: &PageTree, start: PageOffset, want: usize) -> Vec<Option<PageRef>> {
    let mut found = Vec::with_capacity(want);
    let mut scan = PageScan::new(pages, FillFlags::empty());
    for slot in 0..want {
        let off = PageOffset(start.0 + slot as u64);
        match scan.peek_or_fill(off, want - slot) {
            Some(pg) => {
                debug_assert!(pg.offset() >= off, "forward scan ran behind the probe");
                if pg.offset() == off {
                    let pg = pg.clone();
                    scan.advance();
                    found.push(Some(pg));
                } else {
                    // Cached page is for a later slot; this one is a hole.
                    found.push(None);
                }
            }
            None => found.push(None),
        }
    }
    trace!(
        start = start.0,
        want,
        hits = found.iter().filter(|slot| slot.is_some()).count(),
        "pagein.find_resident"
    );
    found
}

/// The contiguous resident run anchored at `start`, at most `max`
/// pages, from a single dense fill.
///
/// Empty when `start` itself is not resident. One gang lookup's worth
/// of pages at most, whatever `max` says.
pub fn resident_run(pages: &PageTree, start: PageOffset, max: usize) -> Vec<PageRef> {
    let mut run = Vec::new();
    let mut scan = PageScan::new(pages, FillFlags::DENSE);
    if scan.fill(start, max).is_err() {
        return run;
    }
    while let Some(pg) = scan.peek() {
        run.push(pg.clone());
        scan.advance();
    }
    run
}
