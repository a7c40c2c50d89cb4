//! Write-back selection.
//!
//! A flusher walks the dirty pages of an object with a tagged scan,
//! moves them from DIRTY to WRITEBACK, hands them to the I/O layer, and
//! clears WRITEBACK when the writes complete. Everything here expects
//! the object's write lock to be held; the `&PageTree` borrows come out
//! of a [`PagedObject::write`](crate::object::PagedObject::write) guard.

use std::ops::Range;

use tracing::debug;

use crate::scan::{FillFlags, PageScan};
use crate::tree::{PageRef, PageTags, PageTree};
use crate::types::PageOffset;

/// `len` contiguous pages starting at `start`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PageRun {
    /// First page of the run.
    pub start: PageOffset,
    /// Pages in the run, at least 1.
    pub len: usize,
}

impl PageRun {
    /// Offset one past the last page of the run.
    pub fn end(&self) -> PageOffset {
        PageOffset(self.start.0 + self.len as u64)
    }
}

/// Maximal contiguous runs of dirty pages inside `range`, ascending.
///
/// This is the clustering pass of a flusher: each run can become one
/// contiguous write.
pub fn dirty_runs(pages: &PageTree, range: Range<PageOffset>) -> Vec<PageRun> {
    let mut runs: Vec<PageRun> = Vec::new();
    let mut scan = PageScan::new(pages, FillFlags::DIRTY);
    let mut next = range.start;
    while next < range.end {
        let Some(pg) = scan.peek_or_fill(next, 0) else {
            break;
        };
        let off = pg.offset();
        if off >= range.end {
            break;
        }
        match runs.last_mut() {
            Some(run) if run.end() == off => run.len += 1,
            _ => runs.push(PageRun { start: off, len: 1 }),
        }
        next = off.next();
        scan.advance();
    }
    runs
}

/// Selects every dirty page in `range` for write-back: tags it
/// WRITEBACK, clears DIRTY, and returns the selection in ascending
/// order.
///
/// A page that is re-dirtied while still under write-back is dirty
/// again and will be selected by the next sweep.
pub fn begin_writeback(pages: &PageTree, range: Range<PageOffset>) -> Vec<PageRef> {
    let mut picked = Vec::new();
    let mut scan = PageScan::new(pages, FillFlags::DIRTY);
    let mut next = range.start;
    while next < range.end {
        let Some(pg) = scan.peek_or_fill(next, 0) else {
            break;
        };
        let off = pg.offset();
        if off >= range.end {
            break;
        }
        let pg = pg.clone();
        scan.advance();
        pages.set_tags(off, PageTags::WRITEBACK);
        pages.clear_tags(off, PageTags::DIRTY);
        picked.push(pg);
        next = off.next();
    }
    debug!(
        start = range.start.0,
        end = range.end.0,
        picked = picked.len(),
        "pageout.writeback.begin"
    );
    picked
}

/// Clears WRITEBACK on every page of a completed write batch that is
/// still resident. Returns how many were.
pub fn finish_writeback(pages: &PageTree, batch: &[PageRef]) -> usize {
    let mut resident = 0;
    for pg in batch {
        if pages.clear_tags(pg.offset(), PageTags::WRITEBACK) {
            resident += 1;
        }
    }
    debug!(pages = batch.len(), resident, "pageout.writeback.finish");
    resident
}

/// Pages in `range` that still need attention: dirty or under
/// write-back. A synchronous flusher waits until this reaches zero.
pub fn pending_pages(pages: &PageTree, range: Range<PageOffset>) -> usize {
    let mut scan = PageScan::new(pages, FillFlags::DIRTY | FillFlags::WRITEBACK);
    let mut count = 0;
    let mut next = range.start;
    while next < range.end {
        let Some(pg) = scan.peek_or_fill(next, 0) else {
            break;
        };
        let off = pg.offset();
        if off >= range.end {
            break;
        }
        count += 1;
        next = off.next();
        scan.advance();
    }
    count
}
