//! Batched cursor over an object's resident pages.
//!
//! A [`PageScan`] caches one gang lookup's worth of pages and serves
//! them through `peek`/`advance` until drained, refilling on demand.
//! Page-in and page-out loops drive one scan per traversal instead of a
//! point lookup per page.
//!
//! The scan borrows the locked tree for its whole lifetime; obtain the
//! borrow through a [`PagedObject`](crate::object::PagedObject) guard.
//! It is a read-only view cache: filling and draining never mutate the
//! tree, and the pages stay owned by the tree.

use bitflags::bitflags;
use tracing::trace;

use crate::tree::{PageBatch, PageRef, PageTags, PageTree, MAX_BATCH};
use crate::types::{BrumaError, PageOffset, Result};

bitflags! {
    /// Scan configuration, fixed at construction.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct FillFlags: u8 {
        /// Each fill returns a maximally contiguous run anchored at the
        /// fill offset, stopping at the first gap instead of skipping it.
        const DENSE = 1 << 0;
        /// Scan in decreasing-offset order.
        const BACKWARD = 1 << 1;
        /// Visit only dirty pages.
        const DIRTY = 1 << 2;
        /// Combined with `DIRTY`: also visit pages under write-back.
        /// Meaningless on its own.
        const WRITEBACK = 1 << 3;
    }
}

/// Scan direction, derived once from [`FillFlags::BACKWARD`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Direction {
    /// Increasing offsets.
    Forward,
    /// Decreasing offsets.
    Backward,
}

enum Cached {
    /// Nothing cached.
    Empty,
    /// One gang lookup's results; entries past the cursor are unconsumed.
    Pages(PageBatch),
    /// A cached negative lookup: the last plain-mode fill proved nothing
    /// remains in scan direction, so peeks answer empty without another
    /// tree walk.
    Absent,
}

/// A bounded, replenishable cursor over one object's resident pages.
///
/// Typical drive loop:
///
/// ```
/// use bruma::{FillFlags, PagedObject, PageOffset, PageScan};
///
/// let obj = PagedObject::new();
/// {
///     let mut pages = obj.write();
///     for off in [0u64, 1, 2, 5, 6] {
///         pages.insert(PageOffset(off)).unwrap();
///     }
/// }
/// let pages = obj.read();
/// let mut scan = PageScan::new(&pages, FillFlags::empty());
/// let mut seen = Vec::new();
/// let mut next = PageOffset(0);
/// while let Some(pg) = scan.peek_or_fill(next, 0) {
///     seen.push(pg.offset().0);
///     next = pg.offset().next();
///     scan.advance();
/// }
/// assert_eq!(seen, [0, 1, 2, 5, 6]);
/// ```
pub struct PageScan<'t> {
    pages: &'t PageTree,
    flags: FillFlags,
    direction: Direction,
    cached: Cached,
    cursor: usize,
}

impl<'t> PageScan<'t> {
    /// Binds an empty scan to `pages` with a fixed flag set.
    pub fn new(pages: &'t PageTree, flags: FillFlags) -> Self {
        let direction = if flags.contains(FillFlags::BACKWARD) {
            Direction::Backward
        } else {
            Direction::Forward
        };
        Self {
            pages,
            flags,
            direction,
            cached: Cached::Empty,
            cursor: 0,
        }
    }

    /// The flag set this scan was constructed with.
    pub fn flags(&self) -> FillFlags {
        self.flags
    }

    /// The scan direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Drops everything cached. Binding and flags are unchanged; use
    /// this to restart the traversal at a new offset.
    pub fn clear(&mut self) {
        self.cached = Cached::Empty;
        self.cursor = 0;
    }

    /// The next unconsumed page, or `None` when a fill (or the end of
    /// the scan) is due.
    pub fn peek(&self) -> Option<&PageRef> {
        match &self.cached {
            Cached::Pages(batch) => batch.get(self.cursor),
            Cached::Empty | Cached::Absent => None,
        }
    }

    /// Consumes the current entry.
    ///
    /// Advancing over a cached negative lookup is legal and empties the
    /// scan. Advancing an empty or fully drained scan is a caller bug:
    /// it asserts in debug builds and is a no-op in release builds.
    pub fn advance(&mut self) {
        match &self.cached {
            Cached::Pages(batch) => {
                debug_assert!(self.cursor < batch.len(), "scan advanced past its batch");
                if self.cursor < batch.len() {
                    self.cursor += 1;
                }
            }
            Cached::Absent => {
                self.cached = Cached::Empty;
            }
            Cached::Empty => {
                debug_assert!(false, "scan advanced while empty");
            }
        }
    }

    /// Replenishes the scan with one gang lookup from `start`.
    ///
    /// `want` caps how many pages to ask for; zero means a full batch.
    /// Either way the request never exceeds [`MAX_BATCH`]. The scan must
    /// be drained first; filling over unconsumed pages is a caller bug
    /// (debug assertion).
    ///
    /// `Err(NotFound)` is the normal end-of-scan outcome, not a fault.
    /// With no flags set, the miss is also cached so immediate retries
    /// answer empty without walking the tree again; with any flag set
    /// the miss is offset-local and nothing is cached.
    pub fn fill(&mut self, start: PageOffset, want: usize) -> Result<()> {
        debug_assert!(self.peek().is_none(), "fill over unconsumed pages");
        let limit = if want == 0 { MAX_BATCH } else { want.min(MAX_BATCH) };
        let dense = self.flags.contains(FillFlags::DENSE);
        let batch = if self.flags.contains(FillFlags::DIRTY) {
            let mut mask = PageTags::DIRTY;
            if self.flags.contains(FillFlags::WRITEBACK) {
                mask |= PageTags::WRITEBACK;
            }
            match self.direction {
                Direction::Forward => self.pages.gang_lookup_tagged(start, limit, dense, mask),
                Direction::Backward => {
                    self.pages.gang_lookup_tagged_back(start, limit, dense, mask)
                }
            }
        } else {
            match self.direction {
                Direction::Forward => self.pages.gang_lookup(start, limit, dense),
                Direction::Backward => self.pages.gang_lookup_back(start, limit, dense),
            }
        };
        self.cursor = 0;
        if batch.is_empty() {
            self.cached = if self.flags.is_empty() {
                Cached::Absent
            } else {
                Cached::Empty
            };
            trace!(start = start.0, "scan.fill.empty");
            return Err(BrumaError::NotFound);
        }
        #[cfg(debug_assertions)]
        self.verify_batch(start, &batch);
        trace!(start = start.0, found = batch.len(), "scan.fill");
        self.cached = Cached::Pages(batch);
        Ok(())
    }

    /// `peek`, filling from `start` first if the scan is drained.
    ///
    /// A cached negative lookup answers `None` here without refilling.
    pub fn peek_or_fill(&mut self, start: PageOffset, want: usize) -> Option<&PageRef> {
        if self.needs_fill() && self.fill(start, want).is_err() {
            return None;
        }
        self.peek()
    }

    fn needs_fill(&self) -> bool {
        match &self.cached {
            Cached::Empty => true,
            Cached::Pages(batch) => self.cursor == batch.len(),
            Cached::Absent => false,
        }
    }

    #[cfg(debug_assertions)]
    fn verify_batch(&self, start: PageOffset, batch: &PageBatch) {
        let mut prev: Option<PageOffset> = None;
        for pg in batch.iter() {
            debug_assert_eq!(pg.owner_token(), self.pages.token());
            match self.direction {
                Direction::Forward => {
                    debug_assert!(pg.offset() >= start);
                    if let Some(prev) = prev {
                        debug_assert!(pg.offset() > prev);
                    }
                }
                Direction::Backward => {
                    debug_assert!(pg.offset() <= start);
                    if let Some(prev) = prev {
                        debug_assert!(pg.offset() < prev);
                    }
                }
            }
            prev = Some(pg.offset());
        }
    }
}
