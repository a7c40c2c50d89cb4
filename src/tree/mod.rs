//! Offset-ordered index of an object's resident pages.
//!
//! `PageTree` owns the pages; everything else in the crate works with
//! cheap [`PageRef`] handles. Structural changes (insert/remove) need
//! `&mut self` and therefore the object's write lock, while tag
//! transitions are atomic bit flips behind `&self` so a lock holder can
//! retag pages in the middle of its own scan.
//!
//! The gang lookups return up to `limit` pages in one call instead of
//! `limit` point lookups. A dense lookup is anchored: it returns the
//! contiguous run starting exactly at `start` and stops at the first
//! hole, or at the first page missing the requested tags.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::types::{BrumaError, PageOffset, Result};

/// Most pages a single gang lookup returns, and the scan batch capacity.
pub const MAX_BATCH: usize = 16;

/// One gang lookup's worth of pages, inline-allocated.
pub type PageBatch = SmallVec<[PageRef; MAX_BATCH]>;

bitflags! {
    /// Per-page attention markers.
    ///
    /// `DIRTY` means the page's contents differ from backing store;
    /// `WRITEBACK` means a write of the page to backing store is in
    /// flight. Both are cleared on a freshly inserted page.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct PageTags: u8 {
        /// Contents differ from backing store.
        const DIRTY = 1 << 0;
        /// A write to backing store is in flight.
        const WRITEBACK = 1 << 1;
    }
}

struct PageSlot {
    owner: u64,
    offset: PageOffset,
    tags: AtomicU8,
}

/// Handle to a resident page.
///
/// Clones share the page; dropping a handle never mutates the tree. A
/// handle stays readable after the page is removed from its tree, it is
/// simply no longer resident.
#[derive(Clone)]
pub struct PageRef {
    slot: Arc<PageSlot>,
}

impl PageRef {
    /// The page's offset within its owning object.
    pub fn offset(&self) -> PageOffset {
        self.slot.offset
    }

    /// Current tags. Snapshot only; the holder of the object lock may
    /// change tags at any time.
    pub fn tags(&self) -> PageTags {
        PageTags::from_bits_truncate(self.slot.tags.load(Ordering::Relaxed))
    }

    pub(crate) fn owner_token(&self) -> u64 {
        self.slot.owner
    }

    fn set_tags(&self, tags: PageTags) {
        self.slot.tags.fetch_or(tags.bits(), Ordering::Relaxed);
    }

    fn clear_tags(&self, tags: PageTags) {
        self.slot.tags.fetch_and(!tags.bits(), Ordering::Relaxed);
    }
}

impl std::fmt::Debug for PageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageRef")
            .field("offset", &self.slot.offset)
            .field("tags", &self.tags())
            .finish()
    }
}

static NEXT_TREE_TOKEN: AtomicU64 = AtomicU64::new(1);

/// The resident-page set of one page-owning object, ordered by offset.
pub struct PageTree {
    token: u64,
    slots: BTreeMap<u64, PageRef>,
    lookups: AtomicU64,
}

impl PageTree {
    /// Creates an empty resident set.
    pub fn new() -> Self {
        Self {
            token: NEXT_TREE_TOKEN.fetch_add(1, Ordering::Relaxed),
            slots: BTreeMap::new(),
            lookups: AtomicU64::new(0),
        }
    }

    /// Total gang lookups walked against this tree, for tests and
    /// profiling.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Number of resident pages.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no pages are resident.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// True when a page is resident at `off`.
    pub fn contains(&self, off: PageOffset) -> bool {
        self.slots.contains_key(&off.0)
    }

    /// Point lookup of the page at `off`.
    pub fn get(&self, off: PageOffset) -> Option<&PageRef> {
        self.slots.get(&off.0)
    }

    /// Makes a new, untagged page resident at `off`.
    pub fn insert(&mut self, off: PageOffset) -> Result<PageRef> {
        if self.slots.contains_key(&off.0) {
            return Err(BrumaError::Invalid("page already resident"));
        }
        let page = PageRef {
            slot: Arc::new(PageSlot {
                owner: self.token,
                offset: off,
                tags: AtomicU8::new(PageTags::empty().bits()),
            }),
        };
        self.slots.insert(off.0, page.clone());
        Ok(page)
    }

    /// Removes the page at `off` from the resident set, returning its
    /// handle. Outstanding handles stay valid.
    pub fn remove(&mut self, off: PageOffset) -> Option<PageRef> {
        self.slots.remove(&off.0)
    }

    /// Tags of the page at `off`, or `None` if nothing is resident there.
    pub fn tags_at(&self, off: PageOffset) -> Option<PageTags> {
        self.slots.get(&off.0).map(PageRef::tags)
    }

    /// Sets `tags` on the page at `off`. Returns false when no page is
    /// resident there.
    pub fn set_tags(&self, off: PageOffset, tags: PageTags) -> bool {
        match self.slots.get(&off.0) {
            Some(page) => {
                page.set_tags(tags);
                true
            }
            None => false,
        }
    }

    /// Clears `tags` on the page at `off`. Returns false when no page is
    /// resident there.
    pub fn clear_tags(&self, off: PageOffset, tags: PageTags) -> bool {
        match self.slots.get(&off.0) {
            Some(page) => {
                page.clear_tags(tags);
                true
            }
            None => false,
        }
    }

    pub(crate) fn token(&self) -> u64 {
        self.token
    }

    /// Up to `limit` pages at offsets `>= start`, ascending.
    pub fn gang_lookup(&self, start: PageOffset, limit: usize, dense: bool) -> PageBatch {
        self.collect(start, limit, dense, None, false)
    }

    /// Up to `limit` pages at offsets `<= start`, descending.
    pub fn gang_lookup_back(&self, start: PageOffset, limit: usize, dense: bool) -> PageBatch {
        self.collect(start, limit, dense, None, true)
    }

    /// Forward lookup restricted to pages whose tags intersect `mask`.
    pub fn gang_lookup_tagged(
        &self,
        start: PageOffset,
        limit: usize,
        dense: bool,
        mask: PageTags,
    ) -> PageBatch {
        self.collect(start, limit, dense, Some(mask), false)
    }

    /// Backward lookup restricted to pages whose tags intersect `mask`.
    pub fn gang_lookup_tagged_back(
        &self,
        start: PageOffset,
        limit: usize,
        dense: bool,
        mask: PageTags,
    ) -> PageBatch {
        self.collect(start, limit, dense, Some(mask), true)
    }

    fn collect(
        &self,
        start: PageOffset,
        limit: usize,
        dense: bool,
        mask: Option<PageTags>,
        backward: bool,
    ) -> PageBatch {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let mut out = PageBatch::new();
        if limit == 0 {
            return out;
        }
        if backward {
            let iter = self.slots.range(..=start.0).rev();
            collect_into(iter, start, limit, dense, mask, true, &mut out);
        } else {
            let iter = self.slots.range(start.0..);
            collect_into(iter, start, limit, dense, mask, false, &mut out);
        }
        out
    }
}

fn collect_into<'a, I>(
    iter: I,
    start: PageOffset,
    limit: usize,
    dense: bool,
    mask: Option<PageTags>,
    backward: bool,
    out: &mut PageBatch,
) where
    I: Iterator<Item = (&'a u64, &'a PageRef)>,
{
    // In dense mode the run must be anchored at `start` and step by
    // exactly one page per entry.
    let mut expect = start.0;
    for (&key, page) in iter {
        if dense && key != expect {
            break;
        }
        let qualifies = match mask {
            Some(mask) => page.tags().intersects(mask),
            None => true,
        };
        if !qualifies {
            if dense {
                break;
            }
            continue;
        }
        out.push(page.clone());
        if out.len() == limit {
            break;
        }
        if dense {
            expect = if backward {
                match key.checked_sub(1) {
                    Some(e) => e,
                    None => break,
                }
            } else {
                key + 1
            };
        }
    }
}

impl Default for PageTree {
    fn default() -> Self {
        Self::new()
    }
}
