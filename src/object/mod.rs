//! The page-owning object and its lock.
//!
//! Every scan, tag transition, and residency change on a [`PageTree`]
//! must happen with the object's lock held. `PagedObject` makes that
//! contract structural: the tree is only reachable through a guard, and
//! a [`PageScan`](crate::scan::PageScan) borrows the tree out of that
//! guard, so the borrow checker proves the lock outlives the scan.
//!
//! Readers share the lock and may each drive independent scans; a
//! writer has the tree to itself and may insert or remove pages. Two
//! scans taken under separate lock acquisitions can observe mutually
//! inconsistent snapshots; a scan is a point-in-time cache, not a
//! consistency boundary.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::tree::PageTree;

/// A page-owning object: a resident-page tree behind the object lock.
pub struct PagedObject {
    pages: RwLock<PageTree>,
}

impl PagedObject {
    /// Creates an object with no resident pages.
    pub fn new() -> Self {
        Self {
            pages: RwLock::new(PageTree::new()),
        }
    }

    /// Acquires the object lock shared, for scanning and tag reads.
    pub fn read(&self) -> RwLockReadGuard<'_, PageTree> {
        self.pages.read()
    }

    /// Acquires the object lock exclusive, for residency changes and
    /// write-back sweeps.
    pub fn write(&self) -> RwLockWriteGuard<'_, PageTree> {
        self.pages.write()
    }

    /// Number of resident pages at this instant.
    pub fn resident(&self) -> usize {
        self.pages.read().len()
    }
}

impl Default for PagedObject {
    fn default() -> Self {
        Self::new()
    }
}
