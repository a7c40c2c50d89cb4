use std::fmt;

use thiserror::Error;

/// Page-granular offset of a page within its owning object.
///
/// Offsets are indexes into the object's page space, not byte addresses;
/// adjacent resident pages differ by exactly one.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PageOffset(pub u64);

impl PageOffset {
    /// The offset one page after this one.
    pub fn next(self) -> PageOffset {
        PageOffset(self.0 + 1)
    }

    /// The offset one page before this one, or `None` at the start of the
    /// object.
    pub fn prev(self) -> Option<PageOffset> {
        self.0.checked_sub(1).map(PageOffset)
    }
}

impl fmt::Display for PageOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PageOffset {
    fn from(value: u64) -> Self {
        PageOffset(value)
    }
}

impl From<PageOffset> for u64 {
    fn from(value: PageOffset) -> Self {
        value.0
    }
}

/// Errors surfaced by resident-set and scan operations.
///
/// `NotFound` is not a fault: it is the normal end-of-scan signal a fill
/// returns when the lookup comes back empty, and callers treat it as loop
/// termination.
#[derive(Error, Debug)]
pub enum BrumaError {
    /// A caller-supplied argument violated the operation's contract.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// The lookup found nothing; end of scan in the requested direction.
    #[error("not found")]
    NotFound,
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BrumaError>;
