use std::fmt;

/// Identifies a page. Widened to `u64` in memory regardless of the
/// on-disk serialization width configured in `StoreConfig` (spec §6.4);
/// `NULL_PAGE_ID` is whatever value is unrepresentable-as-a-real-page for
/// that width, i.e. the width's maximum value (spec §3.1).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u64);

impl PageId {
    pub const fn new(id: u64) -> Self {
        PageId(id)
    }

    pub fn is_null(self, null_page_id: u64) -> bool {
        self.0 == null_page_id
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "page#{}", self.0)
    }
}

impl fmt::Debug for PageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
