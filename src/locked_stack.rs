//! Locked-pages stack (spec §4.2, §4.6, §4.8.4): a bounded deque of
//! locked-page records used both for crabbing (push while descending) and
//! for post-walk unwind (pop from either end). Each entry carries the
//! child-index chosen on the way down, so the upward pass knows which slot
//! a propagated split/merge/NULL-set belongs in — `-1` is the sentinel for
//! the interior least-keys-child virtual slot (spec §4.5).
use crate::dam::PageHandle;

pub struct StackEntry {
    pub handle: PageHandle,
    pub child_index: i64,
}

/// Fixed-capacity container sized to `max_tree_height + 1` (spec §4.2).
pub struct LockedPagesStack {
    entries: Vec<StackEntry>,
    capacity: usize,
}

impl LockedPagesStack {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, handle: PageHandle, child_index: i64) {
        assert!(
            self.entries.len() < self.capacity,
            "fatal: locked-pages stack overflow, tree deeper than max_tree_height"
        );
        self.entries.push(StackEntry { handle, child_index });
    }

    pub fn pop_top(&mut self) -> Option<StackEntry> {
        self.entries.pop()
    }

    pub fn pop_bottom(&mut self) -> Option<StackEntry> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    pub fn peek_top(&self) -> Option<&StackEntry> {
        self.entries.last()
    }

    pub fn peek_top_mut(&mut self) -> Option<&mut StackEntry> {
        self.entries.last_mut()
    }

    pub fn peek_bottom(&self) -> Option<&StackEntry> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_order() {
        let mut stack = LockedPagesStack::with_capacity(4);
        stack.push(PageHandle::null(), -1);
        stack.push(PageHandle::null(), 0);
        stack.push(PageHandle::null(), 1);
        assert_eq!(stack.len(), 3);

        let bottom = stack.pop_bottom().unwrap();
        assert_eq!(bottom.child_index, -1);
        assert_eq!(stack.len(), 2);

        let top = stack.pop_top().unwrap();
        assert_eq!(top.child_index, 1);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    #[should_panic(expected = "overflow")]
    fn overflow_panics() {
        let mut stack = LockedPagesStack::with_capacity(1);
        stack.push(PageHandle::null(), 0);
        stack.push(PageHandle::null(), 0);
    }
}
