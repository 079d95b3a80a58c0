//! Range-locker state machine (spec §4.8.2, §4.8.5): a restricted view
//! `(delegated_range, local_root, max_local_root_level)` over the page
//! table, letting a caller hold one lock for a whole sequence of `get`/
//! `set`/`find_non_null` calls instead of re-walking from the true root
//! each time.
use crate::ctx::Ctx;
use crate::dam::{DataAccessMethods, LockType, PageHandle, PersistentPage, ReleaseOptions};
use crate::page_id::PageId;
use crate::page_table::{self, FindDirection, PageTableNode};
use crate::pmm::PageModificationMethods;

/// Inclusive bucket-id range a `RangeLocker` is allowed to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketRange {
    pub lo: u64,
    pub hi: u64,
}

impl BucketRange {
    pub fn full() -> Self {
        Self { lo: 0, hi: u64::MAX }
    }

    pub fn contains(self, bucket_id: u64) -> bool {
        bucket_id >= self.lo && bucket_id <= self.hi
    }
}

pub struct RangeLocker {
    delegated: BucketRange,
    local_root: PageHandle,
    real_root: PageId,
    lock_type: LockType,
}

impl RangeLocker {
    /// Construct: acquires the real root under `lock_type`, with the
    /// delegated range initially unrestricted (spec §4.8.2 step 1).
    pub fn construct<D, P>(ctx: Ctx<D, P>, real_root: PageId, lock_type: LockType) -> Self
    where
        D: DataAccessMethods,
        P: PageModificationMethods<Txn = D::Txn>,
    {
        let local_root = PersistentPage::acquire(ctx.dam, ctx.txn, real_root, lock_type, ctx.abort);
        Self {
            delegated: BucketRange::full(),
            local_root,
            real_root,
            lock_type,
        }
    }

    pub fn delegated_range(&self) -> BucketRange {
        self.delegated
    }

    pub fn is_local_root_the_real_root(&self) -> bool {
        self.local_root.page_id() == self.real_root
    }

    /// Minimize/narrow: while `lock_range` is inside both the caller's
    /// current delegated range and `local_root`'s actual covered range,
    /// and `lock_range` maps to a single child slot that exists, descend
    /// one level (spec §4.8.2 steps 2-3).
    pub fn minimize_lock_range<D, P>(&mut self, ctx: Ctx<D, P>, fan_out: u64, null_page_id: u64, lock_range: BucketRange)
    where
        D: DataAccessMethods,
        P: PageModificationMethods<Txn = D::Txn>,
    {
        self.delegated = BucketRange {
            lo: lock_range.lo.max(self.delegated.lo),
            hi: lock_range.hi.min(self.delegated.hi),
        };
        loop {
            if self.local_root.is_null() {
                return;
            }
            let Some(lo_slot) = PageTableNode::slot_for(self.local_root.buffer(), fan_out, self.delegated.lo) else {
                return;
            };
            let Some(hi_slot) = PageTableNode::slot_for(self.local_root.buffer(), fan_out, self.delegated.hi) else {
                return;
            };
            if lo_slot != hi_slot || PageTableNode::level(self.local_root.buffer()) == 0 {
                return;
            }
            let child_id = PageTableNode::entry(self.local_root.buffer(), fan_out, lo_slot);
            if child_id.is_null(null_page_id) {
                return;
            }
            let child = PersistentPage::acquire(ctx.dam, ctx.txn, child_id, self.lock_type, ctx.abort);
            if child.is_null() {
                return;
            }
            let mut old_root = std::mem::replace(&mut self.local_root, child);
            PersistentPage::release(ctx.dam, ctx.txn, &mut old_root, ReleaseOptions::NONE, ctx.abort);
        }
    }

    pub fn get<D, P>(&self, ctx: Ctx<D, P>, fan_out: u64, null_page_id: u64, bucket_id: u64) -> PageId
    where
        D: DataAccessMethods,
        P: PageModificationMethods<Txn = D::Txn>,
    {
        if !self.delegated.contains(bucket_id) {
            return PageId::new(null_page_id);
        }
        page_table::get(ctx, fan_out, null_page_id, &self.local_root, bucket_id)
    }

    /// Requires this locker to have been constructed with `LockType::Write`.
    pub fn set<D, P>(&mut self, ctx: Ctx<D, P>, fan_out: u64, null_page_id: u64, max_tree_height: usize, bucket_id: u64, new_value: Option<PageId>)
    where
        D: DataAccessMethods,
        P: PageModificationMethods<Txn = D::Txn>,
    {
        assert_eq!(self.lock_type, LockType::Write, "fatal: set() on a read-locked range locker");
        if !self.delegated.contains(bucket_id) {
            return;
        }
        page_table::set(ctx, fan_out, null_page_id, max_tree_height, &mut self.local_root, bucket_id, new_value);
    }

    pub fn find_non_null<D, P>(&self, ctx: Ctx<D, P>, fan_out: u64, null_page_id: u64, bucket_id: u64, direction: FindDirection) -> Option<(u64, PageId)>
    where
        D: DataAccessMethods,
        P: PageModificationMethods<Txn = D::Txn>,
    {
        if !self.delegated.contains(bucket_id) {
            return None;
        }
        let found = page_table::find_non_null(ctx, fan_out, null_page_id, &self.local_root, bucket_id, direction)?;
        if self.delegated.contains(found.0) {
            Some(found)
        } else {
            None
        }
    }

    /// Release: re-walks from the real root and prunes the local root if
    /// narrowing left it entirely empty (spec §4.8.2 step 4, §4.8.7
    /// `delete_range_locker`), then drops the lock it holds.
    pub fn release<D, P>(mut self, ctx: Ctx<D, P>, fan_out: u64, null_page_id: u64, max_tree_height: usize)
    where
        D: DataAccessMethods,
        P: PageModificationMethods<Txn = D::Txn>,
    {
        if !self.local_root.is_null() && self.local_root.page_id() != self.real_root {
            let anchor = PageTableNode::first_bucket_id(self.local_root.buffer());
            let empty = PageTableNode::is_all_null(self.local_root.buffer(), fan_out, null_page_id);
            let local_id = self.local_root.page_id();
            PersistentPage::release(ctx.dam, ctx.txn, &mut self.local_root, ReleaseOptions::NONE, ctx.abort);
            if empty {
                page_table::prune_empty_local_root(ctx, fan_out, null_page_id, max_tree_height, self.real_root, local_id, anchor);
            }
        } else {
            PersistentPage::release(ctx.dam, ctx.txn, &mut self.local_root, ReleaseOptions::NONE, ctx.abort);
        }
    }
}
