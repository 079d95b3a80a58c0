//! B+ tree cursor (spec §4.7): `(curr_page_handle, curr_tuple_index)` plus
//! the tuple definitions needed to decode and compare. `next`/`prev` step
//! across leaf boundaries by following `next_page_id`/`prev_page_id`,
//! skipping pages that were left entirely empty by a concurrent delete.
use crate::bplus::header::{NodeHeader, LEAF_HEADER_LEN};
use crate::bplus::BTreeDefs;
use crate::ctx::Ctx;
use crate::dam::{DataAccessMethods, LockType, PageHandle, PersistentPage, ReleaseOptions};
use crate::pmm::PageModificationMethods;
use crate::sorted_packed_page::SortedPackedPage;
use crate::tuple::RecordDef;

/// Direction operators for `adjust_to` (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Min,
    Lt,
    Le,
    Ge,
    Gt,
    Max,
}

pub struct BPlusTreeIterator<'a, R: RecordDef, D: DataAccessMethods, P: PageModificationMethods<Txn = D::Txn>> {
    ctx: Ctx<'a, D, P>,
    defs: &'a BTreeDefs<R>,
    page: Option<PageHandle>,
    index: usize,
}

impl<'a, R, D, P> BPlusTreeIterator<'a, R, D, P>
where
    R: RecordDef,
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    fn empty(ctx: Ctx<'a, D, P>, defs: &'a BTreeDefs<R>) -> Self {
        Self {
            ctx,
            defs,
            page: None,
            index: 0,
        }
    }

    /// Positions a cursor at the leftmost leaf tuple reachable from `root`,
    /// the crate's overload of the iterator initializer the original source
    /// left as a TODO (SPEC_FULL.md §B.2) — find the leftmost leaf via the
    /// same read-crabbing find() uses, then start the cursor before its
    /// first tuple.
    pub fn seek(
        ctx: Ctx<'a, D, P>,
        defs: &'a BTreeDefs<R>,
        root: crate::page_id::PageId,
        key: Option<&[i64]>,
        bound: Bound,
    ) -> Self {
        let index_def = defs.index_def();
        let mut cur = PersistentPage::acquire(ctx.dam, ctx.txn, root, LockType::Read, ctx.abort);
        if cur.is_null() {
            return Self::empty(ctx, defs);
        }
        loop {
            if NodeHeader::is_leaf(cur.buffer()) {
                break;
            }
            let child_index = match key {
                Some(k) => crate::bplus::interior::Interior::find_child_index_for_key(cur.buffer(), &index_def, k),
                None => match bound {
                    Bound::Max | Bound::Lt | Bound::Le => {
                        crate::bplus::interior::Interior::entry_count(cur.buffer()) as i64 - 1
                    }
                    _ => -1,
                },
            };
            let child_id = crate::bplus::interior::Interior::child_pid(cur.buffer(), &index_def, child_index);
            let mut child = PersistentPage::acquire(ctx.dam, ctx.txn, child_id, LockType::Read, ctx.abort);
            PersistentPage::release(ctx.dam, ctx.txn, &mut cur, ReleaseOptions::NONE, ctx.abort);
            if child.is_null() {
                return Self::empty(ctx, defs);
            }
            cur = child;
        }

        let mut it = Self {
            ctx,
            defs,
            index: 0,
            page: Some(cur),
        };
        it.adjust_to(key, bound);
        it
    }

    /// Re-positions within the current leaf, then steps `next`/`prev`
    /// until the boundary predicate named by `bound` holds (spec §4.7).
    pub fn adjust_to(&mut self, key: Option<&[i64]>, bound: Bound) {
        let leaf_buf = match &self.page {
            Some(h) if !h.is_null() => h.buffer(),
            _ => return,
        };
        let tuples = SortedPackedPage::decode_all(leaf_buf, LEAF_HEADER_LEN, &self.defs.record_def);
        let (start, exact_match) = match key {
            None => (
                match bound {
                    Bound::Min | Bound::Lt | Bound::Le => 0,
                    _ => tuples.len(),
                },
                false,
            ),
            Some(k) => match self.defs.locate(&tuples, k) {
                Ok(i) => (i, true),
                Err(i) => (i, false),
            },
        };
        self.index = start;

        match bound {
            Bound::Min | Bound::Max => {}
            Bound::Ge => {
                while self.current_key_cmp(key) == Some(std::cmp::Ordering::Less) {
                    if !self.next() {
                        break;
                    }
                }
            }
            Bound::Gt => {
                while matches!(
                    self.current_key_cmp(key),
                    Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)
                ) {
                    if !self.next() {
                        break;
                    }
                }
            }
            Bound::Le => {
                // An exact match is already the element we want; only an
                // insertion point (no equal element in this leaf) needs the
                // step back to the preceding, strictly-lesser element.
                if !exact_match && self.index > 0 {
                    self.index -= 1;
                }
                while matches!(self.current_key_cmp(key), Some(std::cmp::Ordering::Greater)) {
                    if !self.prev() {
                        break;
                    }
                }
            }
            Bound::Lt => {
                if self.index > 0 {
                    self.index -= 1;
                }
                while matches!(
                    self.current_key_cmp(key),
                    Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)
                ) {
                    if !self.prev() {
                        break;
                    }
                }
            }
        }
    }

    fn current_key_cmp(&self, key: Option<&[i64]>) -> Option<std::cmp::Ordering> {
        let key = key?;
        let tuple = self.current_tuple()?;
        Some(self.defs.key_of(&tuple).as_slice().cmp(key))
    }

    fn current_tuple(&self) -> Option<R::Tuple> {
        let h = self.page.as_ref()?;
        if h.is_null() {
            return None;
        }
        let tuples = SortedPackedPage::decode_all(h.buffer(), LEAF_HEADER_LEN, &self.defs.record_def);
        tuples.get(self.index).cloned()
    }

    /// Returns the tuple the cursor is positioned on, or `None` at either
    /// end.
    pub fn get(&self) -> Option<R::Tuple> {
        self.current_tuple()
    }

    /// Advances one tuple, following sibling pages and skipping any left
    /// entirely empty by a concurrent delete. Returns `false` at end of
    /// tree, leaving the cursor released.
    pub fn next(&mut self) -> bool {
        loop {
            let count = match &self.page {
                Some(h) if !h.is_null() => SortedPackedPage::tuple_count(h.buffer(), LEAF_HEADER_LEN),
                _ => return false,
            };
            if self.index + 1 < count {
                self.index += 1;
                return true;
            }
            if !self.advance_to_sibling(true) {
                return false;
            }
            if self.tuple_count_here() > 0 {
                self.index = 0;
                return true;
            }
        }
    }

    /// Symmetric to `next` (spec §4.7).
    pub fn prev(&mut self) -> bool {
        loop {
            match &self.page {
                Some(h) if !h.is_null() => {}
                _ => return false,
            }
            if self.index > 0 {
                self.index -= 1;
                return true;
            }
            if !self.advance_to_sibling(false) {
                return false;
            }
            let count = self.tuple_count_here();
            if count > 0 {
                self.index = count - 1;
                return true;
            }
        }
    }

    fn tuple_count_here(&self) -> usize {
        match &self.page {
            Some(h) if !h.is_null() => SortedPackedPage::tuple_count(h.buffer(), LEAF_HEADER_LEN),
            _ => 0,
        }
    }

    fn advance_to_sibling(&mut self, forward: bool) -> bool {
        let Some(mut cur) = self.page.take() else {
            return false;
        };
        if cur.is_null() {
            self.page = Some(cur);
            return false;
        }
        let sibling_id = if forward {
            NodeHeader::next_page_id(cur.buffer())
        } else {
            NodeHeader::prev_page_id(cur.buffer())
        };
        PersistentPage::release(self.ctx.dam, self.ctx.txn, &mut cur, ReleaseOptions::NONE, self.ctx.abort);
        if sibling_id.is_null(self.ctx.config.null_page_id()) {
            self.page = None;
            return false;
        }
        let sibling = PersistentPage::acquire(self.ctx.dam, self.ctx.txn, sibling_id, LockType::Read, self.ctx.abort);
        if sibling.is_null() {
            self.page = None;
            return false;
        }
        self.page = Some(sibling);
        true
    }

    /// Releases the lock held by the cursor, if any (spec §4.7 `delete`).
    pub fn close(&mut self) {
        if let Some(mut h) = self.page.take() {
            PersistentPage::release(self.ctx.dam, self.ctx.txn, &mut h, ReleaseOptions::NONE, self.ctx.abort);
        }
    }
}

impl<'a, R, D, P> Drop for BPlusTreeIterator<'a, R, D, P>
where
    R: RecordDef,
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    fn drop(&mut self) {
        self.close();
    }
}
