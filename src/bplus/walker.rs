//! Downward crabbing walkers for find/insert/delete/update, split-insert-
//! and-unlock-up, merge-and-unlock-up, and root growth/shrink (spec §4.6).
//!
//! Every walk here holds a write lock on the full spine from root to leaf
//! for the duration of the call rather than eagerly releasing ancestors the
//! moment they are known safe (spec §4.6.2's `release_for_split`/
//! `release_for_merge` counters). The safe-from watermarks below are still
//! computed and used to batch-release ancestors as soon as the operation's
//! kind is known (insert/delete/update), which recovers most of the
//! concurrency win; see DESIGN.md for why full mid-descent release was
//! dropped.
use crate::bplus::header::{NodeHeader, INTERIOR_HEADER_LEN, LEAF_HEADER_LEN};
use crate::bplus::interior::Interior;
use crate::bplus::split_merge;
use crate::bplus::BTreeDefs;
use crate::capacity::{can_insert_without_split, less_than_half_full, more_than_half_full};
use crate::ctx::Ctx;
use crate::dam::{DataAccessMethods, LockType, PageHandle, PersistentPage, ReleaseOptions};
use crate::error::{StoreError, StoreResult};
use crate::locked_stack::{LockedPagesStack, StackEntry};
use crate::page_id::PageId;
use crate::pmm::PageModificationMethods;
use crate::sorted_packed_page::SortedPackedPage;
use crate::tuple::{Direction, RecordDef, TupleDef};

pub struct BPlusTreeWalker;

fn release<D: DataAccessMethods, P: PageModificationMethods<Txn = D::Txn>>(
    ctx: Ctx<D, P>,
    handle: &mut PageHandle,
) {
    PersistentPage::release(ctx.dam, ctx.txn, handle, ReleaseOptions::NONE, ctx.abort);
}

fn release_prefix<D: DataAccessMethods, P: PageModificationMethods<Txn = D::Txn>>(
    ctx: Ctx<D, P>,
    stack: &mut LockedPagesStack,
    count: usize,
) {
    for _ in 0..count {
        if let Some(mut entry) = stack.pop_bottom() {
            release(ctx, &mut entry.handle);
        } else {
            break;
        }
    }
}

fn release_all<D: DataAccessMethods, P: PageModificationMethods<Txn = D::Txn>>(
    ctx: Ctx<D, P>,
    stack: &mut LockedPagesStack,
) {
    while let Some(mut entry) = stack.pop_top() {
        release(ctx, &mut entry.handle);
    }
}

impl BPlusTreeWalker {
    /// Read-crabbing find (spec §4.6.1). Holds at most two page locks at
    /// any instant.
    pub fn find<R, D, P>(ctx: Ctx<D, P>, defs: &BTreeDefs<R>, root: PageId, key: &[i64]) -> Option<R::Tuple>
    where
        R: RecordDef,
        D: DataAccessMethods,
        P: PageModificationMethods<Txn = D::Txn>,
    {
        let index_def = defs.index_def();
        let mut cur = PersistentPage::acquire(ctx.dam, ctx.txn, root, LockType::Read, ctx.abort);
        if cur.is_null() {
            return None;
        }
        loop {
            if NodeHeader::is_leaf(cur.buffer()) {
                break;
            }
            let child_index = Interior::find_child_index_for_key(cur.buffer(), &index_def, key);
            let child_id = Interior::child_pid(cur.buffer(), &index_def, child_index);
            let mut child = PersistentPage::acquire(ctx.dam, ctx.txn, child_id, LockType::Read, ctx.abort);
            PersistentPage::release(ctx.dam, ctx.txn, &mut cur, ReleaseOptions::NONE, ctx.abort);
            if child.is_null() {
                return None;
            }
            cur = child;
        }
        let tuples = SortedPackedPage::decode_all(cur.buffer(), LEAF_HEADER_LEN, &defs.record_def);
        let found = defs.locate(&tuples, key).ok().map(|i| tuples[i].clone());
        PersistentPage::release(ctx.dam, ctx.txn, &mut cur, ReleaseOptions::NONE, ctx.abort);
        found
    }

    /// The umbrella write operation (spec §4.6.2): descends write-crabbing,
    /// hands the inspector the old record (if any) and the caller's desired
    /// new record, and applies whichever of insert/update/delete/no-op the
    /// inspector settles on.
    pub fn inspected_update<R, D, P, F>(
        ctx: Ctx<D, P>,
        defs: &BTreeDefs<R>,
        root_page_id: &mut PageId,
        key: &[i64],
        mut new_record: Option<R::Tuple>,
        mut inspector: F,
    ) -> StoreResult<()>
    where
        R: RecordDef,
        D: DataAccessMethods,
        P: PageModificationMethods<Txn = D::Txn>,
        F: FnMut(Option<&R::Tuple>, &mut Option<R::Tuple>),
    {
        if let Some(rec) = &new_record {
            if defs.record_def.size_of(rec) > ctx.config.page_size / 3 {
                return Err(StoreError::InvalidArgument(
                    "record exceeds page_size / 3".to_string(),
                ));
            }
        }

        let index_def = defs.index_def();
        let mut stack = LockedPagesStack::with_capacity(ctx.config.max_tree_height + 1);
        let mut safe_split_from = 0usize;
        let mut safe_merge_from = 0usize;

        let mut cur = PersistentPage::acquire(ctx.dam, ctx.txn, *root_page_id, LockType::Write, ctx.abort);
        if cur.is_null() {
            return Err(StoreError::NotFound);
        }
        loop {
            if NodeHeader::is_leaf(cur.buffer()) {
                stack.push(cur, -1);
                break;
            }
            let allotted = SortedPackedPage::allotted(ctx.config.page_size, INTERIOR_HEADER_LEN);
            let used = SortedPackedPage::used_bytes(cur.buffer(), INTERIOR_HEADER_LEN);
            if !more_than_half_full(allotted, used) {
                safe_split_from = stack.len();
            }
            if more_than_half_full(allotted, used) {
                safe_merge_from = stack.len();
            }
            let child_index = Interior::find_child_index_for_key(cur.buffer(), &index_def, key);
            let child_id = Interior::child_pid(cur.buffer(), &index_def, child_index);
            stack.push(cur, child_index);
            cur = PersistentPage::acquire(ctx.dam, ctx.txn, child_id, LockType::Write, ctx.abort);
        }

        let StackEntry { handle: mut leaf, .. } = stack.pop_top().expect("leaf just pushed");
        let tuples = SortedPackedPage::decode_all(leaf.buffer(), LEAF_HEADER_LEN, &defs.record_def);
        let found = defs.locate(&tuples, key);
        let old_record = found.ok().map(|i| tuples[i].clone());
        inspector(old_record.as_ref(), &mut new_record);

        match (old_record, new_record) {
            (None, None) => {
                release(ctx, &mut leaf);
                release_all(ctx, &mut stack);
                Ok(())
            }
            (None, Some(new_rec)) => {
                release_prefix(ctx, &mut stack, safe_split_from);
                let allotted = SortedPackedPage::allotted(ctx.config.page_size, LEAF_HEADER_LEN);
                let used = SortedPackedPage::used_bytes(leaf.buffer(), LEAF_HEADER_LEN);
                let size = defs.record_def.size_of(&new_rec);
                if can_insert_without_split(allotted, used, 0, size) {
                    let idx = defs.locate(&tuples, key).unwrap_or_else(|i| i);
                    SortedPackedPage::insert_at(
                        leaf.buffer_mut(),
                        LEAF_HEADER_LEN,
                        &defs.record_def,
                        &new_rec,
                        idx,
                        ctx.pmm,
                        ctx.txn,
                    );
                    release(ctx, &mut leaf);
                    release_all(ctx, &mut stack);
                    Ok(())
                } else {
                    split_insert_and_unlock_pages_up(ctx, defs, root_page_id, &mut stack, leaf, new_rec)
                }
            }
            (Some(old_rec), None) => {
                release_prefix(ctx, &mut stack, safe_merge_from);
                let idx = defs.locate(&tuples, &defs.key_of(&old_rec)).expect("old record located");
                SortedPackedPage::delete_at(leaf.buffer_mut(), LEAF_HEADER_LEN, &defs.record_def, idx, ctx.pmm, ctx.txn);
                merge_and_unlock_pages_up(ctx, defs, root_page_id, &mut stack, leaf)
            }
            (Some(old_rec), Some(new_rec)) => {
                if defs.key_of(&old_rec) != defs.key_of(&new_rec) {
                    release(ctx, &mut leaf);
                    release_all(ctx, &mut stack);
                    return Err(StoreError::InvalidArgument(
                        "update must not change the record's key".to_string(),
                    ));
                }
                let idx = defs.locate(&tuples, &defs.key_of(&old_rec)).expect("old record located");
                let old_size = defs.record_def.size_of(&old_rec);
                let new_size = defs.record_def.size_of(&new_rec);
                let fits = SortedPackedPage::update_at(
                    leaf.buffer_mut(),
                    LEAF_HEADER_LEN,
                    ctx.config.page_size,
                    &defs.record_def,
                    &new_rec,
                    idx,
                    ctx.pmm,
                    ctx.txn,
                );
                if fits {
                    if new_size <= old_size {
                        merge_and_unlock_pages_up(ctx, defs, root_page_id, &mut stack, leaf)
                    } else {
                        release(ctx, &mut leaf);
                        release_all(ctx, &mut stack);
                        Ok(())
                    }
                } else {
                    SortedPackedPage::delete_at(leaf.buffer_mut(), LEAF_HEADER_LEN, &defs.record_def, idx, ctx.pmm, ctx.txn);
                    split_insert_and_unlock_pages_up(ctx, defs, root_page_id, &mut stack, leaf, new_rec)
                }
            }
        }
    }
}

/// Spec §4.6.3. `leaf` is already known to require a split to admit
/// `new_record`.
fn split_insert_and_unlock_pages_up<R, D, P>(
    ctx: Ctx<D, P>,
    defs: &BTreeDefs<R>,
    root_page_id: &mut PageId,
    stack: &mut LockedPagesStack,
    mut leaf: PageHandle,
    new_record: R::Tuple,
) -> StoreResult<()>
where
    R: RecordDef,
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    let index_def = defs.index_def();
    let keys: Vec<usize> = (0..index_def.key_columns).collect();
    let directions = vec![Direction::Ascending; index_def.key_columns];

    let (mut parent_entry, mut sibling) = split_merge::split_insert_leaf(ctx, defs, &mut leaf, new_record);
    let mut current_id = leaf.page_id();
    let mut current_level = NodeHeader::level(leaf.buffer());
    release(ctx, &mut leaf);
    release(ctx, &mut sibling);

    loop {
        match stack.pop_top() {
            None => {
                let mut new_root = PersistentPage::new_with_write_lock(ctx.dam, ctx.txn, ctx.abort);
                NodeHeader::init_interior(
                    new_root.buffer_mut(),
                    current_level + 1,
                    current_id,
                    true,
                    ctx.pmm,
                    ctx.txn,
                );
                SortedPackedPage::insert(
                    new_root.buffer_mut(),
                    INTERIOR_HEADER_LEN,
                    &index_def,
                    &parent_entry,
                    &keys,
                    &directions,
                    ctx.pmm,
                    ctx.txn,
                );
                *root_page_id = new_root.page_id();
                release(ctx, &mut new_root);
                return Ok(());
            }
            Some(StackEntry { handle: mut parent, .. }) => {
                let allotted = SortedPackedPage::allotted(ctx.config.page_size, INTERIOR_HEADER_LEN);
                let used = SortedPackedPage::used_bytes(parent.buffer(), INTERIOR_HEADER_LEN);
                let entry_size = index_def.size_of(&parent_entry);
                if can_insert_without_split(allotted, used, 0, entry_size) {
                    SortedPackedPage::insert(
                        parent.buffer_mut(),
                        INTERIOR_HEADER_LEN,
                        &index_def,
                        &parent_entry,
                        &keys,
                        &directions,
                        ctx.pmm,
                        ctx.txn,
                    );
                    release(ctx, &mut parent);
                    release_all(ctx, stack);
                    return Ok(());
                }
                current_id = parent.page_id();
                current_level = NodeHeader::level(parent.buffer());
                let (new_entry, mut parent_sibling) = split_merge::split_insert_interior(
                    ctx,
                    &index_def,
                    defs.size_class,
                    &mut parent,
                    parent_entry,
                );
                parent_entry = new_entry;
                release(ctx, &mut parent);
                release(ctx, &mut parent_sibling);
            }
        }
    }
}

/// Which side of `current`'s parent slot a leaf-merge freed, so
/// `remove_stale_entry` deletes the right separator (spec §4.6.4).
enum PendingMerge {
    /// Merged `current`'s next sibling into `current`; the freed page's
    /// separator lives at slot `child_index + 1`.
    Next(PageId),
    /// Merged `current` into its previous sibling; `current` itself was
    /// freed, so its own separator at slot `child_index` is now stale.
    Prev(PageId),
}

/// Spec §4.6.4. `leaf` has already had its target record removed (or is
/// the unchanged page after an in-place update that may have shrunk it).
fn merge_and_unlock_pages_up<R, D, P>(
    ctx: Ctx<D, P>,
    defs: &BTreeDefs<R>,
    root_page_id: &mut PageId,
    stack: &mut LockedPagesStack,
    mut current: PageHandle,
) -> StoreResult<()>
where
    R: RecordDef,
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    let index_def = defs.index_def();
    let mut freed_sibling_id: Option<PendingMerge> = None;

    let allotted = SortedPackedPage::allotted(ctx.config.page_size, LEAF_HEADER_LEN);
    let used = SortedPackedPage::used_bytes(current.buffer(), LEAF_HEADER_LEN);
    if less_than_half_full(allotted, used) {
        // A sibling only has a separator in this parent if it was reached
        // through the same parent slot list `current` was (spec §4.6.4
        // "merge with next if it shares a parent; otherwise previous").
        let parent_slot = stack
            .peek_top()
            .map(|e| (Interior::entry_count(e.handle.buffer()) as i64, e.child_index));
        let next_shares_parent = matches!(parent_slot, Some((entry_count, child_index)) if child_index + 1 < entry_count);
        let prev_shares_parent = matches!(parent_slot, Some((_, child_index)) if child_index >= 0);

        let next_id = NodeHeader::next_page_id(current.buffer());
        if next_shares_parent && split_merge::merge_leaves(ctx, defs, &mut current) {
            freed_sibling_id = Some(PendingMerge::Next(next_id));
        } else if prev_shares_parent {
            let prev_id = NodeHeader::prev_page_id(current.buffer());
            if !prev_id.is_null(ctx.config.null_page_id()) {
                let mut prev = PersistentPage::acquire(ctx.dam, ctx.txn, prev_id, LockType::Write, ctx.abort);
                if !prev.is_null() && split_merge::merge_leaves(ctx, defs, &mut prev) {
                    freed_sibling_id = Some(PendingMerge::Prev(current.page_id()));
                    release(ctx, &mut current);
                    current = prev;
                } else if !prev.is_null() {
                    release(ctx, &mut prev);
                }
            }
        }
    }

    release(ctx, &mut current);

    loop {
        match stack.pop_top() {
            None => {
                maybe_collapse_root(ctx, root_page_id);
                return Ok(());
            }
            Some(StackEntry { handle: mut parent, child_index }) => {
                if let Some(pending) = freed_sibling_id.take() {
                    remove_stale_entry(ctx, &index_def, &mut parent, child_index, pending);
                }

                let allotted = SortedPackedPage::allotted(ctx.config.page_size, INTERIOR_HEADER_LEN);
                let used = SortedPackedPage::used_bytes(parent.buffer(), INTERIOR_HEADER_LEN);
                if !less_than_half_full(allotted, used) {
                    release(ctx, &mut parent);
                    release_all(ctx, stack);
                    return Ok(());
                }

                let gp_slot = match stack.peek_top() {
                    Some(gp) => gp.child_index,
                    None => {
                        // `parent` is the root; root shrink (single-child collapse) is
                        // handled once the walk fully unwinds, not here.
                        release(ctx, &mut parent);
                        maybe_collapse_root(ctx, root_page_id);
                        return Ok(());
                    }
                };

                // On success the grandparent's own entries are already patched
                // in place (no separate stale-entry step at the next level up).
                if try_merge_interior_sibling(ctx, &index_def, stack, &mut parent, gp_slot) {
                    release(ctx, &mut parent);
                } else {
                    release(ctx, &mut parent);
                    release_all(ctx, stack);
                    return Ok(());
                }
            }
        }
    }
}

/// Deletes the parent entry that routed to the page a leaf-merge just
/// freed (spec §4.6.4 "the corresponding separator entry in the parent is
/// deleted on the next upward step"). `child_index` is the slot `current`
/// itself occupies in `parent` — for a next-merge the freed sibling's own
/// separator is one slot over at `child_index + 1`; for a prev-merge
/// `current` was the one freed, so its separator is `child_index` itself
/// (always a real slot here: the prev-merge path only runs when
/// `child_index >= 0`, i.e. when `current` wasn't reached via the virtual
/// least-keys slot).
fn remove_stale_entry<D, P>(
    ctx: Ctx<D, P>,
    index_def: &crate::tuple::IndexTupleDef,
    parent: &mut PageHandle,
    child_index: i64,
    pending: PendingMerge,
) where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    match pending {
        PendingMerge::Next(freed_id) => {
            let slot = child_index + 1;
            debug_assert_eq!(Interior::child_pid(parent.buffer(), index_def, slot), freed_id);
            SortedPackedPage::delete_at(parent.buffer_mut(), INTERIOR_HEADER_LEN, index_def, slot as usize, ctx.pmm, ctx.txn);
        }
        PendingMerge::Prev(freed_id) => {
            debug_assert!(child_index >= 0);
            debug_assert_eq!(Interior::child_pid(parent.buffer(), index_def, child_index), freed_id);
            SortedPackedPage::delete_at(parent.buffer_mut(), INTERIOR_HEADER_LEN, index_def, child_index as usize, ctx.pmm, ctx.txn);
        }
    }
}

/// Attempts to merge `node` (found under `gp_slot` in the not-yet-popped
/// grandparent) with an interior sibling reachable through the same
/// grandparent, patching the grandparent's own entries on success so the
/// caller never has to revisit this level.
fn try_merge_interior_sibling<D, P>(
    ctx: Ctx<D, P>,
    index_def: &crate::tuple::IndexTupleDef,
    stack: &mut LockedPagesStack,
    node: &mut PageHandle,
    gp_slot: i64,
) -> bool
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    let grandparent = match stack.peek_top_mut() {
        Some(g) => g,
        None => return false,
    };
    let gp_handle = &mut grandparent.handle;
    let gp_entry_count = Interior::entry_count(gp_handle.buffer()) as i64;

    if gp_slot + 1 < gp_entry_count {
        let right_id = Interior::child_pid(gp_handle.buffer(), index_def, gp_slot + 1);
        let sep = Interior::separator_key(gp_handle.buffer(), index_def, (gp_slot + 1) as usize);
        let mut right = PersistentPage::acquire(ctx.dam, ctx.txn, right_id, LockType::Write, ctx.abort);
        if !right.is_null() && split_merge::merge_interiors(ctx, index_def, node, &sep, &mut right) {
            PersistentPage::release(ctx.dam, ctx.txn, &mut right, ReleaseOptions::FREE_PAGE, ctx.abort);
            SortedPackedPage::delete_at(
                gp_handle.buffer_mut(),
                INTERIOR_HEADER_LEN,
                index_def,
                (gp_slot + 1) as usize,
                ctx.pmm,
                ctx.txn,
            );
            return true;
        }
        if !right.is_null() {
            release(ctx, &mut right);
        }
    }
    if gp_slot >= 0 {
        let left_id = Interior::child_pid(gp_handle.buffer(), index_def, gp_slot - 1);
        let sep = Interior::separator_key(gp_handle.buffer(), index_def, gp_slot as usize);
        let mut left = PersistentPage::acquire(ctx.dam, ctx.txn, left_id, LockType::Write, ctx.abort);
        if !left.is_null() && split_merge::merge_interiors(ctx, index_def, &mut left, &sep, node) {
            PersistentPage::release(ctx.dam, ctx.txn, node, ReleaseOptions::FREE_PAGE, ctx.abort);
            release(ctx, &mut left);
            if gp_slot == 0 {
                let entries = SortedPackedPage::decode_all(gp_handle.buffer(), INTERIOR_HEADER_LEN, index_def);
                let new_least = index_def.child_page_id(&entries[0]);
                NodeHeader::set_least_keys_page_id(gp_handle.buffer_mut(), PageId::new(new_least), ctx.pmm, ctx.txn);
                SortedPackedPage::delete_at(gp_handle.buffer_mut(), INTERIOR_HEADER_LEN, index_def, 0, ctx.pmm, ctx.txn);
            } else {
                SortedPackedPage::delete_at(gp_handle.buffer_mut(), INTERIOR_HEADER_LEN, index_def, gp_slot as usize, ctx.pmm, ctx.txn);
            }
            return true;
        }
        if !left.is_null() {
            release(ctx, &mut left);
        }
    }
    false
}

/// Spec §4.6.5 shrink: while the root is an interior page with no entries
/// of its own (a single child, held as `least_keys_page_id`), clone that
/// child's content into the root buffer and free the child. Repeats in
/// case the newly-promoted content is itself a single-child interior.
fn maybe_collapse_root<D, P>(ctx: Ctx<D, P>, root_page_id: &mut PageId)
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    loop {
        let mut root = PersistentPage::acquire(ctx.dam, ctx.txn, *root_page_id, LockType::Write, ctx.abort);
        if root.is_null() {
            return;
        }
        if !(NodeHeader::is_interior(root.buffer()) && Interior::entry_count(root.buffer()) == 0) {
            release(ctx, &mut root);
            return;
        }
        let child_id = NodeHeader::least_keys_page_id(root.buffer());
        let mut child = PersistentPage::acquire(ctx.dam, ctx.txn, child_id, LockType::Write, ctx.abort);
        if child.is_null() {
            release(ctx, &mut root);
            return;
        }
        let child_bytes = child.buffer().to_vec();
        ctx.pmm.write_region(ctx.txn, root.buffer_mut(), 0, &child_bytes);
        PersistentPage::release(ctx.dam, ctx.txn, &mut child, ReleaseOptions::FREE_PAGE, ctx.abort);
        let collapse_again = NodeHeader::is_interior(root.buffer()) && Interior::entry_count(root.buffer()) == 0;
        release(ctx, &mut root);
        if !collapse_again {
            return;
        }
    }
}
