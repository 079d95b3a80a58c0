//! Radix page-table: layout and walkers (spec §3.5, §4.8). A page stores
//! `(level, first_bucket_id, entries[fan_out])`; a leaf (`level == 0`) holds
//! page-id entries directly, an interior holds child page ids covering
//! contiguous `fan_out^level`-bucket sub-ranges. Unlike the B+ tree, pages
//! here carry no sibling pointers — the trie shape alone determines
//! coverage, so merges/splits of this structure are really just
//! level-up/level-down (see `level_up`/`level_down` below).
pub mod range_locker;

use crate::ctx::Ctx;
use crate::dam::{DataAccessMethods, LockType, PageHandle, PersistentPage, ReleaseOptions};
use crate::locked_stack::LockedPagesStack;
use crate::page_id::PageId;
use crate::pmm::PageModificationMethods;

pub const HEADER_LEN: usize = 1 + 8;

/// Direction operand for `find_non_null` (spec §4.8.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindDirection {
    Lt,
    Le,
    Ge,
    Gt,
}

pub struct PageTableNode;

impl PageTableNode {
    pub fn level(buf: &[u8]) -> u8 {
        buf[0]
    }

    pub fn first_bucket_id(buf: &[u8]) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&buf[1..9]);
        u64::from_be_bytes(bytes)
    }

    fn entry_offset(slot: usize) -> usize {
        HEADER_LEN + slot * 8
    }

    pub fn entry(buf: &[u8], _fan_out: u64, slot: usize) -> PageId {
        let off = Self::entry_offset(slot);
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&buf[off..off + 8]);
        PageId::new(u64::from_be_bytes(bytes))
    }

    pub fn set_entry<P: PageModificationMethods>(
        buf: &mut [u8],
        _fan_out: u64,
        slot: usize,
        pid: PageId,
        pmm: &P,
        txn: P::Txn,
    ) {
        let off = Self::entry_offset(slot);
        pmm.write_region(txn, buf, off, &pid.0.to_be_bytes());
    }

    /// Initializes `buf` as a fresh, entirely-NULL page table page.
    pub fn init_empty<P: PageModificationMethods>(
        buf: &mut [u8],
        level: u8,
        first_bucket_id: u64,
        fan_out: u64,
        null_page_id: u64,
        pmm: &P,
        txn: P::Txn,
    ) {
        pmm.init_page(txn, buf);
        pmm.write_region(txn, buf, 0, &[level]);
        pmm.write_region(txn, buf, 1, &first_bucket_id.to_be_bytes());
        for slot in 0..fan_out as usize {
            Self::set_entry(buf, fan_out, slot, PageId::new(null_page_id), pmm, txn);
        }
    }

    pub fn non_null_count(buf: &[u8], fan_out: u64, null_page_id: u64) -> usize {
        (0..fan_out as usize)
            .filter(|&s| !Self::entry(buf, fan_out, s).is_null(null_page_id))
            .count()
    }

    pub fn is_all_null(buf: &[u8], fan_out: u64, null_page_id: u64) -> bool {
        Self::non_null_count(buf, fan_out, null_page_id) == 0
    }

    fn slot_width(fan_out: u64, level: u8) -> u128 {
        let mut w = 1u128;
        for _ in 0..level {
            w = w.saturating_mul(fan_out as u128);
        }
        w
    }

    fn range_len(fan_out: u64, level: u8) -> u128 {
        Self::slot_width(fan_out, level).saturating_mul(fan_out as u128)
    }

    pub fn covers(buf: &[u8], fan_out: u64, bucket_id: u64) -> bool {
        Self::slot_for(buf, fan_out, bucket_id).is_some()
    }

    /// The slot within this page whose sub-range contains `bucket_id`, or
    /// `None` if `bucket_id` falls outside the page's own `[first,
    /// first+fan_out^(level+1))` coverage.
    pub fn slot_for(buf: &[u8], fan_out: u64, bucket_id: u64) -> Option<usize> {
        let first = Self::first_bucket_id(buf);
        if bucket_id < first {
            return None;
        }
        let offset = (bucket_id - first) as u128;
        let level = Self::level(buf);
        if offset >= Self::range_len(fan_out, level) {
            return None;
        }
        Some((offset / Self::slot_width(fan_out, level)) as usize)
    }

    fn slot_range_start(buf: &[u8], fan_out: u64, slot: usize) -> u64 {
        let first = Self::first_bucket_id(buf);
        let width = Self::slot_width(fan_out, Self::level(buf));
        let start = (first as u128).saturating_add(width.saturating_mul(slot as u128));
        start.min(u64::MAX as u128) as u64
    }
}

/// Wraps the current page (`root`, in place — its page id never changes)
/// under successively taller interiors until its range contains
/// `bucket_id` (spec §4.8.4 "level-up", §4.8.5). The old content is copied
/// into a freshly allocated child; `root`'s own buffer becomes the new,
/// taller interior.
fn level_up<D, P>(ctx: Ctx<D, P>, fan_out: u64, null_page_id: u64, max_tree_height: usize, root: &mut PageHandle, bucket_id: u64)
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    let mut guard = 0usize;
    while PageTableNode::slot_for(root.buffer(), fan_out, bucket_id).is_none() {
        guard += 1;
        assert!(guard <= max_tree_height, "fatal: page table grew past max_tree_height");

        let old_level = PageTableNode::level(root.buffer());
        let old_first = PageTableNode::first_bucket_id(root.buffer());
        let new_level = old_level + 1;
        let new_width = PageTableNode::slot_width(fan_out, new_level);
        let new_first = ((old_first as u128 / new_width) * new_width) as u64;
        let old_width = PageTableNode::slot_width(fan_out, old_level);
        let slot_for_old = ((old_first as u128 - new_first as u128) / old_width) as usize;

        let mut child = PersistentPage::new_with_write_lock(ctx.dam, ctx.txn, ctx.abort);
        let old_bytes = root.buffer().to_vec();
        ctx.pmm.write_region(ctx.txn, child.buffer_mut(), 0, &old_bytes);

        PageTableNode::init_empty(root.buffer_mut(), new_level, new_first, fan_out, null_page_id, ctx.pmm, ctx.txn);
        PageTableNode::set_entry(root.buffer_mut(), fan_out, slot_for_old, child.page_id(), ctx.pmm, ctx.txn);
        PersistentPage::release(ctx.dam, ctx.txn, &mut child, ReleaseOptions::NONE, ctx.abort);
    }
}

/// Valid only on an interior with exactly one non-NULL child (spec
/// §4.8.5). Copies the child's buffer over `node`'s own and frees the
/// child; `node` keeps its page id but takes on the child's former level.
fn level_down<D, P>(ctx: Ctx<D, P>, node: &mut PageHandle, fan_out: u64, null_page_id: u64)
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    let slot = (0..fan_out as usize)
        .find(|&s| !PageTableNode::entry(node.buffer(), fan_out, s).is_null(null_page_id))
        .expect("fatal: level_down requires exactly one non-NULL child");
    let child_id = PageTableNode::entry(node.buffer(), fan_out, slot);
    let mut child = PersistentPage::acquire(ctx.dam, ctx.txn, child_id, LockType::Write, ctx.abort);
    let bytes = child.buffer().to_vec();
    ctx.pmm.write_region(ctx.txn, node.buffer_mut(), 0, &bytes);
    PersistentPage::release(ctx.dam, ctx.txn, &mut child, ReleaseOptions::FREE_PAGE, ctx.abort);
}

fn release_rest<D, P>(ctx: Ctx<D, P>, stack: &mut LockedPagesStack)
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    while let Some(mut e) = stack.pop_top() {
        PersistentPage::release(ctx.dam, ctx.txn, &mut e.handle, ReleaseOptions::NONE, ctx.abort);
    }
}

/// Pops `stack` leaf-to-root, freeing a page once it holds zero live
/// entries and clearing the pointer to it held by the frame above
/// (`frame.child_index`, the slot that frame used to reach its child),
/// collapsing single-child interiors with `level_down` along the way
/// (spec §4.8.4 "Set to NULL" reverse pass). Stops as soon as a popped
/// frame survives with more than one entry. Returns whether the very
/// bottom-most anchor (the caller's own `local_root` or real-root slot,
/// not itself part of `stack`) must also clear its pointer.
fn collapse_upward<D, P>(ctx: Ctx<D, P>, fan_out: u64, null_page_id: u64, stack: &mut LockedPagesStack) -> bool
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    let mut first = true;
    let mut empty_below = false;
    loop {
        let Some(mut frame) = stack.pop_top() else {
            return empty_below;
        };
        if !first {
            if empty_below {
                PageTableNode::set_entry(frame.handle.buffer_mut(), fan_out, frame.child_index as usize, PageId::new(null_page_id), ctx.pmm, ctx.txn);
            } else {
                PersistentPage::release(ctx.dam, ctx.txn, &mut frame.handle, ReleaseOptions::NONE, ctx.abort);
                release_rest(ctx, stack);
                return false;
            }
        }
        first = false;

        loop {
            let nn = PageTableNode::non_null_count(frame.handle.buffer(), fan_out, null_page_id);
            if nn == 1 && PageTableNode::level(frame.handle.buffer()) > 0 {
                level_down(ctx, &mut frame.handle, fan_out, null_page_id);
            } else {
                empty_below = nn == 0;
                break;
            }
        }

        let opts = if empty_below { ReleaseOptions::FREE_PAGE } else { ReleaseOptions::NONE };
        PersistentPage::release(ctx.dam, ctx.txn, &mut frame.handle, opts, ctx.abort);
        if !empty_below {
            release_rest(ctx, stack);
            return false;
        }
    }
}

/// Reads `bucket_id`'s entry starting from `local_root`, descending
/// read-locked (spec §4.8.3). Never acquires or releases `local_root`
/// itself, so a caller (typically a `RangeLocker`) can reuse the same
/// handle across repeated calls.
pub fn get<D, P>(ctx: Ctx<D, P>, fan_out: u64, null_page_id: u64, local_root: &PageHandle, bucket_id: u64) -> PageId
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    let Some(slot) = PageTableNode::slot_for(local_root.buffer(), fan_out, bucket_id) else {
        return PageId::new(null_page_id);
    };
    if PageTableNode::level(local_root.buffer()) == 0 {
        return PageTableNode::entry(local_root.buffer(), fan_out, slot);
    }
    let child_id = PageTableNode::entry(local_root.buffer(), fan_out, slot);
    if child_id.is_null(null_page_id) {
        return child_id;
    }
    let mut current = PersistentPage::acquire(ctx.dam, ctx.txn, child_id, LockType::Read, ctx.abort);
    loop {
        if current.is_null() {
            return PageId::new(null_page_id);
        }
        let Some(slot) = PageTableNode::slot_for(current.buffer(), fan_out, bucket_id) else {
            PersistentPage::release(ctx.dam, ctx.txn, &mut current, ReleaseOptions::NONE, ctx.abort);
            return PageId::new(null_page_id);
        };
        let pid = PageTableNode::entry(current.buffer(), fan_out, slot);
        if PageTableNode::level(current.buffer()) == 0 || pid.is_null(null_page_id) {
            PersistentPage::release(ctx.dam, ctx.txn, &mut current, ReleaseOptions::NONE, ctx.abort);
            return pid;
        }
        let mut next = PersistentPage::acquire(ctx.dam, ctx.txn, pid, LockType::Read, ctx.abort);
        PersistentPage::release(ctx.dam, ctx.txn, &mut current, ReleaseOptions::NONE, ctx.abort);
        current = next;
    }
}

/// Writes `new_value` at `bucket_id`, or clears it when `new_value` is
/// `None` (spec §4.8.4). Requires `local_root` write-locked; its page id
/// never changes, even across level-up/level-down.
pub fn set<D, P>(
    ctx: Ctx<D, P>,
    fan_out: u64,
    null_page_id: u64,
    max_tree_height: usize,
    local_root: &mut PageHandle,
    bucket_id: u64,
    new_value: Option<PageId>,
) where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    match new_value {
        Some(pid) => {
            level_up(ctx, fan_out, null_page_id, max_tree_height, local_root, bucket_id);
            set_non_null(ctx, fan_out, null_page_id, local_root, bucket_id, pid);
        }
        None => set_null(ctx, fan_out, null_page_id, max_tree_height, local_root, bucket_id),
    }
}

fn set_non_null<D, P>(ctx: Ctx<D, P>, fan_out: u64, null_page_id: u64, local_root: &mut PageHandle, bucket_id: u64, pid: PageId)
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    if PageTableNode::is_all_null(local_root.buffer(), fan_out, null_page_id) {
        let aligned = bucket_id - bucket_id % fan_out;
        PageTableNode::init_empty(local_root.buffer_mut(), 0, aligned, fan_out, null_page_id, ctx.pmm, ctx.txn);
    }
    let slot = PageTableNode::slot_for(local_root.buffer(), fan_out, bucket_id).expect("level_up ensures containment");
    if PageTableNode::level(local_root.buffer()) == 0 {
        PageTableNode::set_entry(local_root.buffer_mut(), fan_out, slot, pid, ctx.pmm, ctx.txn);
        return;
    }

    let mut current = descend_or_allocate(ctx, fan_out, null_page_id, local_root.buffer_mut(), slot);
    loop {
        if PageTableNode::is_all_null(current.buffer(), fan_out, null_page_id) {
            let aligned = bucket_id - bucket_id % fan_out;
            PageTableNode::init_empty(current.buffer_mut(), 0, aligned, fan_out, null_page_id, ctx.pmm, ctx.txn);
        }
        let slot = PageTableNode::slot_for(current.buffer(), fan_out, bucket_id).expect("descent invariant");
        if PageTableNode::level(current.buffer()) == 0 {
            PageTableNode::set_entry(current.buffer_mut(), fan_out, slot, pid, ctx.pmm, ctx.txn);
            PersistentPage::release(ctx.dam, ctx.txn, &mut current, ReleaseOptions::NONE, ctx.abort);
            return;
        }
        let mut next = descend_or_allocate(ctx, fan_out, null_page_id, current.buffer_mut(), slot);
        PersistentPage::release(ctx.dam, ctx.txn, &mut current, ReleaseOptions::NONE, ctx.abort);
        current = next;
    }
}

/// Follows `parent`'s `slot` entry, write-locking the child; allocates a
/// fresh empty child first if the slot was NULL (spec §4.8.4).
fn descend_or_allocate<D, P>(ctx: Ctx<D, P>, fan_out: u64, null_page_id: u64, parent: &mut [u8], slot: usize) -> PageHandle
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    let child_id = PageTableNode::entry(parent, fan_out, slot);
    if child_id.is_null(null_page_id) {
        let mut new_child = PersistentPage::new_with_write_lock(ctx.dam, ctx.txn, ctx.abort);
        let child_first = PageTableNode::slot_range_start(parent, fan_out, slot);
        PageTableNode::init_empty(new_child.buffer_mut(), 0, child_first, fan_out, null_page_id, ctx.pmm, ctx.txn);
        PageTableNode::set_entry(parent, fan_out, slot, new_child.page_id(), ctx.pmm, ctx.txn);
        new_child
    } else {
        PersistentPage::acquire(ctx.dam, ctx.txn, child_id, LockType::Write, ctx.abort)
    }
}

fn set_null<D, P>(ctx: Ctx<D, P>, fan_out: u64, null_page_id: u64, max_tree_height: usize, local_root: &mut PageHandle, bucket_id: u64)
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    let Some(root_slot) = PageTableNode::slot_for(local_root.buffer(), fan_out, bucket_id) else {
        return;
    };
    if PageTableNode::level(local_root.buffer()) == 0 {
        PageTableNode::set_entry(local_root.buffer_mut(), fan_out, root_slot, PageId::new(null_page_id), ctx.pmm, ctx.txn);
        return;
    }

    let mut stack = LockedPagesStack::with_capacity(max_tree_height + 1);
    let mut next_id = PageTableNode::entry(local_root.buffer(), fan_out, root_slot);
    if next_id.is_null(null_page_id) {
        return;
    }
    let mut current = PersistentPage::acquire(ctx.dam, ctx.txn, next_id, LockType::Write, ctx.abort);
    loop {
        if current.is_null() {
            break;
        }
        let Some(slot_here) = PageTableNode::slot_for(current.buffer(), fan_out, bucket_id) else {
            PersistentPage::release(ctx.dam, ctx.txn, &mut current, ReleaseOptions::NONE, ctx.abort);
            release_rest(ctx, &mut stack);
            return;
        };
        if PageTableNode::level(current.buffer()) == 0 {
            PageTableNode::set_entry(current.buffer_mut(), fan_out, slot_here, PageId::new(null_page_id), ctx.pmm, ctx.txn);
            stack.push(current, slot_here as i64);
            break;
        }
        next_id = PageTableNode::entry(current.buffer(), fan_out, slot_here);
        stack.push(current, slot_here as i64);
        if next_id.is_null(null_page_id) {
            break;
        }
        current = PersistentPage::acquire(ctx.dam, ctx.txn, next_id, LockType::Write, ctx.abort);
    }

    if collapse_upward(ctx, fan_out, null_page_id, &mut stack) {
        PageTableNode::set_entry(local_root.buffer_mut(), fan_out, root_slot, PageId::new(null_page_id), ctx.pmm, ctx.txn);
        loop {
            let nn = PageTableNode::non_null_count(local_root.buffer(), fan_out, null_page_id);
            if nn == 1 && PageTableNode::level(local_root.buffer()) > 0 {
                level_down(ctx, local_root, fan_out, null_page_id);
            } else if nn == 0 {
                let first = PageTableNode::first_bucket_id(local_root.buffer());
                PageTableNode::init_empty(local_root.buffer_mut(), 0, first, fan_out, null_page_id, ctx.pmm, ctx.txn);
                break;
            } else {
                break;
            }
        }
    }
}

/// DFS under `buf`'s subtree for the extremal bucket in `direction`'s
/// sense relative to `bucket_id` (spec §4.8.6). `LT`/`GT` are normalized
/// to `LE`/`GE` on `bucket_id - 1`/`bucket_id + 1` by the caller; this
/// inner search only ever handles `LE`/`GE`.
fn dfs_find<D, P>(ctx: Ctx<D, P>, fan_out: u64, null_page_id: u64, buf: &[u8], target: u64, ascending: bool) -> Option<(u64, PageId)>
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    let first = PageTableNode::first_bucket_id(buf);
    let level = PageTableNode::level(buf);
    let total = PageTableNode::range_len(fan_out, level);
    let start_slot: i64 = match PageTableNode::slot_for(buf, fan_out, target) {
        Some(s) => s as i64,
        None if ascending => {
            if (target as u128) < first as u128 {
                0
            } else {
                return None;
            }
        }
        None => {
            if (target as u128) >= first as u128 + total {
                fan_out as i64 - 1
            } else {
                return None;
            }
        }
    };

    let slots: Vec<i64> = if ascending {
        (start_slot..fan_out as i64).collect()
    } else {
        (0..=start_slot).rev().collect()
    };

    for slot in slots {
        let child_id = PageTableNode::entry(buf, fan_out, slot as usize);
        if child_id.is_null(null_page_id) {
            continue;
        }
        if level == 0 {
            return Some((first + slot as u64, child_id));
        }
        let mut handle = PersistentPage::acquire(ctx.dam, ctx.txn, child_id, LockType::Read, ctx.abort);
        if handle.is_null() {
            continue;
        }
        let result = dfs_find(ctx, fan_out, null_page_id, handle.buffer(), target, ascending);
        PersistentPage::release(ctx.dam, ctx.txn, &mut handle, ReleaseOptions::NONE, ctx.abort);
        if result.is_some() {
            return result;
        }
    }
    None
}

/// Finds the nearest non-NULL bucket to `bucket_id` in `direction`'s
/// sense, reading from `local_root` (spec §4.8.6). Returns `None` when no
/// such bucket exists under `local_root`, or `direction` would under/
/// overflow `u64`.
pub fn find_non_null<D, P>(
    ctx: Ctx<D, P>,
    fan_out: u64,
    null_page_id: u64,
    local_root: &PageHandle,
    bucket_id: u64,
    direction: FindDirection,
) -> Option<(u64, PageId)>
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    let (target, ascending) = match direction {
        FindDirection::Ge => (bucket_id, true),
        FindDirection::Gt => (bucket_id.checked_add(1)?, true),
        FindDirection::Le => (bucket_id, false),
        FindDirection::Lt => (bucket_id.checked_sub(1)?, false),
    };
    dfs_find(ctx, fan_out, null_page_id, local_root.buffer(), target, ascending)
}

fn destroy_node<D, P>(ctx: Ctx<D, P>, fan_out: u64, null_page_id: u64, handle: &mut PageHandle)
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    if PageTableNode::level(handle.buffer()) > 0 {
        let children: Vec<PageId> = (0..fan_out as usize)
            .map(|s| PageTableNode::entry(handle.buffer(), fan_out, s))
            .filter(|pid| !pid.is_null(null_page_id))
            .collect();
        for child_id in children {
            let mut child = PersistentPage::acquire(ctx.dam, ctx.txn, child_id, LockType::Read, ctx.abort);
            if !child.is_null() {
                destroy_node(ctx, fan_out, null_page_id, &mut child);
            }
        }
    }
    PersistentPage::release(ctx.dam, ctx.txn, handle, ReleaseOptions::FREE_PAGE, ctx.abort);
}

/// Frees every page of the trie rooted at `root`, post-order, under READ
/// locks (spec §4.8.7).
pub fn destroy<D, P>(ctx: Ctx<D, P>, fan_out: u64, null_page_id: u64, root: PageId)
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    let mut handle = PersistentPage::acquire(ctx.dam, ctx.txn, root, LockType::Read, ctx.abort);
    if handle.is_null() {
        return;
    }
    destroy_node(ctx, fan_out, null_page_id, &mut handle);
}

/// Re-descends from the real page-table `real_root` to find and clear the
/// pointer to `local_root_id` (a range locker's local root that narrowing
/// left entirely empty), cascading the same free/level-down collapse
/// `set`'s NULL path uses (spec §4.8.2 "Release", §4.8.7
/// `delete_range_locker`). `anchor_bucket` is any bucket known to fall
/// inside `local_root_id`'s delegated range — its own `first_bucket_id`
/// works. A no-op if `local_root_id` is already the real root.
pub fn prune_empty_local_root<D, P>(
    ctx: Ctx<D, P>,
    fan_out: u64,
    null_page_id: u64,
    max_tree_height: usize,
    real_root: PageId,
    local_root_id: PageId,
    anchor_bucket: u64,
) where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    if real_root == local_root_id {
        return;
    }
    let mut root = PersistentPage::acquire(ctx.dam, ctx.txn, real_root, LockType::Write, ctx.abort);
    if root.is_null() {
        return;
    }

    // Matches `local_root_id` against the real root's own slot first (the
    // real root is never pushed onto `stack`, mirroring how `local_root` is
    // never released in `get`/`set`); only descends further if not found
    // there.
    let Some(root_slot) = PageTableNode::slot_for(root.buffer(), fan_out, anchor_bucket) else {
        PersistentPage::release(ctx.dam, ctx.txn, &mut root, ReleaseOptions::NONE, ctx.abort);
        return;
    };
    let mut next_id = PageTableNode::entry(root.buffer(), fan_out, root_slot);
    if next_id.is_null(null_page_id) {
        PersistentPage::release(ctx.dam, ctx.txn, &mut root, ReleaseOptions::NONE, ctx.abort);
        return;
    }
    if next_id == local_root_id {
        PageTableNode::set_entry(root.buffer_mut(), fan_out, root_slot, PageId::new(null_page_id), ctx.pmm, ctx.txn);
        PersistentPage::free(ctx.dam, ctx.txn, local_root_id, ctx.abort);
        let nn = PageTableNode::non_null_count(root.buffer(), fan_out, null_page_id);
        if nn == 0 {
            let first = PageTableNode::first_bucket_id(root.buffer());
            PageTableNode::init_empty(root.buffer_mut(), 0, first, fan_out, null_page_id, ctx.pmm, ctx.txn);
        } else if nn == 1 && PageTableNode::level(root.buffer()) > 0 {
            level_down(ctx, &mut root, fan_out, null_page_id);
        }
        PersistentPage::release(ctx.dam, ctx.txn, &mut root, ReleaseOptions::NONE, ctx.abort);
        return;
    }

    let mut stack = LockedPagesStack::with_capacity(max_tree_height + 1);
    let mut current = PersistentPage::acquire(ctx.dam, ctx.txn, next_id, LockType::Write, ctx.abort);
    let mut found = false;
    loop {
        if current.is_null() {
            break;
        }
        let Some(slot) = PageTableNode::slot_for(current.buffer(), fan_out, anchor_bucket) else {
            PersistentPage::release(ctx.dam, ctx.txn, &mut current, ReleaseOptions::NONE, ctx.abort);
            break;
        };
        let child_id = PageTableNode::entry(current.buffer(), fan_out, slot);
        if child_id.is_null(null_page_id) {
            PersistentPage::release(ctx.dam, ctx.txn, &mut current, ReleaseOptions::NONE, ctx.abort);
            break;
        }
        if child_id == local_root_id {
            PageTableNode::set_entry(current.buffer_mut(), fan_out, slot, PageId::new(null_page_id), ctx.pmm, ctx.txn);
            PersistentPage::free(ctx.dam, ctx.txn, local_root_id, ctx.abort);
            stack.push(current, slot as i64);
            found = true;
            break;
        }
        next_id = child_id;
        stack.push(current, slot as i64);
        current = PersistentPage::acquire(ctx.dam, ctx.txn, next_id, LockType::Write, ctx.abort);
    }

    if !found {
        PersistentPage::release(ctx.dam, ctx.txn, &mut root, ReleaseOptions::NONE, ctx.abort);
        release_rest(ctx, &mut stack);
        return;
    }

    if collapse_upward(ctx, fan_out, null_page_id, &mut stack) {
        // the real root itself ended up with zero live entries; unlike a
        // range locker's local root, the real root's own slot has no
        // parent to clear, so simply leave it as a freshly-empty level-0
        // page rather than freeing it (it is the one page the store always
        // keeps addressable).
        let first = PageTableNode::first_bucket_id(root.buffer());
        PageTableNode::init_empty(root.buffer_mut(), 0, first, fan_out, null_page_id, ctx.pmm, ctx.txn);
    }
    PersistentPage::release(ctx.dam, ctx.txn, &mut root, ReleaseOptions::NONE, ctx.abort);
}
