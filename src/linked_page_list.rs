//! Linked Page List Node (spec §4.9): a doubly-linked chain of whole
//! pages used as a page-granularity sequence building block, independent
//! of whatever payload tuples a caller packs onto each node beyond this
//! header. Three node states: **singular head** (`next == prev ==
//! self`), **dual** (`next == prev != self`), **general**. A node is
//! "free" when both links are `NULL_PAGE_ID` — the only state in which it
//! may point outside the list.
use crate::ctx::Ctx;
use crate::dam::{DataAccessMethods, LockType, PageHandle, PersistentPage};
use crate::page_id::PageId;
use crate::pmm::PageModificationMethods;

pub const HEADER_LEN: usize = 1 + 8 + 8;
const PAGE_TYPE_LINKED_LIST: u8 = 2;

fn read_page_id(buf: &[u8], offset: usize) -> PageId {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    PageId::new(u64::from_be_bytes(bytes))
}

pub struct LinkedPageListNode;

impl LinkedPageListNode {
    pub fn next_page_id(buf: &[u8]) -> PageId {
        read_page_id(buf, 1)
    }

    pub fn prev_page_id(buf: &[u8]) -> PageId {
        read_page_id(buf, 9)
    }

    pub fn set_next_page_id<P: PageModificationMethods>(buf: &mut [u8], pid: PageId, pmm: &P, txn: P::Txn) {
        pmm.write_region(txn, buf, 1, &pid.0.to_be_bytes());
    }

    pub fn set_prev_page_id<P: PageModificationMethods>(buf: &mut [u8], pid: PageId, pmm: &P, txn: P::Txn) {
        pmm.write_region(txn, buf, 9, &pid.0.to_be_bytes());
    }

    /// Initializes `buf` as a fresh singular-head node (spec §4.9). `self_id`
    /// is the page id `buf` was allocated under — known only after
    /// allocation, hence taken as a parameter rather than read back from the
    /// page.
    pub fn init<P: PageModificationMethods>(buf: &mut [u8], self_id: PageId, pmm: &P, txn: P::Txn) {
        pmm.init_page(txn, buf);
        pmm.write_region(txn, buf, 0, &[PAGE_TYPE_LINKED_LIST]);
        Self::set_next_page_id(buf, self_id, pmm, txn);
        Self::set_prev_page_id(buf, self_id, pmm, txn);
    }

    pub fn is_next_of(buf: &[u8], candidate_next: PageId) -> bool {
        Self::next_page_id(buf) == candidate_next
    }

    pub fn is_prev_of(buf: &[u8], candidate_prev: PageId) -> bool {
        Self::prev_page_id(buf) == candidate_prev
    }

    pub fn is_singular_head(buf: &[u8], self_id: PageId) -> bool {
        Self::next_page_id(buf) == self_id && Self::prev_page_id(buf) == self_id
    }

    pub fn is_dual_node(buf: &[u8], self_id: PageId) -> bool {
        let next = Self::next_page_id(buf);
        next == Self::prev_page_id(buf) && next != self_id
    }

    pub fn is_free_node(buf: &[u8], null_page_id: u64) -> bool {
        Self::next_page_id(buf).is_null(null_page_id) && Self::prev_page_id(buf).is_null(null_page_id)
    }
}

/// Write-locks and returns `node`'s next neighbor, or a NULL handle if
/// `node` is a singular head (spec §4.9).
pub fn lock_and_get_next<D, P>(ctx: Ctx<D, P>, node: &PageHandle, lock_type: LockType) -> PageHandle
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    if LinkedPageListNode::is_singular_head(node.buffer(), node.page_id()) {
        return PageHandle::null();
    }
    let next_id = LinkedPageListNode::next_page_id(node.buffer());
    PersistentPage::acquire(ctx.dam, ctx.txn, next_id, lock_type, ctx.abort)
}

/// Symmetric to `lock_and_get_next`.
pub fn lock_and_get_prev<D, P>(ctx: Ctx<D, P>, node: &PageHandle, lock_type: LockType) -> PageHandle
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    if LinkedPageListNode::is_singular_head(node.buffer(), node.page_id()) {
        return PageHandle::null();
    }
    let prev_id = LinkedPageListNode::prev_page_id(node.buffer());
    PersistentPage::acquire(ctx.dam, ctx.txn, prev_id, lock_type, ctx.abort)
}

/// Splices `to_insert` between `existing1` and `existing2` (spec §4.9).
/// Two shapes are valid: `existing1.next == existing2` (an ordinary
/// adjacent pair), or `existing1 == existing2` and it is a singular head
/// (promoting it to a dual node with `to_insert` pointing back at it on
/// both links). Returns `false`, leaving all three pages unchanged,
/// otherwise.
pub fn insert_between<D, P>(
    ctx: Ctx<D, P>,
    existing1: &mut PageHandle,
    existing2: &mut PageHandle,
    to_insert: &mut PageHandle,
) -> bool
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    if existing1.page_id() != existing2.page_id() {
        if LinkedPageListNode::next_page_id(existing1.buffer()) != existing2.page_id()
            || LinkedPageListNode::prev_page_id(existing2.buffer()) != existing1.page_id()
        {
            return false;
        }
        LinkedPageListNode::set_next_page_id(existing1.buffer_mut(), to_insert.page_id(), ctx.pmm, ctx.txn);
        LinkedPageListNode::set_next_page_id(to_insert.buffer_mut(), existing2.page_id(), ctx.pmm, ctx.txn);
        LinkedPageListNode::set_prev_page_id(existing2.buffer_mut(), to_insert.page_id(), ctx.pmm, ctx.txn);
        LinkedPageListNode::set_prev_page_id(to_insert.buffer_mut(), existing1.page_id(), ctx.pmm, ctx.txn);
        true
    } else if LinkedPageListNode::is_singular_head(existing1.buffer(), existing1.page_id()) {
        LinkedPageListNode::set_next_page_id(existing1.buffer_mut(), to_insert.page_id(), ctx.pmm, ctx.txn);
        LinkedPageListNode::set_prev_page_id(existing1.buffer_mut(), to_insert.page_id(), ctx.pmm, ctx.txn);
        LinkedPageListNode::set_next_page_id(to_insert.buffer_mut(), existing1.page_id(), ctx.pmm, ctx.txn);
        LinkedPageListNode::set_prev_page_id(to_insert.buffer_mut(), existing1.page_id(), ctx.pmm, ctx.txn);
        true
    } else {
        false
    }
}

/// Splices `node` out of the chain between `prev` and `next`, demoting a
/// dual node (`prev.page_id() == next.page_id()`) back to a singular head
/// (spec §9 supplement — the original leaves this as a TODO; the shape
/// mirrors `insert_between`'s pointer surgery run in reverse). `node` is
/// left in the free state (both links `NULL_PAGE_ID`); the caller decides
/// whether to actually free its page. Returns `false`, leaving all three
/// pages unchanged, if the three don't form a consistent
/// `prev -> node -> next` run, or if `node` is a singular head (nothing
/// to splice it out of).
pub fn remove<D, P>(ctx: Ctx<D, P>, prev: &mut PageHandle, node: &mut PageHandle, next: &mut PageHandle) -> bool
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    if prev.page_id() == node.page_id() || next.page_id() == node.page_id() {
        return false;
    }
    if !LinkedPageListNode::is_next_of(prev.buffer(), node.page_id())
        || !LinkedPageListNode::is_prev_of(node.buffer(), prev.page_id())
        || !LinkedPageListNode::is_next_of(node.buffer(), next.page_id())
        || !LinkedPageListNode::is_prev_of(next.buffer(), node.page_id())
    {
        return false;
    }

    if prev.page_id() == next.page_id() {
        let prev_id = prev.page_id();
        LinkedPageListNode::set_next_page_id(prev.buffer_mut(), prev_id, ctx.pmm, ctx.txn);
        LinkedPageListNode::set_prev_page_id(prev.buffer_mut(), prev_id, ctx.pmm, ctx.txn);
    } else {
        LinkedPageListNode::set_next_page_id(prev.buffer_mut(), next.page_id(), ctx.pmm, ctx.txn);
        LinkedPageListNode::set_prev_page_id(next.buffer_mut(), prev.page_id(), ctx.pmm, ctx.txn);
    }

    let null = PageId::new(ctx.config.null_page_id());
    LinkedPageListNode::set_next_page_id(node.buffer_mut(), null, ctx.pmm, ctx.txn);
    LinkedPageListNode::set_prev_page_id(node.buffer_mut(), null, ctx.pmm, ctx.txn);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dam::{AbortFlag, ReleaseOptions};

    struct NoopPmm;
    impl PageModificationMethods for NoopPmm {
        type Txn = ();
        fn write_region(&self, _txn: (), buffer: &mut [u8], offset: usize, bytes: &[u8]) {
            buffer[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        fn memmove_region(&self, _txn: (), buffer: &mut [u8], dst: usize, src: usize, len: usize) {
            buffer.copy_within(src..src + len, dst);
        }
        fn init_page(&self, _txn: (), buffer: &mut [u8]) {
            for b in buffer.iter_mut() {
                *b = 0;
            }
        }
    }

    fn node(id: u64) -> (PageId, Vec<u8>) {
        let pmm = NoopPmm;
        let pid = PageId::new(id);
        let mut buf = vec![0u8; 64];
        LinkedPageListNode::init(&mut buf, pid, &pmm, ());
        (pid, buf)
    }

    #[test]
    fn singular_head_round_trip() {
        let (pid, buf) = node(1);
        assert!(LinkedPageListNode::is_singular_head(&buf, pid));
        assert!(!LinkedPageListNode::is_dual_node(&buf, pid));
    }

    #[test]
    fn insert_between_promotes_singular_head_to_dual() {
        let pmm = NoopPmm;
        let (head_id, mut head_buf) = node(1);
        let (ins_id, mut ins_buf) = node(2);

        let next = LinkedPageListNode::next_page_id(&head_buf);
        assert_eq!(next, head_id);

        LinkedPageListNode::set_next_page_id(&mut head_buf, head_id, &pmm, ());
        LinkedPageListNode::set_next_page_id(&mut ins_buf, head_id, &pmm, ());
        LinkedPageListNode::set_prev_page_id(&mut ins_buf, head_id, &pmm, ());
        LinkedPageListNode::set_prev_page_id(&mut head_buf, ins_id, &pmm, ());
        LinkedPageListNode::set_next_page_id(&mut head_buf, ins_id, &pmm, ());

        assert!(LinkedPageListNode::is_dual_node(&head_buf, head_id));
        assert_eq!(LinkedPageListNode::next_page_id(&ins_buf), head_id);
        assert_eq!(LinkedPageListNode::prev_page_id(&ins_buf), head_id);
    }

    #[test]
    fn is_free_node_after_both_links_nulled() {
        let pmm = NoopPmm;
        let (_pid, mut buf) = node(3);
        let null = PageId::new(u64::MAX);
        LinkedPageListNode::set_next_page_id(&mut buf, null, &pmm, ());
        LinkedPageListNode::set_prev_page_id(&mut buf, null, &pmm, ());
        assert!(LinkedPageListNode::is_free_node(&buf, u64::MAX));
    }

    #[allow(dead_code)]
    fn unused_imports_reference(_: AbortFlag, _: ReleaseOptions) {}
}
