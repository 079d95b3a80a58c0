//! Integration tests for the linked page list (spec §4.9) driven through
//! real `PersistentPage::acquire`/`release` calls against an in-memory
//! store, rather than the raw-buffer unit tests living beside the module.
mod common;

use pagecrab::ctx::Ctx;
use pagecrab::dam::{AbortFlag, DataAccessMethods, LockType, PersistentPage, ReleaseOptions};
use pagecrab::linked_page_list::{self, LinkedPageListNode};
use pagecrab::{PageIdWidth, StoreConfig};

use common::{DirectPmm, InMemoryStore};

fn setup() -> (InMemoryStore, DirectPmm, StoreConfig, AbortFlag) {
    let config = StoreConfig::builder()
        .page_size(64)
        .page_id_width(PageIdWidth::Eight)
        .fan_out(4)
        .max_tree_height(16)
        .build();
    (InMemoryStore::new(64), DirectPmm, config, AbortFlag::new())
}

fn new_singular_head(dam: &InMemoryStore, pmm: &DirectPmm, abort: &AbortFlag) -> pagecrab::PageId {
    let mut page = PersistentPage::new_with_write_lock(dam, (), abort);
    let id = page.page_id();
    LinkedPageListNode::init(page.buffer_mut(), id, pmm, ());
    PersistentPage::release(dam, (), &mut page, ReleaseOptions::NONE, abort);
    id
}

#[test]
fn insert_between_promotes_a_singular_head_to_a_dual_node() {
    let (dam, pmm, _config, abort) = setup();
    let head_id = new_singular_head(&dam, &pmm, &abort);
    let ctx = Ctx { dam: &dam, pmm: &pmm, txn: (), config: &_config, abort: &abort };

    let mut head = PersistentPage::acquire(&dam, (), head_id, LockType::Write, &abort);
    let mut to_insert = PersistentPage::new_with_write_lock(&dam, (), &abort);
    LinkedPageListNode::init(to_insert.buffer_mut(), to_insert.page_id(), &pmm, ());
    let ins_id = to_insert.page_id();

    let mut head2 = PersistentPage::acquire(&dam, (), head_id, LockType::Write, &abort);
    assert!(linked_page_list::insert_between(ctx, &mut head, &mut head2, &mut to_insert));

    assert!(LinkedPageListNode::is_dual_node(head.buffer(), head_id));
    assert_eq!(LinkedPageListNode::next_page_id(head.buffer()), ins_id);
    assert_eq!(LinkedPageListNode::prev_page_id(head.buffer()), ins_id);
    assert_eq!(LinkedPageListNode::next_page_id(to_insert.buffer()), head_id);
    assert_eq!(LinkedPageListNode::prev_page_id(to_insert.buffer()), head_id);

    // `head2` is a second, untouched write-lock copy of the same page the
    // store handed out before `head` was mutated; release it first so its
    // stale content doesn't clobber `head`'s update on write-back.
    PersistentPage::release(&dam, (), &mut head2, ReleaseOptions::NONE, &abort);
    PersistentPage::release(&dam, (), &mut head, ReleaseOptions::NONE, &abort);
    PersistentPage::release(&dam, (), &mut to_insert, ReleaseOptions::NONE, &abort);
}

#[test]
fn insert_between_splices_into_an_adjacent_pair() {
    let (dam, pmm, config, abort) = setup();
    let head_id = new_singular_head(&dam, &pmm, &abort);
    let ctx = Ctx { dam: &dam, pmm: &pmm, txn: (), config: &config, abort: &abort };

    // Promote the singular head to a dual node first (head <-> second).
    let mut head = PersistentPage::acquire(&dam, (), head_id, LockType::Write, &abort);
    let mut second = PersistentPage::new_with_write_lock(&dam, (), &abort);
    LinkedPageListNode::init(second.buffer_mut(), second.page_id(), &pmm, ());
    let second_id = second.page_id();
    let mut head_dup = PersistentPage::acquire(&dam, (), head_id, LockType::Write, &abort);
    assert!(linked_page_list::insert_between(ctx, &mut head, &mut head_dup, &mut second));
    PersistentPage::release(&dam, (), &mut head, ReleaseOptions::NONE, &abort);
    PersistentPage::release(&dam, (), &mut head_dup, ReleaseOptions::NONE, &abort);
    PersistentPage::release(&dam, (), &mut second, ReleaseOptions::NONE, &abort);

    // Now splice a third page in between head and second.
    let mut head = PersistentPage::acquire(&dam, (), head_id, LockType::Write, &abort);
    let mut second = PersistentPage::acquire(&dam, (), second_id, LockType::Write, &abort);
    let mut third = PersistentPage::new_with_write_lock(&dam, (), &abort);
    LinkedPageListNode::init(third.buffer_mut(), third.page_id(), &pmm, ());
    let third_id = third.page_id();

    assert!(linked_page_list::insert_between(ctx, &mut head, &mut second, &mut third));
    assert_eq!(LinkedPageListNode::next_page_id(head.buffer()), third_id);
    assert_eq!(LinkedPageListNode::prev_page_id(second.buffer()), third_id);
    assert_eq!(LinkedPageListNode::next_page_id(third.buffer()), second_id);
    assert_eq!(LinkedPageListNode::prev_page_id(third.buffer()), head_id);

    PersistentPage::release(&dam, (), &mut head, ReleaseOptions::NONE, &abort);
    PersistentPage::release(&dam, (), &mut second, ReleaseOptions::NONE, &abort);
    PersistentPage::release(&dam, (), &mut third, ReleaseOptions::NONE, &abort);
}

#[test]
fn remove_splices_a_node_out_of_a_three_node_chain() {
    let (dam, pmm, config, abort) = setup();
    let head_id = new_singular_head(&dam, &pmm, &abort);
    let ctx = Ctx { dam: &dam, pmm: &pmm, txn: (), config: &config, abort: &abort };

    // Build head <-> middle <-> tail.
    let mut head = PersistentPage::acquire(&dam, (), head_id, LockType::Write, &abort);
    let mut middle = PersistentPage::new_with_write_lock(&dam, (), &abort);
    LinkedPageListNode::init(middle.buffer_mut(), middle.page_id(), &pmm, ());
    let middle_id = middle.page_id();
    let mut head_dup = PersistentPage::acquire(&dam, (), head_id, LockType::Write, &abort);
    assert!(linked_page_list::insert_between(ctx, &mut head, &mut head_dup, &mut middle));
    PersistentPage::release(&dam, (), &mut head, ReleaseOptions::NONE, &abort);
    PersistentPage::release(&dam, (), &mut head_dup, ReleaseOptions::NONE, &abort);
    PersistentPage::release(&dam, (), &mut middle, ReleaseOptions::NONE, &abort);

    let mut head = PersistentPage::acquire(&dam, (), head_id, LockType::Write, &abort);
    let mut middle = PersistentPage::acquire(&dam, (), middle_id, LockType::Write, &abort);
    let mut tail = PersistentPage::new_with_write_lock(&dam, (), &abort);
    LinkedPageListNode::init(tail.buffer_mut(), tail.page_id(), &pmm, ());
    let tail_id = tail.page_id();
    assert!(linked_page_list::insert_between(ctx, &mut head, &mut middle, &mut tail));
    PersistentPage::release(&dam, (), &mut head, ReleaseOptions::NONE, &abort);
    PersistentPage::release(&dam, (), &mut middle, ReleaseOptions::NONE, &abort);
    PersistentPage::release(&dam, (), &mut tail, ReleaseOptions::NONE, &abort);

    // Remove `middle` from head <-> middle <-> tail, leaving head <-> tail.
    let mut head = PersistentPage::acquire(&dam, (), head_id, LockType::Write, &abort);
    let mut middle = PersistentPage::acquire(&dam, (), middle_id, LockType::Write, &abort);
    let mut tail = PersistentPage::acquire(&dam, (), tail_id, LockType::Write, &abort);
    assert!(linked_page_list::remove(ctx, &mut head, &mut middle, &mut tail));

    assert!(LinkedPageListNode::is_free_node(middle.buffer(), dam.null_page_id()));
    assert!(LinkedPageListNode::is_dual_node(head.buffer(), head_id));
    assert_eq!(LinkedPageListNode::next_page_id(head.buffer()), tail_id);
    assert_eq!(LinkedPageListNode::prev_page_id(tail.buffer()), head_id);

    PersistentPage::release(&dam, (), &mut head, ReleaseOptions::NONE, &abort);
    PersistentPage::release(&dam, (), &mut middle, ReleaseOptions::FREE_PAGE, &abort);
    PersistentPage::release(&dam, (), &mut tail, ReleaseOptions::NONE, &abort);
}

#[test]
fn remove_demotes_a_dual_node_back_to_a_singular_head() {
    let (dam, pmm, config, abort) = setup();
    let head_id = new_singular_head(&dam, &pmm, &abort);
    let ctx = Ctx { dam: &dam, pmm: &pmm, txn: (), config: &config, abort: &abort };

    let mut head = PersistentPage::acquire(&dam, (), head_id, LockType::Write, &abort);
    let mut other = PersistentPage::new_with_write_lock(&dam, (), &abort);
    LinkedPageListNode::init(other.buffer_mut(), other.page_id(), &pmm, ());
    let other_id = other.page_id();
    let mut head_dup = PersistentPage::acquire(&dam, (), head_id, LockType::Write, &abort);
    assert!(linked_page_list::insert_between(ctx, &mut head, &mut head_dup, &mut other));
    PersistentPage::release(&dam, (), &mut head, ReleaseOptions::NONE, &abort);
    PersistentPage::release(&dam, (), &mut head_dup, ReleaseOptions::NONE, &abort);
    PersistentPage::release(&dam, (), &mut other, ReleaseOptions::NONE, &abort);

    // head <-> other is now a dual node; remove `other` by passing `head`
    // as both prev and next (prev.page_id() == next.page_id()).
    let mut head = PersistentPage::acquire(&dam, (), head_id, LockType::Write, &abort);
    let mut other = PersistentPage::acquire(&dam, (), other_id, LockType::Write, &abort);
    let mut head_dup = PersistentPage::acquire(&dam, (), head_id, LockType::Write, &abort);
    assert!(linked_page_list::remove(ctx, &mut head, &mut other, &mut head_dup));

    assert!(LinkedPageListNode::is_singular_head(head.buffer(), head_id));
    assert!(LinkedPageListNode::is_free_node(other.buffer(), dam.null_page_id()));

    PersistentPage::release(&dam, (), &mut head, ReleaseOptions::NONE, &abort);
    PersistentPage::release(&dam, (), &mut other, ReleaseOptions::FREE_PAGE, &abort);
    PersistentPage::release(&dam, (), &mut head_dup, ReleaseOptions::NONE, &abort);
}

#[test]
fn remove_rejects_a_singular_head() {
    let (dam, pmm, config, abort) = setup();
    let head_id = new_singular_head(&dam, &pmm, &abort);
    let ctx = Ctx { dam: &dam, pmm: &pmm, txn: (), config: &config, abort: &abort };

    let mut head = PersistentPage::acquire(&dam, (), head_id, LockType::Write, &abort);
    let mut head_dup1 = PersistentPage::acquire(&dam, (), head_id, LockType::Write, &abort);
    let mut head_dup2 = PersistentPage::acquire(&dam, (), head_id, LockType::Write, &abort);

    assert!(!linked_page_list::remove(ctx, &mut head_dup1, &mut head, &mut head_dup2));
    assert!(LinkedPageListNode::is_singular_head(head.buffer(), head_id));

    PersistentPage::release(&dam, (), &mut head, ReleaseOptions::NONE, &abort);
    PersistentPage::release(&dam, (), &mut head_dup1, ReleaseOptions::NONE, &abort);
    PersistentPage::release(&dam, (), &mut head_dup2, ReleaseOptions::NONE, &abort);
}
