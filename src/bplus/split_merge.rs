//! Split/merge/level-collapse algorithms for variable-sized tuples packed
//! on fixed-size pages (spec §4.5). Every split computes a full replacement
//! list — existing tuples plus the one being inserted, in sorted order — at
//! the Rust-value level and then divides that list, rather than literally
//! "move the back half, then decide which of the two pages gets the new
//! tuple" as the prose in spec §4.5 describes; both produce the same sorted
//! result, and working from one combined list keeps the split-point
//! arithmetic in one place (see DESIGN.md).
use crate::bplus::header::{NodeHeader, INTERIOR_HEADER_LEN, LEAF_HEADER_LEN};
use crate::bplus::BTreeDefs;
use crate::capacity::TupleSizeClass;
use crate::ctx::Ctx;
use crate::dam::{DataAccessMethods, LockType, PageHandle, PersistentPage, ReleaseOptions};
use crate::page_id::PageId;
use crate::pmm::PageModificationMethods;
use crate::sorted_packed_page::SortedPackedPage;
use crate::tuple::{IndexTupleDef, RecordDef, TupleDef};

fn split_point<T, D: TupleDef<Tuple = T>>(
    tuples: &[T],
    def: &D,
    size_class: TupleSizeClass,
    allotted: usize,
    is_last_in_chain: bool,
) -> usize {
    match size_class {
        TupleSizeClass::Fixed { .. } => (tuples.len() + 1) / 2,
        TupleSizeClass::Variable => {
            let target = if is_last_in_chain { allotted } else { allotted / 2 };
            let mut used = 0usize;
            let mut stay = 0usize;
            for t in tuples {
                let sz = def.size_of(t);
                if used + sz > target {
                    break;
                }
                used += sz;
                stay += 1;
            }
            stay.max(1).min(tuples.len().saturating_sub(1)).max(1)
        }
    }
}

/// Splits `page1` to make room for `tuple`, returning the parent entry the
/// caller must propagate upward: `(key(first(page2)), page2_id)` (spec
/// §4.5). `page2` is returned write-locked; the caller decides when to
/// release it.
pub fn split_insert_leaf<R, D, P>(
    ctx: Ctx<D, P>,
    defs: &BTreeDefs<R>,
    page1: &mut PageHandle,
    tuple: R::Tuple,
) -> (Vec<i64>, PageHandle)
where
    R: RecordDef,
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    let header_len = LEAF_HEADER_LEN;
    let next_id = NodeHeader::next_page_id(page1.buffer());
    let is_last_leaf = next_id.is_null(ctx.config.null_page_id());

    let mut full = SortedPackedPage::decode_all(page1.buffer(), header_len, &defs.record_def);
    let idx = SortedPackedPage::find_insertion_point(
        page1.buffer(),
        header_len,
        &defs.record_def,
        &tuple,
        &defs.key_columns,
        &defs.directions(),
    );
    full.insert(idx, tuple);

    let allotted = SortedPackedPage::allotted(ctx.config.page_size, header_len);
    let stay = split_point(&full, &defs.record_def, defs.size_class, allotted, is_last_leaf);
    let moved = full.split_off(stay);

    let mut page2 = PersistentPage::new_with_write_lock(ctx.dam, ctx.txn, ctx.abort);
    NodeHeader::init_leaf(page2.buffer_mut(), page1.page_id(), next_id, ctx.pmm, ctx.txn);
    NodeHeader::set_next_page_id(page1.buffer_mut(), page2.page_id(), ctx.pmm, ctx.txn);

    if !is_last_leaf {
        let mut page3 = PersistentPage::acquire(ctx.dam, ctx.txn, next_id, LockType::Write, ctx.abort);
        NodeHeader::set_prev_page_id(page3.buffer_mut(), page2.page_id(), ctx.pmm, ctx.txn);
        PersistentPage::release(ctx.dam, ctx.txn, &mut page3, ReleaseOptions::NONE, ctx.abort);
    }

    let parent_key = defs.key_of(&moved[0]);
    SortedPackedPage::rewrite_all(page2.buffer_mut(), header_len, &defs.record_def, &moved, ctx.pmm, ctx.txn);
    SortedPackedPage::rewrite_all(page1.buffer_mut(), header_len, &defs.record_def, &full, ctx.pmm, ctx.txn);

    let index_def = defs.index_def();
    let parent_entry = index_def.make(&parent_key, page2.page_id().0);
    (parent_entry, page2)
}

/// Merges `next(page1)` into `page1` (spec §4.5). Returns `false` without
/// mutating anything if there is no next sibling, the sibling's lock
/// cannot be acquired, or the combined tuples would not fit on one page.
pub fn merge_leaves<R, D, P>(ctx: Ctx<D, P>, defs: &BTreeDefs<R>, page1: &mut PageHandle) -> bool
where
    R: RecordDef,
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    let header_len = LEAF_HEADER_LEN;
    let next_id = NodeHeader::next_page_id(page1.buffer());
    if next_id.is_null(ctx.config.null_page_id()) {
        return false;
    }
    let mut page2 = PersistentPage::acquire(ctx.dam, ctx.txn, next_id, LockType::Write, ctx.abort);
    if page2.is_null() {
        return false;
    }

    let t1 = SortedPackedPage::decode_all(page1.buffer(), header_len, &defs.record_def);
    let t2 = SortedPackedPage::decode_all(page2.buffer(), header_len, &defs.record_def);
    let allotted = SortedPackedPage::allotted(ctx.config.page_size, header_len);
    let combined_size: usize = t1.iter().chain(t2.iter()).map(|t| defs.record_def.size_of(t)).sum();
    if combined_size > allotted {
        PersistentPage::release(ctx.dam, ctx.txn, &mut page2, ReleaseOptions::NONE, ctx.abort);
        return false;
    }

    let page3_id = NodeHeader::next_page_id(page2.buffer());
    if !page3_id.is_null(ctx.config.null_page_id()) {
        let mut page3 = PersistentPage::acquire(ctx.dam, ctx.txn, page3_id, LockType::Write, ctx.abort);
        NodeHeader::set_prev_page_id(page3.buffer_mut(), page1.page_id(), ctx.pmm, ctx.txn);
        PersistentPage::release(ctx.dam, ctx.txn, &mut page3, ReleaseOptions::NONE, ctx.abort);
    }
    NodeHeader::set_next_page_id(page1.buffer_mut(), page3_id, ctx.pmm, ctx.txn);

    let mut combined = t1;
    combined.extend(t2);
    SortedPackedPage::rewrite_all(page1.buffer_mut(), header_len, &defs.record_def, &combined, ctx.pmm, ctx.txn);

    PersistentPage::release(ctx.dam, ctx.txn, &mut page2, ReleaseOptions::FREE_PAGE, ctx.abort);
    true
}

/// Splits an interior page to make room for `entry`, pulling the median
/// entry up to the parent rather than leaving it in either child (spec
/// §4.5). Returns `(parent_entry, page2)`.
pub fn split_insert_interior<D, P>(
    ctx: Ctx<D, P>,
    index_def: &IndexTupleDef,
    size_class: TupleSizeClass,
    page1: &mut PageHandle,
    entry: Vec<i64>,
) -> (Vec<i64>, PageHandle)
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    let header_len = INTERIOR_HEADER_LEN;
    let keys: Vec<usize> = (0..index_def.key_columns).collect();
    let directions = vec![crate::tuple::Direction::Ascending; index_def.key_columns];

    let mut full = SortedPackedPage::decode_all(page1.buffer(), header_len, index_def);
    let idx = SortedPackedPage::find_insertion_point(
        page1.buffer(),
        header_len,
        index_def,
        &entry,
        &keys,
        &directions,
    );
    full.insert(idx, entry);

    let allotted = SortedPackedPage::allotted(ctx.config.page_size, header_len);
    let mid = split_point(&full, index_def, size_class, allotted, false).min(full.len() - 1);
    let median = full[mid].clone();
    let page2_entries: Vec<_> = full.split_off(mid + 1);
    full.truncate(mid);
    let page1_entries = full;

    let level = NodeHeader::level(page1.buffer());
    let was_last = NodeHeader::is_last_page_of_level(page1.buffer());
    let median_child = PageId::new(index_def.child_page_id(&median));

    let mut page2 = PersistentPage::new_with_write_lock(ctx.dam, ctx.txn, ctx.abort);
    NodeHeader::init_interior(page2.buffer_mut(), level, median_child, was_last, ctx.pmm, ctx.txn);
    SortedPackedPage::rewrite_all(page2.buffer_mut(), header_len, index_def, &page2_entries, ctx.pmm, ctx.txn);

    NodeHeader::set_is_last_page_of_level(page1.buffer_mut(), false, ctx.pmm, ctx.txn);
    SortedPackedPage::rewrite_all(page1.buffer_mut(), header_len, index_def, &page1_entries, ctx.pmm, ctx.txn);

    let parent_entry = index_def.make(&median[..index_def.key_columns], page2.page_id().0);
    (parent_entry, page2)
}

/// Merges `page2` into `page1`, reinstating `sep_from_parent` (the
/// separator the parent holds for `page2`) as an ordinary entry pointing at
/// `page2`'s former least-keys child (spec §4.5). Returns `false` if the
/// combined entries would not fit.
pub fn merge_interiors<D, P>(
    ctx: Ctx<D, P>,
    index_def: &IndexTupleDef,
    page1: &mut PageHandle,
    sep_from_parent: &[i64],
    page2: &mut PageHandle,
) -> bool
where
    D: DataAccessMethods,
    P: PageModificationMethods<Txn = D::Txn>,
{
    let header_len = INTERIOR_HEADER_LEN;
    let e1 = SortedPackedPage::decode_all(page1.buffer(), header_len, index_def);
    let e2 = SortedPackedPage::decode_all(page2.buffer(), header_len, index_def);
    let allotted = SortedPackedPage::allotted(ctx.config.page_size, header_len);

    let reinstated = index_def.make(sep_from_parent, NodeHeader::least_keys_page_id(page2.buffer()).0);
    let combined_size: usize = e1
        .iter()
        .chain(std::iter::once(&reinstated))
        .chain(e2.iter())
        .map(|t| index_def.size_of(t))
        .sum();
    if combined_size > allotted {
        return false;
    }

    let mut combined = e1;
    combined.push(reinstated);
    combined.extend(e2);

    let was_last = NodeHeader::is_last_page_of_level(page2.buffer());
    NodeHeader::set_is_last_page_of_level(page1.buffer_mut(), was_last, ctx.pmm, ctx.txn);
    SortedPackedPage::rewrite_all(page1.buffer_mut(), header_len, index_def, &combined, ctx.pmm, ctx.txn);
    true
}
