//! Randomized property coverage for the B+ tree (spec §8.2 Laws): insert a
//! shuffled key set, delete a random subset, and check that round-trip and
//! ordering invariants hold regardless of insertion order. The shuffle
//! mirrors the teacher's own `btree::toolkit::create_random_btree_table`
//! random-key-generation helper, adapted here to drive property checks
//! rather than table scaffolding.
mod common;

use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;

use pagecrab::bplus::header::NodeHeader;
use pagecrab::bplus::iterator::{BPlusTreeIterator, Bound};
use pagecrab::bplus::walker::BPlusTreeWalker;
use pagecrab::bplus::BTreeDefs;
use pagecrab::capacity::TupleSizeClass;
use pagecrab::ctx::Ctx;
use pagecrab::dam::AbortFlag;
use pagecrab::tuple::IntTupleDef;
use pagecrab::{PageId, PageIdWidth, StoreConfig};

use common::{DirectPmm, InMemoryStore};

fn setup(fan_out: u64, page_size: usize) -> (InMemoryStore, DirectPmm, StoreConfig, AbortFlag) {
    let config = StoreConfig::builder()
        .page_size(page_size)
        .page_id_width(PageIdWidth::Eight)
        .fan_out(fan_out)
        .max_tree_height(16)
        .build();
    (InMemoryStore::new(page_size), DirectPmm, config, AbortFlag::new())
}

fn new_empty_root(dam: &InMemoryStore, pmm: &DirectPmm, abort: &AbortFlag) -> PageId {
    use pagecrab::dam::{DataAccessMethods, PersistentPage, ReleaseOptions};
    let mut root = PersistentPage::new_with_write_lock(dam, (), abort);
    NodeHeader::init_leaf(root.buffer_mut(), PageId::new(dam.null_page_id()), PageId::new(dam.null_page_id()), pmm, ());
    let id = root.page_id();
    PersistentPage::release(dam, (), &mut root, ReleaseOptions::NONE, abort);
    id
}

fn insert(ctx: Ctx<InMemoryStore, DirectPmm>, defs: &BTreeDefs<IntTupleDef>, root: &mut PageId, row: Vec<i64>) {
    BPlusTreeWalker::inspected_update(ctx, defs, root, &row[..1], Some(row), |_old, _new| {}).unwrap();
}

fn delete(ctx: Ctx<InMemoryStore, DirectPmm>, defs: &BTreeDefs<IntTupleDef>, root: &mut PageId, key: i64) {
    BPlusTreeWalker::inspected_update(ctx, defs, root, &[key], None, |_old, _new| {}).unwrap();
}

#[test]
fn random_insert_order_round_trips_and_iterates_sorted() {
    let (dam, pmm, config, abort) = setup(4, 128);
    let mut root = new_empty_root(&dam, &pmm, &abort);
    let defs = BTreeDefs::new(IntTupleDef::new(2), vec![0], TupleSizeClass::Fixed { record_size: 16 });
    let ctx = Ctx { dam: &dam, pmm: &pmm, txn: (), config: &config, abort: &abort };

    let mut rng = rand::thread_rng();
    let mut keys: Vec<i64> = (0..40).collect();
    keys.shuffle(&mut rng);

    for &k in &keys {
        insert(ctx, &defs, &mut root, vec![k, k * 3]);
    }
    for &k in &keys {
        assert_eq!(BPlusTreeWalker::find(ctx, &defs, root, &[k]), Some(vec![k, k * 3]));
    }

    // delete a random subset, then confirm the iterator still walks what
    // remains in strictly ascending order.
    let remove_count = rng.gen_range(5, 20);
    let mut to_remove = keys.clone();
    to_remove.shuffle(&mut rng);
    to_remove.truncate(remove_count);
    for &k in &to_remove {
        delete(ctx, &defs, &mut root, k);
    }

    let mut it = BPlusTreeIterator::seek(ctx, &defs, root, None, Bound::Min);
    let mut seen = Vec::new();
    loop {
        match it.get() {
            Some(t) => seen.push(t[0]),
            None => break,
        }
        if !it.next() {
            break;
        }
    }

    assert!(seen.iter().tuple_windows().all(|(a, b)| a < b), "iterator must yield strictly ascending keys");

    let mut expected: Vec<i64> = keys.iter().filter(|k| !to_remove.contains(k)).cloned().collect();
    expected.sort();
    assert_eq!(seen, expected);
}
