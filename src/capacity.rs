//! Storage-capacity predicates (spec §4.4): the sole admission tests for
//! crabbing decisions. `allotted` is the tuple-area byte budget of a page
//! (page size minus headers); `used` is the number of bytes currently
//! occupied by live tuples.

pub fn less_than_half_full(allotted: usize, used: usize) -> bool {
    used < allotted / 2
}

pub fn more_than_half_full(allotted: usize, used: usize) -> bool {
    used > allotted / 2
}

pub fn less_or_equal_half_full(allotted: usize, used: usize) -> bool {
    used <= allotted / 2
}

pub fn more_or_equal_half_full(allotted: usize, used: usize) -> bool {
    used >= allotted / 2
}

/// `reclaimable` is the byte total of tuples tombstoned but not yet
/// compacted out (spec §9 supplement, grounded in the original's
/// `storage_capacity_page_util.c`, which counts such space as free when
/// answering "can this fit without a split").
pub fn can_insert_without_split(
    allotted: usize,
    used: usize,
    reclaimable: usize,
    tuple_size: usize,
) -> bool {
    let free = allotted.saturating_sub(used) + reclaimable;
    free >= tuple_size
}

#[derive(Debug, Clone, Copy)]
pub enum TupleSizeClass {
    Fixed { record_size: usize },
    Variable,
}

pub fn may_require_split_on_insert(
    size_class: TupleSizeClass,
    allotted: usize,
    used: usize,
) -> bool {
    match size_class {
        TupleSizeClass::Fixed { record_size } => allotted.saturating_sub(used) < record_size,
        TupleSizeClass::Variable => used > allotted / 2,
    }
}

pub fn may_require_merge_on_delete(allotted: usize, used: usize, removed_size: usize) -> bool {
    let new_used = used.saturating_sub(removed_size);
    new_used < allotted / 2
}
