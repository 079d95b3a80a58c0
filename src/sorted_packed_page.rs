//! Sorted-packed-page primitive (spec §4.3): operations on a page whose
//! tuples are kept sorted by a key prefix. Every mutating operation decodes
//! the tuple area into an ordinary `Vec<D::Tuple>`, performs the edit at
//! the Rust-value level, then re-encodes the whole area in one
//! `PageModificationMethods::write_region` call — the concrete byte layout
//! and comparator are external collaborators (spec §1), so there is
//! nothing to gain from hand-rolling in-place memmoves here; the crate that
//! supplies a real `TupleDef`/`PageModificationMethods` pair controls the
//! actual bytes that hit the journal.
//!
//! Layout: immediately after a caller-supplied `header_len` byte prefix
//! (the leaf/interior page header, spec §4.5) sits a 4-byte mini-header —
//! `tuple_count: u16` then `used_bytes: u16` — followed by `tuple_count`
//! tuples packed back-to-back in sorted order.
use std::cmp::Ordering;

use crate::pmm::PageModificationMethods;
use crate::tuple::{Direction, TupleDef};

pub const MINI_HEADER_LEN: usize = 4;

pub const NOT_FOUND: usize = usize::MAX;
pub const NO_TUPLE_FOUND: usize = usize::MAX;

pub struct SortedPackedPage;

impl SortedPackedPage {
    pub fn tuple_count(buf: &[u8], header_len: usize) -> usize {
        u16::from_be_bytes([buf[header_len], buf[header_len + 1]]) as usize
    }

    pub fn used_bytes(buf: &[u8], header_len: usize) -> usize {
        u16::from_be_bytes([buf[header_len + 2], buf[header_len + 3]]) as usize
    }

    pub fn allotted(page_size: usize, header_len: usize) -> usize {
        page_size.saturating_sub(header_len + MINI_HEADER_LEN)
    }

    pub fn decode_all<D: TupleDef>(buf: &[u8], header_len: usize, def: &D) -> Vec<D::Tuple> {
        let count = Self::tuple_count(buf, header_len);
        let mut offset = header_len + MINI_HEADER_LEN;
        let mut tuples = Vec::with_capacity(count);
        for _ in 0..count {
            let (tuple, len) = def.decode(&buf[offset..]);
            offset += len;
            tuples.push(tuple);
        }
        tuples
    }

    /// Rewrites the whole tuple area from `tuples`, in order, as given —
    /// used by the B+ tree split/merge helpers which compute a full
    /// replacement list at the Rust-value level (spec §4.5).
    pub fn rewrite_all<D, P>(
        buf: &mut [u8],
        header_len: usize,
        def: &D,
        tuples: &[D::Tuple],
        pmm: &P,
        txn: P::Txn,
    ) where
        D: TupleDef,
        P: PageModificationMethods,
    {
        Self::write_back(buf, header_len, def, tuples, pmm, txn);
    }

    fn write_back<D, P>(
        buf: &mut [u8],
        header_len: usize,
        def: &D,
        tuples: &[D::Tuple],
        pmm: &P,
        txn: P::Txn,
    ) where
        D: TupleDef,
        P: PageModificationMethods,
    {
        let mut body = Vec::new();
        for tuple in tuples {
            body.extend(def.encode(tuple));
        }
        pmm.write_region(
            txn,
            buf,
            header_len,
            &(tuples.len() as u16).to_be_bytes(),
        );
        pmm.write_region(
            txn,
            buf,
            header_len + 2,
            &(body.len() as u16).to_be_bytes(),
        );
        pmm.write_region(txn, buf, header_len + MINI_HEADER_LEN, &body);
    }

    /// Leftmost index whose key compares equal to `probe`, or `NOT_FOUND`.
    pub fn search<D: TupleDef>(
        buf: &[u8],
        header_len: usize,
        def: &D,
        probe: &D::Tuple,
        keys: &[usize],
        directions: &[Direction],
    ) -> usize {
        let tuples = Self::decode_all(buf, header_len, def);
        let mut lo = 0usize;
        let mut hi = tuples.len();
        let mut found = NOT_FOUND;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match def.compare(&tuples[mid], probe, keys, directions) {
                Ordering::Less => lo = mid + 1,
                Ordering::Equal => {
                    found = mid;
                    hi = mid;
                }
                Ordering::Greater => hi = mid,
            }
        }
        found
    }

    /// First position where `probe` can be placed preserving order; equal
    /// to `tuple_count` when `probe` sorts after every existing tuple.
    pub fn find_insertion_point<D: TupleDef>(
        buf: &[u8],
        header_len: usize,
        def: &D,
        probe: &D::Tuple,
        keys: &[usize],
        directions: &[Direction],
    ) -> usize {
        let tuples = Self::decode_all(buf, header_len, def);
        Self::insertion_point_in(&tuples, def, probe, keys, directions)
    }

    fn insertion_point_in<D: TupleDef>(
        tuples: &[D::Tuple],
        def: &D,
        probe: &D::Tuple,
        keys: &[usize],
        directions: &[Direction],
    ) -> usize {
        let mut lo = 0usize;
        let mut hi = tuples.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if def.compare(&tuples[mid], probe, keys, directions) != Ordering::Greater {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    pub fn insert<D, P>(
        buf: &mut [u8],
        header_len: usize,
        def: &D,
        tuple: &D::Tuple,
        keys: &[usize],
        directions: &[Direction],
        pmm: &P,
        txn: P::Txn,
    ) -> (bool, usize)
    where
        D: TupleDef,
        P: PageModificationMethods,
    {
        let mut tuples = Self::decode_all(buf, header_len, def);
        let index = Self::insertion_point_in(&tuples, def, tuple, keys, directions);
        tuples.insert(index, tuple.clone());
        Self::write_back(buf, header_len, def, &tuples, pmm, txn);
        (true, index)
    }

    pub fn insert_at<D, P>(
        buf: &mut [u8],
        header_len: usize,
        def: &D,
        tuple: &D::Tuple,
        index: usize,
        pmm: &P,
        txn: P::Txn,
    ) -> bool
    where
        D: TupleDef,
        P: PageModificationMethods,
    {
        let mut tuples = Self::decode_all(buf, header_len, def);
        if index > tuples.len() {
            return false;
        }
        tuples.insert(index, tuple.clone());
        Self::write_back(buf, header_len, def, &tuples, pmm, txn);
        true
    }

    pub fn delete_at<D, P>(
        buf: &mut [u8],
        header_len: usize,
        def: &D,
        index: usize,
        pmm: &P,
        txn: P::Txn,
    ) -> bool
    where
        D: TupleDef,
        P: PageModificationMethods,
    {
        let mut tuples = Self::decode_all(buf, header_len, def);
        if index >= tuples.len() {
            return false;
        }
        tuples.remove(index);
        Self::write_back(buf, header_len, def, &tuples, pmm, txn);
        true
    }

    /// Removes the half-open index range `[lo, hi)` in a single pass.
    pub fn delete_range<D, P>(
        buf: &mut [u8],
        header_len: usize,
        def: &D,
        lo: usize,
        hi: usize,
        pmm: &P,
        txn: P::Txn,
    ) -> bool
    where
        D: TupleDef,
        P: PageModificationMethods,
    {
        let mut tuples = Self::decode_all(buf, header_len, def);
        if lo > hi || hi > tuples.len() {
            return false;
        }
        tuples.drain(lo..hi);
        Self::write_back(buf, header_len, def, &tuples, pmm, txn);
        true
    }

    /// Bulk-appends `src[lo..hi]` onto the end of `dst` when that preserves
    /// order (empty `dst`, or `dst`'s last tuple <= `src[lo]`); otherwise
    /// inserts one at a time, stopping at the first failure (spec §4.3).
    /// Returns the number of tuples actually inserted.
    pub fn insert_all_from<D, P>(
        dst_buf: &mut [u8],
        dst_header_len: usize,
        def: &D,
        src: &[D::Tuple],
        lo: usize,
        hi: usize,
        keys: &[usize],
        directions: &[Direction],
        pmm: &P,
        txn: P::Txn,
    ) -> usize
    where
        D: TupleDef,
        P: PageModificationMethods,
    {
        if lo >= hi {
            return 0;
        }
        let mut dst_tuples = Self::decode_all(dst_buf, dst_header_len, def);
        let can_bulk_append = dst_tuples.is_empty()
            || def.compare(dst_tuples.last().unwrap(), &src[lo], keys, directions) != Ordering::Greater;

        let inserted = if can_bulk_append {
            dst_tuples.extend_from_slice(&src[lo..hi]);
            hi - lo
        } else {
            let mut count = 0;
            for tuple in &src[lo..hi] {
                let index = Self::insertion_point_in(&dst_tuples, def, tuple, keys, directions);
                dst_tuples.insert(index, tuple.clone());
                count += 1;
            }
            count
        };
        Self::write_back(dst_buf, dst_header_len, def, &dst_tuples, pmm, txn);
        inserted
    }

    /// In-place update when the new tuple's encoded size still fits in the
    /// page; returns `false` and leaves the page unchanged otherwise (spec
    /// §4.3 — the caller is expected to fall back to delete-then-split-
    /// insert in that case, per §4.6.2).
    pub fn update_at<D, P>(
        buf: &mut [u8],
        header_len: usize,
        page_size: usize,
        def: &D,
        new_tuple: &D::Tuple,
        index: usize,
        pmm: &P,
        txn: P::Txn,
    ) -> bool
    where
        D: TupleDef,
        P: PageModificationMethods,
    {
        let mut tuples = Self::decode_all(buf, header_len, def);
        if index >= tuples.len() {
            return false;
        }
        let old_size = def.size_of(&tuples[index]);
        let new_size = def.size_of(new_tuple);
        let used = Self::used_bytes(buf, header_len);
        let allotted = Self::allotted(page_size, header_len);
        if used - old_size + new_size > allotted {
            return false;
        }
        tuples[index] = new_tuple.clone();
        Self::write_back(buf, header_len, def, &tuples, pmm, txn);
        true
    }

    /// Index of the tuple immediately preceding the first tuple whose
    /// leading `key_elem_count` elements equal `probe`'s, or
    /// `NO_TUPLE_FOUND`.
    pub fn find_preceding<D: TupleDef>(
        buf: &[u8],
        header_len: usize,
        def: &D,
        probe: &D::Tuple,
        keys: &[usize],
        directions: &[Direction],
    ) -> usize {
        let tuples = Self::decode_all(buf, header_len, def);
        let point = Self::insertion_point_in(&tuples, def, probe, keys, directions);
        let first_eq = Self::first_equal_index(&tuples, def, probe, keys, directions, point);
        let boundary = first_eq.unwrap_or(point);
        if boundary == 0 {
            NO_TUPLE_FOUND
        } else {
            boundary - 1
        }
    }

    pub fn find_preceding_equals<D: TupleDef>(
        buf: &[u8],
        header_len: usize,
        def: &D,
        probe: &D::Tuple,
        keys: &[usize],
        directions: &[Direction],
    ) -> usize {
        let tuples = Self::decode_all(buf, header_len, def);
        let point = Self::insertion_point_in(&tuples, def, probe, keys, directions);
        if point == 0 {
            NO_TUPLE_FOUND
        } else if def.compare(&tuples[point - 1], probe, keys, directions) == Ordering::Equal {
            point - 1
        } else {
            NO_TUPLE_FOUND
        }
    }

    pub fn find_succeeding<D: TupleDef>(
        buf: &[u8],
        header_len: usize,
        def: &D,
        probe: &D::Tuple,
        keys: &[usize],
        directions: &[Direction],
    ) -> usize {
        let tuples = Self::decode_all(buf, header_len, def);
        let point = Self::insertion_point_in(&tuples, def, probe, keys, directions);
        if point >= tuples.len() {
            NO_TUPLE_FOUND
        } else {
            point
        }
    }

    pub fn find_succeeding_equals<D: TupleDef>(
        buf: &[u8],
        header_len: usize,
        def: &D,
        probe: &D::Tuple,
        keys: &[usize],
        directions: &[Direction],
    ) -> usize {
        let tuples = Self::decode_all(buf, header_len, def);
        let found = Self::search_in(&tuples, def, probe, keys, directions);
        if found == NOT_FOUND {
            NO_TUPLE_FOUND
        } else {
            found
        }
    }

    fn search_in<D: TupleDef>(
        tuples: &[D::Tuple],
        def: &D,
        probe: &D::Tuple,
        keys: &[usize],
        directions: &[Direction],
    ) -> usize {
        let mut lo = 0usize;
        let mut hi = tuples.len();
        let mut found = NOT_FOUND;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match def.compare(&tuples[mid], probe, keys, directions) {
                Ordering::Less => lo = mid + 1,
                Ordering::Equal => {
                    found = mid;
                    hi = mid;
                }
                Ordering::Greater => hi = mid,
            }
        }
        found
    }

    fn first_equal_index<D: TupleDef>(
        tuples: &[D::Tuple],
        def: &D,
        probe: &D::Tuple,
        keys: &[usize],
        directions: &[Direction],
        upper_bound: usize,
    ) -> Option<usize> {
        (0..upper_bound.min(tuples.len()))
            .find(|&i| def.compare(&tuples[i], probe, keys, directions) == Ordering::Equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::IntTupleDef;

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

    const HEADER_LEN: usize = 8;

    fn fresh_page() -> Vec<u8> {
        vec![0u8; 512]
    }

    #[test]
    fn insert_keeps_sorted_order() {
        let def = IntTupleDef::new(2);
        let pmm = NoopPmm;
        let mut page = fresh_page();
        let keys = [0usize];
        let dirs = [Direction::Ascending];

        for v in [30, 10, 20, 5] {
            SortedPackedPage::insert(&mut page, HEADER_LEN, &def, &vec![v, v * 2], &keys, &dirs, &pmm, ());
        }

        let tuples = SortedPackedPage::decode_all(&page, HEADER_LEN, &def);
        let keys_out: Vec<i64> = tuples.iter().map(|t| t[0]).collect();
        assert_eq!(keys_out, vec![5, 10, 20, 30]);
    }

    #[test]
    fn search_and_delete_roundtrip() {
        let def = IntTupleDef::new(1);
        let pmm = NoopPmm;
        let mut page = fresh_page();
        let keys = [0usize];
        let dirs = [Direction::Ascending];

        for v in 0..10 {
            SortedPackedPage::insert(&mut page, HEADER_LEN, &def, &vec![v], &keys, &dirs, &pmm, ());
        }

        let idx = SortedPackedPage::search(&page, HEADER_LEN, &def, &vec![5], &keys, &dirs);
        assert_eq!(idx, 5);

        assert!(SortedPackedPage::delete_at(&mut page, HEADER_LEN, &def, idx, &pmm, ()));
        assert_eq!(SortedPackedPage::tuple_count(&page, HEADER_LEN), 9);
        assert_eq!(
            SortedPackedPage::search(&page, HEADER_LEN, &def, &vec![5], &keys, &dirs),
            NOT_FOUND
        );
    }

    #[test]
    fn update_in_place_respects_capacity() {
        let def = IntTupleDef::new(1);
        let pmm = NoopPmm;
        let mut page = vec![0u8; HEADER_LEN + MINI_HEADER_LEN + 8];
        let keys = [0usize];
        let dirs = [Direction::Ascending];
        SortedPackedPage::insert(&mut page, HEADER_LEN, &def, &vec![1], &keys, &dirs, &pmm, ());

        // same size: fits.
        assert!(SortedPackedPage::update_at(
            &mut page, HEADER_LEN, page.len(), &def, &vec![2], 0, &pmm, ()
        ));
        let tuples = SortedPackedPage::decode_all(&page, HEADER_LEN, &def);
        assert_eq!(tuples[0][0], 2);
    }
}
