//! Interior-page entry access (spec §4.5): entries are sorted
//! `(key_columns, child_page_id)` tuples under `index_def`; the `-1`-indexed
//! virtual entry is `least_keys_page_id`.
use crate::bplus::header::{NodeHeader, INTERIOR_HEADER_LEN};
use crate::page_id::PageId;
use crate::sorted_packed_page::SortedPackedPage;
use crate::tuple::{Direction, IndexTupleDef, TupleDef};

pub struct Interior;

impl Interior {
    /// Greatest index whose separator is `<= key`, or `-1` if `key` sorts
    /// before every separator (belongs under the least-keys child).
    pub fn find_child_index_for_key(
        buf: &[u8],
        index_def: &IndexTupleDef,
        key: &[i64],
    ) -> i64 {
        let keys: Vec<usize> = (0..index_def.key_columns).collect();
        let directions = vec![Direction::Ascending; index_def.key_columns];
        let probe = index_def.make(key, 0);
        let point = SortedPackedPage::find_insertion_point(
            buf,
            INTERIOR_HEADER_LEN,
            index_def,
            &probe,
            &keys,
            &directions,
        );
        if point == 0 {
            -1
        } else {
            point as i64 - 1
        }
    }

    /// The child page id for logical slot `index` (`-1` means the
    /// least-keys child).
    pub fn child_pid(buf: &[u8], index_def: &IndexTupleDef, index: i64) -> PageId {
        if index < 0 {
            NodeHeader::least_keys_page_id(buf)
        } else {
            let entries = SortedPackedPage::decode_all(buf, INTERIOR_HEADER_LEN, index_def);
            PageId::new(index_def.child_page_id(&entries[index as usize]))
        }
    }

    pub fn separator_key(buf: &[u8], index_def: &IndexTupleDef, index: usize) -> Vec<i64> {
        let entries = SortedPackedPage::decode_all(buf, INTERIOR_HEADER_LEN, index_def);
        entries[index][..index_def.key_columns].to_vec()
    }

    pub fn entry_count(buf: &[u8]) -> usize {
        SortedPackedPage::tuple_count(buf, INTERIOR_HEADER_LEN)
    }
}
