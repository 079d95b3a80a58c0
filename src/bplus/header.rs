//! Leaf- and interior-page layout (spec §4.5). Page ids are always stored
//! in a fixed 8-byte big-endian slot regardless of the store's configured
//! `PageIdWidth` — that width only determines which value is read back as
//! `NULL_PAGE_ID` (see `StoreConfig::null_page_id`); see DESIGN.md.
use crate::page_id::PageId;
use crate::pmm::PageModificationMethods;

pub const PAGE_ID_BYTES: usize = 8;
pub const COMMON_HEADER_LEN: usize = 3; // 1 byte page type + 2 byte level
pub const LEAF_HEADER_LEN: usize = COMMON_HEADER_LEN + 2 * PAGE_ID_BYTES;
pub const INTERIOR_HEADER_LEN: usize = COMMON_HEADER_LEN + PAGE_ID_BYTES + 1;

pub const PAGE_TYPE_LEAF: u8 = 0;
pub const PAGE_TYPE_INTERIOR: u8 = 1;

fn read_page_id(buf: &[u8], offset: usize) -> PageId {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    PageId::new(u64::from_be_bytes(bytes))
}

fn write_field<P: PageModificationMethods>(
    buf: &mut [u8],
    offset: usize,
    bytes: &[u8],
    pmm: &P,
    txn: P::Txn,
) {
    pmm.write_region(txn, buf, offset, bytes);
}

pub struct NodeHeader;

impl NodeHeader {
    pub fn page_type(buf: &[u8]) -> u8 {
        buf[0]
    }

    pub fn is_leaf(buf: &[u8]) -> bool {
        Self::page_type(buf) == PAGE_TYPE_LEAF
    }

    pub fn is_interior(buf: &[u8]) -> bool {
        Self::page_type(buf) == PAGE_TYPE_INTERIOR
    }

    pub fn level(buf: &[u8]) -> u16 {
        u16::from_be_bytes([buf[1], buf[2]])
    }

    pub fn set_level<P: PageModificationMethods>(buf: &mut [u8], level: u16, pmm: &P, txn: P::Txn) {
        write_field(buf, 1, &level.to_be_bytes(), pmm, txn);
    }

    pub fn init_leaf<P: PageModificationMethods>(
        buf: &mut [u8],
        prev: PageId,
        next: PageId,
        pmm: &P,
        txn: P::Txn,
    ) {
        pmm.init_page(txn, buf);
        write_field(buf, 0, &[PAGE_TYPE_LEAF], pmm, txn);
        write_field(buf, 1, &0u16.to_be_bytes(), pmm, txn);
        Self::set_prev_page_id(buf, prev, pmm, txn);
        Self::set_next_page_id(buf, next, pmm, txn);
        write_field(buf, LEAF_HEADER_LEN, &0u16.to_be_bytes(), pmm, txn);
        write_field(buf, LEAF_HEADER_LEN + 2, &0u16.to_be_bytes(), pmm, txn);
    }

    pub fn init_interior<P: PageModificationMethods>(
        buf: &mut [u8],
        level: u16,
        least_keys_page_id: PageId,
        is_last_page_of_level: bool,
        pmm: &P,
        txn: P::Txn,
    ) {
        pmm.init_page(txn, buf);
        write_field(buf, 0, &[PAGE_TYPE_INTERIOR], pmm, txn);
        write_field(buf, 1, &level.to_be_bytes(), pmm, txn);
        Self::set_least_keys_page_id(buf, least_keys_page_id, pmm, txn);
        Self::set_is_last_page_of_level(buf, is_last_page_of_level, pmm, txn);
        write_field(buf, INTERIOR_HEADER_LEN, &0u16.to_be_bytes(), pmm, txn);
        write_field(buf, INTERIOR_HEADER_LEN + 2, &0u16.to_be_bytes(), pmm, txn);
    }

    pub fn prev_page_id(buf: &[u8]) -> PageId {
        read_page_id(buf, COMMON_HEADER_LEN)
    }

    pub fn next_page_id(buf: &[u8]) -> PageId {
        read_page_id(buf, COMMON_HEADER_LEN + PAGE_ID_BYTES)
    }

    pub fn set_prev_page_id<P: PageModificationMethods>(
        buf: &mut [u8],
        pid: PageId,
        pmm: &P,
        txn: P::Txn,
    ) {
        write_field(buf, COMMON_HEADER_LEN, &pid.0.to_be_bytes(), pmm, txn);
    }

    pub fn set_next_page_id<P: PageModificationMethods>(
        buf: &mut [u8],
        pid: PageId,
        pmm: &P,
        txn: P::Txn,
    ) {
        write_field(
            buf,
            COMMON_HEADER_LEN + PAGE_ID_BYTES,
            &pid.0.to_be_bytes(),
            pmm,
            txn,
        );
    }

    pub fn least_keys_page_id(buf: &[u8]) -> PageId {
        read_page_id(buf, COMMON_HEADER_LEN)
    }

    pub fn set_least_keys_page_id<P: PageModificationMethods>(
        buf: &mut [u8],
        pid: PageId,
        pmm: &P,
        txn: P::Txn,
    ) {
        write_field(buf, COMMON_HEADER_LEN, &pid.0.to_be_bytes(), pmm, txn);
    }

    pub fn is_last_page_of_level(buf: &[u8]) -> bool {
        buf[COMMON_HEADER_LEN + PAGE_ID_BYTES] != 0
    }

    pub fn set_is_last_page_of_level<P: PageModificationMethods>(
        buf: &mut [u8],
        is_last: bool,
        pmm: &P,
        txn: P::Txn,
    ) {
        write_field(
            buf,
            COMMON_HEADER_LEN + PAGE_ID_BYTES,
            &[is_last as u8],
            pmm,
            txn,
        );
    }
}
