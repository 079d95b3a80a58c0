//! Shared integration-test harness: an in-memory `DataAccessMethods`/
//! `PageModificationMethods` pair, grounded in the original's own
//! `in_memory_data_store.h` test backing store (spec SPEC_FULL.md §A.4).
//! Single-threaded (a `Mutex<Vec<Option<Vec<u8>>>>>`, no real lock-conflict
//! detection) since these tests never contend a page with themselves.
use std::sync::Mutex;

use pagecrab::dam::{AbortFlag, DataAccessMethods, ReleaseOptions};
use pagecrab::page_id::PageId;
use pagecrab::pmm::PageModificationMethods;

pub struct InMemoryStore {
    pages: Mutex<Vec<Option<Vec<u8>>>>,
    page_size: usize,
}

impl InMemoryStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            pages: Mutex::new(Vec::new()),
            page_size,
        }
    }
}

impl DataAccessMethods for InMemoryStore {
    type Txn = ();

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn null_page_id(&self) -> u64 {
        u64::MAX
    }

    fn get_new_page_with_write_lock(&self, _txn: (), _abort: &AbortFlag) -> Option<(PageId, Vec<u8>)> {
        let mut pages = self.pages.lock().unwrap();
        let id = pages.len() as u64;
        pages.push(Some(vec![0u8; self.page_size]));
        Some((PageId::new(id), vec![0u8; self.page_size]))
    }

    fn acquire_page_with_reader_lock(&self, _txn: (), page_id: PageId, _abort: &AbortFlag) -> Option<Vec<u8>> {
        let pages = self.pages.lock().unwrap();
        pages.get(page_id.0 as usize).and_then(|p| p.clone())
    }

    fn acquire_page_with_writer_lock(&self, _txn: (), page_id: PageId, _abort: &AbortFlag) -> Option<Vec<u8>> {
        let pages = self.pages.lock().unwrap();
        pages.get(page_id.0 as usize).and_then(|p| p.clone())
    }

    fn downgrade_writer_to_reader(
        &self,
        _txn: (),
        page_id: PageId,
        buffer: &mut Vec<u8>,
        _opts: ReleaseOptions,
        _abort: &AbortFlag,
    ) {
        let mut pages = self.pages.lock().unwrap();
        pages[page_id.0 as usize] = Some(buffer.clone());
    }

    fn upgrade_reader_to_writer(&self, _txn: (), _page_id: PageId, _buffer: &mut Vec<u8>, _abort: &AbortFlag) {}

    fn release_writer_lock_on_page(&self, _txn: (), page_id: PageId, buffer: Vec<u8>, opts: ReleaseOptions) -> bool {
        let mut pages = self.pages.lock().unwrap();
        if opts.contains(ReleaseOptions::FREE_PAGE) {
            pages[page_id.0 as usize] = None;
        } else {
            pages[page_id.0 as usize] = Some(buffer);
        }
        true
    }

    fn release_reader_lock_on_page(&self, _txn: (), page_id: PageId, buffer: Vec<u8>, opts: ReleaseOptions) -> bool {
        let mut pages = self.pages.lock().unwrap();
        if opts.contains(ReleaseOptions::FREE_PAGE) {
            pages[page_id.0 as usize] = None;
        } else {
            pages[page_id.0 as usize] = Some(buffer);
        }
        true
    }

    fn free_page(&self, _txn: (), page_id: PageId, _abort: &AbortFlag) {
        let mut pages = self.pages.lock().unwrap();
        if (page_id.0 as usize) < pages.len() {
            pages[page_id.0 as usize] = None;
        }
    }
}

/// A no-op journal: writes land directly in the buffer, the same
/// `NoopPmm` shape every in-module unit test in this crate already uses.
pub struct DirectPmm;

impl PageModificationMethods for DirectPmm {
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
