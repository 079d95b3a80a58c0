//! The persistent-page access protocol (spec §4.1, §6.1).
//!
//! `DataAccessMethods` is the external collaborator this crate consumes: the
//! concrete page cache, free-list and write-ahead log live outside this
//! crate (spec §1 "Out of scope"). Everything here is generic over an
//! implementation of it, the same way `small-db`'s `BTreeTable` is generic
//! over nothing but is itself built on top of a swappable `BufferPool` +
//! `ConcurrentStatus` pair — the trait boundary plays the role `BufferPool`
//! plays there.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

use crate::page_id::PageId;

/// Shared, cooperative abort signal threaded through every walker (spec §5
/// "Cancellation"). Cloning an `AbortFlag` shares the same underlying cell;
/// setting it from any clone is visible to all others.
#[derive(Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockType {
    Read,
    Write,
}

/// Bitmask of deferred release options, merged into a handle's `flags` and
/// applied when the lock is actually dropped (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReleaseOptions(pub u8);

impl ReleaseOptions {
    pub const NONE: ReleaseOptions = ReleaseOptions(0);
    pub const FREE_PAGE: ReleaseOptions = ReleaseOptions(1 << 0);

    pub fn merge(self, other: ReleaseOptions) -> ReleaseOptions {
        ReleaseOptions(self.0 | other.0)
    }

    pub fn contains(self, flag: ReleaseOptions) -> bool {
        self.0 & flag.0 == flag.0
    }
}

/// Required operations of the page access layer (spec §6.1). `Txn` is
/// whatever transaction-identifying handle the caller's page store uses.
pub trait DataAccessMethods {
    type Txn: Copy;

    fn page_size(&self) -> usize;
    fn null_page_id(&self) -> u64;

    fn get_new_page_with_write_lock(
        &self,
        txn: Self::Txn,
        abort: &AbortFlag,
    ) -> Option<(PageId, Vec<u8>)>;

    fn acquire_page_with_reader_lock(
        &self,
        txn: Self::Txn,
        page_id: PageId,
        abort: &AbortFlag,
    ) -> Option<Vec<u8>>;

    fn acquire_page_with_writer_lock(
        &self,
        txn: Self::Txn,
        page_id: PageId,
        abort: &AbortFlag,
    ) -> Option<Vec<u8>>;

    fn downgrade_writer_to_reader(
        &self,
        txn: Self::Txn,
        page_id: PageId,
        buffer: &mut Vec<u8>,
        opts: ReleaseOptions,
        abort: &AbortFlag,
    );

    fn upgrade_reader_to_writer(
        &self,
        txn: Self::Txn,
        page_id: PageId,
        buffer: &mut Vec<u8>,
        abort: &AbortFlag,
    );

    fn release_writer_lock_on_page(
        &self,
        txn: Self::Txn,
        page_id: PageId,
        buffer: Vec<u8>,
        opts: ReleaseOptions,
    ) -> bool;

    fn release_reader_lock_on_page(
        &self,
        txn: Self::Txn,
        page_id: PageId,
        buffer: Vec<u8>,
        opts: ReleaseOptions,
    ) -> bool;

    fn free_page(&self, txn: Self::Txn, page_id: PageId, abort: &AbortFlag);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockState {
    Null,
    Read,
    Write,
}

/// Uniform handle carrying `(page_id, buffer, lock_state, flags)` (spec
/// §4.1). A handle is either NULL or holds exactly one of {reader, writer};
/// every transition is driven through `PersistentPage`'s associated
/// functions so the abort-safety assertions below are the only place locks
/// change state.
pub struct PageHandle {
    page_id: PageId,
    buffer: Option<Vec<u8>>,
    lock_state: LockState,
    flags: ReleaseOptions,
}

impl PageHandle {
    pub fn null() -> Self {
        Self {
            page_id: PageId::new(0),
            buffer: None,
            lock_state: LockState::Null,
            flags: ReleaseOptions::NONE,
        }
    }

    pub fn is_null(&self) -> bool {
        self.lock_state == LockState::Null
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn buffer(&self) -> &[u8] {
        self.buffer.as_ref().expect("handle has no buffer")
    }

    pub fn buffer_mut(&mut self) -> &mut Vec<u8> {
        self.buffer.as_mut().expect("handle has no buffer")
    }

    pub fn is_write_locked(&self) -> bool {
        self.lock_state == LockState::Write
    }

    /// Accumulates a deferred release option (e.g. free-on-release) without
    /// dropping the lock yet.
    pub fn add_flag(&mut self, opts: ReleaseOptions) {
        self.flags = self.flags.merge(opts);
    }

    fn from_locked(page_id: PageId, buffer: Vec<u8>, lock_state: LockState) -> Self {
        Self {
            page_id,
            buffer: Some(buffer),
            lock_state,
            flags: ReleaseOptions::NONE,
        }
    }
}

/// Namespace for the persistent-page operations of spec §4.1. Kept as
/// associated functions (rather than methods with internal state) because
/// the handle itself carries no reference back to the access layer — every
/// call threads `(dam, txn, abort_error)` explicitly, per the "no global
/// mutable state" design note in spec §9.
pub struct PersistentPage;

impl PersistentPage {
    pub fn new_with_write_lock<D: DataAccessMethods>(
        dam: &D,
        txn: D::Txn,
        abort: &AbortFlag,
    ) -> PageHandle {
        assert!(
            !abort.is_set(),
            "fatal: acquiring a new lock after an abort was signaled"
        );
        match dam.get_new_page_with_write_lock(txn, abort) {
            Some((page_id, buffer)) => {
                debug!("allocated new page {} with write lock", page_id);
                PageHandle::from_locked(page_id, buffer, LockState::Write)
            }
            None => PageHandle::null(),
        }
    }

    pub fn acquire<D: DataAccessMethods>(
        dam: &D,
        txn: D::Txn,
        page_id: PageId,
        lock_type: LockType,
        abort: &AbortFlag,
    ) -> PageHandle {
        assert!(
            !abort.is_set(),
            "fatal: acquiring a new lock after an abort was signaled"
        );
        let acquired = match lock_type {
            LockType::Read => dam.acquire_page_with_reader_lock(txn, page_id, abort),
            LockType::Write => dam.acquire_page_with_writer_lock(txn, page_id, abort),
        };
        match acquired {
            Some(buffer) => {
                let state = match lock_type {
                    LockType::Read => LockState::Read,
                    LockType::Write => LockState::Write,
                };
                debug!("acquired {:?} lock on {}", lock_type, page_id);
                PageHandle::from_locked(page_id, buffer, state)
            }
            None => PageHandle::null(),
        }
    }

    pub fn upgrade<D: DataAccessMethods>(
        dam: &D,
        txn: D::Txn,
        handle: &mut PageHandle,
        abort: &AbortFlag,
    ) {
        assert!(
            !abort.is_set(),
            "fatal: upgrading a lock after an abort was signaled"
        );
        assert_eq!(
            handle.lock_state,
            LockState::Read,
            "fatal: upgrade() called on a handle that is not read-locked"
        );
        let page_id = handle.page_id;
        let buffer = handle.buffer_mut();
        dam.upgrade_reader_to_writer(txn, page_id, buffer, abort);
        handle.lock_state = LockState::Write;
        debug!("upgraded {} to write lock", page_id);
    }

    pub fn downgrade<D: DataAccessMethods>(
        dam: &D,
        txn: D::Txn,
        handle: &mut PageHandle,
        opts: ReleaseOptions,
        abort: &AbortFlag,
    ) {
        assert_eq!(
            handle.lock_state,
            LockState::Write,
            "fatal: downgrade() called on a handle that is not write-locked"
        );
        handle.add_flag(opts);
        let page_id = handle.page_id;
        let flags = handle.flags;
        let buffer = handle.buffer_mut();
        dam.downgrade_writer_to_reader(txn, page_id, buffer, flags, abort);
        handle.lock_state = LockState::Read;
        debug!("downgraded {} to read lock", page_id);
    }

    /// Drops the lock held by `handle`, applying `opts | handle.flags`. On
    /// success the handle becomes NULL. A no-op on an already-NULL handle,
    /// so unwind code can call this unconditionally on every stack entry.
    pub fn release<D: DataAccessMethods>(
        dam: &D,
        txn: D::Txn,
        handle: &mut PageHandle,
        opts: ReleaseOptions,
        abort: &AbortFlag,
    ) {
        if handle.is_null() {
            return;
        }
        let merged = handle.flags.merge(opts);
        assert!(
            !(merged.contains(ReleaseOptions::FREE_PAGE) && abort.is_set()),
            "fatal: releasing with FREE_PAGE after an abort was signaled"
        );
        let page_id = handle.page_id;
        let buffer = handle.buffer.take().expect("handle has no buffer");
        let ok = match handle.lock_state {
            LockState::Write => dam.release_writer_lock_on_page(txn, page_id, buffer, merged),
            LockState::Read => dam.release_reader_lock_on_page(txn, page_id, buffer, merged),
            LockState::Null => true,
        };
        debug!("released lock on {} (freed: {})", page_id, merged.contains(ReleaseOptions::FREE_PAGE));
        handle.lock_state = LockState::Null;
        handle.flags = ReleaseOptions::NONE;
        assert!(ok, "fatal: page store refused to release a held lock");
    }

    pub fn free<D: DataAccessMethods>(dam: &D, txn: D::Txn, page_id: PageId, abort: &AbortFlag) {
        assert!(
            !abort.is_set(),
            "fatal: freeing a page after an abort was signaled"
        );
        dam.free_page(txn, page_id, abort);
    }
}
