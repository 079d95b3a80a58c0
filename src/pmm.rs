//! The page modification layer (spec §6.2): a family of byte-level mutation
//! routines that journal their writes under a transaction. The concrete
//! write-ahead log is an external collaborator (spec §1); this crate only
//! needs the narrow surface the sorted-packed-page primitive and the node
//! header helpers call while holding a writer lock.
pub trait PageModificationMethods {
    type Txn: Copy;

    /// Journals writing `bytes` into `buffer[offset..offset + bytes.len()]`.
    fn write_region(&self, txn: Self::Txn, buffer: &mut [u8], offset: usize, bytes: &[u8]);

    /// Journals an in-page `memmove` of `len` bytes from `src` to `dst`.
    fn memmove_region(&self, txn: Self::Txn, buffer: &mut [u8], dst: usize, src: usize, len: usize);

    /// Zeroes `buffer` and writes the common system header, readying it to
    /// be interpreted by one of the node layout helpers.
    fn init_page(&self, txn: Self::Txn, buffer: &mut [u8]);
}
