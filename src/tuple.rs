//! Tuple definition surface (spec §3.3, §6.3). The concrete serialization
//! and comparator are external collaborators (spec §1); this module only
//! defines the trait boundary the sorted-packed-page primitive and the B+
//! tree node layout are generic over, plus a small fixed-width
//! implementation used by this crate's own tests.
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A single typed element of a tuple, used for per-column access
/// (`get_element`/`set_element` in spec §6.3) independent of whatever the
/// tuple's own Rust type looks like.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Cell {
    Int(i64),
    Bytes(Vec<u8>),
}

/// The shape of a record, a key prefix, or an interior index entry (spec
/// §3.3). Three concrete definitions share this trait: `record_def` (full
/// leaf tuples), `key_def` (the ordering prefix), and `index_def` (key
/// columns plus a trailing child page id).
pub trait TupleDef {
    type Tuple: Clone;

    fn element_count(&self) -> usize;

    fn get_element(&self, tuple: &Self::Tuple, index: usize) -> Cell;

    /// Encodes `tuple` to its on-page byte representation.
    fn encode(&self, tuple: &Self::Tuple) -> Vec<u8>;

    /// Decodes one tuple starting at `bytes[0..]`, returning it along with
    /// the number of bytes it occupies on the page.
    fn decode(&self, bytes: &[u8]) -> (Self::Tuple, usize);

    /// Byte size of `tuple`'s encoded form without re-encoding it.
    fn size_of(&self, tuple: &Self::Tuple) -> usize;

    /// Element-wise total order over the leading `keys_to_compare` columns,
    /// each compared per its entry in `directions` (spec §3.3).
    fn compare(
        &self,
        a: &Self::Tuple,
        b: &Self::Tuple,
        keys_to_compare: &[usize],
        directions: &[Direction],
    ) -> Ordering {
        for (col, dir) in keys_to_compare.iter().zip(directions.iter()) {
            let ord = self.get_element(a, *col).cmp(&self.get_element(b, *col));
            let ord = match dir {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Narrows a leaf record definition down to the key columns used to build
/// the index entries interior pages store as separators (spec §4.5
/// "Return a newly allocated index_def tuple"). Keys are required to be
/// representable as `i64` here, matching the integer-keyed record
/// definitions this crate ships.
pub trait RecordDef: TupleDef {
    fn key_ints(&self, tuple: &Self::Tuple, key_columns: &[usize]) -> Vec<i64>;
}

/// A record consisting of `i64` columns, used by this crate's own unit and
/// integration tests (mirrors `small-db`'s `simple_int_tuple_scheme` test
/// helper).
#[derive(Debug, Clone)]
pub struct IntTupleDef {
    pub column_count: usize,
}

impl IntTupleDef {
    pub fn new(column_count: usize) -> Self {
        Self { column_count }
    }
}

impl TupleDef for IntTupleDef {
    type Tuple = Vec<i64>;

    fn element_count(&self) -> usize {
        self.column_count
    }

    fn get_element(&self, tuple: &Self::Tuple, index: usize) -> Cell {
        Cell::Int(tuple[index])
    }

    fn encode(&self, tuple: &Self::Tuple) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(tuple.len() * 8);
        for v in tuple {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        bytes
    }

    fn decode(&self, bytes: &[u8]) -> (Self::Tuple, usize) {
        let mut tuple = Vec::with_capacity(self.column_count);
        for i in 0..self.column_count {
            let start = i * 8;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[start..start + 8]);
            tuple.push(i64::from_be_bytes(buf));
        }
        (tuple, self.column_count * 8)
    }

    fn size_of(&self, tuple: &Self::Tuple) -> usize {
        tuple.len() * 8
    }
}

impl RecordDef for IntTupleDef {
    fn key_ints(&self, tuple: &Self::Tuple, key_columns: &[usize]) -> Vec<i64> {
        key_columns.iter().map(|&c| tuple[c]).collect()
    }
}

/// The entry form interior pages store: key columns followed by a child
/// page id (spec §3.3, §4.5). Reuses `IntTupleDef`'s column encoding for the
/// key prefix and appends the child id as one more `i64` column, so
/// `key_columns` addresses the key elements and `key_columns` (one past the
/// last key) addresses the child id.
#[derive(Debug, Clone)]
pub struct IndexTupleDef {
    pub key_columns: usize,
}

impl IndexTupleDef {
    pub fn new(key_columns: usize) -> Self {
        Self { key_columns }
    }

    pub fn child_page_id(&self, entry: &<Self as TupleDef>::Tuple) -> u64 {
        entry[self.key_columns] as u64
    }

    pub fn make(&self, key: &[i64], child_page_id: u64) -> <Self as TupleDef>::Tuple {
        let mut entry = key.to_vec();
        entry.push(child_page_id as i64);
        entry
    }
}

impl TupleDef for IndexTupleDef {
    type Tuple = Vec<i64>;

    fn element_count(&self) -> usize {
        self.key_columns + 1
    }

    fn get_element(&self, tuple: &Self::Tuple, index: usize) -> Cell {
        Cell::Int(tuple[index])
    }

    fn encode(&self, tuple: &Self::Tuple) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(tuple.len() * 8);
        for v in tuple {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        bytes
    }

    fn decode(&self, bytes: &[u8]) -> (Self::Tuple, usize) {
        let count = self.key_columns + 1;
        let mut tuple = Vec::with_capacity(count);
        for i in 0..count {
            let start = i * 8;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[start..start + 8]);
            tuple.push(i64::from_be_bytes(buf));
        }
        (tuple, count * 8)
    }

    fn size_of(&self, tuple: &Self::Tuple) -> usize {
        tuple.len() * 8
    }
}
