//! Query builder bound to one index.

use crate::{index::Index, iter::IndexIter, key::MdbKey, types::Object, Error, Result, ToScalar};

/// Builder that appends typed fields onto an index's scratch key and
/// fires the lookup.
///
/// The first append error is captured; firing after an error yields an
/// at-end iterator instead of panicking. A finder over a missing index
/// behaves the same way. Methods move `self`, so lookups chain:
///
/// ```ignore
/// let rec = table.find_by_index_name("ID1|ID2").append_i32(1).fire().step();
/// ```
pub struct MdbFinder<R>
where
    R: Object,
{
    idx: Option<Index<R>>,
    err: Option<Error>,
}

impl<R> MdbFinder<R>
where
    R: Object,
{
    pub(crate) fn new(idx: Option<Index<R>>) -> MdbFinder<R> {
        if let Some(idx) = &idx {
            idx.reset_key();
        }
        MdbFinder { idx, err: None }
    }

    pub fn append_bytes(self, val: &[u8]) -> Self {
        self.do_append(|key| key.append_bytes(val))
    }

    pub fn append_str(self, val: &str) -> Self {
        self.do_append(|key| key.append_str(val))
    }

    pub fn append_i16(self, val: i16) -> Self {
        self.do_append(|key| key.append_i16(val))
    }

    pub fn append_i32(self, val: i32) -> Self {
        self.do_append(|key| key.append_i32(val))
    }

    pub fn append_i64(self, val: i64) -> Self {
        self.do_append(|key| key.append_i64(val))
    }

    pub fn append_u16(self, val: u16) -> Self {
        self.do_append(|key| key.append_u16(val))
    }

    pub fn append_u32(self, val: u32) -> Self {
        self.do_append(|key| key.append_u32(val))
    }

    pub fn append_u64(self, val: u64) -> Self {
        self.do_append(|key| key.append_u64(val))
    }

    pub fn append_f32(self, val: f32) -> Self {
        self.do_append(|key| key.append_f32(val))
    }

    pub fn append_f64(self, val: f64) -> Self {
        self.do_append(|key| key.append_f64(val))
    }

    /// Append any scalar-convertible value, domain wrapper types
    /// included.
    pub fn append_value<T: ToScalar>(self, val: &T) -> Self {
        let scalar = val.to_scalar();
        self.do_append(move |key| key.append_scalar(&scalar))
    }

    /// Seek the accumulated prefix and return the filtered iterator; an
    /// at-end iterator when any append failed.
    pub fn fire(self) -> IndexIter<R> {
        match (self.err, self.idx) {
            (None, Some(idx)) => idx.fire(),
            _ => IndexIter::empty(),
        }
    }

    fn do_append<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut MdbKey) -> Result<()>,
    {
        if self.err.is_none() {
            if let Some(idx) = &self.idx {
                if let Err(err) = idx.append_with(f) {
                    self.err = Some(err);
                }
            }
        }
        self
    }
}
