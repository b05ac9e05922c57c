//! Record iterator over one index's radix tree.

use std::sync::Arc;

use crate::{
    iradix::{RawIter, Txn},
    types::Object,
};

/// Iterator produced by index lookups and finders.
///
/// `next`/`step` yield records within the seeked key prefix, after
/// post-filtering stored keys for the index's key semantics (primary-id
/// tails on non-unique indexes, field runs on composite indexes).
/// `raw_next`/`raw_step` keep walking the whole index in comparator order
/// once the seeked subtree is exhausted, without any filtering.
///
/// `lock_db`/`unlock_db` bracket mutations performed while the iterator
/// is live: while the lock is held every write copies nodes instead of
/// editing in place, so this iterator keeps seeing the pre-mutation tree.
pub struct IndexIter<R>
where
    R: Object,
{
    txn: Option<Txn<Arc<R>>>,
    iter: RawIter,
    prefix_len: usize,
    is_compound: bool,
    is_unique: bool,
    field_count: usize,
    key_field_count: usize,
    sort_great: bool,
    at_end: bool,
    value: Option<Arc<R>>,
}

impl<R> IndexIter<R>
where
    R: Object,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        txn: Txn<Arc<R>>,
        iter: RawIter,
        prefix_len: usize,
        is_compound: bool,
        is_unique: bool,
        field_count: usize,
        key_field_count: usize,
        at_end: bool,
    ) -> IndexIter<R> {
        let sort_great = txn.is_sort_great();
        IndexIter {
            txn: Some(txn),
            iter,
            prefix_len,
            is_compound,
            is_unique,
            field_count,
            key_field_count,
            sort_great,
            at_end,
            value: None,
        }
    }

    /// Iterator that is at end from the start, what a finder fires after
    /// an append error.
    pub(crate) fn empty() -> IndexIter<R> {
        IndexIter {
            txn: None,
            iter: RawIter::new(),
            prefix_len: 0,
            is_compound: false,
            is_unique: false,
            field_count: 0,
            key_field_count: 0,
            sort_great: false,
            at_end: true,
            value: None,
        }
    }

    /// Advance within the seeked prefix. Returns false at end; the
    /// iterator stays at end afterwards.
    pub fn next(&mut self) -> bool {
        if self.at_end {
            return false;
        }
        self.value = self.do_next();
        if self.value.is_none() {
            self.at_end = true;
            return false;
        }
        true
    }

    /// Advance in comparator order across the whole index, no filtering.
    pub fn raw_next(&mut self) -> bool {
        let txn = match self.txn.clone() {
            Some(txn) => txn,
            None => return false,
        };
        match self.iter.raw_next(&txn) {
            Some(value) => {
                self.value = Some(value);
                true
            }
            None => false,
        }
    }

    /// Record under the cursor, `None` before the first advance and
    /// after the end.
    pub fn value(&self) -> Option<Arc<R>> {
        self.value.clone()
    }

    /// `next` and `value` in one call.
    pub fn step(&mut self) -> Option<Arc<R>> {
        if self.next() {
            self.value()
        } else {
            None
        }
    }

    /// `raw_next` and `value` in one call.
    pub fn raw_step(&mut self) -> Option<Arc<R>> {
        if self.raw_next() {
            self.value()
        } else {
            None
        }
    }

    /// Acquire the tree's reader lock, forcing copy-on-write for
    /// mutations performed while this iterator is live.
    pub fn lock_db(&self) {
        if let Some(txn) = &self.txn {
            txn.lock_db();
        }
    }

    pub fn unlock_db(&self) {
        if let Some(txn) = &self.txn {
            txn.unlock_db();
        }
    }

    fn do_next(&mut self) -> Option<Arc<R>> {
        let txn = self.txn.clone()?;
        let obj = self.iter.next(&txn)?;

        let stored = self.iter.key();
        let mut n = stored.len();
        if n == self.prefix_len || self.prefix_len == 0 {
            return Some(obj);
        }
        if n < self.prefix_len {
            return None;
        }

        let mut key = stored;
        if !self.is_unique {
            if n - self.prefix_len < 4 {
                return None;
            }
            if !self.is_compound && self.prefix_len + 4 != n {
                // non-composite keys must match the length exactly
                return None;
            }
            let mut tail = [0; 4];
            tail.copy_from_slice(&key[n - 4..]);
            let mut id = u32::from_be_bytes(tail);
            if self.sort_great {
                // descending indexes store the inverted id so insertion
                // order survives the reversed comparator
                id = u32::MAX - id;
            }
            if obj.get_id() != id {
                return None;
            }
            if !self.is_compound {
                return Some(obj);
            }
            n -= 4;
            key = &key[..n];
        }

        if self.is_compound {
            // the bytes past the prefix must be a whole run of
            // (length, field) pairs completing the declared field count
            let mut field_count = 0;
            let mut i = self.prefix_len;
            while i < n {
                i += key[i] as usize + 1;
                field_count += 1;
            }
            if i == n && field_count + self.key_field_count == self.field_count {
                return Some(obj);
            }
        }
        None
    }
}
