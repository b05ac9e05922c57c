//! Module implement one secondary index over a table's records.
//!
//! An index owns a radix tree and the glue that turns records into
//! encoded keys: the user's `make_key` hook, the uniqueness policy and
//! the reusable scratch keys. Non-unique indexes append the record's
//! primary id to the encoded key, inverted under a descending comparator,
//! so logical duplicates stay distinct in the tree and iterate in
//! insertion order either way.

use std::sync::Arc;

use crate::{
    iradix::{RawIter, Txn},
    iter::IndexIter,
    key::MdbKey,
    spinlock::Spinlock,
    types::{Object, Projection},
    Error, Result,
};

/// Key-encoder hook: turn a record into its index key.
pub type MakeKeyFn<R> = Box<dyn Fn(&mut MdbKey, &R) -> Result<()>>;

/// One index of a [Table][crate::Table]. Cloning shares the index.
pub struct Index<R>
where
    R: Object,
{
    inner: Arc<Spinlock<IndexInner<R>>>,
}

impl<R> Clone for Index<R>
where
    R: Object,
{
    fn clone(&self) -> Index<R> {
        Index {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct IndexInner<R>
where
    R: Object,
{
    name: String,
    field_names: Vec<String>,
    idx_num: usize,
    tree: Txn<Arc<R>>,
    make_key: MakeKeyFn<R>,
    mdb_key: MdbKey,
    mdb_key1: MdbKey,
}

impl<R> Index<R>
where
    R: Object,
{
    /// `name` is a pipe-delimited list of the record's column names;
    /// unknown columns are a programmer error and panic.
    pub(crate) fn new(name: &str, idx_num: usize, make_key: MakeKeyFn<R>, unique: bool) -> Index<R> {
        let field_names: Vec<String> = name.split('|').map(|s| s.to_string()).collect();
        let known = R::field_names();
        let missing: Vec<&str> = field_names
            .iter()
            .filter(|n| !known.contains(&n.as_str()))
            .map(|n| n.as_str())
            .collect();
        if !missing.is_empty() {
            panic!("index [{}]: no matching columns [{}]", name, missing.join(","));
        }

        let key_count = field_names.len();
        let inner = IndexInner {
            name: name.to_string(),
            field_names,
            idx_num,
            tree: Txn::new(),
            make_key,
            mdb_key: MdbKey::new(key_count, unique),
            mdb_key1: MdbKey::new(key_count, unique),
        };
        Index {
            inner: Arc::new(Spinlock::new(inner)),
        }
    }

    pub fn name(&self) -> String {
        self.inner.read().name.clone()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.inner.read().field_names.clone()
    }

    pub fn idx_num(&self) -> usize {
        self.inner.read().idx_num
    }

    /// Order this index descending.
    pub fn sort_great(&self) {
        self.inner.read().tree.sort_great();
    }

    /// Order this index ascending, the default.
    pub fn sort_less(&self) {
        self.inner.read().tree.sort_less();
    }

    pub fn is_sort_great(&self) -> bool {
        self.inner.read().tree.is_sort_great()
    }

    pub fn free_list_len(&self) -> usize {
        self.inner.read().tree.free_list_len()
    }

    /// Audit the backing tree's structure.
    pub fn validate(&self) -> Result<()> {
        self.inner.read().tree.validate()
    }

    /// Locate records carrying `val`'s key. An encode failure here is a
    /// programmer error and panics.
    pub fn find(&self, val: &R) -> IndexIter<R> {
        let mut g = self.inner.write();
        let IndexInner {
            tree,
            make_key,
            mdb_key,
            ..
        } = &mut *g;
        if let Err(err) = make_key_with_id(mdb_key, make_key, tree, val) {
            panic!("index find: {}", err);
        }
        find_by_key_parts(tree, mdb_key)
    }

    /// Seek an externally built key as a prefix.
    pub fn find_by_key(&self, key: &MdbKey) -> IndexIter<R> {
        let g = self.inner.read();
        find_by_key_parts(&g.tree, key)
    }

    /// Full-index traversal under the configured ordering.
    pub fn begin(&self) -> IndexIter<R> {
        let g = self.inner.read();
        let mut iter = RawIter::new();
        let at_end = !iter.seek_prefix(&g.tree, &[]);
        IndexIter::new(
            g.tree.clone(),
            iter,
            0,
            g.mdb_key.is_compound_key(),
            g.mdb_key.is_unique(),
            0,
            0,
            at_end,
        )
    }

    /// Build a prefix from the projection's present leading fields and
    /// seek it. The projection must carry every index column and the
    /// first one must be present.
    pub fn find_by_projection<P>(&self, pb: &P) -> Result<IndexIter<R>>
    where
        P: Projection<Rec = R>,
    {
        let mut g = self.inner.write();
        let IndexInner {
            tree,
            field_names,
            mdb_key,
            ..
        } = &mut *g;

        for name in field_names.iter() {
            if !P::has_field(name) {
                return err_at!(FieldMismatch, msg: "index field name mismatch [{}]", name);
            }
        }

        mdb_key.reset();
        for (i, name) in field_names.iter().enumerate() {
            match pb.field(name) {
                Some(scalar) => mdb_key.append_scalar(&scalar)?,
                None if i == 0 => {
                    return err_at!(FieldMismatch, msg: "leading index field [{}] absent", name)
                }
                None => break,
            }
        }
        Ok(find_by_key_parts(tree, mdb_key))
    }

    pub(crate) fn add(&self, obj: &Arc<R>) -> Result<()> {
        let mut g = self.inner.write();
        let IndexInner {
            tree,
            make_key,
            mdb_key,
            ..
        } = &mut *g;
        make_key_with_id(mdb_key, make_key, tree, obj)?;
        let (_, did_update) = tree.insert(mdb_key.key(), Arc::clone(obj));
        if did_update {
            return err_at!(IndexCollision, msg: "index conflict on {:?}", mdb_key.key());
        }
        Ok(())
    }

    pub(crate) fn update(&self, old: &Arc<R>, new: &Arc<R>) -> Result<()> {
        let mut g = self.inner.write();
        let IndexInner {
            tree,
            make_key,
            mdb_key,
            mdb_key1,
            ..
        } = &mut *g;
        make_key_with_id(mdb_key, make_key, tree, old)?;
        make_key_with_id(mdb_key1, make_key, tree, new)?;

        if mdb_key.key() != mdb_key1.key() {
            if tree.delete(mdb_key.key()).is_none() {
                return err_at!(StaleIndex, msg: "source entry missing {:?}", mdb_key.key());
            }
            let (_, did_update) = tree.insert(mdb_key1.key(), Arc::clone(new));
            if did_update {
                return err_at!(IndexCollision, msg: "new key conflict {:?}", mdb_key1.key());
            }
        } else {
            let (_, did_update) = tree.insert(mdb_key.key(), Arc::clone(new));
            if !did_update {
                return err_at!(StaleIndex, msg: "source entry missing {:?}", mdb_key.key());
            }
        }
        Ok(())
    }

    pub(crate) fn delete(&self, obj: &Arc<R>) -> Result<()> {
        let mut g = self.inner.write();
        let IndexInner {
            tree,
            make_key,
            mdb_key,
            ..
        } = &mut *g;
        make_key_with_id(mdb_key, make_key, tree, obj)?;
        tree.delete(mdb_key.key());
        Ok(())
    }

    /// Drop the tree and start over, keeping the sort order.
    pub(crate) fn clear(&self) {
        let mut g = self.inner.write();
        let desc = g.tree.is_sort_great();
        g.tree = Txn::new();
        if desc {
            g.tree.sort_great();
        }
    }

    pub(crate) fn tree_len(&self) -> usize {
        self.inner.read().tree.len()
    }

    pub(crate) fn dirty(&self) -> bool {
        self.inner.read().tree.dirty()
    }

    pub(crate) fn last_save_point_id(&self) -> isize {
        self.inner.read().tree.last_save_point_id()
    }

    pub(crate) fn alloc_save_point(&self) {
        self.inner.read().tree.alloc_save_point();
    }

    pub(crate) fn commit(&self) {
        self.inner.read().tree.commit();
    }

    pub(crate) fn rollback_to(&self, save_point_id: isize) {
        self.inner.read().tree.rollback_to(save_point_id);
    }

    // Finder plumbing: the finder builds on this index's scratch key.

    pub(crate) fn reset_key(&self) {
        self.inner.write().mdb_key.reset();
    }

    pub(crate) fn append_with<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut MdbKey) -> Result<()>,
    {
        f(&mut self.inner.write().mdb_key)
    }

    pub(crate) fn fire(&self) -> IndexIter<R> {
        let g = self.inner.read();
        find_by_key_parts(&g.tree, &g.mdb_key)
    }
}

// Encode `obj`'s key; non-unique indexes get the big-endian primary-id
// tail, inverted when the tree sorts descending so later inserts keep
// sorting after earlier ones.
fn make_key_with_id<R>(
    mdb_key: &mut MdbKey,
    make_key: &MakeKeyFn<R>,
    tree: &Txn<Arc<R>>,
    obj: &R,
) -> Result<()>
where
    R: Object,
{
    mdb_key.reset();
    if mdb_key.is_unique() {
        return (make_key)(mdb_key, obj);
    }

    let id = obj.get_id();
    (make_key)(mdb_key, obj)?;
    if mdb_key.len() > 255 {
        return err_at!(InvalidKey, msg: "non-unique key {} bytes, max 255", mdb_key.len());
    }
    if id != 0 {
        if tree.is_sort_great() {
            mdb_key.buffer_mut().write_u32(u32::MAX - id);
        } else {
            mdb_key.buffer_mut().write_u32(id);
        }
    }
    Ok(())
}

fn find_by_key_parts<R>(tree: &Txn<Arc<R>>, key: &MdbKey) -> IndexIter<R>
where
    R: Object,
{
    let mut iter = RawIter::new();
    let at_end = !iter.seek_prefix(tree, key.key());
    IndexIter::new(
        tree.clone(),
        iter,
        key.len(),
        key.is_compound_key(),
        key.is_unique(),
        key.key_count(),
        key.key_num(),
        at_end,
    )
}

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;
