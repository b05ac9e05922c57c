//! Transactional layer over the path-copying radix tree.
//!
//! [Txn] owns the node arena, the current root, a version counter and the
//! savepoint stack. The first mutation after a commit lazily allocates
//! the default savepoint (version `v+1`); every explicit savepoint stacks
//! another pool with version `v+n+2`, keeping versions monotonic across
//! nested savepoints. Commit folds all savepoints into the base state,
//! rollback unwinds them top-down and restores the target's captured
//! root.

use std::{fmt, result, sync::Arc};

use crate::{
    iradix::node::{add_edge, del_edge, find_edge, replace_edge, Edge, Nid, NodeArena},
    iradix::pool::SavePool,
    spinlock::Spinlock,
    Error, Result,
};

/// Persistent radix tree with nested savepoints.
///
/// Cloning the handle shares the underlying tree; iterators hold such a
/// clone. All methods serialize access through a latch, the caller is
/// still expected to follow the crate's single-writer discipline.
pub struct Txn<V> {
    pub(crate) inner: Arc<Spinlock<Inner<V>>>,
}

impl<V> Clone for Txn<V> {
    fn clone(&self) -> Txn<V> {
        Txn {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Default for Txn<V> {
    fn default() -> Self {
        Txn::new()
    }
}

impl<V> Txn<V> {
    pub fn new() -> Txn<V> {
        let mut arena = NodeArena::new();
        let root = arena.alloc_raw();
        let inner = Inner {
            arena,
            root,
            size: 0,
            version: 0,
            lock_db: 0,
            sort_great: false,
            def_sp: None,
            sps: Vec::new(),
        };
        Txn {
            inner: Arc::new(Spinlock::new(inner)),
        }
    }

    /// Number of keys in the tree.
    pub fn len(&self) -> usize {
        self.inner.read().size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether uncommitted mutations exist.
    pub fn dirty(&self) -> bool {
        self.inner.read().def_sp.is_some()
    }

    pub fn free_list_len(&self) -> usize {
        self.inner.read().arena.free_len()
    }

    /// Order edges descending, larger labels first.
    pub fn sort_great(&self) {
        self.inner.write().sort_great = true;
    }

    /// Order edges ascending, the default.
    pub fn sort_less(&self) {
        self.inner.write().sort_great = false;
    }

    pub fn is_sort_great(&self) -> bool {
        self.inner.read().sort_great
    }

    /// Force copy-on-write for every mutation while held, so in-flight
    /// iterators keep seeing the pre-mutation tree.
    pub fn lock_db(&self) {
        self.inner.write().lock_db += 1;
    }

    pub fn unlock_db(&self) {
        let mut inner = self.inner.write();
        if inner.lock_db > 0 {
            inner.lock_db -= 1;
        }
    }
}

impl<V> Txn<V>
where
    V: Clone,
{
    /// Get the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Option<V> {
        self.inner.read().get(key)
    }

    /// Insert or overwrite `key`. Returns the previous value and whether
    /// the insert overwrote an existing leaf.
    pub fn insert(&self, key: &[u8], value: V) -> (Option<V>, bool) {
        self.inner.write().insert(key, value)
    }

    /// Remove `key`, returning the stored value on a hit.
    pub fn delete(&self, key: &[u8]) -> Option<V> {
        self.inner.write().delete(key)
    }

    /// Savepoint stack depth: -1 when no explicit savepoint is stacked,
    /// 0 for the first, and so on.
    pub fn last_save_point_id(&self) -> isize {
        self.inner.read().sps.len() as isize - 1
    }

    /// Stack a savepoint capturing the current root and size.
    pub fn alloc_save_point(&self) {
        self.inner.write().alloc_save_point();
    }

    /// Fold every savepoint into the base state and release superseded
    /// nodes to the free list. Also drops the reader lock.
    pub fn commit(&self) {
        let mut inner = self.inner.write();
        inner.commit();
        inner.lock_db = 0;
    }

    /// Undo everything since the first mutation.
    pub fn rollback(&self) {
        self.rollback_to(-1);
    }

    /// Undo savepoints top-down through `id` (-1 for a full rollback) and
    /// restore that savepoint's captured root and size.
    pub fn rollback_to(&self, id: isize) {
        self.inner.write().rollback_to(id);
    }

    /// Audit the tree structure; fatal error on the first violation.
    pub fn validate(&self) -> Result<()> {
        let inner = self.inner.read();
        let mut n_leafs = 0;
        inner.validate_node(inner.root, true, &mut n_leafs)?;
        if n_leafs != inner.size {
            return err_at!(Fatal, msg: "leaf count {} != size {}", n_leafs, inner.size);
        }
        Ok(())
    }

    pub fn to_stats(&self) -> Stats {
        let inner = self.inner.read();
        Stats {
            n_nodes: inner.arena.len(),
            n_free: inner.arena.free_len(),
            n_save_points: inner.sps.len() + if inner.def_sp.is_some() { 1 } else { 0 },
            lock_db: inner.lock_db,
        }
    }
}

/// Statistic type, to capture a tree's arena and savepoint footprint.
#[derive(Default)]
pub struct Stats {
    /// Arena slots allocated over the tree's lifetime.
    pub n_nodes: usize,
    /// Slots parked on the free list.
    pub n_free: usize,
    /// Savepoints currently open, the default savepoint included.
    pub n_save_points: usize,
    /// Reader-lock counter.
    pub lock_db: u32,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(
            f,
            "{{ n_nodes = {}, n_free = {}, n_save_points = {}, lock_db = {} }}",
            self.n_nodes, self.n_free, self.n_save_points, self.lock_db,
        )
    }
}

pub(crate) struct Inner<V> {
    pub(crate) arena: NodeArena<V>,
    pub(crate) root: Nid,
    pub(crate) sort_great: bool,
    size: usize,
    version: u32,
    lock_db: u32,
    def_sp: Option<SavePool>,
    sps: Vec<SavePool>,
}

impl<V> Inner<V> {
    fn alloc_save_point(&mut self) {
        match self.def_sp {
            None => {
                let sp = SavePool::new(self.root, self.size, self.version, self.version + 1);
                self.def_sp = Some(sp);
                self.lock_db = 0;
            }
            Some(_) => {
                let n = self.sps.len() as u32;
                let sp = SavePool::new(self.root, self.size, self.version, self.version + n + 2);
                self.sps.push(sp);
            }
        }
    }

    fn commit(&mut self) {
        if self.def_sp.is_some() {
            let Inner {
                arena,
                def_sp,
                sps,
                version,
                ..
            } = self;
            let def = def_sp.as_mut().unwrap();
            *version = match sps.last() {
                Some(sp) => sp.version(),
                None => def.version(),
            };
            for sp in sps.iter_mut().rev() {
                sp.commit(arena);
            }
            def.commit(arena);
            sps.clear();
            *def_sp = None;
        }
    }

    fn rollback_to(&mut self, id: isize) {
        if self.def_sp.is_none() {
            return;
        }
        self.lock_db = 0;

        let Inner {
            arena,
            def_sp,
            sps,
            root,
            size,
            ..
        } = self;

        let mut i = sps.len() as isize - 1;
        while i >= 0 {
            sps[i as usize].rollback(arena);
            if i == id {
                break;
            }
            i -= 1;
        }
        if i < 0 {
            let def = def_sp.as_mut().unwrap();
            *root = def.root;
            *size = def.size;
            def.rollback(arena);
            *def_sp = None;
            sps.clear();
            return;
        }
        let sp = &sps[i as usize];
        *root = sp.root;
        *size = sp.size;
        sps.truncate(i as usize);
    }
}

impl<V> Inner<V>
where
    V: Clone,
{
    fn get(&self, key: &[u8]) -> Option<V> {
        let desc = self.sort_great;
        let mut nid = self.root;
        let mut search = key;
        loop {
            if search.is_empty() {
                return self.arena.node(nid).leaf.clone();
            }
            let node = self.arena.node(nid);
            nid = match find_edge(&node.edges, search[0], desc) {
                Ok(idx) => node.edges[idx].nid,
                Err(_) => return None,
            };
            let plen = {
                let prefix = &self.arena.node(nid).prefix;
                if !search.starts_with(prefix) {
                    return None;
                }
                prefix.len()
            };
            search = &search[plen..];
        }
    }

    fn insert(&mut self, key: &[u8], value: V) -> (Option<V>, bool) {
        let root = self.root;
        let (new_root, old, did_update) = self.insert_at(root, key, value);
        self.root = new_root;
        if !did_update {
            self.size += 1;
        }
        (old, did_update)
    }

    fn delete(&mut self, key: &[u8]) -> Option<V> {
        let root = self.root;
        let (new_root, leaf) = self.delete_at(root, true, key);
        if let Some(r) = new_root {
            self.root = r;
        }
        if leaf.is_some() {
            self.size -= 1;
        }
        leaf
    }

    fn insert_at(&mut self, nid: Nid, search: &[u8], value: V) -> (Nid, Option<V>, bool) {
        if search.is_empty() {
            let (old, did_update) = {
                let node = self.arena.node(nid);
                (node.leaf.clone(), node.is_leaf())
            };
            let nc = self.write_node(nid);
            self.arena.node_mut(nc).leaf = Some(value);
            return (nc, old, did_update);
        }

        let desc = self.sort_great;
        let (idx, child) = match find_edge(&self.arena.node(nid).edges, search[0], desc) {
            Ok(idx) => (idx, self.arena.node(nid).edges[idx].nid),
            Err(_) => {
                // no edge, hang a fresh leaf off this node
                let leaf_id = self.new_node(Some(value), search, &[]);
                let nc = self.write_node(nid);
                let e = Edge {
                    label: search[0],
                    nid: leaf_id,
                };
                add_edge(&mut self.arena.node_mut(nc).edges, e, desc);
                return (nc, None, false);
            }
        };

        let common = longest_prefix(search, &self.arena.node(child).prefix);
        if common == self.arena.node(child).prefix.len() {
            // child's prefix fully matched, descend
            let (new_child, old, did_update) = self.insert_at(child, &search[common..], value);
            let nc = self.write_node(nid);
            self.arena.node_mut(nc).edges[idx].nid = new_child;
            return (nc, old, did_update);
        }

        // partial match, split the edge at the common prefix
        let nc = self.write_node(nid);
        let split_id = self.new_node(None, &search[..common], &[]);
        let e = Edge {
            label: search[0],
            nid: split_id,
        };
        replace_edge(&mut self.arena.node_mut(nc).edges, e, desc);

        // move the existing child under the split node
        let mod_child = self.write_node(child);
        let e = Edge {
            label: self.arena.node(mod_child).prefix[common],
            nid: mod_child,
        };
        add_edge(&mut self.arena.node_mut(split_id).edges, e, desc);
        self.arena.node_mut(mod_child).prefix.drain(..common);

        let rest = &search[common..];
        if rest.is_empty() {
            // the split point is the key itself
            self.arena.node_mut(split_id).leaf = Some(value);
            return (nc, None, false);
        }

        let leaf_id = self.new_node(Some(value), rest, &[]);
        let e = Edge {
            label: rest[0],
            nid: leaf_id,
        };
        add_edge(&mut self.arena.node_mut(split_id).edges, e, desc);
        (nc, None, false)
    }

    fn delete_at(&mut self, nid: Nid, is_root: bool, search: &[u8]) -> (Option<Nid>, Option<V>) {
        if search.is_empty() {
            if !self.arena.node(nid).is_leaf() {
                return (None, None);
            }
            let leaf = self.arena.node(nid).leaf.clone();
            let nc = self.write_node(nid);
            self.arena.node_mut(nc).leaf = None;
            if !is_root && self.arena.node(nc).edges.len() == 1 {
                self.merge_child(nc);
            }
            return (Some(nc), leaf);
        }

        let desc = self.sort_great;
        let label = search[0];
        let (idx, child) = match find_edge(&self.arena.node(nid).edges, label, desc) {
            Ok(idx) => (idx, self.arena.node(nid).edges[idx].nid),
            Err(_) => return (None, None),
        };
        let plen = {
            let prefix = &self.arena.node(child).prefix;
            if !search.starts_with(prefix) {
                return (None, None);
            }
            prefix.len()
        };

        let (new_child, leaf) = self.delete_at(child, false, &search[plen..]);
        let new_child = match new_child {
            Some(c) => c,
            None => return (None, None),
        };

        let nc = self.write_node(nid);
        let child_empty = {
            let c = self.arena.node(new_child);
            c.leaf.is_none() && c.edges.is_empty()
        };
        if child_empty {
            del_edge(&mut self.arena.node_mut(nc).edges, label, desc);
            let mergeable = {
                let n = self.arena.node(nc);
                n.edges.len() == 1 && !n.is_leaf()
            };
            if !is_root && mergeable {
                self.merge_child(nc);
            }
        } else {
            self.arena.node_mut(nc).edges[idx].nid = new_child;
        }
        (Some(nc), leaf)
    }

    // Fold the single remaining child into `nid`: concatenate prefixes,
    // inherit the child's leaf and edges.
    fn merge_child(&mut self, nid: Nid) {
        let child = self.arena.node(nid).edges[0].nid;
        let (cprefix, cleaf, cedges) = {
            let c = self.arena.node(child);
            (c.prefix.clone(), c.leaf.clone(), c.edges.clone())
        };
        let node = self.arena.node_mut(nid);
        node.prefix.extend_from_slice(&cprefix);
        node.leaf = cleaf;
        node.edges = cedges;
        // TODO: recycle the merged child once the savepoint bookkeeping
        // can prove the recycle safe across rollback.
    }

    fn write_node(&mut self, nid: Nid) -> Nid {
        if self.def_sp.is_none() {
            self.alloc_save_point();
        }
        let lock_db = self.lock_db;
        let Inner {
            arena, def_sp, sps, ..
        } = self;
        let sp = if sps.is_empty() {
            def_sp.as_mut().unwrap()
        } else {
            sps.last_mut().unwrap()
        };
        sp.writable(arena, nid, lock_db)
    }

    fn new_node(&mut self, leaf: Option<V>, prefix: &[u8], edges: &[Edge]) -> Nid {
        if self.def_sp.is_none() {
            self.alloc_save_point();
        }
        let Inner {
            arena, def_sp, sps, ..
        } = self;
        let sp = if sps.is_empty() {
            def_sp.as_mut().unwrap()
        } else {
            sps.last_mut().unwrap()
        };
        sp.alloc(arena, leaf, prefix, edges)
    }

    fn validate_node(&self, nid: Nid, is_root: bool, n_leafs: &mut usize) -> Result<()> {
        let node = self.arena.node(nid);
        if !is_root && node.prefix.is_empty() {
            return err_at!(Fatal, msg: "empty prefix off root");
        }
        if !is_root && node.leaf.is_none() && node.edges.len() == 1 {
            return err_at!(Fatal, msg: "unmerged single-edge node");
        }
        if node.is_leaf() {
            *n_leafs += 1;
        }
        for (i, e) in node.edges.iter().enumerate() {
            if i > 0 {
                let prev = node.edges[i - 1].label;
                let sorted = if self.sort_great {
                    prev > e.label
                } else {
                    prev < e.label
                };
                if !sorted {
                    return err_at!(Fatal, msg: "edges unsorted at label {}", e.label);
                }
            }
            if self.arena.node(e.nid).prefix.first() != Some(&e.label) {
                return err_at!(Fatal, msg: "edge label {} differs from child prefix", e.label);
            }
            self.validate_node(e.nid, false, n_leafs)?;
        }
        Ok(())
    }
}

fn longest_prefix(a: &[u8], b: &[u8]) -> usize {
    let max = a.len().min(b.len());
    let mut i = 0;
    while i < max && a[i] == b[i] {
        i += 1;
    }
    i
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;
