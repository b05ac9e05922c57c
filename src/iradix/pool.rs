//! Version pool, one per savepoint.
//!
//! Every savepoint window keeps three node lists:
//!
//! * **new** — nodes created during this savepoint, candidates to survive
//!   commit.
//! * **temp** — nodes created in this savepoint and then superseded by a
//!   later write in the same savepoint; freed on commit and on rollback.
//! * **old** — nodes from before the transaction that were supplanted in
//!   this savepoint; freed on commit, reachable again after rollback.
//!
//! Nodes created by an *earlier* savepoint of the same transaction stay
//! on that savepoint's new-list; restoring the earlier savepoint's
//! captured root is what brings them back.

use crate::iradix::node::{Edge, Nid, NodeArena};

pub(crate) struct SavePool {
    version: u32,
    pre_version: u32,
    /// Root and size at savepoint entry.
    pub root: Nid,
    pub size: usize,
    new_nodes: Vec<Nid>,
    tmp_nodes: Vec<Nid>,
    old_nodes: Vec<Nid>,
}

impl SavePool {
    pub fn new(root: Nid, size: usize, pre_version: u32, version: u32) -> SavePool {
        SavePool {
            version,
            pre_version,
            root,
            size,
            new_nodes: Vec::new(),
            tmp_nodes: Vec::new(),
            old_nodes: Vec::new(),
        }
    }

    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Allocate a node initialised from the given parts, tagged with this
    /// savepoint's version and linked on the new-list.
    pub fn alloc<V: Clone>(
        &mut self,
        arena: &mut NodeArena<V>,
        leaf: Option<V>,
        prefix: &[u8],
        edges: &[Edge],
    ) -> Nid {
        let id = arena.alloc_raw();
        let node = arena.node_mut(id);
        node.leaf = leaf;
        node.prefix.extend_from_slice(prefix);
        node.edges.extend_from_slice(edges);
        node.version = self.version;
        node.pool_pos = self.new_nodes.len() as u32;
        self.new_nodes.push(id);
        id
    }

    /// Return a node that may be modified in place of `nid`.
    ///
    /// `nid` itself when it already belongs to this savepoint and no
    /// reader lock is held; otherwise a fresh copy. The displaced node
    /// moves to the temp-list (same savepoint) or the old-list (node from
    /// before the transaction).
    pub fn writable<V: Clone>(&mut self, arena: &mut NodeArena<V>, nid: Nid, lock_db: u32) -> Nid {
        let version = arena.node(nid).version;
        if lock_db == 0 && version == self.version {
            return nid;
        }

        let (leaf, prefix, edges) = {
            let n = arena.node(nid);
            (n.leaf.clone(), n.prefix.clone(), n.edges.clone())
        };
        let nc = self.alloc(arena, leaf, &prefix, &edges);

        if version == self.version {
            self.unlink_new(arena, nid);
            self.tmp_nodes.push(nid);
        } else if version <= self.pre_version {
            self.old_nodes.push(nid);
        }
        nc
    }

    /// Fold this savepoint into the surviving state.
    pub fn commit<V>(&mut self, arena: &mut NodeArena<V>) {
        Self::fix_list(arena, &mut self.new_nodes);
        Self::free_list(arena, &mut self.tmp_nodes);
        Self::free_list(arena, &mut self.old_nodes);
    }

    /// Undo this savepoint: everything it created goes back to the free
    /// list, supplanted nodes are reachable again from the restored root.
    pub fn rollback<V>(&mut self, arena: &mut NodeArena<V>) {
        Self::free_list(arena, &mut self.new_nodes);
        Self::free_list(arena, &mut self.tmp_nodes);
        Self::fix_list(arena, &mut self.old_nodes);
    }

    fn free_list<V>(arena: &mut NodeArena<V>, list: &mut Vec<Nid>) {
        for id in list.drain(..) {
            arena.release(id);
        }
    }

    // Shrink edge arrays whose slack exceeds half their capacity, then
    // forget the list.
    fn fix_list<V>(arena: &mut NodeArena<V>, list: &mut Vec<Nid>) {
        for &id in list.iter() {
            let edges = &mut arena.node_mut(id).edges;
            if edges.is_empty() {
                *edges = Vec::new();
            } else {
                let cap = edges.capacity();
                if ((cap - edges.len()) as f32) / (cap as f32) > 0.5 {
                    edges.shrink_to_fit();
                }
            }
        }
        list.clear();
    }

    // O(1) removal from the new-list through the node's back-pointer.
    fn unlink_new<V>(&mut self, arena: &mut NodeArena<V>, nid: Nid) {
        let pos = arena.node(nid).pool_pos as usize;
        self.new_nodes.swap_remove(pos);
        if pos < self.new_nodes.len() {
            let moved = self.new_nodes[pos];
            arena.node_mut(moved).pool_pos = pos as u32;
        }
    }
}
