//! Radix node and the slab arena that owns every node of a tree.
//!
//! Nodes refer to each other through `Nid` slots instead of pointers; the
//! arena keeps a tree-wide free list so superseded nodes can be recycled
//! by the version pool on commit/rollback.

/// Slot index of a node within its tree's arena.
pub(crate) type Nid = u32;

#[derive(Clone, Copy)]
pub(crate) struct Edge {
    pub label: u8,
    pub nid: Nid,
}

pub(crate) struct Node<V> {
    /// Present iff this node is a leaf.
    pub leaf: Option<V>,
    /// Bytes shared along the edge leading into this node.
    pub prefix: Vec<u8>,
    /// Out-edges, sorted by label under the tree comparator.
    pub edges: Vec<Edge>,
    /// Savepoint version that last wrote this node.
    pub version: u32,
    /// Position on the creating savepoint's new-list, maintained by the
    /// version pool so the node can be unlinked in O(1).
    pub pool_pos: u32,
}

impl<V> Node<V> {
    fn blank() -> Node<V> {
        Node {
            leaf: None,
            prefix: Vec::new(),
            edges: Vec::new(),
            version: 0,
            pool_pos: 0,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.leaf.is_some()
    }
}

/// Locate the edge carrying `label`, `Err` gives the insertion point.
pub(crate) fn find_edge(edges: &[Edge], label: u8, desc: bool) -> std::result::Result<usize, usize> {
    if desc {
        edges.binary_search_by(|e| label.cmp(&e.label))
    } else {
        edges.binary_search_by(|e| e.label.cmp(&label))
    }
}

/// Insert `e` keeping the edge array sorted under the comparator.
pub(crate) fn add_edge(edges: &mut Vec<Edge>, e: Edge, desc: bool) {
    let off = match find_edge(edges, e.label, desc) {
        Ok(off) => off,
        Err(off) => off,
    };
    edges.insert(off, e);
}

/// Point the edge carrying `e.label` at `e.nid`. The edge must exist.
pub(crate) fn replace_edge(edges: &mut [Edge], e: Edge, desc: bool) {
    match find_edge(edges, e.label, desc) {
        Ok(off) => edges[off].nid = e.nid,
        Err(_) => panic!("replacing missing edge {}", e.label),
    }
}

/// Remove the edge carrying `label`, a miss is ignored.
pub(crate) fn del_edge(edges: &mut Vec<Edge>, label: u8, desc: bool) {
    if let Ok(off) = find_edge(edges, label, desc) {
        edges.remove(off);
    }
}

/// Slab of nodes plus the tree-wide free list.
pub(crate) struct NodeArena<V> {
    slots: Vec<Node<V>>,
    free: Vec<Nid>,
}

impl<V> NodeArena<V> {
    pub fn new() -> NodeArena<V> {
        NodeArena {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    #[inline]
    pub fn node(&self, id: Nid) -> &Node<V> {
        &self.slots[id as usize]
    }

    #[inline]
    pub fn node_mut(&mut self, id: Nid) -> &mut Node<V> {
        &mut self.slots[id as usize]
    }

    /// Hand out a blank node, recycling a freed slot when one is
    /// available.
    pub fn alloc_raw(&mut self) -> Nid {
        match self.free.pop() {
            Some(id) => id,
            None => {
                self.slots.push(Node::blank());
                (self.slots.len() - 1) as Nid
            }
        }
    }

    /// Zero out the node and park its slot on the free list. Buffer
    /// capacity is kept.
    pub fn release(&mut self, id: Nid) {
        let n = &mut self.slots[id as usize];
        n.leaf = None;
        n.prefix.clear();
        n.edges.clear();
        n.version = 0;
        n.pool_pos = 0;
        self.free.push(id);
    }

    #[inline]
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
