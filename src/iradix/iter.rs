//! Raw iterator over a radix tree.
//!
//! A stack of per-level cursors, each holding the sorted sibling nodes at
//! that level and the current position. The key of the node under the
//! cursor is maintained incrementally on a byte buffer, appended when a
//! node is entered and truncated when the cursor backtracks, so callers
//! read the fully reconstructed key without rebuilding it per step.
//!
//! The iterator dereferences arena slots on every step; callers that
//! mutate the tree mid-iteration must hold the tree's reader lock so
//! those slots stay parked until the transaction resolves, and must not
//! commit or roll back while the cursor is live.

use crate::iradix::{
    buffer::ByteBuffer,
    node::{find_edge, Nid},
    tree::{Inner, Txn},
};

struct Level {
    nodes: Vec<Nid>,
    pos: Option<usize>,
}

impl Level {
    fn advance<V>(&mut self, inner: &Inner<V>, key: &mut ByteBuffer) -> Option<Nid> {
        let np = match self.pos {
            None => 0,
            Some(p) => p + 1,
        };
        if np >= self.nodes.len() {
            return None;
        }
        if np == 0 {
            key.write(&inner.arena.node(self.nodes[0]).prefix);
        } else {
            let plen = inner.arena.node(self.nodes[np - 1]).prefix.len();
            key.truncate(key.len() - plen);
            key.write(&inner.arena.node(self.nodes[np]).prefix);
        }
        self.pos = Some(np);
        Some(self.nodes[np])
    }
}

/// DFS cursor over a subtree selected by [RawIter::seek_prefix].
///
/// `next` yields leaves strictly within the seeked subtree; `raw_next`
/// keeps going past it, climbing levels and resuming among later
/// siblings in comparator order until the whole tree is exhausted.
#[derive(Default)]
pub struct RawIter {
    stack: Vec<Level>,
    limit_lv: usize,
    key: ByteBuffer,
}

impl RawIter {
    pub fn new() -> RawIter {
        RawIter::default()
    }

    /// Key bytes of the most recently yielded leaf.
    #[inline]
    pub fn key(&self) -> &[u8] {
        self.key.bytes()
    }

    /// Position the cursor at `prefix`. Returns false when no key under
    /// the prefix can exist, in which case the cursor is at end.
    pub fn seek_prefix<V>(&mut self, tree: &Txn<V>, prefix: &[u8]) -> bool {
        let inner = tree.inner.read();
        self.seek(&inner, prefix)
    }

    /// Step to the next leaf within the seeked subtree.
    pub fn next<V: Clone>(&mut self, tree: &Txn<V>) -> Option<V> {
        let inner = tree.inner.read();
        self.do_next(&inner, false)
    }

    /// Step to the next leaf in comparator order anywhere in the tree.
    pub fn raw_next<V: Clone>(&mut self, tree: &Txn<V>) -> Option<V> {
        let inner = tree.inner.read();
        self.do_next(&inner, true)
    }

    fn seek<V>(&mut self, inner: &Inner<V>, prefix: &[u8]) -> bool {
        self.stack.clear();
        self.limit_lv = 0;
        self.key.reset();

        let desc = inner.sort_great;
        let mut nid = inner.root;
        let mut search = prefix;
        loop {
            if search.is_empty() {
                self.push_level(vec![nid]);
                self.limit_lv = self.stack.len();
                return true;
            }

            let node = inner.arena.node(nid);
            let next_nid = match find_edge(&node.edges, search[0], desc) {
                Ok(idx) => node.edges[idx].nid,
                Err(_) => return false,
            };

            let next_prefix = &inner.arena.node(next_nid).prefix;
            if search.starts_with(next_prefix) {
                self.push_path(inner, nid);
                search = &search[next_prefix.len()..];
                if search.is_empty() {
                    self.push_level(vec![next_nid]);
                    self.limit_lv = self.stack.len();
                    return true;
                }
                nid = next_nid;
            } else if next_prefix.starts_with(search) {
                // the edge's prefix extends past the seeked bytes; the
                // whole child subtree is in range
                self.push_path(inner, nid);
                self.push_level(vec![next_nid]);
                self.limit_lv = self.stack.len();
                return true;
            } else {
                return false;
            }
        }
    }

    fn do_next<V: Clone>(&mut self, inner: &Inner<V>, raw: bool) -> Option<V> {
        let min_lv = if raw { 1 } else { self.limit_lv };
        loop {
            let n = self.stack.len();
            if n == 0 || n < min_lv {
                return None;
            }

            let advanced = {
                let RawIter { stack, key, .. } = self;
                stack[n - 1].advance(inner, key)
            };
            let nid = match advanced {
                Some(nid) => nid,
                None => {
                    // level exhausted; in raw mode resume among the
                    // parent's later siblings before climbing
                    if n <= self.limit_lv && raw && n > 1 {
                        if !self.expand_level(inner) {
                            self.pop_level(inner);
                        }
                    } else {
                        self.pop_level(inner);
                    }
                    continue;
                }
            };

            let (children, leaf) = {
                let node = inner.arena.node(nid);
                let children: Vec<Nid> = node.edges.iter().map(|e| e.nid).collect();
                (children, node.leaf.clone())
            };
            if !children.is_empty() {
                self.push_level(children);
            }
            if let Some(value) = leaf {
                return Some(value);
            }
        }
    }

    // Fill the exhausted top level with the parent's siblings ordering
    // after the node the cursor came through.
    fn expand_level<V>(&mut self, inner: &Inner<V>) -> bool {
        let n = self.stack.len();
        let (last_nid, pre_nid) = {
            let lv = &self.stack[n - 1];
            let pv = &self.stack[n - 2];
            (lv.nodes[lv.pos.unwrap()], pv.nodes[pv.pos.unwrap()])
        };
        let pre = inner.arena.node(pre_nid);
        if pre.edges.len() > 1 {
            let label = inner.arena.node(last_nid).prefix[0];
            let idx = if inner.sort_great {
                pre.edges.partition_point(|e| e.label >= label)
            } else {
                pre.edges.partition_point(|e| e.label <= label)
            };
            if idx < pre.edges.len() {
                let add: Vec<Nid> = pre.edges[idx..].iter().map(|e| e.nid).collect();
                self.stack[n - 1].nodes.extend(add);
                return true;
            }
        }
        false
    }

    fn pop_level<V>(&mut self, inner: &Inner<V>) {
        let lv = self.stack.last().unwrap();
        let nid = lv.nodes[lv.pos.unwrap()];
        let plen = inner.arena.node(nid).prefix.len();
        self.key.truncate(self.key.len() - plen);
        self.stack.pop();
    }

    // Single-node level for a step along the seek path, advanced so the
    // key already includes its prefix.
    fn push_path<V>(&mut self, inner: &Inner<V>, nid: Nid) {
        self.key.write(&inner.arena.node(nid).prefix);
        self.stack.push(Level {
            nodes: vec![nid],
            pos: Some(0),
        });
    }

    fn push_level(&mut self, nodes: Vec<Nid>) {
        self.stack.push(Level { nodes, pos: None });
    }
}

#[cfg(test)]
#[path = "iter_test.rs"]
mod iter_test;
