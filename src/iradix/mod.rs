//! Module implement persistent radix tree with savepoint-aware node
//! recycling.
//!
//! The tree is a compressed byte-trie: every edge carries a multi-byte
//! prefix and the edge array of a node is kept sorted under the tree's
//! byte comparator, ascending or descending. Mutations are path-copying:
//! every node from the root to the mutation point is rewritten into a
//! fresh node, so older roots keep describing older trees.
//!
//! Copies are served by a per-savepoint version pool which tracks what
//! was created, superseded and supplanted inside each savepoint window.
//! Rollback restores a savepoint's captured root and returns the
//! window's nodes to the tree-wide free list, without deep cloning
//! anything.

mod buffer;
mod iter;
mod node;
mod pool;
mod tree;

pub use buffer::ByteBuffer;
pub use iter::RawIter;
pub use tree::{Stats, Txn};
