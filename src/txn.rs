//! Module implement the transaction manager.
//!
//! A transaction is an ordered list of resources: one per table mutation,
//! plus a marker per savepoint. A mutation arriving within the current
//! savepoint window tries to merge back into the most recent resource for
//! the same `(table, record)`; compensating pairs collapse (create+update
//! keeps the create, create+delete becomes a no-op, update+update folds,
//! update+delete keeps a delete). Commit runs a second merge pass across
//! savepoint boundaries, then commits the survivors in their original
//! order — each survivor fires its commit trigger and folds the owning
//! table's radix savepoints. Rollback finds, per table, the earliest
//! resource at or after the rollback point and rolls the table's indexes
//! back in one step.

use log::{debug, warn};

use std::{any::Any, collections::HashMap, sync::Arc};

use crate::spinlock::Spinlock;

#[derive(Clone, Copy, PartialEq)]
pub(crate) enum ResourceTag {
    SavePoint,
    Database,
}

pub(crate) enum MergeResult {
    /// Folded into the prior resource, the new one is dropped.
    Ok,
    /// No merge, the new resource stays as its own entry.
    FailAll,
}

/// Transaction resource: a table mutation or a savepoint marker.
pub(crate) trait Resource: Any {
    fn tag(&self) -> ResourceTag;

    /// Owning table's factory id, 0 for control resources.
    fn id(&self) -> u32;

    /// Record primary id, 0 for control resources.
    fn sub_id(&self) -> u32;

    fn pos(&self) -> usize;

    fn set_pos(&mut self, pos: usize);

    fn is_control(&self) -> bool;

    fn commit(&mut self, reason: i32);

    fn rollback(&mut self);

    fn free(&mut self);

    fn merge(&mut self, prior: &mut dyn Resource) -> MergeResult;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct SpState {
    pos: usize,
    valid: bool,
}

/// Handle to a transaction savepoint.
///
/// Issued by [Transaction::alloc_save_point]; pass it back to
/// [Transaction::rollback_to] to unwind to it. Rolling back to or past a
/// savepoint invalidates it, as does commit; rolling back to an invalid
/// handle is a no-op.
#[derive(Clone)]
pub struct SavePoint {
    st: Arc<Spinlock<SpState>>,
}

impl SavePoint {
    fn new() -> SavePoint {
        let st = SpState { pos: 0, valid: true };
        SavePoint {
            st: Arc::new(Spinlock::new(st)),
        }
    }

    pub fn is_invalid(&self) -> bool {
        !self.st.read().valid
    }

    fn pos(&self) -> usize {
        self.st.read().pos
    }

    fn set_pos(&self, pos: usize) {
        self.st.write().pos = pos;
    }

    fn invalidate(&self) {
        let mut st = self.st.write();
        st.valid = false;
        st.pos = 0;
    }
}

struct SpResource {
    sp: SavePoint,
}

impl Resource for SpResource {
    fn tag(&self) -> ResourceTag {
        ResourceTag::SavePoint
    }

    fn id(&self) -> u32 {
        0
    }

    fn sub_id(&self) -> u32 {
        0
    }

    fn pos(&self) -> usize {
        self.sp.pos()
    }

    fn set_pos(&mut self, pos: usize) {
        self.sp.set_pos(pos);
    }

    fn is_control(&self) -> bool {
        true
    }

    fn commit(&mut self, _reason: i32) {}

    fn rollback(&mut self) {}

    fn free(&mut self) {
        self.sp.invalidate();
    }

    fn merge(&mut self, _prior: &mut dyn Resource) -> MergeResult {
        MergeResult::FailAll
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Transaction over one or more tables.
///
/// Mutations join a transaction by passing `Some(&mut txn)` into the
/// table operations; [commit][Transaction::commit] makes them permanent,
/// [rollback][Transaction::rollback] undoes them, and savepoints undo
/// them partially.
#[derive(Default)]
pub struct Transaction {
    resources: Vec<Box<dyn Resource>>,
    save_points: Vec<SavePoint>,
    merges: HashMap<u64, Vec<usize>>,
}

impl Transaction {
    pub fn new() -> Transaction {
        Transaction::default()
    }

    /// Mark the current position; mutations after this point can be
    /// undone with [rollback_to][Transaction::rollback_to].
    pub fn alloc_save_point(&mut self) -> SavePoint {
        let sp = SavePoint::new();
        let marker = SpResource { sp: sp.clone() };
        self.add_resource(Box::new(marker));
        self.save_points.push(sp.clone());
        sp
    }

    /// -1 when no savepoint is live, 0 for the first, and so on.
    pub fn last_save_point_id(&self) -> isize {
        self.save_points.len() as isize - 1
    }

    /// Make every pending mutation permanent. Surviving resources commit
    /// in their original order; `reason` is handed through to the commit
    /// triggers.
    pub fn commit(&mut self, reason: i32) {
        let n = self.resources.len();
        if n == 0 {
            return;
        }
        debug!(target: "memdb", "transaction commit, {} resources", n);

        // newest to oldest: drop control resources, collapse across
        // savepoint boundaries, keep the rest
        let mut to_commit = Vec::new();
        for i in (0..n).rev() {
            if self.resources[i].is_control() {
                self.resources[i].free();
                continue;
            }
            if self.merge_back_at(0, i) {
                continue;
            }
            to_commit.push(i);
        }

        for &i in to_commit.iter().rev() {
            self.resources[i].commit(reason);
        }

        self.resources.clear();
        self.merges.clear();
        self.save_points.clear();
    }

    /// Undo every pending mutation.
    pub fn rollback(&mut self) {
        debug!(target: "memdb", "transaction rollback, {} resources", self.resources.len());
        self.rollback_to_pos(0);
        self.resources.clear();
        self.merges.clear();
        if !self.save_points.is_empty() {
            panic!("rollback left {} savepoints live", self.save_points.len());
        }
    }

    /// Undo mutations made since `sp` was allocated, invalidating `sp`
    /// and every savepoint above it. No-op when `sp` is already invalid.
    pub fn rollback_to(&mut self, sp: &SavePoint) {
        if sp.is_invalid() {
            return;
        }
        self.rollback_to_pos(sp.pos());
    }

    pub(crate) fn add_resource(&mut self, mut resource: Box<dyn Resource>) {
        let pos = self.resources.len();
        resource.set_pos(pos);
        let control = resource.is_control();
        let id = merge_id(resource.id(), resource.sub_id());
        self.resources.push(resource);

        if !control {
            let end_pos = self.save_points.last().map_or(0, |sp| sp.pos());
            if self.merge_back_at(end_pos, pos) {
                self.resources.pop();
                return;
            }
            self.merges.entry(id).or_default().push(pos);
        }
    }

    // Try folding the resource at `at` into a same-key predecessor at a
    // position within [end_pos, at).
    fn merge_back_at(&mut self, end_pos: usize, at: usize) -> bool {
        let id = {
            let r = &self.resources[at];
            merge_id(r.id(), r.sub_id())
        };
        let pos_list = match self.merges.get(&id) {
            Some(list) => list.clone(),
            None => return false,
        };

        for &pos in pos_list.iter().rev() {
            if pos < end_pos {
                break;
            }
            if pos >= at {
                continue;
            }
            let (head, tail) = self.resources.split_at_mut(at);
            let resource = &mut tail[0];
            let prior = &mut head[pos];
            if prior.tag() != resource.tag() {
                panic!("transaction merge: resource tags differ");
            }
            if prior.id() != resource.id() {
                panic!("transaction merge: resource ids differ");
            }
            return match resource.merge(&mut **prior) {
                MergeResult::Ok => true,
                MergeResult::FailAll => false,
            };
        }
        false
    }

    fn rollback_to_pos(&mut self, rollback_pos: usize) {
        // per table, the earliest resource at or after the rollback
        // point; one table-level rollback covers the whole window
        let mut to_rollback: HashMap<u32, usize> = HashMap::new();
        for list in self.merges.values_mut() {
            if list.is_empty() {
                continue;
            }
            let i = if rollback_pos > 0 {
                list.partition_point(|&p| p < rollback_pos)
            } else {
                0
            };
            if i < list.len() {
                let pos = list[i];
                list.truncate(i);
                let table_id = self.resources[pos].id();
                let entry = to_rollback.entry(table_id).or_insert(pos);
                if pos < *entry {
                    *entry = pos;
                }
            }
        }
        for (_, &pos) in to_rollback.iter() {
            self.resources[pos].rollback();
            self.resources[pos].free();
        }

        for i in (rollback_pos..self.resources.len()).rev() {
            self.resources[i].free();
        }
        self.resources.truncate(rollback_pos);

        // freed markers are exactly the savepoints at or past the
        // rollback point
        while matches!(self.save_points.last(), Some(sp) if sp.is_invalid()) {
            self.save_points.pop();
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.resources.is_empty() {
            warn!(
                target: "memdb",
                "transaction dropped with {} pending resources", self.resources.len()
            );
        }
    }
}

fn merge_id(id: u32, sub_id: u32) -> u64 {
    (id as u64) << 32 | sub_id as u64
}

#[cfg(test)]
#[path = "txn_test.rs"]
mod txn_test;
