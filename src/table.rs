//! Module implement the multi-index table, the object factory of the
//! store.
//!
//! A table owns an ordered sequence of indexes, index 0 being the
//! implicit primary index over the record's id column, and drives every
//! mutation across the whole index set: a record is added to, updated in
//! or removed from all indexes, or none. An index error mid-mutation
//! rolls every index back to the operation's savepoint and terminates,
//! so a partially indexed record is never observable.
//!
//! Without a transaction a mutation commits its radix trees immediately
//! and fires the commit triggers on the spot. Under a transaction the
//! mutation is recorded as a resource and the commit triggers fire at
//! transaction commit, once per surviving logical change.

use log::info;

use std::{
    any::Any,
    collections::HashMap,
    sync::atomic::{AtomicU32, Ordering::SeqCst},
    sync::Arc,
};

use crate::{
    finder::MdbFinder,
    index::{Index, MakeKeyFn},
    iter::IndexIter,
    spinlock::Spinlock,
    trigger::{ActionTrigger, CommitTrigger},
    txn::{MergeResult, Resource, ResourceTag, Transaction},
    types::{Object, Projection},
    Error, Result,
};

static FACTORY_IDS: AtomicU32 = AtomicU32::new(0);

fn alloc_factory_id() -> u32 {
    FACTORY_IDS.fetch_add(1, SeqCst) + 1
}

/// Multi-index table of records. Cloning shares the table.
pub struct Table<R>
where
    R: Object,
{
    inner: Arc<Spinlock<TableInner<R>>>,
}

impl<R> Clone for Table<R>
where
    R: Object,
{
    fn clone(&self) -> Table<R> {
        Table {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct TableInner<R>
where
    R: Object,
{
    name: String,
    factory_id: u32,
    max_id: u32,
    indexes: Vec<Index<R>>,
    index_map: HashMap<String, usize>,
    action_triggers: Vec<Arc<dyn ActionTrigger<R>>>,
    commit_triggers: Vec<Arc<dyn CommitTrigger<R>>>,
}

impl<R> Table<R>
where
    R: Object,
{
    /// Create a table. The primary index is registered implicitly over
    /// the record's id column, `R::field_names()[0]`.
    pub fn new(name: &str) -> Table<R> {
        let factory_id = alloc_factory_id();
        let inner = TableInner {
            name: name.to_string(),
            factory_id,
            max_id: 1,
            indexes: Vec::new(),
            index_map: HashMap::new(),
            action_triggers: Vec::new(),
            commit_triggers: Vec::new(),
        };
        let table = Table {
            inner: Arc::new(Spinlock::new(inner)),
        };
        info!(target: "memdb", "table {:?} created, id:{}", name, factory_id);

        let primary = R::field_names()[0];
        let make_key: MakeKeyFn<R> = Box::new(|key, obj| key.append_u32(obj.get_id()));
        table.add_index(primary, make_key, true);
        table
    }

    pub fn name(&self) -> String {
        self.inner.read().name.clone()
    }

    pub fn factory_id(&self) -> u32 {
        self.inner.read().factory_id
    }

    /// Register an index over the pipe-delimited `fields` and return its
    /// index number. Registering the same field list twice returns the
    /// existing number.
    pub fn add_index(&self, fields: &str, make_key: MakeKeyFn<R>, unique: bool) -> usize {
        let mut g = self.inner.write();
        if let Some(&idx_num) = g.index_map.get(fields) {
            return idx_num;
        }
        let idx_num = g.indexes.len();
        let idx = Index::new(fields, idx_num, make_key, unique);
        info!(
            target: "memdb",
            "table {:?} add index {:?}, unique:{}", g.name, fields, unique
        );
        g.indexes.push(idx);
        g.index_map.insert(fields.to_string(), idx_num);
        idx_num
    }

    pub fn get_index(&self, idx_num: usize) -> Option<Index<R>> {
        self.inner.read().indexes.get(idx_num).cloned()
    }

    pub fn get_index_by_name(&self, fields: &str) -> Option<Index<R>> {
        let g = self.inner.read();
        g.index_map.get(fields).map(|&n| g.indexes[n].clone())
    }

    /// Number of records, by the primary index.
    pub fn count(&self) -> usize {
        self.inner.read().indexes[0].tree_len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn free_list_len(&self) -> usize {
        self.inner.read().indexes[0].free_list_len()
    }

    /// Iterate the index `idx_num` from its first position.
    pub fn begin(&self, idx_num: usize) -> IndexIter<R> {
        let idx = { self.inner.read().indexes[idx_num].clone() };
        idx.begin()
    }

    pub fn find_by_primary_id(&self, id: u32) -> IndexIter<R> {
        self.find_by_index(0).append_u32(id).fire()
    }

    /// Finder over index `idx_num`; out-of-range numbers yield an
    /// at-end finder.
    pub fn find_by_index(&self, idx_num: usize) -> MdbFinder<R> {
        MdbFinder::new(self.get_index(idx_num))
    }

    /// Finder over the index registered for `fields`; unknown names
    /// yield an at-end finder.
    pub fn find_by_index_name(&self, fields: &str) -> MdbFinder<R> {
        MdbFinder::new(self.get_index_by_name(fields))
    }

    /// Search each secondary index, in definition order, for one whose
    /// fields structurally match the projection; the first match
    /// supplies the iterator.
    pub fn find_by_pb<P>(&self, pb: &P) -> Result<IndexIter<R>>
    where
        P: Projection<Rec = R>,
    {
        let indexes = { self.inner.read().indexes.clone() };
        let mut last_err: Option<Error> = None;
        for idx in indexes.iter().skip(1) {
            match idx.find_by_projection(pb) {
                Ok(iter) => return Ok(iter),
                Err(err) => last_err = Some(err),
            }
        }
        match last_err {
            Some(err) => Err(err),
            None => err_at!(IndexNotFound, msg: "no secondary index"),
        }
    }

    /// Scan the primary index for the first record satisfying `cond`.
    pub fn walk<F>(&self, mut cond: F) -> Option<Arc<R>>
    where
        F: FnMut(&R) -> bool,
    {
        let mut iter = self.begin(0);
        while let Some(obj) = iter.step() {
            if cond(&obj) {
                return Some(obj);
            }
        }
        None
    }

    /// Insert `obj`, assigning the next primary id and updating every
    /// index. False when a before-trigger vetoed the insert; an index
    /// failure is fatal.
    pub fn add(&self, obj: R, txn: Option<&mut Transaction>, reason: i32) -> bool {
        self.internal_add(obj, txn, reason, true)
    }

    /// Re-key `old` into `new` across every index. `old` must come from
    /// the table (zero id is a programmer error); `new` inherits its
    /// primary id.
    pub fn update(&self, old: &Arc<R>, new: R, txn: Option<&mut Transaction>, reason: i32) -> bool {
        self.internal_update(old, new, txn, reason, true)
    }

    /// Remove `obj` from every index. `obj` must come from the table.
    pub fn remove(&self, obj: &Arc<R>, txn: Option<&mut Transaction>, reason: i32) -> bool {
        self.internal_remove(obj, txn, reason, true)
    }

    /// Remove every record, one mutation per record.
    pub fn remove_all(&self, mut txn: Option<&mut Transaction>, reason: i32) {
        let victims: Vec<Arc<R>> = {
            let mut iter = self.begin(0);
            let mut victims = Vec::new();
            while let Some(obj) = iter.step() {
                victims.push(obj);
            }
            victims
        };
        for obj in victims.iter() {
            self.remove(obj, txn.as_deref_mut(), reason);
        }
    }

    /// Drop every index tree and start over. The id counter is not
    /// reset, see [reset_max_id][Table::reset_max_id].
    pub fn clear(&self) {
        let indexes = { self.inner.read().indexes.clone() };
        for idx in indexes.iter() {
            idx.clear();
        }
    }

    /// Restart primary-id assignment from 1.
    pub fn reset_max_id(&self) {
        self.inner.write().max_id = 1;
    }

    /// Register an action trigger; re-registering the same trigger moves
    /// it to the back, leaving exactly one registration.
    pub fn add_action_trigger(&self, t: Arc<dyn ActionTrigger<R>>) -> Arc<dyn ActionTrigger<R>> {
        self.remove_action_trigger(&t);
        self.inner.write().action_triggers.push(Arc::clone(&t));
        t
    }

    pub fn remove_action_trigger(&self, t: &Arc<dyn ActionTrigger<R>>) {
        let mut g = self.inner.write();
        if let Some(pos) = g.action_triggers.iter().position(|x| Arc::ptr_eq(x, t)) {
            g.action_triggers.remove(pos);
        }
    }

    /// Register a commit trigger, same de-duplication as action
    /// triggers.
    pub fn add_commit_trigger(&self, t: Arc<dyn CommitTrigger<R>>) -> Arc<dyn CommitTrigger<R>> {
        self.remove_commit_trigger(&t);
        self.inner.write().commit_triggers.push(Arc::clone(&t));
        t
    }

    pub fn remove_commit_trigger(&self, t: &Arc<dyn CommitTrigger<R>>) {
        let mut g = self.inner.write();
        if let Some(pos) = g.commit_triggers.iter().position(|x| Arc::ptr_eq(x, t)) {
            g.commit_triggers.remove(pos);
        }
    }

    /// Audit every index tree.
    pub fn validate(&self) -> Result<()> {
        let indexes = { self.inner.read().indexes.clone() };
        for idx in indexes.iter() {
            idx.validate()?;
        }
        Ok(())
    }

    fn internal_add(
        &self,
        mut obj: R,
        txn: Option<&mut Transaction>,
        reason: i32,
        notify: bool,
    ) -> bool {
        let (name, fid, max_id, indexes, atrg, ctrg) = self.snapshot();
        if max_id > i32::MAX as u32 {
            panic!("table [{}] add: record limit {} exceeded", name, max_id);
        }
        obj.set_id(max_id);
        let obj = Arc::new(obj);

        if notify {
            for t in atrg.iter() {
                if !t.before_add(fid, &obj, reason) {
                    return false;
                }
            }
        }

        let save_point_id = self.sync_save_points(&txn, &indexes);
        for idx in indexes.iter() {
            if let Err(err) = idx.add(&obj) {
                self.rollback_to(save_point_id);
                panic!("table [{}] index [{}] add failed: {}", name, idx.name(), err);
            }
        }

        match txn {
            None => {
                self.commit_indexes();
                if notify {
                    for t in atrg.iter() {
                        t.after_add(fid, &obj, reason);
                    }
                    for t in ctrg.iter() {
                        t.commit_add(fid, &obj, reason);
                    }
                }
            }
            Some(txn) => {
                let op = Op::Create(Arc::clone(&obj));
                let resource = DbResource::new(self.clone(), fid, op, obj.get_id(), save_point_id);
                txn.add_resource(Box::new(resource));
                if notify {
                    for t in atrg.iter() {
                        t.after_add(fid, &obj, reason);
                    }
                }
            }
        }
        self.inner.write().max_id += 1;
        true
    }

    fn internal_update(
        &self,
        old: &Arc<R>,
        mut new: R,
        txn: Option<&mut Transaction>,
        reason: i32,
        notify: bool,
    ) -> bool {
        let (name, fid, _, indexes, atrg, ctrg) = self.snapshot();
        if old.get_id() == 0 {
            panic!(
                "table [{}] update: record has no id, query it before updating",
                name
            );
        }
        new.set_id(old.get_id());
        let new = Arc::new(new);

        if notify {
            for t in atrg.iter() {
                if !t.before_update(fid, old, &new, reason) {
                    return false;
                }
            }
        }

        let save_point_id = self.sync_save_points(&txn, &indexes);
        for idx in indexes.iter() {
            if let Err(err) = idx.update(old, &new) {
                self.rollback_to(save_point_id);
                panic!(
                    "table [{}] index [{}] update failed: {}",
                    name,
                    idx.name(),
                    err
                );
            }
        }

        match txn {
            None => {
                self.commit_indexes();
                if notify {
                    for t in atrg.iter() {
                        t.after_update(fid, &new, reason);
                    }
                    for t in ctrg.iter() {
                        t.commit_update(fid, old, &new, reason);
                    }
                }
            }
            Some(txn) => {
                let op = Op::Update(Arc::clone(old), Arc::clone(&new));
                let resource = DbResource::new(self.clone(), fid, op, old.get_id(), save_point_id);
                txn.add_resource(Box::new(resource));
                if notify {
                    for t in atrg.iter() {
                        t.after_update(fid, &new, reason);
                    }
                }
            }
        }
        true
    }

    fn internal_remove(
        &self,
        obj: &Arc<R>,
        txn: Option<&mut Transaction>,
        reason: i32,
        notify: bool,
    ) -> bool {
        let (name, fid, _, indexes, atrg, ctrg) = self.snapshot();
        if obj.get_id() == 0 {
            panic!(
                "table [{}] remove: record has no id, query it before removing",
                name
            );
        }

        if notify {
            for t in atrg.iter() {
                if !t.before_remove(fid, obj, reason) {
                    return false;
                }
            }
        }

        let save_point_id = self.sync_save_points(&txn, &indexes);
        for idx in indexes.iter() {
            if let Err(err) = idx.delete(obj) {
                self.rollback_to(save_point_id);
                panic!(
                    "table [{}] index [{}] remove failed: {}",
                    name,
                    idx.name(),
                    err
                );
            }
        }

        match txn {
            None => {
                self.commit_indexes();
                if notify {
                    for t in ctrg.iter() {
                        t.commit_remove(fid, obj, reason);
                    }
                }
            }
            Some(txn) => {
                let op = Op::Delete(Arc::clone(obj));
                let resource = DbResource::new(self.clone(), fid, op, obj.get_id(), save_point_id);
                txn.add_resource(Box::new(resource));
            }
        }
        true
    }

    // Keep radix-level savepoint depth aligned with the transaction's;
    // the transaction may have advanced by exactly one savepoint since
    // the last mutation, any other divergence is fatal.
    fn sync_save_points(&self, txn: &Option<&mut Transaction>, indexes: &[Index<R>]) -> isize {
        match txn {
            None => -1,
            Some(txn) => {
                let sp = txn.last_save_point_id();
                let sp2 = indexes[0].last_save_point_id();
                if sp != sp2 {
                    if sp != sp2 + 1 {
                        panic!("savepoint depth out of sync: transaction {}, radix {}", sp, sp2);
                    }
                    for idx in indexes.iter() {
                        idx.alloc_save_point();
                    }
                }
                sp
            }
        }
    }

    pub(crate) fn commit_indexes(&self) {
        let indexes = { self.inner.read().indexes.clone() };
        if indexes[0].dirty() {
            for idx in indexes.iter() {
                idx.commit();
            }
        }
    }

    pub(crate) fn rollback_to(&self, save_point_id: isize) {
        let indexes = { self.inner.read().indexes.clone() };
        if indexes[0].dirty() {
            for idx in indexes.iter() {
                idx.rollback_to(save_point_id);
            }
        }
    }

    pub(crate) fn fire_commit_add(&self, obj: &R, reason: i32) {
        let (fid, ctrg) = self.commit_snapshot();
        for t in ctrg.iter() {
            t.commit_add(fid, obj, reason);
        }
    }

    pub(crate) fn fire_commit_update(&self, old: &R, new: &R, reason: i32) {
        let (fid, ctrg) = self.commit_snapshot();
        for t in ctrg.iter() {
            t.commit_update(fid, old, new, reason);
        }
    }

    pub(crate) fn fire_commit_remove(&self, obj: &R, reason: i32) {
        let (fid, ctrg) = self.commit_snapshot();
        for t in ctrg.iter() {
            t.commit_remove(fid, obj, reason);
        }
    }

    #[allow(clippy::type_complexity)]
    fn snapshot(
        &self,
    ) -> (
        String,
        u32,
        u32,
        Vec<Index<R>>,
        Vec<Arc<dyn ActionTrigger<R>>>,
        Vec<Arc<dyn CommitTrigger<R>>>,
    ) {
        let g = self.inner.read();
        (
            g.name.clone(),
            g.factory_id,
            g.max_id,
            g.indexes.clone(),
            g.action_triggers.clone(),
            g.commit_triggers.clone(),
        )
    }

    fn commit_snapshot(&self) -> (u32, Vec<Arc<dyn CommitTrigger<R>>>) {
        let g = self.inner.read();
        (g.factory_id, g.commit_triggers.clone())
    }

    #[cfg(test)]
    pub(crate) fn set_max_id(&self, max_id: u32) {
        self.inner.write().max_id = max_id;
    }
}

pub(crate) enum Op<R> {
    Create(Arc<R>),
    Update(Arc<R>, Arc<R>),
    Delete(Arc<R>),
    None,
}

impl<R> Op<R> {
    fn kind(&self) -> &'static str {
        match self {
            Op::Create(_) => "create",
            Op::Update(..) => "update",
            Op::Delete(_) => "delete",
            Op::None => "none",
        }
    }
}

/// One table mutation recorded under a transaction.
pub(crate) struct DbResource<R>
where
    R: Object,
{
    table: Table<R>,
    table_id: u32,
    op: Op<R>,
    rec_id: u32,
    save_point_id: isize,
    pos: usize,
}

impl<R> DbResource<R>
where
    R: Object,
{
    fn new(
        table: Table<R>,
        table_id: u32,
        op: Op<R>,
        rec_id: u32,
        save_point_id: isize,
    ) -> DbResource<R> {
        DbResource {
            table,
            table_id,
            op,
            rec_id,
            save_point_id,
            pos: 0,
        }
    }
}

impl<R> Resource for DbResource<R>
where
    R: Object,
{
    fn tag(&self) -> ResourceTag {
        ResourceTag::Database
    }

    fn id(&self) -> u32 {
        self.table_id
    }

    fn sub_id(&self) -> u32 {
        self.rec_id
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn is_control(&self) -> bool {
        matches!(self.op, Op::None)
    }

    fn commit(&mut self, reason: i32) {
        match &self.op {
            Op::Create(obj) => self.table.fire_commit_add(obj, reason),
            Op::Update(old, new) => self.table.fire_commit_update(old, new, reason),
            Op::Delete(obj) => self.table.fire_commit_remove(obj, reason),
            Op::None => {}
        }
        self.table.commit_indexes();
    }

    fn rollback(&mut self) {
        self.table.rollback_to(self.save_point_id);
    }

    fn free(&mut self) {}

    fn merge(&mut self, prior: &mut dyn Resource) -> MergeResult {
        let prior = match prior.as_any_mut().downcast_mut::<DbResource<R>>() {
            Some(prior) => prior,
            None => panic!("merging resources of different record types, call the programmer"),
        };

        enum Step<R> {
            Set(Op<R>),
            FailAll,
        }

        let step = match (&prior.op, &self.op) {
            // the record was deleted earlier, or never materialised;
            // a re-create stays its own entry
            (Op::Delete(_), Op::Create(_)) | (Op::None, Op::Create(_)) => Step::FailAll,
            // created in this transaction, keep it a create
            (Op::Create(_), Op::Update(_, new)) => Step::Set(Op::Create(Arc::clone(new))),
            (Op::Create(_), Op::Delete(_)) => Step::Set(Op::None),
            // fold updates, the oldest old with the newest new
            (Op::Update(old, _), Op::Update(_, new)) => {
                Step::Set(Op::Update(Arc::clone(old), Arc::clone(new)))
            }
            (Op::Update(old, _), Op::Delete(_)) => Step::Set(Op::Delete(Arc::clone(old))),
            (p, n) => panic!(
                "impossible resource merge {} after {}, call the programmer",
                n.kind(),
                p.kind()
            ),
        };

        match step {
            Step::FailAll => MergeResult::FailAll,
            Step::Set(op) => {
                prior.op = op;
                MergeResult::Ok
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
#[path = "table_test.rs"]
pub(crate) mod table_test;
