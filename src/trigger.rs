//! Action and commit triggers.
//!
//! Action triggers surround each operation: the `before_*` hooks may
//! abort it by returning false, the `after_*` hooks observe it.
//! Commit triggers fire once per logical change: immediately for
//! transaction-less mutations, at commit time for transactional ones,
//! after compensating operations have collapsed.

use crate::types::Object;

/// Pre/post hooks around table operations. `fid` is the owning table's
/// factory id.
pub trait ActionTrigger<R>
where
    R: Object,
{
    fn before_add(&self, _fid: u32, _obj: &R, _reason: i32) -> bool {
        true
    }

    fn after_add(&self, _fid: u32, _obj: &R, _reason: i32) {}

    fn before_update(&self, _fid: u32, _old: &R, _new: &R, _reason: i32) -> bool {
        true
    }

    fn after_update(&self, _fid: u32, _obj: &R, _reason: i32) {}

    fn before_remove(&self, _fid: u32, _obj: &R, _reason: i32) -> bool {
        true
    }
}

/// Hooks fired for changes that survive a transaction's merge pass.
/// Commit triggers cannot abort.
pub trait CommitTrigger<R>
where
    R: Object,
{
    fn commit_add(&self, _fid: u32, _obj: &R, _reason: i32) {}

    fn commit_update(&self, _fid: u32, _old: &R, _new: &R, _reason: i32) {}

    fn commit_remove(&self, _fid: u32, _obj: &R, _reason: i32) {}
}

/// Closure-based [ActionTrigger], unset hooks default to pass-through.
pub struct ActionHooks<R> {
    pub before_add: Option<Box<dyn Fn(u32, &R, i32) -> bool>>,
    pub after_add: Option<Box<dyn Fn(u32, &R, i32)>>,
    pub before_update: Option<Box<dyn Fn(u32, &R, &R, i32) -> bool>>,
    pub after_update: Option<Box<dyn Fn(u32, &R, i32)>>,
    pub before_remove: Option<Box<dyn Fn(u32, &R, i32) -> bool>>,
}

impl<R> Default for ActionHooks<R> {
    fn default() -> Self {
        ActionHooks {
            before_add: None,
            after_add: None,
            before_update: None,
            after_update: None,
            before_remove: None,
        }
    }
}

impl<R> ActionTrigger<R> for ActionHooks<R>
where
    R: Object,
{
    fn before_add(&self, fid: u32, obj: &R, reason: i32) -> bool {
        match &self.before_add {
            Some(f) => f(fid, obj, reason),
            None => true,
        }
    }

    fn after_add(&self, fid: u32, obj: &R, reason: i32) {
        if let Some(f) = &self.after_add {
            f(fid, obj, reason);
        }
    }

    fn before_update(&self, fid: u32, old: &R, new: &R, reason: i32) -> bool {
        match &self.before_update {
            Some(f) => f(fid, old, new, reason),
            None => true,
        }
    }

    fn after_update(&self, fid: u32, obj: &R, reason: i32) {
        if let Some(f) = &self.after_update {
            f(fid, obj, reason);
        }
    }

    fn before_remove(&self, fid: u32, obj: &R, reason: i32) -> bool {
        match &self.before_remove {
            Some(f) => f(fid, obj, reason),
            None => true,
        }
    }
}

/// Closure-based [CommitTrigger], unset hooks are no-ops.
pub struct CommitHooks<R> {
    pub add: Option<Box<dyn Fn(u32, &R, i32)>>,
    pub update: Option<Box<dyn Fn(u32, &R, &R, i32)>>,
    pub remove: Option<Box<dyn Fn(u32, &R, i32)>>,
}

impl<R> Default for CommitHooks<R> {
    fn default() -> Self {
        CommitHooks {
            add: None,
            update: None,
            remove: None,
        }
    }
}

impl<R> CommitTrigger<R> for CommitHooks<R>
where
    R: Object,
{
    fn commit_add(&self, fid: u32, obj: &R, reason: i32) {
        if let Some(f) = &self.add {
            f(fid, obj, reason);
        }
    }

    fn commit_update(&self, fid: u32, old: &R, new: &R, reason: i32) {
        if let Some(f) = &self.update {
            f(fid, old, new, reason);
        }
    }

    fn commit_remove(&self, fid: u32, obj: &R, reason: i32) {
        if let Some(f) = &self.remove {
            f(fid, obj, reason);
        }
    }
}
