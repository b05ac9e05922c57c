//! Package implement an embedded, in-memory, multi-indexed table store
//! with nested-savepoint transactions.
//!
//! Records are arbitrary values carrying a monotonically assigned 32-bit
//! primary identifier, refer [Object]. A [Table] keeps one persistent
//! radix tree per index, refer [iradix], and every mutation maintains all
//! of the table's indexes atomically. Typed keys are encoded into
//! order-preserving byte strings by [MdbKey], so that byte-lexicographic
//! order in the tree coincides with the natural order of the indexed
//! fields.
//!
//! Mutations can be grouped under a [Transaction]. Within a transaction,
//! compensating operations on the same record collapse pairwise (a create
//! followed by a delete is a no-op at commit), and [SavePoint] handles
//! allow partial rollback. Commit triggers fire exactly once per logical
//! change that survives the collapse.
//!
//! The store is single-writer. Readers iterate snapshots: while an
//! iterator holds the reader lock, refer [IndexIter::lock_db], concurrent
//! mutations copy nodes instead of editing them in place, so the iterator
//! keeps seeing the pre-mutation tree.
//!
//! **Error handling**: programmer errors terminate the process via panic,
//! operational errors are returned as [Error] values. Lookups report
//! absence as `None` or an at-end iterator, never as an error.

use std::{error, fmt, result};

/// Short form to compose Error values.
///
/// Macro expanded to `Err(Error)`, for the specified variant, tagging it
/// with the `file:line-no` where the error happened.
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err(Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(v) => Ok(v),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err(Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
}

mod spinlock;

pub mod iradix;

mod finder;
mod index;
mod iter;
mod key;
mod table;
mod trigger;
mod txn;
mod types;

pub use crate::finder::MdbFinder;
pub use crate::index::{Index, MakeKeyFn};
pub use crate::iter::IndexIter;
pub use crate::key::{MdbKey, Scalar, ToScalar};
pub use crate::spinlock::{ReadGuard, Spinlock, WriteGuard};
pub use crate::table::Table;
pub use crate::trigger::{ActionHooks, ActionTrigger, CommitHooks, CommitTrigger};
pub use crate::txn::{SavePoint, Transaction};
pub use crate::types::{Object, Projection};

/// Type alias for Result returned by functions of this package.
pub type Result<T> = result::Result<T, Error>;

/// Error variants that can be returned by this package's API.
///
/// Each variant carries a prefix, typically the `file:line-no` where the
/// error originated.
#[derive(Clone)]
pub enum Error {
    /// Internal invariant failed, call the programmer.
    Fatal(String, String),
    /// Key encoding rejected, too many fields or over-long encoding.
    InvalidKey(String, String),
    /// Insert into a unique index hit an existing entry.
    IndexCollision(String, String),
    /// Update could not locate the entry for the old key.
    StaleIndex(String, String),
    /// Projection fields do not line up with the index fields.
    FieldMismatch(String, String),
    /// No secondary index matched the projection.
    IndexNotFound(String, String),
    /// Lookup missed.
    KeyNotFound(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            Fatal(p, m) => write!(f, "{} Fatal: {}", p, m),
            InvalidKey(p, m) => write!(f, "{} InvalidKey: {}", p, m),
            IndexCollision(p, m) => write!(f, "{} IndexCollision: {}", p, m),
            StaleIndex(p, m) => write!(f, "{} StaleIndex: {}", p, m),
            FieldMismatch(p, m) => write!(f, "{} FieldMismatch: {}", p, m),
            IndexNotFound(p, m) => write!(f, "{} IndexNotFound: {}", p, m),
            KeyNotFound(p, m) => write!(f, "{} KeyNotFound: {}", p, m),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl error::Error for Error {}
