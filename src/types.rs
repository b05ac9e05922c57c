//! Record and projection contracts.

use crate::key::Scalar;

/// Contract for values stored in a [Table][crate::Table].
///
/// A record exposes its 32-bit primary identifier, assigned by the table
/// on insertion, monotonically increasing from 1 and never reused within
/// the table's lifetime. `field_names` lists the record's indexable
/// column names, the primary-id column first; index registration
/// validates its pipe-delimited field list against them.
pub trait Object: Clone + 'static {
    fn get_id(&self) -> u32;

    fn set_id(&mut self, id: u32);

    fn field_names() -> &'static [&'static str];
}

/// Partial-match companion of a record type.
///
/// Structurally the record with every indexable field optional. A lookup
/// through [Table::find_by_pb][crate::Table::find_by_pb] matches the
/// projection's present leading fields against each secondary index:
/// `field` returns `None` for an absent field, which truncates the key
/// prefix there (the first index field must be present);
/// `has_field` reports whether the projection has the named field at all,
/// a miss disqualifies the index. Non-optional projection fields are
/// always present.
pub trait Projection {
    type Rec: Object;

    fn has_field(name: &str) -> bool;

    fn field(&self, name: &str) -> Option<Scalar>;

    /// Copy a record field-for-field into a projection with every
    /// optional present.
    fn from_record(rec: &Self::Rec) -> Self;

    /// Copy the projection into a record, absent fields default.
    fn to_record(&self) -> Self::Rec;
}
