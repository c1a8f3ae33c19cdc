//! Entity introspection and hydration.
//!
//! The persistence core never reflects over arbitrary objects. Each entity
//! kind implements `Entity` to expose its role, its primary-key column, a
//! column extractor, and a row hydrator. Everything the mapper and the lazy
//! reference machinery do flows through this capability.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// A mapping from column name to value.
///
/// Ordered so command payloads iterate deterministically.
pub type ColumnMap = BTreeMap<&'static str, Value>;

/// Build a `ColumnMap` from (column, value) pairs.
///
/// Convenience for entity implementations and tests:
///
/// ```
/// use entmap_core::{columns, Value};
///
/// let map = columns([("id", Value::Int(1)), ("email", Value::from("a@b.c"))]);
/// assert_eq!(map.get("id"), Some(&Value::Int(1)));
/// ```
pub fn columns<I>(pairs: I) -> ColumnMap
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    pairs.into_iter().collect()
}

/// Trait for types the persistence core can store and hydrate.
///
/// Typically implemented per concrete entity kind; the core itself only
/// calls these methods and never inspects entity internals.
pub trait Entity: Sized + 'static {
    /// The entity role (table-level identity within the ORM).
    const ROLE: &'static str;

    /// The primary key column name.
    const PRIMARY_KEY: &'static str;

    /// Extract the entity's current column values.
    ///
    /// Returns an error when the entity is malformed; the mapper propagates
    /// this as a command build failure.
    fn fetch_columns(&self) -> Result<ColumnMap>;

    /// Construct an instance from a row of raw column data.
    fn from_row(row: &Row) -> Result<Self>;
}
