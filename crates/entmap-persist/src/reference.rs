//! Lazy references to related entities.
//!
//! A `Reference<E>` stands in for a related entity that has not been loaded
//! yet. It carries the target role and a scope (typically a primary-key
//! filter) and resolves on first access by issuing exactly one query through
//! the external `Select` capability. A successful resolution is memoized:
//! every later access returns the cached value without touching the
//! database. A failed resolution leaves the reference unresolved so the
//! caller may retry.
//!
//! Resolution is independent of the write path and may happen at any point
//! after hydration. Assigning a value directly bypasses resolution entirely.

use std::cell::OnceCell;
use std::fmt;

use entmap_core::{
    ColumnMap, Entity, Error, ResolveError, ResolveErrorKind, Result, Select, Value, columns,
};

/// A deferred handle to a related entity of role `E::ROLE`.
///
/// Two states: unresolved (role + scope, no query issued yet) and resolved
/// (memoized value, possibly none for nullable references). The transition
/// happens at most once.
pub struct Reference<E: Entity> {
    scope: ColumnMap,
    nullable: bool,
    cell: OnceCell<Option<E>>,
}

impl<E: Entity> Reference<E> {
    /// Create an unresolved, non-nullable reference with the given scope.
    ///
    /// Resolving against zero rows is a referential-integrity violation.
    pub fn new(scope: ColumnMap) -> Self {
        Self {
            scope,
            nullable: false,
            cell: OnceCell::new(),
        }
    }

    /// Create an unresolved, nullable reference with the given scope.
    ///
    /// Resolving against zero rows memoizes `None`.
    pub fn nullable(scope: ColumnMap) -> Self {
        Self {
            scope,
            nullable: true,
            cell: OnceCell::new(),
        }
    }

    /// Create an unresolved reference scoped by primary-key equality.
    pub fn by_key(key: impl Into<Value>) -> Self {
        Self::new(columns([(E::PRIMARY_KEY, key.into())]))
    }

    /// Create a reference already holding a loaded entity (no query ever).
    pub fn loaded(value: E) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(Some(value));
        Self {
            scope: ColumnMap::new(),
            nullable: false,
            cell,
        }
    }

    /// Create a reference resolved to nothing (no query ever).
    pub fn empty() -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(None);
        Self {
            scope: ColumnMap::new(),
            nullable: true,
            cell,
        }
    }

    /// The target role.
    pub fn role(&self) -> &'static str {
        E::ROLE
    }

    /// The row-identifying scope.
    pub fn scope(&self) -> &ColumnMap {
        &self.scope
    }

    /// Has the reference been resolved (including resolved-to-none)?
    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The resolved value, if resolution already happened.
    pub fn get(&self) -> Option<&E> {
        self.cell.get().and_then(|v| v.as_ref())
    }

    /// Resolve the reference, issuing at most one query.
    ///
    /// Already resolved: returns the memoized value, zero queries.
    /// Unresolved: fetches at most one row scoped by `scope`, hydrates it
    /// via `E::from_row`, memoizes, and returns it. Zero rows resolve a
    /// nullable reference to `None`; for a non-nullable reference they are
    /// a referential-integrity violation and the reference stays
    /// unresolved so the caller may retry.
    pub fn resolve(&self, selector: &dyn Select) -> Result<Option<&E>> {
        if let Some(value) = self.cell.get() {
            return Ok(value.as_ref());
        }

        tracing::debug!(role = E::ROLE, "resolving lazy reference");
        let row = selector.fetch_one(E::ROLE, &self.scope)?;

        let value = match row {
            Some(row) => Some(E::from_row(&row).map_err(|e| {
                Error::Resolve(ResolveError {
                    kind: ResolveErrorKind::Hydration,
                    role: E::ROLE,
                    message: e.to_string(),
                })
            })?),
            None if self.nullable => None,
            None => {
                return Err(Error::Resolve(ResolveError {
                    kind: ResolveErrorKind::NotFound,
                    role: E::ROLE,
                    message: format!("scope {:?}", self.scope),
                }));
            }
        };

        Ok(self.cell.get_or_init(|| value).as_ref())
    }

    /// Replace the reference with a value directly, bypassing resolution.
    ///
    /// No query is ever issued for a reference set this way.
    pub fn set(&mut self, value: Option<E>) {
        let cell = OnceCell::new();
        let _ = cell.set(value);
        self.cell = cell;
    }
}

impl<E: Entity + fmt::Debug> fmt::Debug for Reference<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_resolved() {
            "resolved"
        } else {
            "unresolved"
        };

        f.debug_struct("Reference")
            .field("role", &E::ROLE)
            .field("state", &state)
            .field("scope", &self.scope)
            .field("value", &self.get())
            .finish()
    }
}
