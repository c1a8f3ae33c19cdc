//! Capability interfaces consumed by the persistence core.
//!
//! The core takes the narrow view of its collaborators: a `Source` names the
//! database and table a command is addressed to, `Typecast` normalizes column
//! values before they enter a payload, `Select` fetches at most one row for a
//! lazy reference, and `KeyGenerator` optionally supplies primary keys ahead
//! of insertion. Concrete implementations (drivers, schema registries,
//! repositories) live outside this workspace.

use std::collections::HashMap;

use crate::entity::ColumnMap;
use crate::error::{Error, Result};
use crate::row::Row;
use crate::value::Value;

/// Where a command is addressed: database handle plus table name, with
/// optional named constraints for default query scoping.
pub trait Source: std::fmt::Debug {
    /// Opaque database identifier (connection name, shard, ...).
    fn database(&self) -> &str;

    /// Table name within the database.
    fn table(&self) -> &str;

    /// Look up a named default scope constraint.
    fn constrain(&self, name: &str) -> Option<&ColumnMap>;
}

/// Plain `Source` implementation backed by owned strings.
#[derive(Debug, Clone, Default)]
pub struct TableSource {
    database: String,
    table: String,
    constrains: HashMap<String, ColumnMap>,
}

impl TableSource {
    /// Create a source for the given database and table.
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            constrains: HashMap::new(),
        }
    }

    /// Attach a named constraint (builder pattern).
    #[must_use]
    pub fn with_constrain(mut self, name: impl Into<String>, scope: ColumnMap) -> Self {
        self.constrains.insert(name.into(), scope);
        self
    }
}

impl Source for TableSource {
    fn database(&self) -> &str {
        &self.database
    }

    fn table(&self) -> &str {
        &self.table
    }

    fn constrain(&self, name: &str) -> Option<&ColumnMap> {
        self.constrains.get(name)
    }
}

/// Factory resolving a role name to its source.
///
/// A host that cannot provide a source for a requested role is
/// misconfigured; mapper construction fails fast with `Error::Config`.
pub trait SourceProvider {
    /// Resolve the source for a role.
    fn source(&self, role: &str) -> Result<Box<dyn Source>>;
}

/// Simple role-to-source registry.
#[derive(Default)]
pub struct SourceRegistry {
    sources: HashMap<String, TableSource>,
}

impl SourceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a role's source (builder pattern).
    #[must_use]
    pub fn with(mut self, role: impl Into<String>, source: TableSource) -> Self {
        self.sources.insert(role.into(), source);
        self
    }
}

impl SourceProvider for SourceRegistry {
    fn source(&self, role: &str) -> Result<Box<dyn Source>> {
        self.sources
            .get(role)
            .cloned()
            .map(|s| Box::new(s) as Box<dyn Source>)
            .ok_or_else(|| Error::config(format!("no source registered for role '{}'", role)))
    }
}

/// Column value normalization applied before commands are built.
///
/// Absence of a typecast means pass-through.
pub trait Typecast {
    /// Cast entity columns into database-ready values.
    fn cast(&self, columns: ColumnMap, database: &str) -> Result<ColumnMap>;
}

/// The selection capability consumed by lazy references: fetch at most one
/// row of raw column data for a role, filtered by a scope.
pub trait Select {
    /// Run the scoped query and return the row, if any.
    fn fetch_one(&self, role: &str, scope: &ColumnMap) -> Result<Option<Row>>;
}

/// Optional primary-key generation ahead of insertion.
///
/// Returning `None` defers to database autoincrement, which is also the
/// behavior when no generator is configured at all.
pub trait KeyGenerator {
    /// Produce the next primary key, or `None` to rely on autoincrement.
    fn next_key(&self) -> Option<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::columns;

    #[test]
    fn table_source_exposes_target() {
        let source = TableSource::new("default", "users");
        assert_eq!(source.database(), "default");
        assert_eq!(source.table(), "users");
        assert_eq!(source.constrain("active"), None);
    }

    #[test]
    fn named_constrains_resolve() {
        let scope = columns([("deleted", Value::Bool(false))]);
        let source = TableSource::new("default", "users").with_constrain("active", scope.clone());
        assert_eq!(source.constrain("active"), Some(&scope));
    }

    #[test]
    fn registry_resolves_known_roles() {
        let registry = SourceRegistry::new().with("user", TableSource::new("default", "users"));
        let source = registry.source("user").unwrap();
        assert_eq!(source.table(), "users");
    }

    #[test]
    fn registry_missing_role_is_config_error() {
        let registry = SourceRegistry::new();
        let err = registry.source("ghost").unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("ghost"));
    }
}
