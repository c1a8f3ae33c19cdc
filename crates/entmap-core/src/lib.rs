//! Core types and capability traits for the entmap persistence core.
//!
//! This crate provides the foundational abstractions the persistence layer
//! builds on:
//!
//! - `Value` for dynamic, `==`-diffable column values
//! - `Row` for query rows with shared column metadata
//! - `Entity` for per-kind introspection and hydration
//! - `Source` / `SourceProvider` / `Typecast` / `Select` / `KeyGenerator`,
//!   the narrow collaborator interfaces the core consumes
//! - the error taxonomy shared across the workspace

pub mod entity;
pub mod error;
pub mod row;
pub mod source;
pub mod value;

pub use entity::{ColumnMap, Entity, columns};
pub use error::{
    ConfigError, Error, LinkError, MappingError, ResolveError, ResolveErrorKind, Result, TypeError,
};
pub use row::{Columns, FromValue, Row};
pub use source::{KeyGenerator, Select, Source, SourceProvider, SourceRegistry, TableSource, Typecast};
pub use value::Value;
