//! Entity mapper persistence core.
//!
//! entmap translates in-memory entity state changes into an ordered graph of
//! deferred database write commands, tracks each entity's synchronization
//! state, and defers related-entity loading behind lazy references that
//! resolve with at most one query.
//!
//! The crate is the persistence core only: SQL generation, drivers, schema
//! metadata, and the transaction/session loop are external collaborators
//! consumed through the narrow capability traits in `entmap-core`.
//!
//! # Example
//!
//! ```
//! use entmap::{
//!     ColumnMap, Entity, EntityState, Mapper, Result, Row, Status, TableSource, Value, columns,
//! };
//!
//! struct Team {
//!     id: Option<i64>,
//!     name: String,
//! }
//!
//! impl Entity for Team {
//!     const ROLE: &'static str = "team";
//!     const PRIMARY_KEY: &'static str = "id";
//!
//!     fn fetch_columns(&self) -> Result<ColumnMap> {
//!         Ok(columns([
//!             ("id", self.id.map_or(Value::Null, Value::Int)),
//!             ("name", Value::Text(self.name.clone())),
//!         ]))
//!     }
//!
//!     fn from_row(row: &Row) -> Result<Self> {
//!         Ok(Self {
//!             id: row.get_as("id")?,
//!             name: row.get_as("name")?,
//!         })
//!     }
//! }
//!
//! let mapper = Mapper::<Team>::new(TableSource::new("default", "teams"));
//! let state = EntityState::new(Status::New, "id").into_ref();
//!
//! let team = Team { id: None, name: "Avengers".to_string() };
//! let insert = mapper.queue_store(&team, &state).unwrap();
//!
//! // The executor dispatches the command; the generated key flows back.
//! insert.borrow_mut().complete(Some(Value::Int(1))).unwrap();
//! assert_eq!(state.borrow().key(), Some(&Value::Int(1)));
//! ```

pub use entmap_core::{
    ColumnMap, Columns, ConfigError, Entity, Error, FromValue, KeyGenerator, LinkError,
    MappingError, ResolveError, ResolveErrorKind, Result, Row, Select, Source, SourceProvider,
    SourceRegistry, TableSource, TypeError, Typecast, Value, columns,
};
pub use entmap_persist::{
    Command, CommandRef, CommandStatus, Consumer, EntityState, ForwardLink, LinkKind, Mapper,
    Reference, Split, StateRef, Status, Write,
};
