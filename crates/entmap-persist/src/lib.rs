//! Persistence core for entmap.
//!
//! This crate turns in-memory entity changes into an ordered graph of
//! deferred write commands:
//!
//! - `EntityState` tracks each entity's persistence status, last-synced
//!   column snapshot, and live command.
//! - `Command` / `Write` / `Split` model deferred inserts, updates, and
//!   deletes; forward links propagate runtime-produced values (generated
//!   primary keys) into dependent commands and state before they execute.
//! - `Mapper` classifies entities, diffs columns, builds commands, and
//!   wires the links.
//! - `Reference` defers loading a related entity until first access and
//!   resolves with at most one query.
//!
//! Execution is external: an orchestrator dispatches commands in creation
//! order, calling `complete` after each so forward links fan out; the same
//! orchestrator owns transactions and rollback.

pub mod command;
pub mod mapper;
pub mod reference;
pub mod state;

pub use command::{
    Command, CommandRef, CommandStatus, Consumer, ForwardLink, LinkKind, Split, Write,
};
pub use mapper::Mapper;
pub use reference::Reference;
pub use state::{EntityState, StateRef, Status};
