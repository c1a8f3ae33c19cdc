//! Deferred write commands and the forward-link protocol.
//!
//! A `Command` is a unit of deferred database work addressed to a database
//! and table. Commands carry a column payload, a scope (the WHERE identity
//! for updates and deletes), and forward links: typed descriptors that push
//! a value this command produces at execution time (typically a generated
//! primary key) into another command or an entity state.
//!
//! Ordering is expressed purely through the links. A command with an
//! unresolved required scope column is blocked; the push that supplies the
//! column flips it to ready. No command inspects another's internals, only
//! declared outputs, and the external executor is responsible for
//! dispatching commands so that producers run first.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use entmap_core::{ColumnMap, Error, Result, Value};

use crate::state::{EntityState, StateRef};

/// Shared handle to a command.
pub type CommandRef = Rc<RefCell<Command>>;

/// Observable lifecycle of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Created with no declared scope requirements; ready immediately.
    Pending,
    /// At least one required scope column has not been supplied yet.
    Blocked,
    /// Every required scope column has been supplied.
    Ready,
    /// Dispatched by the executor; forward links have fanned out.
    Executed,
    /// Marked failed by the executor.
    Failed,
}

/// Where a forwarded value lands on the consumer side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Written into the consumer's column payload.
    Payload,
    /// Written into the consumer's scope (WHERE identity); clears the
    /// matching required-scope wait.
    Scope,
}

/// The closed set of forward-link targets.
///
/// Targets are held weakly: commands are owned by the executor's dispatch
/// list and states by the heap, so a dropped target means the orchestrator
/// broke the unit-of-work lifetime invariant. Delivery then fails fast.
#[derive(Debug, Clone)]
pub enum Consumer {
    /// Another command's payload or scope.
    Command(Weak<RefCell<Command>>),
    /// An entity state field.
    State(Weak<RefCell<EntityState>>),
}

impl Consumer {
    /// Target a command cell.
    pub fn command(target: &CommandRef) -> Self {
        Consumer::Command(Rc::downgrade(target))
    }

    /// Target an entity state cell.
    pub fn state(target: &StateRef) -> Self {
        Consumer::State(Rc::downgrade(target))
    }

    /// Push a produced value into the target.
    pub fn accept(&self, field: &'static str, value: Value, kind: LinkKind) -> Result<()> {
        match self {
            Consumer::Command(weak) => {
                let cell = weak
                    .upgrade()
                    .ok_or_else(|| Error::link(field, "target command dropped before delivery"))?;
                cell.borrow_mut().accept(field, value, kind)
            }
            Consumer::State(weak) => {
                let cell = weak
                    .upgrade()
                    .ok_or_else(|| Error::link(field, "target state dropped before delivery"))?;
                cell.borrow_mut().register(field, value)
            }
        }
    }
}

/// A typed forward-link descriptor.
#[derive(Debug, Clone)]
pub struct ForwardLink {
    /// Column on the producer whose value is forwarded.
    pub source: &'static str,
    /// The consumer receiving the value.
    pub target: Consumer,
    /// Column the value lands in on the consumer.
    pub target_field: &'static str,
    /// Payload or scope delivery.
    pub kind: LinkKind,
}

impl ForwardLink {
    /// Create a forward link.
    pub fn new(
        source: &'static str,
        target: Consumer,
        target_field: &'static str,
        kind: LinkKind,
    ) -> Self {
        Self {
            source,
            target,
            target_field,
            kind,
        }
    }
}

/// A single deferred write: target, payload, scope, waits, and links.
#[derive(Debug)]
pub struct Write {
    database: String,
    table: String,
    payload: ColumnMap,
    scope: ColumnMap,
    waiting: BTreeSet<&'static str>,
    links: Vec<ForwardLink>,
    /// Column whose value the database generates at execution time.
    generated_column: Option<&'static str>,
    generated: Option<Value>,
    status: CommandStatus,
}

impl Write {
    /// Create a write addressed to a database and table.
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            payload: ColumnMap::new(),
            scope: ColumnMap::new(),
            waiting: BTreeSet::new(),
            links: Vec::new(),
            generated_column: None,
            generated: None,
            status: CommandStatus::Pending,
        }
    }

    /// The database this write is addressed to.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// The table this write is addressed to.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The column payload.
    pub fn payload(&self) -> &ColumnMap {
        &self.payload
    }

    /// Replace the column payload.
    pub fn set_payload(&mut self, payload: ColumnMap) {
        self.payload = payload;
    }

    /// The scope (WHERE identity) columns.
    pub fn scope(&self) -> &ColumnMap {
        &self.scope
    }

    /// Current status.
    pub fn status(&self) -> CommandStatus {
        self.status
    }

    /// Can the executor dispatch this command now?
    pub fn is_ready(&self) -> bool {
        self.waiting.is_empty()
            && matches!(self.status, CommandStatus::Pending | CommandStatus::Ready)
    }

    /// Is this command still waiting on the given scope column?
    pub fn waits_on(&self, column: &'static str) -> bool {
        self.waiting.contains(column)
    }

    /// Declare a required scope column; the command blocks until it arrives.
    pub fn wait_scope(&mut self, column: &'static str) {
        self.waiting.insert(column);
        if matches!(self.status, CommandStatus::Pending | CommandStatus::Ready) {
            self.status = CommandStatus::Blocked;
        }
    }

    /// Mark the column whose value the database generates on execution.
    pub fn produces(&mut self, column: &'static str) {
        self.generated_column = Some(column);
    }

    /// The value captured from the database at execution time, if any.
    pub fn generated(&self) -> Option<&Value> {
        self.generated.as_ref()
    }

    /// Register a forward link to fan out after execution.
    pub fn forward(&mut self, link: ForwardLink) -> Result<()> {
        if matches!(self.status, CommandStatus::Executed | CommandStatus::Failed) {
            return Err(Error::link(
                link.source,
                "cannot register a forward on a finished command",
            ));
        }
        self.links.push(link);
        Ok(())
    }

    /// Receive a value pushed by an upstream producer.
    pub fn accept(&mut self, field: &'static str, value: Value, kind: LinkKind) -> Result<()> {
        if matches!(self.status, CommandStatus::Executed | CommandStatus::Failed) {
            return Err(Error::link(field, "value delivered to a finished command"));
        }
        match kind {
            LinkKind::Payload => {
                self.payload.insert(field, value);
            }
            LinkKind::Scope => {
                self.scope.insert(field, value);
                self.waiting.remove(field);
                if self.waiting.is_empty() && self.status == CommandStatus::Blocked {
                    self.status = CommandStatus::Ready;
                }
            }
        }
        Ok(())
    }

    /// Mark executed and fan out forward links.
    ///
    /// `generated` is the value the database produced for the generated
    /// column (e.g. an autoincrement id), if any. Each link forwards the
    /// payload value for its source column, falling back to the generated
    /// value when the source is the generated column.
    pub fn complete(&mut self, generated: Option<Value>) -> Result<()> {
        match self.status {
            CommandStatus::Executed => {
                return Err(Error::link(
                    self.table.clone(),
                    "command completed twice; the executor must dispatch each command once",
                ));
            }
            CommandStatus::Failed => {
                return Err(Error::link(self.table.clone(), "command completed after failure"));
            }
            CommandStatus::Blocked => {
                let missing = self.waiting.iter().next().copied().unwrap_or("");
                return Err(Error::link(
                    missing,
                    "command executed before its required scope was supplied",
                ));
            }
            CommandStatus::Pending | CommandStatus::Ready => {}
        }

        self.generated = generated;
        self.status = CommandStatus::Executed;

        tracing::debug!(
            table = %self.table,
            links = self.links.len(),
            "command executed; fanning out forward links"
        );

        for link in &self.links {
            let value = self
                .payload
                .get(link.source)
                .cloned()
                .or_else(|| {
                    if self.generated_column == Some(link.source) {
                        self.generated.clone()
                    } else {
                        None
                    }
                })
                .ok_or_else(|| Error::link(link.source, "no produced value for forward link"))?;
            link.target.accept(link.target_field, value, link.kind)?;
        }
        Ok(())
    }

    /// Mark failed.
    pub fn fail(&mut self) {
        self.status = CommandStatus::Failed;
    }
}

/// Composite of two dependent writes against the same entity.
///
/// Externally one dependency-ordered unit; the executor dispatches the
/// branches in sequence (`first`, then `second`).
#[derive(Debug)]
pub struct Split {
    first: CommandRef,
    second: CommandRef,
}

impl Split {
    /// Wrap two commands into one ordered unit.
    pub fn new(first: CommandRef, second: CommandRef) -> Self {
        Self { first, second }
    }

    /// The leading command.
    pub fn first(&self) -> CommandRef {
        self.first.clone()
    }

    /// The continuation command.
    pub fn second(&self) -> CommandRef {
        self.second.clone()
    }

    /// Derived status of the composite.
    ///
    /// Failed if either branch failed, executed once both are, otherwise the
    /// status of the first unexecuted branch.
    pub fn status(&self) -> CommandStatus {
        let first = self.first.borrow().status();
        let second = self.second.borrow().status();
        if first == CommandStatus::Failed || second == CommandStatus::Failed {
            CommandStatus::Failed
        } else if first == CommandStatus::Executed && second == CommandStatus::Executed {
            CommandStatus::Executed
        } else if first != CommandStatus::Executed {
            first
        } else {
            second
        }
    }

    /// The composite is ready when its next-in-line branch is.
    pub fn is_ready(&self) -> bool {
        if self.first.borrow().status() == CommandStatus::Executed {
            self.second.borrow().is_ready()
        } else {
            self.first.borrow().is_ready()
        }
    }

    /// Does either branch wait on the column?
    pub fn waits_on(&self, column: &'static str) -> bool {
        self.first.borrow().waits_on(column) || self.second.borrow().waits_on(column)
    }

    /// Route a pushed value to the branch that consumes it.
    pub fn accept(&self, field: &'static str, value: Value, kind: LinkKind) -> Result<()> {
        match kind {
            LinkKind::Scope => {
                if self.first.borrow().waits_on(field) {
                    self.first.borrow_mut().accept(field, value, kind)
                } else if self.second.borrow().waits_on(field) {
                    self.second.borrow_mut().accept(field, value, kind)
                } else {
                    Err(Error::link(field, "no branch waits on this scope column"))
                }
            }
            LinkKind::Payload => {
                if self.first.borrow().status() != CommandStatus::Executed {
                    self.first.borrow_mut().accept(field, value, kind)
                } else if self.second.borrow().status() != CommandStatus::Executed {
                    self.second.borrow_mut().accept(field, value, kind)
                } else {
                    Err(Error::link(field, "both branches already executed"))
                }
            }
        }
    }
}

/// A deferred write operation, or a composite of two.
#[derive(Debug)]
pub enum Command {
    /// Insert a new row.
    Insert(Write),
    /// Update an existing row (scoped by primary key).
    Update(Write),
    /// Delete an existing row (scoped by primary key).
    Delete(Write),
    /// Two dependent writes against the same entity.
    Split(Split),
}

impl Command {
    /// Wrap a command into a shared handle.
    pub fn into_ref(self) -> CommandRef {
        Rc::new(RefCell::new(self))
    }

    /// Current status.
    pub fn status(&self) -> CommandStatus {
        match self {
            Command::Insert(w) | Command::Update(w) | Command::Delete(w) => w.status(),
            Command::Split(s) => s.status(),
        }
    }

    /// Can the executor dispatch this command (or its next branch) now?
    pub fn is_ready(&self) -> bool {
        match self {
            Command::Insert(w) | Command::Update(w) | Command::Delete(w) => w.is_ready(),
            Command::Split(s) => s.is_ready(),
        }
    }

    /// Is this command still waiting on the given scope column?
    pub fn waits_on(&self, column: &'static str) -> bool {
        match self {
            Command::Insert(w) | Command::Update(w) | Command::Delete(w) => w.waits_on(column),
            Command::Split(s) => s.waits_on(column),
        }
    }

    /// Receive a value pushed by an upstream producer.
    pub fn accept(&mut self, field: &'static str, value: Value, kind: LinkKind) -> Result<()> {
        match self {
            Command::Insert(w) | Command::Update(w) | Command::Delete(w) => {
                w.accept(field, value, kind)
            }
            Command::Split(s) => s.accept(field, value, kind),
        }
    }

    /// Register a forward link to fan out after execution.
    pub fn forward(&mut self, link: ForwardLink) -> Result<()> {
        match self {
            Command::Insert(w) | Command::Update(w) | Command::Delete(w) => w.forward(link),
            Command::Split(_) => Err(Error::link(
                link.source,
                "forwards are registered on a composite's branches, not the composite",
            )),
        }
    }

    /// Mark executed and fan out forward links.
    pub fn complete(&mut self, generated: Option<Value>) -> Result<()> {
        match self {
            Command::Insert(w) | Command::Update(w) | Command::Delete(w) => w.complete(generated),
            Command::Split(_) => Err(Error::link(
                "",
                "a composite command is executed through its branches",
            )),
        }
    }

    /// Mark failed. Failing a composite fails both branches.
    pub fn fail(&mut self) {
        match self {
            Command::Insert(w) | Command::Update(w) | Command::Delete(w) => w.fail(),
            Command::Split(s) => {
                s.first.borrow_mut().fail();
                s.second.borrow_mut().fail();
            }
        }
    }

    /// Check if this is an insert.
    pub fn is_insert(&self) -> bool {
        matches!(self, Command::Insert(_))
    }

    /// Check if this is an update.
    pub fn is_update(&self) -> bool {
        matches!(self, Command::Update(_))
    }

    /// Check if this is a delete.
    pub fn is_delete(&self) -> bool {
        matches!(self, Command::Delete(_))
    }

    /// Check if this is a composite.
    pub fn is_split(&self) -> bool {
        matches!(self, Command::Split(_))
    }

    /// Borrow the inner write, if this is not a composite.
    pub fn as_write(&self) -> Option<&Write> {
        match self {
            Command::Insert(w) | Command::Update(w) | Command::Delete(w) => Some(w),
            Command::Split(_) => None,
        }
    }

    /// Borrow the composite, if this is one.
    pub fn as_split(&self) -> Option<&Split> {
        match self {
            Command::Split(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{EntityState, Status};
    use entmap_core::columns;

    #[test]
    fn write_without_waits_is_ready_immediately() {
        let write = Write::new("default", "users");
        assert_eq!(write.status(), CommandStatus::Pending);
        assert!(write.is_ready());
    }

    #[test]
    fn wait_scope_blocks_until_value_arrives() {
        let mut write = Write::new("default", "users");
        write.wait_scope("id");
        assert_eq!(write.status(), CommandStatus::Blocked);
        assert!(!write.is_ready());
        assert!(write.waits_on("id"));

        write.accept("id", Value::Int(5), LinkKind::Scope).unwrap();
        assert_eq!(write.status(), CommandStatus::Ready);
        assert!(write.is_ready());
        assert_eq!(write.scope().get("id"), Some(&Value::Int(5)));
    }

    #[test]
    fn multiple_waits_clear_one_by_one() {
        let mut write = Write::new("default", "links");
        write.wait_scope("user_id");
        write.wait_scope("tag_id");

        write
            .accept("user_id", Value::Int(1), LinkKind::Scope)
            .unwrap();
        assert_eq!(write.status(), CommandStatus::Blocked);

        write
            .accept("tag_id", Value::Int(2), LinkKind::Scope)
            .unwrap();
        assert_eq!(write.status(), CommandStatus::Ready);
    }

    #[test]
    fn payload_accept_does_not_unblock() {
        let mut write = Write::new("default", "users");
        write.wait_scope("id");
        write
            .accept("team_id", Value::Int(9), LinkKind::Payload)
            .unwrap();
        assert_eq!(write.status(), CommandStatus::Blocked);
        assert_eq!(write.payload().get("team_id"), Some(&Value::Int(9)));
    }

    #[test]
    fn complete_fans_out_generated_key_to_state() {
        let state = EntityState::new(Status::ScheduledInsert, "id").into_ref();

        let mut insert = Write::new("default", "users");
        insert.set_payload(columns([("email", "a@b.c".into())]));
        insert.produces("id");
        insert
            .forward(ForwardLink::new(
                "id",
                Consumer::state(&state),
                "id",
                LinkKind::Payload,
            ))
            .unwrap();

        insert.complete(Some(Value::Int(41))).unwrap();

        assert_eq!(insert.status(), CommandStatus::Executed);
        assert_eq!(insert.generated(), Some(&Value::Int(41)));
        assert_eq!(state.borrow().key(), Some(&Value::Int(41)));
    }

    #[test]
    fn complete_prefers_explicit_payload_value() {
        let state = EntityState::new(Status::ScheduledInsert, "id").into_ref();

        let mut insert = Write::new("default", "users");
        insert.set_payload(columns([("id", Value::Int(77))]));
        insert
            .forward(ForwardLink::new(
                "id",
                Consumer::state(&state),
                "id",
                LinkKind::Payload,
            ))
            .unwrap();

        insert.complete(None).unwrap();
        assert_eq!(state.borrow().key(), Some(&Value::Int(77)));
    }

    #[test]
    fn complete_without_produced_value_is_link_error() {
        let state = EntityState::new(Status::ScheduledInsert, "id").into_ref();

        let mut insert = Write::new("default", "users");
        insert
            .forward(ForwardLink::new(
                "id",
                Consumer::state(&state),
                "id",
                LinkKind::Payload,
            ))
            .unwrap();

        // Neither an explicit payload key nor a generated value exists.
        let err = insert.complete(None).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn complete_twice_is_an_error() {
        let mut write = Write::new("default", "users");
        write.complete(None).unwrap();
        assert!(write.complete(None).is_err());
    }

    #[test]
    fn complete_while_blocked_is_an_error() {
        let mut write = Write::new("default", "users");
        write.wait_scope("id");
        assert!(write.complete(None).is_err());
    }

    #[test]
    fn accept_after_execution_is_an_error() {
        let mut write = Write::new("default", "users");
        write.complete(None).unwrap();
        assert!(
            write
                .accept("id", Value::Int(1), LinkKind::Scope)
                .is_err()
        );
    }

    #[test]
    fn consumer_delivery_to_dropped_command_fails() {
        let consumer = {
            let target = Command::Update(Write::new("default", "users")).into_ref();
            Consumer::command(&target)
        };
        let err = consumer
            .accept("id", Value::Int(1), LinkKind::Scope)
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn split_tracks_branch_progression() {
        let first = Command::Insert(Write::new("default", "users")).into_ref();
        let mut blocked = Write::new("default", "users");
        blocked.wait_scope("id");
        let second = Command::Update(blocked).into_ref();

        let split = Split::new(first.clone(), second.clone());
        assert_eq!(split.status(), CommandStatus::Pending);
        assert!(split.is_ready());

        first.borrow_mut().complete(None).unwrap();
        assert_eq!(split.status(), CommandStatus::Blocked);
        assert!(!split.is_ready());

        second
            .borrow_mut()
            .accept("id", Value::Int(3), LinkKind::Scope)
            .unwrap();
        assert_eq!(split.status(), CommandStatus::Ready);
        assert!(split.is_ready());

        second.borrow_mut().complete(None).unwrap();
        assert_eq!(split.status(), CommandStatus::Executed);
    }

    #[test]
    fn split_routes_scope_to_waiting_branch() {
        let first = Command::Insert(Write::new("default", "users")).into_ref();
        let mut blocked = Write::new("default", "users");
        blocked.wait_scope("id");
        let second = Command::Update(blocked).into_ref();

        let mut composite = Command::Split(Split::new(first, second.clone()));
        assert!(composite.waits_on("id"));

        composite
            .accept("id", Value::Int(8), LinkKind::Scope)
            .unwrap();
        assert_eq!(second.borrow().status(), CommandStatus::Ready);

        let err = composite
            .accept("other", Value::Int(1), LinkKind::Scope)
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn split_fail_fails_both_branches() {
        let first = Command::Insert(Write::new("default", "users")).into_ref();
        let second = Command::Update(Write::new("default", "users")).into_ref();

        let mut composite = Command::Split(Split::new(first.clone(), second.clone()));
        composite.fail();

        assert_eq!(first.borrow().status(), CommandStatus::Failed);
        assert_eq!(second.borrow().status(), CommandStatus::Failed);
        assert_eq!(composite.status(), CommandStatus::Failed);
    }

    #[test]
    fn command_kind_predicates() {
        let insert = Command::Insert(Write::new("d", "t"));
        assert!(insert.is_insert());
        assert!(!insert.is_update());
        assert!(insert.as_write().is_some());
        assert!(insert.as_split().is_none());

        let first = Command::Insert(Write::new("d", "t")).into_ref();
        let second = Command::Update(Write::new("d", "t")).into_ref();
        let mut split = Command::Split(Split::new(first, second));
        assert!(split.is_split());
        assert!(split.as_write().is_none());
        assert!(split.complete(None).is_err());
    }
}
