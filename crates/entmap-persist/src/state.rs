//! Per-entity synchronization state.
//!
//! Every entity tracked by a unit of work owns one `EntityState`: its
//! persistence status, the last-synchronized column snapshot used as the
//! diff baseline, a handle to the command currently responsible for it, and
//! the outbound value links still waiting for a column (usually the primary
//! key) to arrive.
//!
//! The state is both a consumer and a producer in the forward-link protocol:
//! a completed insert pushes the generated key into the state via
//! `register`, which in turn flushes any queued links sourced from that
//! column into downstream commands.

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use entmap_core::{ColumnMap, Result, Value};

use crate::command::{CommandRef, ForwardLink};

/// Shared handle to an entity's state within a unit of work.
pub type StateRef = Rc<RefCell<EntityState>>;

/// Persistence status of a tracked entity.
///
/// Transitions are driven only by the mapper; no self-transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Never stored; the next store queues an insert.
    New,
    /// An insert command has been queued.
    ScheduledInsert,
    /// An update command has been queued.
    ScheduledUpdate,
    /// A delete command has been queued.
    ScheduledDelete,
    /// In sync with the database.
    Synced,
}

/// Mutable bookkeeping record for one entity.
#[derive(Debug)]
pub struct EntityState {
    status: Status,
    /// Last-synchronized column snapshot (diff baseline). The primary key
    /// lives in its own slot and never contributes to diffs.
    data: ColumnMap,
    key_column: &'static str,
    key: Option<Value>,
    command: Option<CommandRef>,
    claim_count: usize,
    /// Outbound links waiting for a source column to become available.
    forwards: Vec<ForwardLink>,
}

impl EntityState {
    /// Create a state with the given status and primary-key column.
    pub fn new(status: Status, key_column: &'static str) -> Self {
        Self {
            status,
            data: ColumnMap::new(),
            key_column,
            key: None,
            command: None,
            claim_count: 0,
            forwards: Vec::new(),
        }
    }

    /// Create the state of a freshly loaded, in-sync entity.
    pub fn synced(key_column: &'static str, key: Value, data: ColumnMap) -> Self {
        let mut state = Self::new(Status::Synced, key_column);
        state.key = Some(key);
        state.data = data;
        state
    }

    /// Wrap a state into a shared handle.
    pub fn into_ref(self) -> StateRef {
        Rc::new(RefCell::new(self))
    }

    /// Current persistence status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Set the persistence status.
    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    /// The last-synchronized column snapshot.
    pub fn data(&self) -> &ColumnMap {
        &self.data
    }

    /// Replace the column snapshot.
    pub fn set_data(&mut self, data: ColumnMap) {
        self.data = data;
    }

    /// The primary-key column name.
    pub fn key_column(&self) -> &'static str {
        self.key_column
    }

    /// The assigned primary-key value, if known.
    pub fn key(&self) -> Option<&Value> {
        self.key.as_ref()
    }

    /// The command currently responsible for this entity, if any.
    pub fn command(&self) -> Option<CommandRef> {
        self.command.clone()
    }

    /// Assign or clear the live command handle.
    pub fn set_command(&mut self, command: Option<CommandRef>) {
        self.command = command;
    }

    /// Number of relations still awaiting this entity's primary key.
    pub fn claims(&self) -> usize {
        self.claim_count
    }

    /// Record one more relation awaiting the primary key.
    pub fn claim(&mut self) {
        self.claim_count += 1;
    }

    /// Release one claim (saturating).
    pub fn dec_claim(&mut self) {
        self.claim_count = self.claim_count.saturating_sub(1);
    }

    /// Number of outbound links still waiting on a source column.
    pub fn pending_forwards(&self) -> usize {
        self.forwards.len()
    }

    /// Look up a column the state already knows a value for.
    ///
    /// A NULL value cannot satisfy a forward: an unassigned autoincrement key
    /// is extracted as NULL and must not be delivered as a row identity.
    fn available(&self, column: &'static str) -> Option<Value> {
        let value = if column == self.key_column {
            self.key.clone()
        } else {
            self.data.get(column).cloned()
        };
        value.filter(|v| !v.is_null())
    }

    /// Register an outbound value link.
    ///
    /// Delivers immediately when the source column is already known,
    /// otherwise queues the link (claiming the key) until `register`
    /// supplies the column.
    pub fn forward(&mut self, link: ForwardLink) -> Result<()> {
        if let Some(value) = self.available(link.source) {
            tracing::trace!(
                source = link.source,
                target_field = link.target_field,
                "delivering forward immediately"
            );
            return link.target.accept(link.target_field, value, link.kind);
        }
        tracing::trace!(
            source = link.source,
            target_field = link.target_field,
            "queueing forward until source arrives"
        );
        self.claim_count += 1;
        self.forwards.push(link);
        Ok(())
    }

    /// Store a delivered column value and flush queued links sourced from it.
    ///
    /// Called by command fan-out (e.g. a completed insert pushing the
    /// generated key) and by the orchestrator when priming loaded state.
    /// Confirmed values always overwrite the snapshot, so `data` never keeps
    /// stale columns behind a completed command.
    pub fn register(&mut self, column: &'static str, value: Value) -> Result<()> {
        if column == self.key_column {
            self.key = Some(value.clone());
        } else {
            self.data.insert(column, value.clone());
        }

        let (due, rest): (Vec<_>, Vec<_>) = mem::take(&mut self.forwards)
            .into_iter()
            .partition(|link| link.source == column);
        self.forwards = rest;

        for link in due {
            self.claim_count = self.claim_count.saturating_sub(1);
            tracing::trace!(
                source = column,
                target_field = link.target_field,
                "flushing queued forward"
            );
            link.target.accept(link.target_field, value.clone(), link.kind)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, CommandStatus, Consumer, LinkKind, Write};
    use entmap_core::columns;

    fn blocked_update() -> CommandRef {
        let mut write = Write::new("default", "users");
        write.wait_scope("id");
        Rc::new(RefCell::new(Command::Update(write)))
    }

    #[test]
    fn new_state_is_empty() {
        let state = EntityState::new(Status::New, "id");
        assert_eq!(state.status(), Status::New);
        assert!(state.data().is_empty());
        assert!(state.key().is_none());
        assert!(state.command().is_none());
        assert_eq!(state.claims(), 0);
    }

    #[test]
    fn synced_state_knows_its_key() {
        let state = EntityState::synced("id", Value::Int(7), columns([("email", "a@b.c".into())]));
        assert_eq!(state.status(), Status::Synced);
        assert_eq!(state.key(), Some(&Value::Int(7)));
        assert_eq!(state.data().get("email"), Some(&Value::from("a@b.c")));
    }

    #[test]
    fn register_stores_key_separately_from_data() {
        let mut state = EntityState::new(Status::ScheduledInsert, "id");
        state.register("id", Value::Int(3)).unwrap();
        state.register("email", Value::from("a@b.c")).unwrap();

        assert_eq!(state.key(), Some(&Value::Int(3)));
        assert!(!state.data().contains_key("id"));
        assert_eq!(state.data().get("email"), Some(&Value::from("a@b.c")));
    }

    #[test]
    fn forward_delivers_immediately_when_key_known() {
        let state = EntityState::synced("id", Value::Int(7), ColumnMap::new()).into_ref();
        let update = blocked_update();
        assert_eq!(update.borrow().status(), CommandStatus::Blocked);

        state
            .borrow_mut()
            .forward(ForwardLink::new(
                "id",
                Consumer::command(&update),
                "id",
                LinkKind::Scope,
            ))
            .unwrap();

        assert_eq!(update.borrow().status(), CommandStatus::Ready);
        assert_eq!(state.borrow().claims(), 0);
        assert_eq!(state.borrow().pending_forwards(), 0);
    }

    #[test]
    fn forward_queues_until_register_supplies_key() {
        let state = EntityState::new(Status::ScheduledInsert, "id").into_ref();
        let update = blocked_update();

        state
            .borrow_mut()
            .forward(ForwardLink::new(
                "id",
                Consumer::command(&update),
                "id",
                LinkKind::Scope,
            ))
            .unwrap();

        assert_eq!(update.borrow().status(), CommandStatus::Blocked);
        assert_eq!(state.borrow().claims(), 1);
        assert_eq!(state.borrow().pending_forwards(), 1);

        state.borrow_mut().register("id", Value::Int(42)).unwrap();

        assert_eq!(update.borrow().status(), CommandStatus::Ready);
        assert_eq!(state.borrow().claims(), 0);
        assert_eq!(state.borrow().pending_forwards(), 0);
        if let Command::Update(write) = &*update.borrow() {
            assert_eq!(write.scope().get("id"), Some(&Value::Int(42)));
        } else {
            unreachable!("update command expected");
        }
    }

    #[test]
    fn null_column_does_not_satisfy_a_forward() {
        let mut state = EntityState::new(Status::New, "id");
        state.data.insert("team_id", Value::Null);
        assert!(state.available("team_id").is_none());
        assert!(state.available("id").is_none());

        let update = blocked_update();
        state
            .forward(ForwardLink::new(
                "id",
                Consumer::command(&update),
                "id",
                LinkKind::Scope,
            ))
            .unwrap();
        assert_eq!(update.borrow().status(), CommandStatus::Blocked);
        assert_eq!(state.pending_forwards(), 1);
    }

    #[test]
    fn claims_saturate_at_zero() {
        let mut state = EntityState::new(Status::Synced, "id");
        state.dec_claim();
        assert_eq!(state.claims(), 0);

        state.claim();
        state.claim();
        state.dec_claim();
        assert_eq!(state.claims(), 1);
    }

    #[test]
    fn register_overwrites_stale_columns() {
        let mut state =
            EntityState::synced("id", Value::Int(1), columns([("email", "old@b.c".into())]));
        state.register("email", Value::from("new@b.c")).unwrap();
        assert_eq!(state.data().get("email"), Some(&Value::from("new@b.c")));
    }

    #[test]
    fn forward_to_dropped_target_errors_on_flush() {
        let state = EntityState::new(Status::ScheduledInsert, "id").into_ref();
        {
            let update = blocked_update();
            state
                .borrow_mut()
                .forward(ForwardLink::new(
                    "id",
                    Consumer::command(&update),
                    "id",
                    LinkKind::Scope,
                ))
                .unwrap();
            // update dropped here
        }

        let err = state
            .borrow_mut()
            .register("id", Value::Int(1))
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
