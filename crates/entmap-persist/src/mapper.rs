//! Entity mapper: turns entity state changes into queued commands.
//!
//! For each entity the mapper classifies the current status, diffs columns
//! against the last-synced baseline, builds the insert/update/delete
//! command, wires the primary-key forward links, and mutates the entity's
//! `EntityState`. Execution is the external orchestrator's job; the mapper
//! only queues.

use std::marker::PhantomData;

use entmap_core::{
    ColumnMap, Entity, KeyGenerator, Result, Source, SourceProvider, Typecast, Value,
};

use crate::command::{Command, CommandRef, Consumer, ForwardLink, LinkKind, Split, Write};
use crate::state::{StateRef, Status};

/// Builds write commands for one entity role.
pub struct Mapper<E: Entity> {
    source: Box<dyn Source>,
    typecast: Option<Box<dyn Typecast>>,
    keygen: Option<Box<dyn KeyGenerator>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> std::fmt::Debug for Mapper<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapper")
            .field("source", &self.source)
            .field("typecast", &self.typecast.is_some())
            .field("keygen", &self.keygen.is_some())
            .finish()
    }
}

impl<E: Entity> Mapper<E> {
    /// Create a mapper over an explicit source.
    pub fn new(source: impl Source + 'static) -> Self {
        Self {
            source: Box::new(source),
            typecast: None,
            keygen: None,
            _entity: PhantomData,
        }
    }

    /// Create a mapper by resolving the role's source from a provider.
    ///
    /// Fails with a configuration error when the host cannot supply a
    /// source for `E::ROLE`.
    pub fn from_provider(provider: &dyn SourceProvider) -> Result<Self> {
        let source = provider.source(E::ROLE)?;
        Ok(Self {
            source,
            typecast: None,
            keygen: None,
            _entity: PhantomData,
        })
    }

    /// Attach a typecast applied to fetched columns (builder pattern).
    #[must_use]
    pub fn with_typecast(mut self, typecast: impl Typecast + 'static) -> Self {
        self.typecast = Some(Box::new(typecast));
        self
    }

    /// Attach a primary-key generator (builder pattern).
    ///
    /// Without one, inserts omit the key column and rely on autoincrement.
    #[must_use]
    pub fn with_key_generator(mut self, keygen: impl KeyGenerator + 'static) -> Self {
        self.keygen = Some(Box::new(keygen));
        self
    }

    /// The source this mapper addresses commands to.
    pub fn source(&self) -> &dyn Source {
        self.source.as_ref()
    }

    /// Produce the next primary key, or `None` to rely on autoincrement.
    fn generate_primary_key(&self) -> Option<Value> {
        self.keygen.as_ref().and_then(|g| g.next_key())
    }

    /// Apply the typecast, or pass columns through untouched.
    fn cast(&self, columns: ColumnMap) -> Result<ColumnMap> {
        match &self.typecast {
            Some(typecast) => typecast.cast(columns, self.source.database()),
            None => Ok(columns),
        }
    }

    /// Queue the write that brings the entity in sync.
    ///
    /// New entities get an insert. Tracked entities get an update; when the
    /// entity already carries a queued update (or a composite) the same
    /// command is returned unchanged, and when it carries any other pending
    /// command (typically a not-yet-executed insert) the new update is
    /// chained behind it in a `Split` so the two writes never race the
    /// still-unassigned primary key.
    #[tracing::instrument(level = "debug", skip_all, fields(role = E::ROLE))]
    pub fn queue_store(&self, entity: &E, state: &StateRef) -> Result<CommandRef> {
        if state.borrow().status() == Status::New {
            return self.queue_insert(entity, state);
        }

        let last = state.borrow().command();
        match last {
            None => self.queue_update(entity, state),
            Some(last) => {
                let reusable = matches!(&*last.borrow(), Command::Update(_) | Command::Split(_));
                if reusable {
                    tracing::debug!("store already queued; returning existing command");
                    return Ok(last);
                }

                let update = self.build_update(entity, state)?;
                let split = Command::Split(Split::new(last, update)).into_ref();
                state.borrow_mut().set_command(Some(split.clone()));
                tracing::debug!("chained update behind pending insert");
                Ok(split)
            }
        }
    }

    /// Queue an unconditional delete for the row the entity identifies.
    ///
    /// The delete waits for the (possibly still pending) primary key
    /// forwarded from the entity state before it may execute.
    #[tracing::instrument(level = "debug", skip_all, fields(role = E::ROLE))]
    pub fn queue_delete(&self, _entity: &E, state: &StateRef) -> Result<CommandRef> {
        let key = E::PRIMARY_KEY;
        let mut delete = Write::new(self.source.database(), self.source.table());
        delete.wait_scope(key);
        let command = Command::Delete(delete).into_ref();

        {
            let mut st = state.borrow_mut();
            st.set_status(Status::ScheduledDelete);
            st.dec_claim();
        }

        state.borrow_mut().forward(ForwardLink::new(
            key,
            Consumer::command(&command),
            key,
            LinkKind::Scope,
        ))?;

        tracing::debug!(table = self.source.table(), "queued delete");
        Ok(command)
    }

    /// Queue an update; also stores it on the entity state.
    pub fn queue_update(&self, entity: &E, state: &StateRef) -> Result<CommandRef> {
        let command = self.build_update(entity, state)?;
        state.borrow_mut().set_command(Some(command.clone()));
        Ok(command)
    }

    fn queue_insert(&self, entity: &E, state: &StateRef) -> Result<CommandRef> {
        let columns = self.cast(entity.fetch_columns()?)?;
        let key = E::PRIMARY_KEY;

        let mut insert = Write::new(self.source.database(), self.source.table());
        let mut payload = columns.clone();
        payload.remove(key);
        match self.generate_primary_key() {
            Some(value) => {
                payload.insert(key, value);
            }
            None => insert.produces(key),
        }
        insert.set_payload(payload);
        let command = Command::Insert(insert).into_ref();

        {
            let mut st = state.borrow_mut();
            st.set_status(Status::ScheduledInsert);
            // Pre-primary-key snapshot; the key arrives via the forward link.
            let mut snapshot = columns;
            snapshot.remove(key);
            st.set_data(snapshot);
            st.set_command(Some(command.clone()));
        }

        command.borrow_mut().forward(ForwardLink::new(
            key,
            Consumer::state(state),
            key,
            LinkKind::Payload,
        ))?;

        tracing::debug!(table = self.source.table(), "queued insert");
        Ok(command)
    }

    /// Build an update from the column diff against the baseline.
    ///
    /// Changes are decided by value equality; the primary key is never part
    /// of the payload. The baseline snapshot is replaced with exactly the
    /// changed set (see DESIGN.md on this narrowing).
    fn build_update(&self, entity: &E, state: &StateRef) -> Result<CommandRef> {
        let current = self.cast(entity.fetch_columns()?)?;
        let key = E::PRIMARY_KEY;

        let changes: ColumnMap = {
            let st = state.borrow();
            current
                .into_iter()
                .filter(|(column, value)| *column != key && st.data().get(column) != Some(value))
                .collect()
        };

        tracing::debug!(
            table = self.source.table(),
            changed = changes.len(),
            "queued update"
        );

        let mut update = Write::new(self.source.database(), self.source.table());
        update.set_payload(changes.clone());
        update.wait_scope(key);
        let command = Command::Update(update).into_ref();

        {
            let mut st = state.borrow_mut();
            st.set_status(Status::ScheduledUpdate);
            st.set_data(changes);
        }

        state.borrow_mut().forward(ForwardLink::new(
            key,
            Consumer::command(&command),
            key,
            LinkKind::Scope,
        ))?;

        Ok(command)
    }
}
