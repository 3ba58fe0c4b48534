//! Authoritative map of entity id → current state snapshot.
//!
//! The registry is the only writer of its backing map; callers interact
//! through `set`/`get`/`remove` and only ever receive `Arc<State>` snapshots.
//! Every write publishes a `state_changed` event — including writes that do
//! not change the value, so attribute refreshes stay observable. Callers that
//! need publish suppression must diff before calling.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use hearth_domain::context::{Context, ContextSeq};
use hearth_domain::event::Event;
use hearth_domain::id::EntityId;
use hearth_domain::state::{Attributes, State};
use hearth_domain::time::now;

use crate::event_bus::EventBus;

/// Registry of current entity states.
pub struct StateRegistry {
    states: RwLock<HashMap<EntityId, Arc<State>>>,
    bus: Arc<EventBus>,
    contexts: Arc<ContextSeq>,
}

impl StateRegistry {
    #[must_use]
    pub fn new(bus: Arc<EventBus>, contexts: Arc<ContextSeq>) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            bus,
            contexts,
        }
    }

    /// Write a new state snapshot for `entity_id` and publish `state_changed`.
    ///
    /// A fresh context is created for the write (as a child of `parent` when
    /// given). Returns the stored snapshot.
    pub fn set(
        &self,
        entity_id: EntityId,
        value: impl Into<String>,
        attributes: Attributes,
        parent: Option<&Context>,
    ) -> Arc<State> {
        let context = match parent {
            Some(parent) => self.contexts.child_of(parent),
            None => self.contexts.root(),
        };

        // The event is published under the write lock so state_changed events
        // observe the same order as the map itself.
        let mut states = self.states.write();
        let old = states.get(&entity_id).cloned();
        let new = Arc::new(match old.as_deref() {
            Some(previous) => previous.successor(value, attributes, context, now()),
            None => State::new(entity_id.clone(), value, attributes, context, now()),
        });
        states.insert(entity_id.clone(), Arc::clone(&new));
        self.bus
            .publish(Event::state_changed(old.as_deref(), &new, context));
        drop(states);

        debug!(entity_id = %entity_id, value = %new.value, "state set");
        new
    }

    /// Current snapshot for `entity_id`, if any.
    #[must_use]
    pub fn get(&self, entity_id: &EntityId) -> Option<Arc<State>> {
        self.states.read().get(entity_id).cloned()
    }

    /// Remove an entity and publish `state_removed`.
    ///
    /// Returns the snapshot that was removed, if the entity existed.
    pub fn remove(&self, entity_id: &EntityId) -> Option<Arc<State>> {
        let mut states = self.states.write();
        let removed = states.remove(entity_id);
        if let Some(last) = &removed {
            self.bus
                .publish(Event::state_removed(last, self.contexts.root()));
        }
        drop(states);

        if removed.is_some() {
            debug!(entity_id = %entity_id, "state removed");
        }
        removed
    }

    #[must_use]
    pub fn contains(&self, entity_id: &EntityId) -> bool {
        self.states.read().contains_key(entity_id)
    }

    /// All current snapshots, ordered by entity id.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<State>> {
        let mut all: Vec<Arc<State>> = self.states.read().values().cloned().collect();
        all.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        all
    }

    /// All known entity ids, ordered.
    #[must_use]
    pub fn entity_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.states.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }
}
