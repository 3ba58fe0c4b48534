//! States — immutable per-entity snapshots.
//!
//! A state is never mutated in place: updating an entity produces a new
//! [`State`] that replaces the previous one in the registry. `last_changed`
//! moves only when the state value itself changes; `last_updated` moves on
//! every write and is non-decreasing per entity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::id::EntityId;
use crate::time::Timestamp;

/// A single typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Json(serde_json::Value),
}

/// Ordered attribute mapping attached to a state.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Immutable snapshot of one entity at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// The entity this snapshot belongs to.
    pub entity_id: EntityId,
    /// Current state value (`on`, `off`, `21.5`, …).
    pub value: String,
    /// Extra attributes (brightness, unit of measurement, …).
    pub attributes: Attributes,
    /// Last time `value` changed.
    pub last_changed: Timestamp,
    /// Last time this entity was written at all.
    pub last_updated: Timestamp,
    /// Causal context of the write that produced this snapshot.
    pub context: Context,
}

impl State {
    /// First snapshot for an entity; both timestamps start at `now`.
    #[must_use]
    pub fn new(
        entity_id: EntityId,
        value: impl Into<String>,
        attributes: Attributes,
        context: Context,
        now: Timestamp,
    ) -> Self {
        Self {
            entity_id,
            value: value.into(),
            attributes,
            last_changed: now,
            last_updated: now,
            context,
        }
    }

    /// Successor snapshot replacing `self` for the same entity.
    ///
    /// `last_changed` carries over when the value is unchanged (an
    /// attribute-only refresh is observable but does not move it).
    /// `last_updated` never moves backwards even if the wall clock does.
    #[must_use]
    pub fn successor(
        &self,
        value: impl Into<String>,
        attributes: Attributes,
        context: Context,
        now: Timestamp,
    ) -> Self {
        let value = value.into();
        let last_updated = now.max(self.last_updated);
        let last_changed = if value == self.value {
            self.last_changed
        } else {
            last_updated
        };
        Self {
            entity_id: self.entity_id.clone(),
            value,
            attributes,
            last_changed,
            last_updated,
            context,
        }
    }

    /// Look up a single attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}
