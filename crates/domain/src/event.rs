//! Events — immutable records of something that happened.
//!
//! Events are produced when entity state changes, services come and go,
//! integrations finish loading, and the hub starts or stops. They are
//! ephemeral: the core never persists them.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::context::Context;
use crate::id::{Domain, EntityId, EventId};
use crate::state::State;
use crate::time::{Timestamp, now};

/// Classification of an event, usable as a subscription key.
///
/// The core emits the named variants; integrations may define their own
/// types via [`EventType::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// An entity state was written (including attribute-only refreshes).
    StateChanged,
    /// An entity was removed from the state registry.
    StateRemoved,
    /// A service became available.
    ServiceRegistered,
    /// A service was unregistered.
    ServiceRemoved,
    /// An integration finished setup successfully.
    ComponentLoaded,
    /// All integrations reached a terminal setup state.
    StartupComplete,
    /// The hub began shutting down.
    ShutdownBegan,
    /// Integration-defined event type.
    Custom(String),
}

impl EventType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::StateChanged => "state_changed",
            Self::StateRemoved => "state_removed",
            Self::ServiceRegistered => "service_registered",
            Self::ServiceRemoved => "service_removed",
            Self::ComponentLoaded => "component_loaded",
            Self::StartupComplete => "startup_complete",
            Self::ShutdownBegan => "shutdown_began",
            Self::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        match value {
            "state_changed" => Self::StateChanged,
            "state_removed" => Self::StateRemoved,
            "service_registered" => Self::ServiceRegistered,
            "service_removed" => Self::ServiceRemoved,
            "component_loaded" => Self::ComponentLoaded,
            "startup_complete" => Self::StartupComplete,
            "shutdown_began" => Self::ShutdownBegan,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        match event_type {
            EventType::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

/// Where an event was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOrigin {
    /// Produced inside this hub process.
    Local,
    /// Bridged in from a remote hub by a collaborator; the core only tags.
    Remote,
}

/// An immutable record of something that happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique id of this event instance.
    pub id: EventId,
    /// Classification used for subscription matching.
    pub event_type: EventType,
    /// Type-specific payload.
    pub data: serde_json::Value,
    /// Local or remote origin.
    pub origin: EventOrigin,
    /// When the event was fired.
    pub time_fired: Timestamp,
    /// Causal context of the action that produced this event.
    pub context: Context,
}

impl Event {
    /// Create a local event fired now.
    #[must_use]
    pub fn new(event_type: EventType, data: serde_json::Value, context: Context) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            data,
            origin: EventOrigin::Local,
            time_fired: now(),
            context,
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: EventOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// `state_changed` event carrying the old and new snapshots.
    #[must_use]
    pub fn state_changed(old: Option<&State>, new: &State, context: Context) -> Self {
        Self::new(
            EventType::StateChanged,
            json!({
                "entity_id": new.entity_id,
                "old_state": old,
                "new_state": new,
            }),
            context,
        )
    }

    /// `state_removed` event carrying the last snapshot.
    #[must_use]
    pub fn state_removed(last: &State, context: Context) -> Self {
        Self::new(
            EventType::StateRemoved,
            json!({
                "entity_id": last.entity_id,
                "old_state": last,
            }),
            context,
        )
    }

    /// `service_registered` announcement.
    #[must_use]
    pub fn service_registered(domain: &Domain, service: &str, context: Context) -> Self {
        Self::new(
            EventType::ServiceRegistered,
            json!({ "domain": domain, "service": service }),
            context,
        )
    }

    /// `service_removed` announcement.
    #[must_use]
    pub fn service_removed(domain: &Domain, service: &str, context: Context) -> Self {
        Self::new(
            EventType::ServiceRemoved,
            json!({ "domain": domain, "service": service }),
            context,
        )
    }

    /// `component_loaded` announcement for one integration.
    #[must_use]
    pub fn component_loaded(domain: &Domain, context: Context) -> Self {
        Self::new(
            EventType::ComponentLoaded,
            json!({ "domain": domain }),
            context,
        )
    }

    /// `startup_complete` summary once no integration remains in progress.
    #[must_use]
    pub fn startup_complete(
        ready: &[Domain],
        failed: &[Domain],
        timed_out: &[Domain],
        context: Context,
    ) -> Self {
        Self::new(
            EventType::StartupComplete,
            json!({
                "ready": ready,
                "failed": failed,
                "timed_out": timed_out,
            }),
            context,
        )
    }

    /// `shutdown_began` marker published by the runtime loop on stop.
    #[must_use]
    pub fn shutdown_began(context: Context) -> Self {
        Self::new(EventType::ShutdownBegan, json!({}), context)
    }

    /// Entity id carried in `state_changed` / `state_removed` payloads.
    #[must_use]
    pub fn entity_id(&self) -> Option<EntityId> {
        self.data
            .get("entity_id")
            .and_then(serde_json::Value::as_str)
            .and_then(|raw| EntityId::new(raw).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextSeq;
    use crate::state::Attributes;

    #[test]
    fn should_map_known_event_type_names() {
        assert_eq!(EventType::from("state_changed"), EventType::StateChanged);
        assert_eq!(EventType::StateChanged.as_str(), "state_changed");
    }

    #[test]
    fn should_map_unknown_event_type_to_custom() {
        let event_type = EventType::from("zwave_node_added");
        assert_eq!(
            event_type,
            EventType::Custom("zwave_node_added".to_string())
        );
        assert_eq!(event_type.as_str(), "zwave_node_added");
    }

    #[test]
    fn should_roundtrip_event_type_through_serde_json() {
        let json = serde_json::to_string(&EventType::ComponentLoaded).unwrap();
        assert_eq!(json, "\"component_loaded\"");
        let parsed: EventType = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, EventType::ComponentLoaded);
    }

    #[test]
    fn should_default_to_local_origin() {
        let seq = ContextSeq::new();
        let event = Event::new(EventType::ShutdownBegan, json!({}), seq.root());
        assert_eq!(event.origin, EventOrigin::Local);
    }

    #[test]
    fn should_carry_old_and_new_state_in_state_changed_payload() {
        let seq = ContextSeq::new();
        let state = State::new(
            EntityId::new("light.kitchen").unwrap(),
            "on",
            Attributes::new(),
            seq.root(),
            now(),
        );
        let event = Event::state_changed(None, &state, seq.root());

        assert_eq!(event.event_type, EventType::StateChanged);
        assert_eq!(event.data["entity_id"], "light.kitchen");
        assert!(event.data["old_state"].is_null());
        assert_eq!(event.data["new_state"]["value"], "on");
        assert_eq!(event.entity_id(), Some(state.entity_id));
    }

    #[test]
    fn should_list_domains_in_startup_complete_payload() {
        let seq = ContextSeq::new();
        let ready = vec![Domain::new("light").unwrap()];
        let failed = vec![Domain::new("zwave_js").unwrap()];
        let event = Event::startup_complete(&ready, &failed, &[], seq.root());

        assert_eq!(event.data["ready"][0], "light");
        assert_eq!(event.data["failed"][0], "zwave_js");
        assert_eq!(event.data["timed_out"].as_array().unwrap().len(), 0);
    }
}
