//! The hub — the single process-wide runtime context.
//!
//! Owns the event bus, the state registry, the service registry, the shared
//! context sequence, and the root cancellation token. Components never reach
//! these through ambient global state; they receive references from the hub
//! at construction or setup time.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hearth_domain::context::ContextSeq;
use hearth_domain::event::Event;
use hearth_domain::state::State;
use hearth_domain::time::{Timestamp, now};

use crate::config::RuntimeConfig;
use crate::event_bus::EventBus;
use crate::service_registry::ServiceRegistry;
use crate::state_registry::StateRegistry;

/// Runtime context owning the coordination primitives.
pub struct Hub {
    config: RuntimeConfig,
    bus: Arc<EventBus>,
    states: Arc<StateRegistry>,
    services: Arc<ServiceRegistry>,
    contexts: Arc<ContextSeq>,
    cancel: CancellationToken,
}

impl Hub {
    /// Build a hub and its registries from runtime configuration.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Arc<Self> {
        let bus = Arc::new(EventBus::new());
        let contexts = Arc::new(ContextSeq::new());
        let cancel = CancellationToken::new();
        let states = Arc::new(StateRegistry::new(Arc::clone(&bus), Arc::clone(&contexts)));
        let services = Arc::new(ServiceRegistry::new(
            Arc::clone(&bus),
            Arc::clone(&contexts),
            config.service_call_timeout(),
            cancel.child_token(),
        ));
        Arc::new(Self {
            config,
            bus,
            states,
            services,
            contexts,
            cancel,
        })
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    #[must_use]
    pub fn states(&self) -> &Arc<StateRegistry> {
        &self.states
    }

    #[must_use]
    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    #[must_use]
    pub fn contexts(&self) -> &Arc<ContextSeq> {
        &self.contexts
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The hub clock; all core timestamps come from here.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        now()
    }

    /// Child token cancelled when the hub stops. Integrations should gate
    /// their background work on this.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// All current states, ordered by entity id.
    #[must_use]
    pub fn states_snapshot(&self) -> Vec<Arc<State>> {
        self.states.all()
    }

    /// Graceful shutdown: publish `shutdown_began`, cancel in-flight setup
    /// and blocking service calls, then drain the event bus within the
    /// configured grace.
    ///
    /// Returns whether the drain completed before the grace elapsed.
    pub async fn stop(&self) -> bool {
        info!("hub stopping");
        self.cancel.cancel();
        self.bus
            .publish(Event::shutdown_began(self.contexts.root()));
        let drained = self.bus.close(self.config.shutdown_grace()).await;
        if drained {
            info!("hub stopped");
        } else {
            warn!("hub stopped with undrained event listeners");
        }
        drained
    }
}
