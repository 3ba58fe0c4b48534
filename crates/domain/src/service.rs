//! Service calls — commands routed through the service registry.
//!
//! Examples: `light.turn_on`, `switch.toggle`, `climate.set_temperature`.

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::id::{Domain, EntityId};

/// A request to invoke a registered service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    /// Domain owning the service.
    pub domain: Domain,
    /// Service name within the domain.
    pub service: String,
    /// Parameter payload, validated against the service schema when one is
    /// declared.
    pub data: serde_json::Value,
    /// Entity the call is directed at, when it targets one.
    pub target: Option<EntityId>,
    /// Whether the caller wants the handler's response value back.
    pub return_response: bool,
    /// Causal context of the caller.
    pub context: Context,
}

impl ServiceCall {
    #[must_use]
    pub fn new(
        domain: Domain,
        service: impl Into<String>,
        data: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            domain,
            service: service.into(),
            data,
            target: None,
            return_response: false,
            context,
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: EntityId) -> Self {
        self.target = Some(target);
        self
    }

    #[must_use]
    pub fn with_return_response(mut self) -> Self {
        self.return_response = true;
        self
    }
}
