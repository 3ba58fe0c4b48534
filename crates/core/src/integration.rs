//! Integration contract — the capability interface every integration
//! implements.
//!
//! An integration bridges an external protocol (virtual devices, MQTT,
//! Zigbee, …) into the hub. During setup it registers listeners on the event
//! bus and services on the service registry, and writes discovered entity
//! states into the state registry — always through the [`Hub`] it receives,
//! never through shared globals.

use std::sync::Arc;

use async_trait::async_trait;

use hearth_domain::error::SetupError;

use crate::hub::Hub;

/// A pluggable integration registered by domain name.
///
/// The setup orchestrator calls the lifecycle methods:
///
/// 1. [`setup`](Self::setup) — under the descriptor's deadline; a failure or
///    timeout marks the integration (and its dependents) failed
/// 2. [`unload`](Self::unload) — before a reload re-runs setup, under its
///    own deadline
#[async_trait]
pub trait Integration: Send + Sync {
    /// Initialize against the hub with validated configuration.
    ///
    /// Long-running background work must be spawned on its own task, gated
    /// on [`Hub::cancellation`]; blocking here counts against the setup
    /// deadline.
    async fn setup(&self, hub: Arc<Hub>, config: serde_json::Value) -> Result<(), SetupError>;

    /// Tear down before a reload. The default does nothing.
    async fn unload(&self, hub: Arc<Hub>) -> Result<(), SetupError> {
        let _ = hub;
        Ok(())
    }
}
