//! # hearth-core
//!
//! Runtime coordination layer for the hearth home automation hub.
//!
//! ## Responsibilities
//! - **Event bus** — typed publish/subscribe with exact and wildcard
//!   subscriptions, per-subscription ordered delivery, and failure isolation
//! - **State registry** — authoritative entity-id → state map that publishes
//!   a `state_changed` event on every write
//! - **Service registry** — (domain, service) → handler dispatch with schema
//!   validation, blocking/fire-and-forget calls, and timeouts
//! - **Setup orchestrator** — dependency-ordered, concurrent integration
//!   setup with cycle detection, per-integration deadlines, transitive
//!   failure, and reload
//! - **Hub** — the single runtime context owning the registries, the clock
//!   reference, and graceful shutdown
//!
//! ## Dependency rule
//! Depends on `hearth-domain` plus runtime crates (`tokio`, `tokio-util`).
//! Device integrations, frontends, persistence, and configuration sources
//! are external collaborators that consume this crate through [`hub::Hub`].

pub mod config;
pub mod event_bus;
pub mod hub;
pub mod integration;
pub mod service_registry;
pub mod setup;
pub mod state_registry;
