//! # hearth-domain
//!
//! Pure domain model for the hearth home automation core.
//!
//! ## Responsibilities
//! - Foundational types: validated identifiers, error conventions, timestamps
//! - Define **States** (immutable per-entity snapshots with attributes)
//! - Define **Events** (typed, context-tagged records of something happening)
//! - Define **Contexts** (causal tags linking actions to their effects)
//! - Define **Service calls** (commands targeting a registered service)
//! - Define **Schemas** (declarative validation for service and config payloads)
//! - Define **Integration descriptors** (domain, dependencies, timeouts)
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `hearth-core` or runtime crates.
//! All coordination behavior lives in `hearth-core`; this crate only models it.

pub mod context;
pub mod error;
pub mod event;
pub mod id;
pub mod integration;
pub mod schema;
pub mod service;
pub mod state;
pub mod time;
