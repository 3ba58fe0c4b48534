//! Error types shared across the workspace.
//!
//! Each concern gets its own typed enum; [`HubError`] aggregates them with
//! `#[from]` conversions. Integration-supplied causes cross component
//! boundaries as values (`anyhow::Error`), never as panics.

use std::time::Duration;

use thiserror::Error;

use crate::id::Domain;
use crate::schema::FieldKind;

/// A domain name that is not a valid lowercase slug.
#[derive(Debug, Error)]
#[error("invalid domain name: {value:?}")]
pub struct InvalidDomain {
    pub value: String,
}

/// An entity id that is not of the form `domain.object_id`.
#[derive(Debug, Error)]
#[error("invalid entity id (expected `domain.object_id`): {value:?}")]
pub struct InvalidEntityId {
    pub value: String,
}

fn format_cycle(cycle: &[Domain]) -> String {
    let mut out = cycle
        .iter()
        .map(Domain::as_str)
        .collect::<Vec<_>>()
        .join(" -> ");
    if let Some(first) = cycle.first() {
        out.push_str(" -> ");
        out.push_str(first.as_str());
    }
    out
}

/// Startup-time configuration problems.
///
/// Fatal to the affected integration (or, for cycles, to the whole setup
/// run) but never to an already-running hub.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Hard dependencies form a cycle; names every domain on the cycle in
    /// order.
    #[error("dependency cycle detected: {}", format_cycle(.cycle))]
    DependencyCycle { cycle: Vec<Domain> },

    /// A hard dependency names a domain nobody registered.
    #[error("integration `{domain}` depends on unknown domain `{dependency}`")]
    UnknownDependency { domain: Domain, dependency: Domain },

    /// The same domain was registered twice.
    #[error("integration `{domain}` registered more than once")]
    DuplicateDomain { domain: Domain },

    /// An operation named a domain nobody registered.
    #[error("no integration registered for domain `{domain}`")]
    UnknownDomain { domain: Domain },
}

/// Payload validation failures.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("expected an object payload, got {found}")]
    NotAnObject { found: &'static str },

    #[error("missing required field `{field}`")]
    MissingField { field: String },

    #[error("field `{field}` expected {expected}, got {found}")]
    WrongType {
        field: String,
        expected: FieldKind,
        found: &'static str,
    },

    #[error("unknown field `{field}`")]
    UnknownField { field: String },
}

/// Failures reported to service callers.
///
/// These never crash the dispatcher; they are returned to the caller of
/// `call` and nothing else.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown service `{domain}.{service}`")]
    NotFound { domain: Domain, service: String },

    #[error("invalid service data: {0}")]
    InvalidData(#[from] SchemaError),

    /// The handler outlived the caller's deadline; it keeps running
    /// detached.
    #[error("service call `{domain}.{service}` timed out after {timeout:?}")]
    Timeout {
        domain: Domain,
        service: String,
        timeout: Duration,
    },

    #[error("service handler failed: {cause:#}")]
    HandlerFailed { cause: anyhow::Error },

    #[error("service handler panicked")]
    HandlerPanicked,

    #[error("service call cancelled by shutdown")]
    Cancelled,
}

/// Failure outcome crossing the setup orchestrator boundary.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SetupError {
    /// Setup could not complete; the cause comes from integration code.
    #[error("setup failed: {cause:#}")]
    Failed { cause: anyhow::Error },

    /// Unload hook reported a failure during teardown.
    #[error("unload failed: {cause:#}")]
    Unload { cause: anyhow::Error },
}

impl SetupError {
    #[must_use]
    pub fn failed(cause: impl Into<anyhow::Error>) -> Self {
        Self::Failed {
            cause: cause.into(),
        }
    }

    /// Build a failure from a plain message.
    #[must_use]
    pub fn msg(message: impl std::fmt::Display) -> Self {
        Self::Failed {
            cause: anyhow::anyhow!("{message}"),
        }
    }
}

impl From<anyhow::Error> for SetupError {
    fn from(cause: anyhow::Error) -> Self {
        Self::Failed { cause }
    }
}

/// Top-level error for hub core operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum HubError {
    #[error(transparent)]
    InvalidDomain(#[from] InvalidDomain),

    #[error(transparent)]
    InvalidEntityId(#[from] InvalidEntityId),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Setup(#[from] SetupError),
}
