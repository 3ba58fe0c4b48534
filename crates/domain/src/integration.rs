//! Integration descriptors and setup lifecycle states.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::id::Domain;
use crate::schema::Schema;

/// Immutable metadata describing an integration to the setup orchestrator.
///
/// Supplied once at startup by the integration-loading collaborator and
/// never mutated for the process lifetime.
#[derive(Debug, Clone)]
pub struct IntegrationDescriptor {
    /// Domain this integration owns.
    pub domain: Domain,
    /// Hard dependencies: must be ready before this integration may start.
    pub dependencies: Vec<Domain>,
    /// Soft dependencies: preferred ordering only, never blocking.
    pub after_dependencies: Vec<Domain>,
    /// Schema its configuration payload must satisfy, if declared.
    pub config_schema: Option<Schema>,
    /// Setup deadline; the orchestrator default applies when absent.
    pub setup_timeout: Option<Duration>,
}

impl IntegrationDescriptor {
    #[must_use]
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            dependencies: Vec::new(),
            after_dependencies: Vec::new(),
            config_schema: None,
            setup_timeout: None,
        }
    }

    /// Add a hard dependency.
    #[must_use]
    pub fn depends_on(mut self, domain: Domain) -> Self {
        self.dependencies.push(domain);
        self
    }

    /// Add a soft (after) dependency.
    #[must_use]
    pub fn after(mut self, domain: Domain) -> Self {
        self.after_dependencies.push(domain);
        self
    }

    #[must_use]
    pub fn with_config_schema(mut self, schema: Schema) -> Self {
        self.config_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn with_setup_timeout(mut self, timeout: Duration) -> Self {
        self.setup_timeout = Some(timeout);
        self
    }
}

/// Per-integration setup outcome.
///
/// Transitions are monotonic: `NotStarted → InProgress → terminal`, with the
/// shortcut `NotStarted → Failed` for transitive failures. Only an explicit
/// reload returns an integration to `NotStarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupState {
    NotStarted,
    InProgress,
    Ready,
    Failed,
    TimedOut,
}

impl SetupState {
    /// Whether this state ends the setup state machine.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::TimedOut)
    }

    /// Whether dependents must treat this integration as unavailable.
    #[must_use]
    pub fn is_broken(self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }
}

impl std::fmt::Display for SetupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}
