//! Setup orchestration — dependency-ordered, concurrent integration loading.
//!
//! Integrations are registered with a descriptor, an implementation, and a
//! configuration value, then loaded by [`Orchestrator::run`]: the dependency
//! graph is validated up front (cycles and unknown hard dependencies are
//! fatal to the run before any setup code executes), every integration gets
//! its own task, and each task gates on its hard dependencies reaching
//! `Ready`. A failed or timed-out dependency fails its dependents without
//! ever invoking their setup. A degraded hub with some integrations failed
//! still comes up for the ones that succeeded.

mod board;
mod graph;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hearth_domain::error::ConfigError;
use hearth_domain::event::Event;
use hearth_domain::id::Domain;
use hearth_domain::integration::{IntegrationDescriptor, SetupState};

use crate::hub::Hub;
use crate::integration::Integration;

use board::StatusBoard;
use graph::DependencyGraph;

/// Outcome of a full setup run.
#[derive(Debug, Clone, Default)]
pub struct SetupSummary {
    pub ready: Vec<Domain>,
    pub failed: Vec<Domain>,
    pub timed_out: Vec<Domain>,
}

struct Registration {
    descriptor: IntegrationDescriptor,
    integration: Arc<dyn Integration>,
    config: serde_json::Value,
}

/// Loads integrations in dependency order and tracks their lifecycle.
pub struct Orchestrator {
    hub: Arc<Hub>,
    registrations: RwLock<HashMap<Domain, Arc<Registration>>>,
    order: RwLock<Vec<Domain>>,
    board: Arc<StatusBoard>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(hub: Arc<Hub>) -> Self {
        Self {
            hub,
            registrations: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            board: Arc::new(StatusBoard::new()),
        }
    }

    /// Register an integration for the next setup run.
    ///
    /// # Errors
    ///
    /// [`ConfigError::DuplicateDomain`] when the domain is already
    /// registered.
    pub fn add(
        &self,
        descriptor: IntegrationDescriptor,
        integration: Arc<dyn Integration>,
        config: serde_json::Value,
    ) -> Result<(), ConfigError> {
        let domain = descriptor.domain.clone();
        let mut registrations = self.registrations.write();
        if registrations.contains_key(&domain) {
            return Err(ConfigError::DuplicateDomain { domain });
        }
        registrations.insert(
            domain.clone(),
            Arc::new(Registration {
                descriptor,
                integration,
                config,
            }),
        );
        drop(registrations);
        self.order.write().push(domain.clone());
        self.board.insert(domain);
        Ok(())
    }

    /// Load every registered integration.
    ///
    /// Integrations whose hard dependencies are already satisfied start
    /// concurrently; the rest start as their dependencies become ready.
    /// Once no integration remains in progress, a `startup_complete` event
    /// carrying the summary is published — regardless of partial failures.
    ///
    /// # Errors
    ///
    /// [`ConfigError::DependencyCycle`] or
    /// [`ConfigError::UnknownDependency`], reported before any setup code
    /// runs.
    pub async fn run(&self) -> Result<SetupSummary, ConfigError> {
        let ordered: Vec<Arc<Registration>> = {
            let registrations = self.registrations.read();
            let order = self.order.read();

            let in_order: Vec<Arc<Registration>> = order
                .iter()
                .filter_map(|domain| registrations.get(domain).cloned())
                .collect();
            let graph = DependencyGraph::build(in_order.iter().map(|reg| &reg.descriptor));
            if let Err(err) = graph.validate() {
                error!(error = %err, "integration graph rejected; nothing was set up");
                return Err(err);
            }
            graph
                .start_order()
                .iter()
                .filter_map(|domain| registrations.get(domain).cloned())
                .collect()
        };

        info!(integrations = ordered.len(), "starting integration setup");
        let cancel = self.hub.cancellation();
        let default_timeout = self.hub.config().default_setup_timeout();

        let mut tasks = JoinSet::new();
        for registration in ordered {
            tasks.spawn(setup_task(
                Arc::clone(&self.hub),
                registration,
                Arc::clone(&self.board),
                cancel.clone(),
                default_timeout,
            ));
        }
        while tasks.join_next().await.is_some() {}

        let summary = self.summary();
        self.hub.bus().publish(Event::startup_complete(
            &summary.ready,
            &summary.failed,
            &summary.timed_out,
            self.hub.contexts().root(),
        ));
        info!(
            ready = summary.ready.len(),
            failed = summary.failed.len(),
            timed_out = summary.timed_out.len(),
            "startup complete"
        );
        Ok(summary)
    }

    /// Tear down and re-run one integration through the setup state machine.
    ///
    /// The previous instance is unloaded first (under the configured unload
    /// timeout; an unload failure is logged and the reload proceeds). The
    /// integration lands in `Ready` or `Failed`, never `InProgress`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownDomain`] when no such integration was
    /// registered.
    pub async fn reload(&self, domain: &Domain) -> Result<SetupState, ConfigError> {
        let registration = self
            .registrations
            .read()
            .get(domain)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownDomain {
                domain: domain.clone(),
            })?;

        if self.board.status(domain) == Some(SetupState::InProgress) {
            self.board.wait_terminal(domain).await;
        }

        if self.board.status(domain) == Some(SetupState::Ready) {
            info!(%domain, "unloading before reload");
            let unload_timeout = self.hub.config().unload_timeout();
            let unload = registration.integration.unload(Arc::clone(&self.hub));
            match tokio::time::timeout(unload_timeout, unload).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(%domain, error = %err, "unload failed; reloading anyway");
                }
                Err(_elapsed) => {
                    warn!(%domain, ?unload_timeout, "unload timed out; reloading anyway");
                }
            }
        }

        for dep in &registration.descriptor.dependencies {
            if self.board.status(dep) != Some(SetupState::Ready) {
                warn!(%domain, dependency = %dep, "dependency not ready; reload fails without setup");
                self.board.reset(domain);
                self.board.transition(domain, SetupState::Failed);
                return Ok(SetupState::Failed);
            }
        }

        self.board.reset(domain);
        setup_task(
            Arc::clone(&self.hub),
            registration,
            Arc::clone(&self.board),
            self.hub.cancellation(),
            self.hub.config().default_setup_timeout(),
        )
        .await;
        Ok(self.board.status(domain).unwrap_or(SetupState::Failed))
    }

    /// Current setup state of one integration.
    #[must_use]
    pub fn status(&self, domain: &Domain) -> Option<SetupState> {
        self.board.status(domain)
    }

    /// Current setup state of every registered integration.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<Domain, SetupState> {
        self.board.snapshot()
    }

    fn summary(&self) -> SetupSummary {
        let mut summary = SetupSummary::default();
        for (domain, state) in self.board.snapshot() {
            match state {
                SetupState::Ready => summary.ready.push(domain),
                SetupState::TimedOut => summary.timed_out.push(domain),
                SetupState::NotStarted | SetupState::InProgress | SetupState::Failed => {
                    summary.failed.push(domain);
                }
            }
        }
        summary
    }
}

/// Run one integration through the setup state machine.
async fn setup_task(
    hub: Arc<Hub>,
    registration: Arc<Registration>,
    board: Arc<StatusBoard>,
    cancel: CancellationToken,
    default_timeout: Duration,
) {
    let domain = registration.descriptor.domain.clone();

    for dep in &registration.descriptor.dependencies {
        let dep_state = tokio::select! {
            () = cancel.cancelled() => {
                warn!(%domain, "setup cancelled before start");
                board.transition(&domain, SetupState::Failed);
                return;
            }
            state = board.wait_terminal(dep) => state,
        };
        if dep_state.is_broken() {
            warn!(%domain, dependency = %dep, "dependency unavailable; failing without setup");
            board.transition(&domain, SetupState::Failed);
            return;
        }
    }

    if let Some(schema) = &registration.descriptor.config_schema {
        if let Err(err) = schema.validate(&registration.config) {
            error!(%domain, error = %err, "integration configuration invalid");
            board.transition(&domain, SetupState::Failed);
            return;
        }
    }

    if !board.transition(&domain, SetupState::InProgress) {
        return;
    }
    let timeout = registration
        .descriptor
        .setup_timeout
        .unwrap_or(default_timeout);
    debug!(%domain, ?timeout, "invoking integration setup");

    let setup = registration
        .integration
        .setup(Arc::clone(&hub), registration.config.clone());
    tokio::select! {
        () = cancel.cancelled() => {
            warn!(%domain, "setup cancelled by shutdown");
            board.transition(&domain, SetupState::Failed);
        }
        outcome = tokio::time::timeout(timeout, setup) => match outcome {
            Ok(Ok(())) => {
                board.transition(&domain, SetupState::Ready);
                hub.bus()
                    .publish(Event::component_loaded(&domain, hub.contexts().root()));
                info!(%domain, "integration ready");
            }
            Ok(Err(err)) => {
                error!(%domain, error = %err, "integration setup failed");
                board.transition(&domain, SetupState::Failed);
            }
            Err(_elapsed) => {
                error!(%domain, ?timeout, "integration setup timed out");
                board.transition(&domain, SetupState::TimedOut);
            }
        },
    }
}
