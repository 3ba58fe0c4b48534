//! Per-integration setup status tracking.
//!
//! Each domain gets a `watch` channel so dependents can await a terminal
//! state without polling. Transitions are monotonic (`NotStarted →
//! InProgress → terminal`, with the `NotStarted → Failed` shortcut for
//! transitive failures); only an explicit reload resets a domain.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::warn;

use hearth_domain::id::Domain;
use hearth_domain::integration::SetupState;

fn rank(state: SetupState) -> u8 {
    match state {
        SetupState::NotStarted => 0,
        SetupState::InProgress => 1,
        SetupState::Ready | SetupState::Failed | SetupState::TimedOut => 2,
    }
}

/// Status board owned by the orchestrator.
#[derive(Default)]
pub struct StatusBoard {
    channels: RwLock<HashMap<Domain, watch::Sender<SetupState>>>,
}

impl StatusBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new domain starting at [`SetupState::NotStarted`].
    pub(crate) fn insert(&self, domain: Domain) {
        let mut channels = self.channels.write();
        channels
            .entry(domain)
            .or_insert_with(|| watch::channel(SetupState::NotStarted).0);
    }

    /// Current state of one domain.
    #[must_use]
    pub fn status(&self, domain: &Domain) -> Option<SetupState> {
        self.channels.read().get(domain).map(|tx| *tx.borrow())
    }

    /// Current state of every tracked domain.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<Domain, SetupState> {
        self.channels
            .read()
            .iter()
            .map(|(domain, tx)| (domain.clone(), *tx.borrow()))
            .collect()
    }

    /// Advance a domain's state; regressions are refused.
    ///
    /// Returns whether the transition was applied.
    pub(crate) fn transition(&self, domain: &Domain, next: SetupState) -> bool {
        let channels = self.channels.read();
        let Some(tx) = channels.get(domain) else {
            return false;
        };
        let mut applied = false;
        tx.send_modify(|current| {
            if rank(next) > rank(*current) {
                *current = next;
                applied = true;
            }
        });
        if !applied {
            warn!(%domain, %next, "refused setup state regression");
        }
        applied
    }

    /// Reset a domain to `NotStarted` for an explicit reload.
    pub(crate) fn reset(&self, domain: &Domain) {
        if let Some(tx) = self.channels.read().get(domain) {
            tx.send_replace(SetupState::NotStarted);
        }
    }

    /// Wait until `domain` reaches a terminal state and return it.
    ///
    /// Unknown domains report [`SetupState::Failed`].
    pub(crate) async fn wait_terminal(&self, domain: &Domain) -> SetupState {
        let mut rx = {
            let channels = self.channels.read();
            let Some(tx) = channels.get(domain) else {
                return SetupState::Failed;
            };
            tx.subscribe()
        };
        loop {
            let current = *rx.borrow_and_update();
            if current.is_terminal() {
                return current;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }
}
