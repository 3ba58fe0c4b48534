//! Contexts — causal tags linking an action to the events and state changes
//! it produced.
//!
//! Every event and state change carries a [`Context`]. A context optionally
//! references a parent context, so a consumer can trace "this state change
//! was caused by that service call" across component boundaries.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Monotonically increasing context identifier.
///
/// Ids are strictly increasing in issue order, so two contexts from the same
/// process can always be ordered causally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(u64);

impl ContextId {
    /// Access the raw sequence value.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Causal identifier attached to an event or state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Identifier of this context.
    pub id: ContextId,
    /// The context that caused this one, if any.
    pub parent: Option<ContextId>,
}

/// Issues process-wide, strictly increasing context ids.
///
/// One instance is shared by every registry in a hub so that ids remain
/// comparable across state changes and service calls.
#[derive(Debug, Default)]
pub struct ContextSeq(AtomicU64);

impl ContextSeq {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next context id.
    pub fn next_id(&self) -> ContextId {
        ContextId(self.0.fetch_add(1, Ordering::Relaxed))
    }

    /// Create a fresh context with no parent.
    pub fn root(&self) -> Context {
        Context {
            id: self.next_id(),
            parent: None,
        }
    }

    /// Create a context caused by `parent`.
    pub fn child_of(&self, parent: &Context) -> Context {
        Context {
            id: self.next_id(),
            parent: Some(parent.id),
        }
    }
}
