//! Service dispatch — (domain, service) → handler.
//!
//! Handlers run on their own tasks. A blocking call waits for completion up
//! to a deadline; when the deadline passes the caller gets a timeout error
//! while the handler keeps running detached, so integration-internal state is
//! never abandoned half-mutated. Concurrent calls to the same service are not
//! serialized here — the handler owns its internal consistency.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use hearth_domain::context::ContextSeq;
use hearth_domain::error::ServiceError;
use hearth_domain::event::Event;
use hearth_domain::id::Domain;
use hearth_domain::schema::Schema;
use hearth_domain::service::ServiceCall;

use crate::event_bus::EventBus;

/// Handles calls for one registered service.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    /// Run the service. The returned value is handed back to blocking
    /// callers that set `return_response`.
    async fn handle(
        &self,
        call: ServiceCall,
    ) -> Result<Option<serde_json::Value>, anyhow::Error>;
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ServiceHandler for FnHandler<F>
where
    F: Fn(ServiceCall) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<serde_json::Value>, anyhow::Error>> + Send,
{
    async fn handle(
        &self,
        call: ServiceCall,
    ) -> Result<Option<serde_json::Value>, anyhow::Error> {
        (self.f)(call).await
    }
}

/// Wrap an async closure as a [`ServiceHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ServiceHandler>
where
    F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<serde_json::Value>, anyhow::Error>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

struct ServiceEntry {
    handler: Arc<dyn ServiceHandler>,
    schema: Option<Schema>,
}

/// Registry and dispatcher for services.
pub struct ServiceRegistry {
    services: RwLock<HashMap<(Domain, String), ServiceEntry>>,
    bus: Arc<EventBus>,
    contexts: Arc<ContextSeq>,
    default_timeout: Duration,
    cancel: CancellationToken,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new(
        bus: Arc<EventBus>,
        contexts: Arc<ContextSeq>,
        default_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            bus,
            contexts,
            default_timeout,
            cancel,
        }
    }

    /// Register a service and publish `service_registered`.
    ///
    /// Re-registering an existing (domain, service) replaces the handler.
    pub fn register(
        &self,
        domain: Domain,
        service: impl Into<String>,
        handler: Arc<dyn ServiceHandler>,
        schema: Option<Schema>,
    ) {
        let service = service.into();
        let mut services = self.services.write();
        let replaced = services
            .insert(
                (domain.clone(), service.clone()),
                ServiceEntry { handler, schema },
            )
            .is_some();
        self.bus
            .publish(Event::service_registered(&domain, &service, self.contexts.root()));
        drop(services);

        if replaced {
            warn!(%domain, service, "service handler replaced");
        } else {
            debug!(%domain, service, "service registered");
        }
    }

    /// Remove a service and publish `service_removed`.
    ///
    /// Returns whether the service existed.
    pub fn unregister(&self, domain: &Domain, service: &str) -> bool {
        let mut services = self.services.write();
        let removed = services
            .remove(&(domain.clone(), service.to_string()))
            .is_some();
        if removed {
            self.bus
                .publish(Event::service_removed(domain, service, self.contexts.root()));
        }
        drop(services);

        if removed {
            debug!(%domain, service, "service unregistered");
        }
        removed
    }

    #[must_use]
    pub fn has_service(&self, domain: &Domain, service: &str) -> bool {
        self.services
            .read()
            .contains_key(&(domain.clone(), service.to_string()))
    }

    /// Names of services registered under `domain`, ordered.
    #[must_use]
    pub fn services_for(&self, domain: &Domain) -> Vec<String> {
        let mut names: Vec<String> = self
            .services
            .read()
            .keys()
            .filter(|(d, _)| d == domain)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// Dispatch a service call.
    ///
    /// The call's data is validated against the registered schema (when one
    /// was declared), a child context is created for the handler, and the
    /// handler runs on its own task.
    ///
    /// With `blocking`, the caller waits until the handler completes or
    /// `timeout` (the registry default when `None`) elapses; on timeout the
    /// handler keeps running detached. Without `blocking`, returns `Ok(None)`
    /// as soon as the handler is scheduled.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotFound`], [`ServiceError::InvalidData`],
    /// [`ServiceError::Timeout`], [`ServiceError::HandlerFailed`],
    /// [`ServiceError::HandlerPanicked`], or [`ServiceError::Cancelled`]
    /// when the hub is shutting down.
    pub async fn call(
        &self,
        mut call: ServiceCall,
        blocking: bool,
        timeout: Option<Duration>,
    ) -> Result<Option<serde_json::Value>, ServiceError> {
        if self.cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }

        let (handler, schema) = {
            let services = self.services.read();
            let entry = services
                .get(&(call.domain.clone(), call.service.clone()))
                .ok_or_else(|| ServiceError::NotFound {
                    domain: call.domain.clone(),
                    service: call.service.clone(),
                })?;
            (Arc::clone(&entry.handler), entry.schema.clone())
        };

        if let Some(schema) = &schema {
            schema.validate(&call.data)?;
        }

        let parent = call.context;
        call.context = self.contexts.child_of(&parent);

        let domain = call.domain.clone();
        let service = call.service.clone();
        let want_response = call.return_response;
        let timeout = timeout.unwrap_or(self.default_timeout);

        let (done_tx, done_rx) = oneshot::channel();
        {
            let domain = domain.clone();
            let service = service.clone();
            tokio::spawn(async move {
                let outcome = std::panic::AssertUnwindSafe(handler.handle(call))
                    .catch_unwind()
                    .await;
                let outcome: Result<Option<serde_json::Value>, ServiceError> = match outcome {
                    Ok(Ok(response)) => Ok(response),
                    Ok(Err(cause)) => Err(ServiceError::HandlerFailed { cause }),
                    Err(_) => Err(ServiceError::HandlerPanicked),
                };
                if done_tx.send(outcome).is_err() {
                    debug!(%domain, service, "service call finished after caller detached");
                }
            });
        }

        if !blocking {
            debug!(%domain, service, "service call scheduled");
            return Ok(None);
        }

        tokio::select! {
            () = self.cancel.cancelled() => Err(ServiceError::Cancelled),
            waited = tokio::time::timeout(timeout, done_rx) => match waited {
                Ok(Ok(outcome)) => outcome.map(|response| if want_response { response } else { None }),
                Ok(Err(_closed)) => Err(ServiceError::Cancelled),
                Err(_elapsed) => {
                    warn!(%domain, service, ?timeout, "service call timed out; handler continues detached");
                    Err(ServiceError::Timeout { domain, service, timeout })
                }
            },
        }
    }
}
