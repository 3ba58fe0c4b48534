//! In-process event bus with per-subscription ordered delivery.
//!
//! Each subscription owns a FIFO queue and a worker task that invokes the
//! listener serially, so a listener sees events in publish order and is never
//! re-entered while still handling an earlier event. Queues are unbounded:
//! `publish` never blocks and never drops an event that has a matching
//! subscriber — a slow listener only delays itself.
//!
//! Listener failures (an `Err` return or a panic) are caught and logged here;
//! they never reach the publisher and never stop delivery to other
//! subscriptions.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use hearth_domain::error::HubError;
use hearth_domain::event::{Event, EventType};

/// Receives events delivered by the bus.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Short name used in logs when the listener fails.
    fn name(&self) -> &str {
        "listener"
    }

    async fn handle(&self, event: &Event) -> Result<(), HubError>;
}

struct FnListener<F> {
    name: &'static str,
    f: F,
}

#[async_trait]
impl<F, Fut> EventListener for FnListener<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HubError>> + Send,
{
    fn name(&self) -> &str {
        self.name
    }

    async fn handle(&self, event: &Event) -> Result<(), HubError> {
        (self.f)(event.clone()).await
    }
}

/// Wrap an async closure as an [`EventListener`].
pub fn listener_fn<F, Fut>(name: &'static str, f: F) -> Arc<dyn EventListener>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HubError>> + Send + 'static,
{
    Arc::new(FnListener { name, f })
}

/// Which events a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Only events of this exact type.
    Type(EventType),
    /// Every event published on the bus.
    All,
}

/// Handle identifying one subscription; pass to [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

struct Subscription {
    token: SubscriptionToken,
    tx: mpsc::UnboundedSender<Arc<Event>>,
    worker: JoinHandle<()>,
}

#[derive(Default)]
struct BusState {
    exact: HashMap<EventType, Vec<Subscription>>,
    wildcard: Vec<Subscription>,
    next_token: u64,
    closed: bool,
}

/// Publish/subscribe primitive for typed events.
///
/// Knows nothing about entities or services; those concepts live in the
/// registries built on top of it.
#[derive(Default)]
pub struct EventBus {
    state: Mutex<BusState>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener and spawn its delivery worker.
    ///
    /// The listener only sees events published after this call returns.
    pub fn subscribe(
        &self,
        filter: EventFilter,
        listener: Arc<dyn EventListener>,
    ) -> SubscriptionToken {
        let (tx, rx) = mpsc::unbounded_channel::<Arc<Event>>();
        let worker = tokio::spawn(deliver_loop(rx, listener));

        let mut state = self.state.lock();
        state.next_token += 1;
        let token = SubscriptionToken(state.next_token);
        let subscription = Subscription { token, tx, worker };
        match filter {
            EventFilter::Type(event_type) => {
                state.exact.entry(event_type).or_default().push(subscription);
            }
            EventFilter::All => state.wildcard.push(subscription),
        }
        token
    }

    /// Remove a subscription.
    ///
    /// Events already queued for it are still delivered; nothing new is
    /// enqueued after this returns. Returns whether the token was known.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut state = self.state.lock();
        for subscriptions in state.exact.values_mut() {
            if let Some(pos) = subscriptions.iter().position(|s| s.token == token) {
                subscriptions.remove(pos);
                return true;
            }
        }
        if let Some(pos) = state.wildcard.iter().position(|s| s.token == token) {
            state.wildcard.remove(pos);
            return true;
        }
        false
    }

    /// Publish an event to every matching subscription.
    ///
    /// Exact-type subscriptions are enqueued in registration order, then
    /// wildcard subscriptions. Never blocks; publishing with no matching
    /// subscriber is a no-op.
    pub fn publish(&self, event: Event) {
        let event = Arc::new(event);
        let state = self.state.lock();
        if state.closed {
            debug!(event_type = %event.event_type, "bus closed; dropping event");
            return;
        }
        let mut matched = 0_usize;
        if let Some(subscriptions) = state.exact.get(&event.event_type) {
            for subscription in subscriptions {
                if subscription.tx.send(Arc::clone(&event)).is_ok() {
                    matched += 1;
                }
            }
        }
        for subscription in &state.wildcard {
            if subscription.tx.send(Arc::clone(&event)).is_ok() {
                matched += 1;
            }
        }
        debug!(event_type = %event.event_type, subscribers = matched, "published event");
    }

    /// Number of live subscriptions (exact + wildcard).
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        let state = self.state.lock();
        state.exact.values().map(Vec::len).sum::<usize>() + state.wildcard.len()
    }

    /// Stop accepting events and drain outstanding deliveries.
    ///
    /// Closes every subscription queue, then waits up to `grace` for the
    /// workers to finish what was already enqueued. Workers still running
    /// when the grace elapses are aborted. Returns whether the drain
    /// completed in time.
    pub async fn close(&self, grace: Duration) -> bool {
        let workers: Vec<JoinHandle<()>> = {
            let mut state = self.state.lock();
            state.closed = true;
            let mut workers = Vec::new();
            for (_, subscriptions) in state.exact.drain() {
                workers.extend(subscriptions.into_iter().map(|s| s.worker));
            }
            workers.extend(state.wildcard.drain(..).map(|s| s.worker));
            workers
        };

        let deadline = tokio::time::Instant::now() + grace;
        let mut drained = true;
        for mut worker in workers {
            if tokio::time::timeout_at(deadline, &mut worker).await.is_err() {
                worker.abort();
                drained = false;
            }
        }
        if !drained {
            warn!(?grace, "event bus drain exceeded grace; aborted remaining listeners");
        }
        drained
    }
}

async fn deliver_loop(
    mut rx: mpsc::UnboundedReceiver<Arc<Event>>,
    listener: Arc<dyn EventListener>,
) {
    while let Some(event) = rx.recv().await {
        let outcome = std::panic::AssertUnwindSafe(listener.handle(&event))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(
                listener = listener.name(),
                event_type = %event.event_type,
                error = %err,
                "event listener failed"
            ),
            Err(_) => error!(
                listener = listener.name(),
                event_type = %event.event_type,
                "event listener panicked"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_domain::context::ContextSeq;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn event(seq: &ContextSeq, event_type: EventType) -> Event {
        Event::new(event_type, json!({}), seq.root())
    }

    fn recorder(bus: &EventBus, filter: EventFilter) -> UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        bus.subscribe(
            filter,
            listener_fn("recorder", move |event| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(event);
                    Ok(())
                }
            }),
        );
        rx
    }

    async fn recv(rx: &mut UnboundedReceiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("subscription closed")
    }

    #[tokio::test]
    async fn should_deliver_event_to_matching_subscriber() {
        let bus = EventBus::new();
        let seq = ContextSeq::new();
        let mut rx = recorder(&bus, EventFilter::Type(EventType::StateChanged));

        bus.publish(event(&seq, EventType::StateChanged));

        let received = recv(&mut rx).await;
        assert_eq!(received.event_type, EventType::StateChanged);
    }

    #[tokio::test]
    async fn should_not_deliver_other_event_types_to_exact_subscriber() {
        let bus = EventBus::new();
        let seq = ContextSeq::new();
        let mut rx = recorder(&bus, EventFilter::Type(EventType::StateChanged));

        bus.publish(event(&seq, EventType::ComponentLoaded));
        bus.publish(event(&seq, EventType::StateChanged));

        let received = recv(&mut rx).await;
        assert_eq!(received.event_type, EventType::StateChanged);
    }

    #[tokio::test]
    async fn should_deliver_every_event_to_wildcard_subscriber() {
        let bus = EventBus::new();
        let seq = ContextSeq::new();
        let mut rx = recorder(&bus, EventFilter::All);

        bus.publish(event(&seq, EventType::StateChanged));
        bus.publish(event(&seq, EventType::Custom("zwave_ready".to_string())));

        assert_eq!(recv(&mut rx).await.event_type, EventType::StateChanged);
        assert_eq!(
            recv(&mut rx).await.event_type,
            EventType::Custom("zwave_ready".to_string())
        );
    }

    #[tokio::test]
    async fn should_deliver_events_in_publish_order_per_subscriber() {
        let bus = EventBus::new();
        let seq = ContextSeq::new();
        let mut rx = recorder(&bus, EventFilter::All);

        let first = event(&seq, EventType::StateChanged);
        let second = event(&seq, EventType::StateChanged);
        let third = event(&seq, EventType::StateChanged);
        let ids = [first.id, second.id, third.id];
        bus.publish(first);
        bus.publish(second);
        bus.publish(third);

        for expected in ids {
            assert_eq!(recv(&mut rx).await.id, expected);
        }
    }

    #[tokio::test]
    async fn should_succeed_when_no_subscribers_match() {
        let bus = EventBus::new();
        let seq = ContextSeq::new();
        bus.publish(event(&seq, EventType::StateChanged));
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn should_stop_delivery_after_unsubscribe() {
        let bus = EventBus::new();
        let seq = ContextSeq::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = bus.subscribe(
            EventFilter::All,
            listener_fn("recorder", move |event: Event| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(event);
                    Ok(())
                }
            }),
        );

        assert!(bus.unsubscribe(token));
        assert!(!bus.unsubscribe(token));
        bus.publish(event(&seq, EventType::StateChanged));

        let outcome = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(outcome.is_err() || outcome.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_keep_delivering_when_another_listener_fails() {
        let bus = EventBus::new();
        let seq = ContextSeq::new();
        bus.subscribe(
            EventFilter::All,
            listener_fn("failing", |_event| async {
                Err(HubError::from(hearth_domain::error::SetupError::msg("boom")))
            }),
        );
        let mut rx = recorder(&bus, EventFilter::All);

        bus.publish(event(&seq, EventType::StateChanged));

        assert_eq!(recv(&mut rx).await.event_type, EventType::StateChanged);
    }

    #[tokio::test]
    async fn should_isolate_panicking_listener() {
        let bus = EventBus::new();
        let seq = ContextSeq::new();
        bus.subscribe(
            EventFilter::All,
            listener_fn("panicking", |_event| async {
                panic!("listener blew up");
            }),
        );
        let mut rx = recorder(&bus, EventFilter::All);

        bus.publish(event(&seq, EventType::StateChanged));
        bus.publish(event(&seq, EventType::ComponentLoaded));

        assert_eq!(recv(&mut rx).await.event_type, EventType::StateChanged);
        assert_eq!(recv(&mut rx).await.event_type, EventType::ComponentLoaded);
    }

    #[tokio::test]
    async fn should_drain_queued_events_on_close() {
        let bus = EventBus::new();
        let seq = ContextSeq::new();
        let mut rx = recorder(&bus, EventFilter::All);

        bus.publish(event(&seq, EventType::StateChanged));
        bus.publish(event(&seq, EventType::StateChanged));
        bus.publish(event(&seq, EventType::StateChanged));

        assert!(bus.close(Duration::from_secs(1)).await);

        let mut delivered = 0;
        while rx.recv().await.is_some() {
            delivered += 1;
        }
        assert_eq!(delivered, 3);
    }

    #[tokio::test]
    async fn should_report_incomplete_drain_when_listener_outlives_grace() {
        let bus = EventBus::new();
        let seq = ContextSeq::new();
        bus.subscribe(
            EventFilter::All,
            listener_fn("slow", |_event| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }),
        );

        bus.publish(event(&seq, EventType::StateChanged));
        assert!(!bus.close(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn should_drop_events_published_after_close() {
        let bus = EventBus::new();
        let seq = ContextSeq::new();
        assert!(bus.close(Duration::from_millis(50)).await);
        bus.publish(event(&seq, EventType::StateChanged));
        assert_eq!(bus.subscription_count(), 0);
    }
}
