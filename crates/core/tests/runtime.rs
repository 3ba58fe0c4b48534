//! Cross-component scenarios driving the hub the way integrations and
//! automations do: setup orchestration over a dependency graph, state writes
//! fanning out as events, service dispatch, and graceful shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use hearth_core::config::RuntimeConfig;
use hearth_core::event_bus::{EventFilter, listener_fn};
use hearth_core::hub::Hub;
use hearth_core::integration::Integration;
use hearth_core::service_registry::handler_fn;
use hearth_core::setup::Orchestrator;
use hearth_domain::error::{ConfigError, ServiceError, SetupError};
use hearth_domain::event::{Event, EventType};
use hearth_domain::id::{Domain, EntityId};
use hearth_domain::integration::{IntegrationDescriptor, SetupState};
use hearth_domain::service::ServiceCall;
use hearth_domain::state::Attributes;

fn domain(name: &str) -> Domain {
    Domain::new(name).unwrap()
}

struct CountingIntegration {
    invocations: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl Integration for CountingIntegration {
    async fn setup(&self, _hub: Arc<Hub>, _config: serde_json::Value) -> Result<(), SetupError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(SetupError::msg("hardware missing"))
        } else {
            Ok(())
        }
    }
}

fn counting(invocations: &Arc<AtomicUsize>, fail: bool) -> Arc<CountingIntegration> {
    Arc::new(CountingIntegration {
        invocations: Arc::clone(invocations),
        fail,
    })
}

/// An integration that registers a service and publishes a state on setup.
struct LightIntegration;

#[async_trait]
impl Integration for LightIntegration {
    async fn setup(&self, hub: Arc<Hub>, _config: serde_json::Value) -> Result<(), SetupError> {
        let states = Arc::clone(hub.states());
        hub.services().register(
            domain("light"),
            "turn_on",
            handler_fn(move |call: ServiceCall| {
                let states = Arc::clone(&states);
                async move {
                    if let Some(target) = &call.target {
                        states.set(target.clone(), "on", Attributes::new(), Some(&call.context));
                    }
                    Ok(None)
                }
            }),
            None,
        );
        hub.states().set(
            EntityId::new("light.living_room").unwrap(),
            "off",
            Attributes::new(),
            None,
        );
        Ok(())
    }

    async fn unload(&self, hub: Arc<Hub>) -> Result<(), SetupError> {
        hub.services().unregister(&domain("light"), "turn_on");
        Ok(())
    }
}

fn subscribe(hub: &Hub, filter: EventFilter) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    hub.bus().subscribe(
        filter,
        listener_fn("test_recorder", move |event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event);
                Ok(())
            }
        }),
    );
    rx
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("subscription closed")
}

#[tokio::test]
async fn should_fail_chain_without_invoking_dependent_setups() {
    let hub = Hub::new(RuntimeConfig::default());
    let orchestrator = Orchestrator::new(Arc::clone(&hub));

    let a_invocations = Arc::new(AtomicUsize::new(0));
    let b_invocations = Arc::new(AtomicUsize::new(0));
    let c_invocations = Arc::new(AtomicUsize::new(0));

    orchestrator
        .add(
            IntegrationDescriptor::new(domain("a")),
            counting(&a_invocations, true),
            json!({}),
        )
        .unwrap();
    orchestrator
        .add(
            IntegrationDescriptor::new(domain("b")).depends_on(domain("a")),
            counting(&b_invocations, false),
            json!({}),
        )
        .unwrap();
    orchestrator
        .add(
            IntegrationDescriptor::new(domain("c")).depends_on(domain("b")),
            counting(&c_invocations, false),
            json!({}),
        )
        .unwrap();

    let summary = orchestrator.run().await.unwrap();

    assert_eq!(summary.ready.len(), 0);
    assert_eq!(
        summary.failed,
        vec![domain("a"), domain("b"), domain("c")]
    );
    assert_eq!(a_invocations.load(Ordering::SeqCst), 1);
    assert_eq!(b_invocations.load(Ordering::SeqCst), 0);
    assert_eq!(c_invocations.load(Ordering::SeqCst), 0);
    assert_eq!(orchestrator.status(&domain("b")), Some(SetupState::Failed));
    assert_eq!(orchestrator.status(&domain("c")), Some(SetupState::Failed));
}

#[tokio::test]
async fn should_detect_cycle_before_any_setup_runs() {
    let hub = Hub::new(RuntimeConfig::default());
    let orchestrator = Orchestrator::new(hub);
    let invocations = Arc::new(AtomicUsize::new(0));

    orchestrator
        .add(
            IntegrationDescriptor::new(domain("a")).depends_on(domain("b")),
            counting(&invocations, false),
            json!({}),
        )
        .unwrap();
    orchestrator
        .add(
            IntegrationDescriptor::new(domain("b")).depends_on(domain("c")),
            counting(&invocations, false),
            json!({}),
        )
        .unwrap();
    orchestrator
        .add(
            IntegrationDescriptor::new(domain("c")).depends_on(domain("a")),
            counting(&invocations, false),
            json!({}),
        )
        .unwrap();

    let err = orchestrator.run().await.unwrap_err();

    let message = err.to_string();
    assert!(matches!(err, ConfigError::DependencyCycle { .. }));
    for name in ["a", "b", "c"] {
        assert!(message.contains(name), "cycle report missing `{name}`: {message}");
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn should_publish_component_loaded_and_startup_complete() {
    let hub = Hub::new(RuntimeConfig::default());
    let orchestrator = Orchestrator::new(Arc::clone(&hub));
    let mut loaded = subscribe(&hub, EventFilter::Type(EventType::ComponentLoaded));
    let mut complete = subscribe(&hub, EventFilter::Type(EventType::StartupComplete));

    let invocations = Arc::new(AtomicUsize::new(0));
    orchestrator
        .add(
            IntegrationDescriptor::new(domain("light")),
            counting(&invocations, false),
            json!({}),
        )
        .unwrap();
    orchestrator
        .add(
            IntegrationDescriptor::new(domain("broken")),
            counting(&invocations, true),
            json!({}),
        )
        .unwrap();

    orchestrator.run().await.unwrap();

    let loaded_event = recv(&mut loaded).await;
    assert_eq!(loaded_event.data["domain"], "light");

    let complete_event = recv(&mut complete).await;
    assert_eq!(complete_event.data["ready"][0], "light");
    assert_eq!(complete_event.data["failed"][0], "broken");
}

#[tokio::test]
async fn should_serve_calls_from_ready_integrations_in_degraded_hub() {
    let hub = Hub::new(RuntimeConfig::default());
    let orchestrator = Orchestrator::new(Arc::clone(&hub));
    let invocations = Arc::new(AtomicUsize::new(0));

    orchestrator
        .add(
            IntegrationDescriptor::new(domain("light")),
            Arc::new(LightIntegration),
            json!({}),
        )
        .unwrap();
    orchestrator
        .add(
            IntegrationDescriptor::new(domain("broken")),
            counting(&invocations, true),
            json!({}),
        )
        .unwrap();
    orchestrator.run().await.unwrap();

    let call = ServiceCall::new(
        domain("light"),
        "turn_on",
        json!({}),
        hub.contexts().root(),
    )
    .with_target(EntityId::new("light.living_room").unwrap());
    hub.services().call(call, true, None).await.unwrap();

    let state = hub
        .states()
        .get(&EntityId::new("light.living_room").unwrap())
        .unwrap();
    assert_eq!(state.value, "on");
}

#[tokio::test]
async fn should_trace_state_change_back_to_service_call() {
    let hub = Hub::new(RuntimeConfig::default());
    let orchestrator = Orchestrator::new(Arc::clone(&hub));
    orchestrator
        .add(
            IntegrationDescriptor::new(domain("light")),
            Arc::new(LightIntegration),
            json!({}),
        )
        .unwrap();
    orchestrator.run().await.unwrap();

    let caller = hub.contexts().root();
    let call = ServiceCall::new(domain("light"), "turn_on", json!({}), caller)
        .with_target(EntityId::new("light.living_room").unwrap());
    hub.services().call(call, true, None).await.unwrap();

    let state = hub
        .states()
        .get(&EntityId::new("light.living_room").unwrap())
        .unwrap();
    // set() created a child of the handler's context, which is a child of
    // the caller's; the parent chain is present either way.
    assert!(state.context.parent.is_some());
    assert!(state.context.id > caller.id);
}

#[tokio::test]
async fn should_time_out_blocking_call_and_let_handler_finish() {
    let hub = Hub::new(RuntimeConfig::default());
    let finished = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&finished);
    hub.services().register(
        domain("vacuum"),
        "start",
        handler_fn(move |_call| {
            let flag = Arc::clone(&flag);
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                flag.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        }),
        None,
    );

    let started = std::time::Instant::now();
    let result = hub
        .services()
        .call(
            ServiceCall::new(domain("vacuum"), "start", json!({}), hub.contexts().root()),
            true,
            Some(Duration::from_millis(30)),
        )
        .await;

    assert!(matches!(result, Err(ServiceError::Timeout { .. })));
    assert!(started.elapsed() < Duration::from_millis(150));
    assert_eq!(finished.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn should_reload_through_unload_into_terminal_state() {
    let hub = Hub::new(RuntimeConfig::default());
    let orchestrator = Orchestrator::new(Arc::clone(&hub));
    orchestrator
        .add(
            IntegrationDescriptor::new(domain("light")),
            Arc::new(LightIntegration),
            json!({}),
        )
        .unwrap();
    orchestrator.run().await.unwrap();
    assert!(hub.services().has_service(&domain("light"), "turn_on"));

    let state = orchestrator.reload(&domain("light")).await.unwrap();

    assert_eq!(state, SetupState::Ready);
    // Setup re-registered the service the unload hook removed.
    assert!(hub.services().has_service(&domain("light"), "turn_on"));
}

#[tokio::test]
async fn should_publish_state_changed_for_every_set() {
    let hub = Hub::new(RuntimeConfig::default());
    let mut rx = subscribe(&hub, EventFilter::Type(EventType::StateChanged));
    let entity = EntityId::new("sensor.temperature").unwrap();

    hub.states().set(entity.clone(), "20.1", Attributes::new(), None);
    hub.states().set(entity.clone(), "20.1", Attributes::new(), None);
    hub.states().set(entity.clone(), "20.4", Attributes::new(), None);

    for expected in ["20.1", "20.1", "20.4"] {
        let event = recv(&mut rx).await;
        assert_eq!(event.data["new_state"]["value"], expected);
        assert_eq!(event.entity_id(), Some(entity.clone()));
    }
}

#[tokio::test]
async fn should_drain_listeners_and_refuse_work_after_stop() {
    let hub = Hub::new(RuntimeConfig::default());
    let mut rx = subscribe(&hub, EventFilter::Type(EventType::ShutdownBegan));
    hub.services().register(
        domain("light"),
        "turn_on",
        handler_fn(|_call| async { Ok(None) }),
        None,
    );

    assert!(hub.stop().await);
    assert_eq!(recv(&mut rx).await.event_type, EventType::ShutdownBegan);

    let result = hub
        .services()
        .call(
            ServiceCall::new(domain("light"), "turn_on", json!({}), hub.contexts().root()),
            true,
            None,
        )
        .await;
    assert!(matches!(result, Err(ServiceError::Cancelled)));
}
