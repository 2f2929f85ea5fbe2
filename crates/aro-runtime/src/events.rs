//! The event bus and handler scheduler.
//!
//! Emission is a single MPSC channel: any activation may enqueue, only the
//! [`EventScheduler`] consumes. The scheduler drains envelopes in FIFO
//! order; for each envelope it finds every feature set whose identity
//! matches `*: <event> Handler` (and, for synthetic `<repo>-change`
//! events, `*: <repo> Observer`), evaluates the optional guard against the
//! payload, and spawns one fresh activation per passing handler.
//!
//! Ordering: handlers of one envelope run concurrently with each other,
//! but every handler of an earlier envelope is **spawned** before any
//! handler of a later one — the scheduler processes envelopes one at a
//! time. A handler's own emissions join the queue behind everything
//! already enqueued.
//!
//! Shutdown: the bus stops accepting, the queue is drained to quiescence
//! within the configured grace window, then outstanding activations are
//! cancelled at their next suspension point.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use aro_core::ast::FeatureSetKind;
use aro_core::event::EventEnvelope;
use aro_core::program::Program;
use aro_core::value::RuntimeValue;

use crate::context::ExecutionContext;
use crate::expr;
use crate::runner::FeatureSetRunner;
use crate::services::RuntimeServices;
use crate::shutdown::ShutdownReason;

/// Emitting this event name asks the runtime to shut down; its handlers
/// still run, as the last user-visible event of the process.
pub const SHUTDOWN_EVENT: &str = "application-shutdown";
/// Emitted by the scheduler when an event-triggered activation fails.
pub const HANDLER_ERROR_EVENT: &str = "application-handler-error";

// =============================================================================
// Event bus
// =============================================================================

/// The producer half of the process event queue.
#[derive(Debug)]
pub struct EventBus {
    sender: mpsc::UnboundedSender<EventEnvelope>,
    accepting: AtomicBool,
}

impl EventBus {
    /// Creates the bus and hands back the consumer half for the scheduler.
    pub fn channel() -> (Arc<EventBus>, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Arc::new(EventBus {
                sender,
                accepting: AtomicBool::new(true),
            }),
            receiver,
        )
    }

    /// Enqueues an event. Returns `false` when the bus has stopped
    /// accepting (shutdown in progress).
    pub fn emit(&self, kind: impl Into<String>, payload: RuntimeValue) -> bool {
        if !self.accepting.load(Ordering::SeqCst) {
            return false;
        }
        let envelope = EventEnvelope::new(kind, payload);
        debug!(event = %envelope.kind, "Event enqueued");
        self.sender.send(envelope).is_ok()
    }

    /// Stops accepting new events.
    pub fn close(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// The single consumer of the event queue.
pub struct EventScheduler {
    receiver: mpsc::UnboundedReceiver<EventEnvelope>,
    program: Arc<Program>,
    services: Arc<RuntimeServices>,
    grace: Duration,
    activations: JoinSet<()>,
    shutdown_event_seen: bool,
}

impl EventScheduler {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<EventEnvelope>,
        program: Arc<Program>,
        services: Arc<RuntimeServices>,
        grace: Duration,
    ) -> Self {
        Self {
            receiver,
            program,
            services,
            grace,
            activations: JoinSet::new(),
            shutdown_event_seen: false,
        }
    }

    /// Runs until shutdown, then drains and cancels. Intended to be spawned
    /// as its own task by the driver.
    pub async fn run(mut self) {
        let shutdown = self.services.shutdown.token();
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                maybe = self.receiver.recv() => match maybe {
                    Some(envelope) => self.dispatch(envelope),
                    None => break,
                },
            }
            // Reap finished activations without blocking the queue.
            while self.activations.try_join_next().is_some() {}
        }
        self.drain().await;
    }

    /// Drains the queue to quiescence within the grace window, then cancels
    /// whatever is still running.
    async fn drain(&mut self) {
        // Everything already enqueued is still delivered; the shutdown
        // notification joins the tail of the queue exactly once.
        while let Ok(envelope) = self.receiver.try_recv() {
            self.dispatch(envelope);
        }
        if !self.shutdown_event_seen {
            self.dispatch(EventEnvelope::new(SHUTDOWN_EVENT, RuntimeValue::Null));
        }
        self.services.events.close();
        let deadline = Instant::now() + self.grace;
        loop {
            while let Ok(envelope) = self.receiver.try_recv() {
                self.dispatch(envelope);
            }
            if self.activations.is_empty() {
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    outstanding = self.activations.len(),
                    "Grace period elapsed; cancelling outstanding handlers"
                );
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(remaining.min(Duration::from_millis(20))) => {}
                _ = self.activations.join_next() => {}
            }
        }
        self.activations.abort_all();
        while self.activations.join_next().await.is_some() {}
        info!("Event queue drained");
    }

    /// Schedules every matching handler of one envelope.
    fn dispatch(&mut self, envelope: EventEnvelope) {
        if envelope.kind == SHUTDOWN_EVENT {
            self.shutdown_event_seen = true;
            self.services
                .shutdown
                .request(ShutdownReason::Requested);
        }

        for (index, analyzed) in self.program.feature_sets.iter().enumerate() {
            let feature_set = &analyzed.feature_set;
            let matches = match feature_set.kind() {
                FeatureSetKind::EventHandler { event } => event == envelope.kind,
                FeatureSetKind::RepositoryObserver { repository } => {
                    format!("{repository}-change") == envelope.kind
                }
                _ => false,
            };
            if !matches {
                continue;
            }

            if let Some(guard) = &feature_set.guard {
                let ctx =
                    ExecutionContext::for_guard(self.services.globals.clone(), &envelope.payload);
                match expr::evaluate(guard, &ctx) {
                    Ok(value) if value.is_truthy() => {}
                    Ok(_) => {
                        debug!(handler = %feature_set.identity(), "Guard rejected event");
                        continue;
                    }
                    Err(error) => {
                        warn!(
                            handler = %feature_set.identity(),
                            %error,
                            "Guard evaluation failed; handler skipped"
                        );
                        continue;
                    }
                }
            }

            let program = Arc::clone(&self.program);
            let services = Arc::clone(&self.services);
            let payload = envelope.payload.clone();
            let event_kind = envelope.kind.clone();
            self.activations.spawn(async move {
                let analyzed = &program.feature_sets[index];
                let identity = analyzed.identity();
                let mut ctx =
                    ExecutionContext::child_for_event(services.globals.clone(), payload);
                let runner = FeatureSetRunner::new(Arc::clone(&services));
                if let Err(error) = runner.run(analyzed, &mut ctx).await {
                    warn!(handler = %identity, event = %event_kind, %error, "Handler failed");
                    // Failure of the error handler itself is only logged.
                    if event_kind != HANDLER_ERROR_EVENT {
                        services.events.emit(
                            HANDLER_ERROR_EVENT,
                            RuntimeValue::map([
                                ("handler", RuntimeValue::Text(identity)),
                                ("event", RuntimeValue::Text(event_kind)),
                                ("message", RuntimeValue::Text(error.to_string())),
                            ]),
                        );
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownReason;
    use aro_compiler::compile_source;

    fn program(source: &str) -> Arc<Program> {
        let (analyzed, diagnostics) = compile_source(source, None);
        assert!(
            !aro_core::diagnostics::has_errors(&diagnostics),
            "{diagnostics:?}"
        );
        Arc::new(Program {
            feature_sets: analyzed.feature_sets,
            globals: analyzed.globals,
        })
    }

    async fn run_to_quiescence(source: &str, events: &[(&str, RuntimeValue)]) -> Arc<RuntimeServices> {
        let (services, receiver) = RuntimeServices::create();
        let scheduler = EventScheduler::new(
            receiver,
            program(source),
            Arc::clone(&services),
            Duration::from_secs(5),
        );
        let handle = tokio::spawn(scheduler.run());

        for (kind, payload) in events {
            assert!(services.events.emit(*kind, payload.clone()));
        }
        // Let the normal phase process before shutting down.
        tokio::time::sleep(Duration::from_millis(50)).await;
        services.shutdown.request(ShutdownReason::Completed);
        handle.await.unwrap();
        services
    }

    #[tokio::test]
    async fn payloads_are_stored_in_emission_order() {
        let services = run_to_quiescence(
            r#"(record: greeting Handler) {
                Compute the <entry> from the <event>.
                Store the <entry> in the <greeting-repository>.
            }"#,
            &[
                ("greeting", RuntimeValue::map([("n", RuntimeValue::Int(1))])),
                ("greeting", RuntimeValue::map([("n", RuntimeValue::Int(2))])),
                ("greeting", RuntimeValue::map([("n", RuntimeValue::Int(3))])),
            ],
        )
        .await;

        let stored = services.repositories.retrieve_all("greeting-repository");
        let ns: Vec<_> = stored
            .as_list()
            .unwrap()
            .iter()
            .map(|e| e.property("n").cloned().unwrap())
            .collect();
        assert_eq!(ns, [RuntimeValue::Int(1), RuntimeValue::Int(2), RuntimeValue::Int(3)]);
    }

    #[tokio::test]
    async fn guards_filter_per_payload() {
        let services = run_to_quiescence(
            r#"(Welcome: UserCreated Handler) when <age> >= 18 {
                Compute the <entry> from the <event>.
                Store the <entry> in the <adult-repository>.
            }"#,
            &[
                ("UserCreated", RuntimeValue::map([("age", RuntimeValue::Int(17))])),
                ("UserCreated", RuntimeValue::map([("age", RuntimeValue::Int(21))])),
            ],
        )
        .await;
        assert_eq!(services.repositories.len("adult-repository"), 1);
    }

    #[tokio::test]
    async fn handler_failure_emits_the_error_event() {
        let services = run_to_quiescence(
            r#"(explode: boom Handler) {
                Throw the <bang> for the <caller>.
            }
            (catch: application-handler-error Handler) {
                Compute the <entry> from the <event>.
                Store the <entry> in the <error-repository>.
            }"#,
            &[("boom", RuntimeValue::Null)],
        )
        .await;

        let stored = services.repositories.retrieve_all("error-repository");
        let list = stored.as_list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(
            list[0].property("event"),
            Some(&RuntimeValue::Text("boom".into()))
        );
        assert_eq!(
            list[0].property("handler"),
            Some(&RuntimeValue::Text("explode: boom Handler".into()))
        );
        assert!(list[0].property("message").is_some());
    }

    #[tokio::test]
    async fn bus_refuses_events_after_close() {
        let (bus, _receiver) = EventBus::channel();
        assert!(bus.emit("x", RuntimeValue::Null));
        bus.close();
        assert!(!bus.emit("x", RuntimeValue::Null));
    }

    #[tokio::test]
    async fn unmatched_events_are_ignored() {
        let services = run_to_quiescence(
            r#"(record: greeting Handler) {
                Compute the <entry> from the <event>.
                Store the <entry> in the <greeting-repository>.
            }"#,
            &[("unrelated", RuntimeValue::Null)],
        )
        .await;
        assert!(services.repositories.is_empty("greeting-repository"));
    }
}
