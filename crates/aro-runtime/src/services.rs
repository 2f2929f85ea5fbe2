//! The runtime service bundle.
//!
//! The registries, event bus, repository store, global store, and shutdown
//! controller are process-wide singletons, initialized before the entry
//! feature set runs and torn down after `Application-End:*`. Everything
//! that executes statements holds one `Arc<RuntimeServices>`; components
//! refer to each other by name (event names, repository names, verb keys),
//! never by direct object reference, so there are no ownership cycles.

use std::sync::Arc;

use tokio::sync::mpsc;

use aro_core::event::EventEnvelope;

use crate::actions::ActionRegistry;
use crate::builtin;
use crate::context::GlobalStore;
use crate::events::EventBus;
use crate::qualifiers::QualifierRegistry;
use crate::repository::RepositoryStore;
use crate::shutdown::ShutdownController;

/// Everything an activation needs to execute statements.
pub struct RuntimeServices {
    pub actions: ActionRegistry,
    pub qualifiers: QualifierRegistry,
    pub events: Arc<EventBus>,
    pub repositories: RepositoryStore,
    pub globals: GlobalStore,
    pub shutdown: ShutdownController,
}

impl RuntimeServices {
    /// Creates the service bundle with the built-in actions registered and
    /// returns the event queue's consumer half for the scheduler.
    pub fn create() -> (Arc<Self>, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (bus, receiver) = EventBus::channel();
        let services = Arc::new(Self {
            actions: ActionRegistry::new(),
            qualifiers: QualifierRegistry::new(),
            events: Arc::clone(&bus),
            repositories: RepositoryStore::new(bus),
            globals: GlobalStore::new(),
            shutdown: ShutdownController::new(),
        });
        builtin::register_builtin_actions(&services.actions);
        crate::transforms::register_builtin_qualifiers(&services.qualifiers);
        (services, receiver)
    }
}
