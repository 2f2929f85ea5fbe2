//! Execution contexts and the published-global store.
//!
//! An [`ExecutionContext`] is the activation-local variable store of one
//! feature-set run. Reads fall back to the process-wide [`GlobalStore`]
//! that `publish` writes to, so a published value is visible to every
//! activation that starts after the publishing statement — synchronously,
//! because `publish` commits before the next statement runs.
//!
//! Child contexts (event handlers, repository observers) start from a fresh
//! variable map seeded with the event payload under `event`; they can only
//! communicate back through repositories or emission.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use aro_core::value::RuntimeValue;

/// Reserved slot holding the `with { … }` accompaniment mapping.
pub const WITH_SLOT: &str = "_with_";
/// Reserved slot holding the inline `with <expression>` operand.
pub const EXPRESSION_SLOT: &str = "_expression_";

// =============================================================================
// Global store
// =============================================================================

/// Process-wide store of published values.
///
/// Read-mostly: lookups take a shared lock, `publish` an exclusive one.
#[derive(Debug, Default, Clone)]
pub struct GlobalStore {
    values: Arc<RwLock<HashMap<String, RuntimeValue>>>,
}

impl GlobalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, name: impl Into<String>, value: RuntimeValue) {
        self.values.write().insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<RuntimeValue> {
        self.values.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.read().contains_key(name)
    }
}

// =============================================================================
// Execution context
// =============================================================================

/// Activation-local variable bindings plus the global fallback.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    variables: HashMap<String, RuntimeValue>,
    globals: GlobalStore,
}

impl ExecutionContext {
    /// A fresh root context over the given global store.
    pub fn new(globals: GlobalStore) -> Self {
        Self {
            variables: HashMap::new(),
            globals,
        }
    }

    /// A child context for an event-triggered activation: each top-level
    /// payload field is addressable directly (`<age>`), the whole payload
    /// as `event`. The parent's locals are not visible. Guards evaluate
    /// against the same seeding, so a guard the scheduler approved holds
    /// inside the activation too.
    pub fn child_for_event(globals: GlobalStore, payload: RuntimeValue) -> Self {
        let mut ctx = Self::new(globals);
        if let RuntimeValue::Map(fields) = &payload {
            for (key, value) in fields {
                ctx.bind(key.clone(), value.clone());
            }
        }
        ctx.bind("event", payload);
        ctx
    }

    /// A context for evaluating a handler guard against an event payload.
    /// Guards never write, so the seeding matches
    /// [`child_for_event`](Self::child_for_event).
    pub fn for_guard(globals: GlobalStore, payload: &RuntimeValue) -> Self {
        Self::child_for_event(globals, payload.clone())
    }

    /// Binds a variable, replacing any earlier binding.
    pub fn bind(&mut self, name: impl Into<String>, value: RuntimeValue) {
        self.variables.insert(name.into(), value);
    }

    /// Removes a binding (used to clear the reserved slots between
    /// statements).
    pub fn unbind(&mut self, name: &str) {
        self.variables.remove(name);
    }

    /// Resolves a name: local bindings first, then published globals.
    pub fn resolve(&self, name: &str) -> Option<RuntimeValue> {
        self.variables
            .get(name)
            .cloned()
            .or_else(|| self.globals.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name) || self.globals.contains(name)
    }

    pub fn globals(&self) -> &GlobalStore {
        &self.globals
    }
}
