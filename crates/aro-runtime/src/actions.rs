//! The action registry.
//!
//! Maps lowercase verbs (and their aliases) to handlers. Built-in actions
//! are registered at process start; plugin hosts register additional verbs
//! after their manifests are processed and unregister them on unload. The
//! registry is read-mostly: steady-state lookups take a shared
//! `parking_lot` lock, mutations an exclusive one.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;

use aro_core::ast::{Descriptor, Expr, Preposition, Span};
use aro_core::error::{RuntimeError, RuntimeResult};
use aro_core::value::RuntimeValue;

use crate::services::RuntimeServices;

// =============================================================================
// Invocation and outcome
// =============================================================================

/// Everything a handler may read about the statement it executes.
///
/// The runner resolves the object descriptor (including qualifiers) and the
/// `with` clause before dispatch, so handlers receive plain values.
#[derive(Clone)]
pub struct ActionInvocation {
    /// The verb as written (lowercased), before alias resolution.
    pub verb: String,
    pub result: Descriptor,
    pub preposition: Option<Preposition>,
    pub object: Option<Descriptor>,
    /// The resolved object value; null when the statement has no object or
    /// the object names something only the action understands (such as a
    /// repository).
    pub object_value: RuntimeValue,
    /// The current value bound to the result's base name, when any. Actions
    /// whose result descriptor is a data *source* (`store`, `return`) read
    /// this.
    pub result_value: RuntimeValue,
    /// Contents of the `_with_` slot (the `with { … }` mapping).
    pub with_value: RuntimeValue,
    /// Contents of the `_expression_` slot (the inline `with` expression).
    pub expression_value: RuntimeValue,
    /// The raw `with` expression, for actions that re-evaluate it per
    /// entity (repository predicates).
    pub expression: Option<Expr>,
    pub span: Span,
    pub services: Arc<RuntimeServices>,
}

impl ActionInvocation {
    /// The object's base name, or an empty string for literal objects.
    pub fn object_name(&self) -> &str {
        self.object.as_ref().map_or("", |d| d.base.as_str())
    }
}

/// Tagged completion of one action. `Return` and `Throw` end the feature
/// set; there is no stack unwinding.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// Bind the value to the result descriptor and continue.
    Value(RuntimeValue),
    /// Complete the feature set with this value.
    Return(RuntimeValue),
    /// Abort the feature set with this error payload.
    Throw(RuntimeValue),
}

/// The future an action handler returns. Handlers may suspend (I/O, plugin
/// calls); the runner awaits them inside the activation's task.
pub type ActionFuture = BoxFuture<'static, RuntimeResult<ActionOutcome>>;

/// A dynamically dispatched action handler.
pub type ActionHandler = Arc<dyn Fn(ActionInvocation) -> ActionFuture + Send + Sync>;

// =============================================================================
// Registrations
// =============================================================================

/// One registered verb with its aliases and owning plugin.
#[derive(Clone)]
pub struct ActionRegistration {
    /// Canonical lowercase verb.
    pub verb: String,
    pub aliases: Vec<String>,
    /// The plugin that contributed this action; `None` for built-ins.
    pub owner: Option<String>,
    pub handler: ActionHandler,
}

impl std::fmt::Debug for ActionRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistration")
            .field("verb", &self.verb)
            .field("aliases", &self.aliases)
            .field("owner", &self.owner)
            .finish()
    }
}

/// The process-wide verb table.
#[derive(Default)]
pub struct ActionRegistry {
    entries: RwLock<HashMap<String, Arc<ActionRegistration>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a verb and its aliases.
    ///
    /// Re-registering the same handler under the same verb is idempotent.
    /// A plugin verb colliding with a built-in (or another plugin's verb
    /// backed by a different handler) is an error — the manifest should
    /// declare a qualifier namespace instead.
    pub fn register(&self, registration: ActionRegistration) -> RuntimeResult<()> {
        let registration = Arc::new(registration);
        let mut entries = self.entries.write();
        let mut keys = vec![registration.verb.to_ascii_lowercase()];
        keys.extend(registration.aliases.iter().map(|a| a.to_ascii_lowercase()));

        for key in &keys {
            if let Some(existing) = entries.get(key) {
                if Arc::ptr_eq(&existing.handler, &registration.handler) {
                    continue;
                }
                let owner = registration.owner.as_deref().unwrap_or("the runtime");
                return Err(RuntimeError::plugin(
                    owner,
                    format!(
                        "the verb '{key}' is already registered by {}",
                        existing
                            .owner
                            .as_deref()
                            .map(|o| format!("plugin '{o}'"))
                            .unwrap_or_else(|| "the built-in action table".to_string())
                    ),
                ));
            }
        }
        for key in keys {
            entries.insert(key, Arc::clone(&registration));
        }
        Ok(())
    }

    /// Case-insensitive lookup by verb or alias.
    pub fn lookup(&self, verb: &str) -> Option<Arc<ActionRegistration>> {
        self.entries.read().get(&verb.to_ascii_lowercase()).cloned()
    }

    /// Removes every verb owned by `owner`. Returns the removed verb keys.
    pub fn unregister_owned(&self, owner: &str) -> Vec<String> {
        let mut entries = self.entries.write();
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(_, reg)| reg.owner.as_deref() == Some(owner))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.remove(key);
        }
        doomed
    }

    /// Sorted snapshot of all registered verb keys. Used to check that
    /// loading and unloading a plugin leaves the registry identical.
    pub fn snapshot(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Wraps an async closure as an [`ActionHandler`].
pub fn handler<F, Fut>(f: F) -> ActionHandler
where
    F: Fn(ActionInvocation) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = RuntimeResult<ActionOutcome>> + Send + 'static,
{
    Arc::new(move |invocation| -> ActionFuture { Box::pin(f(invocation)) })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> ActionHandler {
        handler(|_| async { Ok(ActionOutcome::Value(RuntimeValue::Null)) })
    }

    fn registration(verb: &str, owner: Option<&str>, h: ActionHandler) -> ActionRegistration {
        ActionRegistration {
            verb: verb.to_string(),
            aliases: Vec::new(),
            owner: owner.map(str::to_string),
            handler: h,
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = ActionRegistry::new();
        registry.register(registration("greet", None, noop())).unwrap();
        assert!(registry.lookup("GREET").is_some());
        assert!(registry.lookup("Greet").is_some());
        assert!(registry.lookup("missing").is_none());
    }

    #[test]
    fn re_registering_the_same_handler_is_idempotent() {
        let registry = ActionRegistry::new();
        let h = noop();
        registry
            .register(registration("greet", Some("p"), Arc::clone(&h)))
            .unwrap();
        registry
            .register(registration("greet", Some("p"), h))
            .unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn colliding_verbs_are_rejected() {
        let registry = ActionRegistry::new();
        registry.register(registration("log", None, noop())).unwrap();
        let err = registry.register(registration("log", Some("shouty"), noop()));
        assert!(err.is_err());
    }

    #[test]
    fn unregister_restores_the_snapshot() {
        let registry = ActionRegistry::new();
        registry.register(registration("log", None, noop())).unwrap();
        let before = registry.snapshot();

        registry
            .register(registration("transmogrify", Some("magic"), noop()))
            .unwrap();
        assert_ne!(registry.snapshot(), before);

        registry.unregister_owned("magic");
        assert_eq!(registry.snapshot(), before);
    }

    #[test]
    fn aliases_share_the_handler() {
        let registry = ActionRegistry::new();
        let mut reg = registration("retrieve", None, noop());
        reg.aliases = vec!["get".to_string(), "fetch".to_string()];
        registry.register(reg).unwrap();
        let canonical = registry.lookup("retrieve").unwrap();
        let alias = registry.lookup("fetch").unwrap();
        assert!(Arc::ptr_eq(&canonical.handler, &alias.handler));
    }
}
