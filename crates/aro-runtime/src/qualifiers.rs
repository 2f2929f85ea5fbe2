//! The qualifier registry.
//!
//! Qualifier transformations are namespaced: the lookup key is
//! `(namespace, name)`, where the namespace defaults to the owning plugin's
//! name when the manifest declares none. A statement can force a namespace
//! with the dotted form (`<flipped: collections.reverse>`); a bare
//! qualifier searches every namespace and succeeds only when unambiguous.
//!
//! The built-in list-index qualifiers (`first`, `last`, integer reverse
//! index) never reach this registry — the runner resolves them first.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;

use aro_core::error::{RuntimeError, RuntimeResult};
use aro_core::value::{RuntimeValue, ValueType};

/// The future a qualifier handler returns.
pub type QualifierFuture = BoxFuture<'static, RuntimeResult<RuntimeValue>>;

/// A dynamically dispatched `RuntimeValue -> RuntimeValue` transformation.
/// Handlers may suspend (native and scripted qualifiers cross a process or
/// FFI boundary).
pub type QualifierHandler = Arc<dyn Fn(RuntimeValue) -> QualifierFuture + Send + Sync>;

/// One registered qualifier transformation.
#[derive(Clone)]
pub struct QualifierRegistration {
    pub name: String,
    pub namespace: String,
    /// Input types the handler accepts; empty means any.
    pub accepted_types: BTreeSet<ValueType>,
    /// The plugin that contributed this qualifier.
    pub owner: String,
    pub description: String,
    pub handler: QualifierHandler,
}

impl std::fmt::Debug for QualifierRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualifierRegistration")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("accepted_types", &self.accepted_types)
            .field("owner", &self.owner)
            .finish()
    }
}

impl QualifierRegistration {
    fn accepts(&self, value: &RuntimeValue) -> bool {
        self.accepted_types.is_empty() || self.accepted_types.contains(&value.type_label())
    }
}

/// The process-wide qualifier table keyed by `(namespace, name)`.
#[derive(Default)]
pub struct QualifierRegistry {
    entries: RwLock<HashMap<(String, String), Arc<QualifierRegistration>>>,
}

impl QualifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, registration: QualifierRegistration) {
        let key = (registration.namespace.clone(), registration.name.clone());
        self.entries.write().insert(key, Arc::new(registration));
    }

    /// Exact lookup under a known namespace.
    pub fn lookup(&self, namespace: &str, name: &str) -> Option<Arc<QualifierRegistration>> {
        self.entries
            .read()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Bare-name lookup across all namespaces; `None` when absent or
    /// ambiguous.
    pub fn lookup_bare(&self, name: &str) -> Option<Arc<QualifierRegistration>> {
        let entries = self.entries.read();
        let mut matches = entries
            .iter()
            .filter(|((_, n), _)| n == name)
            .map(|(_, reg)| Arc::clone(reg));
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first)
    }

    /// Applies a qualifier to a value, checking the declared input types.
    pub async fn apply(
        &self,
        namespace: Option<&str>,
        name: &str,
        value: RuntimeValue,
    ) -> RuntimeResult<RuntimeValue> {
        let registration = match namespace {
            Some(ns) => self.lookup(ns, name),
            None => self.lookup_bare(name),
        }
        .ok_or_else(|| RuntimeError::Qualifier {
            qualifier: match namespace {
                Some(ns) => format!("{ns}.{name}"),
                None => name.to_string(),
            },
            message: "no such qualifier is registered".to_string(),
        })?;

        if !registration.accepts(&value) {
            return Err(RuntimeError::Qualifier {
                qualifier: format!("{}.{}", registration.namespace, registration.name),
                message: format!(
                    "a {} value is not among its accepted input types",
                    value.type_label()
                ),
            });
        }
        (registration.handler)(value).await
    }

    /// Whether any qualifier with this bare name exists in any namespace.
    pub fn knows(&self, name: &str) -> bool {
        self.entries.read().keys().any(|(_, n)| n == name)
    }

    /// Removes every qualifier owned by `owner`. Returns the removed keys.
    pub fn unregister_owned(&self, owner: &str) -> Vec<(String, String)> {
        let mut entries = self.entries.write();
        let doomed: Vec<(String, String)> = entries
            .iter()
            .filter(|(_, reg)| reg.owner == owner)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.remove(key);
        }
        doomed
    }

    /// Sorted snapshot of `(namespace, name)` keys.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let mut keys: Vec<(String, String)> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Wraps an async closure as a [`QualifierHandler`].
pub fn qualifier_handler<F, Fut>(f: F) -> QualifierHandler
where
    F: Fn(RuntimeValue) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = RuntimeResult<RuntimeValue>> + Send + 'static,
{
    Arc::new(move |value| -> QualifierFuture { Box::pin(f(value)) })
}
