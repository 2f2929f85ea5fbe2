//! Built-in qualifier transformations.
//!
//! The standard transformation vocabulary available to every program
//! without any plugin: `<upper: uppercase>`, `<trimmed: trimmed>`,
//! `<n: length>`, and friends. They are registered under the `aro`
//! namespace, so they resolve bare (`<x: uppercase>`) as long as no
//! plugin claims the same name, and explicitly (`<x: aro.uppercase>`)
//! always.
//!
//! The list-index selectors (`first`, `last`, integer reverse index) are
//! not here — they are resolved structurally before the registry is
//! consulted.

use std::collections::BTreeSet;

use aro_core::error::{RuntimeError, RuntimeResult};
use aro_core::value::{RuntimeValue, ValueType};

use crate::qualifiers::{QualifierRegistration, QualifierRegistry, qualifier_handler};

/// The namespace built-in transformations register under.
pub const BUILTIN_NAMESPACE: &str = "aro";

/// Registers the standard transformation vocabulary.
pub fn register_builtin_qualifiers(registry: &QualifierRegistry) {
    register(registry, "uppercase", &[ValueType::String], "upper-cases a string", |value| {
        text_transform(value, |s| s.to_uppercase())
    });
    register(registry, "lowercase", &[ValueType::String], "lower-cases a string", |value| {
        text_transform(value, |s| s.to_lowercase())
    });
    register(registry, "trimmed", &[ValueType::String], "strips surrounding whitespace", |value| {
        text_transform(value, |s| s.trim().to_string())
    });
    register(
        registry,
        "length",
        &[ValueType::String, ValueType::Sequence, ValueType::Mapping],
        "number of characters, elements, or entries",
        length,
    );
    register(
        registry,
        "count",
        &[ValueType::String, ValueType::Sequence, ValueType::Mapping],
        "number of characters, elements, or entries",
        length,
    );
    register(registry, "keys", &[ValueType::Mapping], "the keys of a mapping", |value| {
        match value {
            RuntimeValue::Map(map) => Ok(RuntimeValue::List(
                map.keys().cloned().map(RuntimeValue::Text).collect(),
            )),
            other => Err(type_error("keys", &other)),
        }
    });
    register(registry, "values", &[ValueType::Mapping], "the values of a mapping", |value| {
        match value {
            RuntimeValue::Map(map) => Ok(RuntimeValue::List(map.into_values().collect())),
            other => Err(type_error("values", &other)),
        }
    });
    register(registry, "reversed", &[ValueType::Sequence, ValueType::String], "reverses order", |value| {
        match value {
            RuntimeValue::List(mut items) => {
                items.reverse();
                Ok(RuntimeValue::List(items))
            }
            RuntimeValue::Text(s) => Ok(RuntimeValue::Text(s.chars().rev().collect())),
            other => Err(type_error("reversed", &other)),
        }
    });
    register(registry, "sorted", &[ValueType::Sequence], "sorts by the JSON rendering", |value| {
        match value {
            RuntimeValue::List(mut items) => {
                items.sort_by_key(|item| item.to_json().to_string());
                Ok(RuntimeValue::List(items))
            }
            other => Err(type_error("sorted", &other)),
        }
    });
    register(registry, "unique", &[ValueType::Sequence], "drops duplicate elements", |value| {
        match value {
            RuntimeValue::List(items) => {
                let mut seen = BTreeSet::new();
                let mut unique = Vec::new();
                for item in items {
                    if seen.insert(item.to_json().to_string()) {
                        unique.push(item);
                    }
                }
                Ok(RuntimeValue::List(unique))
            }
            other => Err(type_error("unique", &other)),
        }
    });
    register(registry, "text", &[], "renders any value as text", |value| {
        Ok(RuntimeValue::Text(value.to_string()))
    });
}

fn register(
    registry: &QualifierRegistry,
    name: &str,
    accepted: &[ValueType],
    description: &str,
    run: fn(RuntimeValue) -> RuntimeResult<RuntimeValue>,
) {
    registry.register(QualifierRegistration {
        name: name.to_string(),
        namespace: BUILTIN_NAMESPACE.to_string(),
        accepted_types: accepted.iter().copied().collect(),
        owner: BUILTIN_NAMESPACE.to_string(),
        description: description.to_string(),
        handler: qualifier_handler(move |value| async move { run(value) }),
    });
}

fn text_transform(
    value: RuntimeValue,
    transform: impl Fn(&str) -> String,
) -> RuntimeResult<RuntimeValue> {
    match value {
        RuntimeValue::Text(s) => Ok(RuntimeValue::Text(transform(&s))),
        other => Ok(RuntimeValue::Text(transform(&other.to_string()))),
    }
}

fn length(value: RuntimeValue) -> RuntimeResult<RuntimeValue> {
    let length = match &value {
        RuntimeValue::Text(s) => s.chars().count(),
        RuntimeValue::List(items) => items.len(),
        RuntimeValue::Map(map) => map.len(),
        other => return Err(type_error("length", other)),
    };
    Ok(RuntimeValue::Int(length as i64))
}

fn type_error(qualifier: &str, value: &RuntimeValue) -> RuntimeError {
    RuntimeError::Qualifier {
        qualifier: qualifier.to_string(),
        message: format!("cannot be applied to a {} value", value.type_label()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> QualifierRegistry {
        let registry = QualifierRegistry::new();
        register_builtin_qualifiers(&registry);
        registry
    }

    #[tokio::test]
    async fn uppercase_transforms_text() {
        let registry = registry();
        let result = registry
            .apply(None, "uppercase", RuntimeValue::Text("hello".into()))
            .await
            .unwrap();
        assert_eq!(result, RuntimeValue::Text("HELLO".into()));
    }

    #[tokio::test]
    async fn explicit_namespace_always_resolves() {
        let registry = registry();
        let result = registry
            .apply(Some("aro"), "trimmed", RuntimeValue::Text("  x  ".into()))
            .await
            .unwrap();
        assert_eq!(result, RuntimeValue::Text("x".into()));
    }

    #[tokio::test]
    async fn length_counts_characters_elements_and_entries() {
        let registry = registry();
        let text = registry
            .apply(None, "length", RuntimeValue::Text("héllo".into()))
            .await
            .unwrap();
        assert_eq!(text, RuntimeValue::Int(5));

        let list = registry
            .apply(
                None,
                "length",
                RuntimeValue::List(vec![RuntimeValue::Int(1), RuntimeValue::Int(2)]),
            )
            .await
            .unwrap();
        assert_eq!(list, RuntimeValue::Int(2));
    }

    #[tokio::test]
    async fn uppercase_rejects_sequences() {
        let registry = registry();
        let err = registry
            .apply(None, "uppercase", RuntimeValue::List(vec![]))
            .await;
        assert!(matches!(err, Err(RuntimeError::Qualifier { .. })));
    }

    #[tokio::test]
    async fn unique_preserves_first_occurrence_order() {
        let registry = registry();
        let result = registry
            .apply(
                None,
                "unique",
                RuntimeValue::List(vec![
                    RuntimeValue::Int(2),
                    RuntimeValue::Int(1),
                    RuntimeValue::Int(2),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(
            result,
            RuntimeValue::List(vec![RuntimeValue::Int(2), RuntimeValue::Int(1)])
        );
    }

    #[tokio::test]
    async fn keys_and_values() {
        let registry = registry();
        let map = RuntimeValue::map([("a", RuntimeValue::Int(1)), ("b", RuntimeValue::Int(2))]);
        let keys = registry.apply(None, "keys", map.clone()).await.unwrap();
        assert_eq!(
            keys,
            RuntimeValue::List(vec![
                RuntimeValue::Text("a".into()),
                RuntimeValue::Text("b".into())
            ])
        );
        let values = registry.apply(None, "values", map).await.unwrap();
        assert_eq!(
            values,
            RuntimeValue::List(vec![RuntimeValue::Int(1), RuntimeValue::Int(2)])
        );
    }
}
