//! The feature-set runner.
//!
//! Executes one activation: statements in textual order within a single
//! cooperative task. For each statement the runner resolves the object
//! against the context (falling back to the descriptor's literal), applies
//! the object-side qualifier, evaluates the `with` clause into the
//! reserved slots, dispatches the verb through the action registry, and
//! binds the returned value to the result name. `Return` and `Throw` are
//! tagged completions — the first one ends the activation.
//!
//! Without an explicit `Return`, the activation's result is the last bound
//! value.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use aro_core::ast::Descriptor;
use aro_core::error::{RuntimeError, RuntimeResult};
use aro_core::program::AnalyzedFeatureSet;
use aro_core::value::RuntimeValue;

use crate::actions::{ActionInvocation, ActionOutcome};
use crate::context::{EXPRESSION_SLOT, ExecutionContext, WITH_SLOT};
use crate::expr;
use crate::services::RuntimeServices;

/// Runs feature sets against one service bundle.
pub struct FeatureSetRunner {
    services: Arc<RuntimeServices>,
}

impl FeatureSetRunner {
    pub fn new(services: Arc<RuntimeServices>) -> Self {
        Self { services }
    }

    /// Runs every statement of the feature set in order.
    pub async fn run(
        &self,
        analyzed: &AnalyzedFeatureSet,
        ctx: &mut ExecutionContext,
    ) -> RuntimeResult<RuntimeValue> {
        let feature_set = &analyzed.feature_set;
        debug!(feature_set = %feature_set.identity(), "Activation started");

        if let Some(guard) = &feature_set.guard {
            if !expr::evaluate(guard, ctx)?.is_truthy() {
                debug!(feature_set = %feature_set.identity(), "Guard rejected activation");
                return Ok(RuntimeValue::Null);
            }
        }

        let mut latest = RuntimeValue::Null;
        for statement in &feature_set.statements {
            let object_value = match &statement.object {
                Some(object) => {
                    let value = self.resolve_descriptor(object, ctx);
                    apply_descriptor_qualifier(&self.services, object, value).await?
                }
                None => RuntimeValue::Null,
            };

            let mut with_value = RuntimeValue::Null;
            if let Some(mapping) = &statement.with_mapping {
                let mut map = BTreeMap::new();
                for (key, value_expr) in mapping {
                    map.insert(key.clone(), expr::evaluate(value_expr, ctx)?);
                }
                with_value = RuntimeValue::Map(map);
                ctx.bind(WITH_SLOT, with_value.clone());
            }
            let mut expression_value = RuntimeValue::Null;
            if let Some(expression) = &statement.expression {
                expression_value = expr::evaluate(expression, ctx)?;
                ctx.bind(EXPRESSION_SLOT, expression_value.clone());
            }

            let Some(registration) = self.services.actions.lookup(&statement.verb) else {
                return Err(RuntimeError::UnknownAction {
                    verb: statement.verb.clone(),
                    span: Some(statement.span),
                });
            };

            let invocation = ActionInvocation {
                verb: statement.verb.clone(),
                result: statement.result.clone(),
                preposition: statement.preposition,
                object: statement.object.clone(),
                object_value,
                result_value: self.resolve_descriptor(&statement.result, ctx),
                with_value,
                expression_value,
                expression: statement.expression.clone(),
                span: statement.span,
                services: Arc::clone(&self.services),
            };

            let outcome = (registration.handler)(invocation).await;
            ctx.unbind(WITH_SLOT);
            ctx.unbind(EXPRESSION_SLOT);

            match outcome? {
                ActionOutcome::Value(value) => {
                    if !statement.result.base.is_empty() {
                        ctx.bind(statement.result.base.clone(), value.clone());
                    }
                    latest = value;
                }
                ActionOutcome::Return(value) => {
                    debug!(feature_set = %feature_set.identity(), "Activation returned");
                    return Ok(value);
                }
                ActionOutcome::Throw(value) => {
                    return Err(RuntimeError::Thrown(value));
                }
            }
        }

        debug!(feature_set = %feature_set.identity(), "Activation completed");
        Ok(latest)
    }

    /// Context lookup, then the descriptor's own literal, then null.
    fn resolve_descriptor(&self, descriptor: &Descriptor, ctx: &ExecutionContext) -> RuntimeValue {
        if !descriptor.base.is_empty() {
            if let Some(value) = ctx.resolve(&descriptor.base) {
                return value;
            }
        }
        descriptor.literal.clone().unwrap_or(RuntimeValue::Null)
    }
}

/// Applies a descriptor's qualifier to a value.
///
/// Resolution order: property of the value, built-in list-index selector
/// (`first`, `last`, integer reverse index — out of range yields null with
/// a runtime warning), then the qualifier registry (the dotted form forces
/// a namespace, a bare name must be unambiguous). A qualifier none of
/// those recognize is a plain tag consumed by the action; the value passes
/// through unchanged.
pub async fn apply_descriptor_qualifier(
    services: &Arc<RuntimeServices>,
    descriptor: &Descriptor,
    value: RuntimeValue,
) -> RuntimeResult<RuntimeValue> {
    let Some((namespace, name)) = descriptor.qualifier_parts() else {
        return Ok(value);
    };
    let full = descriptor.qualifier.as_deref().unwrap_or(name);

    if let Some(property) = value.property(full) {
        return Ok(property.clone());
    }

    if namespace.is_none()
        && matches!(value, RuntimeValue::List(_))
        && (name == "first" || name == "last" || name.parse::<usize>().is_ok())
    {
        let selected = expr::apply_pure_qualifier(&value, name);
        if selected == RuntimeValue::Null {
            warn!(
                qualifier = %name,
                length = value.as_list().map_or(0, <[RuntimeValue]>::len),
                "List index is out of range; the result is null"
            );
        }
        return Ok(selected);
    }

    let registry = &services.qualifiers;
    match namespace {
        Some(ns) => registry.apply(Some(ns), name, value).await,
        None if registry.knows(name) => registry.apply(None, name, value).await,
        None => {
            debug!(qualifier = %name, "Qualifier is a plain tag; value passed through");
            Ok(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::RuntimeServices;
    use aro_compiler::compile_source;

    fn first_feature_set(source: &str) -> AnalyzedFeatureSet {
        let (program, diagnostics) = compile_source(source, None);
        assert!(
            !aro_core::diagnostics::has_errors(&diagnostics),
            "{diagnostics:?}"
        );
        program.feature_sets.into_iter().next().unwrap()
    }

    async fn run(source: &str) -> (RuntimeResult<RuntimeValue>, ExecutionContext) {
        let (services, _rx) = RuntimeServices::create();
        let analyzed = first_feature_set(source);
        let mut ctx = ExecutionContext::new(services.globals.clone());
        let runner = FeatureSetRunner::new(services);
        let result = runner.run(&analyzed, &mut ctx).await;
        (result, ctx)
    }

    #[tokio::test]
    async fn hello_world_returns_ok() {
        let (result, _) = run(
            r#"(Application-Start: Hello) {
                Log "Hello from ARO!" to the <console>.
                Return an <OK: status> for the <startup>.
            }"#,
        )
        .await;
        assert_eq!(result.unwrap(), RuntimeValue::Text("OK".into()));
    }

    #[tokio::test]
    async fn latest_binding_wins_without_return() {
        let (result, ctx) = run(
            r#"(shadow: Rebinding) {
                Set the <x> to 1.
                Set the <x> to 2.
            }"#,
        )
        .await;
        assert_eq!(result.unwrap(), RuntimeValue::Int(2));
        assert_eq!(ctx.resolve("x"), Some(RuntimeValue::Int(2)));
    }

    #[tokio::test]
    async fn repository_round_trip() {
        let (result, _) = run(
            r#"(createUser: User Management) {
                Create the <user> with { name: "Alice" }.
                Store the <user> in the <user-repository>.
                Retrieve the <users> from the <user-repository>.
            }"#,
        )
        .await;
        let users = result.unwrap();
        let list = users.as_list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].property("name"), Some(&RuntimeValue::Text("Alice".into())));
        assert!(list[0].property("id").is_some(), "stored entity has an id");
    }

    #[tokio::test]
    async fn unknown_verb_fails_with_span() {
        let (result, _) = run(
            r#"(broken: Resolution) {
                Transmogrify the <x> from the <y>.
            }"#,
        )
        .await;
        match result {
            Err(RuntimeError::UnknownAction { verb, span }) => {
                assert_eq!(verb, "transmogrify");
                assert!(span.is_some());
            }
            other => panic!("expected UnknownAction, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn throw_aborts_the_activation() {
        let (result, ctx) = run(
            r#"(failing: Abort) {
                Throw the <boom> for the <caller>.
                Set the <after> to 1.
            }"#,
        )
        .await;
        assert!(matches!(result, Err(RuntimeError::Thrown(_))));
        assert_eq!(ctx.resolve("after"), None, "statements after throw never run");
    }

    #[tokio::test]
    async fn with_expression_computes() {
        let (result, _) = run(
            r#"(math: Arithmetic) {
                Set the <base> to 20.
                Compute the <total> from the <base> with <base> + 22.
            }"#,
        )
        .await;
        assert_eq!(result.unwrap(), RuntimeValue::Int(42));
    }

    #[tokio::test]
    async fn list_index_qualifiers() {
        let (result, ctx) = run(
            r#"(idx: Selection) {
                Compute the <head: first> from the <numbers>.
            }"#,
        )
        .await;
        // `numbers` is unbound, so the selection is null.
        assert_eq!(result.unwrap(), RuntimeValue::Null);
        assert_eq!(ctx.resolve("head"), Some(RuntimeValue::Null));
    }

    #[tokio::test]
    async fn reverse_index_selects_from_the_back() {
        let (services, _rx) = RuntimeServices::create();
        let analyzed = first_feature_set(
            r#"(idx: Selection) {
                Compute the <second: 1> from the <numbers>.
            }"#,
        );
        let mut ctx = ExecutionContext::new(services.globals.clone());
        ctx.bind(
            "numbers",
            RuntimeValue::List(vec![
                RuntimeValue::Int(10),
                RuntimeValue::Int(20),
                RuntimeValue::Int(30),
            ]),
        );
        let runner = FeatureSetRunner::new(services);
        let result = runner.run(&analyzed, &mut ctx).await.unwrap();
        assert_eq!(result, RuntimeValue::Int(20));
    }

    #[tokio::test]
    async fn namespaced_qualifier_transforms_the_object() {
        let (services, _rx) = RuntimeServices::create();
        services.qualifiers.register(crate::qualifiers::QualifierRegistration {
            name: "reverse".to_string(),
            namespace: "collections".to_string(),
            accepted_types: std::collections::BTreeSet::from([
                aro_core::value::ValueType::Sequence,
            ]),
            owner: "collections".to_string(),
            description: "reverses a sequence".to_string(),
            handler: crate::qualifiers::qualifier_handler(|value| async move {
                match value {
                    RuntimeValue::List(mut items) => {
                        items.reverse();
                        Ok(RuntimeValue::List(items))
                    }
                    other => Ok(other),
                }
            }),
        });

        let analyzed = first_feature_set(
            r#"(flip: Transformation) {
                Compute the <flipped: collections.reverse> from the <items>.
            }"#,
        );
        let mut ctx = ExecutionContext::new(services.globals.clone());
        ctx.bind(
            "items",
            RuntimeValue::List(vec![
                RuntimeValue::Int(1),
                RuntimeValue::Int(2),
                RuntimeValue::Int(3),
            ]),
        );
        let runner = FeatureSetRunner::new(services);
        let result = runner.run(&analyzed, &mut ctx).await.unwrap();
        assert_eq!(
            result,
            RuntimeValue::List(vec![
                RuntimeValue::Int(3),
                RuntimeValue::Int(2),
                RuntimeValue::Int(1),
            ])
        );
        assert_eq!(ctx.resolve("flipped"), Some(result));
    }

    #[tokio::test]
    async fn expect_throws_on_mismatch() {
        let (result, _) = run(
            r#"(check: Assertion Test) {
                Set the <actual> to 1.
                Expect the <actual> against the <expected> with 2.
            }"#,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn publish_is_visible_through_globals() {
        let (services, _rx) = RuntimeServices::create();
        let runner = FeatureSetRunner::new(Arc::clone(&services));

        let publisher = first_feature_set(
            r#"(setup: Configuration) {
                Create the <config> with { mode: "test" }.
                Publish the <config> for the <application>.
            }"#,
        );
        let mut ctx = ExecutionContext::new(services.globals.clone());
        runner.run(&publisher, &mut ctx).await.unwrap();

        let reader = first_feature_set(
            r#"(read: Configuration) {
                Compute the <mode: mode> from the <config>.
                Log the <mode> to the <console>.
            }"#,
        );
        let mut other = ExecutionContext::new(services.globals.clone());
        let result = runner.run(&reader, &mut other).await.unwrap();
        assert_eq!(result, RuntimeValue::Text("test".into()));
    }
}
