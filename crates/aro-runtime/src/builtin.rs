//! Built-in actions.
//!
//! One handler per row of the verb table. Handlers receive resolved values
//! only; the runner has already applied object-side qualifiers and
//! evaluated the `with` clause. Result-side qualifiers (as in
//! `<flipped: collections.reverse>`) are a transformation of the produced
//! value and are applied here by the data-flow verbs.

use tracing::{info, warn};

use aro_core::ast::Descriptor;
use aro_core::error::{RuntimeError, RuntimeResult};
use aro_core::value::RuntimeValue;

use crate::actions::{
    ActionInvocation, ActionOutcome, ActionRegistration, ActionRegistry, handler,
};
use crate::context::ExecutionContext;
use crate::expr;

/// Registers every built-in verb and its aliases.
pub fn register_builtin_actions(registry: &ActionRegistry) {
    let table: &[(&str, &[&str], fn(ActionInvocation) -> BoxedAction)] = &[
        ("create", &["make"], |inv| Box::pin(create(inv))),
        ("set", &[], |inv| Box::pin(set(inv))),
        ("store", &["save"], |inv| Box::pin(store(inv))),
        ("update", &[], |inv| Box::pin(update(inv))),
        ("delete", &["remove"], |inv| Box::pin(delete(inv))),
        ("retrieve", &["get", "fetch"], |inv| Box::pin(retrieve(inv))),
        ("compute", &["calculate"], |inv| Box::pin(compute(inv))),
        ("extract", &[], |inv| Box::pin(compute(inv))),
        ("log", &["print"], |inv| Box::pin(log_action(inv))),
        ("return", &[], |inv| Box::pin(return_action(inv))),
        ("throw", &[], |inv| Box::pin(throw_action(inv))),
        ("publish", &[], |inv| Box::pin(publish(inv))),
        ("emit", &[], |inv| Box::pin(emit(inv))),
        ("keepalive", &[], |inv| Box::pin(keepalive(inv))),
        ("expect", &["assert"], |inv| Box::pin(expect(inv))),
    ];

    for (verb, aliases, run) in table {
        let run = *run;
        let registration = ActionRegistration {
            verb: verb.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            owner: None,
            handler: handler(move |invocation| run(invocation)),
        };
        if let Err(error) = registry.register(registration) {
            // Only reachable when called twice on the same registry.
            warn!(%verb, %error, "Built-in action already registered");
        }
    }
}

type BoxedAction = futures::future::BoxFuture<'static, RuntimeResult<ActionOutcome>>;

// =============================================================================
// Shared helpers
// =============================================================================

fn first_present(candidates: [&RuntimeValue; 3]) -> RuntimeValue {
    candidates
        .into_iter()
        .find(|v| !matches!(v, RuntimeValue::Null))
        .cloned()
        .unwrap_or(RuntimeValue::Null)
}

/// Normalizes a statement's repository reference: `<user-repository>` is
/// used as written, `<user>` becomes `user-repository`.
fn repository_name(object_name: &str) -> String {
    let lower = object_name.to_ascii_lowercase();
    if lower.ends_with("-repository") {
        lower
    } else {
        format!("{lower}-repository")
    }
}

/// Applies the result-side qualifier (as in
/// `<flipped: collections.reverse>`) to a produced value. Same resolution
/// order as object-side qualifiers.
async fn apply_result_qualifier(
    invocation: &ActionInvocation,
    value: RuntimeValue,
) -> RuntimeResult<RuntimeValue> {
    crate::runner::apply_descriptor_qualifier(&invocation.services, &invocation.result, value)
        .await
}

fn entity_predicate_context(
    invocation: &ActionInvocation,
    entity: &RuntimeValue,
) -> ExecutionContext {
    let mut ctx = ExecutionContext::for_guard(invocation.services.globals.clone(), entity);
    ctx.bind("entity", entity.clone());
    ctx
}

// =============================================================================
// Data-flow verbs
// =============================================================================

async fn create(invocation: ActionInvocation) -> RuntimeResult<ActionOutcome> {
    let value = first_present([
        &invocation.with_value,
        &invocation.expression_value,
        &invocation.object_value,
    ]);
    let value = apply_result_qualifier(&invocation, value).await?;
    Ok(ActionOutcome::Value(value))
}

async fn set(invocation: ActionInvocation) -> RuntimeResult<ActionOutcome> {
    let value = first_present([
        &invocation.object_value,
        &invocation.expression_value,
        &invocation.with_value,
    ]);
    Ok(ActionOutcome::Value(value))
}

async fn compute(invocation: ActionInvocation) -> RuntimeResult<ActionOutcome> {
    let value = first_present([
        &invocation.expression_value,
        &invocation.object_value,
        &invocation.with_value,
    ]);
    let value = apply_result_qualifier(&invocation, value).await?;
    Ok(ActionOutcome::Value(value))
}

// =============================================================================
// Repository verbs
// =============================================================================

async fn store(invocation: ActionInvocation) -> RuntimeResult<ActionOutcome> {
    let entity = first_present([
        &invocation.result_value,
        &invocation.with_value,
        &invocation.expression_value,
    ]);
    if matches!(entity, RuntimeValue::Null) {
        return Err(RuntimeError::action_at(
            format!(
                "the {} could not be stored: no value is bound to it",
                display_name(&invocation.result)
            ),
            invocation.span,
        ));
    }
    let repository = repository_name(invocation.object_name());
    let stored = invocation.services.repositories.store(&repository, entity);
    Ok(ActionOutcome::Value(stored))
}

async fn retrieve(invocation: ActionInvocation) -> RuntimeResult<ActionOutcome> {
    let object_name = invocation.object_name().to_string();
    let from_repository = object_name.to_ascii_lowercase().ends_with("-repository");

    let value = if from_repository {
        let repositories = &invocation.services.repositories;
        match &invocation.expression {
            Some(predicate) => repositories.retrieve_where(&object_name, |entity| {
                let ctx = entity_predicate_context(&invocation, entity);
                expr::evaluate(predicate, &ctx)
                    .map(|v| v.is_truthy())
                    .unwrap_or(false)
            }),
            None => repositories.retrieve_all(&object_name),
        }
    } else {
        // Retrieving from a plain mapping selects the field named like the
        // result, when present.
        match invocation.object_value.property(&invocation.result.base) {
            Some(field) => field.clone(),
            None => invocation.object_value.clone(),
        }
    };

    let value = apply_result_qualifier(&invocation, value).await?;
    Ok(ActionOutcome::Value(value))
}

async fn update(invocation: ActionInvocation) -> RuntimeResult<ActionOutcome> {
    let repository = repository_name(invocation.object_name());
    let entity = invocation.result_value.clone();
    let Some(id) = entity.property("id").and_then(RuntimeValue::as_text) else {
        return Err(RuntimeError::action_at(
            format!(
                "the {} could not be updated in the {repository}: it has no id",
                display_name(&invocation.result)
            ),
            invocation.span,
        ));
    };

    let changes = invocation.with_value.clone();
    let updated = invocation
        .services
        .repositories
        .update(&repository, id, |stored| {
            if let (RuntimeValue::Map(target), RuntimeValue::Map(fields)) = (&mut *stored, &changes)
            {
                for (key, value) in fields {
                    target.insert(key.clone(), value.clone());
                }
            } else if !matches!(changes, RuntimeValue::Null) {
                *stored = changes.clone();
            }
        });

    match updated {
        Some(entity) => Ok(ActionOutcome::Value(entity)),
        None => Err(RuntimeError::action_at(
            format!(
                "the {} could not be updated: no entity with its id exists in the {repository}",
                display_name(&invocation.result)
            ),
            invocation.span,
        )),
    }
}

async fn delete(invocation: ActionInvocation) -> RuntimeResult<ActionOutcome> {
    let repository = repository_name(invocation.object_name());
    let repositories = &invocation.services.repositories;

    let removed = match &invocation.expression {
        Some(predicate) => repositories.delete_where(&repository, |entity| {
            let ctx = entity_predicate_context(&invocation, entity);
            expr::evaluate(predicate, &ctx)
                .map(|v| v.is_truthy())
                .unwrap_or(false)
        }),
        None => {
            let id = invocation
                .result_value
                .property("id")
                .and_then(RuntimeValue::as_text)
                .map(str::to_string);
            match id {
                Some(id) => repositories.delete_where(&repository, |entity| {
                    entity.property("id").and_then(RuntimeValue::as_text) == Some(id.as_str())
                }),
                None => {
                    return Err(RuntimeError::action_at(
                        format!(
                            "the {} could not be deleted from the {repository}: \
                             no id and no predicate were given",
                            display_name(&invocation.result)
                        ),
                        invocation.span,
                    ));
                }
            }
        }
    };

    Ok(ActionOutcome::Value(RuntimeValue::List(removed)))
}

// =============================================================================
// Response verbs
// =============================================================================

async fn log_action(invocation: ActionInvocation) -> RuntimeResult<ActionOutcome> {
    let message = resolve_response_value(&invocation);
    // The console is the user-facing output channel; tracing carries the
    // structured copy.
    println!("{message}");
    info!(target = %invocation.object_name(), "{message}");
    Ok(ActionOutcome::Value(message))
}

async fn return_action(invocation: ActionInvocation) -> RuntimeResult<ActionOutcome> {
    let value = resolve_response_value(&invocation);
    let value = apply_result_qualifier(&invocation, value).await?;
    Ok(ActionOutcome::Return(value))
}

async fn throw_action(invocation: ActionInvocation) -> RuntimeResult<ActionOutcome> {
    let value = resolve_response_value(&invocation);
    Ok(ActionOutcome::Throw(value))
}

/// Response verbs read the result descriptor as their source; an unbound
/// bare name is its own payload (`Return an <OK: status> …` returns "OK").
fn resolve_response_value(invocation: &ActionInvocation) -> RuntimeValue {
    let value = first_present([
        &invocation.result_value,
        &invocation.expression_value,
        &invocation.with_value,
    ]);
    if matches!(value, RuntimeValue::Null) && !invocation.result.base.is_empty() {
        return RuntimeValue::Text(invocation.result.base.clone());
    }
    value
}

// =============================================================================
// Export verbs
// =============================================================================

async fn publish(invocation: ActionInvocation) -> RuntimeResult<ActionOutcome> {
    let value = first_present([
        &invocation.result_value,
        &invocation.with_value,
        &invocation.expression_value,
    ]);
    if invocation.result.base.is_empty() {
        return Err(RuntimeError::action_at(
            "a published value needs a name",
            invocation.span,
        ));
    }
    invocation
        .services
        .globals
        .publish(invocation.result.base.clone(), value.clone());
    Ok(ActionOutcome::Value(value))
}

async fn emit(invocation: ActionInvocation) -> RuntimeResult<ActionOutcome> {
    let event = invocation.result.base.clone();
    if event.is_empty() {
        return Err(RuntimeError::action_at(
            "an emitted event needs a name",
            invocation.span,
        ));
    }
    let payload = first_present([
        &invocation.with_value,
        &invocation.expression_value,
        &invocation.object_value,
    ]);
    if !invocation.services.events.emit(&event, payload.clone()) {
        warn!(%event, "Event refused; the bus is shutting down");
    }
    Ok(ActionOutcome::Value(payload))
}

// =============================================================================
// Server and test verbs
// =============================================================================

async fn keepalive(invocation: ActionInvocation) -> RuntimeResult<ActionOutcome> {
    info!("Keepalive armed; waiting for shutdown");
    invocation.services.shutdown.cancelled().await;
    Ok(ActionOutcome::Value(RuntimeValue::Null))
}

async fn expect(invocation: ActionInvocation) -> RuntimeResult<ActionOutcome> {
    let actual = invocation.result_value.clone();
    let expected = first_present([
        &invocation.object_value,
        &invocation.expression_value,
        &invocation.with_value,
    ]);
    if actual == expected {
        return Ok(ActionOutcome::Value(RuntimeValue::Bool(true)));
    }
    Err(RuntimeError::action_at(
        format!(
            "the {} did not match: expected {expected}, found {actual}",
            display_name(&invocation.result)
        ),
        invocation.span,
    ))
}

fn display_name(descriptor: &Descriptor) -> String {
    if descriptor.base.is_empty() {
        "value".to_string()
    } else {
        descriptor.base.clone()
    }
}
