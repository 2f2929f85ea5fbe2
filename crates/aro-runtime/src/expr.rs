//! Pure expression evaluation.
//!
//! Evaluates guard and `with`-clause expressions against an
//! [`ExecutionContext`]. Evaluation is side-effect-free and never suspends:
//! descriptor references resolve through the context, and the only
//! qualifiers honored here are property access and the built-in list-index
//! selectors. Registered (possibly suspending) qualifier transformations
//! are a statement-level facility and deliberately unavailable inside
//! guards, which keeps guards pure.

use aro_core::ast::{BinaryOp, Descriptor, Expr, UnaryOp};
use aro_core::error::{RuntimeError, RuntimeResult};
use aro_core::value::RuntimeValue;

use crate::context::ExecutionContext;

/// Evaluates an expression.
pub fn evaluate(expr: &Expr, ctx: &ExecutionContext) -> RuntimeResult<RuntimeValue> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Ref(descriptor) => resolve_reference(descriptor, ctx),
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, ctx)?;
            match op {
                UnaryOp::Not => Ok(RuntimeValue::Bool(!value.is_truthy())),
                UnaryOp::Neg => match value {
                    RuntimeValue::Int(n) => Ok(RuntimeValue::Int(-n)),
                    RuntimeValue::Float(f) => Ok(RuntimeValue::Float(-f)),
                    other => Err(RuntimeError::action(format!(
                        "cannot negate a {} value",
                        other.type_label()
                    ))),
                },
            }
        }
        Expr::Binary { op, lhs, rhs } => evaluate_binary(*op, lhs, rhs, ctx),
        Expr::Mapping(entries) => {
            let mut map = std::collections::BTreeMap::new();
            for (key, value_expr) in entries {
                map.insert(key.clone(), evaluate(value_expr, ctx)?);
            }
            Ok(RuntimeValue::Map(map))
        }
    }
}

/// Resolves `<base: qualifier>` against the context. A missing binding
/// resolves to the descriptor's literal when present, otherwise null —
/// guards routinely probe optional payload fields.
fn resolve_reference(descriptor: &Descriptor, ctx: &ExecutionContext) -> RuntimeResult<RuntimeValue> {
    if descriptor.base.is_empty() {
        return Ok(descriptor.literal.clone().unwrap_or(RuntimeValue::Null));
    }
    let Some(value) = ctx.resolve(&descriptor.base) else {
        return Ok(descriptor.literal.clone().unwrap_or(RuntimeValue::Null));
    };
    match &descriptor.qualifier {
        None => Ok(value),
        Some(qualifier) => Ok(apply_pure_qualifier(&value, qualifier)),
    }
}

/// Property access and list-index selection; anything unknown yields null.
pub fn apply_pure_qualifier(value: &RuntimeValue, qualifier: &str) -> RuntimeValue {
    if let Some(property) = value.property(qualifier) {
        return property.clone();
    }
    match (qualifier, value) {
        ("first", RuntimeValue::List(items)) => items.first().cloned().unwrap_or_default(),
        ("last", RuntimeValue::List(items)) => items.last().cloned().unwrap_or_default(),
        (_, RuntimeValue::List(_)) => {
            if let Ok(index) = qualifier.parse::<usize>() {
                value.reverse_index(index).cloned().unwrap_or_default()
            } else {
                RuntimeValue::Null
            }
        }
        _ => RuntimeValue::Null,
    }
}

fn evaluate_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    ctx: &ExecutionContext,
) -> RuntimeResult<RuntimeValue> {
    // Short-circuit before touching the right operand.
    match op {
        BinaryOp::And => {
            let left = evaluate(lhs, ctx)?;
            if !left.is_truthy() {
                return Ok(RuntimeValue::Bool(false));
            }
            return Ok(RuntimeValue::Bool(evaluate(rhs, ctx)?.is_truthy()));
        }
        BinaryOp::Or => {
            let left = evaluate(lhs, ctx)?;
            if left.is_truthy() {
                return Ok(RuntimeValue::Bool(true));
            }
            return Ok(RuntimeValue::Bool(evaluate(rhs, ctx)?.is_truthy()));
        }
        _ => {}
    }

    let left = evaluate(lhs, ctx)?;
    let right = evaluate(rhs, ctx)?;

    match op {
        BinaryOp::Eq => Ok(RuntimeValue::Bool(values_equal(&left, &right))),
        BinaryOp::Ne => Ok(RuntimeValue::Bool(!values_equal(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&left, &right)?;
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::Ge => ordering.is_ge(),
                _ => unreachable!(),
            };
            Ok(RuntimeValue::Bool(result))
        }
        BinaryOp::Add => add(&left, &right),
        BinaryOp::Sub => arithmetic(&left, &right, "subtract", |a, b| a - b, |a, b| a - b),
        BinaryOp::Mul => arithmetic(&left, &right, "multiply", |a, b| a * b, |a, b| a * b),
        BinaryOp::Div => {
            if matches!(right, RuntimeValue::Int(0)) {
                return Err(RuntimeError::action("division by zero"));
            }
            match (&left, &right) {
                (RuntimeValue::Int(a), RuntimeValue::Int(b)) => Ok(RuntimeValue::Int(a / b)),
                _ => arithmetic(&left, &right, "divide", |a, b| a / b, |a, b| a / b),
            }
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

/// Structural equality with numeric cross-type comparison.
fn values_equal(left: &RuntimeValue, right: &RuntimeValue) -> bool {
    match (left, right) {
        (RuntimeValue::Int(a), RuntimeValue::Float(b))
        | (RuntimeValue::Float(b), RuntimeValue::Int(a)) => (*a as f64) == *b,
        _ => left == right,
    }
}

fn compare(left: &RuntimeValue, right: &RuntimeValue) -> RuntimeResult<std::cmp::Ordering> {
    use std::cmp::Ordering;
    match (left, right) {
        (RuntimeValue::Int(a), RuntimeValue::Int(b)) => Ok(a.cmp(b)),
        (RuntimeValue::Text(a), RuntimeValue::Text(b)) => Ok(a.cmp(b)),
        (RuntimeValue::Int(a), RuntimeValue::Float(b)) => {
            Ok((*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal))
        }
        (RuntimeValue::Float(a), RuntimeValue::Int(b)) => {
            Ok(a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal))
        }
        (RuntimeValue::Float(a), RuntimeValue::Float(b)) => {
            Ok(a.partial_cmp(b).unwrap_or(Ordering::Equal))
        }
        (a, b) => Err(RuntimeError::action(format!(
            "cannot order a {} value against a {} value",
            a.type_label(),
            b.type_label()
        ))),
    }
}

fn add(left: &RuntimeValue, right: &RuntimeValue) -> RuntimeResult<RuntimeValue> {
    match (left, right) {
        // String concatenation renders the other side in business terms.
        (RuntimeValue::Text(a), b) => Ok(RuntimeValue::Text(format!("{a}{b}"))),
        (a, RuntimeValue::Text(b)) => Ok(RuntimeValue::Text(format!("{a}{b}"))),
        _ => arithmetic(left, right, "add", |a, b| a + b, |a, b| a + b),
    }
}

fn arithmetic(
    left: &RuntimeValue,
    right: &RuntimeValue,
    what: &str,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> RuntimeResult<RuntimeValue> {
    match (left, right) {
        (RuntimeValue::Int(a), RuntimeValue::Int(b)) => Ok(RuntimeValue::Int(int_op(*a, *b))),
        (RuntimeValue::Int(a), RuntimeValue::Float(b)) => {
            Ok(RuntimeValue::Float(float_op(*a as f64, *b)))
        }
        (RuntimeValue::Float(a), RuntimeValue::Int(b)) => {
            Ok(RuntimeValue::Float(float_op(*a, *b as f64)))
        }
        (RuntimeValue::Float(a), RuntimeValue::Float(b)) => {
            Ok(RuntimeValue::Float(float_op(*a, *b)))
        }
        (a, b) => Err(RuntimeError::action(format!(
            "cannot {what} a {} value and a {} value",
            a.type_label(),
            b.type_label()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GlobalStore;
    use aro_core::ast::Span;

    fn guard_ctx(payload: RuntimeValue) -> ExecutionContext {
        ExecutionContext::for_guard(GlobalStore::new(), &payload)
    }

    fn reference(base: &str) -> Expr {
        Expr::Ref(Descriptor::plain(base, Span::default()))
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    #[test]
    fn age_guard_matches_the_payload() {
        let guard = binary(
            BinaryOp::Ge,
            reference("age"),
            Expr::Literal(RuntimeValue::Int(18)),
        );
        let minor = guard_ctx(RuntimeValue::map([("age", RuntimeValue::Int(17))]));
        let adult = guard_ctx(RuntimeValue::map([("age", RuntimeValue::Int(21))]));
        assert_eq!(evaluate(&guard, &minor).unwrap(), RuntimeValue::Bool(false));
        assert_eq!(evaluate(&guard, &adult).unwrap(), RuntimeValue::Bool(true));
    }

    #[test]
    fn missing_payload_fields_resolve_to_null() {
        let guard = binary(BinaryOp::Eq, reference("role"), Expr::Literal("admin".into()));
        let ctx = guard_ctx(RuntimeValue::map([("age", RuntimeValue::Int(30))]));
        assert_eq!(evaluate(&guard, &ctx).unwrap(), RuntimeValue::Bool(false));
    }

    #[test]
    fn short_circuit_skips_the_right_operand() {
        // The right side would fail (ordering a mapping), but `or` never
        // reaches it.
        let bad = binary(BinaryOp::Lt, reference("event"), Expr::Literal(RuntimeValue::Int(1)));
        let guard = binary(BinaryOp::Or, Expr::Literal(RuntimeValue::Bool(true)), bad);
        let ctx = guard_ctx(RuntimeValue::map([("x", RuntimeValue::Int(1))]));
        assert_eq!(evaluate(&guard, &ctx).unwrap(), RuntimeValue::Bool(true));
    }

    #[test]
    fn arithmetic_promotes_to_float() {
        let expr = binary(
            BinaryOp::Add,
            Expr::Literal(RuntimeValue::Int(1)),
            Expr::Literal(RuntimeValue::Float(0.5)),
        );
        let ctx = ExecutionContext::new(GlobalStore::new());
        assert_eq!(evaluate(&expr, &ctx).unwrap(), RuntimeValue::Float(1.5));
    }

    #[test]
    fn string_concatenation() {
        let expr = binary(
            BinaryOp::Add,
            Expr::Literal("count: ".into()),
            Expr::Literal(RuntimeValue::Int(3)),
        );
        let ctx = ExecutionContext::new(GlobalStore::new());
        assert_eq!(evaluate(&expr, &ctx).unwrap(), RuntimeValue::Text("count: 3".into()));
    }

    #[test]
    fn division_by_zero_is_an_action_error() {
        let expr = binary(
            BinaryOp::Div,
            Expr::Literal(RuntimeValue::Int(1)),
            Expr::Literal(RuntimeValue::Int(0)),
        );
        let ctx = ExecutionContext::new(GlobalStore::new());
        assert!(evaluate(&expr, &ctx).is_err());
    }

    #[test]
    fn qualifier_access_in_references() {
        let mut descriptor = Descriptor::plain("user", Span::default());
        descriptor.qualifier = Some("email".to_string());
        let expr = Expr::Ref(descriptor);

        let mut ctx = ExecutionContext::new(GlobalStore::new());
        ctx.bind(
            "user",
            RuntimeValue::map([("email", "a@example.com".into())]),
        );
        assert_eq!(
            evaluate(&expr, &ctx).unwrap(),
            RuntimeValue::Text("a@example.com".into())
        );
    }

    #[test]
    fn list_index_qualifiers_are_pure() {
        let items = RuntimeValue::List(vec![
            RuntimeValue::Int(1),
            RuntimeValue::Int(2),
            RuntimeValue::Int(3),
        ]);
        assert_eq!(apply_pure_qualifier(&items, "first"), RuntimeValue::Int(1));
        assert_eq!(apply_pure_qualifier(&items, "last"), RuntimeValue::Int(3));
        assert_eq!(apply_pure_qualifier(&items, "0"), RuntimeValue::Int(3));
        assert_eq!(apply_pure_qualifier(&items, "2"), RuntimeValue::Int(1));
        assert_eq!(apply_pure_qualifier(&items, "9"), RuntimeValue::Null);
    }
}
