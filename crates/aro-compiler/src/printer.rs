//! Canonical AST printing.
//!
//! Prints a parsed program back to ARO source such that re-parsing the
//! output yields a structurally identical AST (ignoring source positions).
//! The printer emits the canonical surface form: verbs capitalized, `the`
//! before every named descriptor, literals bare.

use std::fmt::Write;

use aro_core::ast::{BinaryOp, Descriptor, Expr, FeatureSet, Statement, UnaryOp};
use aro_core::program::Program;
use aro_core::value::RuntimeValue;

/// Prints every feature set of a merged program.
pub fn print_program(program: &Program) -> String {
    let mut out = String::new();
    for analyzed in &program.feature_sets {
        out.push_str(&print_feature_set(&analyzed.feature_set));
        out.push('\n');
    }
    out
}

/// Prints one feature set in canonical form.
pub fn print_feature_set(feature_set: &FeatureSet) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "({}: {})",
        feature_set.name, feature_set.business_activity
    );
    if let Some(guard) = &feature_set.guard {
        let _ = write!(out, " when {}", print_expr(guard));
    }
    out.push_str(" {\n");
    for statement in &feature_set.statements {
        let _ = writeln!(out, "    {}", print_statement(statement));
    }
    out.push_str("}\n");
    out
}

/// Prints one statement in canonical form.
pub fn print_statement(statement: &Statement) -> String {
    let mut out = String::new();
    out.push_str(&capitalize(&statement.verb));
    out.push(' ');
    out.push_str(&print_operand(&statement.result));
    if let (Some(preposition), Some(object)) = (&statement.preposition, &statement.object) {
        let _ = write!(out, " {preposition} {}", print_operand(object));
    }
    if let Some(mapping) = &statement.with_mapping {
        let _ = write!(out, " with {}", print_mapping(mapping));
    } else if let Some(expression) = &statement.expression {
        let _ = write!(out, " with {}", print_expr(expression));
    }
    out.push('.');
    out
}

fn print_operand(descriptor: &Descriptor) -> String {
    if descriptor.base.is_empty() {
        if let Some(literal) = &descriptor.literal {
            return print_value(literal);
        }
    }
    format!("the {}", print_descriptor(descriptor))
}

fn print_descriptor(descriptor: &Descriptor) -> String {
    let mut out = String::from("<");
    out.push_str(&descriptor.base);
    if let Some(qualifier) = &descriptor.qualifier {
        let _ = write!(out, ": {qualifier}");
    }
    for specifier in &descriptor.specifiers {
        let _ = write!(out, " {specifier}");
    }
    out.push('>');
    out
}

/// Prints an expression with the minimal parentheses needed to reparse with
/// the same structure.
pub fn print_expr(expr: &Expr) -> String {
    print_expr_prec(expr, 0)
}

fn precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => 1,
        BinaryOp::And => 2,
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 3,
        BinaryOp::Add | BinaryOp::Sub => 4,
        BinaryOp::Mul | BinaryOp::Div => 5,
    }
}

fn print_expr_prec(expr: &Expr, parent: u8) -> String {
    match expr {
        Expr::Literal(value) => print_value(value),
        Expr::Ref(descriptor) => print_descriptor(descriptor),
        Expr::Unary { op, operand } => match op {
            UnaryOp::Not => format!("not {}", print_expr_prec(operand, 3)),
            UnaryOp::Neg => format!("-{}", print_expr_prec(operand, 6)),
        },
        Expr::Binary { op, lhs, rhs } => {
            let prec = precedence(*op);
            // Left-associative: the right operand prints one level tighter.
            let text = format!(
                "{} {} {}",
                print_expr_prec(lhs, prec),
                op.as_str(),
                print_expr_prec(rhs, prec + 1)
            );
            if prec < parent {
                format!("({text})")
            } else {
                text
            }
        }
        Expr::Mapping(entries) => print_mapping(entries),
    }
}

fn print_mapping(entries: &[(String, Expr)]) -> String {
    let mut out = String::from("{ ");
    for (index, (key, value)) in entries.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        if is_bare_key(key) {
            out.push_str(key);
        } else {
            out.push_str(&print_value(&RuntimeValue::Text(key.clone())));
        }
        let _ = write!(out, ": {}", print_expr(value));
    }
    out.push_str(" }");
    out
}

fn print_value(value: &RuntimeValue) -> String {
    match value {
        RuntimeValue::Null => "null".to_string(),
        RuntimeValue::Bool(b) => b.to_string(),
        RuntimeValue::Int(n) => n.to_string(),
        RuntimeValue::Float(f) => format!("{f:?}"),
        RuntimeValue::Text(s) => {
            let mut out = String::from("\"");
            for c in s.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\t' => out.push_str("\\t"),
                    '\r' => out.push_str("\\r"),
                    other => out.push(other),
                }
            }
            out.push('"');
            out
        }
        // Composite literals only arise from mappings, which have their own
        // surface syntax.
        RuntimeValue::List(_) | RuntimeValue::Map(_) => value.to_json().to_string(),
    }
}

fn is_bare_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        && !key.ends_with('-')
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use aro_core::ast::Span;

    fn strip_spans(feature_set: &mut FeatureSet) {
        feature_set.span = Span::default();
        if let Some(guard) = &mut feature_set.guard {
            strip_expr_spans(guard);
        }
        for statement in &mut feature_set.statements {
            statement.span = Span::default();
            statement.result.span = Span::default();
            if let Some(object) = &mut statement.object {
                object.span = Span::default();
            }
            if let Some(expression) = &mut statement.expression {
                strip_expr_spans(expression);
            }
            if let Some(mapping) = &mut statement.with_mapping {
                for (_, expr) in mapping {
                    strip_expr_spans(expr);
                }
            }
        }
    }

    fn strip_expr_spans(expr: &mut Expr) {
        match expr {
            Expr::Literal(_) => {}
            Expr::Ref(descriptor) => descriptor.span = Span::default(),
            Expr::Unary { operand, .. } => strip_expr_spans(operand),
            Expr::Binary { lhs, rhs, .. } => {
                strip_expr_spans(lhs);
                strip_expr_spans(rhs);
            }
            Expr::Mapping(entries) => {
                for (_, value) in entries {
                    strip_expr_spans(value);
                }
            }
        }
    }

    fn assert_round_trip(source: &str) {
        let first = parse(source);
        assert!(first.diagnostics.is_empty(), "{:?}", first.diagnostics);
        let printed: String = first
            .feature_sets
            .iter()
            .map(print_feature_set)
            .collect();
        let second = parse(&printed);
        assert!(
            second.diagnostics.is_empty(),
            "printed source failed to parse: {:?}\n{printed}",
            second.diagnostics
        );

        let mut lhs = first.feature_sets;
        let mut rhs = second.feature_sets;
        lhs.iter_mut().for_each(strip_spans);
        rhs.iter_mut().for_each(strip_spans);
        assert_eq!(lhs, rhs, "round trip diverged for:\n{printed}");
    }

    #[test]
    fn hello_world_round_trips() {
        assert_round_trip(
            r#"(Application-Start: Hello) {
                Log "Hello from ARO!" to the <console>.
                Return an <OK: status> for the <startup>.
            }"#,
        );
    }

    #[test]
    fn guards_and_mappings_round_trip() {
        assert_round_trip(
            r#"(Welcome: UserCreated Handler) when <age> >= 18 and not <blocked> {
                Create the <entry> with { name: "Alice", adult: true, score: 1.5 }.
                Store the <entry> in the <audit-repository>.
            }"#,
        );
    }

    #[test]
    fn arithmetic_round_trips_with_parentheses() {
        assert_round_trip(
            r#"(math: Arithmetic) {
                Compute the <v> from the <base> with ( <a> + <b> ) * <c> - 2.
            }"#,
        );
    }

    #[test]
    fn qualifiers_and_specifiers_round_trip() {
        assert_round_trip(
            r#"(q: Qualifier Forms) {
                Compute the <flipped: collections.reverse> from the <items>.
                Extract the <head: first> from the <items>.
                Extract the <second: 1> from the <items>.
            }"#,
        );
    }

    #[test]
    fn with_preposition_round_trips() {
        assert_round_trip(
            r#"(merge: Shaping) {
                Update the <user> with the <changes>.
            }"#,
        );
    }
}
