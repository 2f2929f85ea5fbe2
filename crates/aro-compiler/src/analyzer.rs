//! Semantic analysis.
//!
//! Walks each feature set's statements in textual order, building the local
//! symbol table, the dependency set (reads of names never bound locally),
//! and the export set (names published to the global registry). Verb and
//! preposition pairing is validated against the built-in verb table; unknown
//! verbs are left for runtime resolution because plugins register additional
//! verbs after compilation.

use std::collections::BTreeSet;

use tracing::debug;

use aro_core::ast::{Expr, FeatureSet, Statement};
use aro_core::diagnostics::Diagnostic;
use aro_core::program::{
    AnalyzedFeatureSet, AnalyzedProgram, GlobalSymbol, SymbolInfo, SymbolTable, Visibility,
};

use crate::parser::ParsedFile;
use crate::verbs;

/// Analyzes a parsed file into an [`AnalyzedProgram`].
///
/// Parse diagnostics are carried through; analysis diagnostics are appended.
pub fn analyze(parsed: ParsedFile, origin: Option<&str>) -> (AnalyzedProgram, Vec<Diagnostic>) {
    let mut diagnostics = parsed.diagnostics;
    let mut program = AnalyzedProgram::default();

    for feature_set in parsed.feature_sets {
        let analyzed = analyze_feature_set(feature_set, origin, &mut program, &mut diagnostics);
        program.feature_sets.push(analyzed);
    }

    if let Some(origin) = origin {
        for diagnostic in &mut diagnostics {
            if diagnostic.origin.is_none() {
                diagnostic.origin = Some(origin.to_string());
            }
        }
    }

    (program, diagnostics)
}

/// Parses and analyzes `source` in one step.
pub fn compile_source(source: &str, origin: Option<&str>) -> (AnalyzedProgram, Vec<Diagnostic>) {
    let parsed = match origin {
        Some(origin) => crate::parser::parse_named(source, origin),
        None => crate::parser::parse(source),
    };
    analyze(parsed, origin)
}

fn analyze_feature_set(
    feature_set: FeatureSet,
    origin: Option<&str>,
    program: &mut AnalyzedProgram,
    diagnostics: &mut Vec<Diagnostic>,
) -> AnalyzedFeatureSet {
    let identity = feature_set.identity();
    let mut symbols = SymbolTable::default();
    let mut dependencies = BTreeSet::new();
    let mut exports = BTreeSet::new();

    for (index, statement) in feature_set.statements.iter().enumerate() {
        check_preposition(statement, diagnostics);

        // Reads happen before the statement's own binding takes effect.
        for name in statement_reads(statement) {
            if !symbols.contains(&name) {
                dependencies.insert(name);
            }
        }

        let bound = &statement.result.base;
        if bound.is_empty() {
            continue;
        }

        let canonical = verbs::canonical(&statement.verb).unwrap_or(statement.verb.as_str());
        let visibility = match canonical {
            "publish" => Visibility::Published,
            "return" | "throw" => Visibility::Exported,
            _ => Visibility::Local,
        };

        if visibility == Visibility::Published {
            exports.insert(bound.clone());
            let symbol = GlobalSymbol {
                owner: identity.clone(),
                statement_index: index,
                span: statement.span,
            };
            if let Err(existing) = program.globals.publish(bound.clone(), symbol) {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "'{bound}' is already published by '{}'",
                        existing.owner
                    ))
                    .at(statement.span)
                    .hint("each published name must have exactly one owner"),
                );
                continue;
            }
        }

        if symbols.contains(bound) {
            diagnostics.push(
                Diagnostic::warning(format!(
                    "'{bound}' is bound again; the earlier value is replaced"
                ))
                .at(statement.span),
            );
        } else {
            symbols.bind(
                bound.clone(),
                SymbolInfo {
                    first_binding: index,
                    visibility,
                },
            );
        }
    }

    debug!(
        feature_set = %identity,
        symbols = symbols.len(),
        dependencies = dependencies.len(),
        exports = exports.len(),
        "Feature set analyzed"
    );

    AnalyzedFeatureSet {
        feature_set,
        symbols,
        dependencies,
        exports,
        origin: origin.map(str::to_string),
    }
}

fn check_preposition(statement: &Statement, diagnostics: &mut Vec<Diagnostic>) {
    let Some(preposition) = statement.preposition else {
        return;
    };
    // Unknown verbs are resolved against the action registry at runtime.
    let Some(spec) = verbs::lookup(&statement.verb) else {
        return;
    };
    if spec.prepositions.contains(&preposition) {
        return;
    }
    let allowed = spec
        .prepositions
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    diagnostics.push(
        Diagnostic::error(format!(
            "the verb '{}' cannot take the preposition '{preposition}'",
            statement.verb
        ))
        .at(statement.span)
        .hint(format!("valid prepositions for '{}': {allowed}", spec.canonical)),
    );
}

/// Names a statement reads: the object base plus every descriptor reference
/// in the `with` clause.
fn statement_reads(statement: &Statement) -> BTreeSet<String> {
    let mut reads = BTreeSet::new();
    if let Some(object) = &statement.object {
        if !object.base.is_empty() && object.literal.is_none() {
            reads.insert(object.base.clone());
        }
    }
    if let Some(expr) = &statement.expression {
        collect_expr_reads(expr, &mut reads);
    }
    if let Some(mapping) = &statement.with_mapping {
        for (_, expr) in mapping {
            collect_expr_reads(expr, &mut reads);
        }
    }
    reads
}

fn collect_expr_reads(expr: &Expr, reads: &mut BTreeSet<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Ref(descriptor) => {
            if !descriptor.base.is_empty() && descriptor.literal.is_none() {
                reads.insert(descriptor.base.clone());
            }
        }
        Expr::Unary { operand, .. } => collect_expr_reads(operand, reads),
        Expr::Binary { lhs, rhs, .. } => {
            collect_expr_reads(lhs, reads);
            collect_expr_reads(rhs, reads);
        }
        Expr::Mapping(entries) => {
            for (_, value) in entries {
                collect_expr_reads(value, reads);
            }
        }
    }
}
