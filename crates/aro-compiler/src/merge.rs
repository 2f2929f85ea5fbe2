//! Program merging.
//!
//! Fuses the analyzed results of multiple source files into one executable
//! [`Program`]: feature sets are concatenated, test feature sets are
//! stripped, global registries are fused with duplicate-owner errors, and
//! the program's entry-point constraints are validated.

use tracing::debug;

use aro_core::ast::FeatureSetKind;
use aro_core::diagnostics::Diagnostic;
use aro_core::program::{AnalyzedProgram, Program};

use crate::verbs::{self, VerbRole};

/// Names every program can read without anyone exporting them.
const AMBIENT_NAMES: &[&str] = &["event", "change", "console"];

/// Merges per-file analysis results into one program.
pub fn merge(programs: Vec<AnalyzedProgram>) -> (Program, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let mut merged = Program::default();

    for program in programs {
        for analyzed in program.feature_sets {
            let fs = &analyzed.feature_set;
            // Test feature sets never reach production, but the application
            // lifecycle hooks are always retained.
            let lifecycle = matches!(
                fs.kind(),
                FeatureSetKind::ApplicationStart
                    | FeatureSetKind::ApplicationEndSuccess
                    | FeatureSetKind::ApplicationEndError
            );
            if fs.is_test() && !lifecycle {
                debug!(feature_set = %fs.identity(), "Test feature set stripped");
                continue;
            }
            merged.feature_sets.push(analyzed);
        }

        for (name, symbol) in program.globals.iter() {
            if let Err(existing) = merged.globals.publish(name.clone(), symbol.clone()) {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "'{name}' is published by both '{}' and '{}'",
                        existing.owner, symbol.owner
                    ))
                    .at(symbol.span)
                    .hint("each published name must have exactly one owner; the first wins"),
                );
            }
        }
    }

    validate_entry_points(&merged, &mut diagnostics);
    warn_unresolved_sources(&merged, &mut diagnostics);

    (merged, diagnostics)
}

fn validate_entry_points(program: &Program, diagnostics: &mut Vec<Diagnostic>) {
    let starts = program.feature_sets_where(|fs| fs.kind() == FeatureSetKind::ApplicationStart);
    match starts.len() {
        0 => diagnostics.push(
            Diagnostic::error("the program has no 'Application-Start' feature set")
                .hint("declare exactly one '(Application-Start: …)' entry point"),
        ),
        1 => {}
        _ => {
            for extra in &starts[1..] {
                diagnostics.push(
                    Diagnostic::error("the program has more than one 'Application-Start'")
                        .at(extra.feature_set.span),
                );
            }
        }
    }

    for (kind, label) in [
        (FeatureSetKind::ApplicationEndSuccess, "Application-End: Success"),
        (FeatureSetKind::ApplicationEndError, "Application-End: Error"),
    ] {
        let ends = program.feature_sets_where(|fs| fs.kind() == kind);
        for extra in ends.iter().skip(1) {
            diagnostics.push(
                Diagnostic::error(format!("the program has more than one '{label}'"))
                    .at(extra.feature_set.span),
            );
        }
    }
}

/// Flags data sources that nothing binds, exports, or provides ambiently.
///
/// The check is restricted to objects of Request-role verbs: those are the
/// positions where a dangling name means the statement can never produce a
/// value. Repository names and ambient names are always resolvable.
fn warn_unresolved_sources(program: &Program, diagnostics: &mut Vec<Diagnostic>) {
    for analyzed in &program.feature_sets {
        for statement in &analyzed.feature_set.statements {
            let role = verbs::lookup(&statement.verb).map(|spec| spec.role);
            if role != Some(VerbRole::Request) {
                continue;
            }
            let Some(object) = &statement.object else {
                continue;
            };
            let name = &object.base;
            if name.is_empty()
                || object.literal.is_some()
                || analyzed.symbols.contains(name)
                || program.globals.contains(name)
                || name.ends_with("-repository")
                || AMBIENT_NAMES.contains(&name.as_str())
            {
                continue;
            }
            let exported_somewhere = program
                .feature_sets
                .iter()
                .any(|other| other.exports.contains(name));
            if !exported_somewhere {
                let mut diagnostic = Diagnostic::warning(format!(
                    "'{name}' is read here but never bound, published, or stored"
                ))
                .at(statement.span);
                if let Some(origin) = &analyzed.origin {
                    diagnostic = diagnostic.in_file(origin.clone());
                }
                diagnostics.push(diagnostic);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::compile_source;
    use aro_core::diagnostics::has_errors;

    fn program_of(sources: &[&str]) -> (Program, Vec<Diagnostic>) {
        let mut programs = Vec::new();
        let mut diagnostics = Vec::new();
        for (index, source) in sources.iter().enumerate() {
            let origin = format!("file{index}.aro");
            let (program, mut diags) = compile_source(source, Some(&origin));
            programs.push(program);
            diagnostics.append(&mut diags);
        }
        let (merged, mut merge_diags) = merge(programs);
        diagnostics.append(&mut merge_diags);
        (merged, diagnostics)
    }

    const START: &str = r#"(Application-Start: Boot) {
        Log "up" to the <console>.
    }"#;

    #[test]
    fn test_feature_sets_are_stripped() {
        let (program, diagnostics) = program_of(&[
            START,
            r#"(checkParsing: Parser Tests) {
                Expect the <result> to the <expected>.
            }
            (listUsers: User Management) {
                Retrieve the <users> from the <user-repository>.
            }"#,
        ]);
        assert!(!has_errors(&diagnostics), "{diagnostics:?}");
        let names: Vec<_> = program
            .feature_sets
            .iter()
            .map(|fs| fs.feature_set.name.as_str())
            .collect();
        assert!(names.contains(&"Application-Start"));
        assert!(names.contains(&"listUsers"));
        assert!(!names.contains(&"checkParsing"));
    }

    #[test]
    fn lifecycle_feature_sets_survive_even_as_tests() {
        // An Application-Start whose activity happens to end in "Test" is
        // still the entry point.
        let (program, diagnostics) = program_of(&[r#"(Application-Start: Smoke Test) {
            Log "up" to the <console>.
        }"#]);
        assert!(!has_errors(&diagnostics), "{diagnostics:?}");
        assert_eq!(program.feature_sets.len(), 1);
    }

    #[test]
    fn missing_entry_point_is_an_error() {
        let (_, diagnostics) = program_of(&[r#"(helper: Utilities) {
            Log "x" to the <console>.
        }"#]);
        assert!(diagnostics.iter().any(|d| d.message.contains("no 'Application-Start'")));
    }

    #[test]
    fn empty_program_reports_missing_entry_point() {
        let (program, diagnostics) = program_of(&[""]);
        assert!(program.feature_sets.is_empty());
        assert!(diagnostics.iter().any(|d| d.message.contains("no 'Application-Start'")));
    }

    #[test]
    fn duplicate_start_is_an_error() {
        let (_, diagnostics) = program_of(&[START, START]);
        assert!(
            diagnostics
                .iter()
                .any(|d| d.message.contains("more than one 'Application-Start'"))
        );
    }

    #[test]
    fn cross_file_duplicate_publisher_keeps_first() {
        let (program, diagnostics) = program_of(&[
            START,
            r#"(a: Config) { Publish the <settings> for the <application>. }"#,
            r#"(b: Config) { Publish the <settings> for the <application>. }"#,
        ]);
        assert!(has_errors(&diagnostics));
        assert_eq!(program.globals.owner_of("settings").unwrap().owner, "a: Config");
    }

    #[test]
    fn cross_file_exports_resolve_dependencies() {
        let (_, diagnostics) = program_of(&[
            START,
            r#"(producer: Config) { Publish the <settings> for the <application>. }"#,
            r#"(consumer: Config) { Retrieve the <mode> from the <settings>. }"#,
        ]);
        assert!(!has_errors(&diagnostics), "{diagnostics:?}");
        assert!(
            !diagnostics.iter().any(|d| d.message.contains("never bound")),
            "{diagnostics:?}"
        );
    }

    #[test]
    fn dangling_request_source_warns() {
        let (_, diagnostics) = program_of(&[
            START,
            r#"(consumer: Config) { Retrieve the <mode> from the <nowhere>. }"#,
        ]);
        assert!(
            diagnostics
                .iter()
                .any(|d| d.message.contains("'nowhere' is read here")),
            "{diagnostics:?}"
        );
    }
}
