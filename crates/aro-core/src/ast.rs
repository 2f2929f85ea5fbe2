//! Abstract syntax tree for the ARO surface language.
//!
//! Every ARO statement reads
//! `<Action> the <result: qualifier> preposition the <object: qualifier>.`
//! and statements are grouped into named feature sets. The types here are
//! immutable after parsing; the semantic analyzer and the runtime both
//! consume them without rewriting.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::RuntimeValue;

// =============================================================================
// Source positions
// =============================================================================

/// A 1-based line/column position in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

// =============================================================================
// Prepositions
// =============================================================================

/// The grammatical connector between result and object descriptors.
///
/// Each verb admits a fixed subset; the analyzer rejects everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Preposition {
    From,
    To,
    With,
    For,
    In,
    On,
    Against,
    Via,
    Into,
    Until,
}

impl Preposition {
    /// Parses a lowercase preposition word.
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "from" => Some(Preposition::From),
            "to" => Some(Preposition::To),
            "with" => Some(Preposition::With),
            "for" => Some(Preposition::For),
            "in" => Some(Preposition::In),
            "on" => Some(Preposition::On),
            "against" => Some(Preposition::Against),
            "via" => Some(Preposition::Via),
            "into" => Some(Preposition::Into),
            "until" => Some(Preposition::Until),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Preposition::From => "from",
            Preposition::To => "to",
            Preposition::With => "with",
            Preposition::For => "for",
            Preposition::In => "in",
            Preposition::On => "on",
            Preposition::Against => "against",
            Preposition::Via => "via",
            Preposition::Into => "into",
            Preposition::Until => "until",
        }
    }
}

impl fmt::Display for Preposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// An angle-bracket descriptor: `<base>`, `<base: qualifier>`,
/// `<base: namespace.qualifier>`, or a literal form such as `<"text">`.
///
/// The `base` is the variable the descriptor binds or reads. The qualifier is
/// interpreted at runtime: a property of the bound value, a registered
/// transformation, or a list-index selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub base: String,
    pub qualifier: Option<String>,
    pub specifiers: Vec<String>,
    pub literal: Option<RuntimeValue>,
    pub span: Span,
}

impl Descriptor {
    /// A plain descriptor reading or binding `base`.
    pub fn plain(base: impl Into<String>, span: Span) -> Self {
        Self {
            base: base.into(),
            qualifier: None,
            specifiers: Vec::new(),
            literal: None,
            span,
        }
    }

    /// A descriptor wrapping a literal value, as written `Log "text" to …`.
    pub fn literal(value: RuntimeValue, span: Span) -> Self {
        Self {
            base: String::new(),
            qualifier: None,
            specifiers: Vec::new(),
            literal: Some(value),
            span,
        }
    }

    /// Splits a namespaced qualifier (`collections.reverse`) into
    /// `(namespace, name)`; a bare qualifier has no namespace part.
    pub fn qualifier_parts(&self) -> Option<(Option<&str>, &str)> {
        let qualifier = self.qualifier.as_deref()?;
        match qualifier.split_once('.') {
            Some((ns, name)) => Some((Some(ns), name)),
            None => Some((None, qualifier)),
        }
    }
}

// =============================================================================
// Expressions
// =============================================================================

/// Guard and `with`-clause expressions.
///
/// Guards must be pure over the event payload and published globals; the
/// evaluator enforces that by construction, since expressions can only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(RuntimeValue),
    /// A descriptor reference such as `<age>` or `<user: email>`.
    Ref(Descriptor),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// An inline mapping literal: `{ mode: "test", retries: 3 }`.
    Mapping(Vec<(String, Expr)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

// =============================================================================
// Statements and feature sets
// =============================================================================

/// One parsed statement. Immutable after parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Lowercased action verb.
    pub verb: String,
    pub result: Descriptor,
    pub preposition: Option<Preposition>,
    pub object: Option<Descriptor>,
    /// Inline `with <expression>` operand.
    pub expression: Option<Expr>,
    /// `with { key: value, … }` accompaniment mapping.
    pub with_mapping: Option<Vec<(String, Expr)>>,
    pub span: Span,
}

/// A named block of statements realizing one business capability.
///
/// `name` and `business_activity` together form the feature set's logical
/// identity; reserved spellings select special roles (see
/// [`FeatureSetKind`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub name: String,
    pub business_activity: String,
    pub guard: Option<Expr>,
    pub statements: Vec<Statement>,
    pub span: Span,
}

impl FeatureSet {
    /// The logical identity `name: business activity`.
    pub fn identity(&self) -> String {
        format!("{}: {}", self.name, self.business_activity)
    }

    /// Classifies the feature set from its reserved-name conventions.
    pub fn kind(&self) -> FeatureSetKind {
        if self.name == "Application-Start" {
            return FeatureSetKind::ApplicationStart;
        }
        if self.name == "Application-End" {
            return match self.business_activity.as_str() {
                "Error" => FeatureSetKind::ApplicationEndError,
                _ => FeatureSetKind::ApplicationEndSuccess,
            };
        }
        if let Some(event) = self.business_activity.strip_suffix(" Handler") {
            return FeatureSetKind::EventHandler {
                event: event.to_string(),
            };
        }
        if let Some(repository) = self.business_activity.strip_suffix(" Observer") {
            return FeatureSetKind::RepositoryObserver {
                repository: repository.to_string(),
            };
        }
        FeatureSetKind::Plain
    }

    /// Whether the business activity marks this as a test feature set.
    /// The suffix comparison is case-sensitive.
    pub fn is_test(&self) -> bool {
        self.business_activity.ends_with("Test") || self.business_activity.ends_with("Tests")
    }
}

/// The role a feature set plays in the program, derived from its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureSetKind {
    /// The single entry point (`Application-Start`).
    ApplicationStart,
    /// Orderly-shutdown hook (`Application-End: Success`).
    ApplicationEndSuccess,
    /// Abnormal-exit hook (`Application-End: Error`).
    ApplicationEndError,
    /// Runs when the named domain event is emitted.
    EventHandler { event: String },
    /// Runs when the named repository mutates.
    RepositoryObserver { repository: String },
    /// An ordinary feature set, invoked by name.
    Plain,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature_set(name: &str, activity: &str) -> FeatureSet {
        FeatureSet {
            name: name.to_string(),
            business_activity: activity.to_string(),
            guard: None,
            statements: Vec::new(),
            span: Span::default(),
        }
    }

    #[test]
    fn reserved_names_classify() {
        assert_eq!(
            feature_set("Application-Start", "Hello").kind(),
            FeatureSetKind::ApplicationStart
        );
        assert_eq!(
            feature_set("Application-End", "Success").kind(),
            FeatureSetKind::ApplicationEndSuccess
        );
        assert_eq!(
            feature_set("Application-End", "Error").kind(),
            FeatureSetKind::ApplicationEndError
        );
        assert_eq!(
            feature_set("Welcome", "UserCreated Handler").kind(),
            FeatureSetKind::EventHandler {
                event: "UserCreated".to_string()
            }
        );
        assert_eq!(
            feature_set("Audit", "user-repository Observer").kind(),
            FeatureSetKind::RepositoryObserver {
                repository: "user-repository".to_string()
            }
        );
        assert_eq!(feature_set("createUser", "User Management").kind(), FeatureSetKind::Plain);
    }

    #[test]
    fn test_suffix_is_case_sensitive() {
        assert!(feature_set("a", "Parser Test").is_test());
        assert!(feature_set("a", "Parser Tests").is_test());
        assert!(!feature_set("a", "Parser test").is_test());
        // A bare suffix match is intentional: "LoadTest" is a test activity.
        assert!(feature_set("a", "LoadTest").is_test());
    }

    #[test]
    fn qualifier_parts_split_namespaces() {
        let mut d = Descriptor::plain("list", Span::default());
        d.qualifier = Some("collections.reverse".to_string());
        assert_eq!(d.qualifier_parts(), Some((Some("collections"), "reverse")));
        d.qualifier = Some("uppercase".to_string());
        assert_eq!(d.qualifier_parts(), Some((None, "uppercase")));
    }
}
