//! Compiler and runtime diagnostics.
//!
//! The toolchain never throws on bad source text; it accumulates
//! [`Diagnostic`]s and keeps going with a best-effort result. Diagnostics
//! are phrased in business terms and carry a `file:line:column` origin when
//! one is known.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::Span;

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// A single reported problem with optional remediation hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Source file the diagnostic originated from, when known.
    pub origin: Option<String>,
    pub span: Option<Span>,
    pub message: String,
    pub hints: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            origin: None,
            span: None,
            message: message.into(),
            hints: Vec::new(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            origin: None,
            span: None,
            message: message.into(),
            hints: Vec::new(),
        }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn in_file(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.severity)?;
        match (&self.origin, &self.span) {
            (Some(origin), Some(span)) => write!(f, " [{origin}:{span}]")?,
            (Some(origin), None) => write!(f, " [{origin}]")?,
            (None, Some(span)) => write!(f, " [{span}]")?,
            (None, None) => {}
        }
        write!(f, ": {}", self.message)?;
        for hint in &self.hints {
            write!(f, "\n  hint: {hint}")?;
        }
        Ok(())
    }
}

/// Returns `true` when any diagnostic in the slice is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_origin_span_and_hints() {
        let diag = Diagnostic::error("the statement is missing its final period")
            .in_file("app.aro")
            .at(Span::new(3, 14))
            .hint("end every statement with '.'");
        let text = diag.to_string();
        assert!(text.contains("error [app.aro:3:14]"), "{text}");
        assert!(text.contains("hint: end every statement"), "{text}");
    }

    #[test]
    fn error_detection() {
        let diags = vec![
            Diagnostic::warning("variable 'user' is bound again"),
            Diagnostic::error("unknown preposition"),
        ];
        assert!(has_errors(&diags));
        assert!(!has_errors(&diags[..1]));
    }
}
