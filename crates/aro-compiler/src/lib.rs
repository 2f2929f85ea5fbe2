//! # ARO Compiler
//!
//! The compilation pipeline of the ARO toolchain: source text in, analyzed
//! program out.
//!
//! ```text
//! source ──▶ lexer ──▶ parser ──▶ analyzer ──▶ merger ──▶ Program
//!               │         │           │           │
//!               └─────────┴───────────┴───────────┴──▶ diagnostics
//! ```
//!
//! Every stage is error-tolerant: problems accumulate as
//! [`Diagnostic`](aro_core::Diagnostic)s and each stage returns a
//! best-effort result, so a single malformed statement never hides the rest
//! of a file from analysis.
//!
//! # Example
//!
//! ```rust,ignore
//! use aro_compiler::{compile_source, merge};
//!
//! let (program, diagnostics) = compile_source(source, Some("app.aro"));
//! let (merged, merge_diagnostics) = merge(vec![program]);
//! ```

pub mod analyzer;
pub mod lexer;
pub mod merge;
pub mod parser;
pub mod printer;
pub mod token;
pub mod verbs;

// Re-exports
pub use analyzer::{analyze, compile_source};
pub use lexer::tokenize;
pub use merge::merge;
pub use parser::{ParsedFile, parse, parse_named};
pub use printer::{print_feature_set, print_program, print_statement};
pub use verbs::{BUILTIN_VERBS, VerbRole, VerbSpec, allows_preposition, canonical, lookup};
