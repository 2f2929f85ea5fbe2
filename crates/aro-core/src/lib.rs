//! # ARO Core
//!
//! The shared data model of the ARO toolchain.
//!
//! ARO is a declarative language whose statements read
//! `<Action> the <result: qualifier> preposition the <object: qualifier>.`
//! This crate defines everything the compiler, the runtime, and the plugin
//! hosts exchange:
//!
//! - **Values**: [`RuntimeValue`], the uniform variable/payload/exchange type
//! - **Syntax**: [`Statement`], [`Descriptor`], [`FeatureSet`], [`Expr`]
//! - **Analysis results**: [`AnalyzedFeatureSet`], [`Program`], [`GlobalRegistry`]
//! - **Diagnostics**: accumulated, never thrown ([`Diagnostic`])
//! - **Events**: [`EventEnvelope`] and [`RepositoryChange`]
//! - **Errors**: the runtime failure taxonomy ([`RuntimeError`])
//!
//! Higher layers build on these without circular dependencies: the compiler
//! produces [`Program`]s, the runtime interprets them, and plugin hosts feed
//! additional verbs and qualifiers into the runtime's registries.

pub mod ast;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod program;
pub mod value;

// Re-exports
pub use ast::{
    BinaryOp, Descriptor, Expr, FeatureSet, FeatureSetKind, Preposition, Span, Statement, UnaryOp,
};
pub use diagnostics::{Diagnostic, Severity, has_errors};
pub use error::{RuntimeError, RuntimeResult};
pub use event::{ChangeKind, EventEnvelope, RepositoryChange};
pub use program::{
    AnalyzedFeatureSet, AnalyzedProgram, GlobalRegistry, GlobalSymbol, Program, SymbolInfo,
    SymbolTable, Visibility,
};
pub use value::{RuntimeValue, ValueType};
