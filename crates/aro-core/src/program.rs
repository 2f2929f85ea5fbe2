//! Analyzed-program model.
//!
//! The semantic analyzer decorates parsed feature sets with symbol tables,
//! dependency sets, and export sets; the merger fuses per-file results into
//! one [`Program`] with a single [`GlobalRegistry`]. The runtime reads these
//! structures without mutating them.

use std::collections::{BTreeMap, BTreeSet};

use crate::ast::{FeatureSet, Span};

// =============================================================================
// Symbols
// =============================================================================

/// How far a bound name is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Visible only inside the owning activation.
    Local,
    /// The activation's result value, observable by its invoker.
    Exported,
    /// Written to the global registry by a `publish` statement.
    Published,
}

/// Where and how a variable was first bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolInfo {
    /// Index of the binding statement within the feature set.
    pub first_binding: usize,
    pub visibility: Visibility,
}

/// Per-feature-set variable table, keyed by base name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    symbols: BTreeMap<String, SymbolInfo>,
}

impl SymbolTable {
    pub fn bind(&mut self, name: impl Into<String>, info: SymbolInfo) -> Option<SymbolInfo> {
        self.symbols.insert(name.into(), info)
    }

    pub fn get(&self, name: &str) -> Option<&SymbolInfo> {
        self.symbols.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SymbolInfo)> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

// =============================================================================
// Analyzed feature sets
// =============================================================================

/// A feature set plus everything the analyzer learned about it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedFeatureSet {
    pub feature_set: FeatureSet,
    pub symbols: SymbolTable,
    /// Names the feature set reads without binding locally.
    pub dependencies: BTreeSet<String>,
    /// Names the feature set publishes globally.
    pub exports: BTreeSet<String>,
    /// Source file the feature set came from, when known.
    pub origin: Option<String>,
}

impl AnalyzedFeatureSet {
    pub fn identity(&self) -> String {
        self.feature_set.identity()
    }
}

// =============================================================================
// Global registry
// =============================================================================

/// The first binding site of a published name.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSymbol {
    /// Identity of the owning feature set.
    pub owner: String,
    /// Statement index of the publishing statement inside the owner.
    pub statement_index: usize,
    pub span: Span,
}

/// Program-wide map of published names to their unique owners.
///
/// Invariant: after merging, each published name has exactly one owner; a
/// later redefinition is a semantic error and the first owner is retained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalRegistry {
    entries: BTreeMap<String, GlobalSymbol>,
}

impl GlobalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a published name. Returns the existing owner when the name
    /// is already taken by a different feature set; the caller turns that
    /// into a duplicate-publisher diagnostic.
    pub fn publish(
        &mut self,
        name: impl Into<String>,
        symbol: GlobalSymbol,
    ) -> Result<(), &GlobalSymbol> {
        match self.entries.entry(name.into()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(symbol);
                Ok(())
            }
            std::collections::btree_map::Entry::Occupied(slot) => {
                let existing = slot.into_mut();
                if existing.owner == symbol.owner {
                    Ok(())
                } else {
                    Err(existing)
                }
            }
        }
    }

    pub fn owner_of(&self, name: &str) -> Option<&GlobalSymbol> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &GlobalSymbol)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Program
// =============================================================================

/// One analyzed source file, before merging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyzedProgram {
    pub feature_sets: Vec<AnalyzedFeatureSet>,
    pub globals: GlobalRegistry,
}

/// The merged, executable program: every surviving feature set plus the
/// fused global registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub feature_sets: Vec<AnalyzedFeatureSet>,
    pub globals: GlobalRegistry,
}

impl Program {
    /// Finds a feature set by name. Exact matches win; a short name also
    /// resolves a plugin-namespaced `<plugin>:<name>` entry as long as it
    /// is unambiguous.
    pub fn find_by_name(&self, name: &str) -> Option<&AnalyzedFeatureSet> {
        if let Some(found) = self
            .feature_sets
            .iter()
            .find(|fs| fs.feature_set.name == name)
        {
            return Some(found);
        }
        let suffix = format!(":{name}");
        let mut matches = self
            .feature_sets
            .iter()
            .filter(|fs| fs.feature_set.name.ends_with(&suffix));
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first)
    }

    /// All feature sets whose [`kind`](FeatureSet::kind) matches the given
    /// predicate.
    pub fn feature_sets_where<P>(&self, predicate: P) -> Vec<&AnalyzedFeatureSet>
    where
        P: Fn(&FeatureSet) -> bool,
    {
        self.feature_sets
            .iter()
            .filter(|fs| predicate(&fs.feature_set))
            .collect()
    }
}
