//! The built-in verb table.
//!
//! Each verb has a fixed role and a fixed set of valid prepositions; the
//! analyzer rejects statements whose preposition falls outside the verb's
//! set. Verbs are case-insensitive and aliases resolve to the same
//! canonical spelling. Verbs absent from this table are not a compile
//! error — plugins may register them before the program runs.

use aro_core::ast::Preposition;

/// The data-flow role of a verb. The role determines the legal preposition
/// set and the default direction data moves through the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbRole {
    /// Acquires data into the result descriptor.
    Request,
    /// Creates or mutates state the feature set owns.
    Own,
    /// Produces the activation's outward-facing result.
    Response,
    /// Makes data visible beyond the activation (globals, events).
    Export,
    /// Keeps a long-lived service alive.
    Server,
    /// Assertion verbs used inside test feature sets.
    Test,
}

/// One row of the verb table.
#[derive(Debug, Clone, Copy)]
pub struct VerbSpec {
    pub canonical: &'static str,
    pub role: VerbRole,
    pub aliases: &'static [&'static str],
    pub prepositions: &'static [Preposition],
}

use Preposition::*;

/// The normative built-in verb table.
pub static BUILTIN_VERBS: &[VerbSpec] = &[
    VerbSpec {
        canonical: "create",
        role: VerbRole::Own,
        aliases: &["make"],
        prepositions: &[With, From, For],
    },
    VerbSpec {
        canonical: "set",
        role: VerbRole::Own,
        aliases: &[],
        prepositions: &[To, For, In],
    },
    VerbSpec {
        canonical: "store",
        role: VerbRole::Own,
        aliases: &["save"],
        prepositions: &[In, Into],
    },
    VerbSpec {
        canonical: "update",
        role: VerbRole::Own,
        aliases: &[],
        prepositions: &[In, With],
    },
    VerbSpec {
        canonical: "delete",
        role: VerbRole::Own,
        aliases: &["remove"],
        prepositions: &[From, In],
    },
    VerbSpec {
        canonical: "retrieve",
        role: VerbRole::Request,
        aliases: &["get", "fetch"],
        prepositions: &[From, In],
    },
    VerbSpec {
        canonical: "compute",
        role: VerbRole::Request,
        aliases: &["calculate"],
        prepositions: &[From, With, For],
    },
    VerbSpec {
        canonical: "extract",
        role: VerbRole::Request,
        aliases: &[],
        prepositions: &[From],
    },
    VerbSpec {
        canonical: "log",
        role: VerbRole::Response,
        aliases: &["print"],
        prepositions: &[To],
    },
    VerbSpec {
        canonical: "return",
        role: VerbRole::Response,
        aliases: &[],
        prepositions: &[For, To],
    },
    VerbSpec {
        canonical: "throw",
        role: VerbRole::Response,
        aliases: &[],
        prepositions: &[For, To],
    },
    VerbSpec {
        canonical: "publish",
        role: VerbRole::Export,
        aliases: &[],
        prepositions: &[For, To],
    },
    VerbSpec {
        canonical: "emit",
        role: VerbRole::Export,
        aliases: &[],
        prepositions: &[To, For, With],
    },
    VerbSpec {
        canonical: "keepalive",
        role: VerbRole::Server,
        aliases: &[],
        prepositions: &[For, On, Until],
    },
    VerbSpec {
        canonical: "expect",
        role: VerbRole::Test,
        aliases: &["assert"],
        prepositions: &[To, From, For, Against],
    },
];

/// Looks up a verb by canonical name or alias, case-insensitively.
pub fn lookup(verb: &str) -> Option<&'static VerbSpec> {
    let lower = verb.to_ascii_lowercase();
    BUILTIN_VERBS.iter().find(|spec| {
        spec.canonical == lower || spec.aliases.iter().any(|alias| *alias == lower)
    })
}

/// Resolves a verb or alias to its canonical spelling, when built in.
pub fn canonical(verb: &str) -> Option<&'static str> {
    lookup(verb).map(|spec| spec.canonical)
}

/// Whether `preposition` is legal for `verb`. Unknown verbs accept any
/// preposition — they are resolved against the action registry at runtime.
pub fn allows_preposition(verb: &str, preposition: Preposition) -> bool {
    match lookup(verb) {
        Some(spec) => spec.prepositions.contains(&preposition),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_to_canonical() {
        assert_eq!(canonical("Get"), Some("retrieve"));
        assert_eq!(canonical("FETCH"), Some("retrieve"));
        assert_eq!(canonical("assert"), Some("expect"));
        assert_eq!(canonical("frobnicate"), None);
    }

    #[test]
    fn prepositions_are_per_verb() {
        assert!(allows_preposition("log", Preposition::To));
        assert!(!allows_preposition("log", Preposition::From));
        assert!(allows_preposition("retrieve", Preposition::From));
        assert!(!allows_preposition("retrieve", Preposition::To));
        // Unknown verbs defer to runtime resolution.
        assert!(allows_preposition("transmogrify", Preposition::Via));
    }

    #[test]
    fn every_row_has_at_least_one_preposition() {
        for spec in BUILTIN_VERBS {
            assert!(!spec.prepositions.is_empty(), "{} has none", spec.canonical);
        }
    }
}
