//! Requirement trees.
//!
//! A [`Requirement`] is the user-facing (and repository-facing) way of stating
//! what must hold in the final installation. Leaves are ecosystem-specific
//! values handed to a translator; inner nodes are propositional combinators.
//!
//! # JSON Encoding
//!
//! ```json
//! {"translator": "noop", "value": "p3"}
//! {"negated": {"translator": "pacman", "value": "bash"}}
//! {"and": [..]}   {"or": [..]}   {"xor": [..]}
//! {"if": {..}, "implies": {..}}
//! {"equivalent": [..]}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the pass-through translator whose values are literal variable names.
pub const NOOP_TRANSLATOR: &str = "noop";

/// A propositional requirement over package-existence variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Requirement {
    /// Ecosystem value interpreted by the named translator.
    Simple {
        /// Translator name (a key of the configured translators, or `noop`)
        translator: String,
        /// Opaque requirement value in the translator's own syntax
        value: serde_json::Value,
    },
    /// Logical negation.
    Negated {
        /// The negated requirement
        negated: Box<Requirement>,
    },
    /// All children must hold.
    And {
        /// Conjuncts
        and: Vec<Requirement>,
    },
    /// At least one child must hold.
    Or {
        /// Disjuncts
        or: Vec<Requirement>,
    },
    /// An odd number of children must hold.
    Xor {
        /// Parity operands
        xor: Vec<Requirement>,
    },
    /// `if_` implies `implies`.
    Implication {
        /// Antecedent
        #[serde(rename = "if")]
        if_: Box<Requirement>,
        /// Consequent
        implies: Box<Requirement>,
    },
    /// All children take the same truth value.
    Equivalence {
        /// Operands
        equivalent: Vec<Requirement>,
    },
}

impl Requirement {
    /// Builds a leaf requirement.
    pub fn simple(translator: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::Simple {
            translator: translator.into(),
            value: value.into(),
        }
    }

    /// Builds a `noop` leaf naming a variable directly.
    pub fn noop(variable: impl Into<String>) -> Self {
        Self::simple(NOOP_TRANSLATOR, variable.into())
    }

    /// Negates `self`.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Negated {
            negated: Box::new(self),
        }
    }

    /// Builds `if_ -> implies`.
    pub fn implies(if_: Self, implies: Self) -> Self {
        Self::Implication {
            if_: Box::new(if_),
            implies: Box::new(implies),
        }
    }

    /// Conjunction of `requirements`.
    pub fn all(requirements: Vec<Self>) -> Self {
        Self::And {
            and: requirements,
        }
    }

    /// Disjunction of `requirements`.
    pub fn any(requirements: Vec<Self>) -> Self {
        Self::Or {
            or: requirements,
        }
    }

    /// Returns the leaf if `self` is a simple requirement.
    pub fn as_simple(&self) -> Option<(&str, &serde_json::Value)> {
        match self {
            Self::Simple {
                translator,
                value,
            } => Some((translator, value)),
            _ => None,
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[Requirement], sep: &str) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{item}")?;
            }
            Ok(())
        }

        match self {
            Self::Simple {
                translator,
                value,
            } => match value {
                serde_json::Value::String(s) => write!(f, "{translator}:{s}"),
                other => write!(f, "{translator}:{other}"),
            },
            Self::Negated {
                negated,
            } => write!(f, "!({negated})"),
            Self::And {
                and,
            } => {
                f.write_str("(")?;
                join(f, and, " & ")?;
                f.write_str(")")
            }
            Self::Or {
                or,
            } => {
                f.write_str("(")?;
                join(f, or, " | ")?;
                f.write_str(")")
            }
            Self::Xor {
                xor,
            } => {
                f.write_str("xor(")?;
                join(f, xor, ", ")?;
                f.write_str(")")
            }
            Self::Implication {
                if_,
                implies,
            } => write!(f, "({if_} -> {implies})"),
            Self::Equivalence {
                equivalent,
            } => {
                f.write_str("equiv(")?;
                join(f, equivalent, ", ")?;
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_every_combinator() {
        let parsed: Requirement = serde_json::from_value(json!({
            "and": [
                {"translator": "noop", "value": "p1"},
                {"negated": {"translator": "noop", "value": "p2"}},
                {"or": [{"translator": "pacman", "value": "bash>=5"}]},
                {"xor": [{"translator": "noop", "value": "a"}, {"translator": "noop", "value": "b"}]},
                {"if": {"translator": "noop", "value": "a"}, "implies": {"translator": "noop", "value": "b"}},
                {"equivalent": [{"translator": "noop", "value": "c"}]}
            ]
        }))
        .unwrap();

        let Requirement::And {
            and,
        } = &parsed
        else {
            panic!("expected conjunction, got {parsed:?}");
        };
        assert_eq!(and.len(), 6);
        assert_eq!(and[0], Requirement::noop("p1"));
        assert_eq!(and[1], Requirement::noop("p2").negate());
        assert!(matches!(and[4], Requirement::Implication { .. }));
        assert!(matches!(and[5], Requirement::Equivalence { .. }));
    }

    #[test]
    fn test_serializes_implication_with_if_key() {
        let requirement = Requirement::implies(Requirement::noop("a"), Requirement::noop("b"));
        let value = serde_json::to_value(&requirement).unwrap();
        assert_eq!(
            value,
            json!({"if": {"translator": "noop", "value": "a"}, "implies": {"translator": "noop", "value": "b"}})
        );
    }

    #[test]
    fn test_display() {
        let requirement = Requirement::all(vec![
            Requirement::noop("p3"),
            Requirement::simple("pacman", "bash>=5").negate(),
        ]);
        assert_eq!(requirement.to_string(), "(noop:p3 & !(pacman:bash>=5))");

        let structured = Requirement::simple("pacman", json!({"no_provide": "sh"}));
        assert_eq!(structured.to_string(), r#"pacman:{"no_provide":"sh"}"#);
    }
}
