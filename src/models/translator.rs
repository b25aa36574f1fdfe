//! Translator symbol universes and propositional literals.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attributes of one candidate symbol (e.g. `version`, `provider`).
pub type SymbolAttributes = BTreeMap<String, String>;

/// One record of a repository's translator data stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatorInfo {
    /// Group key, `"{translator}-{name}"`
    pub symbol: String,
    /// Attributes of the candidate
    #[serde(default)]
    pub attributes: SymbolAttributes,
}

/// Translator records grouped by symbol, merged across all repositories.
pub type TranslatorData = BTreeMap<String, Vec<SymbolAttributes>>;

/// Groups a flat list of [`TranslatorInfo`] into [`TranslatorData`].
pub fn group_translator_infos<I>(infos: I) -> TranslatorData
where
    I: IntoIterator<Item = TranslatorInfo>,
{
    let mut grouped = TranslatorData::new();
    for info in infos {
        grouped.entry(info.symbol).or_default().push(info.attributes);
    }
    grouped
}

/// An atomic proposition over a package variable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Literal {
    /// Variable name
    pub symbol: String,
    /// `true` for the variable itself, `false` for its negation
    pub polarity: bool,
}

impl Literal {
    /// Positive literal of `symbol`.
    pub fn positive(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            polarity: true,
        }
    }

    /// Negative literal of `symbol`.
    pub fn negative(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            polarity: false,
        }
    }

    /// The opposite literal.
    #[must_use]
    pub fn negate(&self) -> Self {
        Self {
            symbol: self.symbol.clone(),
            polarity: !self.polarity,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.polarity {
            write!(f, "{}", self.symbol)
        } else {
            write!(f, "¬{}", self.symbol)
        }
    }
}
