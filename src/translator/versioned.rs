//! A translator for name/version ecosystems with virtual providers.
//!
//! Candidates live in groups named `{prefix}-{name}`. Each candidate carries
//! a `version` attribute and, for virtual capabilities, a `provider`
//! attribute naming the concrete package that provides it.
//!
//! Accepted requirement values:
//!
//! - `"bash"`: any candidate of `bash`
//! - `"bash>=5.1"`: candidates whose version satisfies the constraint
//!   (`>=`, `<=`, `>`, `<`, `==`, `=`)
//! - `{"package": "sh", "exclude": "dash-0.5"}`: as above, minus one candidate
//! - `{"no_provide": "bash"}`: the first candidate that is not a virtual provider
//!
//! A candidate becomes the literal `{prefix}-{provider}` or
//! `{prefix}-{name}-{version}`.

use crate::core::PpError;
use crate::models::{Literal, SymbolAttributes, TranslatorData};
use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use std::cmp::Ordering;
use std::sync::LazyLock;

use super::Translator;

static CONSTRAINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<name>[^<>=\s]+)\s*(?:(?P<op>>=|<=|==|=|>|<)\s*(?P<version>\S+))?\s*$")
        .expect("constraint pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Ge,
    Le,
    Gt,
    Lt,
    Eq,
}

impl Operator {
    fn parse(token: &str) -> Option<Self> {
        match token {
            ">=" => Some(Self::Ge),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            "=" | "==" => Some(Self::Eq),
            _ => None,
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Ge => ordering != Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Lt => ordering == Ordering::Less,
            Self::Eq => ordering == Ordering::Equal,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RequirementValue {
    Plain(String),
    Exclude {
        package: String,
        exclude: String,
    },
    NoProvide {
        no_provide: String,
    },
}

#[derive(Debug, Default, Deserialize)]
struct Parameters {
    prefix: Option<String>,
}

/// Compares two version strings.
///
/// Both sides are compared as semantic versions when they parse as such.
/// Otherwise they are split into alphanumeric runs and compared run by run,
/// numerically where both runs are numbers.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    if let (Ok(l), Ok(r)) = (semver::Version::parse(left), semver::Version::parse(right)) {
        return l.cmp(&r);
    }

    let runs = |s: &str| -> Vec<String> {
        let mut runs = Vec::new();
        let mut current = String::new();
        for c in s.chars() {
            let continues = current.chars().last().is_some_and(|last| {
                last.is_ascii_digit() == c.is_ascii_digit()
            });
            if !c.is_ascii_alphanumeric() {
                if !current.is_empty() {
                    runs.push(std::mem::take(&mut current));
                }
            } else if current.is_empty() || continues {
                current.push(c);
            } else {
                runs.push(std::mem::take(&mut current));
                current.push(c);
            }
        }
        if !current.is_empty() {
            runs.push(current);
        }
        runs
    };

    let (left, right) = (runs(left), runs(right));
    for (l, r) in left.iter().zip(&right) {
        let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(l), Ok(r)) => l.cmp(&r),
            _ => l.cmp(r),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left.len().cmp(&right.len())
}

/// Translator over `{prefix}-{name}` candidate groups.
#[derive(Debug, Clone)]
pub struct VersionedTranslator {
    prefix: String,
}

impl VersionedTranslator {
    /// A translator whose groups and literals use `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Builds the translator configured as `name`; `parameters.prefix` defaults to `name`.
    pub fn from_parameters(name: &str, parameters: &serde_json::Value) -> Result<Self> {
        let parameters: Parameters = if parameters.is_null() {
            Parameters::default()
        } else {
            serde_json::from_value(parameters.clone()).map_err(|e| PpError::ConfigError {
                message: format!("invalid parameters for translator '{name}': {e}"),
            })?
        };
        Ok(Self::new(parameters.prefix.unwrap_or_else(|| name.to_string())))
    }

    fn candidates<'a>(&self, data: &'a TranslatorData, name: &str) -> &'a [SymbolAttributes] {
        data.get(&format!("{}-{name}", self.prefix)).map(Vec::as_slice).unwrap_or_default()
    }

    fn suffix(name: &str, candidate: &SymbolAttributes) -> Option<String> {
        match (candidate.get("provider"), candidate.get("version")) {
            (Some(provider), _) => Some(provider.clone()),
            (None, Some(version)) => Some(format!("{name}-{version}")),
            (None, None) => None,
        }
    }

    fn matching(
        &self,
        data: &TranslatorData,
        constraint: &str,
        exclude: Option<&str>,
    ) -> Result<Vec<Literal>> {
        let captures = CONSTRAINT.captures(constraint).ok_or_else(|| PpError::ConfigError {
            message: format!("invalid requirement '{constraint}' for translator '{}'", self.prefix),
        })?;
        let name = &captures["name"];
        let bound = match (captures.name("op"), captures.name("version")) {
            (Some(op), Some(version)) => {
                Some((Operator::parse(op.as_str()).unwrap_or(Operator::Eq), version.as_str()))
            }
            _ => None,
        };

        let mut literals = Vec::new();
        for candidate in self.candidates(data, name) {
            let Some(suffix) = Self::suffix(name, candidate) else {
                continue;
            };
            if exclude == Some(suffix.as_str()) {
                continue;
            }
            let accepted = match bound {
                None => true,
                Some((operator, wanted)) => candidate
                    .get("version")
                    .is_some_and(|version| operator.accepts(compare_versions(version, wanted))),
            };
            if accepted {
                literals.push(Literal::positive(format!("{}-{suffix}", self.prefix)));
            }
        }
        literals.sort();
        literals.dedup();
        Ok(literals)
    }
}

impl Translator for VersionedTranslator {
    fn translate_requirement(
        &self,
        data: &TranslatorData,
        value: &serde_json::Value,
    ) -> Result<Vec<Literal>> {
        let requirement: RequirementValue =
            serde_json::from_value(value.clone()).map_err(|e| PpError::ConfigError {
                message: format!("invalid requirement {value} for translator '{}': {e}", self.prefix),
            })?;

        match requirement {
            RequirementValue::Plain(constraint) => self.matching(data, &constraint, None),
            RequirementValue::Exclude {
                package,
                exclude,
            } => self.matching(data, &package, Some(&exclude)),
            RequirementValue::NoProvide {
                no_provide,
            } => Ok(self
                .candidates(data, &no_provide)
                .iter()
                .find(|candidate| !candidate.contains_key("provider"))
                .and_then(|candidate| Self::suffix(&no_provide, candidate))
                .map(|suffix| vec![Literal::positive(format!("{}-{suffix}", self.prefix))])
                .unwrap_or_default()),
        }
    }

    /// Prefers the newest concrete version of every package: all older
    /// concrete versions are assumed absent.
    fn assumptions(&self, data: &TranslatorData) -> Vec<Literal> {
        let group_prefix = format!("{}-", self.prefix);
        let mut assumptions = Vec::new();

        for (group, candidates) in data.range(group_prefix.clone()..) {
            let Some(name) = group.strip_prefix(&group_prefix) else {
                break;
            };
            let mut versions: Vec<&str> = candidates
                .iter()
                .filter(|c| !c.contains_key("provider"))
                .filter_map(|c| c.get("version").map(String::as_str))
                .collect();
            versions.sort_by(|a, b| compare_versions(a, b));
            versions.dedup();
            if let Some((_, older)) = versions.split_last() {
                assumptions.extend(
                    older.iter().map(|v| Literal::negative(format!("{}-{name}-{v}", self.prefix))),
                );
            }
        }
        assumptions
    }
}
