//! Requirement translators
//!
//! A translator turns one ecosystem's requirement value into the literals
//! that satisfy it, looking candidates up in the merged [`TranslatorData`]
//! published by all repositories. Several literals mean "any of these".
//! Translators are pure: no I/O, and the same data and value always give the
//! same literals.
//!
//! The `noop` translator is built in and passes a string value through as a
//! single variable name. Every other translator is configured by name and
//! instantiated from the static registry below.
//!
//! Translators may also publish *assumptions*: literals the resolver tries to
//! keep when several models satisfy the formula.

pub mod versioned;

pub use versioned::VersionedTranslator;

use crate::core::PpError;
use crate::models::{Literal, NOOP_TRANSLATOR, TranslatorData};
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The translator plugin contract.
pub trait Translator: Send + Sync {
    /// Literals any one of which satisfies `value`.
    fn translate_requirement(&self, data: &TranslatorData, value: &serde_json::Value)
    -> Result<Vec<Literal>>;

    /// Literals to prefer when choosing between models.
    fn assumptions(&self, _data: &TranslatorData) -> Vec<Literal> {
        Vec::new()
    }
}

/// Configured translator: registry kind plus parameters.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TranslatorConfig {
    /// Registry kind
    pub kind: String,
    /// Kind-specific parameters
    #[serde(default)]
    pub parameters: serde_json::Value,
}

type TranslatorFactory = fn(&str, &serde_json::Value) -> Result<Arc<dyn Translator>>;

const TRANSLATORS: &[(&str, TranslatorFactory)] = &[("versioned", versioned_factory)];

fn versioned_factory(name: &str, parameters: &serde_json::Value) -> Result<Arc<dyn Translator>> {
    Ok(Arc::new(VersionedTranslator::from_parameters(name, parameters)?))
}

/// All translators of one invocation, by name.
#[derive(Clone, Default)]
pub struct Translators {
    translators: BTreeMap<String, Arc<dyn Translator>>,
}

impl Translators {
    /// Instantiates every configured translator.
    ///
    /// # Errors
    ///
    /// [`PpError::UnknownPlugin`] for an unregistered kind, [`PpError::ConfigError`]
    /// if a translator is named `noop`.
    pub fn from_config(configs: &BTreeMap<String, TranslatorConfig>) -> Result<Self> {
        let mut translators = BTreeMap::new();
        for (name, config) in configs {
            if name == NOOP_TRANSLATOR {
                return Err(PpError::ConfigError {
                    message: format!("translator name '{NOOP_TRANSLATOR}' is reserved"),
                }
                .into());
            }
            let factory = TRANSLATORS
                .iter()
                .find(|(kind, _)| *kind == config.kind)
                .map(|(_, factory)| *factory)
                .ok_or_else(|| PpError::UnknownPlugin {
                    kind: "translator".to_string(),
                    name: config.kind.clone(),
                })?;
            translators.insert(name.clone(), factory(name, &config.parameters)?);
        }
        Ok(Self {
            translators,
        })
    }

    /// Adds `translator` under `name`.
    pub fn insert(&mut self, name: impl Into<String>, translator: Arc<dyn Translator>) {
        self.translators.insert(name.into(), translator);
    }

    /// Literals satisfying `value` according to translator `name`.
    pub fn translate(
        &self,
        data: &TranslatorData,
        name: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<Literal>> {
        if name == NOOP_TRANSLATOR {
            return match value {
                serde_json::Value::String(variable) => Ok(vec![Literal::positive(variable.clone())]),
                other => Err(PpError::ConfigError {
                    message: format!("'{NOOP_TRANSLATOR}' requirements must be strings, got {other}"),
                }
                .into()),
            };
        }

        let translator = self.translators.get(name).ok_or_else(|| PpError::UnknownPlugin {
            kind: "translator".to_string(),
            name: name.to_string(),
        })?;
        translator.translate_requirement(data, value)
    }

    /// Assumptions of every translator, in translator-name order.
    pub fn assumptions(&self, data: &TranslatorData) -> Vec<Literal> {
        self.translators.values().flat_map(|t| t.assumptions(data)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_noop_passes_value_through() {
        let translators = Translators::default();
        let literals = translators.translate(&TranslatorData::new(), "noop", &json!("p3")).unwrap();
        assert_eq!(literals, vec![Literal::positive("p3")]);

        let error = translators.translate(&TranslatorData::new(), "noop", &json!(3)).unwrap_err();
        assert!(matches!(error.downcast_ref::<PpError>(), Some(PpError::ConfigError { .. })));
    }

    #[test]
    fn test_unknown_translator() {
        let translators = Translators::default();
        let error = translators.translate(&TranslatorData::new(), "conan", &json!("zlib")).unwrap_err();
        assert!(matches!(error.downcast_ref::<PpError>(), Some(PpError::UnknownPlugin { .. })));
    }

    #[test]
    fn test_from_config() {
        let mut configs = BTreeMap::new();
        configs.insert(
            "pacman".to_string(),
            TranslatorConfig {
                kind: "versioned".to_string(),
                parameters: serde_json::Value::Null,
            },
        );
        assert!(Translators::from_config(&configs).is_ok());

        configs.insert(
            "noop".to_string(),
            TranslatorConfig {
                kind: "versioned".to_string(),
                parameters: serde_json::Value::Null,
            },
        );
        assert!(Translators::from_config(&configs).is_err());

        let mut unknown = BTreeMap::new();
        unknown.insert(
            "conan".to_string(),
            TranslatorConfig {
                kind: "conan".to_string(),
                parameters: serde_json::Value::Null,
            },
        );
        let error = Translators::from_config(&unknown).err().unwrap();
        assert!(matches!(error.downcast_ref::<PpError>(), Some(PpError::UnknownPlugin { .. })));
    }
}
