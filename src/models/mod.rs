//! Shared data models for resolution and execution
//!
//! This module provides the data structures that flow between repositories,
//! translators, the resolver, the graph builder and the fetch/install engines:
//!
//! - [`Requirement`] trees stated by users and published by repository formulas
//! - [`TranslatorInfo`] records and grouped [`TranslatorData`]
//! - [`Literal`]s over package variables
//! - [`PackageDetail`], [`ProductDetail`] and [`BuildContextDetail`]
//! - [`ProductInfo`] / [`DependencyProductInfos`] metadata maps
//! - the invocation [`Input`] document

pub mod package;
pub mod requirement;
pub mod translator;

pub use package::{
    BuildContextDetail, DependencyProductInfos, PackageDetail, ProductDetail, ProductInfo,
    canonical_product_info,
};
pub use requirement::{NOOP_TRANSLATOR, Requirement};
pub use translator::{
    Literal, SymbolAttributes, TranslatorData, TranslatorInfo, group_translator_infos,
};

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// A disjunction of requirements, as published by repository formulas.
pub type Clause = Vec<Requirement>;

/// The document read at the start of an install invocation.
///
/// ```json
/// {
///   "requirements": {"translator": "noop", "value": "p3"},
///   "options": null,
///   "build_options": null,
///   "locks": {},
///   "generators": ["products"]
/// }
/// ```
///
/// `requirements` is one requirement tree or a list of them, which must all
/// hold. `requirement` is accepted as an alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Input {
    /// The top-level requirement
    #[serde(rename = "requirements", alias = "requirement", deserialize_with = "one_or_all")]
    pub requirement: Requirement,
    /// Options handed to every repository
    #[serde(default)]
    pub options: serde_json::Value,
    /// Options used for nested meta builds; `null` falls back to `options`
    #[serde(default)]
    pub build_options: Option<serde_json::Value>,
    /// Lock pins, accepted for format compatibility
    #[serde(default)]
    pub locks: BTreeMap<String, BTreeMap<String, String>>,
    /// Generator names to run after installation
    #[serde(default, deserialize_with = "null_as_empty")]
    pub generators: Vec<String>,
}

// Lists first: untagged struct variants also accept JSON arrays.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrAll {
    All(Vec<Requirement>),
    One(Requirement),
}

fn one_or_all<'de, D>(deserializer: D) -> Result<Requirement, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrAll::deserialize(deserializer)? {
        OneOrAll::One(requirement) => requirement,
        OneOrAll::All(requirements) => Requirement::all(requirements),
    })
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Input {
    /// Options for nested builds.
    pub fn build_options(&self) -> &serde_json::Value {
        self.build_options.as_ref().unwrap_or(&self.options)
    }
}
