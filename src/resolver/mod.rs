//! Requirement resolution across all repositories.
//!
//! Resolution turns one requirement tree into the set of package variables
//! that should be installed:
//!
//! 1. **Options**: every repository translates the user options (concurrent,
//!    fail-fast).
//! 2. **Gathering**: formulas and translator data of all repositories are
//!    fetched concurrently and merged.
//! 3. **Encoding**: formula clauses and the user requirement are translated
//!    into literals and encoded as CNF ([`formula`]).
//! 4. **Solving**: the CNF is solved on a blocking thread and one model is
//!    selected deterministically ([`solver`]).
//!
//! The conjuncts of a top-level `and` are treated as separate user
//! requirements so that an unsatisfiable problem can name the ones in
//! conflict.

pub mod formula;
pub mod solver;

pub use formula::{Cnf, expand_clause};
pub use solver::Problem;

use crate::core::{PpError, scoped};
use crate::models::{Requirement, group_translator_infos};
use crate::repository::Repository;
use crate::translator::Translators;
use anyhow::{Context, Result};
use std::collections::BTreeSet;

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// True package variables of the selected model
    pub model: BTreeSet<String>,
    /// Translated options, by repository index
    pub translated_options: Vec<serde_json::Value>,
}

/// Resolves requirements against a fixed set of repositories and translators.
pub struct Resolver<'a> {
    repositories: &'a [Repository],
    translators: &'a Translators,
}

impl<'a> Resolver<'a> {
    /// A resolver over `repositories` in configuration order.
    pub fn new(repositories: &'a [Repository], translators: &'a Translators) -> Self {
        Self {
            repositories,
            translators,
        }
    }

    /// Resolves `requirement`; every repository translates the same `options`.
    ///
    /// # Errors
    ///
    /// [`PpError::NoModel`] if no model exists; any repository or translator
    /// failure otherwise.
    pub async fn resolve(
        &self,
        requirement: &Requirement,
        options: &serde_json::Value,
    ) -> Result<Resolution> {
        tracing::info!(target: "resolver", "Resolving {}", requirement);

        let translated_options =
            scoped(self.repositories.iter().map(|repository| repository.translate_options(options.clone())))
                .await?;

        let formulas = scoped(
            self.repositories
                .iter()
                .zip(&translated_options)
                .map(|(repository, translated)| repository.get_formula(translated)),
        );
        let translator_data =
            scoped(self.repositories.iter().map(|repository| repository.fetch_translator_data()));
        let (formulas, translator_data) = futures::try_join!(formulas, translator_data)?;

        let data = group_translator_infos(translator_data.into_iter().flatten());
        let translate = |translator: &str, value: &serde_json::Value| {
            self.translators.translate(&data, translator, value)
        };

        let mut cnf = Cnf::new();
        for (repository, clauses) in self.repositories.iter().zip(&formulas) {
            for clause in clauses {
                cnf.add_requirement_clause(clause, &translate, None).with_context(|| {
                    format!("Failed to translate formula of repository '{}'", repository.name())
                })?;
            }
        }

        let top_level = match requirement {
            Requirement::And {
                and,
            } => and.clone(),
            other => vec![other.clone()],
        };
        let mut selectors = Vec::with_capacity(top_level.len());
        for requirement in top_level {
            let selector = cnf.auxiliary().positive();
            cnf.add_requirement_clause(std::slice::from_ref(&requirement), &translate, Some(selector))
                .with_context(|| format!("Failed to translate requirement {requirement}"))?;
            selectors.push((selector, requirement));
        }

        let problem = Problem {
            cnf,
            selectors,
            assumptions: self.translators.assumptions(&data),
        };
        tracing::debug!(
            target: "resolver",
            "Solving {} clauses over {} variables",
            problem.cnf.clauses().len(),
            problem.cnf.variable_count()
        );

        let model = tokio::task::spawn_blocking(move || solver::solve(problem))
            .await
            .map_err(|e| PpError::InvariantViolation {
                message: format!("solver task failed: {e}"),
            })??;

        tracing::info!(target: "resolver", "Selected {} packages", model.len());

        Ok(Resolution {
            model,
            translated_options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SymbolAttributes, TranslatorInfo};
    use crate::repository::RepositoryCaches;
    use crate::test_utils::MockDriver;
    use crate::translator::{TranslatorConfig, Translators};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn repository(temp: &TempDir, name: &str, driver: MockDriver) -> Repository {
        let caches = RepositoryCaches::in_dir(&temp.path().join(name));
        Repository::create(name, Arc::new(driver), caches).await.unwrap()
    }

    fn versioned_translators() -> Translators {
        let mut configs = BTreeMap::new();
        configs.insert(
            "pacman".to_string(),
            TranslatorConfig {
                kind: "versioned".to_string(),
                parameters: serde_json::Value::Null,
            },
        );
        Translators::from_config(&configs).unwrap()
    }

    #[tokio::test]
    async fn test_formula_facts_reach_the_model() {
        let temp = TempDir::new().unwrap();
        let driver = MockDriver::new().with_formula(vec![
            vec![Requirement::noop("x")],
            vec![Requirement::noop("p3").negate(), Requirement::noop("p2")],
        ]);
        let repositories = vec![repository(&temp, "local", driver).await];
        let translators = Translators::default();

        let resolution = Resolver::new(&repositories, &translators)
            .resolve(&Requirement::noop("p3"), &serde_json::Value::Null)
            .await
            .unwrap();

        let model: Vec<_> = resolution.model.iter().map(String::as_str).collect();
        assert_eq!(model, ["p2", "p3", "x"]);
        assert_eq!(resolution.translated_options, vec![serde_json::Value::Null]);
    }

    #[tokio::test]
    async fn test_unsatisfiable_version_names_the_requirement() {
        let temp = TempDir::new().unwrap();
        let attributes: SymbolAttributes = [("version".to_string(), "1.0.0".to_string())].into();
        let driver = MockDriver::new().with_translator_data(vec![TranslatorInfo {
            symbol: "pacman-x".to_string(),
            attributes,
        }]);
        let repositories = vec![repository(&temp, "local", driver).await];
        let translators = versioned_translators();

        let requirement = Requirement::simple("pacman", "x==2.0.0");
        let error = Resolver::new(&repositories, &translators)
            .resolve(&requirement, &serde_json::Value::Null)
            .await
            .unwrap_err();

        let Some(PpError::NoModel {
            requirements,
        }) = error.downcast_ref::<PpError>()
        else {
            panic!("expected no model, got {error:#}");
        };
        assert_eq!(requirements, &vec![requirement]);
    }

    #[tokio::test]
    async fn test_newest_version_is_preferred() {
        let temp = TempDir::new().unwrap();
        let info = |version: &str| TranslatorInfo {
            symbol: "pacman-x".to_string(),
            attributes: [("version".to_string(), version.to_string())].into(),
        };
        let driver = MockDriver::new().with_translator_data(vec![info("1.0.0"), info("1.2.0")]);
        let repositories = vec![repository(&temp, "local", driver).await];
        let translators = versioned_translators();

        let resolution = Resolver::new(&repositories, &translators)
            .resolve(&Requirement::simple("pacman", "x"), &serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(resolution.model, BTreeSet::from(["pacman-x-1.2.0".to_string()]));
    }

    #[tokio::test]
    async fn test_options_reach_every_repository() {
        let temp = TempDir::new().unwrap();
        let repositories = vec![
            repository(&temp, "first", MockDriver::new()).await,
            repository(&temp, "second", MockDriver::new()).await,
        ];
        let translators = Translators::default();
        let options = serde_json::json!({"arch": "x86_64"});

        let resolution = Resolver::new(&repositories, &translators)
            .resolve(&Requirement::all(Vec::new()), &options)
            .await
            .unwrap();
        assert!(resolution.model.is_empty());
        assert_eq!(
            resolution.translated_options,
            vec![options.clone(), options]
        );
    }

    #[tokio::test]
    async fn test_conflicting_conjuncts_are_reported_individually() {
        let temp = TempDir::new().unwrap();
        let driver = MockDriver::new().with_formula(vec![vec![Requirement::noop("a").negate()]]);
        let repositories = vec![repository(&temp, "local", driver).await];
        let translators = Translators::default();

        let requirement = Requirement::all(vec![Requirement::noop("b"), Requirement::noop("a")]);
        let error = Resolver::new(&repositories, &translators)
            .resolve(&requirement, &serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(error.to_string().contains("noop:a"));
        assert!(!error.to_string().contains("noop:b"));
    }
}
