//! Model selection on top of varisat.
//!
//! Every top-level requirement is guarded by a selector variable that is
//! assumed true, so an unsatisfiable problem reports which requirements are
//! in the failed core.
//!
//! Among all models one is picked deterministically: preferences (translator
//! assumptions first, then "absent" for every package in ascending symbol
//! order) are fixed greedily, keeping each one only if the formula stays
//! satisfiable with everything kept so far.

use super::formula::Cnf;
use crate::core::PpError;
use crate::models::{Literal, Requirement};
use anyhow::Result;
use std::collections::{BTreeSet, HashSet, VecDeque};
use varisat::{ExtendFormula, Lit, Solver};

const PREFERENCE_CHUNK: usize = 64;

/// A formula ready to solve.
#[derive(Debug, Clone)]
pub struct Problem {
    /// The clauses, with top-level requirements guarded by selectors
    pub cnf: Cnf,
    /// Selector literal of each top-level requirement
    pub selectors: Vec<(Lit, Requirement)>,
    /// Translator assumptions, applied before the package preferences
    pub assumptions: Vec<Literal>,
}

struct Search<'a> {
    solver: Solver<'a>,
    fixed: Vec<Lit>,
    model: HashSet<Lit>,
    solves: usize,
}

impl Search<'_> {
    fn solve_with(&mut self, extra: &[Lit]) -> Result<bool> {
        let assumptions: Vec<Lit> = self.fixed.iter().chain(extra).copied().collect();
        self.solver.assume(&assumptions);
        self.solves += 1;
        let satisfiable = self.solver.solve().map_err(|e| PpError::InvariantViolation {
            message: format!("SAT solver failed: {e:?}"),
        })?;
        if satisfiable {
            if let Some(model) = self.solver.model() {
                self.model = model.into_iter().collect();
            }
        }
        Ok(satisfiable)
    }

    /// Keeps as many of `preferences` as possible, in order.
    fn prefer(&mut self, preferences: Vec<Lit>) -> Result<()> {
        let mut queue: VecDeque<Vec<Lit>> =
            preferences.chunks(PREFERENCE_CHUNK).map(<[Lit]>::to_vec).collect();

        while let Some(chunk) = queue.pop_front() {
            // The current model already witnesses these.
            if chunk.iter().all(|lit| self.model.contains(lit)) {
                self.fixed.extend(chunk);
                continue;
            }
            if self.solve_with(&chunk)? {
                self.fixed.extend(chunk);
            } else if chunk.len() > 1 {
                let (first, second) = chunk.split_at(chunk.len() / 2);
                queue.push_front(second.to_vec());
                queue.push_front(first.to_vec());
            }
        }
        Ok(())
    }
}

/// Solves `problem` and returns the true package variables of the selected model.
///
/// # Errors
///
/// [`PpError::NoModel`] naming the requirements in the failed core, or all
/// of them when the core is empty.
pub fn solve(problem: Problem) -> Result<BTreeSet<String>> {
    let Problem {
        cnf,
        selectors,
        assumptions,
    } = problem;

    let mut solver = Solver::new();
    for clause in cnf.clauses() {
        solver.add_clause(clause);
    }

    let mut search = Search {
        solver,
        fixed: selectors.iter().map(|(lit, _)| *lit).collect(),
        model: HashSet::new(),
        solves: 0,
    };

    if !search.solve_with(&[])? {
        let core: HashSet<Lit> =
            search.solver.failed_core().map(|core| core.iter().copied().collect()).unwrap_or_default();
        let mut failed: Vec<Requirement> = selectors
            .iter()
            .filter(|(lit, _)| core.contains(lit))
            .map(|(_, requirement)| requirement.clone())
            .collect();
        if failed.is_empty() {
            failed = selectors.into_iter().map(|(_, requirement)| requirement).collect();
        }
        return Err(PpError::NoModel {
            requirements: failed,
        }
        .into());
    }

    let mut preferences: Vec<Lit> = assumptions
        .iter()
        .filter_map(|literal| cnf.lookup(&literal.symbol).map(|var| var.lit(literal.polarity)))
        .collect();
    preferences.extend(cnf.package_variables().map(|(_, var)| var.negative()));
    search.prefer(preferences)?;

    tracing::debug!(
        target: "resolver",
        "Selected model after {} solver calls over {} variables",
        search.solves,
        cnf.variable_count()
    );

    Ok(cnf
        .package_variables()
        .filter(|(_, var)| search.model.contains(&var.positive()))
        .map(|(symbol, _)| symbol.to_string())
        .collect())
}
