//! Requirement clauses to CNF.
//!
//! Clauses made only of leaves and negated leaves are expanded directly:
//! positive leaves contribute their alternatives to every output clause, and
//! each negated leaf multiplies the output by its alternatives (the
//! Cartesian product of `¬a ∧ ¬b ∧ ...` distributed over the clause).
//!
//! Anything else is Tseitin-encoded: every combinator gets an auxiliary
//! variable equivalent to it. Auxiliary variables carry no symbol and never
//! appear in a resolution model.

use crate::models::{Literal, Requirement};
use anyhow::Result;
use std::collections::BTreeMap;
use varisat::{Lit, Var};

/// Looks up the literals satisfying one leaf requirement.
pub type TranslateFn<'a> = dyn Fn(&str, &serde_json::Value) -> Result<Vec<Literal>> + Send + Sync + 'a;

/// Expands a clause of leaves and negated leaves into literal clauses.
///
/// Returns `None` when the clause contains a combinator other than a negated
/// leaf. A negated leaf without alternatives is always true and therefore
/// satisfies the whole clause, giving no output clauses. A clause with only
/// positive leaves and no alternatives expands to the empty clause.
pub fn expand_clause(
    clause: &[Requirement],
    translate: &TranslateFn<'_>,
) -> Result<Option<Vec<Vec<Literal>>>> {
    let mut positives = Vec::new();
    let mut negated = Vec::new();

    for requirement in clause {
        match requirement {
            Requirement::Simple {
                translator,
                value,
            } => positives.extend(translate(translator, value)?),
            Requirement::Negated {
                negated: inner,
            } => match inner.as_simple() {
                Some((translator, value)) => negated.push(translate(translator, value)?),
                None => return Ok(None),
            },
            _ => return Ok(None),
        }
    }

    let mut expanded: Vec<Vec<Literal>> = vec![positives];
    for alternatives in negated {
        expanded = expanded
            .iter()
            .flat_map(|prefix| {
                alternatives.iter().map(move |literal| {
                    let mut clause = prefix.clone();
                    clause.push(literal.negate());
                    clause
                })
            })
            .collect();
    }

    for clause in &mut expanded {
        clause.sort();
        clause.dedup();
    }
    Ok(Some(expanded))
}

/// A CNF formula over named package variables and anonymous auxiliaries.
#[derive(Debug, Default, Clone)]
pub struct Cnf {
    symbols: Vec<Option<String>>,
    variables: BTreeMap<String, Var>,
    clauses: Vec<Vec<Lit>>,
    constant_true: Option<Var>,
}

impl Cnf {
    /// An empty formula.
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh(&mut self, symbol: Option<String>) -> Var {
        let var = Var::from_index(self.symbols.len());
        self.symbols.push(symbol);
        var
    }

    /// The variable of package `symbol`, created on first use.
    pub fn variable(&mut self, symbol: &str) -> Var {
        if let Some(var) = self.variables.get(symbol) {
            return *var;
        }
        let var = self.fresh(Some(symbol.to_string()));
        self.variables.insert(symbol.to_string(), var);
        var
    }

    /// The variable of `symbol` if it occurs in the formula.
    pub fn lookup(&self, symbol: &str) -> Option<Var> {
        self.variables.get(symbol).copied()
    }

    /// Solver literal of `literal`.
    pub fn literal(&mut self, literal: &Literal) -> Lit {
        self.variable(&literal.symbol).lit(literal.polarity)
    }

    /// A fresh variable that is not a package.
    pub fn auxiliary(&mut self) -> Var {
        self.fresh(None)
    }

    /// A literal fixed to `value`.
    pub fn constant(&mut self, value: bool) -> Lit {
        let var = match self.constant_true {
            Some(var) => var,
            None => {
                let var = self.auxiliary();
                self.clauses.push(vec![var.positive()]);
                self.constant_true = Some(var);
                var
            }
        };
        var.lit(value)
    }

    /// Adds a raw clause.
    pub fn add_clause(&mut self, clause: Vec<Lit>) {
        self.clauses.push(clause);
    }

    /// All clauses.
    pub fn clauses(&self) -> &[Vec<Lit>] {
        &self.clauses
    }

    /// Number of variables, auxiliaries included.
    pub fn variable_count(&self) -> usize {
        self.symbols.len()
    }

    /// Package symbol of `var`, `None` for auxiliaries.
    pub fn symbol(&self, var: Var) -> Option<&str> {
        self.symbols.get(var.index()).and_then(|s| s.as_deref())
    }

    /// Package variables in ascending symbol order.
    pub fn package_variables(&self) -> impl Iterator<Item = (&str, Var)> {
        self.variables.iter().map(|(symbol, var)| (symbol.as_str(), *var))
    }

    /// Adds `clause` (a disjunction), optionally relaxed by `guard`.
    ///
    /// With a guard the clause only has to hold while the guard is assumed true.
    pub fn add_requirement_clause(
        &mut self,
        clause: &[Requirement],
        translate: &TranslateFn<'_>,
        guard: Option<Lit>,
    ) -> Result<()> {
        let relax = |mut lits: Vec<Lit>| {
            if let Some(guard) = guard {
                lits.push(!guard);
            }
            lits
        };

        if let Some(expanded) = expand_clause(clause, translate)? {
            for literals in expanded {
                let lits = literals.iter().map(|literal| self.literal(literal)).collect();
                self.clauses.push(relax(lits));
            }
            return Ok(());
        }

        let mut lits = Vec::with_capacity(clause.len());
        for requirement in clause {
            lits.push(self.encode(requirement, translate)?);
        }
        self.clauses.push(relax(lits));
        Ok(())
    }

    /// Returns a literal equivalent to `requirement`.
    pub fn encode(&mut self, requirement: &Requirement, translate: &TranslateFn<'_>) -> Result<Lit> {
        match requirement {
            Requirement::Simple {
                translator,
                value,
            } => {
                let lits: Vec<Lit> =
                    translate(translator, value)?.iter().map(|literal| self.literal(literal)).collect();
                Ok(self.or(lits))
            }
            Requirement::Negated {
                negated,
            } => Ok(!self.encode(negated, translate)?),
            Requirement::And {
                and,
            } => {
                let lits = self.encode_all(and, translate)?;
                Ok(self.and(lits))
            }
            Requirement::Or {
                or,
            } => {
                let lits = self.encode_all(or, translate)?;
                Ok(self.or(lits))
            }
            Requirement::Xor {
                xor,
            } => {
                let lits = self.encode_all(xor, translate)?;
                let mut parity = self.constant(false);
                for lit in lits {
                    parity = self.xor(parity, lit);
                }
                Ok(parity)
            }
            Requirement::Implication {
                if_,
                implies,
            } => {
                let antecedent = self.encode(if_, translate)?;
                let consequent = self.encode(implies, translate)?;
                Ok(self.or(vec![!antecedent, consequent]))
            }
            Requirement::Equivalence {
                equivalent,
            } => {
                let lits = self.encode_all(equivalent, translate)?;
                if lits.len() < 2 {
                    return Ok(self.constant(true));
                }
                let all = self.and(lits.clone());
                let none = self.and(lits.into_iter().map(|lit| !lit).collect());
                Ok(self.or(vec![all, none]))
            }
        }
    }

    fn encode_all(&mut self, requirements: &[Requirement], translate: &TranslateFn<'_>) -> Result<Vec<Lit>> {
        requirements.iter().map(|requirement| self.encode(requirement, translate)).collect()
    }

    fn and(&mut self, lits: Vec<Lit>) -> Lit {
        match lits.as_slice() {
            [] => return self.constant(true),
            [lit] => return *lit,
            _ => {}
        }
        let x = self.auxiliary().positive();
        let mut back = vec![x];
        for lit in lits {
            self.clauses.push(vec![!x, lit]);
            back.push(!lit);
        }
        self.clauses.push(back);
        x
    }

    fn or(&mut self, lits: Vec<Lit>) -> Lit {
        match lits.as_slice() {
            [] => return self.constant(false),
            [lit] => return *lit,
            _ => {}
        }
        let x = self.auxiliary().positive();
        let mut forward = vec![!x];
        for lit in lits {
            self.clauses.push(vec![x, !lit]);
            forward.push(lit);
        }
        self.clauses.push(forward);
        x
    }

    fn xor(&mut self, a: Lit, b: Lit) -> Lit {
        let x = self.auxiliary().positive();
        self.clauses.push(vec![!x, a, b]);
        self.clauses.push(vec![!x, !a, !b]);
        self.clauses.push(vec![x, !a, b]);
        self.clauses.push(vec![x, a, !b]);
        x
    }
}
