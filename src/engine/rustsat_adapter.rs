//! Sink for rustsat solver backends
//!
//! Feeds clause-only ground theories to any rustsat-compatible SAT solver.
//! Sets, aggregates, definitions and CP reifications have no clause form
//! here and are refused with [`GroundError::Unsupported`].

use std::cell::RefCell;
use std::rc::Rc;

use rustsat::solvers::{Solve, SolverResult};
use rustsat::types::{Clause, TernaryVal, Var};

use crate::engine::sink::SolverSink;
use crate::error::{GroundError, Result};
use crate::theory::{CpReification, DefId, GroundAggregate, GroundRule, GroundSet, GroundTheory};
use crate::Lit;

/// Sink that adds clauses to a rustsat solver
///
/// Clones share the solver, so a clone can be boxed for streaming while
/// the original is kept to solve afterwards.
///
/// # Example
///
/// ```ignore
/// use rustsat_batsat::BasicSolver;
/// let sink = RustSatSink::new(BasicSolver::default());
/// engine.ground_into(&theory, &structure, Box::new(sink.clone()))?;
/// let sat = sink.solve()?;
/// ```
pub struct RustSatSink<S> {
    solver: Rc<RefCell<S>>,
    max_var: Rc<RefCell<u32>>,
    num_clauses: Rc<RefCell<u32>>,
}

impl<S> Clone for RustSatSink<S> {
    fn clone(&self) -> Self {
        Self {
            solver: self.solver.clone(),
            max_var: self.max_var.clone(),
            num_clauses: self.num_clauses.clone(),
        }
    }
}

fn unsupported(what: &str) -> GroundError {
    GroundError::Unsupported(format!("{} cannot be added to a SAT solver", what))
}

fn backend(e: impl std::fmt::Display) -> GroundError {
    GroundError::Unsupported(format!("solver backend: {}", e))
}

impl<S: Solve> RustSatSink<S> {
    /// Wraps the given solver
    pub fn new(solver: S) -> Self {
        Self {
            solver: Rc::new(RefCell::new(solver)),
            max_var: Rc::new(RefCell::new(0)),
            num_clauses: Rc::new(RefCell::new(0)),
        }
    }

    /// Number of clauses added
    pub fn num_clauses(&self) -> u32 {
        *self.num_clauses.borrow()
    }

    /// Largest atom id seen in a clause
    pub fn num_variables(&self) -> u32 {
        *self.max_var.borrow()
    }

    /// Adds every clause of a materialized theory
    ///
    /// # Errors
    /// Fails with [`GroundError::Unsupported`] if the theory contains
    /// anything but clauses.
    pub fn load(&mut self, theory: &GroundTheory) -> Result<()> {
        if theory.definitions().iter().any(|d| d.num_rules() > 0) {
            return Err(unsupported("a definition"));
        }
        if !theory.sets().is_empty() || !theory.aggregates().is_empty() {
            return Err(unsupported("an aggregate"));
        }
        if !theory.cp_reifications().is_empty() {
            return Err(unsupported("a CP reification"));
        }
        for clause in theory.clauses() {
            self.add_clause(clause)?;
        }
        Ok(())
    }

    /// Solves the clauses added so far
    pub fn solve(&self) -> Result<bool> {
        match self.solver.borrow_mut().solve().map_err(backend)? {
            SolverResult::Sat => Ok(true),
            SolverResult::Unsat => Ok(false),
            SolverResult::Interrupted => Err(GroundError::Interrupted),
        }
    }

    /// Value of a literal in the last solution
    ///
    /// Only valid after [`RustSatSink::solve`] returned true.
    pub fn value(&self, lit: Lit) -> bool {
        let atom = lit.unsigned_abs();
        let max = self.num_variables();
        if atom == 0 || atom > max {
            return false;
        }
        let var = Var::new(atom - 1);
        let holds = match self.solver.borrow().solution(Var::new(max - 1)) {
            Ok(assignment) => matches!(assignment.var_value(var), TernaryVal::True),
            Err(_) => false,
        };
        holds == (lit > 0)
    }
}

impl<S: Solve> SolverSink for RustSatSink<S> {
    fn add_clause(&mut self, clause: &[Lit]) -> Result<()> {
        let mut max_var = self.max_var.borrow_mut();
        let lits: Vec<rustsat::types::Lit> = clause
            .iter()
            .map(|&lit| {
                let atom = lit.unsigned_abs();
                *max_var = (*max_var).max(atom);
                let var = Var::new(atom - 1);
                if lit > 0 {
                    var.pos_lit()
                } else {
                    var.neg_lit()
                }
            })
            .collect();
        *self.num_clauses.borrow_mut() += 1;
        self.solver
            .borrow_mut()
            .add_clause(Clause::from(&lits[..]))
            .map_err(backend)
    }

    fn add_set(&mut self, _set: &GroundSet) -> Result<()> {
        Err(unsupported("a weighted set"))
    }

    fn add_aggregate(&mut self, _aggregate: &GroundAggregate) -> Result<()> {
        Err(unsupported("an aggregate"))
    }

    fn add_definition_rule(&mut self, _definition: DefId, _rule: &GroundRule) -> Result<()> {
        Err(unsupported("a definition rule"))
    }

    fn add_cp_reification(&mut self, _reification: &CpReification) -> Result<()> {
        Err(unsupported("a CP reification"))
    }
}
