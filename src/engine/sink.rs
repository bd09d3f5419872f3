//! Streaming output of a ground theory
//!
//! A [`SolverSink`] receives ground objects as soon as the assembler
//! produces them. Definition rules are buffered by the assembler, because
//! later instances may still be merged into them, and are pushed when the
//! theory is closed.

use crate::error::Result;
use crate::theory::{CpReification, DefId, GroundAggregate, GroundRule, GroundSet};
use crate::translator::{CpDomain, VarId};
use crate::Lit;

/// Receiver of ground objects, typically a solver
///
/// Every method may refuse an object it cannot represent by returning
/// [`crate::GroundError::Unsupported`]; grounding then stops with that error.
pub trait SolverSink {
    /// Adds a clause
    fn add_clause(&mut self, clause: &[Lit]) -> Result<()>;

    /// Adds a weighted set, before any aggregate over it
    fn add_set(&mut self, set: &GroundSet) -> Result<()>;

    /// Adds an aggregate reification
    fn add_aggregate(&mut self, aggregate: &GroundAggregate) -> Result<()>;

    /// Adds a rule of a definition
    fn add_definition_rule(&mut self, definition: DefId, rule: &GroundRule) -> Result<()>;

    /// Adds a CP reification, after its variables
    fn add_cp_reification(&mut self, reification: &CpReification) -> Result<()>;

    /// Declares a CP variable
    fn add_cp_variable(&mut self, _var: VarId, _domain: CpDomain) -> Result<()> {
        Ok(())
    }
}
