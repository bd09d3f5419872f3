//! Ground objects and their materialized store

use crate::ast::{AggFunction, CompType};
use crate::engine::sink::SolverSink;
use crate::error::Result;
use crate::theory::rules::{DefId, GroundRule};
use crate::translator::{CpBound, CpDomain, CpTerm, SetId, TsType, VarId};
use crate::Lit;

/// A weighted set as handed to the solver
#[derive(Clone, Debug, PartialEq)]
pub struct GroundSet {
    /// Set id
    pub id: SetId,
    /// Member literals
    pub literals: Vec<Lit>,
    /// Weight of each member literal
    pub weights: Vec<f64>,
    /// Weights of members that are certainly in the set
    pub trueweights: Vec<f64>,
}

/// `head arrow func(set) >= bound` (lower) or `head arrow func(set) =< bound`
#[derive(Clone, Debug, PartialEq)]
pub struct GroundAggregate {
    /// The Tseitin naming the aggregate
    pub head: Lit,
    /// Relation between head and aggregate
    pub arrow: TsType,
    /// Aggregated set
    pub set: SetId,
    /// Aggregate function
    pub func: AggFunction,
    /// Whether `bound` is a lower bound
    pub lower: bool,
    /// The bound
    pub bound: f64,
}

/// `head arrow (left comp right)` over CP variables
#[derive(Clone, Debug, PartialEq)]
pub struct CpReification {
    /// The Tseitin naming the comparison
    pub head: Lit,
    /// Relation between head and comparison
    pub arrow: TsType,
    /// Left-hand side
    pub left: CpTerm,
    /// Comparison
    pub comp: CompType,
    /// Right-hand side
    pub right: CpBound,
}

/// Materialized ground theory contents (everything but definitions)
#[derive(Clone, Debug, Default)]
pub struct GroundStore {
    pub(crate) clauses: Vec<Vec<Lit>>,
    pub(crate) sets: Vec<GroundSet>,
    pub(crate) aggregates: Vec<GroundAggregate>,
    pub(crate) cp_reifications: Vec<CpReification>,
    pub(crate) cp_variables: Vec<(VarId, CpDomain)>,
}

impl SolverSink for GroundStore {
    fn add_clause(&mut self, clause: &[Lit]) -> Result<()> {
        self.clauses.push(clause.to_vec());
        Ok(())
    }

    fn add_set(&mut self, set: &GroundSet) -> Result<()> {
        self.sets.push(set.clone());
        Ok(())
    }

    fn add_aggregate(&mut self, aggregate: &GroundAggregate) -> Result<()> {
        self.aggregates.push(aggregate.clone());
        Ok(())
    }

    fn add_definition_rule(&mut self, _definition: DefId, _rule: &GroundRule) -> Result<()> {
        // materialized definitions stay in the theory
        Ok(())
    }

    fn add_cp_reification(&mut self, reification: &CpReification) -> Result<()> {
        self.cp_reifications.push(reification.clone());
        Ok(())
    }

    fn add_cp_variable(&mut self, var: VarId, domain: CpDomain) -> Result<()> {
        self.cp_variables.push((var, domain));
        Ok(())
    }
}
