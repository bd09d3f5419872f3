//! Tseitin bodies and weighted sets owned by the literal translator

use std::fmt;

use crate::ast::{AggFunction, CompType};
use crate::translator::term::{CpBound, CpTerm};
use crate::Lit;

/// How a Tseitin literal relates to the body it names
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TsType {
    /// `ts <=> body`
    Eq,
    /// `ts => body`
    Impl,
    /// `body => ts`
    RImpl,
    /// `ts <- body`, a rule of the definition being grounded
    Rule,
}

impl TsType {
    /// The type to use for the negation of a literal of this type
    pub fn negated(self) -> Self {
        match self {
            TsType::Impl => TsType::RImpl,
            TsType::RImpl => TsType::Impl,
            other => other,
        }
    }

    /// Arrow used by the printer
    pub fn arrow(self) -> &'static str {
        match self {
            TsType::Eq => "<=>",
            TsType::Impl => "=>",
            TsType::RImpl => "<=",
            TsType::Rule => "<-",
        }
    }
}

impl fmt::Display for TsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.arrow())
    }
}

/// Kind of an atom id
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AtomKind {
    /// A ground atom `symbol(tuple)`
    Input,
    /// An auxiliary literal naming a [`TsBody`]
    TseitinWithBody,
    /// An auxiliary literal without a body
    LoneTseitin,
}

/// Index of a body in the translator's arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TsBodyId(pub u32);

/// Id of a weighted set; ids of released sets are reused
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SetId(pub u32);

impl fmt::Display for SetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "set_{}", self.0)
    }
}

/// Handle of a deferred quantifier instantiation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LazyHandle(pub u32);

/// The formula a Tseitin literal names
#[derive(Clone, Debug, PartialEq)]
pub enum TsBody {
    /// Conjunction or disjunction of literals
    Pc {
        /// The literals
        body: Vec<Lit>,
        /// Conjunction if true, disjunction otherwise
        conj: bool,
        /// Relation to the Tseitin
        ts: TsType,
    },
    /// `func(set) >= bound` when `lower`, `func(set) =< bound` otherwise
    Agg {
        /// The aggregated set
        set: SetId,
        /// The aggregate function
        func: AggFunction,
        /// Whether `bound` is a lower bound
        lower: bool,
        /// The bound
        bound: f64,
        /// Relation to the Tseitin
        ts: TsType,
    },
    /// `left comp right` over CP variables
    Cp {
        /// Left-hand side
        left: CpTerm,
        /// Comparison
        comp: CompType,
        /// Right-hand side
        right: CpBound,
        /// Relation to the Tseitin
        ts: TsType,
    },
    /// The rest of a lazily grounded quantifier
    Lazy {
        /// The deferred instantiation
        handle: LazyHandle,
        /// Relation to the Tseitin
        ts: TsType,
    },
}

impl TsBody {
    /// Returns the Tseitin type of the body
    pub fn ts(&self) -> TsType {
        match self {
            TsBody::Pc { ts, .. } | TsBody::Agg { ts, .. } | TsBody::Cp { ts, .. } | TsBody::Lazy { ts, .. } => *ts,
        }
    }
}

/// A weighted set of literals
///
/// `trueweights` are the weights of members that are certainly in the set
/// and therefore have no literal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TsSet {
    /// Member literals
    pub literals: Vec<Lit>,
    /// Weight of each member literal
    pub weights: Vec<f64>,
    /// Weights of members that are certainly in the set
    pub trueweights: Vec<f64>,
}

impl TsSet {
    /// Computes the aggregate value given which member literals hold
    pub fn aggregate(&self, func: AggFunction, holds: impl Fn(Lit) -> bool) -> f64 {
        let members = self
            .literals
            .iter()
            .zip(&self.weights)
            .filter(|(l, _)| holds(**l))
            .map(|(_, w)| *w)
            .chain(self.trueweights.iter().copied());
        match func {
            AggFunction::Card => members.count() as f64,
            AggFunction::Sum => members.sum(),
            AggFunction::Prod => members.product(),
            AggFunction::Min => members.fold(f64::INFINITY, f64::min),
            AggFunction::Max => members.fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Rewrites `bound comp agg` into a one-sided bound on the aggregate
///
/// Returns `(lower, bound)` such that the comparison holds iff
/// `agg >= bound` (lower) or `agg =< bound` (upper). Strict comparisons
/// shift the bound by one, which is only exact for integer weights.
///
/// # Panics
/// Panics for `Eq` and `Neq`, which have no one-sided form.
pub fn one_sided_bound(comp: CompType, bound: f64) -> (bool, f64) {
    match comp {
        CompType::Lt => (true, bound + 1.0),
        CompType::Leq => (true, bound),
        CompType::Gt => (false, bound - 1.0),
        CompType::Geq => (false, bound),
        CompType::Eq | CompType::Neq => {
            panic!("aggregate comparison {} has no one-sided bound", comp)
        }
    }
}
