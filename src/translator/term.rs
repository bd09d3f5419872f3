//! Term translator: CP variables for function terms
//!
//! With CP support, integer function applications whose value is unknown
//! are not enumerated. Each distinct ground application `f(args)` becomes a
//! CP variable with the output sort's bounds as domain, and linear
//! combinations of such variables are folded into [`CpTerm`]s.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::ast::Function;
use crate::structure::{DomainElement, ElementTuple};

/// Id of a CP variable; allocation is monotonic
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

/// Integer domain of a CP variable
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CpDomain {
    /// Smallest value
    pub lo: i64,
    /// Largest value
    pub hi: i64,
}

/// Left-hand side of a CP comparison
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CpTerm {
    /// A single variable
    Var(VarId),
    /// Sum of two variables
    Sum(VarId, VarId),
    /// Weighted sum of variables
    WeightedSum(Vec<VarId>, Vec<i64>),
}

/// Right-hand side of a CP comparison
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CpBound {
    /// An integer constant
    Const(i64),
    /// A variable
    Var(VarId),
}

impl CpTerm {
    /// Variables of the term
    pub fn vars(&self) -> Vec<VarId> {
        match self {
            CpTerm::Var(v) => vec![*v],
            CpTerm::Sum(a, b) => vec![*a, *b],
            CpTerm::WeightedSum(vars, _) => vars.clone(),
        }
    }

    /// Evaluates the term under a variable assignment
    pub fn eval(&self, value: impl Fn(VarId) -> i64) -> i64 {
        match self {
            CpTerm::Var(v) => value(*v),
            CpTerm::Sum(a, b) => value(*a) + value(*b),
            CpTerm::WeightedSum(vars, weights) => vars.iter().zip(weights).map(|(v, w)| value(*v) * w).sum(),
        }
    }
}

impl fmt::Display for CpTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpTerm::Var(v) => write!(f, "var_{}", v.0),
            CpTerm::Sum(a, b) => write!(f, "sum[var_{},var_{}]", a.0, b.0),
            CpTerm::WeightedSum(vars, weights) => {
                write!(f, "wsum[")?;
                for (i, (v, w)) in vars.iter().zip(weights).enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "(var_{},{})", v.0, w)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl fmt::Display for CpBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpBound::Const(c) => write!(f, "{}", c),
            CpBound::Var(v) => write!(f, "var_{}", v.0),
        }
    }
}

struct CpVar {
    func: Function,
    args: ElementTuple,
    domain: CpDomain,
}

/// Allocates CP variables for ground function terms
#[derive(Default)]
pub struct TermTranslator {
    vars: Vec<CpVar>,
    index: FxHashMap<(Function, ElementTuple), VarId>,
}

impl TermTranslator {
    /// Creates an empty translator
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the variable for `func(args)`, allocating it on first use
    pub fn translate(&mut self, func: &Function, args: ElementTuple, domain: CpDomain) -> VarId {
        let key = (func.clone(), args);
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = VarId(self.vars.len() as u32);
        let (func, args) = key;
        self.vars.push(CpVar {
            func: func.clone(),
            args: args.clone(),
            domain,
        });
        self.index.insert((func, args), id);
        id
    }

    /// Returns the variable for `func(args)` if one was allocated
    pub fn lookup(&self, func: &Function, args: &[DomainElement]) -> Option<VarId> {
        self.index.get(&(func.clone(), args.to_vec())).copied()
    }

    /// Folds a linear combination into a CP term
    ///
    /// # Panics
    /// Panics if `vars` is empty or its length differs from `weights`.
    pub fn fold(&self, vars: Vec<VarId>, weights: Vec<i64>) -> CpTerm {
        assert!(
            !vars.is_empty() && vars.len() == weights.len(),
            "inconsistent CP term fold: {} variables, {} weights",
            vars.len(),
            weights.len()
        );
        match (vars.as_slice(), weights.as_slice()) {
            ([v], [1]) => CpTerm::Var(*v),
            ([a, b], [1, 1]) => CpTerm::Sum(*a, *b),
            _ => CpTerm::WeightedSum(vars, weights),
        }
    }

    /// Function whose application the variable stands for
    pub fn function_of(&self, var: VarId) -> &Function {
        &self.vars[var.0 as usize].func
    }

    /// Arguments of the application the variable stands for
    pub fn args_of(&self, var: VarId) -> &ElementTuple {
        &self.vars[var.0 as usize].args
    }

    /// Domain of the variable
    pub fn domain_of(&self, var: VarId) -> CpDomain {
        self.vars[var.0 as usize].domain
    }

    /// Number of variables allocated
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// Printable name `f(args)` of a variable
    pub fn print_var(&self, var: VarId) -> String {
        let v = &self.vars[var.0 as usize];
        let args: Vec<String> = v.args.iter().map(|a| a.to_string()).collect();
        if args.is_empty() {
            v.func.name().to_string()
        } else {
            format!("{}({})", v.func.name(), args.join(","))
        }
    }
}
