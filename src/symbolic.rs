//! Symbolic possible/certain queries over a structure
//!
//! The grounder compiler asks, for a formula with free variables, under
//! which instantiations it is *certainly* true or false in the structure.
//! The answer is a [`Query`]: a small boolean expression over table
//! lookups and comparisons that can be evaluated for an instantiation
//! without touching the literal translator. Queries are sound
//! approximations: a certain query that holds guarantees the truth value,
//! one that fails guarantees nothing.
//!
//! Possibly-queries are the negations of certain queries. Negation is
//! pushed to the leaves, so a possibly-query that cannot be answered
//! defaults to `true` while a certain one defaults to `false`.

use rustc_hash::FxHashSet;

use crate::ast::{ArithOp, CompType, Formula, Function, QuantKind, Sort, Symbol, Term};
use crate::grounder::environment::{SlotTable, VarEnv, VarSlot};
use crate::structure::{DomainElement, FuncValue, Structure, TruthValue};

/// Decides something about the current instantiation
pub trait InstanceChecker {
    /// Returns true if the check holds for the bindings in `env`
    ///
    /// Implementations may temporarily rebind slots but must restore them.
    fn check(&self, structure: &Structure, env: &mut VarEnv) -> bool;
}

/// A term inside a query
#[derive(Clone, Debug, PartialEq)]
pub enum QueryTerm {
    /// A bound variable
    Slot(VarSlot),
    /// A constant
    Element(DomainElement),
    /// Application of a two-valued function
    App {
        /// The function
        func: Function,
        /// Its arguments
        args: Vec<QueryTerm>,
    },
    /// Integer arithmetic
    Arith {
        /// Operator
        op: ArithOp,
        /// Left operand
        left: Box<QueryTerm>,
        /// Right operand
        right: Box<QueryTerm>,
    },
}

impl QueryTerm {
    /// Evaluates the term; None if its value is undefined or unknown
    pub fn eval(&self, structure: &Structure, env: &VarEnv) -> Option<DomainElement> {
        match self {
            QueryTerm::Slot(s) => env.lookup(*s).cloned(),
            QueryTerm::Element(e) => Some(e.clone()),
            QueryTerm::App { func, args } => {
                let values = args
                    .iter()
                    .map(|a| a.eval(structure, env))
                    .collect::<Option<Vec<_>>>()?;
                match structure.function_value(func, &values) {
                    FuncValue::Value(v) => Some(v),
                    FuncValue::Undefined | FuncValue::Unknown => None,
                }
            }
            QueryTerm::Arith { op, left, right } => {
                let l = left.eval(structure, env)?.as_int()?;
                let r = right.eval(structure, env)?.as_int()?;
                op.apply(l, r).map(DomainElement::Int)
            }
        }
    }
}

/// Which table of a symbol a lookup consults
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// Certainly true atoms
    CertainlyTrue,
    /// Certainly false atoms
    CertainlyFalse,
    /// Atoms that are not certainly false
    PossiblyTrue,
    /// Atoms that are not certainly true
    PossiblyFalse,
}

impl TableKind {
    /// The complementary table
    pub fn negate(self) -> Self {
        match self {
            TableKind::CertainlyTrue => TableKind::PossiblyFalse,
            TableKind::PossiblyFalse => TableKind::CertainlyTrue,
            TableKind::CertainlyFalse => TableKind::PossiblyTrue,
            TableKind::PossiblyTrue => TableKind::CertainlyFalse,
        }
    }

    /// Returns true for the certain tables
    pub fn is_certain(self) -> bool {
        matches!(self, TableKind::CertainlyTrue | TableKind::CertainlyFalse)
    }

    fn accepts(self, value: TruthValue) -> bool {
        match self {
            TableKind::CertainlyTrue => value == TruthValue::True,
            TableKind::CertainlyFalse => value == TruthValue::False,
            TableKind::PossiblyTrue => value != TruthValue::False,
            TableKind::PossiblyFalse => value != TruthValue::True,
        }
    }
}

/// A symbolic query over the structure
#[derive(Clone, Debug, PartialEq)]
pub enum Query {
    /// A constant answer
    Const(bool),
    /// Lookup of `symbol(args)` in one of its tables
    Table {
        /// The looked-up symbol
        symbol: Symbol,
        /// The consulted table
        kind: TableKind,
        /// Argument terms (function graphs include the value)
        args: Vec<QueryTerm>,
    },
    /// Comparison of two terms
    Compare {
        /// Left term
        left: QueryTerm,
        /// Operator
        op: CompType,
        /// Right term
        right: QueryTerm,
        /// Answer is `!certain` when a term cannot be evaluated
        certain: bool,
    },
    /// Conjunction
    And(Vec<Query>),
    /// Disjunction
    Or(Vec<Query>),
    /// Bounded existential quantification
    Exists {
        /// Quantified slots and their sorts
        vars: Vec<(VarSlot, Sort)>,
        /// Body
        body: Box<Query>,
    },
    /// Bounded universal quantification
    Forall {
        /// Quantified slots and their sorts
        vars: Vec<(VarSlot, Sort)>,
        /// Body
        body: Box<Query>,
    },
}

impl Query {
    /// Simplifying conjunction
    pub fn and(subs: Vec<Query>) -> Query {
        let mut flat = Vec::with_capacity(subs.len());
        for q in subs {
            match q {
                Query::Const(true) => {}
                Query::Const(false) => return Query::Const(false),
                Query::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Query::Const(true),
            1 => flat.pop().unwrap_or(Query::Const(true)),
            _ => Query::And(flat),
        }
    }

    /// Simplifying disjunction
    pub fn or(subs: Vec<Query>) -> Query {
        let mut flat = Vec::with_capacity(subs.len());
        for q in subs {
            match q {
                Query::Const(false) => {}
                Query::Const(true) => return Query::Const(true),
                Query::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Query::Const(false),
            1 => flat.pop().unwrap_or(Query::Const(false)),
            _ => Query::Or(flat),
        }
    }

    fn quant(kind: QuantKind, vars: Vec<(VarSlot, Sort)>, body: Query) -> Query {
        match (kind, body) {
            (QuantKind::Exists, Query::Const(false)) => Query::Const(false),
            (QuantKind::Forall, Query::Const(true)) => Query::Const(true),
            (QuantKind::Exists, body) => Query::Exists {
                vars,
                body: Box::new(body),
            },
            (QuantKind::Forall, body) => Query::Forall {
                vars,
                body: Box::new(body),
            },
        }
    }

    /// Negation, pushed to the leaves
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Query {
        match self {
            Query::Const(b) => Query::Const(!b),
            Query::Table { symbol, kind, args } => Query::Table {
                symbol,
                kind: kind.negate(),
                args,
            },
            Query::Compare {
                left,
                op,
                right,
                certain,
            } => Query::Compare {
                left,
                op: op.negate(),
                right,
                certain: !certain,
            },
            Query::And(subs) => Query::or(subs.into_iter().map(Query::not).collect()),
            Query::Or(subs) => Query::and(subs.into_iter().map(Query::not).collect()),
            Query::Exists { vars, body } => Query::quant(QuantKind::Forall, vars, body.not()),
            Query::Forall { vars, body } => Query::quant(QuantKind::Exists, vars, body.not()),
        }
    }

    /// Returns the constant answer, if the query is constant
    pub fn as_const(&self) -> Option<bool> {
        match self {
            Query::Const(b) => Some(*b),
            _ => None,
        }
    }

    /// Evaluates the query for the bindings in `env`
    pub fn eval(&self, structure: &Structure, env: &mut VarEnv) -> bool {
        match self {
            Query::Const(b) => *b,
            Query::Table { symbol, kind, args } => {
                let tuple = args
                    .iter()
                    .map(|a| a.eval(structure, env))
                    .collect::<Option<Vec<_>>>();
                match tuple {
                    Some(tuple) => kind.accepts(structure.truth_value(symbol, &tuple)),
                    None => !kind.is_certain(),
                }
            }
            Query::Compare {
                left,
                op,
                right,
                certain,
            } => match (left.eval(structure, env), right.eval(structure, env)) {
                (Some(l), Some(r)) => op.holds(l.cmp(&r)),
                _ => !certain,
            },
            Query::And(subs) => subs.iter().all(|q| q.eval(structure, env)),
            Query::Or(subs) => subs.iter().any(|q| q.eval(structure, env)),
            Query::Exists { vars, body } => eval_quant(vars, body, false, structure, env),
            Query::Forall { vars, body } => eval_quant(vars, body, true, structure, env),
        }
    }
}

fn eval_quant(
    vars: &[(VarSlot, Sort)],
    body: &Query,
    universal: bool,
    structure: &Structure,
    env: &mut VarEnv,
) -> bool {
    let Some(((slot, sort), rest)) = vars.split_first() else {
        return body.eval(structure, env);
    };
    let Some(table) = structure.sort_table(sort) else {
        // missing tables are rejected when the query is built
        return !universal;
    };
    let previous = env.lookup(*slot).cloned();
    let mut result = universal;
    for element in table.iter() {
        env.bind(*slot, element);
        if eval_quant(rest, body, universal, structure, env) != universal {
            result = !universal;
            break;
        }
    }
    env.restore(*slot, previous);
    result
}

impl InstanceChecker for Query {
    fn check(&self, structure: &Structure, env: &mut VarEnv) -> bool {
        self.eval(structure, env)
    }
}

/// Derives certain/possible queries for formulas
///
/// Atoms of defined symbols are always unknown: their truth is decided by
/// the definition, not by the structure.
pub struct QueryBuilder<'a> {
    structure: &'a Structure,
    defined: &'a FxHashSet<Symbol>,
    max_enumeration: usize,
}

impl<'a> QueryBuilder<'a> {
    /// Creates a builder
    ///
    /// Quantified subqueries ranging over more than `max_enumeration`
    /// instantiations are replaced by their conservative answer.
    pub fn new(structure: &'a Structure, defined: &'a FxHashSet<Symbol>, max_enumeration: usize) -> Self {
        Self {
            structure,
            defined,
            max_enumeration,
        }
    }

    /// Query that holds only if the formula certainly has the given truth value
    pub fn certainly(&self, formula: &Formula, truth: bool, slots: &mut SlotTable) -> Query {
        let want = truth == formula.sign().is_pos();
        match formula {
            Formula::Constant(b) => Query::Const(*b == truth),
            Formula::Atom { pred, args, .. } => {
                self.table(Symbol::Pred(pred.clone()), args.iter(), want, slots)
            }
            Formula::Graph { func, args, value, .. } => {
                self.table(Symbol::Func(func.clone()), args.iter().chain(std::iter::once(value)), want, slots)
            }
            Formula::Compare { left, op, right, .. } => self.compare(left, *op, right, want, slots),
            Formula::Chain { terms, ops, .. } => {
                let pairs: Vec<Query> = ops
                    .iter()
                    .enumerate()
                    .map(|(i, op)| self.compare(&terms[i], *op, &terms[i + 1], want, slots))
                    .collect();
                if want {
                    Query::and(pairs)
                } else {
                    Query::or(pairs)
                }
            }
            Formula::Agg { .. } => Query::Const(false),
            Formula::Bool { conj, subs, .. } => {
                let parts: Vec<Query> = subs.iter().map(|s| self.certainly(s, want, slots)).collect();
                if *conj == want {
                    Query::and(parts)
                } else {
                    Query::or(parts)
                }
            }
            Formula::Quant { kind, vars, body, .. } => {
                if !self.enumerable(vars.iter().map(|v| v.sort())) {
                    return Query::Const(false);
                }
                let quantified: Vec<(VarSlot, Sort)> = vars
                    .iter()
                    .map(|v| (slots.enter(v), v.sort().clone()))
                    .collect();
                let inner = self.certainly(body, want, slots);
                slots.exit(vars.len());
                let universal = (*kind == QuantKind::Forall) == want;
                Query::quant(
                    if universal { QuantKind::Forall } else { QuantKind::Exists },
                    quantified,
                    inner,
                )
            }
            Formula::Equiv { left, right, .. } => {
                let lt = self.certainly(left, true, slots);
                let lf = self.certainly(left, false, slots);
                let rt = self.certainly(right, true, slots);
                let rf = self.certainly(right, false, slots);
                if want {
                    Query::or(vec![Query::and(vec![lt, rt]), Query::and(vec![lf, rf])])
                } else {
                    Query::or(vec![Query::and(vec![lt, rf]), Query::and(vec![lf, rt])])
                }
            }
        }
    }

    /// Query that holds if the formula may have the given truth value
    pub fn possibly(&self, formula: &Formula, truth: bool, slots: &mut SlotTable) -> Query {
        self.certainly(formula, !truth, slots).not()
    }

    /// Converts an evaluable term; None if it needs an unknown value
    pub fn term(&self, term: &Term, slots: &SlotTable) -> Option<QueryTerm> {
        match term {
            Term::Var(v) => slots.lookup(v).map(QueryTerm::Slot),
            Term::Element(e) => Some(QueryTerm::Element(e.clone())),
            Term::App { func, args } => {
                let symbol = Symbol::Func(func.clone());
                if self.defined.contains(&symbol) || !self.structure.is_two_valued(&symbol) {
                    return None;
                }
                let args = args
                    .iter()
                    .map(|a| self.term(a, slots))
                    .collect::<Option<Vec<_>>>()?;
                Some(QueryTerm::App {
                    func: func.clone(),
                    args,
                })
            }
            Term::Arith { op, left, right } => Some(QueryTerm::Arith {
                op: *op,
                left: Box::new(self.term(left, slots)?),
                right: Box::new(self.term(right, slots)?),
            }),
            Term::Agg(_) => None,
        }
    }

    fn table<'t>(
        &self,
        symbol: Symbol,
        args: impl Iterator<Item = &'t Term>,
        want: bool,
        slots: &SlotTable,
    ) -> Query {
        if self.defined.contains(&symbol) {
            return Query::Const(false);
        }
        let Some(args) = args.map(|a| self.term(a, slots)).collect::<Option<Vec<_>>>() else {
            return Query::Const(false);
        };
        Query::Table {
            symbol,
            kind: if want {
                TableKind::CertainlyTrue
            } else {
                TableKind::CertainlyFalse
            },
            args,
        }
    }

    fn compare(&self, left: &Term, op: CompType, right: &Term, want: bool, slots: &SlotTable) -> Query {
        match (self.term(left, slots), self.term(right, slots)) {
            (Some(left), Some(right)) => Query::Compare {
                left,
                op: if want { op } else { op.negate() },
                right,
                certain: true,
            },
            _ => Query::Const(false),
        }
    }

    fn enumerable<'s>(&self, sorts: impl Iterator<Item = &'s Sort>) -> bool {
        let mut total: usize = 1;
        for sort in sorts {
            let Some(size) = self.structure.sort_table(sort).and_then(|t| t.size()) else {
                return false;
            };
            total = total.saturating_mul(size);
            if total > self.max_enumeration {
                return false;
            }
        }
        true
    }
}
