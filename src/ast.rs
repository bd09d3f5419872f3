//! AST types for first-order theories
//!
//! This module contains the vocabulary symbols (sorts, predicates, functions),
//! variables, terms and set expressions. Formulas, rules, definitions and
//! theories live in [`formula`].
//!
//! Symbols and variables use identity equality: two predicates with the same
//! name created by separate constructor calls are different symbols.

pub mod formula;
pub mod transform;
pub mod visitor;

pub use formula::{Definition, Formula, QuantKind, Rule, Sign, Theory};
pub use transform::VariableFactory;
pub use visitor::FormulaVisitor;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::structure::DomainElement;

/// A sort: the type of a variable or of a symbol argument
#[derive(Clone)]
pub struct Sort {
    inner: Arc<SortInner>,
}

struct SortInner {
    name: String,
}

impl Sort {
    /// Creates a new sort with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SortInner { name: name.into() }),
        }
    }

    /// Returns the name of this sort
    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl PartialEq for Sort {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Sort {}

impl std::hash::Hash for Sort {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl fmt::Debug for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sort({})", self.name())
    }
}

/// A predicate symbol with a fixed list of argument sorts
#[derive(Clone)]
pub struct Predicate {
    inner: Arc<PredicateInner>,
}

struct PredicateInner {
    name: String,
    sorts: Vec<Sort>,
}

impl Predicate {
    /// Creates a new predicate symbol
    pub fn new(name: impl Into<String>, sorts: Vec<Sort>) -> Self {
        Self {
            inner: Arc::new(PredicateInner {
                name: name.into(),
                sorts,
            }),
        }
    }

    /// Returns the name of this predicate
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the argument sorts
    pub fn sorts(&self) -> &[Sort] {
        &self.inner.sorts
    }

    /// Returns the arity of this predicate
    pub fn arity(&self) -> usize {
        self.inner.sorts.len()
    }

    /// Applies this predicate to the given arguments, producing a positive atom
    pub fn apply(&self, args: Vec<Term>) -> formula::Formula {
        formula::Formula::atom(self.clone(), args)
    }
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Predicate {}

impl std::hash::Hash for Predicate {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({}/{})", self.name(), self.arity())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A function symbol
///
/// Functions may be partial: a partial function need not have a value for
/// every argument tuple. Applications outside the domain of a partial
/// function are resolved by the grounder according to the context.
#[derive(Clone)]
pub struct Function {
    inner: Arc<FunctionInner>,
}

struct FunctionInner {
    name: String,
    arg_sorts: Vec<Sort>,
    out_sort: Sort,
    partial: bool,
}

impl Function {
    /// Creates a new total function symbol
    pub fn new(name: impl Into<String>, arg_sorts: Vec<Sort>, out_sort: Sort) -> Self {
        Self::build(name.into(), arg_sorts, out_sort, false)
    }

    /// Creates a new partial function symbol
    pub fn partial(name: impl Into<String>, arg_sorts: Vec<Sort>, out_sort: Sort) -> Self {
        Self::build(name.into(), arg_sorts, out_sort, true)
    }

    /// Creates a constant symbol (a nullary function)
    pub fn constant(name: impl Into<String>, out_sort: Sort) -> Self {
        Self::build(name.into(), Vec::new(), out_sort, false)
    }

    fn build(name: String, arg_sorts: Vec<Sort>, out_sort: Sort, partial: bool) -> Self {
        Self {
            inner: Arc::new(FunctionInner {
                name,
                arg_sorts,
                out_sort,
                partial,
            }),
        }
    }

    /// Returns the name of this function
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the argument sorts
    pub fn arg_sorts(&self) -> &[Sort] {
        &self.inner.arg_sorts
    }

    /// Returns the output sort
    pub fn out_sort(&self) -> &Sort {
        &self.inner.out_sort
    }

    /// Returns the number of arguments
    pub fn arity(&self) -> usize {
        self.inner.arg_sorts.len()
    }

    /// Returns true if this function may be undefined for some arguments
    pub fn is_partial(&self) -> bool {
        self.inner.partial
    }

    /// Applies this function to the given arguments
    pub fn apply(&self, args: Vec<Term>) -> Term {
        Term::App {
            func: self.clone(),
            args,
        }
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Function {}

impl std::hash::Hash for Function {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({}/{})", self.name(), self.arity())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A symbol whose ground atoms the literal translator numbers
///
/// Functions appear through their graph: the atom `f(a) = b` is the ground
/// atom of `Symbol::Func(f)` on the tuple `(a, b)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// A predicate symbol
    Pred(Predicate),
    /// The graph of a function symbol
    Func(Function),
}

impl Symbol {
    /// Returns the name of the symbol
    pub fn name(&self) -> &str {
        match self {
            Symbol::Pred(p) => p.name(),
            Symbol::Func(f) => f.name(),
        }
    }

    /// Returns the arity of the symbol's atoms (function graphs include the value)
    pub fn arity(&self) -> usize {
        match self {
            Symbol::Pred(p) => p.arity(),
            Symbol::Func(f) => f.arity() + 1,
        }
    }

    /// Returns the sorts of the symbol's atom positions
    pub fn sorts(&self) -> Vec<Sort> {
        match self {
            Symbol::Pred(p) => p.sorts().to_vec(),
            Symbol::Func(f) => {
                let mut sorts = f.arg_sorts().to_vec();
                sorts.push(f.out_sort().clone());
                sorts
            }
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl From<Predicate> for Symbol {
    fn from(p: Predicate) -> Self {
        Symbol::Pred(p)
    }
}

impl From<Function> for Symbol {
    fn from(f: Function) -> Self {
        Symbol::Func(f)
    }
}

/// A variable bound by a quantifier, a rule or a set expression
///
/// Variables have identity equality like symbols.
#[derive(Clone)]
pub struct Variable {
    inner: Arc<VariableInner>,
}

struct VariableInner {
    name: String,
    sort: Sort,
}

impl Variable {
    /// Creates a new variable ranging over the given sort
    pub fn new(name: impl Into<String>, sort: Sort) -> Self {
        Self {
            inner: Arc::new(VariableInner {
                name: name.into(),
                sort,
            }),
        }
    }

    /// Returns the name of this variable
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the sort this variable ranges over
    pub fn sort(&self) -> &Sort {
        &self.inner.sort
    }

    /// Returns this variable as a term
    pub fn term(&self) -> Term {
        Term::Var(self.clone())
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Variable {}

impl std::hash::Hash for Variable {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Variable({}:{})", self.name(), self.sort().name())
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Comparison operators, used for term comparisons, aggregates and CP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompType {
    /// `=`
    Eq,
    /// `~=`
    Neq,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `=<`
    Leq,
    /// `>=`
    Geq,
}

impl CompType {
    /// The comparison that holds exactly when this one does not
    pub fn negate(self) -> Self {
        match self {
            CompType::Eq => CompType::Neq,
            CompType::Neq => CompType::Eq,
            CompType::Lt => CompType::Geq,
            CompType::Gt => CompType::Leq,
            CompType::Leq => CompType::Gt,
            CompType::Geq => CompType::Lt,
        }
    }

    /// The comparison obtained by swapping the operands
    pub fn invert(self) -> Self {
        match self {
            CompType::Eq => CompType::Eq,
            CompType::Neq => CompType::Neq,
            CompType::Lt => CompType::Gt,
            CompType::Gt => CompType::Lt,
            CompType::Leq => CompType::Geq,
            CompType::Geq => CompType::Leq,
        }
    }

    /// Returns true if `left op right` holds given the ordering of left w.r.t. right
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompType::Eq => ordering == Ordering::Equal,
            CompType::Neq => ordering != Ordering::Equal,
            CompType::Lt => ordering == Ordering::Less,
            CompType::Gt => ordering == Ordering::Greater,
            CompType::Leq => ordering != Ordering::Greater,
            CompType::Geq => ordering != Ordering::Less,
        }
    }

    /// Evaluates `left op right` on numbers
    pub fn holds_f64(self, left: f64, right: f64) -> bool {
        match self {
            CompType::Eq => left == right,
            CompType::Neq => left != right,
            CompType::Lt => left < right,
            CompType::Gt => left > right,
            CompType::Leq => left <= right,
            CompType::Geq => left >= right,
        }
    }

    /// Textual operator
    pub fn symbol(self) -> &'static str {
        match self {
            CompType::Eq => "=",
            CompType::Neq => "~=",
            CompType::Lt => "<",
            CompType::Gt => ">",
            CompType::Leq => "=<",
            CompType::Geq => ">=",
        }
    }
}

impl fmt::Display for CompType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Integer arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
}

impl ArithOp {
    /// Applies the operator, returning None on overflow
    pub fn apply(self, left: i64, right: i64) -> Option<i64> {
        match self {
            ArithOp::Add => left.checked_add(right),
            ArithOp::Sub => left.checked_sub(right),
            ArithOp::Mul => left.checked_mul(right),
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
        }
    }
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggFunction {
    /// Number of members
    Card,
    /// Sum of weights
    Sum,
    /// Product of weights
    Prod,
    /// Minimum weight
    Min,
    /// Maximum weight
    Max,
}

impl AggFunction {
    /// Value of the aggregate over the empty set
    pub fn neutral(self) -> f64 {
        match self {
            AggFunction::Card | AggFunction::Sum => 0.0,
            AggFunction::Prod => 1.0,
            AggFunction::Min => f64::INFINITY,
            AggFunction::Max => f64::NEG_INFINITY,
        }
    }

    /// Textual name used by the printer
    pub fn name(self) -> &'static str {
        match self {
            AggFunction::Card => "card",
            AggFunction::Sum => "sum",
            AggFunction::Prod => "prod",
            AggFunction::Min => "min",
            AggFunction::Max => "max",
        }
    }
}

impl fmt::Display for AggFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A term
#[derive(Clone, Debug, PartialEq)]
pub enum Term {
    /// A variable
    Var(Variable),
    /// A domain element
    Element(DomainElement),
    /// A function application
    App {
        /// The applied function
        func: Function,
        /// The arguments
        args: Vec<Term>,
    },
    /// Integer arithmetic
    Arith {
        /// The operator
        op: ArithOp,
        /// Left operand
        left: Box<Term>,
        /// Right operand
        right: Box<Term>,
    },
    /// An aggregate term
    Agg(Box<Aggregate>),
}

impl Term {
    /// An integer constant
    pub fn int(value: i64) -> Self {
        Term::Element(DomainElement::Int(value))
    }

    /// A string constant
    pub fn string(value: &str) -> Self {
        Term::Element(DomainElement::string(value))
    }

    /// `self + other`
    pub fn plus(self, other: Term) -> Self {
        Self::arith(ArithOp::Add, self, other)
    }

    /// `self - other`
    pub fn minus(self, other: Term) -> Self {
        Self::arith(ArithOp::Sub, self, other)
    }

    /// `self * other`
    pub fn times(self, other: Term) -> Self {
        Self::arith(ArithOp::Mul, self, other)
    }

    fn arith(op: ArithOp, left: Term, right: Term) -> Self {
        Term::Arith {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// An aggregate term
    pub fn aggregate(func: AggFunction, set: SetExpr) -> Self {
        Term::Agg(Box::new(Aggregate { func, set }))
    }

    /// `#set`
    pub fn card(set: SetExpr) -> Self {
        Self::aggregate(AggFunction::Card, set)
    }

    /// `self = other`
    pub fn equals(self, other: Term) -> formula::Formula {
        formula::Formula::compare(self, CompType::Eq, other)
    }

    /// `self op other`
    pub fn compare(self, op: CompType, other: Term) -> formula::Formula {
        formula::Formula::compare(self, op, other)
    }

    /// Returns true if this term is a variable
    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }
}

impl From<Variable> for Term {
    fn from(v: Variable) -> Self {
        Term::Var(v)
    }
}

impl From<&Variable> for Term {
    fn from(v: &Variable) -> Self {
        Term::Var(v.clone())
    }
}

impl From<DomainElement> for Term {
    fn from(d: DomainElement) -> Self {
        Term::Element(d)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(v) => write!(f, "{}", v),
            Term::Element(d) => write!(f, "{}", d),
            Term::App { func, args } => {
                write!(f, "{}", func)?;
                if !args.is_empty() {
                    write!(f, "(")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, "{}", a)?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
            Term::Arith { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Term::Agg(agg) => write!(f, "{}", agg),
        }
    }
}

/// An aggregate: an aggregate function applied to a weighted set
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregate {
    /// The aggregate function
    pub func: AggFunction,
    /// The aggregated set
    pub set: SetExpr,
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.func, self.set)
    }
}

/// One part of a set expression: `{ vars : condition : weight }`
///
/// A part without variables is a single enumerated member.
#[derive(Clone, Debug, PartialEq)]
pub struct QuantSet {
    /// The variables ranging over the part
    pub vars: Vec<Variable>,
    /// Membership condition
    pub condition: formula::Formula,
    /// Weight of each member
    pub weight: Term,
}

/// A weighted set expression, the union of its parts
#[derive(Clone, Debug, PartialEq)]
pub struct SetExpr {
    /// The parts of the set
    pub parts: Vec<QuantSet>,
}

impl SetExpr {
    /// An enumerated set `{ φ1 : w1; φ2 : w2; ... }`
    pub fn enumerated(members: Vec<(formula::Formula, Term)>) -> Self {
        Self {
            parts: members
                .into_iter()
                .map(|(condition, weight)| QuantSet {
                    vars: Vec::new(),
                    condition,
                    weight,
                })
                .collect(),
        }
    }

    /// A quantified set `{ vars : condition : weight }`
    pub fn quantified(vars: Vec<Variable>, condition: formula::Formula, weight: Term) -> Self {
        Self {
            parts: vec![QuantSet {
                vars,
                condition,
                weight,
            }],
        }
    }

    /// A quantified set of unit weights, as used by cardinality
    pub fn counting(vars: Vec<Variable>, condition: formula::Formula) -> Self {
        Self::quantified(vars, condition, Term::int(1))
    }
}

impl fmt::Display for SetExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            for v in &part.vars {
                write!(f, "{} ", v)?;
            }
            write!(f, ": {} : {}", part.condition, part.weight)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_use_identity_equality() {
        let s = Sort::new("S");
        let p1 = Predicate::new("P", vec![s.clone()]);
        let p2 = Predicate::new("P", vec![s.clone()]);
        assert_eq!(p1, p1.clone());
        assert_ne!(p1, p2);

        let x = Variable::new("x", s.clone());
        let y = Variable::new("x", s);
        assert_ne!(x, y);
    }

    #[test]
    fn function_graph_arity() {
        let s = Sort::new("S");
        let f = Function::new("f", vec![s.clone(), s.clone()], s);
        assert_eq!(Symbol::Func(f.clone()).arity(), 3);
        assert_eq!(Symbol::Func(f).sorts().len(), 3);
    }

    #[test]
    fn comparison_negation_and_inversion() {
        for op in [
            CompType::Eq,
            CompType::Neq,
            CompType::Lt,
            CompType::Gt,
            CompType::Leq,
            CompType::Geq,
        ] {
            for ord in [Ordering::Less, Ordering::Equal, Ordering::Greater] {
                assert_eq!(op.negate().holds(ord), !op.holds(ord));
                assert_eq!(op.invert().holds(ord.reverse()), op.holds(ord));
            }
        }
    }

    #[test]
    fn arithmetic_overflow_is_detected() {
        assert_eq!(ArithOp::Add.apply(2, 3), Some(5));
        assert_eq!(ArithOp::Mul.apply(i64::MAX, 2), None);
    }
}
