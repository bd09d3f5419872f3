//! Formula types for first-order theories, plus rules, definitions and theories

use std::fmt;

use super::{Aggregate, AggFunction, CompType, Function, Predicate, SetExpr, Term, Variable};

/// Polarity of a formula node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sign {
    /// Positive
    Pos,
    /// Negated
    Neg,
}

impl Sign {
    /// The opposite sign
    pub fn negate(self) -> Self {
        match self {
            Sign::Pos => Sign::Neg,
            Sign::Neg => Sign::Pos,
        }
    }

    /// Returns true for [`Sign::Pos`]
    pub fn is_pos(self) -> bool {
        self == Sign::Pos
    }

    /// Combines two signs (product of polarities)
    pub fn compose(self, other: Sign) -> Self {
        if self == other {
            Sign::Pos
        } else {
            Sign::Neg
        }
    }
}

/// Quantifier kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuantKind {
    /// Universal quantification
    Forall,
    /// Existential quantification
    Exists,
}

/// A first-order formula
///
/// Negation is represented by the `sign` carried by every non-constant node.
#[expect(missing_docs)]
#[derive(Clone, Debug, PartialEq)]
pub enum Formula {
    /// `true` or `false`
    Constant(bool),
    /// Predicate application
    Atom {
        sign: Sign,
        pred: Predicate,
        args: Vec<Term>,
    },
    /// Function graph atom `func(args) = value`
    Graph {
        sign: Sign,
        func: Function,
        args: Vec<Term>,
        value: Term,
    },
    /// Binary comparison `left op right`
    Compare {
        sign: Sign,
        left: Term,
        op: CompType,
        right: Term,
    },
    /// Comparison chain `t0 op0 t1 op1 t2 ...`
    Chain {
        sign: Sign,
        terms: Vec<Term>,
        ops: Vec<CompType>,
    },
    /// Aggregate formula `bound op agg(set)`
    Agg {
        sign: Sign,
        bound: Term,
        op: CompType,
        agg: Aggregate,
    },
    /// Conjunction (`conj = true`) or disjunction
    Bool {
        sign: Sign,
        conj: bool,
        subs: Vec<Formula>,
    },
    /// Quantified formula
    Quant {
        sign: Sign,
        kind: QuantKind,
        vars: Vec<Variable>,
        body: Box<Formula>,
    },
    /// Equivalence `left <=> right`
    Equiv {
        sign: Sign,
        left: Box<Formula>,
        right: Box<Formula>,
    },
}

impl Formula {
    /// The constant true
    pub const TRUE: Formula = Formula::Constant(true);
    /// The constant false
    pub const FALSE: Formula = Formula::Constant(false);

    /// A positive predicate atom
    pub fn atom(pred: Predicate, args: Vec<Term>) -> Self {
        Formula::Atom {
            sign: Sign::Pos,
            pred,
            args,
        }
    }

    /// A positive function graph atom `func(args) = value`
    pub fn graph(func: Function, args: Vec<Term>, value: Term) -> Self {
        Formula::Graph {
            sign: Sign::Pos,
            func,
            args,
            value,
        }
    }

    /// A comparison `left op right`
    pub fn compare(left: Term, op: CompType, right: Term) -> Self {
        Formula::Compare {
            sign: Sign::Pos,
            left,
            op,
            right,
        }
    }

    /// A comparison chain; `ops.len()` must be `terms.len() - 1`
    pub fn chain(terms: Vec<Term>, ops: Vec<CompType>) -> Self {
        assert_eq!(
            terms.len(),
            ops.len() + 1,
            "a comparison chain needs one operator between each pair of terms"
        );
        Formula::Chain {
            sign: Sign::Pos,
            terms,
            ops,
        }
    }

    /// An aggregate formula `bound op func(set)`
    pub fn aggregate(bound: Term, op: CompType, func: AggFunction, set: SetExpr) -> Self {
        Formula::Agg {
            sign: Sign::Pos,
            bound,
            op,
            agg: Aggregate { func, set },
        }
    }

    /// Conjunction of two formulas
    pub fn and(self, other: Formula) -> Self {
        Formula::conj(vec![self, other])
    }

    /// Disjunction of two formulas
    pub fn or(self, other: Formula) -> Self {
        Formula::disj(vec![self, other])
    }

    /// N-ary conjunction
    pub fn conj(subs: Vec<Formula>) -> Self {
        Formula::Bool {
            sign: Sign::Pos,
            conj: true,
            subs,
        }
    }

    /// N-ary disjunction
    pub fn disj(subs: Vec<Formula>) -> Self {
        Formula::Bool {
            sign: Sign::Pos,
            conj: false,
            subs,
        }
    }

    /// `self => other`
    pub fn implies(self, other: Formula) -> Self {
        Formula::disj(vec![self.not(), other])
    }

    /// `self <=> other`
    pub fn iff(self, other: Formula) -> Self {
        Formula::Equiv {
            sign: Sign::Pos,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// Universal quantification
    pub fn forall(vars: Vec<Variable>, body: Formula) -> Self {
        Formula::quant(QuantKind::Forall, vars, body)
    }

    /// Existential quantification
    pub fn exists(vars: Vec<Variable>, body: Formula) -> Self {
        Formula::quant(QuantKind::Exists, vars, body)
    }

    /// Quantification of the given kind
    pub fn quant(kind: QuantKind, vars: Vec<Variable>, body: Formula) -> Self {
        Formula::Quant {
            sign: Sign::Pos,
            kind,
            vars,
            body: Box::new(body),
        }
    }

    /// Negation: flips the sign of the node
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        self.with_sign_composed(Sign::Neg)
    }

    /// Returns the sign of this node (constants are positive)
    pub fn sign(&self) -> Sign {
        match self {
            Formula::Constant(_) => Sign::Pos,
            Formula::Atom { sign, .. }
            | Formula::Graph { sign, .. }
            | Formula::Compare { sign, .. }
            | Formula::Chain { sign, .. }
            | Formula::Agg { sign, .. }
            | Formula::Bool { sign, .. }
            | Formula::Quant { sign, .. }
            | Formula::Equiv { sign, .. } => *sign,
        }
    }

    /// Multiplies the sign of this node by `s`
    pub fn with_sign_composed(mut self, s: Sign) -> Self {
        match &mut self {
            Formula::Constant(b) => {
                if !s.is_pos() {
                    *b = !*b;
                }
            }
            Formula::Atom { sign, .. }
            | Formula::Graph { sign, .. }
            | Formula::Compare { sign, .. }
            | Formula::Chain { sign, .. }
            | Formula::Agg { sign, .. }
            | Formula::Bool { sign, .. }
            | Formula::Quant { sign, .. }
            | Formula::Equiv { sign, .. } => *sign = sign.compose(s),
        }
        self
    }

    /// Returns true if this is a leaf formula (no subformulas other than in sets)
    pub fn is_atomic(&self) -> bool {
        matches!(
            self,
            Formula::Atom { .. }
                | Formula::Graph { .. }
                | Formula::Compare { .. }
                | Formula::Chain { .. }
                | Formula::Agg { .. }
        )
    }
}

fn write_sign(f: &mut fmt::Formatter<'_>, sign: Sign) -> fmt::Result {
    if sign.is_pos() {
        Ok(())
    } else {
        write!(f, "~")
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Term]) -> fmt::Result {
    if args.is_empty() {
        return Ok(());
    }
    write!(f, "(")?;
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        write!(f, "{}", a)?;
    }
    write!(f, ")")
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Constant(b) => write!(f, "{}", b),
            Formula::Atom { sign, pred, args } => {
                write_sign(f, *sign)?;
                write!(f, "{}", pred)?;
                write_args(f, args)
            }
            Formula::Graph { sign, func, args, value } => {
                write_sign(f, *sign)?;
                write!(f, "{}", func)?;
                write_args(f, args)?;
                write!(f, " = {}", value)
            }
            Formula::Compare { sign, left, op, right } => {
                write_sign(f, *sign)?;
                write!(f, "({} {} {})", left, op, right)
            }
            Formula::Chain { sign, terms, ops } => {
                write_sign(f, *sign)?;
                write!(f, "({}", terms[0])?;
                for (op, t) in ops.iter().zip(&terms[1..]) {
                    write!(f, " {} {}", op, t)?;
                }
                write!(f, ")")
            }
            Formula::Agg { sign, bound, op, agg } => {
                write_sign(f, *sign)?;
                write!(f, "({} {} {})", bound, op, agg)
            }
            Formula::Bool { sign, conj, subs } => {
                write_sign(f, *sign)?;
                if subs.is_empty() {
                    return write!(f, "{}", conj);
                }
                write!(f, "(")?;
                for (i, s) in subs.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{}", if *conj { " & " } else { " | " })?;
                    }
                    write!(f, "{}", s)?;
                }
                write!(f, ")")
            }
            Formula::Quant { sign, kind, vars, body } => {
                write_sign(f, *sign)?;
                write!(f, "({}", if *kind == QuantKind::Forall { "!" } else { "?" })?;
                for v in vars {
                    write!(f, " {}", v)?;
                }
                write!(f, ": {})", body)
            }
            Formula::Equiv { sign, left, right } => {
                write_sign(f, *sign)?;
                write!(f, "({} <=> {})", left, right)
            }
        }
    }
}

/// A definitional rule `!vars: head(args) <- body`
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    /// Variables quantified over the whole rule
    pub vars: Vec<Variable>,
    /// The defined predicate
    pub head: Predicate,
    /// Head arguments
    pub args: Vec<Term>,
    /// The rule body
    pub body: Formula,
}

impl Rule {
    /// Creates a rule
    pub fn new(vars: Vec<Variable>, head: Predicate, args: Vec<Term>, body: Formula) -> Self {
        Self {
            vars,
            head,
            args,
            body,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.vars.is_empty() {
            write!(f, "!")?;
            for v in &self.vars {
                write!(f, " {}", v)?;
            }
            write!(f, ": ")?;
        }
        write!(f, "{}", self.head)?;
        write_args(f, &self.args)?;
        write!(f, " <- {}.", self.body)
    }
}

/// An inductive definition: a set of rules, possibly recursive
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Definition {
    /// The rules of the definition
    pub rules: Vec<Rule>,
}

impl Definition {
    /// Creates a definition from rules
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Adds a rule
    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Returns the defined predicates, in order of first appearance
    pub fn defined_symbols(&self) -> Vec<Predicate> {
        let mut result: Vec<Predicate> = Vec::new();
        for rule in &self.rules {
            if !result.contains(&rule.head) {
                result.push(rule.head.clone());
            }
        }
        result
    }
}

/// A theory: sentences and definitions
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Theory {
    /// Closed formulas that must hold
    pub sentences: Vec<Formula>,
    /// Inductive definitions
    pub definitions: Vec<Definition>,
}

impl Theory {
    /// Creates an empty theory
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sentence
    pub fn add_sentence(&mut self, sentence: Formula) -> &mut Self {
        self.sentences.push(sentence);
        self
    }

    /// Adds a definition
    pub fn add_definition(&mut self, definition: Definition) -> &mut Self {
        self.definitions.push(definition);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Sort;

    #[test]
    fn negation_flips_sign() {
        let s = Sort::new("S");
        let p = Predicate::new("P", vec![s.clone()]);
        let x = Variable::new("x", s);
        let a = p.apply(vec![x.term()]);
        assert_eq!(a.sign(), Sign::Pos);
        assert_eq!(a.clone().not().sign(), Sign::Neg);
        assert_eq!(a.clone().not().not(), a);
        assert_eq!(Formula::TRUE.not(), Formula::FALSE);
    }

    #[test]
    fn display_is_readable() {
        let s = Sort::new("S");
        let p = Predicate::new("P", vec![s.clone()]);
        let x = Variable::new("x", s);
        let f = Formula::forall(vec![x.clone()], p.apply(vec![x.term()]).not());
        assert_eq!(f.to_string(), "(! x: ~P(x))");
    }

    #[test]
    fn defined_symbols_are_deduplicated() {
        let s = Sort::new("S");
        let p = Predicate::new("P", vec![s.clone()]);
        let x = Variable::new("x", s);
        let r1 = Rule::new(vec![x.clone()], p.clone(), vec![x.term()], Formula::TRUE);
        let r2 = Rule::new(vec![x.clone()], p.clone(), vec![x.term()], Formula::FALSE);
        let def = Definition::new(vec![r1, r2]);
        assert_eq!(def.defined_symbols(), vec![p]);
    }
}
