//! Formula grounders
//!
//! Leaf grounders consult their checkers and the structure before they
//! ever reach the literal translator; composite grounders combine their
//! children through [`Combiner`].

use log::trace;

use crate::ast::{AggFunction, CompType, Sign, Sort, Symbol};
use crate::error::GroundError;
use crate::grounder::context::{Context, GenType, GroundingContext};
use crate::grounder::generator::InstGenerator;
use crate::grounder::set::{ground_set, SetGrounder};
use crate::grounder::term::{GroundTerm, TermGrounder};
use crate::grounder::{targets, Combiner, Conn, ConjOrDisj, FormulaGrounder, Grounding};
use crate::structure::{DomainElement, TruthValue};
use crate::symbolic::{InstanceChecker, Query};
use crate::translator::{CpBound, SetId, TsSet, TsType, VarId};

/// Value of a positive leaf whose terms are undefined
///
/// The leaf is false where undefined values must not help satisfy the
/// theory (a negative function context) and true otherwise.
pub fn undefined_value(sign: Sign, ctx: &GroundingContext) -> bool {
    let inner = if sign.is_pos() { ctx.funccontext } else { ctx.funccontext.negated() };
    inner != Context::Negative
}

fn signed(sign: Sign, value: bool) -> bool {
    value == sign.is_pos()
}

/// A constant
pub struct ConstGrounder {
    value: bool,
}

impl ConstGrounder {
    /// Always grounds to `value`
    pub fn new(value: bool) -> Self {
        Self { value }
    }
}

impl FormulaGrounder for ConstGrounder {
    fn run(&self, _g: &mut Grounding<'_>, out: &mut ConjOrDisj) {
        out.set_value(self.value);
    }
}

/// A predicate atom or a function graph atom
pub struct AtomGrounder {
    symbol: Symbol,
    sign: Sign,
    args: Vec<Box<dyn TermGrounder>>,
    sorts: Vec<Sort>,
    possible: Box<dyn InstanceChecker>,
    certain: Box<dyn InstanceChecker>,
    gentype: GenType,
    undefined: bool,
    defined: bool,
}

impl AtomGrounder {
    /// Creates the grounder of the leaf `sign symbol(args)` in context `ctx`
    ///
    /// The checkers are about the signed leaf, in the direction chosen by
    /// the context's generator type: with [`GenType::CanMakeTrue`],
    /// `possible` tells whether the leaf can be true and `certain` whether
    /// it is certainly true; with [`GenType::CanMakeFalse`] both are about
    /// the leaf being false.
    pub fn new(
        symbol: Symbol,
        sign: Sign,
        args: Vec<Box<dyn TermGrounder>>,
        possible: Box<dyn InstanceChecker>,
        certain: Box<dyn InstanceChecker>,
        ctx: &GroundingContext,
    ) -> Self {
        Self {
            sorts: symbol.sorts(),
            defined: ctx.is_defined(&symbol),
            symbol,
            sign,
            args,
            possible,
            certain,
            gentype: ctx.gentype,
            undefined: undefined_value(sign, ctx),
        }
    }

    fn checked(&self, g: &mut Grounding<'_>) -> Option<bool> {
        let structure = g.structure();
        let direction = self.gentype == GenType::CanMakeTrue;
        if !self.possible.check(structure, &mut g.env) {
            return Some(!direction);
        }
        if self.certain.check(structure, &mut g.env) {
            return Some(direction);
        }
        None
    }
}

impl FormulaGrounder for AtomGrounder {
    fn run(&self, g: &mut Grounding<'_>, out: &mut ConjOrDisj) {
        if let Some(value) = self.checked(g) {
            out.set_value(value);
            return;
        }
        let mut tuple = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            match arg.run(g) {
                GroundTerm::Element(e) => tuple.push(e),
                GroundTerm::Undefined => {
                    out.set_value(signed(self.sign, self.undefined));
                    return;
                }
                GroundTerm::Linear { .. } => unreachable!("CP term as argument of {}", self.symbol),
            }
        }
        let structure = g.structure();
        let in_sorts = self
            .sorts
            .iter()
            .zip(&tuple)
            .all(|(sort, e)| structure.sort_table(sort).is_some_and(|t| t.contains(e)));
        if !in_sorts {
            out.set_value(signed(self.sign, false));
            return;
        }
        if !self.defined {
            match structure.truth_value(&self.symbol, &tuple) {
                TruthValue::True => return out.set_value(signed(self.sign, true)),
                TruthValue::False => return out.set_value(signed(self.sign, false)),
                TruthValue::Unknown => {}
            }
        }
        let lit = g.theory_mut().translator_mut().translate_atom(&self.symbol, tuple);
        out.set_literal(if self.sign.is_pos() { lit } else { -lit });
    }
}

/// Binary comparison of two terms
///
/// With CP variables on either side the comparison is reified as a CP
/// constraint.
pub struct ComparisonGrounder {
    left: Box<dyn TermGrounder>,
    op: CompType,
    right: Box<dyn TermGrounder>,
    sign: Sign,
    undefined: bool,
    ts: TsType,
}

impl ComparisonGrounder {
    /// Creates the grounder of `sign (left op right)` in context `ctx`
    pub fn new(
        left: Box<dyn TermGrounder>,
        op: CompType,
        right: Box<dyn TermGrounder>,
        sign: Sign,
        ctx: &GroundingContext,
    ) -> Self {
        let inner = if sign.is_pos() { ctx.tseitin } else { ctx.tseitin.negated() };
        Self {
            left,
            op,
            right,
            sign,
            undefined: undefined_value(sign, ctx),
            // CP constraints are never rules of a definition
            ts: if inner == TsType::Rule { TsType::Eq } else { inner },
        }
    }

    fn linear(term: GroundTerm) -> Option<(Vec<(VarId, i64)>, i64)> {
        match term {
            GroundTerm::Element(DomainElement::Int(c)) => Some((Vec::new(), c)),
            GroundTerm::Linear { vars, constant } => Some((vars, constant)),
            GroundTerm::Element(DomainElement::Str(_)) | GroundTerm::Undefined => None,
        }
    }

    fn cp(&self, g: &mut Grounding<'_>, left: GroundTerm, right: GroundTerm, out: &mut ConjOrDisj) {
        let (Some((lv, lc)), Some((rv, rc))) = (Self::linear(left), Self::linear(right)) else {
            out.set_value(signed(self.sign, false));
            return;
        };
        // a single variable on each side stays a variable comparison
        if let ([(l, 1)], [(r, 1)], 0, 0) = (lv.as_slice(), rv.as_slice(), lc, rc) {
            let (l, r) = (*l, *r);
            let term = g.theory().terms().fold(vec![l], vec![1]);
            let lit = g.theory_mut().translator_mut().translate_cp(term, self.op, CpBound::Var(r), self.ts);
            out.set_literal(if self.sign.is_pos() { lit } else { -lit });
            return;
        }
        let mut vars: Vec<(VarId, i64)> = lv;
        for (v, w) in rv {
            match vars.iter_mut().find(|(u, _)| *u == v) {
                Some((_, existing)) => *existing -= w,
                None => vars.push((v, -w)),
            }
        }
        vars.retain(|(_, w)| *w != 0);
        let bound = rc - lc;
        if vars.is_empty() {
            out.set_value(signed(self.sign, self.op.holds(0.cmp(&bound))));
            return;
        }
        let (ids, weights): (Vec<VarId>, Vec<i64>) = vars.into_iter().unzip();
        let term = g.theory().terms().fold(ids, weights);
        let lit = g
            .theory_mut()
            .translator_mut()
            .translate_cp(term, self.op, CpBound::Const(bound), self.ts);
        out.set_literal(if self.sign.is_pos() { lit } else { -lit });
    }
}

impl FormulaGrounder for ComparisonGrounder {
    fn run(&self, g: &mut Grounding<'_>, out: &mut ConjOrDisj) {
        let left = self.left.run(g);
        let right = self.right.run(g);
        match (left, right) {
            (GroundTerm::Undefined, _) | (_, GroundTerm::Undefined) => {
                out.set_value(signed(self.sign, self.undefined));
            }
            (GroundTerm::Element(l), GroundTerm::Element(r)) => {
                out.set_value(signed(self.sign, self.op.holds(l.cmp(&r))));
            }
            (left, right) => self.cp(g, left, right, out),
        }
    }
}

/// Conjunction or disjunction
pub struct BoolGrounder {
    conj: bool,
    subs: Vec<Box<dyn FormulaGrounder>>,
    ctx: GroundingContext,
}

impl BoolGrounder {
    /// Combines `subs` with the given connective in context `ctx`
    pub fn new(conj: bool, subs: Vec<Box<dyn FormulaGrounder>>, ctx: GroundingContext) -> Self {
        Self { conj, subs, ctx }
    }
}

impl FormulaGrounder for BoolGrounder {
    fn run(&self, g: &mut Grounding<'_>, out: &mut ConjOrDisj) {
        let mut combiner = Combiner::new(self.conj, &self.ctx);
        let mut child = ConjOrDisj::default();
        for sub in &self.subs {
            if g.stopped() {
                break;
            }
            sub.run(g, &mut child);
            if combiner.add(g, &mut child) {
                break;
            }
        }
        combiner.finish(out);
    }
}

/// Quantified formula, grounded instance by instance
pub struct QuantGrounder {
    conj: bool,
    generator: InstGenerator,
    body: Box<dyn FormulaGrounder>,
    certainly_true: Query,
    certainly_false: Query,
    ctx: GroundingContext,
}

impl QuantGrounder {
    /// Creates the grounder of a universal (`conj`) or existential formula
    ///
    /// `generator` enumerates the instances that can decide the formula;
    /// the two queries decide the whole formula without enumeration.
    pub fn new(
        conj: bool,
        generator: InstGenerator,
        body: Box<dyn FormulaGrounder>,
        certainly_true: Query,
        certainly_false: Query,
        ctx: GroundingContext,
    ) -> Self {
        Self {
            conj,
            generator,
            body,
            certainly_true,
            certainly_false,
            ctx,
        }
    }
}

impl FormulaGrounder for QuantGrounder {
    fn run(&self, g: &mut Grounding<'_>, out: &mut ConjOrDisj) {
        let structure = g.structure();
        if self.certainly_true.check(structure, &mut g.env) {
            return out.set_true();
        }
        if self.certainly_false.check(structure, &mut g.env) {
            return out.set_false();
        }
        let mut cursor = match self.generator.start(structure) {
            Ok(cursor) => cursor,
            Err(e) => {
                g.fail(e);
                return out.set_true();
            }
        };
        let slots: Vec<_> = self.generator.vars().iter().map(|(s, _)| *s).collect();
        let saved = g.env.snapshot(&slots);
        let mut combiner = Combiner::new(self.conj, &self.ctx);
        let mut child = ConjOrDisj::default();
        while self.generator.next(g, &mut cursor) {
            self.body.run(g, &mut child);
            if combiner.add(g, &mut child) || g.stopped() {
                break;
            }
        }
        g.env.reinstate(&saved);
        combiner.finish(out);
    }
}

/// Equivalence of two formulas
pub struct EquivGrounder {
    left: Box<dyn FormulaGrounder>,
    right: Box<dyn FormulaGrounder>,
    side_ts: TsType,
    ctx: GroundingContext,
}

impl EquivGrounder {
    /// Creates the grounder of `left <=> right`; both sides are grounded in `ctx.both()`
    pub fn new(left: Box<dyn FormulaGrounder>, right: Box<dyn FormulaGrounder>, ctx: GroundingContext) -> Self {
        Self {
            left,
            right,
            side_ts: ctx.both().tseitin,
            ctx,
        }
    }
}

impl FormulaGrounder for EquivGrounder {
    fn run(&self, g: &mut Grounding<'_>, out: &mut ConjOrDisj) {
        let mut left = ConjOrDisj::default();
        self.left.run(g, &mut left);
        if g.stopped() {
            return out.set_true();
        }
        let mut right = ConjOrDisj::default();
        self.right.run(g, &mut right);
        match (left.decided(), right.decided()) {
            (Some(l), Some(r)) => out.set_value(l == r),
            (Some(l), None) => {
                if !l {
                    right.negate();
                }
                *out = right;
            }
            (None, Some(r)) => {
                if !r {
                    left.negate();
                }
                *out = left;
            }
            (None, None) => {
                let a = g.reify(&mut left, self.side_ts);
                let b = g.reify(&mut right, self.side_ts);
                let mut forward = ConjOrDisj {
                    conn: Conn::Disj,
                    literals: vec![-a, b],
                };
                let mut backward = ConjOrDisj {
                    conn: Conn::Disj,
                    literals: vec![a, -b],
                };
                if self.ctx.conjunctive_path {
                    g.emit_top(&mut forward);
                    g.emit_top(&mut backward);
                    return out.set_true();
                }
                let f = g.reify(&mut forward, self.ctx.tseitin);
                let r = g.reify(&mut backward, self.ctx.tseitin);
                *out = ConjOrDisj {
                    conn: Conn::Conj,
                    literals: vec![f, r],
                };
            }
        }
    }
}

/// Ground state of an aggregate formula
#[derive(Clone, Debug, PartialEq)]
pub enum AggState {
    /// The signed formula has a known value
    Decided(bool),
    /// The value depends on the set's literals
    Pending {
        /// The grounded set
        set: SetId,
        /// The bound of `bound op agg(set)`
        bound: f64,
    },
}

/// Possible values of `func(set)` over all assignments of the set's literals
fn value_range(func: AggFunction, set: &TsSet) -> (f64, f64) {
    let unknown = &set.weights;
    match func {
        AggFunction::Card => {
            let lo = set.trueweights.len() as f64;
            (lo, lo + unknown.len() as f64)
        }
        AggFunction::Sum => {
            let base: f64 = set.trueweights.iter().sum();
            let neg: f64 = unknown.iter().filter(|w| **w < 0.0).sum();
            let pos: f64 = unknown.iter().filter(|w| **w > 0.0).sum();
            (base + neg, base + pos)
        }
        AggFunction::Prod => {
            let base: f64 = set.trueweights.iter().product();
            if unknown.is_empty() {
                (base, base)
            } else if base >= 0.0 && unknown.iter().all(|w| *w >= 0.0) {
                let lo = unknown.iter().map(|w| w.min(1.0)).product::<f64>();
                let hi = unknown.iter().map(|w| w.max(1.0)).product::<f64>();
                (base * lo, base * hi)
            } else {
                (f64::NEG_INFINITY, f64::INFINITY)
            }
        }
        AggFunction::Min => {
            let certain = set.trueweights.iter().copied().fold(f64::INFINITY, f64::min);
            (unknown.iter().copied().fold(certain, f64::min), certain)
        }
        AggFunction::Max => {
            let certain = set.trueweights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (certain, unknown.iter().copied().fold(certain, f64::max))
        }
    }
}

/// Decides `bound op agg` from the range of the aggregate, if possible
fn decide_range(bound: f64, op: CompType, (lo, hi): (f64, f64)) -> Option<bool> {
    match op {
        CompType::Eq if lo == hi => Some(bound == lo),
        CompType::Eq if bound < lo || bound > hi => Some(false),
        CompType::Eq => None,
        CompType::Neq => decide_range(bound, CompType::Eq, (lo, hi)).map(|v| !v),
        CompType::Lt if bound < lo => Some(true),
        CompType::Lt if bound >= hi => Some(false),
        CompType::Gt if bound > hi => Some(true),
        CompType::Gt if bound <= lo => Some(false),
        CompType::Leq if bound <= lo => Some(true),
        CompType::Leq if bound > hi => Some(false),
        CompType::Geq if bound >= hi => Some(true),
        CompType::Geq if bound < lo => Some(false),
        CompType::Lt | CompType::Gt | CompType::Leq | CompType::Geq => None,
    }
}

/// Aggregate formula `bound op func(set)`
pub struct AggGrounder {
    sign: Sign,
    bound: Box<dyn TermGrounder>,
    op: CompType,
    func: AggFunction,
    set: Vec<Box<dyn SetGrounder>>,
    undefined: bool,
    ts: TsType,
}

impl AggGrounder {
    /// Creates the grounder of `sign (bound op func(set))` in context `ctx`
    pub fn new(
        sign: Sign,
        bound: Box<dyn TermGrounder>,
        op: CompType,
        func: AggFunction,
        set: Vec<Box<dyn SetGrounder>>,
        ctx: &GroundingContext,
    ) -> Self {
        Self {
            sign,
            bound,
            op,
            func,
            set,
            undefined: undefined_value(sign, ctx),
            ts: if sign.is_pos() { ctx.tseitin } else { ctx.tseitin.negated() },
        }
    }

    /// Sign of the formula
    pub fn sign(&self) -> Sign {
        self.sign
    }

    /// Comparison of the bound with the aggregate
    pub fn op(&self) -> CompType {
        self.op
    }

    /// The aggregate function
    pub fn func(&self) -> AggFunction {
        self.func
    }

    /// Grounds the bound and the set, deciding the formula when the set allows it
    ///
    /// Decided sets are released. For minimum and maximum, members that
    /// cannot change the value are dropped from the set.
    pub fn ground_parts(&self, g: &mut Grounding<'_>) -> AggState {
        let bound = match self.bound.run(g) {
            GroundTerm::Element(DomainElement::Int(b)) => b as f64,
            GroundTerm::Undefined => return AggState::Decided(signed(self.sign, self.undefined)),
            GroundTerm::Element(e @ DomainElement::Str(_)) => {
                g.fail(GroundError::InvalidArgument(format!("aggregate bound {} is not a number", e)));
                return AggState::Decided(true);
            }
            GroundTerm::Linear { .. } => {
                g.fail(GroundError::Unsupported("aggregate bound over CP variables".to_string()));
                return AggState::Decided(true);
            }
        };
        let set = ground_set(g, &self.set);
        let translator = g.theory_mut().translator_mut();
        let range = value_range(self.func, translator.set(set));
        if let Some(value) = decide_range(bound, self.op, range) {
            translator.release_set(set);
            trace!(target: targets::GROUNDER, "aggregate {} {} {} decided {}", bound, self.op, self.func, value);
            return AggState::Decided(signed(self.sign, value));
        }
        let set = match self.func {
            AggFunction::Min | AggFunction::Max => collapse_extremum(g, self.func, set),
            _ => set,
        };
        AggState::Pending { set, bound }
    }
}

/// Drops members of a minimum (maximum) set that cannot go below (above) the certain members
fn collapse_extremum(g: &mut Grounding<'_>, func: AggFunction, set: SetId) -> SetId {
    let translator = g.theory_mut().translator_mut();
    let current = translator.set(set);
    let Some(certain) = current
        .trueweights
        .iter()
        .copied()
        .reduce(if func == AggFunction::Min { f64::min } else { f64::max })
    else {
        return set;
    };
    let relevant = |w: f64| match func {
        AggFunction::Min => w < certain,
        _ => w > certain,
    };
    if current.trueweights.len() == 1 && current.weights.iter().all(|w| relevant(*w)) {
        return set;
    }
    let (literals, weights): (Vec<_>, Vec<_>) = current
        .literals
        .iter()
        .zip(&current.weights)
        .filter(|(_, w)| relevant(**w))
        .map(|(l, w)| (*l, *w))
        .unzip();
    let collapsed = translator.translate_set(literals, weights, vec![certain]);
    translator.release_set(set);
    collapsed
}

impl FormulaGrounder for AggGrounder {
    fn run(&self, g: &mut Grounding<'_>, out: &mut ConjOrDisj) {
        match self.ground_parts(g) {
            AggState::Decided(value) => out.set_value(value),
            AggState::Pending { set, bound } => {
                let translator = g.theory_mut().translator_mut();
                let lit = translator.translate_agg(bound, self.op, self.func, set, self.ts);
                out.set_literal(if self.sign.is_pos() { lit } else { -lit });
            }
        }
    }
}
