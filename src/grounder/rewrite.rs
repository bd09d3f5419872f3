//! Atom preprocessing
//!
//! Before a leaf grounder is built, every atomic formula is rewritten
//! against the structure so that only predicate atoms, graph atoms,
//! comparisons of evaluable terms and aggregate formulas remain:
//!
//! - comparison chains are split into binary comparisons,
//! - `f(ā) = t` with a three-valued `f` becomes the graph atom of `f`,
//! - a comparison with an aggregate becomes an aggregate formula,
//! - any other three-valued subterm `t` is unnested into a fresh variable
//!   `y`: `∃y: t = y ∧ φ[y]` when undefined values must make the atom
//!   false, `∀y: t ≠ y ∨ φ[y]` otherwise.
//!
//! With CP support, linear comparisons over total integer functions are
//! kept whole and grounded by the CP comparison grounder.

use rustc_hash::FxHashSet;

use crate::ast::transform::{normalize, split_chain, VariableFactory};
use crate::ast::{CompType, Formula, Function, QuantSet, SetExpr, Sign, Sort, Symbol, Term, Variable};
use crate::error::{GroundError, Result};
use crate::grounder::context::{Context, GroundingContext};
use crate::structure::{DomainElement, Structure};

/// Outcome of rewriting a leaf
#[derive(Clone, Debug, PartialEq)]
pub enum Leaf {
    /// The leaf can be grounded as is
    Ready(Formula),
    /// The leaf was replaced by a formula that has to be compiled again
    Rewritten(Formula),
    /// A comparison to ground through CP variables
    Cp(Formula),
}

/// Rewrites leaves against a structure
pub struct Rewriter<'a> {
    structure: &'a Structure,
    defined: &'a FxHashSet<Symbol>,
    factory: &'a mut VariableFactory,
    cp_support: bool,
}

impl<'a> Rewriter<'a> {
    /// Creates a rewriter minting fresh variables from `factory`
    pub fn new(
        structure: &'a Structure,
        defined: &'a FxHashSet<Symbol>,
        factory: &'a mut VariableFactory,
        cp_support: bool,
    ) -> Self {
        Self {
            structure,
            defined,
            factory,
            cp_support,
        }
    }

    /// Returns true if every application of `func` has a known value or is undefined
    pub fn is_two_valued(&self, func: &Function) -> bool {
        let symbol = Symbol::Func(func.clone());
        !self.defined.contains(&symbol) && self.structure.is_two_valued(&symbol)
    }

    /// Returns true if the term's value follows from the structure once its variables are bound
    pub fn evaluable(&self, term: &Term) -> bool {
        match term {
            Term::Var(_) | Term::Element(_) => true,
            Term::App { func, args } => self.is_two_valued(func) && args.iter().all(|a| self.evaluable(a)),
            Term::Arith { left, right, .. } => self.evaluable(left) && self.evaluable(right),
            Term::Agg(_) => false,
        }
    }

    /// Rewrites one leaf in context `ctx`
    ///
    /// # Errors
    /// Fails with [`GroundError::Unsupported`] for aggregates the grounder
    /// cannot place, such as an aggregate inside arithmetic.
    pub fn rewrite(&mut self, leaf: Formula, ctx: &GroundingContext) -> Result<Leaf> {
        match leaf {
            Formula::Chain { sign, terms, ops } => Ok(Leaf::Rewritten(split_chain(sign, terms, ops))),
            Formula::Atom { sign, pred, args } => {
                let sorts = pred.sorts().to_vec();
                let target = self.find_in_args(&args, &sorts)?;
                let atom = Formula::Atom { sign, pred, args };
                match target {
                    Some((target, sort)) => Ok(self.unnest(atom, target, sort, ctx)),
                    None => Ok(Leaf::Ready(atom)),
                }
            }
            Formula::Graph { sign, func, args, value } => {
                let mut sorts = func.arg_sorts().to_vec();
                sorts.push(func.out_sort().clone());
                let mut terms = args.clone();
                terms.push(value.clone());
                let target = self.find_in_args(&terms, &sorts)?;
                let graph = Formula::Graph { sign, func, args, value };
                match target {
                    Some((target, sort)) => Ok(self.unnest(graph, target, sort, ctx)),
                    None => Ok(Leaf::Ready(graph)),
                }
            }
            Formula::Compare { sign, left, op, right } => self.rewrite_compare(sign, left, op, right, ctx),
            Formula::Agg { sign, bound, op, agg } => {
                if matches!(bound, Term::Agg(_)) {
                    return Err(GroundError::Unsupported(format!(
                        "comparison of two aggregates: {} {} {}",
                        bound, op, agg
                    )));
                }
                if !self.evaluable(&bound) {
                    if let Some((target, sort)) = self.find_target(&bound, None)? {
                        return Ok(self.unnest(Formula::Agg { sign, bound, op, agg }, target, sort, ctx));
                    }
                }
                let mut agg = agg;
                let changed = self.unnest_weights(&mut agg.set)?;
                let formula = Formula::Agg { sign, bound, op, agg };
                if changed {
                    Ok(Leaf::Rewritten(formula))
                } else {
                    Ok(Leaf::Ready(formula))
                }
            }
            other => Ok(Leaf::Ready(other)),
        }
    }

    fn rewrite_compare(
        &mut self,
        sign: Sign,
        left: Term,
        op: CompType,
        right: Term,
        ctx: &GroundingContext,
    ) -> Result<Leaf> {
        match (left, right) {
            (Term::Agg(_), Term::Agg(_)) => Err(GroundError::Unsupported(
                "comparison of two aggregates".to_string(),
            )),
            (Term::Agg(agg), bound) => Ok(Leaf::Rewritten(Formula::Agg {
                sign,
                bound,
                op: op.invert(),
                agg: *agg,
            })),
            (bound, Term::Agg(agg)) => Ok(Leaf::Rewritten(Formula::Agg {
                sign,
                bound,
                op,
                agg: *agg,
            })),
            (left, right) => {
                if self.cp_support && self.cp_eligible(&left, &right) {
                    return Ok(Leaf::Cp(Formula::Compare { sign, left, op, right }));
                }
                if matches!(op, CompType::Eq | CompType::Neq) {
                    let sign = if op == CompType::Eq { sign } else { sign.negate() };
                    if let Some(graph) = self.as_graph(sign, &left, &right).or_else(|| self.as_graph(sign, &right, &left)) {
                        return Ok(Leaf::Ready(graph));
                    }
                }
                let target = match self.find_target(&left, None)? {
                    Some(t) => Some(t),
                    None => self.find_target(&right, None)?,
                };
                let compare = Formula::Compare { sign, left, op, right };
                match target {
                    Some((target, sort)) => Ok(self.unnest(compare, target, sort, ctx)),
                    None => Ok(Leaf::Ready(compare)),
                }
            }
        }
    }

    /// `f(ā) = value` as a graph atom, for a three-valued `f` with evaluable `ā` and value
    fn as_graph(&self, sign: Sign, app: &Term, value: &Term) -> Option<Formula> {
        let Term::App { func, args } = app else {
            return None;
        };
        let ready = !self.is_two_valued(func) && args.iter().all(|a| self.evaluable(a)) && self.evaluable(value);
        ready.then(|| Formula::Graph {
            sign,
            func: func.clone(),
            args: args.clone(),
            value: value.clone(),
        })
    }

    fn find_in_args(&self, args: &[Term], sorts: &[Sort]) -> Result<Option<(Term, Sort)>> {
        for (i, arg) in args.iter().enumerate() {
            if let Some(found) = self.find_target(arg, sorts.get(i))? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Innermost subterm to unnest, with the sort of its fresh variable
    ///
    /// `position` is the sort expected where `term` occurs, if known.
    fn find_target(&self, term: &Term, position: Option<&Sort>) -> Result<Option<(Term, Sort)>> {
        match term {
            Term::Var(_) | Term::Element(_) => Ok(None),
            Term::App { func, args } => {
                if let Some(found) = self.find_in_args(args, func.arg_sorts())? {
                    return Ok(Some(found));
                }
                if self.is_two_valued(func) {
                    Ok(None)
                } else {
                    Ok(Some((term.clone(), func.out_sort().clone())))
                }
            }
            Term::Arith { left, right, .. } => match self.find_target(left, None)? {
                Some(found) => Ok(Some(found)),
                None => self.find_target(right, None),
            },
            Term::Agg(_) => match position {
                Some(sort) => Ok(Some((term.clone(), sort.clone()))),
                None => Err(GroundError::Unsupported(format!(
                    "aggregate {} inside an arithmetic term",
                    term
                ))),
            },
        }
    }

    /// Replaces `target` in `leaf` by a fresh variable bound by a quantifier
    fn unnest(&mut self, leaf: Formula, target: Term, sort: Sort, ctx: &GroundingContext) -> Leaf {
        let sign = leaf.sign();
        let inner_ctx = if sign.is_pos() { ctx.clone() } else { ctx.negated() };
        let y = self.factory.fresh(&sort);
        let positive = replace_in_leaf(leaf.with_sign_composed(sign), &target, &y);
        let equality = Formula::compare(target, CompType::Eq, y.term());
        let quantified = if inner_ctx.funccontext == Context::Negative {
            Formula::exists(vec![y], equality.and(positive))
        } else {
            Formula::forall(vec![y], equality.not().or(positive))
        };
        Leaf::Rewritten(normalize(quantified.with_sign_composed(sign)))
    }

    /// Moves three-valued weights into the set conditions; returns true if a part changed
    fn unnest_weights(&mut self, set: &mut SetExpr) -> Result<bool> {
        let mut changed = false;
        for part in &mut set.parts {
            while !self.evaluable(&part.weight) {
                let Some((target, sort)) = self.find_target(&part.weight, None)? else {
                    break;
                };
                let y = self.factory.fresh(&sort);
                let QuantSet { vars, condition, weight } = std::mem::replace(
                    part,
                    QuantSet {
                        vars: Vec::new(),
                        condition: Formula::TRUE,
                        weight: Term::int(0),
                    },
                );
                let mut vars = vars;
                vars.push(y.clone());
                *part = QuantSet {
                    vars,
                    condition: condition.and(Formula::compare(target.clone(), CompType::Eq, y.term())),
                    weight: replace_term(weight, &target, &y),
                };
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Returns true if `left op right` is a linear comparison over total integer functions
    fn cp_eligible(&self, left: &Term, right: &Term) -> bool {
        let mut apps = 0;
        self.cp_linear(left, &mut apps) && self.cp_linear(right, &mut apps) && apps > 0
    }

    fn cp_linear(&self, term: &Term, apps: &mut usize) -> bool {
        match term {
            Term::Var(_) | Term::Element(DomainElement::Int(_)) => true,
            Term::Element(DomainElement::Str(_)) | Term::Agg(_) => false,
            Term::App { func, args } if self.is_two_valued(func) => args.iter().all(|a| self.evaluable(a)),
            Term::App { func, args } => {
                let bounded = self
                    .structure
                    .sort_table(func.out_sort())
                    .and_then(|t| t.int_bounds())
                    .is_some();
                let ok = bounded && !func.is_partial() && args.iter().all(|a| self.evaluable(a));
                if ok {
                    *apps += 1;
                }
                ok
            }
            Term::Arith { op, left, right } => {
                let (mut l, mut r) = (0, 0);
                let linear = self.cp_linear(left, &mut l) && self.cp_linear(right, &mut r);
                *apps += l + r;
                linear && (*op != crate::ast::ArithOp::Mul || l == 0 || r == 0)
            }
        }
    }
}

fn replace_term(term: Term, target: &Term, var: &Variable) -> Term {
    if &term == target {
        return var.term();
    }
    match term {
        Term::App { func, args } => Term::App {
            func,
            args: args.into_iter().map(|a| replace_term(a, target, var)).collect(),
        },
        Term::Arith { op, left, right } => Term::Arith {
            op,
            left: Box::new(replace_term(*left, target, var)),
            right: Box::new(replace_term(*right, target, var)),
        },
        other => other,
    }
}

fn replace_in_leaf(leaf: Formula, target: &Term, var: &Variable) -> Formula {
    let r = |t: Term| replace_term(t, target, var);
    match leaf {
        Formula::Atom { sign, pred, args } => Formula::Atom {
            sign,
            pred,
            args: args.into_iter().map(r).collect(),
        },
        Formula::Graph { sign, func, args, value } => Formula::Graph {
            sign,
            func,
            args: args.into_iter().map(r).collect(),
            value: r(value),
        },
        Formula::Compare { sign, left, op, right } => Formula::Compare {
            sign,
            left: r(left),
            op,
            right: r(right),
        },
        Formula::Agg { sign, bound, op, agg } => Formula::Agg {
            sign,
            bound: r(bound),
            op,
            agg,
        },
        other => other,
    }
}
