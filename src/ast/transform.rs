//! Consuming rewrites over formulas
//!
//! Every transform takes ownership of its input and returns the rewritten
//! formula. The grounder compiler runs [`push_negations`] and [`flatten`]
//! over every sentence and rule body before building grounders.

use super::formula::{Formula, QuantKind, Rule, Sign};
use super::{CompType, QuantSet, SetExpr, Sort, Term, Variable};

/// Mints fresh variables for rewrites that introduce quantifiers
#[derive(Debug, Default)]
pub struct VariableFactory {
    next: usize,
}

impl VariableFactory {
    /// Creates a factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new variable of the given sort
    pub fn fresh(&mut self, sort: &Sort) -> Variable {
        self.next += 1;
        Variable::new(format!("_v{}", self.next), sort.clone())
    }

    /// Number of variables minted so far
    pub fn count(&self) -> usize {
        self.next
    }
}

fn map_set(set: SetExpr, f: &impl Fn(Formula) -> Formula) -> SetExpr {
    SetExpr {
        parts: set
            .parts
            .into_iter()
            .map(|part| QuantSet {
                vars: part.vars,
                condition: f(part.condition),
                weight: map_term(part.weight, f),
            })
            .collect(),
    }
}

fn map_term(term: Term, f: &impl Fn(Formula) -> Formula) -> Term {
    match term {
        Term::Var(_) | Term::Element(_) => term,
        Term::App { func, args } => Term::App {
            func,
            args: args.into_iter().map(|a| map_term(a, f)).collect(),
        },
        Term::Arith { op, left, right } => Term::Arith {
            op,
            left: Box::new(map_term(*left, f)),
            right: Box::new(map_term(*right, f)),
        },
        Term::Agg(mut agg) => {
            agg.set = map_set(agg.set, f);
            Term::Agg(agg)
        }
    }
}

/// Applies `f` to every formula nested inside the terms of a leaf
fn map_leaf(formula: Formula, f: &impl Fn(Formula) -> Formula) -> Formula {
    match formula {
        Formula::Atom { sign, pred, args } => Formula::Atom {
            sign,
            pred,
            args: args.into_iter().map(|a| map_term(a, f)).collect(),
        },
        Formula::Graph { sign, func, args, value } => Formula::Graph {
            sign,
            func,
            args: args.into_iter().map(|a| map_term(a, f)).collect(),
            value: map_term(value, f),
        },
        Formula::Compare { sign, left, op, right } => Formula::Compare {
            sign,
            left: map_term(left, f),
            op,
            right: map_term(right, f),
        },
        Formula::Chain { sign, terms, ops } => Formula::Chain {
            sign,
            terms: terms.into_iter().map(|t| map_term(t, f)).collect(),
            ops,
        },
        Formula::Agg { sign, bound, op, mut agg } => {
            agg.set = map_set(agg.set, f);
            Formula::Agg {
                sign,
                bound: map_term(bound, f),
                op,
                agg,
            }
        }
        other => other,
    }
}

/// Pushes negations down to the leaves
///
/// After this pass only atoms, graphs, comparisons, chains and aggregate
/// formulas carry a negative sign.
pub fn push_negations(formula: Formula) -> Formula {
    match formula {
        Formula::Constant(_) => formula,
        Formula::Bool { sign, conj, subs } => {
            let negate = !sign.is_pos();
            Formula::Bool {
                sign: Sign::Pos,
                conj: conj != negate,
                subs: subs
                    .into_iter()
                    .map(|s| push_negations(if negate { s.not() } else { s }))
                    .collect(),
            }
        }
        Formula::Quant { sign, kind, vars, body } => {
            let (kind, body) = if sign.is_pos() {
                (kind, *body)
            } else {
                let flipped = match kind {
                    QuantKind::Forall => QuantKind::Exists,
                    QuantKind::Exists => QuantKind::Forall,
                };
                (flipped, body.not())
            };
            Formula::Quant {
                sign: Sign::Pos,
                kind,
                vars,
                body: Box::new(push_negations(body)),
            }
        }
        Formula::Equiv { sign, left, right } => {
            let right = if sign.is_pos() { *right } else { right.not() };
            Formula::Equiv {
                sign: Sign::Pos,
                left: Box::new(push_negations(*left)),
                right: Box::new(push_negations(right)),
            }
        }
        leaf => map_leaf(leaf, &push_negations),
    }
}

/// Flattens nested connectives and quantifiers and folds constants
///
/// Expects positive composite nodes, as produced by [`push_negations`].
pub fn flatten(formula: Formula) -> Formula {
    match formula {
        Formula::Bool { sign: Sign::Pos, conj, subs } => {
            let mut flat = Vec::with_capacity(subs.len());
            for sub in subs {
                match flatten(sub) {
                    Formula::Constant(b) if b == conj => {}
                    Formula::Constant(b) => return Formula::Constant(b),
                    Formula::Bool {
                        sign: Sign::Pos,
                        conj: c,
                        subs: inner,
                    } if c == conj => flat.extend(inner),
                    other => flat.push(other),
                }
            }
            match flat.len() {
                0 => Formula::Constant(conj),
                1 => flat.pop().unwrap_or(Formula::Constant(conj)),
                _ => Formula::Bool {
                    sign: Sign::Pos,
                    conj,
                    subs: flat,
                },
            }
        }
        Formula::Quant {
            sign: Sign::Pos,
            kind,
            mut vars,
            body,
        } => {
            let body = flatten(*body);
            if vars.is_empty() {
                return body;
            }
            match body {
                // only the cases that hold regardless of the domain size
                Formula::Constant(true) if kind == QuantKind::Forall => Formula::TRUE,
                Formula::Constant(false) if kind == QuantKind::Exists => Formula::FALSE,
                Formula::Quant {
                    sign: Sign::Pos,
                    kind: k,
                    vars: inner,
                    body,
                } if k == kind => {
                    vars.extend(inner);
                    Formula::Quant {
                        sign: Sign::Pos,
                        kind,
                        vars,
                        body,
                    }
                }
                body => Formula::Quant {
                    sign: Sign::Pos,
                    kind,
                    vars,
                    body: Box::new(body),
                },
            }
        }
        Formula::Equiv { sign, left, right } => match (flatten(*left), flatten(*right)) {
            (Formula::Constant(a), Formula::Constant(b)) => Formula::Constant((a == b) == sign.is_pos()),
            (Formula::Constant(b), other) | (other, Formula::Constant(b)) => {
                let keep_sign = b == sign.is_pos();
                if keep_sign {
                    other
                } else {
                    push_negations(other.not())
                }
            }
            (l, r) => Formula::Equiv {
                sign,
                left: Box::new(l),
                right: Box::new(r),
            },
        },
        leaf => map_leaf(leaf, &flatten),
    }
}

/// Runs [`push_negations`] followed by [`flatten`]
pub fn normalize(formula: Formula) -> Formula {
    flatten(push_negations(formula))
}

/// Splits a comparison chain `t0 op0 t1 op1 t2` into a conjunction of binary comparisons
pub fn split_chain(sign: Sign, terms: Vec<Term>, ops: Vec<CompType>) -> Formula {
    let mut comparisons = Vec::with_capacity(ops.len());
    let mut iter = terms.into_iter();
    let Some(mut left) = iter.next() else {
        return Formula::Constant(sign.is_pos());
    };
    for (op, right) in ops.into_iter().zip(iter) {
        comparisons.push(Formula::compare(left, op, right.clone()));
        left = right;
    }
    let conj = if comparisons.len() == 1 {
        comparisons.pop().unwrap_or(Formula::TRUE)
    } else {
        Formula::conj(comparisons)
    };
    push_negations(conj.with_sign_composed(sign))
}

/// Rewrites a rule so that its head arguments are distinct variables
///
/// A head argument that is not a variable, or that repeats an earlier one,
/// is replaced by a fresh variable `v` and `v = arg` is added to the body.
pub fn normalize_rule(rule: Rule, factory: &mut VariableFactory) -> Rule {
    let Rule { mut vars, head, args, body } = rule;
    let mut seen: Vec<Variable> = Vec::new();
    let mut new_args = Vec::with_capacity(args.len());
    let mut equalities = Vec::new();
    for (i, arg) in args.into_iter().enumerate() {
        match arg {
            Term::Var(v) if !seen.contains(&v) => {
                seen.push(v.clone());
                new_args.push(Term::Var(v));
            }
            other => {
                let fresh = factory.fresh(&head.sorts()[i]);
                equalities.push(Formula::compare(fresh.term(), CompType::Eq, other));
                seen.push(fresh.clone());
                vars.push(fresh.clone());
                new_args.push(Term::Var(fresh));
            }
        }
    }
    let body = if equalities.is_empty() {
        body
    } else {
        equalities.push(body);
        Formula::conj(equalities)
    };
    Rule {
        vars,
        head,
        args: new_args,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Predicate;

    fn setup() -> (Predicate, Predicate, Variable) {
        let s = Sort::new("S");
        let p = Predicate::new("P", vec![s.clone()]);
        let q = Predicate::new("Q", vec![s.clone()]);
        let x = Variable::new("x", s);
        (p, q, x)
    }

    #[test]
    fn push_negations_applies_de_morgan() {
        let (p, q, x) = setup();
        let f = Formula::forall(
            vec![x.clone()],
            p.apply(vec![x.term()]).and(q.apply(vec![x.term()])),
        )
        .not();
        let pushed = push_negations(f);
        let expected = Formula::exists(
            vec![x.clone()],
            Formula::disj(vec![p.apply(vec![x.term()]).not(), q.apply(vec![x.term()]).not()]),
        );
        assert_eq!(pushed, expected);
    }

    #[test]
    fn negated_equivalence_moves_into_right_side() {
        let (p, q, x) = setup();
        let f = p.apply(vec![x.term()]).iff(q.apply(vec![x.term()])).not();
        let pushed = push_negations(f);
        assert_eq!(pushed, p.apply(vec![x.term()]).iff(q.apply(vec![x.term()]).not()));
    }

    #[test]
    fn flatten_splices_and_folds_constants() {
        let (p, q, x) = setup();
        let a = p.apply(vec![x.term()]);
        let b = q.apply(vec![x.term()]);
        let f = Formula::conj(vec![a.clone(), Formula::conj(vec![b.clone(), Formula::TRUE])]);
        assert_eq!(flatten(f), Formula::conj(vec![a.clone(), b.clone()]));

        let g = Formula::disj(vec![a.clone(), Formula::TRUE]);
        assert_eq!(flatten(g), Formula::TRUE);

        let single = Formula::conj(vec![a.clone(), Formula::TRUE]);
        assert_eq!(flatten(single), a);
    }

    #[test]
    fn flatten_merges_nested_quantifiers() {
        let (p, _, x) = setup();
        let y = Variable::new("y", x.sort().clone());
        let f = Formula::forall(vec![x.clone()], Formula::forall(vec![y.clone()], p.apply(vec![y.term()])));
        match flatten(f) {
            Formula::Quant { vars, .. } => assert_eq!(vars, vec![x, y]),
            other => panic!("unexpected {}", other),
        }
    }

    #[test]
    fn chain_splits_into_conjunction() {
        let f = split_chain(
            Sign::Pos,
            vec![Term::int(1), Term::int(2), Term::int(3)],
            vec![CompType::Lt, CompType::Leq],
        );
        assert_eq!(
            f,
            Formula::conj(vec![
                Formula::compare(Term::int(1), CompType::Lt, Term::int(2)),
                Formula::compare(Term::int(2), CompType::Leq, Term::int(3)),
            ])
        );
        let neg = split_chain(Sign::Neg, vec![Term::int(1), Term::int(2)], vec![CompType::Lt]);
        assert_eq!(neg, Formula::compare(Term::int(1), CompType::Lt, Term::int(2)).not());
    }

    #[test]
    fn rule_heads_become_distinct_variables() {
        let s = Sort::new("S");
        let r = Predicate::new("R", vec![s.clone(), s.clone()]);
        let x = Variable::new("x", s.clone());
        let rule = Rule::new(vec![x.clone()], r.clone(), vec![x.term(), x.term()], Formula::TRUE);
        let mut factory = VariableFactory::new();
        let normalized = normalize_rule(rule, &mut factory);
        assert_eq!(normalized.vars.len(), 2);
        assert_eq!(normalized.args[0], x.term());
        assert_ne!(normalized.args[1], x.term());
        assert!(matches!(normalized.body, Formula::Bool { conj: true, .. }));
        assert_eq!(factory.count(), 1);
    }
}
