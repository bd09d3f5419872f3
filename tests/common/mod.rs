//! Shared helpers for integration tests

#![allow(dead_code)]

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use ground_rs::ast::{AggFunction, ArithOp, Formula, Function, Predicate, QuantKind, SetExpr, Sort, Symbol, Term, Variable};
use ground_rs::structure::{DomainElement, FuncValue, Structure};
use ground_rs::theory::{GroundSet, GroundTheory};
use ground_rs::translator::{CpBound, TsType, VarId};
use ground_rs::Lit;

/// Installs a test logger once; respects `RUST_LOG`
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Elements of a finite sort
pub fn elements(structure: &Structure, sort: &Sort) -> Vec<DomainElement> {
    structure
        .sort_table(sort)
        .map(|t| t.iter().collect())
        .unwrap_or_default()
}

/// Every tuple over the given sorts
pub fn tuples(structure: &Structure, sorts: &[Sort]) -> Vec<Vec<DomainElement>> {
    let mut result = vec![Vec::new()];
    for sort in sorts {
        let elems = elements(structure, sort);
        result = result
            .into_iter()
            .flat_map(|prefix| {
                elems.iter().map(move |e| {
                    let mut t = prefix.clone();
                    t.push(e.clone());
                    t
                })
            })
            .collect();
    }
    result
}

/// All atoms of the given predicates, with the literal they were translated to (if any)
pub fn atoms(ground: &GroundTheory, structure: &Structure, symbols: &[Symbol]) -> Vec<(Symbol, Vec<DomainElement>, Option<Lit>)> {
    let mut result = Vec::new();
    for symbol in symbols {
        for tuple in tuples(structure, &symbol.sorts()) {
            let lit = ground.translator().lookup_atom(symbol, &tuple);
            result.push((symbol.clone(), tuple, lit));
        }
    }
    result
}

/// Returns true if some assignment satisfies every clause
pub fn brute_force_sat(clauses: &[Vec<Lit>]) -> bool {
    extends(clauses, &FxHashMap::default())
}

/// Returns true if the fixed atom values extend to a model of the clauses
pub fn extends(clauses: &[Vec<Lit>], fixed: &FxHashMap<Lit, bool>) -> bool {
    let free: Vec<Lit> = clauses
        .iter()
        .flatten()
        .map(|l| l.abs())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|a| !fixed.contains_key(a))
        .collect();
    assert!(free.len() <= 20, "too many free atoms for brute force: {}", free.len());
    (0u64..1 << free.len()).any(|mask| {
        let value = |l: Lit| -> bool {
            let atom = l.abs();
            let v = match fixed.get(&atom) {
                Some(v) => *v,
                None => {
                    let i = free.iter().position(|a| *a == atom).unwrap_or(0);
                    mask >> i & 1 == 1
                }
            };
            v == (l > 0)
        };
        clauses.iter().all(|c| c.iter().any(|&l| value(l)))
    })
}

/// A two-valued interpretation of the predicates, for the evaluator
pub type Interpretation = FxHashMap<(Symbol, Vec<DomainElement>), bool>;

fn term_value(
    term: &Term,
    structure: &Structure,
    env: &FxHashMap<Variable, DomainElement>,
) -> Option<DomainElement> {
    match term {
        Term::Var(v) => env.get(v).cloned(),
        Term::Element(e) => Some(e.clone()),
        Term::App { func, args } => {
            let args = args
                .iter()
                .map(|a| term_value(a, structure, env))
                .collect::<Option<Vec<_>>>()?;
            match structure.function_value(func, &args) {
                FuncValue::Value(v) => Some(v),
                _ => None,
            }
        }
        Term::Arith { op, left, right } => {
            let l = term_value(left, structure, env)?.as_int()?;
            let r = term_value(right, structure, env)?.as_int()?;
            let v = match op {
                ArithOp::Add => l.checked_add(r),
                ArithOp::Sub => l.checked_sub(r),
                ArithOp::Mul => l.checked_mul(r),
            }?;
            Some(DomainElement::Int(v))
        }
        Term::Agg(_) => None,
    }
}

fn set_value(
    func: AggFunction,
    set: &SetExpr,
    structure: &Structure,
    interp: &Interpretation,
    env: &mut FxHashMap<Variable, DomainElement>,
) -> f64 {
    let mut weights = Vec::new();
    for part in &set.parts {
        let sorts: Vec<Sort> = part.vars.iter().map(|v| v.sort().clone()).collect();
        for tuple in tuples(structure, &sorts) {
            for (v, e) in part.vars.iter().zip(&tuple) {
                env.insert(v.clone(), e.clone());
            }
            if holds(&part.condition, structure, interp, env) {
                if let Some(w) = term_value(&part.weight, structure, env).and_then(|w| w.as_int()) {
                    weights.push(w as f64);
                }
            }
            for v in &part.vars {
                env.remove(v);
            }
        }
    }
    match func {
        AggFunction::Card => weights.len() as f64,
        AggFunction::Sum => weights.iter().sum(),
        AggFunction::Prod => weights.iter().product(),
        AggFunction::Min => weights.iter().copied().fold(f64::INFINITY, f64::min),
        AggFunction::Max => weights.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

fn agg_term(term: &Term, structure: &Structure, interp: &Interpretation, env: &mut FxHashMap<Variable, DomainElement>) -> Option<f64> {
    match term {
        Term::Agg(agg) => Some(set_value(agg.func, &agg.set, structure, interp, env)),
        other => term_value(other, structure, env).and_then(|e| e.as_int()).map(|i| i as f64),
    }
}

/// Truth of a formula whose functions are two-valued in the structure
///
/// Atoms of predicates come from `interp`; atoms missing from it fall
/// back to the structure's certainly-true table.
pub fn holds(
    formula: &Formula,
    structure: &Structure,
    interp: &Interpretation,
    env: &mut FxHashMap<Variable, DomainElement>,
) -> bool {
    let value = match formula {
        Formula::Constant(b) => return *b,
        Formula::Atom { pred, args, .. } => {
            let Some(tuple) = args
                .iter()
                .map(|a| term_value(a, structure, env))
                .collect::<Option<Vec<_>>>()
            else {
                return false;
            };
            let symbol = Symbol::Pred(pred.clone());
            match interp.get(&(symbol.clone(), tuple.clone())) {
                Some(v) => *v,
                None => structure.truth_value(&symbol, &tuple) == ground_rs::structure::TruthValue::True,
            }
        }
        Formula::Graph { func, args, value, .. } => {
            let app = Term::App {
                func: func.clone(),
                args: args.clone(),
            };
            match (term_value(&app, structure, env), term_value(value, structure, env)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        Formula::Compare { left, op, right, .. } => {
            if matches!(left, Term::Agg(_)) || matches!(right, Term::Agg(_)) {
                match (agg_term(left, structure, interp, env), agg_term(right, structure, interp, env)) {
                    (Some(l), Some(r)) => op.holds_f64(l, r),
                    _ => false,
                }
            } else {
                match (term_value(left, structure, env), term_value(right, structure, env)) {
                    (Some(l), Some(r)) => op.holds(l.cmp(&r)),
                    _ => false,
                }
            }
        }
        Formula::Chain { terms, ops, .. } => ops.iter().enumerate().all(|(i, op)| {
            match (term_value(&terms[i], structure, env), term_value(&terms[i + 1], structure, env)) {
                (Some(l), Some(r)) => op.holds(l.cmp(&r)),
                _ => false,
            }
        }),
        Formula::Agg { bound, op, agg, .. } => {
            let b = agg_term(bound, structure, interp, env).unwrap_or(f64::NAN);
            let v = set_value(agg.func, &agg.set, structure, interp, env);
            op.holds_f64(b, v)
        }
        Formula::Bool { conj, subs, .. } => {
            if *conj {
                subs.iter().all(|s| holds(s, structure, interp, env))
            } else {
                subs.iter().any(|s| holds(s, structure, interp, env))
            }
        }
        Formula::Quant { kind, vars, body, .. } => {
            let sorts: Vec<Sort> = vars.iter().map(|v| v.sort().clone()).collect();
            let saved: Vec<_> = vars.iter().map(|v| env.get(v).cloned()).collect();
            let mut result = *kind == QuantKind::Forall;
            for tuple in tuples(structure, &sorts) {
                for (v, e) in vars.iter().zip(&tuple) {
                    env.insert(v.clone(), e.clone());
                }
                if holds(body, structure, interp, env) != result {
                    result = !result;
                    break;
                }
            }
            for (v, old) in vars.iter().zip(saved) {
                match old {
                    Some(e) => env.insert(v.clone(), e),
                    None => env.remove(v),
                };
            }
            result
        }
        Formula::Equiv { left, right, .. } => holds(left, structure, interp, env) == holds(right, structure, interp, env),
    };
    value == formula.sign().is_pos()
}

/// Checks that the clauses accept exactly the interpretations satisfying the sentences
///
/// Every combination of values for the unknown atoms of `symbols` is
/// tried: the sentences hold under the interpretation iff the translated
/// atoms' values extend to a model of the clauses.
pub fn assert_equivalent(ground: &GroundTheory, structure: &Structure, symbols: &[Symbol], sentences: &[Formula]) {
    let unknown: Vec<_> = atoms(ground, structure, symbols)
        .into_iter()
        .filter(|(s, t, _)| structure.truth_value(s, t) == ground_rs::structure::TruthValue::Unknown)
        .collect();
    assert!(unknown.len() <= 12, "too many unknown atoms: {}", unknown.len());
    for mask in 0u32..1 << unknown.len() {
        let mut interp = Interpretation::default();
        let mut fixed = FxHashMap::default();
        for (i, (symbol, tuple, lit)) in unknown.iter().enumerate() {
            let v = mask >> i & 1 == 1;
            interp.insert((symbol.clone(), tuple.clone()), v);
            if let Some(l) = lit {
                fixed.insert(*l, v);
            }
        }
        let expected = sentences
            .iter()
            .all(|s| holds(s, structure, &interp, &mut FxHashMap::default()));
        assert_eq!(
            extends(ground.clauses(), &fixed),
            expected,
            "interpretation {:?} disagrees",
            interp
        );
    }
}

fn arrow_holds(arrow: TsType, head: bool, body: bool) -> bool {
    match arrow {
        TsType::Eq => head == body,
        TsType::Impl => !head || body,
        TsType::RImpl => !body || head,
        TsType::Rule => panic!("rule Tseitin outside a definition"),
    }
}

fn set_aggregate(func: AggFunction, set: &GroundSet, value: &dyn Fn(Lit) -> bool) -> f64 {
    let weights = set
        .literals
        .iter()
        .zip(&set.weights)
        .filter(|(l, _)| value(**l))
        .map(|(_, w)| *w)
        .chain(set.trueweights.iter().copied());
    weights.fold(func.neutral(), |acc, w| match func {
        AggFunction::Card => acc + 1.0,
        AggFunction::Sum => acc + w,
        AggFunction::Prod => acc * w,
        AggFunction::Min => acc.min(w),
        AggFunction::Max => acc.max(w),
    })
}

/// Returns true if the ground theory has a model
///
/// Every atom of a clause, set, aggregate or CP reification is a free
/// boolean, CP variables range over their domains. Definitions are not
/// supported.
pub fn ground_sat(ground: &GroundTheory) -> bool {
    assert!(ground.definitions().is_empty(), "definitions are not supported");
    let atoms: Vec<Lit> = ground
        .clauses()
        .iter()
        .flatten()
        .chain(ground.sets().iter().flat_map(|s| s.literals.iter()))
        .copied()
        .chain(ground.aggregates().iter().map(|a| a.head))
        .chain(ground.cp_reifications().iter().map(|c| c.head))
        .map(|l| l.abs())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    assert!(atoms.len() <= 20, "too many atoms for brute force: {}", atoms.len());

    let vars: Vec<VarId> = ground.cp_variables().iter().map(|(v, _)| *v).collect();
    let mut cp_assignments: Vec<Vec<i64>> = vec![Vec::new()];
    for (_, domain) in ground.cp_variables() {
        cp_assignments = cp_assignments
            .into_iter()
            .flat_map(|prefix| {
                (domain.lo..=domain.hi).map(move |x| {
                    let mut a = prefix.clone();
                    a.push(x);
                    a
                })
            })
            .collect();
    }

    (0u64..1 << atoms.len()).any(|mask| {
        let value = |l: Lit| -> bool {
            let i = atoms.iter().position(|a| *a == l.abs()).unwrap_or(0);
            (mask >> i & 1 == 1) == (l > 0)
        };
        if !ground.clauses().iter().all(|c| c.iter().any(|&l| value(l))) {
            return false;
        }
        let aggregates_hold = ground.aggregates().iter().all(|agg| {
            let set = ground
                .sets()
                .iter()
                .rev()
                .find(|s| s.id == agg.set)
                .unwrap_or_else(|| panic!("aggregate over unknown set {:?}", agg.set));
            let total = set_aggregate(agg.func, set, &value);
            let body = if agg.lower { total >= agg.bound } else { total <= agg.bound };
            arrow_holds(agg.arrow, value(agg.head), body)
        });
        aggregates_hold
            && cp_assignments.iter().any(|assignment| {
                let var = |v: VarId| -> i64 {
                    let i = vars.iter().position(|w| *w == v).unwrap_or_else(|| panic!("unknown CP variable {:?}", v));
                    assignment[i]
                };
                ground.cp_reifications().iter().all(|cp| {
                    let left = cp.left.eval(var);
                    let right = match cp.right {
                        CpBound::Const(c) => c,
                        CpBound::Var(v) => var(v),
                    };
                    arrow_holds(cp.arrow, value(cp.head), cp.comp.holds(left.cmp(&right)))
                })
            })
    })
}

/// Returns true if some two-valued extension of the structure satisfies the sentences
///
/// Every total function over `funcs` is tried, with every interpretation
/// of the unknown atoms of `preds`.
pub fn fo_sat(sentences: &[Formula], structure: &Structure, funcs: &[Function], preds: &[Predicate]) -> bool {
    let mut applications = Vec::new();
    for func in funcs {
        let values = elements(structure, func.out_sort());
        for args in tuples(structure, func.arg_sorts()) {
            applications.push((func.clone(), args, values.clone()));
        }
    }
    let unknown: Vec<(Symbol, Vec<DomainElement>)> = preds
        .iter()
        .flat_map(|p| {
            let symbol = Symbol::Pred(p.clone());
            tuples(structure, p.sorts()).into_iter().map(move |t| (symbol.clone(), t))
        })
        .filter(|(s, t)| structure.truth_value(s, t) == ground_rs::structure::TruthValue::Unknown)
        .collect();
    assert!(unknown.len() <= 12, "too many unknown atoms: {}", unknown.len());

    let mut choice = vec![0usize; applications.len()];
    loop {
        let mut candidate = structure.clone();
        for ((func, args, values), &c) in applications.iter().zip(&choice) {
            candidate.set_value(func, args.clone(), values[c].clone()).unwrap();
        }
        for func in funcs {
            candidate.close_function(func);
        }
        for mask in 0u32..1 << unknown.len() {
            let interp: Interpretation = unknown
                .iter()
                .enumerate()
                .map(|(i, atom)| (atom.clone(), mask >> i & 1 == 1))
                .collect();
            if sentences
                .iter()
                .all(|s| holds(s, &candidate, &interp, &mut FxHashMap::default()))
            {
                return true;
            }
        }
        let mut i = 0;
        loop {
            if i == choice.len() {
                return false;
            }
            choice[i] += 1;
            if choice[i] < applications[i].2.len() {
                break;
            }
            choice[i] = 0;
            i += 1;
        }
    }
}
