//! Literal translator properties, seen through the public API

mod common;

use std::cell::Cell;
use std::rc::Rc;

use rustc_hash::FxHashSet;

use ground_rs::ast::{AggFunction, CompType, Formula, Predicate, SetExpr, Sign, Sort, Symbol, Term, Theory, Variable};
use ground_rs::engine::{Engine, Options};
use ground_rs::grounder::term::TermGrounder;
use ground_rs::grounder::{
    AtomGrounder, BoolGrounder, ConjOrDisj, ElementTermGrounder, FormulaGrounder, GroundingContext, Grounding, VarEnv,
};
use ground_rs::structure::{DomainElement, SortTable, Structure};
use ground_rs::symbolic::{InstanceChecker, Query};
use ground_rs::theory::GroundTheory;
use ground_rs::translator::{GroundTranslator, TraceEvent, TsType};

fn int(i: i64) -> DomainElement {
    DomainElement::Int(i)
}

#[test]
fn atom_ids_are_a_function_of_symbol_and_tuple() {
    let s = Sort::new("S");
    let p = Symbol::Pred(Predicate::new("P", vec![s.clone(), s.clone()]));
    let q = Symbol::Pred(Predicate::new("Q", vec![s.clone(), s]));
    let mut tr = GroundTranslator::new();

    let mut seen = Vec::new();
    for symbol in [&p, &q] {
        for a in 0..4 {
            for b in 0..4 {
                seen.push(tr.translate_atom(symbol, vec![int(a), int(b)]));
            }
        }
    }
    let distinct: FxHashSet<_> = seen.iter().copied().collect();
    assert_eq!(distinct.len(), seen.len());

    // asking again, in another order, changes nothing
    let mut i = seen.len();
    for symbol in [&q, &p] {
        for a in (0..4).rev() {
            for b in (0..4).rev() {
                i -= 1;
                let lit = tr.translate_atom(symbol, vec![int(a), int(b)]);
                assert!(seen.contains(&lit));
            }
        }
    }
    assert_eq!(i, 0);
    assert_eq!(tr.stats().atoms, 32);
    assert_eq!(tr.num_atoms(), 32);
}

#[test]
fn equality_aggregates_are_split_in_the_trace() {
    common::init_logging();
    let s = Sort::new("S");
    let p = Predicate::new("P", vec![s.clone()]);
    let x = Variable::new("x", s.clone());
    let mut structure = Structure::new();
    structure.set_sort(&s, SortTable::int_range(1, 3));

    let mut theory = Theory::new();
    theory.add_sentence(Formula::aggregate(
        Term::int(2),
        CompType::Eq,
        AggFunction::Card,
        SetExpr::counting(vec![x.clone()], p.apply(vec![x.term()])),
    ));
    let options = Options {
        trace: true,
        ..Options::default()
    };
    let ground = Engine::new(options).ground(&theory, &structure).unwrap();

    let trace: Vec<&TraceEvent> = ground
        .translator()
        .trace()
        .iter()
        .filter(|e| !matches!(e, TraceEvent::Atom { .. } | TraceEvent::Set { .. }))
        .collect();
    assert_eq!(trace.len(), 4, "{:?}", trace);
    assert!(matches!(
        trace[0],
        TraceEvent::Agg {
            comp: CompType::Eq,
            func: AggFunction::Card,
            ..
        }
    ));
    assert_eq!(
        trace[1],
        &TraceEvent::Agg {
            comp: CompType::Lt,
            func: AggFunction::Card,
            ts: TsType::Eq
        }
    );
    assert_eq!(
        trace[2],
        &TraceEvent::Agg {
            comp: CompType::Gt,
            func: AggFunction::Card,
            ts: TsType::Eq
        }
    );
    assert!(matches!(trace[3], TraceEvent::Pc { size: 2, conj: true, .. }));
    assert_eq!(ground.aggregates().len(), 2);
    assert_eq!(ground.sets().len(), 1);
}

#[test]
fn disequality_aggregates_negate_the_equality() {
    let s = Sort::new("S");
    let p = Symbol::Pred(Predicate::new("P", vec![s]));
    let mut tr = GroundTranslator::new();
    let a = tr.translate_atom(&p, vec![int(1)]);
    let b = tr.translate_atom(&p, vec![int(2)]);
    let set = tr.translate_set(vec![a, b], vec![1.0, 1.0], vec![]);
    let neq = tr.translate_agg(1.0, CompType::Neq, AggFunction::Card, set, TsType::Impl);
    let eq = tr.translate_agg(1.0, CompType::Eq, AggFunction::Card, set, TsType::RImpl);
    assert_eq!(neq, -eq);

    let value = |assign: [bool; 2]| move |l: i32| assign[(l - 1) as usize];
    assert_eq!(tr.eval_lit(eq, &value([true, false])), Some(true));
    assert_eq!(tr.eval_lit(eq, &value([true, true])), Some(false));
    assert_eq!(tr.eval_lit(neq, &value([false, false])), Some(true));
}

/// Answers a fixed value and counts how often it was asked
struct CountingChecker {
    answer: bool,
    calls: Rc<Cell<usize>>,
}

impl InstanceChecker for CountingChecker {
    fn check(&self, _structure: &Structure, _env: &mut VarEnv) -> bool {
        self.calls.set(self.calls.get() + 1);
        self.answer
    }
}

fn counting(answer: bool, calls: &Rc<Cell<usize>>) -> Box<dyn InstanceChecker> {
    Box::new(CountingChecker {
        answer,
        calls: calls.clone(),
    })
}

#[test]
fn decided_checkers_keep_the_translator_idle() {
    let s = Sort::new("S");
    let p = Predicate::new("P", vec![s.clone()]);
    let mut structure = Structure::new();
    structure.set_sort(&s, SortTable::int_range(1, 3));

    let root = GroundingContext::sentence(Rc::new(FxHashSet::default()));
    let leaf = |i: i64, possible: Box<dyn InstanceChecker>, certain: Box<dyn InstanceChecker>, ctx: &GroundingContext| {
        let args: Vec<Box<dyn TermGrounder>> = vec![Box::new(ElementTermGrounder::new(int(i)))];
        Box::new(AtomGrounder::new(Symbol::Pred(p.clone()), Sign::Pos, args, possible, certain, ctx))
            as Box<dyn FormulaGrounder>
    };
    let inner_calls = Rc::new(Cell::new(0));
    let outer_calls = Rc::new(Cell::new(0));

    // (P(1) & P(2)) | P(3): the conjuncts cannot be false, so P(3) is never looked at
    let in_or = root.child(false);
    let in_and = in_or.child(true);
    let and = BoolGrounder::new(
        true,
        vec![
            leaf(1, counting(false, &inner_calls), Box::new(Query::Const(false)), &in_and),
            leaf(2, counting(false, &inner_calls), Box::new(Query::Const(false)), &in_and),
        ],
        in_or.clone(),
    );
    let or = BoolGrounder::new(
        false,
        vec![
            Box::new(and) as Box<dyn FormulaGrounder>,
            leaf(3, counting(true, &outer_calls), counting(true, &outer_calls), &in_or),
        ],
        root.clone(),
    );

    let mut g = Grounding::new(&structure, GroundTheory::materialized());
    let mut out = ConjOrDisj::default();
    or.run(&mut g, &mut out);
    assert!(out.is_true());
    assert_eq!(inner_calls.get(), 2);
    assert_eq!(outer_calls.get(), 0);
    assert_eq!(g.theory().translator().stats().calls, 0);
    assert_eq!(g.theory().translator().stats().tseitins, 0);
    assert!(g.theory().clauses().is_empty());
}

#[test]
fn undecided_checkers_reach_the_translator() {
    let s = Sort::new("S");
    let p = Predicate::new("P", vec![s.clone()]);
    let mut structure = Structure::new();
    structure.set_sort(&s, SortTable::int_range(1, 3));

    let ctx = GroundingContext::sentence(Rc::new(FxHashSet::default()));
    let calls = Rc::new(Cell::new(0));
    let args: Vec<Box<dyn TermGrounder>> = vec![Box::new(ElementTermGrounder::new(int(1)))];
    let leaf = AtomGrounder::new(
        Symbol::Pred(p),
        Sign::Neg,
        args,
        Box::new(Query::Const(true)),
        counting(false, &calls),
        &ctx,
    );
    let mut g = Grounding::new(&structure, GroundTheory::materialized());
    let mut out = ConjOrDisj::default();
    leaf.run(&mut g, &mut out);
    assert_eq!(calls.get(), 1);
    assert_eq!(out.literals.len(), 1);
    assert_eq!(g.theory().translator().print_lit(out.literals[0]), "~P(1)");
    assert_eq!(g.theory().translator().stats().atoms, 1);
}
