//! End-to-end groundings of small theories with known ground forms

mod common;

use ground_rs::ast::{AggFunction, CompType, Definition, Formula, Predicate, Rule, SetExpr, Sort, Symbol, Term, Theory, Variable};
use ground_rs::engine::{Engine, Options};
use ground_rs::structure::{DomainElement, SortTable, Structure};

fn int(i: i64) -> DomainElement {
    DomainElement::Int(i)
}

#[test]
fn rule_over_a_two_valued_body() {
    common::init_logging();
    let s = Sort::new("S");
    let p = Predicate::new("P", vec![s.clone()]);
    let q = Predicate::new("Q", vec![s.clone()]);
    let x = Variable::new("x", s.clone());

    let mut structure = Structure::new();
    structure.set_sort(&s, SortTable::int_range(1, 2));
    structure.make_true(&q, vec![int(1)]).unwrap();
    structure.close_predicate(&q);

    let mut theory = Theory::new();
    theory.add_definition(Definition::new(vec![Rule::new(
        vec![x.clone()],
        p.clone(),
        vec![x.term()],
        q.apply(vec![x.term()]),
    )]));

    let ground = Engine::new(Options::default()).ground(&theory, &structure).unwrap();
    let p_sym = Symbol::Pred(p);
    let p1 = ground.translator().lookup_atom(&p_sym, &[int(1)]).unwrap();
    assert_eq!(ground.clauses(), &[vec![p1]]);
    assert_eq!(ground.translator().lookup_atom(&p_sym, &[int(2)]), None);
    assert_eq!(ground.definitions().len(), 1);
    assert!(ground.definitions()[0].rule(p1).is_none());
}

#[test]
fn empty_cardinality_is_decided_without_tseitins() {
    common::init_logging();
    let s = Sort::new("S");
    let p = Predicate::new("P", vec![s.clone()]);
    let x = Variable::new("x", s.clone());

    let mut structure = Structure::new();
    structure.set_sort(&s, SortTable::int_range(1, 3));
    structure.close_predicate(&p);

    let mut theory = Theory::new();
    let set = SetExpr::counting(vec![x.clone()], p.apply(vec![x.term()]));
    theory.add_sentence(Term::card(set).compare(CompType::Eq, Term::int(0)));

    let (ground, stats) = Engine::new(Options::default())
        .ground_with_stats(&theory, &structure)
        .unwrap();
    assert!(ground.clauses().is_empty());
    assert!(ground.aggregates().is_empty());
    assert_eq!(stats.num_tseitins(), 0);
    assert_eq!(stats.num_atoms(), 0);
}

#[test]
fn aggregate_formula_with_explicit_bound() {
    let s = Sort::new("S");
    let p = Predicate::new("P", vec![s.clone()]);
    let x = Variable::new("x", s.clone());

    let mut structure = Structure::new();
    structure.set_sort(&s, SortTable::int_range(1, 3));
    structure.make_true(&p, vec![int(1)]).unwrap();
    structure.make_true(&p, vec![int(2)]).unwrap();
    structure.close_predicate(&p);

    // 2 = #{x : P(x)}
    let mut theory = Theory::new();
    theory.add_sentence(Formula::aggregate(
        Term::int(2),
        CompType::Eq,
        AggFunction::Card,
        SetExpr::counting(vec![x.clone()], p.apply(vec![x.term()])),
    ));
    let ground = Engine::new(Options::default()).ground(&theory, &structure).unwrap();
    assert!(ground.clauses().is_empty());
    assert!(!ground.is_unsat());
}

#[test]
fn true_disjunct_adds_nothing() {
    common::init_logging();
    let a = Predicate::new("A", vec![]);
    let b = Predicate::new("B", vec![]);
    let mut structure = Structure::new();
    structure.make_false(&a, vec![]).unwrap();
    structure.make_true(&b, vec![]).unwrap();

    let mut theory = Theory::new();
    theory.add_sentence(a.apply(vec![]).or(b.apply(vec![])));

    let (ground, stats) = Engine::new(Options::default())
        .ground_with_stats(&theory, &structure)
        .unwrap();
    assert!(ground.clauses().is_empty());
    assert_eq!(stats.num_atoms(), 0);
    assert_eq!(stats.num_tseitins(), 0);
}

#[test]
fn false_conjunct_makes_the_theory_unsatisfiable() {
    common::init_logging();
    let a = Predicate::new("A", vec![]);
    let b = Predicate::new("B", vec![]);
    let mut structure = Structure::new();
    structure.make_false(&a, vec![]).unwrap();

    let mut theory = Theory::new();
    theory.add_sentence(a.apply(vec![]).and(b.apply(vec![])));

    let (ground, stats) = Engine::new(Options::default())
        .ground_with_stats(&theory, &structure)
        .unwrap();
    assert!(ground.is_unsat());
    assert!(stats.is_unsat());
    assert_eq!(ground.clauses().len(), 2);
    let unsat = ground.clauses()[0][0];
    assert_eq!(ground.clauses()[1], vec![-unsat]);
    // B is never looked at
    assert_eq!(stats.num_atoms(), 0);
    assert!(ground
        .translator()
        .lookup_atom(&Symbol::Pred(b), &[])
        .is_none());
}

#[test]
fn unsatisfiable_sentences_stop_the_grounding() {
    let a = Predicate::new("A", vec![]);
    let b = Predicate::new("B", vec![]);
    let mut structure = Structure::new();
    structure.make_false(&a, vec![]).unwrap();

    let mut theory = Theory::new();
    theory.add_sentence(a.apply(vec![]));
    theory.add_sentence(b.apply(vec![]));

    let ground = Engine::new(Options::default()).ground(&theory, &structure).unwrap();
    assert!(ground.is_unsat());
    assert!(ground.translator().lookup_atom(&Symbol::Pred(b.clone()), &[]).is_none());

    let options = Options {
        stop_on_unsat: false,
        ..Options::default()
    };
    let ground = Engine::new(options).ground(&theory, &structure).unwrap();
    assert!(ground.is_unsat());
    let b1 = ground.translator().lookup_atom(&Symbol::Pred(b), &[]).unwrap();
    assert!(ground.clauses().contains(&vec![b1]));
}

#[test]
fn grounding_preserves_models() {
    common::init_logging();
    let s = Sort::new("S");
    let p = Predicate::new("P", vec![s.clone()]);
    let q = Predicate::new("Q", vec![s.clone(), s.clone()]);
    let x = Variable::new("x", s.clone());
    let y = Variable::new("y", s.clone());

    let mut structure = Structure::new();
    structure.set_sort(&s, SortTable::int_range(1, 2));
    structure.make_true(&q, vec![int(1), int(1)]).unwrap();

    // !x: P(x) => ?y: Q(x,y) & ~P(y)
    let sentence = Formula::forall(
        vec![x.clone()],
        p.apply(vec![x.term()]).implies(Formula::exists(
            vec![y.clone()],
            q.apply(vec![x.term(), y.term()]).and(p.apply(vec![y.term()]).not()),
        )),
    );
    let mut theory = Theory::new();
    theory.add_sentence(sentence.clone());

    let ground = Engine::new(Options::default()).ground(&theory, &structure).unwrap();
    common::assert_equivalent(
        &ground,
        &structure,
        &[Symbol::Pred(p), Symbol::Pred(q)],
        &[sentence],
    );
}

#[test]
fn equivalences_preserve_models() {
    let s = Sort::new("S");
    let p = Predicate::new("P", vec![s.clone()]);
    let q = Predicate::new("Q", vec![s.clone()]);
    let x = Variable::new("x", s.clone());

    let mut structure = Structure::new();
    structure.set_sort(&s, SortTable::int_range(1, 3));
    structure.make_true(&q, vec![int(2)]).unwrap();
    structure.make_false(&q, vec![int(3)]).unwrap();

    let sentence = Formula::forall(
        vec![x.clone()],
        p.apply(vec![x.term()]).iff(q.apply(vec![x.term()])),
    );
    let mut theory = Theory::new();
    theory.add_sentence(sentence.clone());

    let ground = Engine::new(Options::default()).ground(&theory, &structure).unwrap();
    common::assert_equivalent(
        &ground,
        &structure,
        &[Symbol::Pred(p), Symbol::Pred(q)],
        &[sentence],
    );
}
