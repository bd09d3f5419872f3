//! Aggregate formulas over three-valued sets

mod common;

use ground_rs::ast::{AggFunction, CompType, Definition, Formula, Predicate, Rule, SetExpr, Sort, Symbol, Term, Theory, Variable};
use ground_rs::engine::{Engine, Options};
use ground_rs::structure::{DomainElement, SortTable, Structure};
use ground_rs::theory::{GroundRule, GroundTheory};
use ground_rs::{GroundError, Lit};

fn int(i: i64) -> DomainElement {
    DomainElement::Int(i)
}

struct Fixture {
    p: Predicate,
    x: Variable,
    structure: Structure,
}

fn fixture() -> Fixture {
    let s = Sort::new("S");
    let p = Predicate::new("P", vec![s.clone()]);
    let x = Variable::new("x", s.clone());
    let mut structure = Structure::new();
    structure.set_sort(&s, SortTable::int_range(1, 3));
    Fixture { p, x, structure }
}

impl Fixture {
    /// `{x : P(x) : x}`
    fn weighted(&self) -> SetExpr {
        SetExpr::quantified(vec![self.x.clone()], self.p.apply(vec![self.x.term()]), self.x.term())
    }

    fn ground(&self, sentence: Formula) -> GroundTheory {
        let mut theory = Theory::new();
        theory.add_sentence(sentence);
        Engine::new(Options::default()).ground(&theory, &self.structure).unwrap()
    }

    /// Checks the single unit clause against `expected` for every value of P(1..3)
    fn check(&self, ground: &GroundTheory, expected: impl Fn([bool; 3]) -> bool) {
        assert_eq!(ground.clauses().len(), 1, "{}", ground);
        assert_eq!(ground.clauses()[0].len(), 1, "{}", ground);
        let top = ground.clauses()[0][0];
        let p = Symbol::Pred(self.p.clone());
        let atoms: Vec<Option<Lit>> = (1..=3)
            .map(|i| ground.translator().lookup_atom(&p, &[int(i)]))
            .collect();
        for mask in 0u32..8 {
            let values = [mask & 1 == 1, mask & 2 == 2, mask & 4 == 4];
            let known = |i: usize| match self.structure.truth_value(&p, &[int(i as i64 + 1)]) {
                ground_rs::structure::TruthValue::True => true,
                ground_rs::structure::TruthValue::False => false,
                ground_rs::structure::TruthValue::Unknown => values[i],
            };
            let effective = [known(0), known(1), known(2)];
            let assign = |atom: Lit| {
                atoms
                    .iter()
                    .position(|a| *a == Some(atom))
                    .map(|i| effective[i])
                    .unwrap_or(false)
            };
            assert_eq!(
                ground.translator().eval_lit(top, &assign),
                Some(expected(effective)),
                "P = {:?}\n{}",
                effective,
                ground
            );
        }
    }
}

fn sum(values: [bool; 3]) -> i64 {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v)
        .map(|(i, _)| i as i64 + 1)
        .sum()
}

#[test]
fn sum_bound_becomes_one_aggregate() {
    common::init_logging();
    let fx = fixture();
    // 4 =< sum{x : P(x) : x}
    let ground = fx.ground(Formula::aggregate(Term::int(4), CompType::Leq, AggFunction::Sum, fx.weighted()));
    assert_eq!(ground.sets().len(), 1);
    assert_eq!(ground.aggregates().len(), 1);
    fx.check(&ground, |v| sum(v) >= 4);
}

#[test]
fn certain_members_go_to_the_true_weights() {
    let mut fx = fixture();
    fx.structure.make_true(&fx.p, vec![int(3)]).unwrap();
    let ground = fx.ground(Formula::aggregate(Term::int(4), CompType::Lt, AggFunction::Sum, fx.weighted()));
    assert_eq!(ground.sets()[0].literals.len(), 2);
    assert_eq!(ground.sets()[0].trueweights, vec![3.0]);
    fx.check(&ground, |v| sum(v) > 4);
}

#[test]
fn equality_is_split_into_two_bounds() {
    let fx = fixture();
    let ground = fx.ground(Formula::aggregate(Term::int(3), CompType::Eq, AggFunction::Sum, fx.weighted()));
    assert_eq!(ground.aggregates().len(), 2);
    fx.check(&ground, |v| sum(v) == 3);
}

#[test]
fn negated_cardinality() {
    let fx = fixture();
    let card = Formula::aggregate(
        Term::int(2),
        CompType::Leq,
        AggFunction::Card,
        SetExpr::counting(vec![fx.x.clone()], fx.p.apply(vec![fx.x.term()])),
    );
    let ground = fx.ground(card.not());
    fx.check(&ground, |v| v.iter().filter(|b| **b).count() < 2);
}

#[test]
fn maximum_keeps_only_members_above_the_certain_ones() {
    let mut fx = fixture();
    fx.structure.make_true(&fx.p, vec![int(2)]).unwrap();
    let ground = fx.ground(Formula::aggregate(Term::int(3), CompType::Leq, AggFunction::Max, fx.weighted()));
    assert_eq!(ground.sets().len(), 1);
    assert_eq!(ground.sets()[0].weights, vec![3.0]);
    fx.check(&ground, |v| v[2]);
}

#[test]
fn ranges_decide_aggregates() {
    let mut fx = fixture();
    fx.structure.make_true(&fx.p, vec![int(3)]).unwrap();
    // sum is at least 3 whatever P(1) and P(2) are
    let mut theory = Theory::new();
    theory.add_sentence(Formula::aggregate(Term::int(3), CompType::Leq, AggFunction::Sum, fx.weighted()));
    let (ground, stats) = Engine::new(Options::default())
        .ground_with_stats(&theory, &fx.structure)
        .unwrap();
    assert!(ground.clauses().is_empty());
    assert!(ground.sets().is_empty());
    assert_eq!(stats.num_tseitins(), 0);
}

#[test]
fn string_bounds_are_rejected() {
    let fx = fixture();
    let mut theory = Theory::new();
    theory.add_sentence(Formula::aggregate(Term::string("a"), CompType::Leq, AggFunction::Sum, fx.weighted()));
    let result = Engine::new(Options::default()).ground(&theory, &fx.structure);
    assert!(matches!(result, Err(GroundError::InvalidArgument(_))));
}

#[test]
fn aggregate_rule_bodies() {
    let fx = fixture();
    let q = Predicate::new("Q", vec![]);
    // Q <- 2 =< #{x : P(x)}
    let mut theory = Theory::new();
    theory.add_definition(Definition::new(vec![Rule::new(
        vec![],
        q.clone(),
        vec![],
        Formula::aggregate(
            Term::int(2),
            CompType::Leq,
            AggFunction::Card,
            SetExpr::counting(vec![fx.x.clone()], fx.p.apply(vec![fx.x.term()])),
        ),
    )]));
    let ground = Engine::new(Options::default()).ground(&theory, &fx.structure).unwrap();
    let head = ground
        .translator()
        .lookup_atom(&Symbol::Pred(q), &[])
        .unwrap();
    match ground.definitions()[0].rule(head) {
        Some(GroundRule::Agg {
            func: AggFunction::Card,
            lower: true,
            bound,
            ..
        }) => assert_eq!(*bound, 2.0),
        other => panic!("unexpected rule {:?}", other),
    }
}
