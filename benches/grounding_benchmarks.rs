use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ground_rs::ast::{AggFunction, CompType, Definition, Formula, Predicate, Rule, SetExpr, Sort, Term, Theory, Variable};
use ground_rs::engine::{Engine, Options};
use ground_rs::structure::{DomainElement, SortTable, Structure};

/// Pigeonhole problem: every pigeon in a hole, no two pigeons in one hole
fn pigeonhole_problem(pigeons: i64, holes: i64) -> (Theory, Structure) {
    let pigeon = Sort::new("pigeon");
    let hole = Sort::new("hole");
    let sits = Predicate::new("In", vec![pigeon.clone(), hole.clone()]);
    let p = Variable::new("p", pigeon.clone());
    let q = Variable::new("q", pigeon.clone());
    let h = Variable::new("h", hole.clone());

    let mut structure = Structure::new();
    structure.set_sort(&pigeon, SortTable::int_range(1, pigeons));
    structure.set_sort(&hole, SortTable::int_range(1, holes));

    let mut theory = Theory::new();
    theory.add_sentence(Formula::forall(
        vec![p.clone()],
        Formula::exists(vec![h.clone()], sits.apply(vec![p.term(), h.term()])),
    ));
    theory.add_sentence(Formula::forall(
        vec![p.clone(), q.clone(), h.clone()],
        sits.apply(vec![p.term(), h.term()])
            .and(sits.apply(vec![q.term(), h.term()]))
            .implies(p.term().equals(q.term())),
    ));
    (theory, structure)
}

/// Reachability over a chain graph, as a recursive definition
fn reachability_problem(nodes: i64) -> (Theory, Structure) {
    let node = Sort::new("node");
    let edge = Predicate::new("E", vec![node.clone(), node.clone()]);
    let reach = Predicate::new("R", vec![node.clone(), node.clone()]);
    let x = Variable::new("x", node.clone());
    let y = Variable::new("y", node.clone());
    let z = Variable::new("z", node.clone());

    let mut structure = Structure::new();
    structure.set_sort(&node, SortTable::int_range(1, nodes));
    for i in 1..nodes {
        structure
            .make_true(&edge, vec![DomainElement::Int(i), DomainElement::Int(i + 1)])
            .unwrap();
    }
    structure.close_predicate(&edge);

    let mut theory = Theory::new();
    theory.add_definition(Definition::new(vec![
        Rule::new(
            vec![x.clone(), y.clone()],
            reach.clone(),
            vec![x.term(), y.term()],
            edge.apply(vec![x.term(), y.term()]),
        ),
        Rule::new(
            vec![x.clone(), y.clone(), z.clone()],
            reach.clone(),
            vec![x.term(), y.term()],
            edge.apply(vec![x.term(), z.term()]).and(reach.apply(vec![z.term(), y.term()])),
        ),
    ]));
    (theory, structure)
}

/// At least two chosen items of total weight at most `capacity`; items weigh their index
fn knapsack_problem(items: i64, capacity: i64) -> (Theory, Structure) {
    let item = Sort::new("item");
    let chosen = Predicate::new("Chosen", vec![item.clone()]);
    let x = Variable::new("x", item.clone());

    let mut structure = Structure::new();
    structure.set_sort(&item, SortTable::int_range(1, items));

    let mut theory = Theory::new();
    theory.add_sentence(Formula::aggregate(
        Term::int(capacity),
        CompType::Geq,
        AggFunction::Sum,
        SetExpr::quantified(vec![x.clone()], chosen.apply(vec![x.term()]), x.term()),
    ));
    theory.add_sentence(Formula::aggregate(
        Term::int(2),
        CompType::Leq,
        AggFunction::Card,
        SetExpr::counting(vec![x.clone()], chosen.apply(vec![x.term()])),
    ));
    (theory, structure)
}

fn grounding_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("grounding");

    for (pigeons, holes) in [(5, 4), (10, 9), (20, 19)] {
        let (theory, structure) = pigeonhole_problem(pigeons, holes);
        group.bench_with_input(
            BenchmarkId::new("pigeonhole", format!("{}x{}", pigeons, holes)),
            &(theory, structure),
            |b, (theory, structure)| {
                let engine = Engine::new(Options::default());
                b.iter(|| black_box(engine.ground(theory, structure)));
            },
        );
    }

    for nodes in [10, 25] {
        let (theory, structure) = reachability_problem(nodes);
        group.bench_with_input(BenchmarkId::new("reachability", nodes), &(theory, structure), |b, (theory, structure)| {
            let engine = Engine::new(Options::default());
            b.iter(|| black_box(engine.ground(theory, structure)));
        });
    }

    let (theory, structure) = knapsack_problem(50, 100);
    group.bench_function("knapsack_50", |b| {
        let engine = Engine::new(Options::default());
        b.iter(|| black_box(engine.ground(&theory, &structure)));
    });

    group.finish();
}

fn lazy_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("lazy");

    let (theory, structure) = pigeonhole_problem(20, 19);
    for lazy in [false, true] {
        let options = Options {
            lazy_quantifiers: lazy,
            ..Options::default()
        };
        group.bench_with_input(BenchmarkId::new("pigeonhole_20x19", lazy), &options, |b, options| {
            let engine = Engine::new(options.clone());
            b.iter(|| black_box(engine.ground(&theory, &structure)));
        });
    }

    group.finish();
}

criterion_group!(benches, grounding_benchmarks, lazy_benchmarks);
criterion_main!(benches);
