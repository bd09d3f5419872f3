//! Textual debug form of a ground theory

use std::fmt;

use crate::theory::{CpReification, GroundAggregate, GroundRule, GroundSet, GroundTheory, RuleKind};
use crate::translator::{CpBound, CpTerm, GroundTranslator, TermTranslator};
use crate::Lit;

/// Prints an integral weight without a fractional part
fn fmt_num(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{}", x)
    }
}

fn lits(tr: &GroundTranslator, lits: &[Lit], sep: &str) -> String {
    lits.iter().map(|&l| tr.print_lit(l)).collect::<Vec<_>>().join(sep)
}

fn fmt_set(f: &mut fmt::Formatter<'_>, tr: &GroundTranslator, set: &GroundSet) -> fmt::Result {
    let members: Vec<String> = set
        .literals
        .iter()
        .zip(&set.weights)
        .map(|(&l, &w)| format!("({},{})", tr.print_lit(l), fmt_num(w)))
        .chain(set.trueweights.iter().map(|&w| format!("(true,{})", fmt_num(w))))
        .collect();
    writeln!(f, "{} = [{}]", set.id, members.join(","))
}

fn bound_cmp(lower: bool) -> &'static str {
    if lower {
        "=<"
    } else {
        ">="
    }
}

fn fmt_aggregate(f: &mut fmt::Formatter<'_>, tr: &GroundTranslator, agg: &GroundAggregate) -> fmt::Result {
    writeln!(
        f,
        "{} {} {} {} {}({}).",
        tr.print_lit(agg.head),
        agg.arrow,
        fmt_num(agg.bound),
        bound_cmp(agg.lower),
        agg.func,
        agg.set
    )
}

fn cp_term(terms: &TermTranslator, term: &CpTerm) -> String {
    match term {
        CpTerm::Var(v) => terms.print_var(*v),
        CpTerm::Sum(a, b) => format!("sum[{},{}]", terms.print_var(*a), terms.print_var(*b)),
        CpTerm::WeightedSum(vars, weights) => {
            let parts: Vec<String> = vars
                .iter()
                .zip(weights)
                .map(|(v, w)| format!("({},{})", terms.print_var(*v), w))
                .collect();
            format!("wsum[{}]", parts.join(","))
        }
    }
}

fn fmt_cp(f: &mut fmt::Formatter<'_>, tr: &GroundTranslator, terms: &TermTranslator, cp: &CpReification) -> fmt::Result {
    let right = match cp.right {
        CpBound::Const(c) => c.to_string(),
        CpBound::Var(v) => terms.print_var(v),
    };
    writeln!(
        f,
        "{} {} {} {} {}.",
        tr.print_lit(cp.head),
        cp.arrow,
        cp_term(terms, &cp.left),
        cp.comp,
        right
    )
}

fn fmt_rule(f: &mut fmt::Formatter<'_>, tr: &GroundTranslator, rule: &GroundRule) -> fmt::Result {
    let head = tr.print_lit(rule.head());
    match rule {
        GroundRule::Pc { kind, body, .. } => {
            let body = match (kind, body.is_empty()) {
                (RuleKind::Conj, true) => "true".to_string(),
                (RuleKind::Disj, true) => "false".to_string(),
                (RuleKind::Conj, false) => lits(tr, body, " & "),
                (RuleKind::Disj, false) => lits(tr, body, " | "),
            };
            writeln!(f, "  {} <- {}.", head, body)
        }
        GroundRule::Agg {
            set,
            func,
            lower,
            bound,
            ..
        } => writeln!(f, "  {} <- {} {} {}({}).", head, fmt_num(*bound), bound_cmp(*lower), func, set),
    }
}

impl fmt::Display for GroundTheory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tr = self.translator();
        for clause in self.clauses() {
            writeln!(f, "{}", lits(tr, clause, " | "))?;
        }
        for set in self.sets() {
            fmt_set(f, tr, set)?;
        }
        for agg in self.aggregates() {
            fmt_aggregate(f, tr, agg)?;
        }
        for cp in self.cp_reifications() {
            fmt_cp(f, tr, self.terms(), cp)?;
        }
        for def in self.definitions() {
            writeln!(f, "{{ // {}", def.id())?;
            for rule in def.rules() {
                fmt_rule(f, tr, rule)?;
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AggFunction, CompType, Function, Predicate, Sort, Symbol};
    use crate::structure::DomainElement;
    use crate::translator::{CpDomain, TsType};

    #[test]
    fn numbers_drop_integral_fractions() {
        assert_eq!(fmt_num(2.0), "2");
        assert_eq!(fmt_num(-3.0), "-3");
        assert_eq!(fmt_num(0.5), "0.5");
        assert_eq!(fmt_num(f64::INFINITY), "inf");
    }

    #[test]
    fn prints_every_kind_of_object() {
        let s = Sort::new("S");
        let p = Symbol::Pred(Predicate::new("P", vec![s.clone()]));
        let q = Symbol::Pred(Predicate::new("Q", vec![]));
        let mut th = GroundTheory::materialized();
        let tr = th.translator_mut();
        let p1 = tr.translate_atom(&p, vec![DomainElement::Int(1)]);
        let p2 = tr.translate_atom(&p, vec![DomainElement::Int(2)]);
        let q0 = tr.translate_atom(&q, vec![]);
        let set = tr.translate_set(vec![p1, p2], vec![1.0, 1.0], vec![]);
        let agg = tr.translate_agg(2.0, CompType::Leq, AggFunction::Card, set, TsType::Eq);
        th.add_clause(vec![p1, -q0]);
        th.add_unit(agg);

        let f = Function::new("f", vec![s.clone()], s);
        let v = th.terms_mut().translate(&f, vec![DomainElement::Int(1)], CpDomain { lo: 0, hi: 3 });
        let cp = th.translator_mut().translate_cp(CpTerm::Var(v), CompType::Leq, CpBound::Const(2), TsType::Impl);
        th.add_unit(cp);

        let def = th.new_definition(vec![q.clone()]);
        th.add_rule(def, q0, vec![p1, -p2], true, false);

        let text = th.to_string();
        assert!(text.contains("P(1) | ~Q\n"), "{}", text);
        assert!(text.contains("set_0 = [(P(1),1),(P(2),1)]\n"), "{}", text);
        assert!(text.contains(&format!("tseitin_{} <=> 2 =< card(set_0).", agg)), "{}", text);
        assert!(text.contains(&format!("tseitin_{} => f(1) =< 2.", cp)), "{}", text);
        assert!(text.contains("  Q <- P(1) & ~P(2).\n"), "{}", text);
    }
}
