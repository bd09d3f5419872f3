//! Rule and definition grounders

use std::rc::Rc;

use log::debug;

use crate::ast::{CompType, Symbol};
use crate::grounder::formula::{AggGrounder, AggState};
use crate::grounder::generator::InstGenerator;
use crate::grounder::lazy::LazyRuleGrounder;
use crate::grounder::{targets, Conn, ConjOrDisj, FormulaGrounder, Grounding, VarSlot};
use crate::symbolic::Query;
use crate::theory::DefId;
use crate::translator::one_sided_bound;
use crate::Lit;

/// Body of a rule
pub enum RuleBody {
    /// Any formula, existentially closed over the variables not in the head
    Formula(Box<dyn FormulaGrounder>),
    /// A single aggregate formula, grounded into an aggregate rule when it
    /// compares one-sidedly
    Agg(AggGrounder),
}

/// Grounds one rule `!x̄: P(x̄) <- φ`
///
/// Head arguments are distinct variables, so every head instance binds
/// exactly the head slots.
pub struct RuleGrounder {
    head: Symbol,
    head_slots: Vec<VarSlot>,
    head_generator: InstGenerator,
    body: RuleBody,
    recursive: bool,
}

impl RuleGrounder {
    /// Creates a rule grounder
    ///
    /// `head_generator` enumerates the head instances whose body can be
    /// true; `recursive` tells whether the body mentions a symbol of the
    /// rule's own definition.
    pub fn new(
        head: Symbol,
        head_slots: Vec<VarSlot>,
        head_generator: InstGenerator,
        body: RuleBody,
        recursive: bool,
    ) -> Self {
        Self {
            head,
            head_slots,
            head_generator,
            body,
            recursive,
        }
    }

    /// The defined symbol
    pub fn head(&self) -> &Symbol {
        &self.head
    }

    /// Slots of the head variables, in argument order
    pub fn head_slots(&self) -> &[VarSlot] {
        &self.head_slots
    }

    /// Query deciding whether a bound head instance can have a true body
    pub fn head_filter(&self) -> &Query {
        self.head_generator.filter()
    }

    /// Grounds every head instance into definition `def`
    pub fn run(&self, g: &mut Grounding<'_>, def: DefId) {
        let mut cursor = match self.head_generator.start(g.structure()) {
            Ok(cursor) => cursor,
            Err(e) => return g.fail(e),
        };
        let saved = g.env.snapshot(&self.head_slots);
        while self.head_generator.next(g, &mut cursor) {
            self.ground_instance(g, def, None);
            if g.stopped() {
                break;
            }
        }
        g.env.reinstate(&saved);
    }

    /// Grounds the body for the bound head slots and merges the rule
    ///
    /// The head atom is only translated once the body is known not to be
    /// false, unless the caller already has it.
    pub(crate) fn ground_instance(&self, g: &mut Grounding<'_>, def: DefId, head: Option<Lit>) {
        match &self.body {
            RuleBody::Agg(agg) => self.ground_agg(g, def, head, agg),
            RuleBody::Formula(body) => {
                let mut out = ConjOrDisj::default();
                body.run(g, &mut out);
                self.add_pc(g, def, head, out);
            }
        }
    }

    fn head_lit(&self, g: &mut Grounding<'_>, head: Option<Lit>) -> Lit {
        if let Some(lit) = head {
            return lit;
        }
        let tuple = self.head_slots.iter().map(|s| g.env.get(*s).clone()).collect();
        g.theory_mut().translator_mut().translate_atom(&self.head, tuple)
    }

    fn add_pc(&self, g: &mut Grounding<'_>, def: DefId, head: Option<Lit>, out: ConjOrDisj) {
        if out.is_false() {
            return;
        }
        let head = self.head_lit(g, head);
        let conj = out.conn == Conn::Conj || out.literals.len() == 1;
        g.theory_mut().add_rule(def, head, out.literals, conj, self.recursive);
    }

    fn ground_agg(&self, g: &mut Grounding<'_>, def: DefId, head: Option<Lit>, agg: &AggGrounder) {
        let op = if agg.sign().is_pos() { agg.op() } else { agg.op().negate() };
        if matches!(op, CompType::Eq | CompType::Neq) {
            let mut out = ConjOrDisj::default();
            agg.run(g, &mut out);
            return self.add_pc(g, def, head, out);
        }
        match agg.ground_parts(g) {
            AggState::Decided(value) => self.add_pc(g, def, head, ConjOrDisj::new(if value { Conn::Conj } else { Conn::Disj })),
            AggState::Pending { set, bound } => {
                let (lower, bound) = one_sided_bound(op, bound);
                let head = self.head_lit(g, head);
                debug!(target: targets::GROUNDER, "aggregate rule for {} over {}", head, set);
                g.theory_mut()
                    .add_agg_rule(def, head, set, agg.func(), lower, bound, self.recursive);
            }
        }
    }
}

/// Grounds one definition
pub struct DefinitionGrounder {
    symbols: Vec<Symbol>,
    rules: Vec<Rc<RuleGrounder>>,
    lazy: bool,
}

impl DefinitionGrounder {
    /// Creates the grounder of a definition of `symbols`
    ///
    /// Lazy definitions ground a rule instance only once its head atom is
    /// translated.
    pub fn new(symbols: Vec<Symbol>, rules: Vec<RuleGrounder>, lazy: bool) -> Self {
        Self {
            symbols,
            rules: rules.into_iter().map(Rc::new).collect(),
            lazy,
        }
    }

    /// Number of rules
    pub fn num_rules(&self) -> usize {
        self.rules.len()
    }

    /// Opens a new ground definition and grounds (or watches) its rules
    pub fn run(&self, g: &mut Grounding<'_>) -> DefId {
        let def = g.theory_mut().new_definition(self.symbols.clone());
        for rule in &self.rules {
            if g.stopped() {
                break;
            }
            if self.lazy {
                LazyRuleGrounder::new(rule.clone()).register(g, def);
            } else {
                rule.run(g, def);
            }
        }
        def
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Predicate, Sort};
    use crate::grounder::formula::ConstGrounder;
    use crate::structure::{SortTable, Structure};
    use crate::theory::{GroundRule, GroundTheory, RuleKind};

    struct AtomOf {
        p: Symbol,
        slot: VarSlot,
    }

    impl FormulaGrounder for AtomOf {
        fn run(&self, g: &mut Grounding<'_>, out: &mut ConjOrDisj) {
            let x = g.env.get(self.slot).clone();
            let lit = g.theory_mut().translator_mut().translate_atom(&self.p, vec![x]);
            out.set_literal(lit);
        }
    }

    fn setup() -> (Sort, Symbol, Symbol, Structure) {
        let s = Sort::new("S");
        let p = Symbol::Pred(Predicate::new("P", vec![s.clone()]));
        let q = Symbol::Pred(Predicate::new("Q", vec![s.clone()]));
        let mut structure = Structure::new();
        structure.set_sort(&s, SortTable::int_range(1, 2));
        (s, p, q, structure)
    }

    #[test]
    fn rules_merge_per_head() {
        let (s, p, q, structure) = setup();
        let x = VarSlot(0);
        let generator = || InstGenerator::new(vec![(x, s.clone())], Query::Const(true), &structure);
        let from_q = RuleGrounder::new(
            p.clone(),
            vec![x],
            generator(),
            RuleBody::Formula(Box::new(AtomOf { p: q.clone(), slot: x })),
            false,
        );
        let never = RuleGrounder::new(
            p.clone(),
            vec![x],
            generator(),
            RuleBody::Formula(Box::new(ConstGrounder::new(false))),
            false,
        );
        let def = DefinitionGrounder::new(vec![p.clone()], vec![from_q, never], false);
        assert_eq!(def.num_rules(), 2);

        let mut g = Grounding::new(&structure, GroundTheory::materialized());
        let id = def.run(&mut g);
        let theory = g.theory();
        let ground = theory.definition(id);
        assert_eq!(ground.num_rules(), 2);
        let p1 = theory.translator().lookup_atom(&p, &[crate::structure::DomainElement::Int(1)]).unwrap();
        match ground.rule(p1) {
            Some(GroundRule::Pc { kind, body, .. }) => {
                assert_eq!(*kind, RuleKind::Conj);
                assert_eq!(theory.translator().print_lit(body[0]), "Q(1)");
            }
            other => panic!("unexpected rule {:?}", other),
        }
    }

    #[test]
    fn false_bodies_leave_the_head_untranslated() {
        let (s, p, _, structure) = setup();
        let x = VarSlot(0);
        let rule = RuleGrounder::new(
            p.clone(),
            vec![x],
            InstGenerator::new(vec![(x, s)], Query::Const(true), &structure),
            RuleBody::Formula(Box::new(ConstGrounder::new(false))),
            false,
        );
        let def = DefinitionGrounder::new(vec![p.clone()], vec![rule], false);
        let mut g = Grounding::new(&structure, GroundTheory::materialized());
        let id = def.run(&mut g);
        assert_eq!(g.theory().definition(id).num_rules(), 0);
        assert!(g.theory().translator().atoms_of(&p).is_empty());
    }
}
