//! Lazy grounders
//!
//! A lazy existential grounds instances only until it finds one that is
//! not false, and names the rest of the disjunction by a Tseitin with a
//! lazy body. The residue is expanded one instance at a time, and only
//! once the Tseitin becomes reachable from the theory.
//!
//! A lazy rule grounds the instance of a rule for a head atom only when
//! the literal translator first mints that atom.

use std::rc::Rc;

use log::{debug, trace};

use crate::grounder::environment::VarEnv;
use crate::grounder::generator::{Cursor, InstGenerator};
use crate::grounder::rule::RuleGrounder;
use crate::grounder::{targets, Conn, ConjOrDisj, FormulaGrounder, Grounding};
use crate::symbolic::{InstanceChecker, Query};
use crate::theory::DefId;
use crate::translator::{TsType, WatcherId};
use crate::Lit;

struct LazyQuantCore {
    generator: InstGenerator,
    body: Box<dyn FormulaGrounder>,
    ts: TsType,
}

/// Remaining instances of a lazy existential
pub(crate) struct LazyResidue {
    core: Rc<LazyQuantCore>,
    cursor: Cursor,
    env: VarEnv,
    lit: Lit,
}

/// Existential quantification grounded one instance at a time
pub struct LazyQuantGrounder {
    core: Rc<LazyQuantCore>,
    certainly_true: Query,
    certainly_false: Query,
}

impl LazyQuantGrounder {
    /// Creates a lazy existential over the instances of `generator`
    ///
    /// Instance results are named by Tseitins of type `ts`.
    pub fn new(
        generator: InstGenerator,
        body: Box<dyn FormulaGrounder>,
        certainly_true: Query,
        certainly_false: Query,
        ts: TsType,
    ) -> Self {
        Self {
            core: Rc::new(LazyQuantCore { generator, body, ts }),
            certainly_true,
            certainly_false,
        }
    }
}

/// Outcome of looking for the next undecided instance
enum Step {
    /// Some instance is true
    True,
    /// No instance left
    Exhausted,
    /// The literal of the next undecided instance
    Instance(Lit),
}

fn step(core: &LazyQuantCore, g: &mut Grounding<'_>, cursor: &mut Cursor) -> Step {
    let mut child = ConjOrDisj::default();
    while core.generator.next(g, cursor) {
        core.body.run(g, &mut child);
        match child.decided() {
            Some(true) => return Step::True,
            Some(false) => {}
            None => return Step::Instance(g.reify(&mut child, core.ts)),
        }
        if g.stopped() {
            break;
        }
    }
    Step::Exhausted
}

/// Names the instances after the current one by a fresh lazy Tseitin, if any remain
fn defer(core: &Rc<LazyQuantCore>, g: &mut Grounding<'_>, mut cursor: Cursor) -> Option<Lit> {
    if !core.generator.has_next(g, &mut cursor) {
        return None;
    }
    let t = g.theory_mut().translator_mut().new_lone_tseitin();
    let residue = LazyResidue {
        core: core.clone(),
        cursor,
        env: g.env.clone(),
        lit: t,
    };
    let handle = g.add_residue(residue);
    g.theory_mut().translator_mut().bind_lazy(t, handle, TsType::Impl);
    trace!(target: targets::GROUNDER, "deferred remaining instances to {}", t);
    Some(t)
}

impl FormulaGrounder for LazyQuantGrounder {
    fn run(&self, g: &mut Grounding<'_>, out: &mut ConjOrDisj) {
        let structure = g.structure();
        if self.certainly_true.check(structure, &mut g.env) {
            return out.set_true();
        }
        if self.certainly_false.check(structure, &mut g.env) {
            return out.set_false();
        }
        let mut cursor = match self.core.generator.start(structure) {
            Ok(cursor) => cursor,
            Err(e) => {
                g.fail(e);
                return out.set_true();
            }
        };
        let slots: Vec<_> = self.core.generator.vars().iter().map(|(s, _)| *s).collect();
        let saved = g.env.snapshot(&slots);
        match step(&self.core, g, &mut cursor) {
            Step::True => out.set_true(),
            Step::Exhausted => out.set_false(),
            Step::Instance(lit) => {
                *out = ConjOrDisj::new(Conn::Disj);
                out.put(lit);
                if let Some(t) = defer(&self.core, g, cursor) {
                    out.put(t);
                }
            }
        }
        g.env.reinstate(&saved);
    }
}

/// Expands one residue: `t => inst | t'`, `t => inst` or `~t`
pub(crate) fn expand(g: &mut Grounding<'_>, residue: LazyResidue) {
    let LazyResidue {
        core,
        mut cursor,
        env,
        lit,
    } = residue;
    let outer = std::mem::replace(&mut g.env, env);
    match step(&core, g, &mut cursor) {
        Step::True => debug!(target: targets::GROUNDER, "residue {} satisfied by a true instance", lit),
        Step::Exhausted => g.theory_mut().add_clause(vec![-lit]),
        Step::Instance(inst) => {
            let mut clause = vec![-lit, inst];
            if let Some(t) = defer(&core, g, cursor) {
                clause.push(t);
            }
            g.theory_mut().add_clause(clause);
        }
    }
    g.env = outer;
}

/// Grounds the rule instance of a head atom when the atom is first translated
#[derive(Clone)]
pub(crate) struct Watcher {
    rule: Rc<RuleGrounder>,
    def: DefId,
}

impl Watcher {
    /// Grounds the rule instance for `atom` if its body can be true
    pub(crate) fn fire(&self, g: &mut Grounding<'_>, atom: Lit) {
        let Some(args) = g.theory().translator().args_of(atom).cloned() else {
            return;
        };
        let slots = self.rule.head_slots();
        let saved = g.env.snapshot(slots);
        for (slot, value) in slots.iter().zip(args) {
            g.env.bind(*slot, value);
        }
        let structure = g.structure();
        if self.rule.head_filter().check(structure, &mut g.env) {
            self.rule.ground_instance(g, self.def, Some(atom));
        }
        g.env.reinstate(&saved);
    }
}

/// A rule grounded on demand
pub struct LazyRuleGrounder {
    rule: Rc<RuleGrounder>,
}

impl LazyRuleGrounder {
    /// Wraps a rule grounder
    pub fn new(rule: Rc<RuleGrounder>) -> Self {
        Self { rule }
    }

    /// Watches the head symbol, grounding the instances of atoms already translated
    pub fn register(&self, g: &mut Grounding<'_>, def: DefId) -> WatcherId {
        let watcher = Watcher {
            rule: self.rule.clone(),
            def,
        };
        let id = g.add_watcher(watcher.clone());
        let head = self.rule.head().clone();
        g.theory_mut().translator_mut().add_watcher(&head, id);
        let existing = g.theory().translator().atoms_of(&head).to_vec();
        debug!(target: targets::GROUNDER, "watching {} with {} atoms already translated", head, existing.len());
        for atom in existing {
            watcher.fire(g, atom);
        }
        id
    }
}
