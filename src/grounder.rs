//! Runtime grounders
//!
//! The compiler turns every sentence, definition, term and set into a tree
//! of grounders. Running a formula grounder produces a [`ConjOrDisj`]:
//!
//! - a decided value, encoded as an empty list (`Conj` is true, `Disj` is
//!   false),
//! - a single literal, or
//! - a list of literals tagged with its connective.
//!
//! Composite grounders combine the results of their children lazily: a
//! deciding child short-circuits the node, a child with the same
//! connective is spliced, and only a child that fits neither is named by a
//! Tseitin literal. Grounders on a conjunctive path to the root emit their
//! children as clauses right away instead of collecting them.

pub mod compiler;
pub mod context;
pub mod environment;
pub mod formula;
pub mod generator;
pub mod lazy;
pub mod rewrite;
pub mod rule;
pub mod set;
pub mod term;

pub use compiler::{GrounderFactory, TheoryGrounder};
pub use context::{Component, Context, GenType, GroundingContext};
pub use environment::{SlotTable, VarEnv, VarSlot};
pub use formula::{
    AggGrounder, AggState, AtomGrounder, BoolGrounder, ComparisonGrounder, ConstGrounder, EquivGrounder, QuantGrounder,
};
pub use generator::{Cursor, InstGenerator};
pub use lazy::{LazyQuantGrounder, LazyRuleGrounder};
pub use rewrite::{Leaf, Rewriter};
pub use rule::{DefinitionGrounder, RuleBody, RuleGrounder};
pub use set::{ground_set, EnumSetGrounder, Member, QuantSetGrounder, SetGrounder, SetParts};
pub use term::{ArithTermGrounder, ElementTermGrounder, FuncTermGrounder, GroundTerm, VarTermGrounder};

use log::warn;

use crate::engine::{targets, InterruptHandle};
use crate::error::GroundError;
use crate::structure::Structure;
use crate::theory::{DefId, GroundTheory};
use crate::translator::{LazyHandle, TsType, WatcherId};
use crate::Lit;

/// Connective of a literal list
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Conn {
    /// Conjunction; empty means true
    Conj,
    /// Disjunction; empty means false
    Disj,
}

impl Conn {
    /// The dual connective
    pub fn negate(self) -> Self {
        match self {
            Conn::Conj => Conn::Disj,
            Conn::Disj => Conn::Conj,
        }
    }
}

/// Result of running a formula grounder
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConjOrDisj {
    /// Connective of `literals`
    pub conn: Conn,
    /// The literals
    pub literals: Vec<Lit>,
}

impl Default for ConjOrDisj {
    fn default() -> Self {
        Self::new(Conn::Conj)
    }
}

impl ConjOrDisj {
    /// An empty list with the given connective
    pub fn new(conn: Conn) -> Self {
        Self {
            conn,
            literals: Vec::new(),
        }
    }

    /// Sets the result to a decided value
    pub fn set_value(&mut self, value: bool) {
        self.conn = if value { Conn::Conj } else { Conn::Disj };
        self.literals.clear();
    }

    /// Sets the result to true
    pub fn set_true(&mut self) {
        self.set_value(true);
    }

    /// Sets the result to false
    pub fn set_false(&mut self) {
        self.set_value(false);
    }

    /// Sets the result to a single literal
    pub fn set_literal(&mut self, lit: Lit) {
        self.conn = Conn::Conj;
        self.literals.clear();
        self.literals.push(lit);
    }

    /// Returns true for the decided value true
    pub fn is_true(&self) -> bool {
        self.conn == Conn::Conj && self.literals.is_empty()
    }

    /// Returns true for the decided value false
    pub fn is_false(&self) -> bool {
        self.conn == Conn::Disj && self.literals.is_empty()
    }

    /// The decided value, if any
    pub fn decided(&self) -> Option<bool> {
        self.literals.is_empty().then_some(self.conn == Conn::Conj)
    }

    /// Negates the result in place (De Morgan)
    pub fn negate(&mut self) {
        self.conn = self.conn.negate();
        for l in &mut self.literals {
            *l = -*l;
        }
    }

    /// Appends a literal
    pub fn put(&mut self, lit: Lit) {
        self.literals.push(lit);
    }
}

/// Grounds a formula for the current variable bindings
pub trait FormulaGrounder {
    /// Overwrites `out` with the grounding of the formula
    fn run(&self, g: &mut Grounding<'_>, out: &mut ConjOrDisj);
}

/// Per-run state shared by all grounders
///
/// Owns the variable bindings and the ground theory under construction.
pub struct Grounding<'s> {
    structure: &'s Structure,
    /// Variable bindings
    pub env: VarEnv,
    theory: GroundTheory,
    interrupt: InterruptHandle,
    interrupted: bool,
    error: Option<GroundError>,
    warnings: Vec<String>,
    residues: Vec<Option<lazy::LazyResidue>>,
    watchers: Vec<lazy::Watcher>,
    lazy_expansions: usize,
}

impl<'s> Grounding<'s> {
    /// Creates the runtime state for grounding into `theory`
    pub fn new(structure: &'s Structure, theory: GroundTheory) -> Self {
        Self {
            structure,
            env: VarEnv::default(),
            theory,
            interrupt: InterruptHandle::new(),
            interrupted: false,
            error: None,
            warnings: Vec::new(),
            residues: Vec::new(),
            watchers: Vec::new(),
            lazy_expansions: 0,
        }
    }

    /// Replaces the interrupt handle polled during grounding
    pub fn set_interrupt(&mut self, handle: InterruptHandle) {
        self.interrupt = handle;
    }

    /// The structure grounded against
    pub fn structure(&self) -> &'s Structure {
        self.structure
    }

    /// The ground theory under construction
    pub fn theory(&self) -> &GroundTheory {
        &self.theory
    }

    /// The ground theory under construction, mutably
    pub fn theory_mut(&mut self) -> &mut GroundTheory {
        &mut self.theory
    }

    /// Consumes the state, returning the ground theory
    pub fn into_theory(self) -> GroundTheory {
        self.theory
    }

    /// Polls the interrupt flag; returns true if grounding must stop
    pub fn poll(&mut self) -> bool {
        if !self.interrupted && self.interrupt.is_interrupted() {
            warn!(target: targets::GROUNDER, "grounding interrupted");
            self.interrupted = true;
        }
        self.stopped()
    }

    /// Returns true once grounding was interrupted or failed
    pub fn stopped(&self) -> bool {
        self.interrupted || self.error.is_some() || self.theory.sink_error().is_some()
    }

    /// Returns true if the run was interrupted
    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Records an error and stops grounding; the first error wins
    pub fn fail(&mut self, error: GroundError) {
        warn!(target: targets::GROUNDER, "grounding failed: {}", error);
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Takes the recorded error, including one reported by the sink
    pub fn take_error(&mut self) -> Option<GroundError> {
        self.error.take().or_else(|| self.theory.sink_error().cloned())
    }

    /// Logs and records a warning
    pub fn warn(&mut self, message: String) {
        warn!(target: targets::GROUNDER, "{}", message);
        self.warnings.push(message);
    }

    /// Warnings recorded so far
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Number of lazy residues expanded so far
    pub fn lazy_expansions(&self) -> usize {
        self.lazy_expansions
    }

    /// Names a result by a single literal
    ///
    /// # Panics
    /// Panics on a decided result, which never needs a name.
    pub fn reify(&mut self, out: &mut ConjOrDisj, ts: TsType) -> Lit {
        assert!(out.decided().is_none(), "decided results are never reified");
        if out.literals.len() == 1 {
            return out.literals[0];
        }
        let literals = std::mem::take(&mut out.literals);
        self.theory
            .translator_mut()
            .translate_pc(literals, out.conn == Conn::Conj, ts)
    }

    /// Adds a top-level result to the theory
    ///
    /// True adds nothing, false adds the canonical unsatisfiable pair, a
    /// disjunction becomes one clause and a conjunction one unit clause
    /// per literal.
    pub fn emit_top(&mut self, out: &mut ConjOrDisj) {
        match out.decided() {
            Some(true) => {}
            Some(false) => self.theory.add_unsat(),
            None => match out.conn {
                Conn::Disj => self.theory.add_clause(std::mem::take(&mut out.literals)),
                Conn::Conj => {
                    for lit in std::mem::take(&mut out.literals) {
                        self.theory.add_unit(lit);
                    }
                }
            },
        }
    }

    /// Expands up to `limit` lazy residues that became reachable from the theory
    ///
    /// Returns the number of residues expanded.
    pub fn expand_lazy(&mut self, limit: usize) -> usize {
        let mut expanded = 0;
        while expanded < limit && !self.stopped() {
            let Some(handle) = self.theory.take_pending_lazy() else {
                break;
            };
            if let Some(residue) = self.take_residue(handle) {
                lazy::expand(self, residue);
                expanded += 1;
            }
        }
        expanded
    }

    /// Grounds the watched rule instances of atoms translated since the last call
    ///
    /// Returns the number of notifications handled.
    pub fn fire_watchers(&mut self) -> usize {
        let mut fired = 0;
        while !self.stopped() {
            let Some((id, atom)) = self.theory.translator_mut().pop_watch_event() else {
                break;
            };
            if let Some(watcher) = self.watcher(id) {
                watcher.fire(self, atom);
                fired += 1;
            }
        }
        fired
    }

    pub(crate) fn add_residue(&mut self, residue: lazy::LazyResidue) -> LazyHandle {
        self.residues.push(Some(residue));
        LazyHandle((self.residues.len() - 1) as u32)
    }

    pub(crate) fn take_residue(&mut self, handle: LazyHandle) -> Option<lazy::LazyResidue> {
        let residue = self.residues.get_mut(handle.0 as usize).and_then(Option::take);
        if residue.is_some() {
            self.lazy_expansions += 1;
        }
        residue
    }

    pub(crate) fn add_watcher(&mut self, watcher: lazy::Watcher) -> WatcherId {
        self.watchers.push(watcher);
        WatcherId((self.watchers.len() - 1) as u32)
    }

    pub(crate) fn watcher(&self, id: WatcherId) -> Option<lazy::Watcher> {
        self.watchers.get(id.0 as usize).cloned()
    }
}

/// Accumulates child results of a conjunction or disjunction
pub(crate) struct Combiner {
    conj: bool,
    emit: bool,
    ts: TsType,
    acc: ConjOrDisj,
}

impl Combiner {
    /// Starts a conjunction (`conj`) or disjunction
    ///
    /// A conjunction on a conjunctive path to the root emits its children
    /// instead of collecting them.
    pub(crate) fn new(conj: bool, ctx: &GroundingContext) -> Self {
        Self {
            conj,
            emit: conj && ctx.conjunctive_path,
            ts: ctx.tseitin,
            acc: ConjOrDisj::new(if conj { Conn::Conj } else { Conn::Disj }),
        }
    }

    /// Adds a child result; returns true when the node is decided
    pub(crate) fn add(&mut self, g: &mut Grounding<'_>, child: &mut ConjOrDisj) -> bool {
        match child.decided() {
            Some(value) if value != self.conj => {
                self.acc.set_value(value);
                return true;
            }
            Some(_) => return false,
            None => {}
        }
        if self.emit {
            g.emit_top(child);
            return false;
        }
        let target = self.acc.conn;
        if child.literals.len() == 1 || child.conn == target {
            self.acc.literals.append(&mut child.literals);
        } else {
            let lit = g.reify(child, self.ts);
            self.acc.put(lit);
        }
        false
    }

    /// The combined result
    pub(crate) fn finish(self, out: &mut ConjOrDisj) {
        *out = self.acc;
    }
}
