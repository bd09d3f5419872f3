//! Ground theory assembly
//!
//! [`GroundTheory`] owns the translators and everything ground: clauses,
//! definitions, sets, aggregates and CP reifications. Ground objects are
//! either kept in memory (materialized mode) or pushed to a
//! [`SolverSink`] as they are produced (streaming mode).
//!
//! Tseitin literals are lazy: a Tseitin only produces clauses, aggregates
//! or rules once it is reachable from something added to the theory, and
//! then only in the directions its [`TsType`] requires.

mod functions;
pub mod print;
pub mod rules;
pub mod store;

pub use rules::{Contribution, DefId, GroundDefinition, GroundRule, Reifier, RuleKind};
pub use store::{CpReification, GroundAggregate, GroundSet, GroundStore};

use std::collections::VecDeque;

use log::{debug, warn};
use rustc_hash::FxHashSet;

use crate::ast::{AggFunction, CompType, Symbol};
use crate::engine::sink::SolverSink;
use crate::engine::targets;
use crate::error::GroundError;
use crate::translator::{
    CpBound, CpTerm, GroundTranslator, LazyHandle, SetId, TermTranslator, TsBody, TsType, VarId,
};
use crate::Lit;

enum Output {
    Store(GroundStore),
    Sink(Box<dyn SolverSink>),
}

/// Counters of the assembler
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TheoryStats {
    /// Clauses added (including unit clauses)
    pub clauses: usize,
    /// Rule contributions merged
    pub rule_contributions: usize,
    /// Aggregates emitted
    pub aggregates: usize,
    /// CP reifications emitted
    pub cp_reifications: usize,
    /// Sets emitted
    pub sets: usize,
}

/// Clauses for `ts` and a conjunction/disjunction body, in the directions of `ts_type`
fn pc_clauses(ts: Lit, body: &[Lit], conj: bool, ts_type: TsType) -> Vec<Vec<Lit>> {
    let forward = matches!(ts_type, TsType::Eq | TsType::Impl);
    let backward = matches!(ts_type, TsType::Eq | TsType::RImpl);
    let mut clauses = Vec::new();
    if conj {
        if forward {
            clauses.extend(body.iter().map(|&l| vec![-ts, l]));
        }
        if backward {
            let mut c = Vec::with_capacity(body.len() + 1);
            c.push(ts);
            c.extend(body.iter().map(|l| -l));
            clauses.push(c);
        }
    } else {
        if forward {
            let mut c = Vec::with_capacity(body.len() + 1);
            c.push(-ts);
            c.extend_from_slice(body);
            clauses.push(c);
        }
        if backward {
            clauses.extend(body.iter().map(|&l| vec![-l, ts]));
        }
    }
    clauses
}

struct TranslatorReifier<'a> {
    translator: &'a mut GroundTranslator,
}

impl Reifier for TranslatorReifier<'_> {
    fn reify_pc(&mut self, body: Vec<Lit>, conj: bool, recursive: bool) -> Lit {
        let ts = if recursive { TsType::Rule } else { TsType::Eq };
        self.translator.translate_pc(body, conj, ts)
    }

    fn reify_agg(&mut self, set: SetId, func: AggFunction, lower: bool, bound: f64, recursive: bool) -> Lit {
        let ts = if recursive { TsType::Rule } else { TsType::Eq };
        // bound =< agg is a lower bound, bound >= agg an upper one
        let comp = if lower { CompType::Leq } else { CompType::Geq };
        self.translator.translate_agg(bound, comp, func, set, ts)
    }
}

/// The ground theory under construction
pub struct GroundTheory {
    translator: GroundTranslator,
    terms: TermTranslator,
    output: Output,
    definitions: Vec<GroundDefinition>,
    emitted: FxHashSet<Lit>,
    emitted_sets: FxHashSet<SetId>,
    emitted_vars: FxHashSet<VarId>,
    pending_lazy: VecDeque<LazyHandle>,
    unsat: bool,
    closed: bool,
    sink_error: Option<GroundError>,
    stats: TheoryStats,
}

impl GroundTheory {
    fn with_output(output: Output) -> Self {
        Self {
            translator: GroundTranslator::new(),
            terms: TermTranslator::new(),
            output,
            definitions: Vec::new(),
            emitted: FxHashSet::default(),
            emitted_sets: FxHashSet::default(),
            emitted_vars: FxHashSet::default(),
            pending_lazy: VecDeque::new(),
            unsat: false,
            closed: false,
            sink_error: None,
            stats: TheoryStats::default(),
        }
    }

    /// Creates a theory that keeps everything in memory
    pub fn materialized() -> Self {
        Self::with_output(Output::Store(GroundStore::default()))
    }

    /// Creates a theory that streams everything to `sink`
    pub fn streaming(sink: Box<dyn SolverSink>) -> Self {
        Self::with_output(Output::Sink(sink))
    }

    /// Returns true in streaming mode
    pub fn is_streaming(&self) -> bool {
        matches!(self.output, Output::Sink(_))
    }

    /// The literal translator
    pub fn translator(&self) -> &GroundTranslator {
        &self.translator
    }

    /// The literal translator, mutably
    pub fn translator_mut(&mut self) -> &mut GroundTranslator {
        &mut self.translator
    }

    /// The term translator
    pub fn terms(&self) -> &TermTranslator {
        &self.terms
    }

    /// The term translator, mutably
    pub fn terms_mut(&mut self) -> &mut TermTranslator {
        &mut self.terms
    }

    /// Counters
    pub fn stats(&self) -> &TheoryStats {
        &self.stats
    }

    /// Returns true once the canonical unsatisfiable pair was added
    pub fn is_unsat(&self) -> bool {
        self.unsat
    }

    /// First error reported by the sink, if any
    pub fn sink_error(&self) -> Option<&GroundError> {
        self.sink_error.as_ref()
    }

    fn sink(&mut self) -> &mut dyn SolverSink {
        match &mut self.output {
            Output::Store(store) => store,
            Output::Sink(sink) => sink.as_mut(),
        }
    }

    fn report(&mut self, result: crate::Result<()>) {
        if let Err(e) = result {
            warn!(target: targets::THEORY, "sink refused an object: {}", e);
            if self.sink_error.is_none() {
                self.sink_error = Some(e);
            }
        }
    }

    fn push_clause(&mut self, clause: &[Lit]) {
        self.stats.clauses += 1;
        let result = self.sink().add_clause(clause);
        self.report(result);
    }

    /// Adds a clause, first emitting every Tseitin reachable from it
    ///
    /// The empty clause is added as the canonical unsatisfiable pair.
    ///
    /// # Panics
    /// Panics if a Tseitin of type [`TsType::Rule`] is reachable: rule
    /// Tseitins only exist inside definitions.
    pub fn add_clause(&mut self, clause: Vec<Lit>) {
        if clause.is_empty() {
            self.add_unsat();
            return;
        }
        for &lit in &clause {
            self.emit_for_clause(lit);
        }
        self.push_clause(&clause);
    }

    /// Adds a unit clause
    pub fn add_unit(&mut self, lit: Lit) {
        self.add_clause(vec![lit]);
    }

    /// Adds `[a]` and `[-a]` for a fresh lone atom `a` and marks the theory unsatisfiable
    pub fn add_unsat(&mut self) {
        let a = self.translator.new_lone_tseitin();
        debug!(target: targets::THEORY, "theory is unsatisfiable, adding [{}] and [{}]", a, -a);
        self.push_clause(&[a]);
        self.push_clause(&[-a]);
        self.unsat = true;
    }

    fn emit_set(&mut self, id: SetId) {
        if !self.emitted_sets.insert(id) {
            return;
        }
        let set = self.translator.set(id);
        let ground = GroundSet {
            id,
            literals: set.literals.clone(),
            weights: set.weights.clone(),
            trueweights: set.trueweights.clone(),
        };
        self.stats.sets += 1;
        let result = self.sink().add_set(&ground);
        self.report(result);
    }

    fn emit_cp_vars(&mut self, left: &CpTerm, right: &CpBound) {
        let mut vars = left.vars();
        if let CpBound::Var(v) = right {
            vars.push(*v);
        }
        for v in vars {
            if self.emitted_vars.insert(v) {
                let domain = self.terms.domain_of(v);
                let result = self.sink().add_cp_variable(v, domain);
                self.report(result);
            }
        }
    }

    /// Emits the Tseitin behind `lit` (if any) for use in clauses
    fn emit_for_clause(&mut self, lit: Lit) {
        let atom = lit.abs();
        let Some(body) = self.translator.ts_body(atom).cloned() else {
            return;
        };
        if !self.emitted.insert(atom) {
            return;
        }
        match body {
            TsBody::Pc { body, conj, ts } => {
                if ts == TsType::Rule {
                    panic!("rule Tseitin tseitin_{} reached from a clause", atom);
                }
                for &l in &body {
                    self.emit_for_clause(l);
                }
                for c in pc_clauses(atom, &body, conj, ts) {
                    self.push_clause(&c);
                }
            }
            TsBody::Agg {
                set,
                func,
                lower,
                bound,
                ts,
            } => {
                if ts == TsType::Rule {
                    panic!("rule Tseitin tseitin_{} reached from a clause", atom);
                }
                let members = self.translator.set(set).literals.clone();
                for l in members {
                    self.emit_for_clause(l);
                }
                self.emit_set(set);
                let aggregate = GroundAggregate {
                    head: atom,
                    arrow: ts,
                    set,
                    func,
                    lower,
                    bound,
                };
                self.stats.aggregates += 1;
                let result = self.sink().add_aggregate(&aggregate);
                self.report(result);
            }
            TsBody::Cp { left, comp, right, ts } => {
                if ts == TsType::Rule {
                    panic!("rule Tseitin tseitin_{} reached from a clause", atom);
                }
                self.emit_cp_vars(&left, &right);
                let reification = CpReification {
                    head: atom,
                    arrow: ts,
                    left,
                    comp,
                    right,
                };
                self.stats.cp_reifications += 1;
                let result = self.sink().add_cp_reification(&reification);
                self.report(result);
            }
            TsBody::Lazy { handle, .. } => self.pending_lazy.push_back(handle),
        }
    }

    /// Emits the Tseitin behind `lit` (if any) for use in a rule of `def`
    fn emit_for_rule(&mut self, def: DefId, lit: Lit) {
        let atom = lit.abs();
        let Some(body) = self.translator.ts_body(atom) else {
            return;
        };
        if body.ts() != TsType::Rule {
            self.emit_for_clause(atom);
            return;
        }
        let body = body.clone();
        if !self.emitted.insert(atom) {
            return;
        }
        match body {
            TsBody::Pc { body, conj, .. } => self.add_rule(def, atom, body, conj, true),
            TsBody::Agg {
                set,
                func,
                lower,
                bound,
                ..
            } => self.add_agg_rule(def, atom, set, func, lower, bound, true),
            TsBody::Cp { .. } | TsBody::Lazy { .. } => {
                unreachable!("tseitin_{} cannot be defined by a rule", atom)
            }
        }
    }

    /// Starts a new definition of the given symbols
    pub fn new_definition(&mut self, symbols: Vec<Symbol>) -> DefId {
        let id = DefId(self.definitions.len() as u32);
        self.definitions.push(GroundDefinition::new(id, symbols));
        id
    }

    /// Definition by id
    pub fn definition(&self, id: DefId) -> &GroundDefinition {
        &self.definitions[id.0 as usize]
    }

    /// All definitions
    pub fn definitions(&self) -> &[GroundDefinition] {
        &self.definitions
    }

    fn merge_into(&mut self, def: DefId, head: Lit, contribution: Contribution) {
        self.stats.rule_contributions += 1;
        let current = self.definitions[def.0 as usize].take_rule(head);
        let mut reifier = TranslatorReifier {
            translator: &mut self.translator,
        };
        let rule = rules::merge(head, current, contribution, &mut reifier);
        let referenced: Vec<Lit> = match &rule {
            GroundRule::Pc { body, .. } => body.clone(),
            GroundRule::Agg { set, .. } => {
                let set = *set;
                self.emit_set(set);
                self.translator.set(set).literals.clone()
            }
        };
        self.definitions[def.0 as usize].put_rule(rule);
        for l in referenced {
            self.emit_for_rule(def, l);
        }
    }

    /// Merges `head <- body` into definition `def`
    pub fn add_rule(&mut self, def: DefId, head: Lit, body: Vec<Lit>, conj: bool, recursive: bool) {
        self.merge_into(def, head, Contribution::Pc { body, conj, recursive });
    }

    /// Merges `head <- func(set) >= bound` (lower) or `=< bound` into definition `def`
    #[allow(clippy::too_many_arguments)]
    pub fn add_agg_rule(
        &mut self,
        def: DefId,
        head: Lit,
        set: SetId,
        func: AggFunction,
        lower: bool,
        bound: f64,
        recursive: bool,
    ) {
        self.merge_into(
            def,
            head,
            Contribution::Agg {
                set,
                func,
                lower,
                bound,
                recursive,
            },
        );
    }

    /// Takes the next lazy residue that became reachable
    pub fn take_pending_lazy(&mut self) -> Option<LazyHandle> {
        self.pending_lazy.pop_front()
    }

    /// Finishes the definitions
    ///
    /// Statically true rules become unit clauses, statically false ones and
    /// translated atoms of defined symbols without a rule become negative
    /// unit clauses. In streaming mode the remaining rules are then pushed
    /// to the sink. Closing twice has no effect.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for idx in 0..self.definitions.len() {
            let (facts, falses) = self.definitions[idx].extract_decided();
            for head in facts {
                self.add_unit(head);
            }
            for head in falses {
                self.add_unit(-head);
            }
            let mut undefined = Vec::new();
            for symbol in self.definitions[idx].symbols() {
                for &atom in self.translator.atoms_of(symbol) {
                    if !self.definitions[idx].has_head(atom) {
                        undefined.push(atom);
                    }
                }
            }
            for atom in undefined {
                self.add_unit(-atom);
            }
            if self.is_streaming() {
                let id = self.definitions[idx].id();
                let rules: Vec<GroundRule> = self.definitions[idx].rules().cloned().collect();
                for rule in &rules {
                    let result = self.sink().add_definition_rule(id, rule);
                    self.report(result);
                }
            }
        }
    }

    /// Materialized clauses (empty in streaming mode)
    pub fn clauses(&self) -> &[Vec<Lit>] {
        match &self.output {
            Output::Store(s) => &s.clauses,
            Output::Sink(_) => &[],
        }
    }

    /// Materialized sets (empty in streaming mode)
    pub fn sets(&self) -> &[GroundSet] {
        match &self.output {
            Output::Store(s) => &s.sets,
            Output::Sink(_) => &[],
        }
    }

    /// Materialized aggregates (empty in streaming mode)
    pub fn aggregates(&self) -> &[GroundAggregate] {
        match &self.output {
            Output::Store(s) => &s.aggregates,
            Output::Sink(_) => &[],
        }
    }

    /// Materialized CP reifications (empty in streaming mode)
    pub fn cp_reifications(&self) -> &[CpReification] {
        match &self.output {
            Output::Store(s) => &s.cp_reifications,
            Output::Sink(_) => &[],
        }
    }

    /// Materialized CP variable declarations (empty in streaming mode)
    pub fn cp_variables(&self) -> &[(VarId, crate::translator::CpDomain)] {
        match &self.output {
            Output::Store(s) => &s.cp_variables,
            Output::Sink(_) => &[],
        }
    }
}
