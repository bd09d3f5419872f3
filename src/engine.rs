//! Grounding engine API
//!
//! An [`Engine`] compiles a theory against a structure and runs the
//! resulting grounder tree. [`Engine::ground`] returns a materialized
//! [`GroundTheory`]; [`Engine::ground_into`] streams the ground objects to
//! a [`SolverSink`]. For finer control, [`Engine::session`] returns a
//! [`Session`] that grounds component by component and expands lazy
//! residues on request.

pub mod rustsat_adapter;
pub mod sink;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::ast::Theory;
use crate::error::{GroundError, Result};
use crate::grounder::{ConjOrDisj, GrounderFactory, Grounding, TheoryGrounder};
use crate::structure::{Structure, TruthValue};
use crate::theory::{GroundTheory, TheoryStats};
use crate::translator::TranslatorStats;
use sink::SolverSink;

/// Log targets
pub mod targets {
    /// Literal and term translators
    pub const TRANSLATOR: &str = "ground_rs::translator";
    /// Ground theory assembly
    pub const THEORY: &str = "ground_rs::theory";
    /// Grounder compiler and runtime grounders
    pub const GROUNDER: &str = "ground_rs::grounder";
    /// Engine and sessions
    pub const ENGINE: &str = "ground_rs::engine";
}

/// Grounding options
#[derive(Debug, Clone)]
pub struct Options {
    /// Ground linear comparisons over integer functions as CP constraints
    pub cp_support: bool,
    /// Ground eligible existentials one instance at a time
    pub lazy_quantifiers: bool,
    /// Ground rule instances only when their head atom is translated
    pub lazy_definitions: bool,
    /// Stop grounding further components once the theory is unsatisfiable
    pub stop_on_unsat: bool,
    /// Largest number of instantiations a symbolic query may enumerate
    pub max_query_enumeration: usize,
    /// Record every translator call (see [`crate::translator::TraceEvent`])
    pub trace: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cp_support: false,
            lazy_quantifiers: false,
            lazy_definitions: false,
            stop_on_unsat: true,
            max_query_enumeration: 10_000,
            trace: false,
        }
    }
}

/// Shared flag to interrupt a running grounding
///
/// Clones share the flag. Interruption is not resumable.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    /// Creates a handle that is not interrupted
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests interruption
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true once interruption was requested
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Statistics collected during grounding
#[derive(Debug, Clone)]
pub struct Statistics {
    compile_time: Duration,
    grounding_time: Duration,
    translator: TranslatorStats,
    theory: TheoryStats,
    cp_variables: usize,
    lazy_expansions: usize,
    unsat: bool,
    warnings: Vec<String>,
}

impl Statistics {
    /// Returns compile time in milliseconds
    pub fn compile_time(&self) -> u64 {
        self.compile_time.as_millis() as u64
    }

    /// Returns grounding time in milliseconds
    pub fn grounding_time(&self) -> u64 {
        self.grounding_time.as_millis() as u64
    }

    /// Returns total time in milliseconds
    pub fn total_time(&self) -> u64 {
        self.compile_time() + self.grounding_time()
    }

    /// Translator counters
    pub fn translator(&self) -> &TranslatorStats {
        &self.translator
    }

    /// Assembler counters
    pub fn theory(&self) -> &TheoryStats {
        &self.theory
    }

    /// Returns number of ground atoms
    pub fn num_atoms(&self) -> usize {
        self.translator.atoms
    }

    /// Returns number of Tseitin literals
    pub fn num_tseitins(&self) -> usize {
        self.translator.tseitins
    }

    /// Returns number of clauses
    pub fn num_clauses(&self) -> usize {
        self.theory.clauses
    }

    /// Returns number of CP variables
    pub fn num_cp_variables(&self) -> usize {
        self.cp_variables
    }

    /// Returns number of lazy residues expanded
    pub fn lazy_expansions(&self) -> usize {
        self.lazy_expansions
    }

    /// Returns true if the canonical unsatisfiable pair was emitted
    pub fn is_unsat(&self) -> bool {
        self.unsat
    }

    /// Warnings from compilation and grounding
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Main grounding engine
pub struct Engine {
    options: Options,
    interrupt: InterruptHandle,
}

impl Engine {
    /// Creates an engine with the given options
    pub fn new(options: Options) -> Self {
        Self {
            options,
            interrupt: InterruptHandle::new(),
        }
    }

    /// The options
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Handle to interrupt groundings of this engine, from any thread
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Grounds `theory` against `structure` into a materialized ground theory
    ///
    /// # Errors
    /// Fails on malformed inputs, unsupported constructs and interruption.
    pub fn ground(&self, theory: &Theory, structure: &Structure) -> Result<GroundTheory> {
        self.ground_with_stats(theory, structure).map(|(ground, _)| ground)
    }

    /// Like [`Engine::ground`], also returning statistics
    pub fn ground_with_stats(&self, theory: &Theory, structure: &Structure) -> Result<(GroundTheory, Statistics)> {
        let mut session = self.session(theory, structure, GroundTheory::materialized())?;
        session.run();
        session.finish()
    }

    /// Grounds `theory` against `structure`, streaming the result to `sink`
    ///
    /// # Errors
    /// As [`Engine::ground`]; also fails with the first error `sink` returns.
    pub fn ground_into(&self, theory: &Theory, structure: &Structure, sink: Box<dyn SolverSink>) -> Result<Statistics> {
        let mut session = self.session(theory, structure, GroundTheory::streaming(sink))?;
        session.run();
        session.finish().map(|(_, stats)| stats)
    }

    /// Compiles `theory` and returns a session grounding into `output`
    ///
    /// # Errors
    /// Fails if the theory cannot be compiled.
    pub fn session<'s>(&self, theory: &Theory, structure: &'s Structure, output: GroundTheory) -> Result<Session<'s>> {
        let start = Instant::now();
        let grounder = GrounderFactory::create(structure, theory, &self.options)?;
        let compile_time = start.elapsed();
        debug!(target: targets::ENGINE, "compiled theory in {:?}", compile_time);

        let mut g = Grounding::new(structure, output);
        g.set_interrupt(self.interrupt.clone());
        g.env = grounder.new_env();
        if self.options.trace {
            g.theory_mut().translator_mut().enable_trace();
        }
        Ok(Session {
            grounder,
            g,
            options: self.options.clone(),
            next_sentence: 0,
            next_definition: 0,
            compile_time,
            grounding_time: Duration::ZERO,
        })
    }
}

/// A grounding in progress
///
/// Components are ground in theory order: sentences first, then
/// definitions.
pub struct Session<'s> {
    grounder: TheoryGrounder,
    g: Grounding<'s>,
    options: Options,
    next_sentence: usize,
    next_definition: usize,
    compile_time: Duration,
    grounding_time: Duration,
}

impl<'s> Session<'s> {
    fn halted(&mut self) -> bool {
        self.g.poll() || (self.options.stop_on_unsat && self.g.theory().is_unsat())
    }

    /// Grounds the next component; returns false once none remains or grounding stopped
    pub fn step(&mut self) -> bool {
        if self.halted() {
            return false;
        }
        let start = Instant::now();
        let progressed = if let Some(sentence) = self.grounder.sentences().get(self.next_sentence) {
            self.next_sentence += 1;
            let mut out = ConjOrDisj::default();
            sentence.run(&mut self.g, &mut out);
            if !self.g.stopped() {
                self.g.emit_top(&mut out);
            }
            true
        } else if let Some(definition) = self.grounder.definitions().get(self.next_definition) {
            self.next_definition += 1;
            definition.run(&mut self.g);
            true
        } else {
            false
        };
        self.grounding_time += start.elapsed();
        progressed
    }

    /// Grounds every remaining component
    pub fn run(&mut self) {
        while self.step() {}
        info!(
            target: targets::ENGINE,
            "ground {} of {} sentences and {} of {} definitions",
            self.next_sentence,
            self.grounder.sentences().len(),
            self.next_definition,
            self.grounder.definitions().len()
        );
    }

    /// Expands up to `limit` pending lazy residues and watched rule instances
    ///
    /// Returns the number of residues expanded.
    pub fn expand_lazy(&mut self, limit: usize) -> usize {
        let start = Instant::now();
        self.g.fire_watchers();
        let expanded = self.g.expand_lazy(limit);
        self.g.fire_watchers();
        self.grounding_time += start.elapsed();
        expanded
    }

    /// The ground theory so far
    pub fn theory(&self) -> &GroundTheory {
        self.g.theory()
    }

    /// Returns true if the theory is known to be unsatisfiable
    pub fn is_unsat(&self) -> bool {
        self.g.theory().is_unsat()
    }

    fn drain(&mut self) {
        loop {
            let fired = self.g.fire_watchers();
            let expanded = self.g.expand_lazy(usize::MAX);
            if (fired == 0 && expanded == 0) || self.g.stopped() {
                break;
            }
        }
    }

    fn function_constraints(&mut self) {
        let structure = self.g.structure();
        let warnings = self.g.theory_mut().add_function_constraints(structure);
        for warning in warnings {
            self.g.warn(warning);
        }
    }

    /// Adds unit clauses for structure facts about translated atoms of defined symbols
    fn defined_facts(&mut self) {
        let structure = self.g.structure();
        let mut units = Vec::new();
        for definition in self.g.theory().definitions() {
            for symbol in definition.symbols() {
                for &atom in self.g.theory().translator().atoms_of(symbol) {
                    let Some(args) = self.g.theory().translator().args_of(atom) else {
                        continue;
                    };
                    match structure.truth_value(symbol, args) {
                        TruthValue::True => units.push(atom),
                        TruthValue::False => units.push(-atom),
                        TruthValue::Unknown => {}
                    }
                }
            }
        }
        for unit in units {
            self.g.theory_mut().add_unit(unit);
        }
    }

    /// Finishes the grounding
    ///
    /// Remaining lazy residues and watched rules are expanded, graph atoms
    /// get their functional constraints, facts about defined symbols are
    /// added and the definitions are closed.
    ///
    /// # Errors
    /// Returns [`GroundError::Interrupted`] if the run was interrupted, or
    /// the first error recorded while grounding.
    pub fn finish(mut self) -> Result<(GroundTheory, Statistics)> {
        let start = Instant::now();
        self.drain();
        if !self.g.stopped() {
            self.function_constraints();
            self.defined_facts();
            self.g.theory_mut().close();
        }
        self.grounding_time += start.elapsed();

        for inconsistency in self.g.structure().inconsistencies() {
            warn!(target: targets::ENGINE, "inconsistent structure: {}", inconsistency);
        }
        if self.g.was_interrupted() {
            return Err(GroundError::Interrupted);
        }
        if let Some(error) = self.g.take_error() {
            return Err(error);
        }

        let mut warnings = self.grounder.warnings().to_vec();
        warnings.extend_from_slice(self.g.warnings());
        let theory = self.g.theory();
        let stats = Statistics {
            compile_time: self.compile_time,
            grounding_time: self.grounding_time,
            translator: theory.translator().stats().clone(),
            theory: theory.stats().clone(),
            cp_variables: theory.terms().num_vars(),
            lazy_expansions: self.g.lazy_expansions(),
            unsat: theory.is_unsat(),
            warnings,
        };
        info!(
            target: targets::ENGINE,
            "grounding done: {} atoms, {} tseitins, {} clauses in {} ms",
            stats.num_atoms(),
            stats.num_tseitins(),
            stats.num_clauses(),
            stats.total_time()
        );
        Ok((self.g.into_theory(), stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Formula, Predicate, Sort, Variable};
    use crate::structure::{DomainElement, SortTable};

    fn setup() -> (Sort, Predicate, Structure) {
        let s = Sort::new("S");
        let p = Predicate::new("P", vec![s.clone()]);
        let mut structure = Structure::new();
        structure.set_sort(&s, SortTable::int_range(1, 3));
        (s, p, structure)
    }

    #[test]
    fn interrupt_handles_share_the_flag() {
        let handle = InterruptHandle::new();
        let other = handle.clone();
        assert!(!other.is_interrupted());
        handle.interrupt();
        assert!(other.is_interrupted());
    }

    #[test]
    fn interrupted_groundings_fail() {
        let (s, p, structure) = setup();
        let x = Variable::new("x", s);
        let mut theory = Theory::new();
        theory.add_sentence(Formula::forall(vec![x.clone()], p.apply(vec![x.term()])));
        let engine = Engine::new(Options::default());
        engine.interrupt_handle().interrupt();
        assert!(matches!(engine.ground(&theory, &structure), Err(GroundError::Interrupted)));
    }

    #[test]
    fn sessions_ground_component_by_component() {
        let (s, p, mut structure) = setup();
        structure.make_false(&p, vec![DomainElement::Int(1)]).unwrap();
        let x = Variable::new("x", s);
        let mut theory = Theory::new();
        // P(1) is false, so the first sentence is unsatisfiable
        theory.add_sentence(Formula::forall(vec![x.clone()], p.apply(vec![x.term()])));
        theory.add_sentence(Formula::exists(vec![x.clone()], p.apply(vec![x.term()])));
        let engine = Engine::new(Options::default());
        let mut session = engine.session(&theory, &structure, GroundTheory::materialized()).unwrap();
        assert!(session.step());
        assert!(session.is_unsat());
        assert!(!session.step());
        let (ground, stats) = session.finish().unwrap();
        assert!(stats.is_unsat());
        assert_eq!(ground.clauses().len(), 2);
    }

    #[test]
    fn statistics_count_ground_objects() {
        let (s, p, structure) = setup();
        let x = Variable::new("x", s);
        let mut theory = Theory::new();
        theory.add_sentence(Formula::exists(vec![x.clone()], p.apply(vec![x.term()])));
        let engine = Engine::new(Options::default());
        let (ground, stats) = engine.ground_with_stats(&theory, &structure).unwrap();
        assert_eq!(ground.clauses(), &[vec![1, 2, 3]]);
        assert_eq!(stats.num_atoms(), 3);
        assert_eq!(stats.num_tseitins(), 0);
        assert_eq!(stats.num_clauses(), 1);
        assert!(stats.warnings().is_empty());
    }
}
