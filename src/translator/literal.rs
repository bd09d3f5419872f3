//! Literal translator: integer ids for ground atoms and Tseitin literals
//!
//! The translator is the single owner of every id it mints. Ground atoms
//! are keyed by `(symbol, tuple)`, Tseitin literals by their body, so equal
//! requests always return the same literal and different requests never
//! alias. Ids of released lone Tseitins go to a free queue and are handed
//! out again by [`GroundTranslator::next_number`].

use std::collections::VecDeque;

use log::trace;
use rustc_hash::FxHashMap;

use crate::ast::{AggFunction, CompType, Function, Symbol};
use crate::engine::targets;
use crate::structure::ElementTuple;
use crate::translator::term::{CpBound, CpTerm};
use crate::translator::tsbody::{
    one_sided_bound, AtomKind, LazyHandle, SetId, TsBody, TsBodyId, TsSet, TsType,
};
use crate::Lit;

/// Id of a watcher registered on a symbol
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatcherId(pub u32);

/// One translator request, recorded when tracing is enabled
#[derive(Clone, Debug, PartialEq)]
pub enum TraceEvent {
    /// `translate_atom`
    Atom {
        /// Symbol name
        symbol: String,
        /// The returned literal
        lit: Lit,
    },
    /// `translate_pc`
    Pc {
        /// Number of body literals
        size: usize,
        /// Conjunction if true
        conj: bool,
        /// Requested Tseitin type
        ts: TsType,
    },
    /// `translate_agg`
    Agg {
        /// Requested comparison
        comp: CompType,
        /// Aggregate function
        func: AggFunction,
        /// Requested Tseitin type
        ts: TsType,
    },
    /// `translate_cp`
    Cp {
        /// Requested comparison
        comp: CompType,
        /// Requested Tseitin type
        ts: TsType,
    },
    /// `translate_set`
    Set {
        /// Number of member literals
        size: usize,
    },
}

/// Counters of the literal translator
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TranslatorStats {
    /// Number of translate requests of any kind
    pub calls: usize,
    /// Ground atoms allocated
    pub atoms: usize,
    /// Tseitin literals allocated (with or without body)
    pub tseitins: usize,
    /// Sets allocated
    pub sets: usize,
    /// Ids taken from the free queue
    pub reused_ids: usize,
}

#[derive(Clone, Debug)]
enum AtomEntry {
    Input { symbol: usize, tuple: ElementTuple },
    Tseitin(TsBodyId),
    Lone,
    Released,
}

struct SymbolTable {
    symbol: Symbol,
    atoms: FxHashMap<ElementTuple, Lit>,
    order: Vec<Lit>,
    watchers: Vec<WatcherId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum BodyKey {
    Pc(Vec<Lit>, bool, TsType),
    Agg(SetId, AggFunction, bool, u64, TsType),
    Cp(CpTerm, CompType, CpBound, TsType),
}

/// Maps ground atoms and Tseitin bodies to literals
pub struct GroundTranslator {
    /// Index 0 is unused so that ids start at 1
    atoms: Vec<AtomEntry>,
    free_ids: VecDeque<Lit>,
    symbols: Vec<SymbolTable>,
    symbol_index: FxHashMap<Symbol, usize>,
    bodies: Vec<TsBody>,
    body_index: FxHashMap<BodyKey, Lit>,
    sets: Vec<Option<TsSet>>,
    free_sets: Vec<SetId>,
    pending_watches: VecDeque<(WatcherId, Lit)>,
    stats: TranslatorStats,
    trace: Option<Vec<TraceEvent>>,
}

impl Default for GroundTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl GroundTranslator {
    /// Creates an empty translator
    pub fn new() -> Self {
        Self {
            atoms: vec![AtomEntry::Released],
            free_ids: VecDeque::new(),
            symbols: Vec::new(),
            symbol_index: FxHashMap::default(),
            bodies: Vec::new(),
            body_index: FxHashMap::default(),
            sets: Vec::new(),
            free_sets: Vec::new(),
            pending_watches: VecDeque::new(),
            stats: TranslatorStats::default(),
            trace: None,
        }
    }

    /// Starts recording a call trace
    pub fn enable_trace(&mut self) {
        self.trace = Some(Vec::new());
    }

    /// The recorded call trace (empty when tracing is off)
    pub fn trace(&self) -> &[TraceEvent] {
        self.trace.as_deref().unwrap_or(&[])
    }

    fn record(&mut self, event: TraceEvent) {
        self.stats.calls += 1;
        if let Some(trace) = &mut self.trace {
            trace.push(event);
        }
    }

    /// Statistics
    pub fn stats(&self) -> &TranslatorStats {
        &self.stats
    }

    /// Number of ids in use, including released ones
    pub fn num_atoms(&self) -> usize {
        self.atoms.len() - 1
    }

    fn symbol_slot(&mut self, symbol: &Symbol) -> usize {
        if let Some(&idx) = self.symbol_index.get(symbol) {
            return idx;
        }
        let idx = self.symbols.len();
        self.symbols.push(SymbolTable {
            symbol: symbol.clone(),
            atoms: FxHashMap::default(),
            order: Vec::new(),
            watchers: Vec::new(),
        });
        self.symbol_index.insert(symbol.clone(), idx);
        idx
    }

    /// Returns a fresh id, reusing a released one when available
    pub fn next_number(&mut self, kind: AtomKind) -> Lit {
        let entry = match kind {
            AtomKind::LoneTseitin => AtomEntry::Lone,
            // callers overwrite the entry right away
            AtomKind::Input | AtomKind::TseitinWithBody => AtomEntry::Released,
        };
        if let Some(id) = self.free_ids.pop_front() {
            self.stats.reused_ids += 1;
            self.atoms[id as usize] = entry;
            return id;
        }
        self.atoms.push(entry);
        (self.atoms.len() - 1) as Lit
    }

    /// Returns the literal of the ground atom `symbol(tuple)`
    ///
    /// A newly allocated atom is reported to the watchers of its symbol.
    pub fn translate_atom(&mut self, symbol: &Symbol, tuple: ElementTuple) -> Lit {
        let slot = self.symbol_slot(symbol);
        if let Some(&lit) = self.symbols[slot].atoms.get(&tuple) {
            self.record(TraceEvent::Atom {
                symbol: symbol.name().to_string(),
                lit,
            });
            return lit;
        }
        let lit = self.next_number(AtomKind::Input);
        self.atoms[lit as usize] = AtomEntry::Input {
            symbol: slot,
            tuple: tuple.clone(),
        };
        let table = &mut self.symbols[slot];
        table.atoms.insert(tuple, lit);
        table.order.push(lit);
        for &w in &table.watchers {
            self.pending_watches.push_back((w, lit));
        }
        self.stats.atoms += 1;
        self.record(TraceEvent::Atom {
            symbol: symbol.name().to_string(),
            lit,
        });
        lit
    }

    /// Returns the literal of an atom if it was translated before
    pub fn lookup_atom(&self, symbol: &Symbol, tuple: &[crate::structure::DomainElement]) -> Option<Lit> {
        let slot = *self.symbol_index.get(symbol)?;
        self.symbols[slot].atoms.get(tuple).copied()
    }

    fn tseitin(&mut self, key: BodyKey, body: TsBody) -> Lit {
        if let Some(&lit) = self.body_index.get(&key) {
            return lit;
        }
        let lit = self.next_number(AtomKind::TseitinWithBody);
        let id = TsBodyId(self.bodies.len() as u32);
        self.bodies.push(body);
        self.atoms[lit as usize] = AtomEntry::Tseitin(id);
        self.body_index.insert(key, lit);
        self.stats.tseitins += 1;
        trace!(target: targets::TRANSLATOR, "tseitin_{} {:?}", lit, self.bodies[id.0 as usize]);
        lit
    }

    /// Returns a Tseitin literal naming the conjunction or disjunction of `body`
    pub fn translate_pc(&mut self, body: Vec<Lit>, conj: bool, ts: TsType) -> Lit {
        self.record(TraceEvent::Pc {
            size: body.len(),
            conj,
            ts,
        });
        let key = BodyKey::Pc(body.clone(), conj, ts);
        self.tseitin(key, TsBody::Pc { body, conj, ts })
    }

    /// Returns a Tseitin literal naming `bound comp func(set)`
    ///
    /// Equality is never represented directly: `bound = agg` is translated
    /// as `~(bound < agg) & ~(bound > agg)` with both inner translations
    /// of type [`TsType::Eq`], and `~=` as the negation of that.
    pub fn translate_agg(&mut self, bound: f64, comp: CompType, func: AggFunction, set: SetId, ts: TsType) -> Lit {
        self.record(TraceEvent::Agg { comp, func, ts });
        match comp {
            CompType::Eq => {
                let lt = self.translate_agg(bound, CompType::Lt, func, set, TsType::Eq);
                let gt = self.translate_agg(bound, CompType::Gt, func, set, TsType::Eq);
                self.translate_pc(vec![-lt, -gt], true, ts)
            }
            CompType::Neq => -self.translate_agg(bound, CompType::Eq, func, set, ts.negated()),
            _ => {
                let (lower, bound) = one_sided_bound(comp, bound);
                let key = BodyKey::Agg(set, func, lower, bound.to_bits(), ts);
                self.tseitin(
                    key,
                    TsBody::Agg {
                        set,
                        func,
                        lower,
                        bound,
                        ts,
                    },
                )
            }
        }
    }

    /// Returns a Tseitin literal naming the CP comparison `left comp right`
    pub fn translate_cp(&mut self, left: CpTerm, comp: CompType, right: CpBound, ts: TsType) -> Lit {
        self.record(TraceEvent::Cp { comp, ts });
        let key = BodyKey::Cp(left.clone(), comp, right, ts);
        self.tseitin(key, TsBody::Cp { left, comp, right, ts })
    }

    /// Allocates a weighted set
    pub fn translate_set(&mut self, literals: Vec<Lit>, weights: Vec<f64>, trueweights: Vec<f64>) -> SetId {
        self.record(TraceEvent::Set { size: literals.len() });
        let set = TsSet {
            literals,
            weights,
            trueweights,
        };
        self.stats.sets += 1;
        match self.free_sets.pop() {
            Some(id) => {
                self.sets[id.0 as usize] = Some(set);
                id
            }
            None => {
                self.sets.push(Some(set));
                SetId((self.sets.len() - 1) as u32)
            }
        }
    }

    /// Releases a set id for reuse
    pub fn release_set(&mut self, id: SetId) {
        if let Some(slot) = self.sets.get_mut(id.0 as usize) {
            if slot.take().is_some() {
                self.free_sets.push(id);
            }
        }
    }

    /// Returns a set
    ///
    /// # Panics
    /// Panics if the id was released.
    pub fn set(&self, id: SetId) -> &TsSet {
        self.sets
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .unwrap_or_else(|| panic!("{} is not a live set", id))
    }

    /// Allocates an auxiliary literal without a body
    pub fn new_lone_tseitin(&mut self) -> Lit {
        self.stats.tseitins += 1;
        self.next_number(AtomKind::LoneTseitin)
    }

    /// Gives a lone Tseitin a lazy body
    ///
    /// # Panics
    /// Panics if `lit` is not a lone Tseitin.
    pub fn bind_lazy(&mut self, lit: Lit, handle: LazyHandle, ts: TsType) {
        let atom = lit.unsigned_abs() as usize;
        assert!(
            matches!(self.atoms[atom], AtomEntry::Lone),
            "tseitin_{} already has a body",
            atom
        );
        let id = TsBodyId(self.bodies.len() as u32);
        self.bodies.push(TsBody::Lazy { handle, ts });
        self.atoms[atom] = AtomEntry::Tseitin(id);
    }

    /// Returns the id of an unused lone Tseitin to the free queue
    ///
    /// # Panics
    /// Panics if `lit` is not a lone Tseitin.
    pub fn release_lone(&mut self, lit: Lit) {
        let atom = lit.unsigned_abs() as usize;
        assert!(
            matches!(self.atoms[atom], AtomEntry::Lone),
            "only lone Tseitins can be released, got {}",
            atom
        );
        self.atoms[atom] = AtomEntry::Released;
        self.free_ids.push_back(atom as Lit);
    }

    /// Kind of the atom underlying a literal
    pub fn atom_kind(&self, lit: Lit) -> AtomKind {
        match &self.atoms[lit.unsigned_abs() as usize] {
            AtomEntry::Input { .. } => AtomKind::Input,
            AtomEntry::Tseitin(_) => AtomKind::TseitinWithBody,
            AtomEntry::Lone | AtomEntry::Released => AtomKind::LoneTseitin,
        }
    }

    /// Returns true if the literal is a ground atom (or its negation)
    pub fn is_input(&self, lit: Lit) -> bool {
        self.atom_kind(lit) == AtomKind::Input
    }

    /// Symbol of an input literal
    pub fn symbol_of(&self, lit: Lit) -> Option<&Symbol> {
        match &self.atoms[lit.unsigned_abs() as usize] {
            AtomEntry::Input { symbol, .. } => Some(&self.symbols[*symbol].symbol),
            _ => None,
        }
    }

    /// Tuple of an input literal
    pub fn args_of(&self, lit: Lit) -> Option<&ElementTuple> {
        match &self.atoms[lit.unsigned_abs() as usize] {
            AtomEntry::Input { tuple, .. } => Some(tuple),
            _ => None,
        }
    }

    /// Body of a Tseitin literal
    pub fn ts_body(&self, lit: Lit) -> Option<&TsBody> {
        match &self.atoms[lit.unsigned_abs() as usize] {
            AtomEntry::Tseitin(id) => Some(&self.bodies[id.0 as usize]),
            _ => None,
        }
    }

    /// Atoms of a symbol translated so far, in allocation order
    pub fn atoms_of(&self, symbol: &Symbol) -> &[Lit] {
        match self.symbol_index.get(symbol) {
            Some(&idx) => &self.symbols[idx].order,
            None => &[],
        }
    }

    /// Function symbols with at least one translated graph atom, in first-use order
    pub fn graph_functions(&self) -> Vec<Function> {
        self.symbols
            .iter()
            .filter(|table| !table.order.is_empty())
            .filter_map(|table| match &table.symbol {
                Symbol::Func(f) => Some(f.clone()),
                Symbol::Pred(_) => None,
            })
            .collect()
    }

    /// Registers a watcher notified of every new atom of `symbol`
    pub fn add_watcher(&mut self, symbol: &Symbol, watcher: WatcherId) {
        let slot = self.symbol_slot(symbol);
        self.symbols[slot].watchers.push(watcher);
    }

    /// Takes the next pending watcher notification
    pub fn pop_watch_event(&mut self) -> Option<(WatcherId, Lit)> {
        self.pending_watches.pop_front()
    }

    /// Printable form of a literal
    pub fn print_lit(&self, lit: Lit) -> String {
        let neg = if lit < 0 { "~" } else { "" };
        let atom = lit.unsigned_abs() as usize;
        match self.atoms.get(atom) {
            Some(AtomEntry::Input { symbol, tuple }) => {
                let args: Vec<String> = tuple.iter().map(|e| e.to_string()).collect();
                match &self.symbols[*symbol].symbol {
                    Symbol::Pred(p) if args.is_empty() => format!("{}{}", neg, p.name()),
                    Symbol::Pred(p) => format!("{}{}({})", neg, p.name(), args.join(",")),
                    Symbol::Func(f) => {
                        let (value, fargs) = args.split_last().map(|(v, a)| (v.clone(), a.join(","))).unwrap_or_default();
                        if fargs.is_empty() {
                            format!("{}{}={}", neg, f.name(), value)
                        } else {
                            format!("{}{}({})={}", neg, f.name(), fargs, value)
                        }
                    }
                }
            }
            _ => format!("{}tseitin_{}", neg, atom),
        }
    }

    /// Evaluates a literal, following Tseitin bodies
    ///
    /// `assignment` gives the value of input atoms and lone Tseitins (by
    /// positive id). Returns None if a CP or lazy body is reached.
    pub fn eval_lit(&self, lit: Lit, assignment: &dyn Fn(Lit) -> bool) -> Option<bool> {
        let atom = lit.abs();
        let value = match self.ts_body(atom) {
            None => assignment(atom),
            Some(TsBody::Pc { body, conj, .. }) => {
                let mut result = *conj;
                for &l in body {
                    if self.eval_lit(l, assignment)? != *conj {
                        result = !*conj;
                        break;
                    }
                }
                result
            }
            Some(TsBody::Agg {
                set,
                func,
                lower,
                bound,
                ..
            }) => {
                let tsset = self.set(*set);
                let mut holds = Vec::with_capacity(tsset.literals.len());
                for &l in &tsset.literals {
                    holds.push((l, self.eval_lit(l, assignment)?));
                }
                let value = tsset.aggregate(*func, |l| holds.iter().any(|(m, v)| *m == l && *v));
                if *lower {
                    value >= *bound
                } else {
                    value <= *bound
                }
            }
            Some(TsBody::Cp { .. }) | Some(TsBody::Lazy { .. }) => return None,
        };
        Some(if lit < 0 { !value } else { value })
    }
}
