//! Functional constraints on graph atoms
//!
//! A function application the structure leaves open is ground through
//! its graph atoms `f(a)=v`, which say nothing about each other. Once the
//! grounding is done, every application with a translated graph atom gets
//! a constraint: exactly one value for total functions, at most one for
//! partial ones. An application that also has a CP variable has each of
//! its graph atoms tied to the reified comparison `f(a) = v`.

use log::debug;
use rustc_hash::FxHashSet;

use crate::ast::{AggFunction, CompType, Function, Symbol};
use crate::engine::targets;
use crate::structure::{DomainElement, ElementTuple, Structure, TruthValue};
use crate::theory::GroundTheory;
use crate::translator::{CpBound, CpTerm, TsType};
use crate::Lit;

impl GroundTheory {
    /// Adds the functional constraints of every function with translated graph atoms
    ///
    /// Returns one warning per function whose output sort is infinite; no
    /// constraint is added for those.
    pub fn add_function_constraints(&mut self, structure: &Structure) -> Vec<String> {
        let mut warnings = Vec::new();
        for func in self.translator.graph_functions() {
            let symbol = Symbol::Func(func.clone());
            let values: Vec<DomainElement> = match structure.sort_table(func.out_sort()) {
                Some(table) if table.is_finite() => table.iter().collect(),
                _ => {
                    let message = format!(
                        "no functional constraint for {}: output sort {} is infinite",
                        func.name(),
                        func.out_sort().name()
                    );
                    warnings.push(message);
                    continue;
                }
            };

            let mut seen = FxHashSet::default();
            let mut applications: Vec<ElementTuple> = Vec::new();
            for &atom in self.translator.atoms_of(&symbol) {
                if let Some((_, args)) = self.translator.args_of(atom).and_then(|t| t.split_last()) {
                    if seen.insert(args.to_vec()) {
                        applications.push(args.to_vec());
                    }
                }
            }
            debug!(
                target: targets::THEORY,
                "functional constraints for {} on {} applications",
                func.name(),
                applications.len()
            );
            for args in &applications {
                self.one_value(structure, &func, &symbol, args, &values);
                self.channel_cp(&func, &symbol, args, &values);
            }
        }
        warnings
    }

    fn one_value(
        &mut self,
        structure: &Structure,
        func: &Function,
        symbol: &Symbol,
        args: &[DomainElement],
        values: &[DomainElement],
    ) {
        let mut certain = 0;
        let mut open = Vec::new();
        let mut decided = Vec::new();
        for value in values {
            let mut tuple = args.to_vec();
            tuple.push(value.clone());
            match structure.truth_value(symbol, &tuple) {
                TruthValue::True => {
                    certain += 1;
                    decided.extend(self.translator.lookup_atom(symbol, &tuple));
                }
                TruthValue::False => decided.extend(self.translator.lookup_atom(symbol, &tuple).map(|l| -l)),
                TruthValue::Unknown => open.push(tuple),
            }
        }
        for lit in decided {
            self.add_unit(lit);
        }
        let total = !func.is_partial();

        if certain > 1 {
            self.add_unsat();
            return;
        }
        if certain == 1 {
            let known: Vec<Lit> = open
                .iter()
                .filter_map(|tuple| self.translator.lookup_atom(symbol, tuple))
                .collect();
            for lit in known {
                self.add_unit(-lit);
            }
            return;
        }

        let lits: Vec<Lit> = open
            .into_iter()
            .map(|tuple| self.translator.translate_atom(symbol, tuple))
            .collect();
        match lits.as_slice() {
            [] if total => self.add_unsat(),
            [] => {}
            [lit] if total => self.add_unit(*lit),
            [_] => {}
            _ => {
                if total {
                    self.add_clause(lits.clone());
                }
                let weights = vec![1.0; lits.len()];
                let set = self.translator.translate_set(lits, weights, Vec::new());
                let at_most_one = self
                    .translator
                    .translate_agg(1.0, CompType::Geq, AggFunction::Card, set, TsType::Impl);
                self.add_unit(at_most_one);
            }
        }
    }

    fn channel_cp(&mut self, func: &Function, symbol: &Symbol, args: &[DomainElement], values: &[DomainElement]) {
        let Some(var) = self.terms.lookup(func, args) else {
            return;
        };
        for value in values {
            let Some(v) = value.as_int() else {
                continue;
            };
            let mut tuple = args.to_vec();
            tuple.push(value.clone());
            let Some(atom) = self.translator.lookup_atom(symbol, &tuple) else {
                continue;
            };
            let reif = self
                .translator
                .translate_cp(CpTerm::Var(var), CompType::Eq, CpBound::Const(v), TsType::Eq);
            self.add_clause(vec![-atom, reif]);
            self.add_clause(vec![atom, -reif]);
        }
    }
}
