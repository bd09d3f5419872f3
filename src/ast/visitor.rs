//! Read-only traversals over formulas and terms
//!
//! The AST is a set of enums, so most passes are written as plain recursive
//! functions. [`FormulaVisitor`] covers the common case of walking every
//! node and reacting to a few of them.

use rustc_hash::FxHashSet;

use super::formula::Formula;
use super::{Aggregate, SetExpr, Symbol, Term, Variable};

/// A visitor over formulas, terms and set expressions
///
/// The default methods recurse into every child. Override the hooks to
/// collect information; call the matching `walk_*` function to keep
/// recursing from an overridden method.
pub trait FormulaVisitor {
    /// Visits a formula
    fn visit_formula(&mut self, formula: &Formula) {
        walk_formula(self, formula);
    }

    /// Visits a term
    fn visit_term(&mut self, term: &Term) {
        walk_term(self, term);
    }

    /// Visits a set expression
    fn visit_set(&mut self, set: &SetExpr) {
        walk_set(self, set);
    }

    /// Called for every symbol occurrence (predicates, function applications, graphs)
    fn visit_symbol(&mut self, _symbol: &Symbol) {}

    /// Called for every variable occurrence in a term
    fn visit_variable(&mut self, _var: &Variable) {}

    /// Called when variables become bound by a quantifier or set part
    fn enter_scope(&mut self, _vars: &[Variable]) {}

    /// Called when leaving the scope opened by the matching `enter_scope`
    fn exit_scope(&mut self, _vars: &[Variable]) {}
}

/// Recurses into the children of a formula
pub fn walk_formula<V: FormulaVisitor + ?Sized>(v: &mut V, formula: &Formula) {
    match formula {
        Formula::Constant(_) => {}
        Formula::Atom { pred, args, .. } => {
            v.visit_symbol(&Symbol::Pred(pred.clone()));
            args.iter().for_each(|a| v.visit_term(a));
        }
        Formula::Graph { func, args, value, .. } => {
            v.visit_symbol(&Symbol::Func(func.clone()));
            args.iter().for_each(|a| v.visit_term(a));
            v.visit_term(value);
        }
        Formula::Compare { left, right, .. } => {
            v.visit_term(left);
            v.visit_term(right);
        }
        Formula::Chain { terms, .. } => terms.iter().for_each(|t| v.visit_term(t)),
        Formula::Agg { bound, agg, .. } => {
            v.visit_term(bound);
            v.visit_set(&agg.set);
        }
        Formula::Bool { subs, .. } => subs.iter().for_each(|s| v.visit_formula(s)),
        Formula::Quant { vars, body, .. } => {
            v.enter_scope(vars);
            v.visit_formula(body);
            v.exit_scope(vars);
        }
        Formula::Equiv { left, right, .. } => {
            v.visit_formula(left);
            v.visit_formula(right);
        }
    }
}

/// Recurses into the children of a term
pub fn walk_term<V: FormulaVisitor + ?Sized>(v: &mut V, term: &Term) {
    match term {
        Term::Var(var) => v.visit_variable(var),
        Term::Element(_) => {}
        Term::App { func, args } => {
            v.visit_symbol(&Symbol::Func(func.clone()));
            args.iter().for_each(|a| v.visit_term(a));
        }
        Term::Arith { left, right, .. } => {
            v.visit_term(left);
            v.visit_term(right);
        }
        Term::Agg(agg) => v.visit_set(&agg.set),
    }
}

/// Recurses into the parts of a set expression
pub fn walk_set<V: FormulaVisitor + ?Sized>(v: &mut V, set: &SetExpr) {
    for part in &set.parts {
        v.enter_scope(&part.vars);
        v.visit_formula(&part.condition);
        v.visit_term(&part.weight);
        v.exit_scope(&part.vars);
    }
}

/// Collects the free variables of a formula in order of first occurrence
struct FreeVariables {
    bound: Vec<Variable>,
    seen: FxHashSet<Variable>,
    result: Vec<Variable>,
}

impl FormulaVisitor for FreeVariables {
    fn visit_variable(&mut self, var: &Variable) {
        if !self.bound.contains(var) && self.seen.insert(var.clone()) {
            self.result.push(var.clone());
        }
    }

    fn enter_scope(&mut self, vars: &[Variable]) {
        self.bound.extend(vars.iter().cloned());
    }

    fn exit_scope(&mut self, vars: &[Variable]) {
        self.bound.truncate(self.bound.len() - vars.len());
    }
}

impl FreeVariables {
    fn new() -> Self {
        Self {
            bound: Vec::new(),
            seen: FxHashSet::default(),
            result: Vec::new(),
        }
    }
}

/// Returns the free variables of a formula, in order of first occurrence
pub fn free_variables(formula: &Formula) -> Vec<Variable> {
    let mut collector = FreeVariables::new();
    collector.visit_formula(formula);
    collector.result
}

/// Returns the free variables of a term, in order of first occurrence
pub fn term_free_variables(term: &Term) -> Vec<Variable> {
    let mut collector = FreeVariables::new();
    collector.visit_term(term);
    collector.result
}

/// Returns the free variables of a set expression
pub fn set_free_variables(set: &SetExpr) -> Vec<Variable> {
    let mut collector = FreeVariables::new();
    collector.visit_set(set);
    collector.result
}

struct Symbols<'a> {
    out: &'a mut FxHashSet<Symbol>,
}

impl FormulaVisitor for Symbols<'_> {
    fn visit_symbol(&mut self, symbol: &Symbol) {
        self.out.insert(symbol.clone());
    }
}

/// Adds every symbol occurring in the formula to `out`
pub fn collect_symbols(formula: &Formula, out: &mut FxHashSet<Symbol>) {
    Symbols { out }.visit_formula(formula);
}

struct Mentions<'a> {
    symbols: &'a FxHashSet<Symbol>,
    found: bool,
}

impl FormulaVisitor for Mentions<'_> {
    fn visit_symbol(&mut self, symbol: &Symbol) {
        if self.symbols.contains(symbol) {
            self.found = true;
        }
    }
}

/// Returns true if the formula mentions one of the given symbols
pub fn mentions_any(formula: &Formula, symbols: &FxHashSet<Symbol>) -> bool {
    if symbols.is_empty() {
        return false;
    }
    let mut v = Mentions { symbols, found: false };
    v.visit_formula(formula);
    v.found
}

/// Returns true if the term mentions one of the given symbols
pub fn term_mentions_any(term: &Term, symbols: &FxHashSet<Symbol>) -> bool {
    if symbols.is_empty() {
        return false;
    }
    let mut v = Mentions { symbols, found: false };
    v.visit_term(term);
    v.found
}

/// Returns true if the set expression mentions one of the given symbols
pub fn set_mentions_any(set: &SetExpr, symbols: &FxHashSet<Symbol>) -> bool {
    if symbols.is_empty() {
        return false;
    }
    let mut v = Mentions { symbols, found: false };
    v.visit_set(set);
    v.found
}

/// Returns true if the term contains an aggregate
pub fn contains_aggregate(term: &Term) -> bool {
    match term {
        Term::Agg(_) => true,
        Term::Var(_) | Term::Element(_) => false,
        Term::App { args, .. } => args.iter().any(contains_aggregate),
        Term::Arith { left, right, .. } => contains_aggregate(left) || contains_aggregate(right),
    }
}

/// Returns the aggregate if the term is exactly an aggregate
pub fn as_aggregate(term: &Term) -> Option<&Aggregate> {
    match term {
        Term::Agg(agg) => Some(agg),
        _ => None,
    }
}
