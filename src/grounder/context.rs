//! Compile-time grounding context
//!
//! The context travels down the compiler's recursion by value. Every
//! descent builds a modified copy for the child; the caller's context is
//! untouched, so returning from the recursion restores it.

use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::ast::Symbol;
use crate::translator::TsType;

/// Which instances a generator has to produce
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenType {
    /// Instances that can make the formula true
    CanMakeTrue,
    /// Instances that can make the formula false
    CanMakeFalse,
}

impl GenType {
    fn negated(self) -> Self {
        match self {
            GenType::CanMakeTrue => GenType::CanMakeFalse,
            GenType::CanMakeFalse => GenType::CanMakeTrue,
        }
    }
}

/// Polarity of a position
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Context {
    /// Positive
    Positive,
    /// Negative
    Negative,
    /// Both (below an equivalence or in a set)
    Both,
}

impl Context {
    /// The opposite polarity; `Both` stays `Both`
    pub fn negated(self) -> Self {
        match self {
            Context::Positive => Context::Negative,
            Context::Negative => Context::Positive,
            Context::Both => Context::Both,
        }
    }
}

/// Part of the theory being compiled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Component {
    /// A top-level sentence
    Sentence,
    /// A subformula
    Formula,
    /// A rule head
    Head,
}

/// Context of a subformula
#[derive(Clone, Debug)]
pub struct GroundingContext {
    /// Instances to generate
    pub gentype: GenType,
    /// Polarity used to resolve undefined function values
    pub funccontext: Context,
    /// Monotonicity of the position
    pub monotone: Context,
    /// Part of the theory
    pub component: Component,
    /// Type of Tseitins introduced at this position
    pub tseitin: TsType,
    /// Symbols defined anywhere in the theory
    pub defined: Rc<FxHashSet<Symbol>>,
    /// Symbols of the definition being compiled, if any
    pub definition: Option<Rc<FxHashSet<Symbol>>>,
    /// Whether the path to the root only crosses conjunctions
    pub conjunctive_path: bool,
}

impl GroundingContext {
    /// Context of a top-level sentence
    pub fn sentence(defined: Rc<FxHashSet<Symbol>>) -> Self {
        Self {
            gentype: GenType::CanMakeFalse,
            funccontext: Context::Positive,
            monotone: Context::Positive,
            component: Component::Sentence,
            tseitin: TsType::Impl,
            defined,
            definition: None,
            conjunctive_path: true,
        }
    }

    /// Context of a rule body of the given definition
    ///
    /// Bodies are minimised: function values default to false and
    /// generators look for instances that make the body true.
    pub fn rule_body(defined: Rc<FxHashSet<Symbol>>, definition: Rc<FxHashSet<Symbol>>, recursive: bool) -> Self {
        Self {
            gentype: GenType::CanMakeTrue,
            funccontext: Context::Negative,
            monotone: Context::Positive,
            component: Component::Formula,
            tseitin: if recursive { TsType::Rule } else { TsType::Eq },
            defined,
            definition: Some(definition),
            conjunctive_path: false,
        }
    }

    /// Context below a negation
    pub fn negated(&self) -> Self {
        Self {
            gentype: self.gentype.negated(),
            funccontext: self.funccontext.negated(),
            monotone: self.monotone.negated(),
            tseitin: self.tseitin.negated(),
            ..self.clone()
        }
    }

    /// Context of a child of a conjunction (`conj`) or disjunction
    pub fn child(&self, conj: bool) -> Self {
        Self {
            gentype: if conj {
                GenType::CanMakeFalse
            } else {
                GenType::CanMakeTrue
            },
            component: Component::Formula,
            conjunctive_path: self.conjunctive_path && conj,
            ..self.clone()
        }
    }

    /// Context where both polarities matter: sides of an equivalence, set conditions
    pub fn both(&self) -> Self {
        Self {
            monotone: Context::Both,
            component: Component::Formula,
            tseitin: if self.tseitin == TsType::Rule {
                TsType::Rule
            } else {
                TsType::Eq
            },
            conjunctive_path: false,
            ..self.clone()
        }
    }

    /// Returns true inside a definition
    pub fn in_definition(&self) -> bool {
        self.definition.is_some()
    }

    /// Returns true if the symbol is defined anywhere in the theory
    pub fn is_defined(&self, symbol: &Symbol) -> bool {
        self.defined.contains(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negation_flips_polarity_and_swaps_implications() {
        let ctx = GroundingContext::sentence(Rc::new(FxHashSet::default()));
        let neg = ctx.negated();
        assert_eq!(neg.gentype, GenType::CanMakeTrue);
        assert_eq!(neg.funccontext, Context::Negative);
        assert_eq!(neg.monotone, Context::Negative);
        assert_eq!(neg.tseitin, TsType::RImpl);
        assert!(neg.conjunctive_path);

        let back = neg.negated();
        assert_eq!(back.tseitin, TsType::Impl);
        assert_eq!(back.funccontext, Context::Positive);
    }

    #[test]
    fn disjunctions_leave_the_conjunctive_path() {
        let ctx = GroundingContext::sentence(Rc::new(FxHashSet::default()));
        assert!(ctx.child(true).conjunctive_path);
        assert!(!ctx.child(false).conjunctive_path);
        assert!(!ctx.child(false).child(true).conjunctive_path);
        assert_eq!(ctx.both().tseitin, TsType::Eq);
        assert_eq!(ctx.both().monotone, Context::Both);
    }

    #[test]
    fn rule_bodies_are_minimised() {
        let defs = Rc::new(FxHashSet::default());
        let body = GroundingContext::rule_body(defs.clone(), defs, true);
        assert_eq!(body.funccontext, Context::Negative);
        assert_eq!(body.gentype, GenType::CanMakeTrue);
        assert_eq!(body.tseitin, TsType::Rule);
        assert_eq!(body.both().tseitin, TsType::Rule);
        assert!(body.in_definition());
    }
}
