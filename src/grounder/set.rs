//! Set grounders
//!
//! A set grounder collects the members of one part of a set expression:
//! the literal of each member's condition with its weight. Members whose
//! condition is certainly true only contribute a weight, members that are
//! certainly false are skipped before their condition or weight is
//! grounded.

use crate::error::GroundError;
use crate::grounder::generator::InstGenerator;
use crate::grounder::term::{GroundTerm, TermGrounder};
use crate::grounder::{ConjOrDisj, FormulaGrounder, Grounding};
use crate::symbolic::{InstanceChecker, Query};
use crate::translator::{SetId, TsType};
use crate::Lit;

/// Members collected so far
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SetParts {
    /// Literals of undecided members
    pub literals: Vec<Lit>,
    /// Weights of undecided members
    pub weights: Vec<f64>,
    /// Weights of members that are certainly in the set
    pub trueweights: Vec<f64>,
}

/// Grounds one part of a set expression
pub trait SetGrounder {
    /// Adds the members of the part to `parts`
    fn collect(&self, g: &mut Grounding<'_>, parts: &mut SetParts);
}

/// Runs the grounders of every part and allocates the resulting set
pub fn ground_set(g: &mut Grounding<'_>, grounders: &[Box<dyn SetGrounder>]) -> SetId {
    let mut parts = SetParts::default();
    for grounder in grounders {
        if g.stopped() {
            break;
        }
        grounder.collect(g, &mut parts);
    }
    g.theory_mut()
        .translator_mut()
        .translate_set(parts.literals, parts.weights, parts.trueweights)
}

/// Condition and weight of one member
pub struct Member {
    condition: Box<dyn FormulaGrounder>,
    weight: Box<dyn TermGrounder>,
    possible: Query,
    certain: Query,
    ts: TsType,
}

impl Member {
    /// Creates a member
    ///
    /// `possible` and `certain` decide the condition for the current
    /// bindings when they can; `ts` is the type of the condition's Tseitin.
    pub fn new(
        condition: Box<dyn FormulaGrounder>,
        weight: Box<dyn TermGrounder>,
        possible: Query,
        certain: Query,
        ts: TsType,
    ) -> Self {
        Self {
            condition,
            weight,
            possible,
            certain,
            ts,
        }
    }

    fn weight(&self, g: &mut Grounding<'_>) -> Option<f64> {
        match self.weight.run(g) {
            GroundTerm::Element(e) => match e.as_int() {
                Some(w) => Some(w as f64),
                None => {
                    g.fail(GroundError::InvalidArgument(format!("set weight {} is not a number", e)));
                    None
                }
            },
            GroundTerm::Undefined => None,
            GroundTerm::Linear { .. } => {
                g.fail(GroundError::Unsupported("set weight over CP variables".to_string()));
                None
            }
        }
    }

    fn ground(&self, g: &mut Grounding<'_>, parts: &mut SetParts) {
        let structure = g.structure();
        if !self.possible.check(structure, &mut g.env) {
            return;
        }
        let Some(weight) = self.weight(g) else {
            return;
        };
        if self.certain.check(structure, &mut g.env) {
            parts.trueweights.push(weight);
            return;
        }
        let mut out = ConjOrDisj::default();
        self.condition.run(g, &mut out);
        match out.decided() {
            Some(false) => {}
            Some(true) => parts.trueweights.push(weight),
            None => {
                let lit = g.reify(&mut out, self.ts);
                parts.literals.push(lit);
                parts.weights.push(weight);
            }
        }
    }
}

/// Enumerated members `{ φ1 : w1; φ2 : w2 }`
pub struct EnumSetGrounder {
    members: Vec<Member>,
}

impl EnumSetGrounder {
    /// Grounds each member in order
    pub fn new(members: Vec<Member>) -> Self {
        Self { members }
    }
}

impl SetGrounder for EnumSetGrounder {
    fn collect(&self, g: &mut Grounding<'_>, parts: &mut SetParts) {
        for member in &self.members {
            if g.stopped() {
                return;
            }
            member.ground(g, parts);
        }
    }
}

/// Quantified part `{ x̄ : φ : w }`
pub struct QuantSetGrounder {
    generator: InstGenerator,
    member: Member,
}

impl QuantSetGrounder {
    /// Grounds `member` for every instance of `generator`
    pub fn new(generator: InstGenerator, member: Member) -> Self {
        Self { generator, member }
    }
}

impl SetGrounder for QuantSetGrounder {
    fn collect(&self, g: &mut Grounding<'_>, parts: &mut SetParts) {
        let slots: Vec<_> = self.generator.vars().iter().map(|(s, _)| *s).collect();
        let saved = g.env.snapshot(&slots);
        match self.generator.start(g.structure()) {
            Ok(mut cursor) => {
                while self.generator.next(g, &mut cursor) {
                    self.member.ground(g, parts);
                }
            }
            Err(e) => g.fail(e),
        }
        g.env.reinstate(&saved);
    }
}
