//! Ground rules, ground definitions and the rule-merge automaton
//!
//! Every rule instance ground for a definition is merged into the single
//! rule of its head. The merged rule is equivalent to the disjunction of
//! all contributed bodies, whatever the order of contribution.
//!
//! | current            | contribution               | result                                  |
//! |--------------------|----------------------------|-----------------------------------------|
//! | none               | any                        | the contribution as a rule              |
//! | statically true    | any                        | unchanged                               |
//! | false              | any                        | the contribution as a rule              |
//! | any                | empty conjunction (true)   | statically true                         |
//! | any                | empty disjunction (false)  | unchanged                               |
//! | `Disj(b)`          | disjunction or singleton   | literals spliced into `b`               |
//! | `Disj(b)`          | conjunction of size > 1    | conjunction reified, appended to `b`    |
//! | `Conj(b)`          | anything else              | sides of size > 1 reified, joined by or |
//! | aggregate          | anything else              | aggregate reified, then as `Disj`       |

use std::fmt;

use rustc_hash::FxHashMap;

use crate::ast::{AggFunction, Symbol};
use crate::translator::SetId;
use crate::Lit;

/// Id of a ground definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefId(pub u32);

impl fmt::Display for DefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "def_{}", self.0)
    }
}

/// Connective of a rule body
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Conjunctive body
    Conj,
    /// Disjunctive body
    Disj,
}

/// A ground rule `head <- body`
#[derive(Clone, Debug, PartialEq)]
pub enum GroundRule {
    /// Conjunctive or disjunctive body of literals
    Pc {
        /// Head atom
        head: Lit,
        /// Connective
        kind: RuleKind,
        /// Body literals
        body: Vec<Lit>,
        /// Whether the body depends on the definition's own heads
        recursive: bool,
    },
    /// Aggregate body `func(set) >= bound` (lower) or `=< bound`
    Agg {
        /// Head atom
        head: Lit,
        /// Aggregated set
        set: SetId,
        /// Aggregate function
        func: AggFunction,
        /// Whether `bound` is a lower bound
        lower: bool,
        /// The bound
        bound: f64,
        /// Whether the set depends on the definition's own heads
        recursive: bool,
    },
}

impl GroundRule {
    /// Head atom of the rule
    pub fn head(&self) -> Lit {
        match self {
            GroundRule::Pc { head, .. } | GroundRule::Agg { head, .. } => *head,
        }
    }

    /// Returns true for the rule `head <- true`
    pub fn is_true(&self) -> bool {
        matches!(self, GroundRule::Pc { kind: RuleKind::Conj, body, .. } if body.is_empty())
    }

    /// Returns true for the rule `head <- false`
    pub fn is_false(&self) -> bool {
        matches!(self, GroundRule::Pc { kind: RuleKind::Disj, body, .. } if body.is_empty())
    }

    /// Whether the body depends on the definition's own heads
    pub fn is_recursive(&self) -> bool {
        match self {
            GroundRule::Pc { recursive, .. } | GroundRule::Agg { recursive, .. } => *recursive,
        }
    }
}

/// A rule body contributed for a head
#[derive(Clone, Debug, PartialEq)]
pub enum Contribution {
    /// Conjunction or disjunction of literals
    Pc {
        /// Body literals
        body: Vec<Lit>,
        /// Conjunction if true
        conj: bool,
        /// Whether the body depends on the definition's own heads
        recursive: bool,
    },
    /// Aggregate body
    Agg {
        /// Aggregated set
        set: SetId,
        /// Aggregate function
        func: AggFunction,
        /// Whether `bound` is a lower bound
        lower: bool,
        /// The bound
        bound: f64,
        /// Whether the set depends on the definition's own heads
        recursive: bool,
    },
}

impl Contribution {
    fn recursive(&self) -> bool {
        match self {
            Contribution::Pc { recursive, .. } | Contribution::Agg { recursive, .. } => *recursive,
        }
    }

    fn into_rule(self, head: Lit) -> GroundRule {
        match self {
            Contribution::Pc { body, conj, recursive } => GroundRule::Pc {
                head,
                kind: if conj { RuleKind::Conj } else { RuleKind::Disj },
                body,
                recursive,
            },
            Contribution::Agg {
                set,
                func,
                lower,
                bound,
                recursive,
            } => GroundRule::Agg {
                head,
                set,
                func,
                lower,
                bound,
                recursive,
            },
        }
    }
}

/// Names a rule body by a single literal during merging
///
/// Reified bodies are Tseitins of type `Rule` when recursive and `Eq`
/// otherwise.
pub trait Reifier {
    /// Literal for a conjunction or disjunction
    fn reify_pc(&mut self, body: Vec<Lit>, conj: bool, recursive: bool) -> Lit;

    /// Literal for an aggregate body
    fn reify_agg(&mut self, set: SetId, func: AggFunction, lower: bool, bound: f64, recursive: bool) -> Lit;
}

/// Literals of a contribution to be appended to a disjunctive body
fn disjuncts(new: Contribution, reifier: &mut dyn Reifier) -> Vec<Lit> {
    match new {
        Contribution::Pc {
            body,
            conj,
            recursive,
        } => {
            if conj && body.len() > 1 {
                vec![reifier.reify_pc(body, true, recursive)]
            } else {
                body
            }
        }
        Contribution::Agg {
            set,
            func,
            lower,
            bound,
            recursive,
        } => vec![reifier.reify_agg(set, func, lower, bound, recursive)],
    }
}

/// Merges a new contribution into the current rule of `head`
///
/// # Panics
/// Panics on a conjunctive rule with an empty body that is not recognised
/// as statically true, which would be a missed case of the table above.
pub fn merge(head: Lit, current: Option<GroundRule>, new: Contribution, reifier: &mut dyn Reifier) -> GroundRule {
    let current = match current {
        None => return new.into_rule(head),
        Some(rule) if rule.is_true() => return rule,
        Some(rule) if rule.is_false() => return new.into_rule(head),
        Some(rule) => rule,
    };
    match &new {
        Contribution::Pc { body, conj: true, .. } if body.is_empty() => {
            return GroundRule::Pc {
                head,
                kind: RuleKind::Conj,
                body: Vec::new(),
                recursive: false,
            };
        }
        Contribution::Pc { body, conj: false, .. } if body.is_empty() => return current,
        _ => {}
    }

    let recursive = current.is_recursive() || new.recursive();
    let mut body = match current {
        GroundRule::Pc {
            kind: RuleKind::Disj,
            body,
            ..
        } => body,
        GroundRule::Pc {
            kind: RuleKind::Conj,
            body,
            recursive,
            ..
        } => match body.len() {
            0 => unreachable!("empty conjunctive rule for {} passed the true check", head),
            1 => body,
            _ => vec![reifier.reify_pc(body, true, recursive)],
        },
        GroundRule::Agg {
            set,
            func,
            lower,
            bound,
            recursive,
            ..
        } => vec![reifier.reify_agg(set, func, lower, bound, recursive)],
    };
    body.extend(disjuncts(new, reifier));
    GroundRule::Pc {
        head,
        kind: RuleKind::Disj,
        body,
        recursive,
    }
}

/// A ground definition: one rule per head
///
/// Definitions are owned by the ground theory and are never copied.
#[derive(Debug)]
pub struct GroundDefinition {
    id: DefId,
    symbols: Vec<Symbol>,
    rules: FxHashMap<Lit, GroundRule>,
    heads: Vec<Lit>,
    facts: Vec<Lit>,
}

impl GroundDefinition {
    pub(crate) fn new(id: DefId, symbols: Vec<Symbol>) -> Self {
        Self {
            id,
            symbols,
            rules: FxHashMap::default(),
            heads: Vec::new(),
            facts: Vec::new(),
        }
    }

    /// Id of the definition
    pub fn id(&self) -> DefId {
        self.id
    }

    /// Symbols defined by the definition
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Rule of a head, if any
    pub fn rule(&self, head: Lit) -> Option<&GroundRule> {
        self.rules.get(&head)
    }

    /// Rules in order of first contribution
    pub fn rules(&self) -> impl Iterator<Item = &GroundRule> {
        self.heads.iter().filter_map(|h| self.rules.get(h))
    }

    /// Number of rules
    pub fn num_rules(&self) -> usize {
        self.rules.len()
    }

    /// Heads whose rules were statically true and became unit clauses
    pub fn facts(&self) -> &[Lit] {
        &self.facts
    }

    /// Returns true if the head has a rule or became a fact
    pub fn has_head(&self, head: Lit) -> bool {
        self.rules.contains_key(&head) || self.facts.contains(&head)
    }

    /// Definitions own their rules exclusively and cannot be duplicated
    ///
    /// # Panics
    /// Always panics.
    pub fn duplicate(&self) -> GroundDefinition {
        panic!("ground definition {} cannot be duplicated", self.id)
    }

    pub(crate) fn take_rule(&mut self, head: Lit) -> Option<GroundRule> {
        self.rules.remove(&head)
    }

    pub(crate) fn put_rule(&mut self, rule: GroundRule) {
        let head = rule.head();
        if !self.heads.contains(&head) {
            self.heads.push(head);
        }
        self.rules.insert(head, rule);
    }

    /// Removes statically decided rules, returning `(true heads, false heads)`
    pub(crate) fn extract_decided(&mut self) -> (Vec<Lit>, Vec<Lit>) {
        let mut true_heads = Vec::new();
        let mut false_heads = Vec::new();
        for &head in &self.heads {
            match self.rules.get(&head) {
                Some(rule) if rule.is_true() => true_heads.push(head),
                Some(rule) if rule.is_false() => false_heads.push(head),
                _ => {}
            }
        }
        for head in true_heads.iter().chain(&false_heads) {
            self.rules.remove(head);
        }
        self.heads.retain(|h| self.rules.contains_key(h));
        self.facts.extend(true_heads.iter().copied());
        (true_heads, false_heads)
    }
}
