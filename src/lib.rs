//! # ground-rs
//!
//! A grounding engine for first-order theories.
//!
//! The engine compiles a first-order theory with inductive definitions,
//! aggregates and integer arithmetic, evaluated against a three-valued
//! structure, into a ground representation a SAT or CP solver can consume:
//! clauses, ground definitional rules, weighted sets, aggregates and CP
//! reifications. Ground atoms and auxiliary (Tseitin) literals are shared
//! through a single literal translator, and the three-valued structure is
//! used to simplify every subformula before any literal is minted.
//!
//! ## Example
//!
//! ```rust
//! use ground_rs::ast::{Formula, Predicate, Sort, Theory, Variable};
//! use ground_rs::engine::{Engine, Options};
//! use ground_rs::structure::{DomainElement, SortTable, Structure};
//!
//! let node = Sort::new("node");
//! let p = Predicate::new("P", vec![node.clone()]);
//! let x = Variable::new("x", node.clone());
//!
//! let mut structure = Structure::new();
//! structure.set_sort(&node, SortTable::int_range(1, 3));
//! structure.make_true(&p, vec![DomainElement::Int(1)]).unwrap();
//!
//! let mut theory = Theory::new();
//! theory.add_sentence(Formula::exists(vec![x.clone()], p.apply(vec![x.term()])));
//!
//! let engine = Engine::new(Options::default());
//! let ground = engine.ground(&theory, &structure).unwrap();
//! // P(1) is certainly true, so the sentence grounds to nothing
//! assert!(ground.clauses().is_empty());
//! ```

#![warn(missing_docs)]
#![warn(rust_2024_compatibility)]

/// Theory AST: vocabulary symbols, terms, formulas, definitions
pub mod ast;

/// Three-valued structures: sort tables and symbol interpretations
pub mod structure;

/// Symbolic possible/certain queries over a structure
pub mod symbolic;

/// Literal and term translators
pub mod translator;

/// Ground theory assembly, rule merging and printing
pub mod theory;

/// Grounder compiler and runtime grounders
pub mod grounder;

/// Grounding engine API, options, statistics and solver adapters
pub mod engine;

/// Error types
pub mod error {
    //! Error types for ground-rs

    use thiserror::Error;

    /// Errors that can occur while building inputs or grounding
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum GroundError {
        /// A structure or theory argument is malformed
        #[error("invalid argument: {0}")]
        InvalidArgument(String),

        /// A construct the grounder cannot handle in the given position
        #[error("unsupported: {0}")]
        Unsupported(String),

        /// Grounding was interrupted through an interrupt handle
        #[error("grounding interrupted")]
        Interrupted,
    }

    /// Result type for ground-rs operations
    pub type Result<T> = std::result::Result<T, GroundError>;
}

pub use error::{GroundError, Result};

/// Signed literal: the sign is the polarity, the magnitude an atom id (never 0)
pub type Lit = i32;
