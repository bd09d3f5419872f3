//! Literal and term translators
//!
//! The [`GroundTranslator`] numbers ground atoms and Tseitin literals; the
//! [`TermTranslator`] numbers CP variables. Both are created per grounding
//! run and own everything they mint; other components refer to their
//! objects by id.

pub mod literal;
pub mod term;
pub mod tsbody;

pub use literal::{GroundTranslator, TraceEvent, TranslatorStats, WatcherId};
pub use term::{CpBound, CpDomain, CpTerm, TermTranslator, VarId};
pub use tsbody::{one_sided_bound, AtomKind, LazyHandle, SetId, TsBody, TsBodyId, TsSet, TsType};
