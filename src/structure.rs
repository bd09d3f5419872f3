//! Three-valued structures
//!
//! A [`Structure`] interprets the sorts, predicates and functions of a
//! vocabulary. Sorts get a [`SortTable`], which may be infinite. Predicates
//! get a certainly-true and a certainly-false table; anything in neither is
//! unknown. Functions are interpreted through their graph, which may be
//! two-valued (a possibly partial mapping) or three-valued.
//!
//! Symbols the structure says nothing about are completely unknown.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::ast::{Function, Predicate, Sort, Symbol};
use crate::error::{GroundError, Result};

/// An element of a domain
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DomainElement {
    /// An integer
    Int(i64),
    /// A string constant
    Str(Arc<str>),
}

impl DomainElement {
    /// Creates a string element
    pub fn string(value: &str) -> Self {
        DomainElement::Str(Arc::from(value))
    }

    /// Returns the integer value, if this is an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            DomainElement::Int(i) => Some(*i),
            DomainElement::Str(_) => None,
        }
    }
}

impl fmt::Debug for DomainElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainElement::Int(i) => write!(f, "{}", i),
            DomainElement::Str(s) => write!(f, "{:?}", s),
        }
    }
}

impl fmt::Display for DomainElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainElement::Int(i) => write!(f, "{}", i),
            DomainElement::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for DomainElement {
    fn from(i: i64) -> Self {
        DomainElement::Int(i)
    }
}

impl From<&str> for DomainElement {
    fn from(s: &str) -> Self {
        DomainElement::string(s)
    }
}

/// A tuple of domain elements
pub type ElementTuple = Vec<DomainElement>;

/// The interpretation of a sort
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SortTable {
    /// An explicit finite set of elements, kept sorted
    Finite(Vec<DomainElement>),
    /// The integers `lo..=hi`
    IntRange {
        /// Smallest element
        lo: i64,
        /// Largest element
        hi: i64,
    },
    /// All integers
    AllInts,
    /// All strings
    AllStrings,
}

impl SortTable {
    /// A finite table; duplicates are removed
    pub fn finite(elements: impl IntoIterator<Item = DomainElement>) -> Self {
        let set: BTreeSet<DomainElement> = elements.into_iter().collect();
        SortTable::Finite(set.into_iter().collect())
    }

    /// The integer range `lo..=hi` (empty when `lo > hi`)
    pub fn int_range(lo: i64, hi: i64) -> Self {
        SortTable::IntRange { lo, hi }
    }

    /// Returns true if the table has finitely many elements
    pub fn is_finite(&self) -> bool {
        matches!(self, SortTable::Finite(_) | SortTable::IntRange { .. })
    }

    /// Returns the number of elements, or None for infinite tables
    pub fn size(&self) -> Option<usize> {
        match self {
            SortTable::Finite(elems) => Some(elems.len()),
            SortTable::IntRange { lo, hi } => {
                if lo > hi {
                    Some(0)
                } else {
                    usize::try_from((*hi as i128 - *lo as i128 + 1).min(usize::MAX as i128)).ok()
                }
            }
            SortTable::AllInts | SortTable::AllStrings => None,
        }
    }

    /// Returns true if the table can be enumerated by [`SortTable::nth`]
    pub fn is_enumerable(&self) -> bool {
        !matches!(self, SortTable::AllStrings)
    }

    /// Returns the `n`-th element of the table's enumeration order
    ///
    /// Infinite integer tables are enumerated as `0, 1, -1, 2, -2, ...`.
    pub fn nth(&self, n: usize) -> Option<DomainElement> {
        match self {
            SortTable::Finite(elems) => elems.get(n).cloned(),
            SortTable::IntRange { lo, hi } => {
                let value = lo.checked_add(i64::try_from(n).ok()?)?;
                (value <= *hi).then_some(DomainElement::Int(value))
            }
            SortTable::AllInts => {
                let n = i64::try_from(n).ok()?;
                let half = (n + 1) / 2;
                Some(DomainElement::Int(if n % 2 == 1 { half } else { -half }))
            }
            SortTable::AllStrings => None,
        }
    }

    /// Returns true if the element belongs to the table
    pub fn contains(&self, element: &DomainElement) -> bool {
        match (self, element) {
            (SortTable::Finite(elems), _) => elems.binary_search(element).is_ok(),
            (SortTable::IntRange { lo, hi }, DomainElement::Int(i)) => lo <= i && i <= hi,
            (SortTable::AllInts, DomainElement::Int(_)) => true,
            (SortTable::AllStrings, DomainElement::Str(_)) => true,
            _ => false,
        }
    }

    /// Returns the integer bounds of a finite, purely numeric table
    pub fn int_bounds(&self) -> Option<(i64, i64)> {
        match self {
            SortTable::IntRange { lo, hi } => Some((*lo, *hi)),
            SortTable::Finite(elems) => {
                let mut ints = elems.iter().map(DomainElement::as_int);
                let first = ints.next()??;
                let mut bounds = (first, first);
                for i in ints {
                    let i = i?;
                    bounds = (bounds.0.min(i), bounds.1.max(i));
                }
                Some(bounds)
            }
            SortTable::AllInts | SortTable::AllStrings => None,
        }
    }

    /// Iterates a finite table
    pub fn iter(&self) -> impl Iterator<Item = DomainElement> + '_ {
        let size = if self.is_finite() { self.size().unwrap_or(0) } else { 0 };
        (0..size).filter_map(move |i| self.nth(i))
    }
}

/// Truth value in a three-valued structure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TruthValue {
    /// Certainly true
    True,
    /// Certainly false
    False,
    /// Unknown
    Unknown,
}

/// Interpretation of a predicate (or a function graph)
#[derive(Clone, Debug, Default)]
pub struct PredInter {
    ct: BTreeSet<ElementTuple>,
    cf: BTreeSet<ElementTuple>,
    closed: bool,
}

impl PredInter {
    /// Returns true if the tuple is certainly in the relation
    pub fn is_ct(&self, tuple: &[DomainElement]) -> bool {
        self.ct.contains(tuple)
    }

    /// Returns true if the tuple is certainly not in the relation
    pub fn is_cf(&self, tuple: &[DomainElement]) -> bool {
        if self.closed {
            !self.ct.contains(tuple)
        } else {
            self.cf.contains(tuple)
        }
    }

    /// Returns true if everything outside the certainly-true table is false
    pub fn is_two_valued(&self) -> bool {
        self.closed
    }

    /// Certainly-true tuples, in order
    pub fn ct_tuples(&self) -> impl Iterator<Item = &ElementTuple> {
        self.ct.iter()
    }

    /// Explicitly certainly-false tuples, in order (empty for closed tables)
    pub fn cf_tuples(&self) -> impl Iterator<Item = &ElementTuple> {
        self.cf.iter()
    }
}

/// Value of a function application in a structure
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FuncValue {
    /// The value is known
    Value(DomainElement),
    /// The function is certainly undefined on these arguments
    Undefined,
    /// The value is not known
    Unknown,
}

/// Interpretation of a function
#[derive(Clone, Debug, Default)]
pub struct FuncInter {
    values: BTreeMap<ElementTuple, DomainElement>,
    not_values: BTreeSet<ElementTuple>,
    two_valued: bool,
}

impl FuncInter {
    /// Returns true if every application has a known value or is undefined
    pub fn is_two_valued(&self) -> bool {
        self.two_valued
    }

    /// Returns the value of the application
    pub fn value(&self, args: &[DomainElement]) -> FuncValue {
        match self.values.get(args) {
            Some(v) => FuncValue::Value(v.clone()),
            None if self.two_valued => FuncValue::Undefined,
            None => FuncValue::Unknown,
        }
    }

    /// Returns true if `f(args) = value` is certainly true; the tuple is `args ++ [value]`
    pub fn graph_is_ct(&self, tuple: &[DomainElement]) -> bool {
        let Some((value, args)) = tuple.split_last() else {
            return false;
        };
        self.values.get(args) == Some(value)
    }

    /// Returns true if `f(args) = value` is certainly false; the tuple is `args ++ [value]`
    pub fn graph_is_cf(&self, tuple: &[DomainElement]) -> bool {
        let Some((value, args)) = tuple.split_last() else {
            return false;
        };
        match self.values.get(args) {
            Some(v) => v != value,
            None => self.two_valued || self.not_values.contains(tuple),
        }
    }

    /// Known values as `(args, value)` pairs, in order
    pub fn values(&self) -> impl Iterator<Item = (&ElementTuple, &DomainElement)> {
        self.values.iter()
    }
}

/// A three-valued structure
#[derive(Clone, Debug, Default)]
pub struct Structure {
    sorts: FxHashMap<Sort, SortTable>,
    preds: FxHashMap<Predicate, PredInter>,
    funcs: FxHashMap<Function, FuncInter>,
}

impl Structure {
    /// Creates an empty structure
    pub fn new() -> Self {
        Self::default()
    }

    /// Interprets a sort
    pub fn set_sort(&mut self, sort: &Sort, table: SortTable) {
        self.sorts.insert(sort.clone(), table);
    }

    /// Returns the table of a sort
    pub fn sort_table(&self, sort: &Sort) -> Option<&SortTable> {
        self.sorts.get(sort)
    }

    fn check_tuple(&self, what: &str, sorts: &[Sort], tuple: &[DomainElement]) -> Result<()> {
        if sorts.len() != tuple.len() {
            return Err(GroundError::InvalidArgument(format!(
                "{} expects {} arguments, got {}",
                what,
                sorts.len(),
                tuple.len()
            )));
        }
        for (sort, element) in sorts.iter().zip(tuple) {
            let table = self.sorts.get(sort).ok_or_else(|| {
                GroundError::InvalidArgument(format!("sort {} has no table", sort.name()))
            })?;
            if !table.contains(element) {
                return Err(GroundError::InvalidArgument(format!(
                    "{} is not an element of sort {} (in {})",
                    element,
                    sort.name(),
                    what
                )));
            }
        }
        Ok(())
    }

    /// Makes `pred(tuple)` certainly true
    ///
    /// # Errors
    /// Returns an error if the tuple does not match the predicate's sorts
    pub fn make_true(&mut self, pred: &Predicate, tuple: ElementTuple) -> Result<()> {
        self.check_tuple(pred.name(), pred.sorts(), &tuple)?;
        self.preds.entry(pred.clone()).or_default().ct.insert(tuple);
        Ok(())
    }

    /// Makes `pred(tuple)` certainly false
    ///
    /// # Errors
    /// Returns an error if the tuple does not match the predicate's sorts
    pub fn make_false(&mut self, pred: &Predicate, tuple: ElementTuple) -> Result<()> {
        self.check_tuple(pred.name(), pred.sorts(), &tuple)?;
        self.preds.entry(pred.clone()).or_default().cf.insert(tuple);
        Ok(())
    }

    /// Makes the predicate two-valued: every tuple not certainly true is false
    pub fn close_predicate(&mut self, pred: &Predicate) {
        self.preds.entry(pred.clone()).or_default().closed = true;
    }

    /// Sets the value of `func(args)`
    ///
    /// # Errors
    /// Returns an error if the arguments or the value do not match the sorts
    pub fn set_value(&mut self, func: &Function, args: ElementTuple, value: DomainElement) -> Result<()> {
        self.check_tuple(func.name(), func.arg_sorts(), &args)?;
        self.check_tuple(func.name(), std::slice::from_ref(func.out_sort()), std::slice::from_ref(&value))?;
        self.funcs.entry(func.clone()).or_default().values.insert(args, value);
        Ok(())
    }

    /// Makes `func(args) = value` certainly false
    ///
    /// # Errors
    /// Returns an error if the arguments or the value do not match the sorts
    pub fn make_value_false(&mut self, func: &Function, args: ElementTuple, value: DomainElement) -> Result<()> {
        self.check_tuple(func.name(), func.arg_sorts(), &args)?;
        self.check_tuple(func.name(), std::slice::from_ref(func.out_sort()), std::slice::from_ref(&value))?;
        let mut tuple = args;
        tuple.push(value);
        self.funcs.entry(func.clone()).or_default().not_values.insert(tuple);
        Ok(())
    }

    /// Makes the function two-valued: applications without a value are undefined
    pub fn close_function(&mut self, func: &Function) {
        self.funcs.entry(func.clone()).or_default().two_valued = true;
    }

    /// Returns the interpretation of a predicate, if any
    pub fn pred_inter(&self, pred: &Predicate) -> Option<&PredInter> {
        self.preds.get(pred)
    }

    /// Returns the interpretation of a function, if any
    pub fn func_inter(&self, func: &Function) -> Option<&FuncInter> {
        self.funcs.get(func)
    }

    /// Returns true if the symbol's atoms are all certainly true or false
    pub fn is_two_valued(&self, symbol: &Symbol) -> bool {
        match symbol {
            Symbol::Pred(p) => self.preds.get(p).is_some_and(PredInter::is_two_valued),
            Symbol::Func(f) => self.funcs.get(f).is_some_and(FuncInter::is_two_valued),
        }
    }

    /// Returns the truth value of the atom `symbol(tuple)`
    pub fn truth_value(&self, symbol: &Symbol, tuple: &[DomainElement]) -> TruthValue {
        let (ct, cf) = match symbol {
            Symbol::Pred(p) => match self.preds.get(p) {
                Some(inter) => (inter.is_ct(tuple), inter.is_cf(tuple)),
                None => (false, false),
            },
            Symbol::Func(f) => {
                let out_of_sort = tuple
                    .last()
                    .zip(self.sorts.get(f.out_sort()))
                    .is_some_and(|(v, table)| !table.contains(v));
                match self.funcs.get(f) {
                    Some(inter) => (inter.graph_is_ct(tuple), out_of_sort || inter.graph_is_cf(tuple)),
                    None => (false, out_of_sort),
                }
            }
        };
        match (ct, cf) {
            (true, _) => TruthValue::True,
            (false, true) => TruthValue::False,
            (false, false) => TruthValue::Unknown,
        }
    }

    /// Returns the certainly-true atoms of a symbol, in order
    ///
    /// For functions the tuples are `args ++ [value]`.
    pub fn certain_tuples(&self, symbol: &Symbol) -> Vec<ElementTuple> {
        match symbol {
            Symbol::Pred(p) => self
                .preds
                .get(p)
                .map(|inter| inter.ct_tuples().cloned().collect())
                .unwrap_or_default(),
            Symbol::Func(f) => self
                .funcs
                .get(f)
                .map(|inter| {
                    inter
                        .values()
                        .map(|(args, v)| {
                            let mut tuple = args.clone();
                            tuple.push(v.clone());
                            tuple
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Returns the value of `func(args)`
    pub fn function_value(&self, func: &Function, args: &[DomainElement]) -> FuncValue {
        match self.funcs.get(func) {
            Some(inter) => inter.value(args),
            None => FuncValue::Unknown,
        }
    }

    /// Lists the inconsistencies of this structure
    ///
    /// An interpretation is inconsistent when a tuple is both certainly true
    /// and certainly false, or when a total two-valued function lacks a value
    /// on a finite argument domain.
    pub fn inconsistencies(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (pred, inter) in &self.preds {
            for tuple in inter.ct.intersection(&inter.cf) {
                problems.push(format!("{}{:?} is both true and false", pred.name(), tuple));
            }
        }
        for (func, inter) in &self.funcs {
            for tuple in &inter.not_values {
                if inter.graph_is_ct(tuple) {
                    problems.push(format!("{}{:?} is both true and false", func.name(), tuple));
                }
            }
            if inter.two_valued && !func.is_partial() {
                if let Some(domain) = self.arg_domain(func.arg_sorts()) {
                    for args in domain {
                        if !inter.values.contains_key(&args) {
                            problems.push(format!("total function {} has no value for {:?}", func.name(), args));
                        }
                    }
                }
            }
        }
        problems.sort();
        problems
    }

    /// Returns true if the structure has no inconsistencies
    pub fn is_consistent(&self) -> bool {
        self.inconsistencies().is_empty()
    }

    /// Enumerates the product of finite sort tables
    fn arg_domain(&self, sorts: &[Sort]) -> Option<Vec<ElementTuple>> {
        let mut tuples: Vec<ElementTuple> = vec![Vec::new()];
        for sort in sorts {
            let table = self.sorts.get(sort)?;
            if !table.is_finite() {
                return None;
            }
            let elems: Vec<DomainElement> = table.iter().collect();
            tuples = tuples
                .into_iter()
                .flat_map(|t| {
                    elems.iter().map(move |e| {
                        let mut next = t.clone();
                        next.push(e.clone());
                        next
                    })
                })
                .collect();
        }
        Some(tuples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> DomainElement {
        DomainElement::Int(i)
    }

    #[test]
    fn int_range_table() {
        let t = SortTable::int_range(2, 4);
        assert_eq!(t.size(), Some(3));
        assert_eq!(t.nth(0), Some(int(2)));
        assert_eq!(t.nth(2), Some(int(4)));
        assert_eq!(t.nth(3), None);
        assert!(t.contains(&int(3)));
        assert!(!t.contains(&int(5)));
        assert_eq!(t.int_bounds(), Some((2, 4)));
        assert_eq!(SortTable::int_range(3, 1).size(), Some(0));
    }

    #[test]
    fn infinite_int_enumeration_zigzags() {
        let t = SortTable::AllInts;
        let first: Vec<_> = (0..5).filter_map(|i| t.nth(i)).collect();
        assert_eq!(first, vec![int(0), int(1), int(-1), int(2), int(-2)]);
        assert!(!t.is_finite());
        assert_eq!(t.size(), None);
    }

    #[test]
    fn finite_table_is_sorted_and_deduplicated() {
        let t = SortTable::finite(vec![int(3), int(1), int(3)]);
        assert_eq!(t.iter().collect::<Vec<_>>(), vec![int(1), int(3)]);
        assert_eq!(t.int_bounds(), Some((1, 3)));
        let mixed = SortTable::finite(vec![int(1), DomainElement::string("a")]);
        assert_eq!(mixed.int_bounds(), None);
    }

    #[test]
    fn predicate_truth_values() {
        let s = Sort::new("S");
        let p = Predicate::new("P", vec![s.clone()]);
        let mut structure = Structure::new();
        structure.set_sort(&s, SortTable::int_range(1, 3));
        structure.make_true(&p, vec![int(1)]).unwrap();
        structure.make_false(&p, vec![int(2)]).unwrap();

        let sym = Symbol::Pred(p.clone());
        assert_eq!(structure.truth_value(&sym, &[int(1)]), TruthValue::True);
        assert_eq!(structure.truth_value(&sym, &[int(2)]), TruthValue::False);
        assert_eq!(structure.truth_value(&sym, &[int(3)]), TruthValue::Unknown);

        structure.close_predicate(&p);
        assert_eq!(structure.truth_value(&sym, &[int(3)]), TruthValue::False);
        assert!(structure.is_two_valued(&sym));
    }

    #[test]
    fn rejects_out_of_sort_tuples() {
        let s = Sort::new("S");
        let p = Predicate::new("P", vec![s.clone()]);
        let mut structure = Structure::new();
        structure.set_sort(&s, SortTable::int_range(1, 3));
        assert!(matches!(
            structure.make_true(&p, vec![int(7)]),
            Err(GroundError::InvalidArgument(_))
        ));
        assert!(structure.make_true(&p, vec![int(1), int(2)]).is_err());
    }

    #[test]
    fn function_graph_values() {
        let s = Sort::new("S");
        let f = Function::partial("f", vec![s.clone()], s.clone());
        let mut structure = Structure::new();
        structure.set_sort(&s, SortTable::int_range(1, 3));
        structure.set_value(&f, vec![int(1)], int(2)).unwrap();

        let sym = Symbol::Func(f.clone());
        assert_eq!(structure.truth_value(&sym, &[int(1), int(2)]), TruthValue::True);
        assert_eq!(structure.truth_value(&sym, &[int(1), int(3)]), TruthValue::False);
        assert_eq!(structure.truth_value(&sym, &[int(2), int(3)]), TruthValue::Unknown);
        assert_eq!(structure.function_value(&f, &[int(2)]), FuncValue::Unknown);

        structure.close_function(&f);
        assert_eq!(structure.function_value(&f, &[int(2)]), FuncValue::Undefined);
        assert_eq!(structure.function_value(&f, &[int(1)]), FuncValue::Value(int(2)));
        assert!(structure.is_consistent());
    }

    #[test]
    fn detects_inconsistencies() {
        let s = Sort::new("S");
        let p = Predicate::new("P", vec![s.clone()]);
        let g = Function::new("g", vec![s.clone()], s.clone());
        let mut structure = Structure::new();
        structure.set_sort(&s, SortTable::int_range(1, 2));
        structure.make_true(&p, vec![int(1)]).unwrap();
        structure.make_false(&p, vec![int(1)]).unwrap();
        structure.set_value(&g, vec![int(1)], int(1)).unwrap();
        structure.close_function(&g);

        let problems = structure.inconsistencies();
        assert_eq!(problems.len(), 2);
        assert!(!structure.is_consistent());
    }
}
