//! Instance generators for quantified variables
//!
//! A generator binds its variables to every instance that passes its
//! filter query. Instances come either from the product of the sort
//! tables or, when the filter requires a certainly-true atom, from the
//! certainly-true table of that atom's symbol. Generation is resumable:
//! the position is kept in a [`Cursor`], so lazy grounders can stop after
//! any instance and continue later.

use crate::ast::{Sort, Symbol};
use crate::error::{GroundError, Result};
use crate::grounder::{Grounding, VarSlot};
use crate::structure::{DomainElement, ElementTuple, SortTable, Structure};
use crate::symbolic::{Query, QueryTerm, TableKind};

#[derive(Clone, Debug)]
enum Source {
    Product,
    Table { symbol: Symbol, args: Vec<QueryTerm> },
}

#[derive(Clone, Debug)]
enum Position {
    Product { indices: Vec<usize>, started: bool },
    Table { tuples: Vec<ElementTuple>, next: usize },
}

/// Resumable position of a generator
#[derive(Clone, Debug)]
pub struct Cursor {
    position: Position,
    pending: Option<Vec<DomainElement>>,
    exhausted: bool,
}

/// Enumerates instances of a list of variables
#[derive(Clone, Debug)]
pub struct InstGenerator {
    vars: Vec<(VarSlot, Sort)>,
    source: Source,
    filter: Query,
}

impl InstGenerator {
    /// Creates a generator over `vars` keeping the instances that satisfy `filter`
    pub fn new(vars: Vec<(VarSlot, Sort)>, filter: Query, structure: &Structure) -> Self {
        let source = Self::table_source(&vars, &filter, structure).unwrap_or(Source::Product);
        Self { vars, source, filter }
    }

    /// Variables bound by the generator
    pub fn vars(&self) -> &[(VarSlot, Sort)] {
        &self.vars
    }

    /// Returns true if instances come from a symbol's table
    pub fn uses_table(&self) -> bool {
        matches!(self.source, Source::Table { .. })
    }

    /// The filter query
    pub fn filter(&self) -> &Query {
        &self.filter
    }

    fn table_source(vars: &[(VarSlot, Sort)], filter: &Query, structure: &Structure) -> Option<Source> {
        if vars.is_empty() {
            return None;
        }
        let candidates: Vec<&Query> = match filter {
            Query::And(subs) => subs.iter().collect(),
            other => vec![other],
        };
        candidates.into_iter().find_map(|q| {
            let Query::Table { symbol, kind, args } = q else {
                return None;
            };
            let usable = match kind {
                TableKind::CertainlyTrue => true,
                TableKind::PossiblyTrue => structure.is_two_valued(symbol),
                TableKind::CertainlyFalse | TableKind::PossiblyFalse => false,
            };
            let is_quantified = |slot: &VarSlot| vars.iter().any(|(s, _)| s == slot);
            let covers_all = vars
                .iter()
                .all(|(slot, _)| args.iter().any(|a| matches!(a, QueryTerm::Slot(s) if s == slot)));
            let nested_ok = args.iter().all(|a| match a {
                QueryTerm::Slot(_) | QueryTerm::Element(_) => true,
                other => !mentions_slot(other, &is_quantified),
            });
            (usable && covers_all && nested_ok).then(|| Source::Table {
                symbol: symbol.clone(),
                args: args.clone(),
            })
        })
    }

    fn tables<'s>(&self, structure: &'s Structure) -> Result<Vec<&'s SortTable>> {
        self.vars
            .iter()
            .map(|(_, sort)| {
                let table = structure
                    .sort_table(sort)
                    .ok_or_else(|| GroundError::InvalidArgument(format!("sort {} has no table", sort.name())))?;
                if !table.is_enumerable() {
                    return Err(GroundError::Unsupported(format!(
                        "quantification over the non-enumerable sort {}",
                        sort.name()
                    )));
                }
                Ok(table)
            })
            .collect()
    }

    /// Starts a new enumeration
    ///
    /// # Errors
    /// Fails if a sort has no table or cannot be enumerated.
    pub fn start(&self, structure: &Structure) -> Result<Cursor> {
        self.tables(structure)?;
        let position = match &self.source {
            Source::Product => Position::Product {
                indices: vec![0; self.vars.len()],
                started: false,
            },
            Source::Table { symbol, .. } => Position::Table {
                tuples: structure.certain_tuples(symbol),
                next: 0,
            },
        };
        Ok(Cursor {
            position,
            pending: None,
            exhausted: false,
        })
    }

    /// Binds the variables to the next instance; false when there is none
    ///
    /// Also returns false once grounding was interrupted.
    pub fn next(&self, g: &mut Grounding<'_>, cursor: &mut Cursor) -> bool {
        if let Some(values) = cursor.pending.take() {
            for ((slot, _), value) in self.vars.iter().zip(values) {
                g.env.bind(*slot, value);
            }
            return true;
        }
        self.advance(g, cursor)
    }

    /// Returns true if another instance exists, without disturbing the current bindings
    pub fn has_next(&self, g: &mut Grounding<'_>, cursor: &mut Cursor) -> bool {
        if cursor.pending.is_some() {
            return true;
        }
        let slots: Vec<VarSlot> = self.vars.iter().map(|(s, _)| *s).collect();
        let saved = g.env.snapshot(&slots);
        let found = self.advance(g, cursor);
        if found {
            cursor.pending = Some(slots.iter().map(|s| g.env.get(*s).clone()).collect());
        }
        g.env.reinstate(&saved);
        found
    }

    fn advance(&self, g: &mut Grounding<'_>, cursor: &mut Cursor) -> bool {
        let structure = g.structure();
        while !cursor.exhausted {
            if g.poll() {
                return false;
            }
            let candidate = match &mut cursor.position {
                Position::Product { indices, started } => self.next_product(structure, indices, started),
                Position::Table { tuples, next } => match tuples.get(*next) {
                    Some(tuple) => {
                        *next += 1;
                        Some(self.match_tuple(structure, g, tuple))
                    }
                    None => None,
                },
            };
            match candidate {
                None => cursor.exhausted = true,
                Some(None) => {}
                Some(Some(values)) => {
                    for ((slot, _), value) in self.vars.iter().zip(values) {
                        g.env.bind(*slot, value);
                    }
                    if self.filter.eval(structure, &mut g.env) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Next tuple of the product; None when exhausted
    #[allow(clippy::option_option)]
    fn next_product(&self, structure: &Structure, indices: &mut [usize], started: &mut bool) -> Option<Option<Vec<DomainElement>>> {
        let tables: Vec<&SortTable> = self
            .vars
            .iter()
            .map(|(_, sort)| structure.sort_table(sort))
            .collect::<Option<_>>()?;
        if !*started {
            *started = true;
        } else {
            let mut i = indices.len();
            loop {
                if i == 0 {
                    return None;
                }
                i -= 1;
                indices[i] += 1;
                if tables[i].nth(indices[i]).is_some() {
                    break;
                }
                indices[i] = 0;
            }
        }
        let values: Option<Vec<DomainElement>> = tables.iter().zip(indices.iter()).map(|(t, &n)| t.nth(n)).collect();
        // an empty sort makes the product empty
        values.map(Some)
    }

    /// Values of the quantified variables for a table tuple, or None if it does not match
    fn match_tuple(&self, structure: &Structure, g: &Grounding<'_>, tuple: &[DomainElement]) -> Option<Vec<DomainElement>> {
        let Source::Table { args, .. } = &self.source else {
            return None;
        };
        if args.len() != tuple.len() {
            return None;
        }
        let mut values: Vec<Option<DomainElement>> = vec![None; self.vars.len()];
        for (arg, element) in args.iter().zip(tuple) {
            let quantified = match arg {
                QueryTerm::Slot(s) => self.vars.iter().position(|(v, _)| v == s),
                _ => None,
            };
            match quantified {
                Some(i) => match &values[i] {
                    Some(existing) if existing != element => return None,
                    Some(_) => {}
                    None => {
                        let fits = structure
                            .sort_table(&self.vars[i].1)
                            .is_some_and(|t| t.contains(element));
                        if !fits {
                            return None;
                        }
                        values[i] = Some(element.clone());
                    }
                },
                None => {
                    if arg.eval(structure, &g.env).as_ref() != Some(element) {
                        return None;
                    }
                }
            }
        }
        values.into_iter().collect()
    }
}

fn mentions_slot(term: &QueryTerm, is_quantified: &impl Fn(&VarSlot) -> bool) -> bool {
    match term {
        QueryTerm::Slot(s) => is_quantified(s),
        QueryTerm::Element(_) => false,
        QueryTerm::App { args, .. } => args.iter().any(|a| mentions_slot(a, is_quantified)),
        QueryTerm::Arith { left, right, .. } => mentions_slot(left, is_quantified) || mentions_slot(right, is_quantified),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Predicate;
    use crate::theory::GroundTheory;

    fn setup() -> (Sort, Predicate, Structure) {
        let s = Sort::new("S");
        let p = Predicate::new("P", vec![s.clone(), s.clone()]);
        let mut structure = Structure::new();
        structure.set_sort(&s, SortTable::int_range(1, 3));
        structure.make_true(&p, vec![DomainElement::Int(1), DomainElement::Int(2)]).unwrap();
        structure.make_true(&p, vec![DomainElement::Int(2), DomainElement::Int(2)]).unwrap();
        structure.make_true(&p, vec![DomainElement::Int(3), DomainElement::Int(1)]).unwrap();
        (s, p, structure)
    }

    fn collect(gen: &InstGenerator, g: &mut Grounding<'_>) -> Vec<Vec<i64>> {
        let mut cursor = gen.start(g.structure()).unwrap();
        let mut seen = Vec::new();
        while gen.next(g, &mut cursor) {
            seen.push(
                gen.vars()
                    .iter()
                    .map(|(s, _)| g.env.get(*s).as_int().unwrap())
                    .collect(),
            );
        }
        seen
    }

    #[test]
    fn product_enumerates_in_order() {
        let (s, _, structure) = setup();
        let mut g = Grounding::new(&structure, GroundTheory::materialized());
        let gen = InstGenerator::new(
            vec![(VarSlot(0), s.clone()), (VarSlot(1), s)],
            Query::Const(true),
            &structure,
        );
        let all = collect(&gen, &mut g);
        assert_eq!(all.len(), 9);
        assert_eq!(all[0], vec![1, 1]);
        assert_eq!(all[1], vec![1, 2]);
        assert_eq!(all[8], vec![3, 3]);
    }

    #[test]
    fn certain_tables_drive_generation() {
        let (s, p, structure) = setup();
        let mut g = Grounding::new(&structure, GroundTheory::materialized());
        // P(x, x)
        let filter = Query::Table {
            symbol: Symbol::Pred(p),
            kind: TableKind::CertainlyTrue,
            args: vec![QueryTerm::Slot(VarSlot(0)), QueryTerm::Slot(VarSlot(0))],
        };
        let gen = InstGenerator::new(vec![(VarSlot(0), s)], filter, &structure);
        assert!(gen.uses_table());
        assert_eq!(collect(&gen, &mut g), vec![vec![2]]);
    }

    #[test]
    fn outer_bindings_restrict_table_matches() {
        let (s, p, structure) = setup();
        let mut g = Grounding::new(&structure, GroundTheory::materialized());
        g.env.bind(VarSlot(5), DomainElement::Int(2));
        // P(x, y) with y bound outside
        let filter = Query::Table {
            symbol: Symbol::Pred(p),
            kind: TableKind::CertainlyTrue,
            args: vec![QueryTerm::Slot(VarSlot(0)), QueryTerm::Slot(VarSlot(5))],
        };
        let gen = InstGenerator::new(vec![(VarSlot(0), s)], filter, &structure);
        assert_eq!(collect(&gen, &mut g), vec![vec![1], vec![2]]);
    }

    #[test]
    fn lookahead_keeps_current_bindings() {
        let (s, _, structure) = setup();
        let mut g = Grounding::new(&structure, GroundTheory::materialized());
        let gen = InstGenerator::new(vec![(VarSlot(0), s)], Query::Const(true), &structure);
        let mut cursor = gen.start(&structure).unwrap();
        assert!(gen.next(&mut g, &mut cursor));
        assert!(gen.has_next(&mut g, &mut cursor));
        assert_eq!(g.env.get(VarSlot(0)), &DomainElement::Int(1));
        assert!(gen.next(&mut g, &mut cursor));
        assert_eq!(g.env.get(VarSlot(0)), &DomainElement::Int(2));
        assert!(gen.next(&mut g, &mut cursor));
        assert!(!gen.has_next(&mut g, &mut cursor));
        assert!(!gen.next(&mut g, &mut cursor));
    }

    #[test]
    fn missing_and_string_sorts_are_errors() {
        let structure = Structure::new();
        let gen = InstGenerator::new(vec![(VarSlot(0), Sort::new("T"))], Query::Const(true), &structure);
        assert!(matches!(gen.start(&structure), Err(GroundError::InvalidArgument(_))));

        let mut structure = Structure::new();
        let t = Sort::new("T");
        structure.set_sort(&t, SortTable::AllStrings);
        let gen = InstGenerator::new(vec![(VarSlot(0), t)], Query::Const(true), &structure);
        assert!(matches!(gen.start(&structure), Err(GroundError::Unsupported(_))));
    }
}
