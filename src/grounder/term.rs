//! Term grounders

use crate::ast::{ArithOp, Function};
use crate::grounder::{Grounding, VarSlot};
use crate::structure::{DomainElement, FuncValue};
use crate::translator::{CpDomain, VarId};

/// Value of a ground term
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroundTerm {
    /// A known domain element
    Element(DomainElement),
    /// A partial function applied outside its domain, or a failed arithmetic operation
    Undefined,
    /// A linear combination of CP variables plus a constant
    Linear {
        /// Variables with their coefficients
        vars: Vec<(VarId, i64)>,
        /// Constant part
        constant: i64,
    },
}

impl GroundTerm {
    fn linear(self) -> Option<(Vec<(VarId, i64)>, i64)> {
        match self {
            GroundTerm::Element(DomainElement::Int(c)) => Some((Vec::new(), c)),
            GroundTerm::Linear { vars, constant } => Some((vars, constant)),
            GroundTerm::Element(DomainElement::Str(_)) | GroundTerm::Undefined => None,
        }
    }
}

/// Grounds a term for the current variable bindings
pub trait TermGrounder {
    /// Value of the term
    fn run(&self, g: &mut Grounding<'_>) -> GroundTerm;
}

/// A variable
pub struct VarTermGrounder {
    slot: VarSlot,
}

impl VarTermGrounder {
    /// Reads the given slot
    pub fn new(slot: VarSlot) -> Self {
        Self { slot }
    }
}

impl TermGrounder for VarTermGrounder {
    fn run(&self, g: &mut Grounding<'_>) -> GroundTerm {
        GroundTerm::Element(g.env.get(self.slot).clone())
    }
}

/// A constant
pub struct ElementTermGrounder {
    element: DomainElement,
}

impl ElementTermGrounder {
    /// Always yields `element`
    pub fn new(element: DomainElement) -> Self {
        Self { element }
    }
}

impl TermGrounder for ElementTermGrounder {
    fn run(&self, _g: &mut Grounding<'_>) -> GroundTerm {
        GroundTerm::Element(self.element.clone())
    }
}

/// A function application
///
/// Known values come from the structure. With a CP domain, an unknown
/// value becomes a CP variable instead.
pub struct FuncTermGrounder {
    func: Function,
    args: Vec<Box<dyn TermGrounder>>,
    cp: Option<CpDomain>,
}

impl FuncTermGrounder {
    /// Evaluates `func(args)` in the structure
    pub fn new(func: Function, args: Vec<Box<dyn TermGrounder>>) -> Self {
        Self { func, args, cp: None }
    }

    /// Evaluates `func(args)`, falling back to a CP variable over `domain`
    pub fn with_cp(func: Function, args: Vec<Box<dyn TermGrounder>>, domain: CpDomain) -> Self {
        Self {
            func,
            args,
            cp: Some(domain),
        }
    }
}

impl TermGrounder for FuncTermGrounder {
    fn run(&self, g: &mut Grounding<'_>) -> GroundTerm {
        if g.poll() {
            return GroundTerm::Undefined;
        }
        let mut values = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            match arg.run(g) {
                GroundTerm::Element(e) => values.push(e),
                GroundTerm::Undefined => return GroundTerm::Undefined,
                GroundTerm::Linear { .. } => unreachable!("CP variable as argument of {}", self.func),
            }
        }
        match (g.structure().function_value(&self.func, &values), self.cp) {
            (FuncValue::Value(v), _) => GroundTerm::Element(v),
            (FuncValue::Undefined, _) => GroundTerm::Undefined,
            (FuncValue::Unknown, Some(domain)) => {
                let var = g.theory_mut().terms_mut().translate(&self.func, values, domain);
                GroundTerm::Linear {
                    vars: vec![(var, 1)],
                    constant: 0,
                }
            }
            (FuncValue::Unknown, None) => {
                log::debug!(target: crate::engine::targets::GROUNDER, "no value for {} treated as undefined", self.func);
                GroundTerm::Undefined
            }
        }
    }
}

/// Integer arithmetic
pub struct ArithTermGrounder {
    op: ArithOp,
    left: Box<dyn TermGrounder>,
    right: Box<dyn TermGrounder>,
}

impl ArithTermGrounder {
    /// `left op right`
    pub fn new(op: ArithOp, left: Box<dyn TermGrounder>, right: Box<dyn TermGrounder>) -> Self {
        Self { op, left, right }
    }

    fn overflow(&self, g: &mut Grounding<'_>) -> GroundTerm {
        g.warn(format!("arithmetic overflow in {:?}, value treated as undefined", self.op));
        GroundTerm::Undefined
    }
}

fn scale(vars: &mut [(VarId, i64)], factor: i64) -> Option<()> {
    for (_, w) in vars.iter_mut() {
        *w = w.checked_mul(factor)?;
    }
    Some(())
}

fn add_linear(into: &mut Vec<(VarId, i64)>, vars: Vec<(VarId, i64)>) -> Option<()> {
    for (v, w) in vars {
        match into.iter_mut().find(|(u, _)| *u == v) {
            Some((_, existing)) => *existing = existing.checked_add(w)?,
            None => into.push((v, w)),
        }
    }
    into.retain(|(_, w)| *w != 0);
    Some(())
}

impl TermGrounder for ArithTermGrounder {
    fn run(&self, g: &mut Grounding<'_>) -> GroundTerm {
        let left = self.left.run(g);
        let right = self.right.run(g);
        if let (GroundTerm::Element(l), GroundTerm::Element(r)) = (&left, &right) {
            let (Some(l), Some(r)) = (l.as_int(), r.as_int()) else {
                return GroundTerm::Undefined;
            };
            return match self.op.apply(l, r) {
                Some(v) => GroundTerm::Element(DomainElement::Int(v)),
                None => self.overflow(g),
            };
        }
        let (Some((mut lv, lc)), Some((mut rv, rc))) = (left.linear(), right.linear()) else {
            return GroundTerm::Undefined;
        };
        let result = match self.op {
            ArithOp::Add => add_linear(&mut lv, rv).and_then(|_| lc.checked_add(rc)),
            ArithOp::Sub => scale(&mut rv, -1)
                .and_then(|_| add_linear(&mut lv, rv))
                .and_then(|_| lc.checked_sub(rc)),
            ArithOp::Mul => match (lv.is_empty(), rv.is_empty()) {
                (true, _) => {
                    let factor = lc;
                    lv = rv;
                    scale(&mut lv, factor).and_then(|_| factor.checked_mul(rc))
                }
                (_, true) => scale(&mut lv, rc).and_then(|_| lc.checked_mul(rc)),
                (false, false) => unreachable!("product of two CP terms is not linear"),
            },
        };
        match result {
            Some(constant) if lv.is_empty() => GroundTerm::Element(DomainElement::Int(constant)),
            Some(constant) => GroundTerm::Linear { vars: lv, constant },
            None => self.overflow(g),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Sort;
    use crate::structure::{SortTable, Structure};
    use crate::theory::GroundTheory;

    fn int(i: i64) -> Box<dyn TermGrounder> {
        Box::new(ElementTermGrounder::new(DomainElement::Int(i)))
    }

    #[test]
    fn arithmetic_on_known_values() {
        let structure = Structure::new();
        let mut g = Grounding::new(&structure, GroundTheory::materialized());
        let t = ArithTermGrounder::new(ArithOp::Mul, int(6), int(7));
        assert_eq!(t.run(&mut g), GroundTerm::Element(DomainElement::Int(42)));
        let overflow = ArithTermGrounder::new(ArithOp::Add, int(i64::MAX), int(1));
        assert_eq!(overflow.run(&mut g), GroundTerm::Undefined);
        assert_eq!(g.warnings().len(), 1);
    }

    #[test]
    fn functions_read_the_structure() {
        let s = Sort::new("S");
        let f = Function::partial("f", vec![s.clone()], s.clone());
        let mut structure = Structure::new();
        structure.set_sort(&s, SortTable::int_range(0, 3));
        structure.set_value(&f, vec![DomainElement::Int(1)], DomainElement::Int(2)).unwrap();
        structure.close_function(&f);
        let mut g = Grounding::new(&structure, GroundTheory::materialized());
        let at1 = FuncTermGrounder::new(f.clone(), vec![int(1)]);
        let at2 = FuncTermGrounder::new(f, vec![int(2)]);
        assert_eq!(at1.run(&mut g), GroundTerm::Element(DomainElement::Int(2)));
        assert_eq!(at2.run(&mut g), GroundTerm::Undefined);
    }

    #[test]
    fn unknown_values_become_linear_cp_terms() {
        let s = Sort::new("S");
        let f = Function::new("f", vec![s.clone()], s.clone());
        let mut structure = Structure::new();
        structure.set_sort(&s, SortTable::int_range(0, 3));
        let mut g = Grounding::new(&structure, GroundTheory::materialized());
        let domain = CpDomain { lo: 0, hi: 3 };
        let fx = || -> Box<dyn TermGrounder> { Box::new(FuncTermGrounder::with_cp(f.clone(), vec![int(1)], domain)) };
        // 2 * f(1) - f(1) + 5
        let t = ArithTermGrounder::new(
            ArithOp::Add,
            Box::new(ArithTermGrounder::new(
                ArithOp::Sub,
                Box::new(ArithTermGrounder::new(ArithOp::Mul, int(2), fx())),
                fx(),
            )),
            int(5),
        );
        assert_eq!(
            t.run(&mut g),
            GroundTerm::Linear {
                vars: vec![(VarId(0), 1)],
                constant: 5
            }
        );
        assert_eq!(g.theory().terms().num_vars(), 1);
    }
}
