//! Grounder compiler
//!
//! [`GrounderFactory`] walks the theory once and builds the grounder tree.
//! The [`GroundingContext`] is passed down by value; every descent builds
//! a modified copy for the child. Leaves are rewritten against the
//! structure first, so only predicate atoms, graph atoms, comparisons and
//! aggregate formulas get leaf grounders. Every leaf and quantifier gets
//! pre-filters from the symbolic layer.

use std::rc::Rc;

use log::{debug, warn};
use rustc_hash::FxHashSet;

use crate::ast::transform::{normalize, normalize_rule, VariableFactory};
use crate::ast::visitor::{free_variables, mentions_any};
use crate::ast::{Definition, Formula, QuantKind, SetExpr, Sort, Symbol, Term, Theory, Variable};
use crate::engine::{targets, Options};
use crate::error::{GroundError, Result};
use crate::grounder::context::{Context, GenType, GroundingContext};
use crate::grounder::environment::{SlotTable, VarEnv, VarSlot};
use crate::grounder::formula::{
    AggGrounder, AtomGrounder, BoolGrounder, ComparisonGrounder, ConstGrounder, EquivGrounder, QuantGrounder,
};
use crate::grounder::generator::InstGenerator;
use crate::grounder::lazy::LazyQuantGrounder;
use crate::grounder::rewrite::{Leaf, Rewriter};
use crate::grounder::rule::{DefinitionGrounder, RuleBody, RuleGrounder};
use crate::grounder::set::{EnumSetGrounder, Member, QuantSetGrounder, SetGrounder};
use crate::grounder::term::{ArithTermGrounder, ElementTermGrounder, FuncTermGrounder, TermGrounder, VarTermGrounder};
use crate::grounder::FormulaGrounder;
use crate::structure::Structure;
use crate::symbolic::{Query, QueryBuilder};
use crate::translator::{CpDomain, TsType};

/// The compiled grounder tree of a theory
pub struct TheoryGrounder {
    sentences: Vec<Box<dyn FormulaGrounder>>,
    definitions: Vec<DefinitionGrounder>,
    env_size: usize,
    warnings: Vec<String>,
}

impl TheoryGrounder {
    /// Sentence grounders, in theory order
    pub fn sentences(&self) -> &[Box<dyn FormulaGrounder>] {
        &self.sentences
    }

    /// Definition grounders, in theory order
    pub fn definitions(&self) -> &[DefinitionGrounder] {
        &self.definitions
    }

    /// An environment with a slot for every compiled variable
    pub fn new_env(&self) -> VarEnv {
        VarEnv::with_slots(self.env_size)
    }

    /// Warnings raised while compiling
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Builds grounder trees
pub struct GrounderFactory<'a> {
    structure: &'a Structure,
    options: &'a Options,
    defined: Rc<FxHashSet<Symbol>>,
    slots: SlotTable,
    factory: VariableFactory,
    warnings: Vec<String>,
}

impl<'a> GrounderFactory<'a> {
    /// Creates a factory for theories whose defined symbols are those of `theory`
    pub fn new(structure: &'a Structure, theory: &Theory, options: &'a Options) -> Self {
        let defined: FxHashSet<Symbol> = theory
            .definitions
            .iter()
            .flat_map(|d| d.defined_symbols())
            .map(Symbol::Pred)
            .collect();
        Self {
            structure,
            options,
            defined: Rc::new(defined),
            slots: SlotTable::new(),
            factory: VariableFactory::new(),
            warnings: Vec::new(),
        }
    }

    /// Compiles `theory` against `structure`
    ///
    /// # Errors
    /// Fails on sentences with free variables, sorts without a table and
    /// constructs the grounder cannot place.
    pub fn create(structure: &'a Structure, theory: &Theory, options: &'a Options) -> Result<TheoryGrounder> {
        Self::new(structure, theory, options).compile(theory)
    }

    /// Compiles every sentence, then every definition
    pub fn compile(mut self, theory: &Theory) -> Result<TheoryGrounder> {
        let mut sentences = Vec::with_capacity(theory.sentences.len());
        for sentence in &theory.sentences {
            sentences.push(self.sentence(sentence)?);
        }
        let mut definitions = Vec::with_capacity(theory.definitions.len());
        for definition in &theory.definitions {
            definitions.push(self.definition(definition)?);
        }
        debug!(
            target: targets::GROUNDER,
            "compiled {} sentences and {} definitions, {} variable slots, {} fresh variables",
            sentences.len(),
            definitions.len(),
            self.slots.size(),
            self.factory.count()
        );
        Ok(TheoryGrounder {
            sentences,
            definitions,
            env_size: self.slots.size(),
            warnings: self.warnings,
        })
    }

    fn warn(&mut self, message: String) {
        warn!(target: targets::GROUNDER, "{}", message);
        self.warnings.push(message);
    }

    fn check_sorts(&mut self, vars: &[Variable]) -> Result<()> {
        for var in vars {
            let finite = match self.structure.sort_table(var.sort()) {
                Some(table) => table.is_finite(),
                None => {
                    return Err(GroundError::InvalidArgument(format!(
                        "sort {} of variable {} has no table",
                        var.sort().name(),
                        var
                    )))
                }
            };
            if !finite {
                self.warn(format!(
                    "variable {} ranges over the infinite sort {}, grounding may not terminate",
                    var,
                    var.sort().name()
                ));
            }
        }
        Ok(())
    }

    fn sentence(&mut self, sentence: &Formula) -> Result<Box<dyn FormulaGrounder>> {
        let free = free_variables(sentence);
        if let Some(v) = free.first() {
            return Err(GroundError::InvalidArgument(format!("sentence {} has free variable {}", sentence, v)));
        }
        let ctx = GroundingContext::sentence(self.defined.clone());
        self.formula(normalize(sentence.clone()), ctx)
    }

    fn formula(&mut self, formula: Formula, ctx: GroundingContext) -> Result<Box<dyn FormulaGrounder>> {
        match formula {
            Formula::Constant(b) => Ok(Box::new(ConstGrounder::new(b))),
            Formula::Bool { sign, conj, subs } if sign.is_pos() => {
                let child = ctx.child(conj);
                let subs = subs
                    .into_iter()
                    .map(|s| self.formula(s, child.clone()))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Box::new(BoolGrounder::new(conj, subs, ctx)))
            }
            Formula::Quant { sign, kind, vars, body } if sign.is_pos() => self.quant(kind, vars, *body, ctx),
            Formula::Equiv { sign, left, right } if sign.is_pos() => {
                let both = ctx.both();
                let left = self.formula(*left, both.clone())?;
                let right = self.formula(*right, both)?;
                Ok(Box::new(EquivGrounder::new(left, right, ctx)))
            }
            f @ (Formula::Bool { .. } | Formula::Quant { .. } | Formula::Equiv { .. }) => {
                self.formula(normalize(f), ctx)
            }
            leaf => self.leaf(leaf, ctx),
        }
    }

    fn quant(
        &mut self,
        kind: QuantKind,
        vars: Vec<Variable>,
        body: Formula,
        ctx: GroundingContext,
    ) -> Result<Box<dyn FormulaGrounder>> {
        if vars.is_empty() {
            return self.formula(body, ctx);
        }
        self.check_sorts(&vars)?;
        let conj = kind == QuantKind::Forall;
        let defined = self.defined.clone();
        let queries = QueryBuilder::new(self.structure, &defined, self.options.max_query_enumeration);
        let whole = Formula::quant(kind, vars.clone(), body.clone());
        let certainly_true = queries.certainly(&whole, true, &mut self.slots);
        let certainly_false = queries.certainly(&whole, false, &mut self.slots);

        let slots = self.slots.enter_all(&vars);
        // instances that can decide the quantifier
        let filter = queries.possibly(&body, !conj, &mut self.slots);
        let generator = InstGenerator::new(pairs(&slots, &vars), filter, self.structure);
        let body_ctx = ctx.child(conj);
        let body_grounder = self.formula(body, body_ctx.clone());
        self.slots.exit(vars.len());
        let body_grounder = body_grounder?;

        let lazy = !conj
            && self.options.lazy_quantifiers
            && ctx.tseitin == TsType::Impl
            && ctx.monotone == Context::Positive
            && !ctx.in_definition();
        if lazy {
            return Ok(Box::new(LazyQuantGrounder::new(
                generator,
                body_grounder,
                certainly_true,
                certainly_false,
                body_ctx.tseitin,
            )));
        }
        Ok(Box::new(QuantGrounder::new(
            conj,
            generator,
            body_grounder,
            certainly_true,
            certainly_false,
            ctx,
        )))
    }

    fn leaf(&mut self, leaf: Formula, ctx: GroundingContext) -> Result<Box<dyn FormulaGrounder>> {
        let defined = self.defined.clone();
        let rewritten = Rewriter::new(self.structure, &defined, &mut self.factory, self.options.cp_support)
            .rewrite(leaf, &ctx)?;
        match rewritten {
            Leaf::Rewritten(f) => self.formula(normalize(f), ctx),
            Leaf::Cp(f) => self.comparison(f, &ctx, true),
            Leaf::Ready(f @ (Formula::Atom { .. } | Formula::Graph { .. })) => self.atom(f, &ctx),
            Leaf::Ready(f @ Formula::Compare { .. }) => self.comparison(f, &ctx, false),
            Leaf::Ready(f @ Formula::Agg { .. }) => Ok(Box::new(self.aggregate(f, &ctx)?)),
            Leaf::Ready(f) => self.formula(f, ctx),
        }
    }

    fn atom(&mut self, leaf: Formula, ctx: &GroundingContext) -> Result<Box<dyn FormulaGrounder>> {
        let defined = self.defined.clone();
        let queries = QueryBuilder::new(self.structure, &defined, self.options.max_query_enumeration);
        let direction = ctx.gentype == GenType::CanMakeTrue;
        let (symbol, sign, terms) = match &leaf {
            Formula::Atom { sign, pred, args } => (Symbol::Pred(pred.clone()), *sign, args.clone()),
            Formula::Graph { sign, func, args, value } => {
                let mut terms = args.clone();
                terms.push(value.clone());
                (Symbol::Func(func.clone()), *sign, terms)
            }
            other => unreachable!("{} is not an atom", other),
        };
        let (possible, certain) = if ctx.is_defined(&symbol) {
            (Query::Const(true), Query::Const(false))
        } else {
            (
                queries.possibly(&leaf, direction, &mut self.slots),
                queries.certainly(&leaf, direction, &mut self.slots),
            )
        };
        let args = terms
            .iter()
            .map(|t| self.term(t, false))
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(AtomGrounder::new(
            symbol,
            sign,
            args,
            Box::new(possible),
            Box::new(certain),
            ctx,
        )))
    }

    fn comparison(&mut self, leaf: Formula, ctx: &GroundingContext, cp: bool) -> Result<Box<dyn FormulaGrounder>> {
        let Formula::Compare { sign, left, op, right } = leaf else {
            unreachable!("{} is not a comparison", leaf)
        };
        let left = self.term(&left, cp)?;
        let right = self.term(&right, cp)?;
        Ok(Box::new(ComparisonGrounder::new(left, op, right, sign, ctx)))
    }

    fn aggregate(&mut self, leaf: Formula, ctx: &GroundingContext) -> Result<AggGrounder> {
        let Formula::Agg { sign, bound, op, agg } = leaf else {
            unreachable!("{} is not an aggregate formula", leaf)
        };
        let bound = self.term(&bound, false)?;
        let set = self.set(&agg.set, ctx)?;
        Ok(AggGrounder::new(sign, bound, op, agg.func, set, ctx))
    }

    fn set(&mut self, set: &SetExpr, ctx: &GroundingContext) -> Result<Vec<Box<dyn SetGrounder>>> {
        let cond_ctx = GroundingContext {
            gentype: GenType::CanMakeTrue,
            ..ctx.both()
        };
        let defined = self.defined.clone();
        let mut grounders: Vec<Box<dyn SetGrounder>> = Vec::new();
        let mut members = Vec::new();
        for part in &set.parts {
            self.check_sorts(&part.vars)?;
            let queries = QueryBuilder::new(self.structure, &defined, self.options.max_query_enumeration);
            let condition = normalize(part.condition.clone());
            let slots = self.slots.enter_all(&part.vars);
            let possible = queries.possibly(&condition, true, &mut self.slots);
            let certain = queries.certainly(&condition, true, &mut self.slots);
            let grounded = self
                .formula(condition, cond_ctx.clone())
                .and_then(|c| Ok((c, self.term(&part.weight, false)?)));
            self.slots.exit(part.vars.len());
            let (condition, weight) = grounded?;
            if part.vars.is_empty() {
                members.push(Member::new(condition, weight, possible, certain, cond_ctx.tseitin));
            } else {
                let generator = InstGenerator::new(pairs(&slots, &part.vars), possible.clone(), self.structure);
                let member = Member::new(condition, weight, possible, certain, cond_ctx.tseitin);
                grounders.push(Box::new(QuantSetGrounder::new(generator, member)));
            }
        }
        if !members.is_empty() {
            grounders.insert(0, Box::new(EnumSetGrounder::new(members)));
        }
        Ok(grounders)
    }

    fn term(&mut self, term: &Term, cp: bool) -> Result<Box<dyn TermGrounder>> {
        match term {
            Term::Var(v) => match self.slots.lookup(v) {
                Some(slot) => Ok(Box::new(VarTermGrounder::new(slot))),
                None => Err(GroundError::InvalidArgument(format!("variable {} is not bound", v))),
            },
            Term::Element(e) => Ok(Box::new(ElementTermGrounder::new(e.clone()))),
            Term::App { func, args } => {
                let args = args
                    .iter()
                    .map(|a| self.term(a, false))
                    .collect::<Result<Vec<_>>>()?;
                let domain = self
                    .structure
                    .sort_table(func.out_sort())
                    .and_then(|t| t.int_bounds())
                    .map(|(lo, hi)| CpDomain { lo, hi });
                match domain {
                    Some(domain) if cp => Ok(Box::new(FuncTermGrounder::with_cp(func.clone(), args, domain))),
                    _ => Ok(Box::new(FuncTermGrounder::new(func.clone(), args))),
                }
            }
            Term::Arith { op, left, right } => {
                let left = self.term(left, cp)?;
                let right = self.term(right, cp)?;
                Ok(Box::new(ArithTermGrounder::new(*op, left, right)))
            }
            Term::Agg(agg) => Err(GroundError::Unsupported(format!("aggregate {} outside a comparison", agg))),
        }
    }

    fn definition(&mut self, definition: &Definition) -> Result<DefinitionGrounder> {
        let symbols: Vec<Symbol> = definition.defined_symbols().into_iter().map(Symbol::Pred).collect();
        let own: Rc<FxHashSet<Symbol>> = Rc::new(symbols.iter().cloned().collect());
        let mut rules = Vec::with_capacity(definition.rules.len());
        for rule in &definition.rules {
            rules.push(self.rule(rule.clone(), &own)?);
        }
        Ok(DefinitionGrounder::new(symbols, rules, self.options.lazy_definitions))
    }

    fn rule(&mut self, rule: crate::ast::Rule, own: &Rc<FxHashSet<Symbol>>) -> Result<RuleGrounder> {
        let rule = normalize_rule(rule, &mut self.factory);
        let head_vars: Vec<Variable> = rule
            .args
            .iter()
            .map(|a| match a {
                Term::Var(v) => v.clone(),
                other => unreachable!("head argument {} after normalization", other),
            })
            .collect();
        let body_vars: Vec<Variable> = rule.vars.iter().filter(|v| !head_vars.contains(v)).cloned().collect();
        self.check_sorts(&head_vars)?;
        let recursive = mentions_any(&rule.body, own);
        let ctx = GroundingContext::rule_body(self.defined.clone(), own.clone(), recursive);
        let body = if body_vars.is_empty() {
            normalize(rule.body)
        } else {
            normalize(Formula::exists(body_vars, rule.body))
        };

        let defined = self.defined.clone();
        let queries = QueryBuilder::new(self.structure, &defined, self.options.max_query_enumeration);
        let slots = self.slots.enter_all(&head_vars);
        let filter = queries.possibly(&body, true, &mut self.slots);
        let generator = InstGenerator::new(pairs(&slots, &head_vars), filter, self.structure);
        let body = self.rule_body(body, ctx);
        self.slots.exit(head_vars.len());
        Ok(RuleGrounder::new(
            Symbol::Pred(rule.head),
            slots,
            generator,
            body?,
            recursive,
        ))
    }

    fn rule_body(&mut self, body: Formula, ctx: GroundingContext) -> Result<RuleBody> {
        if !matches!(body, Formula::Agg { .. }) {
            return Ok(RuleBody::Formula(self.formula(body, ctx)?));
        }
        let defined = self.defined.clone();
        let rewritten = Rewriter::new(self.structure, &defined, &mut self.factory, self.options.cp_support)
            .rewrite(body, &ctx)?;
        match rewritten {
            Leaf::Ready(agg @ Formula::Agg { .. }) => Ok(RuleBody::Agg(self.aggregate(agg, &ctx)?)),
            Leaf::Ready(f) | Leaf::Rewritten(f) => Ok(RuleBody::Formula(self.formula(normalize(f), ctx)?)),
            Leaf::Cp(f) => Ok(RuleBody::Formula(self.comparison(f, &ctx, true)?)),
        }
    }
}

fn pairs(slots: &[VarSlot], vars: &[Variable]) -> Vec<(VarSlot, Sort)> {
    slots.iter().zip(vars).map(|(s, v)| (*s, v.sort().clone())).collect()
}
