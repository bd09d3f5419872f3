//! Variable bindings during grounding
//!
//! The compiler assigns every variable a [`VarSlot`]; at runtime the
//! generators bind slots to domain elements in a [`VarEnv`]. Slots replace
//! name lookups, so binding and reading a variable is an index operation.

use crate::ast::Variable;
use crate::structure::DomainElement;

/// Index of a variable's binding in a [`VarEnv`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarSlot(pub usize);

/// Compile-time scope mapping variables to slots
///
/// Every `enter` allocates a new slot, so a variable rebound by a nested
/// quantifier shadows the outer binding instead of overwriting it.
#[derive(Debug, Default)]
pub struct SlotTable {
    next: usize,
    bound: Vec<(Variable, VarSlot)>,
}

impl SlotTable {
    /// Creates an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Brings a variable into scope with a fresh slot
    pub fn enter(&mut self, var: &Variable) -> VarSlot {
        let slot = VarSlot(self.next);
        self.next += 1;
        self.bound.push((var.clone(), slot));
        slot
    }

    /// Brings several variables into scope
    pub fn enter_all(&mut self, vars: &[Variable]) -> Vec<VarSlot> {
        vars.iter().map(|v| self.enter(v)).collect()
    }

    /// Removes the `count` most recently entered variables from scope
    pub fn exit(&mut self, count: usize) {
        let keep = self.bound.len().saturating_sub(count);
        self.bound.truncate(keep);
    }

    /// Looks up the innermost binding of a variable
    pub fn lookup(&self, var: &Variable) -> Option<VarSlot> {
        self.bound
            .iter()
            .rev()
            .find(|(v, _)| v == var)
            .map(|(_, s)| *s)
    }

    /// Number of slots allocated so far
    pub fn size(&self) -> usize {
        self.next
    }
}

/// Slot-indexed variable bindings
#[derive(Clone, Debug, Default)]
pub struct VarEnv {
    slots: Vec<Option<DomainElement>>,
}

impl VarEnv {
    /// Creates an environment with `size` unbound slots
    pub fn with_slots(size: usize) -> Self {
        Self {
            slots: vec![None; size],
        }
    }

    /// Binds a slot, returning the previous binding
    pub fn bind(&mut self, slot: VarSlot, value: DomainElement) -> Option<DomainElement> {
        if slot.0 >= self.slots.len() {
            self.slots.resize(slot.0 + 1, None);
        }
        self.slots[slot.0].replace(value)
    }

    /// Restores a slot to a previous binding
    pub fn restore(&mut self, slot: VarSlot, previous: Option<DomainElement>) {
        if slot.0 < self.slots.len() {
            self.slots[slot.0] = previous;
        }
    }

    /// Returns the binding of a slot, if any
    pub fn lookup(&self, slot: VarSlot) -> Option<&DomainElement> {
        self.slots.get(slot.0).and_then(Option::as_ref)
    }

    /// Returns the binding of a slot
    ///
    /// # Panics
    /// Panics if the slot is unbound: grounders only read slots their
    /// enclosing generators bound.
    pub fn get(&self, slot: VarSlot) -> &DomainElement {
        self.lookup(slot)
            .unwrap_or_else(|| panic!("variable slot {} read while unbound", slot.0))
    }

    /// Copies the bindings of the given slots
    pub fn snapshot(&self, slots: &[VarSlot]) -> Vec<(VarSlot, Option<DomainElement>)> {
        slots.iter().map(|&s| (s, self.lookup(s).cloned())).collect()
    }

    /// Reinstates bindings taken with [`VarEnv::snapshot`]
    pub fn reinstate(&mut self, saved: &[(VarSlot, Option<DomainElement>)]) {
        for (slot, value) in saved {
            match value {
                Some(v) => {
                    self.bind(*slot, v.clone());
                }
                None => self.restore(*slot, None),
            }
        }
    }
}
