//! Lexical environments.
//!
//! An `Environment` is a stack of shared scopes; index 0 is the global scope.
//! Scopes are `Shared` so a cloned environment (captured by a lazy-argument
//! thunk) keeps seeing the caller's variables, and so by-ref parameter cells
//! can be promoted in place.
//!
//! `lookup` returns the raw bound value, including `VarRef` cells and thunks;
//! the evaluator decides when to look through them.

use lapis_ir::Name;
use rustc_hash::FxHashMap;

use crate::shared::Shared;
use crate::value::Value;

/// Whether a binding accepts assignment.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Mutability {
    Mutable,
    Immutable,
}

/// Why an assignment was rejected.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum AssignError {
    Undefined,
    Immutable,
}

#[derive(Debug)]
struct BindingSlot {
    value: Value,
    mutability: Mutability,
}

/// One scope level: a map from lower-cased keys to bindings.
#[derive(Debug, Default)]
pub struct Scope {
    bindings: FxHashMap<Name, BindingSlot>,
}

/// Scope stack. Cloning shares every scope with the original.
#[derive(Clone, Debug)]
pub struct Environment {
    scopes: Vec<Shared<Scope>>,
}

impl Environment {
    /// Fresh environment with an empty global scope.
    pub fn new() -> Self {
        Environment {
            scopes: vec![Shared::new(Scope::default())],
        }
    }

    /// A new environment sharing only this one's global scope.
    ///
    /// Used for call frames: callee bodies see globals but not the caller's
    /// locals.
    pub fn child(&self) -> Environment {
        Environment {
            scopes: vec![self.scopes[0].clone()],
        }
    }

    /// Enter a nested scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(Shared::new(Scope::default()));
    }

    /// Leave the innermost scope. The global scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Current nesting depth, counting the global scope.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Bind `name` in the global scope, regardless of nesting.
    pub fn define_global(&mut self, name: Name, value: Value, mutability: Mutability) {
        self.scopes[0]
            .borrow_mut()
            .bindings
            .insert(name, BindingSlot { value, mutability });
    }

    /// Bind `name` in the innermost scope, shadowing any outer binding.
    pub fn define(&mut self, name: Name, value: Value, mutability: Mutability) {
        let top = self.scopes.len() - 1;
        self.scopes[top]
            .borrow_mut()
            .bindings
            .insert(name, BindingSlot { value, mutability });
    }

    /// Raw lookup, innermost scope first. `VarRef` cells and thunks come
    /// back unwrapped.
    pub fn lookup(&self, name: Name) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(slot) = scope.borrow().bindings.get(&name) {
                return Some(slot.value.clone());
            }
        }
        None
    }

    /// Whether `name` is bound in any scope.
    pub fn is_defined(&self, name: Name) -> bool {
        self.scopes
            .iter()
            .rev()
            .any(|scope| scope.borrow().bindings.contains_key(&name))
    }

    /// Assign to an existing binding, writing through `VarRef` cells.
    pub fn assign(&mut self, name: Name, value: Value) -> Result<(), AssignError> {
        for scope in self.scopes.iter().rev() {
            let mut guard = scope.borrow_mut();
            if let Some(slot) = guard.bindings.get_mut(&name) {
                if slot.mutability == Mutability::Immutable {
                    return Err(AssignError::Immutable);
                }
                if let Value::VarRef(cell) = &slot.value {
                    let cell = cell.clone();
                    drop(guard);
                    *cell.borrow_mut() = value;
                } else {
                    slot.value = value;
                }
                return Ok(());
            }
        }
        Err(AssignError::Undefined)
    }

    /// Promote a binding to an aliasing cell and return it.
    ///
    /// Subsequent reads and assignments through the binding go through the
    /// same cell, so a `var` parameter bound to it aliases the variable.
    pub fn cell(&mut self, name: Name) -> Option<Shared<Value>> {
        for scope in self.scopes.iter().rev() {
            let mut guard = scope.borrow_mut();
            if let Some(slot) = guard.bindings.get_mut(&name) {
                if let Value::VarRef(cell) = &slot.value {
                    return Some(cell.clone());
                }
                let cell = Shared::new(std::mem::replace(&mut slot.value, Value::Nil));
                slot.value = Value::VarRef(cell.clone());
                return Some(cell);
            }
        }
        None
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
