//! Native extension points: type helpers and unit routines.
//!
//! Helpers attach native methods to values by type key, so `s.Length()` on a
//! string or `xs.Add(1)` on an array dispatches without a class behind it.
//! Unit routines back unit-qualified calls (`SysUtils.IntToStr(42)`) and the
//! bare-call fallback for the default unit.

use lapis_ir::Name;
use rustc_hash::FxHashMap;

use crate::errors::EvalResult;
use crate::interpreter::Interpreter;
use crate::value::Value;

/// A native helper method: receives the interpreter, the receiver, and the
/// evaluated arguments.
pub type HelperFn = for<'a> fn(&mut Interpreter<'a>, &Value, &[Value]) -> EvalResult;

/// A native unit routine.
pub type UnitFn = for<'a> fn(&mut Interpreter<'a>, &[Value]) -> EvalResult;

/// Native methods keyed by (type key, method key).
///
/// The type key is what [`Interpreter::value_type_key`] reports for the
/// receiver: a primitive name like `string`, or a class/record key for
/// user types extended with native methods.
#[derive(Default)]
pub struct HelperRegistry {
    table: FxHashMap<(Name, Name), HelperFn>,
}

impl HelperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a helper; later registrations replace earlier ones.
    pub fn register(&mut self, type_key: Name, method_key: Name, f: HelperFn) {
        self.table.insert((type_key, method_key), f);
    }

    pub fn lookup(&self, type_key: Name, method_key: Name) -> Option<HelperFn> {
        self.table.get(&(type_key, method_key)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Native routines grouped by unit key.
#[derive(Default)]
pub struct UnitRegistry {
    units: FxHashMap<Name, FxHashMap<Name, UnitFn>>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a routine in a unit, creating the unit on first use.
    pub fn register(&mut self, unit_key: Name, fn_key: Name, f: UnitFn) {
        self.units.entry(unit_key).or_default().insert(fn_key, f);
    }

    /// Whether a unit with this key exists; decides receiver classification
    /// for `Unit.Routine(..)` call syntax.
    pub fn has_unit(&self, unit_key: Name) -> bool {
        self.units.contains_key(&unit_key)
    }

    pub fn lookup(&self, unit_key: Name, fn_key: Name) -> Option<UnitFn> {
        self.units.get(&unit_key).and_then(|m| m.get(&fn_key)).copied()
    }

    /// Search every unit for a bare-call fallback, first hit wins.
    pub fn lookup_any(&self, fn_key: Name) -> Option<UnitFn> {
        self.units.values().find_map(|m| m.get(&fn_key).copied())
    }
}
