//! Assignment compatibility and implicit conversions.
//!
//! `compat_of` is the single type-compatibility judgment used by overload
//! scoring and operator operand matching: exact match, convertible, or
//! incompatible. `implicit_convert` performs the (few, value-preserving)
//! conversions at binding sites: widening integers to floats and stringifying
//! primitives for string-typed slots.

use lapis_ir::{Name, StringInterner, TypeSpec};

use crate::registry::Registry;
use crate::value::Value;

/// Outcome of the compatibility judgment, ordered worst to best.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub enum Compat {
    Incompatible,
    Convertible,
    Exact,
}

impl Compat {
    /// Score contribution during overload resolution.
    #[inline]
    pub fn score(self) -> u32 {
        match self {
            Compat::Exact => 2,
            Compat::Convertible => 1,
            Compat::Incompatible => 0,
        }
    }
}

/// Judge how well `value` fits a slot declared as `target`.
pub fn compat_of(
    value: &Value,
    target: &TypeSpec,
    reg: &Registry,
    interner: &StringInterner,
) -> Compat {
    // Deferred lazy arguments are never evaluated for scoring; dispatch
    // only produces them for positions every candidate declares lazy, so
    // they fit each of those equally.
    if matches!(value, Value::Thunk(_)) {
        return Compat::Exact;
    }
    match target {
        TypeSpec::Variant => Compat::Convertible,
        TypeSpec::Integer => match value {
            Value::Int(_) => Compat::Exact,
            Value::Subrange { .. } => Compat::Convertible,
            _ => Compat::Incompatible,
        },
        TypeSpec::Float => match value {
            Value::Float(_) => Compat::Exact,
            Value::Int(_) | Value::Subrange { .. } => Compat::Convertible,
            _ => Compat::Incompatible,
        },
        TypeSpec::Boolean => match value {
            Value::Bool(_) => Compat::Exact,
            _ => Compat::Incompatible,
        },
        TypeSpec::String => match value {
            Value::Str(_) => Compat::Exact,
            Value::Int(_) | Value::Float(_) | Value::Bool(_) => Compat::Convertible,
            _ => Compat::Incompatible,
        },
        TypeSpec::Array(elem) => match value {
            Value::Array(items) => {
                // Judge by the first element; an empty array fits any
                // element type exactly.
                let items = items.borrow();
                match items.first() {
                    None => Compat::Exact,
                    Some(first) => compat_of(first, elem, reg, interner),
                }
            }
            _ => Compat::Incompatible,
        },
        TypeSpec::Named(key) => named_compat(value, *key, reg, interner),
    }
}

fn named_compat(value: &Value, key: Name, reg: &Registry, interner: &StringInterner) -> Compat {
    match value {
        Value::Object(obj) => {
            let class = obj.borrow().class;
            if reg.class(class).key == key {
                return Compat::Exact;
            }
            let is_ancestor = reg
                .class_chain(class)
                .iter()
                .any(|c| reg.class(*c).key == key);
            if is_ancestor {
                return Compat::Convertible;
            }
            match reg.lookup_interface(key) {
                Some(iface) if reg.class_implements(class, iface) => Compat::Convertible,
                _ => Compat::Incompatible,
            }
        }
        Value::Interface(iv) => {
            if reg.interface(iv.interface).key == key {
                return Compat::Exact;
            }
            match reg.lookup_interface(key) {
                Some(target) if reg.interface_is(iv.interface, target) => Compat::Convertible,
                _ => Compat::Incompatible,
            }
        }
        Value::Record(rec) => {
            if reg.record(rec.type_id).key == key {
                Compat::Exact
            } else {
                Compat::Incompatible
            }
        }
        Value::Enum { type_key, .. } => {
            if *type_key == key {
                Compat::Exact
            } else {
                Compat::Incompatible
            }
        }
        Value::Subrange { base, .. } => {
            if *base == key {
                Compat::Exact
            } else {
                Compat::Incompatible
            }
        }
        // nil fits any reference-typed slot.
        Value::Nil => {
            if reg.lookup_class(key).is_some() || reg.lookup_interface(key).is_some() {
                Compat::Convertible
            } else {
                Compat::Incompatible
            }
        }
        Value::VarRef(cell) => named_compat(&cell.borrow(), key, reg, interner),
        _ => Compat::Incompatible,
    }
}

/// Apply the implicit conversions allowed at a binding site. Values that
/// need no conversion (or cannot be converted) pass through unchanged; the
/// compatibility judgment has already rejected true mismatches where that
/// matters.
pub fn implicit_convert(value: Value, target: &TypeSpec) -> Value {
    match (target, &value) {
        (TypeSpec::Float, Value::Int(n)) => Value::Float(*n as f64),
        (TypeSpec::Integer, Value::Subrange { value: n, .. }) => Value::Int(*n),
        (TypeSpec::Float, Value::Subrange { value: n, .. }) => Value::Float(*n as f64),
        (TypeSpec::String, Value::Int(n)) => Value::str(n.to_string()),
        (TypeSpec::String, Value::Float(x)) => Value::str(x.to_string()),
        (TypeSpec::String, Value::Bool(b)) => Value::str(if *b { "true" } else { "false" }),
        _ => value,
    }
}
