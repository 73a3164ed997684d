//! Runtime values.
//!
//! `Value` is the closed set of shapes the evaluator manipulates. Reference
//! types (objects, arrays) are `Shared` handles; `Clone` on them aliases.
//! Records are plain data: `Clone` on a `RecordValue` is the value-semantics
//! copy Lapis records require, with reference-typed fields still sharing
//! their targets.

use std::fmt;
use std::rc::Rc;

use lapis_ir::{ExprId, MethodDecl, Name};
use rustc_hash::FxHashMap;

use crate::environment::Environment;
use crate::registry::{ClassId, InterfaceId, RecordId};
use crate::shared::Shared;

/// A runtime value.
#[derive(Clone, Debug)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bool(bool),
    /// Value of a named subrange type; widens to integer on use.
    Subrange {
        base: Name,
        value: i64,
    },
    /// Enumeration constant: type key, variant key, declared ordinal.
    Enum {
        type_key: Name,
        variant: Name,
        ordinal: i64,
    },
    /// Dynamic array; aliased on clone.
    Array(Shared<Vec<Value>>),
    /// Record value; copied on clone.
    Record(RecordValue),
    /// Class instance; aliased on clone.
    Object(Shared<ObjectInstance>),
    /// Interface-typed view of an instance (or of `nil`).
    Interface(InterfaceValue),
    /// Metaclass value, as produced by `ClassType` or a bare class name.
    ClassRef(ClassId),
    /// First-class routine reference, optionally bound to a receiver.
    FunctionPtr(Rc<FunctionPtrValue>),
    /// Aliasing cell for `var` parameters and class variables.
    VarRef(Shared<Value>),
    /// Deferred argument for a lazy parameter; forced at most once.
    Thunk(Shared<ThunkState>),
    Nil,
}

/// Record value: type identity plus named fields.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordValue {
    pub type_id: RecordId,
    pub fields: FxHashMap<Name, Value>,
}

/// Heap state of a class instance.
#[derive(Debug)]
pub struct ObjectInstance {
    pub class: ClassId,
    pub fields: FxHashMap<Name, Value>,
    /// Set by the shared release path; further member access raises.
    pub destroyed: bool,
}

/// An instance viewed through an interface type.
#[derive(Clone, Debug)]
pub struct InterfaceValue {
    pub interface: InterfaceId,
    /// `None` models a nil interface reference.
    pub object: Option<Shared<ObjectInstance>>,
}

/// Captured routine reference.
#[derive(Debug)]
pub struct FunctionPtrValue {
    pub decl: Rc<MethodDecl>,
    /// Receiver captured at the point the pointer was taken.
    pub bound_self: Option<Value>,
    /// Declaring class, for class-scope injection when invoked.
    pub owner: Option<ClassId>,
}

/// State of a lazy-parameter thunk.
///
/// `env` is the caller's environment captured at bind time; forcing
/// evaluates `expr` there and memoizes.
#[derive(Debug)]
pub struct ThunkState {
    pub expr: ExprId,
    pub env: Environment,
    pub forced: Option<Value>,
}

impl Value {
    /// Interned empty-ish display name of the value's shape, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Subrange { .. } => "subrange",
            Value::Enum { .. } => "enum",
            Value::Array(_) => "array",
            Value::Record(_) => "record",
            Value::Object(_) => "object",
            Value::Interface(_) => "interface",
            Value::ClassRef(_) => "class",
            Value::FunctionPtr(_) => "function",
            Value::VarRef(_) => "reference",
            Value::Thunk(_) => "thunk",
            Value::Nil => "nil",
        }
    }

    /// Build a string value.
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    /// Build an array value from elements.
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Shared::new(items))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Subrange { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            Value::Subrange { value, .. } => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The object handle behind this value, looking through interface views.
    pub fn as_object(&self) -> Option<&Shared<ObjectInstance>> {
        match self {
            Value::Object(obj) => Some(obj),
            Value::Interface(iv) => iv.object.as_ref(),
            _ => None,
        }
    }

    /// Whether the value is `nil` (including a nil interface reference).
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil) || matches!(self, Value::Interface(iv) if iv.object.is_none())
    }
}

// Equality: primitives by value, reference types by identity, records by
// structure. Mirrors the language's `=` on non-overloaded operands.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (
                Value::Subrange { base: ba, value: va },
                Value::Subrange { base: bb, value: vb },
            ) => ba == bb && va == vb,
            (Value::Subrange { value, .. }, Value::Int(n))
            | (Value::Int(n), Value::Subrange { value, .. }) => value == n,
            (
                Value::Enum {
                    type_key: ta,
                    ordinal: oa,
                    ..
                },
                Value::Enum {
                    type_key: tb,
                    ordinal: ob,
                    ..
                },
            ) => ta == tb && oa == ob,
            (Value::Array(a), Value::Array(b)) => {
                Shared::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Shared::ptr_eq(a, b),
            (Value::Interface(a), Value::Interface(b)) => match (&a.object, &b.object) {
                (Some(x), Some(y)) => Shared::ptr_eq(x, y),
                (None, None) => true,
                _ => false,
            },
            (Value::ClassRef(a), Value::ClassRef(b)) => a == b,
            (Value::FunctionPtr(a), Value::FunctionPtr(b)) => Rc::ptr_eq(a, b),
            (Value::VarRef(a), Value::VarRef(b)) => Shared::ptr_eq(a, b),
            (Value::Thunk(a), Value::Thunk(b)) => Shared::ptr_eq(a, b),
            (Value::Nil, Value::Nil) => true,
            (Value::Interface(iv), Value::Nil) | (Value::Nil, Value::Interface(iv)) => {
                iv.object.is_none()
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Subrange { value, .. } => write!(f, "{value}"),
            Value::Enum { ordinal, .. } => write!(f, "{ordinal}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Record(_) => write!(f, "<record>"),
            Value::Object(_) => write!(f, "<object>"),
            Value::Interface(iv) => {
                if iv.object.is_some() {
                    write!(f, "<interface>")
                } else {
                    write!(f, "nil")
                }
            }
            Value::ClassRef(_) => write!(f, "<class>"),
            Value::FunctionPtr(_) => write!(f, "<function>"),
            Value::VarRef(cell) => write!(f, "{}", cell.borrow()),
            Value::Thunk(_) => write!(f, "<deferred>"),
            Value::Nil => write!(f, "nil"),
        }
    }
}
