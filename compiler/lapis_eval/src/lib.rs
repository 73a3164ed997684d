//! Lapis Evaluator - Object Model and Dispatch Engine
//!
//! This crate evaluates Lapis method bodies against a registry of classes,
//! records, interfaces and operator overloads. It is the half of the
//! interpreter that decides *which* routine a call expression runs and
//! *how* values flow into and out of it:
//! - Receiver classification: unit-qualified calls, class names, record
//!   type names, then evaluated receiver values
//! - Virtual dispatch through per-class method tables, with signature-based
//!   hiding and `inherited` resolution
//! - Overload scoring with exact/convertible ranking and single-evaluation
//!   of arguments
//! - Instance lifecycle: allocation, constructors, `Free`/`Destroy`
//! - Exceptions with hierarchy-aware handlers and call-stack backtraces
//!
//! The front end lowers source into `lapis_ir` arenas; embedders register
//! types through [`Registry`] and native code through [`HelperRegistry`]
//! and [`UnitRegistry`], then drive evaluation through [`Interpreter`].

mod convert;
mod diagnostics;
mod environment;
mod errors;
mod helpers;
mod interpreter;
mod operators;
mod overload;
mod registry;
mod shared;
mod signature;
mod stack;
mod value;

#[cfg(test)]
mod tests;

pub use convert::{compat_of, implicit_convert, Compat};
pub use diagnostics::{CallFrame, CallStack, DEFAULT_MAX_CALL_DEPTH};
pub use environment::{AssignError, Environment, Mutability};
pub use errors::{BacktraceFrame, EvalBacktrace, EvalError, EvalErrorKind, EvalResult};
pub use helpers::{HelperFn, HelperRegistry, UnitFn, UnitRegistry};
pub use interpreter::{Interpreter, InterpreterBuilder, ScopedInterpreter};
pub use operators::{OperatorEntry, OperatorKind};
pub use overload::{resolve_overload, ResolveOutcome};
pub use registry::{
    ClassId, ClassInfo, ConstInfo, FieldInfo, InterfaceId, InterfaceInfo, MethodSlot, PropAccess,
    PropertyInfo, RecordId, RecordTypeInfo, Registry, VmtEntry,
};
pub use shared::Shared;
pub use signature::SigKey;
pub use value::{
    FunctionPtrValue, InterfaceValue, ObjectInstance, RecordValue, ThunkState, Value,
};
