//! Evaluation errors.
//!
//! Every fallible path in the engine returns `EvalResult`. Errors carry a
//! structured [`EvalErrorKind`], a human-readable message, the source span
//! when known, and (for raised exceptions and state errors) a call-stack
//! backtrace captured at the point of failure.
//!
//! Construction goes through the `#[cold]` factory functions at the bottom of
//! this module so the hot dispatch paths keep their error branches out of
//! line.

use lapis_ir::{Name, Span};

use crate::value::Value;

/// Result alias used throughout the evaluator.
pub type EvalResult = Result<Value, EvalError>;

/// Structured error category.
///
/// The message on [`EvalError`] is the rendered form; the kind is what tests
/// and embedders match on.
#[derive(Clone, Debug, PartialEq)]
pub enum EvalErrorKind {
    /// No method of the given name on the receiver's type or its ancestors.
    MethodNotFound { method: String, type_name: String },
    /// Class-name construction found no constructor of that name.
    ConstructorNotFound { class: String, name: String },
    /// Two overloads scored equally for the provided arguments.
    AmbiguousOverload {
        name: String,
        first: String,
        second: String,
    },
    /// No overload accepts the provided argument count.
    ArityMismatch {
        name: String,
        expected: String,
        got: usize,
    },
    /// Member access or call through `nil`.
    NilReceiver { member: String },
    /// Member access on an instance whose destructor already ran.
    DestroyedInstance { member: String },
    /// Call depth exceeded the configured bound.
    RecursionLimit { depth: usize },
    /// Identifier resolved to nothing.
    UndefinedVariable { name: String },
    /// Bare or unit-qualified call resolved to nothing.
    UndefinedFunction { name: String },
    /// Member read/write resolved to nothing on the receiver's type.
    UndefinedField { field: String, type_name: String },
    /// Receiver value cannot be called or dispatched through.
    NotCallable { type_name: String },
    /// Assignment target is not an identifier, member, or index expression.
    InvalidAssignmentTarget,
    /// Assignment to an immutable binding (constant or `Self`).
    ConstantAssignment { name: String },
    /// Array index outside `0..len`.
    IndexOutOfBounds { index: i64, len: usize },
    /// Operand or argument of the wrong type.
    TypeMismatch { expected: String, found: String },
    /// `div`, `mod` or `/` with a zero divisor.
    DivisionByZero,
    /// Integer arithmetic left the i64 range.
    IntegerOverflow { op: String },
    /// A `raise` that no handler caught; the payload rides on
    /// [`EvalError::exception`].
    UserException { class: String },
    /// Class or record name used where none is registered.
    UnknownType { name: String },
    /// Operator overload registered twice for the same operand signature.
    DuplicateOperator { op: String, signature: String },
    /// `inherited` evaluated outside a method body, or in a root class.
    InheritedUnavailable,
    /// Interface contract violation or other registration-time error.
    Registration { message: String },
}

/// One frame of a captured backtrace, outermost call first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BacktraceFrame {
    /// Qualified routine name, e.g. `TDog.Speak`.
    pub name: Name,
    /// Call-site span in the caller.
    pub span: Span,
}

/// Call-stack snapshot attached to raised exceptions and state errors.
///
/// Frames are ordered outermost-first, matching source reading order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvalBacktrace {
    pub frames: Vec<BacktraceFrame>,
}

impl EvalBacktrace {
    /// Number of frames captured.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the trace is empty.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// An evaluation failure.
#[derive(Clone, Debug, PartialEq)]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub message: String,
    pub span: Option<Span>,
    pub backtrace: Option<EvalBacktrace>,
    /// The raised exception object for `UserException`; `None` otherwise.
    pub exception: Option<Value>,
}

impl EvalError {
    /// Construct with a kind and rendered message; span and backtrace are
    /// attached by the raising site.
    pub fn new(kind: EvalErrorKind, message: impl Into<String>) -> Self {
        EvalError {
            kind,
            message: message.into(),
            span: None,
            backtrace: None,
            exception: None,
        }
    }

    /// Attach a source span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Attach a span only when none is set yet; inner errors keep the more
    /// precise location.
    #[must_use]
    pub fn or_span(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

    /// Attach a captured backtrace.
    #[must_use]
    pub fn with_backtrace(mut self, backtrace: EvalBacktrace) -> Self {
        self.backtrace = Some(backtrace);
        self
    }

    /// Whether this error is a raised Lapis exception (as opposed to an
    /// engine-detected state or resolution error).
    pub fn is_user_exception(&self) -> bool {
        matches!(self.kind, EvalErrorKind::UserException { .. })
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(span) = self.span {
            write!(f, " at {span}")?;
        }
        Ok(())
    }
}

impl std::error::Error for EvalError {}

#[cold]
pub fn method_not_found(method: &str, type_name: &str) -> EvalError {
    EvalError::new(
        EvalErrorKind::MethodNotFound {
            method: method.to_string(),
            type_name: type_name.to_string(),
        },
        format!("method '{method}' not found on '{type_name}'"),
    )
}

#[cold]
pub fn constructor_not_found(class: &str, name: &str) -> EvalError {
    EvalError::new(
        EvalErrorKind::ConstructorNotFound {
            class: class.to_string(),
            name: name.to_string(),
        },
        format!("class '{class}' has no constructor '{name}'"),
    )
}

#[cold]
pub fn ambiguous_overload(name: &str, first: &str, second: &str) -> EvalError {
    EvalError::new(
        EvalErrorKind::AmbiguousOverload {
            name: name.to_string(),
            first: first.to_string(),
            second: second.to_string(),
        },
        format!("ambiguous call to '{name}': candidates '{first}' and '{second}' match equally"),
    )
}

#[cold]
pub fn arity_mismatch(name: &str, expected: &str, got: usize) -> EvalError {
    EvalError::new(
        EvalErrorKind::ArityMismatch {
            name: name.to_string(),
            expected: expected.to_string(),
            got,
        },
        format!("no overload of '{name}' accepts {got} argument(s); expected {expected}"),
    )
}

#[cold]
pub fn nil_receiver(member: &str) -> EvalError {
    EvalError::new(
        EvalErrorKind::NilReceiver {
            member: member.to_string(),
        },
        format!("access to '{member}' through nil"),
    )
}

#[cold]
pub fn destroyed_instance(member: &str) -> EvalError {
    EvalError::new(
        EvalErrorKind::DestroyedInstance {
            member: member.to_string(),
        },
        format!("access to '{member}' on a destroyed instance"),
    )
}

#[cold]
pub fn recursion_limit(depth: usize) -> EvalError {
    EvalError::new(
        EvalErrorKind::RecursionLimit { depth },
        format!("call depth limit of {depth} exceeded"),
    )
}

#[cold]
pub fn undefined_variable(name: &str) -> EvalError {
    EvalError::new(
        EvalErrorKind::UndefinedVariable {
            name: name.to_string(),
        },
        format!("undefined identifier '{name}'"),
    )
}

#[cold]
pub fn undefined_function(name: &str) -> EvalError {
    EvalError::new(
        EvalErrorKind::UndefinedFunction {
            name: name.to_string(),
        },
        format!("undefined routine '{name}'"),
    )
}

#[cold]
pub fn undefined_field(field: &str, type_name: &str) -> EvalError {
    EvalError::new(
        EvalErrorKind::UndefinedField {
            field: field.to_string(),
            type_name: type_name.to_string(),
        },
        format!("'{type_name}' has no member '{field}'"),
    )
}

#[cold]
pub fn not_callable(type_name: &str) -> EvalError {
    EvalError::new(
        EvalErrorKind::NotCallable {
            type_name: type_name.to_string(),
        },
        format!("value of type '{type_name}' is not callable"),
    )
}

#[cold]
pub fn invalid_assignment_target() -> EvalError {
    EvalError::new(
        EvalErrorKind::InvalidAssignmentTarget,
        "invalid assignment target",
    )
}

#[cold]
pub fn constant_assignment(name: &str) -> EvalError {
    EvalError::new(
        EvalErrorKind::ConstantAssignment {
            name: name.to_string(),
        },
        format!("cannot assign to constant '{name}'"),
    )
}

#[cold]
pub fn index_out_of_bounds(index: i64, len: usize) -> EvalError {
    EvalError::new(
        EvalErrorKind::IndexOutOfBounds { index, len },
        format!("index {index} out of bounds for array of length {len}"),
    )
}

#[cold]
pub fn type_mismatch(expected: &str, found: &str) -> EvalError {
    EvalError::new(
        EvalErrorKind::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        },
        format!("expected {expected}, found {found}"),
    )
}

#[cold]
pub fn division_by_zero() -> EvalError {
    EvalError::new(EvalErrorKind::DivisionByZero, "division by zero")
}

#[cold]
pub fn integer_overflow(op: &str) -> EvalError {
    EvalError::new(
        EvalErrorKind::IntegerOverflow { op: op.to_string() },
        format!("integer overflow in '{op}'"),
    )
}

#[cold]
pub fn user_exception(class: &str, payload: Value) -> EvalError {
    let mut err = EvalError::new(
        EvalErrorKind::UserException {
            class: class.to_string(),
        },
        format!("unhandled exception of class '{class}'"),
    );
    err.exception = Some(payload);
    err
}

#[cold]
pub fn unknown_type(name: &str) -> EvalError {
    EvalError::new(
        EvalErrorKind::UnknownType {
            name: name.to_string(),
        },
        format!("unknown type '{name}'"),
    )
}

#[cold]
pub fn duplicate_operator(op: &str, signature: &str) -> EvalError {
    EvalError::new(
        EvalErrorKind::DuplicateOperator {
            op: op.to_string(),
            signature: signature.to_string(),
        },
        format!("operator '{op}' already registered for ({signature})"),
    )
}

#[cold]
pub fn inherited_unavailable() -> EvalError {
    EvalError::new(
        EvalErrorKind::InheritedUnavailable,
        "'inherited' requires a method context with a parent class",
    )
}

#[cold]
pub fn registration(message: impl Into<String>) -> EvalError {
    let message = message.into();
    EvalError::new(
        EvalErrorKind::Registration {
            message: message.clone(),
        },
        message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_attaches_once() {
        let inner = division_by_zero().with_span(Span::new(4, 5));
        let outer = inner.or_span(Span::new(0, 20));
        assert_eq!(outer.span, Some(Span::new(4, 5)));

        let fresh = division_by_zero().or_span(Span::new(0, 20));
        assert_eq!(fresh.span, Some(Span::new(0, 20)));
    }

    #[test]
    fn display_includes_span() {
        let err = undefined_variable("x").with_span(Span::new(3, 4));
        assert_eq!(err.to_string(), "undefined identifier 'x' at 3..4");
    }

    #[test]
    fn user_exception_carries_payload() {
        let err = user_exception("EConvertError", Value::Int(1));
        assert!(err.is_user_exception());
        assert_eq!(err.exception, Some(Value::Int(1)));
    }
}
