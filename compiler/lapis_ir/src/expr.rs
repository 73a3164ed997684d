//! Flat AST expressions and arena allocation.
//!
//! No `Box<Expr>`: expressions live in a contiguous `ExprArena` and refer to
//! children through `ExprId(u32)` indices. Argument lists and handler lists
//! are stored in side tables addressed by compact ranges.
//!
//! Lapis is statement-oriented, but the evaluator treats statements as
//! expressions evaluating to `Nil`; `Block` sequences them.

use std::fmt;

use crate::{BinaryOp, Name, Span, UnaryOp};

/// Index into the expression arena.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct ExprId(u32);

impl ExprId {
    /// Invalid expression ID (sentinel value).
    pub const INVALID: ExprId = ExprId(u32::MAX);

    /// Create a new `ExprId`.
    #[inline]
    pub const fn new(index: u32) -> Self {
        ExprId(index)
    }

    /// Get the index into the arena.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Check if this is a valid ID.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Debug for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "ExprId({})", self.0)
        } else {
            write!(f, "ExprId::INVALID")
        }
    }
}

impl Default for ExprId {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Range of child expression ids in the arena's flattened child list.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct ExprRange {
    pub start: u32,
    pub len: u16,
}

impl ExprRange {
    /// Empty range.
    pub const EMPTY: ExprRange = ExprRange { start: 0, len: 0 };

    /// Number of children in the range.
    #[inline]
    pub const fn len(self) -> usize {
        self.len as usize
    }

    /// Check if the range is empty.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }
}

/// Range of `except` handlers in the arena's handler table.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct HandlerRange {
    pub start: u32,
    pub len: u16,
}

/// One `on E: TClass do ...` arm of a `try..except`.
///
/// `class_key` is `None` for a catch-all `else` arm. `var_key` is the
/// binding for the caught exception object, when named.
#[derive(Clone, Debug, PartialEq)]
pub struct ExceptHandler {
    pub class_key: Option<Name>,
    pub var_key: Option<Name>,
    pub body: ExprId,
}

/// Expression node: kind plus source span.
#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

/// The closed set of expression forms the evaluator walks.
///
/// Identifier-bearing variants carry both the case-preserved `name` (for
/// diagnostics) and the lower-cased `key` (for lookup), both interned by
/// the front end so the evaluator never re-normalizes per visit.
#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    /// Integer literal.
    Int(i64),
    /// Float literal, stored as bits for Hash/Eq.
    Float(u64),
    /// String literal (interned).
    Str(Name),
    /// Boolean literal.
    Bool(bool),
    /// `nil`.
    Nil,
    /// Identifier reference (variable, constant, class name, `Self`, `Result`).
    Ident { name: Name, key: Name },
    /// Member read: `base.Name` (field, property, constant or class var).
    Field {
        base: ExprId,
        name: Name,
        key: Name,
    },
    /// Array indexing: `base[index]`.
    Index { base: ExprId, index: ExprId },
    /// Call: `Name(args)` when `receiver` is `None`, otherwise
    /// `receiver.Name(args)`. Receiver classification happens at dispatch.
    Call {
        receiver: Option<ExprId>,
        name: Name,
        key: Name,
        args: ExprRange,
    },
    /// `inherited` / `inherited Name(args)`.
    Inherited {
        name: Option<(Name, Name)>,
        args: ExprRange,
    },
    /// Binary operation.
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    /// Unary operation.
    Unary { op: UnaryOp, operand: ExprId },
    /// Assignment: `target := value`. Target must be an identifier, member
    /// access, or index expression.
    Assign { target: ExprId, value: ExprId },
    /// Statement sequence; evaluates to `Nil`.
    Block(ExprRange),
    /// `if cond then .. else ..`.
    If {
        cond: ExprId,
        then_branch: ExprId,
        else_branch: Option<ExprId>,
    },
    /// `while cond do body`.
    While { cond: ExprId, body: ExprId },
    /// `raise expr`.
    Raise { value: ExprId },
    /// `try body except handlers finally cleanup end`.
    Try {
        body: ExprId,
        handlers: HandlerRange,
        finally: Option<ExprId>,
    },
    /// Dynamic array literal `[a, b, c]`.
    ArrayLit(ExprRange),
}

/// Arena of expressions with side tables for child lists and handlers.
#[derive(Clone, Debug, Default)]
pub struct ExprArena {
    exprs: Vec<Expr>,
    children: Vec<ExprId>,
    handlers: Vec<ExceptHandler>,
}

impl ExprArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an expression, returning its id.
    ///
    /// # Panics
    /// Panics if the arena exceeds `u32::MAX - 1` expressions.
    pub fn alloc(&mut self, kind: ExprKind, span: Span) -> ExprId {
        let index = u32::try_from(self.exprs.len()).expect("expression arena overflow");
        assert!(index != u32::MAX, "expression arena overflow");
        self.exprs.push(Expr { kind, span });
        ExprId::new(index)
    }

    /// Allocate a child list, returning its range.
    ///
    /// # Panics
    /// Panics if the list exceeds `u16::MAX` entries.
    pub fn alloc_list(&mut self, items: &[ExprId]) -> ExprRange {
        let start = u32::try_from(self.children.len()).expect("child table overflow");
        let len = u16::try_from(items.len()).expect("argument list too long");
        self.children.extend_from_slice(items);
        ExprRange { start, len }
    }

    /// Allocate a handler list, returning its range.
    pub fn alloc_handlers(&mut self, items: Vec<ExceptHandler>) -> HandlerRange {
        let start = u32::try_from(self.handlers.len()).expect("handler table overflow");
        let len = u16::try_from(items.len()).expect("handler list too long");
        self.handlers.extend(items);
        HandlerRange { start, len }
    }

    /// Get an expression's kind.
    #[inline]
    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.exprs[id.index()].kind
    }

    /// Get an expression's span.
    #[inline]
    pub fn span(&self, id: ExprId) -> Span {
        self.exprs[id.index()].span
    }

    /// Resolve a child range to a slice of ids.
    #[inline]
    pub fn list(&self, range: ExprRange) -> &[ExprId] {
        let start = range.start as usize;
        &self.children[start..start + range.len()]
    }

    /// Resolve a handler range to a slice of handlers.
    #[inline]
    pub fn handler_list(&self, range: HandlerRange) -> &[ExceptHandler] {
        let start = range.start as usize;
        &self.handlers[start..start + range.len as usize]
    }

    /// Number of expressions allocated.
    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    /// Check if the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }
}
