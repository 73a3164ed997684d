//! Lapis IR - Intermediate Representation Types
//!
//! This crate contains the core data structures shared between the front end
//! and the evaluator of the Lapis interpreter:
//! - Spans for source locations
//! - Names for interned identifiers (with case-insensitive interning,
//!   since Lapis identifiers compare case-insensitively)
//! - Flat AST nodes and arena allocation for expressions
//! - Declaration types for methods, parameters and type annotations
//!
//! # Design Philosophy
//!
//! - **Intern Everything**: Strings → `Name(u32)`
//! - **Flatten Everything**: No `Box<Expr>`, use `ExprId(u32)` indices
//! - **Normalize Once**: case-insensitive lookup keys are produced by
//!   `StringInterner::intern_ci` at registration and call-site lookup,
//!   never re-normalized per call
//!
//! Types that contain floats store them as u64 bits for Hash compatibility.

mod decl;
mod expr;
mod interner;
mod name;
mod ops;
mod span;

pub use decl::{Binding, MethodDecl, MethodKind, Param, TypeSpec};
pub use expr::{ExceptHandler, Expr, ExprArena, ExprId, ExprKind, ExprRange, HandlerRange};
pub use interner::{SharedInterner, StringInterner, StringLookup};
pub use name::Name;
pub use ops::{BinaryOp, UnaryOp};
pub use span::Span;
