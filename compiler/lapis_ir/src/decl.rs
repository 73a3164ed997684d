//! Declaration types produced by the front end for the evaluator.
//!
//! These are the shapes the semantic pass hands to the dispatch engine:
//! method declarations with their parameter lists, binding kind
//! (static/virtual/override), and type annotations. The engine never looks
//! at raw source text; every identifier here is already interned, with
//! lower-cased lookup keys computed once.

use crate::{ExprId, Name, Span, StringInterner};

/// Declared type annotation for parameters, fields and return types.
///
/// `Named` covers classes, records, interfaces and enums by their
/// case-insensitive key; the registries decide which kind it denotes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeSpec {
    Integer,
    Float,
    String,
    Boolean,
    /// Dynamic array with element type.
    Array(Box<TypeSpec>),
    /// User-defined type by lower-cased interned key.
    Named(Name),
    /// The permissive `Variant` type: accepts any value.
    Variant,
}

impl TypeSpec {
    /// Canonical lower-case text for signature keys, e.g. `array of integer`.
    pub fn key_text(&self, interner: &StringInterner) -> String {
        match self {
            TypeSpec::Integer => "integer".to_string(),
            TypeSpec::Float => "float".to_string(),
            TypeSpec::String => "string".to_string(),
            TypeSpec::Boolean => "boolean".to_string(),
            TypeSpec::Array(elem) => format!("array of {}", elem.key_text(interner)),
            TypeSpec::Named(key) => interner.lookup(*key).to_string(),
            TypeSpec::Variant => "variant".to_string(),
        }
    }

    /// Interned canonical key for this type, used in VMT signatures and
    /// operator operand signatures.
    pub fn key(&self, interner: &StringInterner) -> Name {
        match self {
            TypeSpec::Named(key) => *key,
            other => interner.intern(&other.key_text(interner)),
        }
    }
}

/// What flavor of routine a declaration is.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum MethodKind {
    /// No return value.
    Procedure,
    /// Returns a value through the `Result` slot.
    Function,
    /// Allocates/returns an instance; `Result` pre-bound to it.
    Constructor,
    /// Routes through the shared release path with `Free`.
    Destructor,
}

/// Static vs virtual binding of a method.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum Binding {
    /// Resolved by name walk; never enters the VMT.
    #[default]
    Static,
    /// Introduces a VMT slot.
    Virtual,
    /// Replaces an ancestor's VMT slot with the same signature.
    Override,
}

impl Binding {
    /// True for `Virtual` and `Override` declarations.
    #[inline]
    pub fn is_virtual(self) -> bool {
        !matches!(self, Binding::Static)
    }
}

/// One formal parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    /// Case-preserved name for diagnostics.
    pub name: Name,
    /// Lower-cased key the body binds.
    pub key: Name,
    pub ty: TypeSpec,
    /// `var` parameter: bound to a cell aliasing the caller's variable.
    pub by_ref: bool,
    /// Lazy parameter: bound to a thunk, evaluated on first reference.
    pub lazy: bool,
    /// Default value expression for trailing optional parameters.
    pub default: Option<ExprId>,
}

impl Param {
    /// Plain by-value parameter.
    pub fn new(name: Name, key: Name, ty: TypeSpec) -> Self {
        Param {
            name,
            key,
            ty,
            by_ref: false,
            lazy: false,
            default: None,
        }
    }
}

/// A method, constructor, destructor, class method or free routine.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodDecl {
    /// Case-preserved declared name.
    pub name: Name,
    /// Lower-cased lookup key.
    pub key: Name,
    pub params: Vec<Param>,
    /// `None` for procedures and destructors.
    pub return_type: Option<TypeSpec>,
    pub kind: MethodKind,
    pub binding: Binding,
    pub is_class_method: bool,
    /// The `overload` marker. Informational: resolution works without it.
    pub is_overload: bool,
    pub body: ExprId,
    pub span: Span,
}

impl MethodDecl {
    /// Whether the routine produces a value through `Result`.
    #[inline]
    pub fn has_result(&self) -> bool {
        matches!(self.kind, MethodKind::Function | MethodKind::Constructor)
    }

    /// Parameters without a default value; the minimum call arity.
    pub fn required_params(&self) -> usize {
        self.params
            .iter()
            .take_while(|p| p.default.is_none())
            .count()
    }

    /// Whether `argc` call-site arguments can bind to this declaration,
    /// counting trailing defaults.
    pub fn arity_matches(&self, argc: usize) -> bool {
        argc >= self.required_params() && argc <= self.params.len()
    }

    /// Normalized parameter-type key list for signature comparison.
    pub fn param_keys(&self, interner: &StringInterner) -> Vec<Name> {
        self.params.iter().map(|p| p.ty.key(interner)).collect()
    }
}
