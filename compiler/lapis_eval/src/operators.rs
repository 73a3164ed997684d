//! Operator overload registry.
//!
//! Overloads are recorded per class (searched through the left operand's
//! hierarchy, then the right's), per record type, and globally, in that
//! order. Within one scope an entry whose operand types all match exactly
//! beats assignment-compatible entries. Registration rejects duplicate
//! operand signatures for the same operator in the same scope.

use std::rc::Rc;

use lapis_ir::{BinaryOp, MethodDecl, StringInterner, TypeSpec, UnaryOp};
use smallvec::SmallVec;

use crate::convert::{compat_of, Compat};
use crate::errors::{self, EvalError};
use crate::registry::{ClassId, RecordId, Registry};
use crate::value::Value;

/// Which operator an overload implements.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OperatorKind {
    Binary(BinaryOp),
    Unary(UnaryOp),
}

impl OperatorKind {
    /// Source symbol, also the registry's diagnostic key.
    pub fn symbol(self) -> &'static str {
        match self {
            OperatorKind::Binary(op) => op.as_symbol(),
            OperatorKind::Unary(op) => op.as_symbol(),
        }
    }

    /// Operand count.
    pub fn arity(self) -> usize {
        match self {
            OperatorKind::Binary(_) => 2,
            OperatorKind::Unary(_) => 1,
        }
    }
}

/// One registered operator overload.
#[derive(Clone, Debug)]
pub struct OperatorEntry {
    pub kind: OperatorKind,
    /// Declared operand types, left to right.
    pub operands: SmallVec<[TypeSpec; 2]>,
    /// Which operand binds as `Self` when the routine is instance-bound.
    pub self_index: usize,
    /// Class-method operator: `Self` is the owning class, every operand is
    /// a parameter.
    pub class_bound: bool,
    /// Owning class for class-scoped entries; `None` for record-scoped and
    /// global entries.
    pub owner: Option<ClassId>,
    pub decl: Rc<MethodDecl>,
}

impl OperatorEntry {
    /// Instance-bound binary overload with `Self` on the left.
    pub fn binary(op: BinaryOp, left: TypeSpec, right: TypeSpec, decl: Rc<MethodDecl>) -> Self {
        OperatorEntry {
            kind: OperatorKind::Binary(op),
            operands: SmallVec::from_iter([left, right]),
            self_index: 0,
            class_bound: false,
            owner: None,
            decl,
        }
    }

    /// Instance-bound unary overload.
    pub fn unary(op: UnaryOp, operand: TypeSpec, decl: Rc<MethodDecl>) -> Self {
        OperatorEntry {
            kind: OperatorKind::Unary(op),
            operands: SmallVec::from_iter([operand]),
            self_index: 0,
            class_bound: false,
            owner: None,
            decl,
        }
    }

    /// Mark as a class-method operator.
    #[must_use]
    pub fn class_method(mut self) -> Self {
        self.class_bound = true;
        self
    }

    /// Bind `Self` to a different operand.
    #[must_use]
    pub fn with_self_index(mut self, index: usize) -> Self {
        self.self_index = index;
        self
    }

    /// Canonical operand signature, e.g. `tvector, tvector`.
    pub fn signature_text(&self, interner: &StringInterner) -> String {
        self.operands
            .iter()
            .map(|ty| ty.key_text(interner))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn validate(&self, interner: &StringInterner) -> Result<(), EvalError> {
        let arity = self.kind.arity();
        if self.operands.len() != arity {
            return Err(errors::registration(format!(
                "operator '{}' takes {arity} operand(s), {} declared",
                self.kind.symbol(),
                self.operands.len()
            )));
        }
        let expected_params = if self.class_bound { arity } else { arity - 1 };
        if self.decl.params.len() != expected_params {
            return Err(errors::registration(format!(
                "operator '{}' routine '{}' must declare {expected_params} parameter(s)",
                self.kind.symbol(),
                interner.lookup(self.decl.name)
            )));
        }
        if !self.class_bound && self.self_index >= arity {
            return Err(errors::registration(format!(
                "operator '{}' self operand index {} out of range",
                self.kind.symbol(),
                self.self_index
            )));
        }
        Ok(())
    }
}

fn check_duplicate(
    existing: &[OperatorEntry],
    entry: &OperatorEntry,
    interner: &StringInterner,
) -> Result<(), EvalError> {
    let signature = entry.signature_text(interner);
    for other in existing {
        if other.kind == entry.kind && other.signature_text(interner) == signature {
            return Err(errors::duplicate_operator(entry.kind.symbol(), &signature));
        }
    }
    Ok(())
}

/// How one entry fits concrete operand values.
fn entry_fit(
    entry: &OperatorEntry,
    operands: &[Value],
    reg: &Registry,
    interner: &StringInterner,
) -> Option<Compat> {
    if entry.operands.len() != operands.len() {
        return None;
    }
    let mut worst = Compat::Exact;
    for (value, ty) in operands.iter().zip(&entry.operands) {
        let fit = compat_of(value, ty, reg, interner);
        if fit == Compat::Incompatible {
            return None;
        }
        worst = worst.min(fit);
    }
    Some(worst)
}

fn best_in_scope(
    entries: &[OperatorEntry],
    kind: OperatorKind,
    operands: &[Value],
    reg: &Registry,
    interner: &StringInterner,
) -> Option<OperatorEntry> {
    let mut fallback: Option<&OperatorEntry> = None;
    for entry in entries {
        if entry.kind != kind {
            continue;
        }
        match entry_fit(entry, operands, reg, interner) {
            Some(Compat::Exact) => return Some(entry.clone()),
            Some(_) if fallback.is_none() => fallback = Some(entry),
            _ => {}
        }
    }
    fallback.cloned()
}

impl Registry {
    /// Register a class-scoped operator overload.
    pub fn add_class_operator(
        &mut self,
        interner: &StringInterner,
        class: ClassId,
        mut entry: OperatorEntry,
    ) -> Result<(), EvalError> {
        entry.owner = Some(class);
        entry.validate(interner)?;
        check_duplicate(&self.class(class).operators, &entry, interner)?;
        self.class_mut(class).operators.push(entry);
        Ok(())
    }

    /// Register a record-scoped operator overload.
    pub fn add_record_operator(
        &mut self,
        interner: &StringInterner,
        record: RecordId,
        entry: OperatorEntry,
    ) -> Result<(), EvalError> {
        entry.validate(interner)?;
        check_duplicate(&self.record(record).operators, &entry, interner)?;
        self.record_mut(record).operators.push(entry);
        Ok(())
    }

    /// Register a global operator overload.
    pub fn add_global_operator(
        &mut self,
        interner: &StringInterner,
        entry: OperatorEntry,
    ) -> Result<(), EvalError> {
        entry.validate(interner)?;
        check_duplicate(&self.global_operators, &entry, interner)?;
        self.global_operators.push(entry);
        Ok(())
    }

    /// Find the overload for `kind` applied to `operands`.
    ///
    /// Search order: the left operand's class hierarchy (most-derived
    /// first), the right operand's, each operand's record type, then the
    /// global table. The first scope with a usable entry wins; inside a
    /// scope, exact operand matches beat assignment-compatible ones.
    pub fn find_operator(
        &self,
        interner: &StringInterner,
        kind: OperatorKind,
        operands: &[Value],
    ) -> Option<OperatorEntry> {
        for value in operands {
            if let Some(obj) = value.as_object() {
                let class = obj.borrow().class;
                for c in self.class_chain(class) {
                    if let Some(entry) =
                        best_in_scope(&self.class(c).operators, kind, operands, self, interner)
                    {
                        return Some(entry);
                    }
                }
            }
        }
        for value in operands {
            if let Value::Record(rec) = value {
                if let Some(entry) = best_in_scope(
                    &self.record(rec.type_id).operators,
                    kind,
                    operands,
                    self,
                    interner,
                ) {
                    return Some(entry);
                }
            }
        }
        best_in_scope(&self.global_operators, kind, operands, self, interner)
    }
}
