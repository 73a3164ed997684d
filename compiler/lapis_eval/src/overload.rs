//! Overload resolution.
//!
//! Candidates are collected by the registry (hierarchy walk with
//! same-signature hiding); this module picks one for a concrete argument
//! list. Single-candidate calls never reach the scorer. Multi-candidate
//! calls evaluate eager positions once; positions lazy in every candidate
//! arrive as unevaluated thunks and score as exact.
//!
//! Scoring: per argument, exact type match 2, convertible 1, incompatible 0,
//! plus a bonus when the candidate's declared parameter count equals the
//! argument count (no defaults consumed). Highest total wins; a tie is an
//! ambiguity error at the call site, not a silent first-wins pick.

use lapis_ir::{MethodDecl, StringInterner};

use crate::convert::compat_of;
use crate::registry::Registry;
use crate::value::Value;

/// Result of scoring a candidate set against evaluated arguments.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ResolveOutcome {
    /// Index of the winning candidate.
    Selected(usize),
    /// Two candidates scored equally; indices of both.
    Ambiguous(usize, usize),
    /// No candidate accepts this argument count.
    NoMatch,
}

/// Pick the best candidate for `args`. Arguments have been evaluated once
/// by the caller; scoring never re-evaluates them.
pub fn resolve_overload(
    candidates: &[&MethodDecl],
    args: &[Value],
    reg: &Registry,
    interner: &StringInterner,
) -> ResolveOutcome {
    let mut best: Option<(usize, u32)> = None;
    let mut tied: Option<usize> = None;

    for (index, decl) in candidates.iter().enumerate() {
        if !decl.arity_matches(args.len()) {
            continue;
        }
        let mut score: u32 = if decl.params.len() == args.len() { 1 } else { 0 };
        for (arg, param) in args.iter().zip(&decl.params) {
            score += compat_of(arg, &param.ty, reg, interner).score();
        }
        match best {
            None => best = Some((index, score)),
            Some((_, best_score)) if score > best_score => {
                best = Some((index, score));
                tied = None;
            }
            Some((_, best_score)) if score == best_score => tied = Some(index),
            Some(_) => {}
        }
    }

    match (best, tied) {
        (Some((index, _)), None) => ResolveOutcome::Selected(index),
        (Some((index, _)), Some(other)) => ResolveOutcome::Ambiguous(index, other),
        (None, _) => ResolveOutcome::NoMatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapis_ir::{Binding, ExprId, MethodKind, Param, Span, TypeSpec};
    use pretty_assertions::assert_eq;

    fn decl(interner: &StringInterner, types: &[TypeSpec]) -> MethodDecl {
        let name = interner.intern("Make");
        MethodDecl {
            name,
            key: interner.intern_ci("Make"),
            params: types
                .iter()
                .enumerate()
                .map(|(i, ty)| {
                    let p = interner.intern_ci(&format!("p{i}"));
                    Param::new(p, p, ty.clone())
                })
                .collect(),
            return_type: None,
            kind: MethodKind::Procedure,
            binding: Binding::Static,
            is_class_method: false,
            is_overload: true,
            body: ExprId::INVALID,
            span: Span::DUMMY,
        }
    }

    #[test]
    fn arity_isolates_candidates() {
        let interner = StringInterner::new();
        let reg = Registry::new();
        let one = decl(&interner, &[TypeSpec::Integer]);
        let two = decl(&interner, &[TypeSpec::Integer, TypeSpec::Integer]);
        let three = decl(
            &interner,
            &[TypeSpec::Integer, TypeSpec::Integer, TypeSpec::Integer],
        );
        let candidates = [&one, &two, &three];

        let args = [Value::Int(1), Value::Int(2)];
        assert_eq!(
            resolve_overload(&candidates, &args, &reg, &interner),
            ResolveOutcome::Selected(1)
        );
        let none = vec![Value::Int(1); 4];
        assert_eq!(
            resolve_overload(&candidates, &none, &reg, &interner),
            ResolveOutcome::NoMatch
        );
    }

    #[test]
    fn exact_beats_convertible() {
        let interner = StringInterner::new();
        let reg = Registry::new();
        let int_version = decl(&interner, &[TypeSpec::Integer]);
        let float_version = decl(&interner, &[TypeSpec::Float]);
        let candidates = [&float_version, &int_version];

        assert_eq!(
            resolve_overload(&candidates, &[Value::Int(1)], &reg, &interner),
            ResolveOutcome::Selected(1)
        );
        assert_eq!(
            resolve_overload(&candidates, &[Value::Float(1.5)], &reg, &interner),
            ResolveOutcome::Selected(0)
        );
    }

    #[test]
    fn equal_scores_are_ambiguous() {
        let interner = StringInterner::new();
        let reg = Registry::new();
        let a = decl(&interner, &[TypeSpec::Float]);
        let b = decl(&interner, &[TypeSpec::String]);
        let candidates = [&a, &b];

        // An integer converts to both float and string: same score.
        assert_eq!(
            resolve_overload(&candidates, &[Value::Int(1)], &reg, &interner),
            ResolveOutcome::Ambiguous(0, 1)
        );
    }

    #[test]
    fn exact_arity_preferred_over_defaults() {
        let interner = StringInterner::new();
        let reg = Registry::new();
        let mut with_default = decl(&interner, &[TypeSpec::Integer, TypeSpec::Integer]);
        with_default.params[1].default = Some(ExprId::new(0));
        let exact = decl(&interner, &[TypeSpec::Integer]);
        let candidates = [&with_default, &exact];

        assert_eq!(
            resolve_overload(&candidates, &[Value::Int(1)], &reg, &interner),
            ResolveOutcome::Selected(1)
        );
    }
}
