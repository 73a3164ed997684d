//! Raising, handler matching, `finally` blocks, the recursion limit and
//! backtrace capture.

use lapis_ir::{BinaryOp, TypeSpec};
use pretty_assertions::assert_eq;

use crate::{EvalErrorKind, Interpreter, InterpreterBuilder, Value};

use super::support::Ast;

#[test]
fn handler_matches_exception_hierarchy() {
    let mut ast = Ast::new();
    // F: try raise ERange.Create() except on e: EError do Result := e.ClassName
    let create = ast.method_call("ERange", "Create", &[]);
    let body = ast.raise(create);
    let class_name = ast.method_call("e", "ClassName", &[]);
    let handler_body = ast.set_result(class_name);
    let on_error = ast.handler(Some("EError"), Some("e"), handler_body);
    let guarded = ast.try_except(body, vec![on_error], None);
    let f = ast.class_function("F", vec![], TypeSpec::String, guarded);

    let call = ast.method_call("TT", "F", &[]);

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    let interner = interp.interner();
    let reg = interp.registry_mut();
    let error = reg.register_class(interner, "EError", None).unwrap();
    reg.register_class(interner, "ERange", Some(error)).unwrap();
    let tt = reg.register_class(interner, "TT", None).unwrap();
    reg.add_method(tt, f);
    reg.finalize_all(interner);

    // The base-class arm must catch the derived exception and see its
    // runtime class.
    assert_eq!(interp.eval(call).unwrap(), Value::str("ERange"));
}

#[test]
fn unmatched_class_falls_through() {
    let mut ast = Ast::new();
    let create = ast.method_call("ERange", "Create", &[]);
    let body = ast.raise(create);
    let zero = ast.int(0);
    let handler_body = ast.set_result(zero);
    let on_other = ast.handler(Some("EOther"), Some("e"), handler_body);
    let guarded = ast.try_except(body, vec![on_other], None);
    let f = ast.class_function("F", vec![], TypeSpec::Integer, guarded);

    let call = ast.method_call("TT", "F", &[]);

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    let interner = interp.interner();
    let reg = interp.registry_mut();
    reg.register_class(interner, "ERange", None).unwrap();
    reg.register_class(interner, "EOther", None).unwrap();
    let tt = reg.register_class(interner, "TT", None).unwrap();
    reg.add_method(tt, f);
    reg.finalize_all(interner);

    let err = interp.eval(call).unwrap_err();
    assert_eq!(
        err.kind,
        EvalErrorKind::UserException {
            class: "ERange".to_string(),
        }
    );
}

#[test]
fn catch_all_handles_engine_errors() {
    let mut ast = Ast::new();
    // A bare except arm catches engine failures and binds the message.
    let one = ast.int(1);
    let zero = ast.int(0);
    let body = ast.binary(BinaryOp::IntDiv, one, zero);
    let e = ast.ident("e");
    let handler_body = ast.set_result(e);
    let catch_all = ast.handler(None, Some("e"), handler_body);
    let guarded = ast.try_except(body, vec![catch_all], None);
    let f = ast.class_function("F", vec![], TypeSpec::String, guarded);

    let call = ast.method_call("TT", "F", &[]);

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    let interner = interp.interner();
    let reg = interp.registry_mut();
    let tt = reg.register_class(interner, "TT", None).unwrap();
    reg.add_method(tt, f);
    reg.finalize_all(interner);

    assert_eq!(interp.eval(call).unwrap(), Value::str("division by zero"));
}

#[test]
fn finally_runs_on_error_path() {
    let mut ast = Ast::new();
    let one = ast.int(1);
    let zero = ast.int(0);
    let body = ast.binary(BinaryOp::IntDiv, one, zero);
    let one = ast.int(1);
    let cleanup = ast.set("flag", one);
    let guarded = ast.try_finally(body, cleanup);
    let read_flag = ast.ident("flag");

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    interp.define_global("flag", Value::Int(0));

    let err = interp.eval(guarded).unwrap_err();
    assert_eq!(err.kind, EvalErrorKind::DivisionByZero);
    assert_eq!(interp.eval(read_flag).unwrap(), Value::Int(1));
}

#[test]
fn recursion_limit_is_bounded_and_catchable() {
    let mut ast = Ast::new();
    let recurse = ast.method_call("TR", "Loop", &[]);
    let looper = ast.class_procedure("Loop", vec![], recurse);

    let unguarded = ast.method_call("TR", "Loop", &[]);

    let inner = ast.method_call("TR", "Loop", &[]);
    let caught = ast.string("caught");
    let handler_body = ast.set_result(caught);
    let catch_all = ast.handler(None, None, handler_body);
    let guarded = ast.try_except(inner, vec![catch_all], None);
    let guard = ast.class_function("Guard", vec![], TypeSpec::String, guarded);

    let guard_call = ast.method_call("TR", "Guard", &[]);

    let mut interp = InterpreterBuilder::new(&ast.interner, &ast.arena)
        .max_call_depth(8)
        .build();
    let interner = interp.interner();
    let reg = interp.registry_mut();
    let tr = reg.register_class(interner, "TR", None).unwrap();
    reg.add_method(tr, looper);
    reg.add_method(tr, guard);
    reg.finalize_all(interner);

    let err = interp.eval(unguarded).unwrap_err();
    assert_eq!(err.kind, EvalErrorKind::RecursionLimit { depth: 8 });

    // Hitting the limit is an ordinary catchable error.
    assert_eq!(interp.eval(guard_call).unwrap(), Value::str("caught"));
}

#[test]
fn backtrace_lists_frames_outermost_first() {
    let mut ast = Ast::new();
    let call_b = ast.method_call("TChain", "B", &[]);
    let a = ast.class_procedure("A", vec![], call_b);
    let call_c = ast.method_call("TChain", "C", &[]);
    let b = ast.class_procedure("B", vec![], call_c);
    let boom = ast.string("boom");
    let raise = ast.raise(boom);
    let c = ast.class_procedure("C", vec![], raise);

    let call = ast.method_call("TChain", "A", &[]);

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    let interner = interp.interner();
    let reg = interp.registry_mut();
    let chain = reg.register_class(interner, "TChain", None).unwrap();
    reg.add_method(chain, a);
    reg.add_method(chain, b);
    reg.add_method(chain, c);
    reg.finalize_all(interner);

    let err = interp.eval(call).unwrap_err();
    let backtrace = err.backtrace.unwrap();
    assert_eq!(backtrace.frames.len(), 3);
    let names: Vec<&str> = backtrace
        .frames
        .iter()
        .map(|frame| interp.interner().lookup(frame.name))
        .collect();
    assert_eq!(names, vec!["TChain.A", "TChain.B", "TChain.C"]);
}
