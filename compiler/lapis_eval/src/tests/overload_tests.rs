//! Overload resolution at real call sites: arity isolation, scoring and
//! single evaluation of arguments.

use lapis_ir::{BinaryOp, TypeSpec};
use pretty_assertions::assert_eq;

use crate::{EvalErrorKind, Interpreter, Value};

use super::support::Ast;

fn make_array_decls(ast: &mut Ast) -> Vec<lapis_ir::MethodDecl> {
    let a1 = ast.ident("a");
    let one = ast.array_lit(&[a1]);
    let body1 = ast.set_result(one);

    let a2 = ast.ident("a");
    let b2 = ast.ident("b");
    let two = ast.array_lit(&[a2, b2]);
    let body2 = ast.set_result(two);

    let a3 = ast.ident("a");
    let b3 = ast.ident("b");
    let c3 = ast.ident("c");
    let three = ast.array_lit(&[a3, b3, c3]);
    let body3 = ast.set_result(three);

    let elem = TypeSpec::Variant;
    vec![
        ast.class_function(
            "MakeArray",
            vec![ast.param("a", elem.clone())],
            TypeSpec::Variant,
            body1,
        ),
        ast.class_function(
            "MakeArray",
            vec![ast.param("a", elem.clone()), ast.param("b", elem.clone())],
            TypeSpec::Variant,
            body2,
        ),
        ast.class_function(
            "MakeArray",
            vec![
                ast.param("a", elem.clone()),
                ast.param("b", elem.clone()),
                ast.param("c", elem),
            ],
            TypeSpec::Variant,
            body3,
        ),
    ]
}

#[test]
fn arity_isolates_overloads() {
    let mut ast = Ast::new();
    let decls = make_array_decls(&mut ast);

    let seven = ast.int(7);
    let call1 = ast.method_call("TArr", "MakeArray", &[seven]);
    let seven = ast.int(7);
    let eight = ast.int(8);
    let call2 = ast.method_call("TArr", "MakeArray", &[seven, eight]);
    let seven = ast.int(7);
    let eight = ast.int(8);
    let nine = ast.int(9);
    let call3 = ast.method_call("TArr", "MakeArray", &[seven, eight, nine]);

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    let interner = interp.interner();
    let reg = interp.registry_mut();
    let arr = reg.register_class(interner, "TArr", None).unwrap();
    for decl in decls {
        reg.add_method(arr, decl);
    }
    reg.finalize_all(interner);

    assert_eq!(interp.eval(call1).unwrap(), Value::array(vec![Value::Int(7)]));
    assert_eq!(
        interp.eval(call2).unwrap(),
        Value::array(vec![Value::Int(7), Value::Int(8)])
    );
    assert_eq!(
        interp.eval(call3).unwrap(),
        Value::array(vec![Value::Int(7), Value::Int(8), Value::Int(9)])
    );
}

#[test]
fn no_arity_match_reports_expected_counts() {
    let mut ast = Ast::new();
    let decls = make_array_decls(&mut ast);

    let args: Vec<_> = (0..4).map(|i| ast.int(i)).collect();
    let call = ast.method_call("TArr", "MakeArray", &args);

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    let interner = interp.interner();
    let reg = interp.registry_mut();
    let arr = reg.register_class(interner, "TArr", None).unwrap();
    for decl in decls {
        reg.add_method(arr, decl);
    }
    reg.finalize_all(interner);

    let err = interp.eval(call).unwrap_err();
    assert_eq!(
        err.kind,
        EvalErrorKind::ArityMismatch {
            name: "MakeArray".to_string(),
            expected: "1, 2 or 3".to_string(),
            got: 4,
        }
    );
}

#[test]
fn exact_parameter_match_beats_convertible() {
    let mut ast = Ast::new();
    let int_tag = ast.string("int");
    let int_body = ast.set_result(int_tag);
    let str_tag = ast.string("str");
    let str_body = ast.set_result(str_tag);
    let pick_int = ast.class_function(
        "Pick",
        vec![ast.param("x", TypeSpec::Integer)],
        TypeSpec::String,
        int_body,
    );
    let pick_str = ast.class_function(
        "Pick",
        vec![ast.param("x", TypeSpec::String)],
        TypeSpec::String,
        str_body,
    );

    let three = ast.int(3);
    let call_int = ast.method_call("TPick", "Pick", &[three]);
    let hello = ast.string("hello");
    let call_str = ast.method_call("TPick", "Pick", &[hello]);

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    let interner = interp.interner();
    let reg = interp.registry_mut();
    let pick = reg.register_class(interner, "TPick", None).unwrap();
    reg.add_method(pick, pick_int);
    reg.add_method(pick, pick_str);
    reg.finalize_all(interner);

    // An integer converts to string too; the exact match must win.
    assert_eq!(interp.eval(call_int).unwrap(), Value::str("int"));
    assert_eq!(interp.eval(call_str).unwrap(), Value::str("str"));
}

#[test]
fn equal_scores_are_an_error_not_first_wins() {
    let mut ast = Ast::new();
    let a_tag = ast.string("a");
    let a_body = ast.set_result(a_tag);
    let b_tag = ast.string("b");
    let b_body = ast.set_result(b_tag);
    let amb_a = ast.class_function(
        "Amb",
        vec![ast.param("x", TypeSpec::Variant)],
        TypeSpec::String,
        a_body,
    );
    let amb_b = ast.class_function(
        "Amb",
        vec![ast.param("y", TypeSpec::Variant)],
        TypeSpec::String,
        b_body,
    );

    let one = ast.int(1);
    let call = ast.method_call("TAmb", "Amb", &[one]);

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    let interner = interp.interner();
    let reg = interp.registry_mut();
    let amb = reg.register_class(interner, "TAmb", None).unwrap();
    reg.add_method(amb, amb_a);
    reg.add_method(amb, amb_b);
    reg.finalize_all(interner);

    let err = interp.eval(call).unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::AmbiguousOverload { .. }));
}

#[test]
fn overloaded_call_evaluates_arguments_once() {
    let mut ast = Ast::new();
    // TCnt.Bump() increments a class var and returns it.
    let n = ast.ident("N");
    let one = ast.int(1);
    let plus = ast.binary(BinaryOp::Add, n, one);
    let inc = ast.set("N", plus);
    let n_again = ast.ident("N");
    let ret = ast.set_result(n_again);
    let bump_body = ast.block(&[inc, ret]);
    let bump = ast.class_function("Bump", vec![], TypeSpec::Integer, bump_body);

    let int_tag = ast.string("int");
    let int_body = ast.set_result(int_tag);
    let str_tag = ast.string("str");
    let str_body = ast.set_result(str_tag);
    let pick_int = ast.class_function(
        "Pick",
        vec![ast.param("x", TypeSpec::Integer)],
        TypeSpec::String,
        int_body,
    );
    let pick_str = ast.class_function(
        "Pick",
        vec![ast.param("x", TypeSpec::String)],
        TypeSpec::String,
        str_body,
    );

    let bump_call = ast.method_call("TCnt", "Bump", &[]);
    let call = ast.method_call("TPick", "Pick", &[bump_call]);

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    let interner = interp.interner();
    let reg = interp.registry_mut();
    let cnt = reg.register_class(interner, "TCnt", None).unwrap();
    let counter = reg.add_class_var(cnt, interner, "N", Value::Int(0));
    reg.add_method(cnt, bump);
    let pick = reg.register_class(interner, "TPick", None).unwrap();
    reg.add_method(pick, pick_int);
    reg.add_method(pick, pick_str);
    reg.finalize_all(interner);

    assert_eq!(interp.eval(call).unwrap(), Value::str("int"));
    // Scoring two candidates must not re-run the argument expression.
    assert_eq!(counter.get_clone(), Value::Int(1));
}
