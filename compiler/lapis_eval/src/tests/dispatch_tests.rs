//! Dispatch scenarios: virtual binding, receiver classification,
//! `inherited`, interfaces and method pointers.

use lapis_ir::{BinaryOp, TypeSpec};
use pretty_assertions::assert_eq;

use crate::{EvalErrorKind, Interpreter, InterfaceValue, Value};

use super::support::Ast;

#[test]
fn override_wins_through_base_declared_call() {
    let mut ast = Ast::new();
    let generic = ast.string("generic");
    let base_body = ast.set_result(generic);
    let woof = ast.string("Woof");
    let dog_body = ast.set_result(woof);
    // TAnimal.Greet calls Self.Speak; the runtime class picks the body.
    let self_ref = ast.ident("Self");
    let speak_call = ast.call(Some(self_ref), "Speak", &[]);
    let greet_body = ast.set_result(speak_call);

    let speak_base = ast.virtual_function("Speak", vec![], TypeSpec::String, base_body);
    let speak_dog = ast.override_function("Speak", vec![], TypeSpec::String, dog_body);
    let greet = ast.function("Greet", vec![], TypeSpec::String, greet_body);

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    let interner = interp.interner();
    let reg = interp.registry_mut();
    let animal = reg.register_class(interner, "TAnimal", None).unwrap();
    let dog = reg.register_class(interner, "TDog", Some(animal)).unwrap();
    reg.add_method(animal, speak_base);
    reg.add_method(animal, greet);
    reg.add_method(dog, speak_dog);
    reg.finalize_all(interner);

    let dog_value = interp.construct("TDog", &[]).unwrap();
    assert_eq!(
        interp.call_method(dog_value, "Greet", &[]).unwrap(),
        Value::str("Woof")
    );

    let animal_value = interp.construct("TAnimal", &[]).unwrap();
    assert_eq!(
        interp.call_method(animal_value, "Speak", &[]).unwrap(),
        Value::str("generic")
    );
}

#[test]
fn static_redeclaration_resolves_from_runtime_class() {
    let mut ast = Ast::new();
    let base_tag = ast.string("base");
    let base_body = ast.set_result(base_tag);
    let derived_tag = ast.string("derived");
    let derived_body = ast.set_result(derived_tag);
    let tag_base = ast.function("Tag", vec![], TypeSpec::String, base_body);
    let tag_derived = ast.function("Tag", vec![], TypeSpec::String, derived_body);

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    let interner = interp.interner();
    let reg = interp.registry_mut();
    let base = reg.register_class(interner, "TBase", None).unwrap();
    let derived = reg.register_class(interner, "TDerived", Some(base)).unwrap();
    reg.add_method(base, tag_base);
    reg.add_method(derived, tag_derived);
    reg.finalize_all(interner);

    let b = interp.construct("TBase", &[]).unwrap();
    let d = interp.construct("TDerived", &[]).unwrap();
    assert_eq!(interp.call_method(d, "Tag", &[]).unwrap(), Value::str("derived"));
    assert_eq!(interp.call_method(b, "Tag", &[]).unwrap(), Value::str("base"));
}

#[test]
fn lookup_is_case_insensitive() {
    let mut ast = Ast::new();
    let ok = ast.string("ok");
    let body = ast.set_result(ok);
    let speak = ast.function("Speak", vec![], TypeSpec::String, body);
    // Mixed-case class and method names at the call site.
    let call = ast.method_call("tanimal", "SPEAK", &[]);

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    let interner = interp.interner();
    let reg = interp.registry_mut();
    let animal = reg.register_class(interner, "TAnimal", None).unwrap();
    reg.add_method(animal, speak);
    reg.finalize_all(interner);

    assert_eq!(interp.eval(call).unwrap(), Value::str("ok"));

    let a = interp.construct("TAnimal", &[]).unwrap();
    assert_eq!(interp.call_method(a, "sPeAk", &[]).unwrap(), Value::str("ok"));
}

#[test]
fn classname_reports_runtime_class() {
    let mut ast = Ast::new();
    // Bare ClassName inside a base method body.
    let cn = ast.ident("ClassName");
    let body = ast.set_result(cn);
    let who = ast.function("WhoAmI", vec![], TypeSpec::String, body);

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    let interner = interp.interner();
    let reg = interp.registry_mut();
    let animal = reg.register_class(interner, "TAnimal", None).unwrap();
    reg.register_class(interner, "TDog", Some(animal)).unwrap();
    reg.add_method(animal, who);
    reg.finalize_all(interner);

    let dog = interp.construct("TDog", &[]).unwrap();
    assert_eq!(
        interp.call_method(dog.clone(), "WhoAmI", &[]).unwrap(),
        Value::str("TDog")
    );
    assert_eq!(
        interp.call_method(dog, "ClassName", &[]).unwrap(),
        Value::str("TDog")
    );
}

#[test]
fn classtype_yields_usable_metaclass() {
    let ast = Ast::new();

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    let interner = interp.interner();
    let reg = interp.registry_mut();
    let animal = reg.register_class(interner, "TAnimal", None).unwrap();
    reg.register_class(interner, "TDog", Some(animal)).unwrap();
    reg.finalize_all(interner);

    let dog = interp.construct("TDog", &[]).unwrap();
    let meta = interp.call_method(dog, "ClassType", &[]).unwrap();
    assert!(matches!(meta, Value::ClassRef(_)));

    // The metaclass constructs fresh instances of the runtime class.
    let fresh = interp.call_method(meta, "Create", &[]).unwrap();
    assert_eq!(
        interp.call_method(fresh, "ClassName", &[]).unwrap(),
        Value::str("TDog")
    );
}

#[test]
fn inherited_calls_parent_implementation() {
    let mut ast = Ast::new();
    let generic = ast.string("generic");
    let base_body = ast.set_result(generic);
    // TDog.Speak := inherited Speak() + '!'
    let parent_call = ast.inherited(Some("Speak"), &[]);
    let bang = ast.string("!");
    let concat = ast.binary(BinaryOp::Add, parent_call, bang);
    let dog_body = ast.set_result(concat);

    let speak_base = ast.virtual_function("Speak", vec![], TypeSpec::String, base_body);
    let speak_dog = ast.override_function("Speak", vec![], TypeSpec::String, dog_body);

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    let interner = interp.interner();
    let reg = interp.registry_mut();
    let animal = reg.register_class(interner, "TAnimal", None).unwrap();
    let dog = reg.register_class(interner, "TDog", Some(animal)).unwrap();
    reg.add_method(animal, speak_base);
    reg.add_method(dog, speak_dog);
    reg.finalize_all(interner);

    // No virtual redirection from `inherited`: redirecting would recurse
    // back into the override forever.
    let d = interp.construct("TDog", &[]).unwrap();
    assert_eq!(
        interp.call_method(d, "Speak", &[]).unwrap(),
        Value::str("generic!")
    );
}

#[test]
fn inherited_in_root_class_fails() {
    let mut ast = Ast::new();
    let body = ast.inherited(None, &[]);
    let m = ast.procedure("Orphan", vec![], body);

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    let interner = interp.interner();
    let reg = interp.registry_mut();
    let root = reg.register_class(interner, "TRoot", None).unwrap();
    reg.add_method(root, m);
    reg.finalize_all(interner);

    let r = interp.construct("TRoot", &[]).unwrap();
    let err = interp.call_method(r, "Orphan", &[]).unwrap_err();
    assert_eq!(err.kind, EvalErrorKind::InheritedUnavailable);
}

#[test]
fn inherited_call_outside_a_method_fails() {
    let ast = Ast::new();
    let mut interp = Interpreter::new(&ast.interner, &ast.arena);

    let err = interp.call_inherited_method("Speak", &[]).unwrap_err();
    assert_eq!(err.kind, EvalErrorKind::InheritedUnavailable);
}

#[test]
fn interface_gates_dispatch_to_declared_methods() {
    let mut ast = Ast::new();
    let woof = ast.string("Woof");
    let speak_body = ast.set_result(woof);
    let speak = ast.function("Speak", vec![], TypeSpec::String, speak_body);
    let zero = ast.int(0);
    let fetch_body = ast.set_result(zero);
    let fetch = ast.function("Fetch", vec![], TypeSpec::Integer, fetch_body);

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    let interner = interp.interner();
    let reg = interp.registry_mut();
    let speaker = reg.register_interface(interner, "ISpeaker", None).unwrap();
    reg.add_interface_method(speaker, interner, "Speak");
    let dog = reg.register_class(interner, "TDog", None).unwrap();
    reg.add_method(dog, speak);
    reg.add_method(dog, fetch);
    reg.implement_interface(interner, dog, speaker).unwrap();
    reg.finalize_all(interner);

    let instance = interp.construct("TDog", &[]).unwrap();
    let iface = Value::Interface(InterfaceValue {
        interface: speaker,
        object: instance.as_object().cloned(),
    });

    assert_eq!(
        interp.call_method(iface.clone(), "Speak", &[]).unwrap(),
        Value::str("Woof")
    );
    // Fetch exists on the class but is not part of the contract.
    let err = interp.call_method(iface, "Fetch", &[]).unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::MethodNotFound { .. }));
}

#[test]
fn interface_release_is_nil_safe() {
    let mut ast = Ast::new();
    let woof = ast.string("Woof");
    let speak_body = ast.set_result(woof);
    let speak = ast.function("Speak", vec![], TypeSpec::String, speak_body);

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    let interner = interp.interner();
    let reg = interp.registry_mut();
    let speaker = reg.register_interface(interner, "ISpeaker", None).unwrap();
    reg.add_interface_method(speaker, interner, "Speak");
    let dog = reg.register_class(interner, "TDog", None).unwrap();
    reg.add_method(dog, speak);
    reg.implement_interface(interner, dog, speaker).unwrap();
    reg.finalize_all(interner);

    let nil_iface = Value::Interface(InterfaceValue {
        interface: speaker,
        object: None,
    });
    assert_eq!(
        interp.call_method(nil_iface.clone(), "Free", &[]).unwrap(),
        Value::Nil
    );
    let err = interp.call_method(nil_iface, "Speak", &[]).unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::NilReceiver { .. }));

    let instance = interp.construct("TDog", &[]).unwrap();
    let live = Value::Interface(InterfaceValue {
        interface: speaker,
        object: instance.as_object().cloned(),
    });
    interp.call_method(live, "Free", &[]).unwrap();
    assert!(instance.as_object().unwrap().borrow().destroyed);
}

#[test]
fn method_pointer_captures_override() {
    let mut ast = Ast::new();
    let generic = ast.string("generic");
    let base_body = ast.set_result(generic);
    let woof = ast.string("Woof");
    let dog_body = ast.set_result(woof);
    let speak_base = ast.virtual_function("Speak", vec![], TypeSpec::String, base_body);
    let speak_dog = ast.override_function("Speak", vec![], TypeSpec::String, dog_body);
    let call_f = ast.call(None, "f", &[]);

    let mut interp = Interpreter::new(&ast.interner, &ast.arena);
    let interner = interp.interner();
    let reg = interp.registry_mut();
    let animal = reg.register_class(interner, "TAnimal", None).unwrap();
    let dog = reg.register_class(interner, "TDog", Some(animal)).unwrap();
    reg.add_method(animal, speak_base);
    reg.add_method(dog, speak_dog);
    reg.finalize_all(interner);

    let instance = interp.construct("TDog", &[]).unwrap();
    let pointer = interp.method_pointer(instance, "Speak").unwrap();
    interp.define_global("f", pointer);

    assert_eq!(interp.eval(call_f).unwrap(), Value::str("Woof"));
}
