// Runtime component tests: environment frames, numbers and values.

use kestrel::environment::{Environment, ImmutableBinding};
use kestrel::error::{ErrorKind, Span};
use kestrel::number::Number;
use kestrel::value::Value;
use kestrel::{interpret, BufferSink};

#[test]
fn test_put_variable_binds_locally_when_unbound() {
    let mut env = Environment::new();
    let root = env.root();
    let child = env.child(root);

    env.put_variable(child, "x", Value::number(1)).unwrap();
    assert_eq!(env.get_variable(child, "x"), Some(Value::number(1)));
    assert_eq!(env.get_variable(root, "x"), None);
}

#[test]
fn test_put_variable_overwrites_outer_binding() {
    let mut env = Environment::new();
    let root = env.root();
    env.put_variable(root, "x", Value::number(1)).unwrap();

    let child = env.child(root);
    let grandchild = env.child(child);
    env.put_variable(grandchild, "x", Value::number(2)).unwrap();

    assert_eq!(env.global("x"), Some(Value::number(2)));
}

#[test]
fn test_define_shadows_outer_binding() {
    let mut env = Environment::new();
    let root = env.root();
    env.define(root, "x", Value::number(1), true);

    let child = env.child(root);
    env.define(child, "x", Value::number(2), true);
    env.put_variable(child, "x", Value::number(3)).unwrap();

    assert_eq!(env.get_variable(child, "x"), Some(Value::number(3)));
    assert_eq!(env.global("x"), Some(Value::number(1)));
}

#[test]
fn test_immutable_binding_rejects_assignment() {
    let mut env = Environment::new();
    let root = env.root();
    env.define(root, "Point", Value::Bool(true), false);

    let child = env.child(root);
    assert_eq!(
        env.put_variable(child, "Point", Value::number(3)),
        Err(ImmutableBinding("Point".to_string()))
    );
}

#[test]
fn test_released_frames_are_reused() {
    let mut env = Environment::new();
    let root = env.root();

    let scope = env.child(root);
    assert_eq!(env.live_frames(), 2);
    env.release(scope);
    assert_eq!(env.live_frames(), 1);

    let reused = env.child(root);
    assert_eq!(reused, scope);
}

#[test]
fn test_captured_frames_survive_release() {
    let mut env = Environment::new();
    let root = env.root();

    let scope = env.child(root);
    env.mark_captured(scope);
    env.release(scope);
    assert_eq!(env.live_frames(), 2);

    // Nothing in the root refers to the frame any more
    assert_eq!(env.collect_garbage(), 1);
    assert_eq!(env.live_frames(), 1);
}

#[test]
fn test_garbage_collection_after_closure_is_dropped() {
    let mut sink = BufferSink::new();
    let env = interpret("make n = lambda x -> x + n; add = make(1);", &mut sink).unwrap();
    assert_eq!(env.live_frames(), 2);

    let env = interpret("make n = lambda x -> x + n; add = make(1); add = 0;", &mut sink).unwrap();
    assert_eq!(env.live_frames(), 1);
}

#[test]
fn test_closures_in_lists_keep_frames_alive() {
    let mut sink = BufferSink::new();
    let env = interpret("make n = lambda x -> x + n; fs = [make(1), make(2)];", &mut sink).unwrap();
    assert_eq!(env.live_frames(), 3);
}

#[test]
fn test_calls_do_not_leak_frames() {
    let mut sink = BufferSink::new();
    let env = interpret(
        "sum = foldl(lambda acc, x -> { y = acc + x; y }, 0, [1, 2, 3, 4, 5]);",
        &mut sink,
    )
    .unwrap();
    assert_eq!(env.global("sum"), Some(Value::number(15)));
    assert_eq!(env.live_frames(), 1);
}

#[test]
fn test_builtins_live_in_root() {
    let env = {
        let mut sink = BufferSink::new();
        interpret("1;", &mut sink).unwrap()
    };
    for (name, arity) in [("println", 1), ("map", 2), ("foldl", 3), ("length", 1), ("typeOf", 1)] {
        assert!(env.global_function(name, arity).is_some(), "missing builtin {}/{}", name, arity);
    }
    assert!(env.global_function("println", 2).is_none());
}

#[test]
fn test_number_parsing_is_exact() {
    let tenth = Number::parse("0.1").unwrap();
    let sum = tenth.add(&tenth).add(&tenth);
    assert_eq!(sum, Number::parse("0.3").unwrap());
    assert_eq!(Number::parse("0012").unwrap(), Number::from(12));
}

#[test]
fn test_number_display() {
    assert_eq!(Number::from(-42).to_string(), "-42");
    assert_eq!(Number::parse("2.50").unwrap().to_string(), "2.5");
    assert_eq!(Number::from(-1).checked_div(&Number::from(8)).unwrap().to_string(), "-0.125");
    assert_eq!(
        Number::from(2).checked_div(&Number::from(3)).unwrap().to_string(),
        "0.66666666666666666666"
    );
}

#[test]
fn test_number_power() {
    let two = Number::from(2);
    assert_eq!(two.pow(&Number::from(10)).unwrap(), Number::from(1024));
    assert_eq!(two.pow(&Number::from(-2)).unwrap(), Number::parse("0.25").unwrap());
    assert_eq!(two.pow(&Number::zero()).unwrap(), Number::from(1));
    assert!(two.pow(&Number::parse("0.5").unwrap()).is_err());
    assert!(Number::zero().pow(&Number::from(-1)).is_err());
    assert!(Number::from(1).checked_div(&Number::zero()).is_none());
}

#[test]
fn test_value_index_and_replace() {
    let span = Span::new(0, 1);
    let list = Value::list(vec![Value::number(1), Value::number(2)]);

    assert_eq!(list.index(&Value::number(1), &span).unwrap(), Value::number(2));
    let err = list.index(&Value::number(2), &span).unwrap_err();
    assert_eq!(err.kind, ErrorKind::IndexError);

    let replaced = list.with_replaced(&Value::number(0), Value::Char('z'), &span).unwrap();
    assert_eq!(replaced, Value::list(vec![Value::Char('z'), Value::number(2)]));
    assert_eq!(list, Value::list(vec![Value::number(1), Value::number(2)]));
}

#[test]
fn test_value_equality_across_kinds() {
    assert_ne!(Value::number(1), Value::Bool(true));
    assert_ne!(Value::Char('1'), Value::number(1));
    assert_eq!(Value::string("ab"), Value::list(vec![Value::Char('a'), Value::Char('b')]));
}

#[test]
fn test_value_display() {
    assert_eq!(Value::string("hi").to_string(), "hi");
    assert_eq!(Value::list(vec![]).to_string(), "[]");
    assert_eq!(
        Value::list(vec![Value::number(1), Value::Char('a'), Value::Bool(false)]).to_string(),
        "[1, 'a', false]"
    );
}
