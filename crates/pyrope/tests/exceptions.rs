//! Tests for the exception taxonomy: hierarchy checks, exception objects,
//! raising, and resource-limit failures.

use pyrope::{
    ArgValues, Builtins, ExcType, LimitedTracker, NoLimitTracker, Runtime, Type, Value,
};

fn runtime() -> Runtime<NoLimitTracker> {
    Runtime::new(NoLimitTracker)
}

fn check(rt: &mut Runtime<NoLimitTracker>, builtin: Builtins, a: Value, b: Value) -> bool {
    match rt.call_value(Value::Builtin(builtin), ArgValues::Two(a, b)).unwrap() {
        Value::Bool(result) => result,
        other => panic!("expected bool, got {other:?}"),
    }
}

#[test]
fn taxonomy_parent_links() {
    assert!(ExcType::KeyError.is_subclass_of(ExcType::LookupError));
    assert!(ExcType::IndexError.is_subclass_of(ExcType::LookupError));
    assert!(ExcType::LookupError.is_subclass_of(ExcType::Exception));
    assert!(ExcType::ZeroDivisionError.is_subclass_of(ExcType::ArithmeticError));
    assert!(ExcType::Exception.is_subclass_of(ExcType::BaseException));
    assert!(!ExcType::KeyError.is_subclass_of(ExcType::IndexError));
    assert!(ExcType::CancelledError.is_subclass_of(ExcType::Exception));
    assert!(ExcType::RecursionError.is_subclass_of(ExcType::RuntimeError));
}

#[test]
fn exception_objects_carry_args() {
    let mut rt = runtime();
    let msg = rt.new_str("missing").unwrap();
    let exc = rt
        .call_value(
            Value::Builtin(Builtins::Exc(ExcType::KeyError)),
            ArgValues::One(msg),
        )
        .unwrap();

    let args_key = rt.intern_name("args");
    let args = rt.get_attr(exc, args_key).unwrap();
    let first = rt.get_item(args, Value::Int(0)).unwrap();
    assert_eq!(rt.str_value(&first).unwrap(), "missing");
}

#[test]
fn isinstance_follows_exception_hierarchy() {
    let mut rt = runtime();
    let exc = rt
        .call_value(Value::Builtin(Builtins::Exc(ExcType::KeyError)), ArgValues::Empty)
        .unwrap();

    for ancestor in [ExcType::KeyError, ExcType::LookupError, ExcType::Exception, ExcType::BaseException] {
        assert!(check(&mut rt, Builtins::IsInstance, exc, Value::Builtin(Builtins::Exc(ancestor))));
    }
    assert!(!check(&mut rt, Builtins::IsInstance, exc, Value::Builtin(Builtins::Exc(ExcType::IndexError))));
    assert!(!check(&mut rt, Builtins::IsInstance, Value::Int(1), Value::Builtin(Builtins::Exc(ExcType::Exception))));
}

#[test]
fn issubclass_handles_exception_kinds() {
    let mut rt = runtime();
    let sub = Value::Builtin(Builtins::Exc(ExcType::FileNotFoundError));
    let sup = Value::Builtin(Builtins::Exc(ExcType::OSError));
    assert!(check(&mut rt, Builtins::IsSubclass, sub, sup));

    // Tuple classinfo: any match wins.
    let opts = rt.new_tuple(vec![
        Value::Builtin(Builtins::Exc(ExcType::ValueError)),
        Value::Builtin(Builtins::Exc(ExcType::OSError)),
    ]).unwrap();
    assert!(check(&mut rt, Builtins::IsSubclass, sub, opts));
}

#[test]
fn bool_is_an_int_but_int_is_not_a_bool() {
    let mut rt = runtime();
    assert!(check(&mut rt, Builtins::IsInstance, Value::Bool(true), Value::Builtin(Builtins::Kind(Type::Int))));
    assert!(!check(&mut rt, Builtins::IsInstance, Value::Int(1), Value::Builtin(Builtins::Kind(Type::Bool))));
    assert!(check(&mut rt, Builtins::IsInstance, Value::Int(1), Value::Builtin(Builtins::Kind(Type::Object))));
}

#[test]
fn raise_value_converts_exception_objects() {
    let mut rt = runtime();
    let msg = rt.new_str("bad input").unwrap();
    let exc = rt
        .call_value(Value::Builtin(Builtins::Exc(ExcType::ValueError)), ArgValues::One(msg))
        .unwrap();

    let err = rt.raise_value(exc);
    assert_eq!(err.exc_type(), ExcType::ValueError);

    // A bare exception kind raises with no message.
    let err = rt.raise_value(Value::Builtin(Builtins::Exc(ExcType::StopIteration)));
    assert_eq!(err.exc_type(), ExcType::StopIteration);

    // Non-exception values cannot be raised.
    let err = rt.raise_value(Value::Int(3));
    assert_eq!(err.exc_type(), ExcType::TypeError);
}

#[test]
fn allocation_limit_surfaces_as_memory_error() {
    let mut rt = Runtime::new(LimitedTracker::new(4, 1 << 20));
    let mut last = Ok(Value::None);
    for _ in 0..8 {
        last = rt.new_list(vec![Value::Int(1)]);
        if last.is_err() {
            break;
        }
    }
    let err = last.unwrap_err();
    assert_eq!(err.exc_type(), ExcType::MemoryError);
}

#[test]
fn memory_limit_counts_payload_size() {
    let mut rt = Runtime::new(LimitedTracker::new(1_000, 256));
    let big = "x".repeat(10_000);
    let err = rt.new_str(big).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::MemoryError);
}
