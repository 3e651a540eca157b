//! Tests for the equality-keyed containers: dict and set key semantics,
//! insertion-order iteration, views, and sequence subscripting.

use pyrope::{ArgValues, Builtins, ExcType, IterTarget, NoLimitTracker, Runtime, Type, Value};

fn runtime() -> Runtime<NoLimitTracker> {
    Runtime::new(NoLimitTracker)
}

fn len_of(rt: &mut Runtime<NoLimitTracker>, value: Value) -> i64 {
    match rt.call_value(Value::Builtin(Builtins::Len), ArgValues::One(value)).unwrap() {
        Value::Int(n) => n,
        other => panic!("len returned {other:?}"),
    }
}

#[test]
fn dict_keys_agree_across_numeric_kinds() {
    let mut rt = runtime();
    let dict = rt.new_dict().unwrap();

    rt.set_item(dict, Value::Int(1), Value::Int(100)).unwrap();
    // True and 1.0 equal 1, so they address the same entry.
    assert_eq!(rt.get_item(dict, Value::Bool(true)).unwrap(), Value::Int(100));
    assert_eq!(rt.get_item(dict, Value::Float(1.0)).unwrap(), Value::Int(100));

    rt.set_item(dict, Value::Float(1.0), Value::Int(200)).unwrap();
    assert_eq!(len_of(&mut rt, dict), 1);
    assert_eq!(rt.get_item(dict, Value::Int(1)).unwrap(), Value::Int(200));
}

#[test]
fn dict_preserves_insertion_order() {
    let mut rt = runtime();
    let dict = rt.new_dict().unwrap();
    for (i, key) in ["b", "a", "c"].iter().enumerate() {
        let k = rt.new_str(*key).unwrap();
        rt.set_item(dict, k, Value::Int(i as i64)).unwrap();
    }

    let keys_iter = rt.dict_view_iter(dict, IterTarget::DictKeys).unwrap();
    let mut seen = Vec::new();
    while let Some(key) = rt.iter_next(&keys_iter).unwrap() {
        seen.push(rt.str_value(&key).unwrap());
    }
    assert_eq!(seen, vec!["b", "a", "c"]);
}

#[test]
fn dict_size_change_during_iteration_fails() {
    let mut rt = runtime();
    let dict = rt.new_dict().unwrap();
    rt.set_item(dict, Value::Int(1), Value::Int(1)).unwrap();
    rt.set_item(dict, Value::Int(2), Value::Int(2)).unwrap();

    let it = rt.dict_view_iter(dict, IterTarget::DictKeys).unwrap();
    assert_eq!(rt.iter_next(&it).unwrap(), Some(Value::Int(1)));

    rt.set_item(dict, Value::Int(3), Value::Int(3)).unwrap();
    let err = rt.iter_next(&it).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::RuntimeError);
}

#[test]
fn dict_items_view_yields_pairs() {
    let mut rt = runtime();
    let dict = rt.new_dict().unwrap();
    rt.set_item(dict, Value::Int(1), Value::Int(10)).unwrap();

    let items = rt.dict_view_iter(dict, IterTarget::DictItems).unwrap();
    let pair = rt.iter_next(&items).unwrap().unwrap();
    assert_eq!(rt.get_item(pair, Value::Int(0)).unwrap(), Value::Int(1));
    assert_eq!(rt.get_item(pair, Value::Int(1)).unwrap(), Value::Int(10));
    assert_eq!(rt.iter_next(&items).unwrap(), None);
}

#[test]
fn instances_key_by_identity() {
    let mut rt = runtime();
    let cls = rt.build_class("Token", &[], vec![]).unwrap();
    let a = rt.call_value(cls, ArgValues::Empty).unwrap();
    let b = rt.call_value(cls, ArgValues::Empty).unwrap();

    let dict = rt.new_dict().unwrap();
    rt.set_item(dict, a, Value::Int(1)).unwrap();
    rt.set_item(dict, b, Value::Int(2)).unwrap();
    assert_eq!(len_of(&mut rt, dict), 2);
    assert_eq!(rt.get_item(dict, a).unwrap(), Value::Int(1));
    assert_eq!(rt.get_item(dict, b).unwrap(), Value::Int(2));
}

#[test]
fn set_deduplicates_by_equality() {
    let mut rt = runtime();
    let s = rt.new_set(vec![Value::Int(1), Value::Float(1.0), Value::Bool(true), Value::Int(2)]).unwrap();
    assert_eq!(len_of(&mut rt, s), 2);
    assert!(rt.contains(s, Value::Float(2.0)).unwrap());
    assert!(!rt.contains(s, Value::Int(3)).unwrap());
}

#[test]
fn set_union_via_operator() {
    let mut rt = runtime();
    let a = rt.new_set(vec![Value::Int(1), Value::Int(2)]).unwrap();
    let b = rt.new_set(vec![Value::Int(2), Value::Int(3)]).unwrap();
    let union = rt.binary_op(pyrope::BinaryOp::BitOr, a, b).unwrap();
    assert_eq!(len_of(&mut rt, union), 3);
    let inter = rt.binary_op(pyrope::BinaryOp::BitAnd, a, b).unwrap();
    assert_eq!(len_of(&mut rt, inter), 1);
    assert!(rt.contains(inter, Value::Int(2)).unwrap());
}

#[test]
fn frozenset_works_as_dict_key() {
    let mut rt = runtime();
    let elems = rt.new_list(vec![Value::Int(1), Value::Int(2)]).unwrap();
    let fs = rt
        .call_value(Value::Builtin(Builtins::Kind(Type::FrozenSet)), ArgValues::One(elems))
        .unwrap();

    let dict = rt.new_dict().unwrap();
    rt.set_item(dict, fs, Value::Int(99)).unwrap();
    assert_eq!(rt.get_item(dict, fs).unwrap(), Value::Int(99));

    // Mutable sets are not hashable keys.
    let s = rt.new_set(vec![Value::Int(1)]).unwrap();
    let err = rt.set_item(dict, s, Value::Int(0)).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::TypeError);
}

#[test]
fn list_negative_index_and_slicing() {
    let mut rt = runtime();
    let list = rt
        .new_list(vec![Value::Int(0), Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)])
        .unwrap();

    assert_eq!(rt.get_item(list, Value::Int(-1)).unwrap(), Value::Int(4));

    let every_other = rt.new_slice(None, None, Some(2)).unwrap();
    let sliced = rt.get_item(list, every_other).unwrap();
    let items = rt.materialize_iterable(&sliced).unwrap();
    assert_eq!(items, vec![Value::Int(0), Value::Int(2), Value::Int(4)]);

    let reversed = rt.new_slice(None, None, Some(-1)).unwrap();
    let back = rt.get_item(list, reversed).unwrap();
    assert_eq!(rt.get_item(back, Value::Int(0)).unwrap(), Value::Int(4));

    let err = rt.get_item(list, Value::Int(5)).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::IndexError);
}

#[test]
fn list_item_assignment_and_deletion() {
    let mut rt = runtime();
    let list = rt.new_list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]).unwrap();

    rt.set_item(list, Value::Int(-1), Value::Int(30)).unwrap();
    assert_eq!(rt.get_item(list, Value::Int(2)).unwrap(), Value::Int(30));

    rt.del_item(list, Value::Int(0)).unwrap();
    assert_eq!(len_of(&mut rt, list), 2);
    assert_eq!(rt.get_item(list, Value::Int(0)).unwrap(), Value::Int(2));

    // Tuples are immutable.
    let tuple = rt.new_tuple(vec![Value::Int(1)]).unwrap();
    let err = rt.set_item(tuple, Value::Int(0), Value::Int(2)).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::TypeError);
}

#[test]
fn string_subscripting_yields_characters() {
    let mut rt = runtime();
    let s = rt.new_str("héllo").unwrap();
    assert_eq!(len_of(&mut rt, s), 5);

    let ch = rt.get_item(s, Value::Int(1)).unwrap();
    assert_eq!(rt.str_value(&ch).unwrap(), "é");
    let last = rt.get_item(s, Value::Int(-1)).unwrap();
    assert_eq!(rt.str_value(&last).unwrap(), "o");
}

#[test]
fn nested_container_repr() {
    let mut rt = runtime();
    let inner = rt.new_tuple(vec![Value::Int(1), Value::Int(2)]).unwrap();
    let list = rt.new_list(vec![inner, Value::None, Value::Bool(true)]).unwrap();
    assert_eq!(rt.repr_value(&list).unwrap(), "[(1, 2), None, True]");
}
