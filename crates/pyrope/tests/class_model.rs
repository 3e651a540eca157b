//! End-to-end tests for the class model: construction, inheritance,
//! descriptors, slots, and operator overriding through a `Runtime`.

use std::{cell::Cell, rc::Rc};

use pyrope::{
    ArgValues, BinaryOp, Builtins, ExcType, NoLimitTracker, Runtime, StaticStrings, StringId, Value,
};

fn runtime() -> Runtime<NoLimitTracker> {
    Runtime::new(NoLimitTracker)
}

/// Builds a `Shape` base class with a `describe` method.
fn build_shape(rt: &mut Runtime<NoLimitTracker>) -> (Value, StringId) {
    let describe_id = rt.intern_name("describe");
    let describe = rt.register_function("describe", |rt, args| {
        let _this = args.get_one_arg("describe")?;
        rt.new_str("shape")
    });
    let shape = rt.build_class("Shape", &[], vec![(describe_id, describe)]).unwrap();
    (shape, describe_id)
}

#[test]
fn instance_attributes_via_init() {
    let mut rt = runtime();
    let radius_key = rt.intern_name("radius");
    let init = rt.register_function("__init__", |rt, args| {
        let (this, r) = args.get_two_args("__init__")?;
        let radius = rt.intern_name("radius");
        rt.set_attr(this, radius, r)?;
        Ok(Value::None)
    });
    let circle = rt
        .build_class("Circle", &[], vec![(StaticStrings::DunderInit.into(), init)])
        .unwrap();

    let c = rt.call_value(circle, ArgValues::One(Value::Int(3))).unwrap();
    assert_eq!(rt.get_attr(c, radius_key).unwrap(), Value::Int(3));

    rt.set_attr(c, radius_key, Value::Int(5)).unwrap();
    assert_eq!(rt.get_attr(c, radius_key).unwrap(), Value::Int(5));

    rt.del_attr(c, radius_key).unwrap();
    let err = rt.get_attr(c, radius_key).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::AttributeError);
}

#[test]
fn inherited_method_binds_receiver() {
    let mut rt = runtime();
    let (shape, describe_id) = build_shape(&mut rt);
    let circle = rt.build_class("Circle", &[shape], vec![]).unwrap();

    let c = rt.call_value(circle, ArgValues::Empty).unwrap();
    let method = rt.get_attr(c, describe_id).unwrap();
    let out = rt.call_value(method, ArgValues::Empty).unwrap();
    assert_eq!(rt.str_value(&out).unwrap(), "shape");
}

#[test]
fn property_wins_over_instance_state() {
    let mut rt = runtime();
    let radius_key = rt.intern_name("radius");
    let diameter_key = rt.intern_name("diameter");

    let init = rt.register_function("__init__", |rt, args| {
        let (this, r) = args.get_two_args("__init__")?;
        let radius = rt.intern_name("radius");
        rt.set_attr(this, radius, r)?;
        Ok(Value::None)
    });
    let getter = rt.register_function("diameter", |rt, args| {
        let this = args.get_one_arg("diameter")?;
        let radius = rt.intern_name("radius");
        let r = rt.get_attr(this, radius)?;
        rt.binary_op(BinaryOp::Mul, r, Value::Int(2))
    });
    let setter = rt.register_function("set_diameter", |rt, args| {
        let (this, d) = args.get_two_args("set_diameter")?;
        let radius = rt.intern_name("radius");
        let half = rt.binary_op(BinaryOp::FloorDiv, d, Value::Int(2))?;
        rt.set_attr(this, radius, half)?;
        Ok(Value::None)
    });
    let diameter = rt.new_property(Some(getter), Some(setter), None).unwrap();
    let circle = rt
        .build_class(
            "Circle",
            &[],
            vec![(StaticStrings::DunderInit.into(), init), (diameter_key, diameter)],
        )
        .unwrap();

    let c = rt.call_value(circle, ArgValues::One(Value::Int(3))).unwrap();
    assert_eq!(rt.get_attr(c, diameter_key).unwrap(), Value::Int(6));

    // The setter routes the write back through radius.
    rt.set_attr(c, diameter_key, Value::Int(10)).unwrap();
    assert_eq!(rt.get_attr(c, radius_key).unwrap(), Value::Int(5));
    assert_eq!(rt.get_attr(c, diameter_key).unwrap(), Value::Int(10));

    // No deleter configured.
    let err = rt.del_attr(c, diameter_key).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::AttributeError);
}

#[test]
fn classmethod_receives_class_staticmethod_receives_nothing() {
    let mut rt = runtime();
    let unit_key = rt.intern_name("unit");
    let tau_key = rt.intern_name("tau");

    let init = rt.register_function("__init__", |rt, args| {
        let (this, r) = args.get_two_args("__init__")?;
        let radius = rt.intern_name("radius");
        rt.set_attr(this, radius, r)?;
        Ok(Value::None)
    });
    let unit_fn = rt.register_function("unit", |rt, args| {
        let cls = args.get_one_arg("unit")?;
        rt.call_value(cls, ArgValues::One(Value::Int(1)))
    });
    let unit = rt.new_classmethod(unit_fn).unwrap();
    let tau_fn = rt.register_function("tau", |_rt, args| {
        args.check_zero_args("tau")?;
        Ok(Value::Float(6.283_185_307_179_586))
    });
    let tau = rt.new_staticmethod(tau_fn).unwrap();

    let circle = rt
        .build_class(
            "Circle",
            &[],
            vec![
                (StaticStrings::DunderInit.into(), init),
                (unit_key, unit),
                (tau_key, tau),
            ],
        )
        .unwrap();

    // Classmethod called off the class builds an instance.
    let unit_bound = rt.get_attr(circle, unit_key).unwrap();
    let u = rt.call_value(unit_bound, ArgValues::Empty).unwrap();
    let radius_key = rt.intern_name("radius");
    assert_eq!(rt.get_attr(u, radius_key).unwrap(), Value::Int(1));

    // Classmethod called off an instance still receives the class.
    let unit_from_instance = rt.get_attr(u, unit_key).unwrap();
    let u2 = rt.call_value(unit_from_instance, ArgValues::Empty).unwrap();
    assert_eq!(rt.get_attr(u2, radius_key).unwrap(), Value::Int(1));

    // Staticmethod receives no implicit argument.
    let tau_bound = rt.get_attr(u, tau_key).unwrap();
    let t = rt.call_value(tau_bound, ArgValues::Empty).unwrap();
    assert_eq!(t, Value::Float(6.283_185_307_179_586));
}

#[test]
fn diamond_mro_prefers_first_base() {
    let mut rt = runtime();
    let who_id = rt.intern_name("who");

    let who_a = rt.register_function("who_a", |rt, args| {
        let _this = args.get_one_arg("who")?;
        rt.new_str("a")
    });
    let who_b = rt.register_function("who_b", |rt, args| {
        let _this = args.get_one_arg("who")?;
        rt.new_str("b")
    });
    let who_c = rt.register_function("who_c", |rt, args| {
        let _this = args.get_one_arg("who")?;
        rt.new_str("c")
    });

    let a = rt.build_class("A", &[], vec![(who_id, who_a)]).unwrap();
    let b = rt.build_class("B", &[a], vec![(who_id, who_b)]).unwrap();
    let c = rt.build_class("C", &[a], vec![(who_id, who_c)]).unwrap();
    let d = rt.build_class("D", &[b, c], vec![]).unwrap();

    let instance = rt.call_value(d, ArgValues::Empty).unwrap();
    let method = rt.get_attr(instance, who_id).unwrap();
    let out = rt.call_value(method, ArgValues::Empty).unwrap();
    assert_eq!(rt.str_value(&out).unwrap(), "b");

    // D is a subclass of every class in the diamond.
    for base in [a, b, c, d] {
        let ok = rt
            .call_value(Value::Builtin(Builtins::IsSubclass), ArgValues::Two(d, base))
            .unwrap();
        assert_eq!(ok, Value::Bool(true));
    }
    let ok = rt
        .call_value(Value::Builtin(Builtins::IsInstance), ArgValues::Two(instance, a))
        .unwrap();
    assert_eq!(ok, Value::Bool(true));
}

#[test]
fn inconsistent_mro_is_rejected() {
    let mut rt = runtime();
    let a = rt.build_class("A", &[], vec![]).unwrap();
    let b = rt.build_class("B", &[a], vec![]).unwrap();
    // C(A, B) contradicts B(A): no linearization exists.
    let err = rt.build_class("C", &[a, b], vec![]).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::TypeError);
}

#[test]
fn super_resolves_overridden_method() {
    let mut rt = runtime();
    let greet_id = rt.intern_name("greet");

    let base_greet = rt.register_function("base_greet", |rt, args| {
        let _this = args.get_one_arg("greet")?;
        rt.new_str("base")
    });
    let base = rt.build_class("Base", &[], vec![(greet_id, base_greet)]).unwrap();

    let derived_slot: Rc<Cell<Value>> = Rc::new(Cell::new(Value::None));
    let slot = Rc::clone(&derived_slot);
    let derived_greet = rt.register_function("derived_greet", move |rt, args| {
        let this = args.get_one_arg("greet")?;
        let proxy = rt.super_proxy(slot.get(), this)?;
        let greet = rt.intern_name("greet");
        let parent = rt.get_attr(proxy, greet)?;
        let from_base = rt.call_value(parent, ArgValues::Empty)?;
        let text = rt.str_value(&from_base)?;
        rt.new_str(format!("derived+{text}"))
    });
    let derived = rt.build_class("Derived", &[base], vec![(greet_id, derived_greet)]).unwrap();
    derived_slot.set(derived);

    let instance = rt.call_value(derived, ArgValues::Empty).unwrap();
    let method = rt.get_attr(instance, greet_id).unwrap();
    let out = rt.call_value(method, ArgValues::Empty).unwrap();
    assert_eq!(rt.str_value(&out).unwrap(), "derived+base");
}

#[test]
fn slots_reject_undeclared_attributes() {
    let mut rt = runtime();
    let x_key = rt.intern_name("x");
    let z_key = rt.intern_name("z");

    let x = rt.new_str("x").unwrap();
    let y = rt.new_str("y").unwrap();
    let slots = rt.new_tuple(vec![x, y]).unwrap();
    let point = rt
        .build_class("Point", &[], vec![(StaticStrings::DunderSlots.into(), slots)])
        .unwrap();

    let p = rt.call_value(point, ArgValues::Empty).unwrap();
    rt.set_attr(p, x_key, Value::Int(1)).unwrap();
    assert_eq!(rt.get_attr(p, x_key).unwrap(), Value::Int(1));

    let err = rt.set_attr(p, z_key, Value::Int(9)).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::AttributeError);

    // Unset slots read as missing, not as None.
    let y_key = rt.intern_name("y");
    let err = rt.get_attr(p, y_key).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::AttributeError);
}

#[test]
fn dunder_add_overrides_operator() {
    let mut rt = runtime();

    let init = rt.register_function("__init__", |rt, args| {
        let (this, v) = args.get_two_args("__init__")?;
        let key = rt.intern_name("v");
        rt.set_attr(this, key, v)?;
        Ok(Value::None)
    });
    let add = rt.register_function("__add__", |rt, args| {
        let (this, other) = args.get_two_args("__add__")?;
        let key = rt.intern_name("v");
        let a = rt.get_attr(this, key)?;
        let b = rt.get_attr(other, key)?;
        rt.binary_op(BinaryOp::Add, a, b)
    });
    let wrapper = rt
        .build_class(
            "Wrapper",
            &[],
            vec![
                (StaticStrings::DunderInit.into(), init),
                (StaticStrings::DunderAdd.into(), add),
            ],
        )
        .unwrap();

    let a = rt.call_value(wrapper, ArgValues::One(Value::Int(2))).unwrap();
    let b = rt.call_value(wrapper, ArgValues::One(Value::Int(40))).unwrap();
    let sum = rt.binary_op(BinaryOp::Add, a, b).unwrap();
    assert_eq!(sum, Value::Int(42));
}

#[test]
fn class_mutation_is_seen_through_instances() {
    let mut rt = runtime();
    let answer_id = rt.intern_name("answer");
    let cls = rt.build_class("Config", &[], vec![]).unwrap();
    let instance = rt.call_value(cls, ArgValues::Empty).unwrap();

    let err = rt.get_attr(instance, answer_id).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::AttributeError);

    // Adding a class attribute after instances exist must be visible.
    rt.set_attr(cls, answer_id, Value::Int(42)).unwrap();
    assert_eq!(rt.get_attr(instance, answer_id).unwrap(), Value::Int(42));

    rt.del_attr(cls, answer_id).unwrap();
    let err = rt.get_attr(instance, answer_id).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::AttributeError);
}

#[test]
fn user_iterator_protocol_and_exhaustion() {
    let mut rt = runtime();
    let init = rt.register_function("__init__", |rt, args| {
        let this = args.get_one_arg("__init__")?;
        let n = rt.intern_name("n");
        rt.set_attr(this, n, Value::Int(0))?;
        Ok(Value::None)
    });
    let iter_fn = rt.register_function("__iter__", |_rt, args| args.get_one_arg("__iter__"));
    let next_fn = rt.register_function("__next__", |rt, args| {
        let this = args.get_one_arg("__next__")?;
        let n = rt.intern_name("n");
        let Value::Int(i) = rt.get_attr(this, n)? else {
            return Err(ExcType::type_error("counter state must be an int"));
        };
        if i >= 3 {
            return Err(ExcType::stop_iteration());
        }
        rt.set_attr(this, n, Value::Int(i + 1))?;
        Ok(Value::Int(i))
    });
    let counter = rt
        .build_class(
            "Counter",
            &[],
            vec![
                (StaticStrings::DunderInit.into(), init),
                (StaticStrings::DunderIter.into(), iter_fn),
                (StaticStrings::DunderNext.into(), next_fn),
            ],
        )
        .unwrap();

    let c = rt.call_value(counter, ArgValues::Empty).unwrap();
    let items = rt.materialize_iterable(&c).unwrap();
    assert_eq!(items, vec![Value::Int(0), Value::Int(1), Value::Int(2)]);

    // Exhausted iterators stay exhausted; no error, no restart.
    let again = rt.materialize_iterable(&c).unwrap();
    assert!(again.is_empty());
}

#[test]
fn has_attr_probes_without_raising() {
    let mut rt = runtime();
    let (shape, describe_id) = build_shape(&mut rt);
    let s = rt.call_value(shape, ArgValues::Empty).unwrap();

    assert!(rt.has_attr(s, describe_id).unwrap());
    let missing = rt.intern_name("area");
    assert!(!rt.has_attr(s, missing).unwrap());
    assert!(!rt.has_attr(Value::Int(1), missing).unwrap());
}

#[test]
fn gc_collects_instance_cycles() {
    let mut rt = runtime();
    let partner_id = rt.intern_name("partner");
    let cls = rt.build_class("Node", &[], vec![]).unwrap();
    rt.add_root(cls);

    let a = rt.call_value(cls, ArgValues::Empty).unwrap();
    let b = rt.call_value(cls, ArgValues::Empty).unwrap();
    rt.set_attr(a, partner_id, b).unwrap();
    rt.set_attr(b, partner_id, a).unwrap();

    // Both instances are only reachable through each other.
    let freed = rt.gc(&[]);
    assert!(freed >= 2);

    let kept = rt.call_value(cls, ArgValues::Empty).unwrap();
    let freed = rt.gc(&[kept]);
    assert_eq!(freed, 0);
}
