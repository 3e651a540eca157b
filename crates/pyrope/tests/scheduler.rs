//! Tests for deterministic task scheduling: virtual time, ordering,
//! gather, first, cancellation, and failure propagation.

use std::{cell::RefCell, rc::Rc};

use pyrope::{ArgValues, ExcType, NoLimitTracker, Runtime, Value};

fn runtime() -> Runtime<NoLimitTracker> {
    Runtime::new(NoLimitTracker)
}

/// Registers a function returning a constant and recording its run order.
fn recorder(
    rt: &mut Runtime<NoLimitTracker>,
    log: &Rc<RefCell<Vec<i64>>>,
    result: i64,
) -> Value {
    let log = Rc::clone(log);
    rt.register_function("record", move |_rt, args| {
        args.check_zero_args("record")?;
        log.borrow_mut().push(result);
        Ok(Value::Int(result))
    })
}

#[test]
fn tasks_run_in_virtual_time_order() {
    let mut rt = runtime();
    let log = Rc::new(RefCell::new(Vec::new()));
    let f1 = recorder(&mut rt, &log, 1);
    let f2 = recorder(&mut rt, &log, 2);
    let f3 = recorder(&mut rt, &log, 3);

    rt.spawn(f3, Vec::new(), 30).unwrap();
    rt.spawn(f1, Vec::new(), 10).unwrap();
    rt.spawn(f2, Vec::new(), 20).unwrap();
    rt.run_until_idle().unwrap();

    assert_eq!(*log.borrow(), vec![1, 2, 3]);
    assert_eq!(rt.now(), 30);
}

#[test]
fn same_tick_tasks_run_in_spawn_order() {
    let mut rt = runtime();
    let log = Rc::new(RefCell::new(Vec::new()));
    let f1 = recorder(&mut rt, &log, 1);
    let f2 = recorder(&mut rt, &log, 2);
    let f3 = recorder(&mut rt, &log, 3);

    rt.spawn(f1, Vec::new(), 5).unwrap();
    rt.spawn(f2, Vec::new(), 5).unwrap();
    rt.spawn(f3, Vec::new(), 5).unwrap();
    rt.run_until_idle().unwrap();

    assert_eq!(*log.borrow(), vec![1, 2, 3]);
}

#[test]
fn gather_returns_results_in_argument_order() {
    let mut rt = runtime();
    let log = Rc::new(RefCell::new(Vec::new()));
    let f1 = recorder(&mut rt, &log, 1);
    let f2 = recorder(&mut rt, &log, 2);
    let f3 = recorder(&mut rt, &log, 3);

    // Completion order is 3, 2, 1; result order must follow the arguments.
    let fut1 = rt.spawn(f1, Vec::new(), 30).unwrap();
    let fut2 = rt.spawn(f2, Vec::new(), 20).unwrap();
    let fut3 = rt.spawn(f3, Vec::new(), 10).unwrap();
    let results = rt.gather(&[fut1, fut2, fut3]).unwrap();

    assert_eq!(rt.get_item(results, Value::Int(0)).unwrap(), Value::Int(1));
    assert_eq!(rt.get_item(results, Value::Int(1)).unwrap(), Value::Int(2));
    assert_eq!(rt.get_item(results, Value::Int(2)).unwrap(), Value::Int(3));
    assert_eq!(*log.borrow(), vec![3, 2, 1]);
}

#[test]
fn first_returns_earliest_resolution() {
    let mut rt = runtime();
    let log = Rc::new(RefCell::new(Vec::new()));
    let slow = recorder(&mut rt, &log, 1);
    let fast = recorder(&mut rt, &log, 2);

    let slow_fut = rt.spawn(slow, Vec::new(), 50).unwrap();
    let fast_fut = rt.spawn(fast, Vec::new(), 1).unwrap();
    let winner = rt.first(&[slow_fut, fast_fut]).unwrap();
    assert_eq!(winner, Value::Int(2));
    assert_eq!(rt.now(), 1);
}

#[test]
fn first_breaks_ties_by_argument_position() {
    let mut rt = runtime();
    let log = Rc::new(RefCell::new(Vec::new()));
    let a = recorder(&mut rt, &log, 1);
    let b = recorder(&mut rt, &log, 2);

    // Both due at the same tick; the task for `a_fut` runs first (spawn
    // order), so polling sees it resolved before `b_fut` ever runs.
    let a_fut = rt.spawn(a, Vec::new(), 5).unwrap();
    let b_fut = rt.spawn(b, Vec::new(), 5).unwrap();
    let winner = rt.first(&[b_fut, a_fut]).unwrap();
    assert_eq!(winner, Value::Int(1));
}

#[test]
fn cancelled_task_never_runs() {
    let mut rt = runtime();
    let log = Rc::new(RefCell::new(Vec::new()));
    let f = recorder(&mut rt, &log, 1);

    let fut = rt.spawn(f, Vec::new(), 5).unwrap();
    rt.cancel(fut).unwrap();
    rt.run_until_idle().unwrap();

    assert!(log.borrow().is_empty());
    let err = rt.await_future(fut).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::CancelledError);
}

#[test]
fn gather_propagates_cancellation() {
    let mut rt = runtime();
    let log = Rc::new(RefCell::new(Vec::new()));
    let ok = recorder(&mut rt, &log, 1);
    let doomed = recorder(&mut rt, &log, 2);

    let ok_fut = rt.spawn(ok, Vec::new(), 1).unwrap();
    let doomed_fut = rt.spawn(doomed, Vec::new(), 2).unwrap();
    rt.cancel(doomed_fut).unwrap();

    let err = rt.gather(&[ok_fut, doomed_fut]).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::CancelledError);
}

#[test]
fn task_failure_reaches_the_awaiter() {
    let mut rt = runtime();
    let f = rt.register_function("explode", |_rt, _args| {
        Err(ExcType::value_error("boom"))
    });
    let fut = rt.spawn(f, Vec::new(), 1).unwrap();
    let err = rt.await_future(fut).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::ValueError);
}

#[test]
fn sleep_runs_due_tasks_and_advances_clock() {
    let mut rt = runtime();
    let log = Rc::new(RefCell::new(Vec::new()));
    let due = recorder(&mut rt, &log, 1);
    let later = recorder(&mut rt, &log, 2);

    rt.spawn(due, Vec::new(), 5).unwrap();
    rt.spawn(later, Vec::new(), 50).unwrap();
    rt.sleep(10).unwrap();

    assert_eq!(*log.borrow(), vec![1]);
    assert_eq!(rt.now(), 10);

    rt.run_until_idle().unwrap();
    assert_eq!(*log.borrow(), vec![1, 2]);
    assert_eq!(rt.now(), 50);
}

#[test]
fn await_with_timeout_expires() {
    let mut rt = runtime();
    let f = rt.register_function("late", |_rt, _args| Ok(Value::Int(1)));
    let fut = rt.spawn(f, Vec::new(), 100).unwrap();

    let err = rt.await_with_timeout(fut, 10).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::TimeoutError);
    assert_eq!(rt.now(), 10);

    // The task is still queued; awaiting without a deadline succeeds.
    assert_eq!(rt.await_future(fut).unwrap(), Value::Int(1));
    assert_eq!(rt.now(), 100);
}

#[test]
fn await_with_timeout_resolves_in_time() {
    let mut rt = runtime();
    let f = rt.register_function("prompt", |_rt, _args| Ok(Value::Int(7)));
    let fut = rt.spawn(f, Vec::new(), 3).unwrap();
    assert_eq!(rt.await_with_timeout(fut, 10).unwrap(), Value::Int(7));
    assert_eq!(rt.now(), 3);
}

#[test]
fn awaiting_own_future_deadlocks_into_failure() {
    let mut rt = runtime();
    let self_fut: Rc<std::cell::Cell<Value>> = Rc::new(std::cell::Cell::new(Value::None));
    let slot = Rc::clone(&self_fut);
    let f = rt.register_function("selfish", move |rt, _args| rt.await_future(slot.get()));
    let fut = rt.spawn(f, Vec::new(), 1).unwrap();
    self_fut.set(fut);

    let err = rt.await_future(fut).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::RuntimeError);
}

#[test]
fn await_value_passes_plain_values_through() {
    let mut rt = runtime();
    assert_eq!(rt.await_value(Value::Int(5)).unwrap(), Value::Int(5));
    assert_eq!(rt.await_value(Value::None).unwrap(), Value::None);

    // Bare callables are invoked synchronously.
    let f = rt.register_function("direct", |_rt, _args| Ok(Value::Int(9)));
    assert_eq!(rt.await_value(f).unwrap(), Value::Int(9));
    assert_eq!(rt.now(), 0);

    // Futures are driven to resolution.
    let g = rt.register_function("queued", |_rt, _args| Ok(Value::Int(4)));
    let fut = rt.spawn(g, Vec::new(), 7).unwrap();
    assert_eq!(rt.await_value(fut).unwrap(), Value::Int(4));
    assert_eq!(rt.now(), 7);
}

#[test]
fn gather_accepts_bare_callables() {
    let mut rt = runtime();
    let log = Rc::new(RefCell::new(Vec::new()));
    let f1 = recorder(&mut rt, &log, 1);
    let f2 = recorder(&mut rt, &log, 2);

    let fut = rt.spawn(f2, Vec::new(), 10).unwrap();
    let results = rt.gather(&[f1, fut]).unwrap();
    assert_eq!(rt.get_item(results, Value::Int(0)).unwrap(), Value::Int(1));
    assert_eq!(rt.get_item(results, Value::Int(1)).unwrap(), Value::Int(2));
}

#[test]
fn pending_futures_survive_gc() {
    let mut rt = runtime();
    let f = rt.register_function("keep", |rt, args| {
        let v = args.get_one_arg("keep")?;
        rt.new_list(vec![v])
    });
    let arg = rt.new_str("payload").unwrap();
    let fut = rt.spawn(f, vec![arg], 5).unwrap();

    // The queued task's argument is only reachable through the scheduler.
    let freed = rt.gc(&[fut]);
    assert_eq!(freed, 0);

    let out = rt.await_future(fut).unwrap();
    let inner = rt.get_item(out, Value::Int(0)).unwrap();
    assert_eq!(rt.str_value(&inner).unwrap(), "payload");
}
