use crate::{
    bridge::protected::protected_call,
    runtime::{
        ExecContext,
        value::Value,
        vm::{Resumed, Thread, ThreadState},
    },
    testing::{engine, run_err, run_ok, trusted},
};

fn int(n: i64) -> Value {
    Value::Integer(n)
}

#[test]
fn missing_arguments_are_nil_and_extra_ones_dropped() {
    let engine = engine();
    let values = run_ok(
        &engine,
        "local function f(a, b) return a, b end
         local x, y = f(1)
         local p, q = f(1, 2, 3)
         return x, y, p, q",
    );
    assert_eq!(values, vec![int(1), Value::Nil, int(1), int(2)]);
}

#[test]
fn multiple_results_expand_in_last_position() {
    let engine = engine();
    let values = run_ok(
        &engine,
        "local function three() return 1, 2, 3 end
         return 0, three()",
    );
    assert_eq!(values, vec![int(0), int(1), int(2), int(3)]);
}

#[test]
fn results_truncate_to_one_in_the_middle() {
    let engine = engine();
    let values = run_ok(
        &engine,
        "local function three() return 1, 2, 3 end
         local a, b = three(), 9
         return a, b",
    );
    assert_eq!(values, vec![int(1), int(9)]);
}

#[test]
fn recursion_through_the_current_closure() {
    let engine = engine();
    let values = run_ok(
        &engine,
        "local function fact(n) if n <= 1 then return 1 end return n * fact(n - 1) end
         return fact(10)",
    );
    assert_eq!(values, vec![int(3_628_800)]);
}

#[test]
fn closures_capture_values_at_creation() {
    let engine = engine();
    let values = run_ok(
        &engine,
        "local function make(n) return function() return n * 2 end end
         local g = make(21)
         return g(), make(5)()",
    );
    assert_eq!(values, vec![int(42), int(10)]);
}

#[test]
fn unbounded_recursion_overflows_the_frame_stack() {
    let engine = engine();
    let thrown = run_err(&engine, "local function f() return f() end return f()");
    assert_eq!(thrown.to_string(), "stack overflow");
}

#[test]
fn calling_a_non_function_fails() {
    let engine = engine();
    let thrown = run_err(&engine, "local x = 1 return x()");
    insta::assert_snapshot!(thrown.to_string(), @"attempt to call a number value");
}

#[test]
fn pcall_catches_and_the_thread_stays_usable() {
    let engine = engine();
    let values = run_ok(
        &engine,
        "local function deep(n) if n == 0 then error('boom') end return deep(n - 1) end
         local ok, err = pcall(deep, 20)
         local ok2, v = pcall(deep, 0)
         return ok, err, ok2, 1 + 1",
    );
    assert_eq!(
        values,
        vec![Value::Boolean(false), Value::str("boom"), Value::Boolean(false), int(2)]
    );
}

#[test]
fn yield_outside_a_coroutine_fails() {
    let engine = engine();
    let thrown = run_err(&engine, "yield(1)");
    assert_eq!(thrown.to_string(), "attempt to yield from outside a coroutine");
}

fn generator(engine: &crate::Engine, source: &str) -> std::rc::Rc<crate::runtime::closure::Closure> {
    match run_ok(engine, source).into_iter().next() {
        Some(Value::Closure(closure)) => closure,
        other => panic!("expected a function, got {:?}", other),
    }
}

#[test]
fn coroutine_yields_each_value_then_returns() {
    let engine = engine();
    let interp = trusted(&engine);
    let body = generator(
        &engine,
        "return function(n)
           local i = 1
           while i <= n do yield(i * 10) i = i + 1 end
           return 'done'
         end",
    );

    let mut thread = Thread::coroutine(engine.config().max_frames);
    assert_eq!(thread.state(), ThreadState::Dead);
    thread.start(body, vec![int(2)]);
    assert_eq!(thread.state(), ThreadState::Fresh);

    let results = protected_call(&engine, || {
        let cx = ExecContext::new(&engine, &interp);
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(thread.resume(&cx, Vec::new())?);
        }
        Ok(seen)
    })
    .unwrap();

    assert_eq!(
        results,
        vec![
            Resumed::Yielded(vec![int(10)]),
            Resumed::Yielded(vec![int(20)]),
            Resumed::Returned(vec![Value::str("done")]),
        ]
    );
    assert_eq!(thread.state(), ThreadState::Dead);
}

#[test]
fn resume_values_become_yield_results() {
    let engine = engine();
    let interp = trusted(&engine);
    let body = generator(
        &engine,
        "return function()
           local a, b = yield('ready')
           return a + b
         end",
    );
    let mut thread = Thread::coroutine(engine.config().max_frames);
    thread.start(body, Vec::new());

    let (first, second) = protected_call(&engine, || {
        let cx = ExecContext::new(&engine, &interp);
        let first = thread.resume(&cx, Vec::new())?;
        let second = thread.resume(&cx, vec![int(4), int(5), int(6)])?;
        Ok((first, second))
    })
    .unwrap();

    assert_eq!(first, Resumed::Yielded(vec![Value::str("ready")]));
    assert_eq!(second, Resumed::Returned(vec![int(9)]));
}

#[test]
fn yield_inside_pcall_cannot_cross_the_nested_run_loop() {
    let engine = engine();
    let interp = trusted(&engine);
    let body = generator(
        &engine,
        "return function()
           local ok, err = pcall(yield, 1)
           return ok, err
         end",
    );
    let mut thread = Thread::coroutine(engine.config().max_frames);
    thread.start(body, Vec::new());

    let resumed = protected_call(&engine, || {
        let cx = ExecContext::new(&engine, &interp);
        thread.resume(&cx, Vec::new())
    })
    .unwrap();
    assert_eq!(
        resumed,
        Resumed::Returned(vec![
            Value::Boolean(false),
            Value::str("attempt to yield from outside a coroutine"),
        ])
    );
}

#[test]
fn dead_coroutine_cannot_be_resumed() {
    let engine = engine();
    let interp = trusted(&engine);
    let body = generator(&engine, "return function() error('bad row') end");
    let mut thread = Thread::coroutine(engine.config().max_frames);
    thread.start(body, Vec::new());

    let (first, second) = protected_call(&engine, || {
        let cx = ExecContext::new(&engine, &interp);
        let first = thread.resume(&cx, Vec::new()).map_err(|t| t.to_string());
        let second = thread.resume(&cx, Vec::new()).map_err(|t| t.to_string());
        Ok((first, second))
    })
    .unwrap();

    assert_eq!(first, Err("bad row".to_string()));
    assert_eq!(second, Err("cannot resume dead coroutine".to_string()));
}
