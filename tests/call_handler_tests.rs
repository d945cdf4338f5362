mod common;

use std::rc::Rc;

use common::{Fixture, int, text};
use plflux::{
    Config,
    bridge::{BridgeError, Domain, ErrorKind},
    handler::{FunctionCall, call_handler, inline_handler, validator},
    host::{
        Datum, Host, MemoryCatalog, NoticeLevel, ProcDefinition, ProcId, SecurityCheck, sqlstate,
    },
};

struct DenyAll;

impl SecurityCheck for DenyAll {
    fn check_validator_access(&self, _caller: ProcId, _target: ProcId) -> bool {
        false
    }
}

#[test]
fn calls_a_procedure_with_arguments() {
    let fx = Fixture::new();
    let id = fx.define_with(ProcDefinition::new("add", "return a + b").with_args(["a", "b"]));
    assert_eq!(fx.call(id, vec![int(2), int(40)]), Ok(int(42)));
}

#[test]
fn unnamed_arguments_are_positional() {
    let fx = Fixture::new();
    let id = fx.define_with(
        ProcDefinition::new("greet", "return 'hello ' .. _1 .. _2").with_args(["", ""]),
    );
    assert_eq!(fx.call(id, vec![text("wor"), text("ld")]), Ok(text("hello world")));
}

#[test]
fn procedure_can_call_itself_by_name() {
    let fx = Fixture::new();
    let id = fx.define_with(
        ProcDefinition::new("fib", "if n < 2 then return n end return fib(n - 1) + fib(n - 2)")
            .with_args(["n"]),
    );
    assert_eq!(fx.call(id, vec![int(15)]), Ok(int(610)));
}

#[test]
fn no_result_is_null() {
    let fx = Fixture::new();
    let id = fx.define("nothing", "local x = 1");
    assert_eq!(fx.call(id, Vec::new()), Ok(Datum::Null));
}

#[test]
fn domain_is_host_after_every_entry_point() {
    let fx = Fixture::new();
    let ok = fx.define("ok", "return 1");
    let fails = fx.define("fails", "error('boom')");
    let inner = fx.define("inner", "raise('P0001', 'inner')");
    let outer = fx.define(
        "outer",
        &format!("local ok, e = pcall(invoke, {}) return invoke({})", inner.0, ok.0),
    );

    assert_eq!(fx.engine.domain().get(), Domain::Host);
    for id in [ok, fails, inner, outer] {
        let _ = fx.call(id, Vec::new());
        assert_eq!(fx.engine.domain().get(), Domain::Host);
    }
    let _ = inline_handler(&fx.engine, "error('x')", true);
    assert_eq!(fx.engine.domain().get(), Domain::Host);
    let _ = validator(&fx.engine, ok, fails, true);
    assert_eq!(fx.engine.domain().get(), Domain::Host);
}

#[test]
fn script_error_reaches_the_host_with_its_message() {
    let fx = Fixture::new();
    let id = fx.define("fails", "error('something broke')");
    let err = fx.call(id, Vec::new()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InterpreterRuntime);
    assert_eq!(err.sqlstate(), sqlstate::EXTERNAL_ROUTINE_EXCEPTION);
    insta::assert_snapshot!(err.to_string(), @"plflux: something broke");
    assert!(fx.engine.host().errors().is_empty());
}

#[test]
fn runtime_error_text_is_passed_on() {
    let fx = Fixture::new();
    let id = fx.define("bad", "return 1 + nil");
    let err = fx.call(id, Vec::new()).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"plflux: attempt to perform arithmetic on a nil value");
}

#[test]
fn raise_from_script_is_a_host_error_with_full_detail() {
    let fx = Fixture::new();
    let id = fx.define("raises", "raise('22012', 'division by zero', 'numerator 1', 'check input')");
    let err = fx.call(id, Vec::new()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Host);
    let data = err.data().unwrap();
    assert_eq!(data.sqlstate, "22012");
    assert_eq!(data.message, "division by zero");
    assert_eq!(data.detail.as_deref(), Some("numerator 1"));
    assert_eq!(data.hint.as_deref(), Some("check input"));
}

#[test]
fn host_error_round_trips_through_script_unchanged() {
    let fx = Fixture::new();
    let direct = fx.define("direct", "raise('22012', 'division by zero', 'numerator 1', 'check input')");
    let rethrown = fx.define(
        "rethrown",
        "local ok, e = pcall(raise, '22012', 'division by zero', 'numerator 1', 'check input')
         if ok then return 'not raised' end
         error(e)",
    );

    let expected = fx.call(direct, Vec::new()).unwrap_err();
    let actual = fx.call(rethrown, Vec::new()).unwrap_err();
    assert_eq!(actual, expected);
    assert_eq!(
        actual.data().map(|d| d.to_json()),
        expected.data().map(|d| d.to_json())
    );
}

#[test]
fn host_error_from_a_nested_call_round_trips() {
    let fx = Fixture::new();
    let inner = fx.define("inner", "raise('P0001', 'from inner', 'inner detail')");
    let outer = fx.define(
        "outer",
        &format!(
            "local ok, e = pcall(invoke, {})
             if e.sqlstate ~= 'P0001' then return 'wrong' end
             error(e)",
            inner.0
        ),
    );
    let err = fx.call(outer, Vec::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Host);
    assert_eq!(err.to_string(), "from inner");
    assert_eq!(err.data().unwrap().detail.as_deref(), Some("inner detail"));
}

#[test]
fn invoke_reenters_the_handler() {
    let fx = Fixture::new();
    let double = fx.define_with(ProcDefinition::new("double", "return x * 2").with_args(["x"]));
    let caller = fx.define("caller", &format!("return invoke({}, 20) + 2", double.0));
    assert_eq!(fx.call(caller, Vec::new()), Ok(int(42)));
}

#[test]
fn unknown_procedure_is_undefined_function() {
    let fx = Fixture::new();
    let err = fx.call(ProcId(9), Vec::new()).unwrap_err();
    assert_eq!(err.sqlstate(), sqlstate::UNDEFINED_FUNCTION);
    insta::assert_snapshot!(err.to_string(), @"cache lookup failed for function 9");
}

#[test]
fn trusted_state_mismatch_is_refused() {
    let fx = Fixture::new();
    let id = fx.define_with(ProcDefinition::new("u", "return 1").untrusted());
    let err = fx.call(id, Vec::new()).unwrap_err();
    assert_eq!(err.sqlstate(), sqlstate::INTERNAL_ERROR);
    assert_eq!(err.to_string(), format!("trusted state mismatch for function {}", id));

    let site = fx.site(id);
    let call = FunctionCall::new(&site, Vec::new()).untrusted();
    assert_eq!(call_handler(&fx.engine, &call), Ok(int(1)));
}

#[test]
fn unsupported_return_value_is_a_datatype_mismatch() {
    let fx = Fixture::new();
    let id = fx.define("returns_fn", "return print");
    let err = fx.call(id, Vec::new()).unwrap_err();
    assert_eq!(err.sqlstate(), sqlstate::DATATYPE_MISMATCH);
    assert_eq!(err.to_string(), "cannot return a value of type function to the host");
}

#[test]
fn nested_calls_past_the_depth_limit_fail_cleanly() {
    let fx = Fixture::with_config(Config {
        max_call_depth: 4,
        ..Config::default()
    });
    let id = fx.define("recurse", "return 0");
    fx.catalog
        .replace_source(id, format!("return invoke({}) + 1", id.0))
        .unwrap();

    let err = fx.call(id, Vec::new()).unwrap_err();
    assert_eq!(err.sqlstate(), sqlstate::STATEMENT_TOO_COMPLEX);
    assert_eq!(err.to_string(), "stack depth limit exceeded");
    assert_eq!(
        err.data().unwrap().hint.as_deref(),
        Some("Increase max_call_depth (currently 4).")
    );
    assert_eq!(fx.engine.depth(), 0);
    assert!(fx.engine.host().errors().is_empty());
}

#[test]
fn pending_cancel_interrupts_a_loop() {
    let fx = Fixture::with_config(Config {
        interrupt_interval: 1,
        ..Config::default()
    });
    let id = fx.define("spin", "local i = 0 while i < 1000 do i = i + 1 end return i");
    assert_eq!(fx.call(id, Vec::new()), Ok(int(1000)));

    fx.engine.host().request_cancel();
    let err = fx.call(id, Vec::new()).unwrap_err();
    assert_eq!(err.sqlstate(), sqlstate::QUERY_CANCELED);
    assert_eq!(err.to_string(), "canceling statement due to user request");
}

#[test]
fn validator_compiles_without_calling() {
    let fx = Fixture::new();
    let id = fx.define("side_effect", "print('called')");
    validator(&fx.engine, ProcId(1), id, true).unwrap();

    assert!(fx.trusted().cached_function(id).is_some());
    assert!(fx.engine.host().take_notices().is_empty());
}

#[test]
fn validator_reports_syntax_errors() {
    let fx = Fixture::new();
    let id = fx.define("broken", "return (1 +");
    let err = validator(&fx.engine, ProcId(1), id, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InterpreterRuntime);
    assert!(
        err.to_string().starts_with("plflux: broken: 1:"),
        "unexpected message: {}",
        err
    );
    assert_eq!(fx.trusted().live_functions_for(id), 0);
}

#[test]
fn validator_does_nothing_without_access() {
    let catalog = Rc::new(MemoryCatalog::new());
    let host = Host::new(catalog.clone()).with_security(DenyAll);
    let fx = Fixture::with_host(catalog, host, Config::default());
    let id = fx.define("broken", "return (1 +");

    assert_eq!(validator(&fx.engine, ProcId(1), id, true), Ok(()));
    assert_eq!(fx.catalog.lookups(), 0);
    assert_eq!(fx.engine.instance_count(), 0);
}

#[test]
fn inline_code_runs_and_prints() {
    let fx = Fixture::new();
    inline_handler(&fx.engine, "local who = 'world' print('hello', who)", true).unwrap();
    let notices = fx.engine.host().take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Info);
    assert_eq!(notices[0].message, "hello\tworld");
}

#[test]
fn inline_code_errors_are_script_errors() {
    let fx = Fixture::new();
    let err = inline_handler(&fx.engine, "assert(false, 'inline failed')", false).unwrap_err();
    assert_eq!(err, BridgeError::Script(Box::new(plflux::host::ErrorData::new(
        sqlstate::EXTERNAL_ROUTINE_EXCEPTION,
        "plflux: inline failed",
    ))));
    assert!(fx.untrusted().is_some());
}
