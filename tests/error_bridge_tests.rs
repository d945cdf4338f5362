mod common;

use common::{Fixture, int, text};
use plflux::{
    bridge::{Domain, ErrorKind},
    host::{NoticeLevel, sqlstate},
};

#[test]
fn domain_survives_deeply_nested_crossings() {
    let fx = Fixture::new();
    let leaf = fx.define("leaf", "raise('P0001', 'leaf failed')");
    let middle = fx.define(
        "middle",
        &format!(
            "local ok, e = pcall(invoke, {leaf})
             local ok2, e2 = pcall(invoke, {leaf})
             return invoke({leaf})",
            leaf = leaf.0
        ),
    );
    let top = fx.define(
        "top",
        &format!("local ok, e = pcall(invoke, {}) return tostring(e)", middle.0),
    );

    let before = fx.engine.domain().get();
    assert_eq!(fx.call(top, Vec::new()), Ok(text("leaf failed")));
    assert_eq!(fx.engine.domain().get(), before);
    assert_eq!(before, Domain::Host);
    assert_eq!(fx.engine.depth(), 0);
    assert!(fx.engine.host().errors().is_empty());
}

#[test]
fn caught_host_error_is_recorded_as_the_last_error() {
    let fx = Fixture::new();
    let id = fx.define("catches", "local ok, e = pcall(raise, 'P0001', 'remember me') return e.message");
    assert_eq!(fx.call(id, Vec::new()), Ok(text("remember me")));
    let last = fx.trusted().last_error().unwrap();
    assert_eq!(last.message(), "remember me");
}

#[test]
fn allocation_failure_in_script_becomes_out_of_memory() {
    let fx = Fixture::new();
    let id = fx.define("concat", "return 'a' .. 'b'");
    assert_eq!(fx.call(id, Vec::new()), Ok(text("ab")));

    fx.trusted().simulate_memory_failure();
    let err = fx.call(id, Vec::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InterpreterAllocation);
    assert_eq!(err.sqlstate(), sqlstate::OUT_OF_MEMORY);
    insta::assert_snapshot!(err.to_string(), @"plflux: out of memory");

    assert_eq!(fx.call(id, Vec::new()), Ok(text("ab")));
}

#[test]
fn allocation_failure_while_wrapping_a_host_error_yields_the_placeholder() {
    let fx = Fixture::new();
    let id = fx.define(
        "wraps",
        "local ok, e = pcall(raise, 'P0001', 'primary') return tostring(e)",
    );
    assert_eq!(fx.call(id, Vec::new()), Ok(text("primary")));

    fx.trusted().simulate_memory_failure();
    assert_eq!(
        fx.call(id, Vec::new()),
        Ok(text("recursive error in script error handling"))
    );
}

#[test]
fn placeholder_reaching_the_host_is_the_recursive_error() {
    let fx = Fixture::new();
    let id = fx.define("raises", "raise('P0001', 'primary')");
    assert_eq!(fx.call(id, Vec::new()).unwrap_err().to_string(), "primary");

    fx.trusted().simulate_memory_failure();
    let err = fx.call(id, Vec::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Recursive);
    assert_eq!(err.sqlstate(), sqlstate::INTERNAL_ERROR);
    assert_eq!(err.to_string(), "recursive error in script error handling");
    assert!(fx.engine.terminated().is_none());
}

#[test]
fn failed_detail_capture_yields_the_placeholder() {
    let fx = Fixture::new();
    let id = fx.define("raises", "local ok, e = pcall(raise, 'P0001', 'primary') return e.sqlstate");
    assert_eq!(fx.call(id, Vec::new()), Ok(text("P0001")));

    fx.engine.host().errors().fail_next_copy();
    assert_eq!(fx.call(id, Vec::new()), Ok(plflux::host::Datum::Null));
}

#[test]
fn failed_flush_terminates_all_further_work() {
    let fx = Fixture::new();
    let raises = fx.define("raises", "local ok, e = pcall(raise, 'P0001', 'x') return 'caught'");
    let plain = fx.define("plain", "return 1");
    assert_eq!(fx.call(raises, Vec::new()), Ok(text("caught")));

    fx.engine.host().errors().fail_next_flush();
    let err = fx.call(raises, Vec::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ErrorStateCorrupt);
    assert!(err.is_fatal());

    let later = fx.call(plain, Vec::new()).unwrap_err();
    assert_eq!(later, err);
    assert_eq!(fx.engine.terminated(), Some(err));
    assert_eq!(fx.engine.domain().get(), Domain::Host);
}

#[test]
fn pcall_does_not_catch_fatal_errors() {
    let fx = Fixture::new();
    let id = fx.define(
        "tries",
        "local ok, e = pcall(raise, 'P0001', 'x') print('still running') return 1",
    );
    fx.call(id, Vec::new()).unwrap();
    fx.engine.host().take_notices();

    fx.engine.host().errors().fail_next_flush();
    assert!(fx.call(id, Vec::new()).unwrap_err().is_fatal());
    assert!(fx.engine.host().take_notices().is_empty());
}

#[test]
fn script_error_values_without_text_get_a_placeholder() {
    let fx = Fixture::new();
    let id = fx.define("odd", "error(true)");
    let err = fx.call(id, Vec::new()).unwrap_err();
    assert_eq!(err.to_string(), "plflux: (error is not a string)");
}

#[test]
fn numeric_error_values_are_stringified() {
    let fx = Fixture::new();
    let id = fx.define("num", "error(42)");
    assert_eq!(fx.call(id, Vec::new()).unwrap_err().to_string(), "plflux: 42");
}

#[test]
fn host_error_detail_is_available_to_script_code() {
    let fx = Fixture::new();
    let id = fx.define(
        "inspect",
        "local ok, e = pcall(raise, '23505', 'duplicate key', 'key (id)=(1)', 'use another id')
         print(e.sqlstate, e.message, e.detail, e.hint)
         return ok",
    );
    assert_eq!(fx.call(id, Vec::new()), Ok(plflux::host::Datum::Bool(false)));
    let notices = fx.engine.host().take_notices();
    assert_eq!(notices[0].level, NoticeLevel::Info);
    assert_eq!(
        notices[0].message,
        "23505\tduplicate key\tkey (id)=(1)\tuse another id"
    );
}

#[test]
fn long_detail_survives_the_round_trip() {
    let fx = Fixture::new();
    let id = fx.define(
        "verbose",
        "local s = 'x'
         local i = 0
         while i < 14 do s = s .. s i = i + 1 end
         raise('P0001', 'boom', s)",
    );
    let err = fx.call(id, Vec::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Host);
    assert_eq!(err.sqlstate(), "P0001");
    assert_eq!(err.to_string(), "boom");
    let detail = err.data().and_then(|data| data.detail.clone());
    assert_eq!(detail.map(|d| d.len()), Some(16384));
}

#[test]
fn errors_inside_nested_calls_keep_the_outer_call_usable() {
    let fx = Fixture::new();
    let fails = fx.define("fails", "error('inner')");
    let outer = fx.define(
        "outer",
        &format!(
            "local n = 0
             local i = 0
             while i < 5 do
               local ok, e = pcall(invoke, {})
               if not ok then n = n + 1 end
               i = i + 1
             end
             return n",
            fails.0
        ),
    );
    assert_eq!(fx.call(outer, Vec::new()), Ok(int(5)));
    assert_eq!(fx.trusted().activation_count(), 0);
}
