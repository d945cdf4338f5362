mod common;

use std::rc::Rc;

use common::{Fixture, int};
use plflux::{
    Config,
    bridge::ErrorKind,
    handler::validator,
    host::{Catalog, CatalogError, Host, MemoryCatalog, ProcDefinition, ProcId, sqlstate},
    runtime::leak_detector,
};

/// Rewrites the definition on every read, so no compiled object is ever current.
struct RewritingCatalog(Rc<MemoryCatalog>);

impl Catalog for RewritingCatalog {
    fn get_definition(&self, id: ProcId) -> Result<ProcDefinition, CatalogError> {
        self.0.touch(id)?;
        self.0.get_definition(id)
    }
}

#[test]
fn second_call_at_a_site_reuses_the_object() {
    let fx = Fixture::new();
    let id = fx.define("one", "return 1");
    let site = fx.site(id);

    assert_eq!(fx.call_at(&site, Vec::new()), Ok(int(1)));
    let first = fx.trusted().site_function(site.id).unwrap();
    let created = leak_detector::snapshot().function_objects_created;

    assert_eq!(fx.call_at(&site, Vec::new()), Ok(int(1)));
    assert_eq!(fx.trusted().site_function(site.id), Some(first));
    assert_eq!(fx.trusted().cached_function(id), Some(first));
    assert_eq!(leak_detector::snapshot().function_objects_created, created);
}

#[test]
fn sites_share_the_cached_object() {
    let fx = Fixture::new();
    let id = fx.define("one", "return 1");
    let a = fx.site(id);
    let b = fx.site(id);

    fx.call_at(&a, Vec::new()).unwrap();
    fx.call_at(&b, Vec::new()).unwrap();

    let interp = fx.trusted();
    assert_eq!(interp.site_function(a.id), interp.site_function(b.id));
    assert_eq!(interp.live_functions_for(id), 1);
    assert_eq!(interp.activation_count(), 2);
}

#[test]
fn changed_definition_recompiles_once_and_rebinds() {
    let fx = Fixture::new();
    let id = fx.define("version", "return 1");
    let site = fx.site(id);

    assert_eq!(fx.call_at(&site, Vec::new()), Ok(int(1)));
    let old = fx.trusted().site_function(site.id).unwrap();
    let before = leak_detector::snapshot();

    fx.catalog.replace_source(id, "return 2").unwrap();
    assert_eq!(fx.call_at(&site, Vec::new()), Ok(int(2)));
    assert_eq!(fx.call_at(&site, Vec::new()), Ok(int(2)));

    let after = leak_detector::snapshot();
    assert_eq!(after.function_objects_created - before.function_objects_created, 1);
    assert_eq!(after.function_objects_freed - before.function_objects_freed, 1);

    let interp = fx.trusted();
    let new = interp.site_function(site.id).unwrap();
    assert_ne!(new, old);
    assert_eq!(interp.cached_function(id), Some(new));
    assert!(interp.function_meta(old).is_none());
    assert_eq!(interp.live_functions_for(id), 1);
}

#[test]
fn rewriting_the_row_without_changes_still_recompiles() {
    let fx = Fixture::new();
    let id = fx.define("same", "return 1");
    let site = fx.site(id);
    fx.call_at(&site, Vec::new()).unwrap();
    let old = fx.trusted().cached_function(id).unwrap();

    let stamp = fx.catalog.touch(id).unwrap();
    fx.call_at(&site, Vec::new()).unwrap();

    let interp = fx.trusted();
    let new = interp.cached_function(id).unwrap();
    assert_ne!(new, old);
    assert_eq!(interp.function_meta(new).map(|meta| meta.stamp), Some(stamp));
}

#[test]
fn stale_object_stays_alive_while_another_site_holds_it() {
    let fx = Fixture::new();
    let id = fx.define("version", "return 1");
    let held = fx.site(id);
    fx.call_at(&held, Vec::new()).unwrap();
    let old = fx.trusted().site_function(held.id).unwrap();

    fx.catalog.replace_source(id, "return 2").unwrap();
    let other = fx.site(id);
    assert_eq!(fx.call_at(&other, Vec::new()), Ok(int(2)));

    let interp = fx.trusted();
    assert_ne!(interp.cached_function(id), Some(old));
    assert_eq!(interp.live_functions_for(id), 2);
    let dump = interp.describe_activation(held.id).unwrap();
    assert!(dump.contains("function: version"), "{}", dump);
    assert!(dump.contains(" DEAD"), "{}", dump);

    fx.engine.release_region(held.region).unwrap();
    assert!(interp.function_meta(old).is_none());
    assert_eq!(interp.live_functions_for(id), 1);
}

#[test]
fn recursion_during_first_compile_leaves_one_object() {
    let fx = Fixture::new();
    let id = fx.define("selfish", "return 1");
    fx.catalog
        .replace_source(
            id,
            format!(
                "return 1 end
                 if not compiling then compiling = true invoke({}) end
                 local function pad() return 0",
                id.0
            ),
        )
        .unwrap();
    let before = leak_detector::snapshot();

    assert_eq!(fx.call(id, Vec::new()), Ok(int(1)));

    let after = leak_detector::snapshot();
    assert_eq!(after.function_objects_created - before.function_objects_created, 2);
    assert_eq!(after.function_objects_freed - before.function_objects_freed, 1);
    let interp = fx.trusted();
    assert_eq!(interp.live_functions_for(id), 1);
    assert!(interp.cached_function(id).is_some());
}

#[test]
fn releasing_a_site_destroys_its_activation_once() {
    let fx = Fixture::new();
    let id = fx.define("one", "return 1");
    let site = fx.site(id);
    fx.call_at(&site, Vec::new()).unwrap();
    let interp = fx.trusted();
    assert_eq!(interp.activation_count(), 1);
    let before = leak_detector::snapshot();

    fx.engine.release_region(site.region).unwrap();
    assert_eq!(interp.activation_count(), 0);
    assert!(interp.describe_activation(site.id).is_none());

    assert!(fx.engine.release_region(site.region).is_err());
    fx.engine.host().errors().flush().unwrap();
    let after = leak_detector::snapshot();
    assert_eq!(after.activations_destroyed - before.activations_destroyed, 1);
    // the interned object outlives the site
    assert!(interp.cached_function(id).is_some());
}

#[test]
fn transient_sites_are_destroyed_on_failure_paths() {
    let fx = Fixture::new();
    let fails = fx.define("fails", "error('nested failure')");
    let outer = fx.define(
        "outer",
        &format!("local ok = pcall(invoke, {}) return ok", fails.0),
    );
    let before = leak_detector::snapshot();

    assert_eq!(fx.call(outer, Vec::new()), Ok(plflux::host::Datum::Bool(false)));

    let after = leak_detector::snapshot();
    assert_eq!(after.activations_created - before.activations_created, 2);
    assert_eq!(after.activations_destroyed - before.activations_destroyed, 2);
    assert_eq!(fx.trusted().activation_count(), 0);
}

#[test]
fn validated_function_is_reused_by_the_first_call() {
    let fx = Fixture::new();
    let id = fx.define("checked", "return 7");
    validator(&fx.engine, ProcId(1), id, true).unwrap();
    let validated = fx.trusted().cached_function(id).unwrap();
    let created = leak_detector::snapshot().function_objects_created;

    let site = fx.site(id);
    assert_eq!(fx.call_at(&site, Vec::new()), Ok(int(7)));
    assert_eq!(fx.trusted().site_function(site.id), Some(validated));
    assert_eq!(leak_detector::snapshot().function_objects_created, created);
}

#[test]
fn dropped_definition_fails_the_next_call() {
    let fx = Fixture::new();
    let id = fx.define("gone", "return 1");
    let site = fx.site(id);
    fx.call_at(&site, Vec::new()).unwrap();

    fx.catalog.drop_definition(id).unwrap();
    let err = fx.call_at(&site, Vec::new()).unwrap_err();
    assert_eq!(err.sqlstate(), sqlstate::UNDEFINED_FUNCTION);
}

#[test]
fn failed_compile_leaves_no_regions_or_objects_behind() {
    let fx = Fixture::new();
    let good = fx.define("good", "return 1");
    let bad = fx.define("bad", "return 1 +");
    fx.call(good, Vec::new()).unwrap();
    let live = fx.engine.host().regions().live_count();
    let functions = fx.trusted().function_count();

    let err = fx.call(bad, Vec::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InterpreterRuntime);
    assert_eq!(fx.engine.host().regions().live_count(), live);
    assert_eq!(fx.trusted().function_count(), functions);
}

#[test]
fn error_while_running_the_wrapper_fails_the_compile() {
    let fx = Fixture::new();
    let id = fx.define("loud", "return 1 end error('during compile') local function pad() return 0");
    let err = fx.call(id, Vec::new()).unwrap_err();
    assert_eq!(err.to_string(), "plflux: during compile");
    assert_eq!(fx.trusted().live_functions_for(id), 0);
}

#[test]
fn body_that_hides_the_wrapper_does_not_produce_a_function() {
    let fx = Fixture::new();
    let id = fx.define("sneaky", "return 5 end return 7 --");
    let err = fx.call(id, Vec::new()).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"plflux: sneaky: body did not produce a function");
}

#[test]
fn single_attempt_still_resolves_a_steady_definition() {
    let fx = Fixture::with_config(Config {
        max_resolve_attempts: 1,
        ..Config::default()
    });
    let id = fx.define("steady", "return 1");
    assert_eq!(fx.call(id, Vec::new()), Ok(int(1)));
    assert_eq!(fx.call(id, Vec::new()), Ok(int(1)));
    assert_eq!(fx.trusted().live_functions_for(id), 1);
}

#[test]
fn resolution_gives_up_when_the_definition_keeps_changing() {
    let catalog = Rc::new(MemoryCatalog::new());
    let host = Host::new(Rc::new(RewritingCatalog(catalog.clone())));
    let fx = Fixture::with_host(
        catalog,
        host,
        Config {
            max_resolve_attempts: 3,
            ..Config::default()
        },
    );
    let id = fx.define("restless", "return 1");
    let before = leak_detector::snapshot();

    let err = fx.call(id, Vec::new()).unwrap_err();
    assert_eq!(err.sqlstate(), sqlstate::OBJECT_NOT_IN_PREREQUISITE_STATE);
    assert_eq!(
        err.to_string(),
        format!("definition of function {} kept changing during compilation", id)
    );
    let after = leak_detector::snapshot();
    assert_eq!(after.function_objects_created - before.function_objects_created, 3);
    assert_eq!(fx.trusted().live_functions_for(id), 0);
}

#[test]
fn activation_dump_describes_the_binding() {
    let fx = Fixture::new();
    let id = fx.define_with(
        plflux::host::ProcDefinition::new("dumped", "return a")
            .with_args(["a"])
            .read_only(),
    );
    let site = fx.site(id);
    fx.call_at(&site, vec![int(1)]).unwrap();

    let dump = fx.trusted().describe_activation(site.id).unwrap();
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines[0], format!("activation for call site {}", site.id.0));
    assert!(lines[1].starts_with(&format!("  function: dumped (id {}, handle ", id)));
    assert!(!lines[1].ends_with("DEAD"));
    assert!(lines[3].starts_with("  digest: "));
    assert_eq!(lines[3].len(), "  digest: ".len() + 64);
    assert_eq!(lines[4], "  nargs: 1, retset: false, readonly: true");
    assert_eq!(lines[5], "  uses: 0, activations: 1");
    assert_eq!(lines[6], "  thread: none");
}
