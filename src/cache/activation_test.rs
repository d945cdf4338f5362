use crate::{
    bridge::error::BridgeError,
    cache::{activation::ActivationTable, function::FuncHandle},
    host::{CallbackId, Principal, RegionId, RegionTree, ScopeCallback, SiteId},
    runtime::vm::{Thread, ThreadState},
};

const SITE: SiteId = SiteId(1);

fn reset_registration() -> (RegionId, CallbackId) {
    let mut tree = RegionTree::new();
    let scope = tree.create("scope", tree.root()).unwrap();
    let id = tree
        .register_callback(
            scope,
            ScopeCallback::ResetActivation {
                principal: Principal::Untrusted,
                site: SITE,
            },
        )
        .unwrap();
    (scope, id)
}

fn table_with_site() -> ActivationTable {
    let mut table = ActivationTable::new();
    assert!(table.get_or_create(SITE, RegionId(5)));
    table
}

#[test]
fn get_or_create_is_idempotent() {
    let mut table = table_with_site();
    assert!(!table.get_or_create(SITE, RegionId(5)));
    assert_eq!(table.len(), 1);
    assert_eq!(table.function(SITE), None);
    assert_eq!(table.get(SITE).unwrap().site_region, RegionId(5));
}

#[test]
fn set_function_returns_previous_binding() {
    let mut table = table_with_site();
    assert_eq!(table.set_function(SITE, FuncHandle(1)), Ok(None));
    assert_eq!(table.set_function(SITE, FuncHandle(1)), Ok(None));
    assert_eq!(table.set_function(SITE, FuncHandle(2)), Ok(Some(FuncHandle(1))));
    assert_eq!(table.function(SITE), Some(FuncHandle(2)));
}

#[test]
fn rebinding_with_an_active_thread_is_refused() {
    let mut table = table_with_site();
    table.set_function(SITE, FuncHandle(1)).unwrap();
    table.activate_thread(SITE, Thread::coroutine(8), reset_registration());

    let err = table.set_function(SITE, FuncHandle(2)).unwrap_err();
    assert!(matches!(err, BridgeError::ProtocolViolation(_)));
    assert_eq!(table.function(SITE), Some(FuncHandle(1)));
}

#[test]
fn unknown_site_cannot_be_bound() {
    let mut table = ActivationTable::new();
    assert!(table.set_function(SiteId(9), FuncHandle(1)).is_err());
}

#[test]
fn thread_is_checked_out_while_resumed() {
    let mut table = table_with_site();
    table.activate_thread(SITE, Thread::coroutine(8), reset_registration());

    let thread = table.take_thread(SITE).unwrap();
    assert!(table.get(SITE).unwrap().thread_running());
    assert!(table.take_thread(SITE).is_none());

    assert!(table.park_thread(SITE, thread));
    assert_eq!(
        table.get(SITE).unwrap().thread().map(Thread::state),
        Some(ThreadState::Dead)
    );
}

#[test]
fn reset_during_resume_drops_the_parked_thread() {
    let mut table = table_with_site();
    table.set_function(SITE, FuncHandle(3)).unwrap();
    table.activate_thread(SITE, Thread::coroutine(8), reset_registration());
    let thread = table.take_thread(SITE).unwrap();

    table.reset(SITE);
    assert!(!table.park_thread(SITE, thread));
    let act = table.get(SITE).unwrap();
    assert!(!act.has_thread());
    assert_eq!(act.reset_registration(), None);
    assert_eq!(act.func, Some(FuncHandle(3)));
}

#[test]
fn deactivate_hands_back_the_reset_registration() {
    let mut table = table_with_site();
    let registration = reset_registration();
    table.activate_thread(SITE, Thread::coroutine(8), registration);

    assert_eq!(table.deactivate(SITE), Some(registration));
    assert_eq!(table.deactivate(SITE), None);
    assert!(!table.get(SITE).unwrap().has_thread());
}

#[test]
fn destroy_removes_the_activation() {
    let mut table = table_with_site();
    table.set_function(SITE, FuncHandle(4)).unwrap();
    let act = table.destroy(SITE).unwrap();
    assert_eq!(act.func, Some(FuncHandle(4)));
    assert!(!table.contains(SITE));
    assert!(table.destroy(SITE).is_none());
}

#[test]
fn sites_are_sorted() {
    let mut table = ActivationTable::new();
    table.get_or_create(SiteId(3), RegionId(1));
    table.get_or_create(SiteId(1), RegionId(1));
    table.get_or_create(SiteId(2), RegionId(1));
    assert_eq!(table.sites(), vec![SiteId(1), SiteId(2), SiteId(3)]);
}
