#![allow(dead_code)]

use std::rc::Rc;

use plflux::{
    Config, Engine,
    bridge::BridgeError,
    cache::Interpreter,
    handler::{CallSite, FunctionCall, ResultSet, call_handler},
    host::{Datum, Host, MemoryCatalog, Principal, ProcDefinition, ProcId, UserId},
};

pub struct Fixture {
    pub catalog: Rc<MemoryCatalog>,
    pub engine: Engine,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let catalog = Rc::new(MemoryCatalog::new());
        let engine = Engine::new(Host::new(catalog.clone()), config);
        Self { catalog, engine }
    }

    pub fn with_host(catalog: Rc<MemoryCatalog>, host: Host, config: Config) -> Self {
        Self {
            catalog,
            engine: Engine::new(host, config),
        }
    }

    pub fn define(&self, name: &str, source: &str) -> ProcId {
        self.catalog.define(ProcDefinition::new(name, source))
    }

    pub fn define_with(&self, def: ProcDefinition) -> ProcId {
        self.catalog.define(def)
    }

    pub fn site(&self, id: ProcId) -> CallSite {
        CallSite::new(&self.engine, id).unwrap()
    }

    pub fn call_at(&self, site: &CallSite, args: Vec<Datum>) -> Result<Datum, BridgeError> {
        call_handler(&self.engine, &FunctionCall::new(site, args))
    }

    /// Calls `id` through a call site that is released afterwards.
    pub fn call(&self, id: ProcId, args: Vec<Datum>) -> Result<Datum, BridgeError> {
        let site = self.site(id);
        let result = self.call_at(&site, args);
        self.engine.release_region(site.region).unwrap();
        result
    }

    pub fn next_row(
        &self,
        site: &CallSite,
        result_set: &ResultSet,
    ) -> Result<Datum, BridgeError> {
        call_handler(
            &self.engine,
            &FunctionCall::new(site, Vec::new()).with_result_set(result_set),
        )
    }

    pub fn trusted(&self) -> Rc<Interpreter> {
        self.engine
            .instance(Principal::Trusted(self.engine.host().current_user()))
            .expect("trusted interpreter exists")
    }

    pub fn untrusted(&self) -> Option<Rc<Interpreter>> {
        self.engine.instance(Principal::Untrusted)
    }

    pub fn user(&self, id: u32) -> Principal {
        Principal::Trusted(UserId(id))
    }
}

pub fn int(n: i64) -> Datum {
    Datum::Int(n)
}

pub fn text(s: &str) -> Datum {
    Datum::Text(s.to_string())
}
