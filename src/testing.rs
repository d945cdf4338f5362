//! Helpers shared by the unit tests.
use std::rc::Rc;

use crate::{
    Config, Engine,
    bridge::{error::Thrown, protected::protected_call},
    cache::interp::Interpreter,
    engine::run_chunk,
    host::{Host, MemoryCatalog, Principal, UserId},
    runtime::{ExecContext, value::Value},
};

pub(crate) fn engine_with(catalog: Rc<MemoryCatalog>, config: Config) -> Engine {
    Engine::new(Host::new(catalog), config)
}

pub(crate) fn engine() -> Engine {
    engine_with(Rc::new(MemoryCatalog::new()), Config::default())
}

pub(crate) fn trusted(engine: &Engine) -> Rc<Interpreter> {
    engine
        .get_instance(Principal::Trusted(UserId(10)))
        .expect("trusted interpreter")
}

/// Runs `source` as a chunk in the trusted interpreter.
pub(crate) fn run(engine: &Engine, source: &str) -> Result<Vec<Value>, Thrown> {
    let interp = trusted(engine);
    protected_call(engine, || {
        let cx = ExecContext::new(engine, &interp);
        run_chunk(&cx, "test", source)
    })
}

pub(crate) fn run_ok(engine: &Engine, source: &str) -> Vec<Value> {
    match run(engine, source) {
        Ok(values) => values,
        Err(thrown) => panic!("script failed: {}", thrown),
    }
}

pub(crate) fn run_err(engine: &Engine, source: &str) -> Thrown {
    match run(engine, source) {
        Ok(values) => panic!("script succeeded with {:?}", values),
        Err(thrown) => thrown,
    }
}
