use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::Write;
use std::rc::Rc;

use tracing::debug;

use crate::{
    bridge::error::Thrown,
    cache::{
        activation::ActivationTable,
        function::{FuncHandle, FunctionMeta, FunctionStore},
    },
    config::Config,
    engine::Engine,
    host::{ErrorData, Principal, ProcId, RegionId, SiteId},
    runtime::{alloc::AllocGuard, error_object::ErrorObject, value::Value},
};

/// One interpreter instance: the globals, caches and regions of a principal.
pub struct Interpreter {
    principal: Principal,
    region: RegionId,
    error_region: RegionId,
    pub globals: RefCell<HashMap<Rc<str>, Value>>,
    pub(crate) functions: RefCell<FunctionStore>,
    pub(crate) activations: RefCell<ActivationTable>,
    /// Built up front so that wrapping an error never has to allocate it.
    recursive_error: Rc<ErrorObject>,
    last_error: RefCell<Option<Rc<ErrorObject>>>,
    pub alloc: AllocGuard,
    ticks: Cell<u64>,
    closed: Cell<bool>,
}

impl Interpreter {
    pub fn new(principal: Principal, region: RegionId, error_region: RegionId) -> Self {
        Self {
            principal,
            region,
            error_region,
            globals: RefCell::new(HashMap::new()),
            functions: RefCell::new(FunctionStore::new()),
            activations: RefCell::new(ActivationTable::new()),
            recursive_error: Rc::new(ErrorObject::Recursive),
            last_error: RefCell::new(None),
            alloc: AllocGuard::new(),
            ticks: Cell::new(0),
            closed: Cell::new(false),
        }
    }

    pub fn principal(&self) -> Principal {
        self.principal
    }

    pub fn is_trusted(&self) -> bool {
        self.principal.is_trusted()
    }

    pub fn region(&self) -> RegionId {
        self.region
    }

    pub fn error_region(&self) -> RegionId {
        self.error_region
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// Counts one call or jump; true when an interrupt check is due.
    pub fn tick(&self, config: &Config) -> bool {
        if !config.check_for_interrupts {
            return false;
        }
        let ticks = self.ticks.get() + 1;
        if ticks >= config.interrupt_interval {
            self.ticks.set(0);
            true
        } else {
            self.ticks.set(ticks);
            false
        }
    }

    /// Wraps host error detail in a new error object. No detail yields the
    /// shared placeholder.
    pub fn new_error_object(&self, data: Option<ErrorData>) -> Result<Rc<ErrorObject>, Thrown> {
        match data {
            None => Ok(self.recursive_error()),
            Some(data) => {
                self.alloc.check()?;
                Ok(Rc::new(ErrorObject::Host(data)))
            }
        }
    }

    pub fn recursive_error(&self) -> Rc<ErrorObject> {
        self.recursive_error.clone()
    }

    pub fn set_last_error(&self, error: Rc<ErrorObject>) {
        *self.last_error.borrow_mut() = Some(error);
    }

    pub fn last_error(&self) -> Option<Rc<ErrorObject>> {
        self.last_error.borrow().clone()
    }

    /// Makes the next interpreter allocation fail with an out-of-memory status.
    pub fn simulate_memory_failure(&self) {
        self.alloc.fail_next();
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).cloned()
    }

    pub fn function_count(&self) -> usize {
        self.functions.borrow().len()
    }

    pub fn activation_count(&self) -> usize {
        self.activations.borrow().len()
    }

    /// The object the cache table holds for `proc_id`.
    pub fn cached_function(&self, proc_id: ProcId) -> Option<FuncHandle> {
        self.functions.borrow().lookup(proc_id)
    }

    /// The object `site` is bound to.
    pub fn site_function(&self, site: SiteId) -> Option<FuncHandle> {
        self.activations.borrow().function(site)
    }

    /// Objects compiled for `proc_id` that are still alive, cached or not.
    pub fn live_functions_for(&self, proc_id: ProcId) -> usize {
        self.functions.borrow().count_for(proc_id)
    }

    pub fn function_meta(&self, handle: FuncHandle) -> Option<FunctionMeta> {
        self.functions.borrow().meta(handle).cloned()
    }

    pub fn site_has_thread(&self, site: SiteId) -> bool {
        self.activations
            .borrow()
            .get(site)
            .is_some_and(|act| act.has_thread())
    }

    /// Frees function objects nothing refers to. Returns how many were freed.
    pub fn collect_garbage(&self, engine: &Engine) -> usize {
        let regions = self.functions.borrow_mut().collect();
        let freed = regions.len();
        for region in regions {
            engine.release_region_quietly(region);
        }
        freed
    }

    /// Renders the cached state of `site` for diagnostics.
    pub fn describe_activation(&self, site: SiteId) -> Option<String> {
        let activations = self.activations.borrow();
        let act = activations.get(site)?;
        let functions = self.functions.borrow();

        let mut out = String::new();
        let _ = writeln!(out, "activation for call site {}", site.0);
        match act.func.and_then(|handle| functions.get(handle).map(|object| (handle, object))) {
            Some((handle, object)) => {
                let meta = &object.meta;
                let _ = writeln!(
                    out,
                    "  function: {} (id {}, handle {}){}",
                    meta.name,
                    meta.proc_id,
                    handle.0,
                    if object.is_interned() { "" } else { " DEAD" }
                );
                let _ = writeln!(out, "  version: {}", meta.stamp);
                let _ = writeln!(out, "  digest: {}", meta.digest);
                let _ = writeln!(
                    out,
                    "  nargs: {}, retset: {}, readonly: {}",
                    meta.nargs, meta.retset, meta.readonly
                );
                let _ = writeln!(
                    out,
                    "  uses: {}, activations: {}",
                    object.use_count(),
                    object.activation_refs()
                );
            }
            None => {
                let _ = writeln!(out, "  function: none");
            }
        }
        let thread = match (act.thread(), act.thread_running()) {
            (Some(thread), _) => format!("{:?}", thread.state()),
            (None, true) => "running".to_string(),
            (None, false) => "none".to_string(),
        };
        let _ = writeln!(out, "  thread: {}", thread);
        Some(out)
    }

    /// Shuts the instance down and releases everything it owns.
    pub fn close(&self, engine: &Engine) {
        if self.closed.replace(true) {
            return;
        }
        debug!(principal = %self.principal, "closing interpreter");
        let sites = self.activations.borrow().sites();
        for site in sites {
            self.activations.borrow_mut().reset(site);
        }
        self.globals.borrow_mut().clear();
        *self.last_error.borrow_mut() = None;
        engine.release_region_quietly(self.region);
    }
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("principal", &self.principal)
            .field("region", &self.region)
            .field("functions", &self.function_count())
            .field("activations", &self.activation_count())
            .field("closed", &self.closed.get())
            .finish()
    }
}
