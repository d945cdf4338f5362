//! Process-wide handler state.
//!
//! Everything the bridge and the caches share lives in one [`Engine`] that is
//! passed explicitly to every entry point: the host, the configuration, the
//! domain tracker, and the interpreter instance of each principal. Instances
//! are created lazily, never recreated, and closed only by a clean process exit.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, error, info, warn};

use crate::{
    bridge::{
        domain::DomainTracker,
        error::{BridgeError, Thrown},
        protected::protected_call,
        rethrow::rethrow_from_interpreter,
    },
    bytecode::compiler::compile_source,
    cache::interp::Interpreter,
    config::Config,
    host::{
        ErrorData, ExitHook, Host, NoticeLevel, Principal, RegionId, ScopeCallback, SiteId,
        sqlstate,
    },
    runtime::{ExecContext, closure::Closure, value::Value, vm::Thread},
};

pub struct Engine {
    host: Host,
    config: Config,
    domain: DomainTracker,
    interpreters: RefCell<HashMap<Principal, Rc<Interpreter>>>,
    initializing: RefCell<HashSet<Principal>>,
    exit_hook_registered: Cell<bool>,
    shut_down: Cell<bool>,
    /// First fatal error seen; once set, every entry point fails with it.
    fatal: RefCell<Option<BridgeError>>,
    depth: Cell<usize>,
    next_site: Cell<u32>,
}

impl Engine {
    pub fn new(host: Host, config: Config) -> Self {
        Self {
            host,
            config,
            domain: DomainTracker::new(),
            interpreters: RefCell::new(HashMap::new()),
            initializing: RefCell::new(HashSet::new()),
            exit_hook_registered: Cell::new(false),
            shut_down: Cell::new(false),
            fatal: RefCell::new(None),
            depth: Cell::new(0),
            next_site: Cell::new(1),
        }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn domain(&self) -> &DomainTracker {
        &self.domain
    }

    /// Nesting depth of handler entry points currently running.
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    pub(crate) fn next_site_id(&self) -> SiteId {
        let id = self.next_site.get();
        self.next_site.set(id + 1);
        SiteId(id)
    }

    /// Records a fatal error. The first one recorded wins and is what every
    /// later entry fails with.
    pub fn escalate(&self, err: BridgeError) -> BridgeError {
        let mut fatal = self.fatal.borrow_mut();
        match fatal.as_ref() {
            Some(first) => first.clone(),
            None => {
                error!(error = %err, "fatal error, no further script execution");
                *fatal = Some(err.clone());
                err
            }
        }
    }

    pub fn terminated(&self) -> Option<BridgeError> {
        self.fatal.borrow().clone()
    }

    /// Wraps one host entry point: refuses work after a fatal error, enforces
    /// the stack-depth limit, and at the outermost level discards the host
    /// error state once the error has been handed back.
    pub(crate) fn entry<T>(
        &self,
        f: impl FnOnce() -> Result<T, BridgeError>,
    ) -> Result<T, BridgeError> {
        if let Some(err) = self.terminated() {
            return Err(err);
        }
        if self.shut_down.get() {
            return Err(self.host.raise(ErrorData::new(
                sqlstate::OBJECT_NOT_IN_PREREQUISITE_STATE,
                "plflux interpreters have been shut down",
            )));
        }
        let depth = self.depth.get();
        if depth >= self.config.max_call_depth {
            return Err(self.host.raise(
                ErrorData::new(sqlstate::STATEMENT_TOO_COMPLEX, "stack depth limit exceeded")
                    .with_hint(format!(
                        "Increase max_call_depth (currently {}).",
                        self.config.max_call_depth
                    )),
            ));
        }

        self.depth.set(depth + 1);
        let result = f();
        self.depth.set(depth);

        if depth == 0
            && result.is_err()
            && let Err(fault) = self.host.errors().flush()
        {
            return Err(self.escalate(BridgeError::ErrorStateCorrupt(format!(
                "flushing host error state failed ({})",
                fault
            ))));
        }
        result
    }

    /// The interpreter for `principal`, created and initialized on first use.
    pub fn get_instance(&self, principal: Principal) -> Result<Rc<Interpreter>, BridgeError> {
        if let Some(interp) = self.interpreters.borrow().get(&principal) {
            return Ok(interp.clone());
        }
        if self.initializing.borrow().contains(&principal) {
            return Err(self.host.raise(ErrorData::new(
                sqlstate::OBJECT_NOT_IN_PREREQUISITE_STATE,
                "recursive interpreter initialization",
            )));
        }

        let (region, error_region) = self.host.with_regions(|regions| {
            let root = regions.root();
            let region = regions.create("plflux interpreter", root)?;
            let error_region =
                regions.create_capped("plflux error", region, self.config.error_region_size)?;
            Ok((region, error_region))
        })?;
        let interp = Rc::new(Interpreter::new(principal, region, error_region));

        self.initializing.borrow_mut().insert(principal);
        let initialized = self.run_init_scripts(&interp);
        self.initializing.borrow_mut().remove(&principal);

        if let Err(err) = initialized {
            warn!(%principal, error = %err, "interpreter initialization failed");
            interp.close(self);
            return Err(err);
        }

        self.interpreters
            .borrow_mut()
            .insert(principal, interp.clone());
        if !self.exit_hook_registered.replace(true) {
            self.host.register_exit_hook(ExitHook::CloseInterpreters);
        }
        debug!(%principal, %region, "interpreter created");
        Ok(interp)
    }

    fn run_init_scripts(&self, interp: &Rc<Interpreter>) -> Result<(), BridgeError> {
        let scripts = [
            ("on_init", self.config.on_init.as_deref()),
            (
                if interp.is_trusted() {
                    "on_trusted_init"
                } else {
                    "on_untrusted_init"
                },
                self.config.principal_init(interp.is_trusted()),
            ),
        ];
        for (name, source) in scripts {
            let Some(source) = source else {
                continue;
            };
            debug!(script = name, "running init script");
            protected_call(self, || {
                let cx = ExecContext::new(self, interp);
                run_chunk(&cx, name, source).map(|_| ())
            })
            .map_err(|thrown| rethrow_from_interpreter(self, thrown).into_host())?;
        }
        Ok(())
    }

    pub fn instance(&self, principal: Principal) -> Option<Rc<Interpreter>> {
        self.interpreters.borrow().get(&principal).cloned()
    }

    pub fn instance_count(&self) -> usize {
        self.interpreters.borrow().len()
    }

    /// Releases a host region and runs the cleanup queued on it.
    pub fn release_region(&self, region: RegionId) -> Result<(), BridgeError> {
        let callbacks = self.host.with_regions(|regions| regions.release(region))?;
        for callback in callbacks {
            self.run_callback(callback);
        }
        Ok(())
    }

    /// Like [`release_region`](Self::release_region), for paths with no one
    /// to report to. The raised error is discarded again; if the host cannot
    /// discard it, the engine is terminated.
    pub(crate) fn release_region_quietly(&self, region: RegionId) {
        let depth = self.host.errors().depth();
        if let Err(err) = self.release_region(region) {
            warn!(%region, error = %err, "could not release region");
            if self.host.errors().depth() > depth
                && let Err(fault) = self.host.errors().flush()
            {
                self.escalate(BridgeError::ErrorStateCorrupt(format!(
                    "flushing host error state failed ({})",
                    fault
                )));
            }
        }
    }

    fn run_callback(&self, callback: ScopeCallback) {
        match callback {
            ScopeCallback::DropFunction { principal, handle } => {
                if let Some(interp) = self.instance(principal) {
                    interp.functions.borrow_mut().drop_object(handle);
                }
            }
            ScopeCallback::ResetActivation { principal, site } => {
                let Some(interp) = self.instance(principal) else {
                    return;
                };
                let result = protected_call(self, || {
                    interp.alloc.check()?;
                    interp.activations.borrow_mut().reset(site);
                    Ok(())
                });
                if let Err(thrown) = result {
                    self.ignored_error(&thrown);
                }
            }
            ScopeCallback::DestroyActivation { principal, site } => {
                let Some(interp) = self.instance(principal) else {
                    return;
                };
                let result = protected_call(self, || {
                    interp.alloc.check()?;
                    let destroyed = interp.activations.borrow_mut().destroy(site);
                    let freed = destroyed
                        .and_then(|act| act.func)
                        .and_then(|func| interp.functions.borrow_mut().drop_activation_ref(func));
                    if let Some(region) = freed {
                        self.release_region_quietly(region);
                    }
                    Ok(())
                });
                if let Err(thrown) = result {
                    self.ignored_error(&thrown);
                }
            }
        }
    }

    /// Cleanup must not fail its caller; report the failure and move on.
    fn ignored_error(&self, thrown: &Thrown) {
        if let Some(err) = thrown.fatal_error() {
            warn!(error = %err, "fatal error during cleanup");
            return;
        }
        warn!(error = %thrown, "ignored script error during cleanup");
        self.host
            .notice(NoticeLevel::Warning, format!("Ignored script error: {}", thrown));
    }

    /// Runs the exit hooks. A non-zero exit code means abnormal termination,
    /// in which case nothing is cleaned up.
    pub fn proc_exit(&self, code: i32) {
        if code != 0 {
            debug!(code, "abnormal exit, skipping interpreter shutdown");
            return;
        }
        for hook in self.host.take_exit_hooks() {
            match hook {
                ExitHook::CloseInterpreters => self.close_all(),
            }
        }
    }

    fn close_all(&self) {
        self.shut_down.set(true);
        let interps: Vec<_> = self.interpreters.borrow().values().cloned().collect();
        for interp in &interps {
            interp.close(self);
        }
        self.interpreters.borrow_mut().clear();
        info!(count = interps.len(), "interpreters closed");
    }
}

/// Compiles `source` as a chunk and runs it to completion on a fresh thread.
pub(crate) fn run_chunk(
    cx: &ExecContext<'_>,
    name: &str,
    source: &str,
) -> Result<Vec<Value>, Thrown> {
    let function = compile_source(name, source)
        .map_err(|err| Thrown::message(format!("{}: {}", name, err)))?;
    cx.interp.alloc.check()?;
    let chunk = Rc::new(Closure::new(function, Vec::new()));
    let mut thread = Thread::new(cx.engine.config().max_frames);
    thread.call_value(cx, Value::Closure(chunk), Vec::new())
}
