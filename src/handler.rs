//! Host entry points.
//!
//! Each one runs under [`Engine::entry`], picks the interpreter for the
//! caller's principal, and does all script work inside one protected call.
//! Whatever fails comes back as a [`BridgeError`] with the host error state
//! already recorded.

use std::cell::Cell;

use tracing::debug;

use crate::{
    bridge::{
        error::{BridgeError, Thrown},
        protected::{host_try, protected_call},
        rethrow::rethrow_from_interpreter,
    },
    cache::{
        function::FunctionUse,
        interp::Interpreter,
        resolve::{check_trusted, resolve},
    },
    engine::{Engine, run_chunk},
    host::{Datum, ErrorData, ProcId, RegionId, ScopeCallback, SiteId, sqlstate},
    runtime::{
        ExecContext,
        value::Value,
        vm::{Resumed, Thread},
    },
};

/// A place in host code that calls one procedure, possibly many times.
/// Its region lives as long as the site; releasing it destroys the site's
/// cached activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub proc_id: ProcId,
    pub region: RegionId,
    pub id: SiteId,
}

impl CallSite {
    /// Creates a site with its own region under the current one.
    pub fn new(engine: &Engine, proc_id: ProcId) -> Result<Self, BridgeError> {
        let region = engine.host().with_regions(|regions| {
            let parent = regions.current();
            regions.create("plflux call site", parent)
        })?;
        Ok(Self {
            proc_id,
            region,
            id: engine.next_site_id(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetStatus {
    Single,
    /// A row was returned and more may follow.
    Multiple,
    /// The set is exhausted; the returned value is not a row.
    End,
}

/// Value-per-call result-set context of one expression evaluation.
#[derive(Debug)]
pub struct ResultSet {
    /// Region of the expression scope; releasing it resets the activation.
    pub scope: RegionId,
    status: Cell<SetStatus>,
}

impl ResultSet {
    pub fn new(engine: &Engine) -> Result<Self, BridgeError> {
        let scope = engine.host().with_regions(|regions| {
            let parent = regions.current();
            regions.create("plflux expression scope", parent)
        })?;
        Ok(Self {
            scope,
            status: Cell::new(SetStatus::Single),
        })
    }

    pub fn status(&self) -> SetStatus {
        self.status.get()
    }
}

/// Arguments of one call to a stored procedure.
#[derive(Debug)]
pub struct FunctionCall<'a> {
    pub site: &'a CallSite,
    pub args: Vec<Datum>,
    pub result_set: Option<&'a ResultSet>,
    /// Which language variant the caller went through.
    pub trusted: bool,
}

impl<'a> FunctionCall<'a> {
    pub fn new(site: &'a CallSite, args: Vec<Datum>) -> Self {
        Self {
            site,
            args,
            result_set: None,
            trusted: true,
        }
    }

    pub fn untrusted(mut self) -> Self {
        self.trusted = false;
        self
    }

    pub fn with_result_set(mut self, result_set: &'a ResultSet) -> Self {
        self.result_set = Some(result_set);
        self
    }
}

fn interpreter_for(engine: &Engine, trusted: bool) -> Result<std::rc::Rc<Interpreter>, BridgeError> {
    let principal = if trusted {
        crate::host::Principal::Trusted(engine.host().current_user())
    } else {
        crate::host::Principal::Untrusted
    };
    engine.get_instance(principal)
}

/// Calls a stored procedure and returns its result.
///
/// For a set-returning procedure each call returns one row and sets the
/// result set's status; the call after the last row returns null with
/// [`SetStatus::End`].
pub fn call_handler(engine: &Engine, call: &FunctionCall<'_>) -> Result<Datum, BridgeError> {
    engine.entry(|| {
        let interp = interpreter_for(engine, call.trusted)?;
        protected_call(engine, || {
            let cx = ExecContext::new(engine, &interp);
            call_function(&cx, call)
        })
        .map_err(|thrown| rethrow_from_interpreter(engine, thrown).into_host())
    })
}

fn call_function(cx: &ExecContext<'_>, call: &FunctionCall<'_>) -> Result<Datum, Thrown> {
    let site = call.site;
    if let Some(result_set) = call.result_set {
        let resuming = cx
            .interp
            .activations
            .borrow()
            .get(site.id)
            .is_some_and(|act| act.thread().is_some());
        if resuming {
            return resume_set(cx, site, result_set);
        }
    }
    abandon_set(cx, site)?;

    let handle = resolve(cx, Some(site), site.proc_id)?;
    let function = FunctionUse::acquire(cx, handle)?;
    let meta = function.meta()?;
    let closure = function.closure()?;
    let args = host_try(cx, |host| {
        Ok(call
            .args
            .iter()
            .map(|datum| host.marshal().to_value(datum))
            .collect::<Vec<_>>())
    })?;

    if meta.retset {
        let Some(result_set) = call.result_set else {
            return host_try(cx, |host| {
                Err(host.raise(ErrorData::new(
                    sqlstate::FEATURE_NOT_SUPPORTED,
                    "set-valued function called in context that cannot accept a set",
                )))
            });
        };
        let mut thread = Thread::coroutine(cx.engine.config().max_frames);
        thread.start(closure, args);
        let callback = ScopeCallback::ResetActivation {
            principal: cx.interp.principal(),
            site: site.id,
        };
        let registration = host_try(cx, |host| {
            host.with_regions(|regions| regions.register_callback(result_set.scope, callback))
        })?;
        cx.interp.activations.borrow_mut().activate_thread(
            site.id,
            thread,
            (result_set.scope, registration),
        );
        debug!(function = %meta.name, site = site.id.0, "value-per-call thread started");
        drop(function);
        return resume_set(cx, site, result_set);
    }

    let mut thread = Thread::new(cx.engine.config().max_frames);
    let results = thread.call_value(cx, Value::Closure(closure), args)?;
    drop(function);
    to_datum(cx, results.into_iter().next().unwrap_or(Value::Nil))
}

fn resume_set(
    cx: &ExecContext<'_>,
    site: &CallSite,
    result_set: &ResultSet,
) -> Result<Datum, Thrown> {
    let func = cx.interp.activations.borrow().function(site.id);
    let _function = match func {
        Some(handle) => Some(FunctionUse::acquire(cx, handle)?),
        None => None,
    };
    let Some(mut thread) = cx.interp.activations.borrow_mut().take_thread(site.id) else {
        return Err(Thrown::message("no active result set for this call site"));
    };

    match thread.resume(cx, Vec::new()) {
        Ok(Resumed::Yielded(values)) => {
            cx.interp.activations.borrow_mut().park_thread(site.id, thread);
            result_set.status.set(SetStatus::Multiple);
            to_datum(cx, values.into_iter().next().unwrap_or(Value::Nil))
        }
        Ok(Resumed::Returned(_)) => {
            deactivate(cx, site.id)?;
            result_set.status.set(SetStatus::End);
            Ok(Datum::Null)
        }
        Err(thrown) => {
            deactivate(cx, site.id)?;
            Err(thrown)
        }
    }
}

/// A call that does not resume drops whatever result set the site left
/// unfinished, so the site can be rebound to a newer function.
fn abandon_set(cx: &ExecContext<'_>, site: &CallSite) -> Result<(), Thrown> {
    let state = cx
        .interp
        .activations
        .borrow()
        .get(site.id)
        .map(|act| (act.has_thread(), act.thread_running()));
    match state {
        Some((_, true)) => host_try(cx, |host| {
            Err(host.raise(ErrorData::new(
                sqlstate::OBJECT_NOT_IN_PREREQUISITE_STATE,
                format!("call site {} is already producing rows", site.id.0),
            )))
        }),
        Some((true, false)) => {
            debug!(site = site.id.0, "abandoning unfinished result set");
            deactivate(cx, site.id)
        }
        _ => Ok(()),
    }
}

fn deactivate(cx: &ExecContext<'_>, site: SiteId) -> Result<(), Thrown> {
    let registration = cx.interp.activations.borrow_mut().deactivate(site);
    if let Some((scope, callback)) = registration {
        host_try(cx, |host| {
            host.with_regions(|regions| regions.unregister_callback(scope, callback))
        })?;
    }
    Ok(())
}

fn to_datum(cx: &ExecContext<'_>, value: Value) -> Result<Datum, Thrown> {
    host_try(cx, |host| {
        host.marshal().to_datum(&value).map_err(|err| {
            host.raise(ErrorData::new(sqlstate::DATATYPE_MISMATCH, err.to_string()))
        })
    })
}

/// Compiles a procedure without calling it. Does nothing when the caller may
/// not validate `target`.
pub fn validator(
    engine: &Engine,
    caller: ProcId,
    target: ProcId,
    trusted: bool,
) -> Result<(), BridgeError> {
    engine.entry(|| {
        if !engine.host().check_validator_access(caller, target) {
            debug!(%caller, %target, "validation skipped, access denied");
            return Ok(());
        }
        let interp = interpreter_for(engine, trusted)?;
        protected_call(engine, || {
            let cx = ExecContext::new(engine, &interp);
            resolve(&cx, None, target).map(|_| ())
        })
        .map_err(|thrown| rethrow_from_interpreter(engine, thrown).into_host())
    })
}

/// Runs an anonymous code block.
pub fn inline_handler(engine: &Engine, source: &str, trusted: bool) -> Result<(), BridgeError> {
    engine.entry(|| {
        let interp = interpreter_for(engine, trusted)?;
        protected_call(engine, || {
            let cx = ExecContext::new(engine, &interp);
            check_trusted(&cx, trusted, "inline code")?;
            run_chunk(&cx, "inline", source).map(|_| ())
        })
        .map_err(|thrown| rethrow_from_interpreter(engine, thrown).into_host())
    })
}

/// Calls another stored procedure from script code, through the host, on a
/// call site that lives only for this call.
pub fn invoke(cx: &ExecContext<'_>, proc_id: ProcId, args: Vec<Value>) -> Result<Vec<Value>, Thrown> {
    let engine = cx.engine;
    let datum = host_try(cx, |host| {
        let args = args
            .iter()
            .map(|value| host.marshal().to_datum(value))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| host.raise(ErrorData::new(sqlstate::DATATYPE_MISMATCH, err.to_string())))?;
        let site = CallSite::new(engine, proc_id)?;
        let mut call = FunctionCall::new(&site, args);
        call.trusted = cx.interp.is_trusted();
        let result = call_handler(engine, &call);
        let released = engine.release_region(site.region);
        let datum = result?;
        released?;
        Ok(datum)
    })?;
    Ok(vec![engine.host().marshal().to_value(&datum)])
}
