use tracing::{debug, trace};

use crate::{
    bridge::{
        error::Thrown,
        protected::{host_try, protected_call},
    },
    cache::function::{FuncHandle, FunctionMeta, Interned, source_digest, wrap_source},
    engine::run_chunk,
    handler::CallSite,
    host::{ErrorData, ProcDefinition, ProcId, RegionId, ScopeCallback, sqlstate},
    runtime::{ExecContext, value::Value},
};

/// Turns a procedure id into a current compiled function object.
///
/// Each pass re-reads the definition, so anything a nested compile did to the
/// cache in the meantime is validated again instead of trusted. At most
/// `max_resolve_attempts` passes compile; one more pass then only looks up.
pub fn resolve(
    cx: &ExecContext<'_>,
    site: Option<&CallSite>,
    proc_id: ProcId,
) -> Result<FuncHandle, Thrown> {
    let interp = cx.interp;
    let attempts = cx.engine.config().max_resolve_attempts;

    for attempt in 0..=attempts {
        let def = host_try(cx, |host| host.get_definition(proc_id))?;
        check_trusted(cx, def.trusted, &proc_id.to_string())?;

        if let Some(site) = site {
            let bound = interp.activations.borrow().function(site.id);
            if let Some(handle) = bound
                && interp.functions.borrow().stamp(handle) == Some(def.stamp)
            {
                trace!(function = %def.name, "call site already bound");
                return Ok(handle);
            }
        }

        let cached = interp.functions.borrow().lookup(proc_id);
        if let Some(handle) = cached {
            if interp.functions.borrow().stamp(handle) == Some(def.stamp) {
                debug!(function = %def.name, "function cache hit");
                if let Some(site) = site {
                    bind_site(cx, site, handle)?;
                }
                return Ok(handle);
            }
            debug!(function = %def.name, "cached function is stale, unlinking");
            let freed = interp.functions.borrow_mut().unintern(handle);
            release(cx, freed)?;
        }
        if attempt == attempts {
            break;
        }

        let handle = compile(cx, &def)?;
        let interned = interp.functions.borrow_mut().intern(handle);
        if let Interned::Superseded(existing) = interned {
            debug!(
                function = %def.name,
                attempt,
                existing = existing.0,
                "a nested call compiled this function first, discarding ours"
            );
            let freed = interp.functions.borrow().discard(handle);
            release(cx, freed)?;
        }
    }

    host_try(cx, |host| {
        Err::<FuncHandle, _>(host.raise(ErrorData::new(
            sqlstate::OBJECT_NOT_IN_PREREQUISITE_STATE,
            format!(
                "definition of function {} kept changing during compilation",
                proc_id
            ),
        )))
    })
}

/// Refuses code whose trusted flag differs from the interpreter's.
pub fn check_trusted(cx: &ExecContext<'_>, trusted: bool, what: &str) -> Result<(), Thrown> {
    if trusted == cx.interp.is_trusted() {
        return Ok(());
    }
    host_try(cx, |host| {
        Err(host.raise(ErrorData::new(
            sqlstate::INTERNAL_ERROR,
            format!("trusted state mismatch for function {}", what),
        )))
    })
}

/// Points the site's activation at `handle`, creating the activation on first use.
fn bind_site(cx: &ExecContext<'_>, site: &CallSite, handle: FuncHandle) -> Result<(), Thrown> {
    let interp = cx.interp;
    if interp.activations.borrow().function(site.id) == Some(handle) {
        return Ok(());
    }

    let created = interp
        .activations
        .borrow_mut()
        .get_or_create(site.id, site.region);
    if created {
        let callback = ScopeCallback::DestroyActivation {
            principal: interp.principal(),
            site: site.id,
        };
        host_try(cx, |host| {
            host.with_regions(|regions| regions.register_callback(site.region, callback))
        })?;
    }

    let previous = interp
        .activations
        .borrow_mut()
        .set_function(site.id, handle)
        .map_err(|err| Thrown::fatal(cx.engine.escalate(err)))?;
    interp.functions.borrow_mut().add_activation_ref(handle);
    if let Some(previous) = previous {
        debug!(site = site.id.0, old = previous.0, new = handle.0, "call site rebound");
        let freed = interp.functions.borrow_mut().drop_activation_ref(previous);
        release(cx, freed)?;
    }
    Ok(())
}

fn release(cx: &ExecContext<'_>, region: Option<RegionId>) -> Result<(), Thrown> {
    match region {
        Some(region) => host_try(cx, |_| cx.engine.release_region(region)),
        None => Ok(()),
    }
}

/// Compiles `def` into a new, not yet interned function object.
fn compile(cx: &ExecContext<'_>, def: &ProcDefinition) -> Result<FuncHandle, Thrown> {
    let engine = cx.engine;
    let interp = cx.interp;
    let wrapped = wrap_source(def);
    let digest = source_digest(&wrapped);
    debug!(function = %def.name, id = %def.id, "compiling: {}", wrapped);

    let (fcxt, ccxt) = host_try(cx, |host| {
        host.with_regions(|regions| {
            let parent = regions.current();
            let fcxt = regions.create(&format!("plflux function {}", def.name), parent)?;
            let ccxt = regions.create("plflux compile", fcxt)?;
            Ok((fcxt, ccxt))
        })
    })?;

    let previous = engine.host().regions_mut().switch_to(ccxt);
    let compiled = protected_call(engine, || {
        let results = run_chunk(cx, &def.name, &wrapped)?;
        match results.into_iter().next() {
            Some(Value::Closure(closure)) => Ok(closure),
            _ => Err(Thrown::message(format!(
                "{}: body did not produce a function",
                def.name
            ))),
        }
    });
    engine.host().regions_mut().switch_to(previous);

    let closure = match compiled {
        Ok(closure) => closure,
        Err(thrown) => {
            debug!(function = %def.name, error = %thrown, "compile failed");
            engine.release_region_quietly(fcxt);
            return Err(thrown);
        }
    };

    host_try(cx, |host| {
        engine.release_region(ccxt)?;
        host.with_regions(|regions| regions.set_parent(fcxt, interp.region()))
    })?;

    let meta = FunctionMeta {
        proc_id: def.id,
        name: def.name.clone(),
        stamp: def.stamp,
        nargs: def.nargs(),
        retset: def.retset,
        readonly: def.readonly,
        digest,
    };
    let handle = interp.functions.borrow_mut().insert(meta, fcxt, closure);
    let callback = ScopeCallback::DropFunction {
        principal: interp.principal(),
        handle,
    };
    host_try(cx, |host| {
        host.with_regions(|regions| regions.register_callback(fcxt, callback))
    })?;
    Ok(handle)
}
