use tracing::{debug, warn};

use crate::bridge::domain::Domain;
use crate::bridge::error::{BridgeError, NOT_A_STRING_MESSAGE, Status, Thrown, Unwind};
use crate::bridge::protected::protected_call;
use crate::engine::Engine;
use crate::host::{ErrorData, RegionId, sqlstate};
use crate::runtime::error_object::ErrorObject;
use crate::runtime::{ExecContext, value::Value};

/// Re-expresses an interpreter failure for whoever catches it next.
///
/// While the interpreter is still in control the failure passes through
/// untouched. Once back in the host it becomes a host error: allocation
/// failures turn into one fixed error without further work, wrapped host
/// errors are re-raised exactly as captured, and anything else is reported
/// by its string form.
pub fn rethrow_from_interpreter(engine: &Engine, thrown: Thrown) -> Unwind {
    if engine.domain().get() == Domain::Interpreter {
        return Unwind::Interpreter(thrown);
    }

    let host = engine.host();
    match thrown.status {
        Status::Memory => Unwind::Host(
            host.raise_with(BridgeError::out_of_memory_data(), BridgeError::OutOfMemory),
        ),
        Status::Fatal => Unwind::Host(Unwind::Interpreter(thrown).into_host()),
        Status::Runtime => match &thrown.value {
            Value::Error(object) => match object.as_ref() {
                ErrorObject::Host(data) => Unwind::Host(host.raise(data.clone())),
                ErrorObject::Recursive => Unwind::Host(
                    host.raise_with(BridgeError::recursive_data(), BridgeError::Recursive),
                ),
                ErrorObject::Fatal(err) => Unwind::Host(err.clone()),
            },
            other => {
                let message = match other.error_text() {
                    Some(text) => format!("plflux: {}", text),
                    None => format!("plflux: {}", NOT_A_STRING_MESSAGE),
                };
                let data = ErrorData::new(sqlstate::EXTERNAL_ROUTINE_EXCEPTION, message);
                Unwind::Host(host.raise_with(data, BridgeError::Script))
            }
        },
    }
}

/// Re-expresses a caught host error for the interpreter.
///
/// `saved_region` is the region that was current when the failing host
/// operation started. Detail is captured inside the instance's small error
/// region, spilling into the instance region when it does not fit; if
/// capture fails the error continues without detail. If the host
/// cannot flush its error state the failure becomes fatal.
pub fn rethrow_from_host(cx: &ExecContext<'_>, err: BridgeError, saved_region: RegionId) -> Unwind {
    let engine = cx.engine;
    if engine.domain().get() == Domain::Host {
        return Unwind::Host(err);
    }
    if err.is_fatal() {
        return Unwind::Interpreter(Thrown::fatal(engine.escalate(err)));
    }

    let host = engine.host();
    let interp = cx.interp;

    host.regions_mut().switch_to(interp.error_region());
    let captured = match host.errors().copy_error_data() {
        Ok(data) => {
            let bytes = data.footprint();
            let reserved = host.regions_mut().reserve(interp.error_region(), bytes);
            if let Err(region_err) = reserved {
                debug!(error = %region_err, bytes, "error detail spills into the instance region");
                if let Err(spill_err) = host.regions_mut().reserve(interp.region(), bytes) {
                    debug!(error = %spill_err, "could not account for spilled error detail");
                }
            }
            Some(data)
        }
        Err(fault) => {
            debug!(error = %fault, "could not capture host error detail");
            None
        }
    };

    let flushed = host.errors().flush();
    host.regions_mut().switch_to(saved_region);
    if let Err(fault) = flushed {
        reset_error_region(cx);
        let fatal = engine.escalate(BridgeError::ErrorStateCorrupt(format!(
            "error recursion trouble: flushing host error state failed ({})",
            fault
        )));
        return Unwind::Interpreter(Thrown::fatal(fatal));
    }

    let object = match protected_call(engine, || interp.new_error_object(captured)) {
        Ok(object) => object,
        Err(thrown) => {
            warn!(error = %thrown, "could not wrap host error, using the recursive-error placeholder");
            interp.recursive_error()
        }
    };
    reset_error_region(cx);

    interp.set_last_error(object.clone());
    Unwind::Interpreter(Thrown::runtime(Value::Error(object)))
}

fn reset_error_region(cx: &ExecContext<'_>) {
    let region = cx.interp.error_region();
    if let Err(err) = cx.engine.host().regions_mut().reset_usage(region) {
        debug!(error = %err, "could not reset the error region");
    }
}
