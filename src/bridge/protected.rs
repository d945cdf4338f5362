use tracing::error;

use crate::bridge::domain::Domain;
use crate::bridge::error::{BridgeError, Thrown};
use crate::bridge::rethrow::rethrow_from_host;
use crate::engine::Engine;
use crate::host::Host;
use crate::runtime::ExecContext;

/// Runs interpreter code so that any failure comes back as a status, never as
/// an unwind into the caller's frames.
///
/// Works from either domain and nests freely. On return the domain is what
/// it was on entry. Leaving an uncaught host error behind, or returning with
/// the domain switched away from the interpreter, is a protocol violation.
pub fn protected_call<T>(
    engine: &Engine,
    f: impl FnOnce() -> Result<T, Thrown>,
) -> Result<T, Thrown> {
    let host_errors = engine.host().errors().depth();
    let guard = engine.domain().enter(Domain::Interpreter);

    let result = f();

    let on_exit = guard.restore();
    if on_exit != Domain::Interpreter {
        return Err(violation(
            engine,
            format!("protected call returned in {} domain", on_exit),
        ));
    }
    if engine.host().errors().depth() > host_errors {
        return Err(violation(
            engine,
            "host error escaped past a protected call".to_string(),
        ));
    }
    result
}

fn violation(engine: &Engine, message: String) -> Thrown {
    error!(%message, "bridge protocol violation");
    Thrown::fatal(engine.escalate(BridgeError::ProtocolViolation(message)))
}

/// Runs a host operation from interpreter code.
///
/// A host failure is caught here and re-expressed as an interpreter error
/// carrying the host's full detail.
pub fn host_try<T>(
    cx: &ExecContext<'_>,
    f: impl FnOnce(&Host) -> Result<T, BridgeError>,
) -> Result<T, Thrown> {
    let host = cx.engine.host();
    let saved_region = host.regions().current();

    let guard = cx.engine.domain().enter(Domain::Host);
    let result = f(host);
    drop(guard);

    result.map_err(|err| rethrow_from_host(cx, err, saved_region).into_interpreter())
}
