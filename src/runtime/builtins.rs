use crate::{
    bridge::{error::Thrown, protected::host_try},
    host::{ErrorData, NoticeLevel, ProcId, sqlstate},
    runtime::{ExecContext, builtin_function::BuiltinFunction, value::Value, vm::Thread},
};

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Nil)
}

fn arg_error(name: &str, index: usize, expected: &str, got: &Value) -> Thrown {
    Thrown::message(format!(
        "bad argument #{} to '{}' ({} expected, got {})",
        index + 1,
        name,
        expected,
        got.type_name()
    ))
}

fn arg_string(args: &[Value], index: usize, name: &str) -> Result<String, Thrown> {
    match arg(args, index) {
        Value::String(text) => Ok(text.to_string()),
        value @ (Value::Integer(_) | Value::Float(_)) => Ok(value.to_string()),
        other => Err(arg_error(name, index, "string", &other)),
    }
}

fn opt_string(args: &[Value], index: usize, name: &str) -> Result<Option<String>, Thrown> {
    match arg(args, index) {
        Value::Nil => Ok(None),
        _ => arg_string(args, index, name).map(Some),
    }
}

/// print(...) - send the arguments, tab separated, to the client as INFO
fn builtin_print(
    _thread: &mut Thread,
    cx: &ExecContext<'_>,
    args: Vec<Value>,
) -> Result<Vec<Value>, Thrown> {
    let line = args
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join("\t");
    host_try(cx, |host| {
        host.notice(NoticeLevel::Info, line);
        Ok(())
    })?;
    Ok(Vec::new())
}

/// error(value) - throw any value
fn builtin_error(
    _thread: &mut Thread,
    _cx: &ExecContext<'_>,
    args: Vec<Value>,
) -> Result<Vec<Value>, Thrown> {
    Err(Thrown::runtime(arg(&args, 0)))
}

/// raise(sqlstate, message [, detail [, hint]]) - raise a host error
fn builtin_raise(
    _thread: &mut Thread,
    cx: &ExecContext<'_>,
    args: Vec<Value>,
) -> Result<Vec<Value>, Thrown> {
    let code = arg_string(&args, 0, "raise")?;
    if !sqlstate::is_valid(&code) {
        return Err(Thrown::message(format!("invalid SQLSTATE code '{}'", code)));
    }
    let mut data = ErrorData::new(&code, arg_string(&args, 1, "raise")?);
    if let Some(detail) = opt_string(&args, 2, "raise")? {
        data = data.with_detail(detail);
    }
    if let Some(hint) = opt_string(&args, 3, "raise")? {
        data = data.with_hint(hint);
    }
    host_try(cx, |host| Err::<(), _>(host.raise(data)))?;
    Ok(Vec::new())
}

/// pcall(f, ...) - call `f`, returning false and the error instead of failing
fn builtin_pcall(
    thread: &mut Thread,
    cx: &ExecContext<'_>,
    mut args: Vec<Value>,
) -> Result<Vec<Value>, Thrown> {
    if args.is_empty() {
        return Err(arg_error("pcall", 0, "value", &Value::Nil));
    }
    let callee = args.remove(0);
    match thread.call_value(cx, callee, args) {
        Ok(mut results) => {
            results.insert(0, Value::Boolean(true));
            Ok(results)
        }
        Err(thrown) if thrown.is_catchable() => Ok(vec![Value::Boolean(false), thrown.value]),
        Err(thrown) => Err(thrown),
    }
}

/// assert(v [, message]) - fail unless `v` is truthy; returns all arguments
fn builtin_assert(
    _thread: &mut Thread,
    _cx: &ExecContext<'_>,
    args: Vec<Value>,
) -> Result<Vec<Value>, Thrown> {
    if arg(&args, 0).is_truthy() {
        return Ok(args);
    }
    match arg(&args, 1) {
        Value::Nil => Err(Thrown::message("assertion failed!")),
        message => Err(Thrown::runtime(message)),
    }
}

fn builtin_tostring(
    _thread: &mut Thread,
    cx: &ExecContext<'_>,
    args: Vec<Value>,
) -> Result<Vec<Value>, Thrown> {
    cx.interp.alloc.check()?;
    Ok(vec![Value::str(&arg(&args, 0).to_string())])
}

fn builtin_type(
    _thread: &mut Thread,
    _cx: &ExecContext<'_>,
    args: Vec<Value>,
) -> Result<Vec<Value>, Thrown> {
    if args.is_empty() {
        return Err(arg_error("type", 0, "value", &Value::Nil));
    }
    Ok(vec![Value::str(args[0].type_name())])
}

/// yield(...) - suspend the running set-returning function, emitting one row
fn builtin_yield(
    thread: &mut Thread,
    _cx: &ExecContext<'_>,
    args: Vec<Value>,
) -> Result<Vec<Value>, Thrown> {
    if !thread.can_yield() {
        return Err(Thrown::message("attempt to yield from outside a coroutine"));
    }
    thread.request_yield(args);
    Ok(Vec::new())
}

/// invoke(id, ...) - call another stored procedure by id
fn builtin_invoke(
    _thread: &mut Thread,
    cx: &ExecContext<'_>,
    mut args: Vec<Value>,
) -> Result<Vec<Value>, Thrown> {
    let id = match arg(&args, 0) {
        Value::Integer(id) if (0..=u32::MAX as i64).contains(&id) => ProcId(id as u32),
        other => return Err(arg_error("invoke", 0, "function id", &other)),
    };
    args.remove(0);
    crate::handler::invoke(cx, id, args)
}

/// collectgarbage() - free cached functions nothing refers to any more
fn builtin_collectgarbage(
    _thread: &mut Thread,
    cx: &ExecContext<'_>,
    _args: Vec<Value>,
) -> Result<Vec<Value>, Thrown> {
    let freed = cx.interp.collect_garbage(cx.engine);
    Ok(vec![Value::Integer(freed as i64)])
}

/// All built-in functions in order (index matters for OpGetBuiltin)
pub static BUILTINS: &[BuiltinFunction] = &[
    BuiltinFunction {
        name: "print",
        func: builtin_print,
    },
    BuiltinFunction {
        name: "error",
        func: builtin_error,
    },
    BuiltinFunction {
        name: "raise",
        func: builtin_raise,
    },
    BuiltinFunction {
        name: "pcall",
        func: builtin_pcall,
    },
    BuiltinFunction {
        name: "assert",
        func: builtin_assert,
    },
    BuiltinFunction {
        name: "tostring",
        func: builtin_tostring,
    },
    BuiltinFunction {
        name: "type",
        func: builtin_type,
    },
    BuiltinFunction {
        name: "yield",
        func: builtin_yield,
    },
    BuiltinFunction {
        name: "invoke",
        func: builtin_invoke,
    },
    BuiltinFunction {
        name: "collectgarbage",
        func: builtin_collectgarbage,
    },
];

pub fn get_builtin(name: &str) -> Option<&'static BuiltinFunction> {
    BUILTINS.iter().find(|b| b.name == name)
}
