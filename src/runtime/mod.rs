//! Script values and the bytecode interpreter that runs them.
//!
//! # No-Cycle Invariant
//! Values are reference counted and must stay acyclic. Closures capture
//! values at creation time, and a function refers to itself through the
//! running frame rather than through a captured slot, so no closure ever
//! reaches itself through its own captures.
use std::rc::Rc;

use crate::bridge::error::Thrown;
use crate::cache::interp::Interpreter;
use crate::engine::Engine;
use crate::runtime::{value::Value, vm::Thread};

pub mod alloc;
pub mod builtin_function;
pub mod builtins;
pub mod closure;
pub mod compiled_function;
pub mod error_object;
pub mod frame;
pub mod leak_detector;
pub mod value;
pub mod vm;


pub type BuiltinFn = fn(&mut Thread, &ExecContext<'_>, Vec<Value>) -> Result<Vec<Value>, Thrown>;

/// Everything running script code may reach: the engine and the instance
/// the code belongs to.
#[derive(Clone, Copy)]
pub struct ExecContext<'a> {
    pub engine: &'a Engine,
    pub interp: &'a Rc<Interpreter>,
}

impl<'a> ExecContext<'a> {
    pub fn new(engine: &'a Engine, interp: &'a Rc<Interpreter>) -> Self {
        Self { engine, interp }
    }
}
