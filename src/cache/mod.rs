//! Caches that sit between a host procedure id and a running closure.
//!
//! One [`Interpreter`](interp::Interpreter) exists per principal. Inside it the
//! [`FunctionStore`](function::FunctionStore) maps procedure ids to compiled
//! function objects keyed by version stamp, and the
//! [`ActivationTable`](activation::ActivationTable) keeps per call-site state.
//! None of these hold a `RefCell` borrow across a call into script code or
//! into the host; every operation that can re-enter works on copied handles.

pub mod activation;
pub mod function;
pub mod interp;
pub mod resolve;

#[cfg(test)]
mod activation_test;

pub use activation::{Activation, ActivationTable};
pub use function::{FuncHandle, FunctionMeta, FunctionObject, FunctionStore, FunctionUse};
pub use interp::Interpreter;
pub use resolve::resolve;
