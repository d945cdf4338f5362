use std::rc::Rc;

use crate::{bytecode::op_code::Instructions, runtime::closure::Closure};

#[derive(Debug, Clone)]
pub struct Frame {
    pub closure: Rc<Closure>,
    pub ip: usize,
    pub base_pointer: usize,
    /// Number of results the caller expects, or `MULTRET`.
    pub want: u8,
    /// Entered from Rust rather than from bytecode; returning ends the run loop.
    pub entry: bool,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize, want: u8, entry: bool) -> Self {
        Self {
            closure,
            ip: 0,
            base_pointer,
            want,
            entry,
        }
    }

    pub fn instructions(&self) -> &Instructions {
        &self.closure.function.instructions
    }
}
