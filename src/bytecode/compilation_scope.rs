use std::rc::Rc;

use crate::bytecode::op_code::Instructions;
use crate::runtime::{compiled_function::CompiledFunction, value::Value};

/// Output of the function currently being compiled.
#[derive(Debug, Clone, Default)]
pub struct CompilationScope {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
    pub protos: Vec<Rc<CompiledFunction>>,
}

impl CompilationScope {
    pub fn new() -> Self {
        Self::default()
    }
}
