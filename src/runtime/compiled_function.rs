use std::rc::Rc;

use crate::bytecode::op_code::Instructions;
use crate::runtime::{leak_detector, value::Value};

/// A compiled function prototype. Nested function literals live in `protos`
/// and are instantiated by `OpClosure`.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub name: Rc<str>,
    pub instructions: Instructions,
    pub constants: Vec<Value>,
    pub protos: Vec<Rc<CompiledFunction>>,
    pub num_locals: usize,
    pub num_parameters: usize,
}

impl CompiledFunction {
    pub fn new(
        name: Rc<str>,
        instructions: Instructions,
        constants: Vec<Value>,
        protos: Vec<Rc<CompiledFunction>>,
        num_locals: usize,
        num_parameters: usize,
    ) -> Self {
        leak_detector::record_compiled_function();
        Self {
            name,
            instructions,
            constants,
            protos,
            num_locals,
            num_parameters,
        }
    }
}
