use std::rc::Rc;

use crate::{
    bytecode::{
        compilation_scope::CompilationScope, op_code::OpCode, symbol_table::SymbolTable,
    },
    runtime::{builtins::BUILTINS, compiled_function::CompiledFunction},
    syntax::{SyntaxError, ast::Block, position::Position},
};

mod builder;
mod expression;
mod statement;


type CompileResult<T> = Result<T, SyntaxError>;

/// Largest operand a one-byte slot can hold.
const MAX_U8_OPERAND: usize = u8::MAX as usize;

pub struct Compiler {
    pub symbol_table: SymbolTable,
    pub(super) scopes: Vec<CompilationScope>,
    pub(super) scope_index: usize,
    pub(super) current_position: Position,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }

        Self {
            symbol_table,
            scopes: vec![CompilationScope::new()],
            scope_index: 0,
            current_position: Position::default(),
        }
    }

    /// Compiles a whole chunk into a zero-argument function named `name`.
    pub fn compile_chunk(&mut self, name: &str, block: &Block) -> CompileResult<Rc<CompiledFunction>> {
        self.compile_block(block)?;
        self.emit(OpCode::OpReturn, &[]);

        let scope = self.scopes.pop().unwrap_or_default();
        self.scopes.push(CompilationScope::new());
        self.scope_index = 0;

        Ok(Rc::new(CompiledFunction::new(
            Rc::from(name),
            scope.instructions,
            scope.constants,
            scope.protos,
            self.symbol_table.max_definitions,
            0,
        )))
    }

    pub(super) fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(message, self.current_position)
    }
}

/// Parses and compiles `source` as a chunk named `name`.
pub fn compile_source(name: &str, source: &str) -> Result<Rc<CompiledFunction>, SyntaxError> {
    let block = crate::syntax::parse(source).map_err(|mut errors| errors.remove(0))?;
    Compiler::new().compile_chunk(name, &block)
}
