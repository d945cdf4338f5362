use crate::{
    bytecode::{
        binding::Binding,
        compilation_scope::CompilationScope,
        op_code::{OpCode, make},
        symbol_scope::SymbolScope,
        symbol_table::SymbolTable,
    },
    runtime::value::Value,
};

use super::{CompileResult, Compiler, MAX_U8_OPERAND};

impl Compiler {
    pub(super) fn emit(&mut self, op_code: OpCode, operands: &[usize]) -> usize {
        let instruction = make(op_code, operands);
        let scope = &mut self.scopes[self.scope_index];
        let pos = scope.instructions.len();
        scope.instructions.extend_from_slice(&instruction);
        pos
    }

    pub(super) fn current_offset(&self) -> usize {
        self.scopes[self.scope_index].instructions.len()
    }

    pub(super) fn add_constant(&mut self, value: Value) -> CompileResult<usize> {
        let constants = &mut self.scopes[self.scope_index].constants;
        if let Some(index) = constants.iter().position(|existing| same_constant(existing, &value)) {
            return Ok(index);
        }
        if constants.len() > u16::MAX as usize {
            return Err(self.error("too many constants in one function"));
        }
        constants.push(value);
        Ok(constants.len() - 1)
    }

    pub(super) fn name_constant(&mut self, name: &str) -> CompileResult<usize> {
        self.add_constant(Value::str(name))
    }

    pub(super) fn load_symbol(&mut self, binding: &Binding) -> CompileResult<()> {
        match binding.symbol_scope {
            SymbolScope::Global => {
                let index = self.name_constant(&binding.name)?;
                self.emit(OpCode::OpGetGlobal, &[index]);
            }
            SymbolScope::Local => {
                self.emit(OpCode::OpGetLocal, &[binding.index]);
            }
            SymbolScope::Builtin => {
                self.emit(OpCode::OpGetBuiltin, &[binding.index]);
            }
            SymbolScope::Free => {
                self.emit(OpCode::OpGetFree, &[binding.index]);
            }
            SymbolScope::Function => {
                self.emit(OpCode::OpCurrentClosure, &[]);
            }
        }
        Ok(())
    }

    pub(super) fn define_local(&mut self, name: std::rc::Rc<str>) -> CompileResult<Binding> {
        let binding = self.symbol_table.define(name);
        if binding.index > MAX_U8_OPERAND {
            return Err(self.error("too many local variables"));
        }
        Ok(binding)
    }

    /// Points the jump at `op_pos` to `target`.
    pub(super) fn change_operand(&mut self, op_pos: usize, target: usize) {
        let op_code = OpCode::from(self.scopes[self.scope_index].instructions[op_pos]);
        let patched = make(op_code, &[target]);
        for (i, byte) in patched.iter().enumerate() {
            self.scopes[self.scope_index].instructions[op_pos + i] = *byte;
        }
    }

    pub(super) fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::new());
        self.scope_index += 1;
        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(outer);
    }

    /// Returns the finished scope and the symbol table of the function left.
    pub(super) fn leave_scope(&mut self) -> (CompilationScope, SymbolTable) {
        let scope = self.scopes.pop().unwrap_or_default();
        self.scope_index -= 1;
        let outer = self.symbol_table.outer.take().map(|outer| *outer).unwrap_or_default();
        let inner = std::mem::replace(&mut self.symbol_table, outer);
        (scope, inner)
    }
}

fn same_constant(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::String(x), Value::String(y)) => x == y,
        _ => false,
    }
}
