use crate::{
    bytecode::{
        op_code::{MULTRET, OpCode},
        symbol_scope::SymbolScope,
    },
    syntax::ast::{Block, Expression, Statement},
};

use super::{CompileResult, Compiler};

impl Compiler {
    pub(super) fn compile_block(&mut self, block: &Block) -> CompileResult<()> {
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    /// Compiles `block` in its own lexical scope.
    fn compile_scoped_block(&mut self, block: &Block) -> CompileResult<()> {
        self.symbol_table.enter_block();
        let result = self.compile_block(block);
        self.symbol_table.leave_block();
        result
    }

    fn compile_statement(&mut self, statement: &Statement) -> CompileResult<()> {
        match statement {
            Statement::Local {
                names,
                values,
                position,
            } => {
                self.current_position = *position;
                self.compile_adjusted(values, names.len())?;
                let bindings = names
                    .iter()
                    .map(|name| self.define_local(name.clone()))
                    .collect::<CompileResult<Vec<_>>>()?;
                for binding in bindings.iter().rev() {
                    self.emit(OpCode::OpSetLocal, &[binding.index]);
                }
            }
            Statement::LocalFunction { name, function } => {
                let binding = self.define_local(name.clone())?;
                self.compile_function_literal(function, Some(name.clone()))?;
                self.emit(OpCode::OpSetLocal, &[binding.index]);
            }
            Statement::Function { name, function } => {
                self.compile_function_literal(function, None)?;
                let index = self.name_constant(name)?;
                self.emit(OpCode::OpSetGlobal, &[index]);
            }
            Statement::Assign {
                name,
                value,
                position,
            } => {
                self.current_position = *position;
                let binding = self.symbol_table.resolve(name);
                match binding.symbol_scope {
                    SymbolScope::Free | SymbolScope::Function => {
                        return Err(
                            self.error(format!("cannot assign to captured variable '{}'", name))
                        );
                    }
                    SymbolScope::Builtin => {
                        return Err(self.error(format!("cannot assign to builtin '{}'", name)));
                    }
                    SymbolScope::Local => {
                        self.compile_expression(value)?;
                        self.emit(OpCode::OpSetLocal, &[binding.index]);
                    }
                    SymbolScope::Global => {
                        self.compile_expression(value)?;
                        let index = self.name_constant(name)?;
                        self.emit(OpCode::OpSetGlobal, &[index]);
                    }
                }
            }
            Statement::Call { call } => {
                self.compile_call(call, 0)?;
            }
            Statement::If {
                branches,
                otherwise,
            } => {
                let mut exit_jumps = Vec::new();
                for (condition, body) in branches {
                    self.compile_expression(condition)?;
                    let skip = self.emit(OpCode::OpJumpNotTruthy, &[9999]);
                    self.compile_scoped_block(body)?;
                    exit_jumps.push(self.emit(OpCode::OpJump, &[9999]));
                    let next = self.current_offset();
                    self.change_operand(skip, next);
                }
                if let Some(body) = otherwise {
                    self.compile_scoped_block(body)?;
                }
                let end = self.current_offset();
                for jump in exit_jumps {
                    self.change_operand(jump, end);
                }
            }
            Statement::While { condition, body } => {
                let start = self.current_offset();
                self.compile_expression(condition)?;
                let exit = self.emit(OpCode::OpJumpNotTruthy, &[9999]);
                self.compile_scoped_block(body)?;
                self.emit(OpCode::OpJump, &[start]);
                let end = self.current_offset();
                self.change_operand(exit, end);
            }
            Statement::Do { body } => {
                self.compile_scoped_block(body)?;
            }
            Statement::Return { values, position } => {
                self.current_position = *position;
                if let Some((last, init)) = values.split_last() {
                    for value in init {
                        self.compile_expression(value)?;
                    }
                    if last.is_call() {
                        self.compile_call(last, MULTRET as usize)?;
                    } else {
                        self.compile_expression(last)?;
                    }
                }
                self.emit(OpCode::OpReturn, &[]);
            }
        }
        Ok(())
    }

    /// Leaves exactly `count` values on the stack. A trailing call supplies
    /// as many as are still missing; short lists are padded with nil.
    fn compile_adjusted(&mut self, values: &[Expression], count: usize) -> CompileResult<()> {
        for (i, value) in values.iter().enumerate() {
            let is_last = i + 1 == values.len();
            if i >= count {
                self.compile_expression(value)?;
                self.emit(OpCode::OpPop, &[]);
            } else if is_last && value.is_call() {
                self.compile_call(value, count - i)?;
                return Ok(());
            } else {
                self.compile_expression(value)?;
            }
        }
        for _ in values.len()..count {
            self.emit(OpCode::OpNil, &[]);
        }
        Ok(())
    }
}
