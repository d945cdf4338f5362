use std::rc::Rc;

use crate::{
    bytecode::op_code::OpCode,
    runtime::{compiled_function::CompiledFunction, value::Value},
    syntax::ast::{BinaryOp, Expression, FunctionLiteral, UnaryOp},
};

use super::{CompileResult, Compiler, MAX_U8_OPERAND};

impl Compiler {
    /// Compiles `expression` to exactly one value on the stack.
    pub(super) fn compile_expression(&mut self, expression: &Expression) -> CompileResult<()> {
        match expression {
            Expression::Nil => {
                self.emit(OpCode::OpNil, &[]);
            }
            Expression::Boolean(true) => {
                self.emit(OpCode::OpTrue, &[]);
            }
            Expression::Boolean(false) => {
                self.emit(OpCode::OpFalse, &[]);
            }
            Expression::Integer(value) => self.emit_constant(Value::Integer(*value))?,
            Expression::Float(value) => self.emit_constant(Value::Float(*value))?,
            Expression::String(value) => self.emit_constant(Value::String(value.clone()))?,
            Expression::Identifier { name, position } => {
                self.current_position = *position;
                let binding = self.symbol_table.resolve(name);
                self.load_symbol(&binding)?;
            }
            Expression::Prefix { operator, right } => {
                self.compile_expression(right)?;
                let op = match operator {
                    UnaryOp::Minus => OpCode::OpMinus,
                    UnaryOp::Not => OpCode::OpNot,
                };
                self.emit(op, &[]);
            }
            Expression::Infix {
                left,
                operator: operator @ (BinaryOp::And | BinaryOp::Or),
                right,
            } => {
                self.compile_expression(left)?;
                let op = if *operator == BinaryOp::And {
                    OpCode::OpAndJump
                } else {
                    OpCode::OpOrJump
                };
                let jump = self.emit(op, &[9999]);
                self.compile_expression(right)?;
                let end = self.current_offset();
                self.change_operand(jump, end);
            }
            Expression::Infix {
                left,
                operator,
                right,
            } => {
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                self.emit(binary_op_code(*operator), &[]);
            }
            Expression::Call { .. } => self.compile_call(expression, 1)?,
            Expression::Field { object, name } => {
                self.compile_expression(object)?;
                let index = self.name_constant(name)?;
                self.emit(OpCode::OpGetField, &[index]);
            }
            Expression::Function(function) => self.compile_function_literal(function, None)?,
        }
        Ok(())
    }

    /// Compiles a call that leaves `want` results, or all of them for `MULTRET`.
    pub(super) fn compile_call(&mut self, call: &Expression, want: usize) -> CompileResult<()> {
        let Expression::Call {
            function,
            arguments,
            position,
        } = call
        else {
            self.compile_expression(call)?;
            return self.adjust_single(want);
        };

        self.compile_expression(function)?;
        if arguments.len() > MAX_U8_OPERAND {
            return Err(self.error("too many arguments in function call"));
        }
        for argument in arguments {
            self.compile_expression(argument)?;
        }
        self.current_position = *position;
        self.emit(OpCode::OpCall, &[arguments.len(), want]);
        Ok(())
    }

    fn adjust_single(&mut self, want: usize) -> CompileResult<()> {
        match want {
            0 => {
                self.emit(OpCode::OpPop, &[]);
            }
            1 => {}
            n => {
                for _ in 1..n {
                    self.emit(OpCode::OpNil, &[]);
                }
            }
        }
        Ok(())
    }

    /// Compiles a function literal and leaves a closure of it on the stack.
    /// `self_name` lets the body call itself without capturing its own slot.
    pub(super) fn compile_function_literal(
        &mut self,
        function: &FunctionLiteral,
        self_name: Option<Rc<str>>,
    ) -> CompileResult<()> {
        self.enter_scope();
        if let Some(name) = &self_name {
            self.symbol_table.define_function_name(name.clone());
        }

        let body = self.compile_function_body(function);
        let (scope, table) = self.leave_scope();
        body?;

        self.current_position = function.position;
        if table.free_symbols.len() > MAX_U8_OPERAND {
            return Err(self.error("too many captured variables"));
        }
        for free in &table.free_symbols {
            self.load_symbol(free)?;
        }

        let name = function
            .name
            .clone()
            .or(self_name)
            .unwrap_or_else(|| Rc::from("anonymous"));
        let proto = CompiledFunction::new(
            name,
            scope.instructions,
            scope.constants,
            scope.protos,
            table.max_definitions,
            function.parameters.len(),
        );

        let protos = &mut self.scopes[self.scope_index].protos;
        protos.push(Rc::new(proto));
        let index = protos.len() - 1;
        self.emit(OpCode::OpClosure, &[index, table.free_symbols.len()]);
        Ok(())
    }

    fn compile_function_body(&mut self, function: &FunctionLiteral) -> CompileResult<()> {
        for parameter in &function.parameters {
            self.define_local(parameter.clone())?;
        }
        self.compile_block(&function.body)?;
        self.emit(OpCode::OpReturn, &[]);
        Ok(())
    }

    fn emit_constant(&mut self, value: Value) -> CompileResult<()> {
        let index = self.add_constant(value)?;
        self.emit(OpCode::OpConstant, &[index]);
        Ok(())
    }
}

fn binary_op_code(operator: BinaryOp) -> OpCode {
    match operator {
        BinaryOp::Add => OpCode::OpAdd,
        BinaryOp::Sub => OpCode::OpSub,
        BinaryOp::Mul => OpCode::OpMul,
        BinaryOp::Div => OpCode::OpDiv,
        BinaryOp::Mod => OpCode::OpMod,
        BinaryOp::Concat => OpCode::OpConcat,
        BinaryOp::Eq => OpCode::OpEqual,
        BinaryOp::NotEq => OpCode::OpNotEqual,
        BinaryOp::Lt => OpCode::OpLess,
        BinaryOp::Lte => OpCode::OpLessEqual,
        BinaryOp::Gt => OpCode::OpGreater,
        BinaryOp::Gte => OpCode::OpGreaterEqual,
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit operators are compiled as jumps"),
    }
}
