use crate::{
    bridge::{error::Thrown, protected::host_try},
    bytecode::op_code::{OpCode, instruction_len, read_u8, read_u16},
    runtime::{ExecContext, builtins::BUILTINS, value::Value},
};

use super::{RunExit, Thread};

impl Thread {
    /// Runs until the innermost entry frame returns or the thread yields.
    pub(super) fn run(&mut self, cx: &ExecContext<'_>) -> Result<RunExit, Thrown> {
        loop {
            let frame = self.current_frame()?;
            let ip = frame.ip;
            let instructions = frame.instructions();
            let Some(&byte) = instructions.get(ip) else {
                return Err(Thrown::message("instruction pointer out of range"));
            };
            let op = OpCode::from_byte(byte)
                .ok_or_else(|| Thrown::message(format!("bad opcode {}", byte)))?;
            let operand_a = match op {
                OpCode::OpConstant
                | OpCode::OpJump
                | OpCode::OpJumpNotTruthy
                | OpCode::OpAndJump
                | OpCode::OpOrJump
                | OpCode::OpGetGlobal
                | OpCode::OpSetGlobal
                | OpCode::OpGetField
                | OpCode::OpClosure => read_u16(instructions, ip + 1) as usize,
                OpCode::OpGetLocal
                | OpCode::OpSetLocal
                | OpCode::OpGetFree
                | OpCode::OpGetBuiltin
                | OpCode::OpCall => read_u8(instructions, ip + 1) as usize,
                _ => 0,
            };
            let operand_b = match op {
                OpCode::OpClosure => read_u8(instructions, ip + 3),
                OpCode::OpCall => read_u8(instructions, ip + 2),
                _ => 0,
            };

            if let Some(frame) = self.frames.last_mut() {
                frame.ip = ip + instruction_len(op);
            }

            if let Some(exit) = self.dispatch_instruction(cx, op, operand_a, operand_b)? {
                return Ok(exit);
            }
        }
    }

    fn dispatch_instruction(
        &mut self,
        cx: &ExecContext<'_>,
        op: OpCode,
        operand_a: usize,
        operand_b: u8,
    ) -> Result<Option<RunExit>, Thrown> {
        match op {
            OpCode::OpConstant => {
                let value = self.constant(operand_a)?;
                self.stack.push(value);
            }
            OpCode::OpNil => self.stack.push(Value::Nil),
            OpCode::OpTrue => self.stack.push(Value::Boolean(true)),
            OpCode::OpFalse => self.stack.push(Value::Boolean(false)),
            OpCode::OpAdd | OpCode::OpSub | OpCode::OpMul | OpCode::OpDiv | OpCode::OpMod => {
                self.execute_binary_operation(op)?;
            }
            OpCode::OpConcat => self.execute_concat(cx)?,
            OpCode::OpEqual
            | OpCode::OpNotEqual
            | OpCode::OpLess
            | OpCode::OpLessEqual
            | OpCode::OpGreater
            | OpCode::OpGreaterEqual => self.execute_comparison(op)?,
            OpCode::OpMinus => self.execute_minus()?,
            OpCode::OpNot => self.execute_not()?,
            OpCode::OpJump => {
                if cx.interp.tick(cx.engine.config()) {
                    host_try(cx, |host| host.check_for_interrupts())?;
                }
                self.jump(operand_a);
            }
            OpCode::OpJumpNotTruthy => {
                if !self.pop()?.is_truthy() {
                    self.jump(operand_a);
                }
            }
            OpCode::OpAndJump | OpCode::OpOrJump => {
                let truthy = self
                    .stack
                    .last()
                    .ok_or_else(|| Thrown::message("stack underflow"))?
                    .is_truthy();
                let keep = if op == OpCode::OpAndJump { !truthy } else { truthy };
                if keep {
                    self.jump(operand_a);
                } else {
                    self.pop()?;
                }
            }
            OpCode::OpPop => {
                self.pop()?;
            }
            OpCode::OpGetGlobal => {
                let name = self.constant_name(operand_a)?;
                let value = cx
                    .interp
                    .globals
                    .borrow()
                    .get(&name)
                    .cloned()
                    .unwrap_or(Value::Nil);
                self.stack.push(value);
            }
            OpCode::OpSetGlobal => {
                let name = self.constant_name(operand_a)?;
                let value = self.pop()?;
                let mut globals = cx.interp.globals.borrow_mut();
                if matches!(value, Value::Nil) {
                    globals.remove(&name);
                } else {
                    globals.insert(name, value);
                }
            }
            OpCode::OpGetLocal => {
                let slot = self.current_frame()?.base_pointer + operand_a;
                let value = self.stack[slot].clone();
                self.stack.push(value);
            }
            OpCode::OpSetLocal => {
                let slot = self.current_frame()?.base_pointer + operand_a;
                let value = self.pop()?;
                self.stack[slot] = value;
            }
            OpCode::OpGetFree => {
                let value = self
                    .current_frame()?
                    .closure
                    .free
                    .get(operand_a)
                    .cloned()
                    .ok_or_else(|| Thrown::message("invalid captured variable"))?;
                self.stack.push(value);
            }
            OpCode::OpGetBuiltin => {
                let builtin = BUILTINS
                    .get(operand_a)
                    .ok_or_else(|| Thrown::message("invalid builtin"))?;
                self.stack.push(Value::Builtin(*builtin));
            }
            OpCode::OpCurrentClosure => {
                let closure = self.current_frame()?.closure.clone();
                self.stack.push(Value::Closure(closure));
            }
            OpCode::OpClosure => self.push_closure(cx, operand_a, operand_b as usize)?,
            OpCode::OpCall => {
                if let Some(values) = self.execute_call(cx, operand_a, operand_b)? {
                    return Ok(Some(RunExit::Yielded(values)));
                }
            }
            OpCode::OpReturn => {
                if let Some(values) = self.execute_return()? {
                    return Ok(Some(RunExit::Returned(values)));
                }
            }
            OpCode::OpGetField => {
                let name = self.constant(operand_a)?;
                self.execute_get_field(&name)?;
            }
        }
        Ok(None)
    }

    fn jump(&mut self, target: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.ip = target;
        }
    }

    fn constant(&self, index: usize) -> Result<Value, Thrown> {
        self.current_frame()?
            .closure
            .function
            .constants
            .get(index)
            .cloned()
            .ok_or_else(|| Thrown::message("invalid constant index"))
    }

    fn constant_name(&self, index: usize) -> Result<std::rc::Rc<str>, Thrown> {
        match self.constant(index)? {
            Value::String(name) => Ok(name),
            other => Err(Thrown::message(format!(
                "expected a name constant, found {}",
                other.type_name()
            ))),
        }
    }
}
