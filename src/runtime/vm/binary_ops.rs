use std::rc::Rc;

use crate::{
    bridge::error::Thrown,
    bytecode::op_code::OpCode,
    runtime::{ExecContext, value::Value},
};

use super::Thread;

impl Thread {
    pub(super) fn execute_binary_operation(&mut self, op: OpCode) -> Result<(), Thrown> {
        let right = self.pop()?;
        let left = self.pop()?;
        let result = arithmetic(op, &left, &right)?;
        self.stack.push(result);
        Ok(())
    }

    pub(super) fn execute_concat(&mut self, cx: &ExecContext<'_>) -> Result<(), Thrown> {
        let right = self.pop()?;
        let left = self.pop()?;
        let text = format!("{}{}", concat_operand(&left)?, concat_operand(&right)?);
        cx.interp.alloc.check()?;
        self.stack.push(Value::String(Rc::from(text)));
        Ok(())
    }

    pub(super) fn execute_minus(&mut self) -> Result<(), Thrown> {
        let value = match self.pop()? {
            Value::Integer(n) => Value::Integer(n.wrapping_neg()),
            Value::Float(n) => Value::Float(-n),
            other => return Err(arithmetic_error(&other)),
        };
        self.stack.push(value);
        Ok(())
    }
}

/// Integer operands stay integers except under `/`; any float widens the
/// result to float. Integer arithmetic wraps.
pub(crate) fn arithmetic(op: OpCode, left: &Value, right: &Value) -> Result<Value, Thrown> {
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => {
            let (l, r) = (*l, *r);
            let result = match op {
                OpCode::OpAdd => l.wrapping_add(r),
                OpCode::OpSub => l.wrapping_sub(r),
                OpCode::OpMul => l.wrapping_mul(r),
                OpCode::OpDiv => return Ok(Value::Float(l as f64 / r as f64)),
                OpCode::OpMod => {
                    if r == 0 {
                        return Err(Thrown::message("attempt to perform 'n%%0'"));
                    }
                    let m = l.wrapping_rem(r);
                    if m != 0 && (m ^ r) < 0 { m + r } else { m }
                }
                _ => return Err(Thrown::message(format!("unknown arithmetic operator {}", op))),
            };
            Ok(Value::Integer(result))
        }
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            let (l, r) = (as_float(left), as_float(right));
            let result = match op {
                OpCode::OpAdd => l + r,
                OpCode::OpSub => l - r,
                OpCode::OpMul => l * r,
                OpCode::OpDiv => l / r,
                OpCode::OpMod => l - (l / r).floor() * r,
                _ => return Err(Thrown::message(format!("unknown arithmetic operator {}", op))),
            };
            Ok(Value::Float(result))
        }
        (Value::Integer(_) | Value::Float(_), other) | (other, _) => Err(arithmetic_error(other)),
    }
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::Integer(n) => *n as f64,
        Value::Float(n) => *n,
        _ => f64::NAN,
    }
}

fn arithmetic_error(value: &Value) -> Thrown {
    Thrown::message(format!(
        "attempt to perform arithmetic on a {} value",
        value.type_name()
    ))
}

fn concat_operand(value: &Value) -> Result<String, Thrown> {
    match value {
        Value::String(text) => Ok(text.to_string()),
        Value::Integer(_) | Value::Float(_) => Ok(value.to_string()),
        other => Err(Thrown::message(format!(
            "attempt to concatenate a {} value",
            other.type_name()
        ))),
    }
}
