use std::cmp::Ordering;

use crate::{bridge::error::Thrown, bytecode::op_code::OpCode, runtime::value::Value};

use super::Thread;

impl Thread {
    pub(super) fn execute_comparison(&mut self, op: OpCode) -> Result<(), Thrown> {
        let right = self.pop()?;
        let left = self.pop()?;
        let result = compare(op, &left, &right)?;
        self.stack.push(Value::Boolean(result));
        Ok(())
    }

    pub(super) fn execute_not(&mut self) -> Result<(), Thrown> {
        let value = self.pop()?;
        self.stack.push(Value::Boolean(!value.is_truthy()));
        Ok(())
    }
}

pub(crate) fn compare(op: OpCode, left: &Value, right: &Value) -> Result<bool, Thrown> {
    match op {
        OpCode::OpEqual => return Ok(left == right),
        OpCode::OpNotEqual => return Ok(left != right),
        _ => {}
    }

    let ordering = match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => Some(l.cmp(r)),
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            number(left).partial_cmp(&number(right))
        }
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => return Err(compare_error(left, right)),
    };

    // NaN compares false under every ordering operator.
    let Some(ordering) = ordering else {
        return Ok(false);
    };
    Ok(match op {
        OpCode::OpLess => ordering == Ordering::Less,
        OpCode::OpLessEqual => ordering != Ordering::Greater,
        OpCode::OpGreater => ordering == Ordering::Greater,
        OpCode::OpGreaterEqual => ordering != Ordering::Less,
        _ => return Err(Thrown::message(format!("unknown comparison operator {}", op))),
    })
}

fn number(value: &Value) -> f64 {
    match value {
        Value::Integer(n) => *n as f64,
        Value::Float(n) => *n,
        _ => f64::NAN,
    }
}

fn compare_error(left: &Value, right: &Value) -> Thrown {
    let (l, r) = (left.type_name(), right.type_name());
    if l == r {
        Thrown::message(format!("attempt to compare two {} values", l))
    } else {
        Thrown::message(format!("attempt to compare {} with {}", l, r))
    }
}
