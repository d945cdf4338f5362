use std::fmt;
use std::rc::Rc;

use crate::runtime::{
    builtin_function::BuiltinFunction, closure::Closure, error_object::ErrorObject,
};

/// Runtime value.
///
/// Strings, closures and error objects are shared through `Rc`; cloning a
/// value never copies its payload. Numbers keep their integer or float
/// representation, and arithmetic on mixed operands widens to float.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(Rc<str>),
    Closure(Rc<Closure>),
    Builtin(BuiltinFunction),
    /// A host error, or the placeholder for one whose detail was lost.
    Error(Rc<ErrorObject>),
}

impl Value {
    pub fn str(text: &str) -> Self {
        Value::String(Rc::from(text))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Closure(_) | Value::Builtin(_) => "function",
            Value::Error(_) => "error",
        }
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Builtin(_))
    }

    /// The text an error report would show for this value, if it has one.
    pub fn error_text(&self) -> Option<String> {
        match self {
            Value::String(text) => Some(text.to_string()),
            Value::Integer(_) | Value::Float(_) => Some(self.to_string()),
            Value::Error(object) => Some(object.message()),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(value) => write!(f, "{}", value),
            Value::Integer(value) => write!(f, "{}", value),
            Value::Float(value) if value.is_finite() && value.fract() == 0.0 => {
                write!(f, "{:.1}", value)
            }
            Value::Float(value) => write!(f, "{}", value),
            Value::String(text) => write!(f, "{}", text),
            Value::Closure(closure) => write!(f, "function: {}", closure.function.name),
            Value::Builtin(builtin) => write!(f, "function: builtin: {}", builtin.name),
            Value::Error(object) => write!(f, "{}", object.message()),
        }
    }
}
