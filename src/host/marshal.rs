use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::runtime::value::Value;

/// A host-side value crossing into or out of a procedure call.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Bool(value) => write!(f, "{}", if *value { "t" } else { "f" }),
            Datum::Int(value) => write!(f, "{}", value),
            Datum::Float(value) => write!(f, "{}", value),
            Datum::Text(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MarshalError {
    #[error("cannot return a value of type {0} to the host")]
    Unsupported(&'static str),
}

pub trait Marshal {
    fn to_value(&self, datum: &Datum) -> Value;
    fn to_datum(&self, value: &Value) -> Result<Datum, MarshalError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMarshal;

impl Marshal for DefaultMarshal {
    fn to_value(&self, datum: &Datum) -> Value {
        match datum {
            Datum::Null => Value::Nil,
            Datum::Bool(value) => Value::Boolean(*value),
            Datum::Int(value) => Value::Integer(*value),
            Datum::Float(value) => Value::Float(*value),
            Datum::Text(value) => Value::String(Rc::from(value.as_str())),
        }
    }

    fn to_datum(&self, value: &Value) -> Result<Datum, MarshalError> {
        match value {
            Value::Nil => Ok(Datum::Null),
            Value::Boolean(value) => Ok(Datum::Bool(*value)),
            Value::Integer(value) => Ok(Datum::Int(*value)),
            Value::Float(value) => Ok(Datum::Float(*value)),
            Value::String(value) => Ok(Datum::Text(value.to_string())),
            other => Err(MarshalError::Unsupported(other.type_name())),
        }
    }
}
