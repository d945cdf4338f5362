use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::host::{ErrorData, sqlstate};
use crate::runtime::{error_object::ErrorObject, value::Value};

pub const OUT_OF_MEMORY_MESSAGE: &str = "plflux: out of memory";
pub const RECURSIVE_ERROR_MESSAGE: &str = "recursive error in script error handling";
pub const NOT_A_STRING_MESSAGE: &str = "(error is not a string)";

/// How an interpreter-side call ended, when it did not end normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Runtime,
    Memory,
    /// Never caught by script code; travels back to the host untouched.
    Fatal,
}

/// An interpreter-level failure: a status code and the thrown value.
#[derive(Debug, Clone)]
pub struct Thrown {
    pub status: Status,
    pub value: Value,
}

impl Thrown {
    pub fn runtime(value: Value) -> Self {
        Self {
            status: Status::Runtime,
            value,
        }
    }

    pub fn message(message: impl AsRef<str>) -> Self {
        Self::runtime(Value::String(Rc::from(message.as_ref())))
    }

    pub fn out_of_memory() -> Self {
        Self {
            status: Status::Memory,
            value: Value::String(Rc::from("not enough memory")),
        }
    }

    pub fn fatal(err: BridgeError) -> Self {
        Self {
            status: Status::Fatal,
            value: Value::Error(Rc::new(ErrorObject::Fatal(err))),
        }
    }

    pub fn is_catchable(&self) -> bool {
        self.status != Status::Fatal
    }

    /// The fatal host error carried by a `Status::Fatal` throw.
    pub fn fatal_error(&self) -> Option<&BridgeError> {
        match (&self.status, &self.value) {
            (Status::Fatal, Value::Error(object)) => match object.as_ref() {
                ErrorObject::Fatal(err) => Some(err),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value.error_text() {
            Some(text) => write!(f, "{}", text),
            None => write!(f, "{}", NOT_A_STRING_MESSAGE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InterpreterRuntime,
    InterpreterAllocation,
    Host,
    Recursive,
    ProtocolViolation,
    ErrorStateCorrupt,
}

/// A failure expressed for the host.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// Raised by script code and converted at the boundary.
    #[error("{}", .0.message)]
    Script(Box<ErrorData>),
    #[error("{}", .0.message)]
    OutOfMemory(Box<ErrorData>),
    #[error("{}", .0.message)]
    Host(Box<ErrorData>),
    #[error("{}", .0.message)]
    Recursive(Box<ErrorData>),
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("error state corrupt: {0}")]
    ErrorStateCorrupt(String),
}

impl BridgeError {
    pub fn out_of_memory_data() -> ErrorData {
        ErrorData::new(sqlstate::OUT_OF_MEMORY, OUT_OF_MEMORY_MESSAGE)
    }

    pub fn recursive_data() -> ErrorData {
        ErrorData::new(sqlstate::INTERNAL_ERROR, RECURSIVE_ERROR_MESSAGE)
    }

    pub fn data(&self) -> Option<&ErrorData> {
        match self {
            BridgeError::Script(data)
            | BridgeError::OutOfMemory(data)
            | BridgeError::Host(data)
            | BridgeError::Recursive(data) => Some(data),
            BridgeError::ProtocolViolation(_) | BridgeError::ErrorStateCorrupt(_) => None,
        }
    }

    pub fn sqlstate(&self) -> &str {
        self.data()
            .map_or(sqlstate::INTERNAL_ERROR, |data| data.sqlstate.as_str())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Script(_) => ErrorKind::InterpreterRuntime,
            BridgeError::OutOfMemory(_) => ErrorKind::InterpreterAllocation,
            BridgeError::Host(_) => ErrorKind::Host,
            BridgeError::Recursive(_) => ErrorKind::Recursive,
            BridgeError::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            BridgeError::ErrorStateCorrupt(_) => ErrorKind::ErrorStateCorrupt,
        }
    }

    /// Fatal errors end all further error handling in the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::ProtocolViolation(_) | BridgeError::ErrorStateCorrupt(_)
        )
    }
}

/// A failure caught at a boundary, already resolved to the side it continues on.
#[derive(Debug, Clone)]
pub enum Unwind {
    Interpreter(Thrown),
    Host(BridgeError),
}

impl Unwind {
    pub fn into_host(self) -> BridgeError {
        match self {
            Unwind::Host(err) => err,
            Unwind::Interpreter(thrown) => match thrown.fatal_error() {
                Some(err) => err.clone(),
                None => BridgeError::ProtocolViolation(format!(
                    "interpreter error reached host frames: {}",
                    thrown
                )),
            },
        }
    }

    pub fn into_interpreter(self) -> Thrown {
        match self {
            Unwind::Interpreter(thrown) => thrown,
            Unwind::Host(err) if err.is_fatal() => Thrown::fatal(err),
            Unwind::Host(err) => Thrown::fatal(BridgeError::ProtocolViolation(format!(
                "host error reached interpreter frames: {}",
                err
            ))),
        }
    }
}
