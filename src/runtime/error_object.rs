use crate::bridge::error::{BridgeError, RECURSIVE_ERROR_MESSAGE};
use crate::host::ErrorData;
use crate::runtime::value::Value;

/// Script-side wrapper around an error that came from the host.
#[derive(Debug)]
pub enum ErrorObject {
    Host(ErrorData),
    /// No detail: a second failure happened while the first was being wrapped.
    Recursive,
    /// A fatal condition on its way back to the host.
    Fatal(BridgeError),
}

impl ErrorObject {
    pub fn data(&self) -> Option<&ErrorData> {
        match self {
            ErrorObject::Host(data) => Some(data),
            ErrorObject::Recursive => None,
            ErrorObject::Fatal(err) => err.data(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            ErrorObject::Host(data) => data.message.clone(),
            ErrorObject::Recursive => RECURSIVE_ERROR_MESSAGE.to_string(),
            ErrorObject::Fatal(err) => err.to_string(),
        }
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        let text = |field: &Option<String>| field.as_deref().map_or(Value::Nil, Value::str);
        let value = match (name, self.data()) {
            ("message", _) => Value::str(&self.message()),
            ("sqlstate", Some(data)) => Value::str(&data.sqlstate),
            ("detail", Some(data)) => text(&data.detail),
            ("hint", Some(data)) => text(&data.hint),
            ("context", Some(data)) => text(&data.context),
            ("sqlstate" | "detail" | "hint" | "context", None) => Value::Nil,
            _ => return None,
        };
        Some(value)
    }
}
