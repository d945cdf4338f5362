use std::cell::{Cell, RefCell};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod sqlstate {
    pub const INTERNAL_ERROR: &str = "XX000";
    pub const OUT_OF_MEMORY: &str = "53200";
    pub const RAISE_EXCEPTION: &str = "P0001";
    pub const EXTERNAL_ROUTINE_EXCEPTION: &str = "38000";
    pub const UNDEFINED_FUNCTION: &str = "42883";
    pub const DATATYPE_MISMATCH: &str = "42804";
    pub const FEATURE_NOT_SUPPORTED: &str = "0A000";
    pub const QUERY_CANCELED: &str = "57014";
    pub const STATEMENT_TOO_COMPLEX: &str = "54001";
    pub const INSUFFICIENT_PRIVILEGE: &str = "42501";
    pub const OBJECT_NOT_IN_PREREQUISITE_STATE: &str = "55000";

    pub fn is_valid(code: &str) -> bool {
        code.len() == 5
            && code
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Fatal,
}

/// Structured diagnostic detail of one host error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub sqlstate: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ErrorData {
    pub fn new(sqlstate: &str, message: impl Into<String>) -> Self {
        Self {
            sqlstate: sqlstate.to_string(),
            severity: Severity::Error,
            message: message.into(),
            detail: None,
            hint: None,
            context: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Bytes a copy of this record occupies in a region.
    pub fn footprint(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.sqlstate.len()
            + self.message.len()
            + self.detail.as_ref().map_or(0, String::len)
            + self.hint.as_ref().map_or(0, String::len)
            + self.context.as_ref().map_or(0, String::len)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for ErrorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ErrorStateFault {
    #[error("no active error to copy")]
    Empty,
    #[error("error data stack is corrupt")]
    Corrupt,
}

/// Stack of errors currently being raised.
///
/// Raising pushes; whoever recovers must copy what it needs and then flush.
/// Copy and flush can be made to fail once, for exercising the degraded paths.
#[derive(Debug, Default)]
pub struct ErrorState {
    stack: RefCell<Vec<ErrorData>>,
    fail_next_copy: Cell<bool>,
    fail_next_flush: Cell<bool>,
}

impl ErrorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self, data: ErrorData) {
        self.stack.borrow_mut().push(data);
    }

    pub fn depth(&self) -> usize {
        self.stack.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.borrow().is_empty()
    }

    /// Copies the innermost active error.
    pub fn copy_error_data(&self) -> Result<ErrorData, ErrorStateFault> {
        if self.fail_next_copy.replace(false) {
            return Err(ErrorStateFault::Corrupt);
        }
        self.stack.borrow().last().cloned().ok_or(ErrorStateFault::Empty)
    }

    /// Discards every active error so normal execution can resume.
    pub fn flush(&self) -> Result<(), ErrorStateFault> {
        if self.fail_next_flush.replace(false) {
            return Err(ErrorStateFault::Corrupt);
        }
        self.stack.borrow_mut().clear();
        Ok(())
    }

    pub fn fail_next_copy(&self) {
        self.fail_next_copy.set(true);
    }

    pub fn fail_next_flush(&self) {
        self.fail_next_flush.set(true);
    }
}
