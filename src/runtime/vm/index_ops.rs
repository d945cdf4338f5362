use crate::{bridge::error::Thrown, runtime::value::Value};

use super::Thread;

impl Thread {
    /// Reads a named field. Only error objects have fields; unknown names
    /// read as nil.
    pub(super) fn execute_get_field(&mut self, name: &Value) -> Result<(), Thrown> {
        let object = self.pop()?;
        let value = match (&object, name) {
            (Value::Error(error), Value::String(name)) => error.field(name).unwrap_or(Value::Nil),
            _ => {
                return Err(Thrown::message(format!(
                    "attempt to index a {} value",
                    object.type_name()
                )));
            }
        };
        self.stack.push(value);
        Ok(())
    }
}
