use std::rc::Rc;

use crate::{
    bridge::{error::Thrown, protected::host_try},
    runtime::{ExecContext, closure::Closure, frame::Frame, value::Value},
};

use super::Thread;

impl Thread {
    /// Pushes a frame for `closure`, whose value sits at `callee_pos` with its
    /// arguments above it. Missing arguments become nil, extra ones are dropped.
    pub(super) fn enter_closure(
        &mut self,
        closure: Rc<Closure>,
        callee_pos: usize,
        want: u8,
        entry: bool,
    ) -> Result<(), Thrown> {
        if self.frames.len() >= self.max_frames {
            return Err(Thrown::message("stack overflow"));
        }
        let base_pointer = callee_pos + 1;
        let function = &closure.function;
        self.stack.truncate(base_pointer + function.num_parameters);
        self.stack
            .resize(base_pointer + function.num_locals.max(function.num_parameters), Value::Nil);
        self.frames
            .push(Frame::new(closure, base_pointer, want, entry));
        Ok(())
    }

    /// Executes `OpCall`. Returns the values handed to `yield` when the callee
    /// asked to suspend the thread.
    pub(super) fn execute_call(
        &mut self,
        cx: &ExecContext<'_>,
        num_args: usize,
        want: u8,
    ) -> Result<Option<Vec<Value>>, Thrown> {
        if cx.interp.tick(cx.engine.config()) {
            host_try(cx, |host| host.check_for_interrupts())?;
        }

        let callee_pos = self.stack.len() - 1 - num_args;
        match self.stack[callee_pos].clone() {
            Value::Closure(closure) => {
                self.enter_closure(closure, callee_pos, want, false)?;
                Ok(None)
            }
            Value::Builtin(builtin) => {
                let args = self.stack.split_off(callee_pos + 1);
                self.stack.truncate(callee_pos);
                let results = (builtin.func)(self, cx, args)?;
                if let Some(values) = self.pending_yield.take() {
                    self.resume_want = want;
                    return Ok(Some(values));
                }
                self.push_results(results, want);
                Ok(None)
            }
            other => Err(Thrown::message(format!(
                "attempt to call a {} value",
                other.type_name()
            ))),
        }
    }

    /// Executes `OpReturn`. Returns the results when the frame was entered
    /// from Rust.
    pub(super) fn execute_return(&mut self) -> Result<Option<Vec<Value>>, Thrown> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Thrown::message("return with no active frame"))?;
        let locals_end = frame.base_pointer + frame.closure.function.num_locals;
        let results = if self.stack.len() > locals_end {
            self.stack.split_off(locals_end)
        } else {
            Vec::new()
        };
        self.stack.truncate(frame.base_pointer - 1);

        if frame.entry {
            return Ok(Some(results));
        }
        self.push_results(results, frame.want);
        Ok(None)
    }

    pub(super) fn push_closure(
        &mut self,
        cx: &ExecContext<'_>,
        proto_index: usize,
        num_free: usize,
    ) -> Result<(), Thrown> {
        cx.interp.alloc.check()?;
        let function = self
            .current_frame()?
            .closure
            .function
            .protos
            .get(proto_index)
            .cloned()
            .ok_or_else(|| Thrown::message("invalid function prototype"))?;
        let free = self.stack.split_off(self.stack.len() - num_free);
        let closure = Closure::new(function, free);
        self.stack.push(Value::Closure(Rc::new(closure)));
        Ok(())
    }
}
