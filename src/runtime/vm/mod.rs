//! Bytecode interpreter.
//!
//! A [`Thread`] owns a value stack and a frame stack. Frames entered from Rust
//! are marked `entry`; returning from one ends the run loop that entered it,
//! which is how [`Thread::call_value`] nests a fresh run loop inside a builtin
//! without unwinding through it.

use std::rc::Rc;

use crate::{
    bridge::error::Thrown,
    bytecode::op_code::MULTRET,
    runtime::{ExecContext, closure::Closure, frame::Frame, value::Value},
};

mod binary_ops;
mod comparison_ops;
mod dispatch;
mod function_call;
mod index_ops;

#[cfg(test)]
mod comparison_ops_test;
#[cfg(test)]
mod function_call_test;

const INITIAL_STACK_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Started but never resumed.
    Fresh,
    Running,
    Suspended,
    Dead,
}

/// How a run loop stopped without failing.
#[derive(Debug)]
enum RunExit {
    Returned(Vec<Value>),
    Yielded(Vec<Value>),
}

/// Result of one [`Thread::resume`].
#[derive(Debug, Clone, PartialEq)]
pub enum Resumed {
    Yielded(Vec<Value>),
    Returned(Vec<Value>),
}

#[derive(Debug)]
pub struct Thread {
    stack: Vec<Value>,
    frames: Vec<Frame>,
    max_frames: usize,
    /// Number of Rust-entered run loops currently active above the base one.
    nesting: usize,
    state: ThreadState,
    coroutine: bool,
    /// Values handed to `yield`, waiting for the run loop to pick them up.
    pending_yield: Option<Vec<Value>>,
    /// Result count the suspended `yield` call site expects.
    resume_want: u8,
}

impl Thread {
    pub fn new(max_frames: usize) -> Self {
        Self {
            stack: Vec::with_capacity(INITIAL_STACK_SIZE),
            frames: Vec::new(),
            max_frames,
            nesting: 0,
            state: ThreadState::Running,
            coroutine: false,
            pending_yield: None,
            resume_want: MULTRET,
        }
    }

    /// A thread whose body may suspend itself with `yield`.
    pub fn coroutine(max_frames: usize) -> Self {
        Self {
            coroutine: true,
            state: ThreadState::Dead,
            ..Self::new(max_frames)
        }
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub fn is_coroutine(&self) -> bool {
        self.coroutine
    }

    pub fn nesting(&self) -> usize {
        self.nesting
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether `yield` may suspend this thread right now.
    pub fn can_yield(&self) -> bool {
        self.coroutine && self.nesting == 0 && self.state == ThreadState::Running
    }

    pub(crate) fn request_yield(&mut self, values: Vec<Value>) {
        self.pending_yield = Some(values);
    }

    /// Calls `callee` to completion in a nested run loop. Nothing inside may
    /// yield across this call.
    pub fn call_value(
        &mut self,
        cx: &ExecContext<'_>,
        callee: Value,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, Thrown> {
        let stack_base = self.stack.len();
        let frame_base = self.frames.len();

        self.nesting += 1;
        let result = self.call_nested(cx, callee, args);
        self.nesting -= 1;

        if result.is_err() {
            self.frames.truncate(frame_base);
            self.stack.truncate(stack_base);
        }
        result
    }

    fn call_nested(
        &mut self,
        cx: &ExecContext<'_>,
        callee: Value,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, Thrown> {
        match callee {
            Value::Builtin(builtin) => (builtin.func)(self, cx, args),
            Value::Closure(closure) => {
                let callee_pos = self.stack.len();
                self.stack.push(Value::Closure(closure.clone()));
                self.stack.extend(args);
                self.enter_closure(closure, callee_pos, MULTRET, true)?;
                match self.run(cx)? {
                    RunExit::Returned(values) => Ok(values),
                    RunExit::Yielded(_) => Err(Thrown::message(
                        "attempt to yield across a host call boundary",
                    )),
                }
            }
            other => Err(Thrown::message(format!(
                "attempt to call a {} value",
                other.type_name()
            ))),
        }
    }

    /// Loads `closure` as the body of this coroutine. Runs nothing.
    pub fn start(&mut self, closure: Rc<Closure>, args: Vec<Value>) {
        self.stack.clear();
        self.frames.clear();
        self.pending_yield = None;
        self.stack.push(Value::Closure(closure));
        self.stack.extend(args);
        self.state = ThreadState::Fresh;
    }

    /// Runs the coroutine until it yields or returns. `values` become the
    /// results of the `yield` call it is suspended in.
    pub fn resume(&mut self, cx: &ExecContext<'_>, values: Vec<Value>) -> Result<Resumed, Thrown> {
        match self.state {
            ThreadState::Fresh => {
                let Some(Value::Closure(closure)) = self.stack.first().cloned() else {
                    self.state = ThreadState::Dead;
                    return Err(Thrown::message("cannot resume non-function body"));
                };
                self.state = ThreadState::Running;
                if let Err(thrown) = self.enter_closure(closure, 0, MULTRET, true) {
                    self.kill();
                    return Err(thrown);
                }
            }
            ThreadState::Suspended => {
                self.state = ThreadState::Running;
                let want = self.resume_want;
                self.push_results(values, want);
            }
            ThreadState::Running => {
                return Err(Thrown::message("cannot resume non-suspended coroutine"));
            }
            ThreadState::Dead => return Err(Thrown::message("cannot resume dead coroutine")),
        }

        match self.run(cx) {
            Ok(RunExit::Yielded(values)) => {
                self.state = ThreadState::Suspended;
                Ok(Resumed::Yielded(values))
            }
            Ok(RunExit::Returned(values)) => {
                self.kill();
                Ok(Resumed::Returned(values))
            }
            Err(thrown) => {
                self.kill();
                Err(thrown)
            }
        }
    }

    fn kill(&mut self) {
        self.state = ThreadState::Dead;
        self.stack.clear();
        self.frames.clear();
        self.pending_yield = None;
    }

    fn push_results(&mut self, mut results: Vec<Value>, want: u8) {
        if want != MULTRET {
            results.resize(want as usize, Value::Nil);
        }
        self.stack.extend(results);
    }

    fn pop(&mut self) -> Result<Value, Thrown> {
        self.stack
            .pop()
            .ok_or_else(|| Thrown::message("stack underflow"))
    }

    fn current_frame(&self) -> Result<&Frame, Thrown> {
        self.frames
            .last()
            .ok_or_else(|| Thrown::message("no active frame"))
    }
}
