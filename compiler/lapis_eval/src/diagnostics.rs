//! Call-stack tracking for depth limiting and backtraces.
//!
//! Every routine invocation pushes a frame before its body runs and pops it
//! on the way out (via the call guard's `Drop`). The stack is bounded:
//! `push` fails fast once the configured depth is reached, which is what
//! turns runaway recursion into a catchable error instead of a crash.

use lapis_ir::{Name, Span};

use crate::errors::{recursion_limit, BacktraceFrame, EvalBacktrace, EvalError};

/// Default maximum call depth.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 2048;

/// One active invocation.
#[derive(Clone, Debug)]
pub struct CallFrame {
    /// Qualified routine name, e.g. `TDog.Speak` or `MakeArray`.
    pub name: Name,
    /// Call-site span in the caller.
    pub call_span: Span,
}

/// Bounded stack of active invocations.
#[derive(Debug)]
pub struct CallStack {
    frames: Vec<CallFrame>,
    max_depth: usize,
}

impl CallStack {
    pub fn new(max_depth: usize) -> Self {
        CallStack {
            frames: Vec::with_capacity(64),
            max_depth,
        }
    }

    /// Current depth.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Push a frame, failing when the depth bound is already reached.
    pub fn push(&mut self, frame: CallFrame) -> Result<(), EvalError> {
        if self.frames.len() >= self.max_depth {
            return Err(recursion_limit(self.max_depth)
                .with_span(frame.call_span)
                .with_backtrace(self.capture()));
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Pop the innermost frame.
    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Snapshot the active frames, outermost first.
    pub fn capture(&self) -> EvalBacktrace {
        EvalBacktrace {
            frames: self
                .frames
                .iter()
                .map(|frame| BacktraceFrame {
                    name: frame.name,
                    span: frame.call_span,
                })
                .collect(),
        }
    }
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CALL_DEPTH)
    }
}
