//! RAII guards over interpreter state.
//!
//! Evaluation constantly enters and leaves scopes, call frames and swapped
//! environments, on both the `Ok` and `Err` paths. Guards make the exits
//! automatic: dropping the guard restores the state, so early returns with
//! `?` cannot leak a scope or a frame.

use std::ops::{Deref, DerefMut};

use lapis_ir::Name;

use crate::diagnostics::CallFrame;
use crate::environment::Environment;
use crate::errors::EvalError;
use crate::registry::ClassId;
use crate::value::Value;

use super::Interpreter;

/// Guard that pops one environment scope on drop.
pub struct ScopedInterpreter<'g, 'a> {
    interp: &'g mut Interpreter<'a>,
}

impl<'g, 'a> ScopedInterpreter<'g, 'a> {
    fn new(interp: &'g mut Interpreter<'a>) -> Self {
        interp.env.push_scope();
        ScopedInterpreter { interp }
    }
}

impl Drop for ScopedInterpreter<'_, '_> {
    fn drop(&mut self) {
        self.interp.env.pop_scope();
    }
}

impl<'a> Deref for ScopedInterpreter<'_, 'a> {
    type Target = Interpreter<'a>;

    fn deref(&self) -> &Self::Target {
        self.interp
    }
}

impl DerefMut for ScopedInterpreter<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.interp
    }
}

/// Guard that restores a swapped-out environment on drop.
pub struct EnvSwapGuard<'g, 'a> {
    interp: &'g mut Interpreter<'a>,
    saved: Option<Environment>,
}

impl Drop for EnvSwapGuard<'_, '_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.interp.env = saved;
        }
    }
}

impl<'a> Deref for EnvSwapGuard<'_, 'a> {
    type Target = Interpreter<'a>;

    fn deref(&self) -> &Self::Target {
        self.interp
    }
}

impl DerefMut for EnvSwapGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.interp
    }
}

/// Caller-side state saved across a routine invocation.
struct CallContext {
    env: Environment,
    class: Option<ClassId>,
    self_value: Option<Value>,
    method: Option<Name>,
}

/// Guard over one call frame: the callee environment and method context are
/// swapped in, and the frame is on the call stack, until drop.
pub struct CallGuard<'g, 'a> {
    interp: &'g mut Interpreter<'a>,
    saved: Option<CallContext>,
}

impl Drop for CallGuard<'_, '_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.interp.env = saved.env;
            self.interp.current_class = saved.class;
            self.interp.current_self = saved.self_value;
            self.interp.current_method = saved.method;
            self.interp.call_stack.pop();
        }
    }
}

impl<'a> Deref for CallGuard<'_, 'a> {
    type Target = Interpreter<'a>;

    fn deref(&self) -> &Self::Target {
        self.interp
    }
}

impl DerefMut for CallGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.interp
    }
}

impl<'a> Interpreter<'a> {
    /// Enter a nested scope; the guard pops it.
    pub fn scoped(&mut self) -> ScopedInterpreter<'_, 'a> {
        ScopedInterpreter::new(self)
    }

    /// Evaluate with a different environment; the guard swaps back.
    pub(crate) fn with_env(&mut self, env: Environment) -> EnvSwapGuard<'_, 'a> {
        let saved = std::mem::replace(&mut self.env, env);
        EnvSwapGuard {
            interp: self,
            saved: Some(saved),
        }
    }

    /// Push a call frame and swap in the callee's environment and method
    /// context. Fails without changing state when the depth bound is hit.
    pub(crate) fn enter_call(
        &mut self,
        frame: CallFrame,
        env: Environment,
        class: Option<ClassId>,
        self_value: Option<Value>,
        method: Option<Name>,
    ) -> Result<CallGuard<'_, 'a>, EvalError> {
        self.call_stack.push(frame)?;
        let saved = CallContext {
            env: std::mem::replace(&mut self.env, env),
            class: std::mem::replace(&mut self.current_class, class),
            self_value: std::mem::replace(&mut self.current_self, self_value),
            method: std::mem::replace(&mut self.current_method, method),
        };
        Ok(CallGuard {
            interp: self,
            saved: Some(saved),
        })
    }
}
