//! The dispatch engine.
//!
//! `Interpreter` owns the mutable evaluation state: environment, type
//! registries, native extension points and the bounded call stack. The
//! expression arena and interner are borrowed from the front end for the
//! whole run.
//!
//! Submodules split the engine along its seams:
//! - `exec`: expression evaluation (literals, control flow, member access)
//! - `dispatch`: call-site classification and method dispatch
//! - `construct`: instance allocation, constructors and the release path
//! - `scope_guard`: RAII guards for scopes, frames and environment swaps

mod construct;
mod dispatch;
mod exec;
mod scope_guard;

pub use scope_guard::ScopedInterpreter;

use lapis_ir::{ExprArena, MethodDecl, Name, StringInterner};

use crate::diagnostics::{CallStack, DEFAULT_MAX_CALL_DEPTH};
use crate::environment::{Environment, Mutability};
use crate::errors::{EvalError, EvalResult};
use crate::helpers::{HelperRegistry, UnitRegistry};
use crate::registry::{ClassId, Registry};
use crate::value::Value;

/// Pre-interned lookup keys for names the engine consults on hot paths.
///
/// All fields are `intern_ci` keys; computing them once at construction
/// keeps per-dispatch work to map lookups.
pub(crate) struct WellKnownNames {
    pub self_: Name,
    pub result: Name,
    pub create: Name,
    pub destroy: Name,
    pub free: Name,
    pub classname: Name,
    pub classtype: Name,
    pub system: Name,
    pub integer: Name,
    pub float: Name,
    pub string: Name,
    pub boolean: Name,
    pub variant: Name,
    pub array: Name,
    pub nil: Name,
    pub function: Name,
}

impl WellKnownNames {
    fn new(interner: &StringInterner) -> Self {
        WellKnownNames {
            self_: interner.intern_ci("self"),
            result: interner.intern_ci("result"),
            create: interner.intern_ci("create"),
            destroy: interner.intern_ci("destroy"),
            free: interner.intern_ci("free"),
            classname: interner.intern_ci("classname"),
            classtype: interner.intern_ci("classtype"),
            system: interner.intern_ci("system"),
            integer: interner.intern_ci("integer"),
            float: interner.intern_ci("float"),
            string: interner.intern_ci("string"),
            boolean: interner.intern_ci("boolean"),
            variant: interner.intern_ci("variant"),
            array: interner.intern_ci("array"),
            nil: interner.intern_ci("nil"),
            function: interner.intern_ci("function"),
        }
    }
}

/// Builder for [`Interpreter`]; the only tunable today is the call-depth
/// bound.
pub struct InterpreterBuilder<'a> {
    interner: &'a StringInterner,
    arena: &'a ExprArena,
    max_call_depth: usize,
}

impl<'a> InterpreterBuilder<'a> {
    pub fn new(interner: &'a StringInterner, arena: &'a ExprArena) -> Self {
        InterpreterBuilder {
            interner,
            arena,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    /// Set the maximum call depth. Exceeding it raises a catchable
    /// recursion-limit error.
    #[must_use]
    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn build(self) -> Interpreter<'a> {
        Interpreter {
            names: WellKnownNames::new(self.interner),
            interner: self.interner,
            arena: self.arena,
            env: Environment::new(),
            registry: Registry::new(),
            helpers: HelperRegistry::new(),
            units: UnitRegistry::new(),
            call_stack: CallStack::new(self.max_call_depth),
            current_class: None,
            current_self: None,
            current_method: None,
        }
    }
}

/// Tree-walking evaluator with registry-driven dispatch.
pub struct Interpreter<'a> {
    interner: &'a StringInterner,
    arena: &'a ExprArena,
    pub(crate) env: Environment,
    pub(crate) registry: Registry,
    pub(crate) helpers: HelperRegistry,
    pub(crate) units: UnitRegistry,
    pub(crate) call_stack: CallStack,
    pub(crate) names: WellKnownNames,
    /// Static class of the executing method body, for `inherited`.
    pub(crate) current_class: Option<ClassId>,
    /// Receiver of the executing method body, for bare method calls.
    pub(crate) current_self: Option<Value>,
    /// Key of the executing method, for bare `inherited`.
    pub(crate) current_method: Option<Name>,
}

impl<'a> Interpreter<'a> {
    /// Interpreter with default configuration.
    pub fn new(interner: &'a StringInterner, arena: &'a ExprArena) -> Self {
        InterpreterBuilder::new(interner, arena).build()
    }

    pub fn interner(&self) -> &'a StringInterner {
        self.interner
    }

    pub fn arena(&self) -> &'a ExprArena {
        self.arena
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn helpers_mut(&mut self) -> &mut HelperRegistry {
        &mut self.helpers
    }

    pub fn units_mut(&mut self) -> &mut UnitRegistry {
        &mut self.units
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Define a global binding, for embedding and tests.
    pub fn define_global(&mut self, name: &str, value: Value) {
        let key = self.interner.intern_ci(name);
        self.env.define_global(key, value, Mutability::Mutable);
    }

    /// Current call depth.
    pub fn call_depth(&self) -> usize {
        self.call_stack.depth()
    }

    /// The type key dispatch tables use for this value's receiver type.
    pub(crate) fn value_type_key(&self, value: &Value) -> Name {
        match value {
            Value::Int(_) => self.names.integer,
            Value::Float(_) => self.names.float,
            Value::Str(_) => self.names.string,
            Value::Bool(_) => self.names.boolean,
            Value::Subrange { base, .. } => *base,
            Value::Enum { type_key, .. } => *type_key,
            Value::Array(_) => self.names.array,
            Value::Record(rec) => self.registry.record(rec.type_id).key,
            Value::Object(obj) => self.registry.class(obj.borrow().class).key,
            Value::Interface(iv) => self.registry.interface(iv.interface).key,
            Value::ClassRef(cid) => self.registry.class(*cid).key,
            Value::FunctionPtr(_) => self.names.function,
            Value::VarRef(cell) => self.value_type_key(&cell.borrow()),
            Value::Thunk(_) => self.names.variant,
            Value::Nil => self.names.nil,
        }
    }

    /// Case-preserved type name for diagnostics.
    pub(crate) fn describe_value_type(&self, value: &Value) -> String {
        match value {
            Value::Object(obj) => self
                .interner
                .lookup(self.registry.class(obj.borrow().class).name)
                .to_string(),
            Value::Record(rec) => self
                .interner
                .lookup(self.registry.record(rec.type_id).name)
                .to_string(),
            Value::Interface(iv) => self
                .interner
                .lookup(self.registry.interface(iv.interface).name)
                .to_string(),
            Value::ClassRef(cid) => {
                format!("class of {}", self.interner.lookup(self.registry.class(*cid).name))
            }
            Value::Subrange { base, .. } => self.interner.lookup(*base).to_string(),
            Value::VarRef(cell) => self.describe_value_type(&cell.borrow()),
            other => other.kind_name().to_string(),
        }
    }

    /// Memoized value of a class constant visible from `cid`.
    ///
    /// Constants evaluate lazily, in a fresh scope over the globals, and
    /// cache their value in the registry entry.
    pub(crate) fn class_constant(&mut self, cid: ClassId, key: Name) -> Option<EvalResult> {
        let info = self.registry.find_constant(cid, key)?;
        if let Some(value) = info.cached.borrow().clone() {
            return Some(Ok(value));
        }
        let mut const_env = self.env.child();
        const_env.push_scope();
        let mut swapped = self.with_env(const_env);
        let result = swapped.eval(info.expr);
        drop(swapped);
        match result {
            Ok(value) => {
                *info.cached.borrow_mut() = Some(value.clone());
                Some(Ok(value))
            }
            Err(err) => Some(Err(err)),
        }
    }

    /// Seed a call scope with the class constants and class variables
    /// visible from `owner`, root-first so derived declarations shadow.
    pub(crate) fn inject_class_scope(
        &mut self,
        env: &mut Environment,
        owner: ClassId,
    ) -> Result<(), EvalError> {
        for cid in self.registry.class_chain_root_first(owner) {
            let const_keys: Vec<Name> = self.registry.class(cid).constants.keys().copied().collect();
            for key in const_keys {
                if let Some(result) = self.class_constant(cid, key) {
                    env.define(key, result?, Mutability::Immutable);
                }
            }
            let class_vars: Vec<(Name, crate::shared::Shared<Value>)> = self
                .registry
                .class(cid)
                .class_vars
                .iter()
                .map(|(k, cell)| (*k, cell.clone()))
                .collect();
            for (key, cell) in class_vars {
                env.define(key, Value::VarRef(cell), Mutability::Mutable);
            }
        }
        Ok(())
    }

    /// Interned `Class.Method` frame name for backtraces.
    pub(crate) fn qualified_name(&self, owner: Option<ClassId>, decl: &MethodDecl) -> Name {
        match owner {
            Some(cid) => {
                let class = self.interner.lookup(self.registry.class(cid).name);
                let method = self.interner.lookup(decl.name);
                self.interner.intern(&format!("{class}.{method}"))
            }
            None => decl.name,
        }
    }
}
