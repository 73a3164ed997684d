//! Instance lifecycle: allocation, constructors, and the release path.
//!
//! Allocation walks the class chain root-first and fills every declared
//! field with its initializer (evaluated in a scope seeded with class
//! constants) or the type's default. Constructors then run as ordinary
//! methods with `Result` pre-seeded to the fresh instance; `Free` and
//! `Destroy` share one release path that runs the most-derived destructor
//! and marks the instance dead.

use std::rc::Rc;

use lapis_ir::{MethodDecl, Name, Span, TypeSpec};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::errors::{self, EvalError, EvalResult};
use crate::registry::{ClassId, MethodSlot};
use crate::shared::Shared;
use crate::value::{ObjectInstance, Value};

use super::dispatch::{with_owners, ArgPack};
use super::Interpreter;

/// Zero value for a declared field type.
fn default_value_for(ty: &TypeSpec) -> Value {
    match ty {
        TypeSpec::Integer => Value::Int(0),
        TypeSpec::Float => Value::Float(0.0),
        TypeSpec::String => Value::str(""),
        TypeSpec::Boolean => Value::Bool(false),
        TypeSpec::Array(_) => Value::array(Vec::new()),
        TypeSpec::Named(_) | TypeSpec::Variant => Value::Nil,
    }
}

impl<'a> Interpreter<'a> {
    /// Public construction entry: `interp.construct("TDog", &[])`.
    pub fn construct(&mut self, class_name: &str, args: &[Value]) -> EvalResult {
        let key = self.interner().intern_ci(class_name);
        let Some(cid) = self.registry.lookup_class(key) else {
            return Err(errors::unknown_type(class_name));
        };
        let ctors = self.registry.find_methods(
            cid,
            self.names.create,
            MethodSlot::Constructor,
            self.interner(),
        );
        self.construct_instance(
            cid,
            self.names.create,
            self.names.create,
            ctors,
            ArgPack::Values(args.to_vec()),
            Span::DUMMY,
        )
    }

    /// Run class-name construction for `key` with the given candidates.
    ///
    /// `Create` with zero arguments falls back to implicit default
    /// construction when no declared constructor can take the call; other
    /// names require a declared constructor.
    pub(crate) fn construct_instance(
        &mut self,
        cid: ClassId,
        name: Name,
        key: Name,
        ctors: SmallVec<[(ClassId, Rc<MethodDecl>); 2]>,
        args: ArgPack,
        span: Span,
    ) -> EvalResult {
        let implicit_ok = key == self.names.create && args.is_empty();

        if ctors.is_empty() {
            if implicit_ok {
                let instance = self.allocate_instance(cid, span)?;
                return Ok(Value::Object(instance));
            }
            return Err(errors::constructor_not_found(
                self.interner().lookup(self.registry.class(cid).name),
                self.interner().lookup(name),
            )
            .with_span(span));
        }

        if implicit_ok && !ctors.iter().any(|(_, decl)| decl.arity_matches(0)) {
            // Declared constructors all need arguments; a bare Create still
            // produces a default-initialized instance.
            let instance = self.allocate_instance(cid, span)?;
            return Ok(Value::Object(instance));
        }

        let instance = self.allocate_instance(cid, span)?;
        let receiver = Value::Object(instance.clone());
        let result = self.invoke_candidates(
            name,
            &with_owners(ctors),
            Some(receiver.clone()),
            args,
            None,
            Some(receiver.clone()),
            span,
        )?;

        // A constructor returns its instance unless the body overrode
        // `Result` with another instance of a compatible class.
        match result {
            Value::Object(obj) if self.registry.is_subclass_of(obj.borrow().class, cid) => {
                Ok(Value::Object(obj))
            }
            _ => Ok(receiver),
        }
    }

    /// Default-construct an instance for instance-through-class dispatch:
    /// use a zero-callable `Create` when one exists, plain allocation
    /// otherwise.
    pub(crate) fn default_instance(&mut self, cid: ClassId, span: Span) -> EvalResult {
        let ctors = self.registry.find_methods(
            cid,
            self.names.create,
            MethodSlot::Constructor,
            self.interner(),
        );
        if ctors.iter().any(|(_, decl)| decl.arity_matches(0)) {
            return self.construct_instance(
                cid,
                self.names.create,
                self.names.create,
                ctors,
                ArgPack::Values(Vec::new()),
                span,
            );
        }
        let instance = self.allocate_instance(cid, span)?;
        Ok(Value::Object(instance))
    }

    /// Allocate and field-initialize an instance of `cid` without running
    /// any constructor body.
    pub(crate) fn allocate_instance(
        &mut self,
        cid: ClassId,
        span: Span,
    ) -> Result<Shared<ObjectInstance>, EvalError> {
        let mut init_env = self.env.child();
        init_env.push_scope();
        self.inject_class_scope(&mut init_env, cid)?;

        let mut fields = FxHashMap::default();
        let chain = self.registry.class_chain_root_first(cid);
        let mut init = self.with_env(init_env);
        for class in chain {
            let declared = init.registry.class(class).fields.clone();
            for field in declared {
                let value = match field.initializer {
                    Some(expr) => init.eval_forced(expr, span)?,
                    None => default_value_for(&field.ty),
                };
                fields.insert(field.key, value);
            }
        }
        drop(init);

        Ok(Shared::new(ObjectInstance {
            class: cid,
            fields,
            destroyed: false,
        }))
    }

    /// The shared release path behind `Free` and `Destroy`: run the
    /// most-derived destructor if any, then mark the instance destroyed.
    /// Releasing an already-destroyed instance is a no-op.
    pub(crate) fn release_instance(
        &mut self,
        obj: &Shared<ObjectInstance>,
        span: Span,
    ) -> EvalResult {
        let runtime = {
            let instance = obj.borrow();
            if instance.destroyed {
                return Ok(Value::Nil);
            }
            instance.class
        };

        let dtors = self.registry.find_methods(
            runtime,
            self.names.destroy,
            MethodSlot::Instance,
            self.interner(),
        );
        if !dtors.is_empty() {
            let receiver = Value::Object(obj.clone());
            self.invoke_candidates(
                self.names.destroy,
                &with_owners(dtors),
                Some(receiver),
                ArgPack::Values(Vec::new()),
                Some(runtime),
                None,
                span,
            )?;
        }

        obj.borrow_mut().destroyed = true;
        Ok(Value::Nil)
    }
}
