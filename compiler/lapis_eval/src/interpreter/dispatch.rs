//! Call-site classification and method dispatch.
//!
//! A call expression's receiver decides which table answers it, in a fixed
//! order: unit-qualified calls, class names, record type names, then the
//! evaluated receiver value (metaclass, record, interface, object, nil).
//! Within a table, candidates come from the registry's hierarchy walk;
//! multi-candidate sets go through overload scoring with arguments
//! evaluated exactly once.

use std::rc::Rc;

use lapis_ir::{BinaryOp, ExprId, ExprKind, ExprRange, MethodDecl, Name, Span, UnaryOp};

use crate::convert::implicit_convert;
use crate::diagnostics::CallFrame;
use crate::environment::{Environment, Mutability};
use crate::errors::{self, EvalError, EvalResult};
use crate::operators::OperatorKind;
use crate::overload::{resolve_overload, ResolveOutcome};
use crate::registry::{ClassId, MethodSlot, RecordId};
use crate::shared::Shared;
use crate::signature::{describe_decl, SigKey};
use crate::value::{FunctionPtrValue, RecordValue, ThunkState, Value};

use super::Interpreter;

/// Call-site arguments: unevaluated expressions on the normal path, values
/// when the caller already evaluated them (overload scoring, native code,
/// the public API).
pub(crate) enum ArgPack {
    Exprs(Vec<ExprId>),
    Values(Vec<Value>),
}

impl ArgPack {
    pub(crate) fn len(&self) -> usize {
        match self {
            ArgPack::Exprs(ids) => ids.len(),
            ArgPack::Values(values) => values.len(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Overload candidates paired with their declaring class (`None` for
/// record and free-standing routines).
type Candidates = Vec<(Option<ClassId>, Rc<MethodDecl>)>;

pub(crate) fn with_owners(
    found: smallvec::SmallVec<[(ClassId, Rc<MethodDecl>); 2]>,
) -> Candidates {
    found
        .into_iter()
        .map(|(owner, decl)| (Some(owner), decl))
        .collect()
}

impl<'a> Interpreter<'a> {
    /// Evaluate a call expression.
    #[tracing::instrument(level = "debug", skip(self, args))]
    pub(crate) fn eval_call_expr(
        &mut self,
        receiver: Option<ExprId>,
        name: Name,
        key: Name,
        args: ExprRange,
        span: Span,
    ) -> EvalResult {
        let arg_ids = self.arena().list(args).to_vec();
        let Some(recv) = receiver else {
            return self.bare_call(name, key, arg_ids, span);
        };

        if let ExprKind::Ident {
            key: recv_key,
            name: recv_name,
        } = self.arena().kind(recv).clone()
        {
            if self.units.has_unit(recv_key) {
                return self.unit_call(recv_key, recv_name, name, key, arg_ids, span);
            }
            // Type names classify the receiver unless a variable shadows
            // them in the current environment.
            if !self.env.is_defined(recv_key) {
                if let Some(cid) = self.registry.lookup_class(recv_key) {
                    return self.class_call(cid, name, key, ArgPack::Exprs(arg_ids), span);
                }
                if let Some(rid) = self.registry.lookup_record(recv_key) {
                    return self.record_static_call(rid, name, key, ArgPack::Exprs(arg_ids), span);
                }
            }
        }

        let receiver_value = self.eval(recv)?;
        let receiver_value = self.force(receiver_value, span)?;
        self.value_dispatch(receiver_value, name, key, ArgPack::Exprs(arg_ids), span)
    }

    /// Public dispatch entry: call a method on an evaluated receiver.
    #[tracing::instrument(level = "debug", skip(self, receiver, args))]
    pub fn call_method(&mut self, receiver: Value, name: &str, args: &[Value]) -> EvalResult {
        let display = self.interner().intern(name);
        let key = self.interner().intern_ci(name);
        self.value_dispatch(
            receiver,
            display,
            key,
            ArgPack::Values(args.to_vec()),
            Span::DUMMY,
        )
    }

    /// Execute a specific declaration with an explicit receiver, bypassing
    /// name lookup (but not virtual redirection, which already happened if
    /// the caller wanted it).
    pub fn execute_method_with_self(
        &mut self,
        self_value: Value,
        decl: &Rc<MethodDecl>,
        args: &[Value],
    ) -> EvalResult {
        let owner = self_value
            .as_object()
            .map(|obj| obj.borrow().class)
            .or(match &self_value {
                Value::ClassRef(cid) => Some(*cid),
                _ => None,
            });
        self.execute_decl(
            owner,
            decl,
            Some(self_value),
            &ArgPack::Values(args.to_vec()),
            None,
            Span::DUMMY,
        )
    }

    /// Internal hook for property accessors and operator bodies.
    pub(crate) fn call_method_with_values(
        &mut self,
        receiver: Value,
        key: Name,
        args: &[Value],
        span: Span,
    ) -> EvalResult {
        self.value_dispatch(receiver, key, key, ArgPack::Values(args.to_vec()), span)
    }

    fn bare_call(
        &mut self,
        name: Name,
        key: Name,
        arg_ids: Vec<ExprId>,
        span: Span,
    ) -> EvalResult {
        if let Some(bound) = self.env.lookup(key) {
            let bound = self.force(bound, span)?;
            if let Value::FunctionPtr(fp) = bound {
                return self.call_function_ptr(&fp, ArgPack::Exprs(arg_ids), span);
            }
            return Err(
                errors::not_callable(&self.describe_value_type(&bound)).with_span(span)
            );
        }
        // Bare calls inside a method body reach the receiver's methods.
        if let Some(receiver) = self.current_self.clone() {
            if let Some(result) =
                self.try_receiver_method(receiver, name, key, &arg_ids, span)?
            {
                return Ok(result);
            }
        }
        if let Some(f) = self
            .units
            .lookup(self.names.system, key)
            .or_else(|| self.units.lookup_any(key))
        {
            let values = self.eval_args(&arg_ids, span)?;
            return f(self, &values);
        }
        Err(errors::undefined_function(self.interner().lookup(name)).with_span(span))
    }

    /// Method lookup for bare calls: `Ok(None)` when the receiver's type
    /// has no such method, so the caller can try the next namespace.
    fn try_receiver_method(
        &mut self,
        receiver: Value,
        name: Name,
        key: Name,
        arg_ids: &[ExprId],
        span: Span,
    ) -> Result<Option<Value>, EvalError> {
        match &receiver {
            Value::Object(obj) => {
                let runtime = obj.borrow().class;
                let inst = self
                    .registry
                    .find_methods(runtime, key, MethodSlot::Instance, self.interner());
                if !inst.is_empty() {
                    return self
                        .invoke_candidates(
                            name,
                            &with_owners(inst),
                            Some(receiver.clone()),
                            ArgPack::Exprs(arg_ids.to_vec()),
                            Some(runtime),
                            None,
                            span,
                        )
                        .map(Some);
                }
                let class_methods =
                    self.registry
                        .find_methods(runtime, key, MethodSlot::ClassMethod, self.interner());
                if !class_methods.is_empty() {
                    return self
                        .invoke_candidates(
                            name,
                            &with_owners(class_methods),
                            Some(Value::ClassRef(runtime)),
                            ArgPack::Exprs(arg_ids.to_vec()),
                            None,
                            None,
                            span,
                        )
                        .map(Some);
                }
                Ok(None)
            }
            Value::ClassRef(cid) => {
                let class_methods =
                    self.registry
                        .find_methods(*cid, key, MethodSlot::ClassMethod, self.interner());
                if !class_methods.is_empty() {
                    return self
                        .invoke_candidates(
                            name,
                            &with_owners(class_methods),
                            Some(receiver.clone()),
                            ArgPack::Exprs(arg_ids.to_vec()),
                            None,
                            None,
                            span,
                        )
                        .map(Some);
                }
                Ok(None)
            }
            Value::VarRef(cell) => {
                let inner = cell.get_clone();
                if let Value::Record(rec) = inner {
                    let methods = self.registry.record_methods(rec.type_id, key, false);
                    if !methods.is_empty() {
                        let candidates: Candidates =
                            methods.into_iter().map(|d| (None, d)).collect();
                        return self
                            .invoke_candidates(
                                name,
                                &candidates,
                                Some(receiver.clone()),
                                ArgPack::Exprs(arg_ids.to_vec()),
                                None,
                                None,
                                span,
                            )
                            .map(Some);
                    }
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn unit_call(
        &mut self,
        unit_key: Name,
        unit_name: Name,
        name: Name,
        key: Name,
        arg_ids: Vec<ExprId>,
        span: Span,
    ) -> EvalResult {
        let Some(f) = self.units.lookup(unit_key, key) else {
            let qualified = format!(
                "{}.{}",
                self.interner().lookup(unit_name),
                self.interner().lookup(name)
            );
            return Err(errors::undefined_function(&qualified).with_span(span));
        };
        let values = self.eval_args(&arg_ids, span)?;
        f(self, &values)
    }

    /// Dispatch through a class name or metaclass value: class methods,
    /// then constructors, then instance methods on a default-constructed
    /// instance.
    pub(crate) fn class_call(
        &mut self,
        cid: ClassId,
        name: Name,
        key: Name,
        args: ArgPack,
        span: Span,
    ) -> EvalResult {
        if key == self.names.classname && args.is_empty() {
            let class_name = self.interner().lookup(self.registry.class(cid).name);
            return Ok(Value::str(class_name));
        }
        if key == self.names.classtype && args.is_empty() {
            return Ok(Value::ClassRef(cid));
        }

        let class_methods =
            self.registry
                .find_methods(cid, key, MethodSlot::ClassMethod, self.interner());
        if !class_methods.is_empty() {
            return self.invoke_candidates(
                name,
                &with_owners(class_methods),
                Some(Value::ClassRef(cid)),
                args,
                None,
                None,
                span,
            );
        }

        let ctors = self
            .registry
            .find_methods(cid, key, MethodSlot::Constructor, self.interner());
        if !ctors.is_empty() || key == self.names.create {
            return self.construct_instance(cid, name, key, ctors, args, span);
        }

        let inst = self
            .registry
            .find_methods(cid, key, MethodSlot::Instance, self.interner());
        if !inst.is_empty() {
            let instance = self.default_instance(cid, span)?;
            return self.invoke_candidates(
                name,
                &with_owners(inst),
                Some(instance),
                args,
                Some(cid),
                None,
                span,
            );
        }

        Err(errors::method_not_found(
            self.interner().lookup(name),
            self.interner().lookup(self.registry.class(cid).name),
        )
        .with_span(span))
    }

    fn record_static_call(
        &mut self,
        rid: RecordId,
        name: Name,
        key: Name,
        args: ArgPack,
        span: Span,
    ) -> EvalResult {
        let statics = self.registry.record_methods(rid, key, true);
        if statics.is_empty() {
            return Err(errors::method_not_found(
                self.interner().lookup(name),
                self.interner().lookup(self.registry.record(rid).name),
            )
            .with_span(span));
        }
        let candidates: Candidates = statics.into_iter().map(|d| (None, d)).collect();
        self.invoke_candidates(name, &candidates, None, args, None, None, span)
    }

    /// Dispatch on an evaluated receiver value.
    pub(crate) fn value_dispatch(
        &mut self,
        receiver: Value,
        name: Name,
        key: Name,
        args: ArgPack,
        span: Span,
    ) -> EvalResult {
        match receiver {
            Value::ClassRef(cid) => self.class_call(cid, name, key, args, span),
            Value::Object(obj) => self.instance_dispatch(obj, name, key, args, span),
            Value::Record(rec) => self.record_dispatch(rec, name, key, args, span),
            Value::Interface(iv) => {
                // Release is never part of the contract; it reaches the
                // underlying instance (and is nil-safe) regardless.
                if key == self.names.free {
                    return match iv.object {
                        Some(obj) => self.release_instance(&obj, span),
                        None => Ok(Value::Nil),
                    };
                }
                if !self.registry.interface_declares(iv.interface, key) {
                    return Err(errors::method_not_found(
                        self.interner().lookup(name),
                        self.interner()
                            .lookup(self.registry.interface(iv.interface).name),
                    )
                    .with_span(span));
                }
                match iv.object {
                    Some(obj) => self.instance_dispatch(obj, name, key, args, span),
                    None => Err(errors::nil_receiver(self.interner().lookup(name)).with_span(span)),
                }
            }
            Value::FunctionPtr(ref fp) => {
                // `ptr.Invoke(..)` style is not a thing; the pointer itself
                // is the callable when named bare. Through a receiver we
                // only accept a call to it by its own name.
                if key == fp.decl.key {
                    let fp = fp.clone();
                    self.call_function_ptr(&fp, args, span)
                } else {
                    Err(errors::method_not_found(self.interner().lookup(name), "function")
                        .with_span(span))
                }
            }
            Value::Nil => {
                if key == self.names.free {
                    Ok(Value::Nil)
                } else {
                    Err(errors::nil_receiver(self.interner().lookup(name)).with_span(span))
                }
            }
            other => self.helper_dispatch(other, name, key, args, span),
        }
    }

    fn instance_dispatch(
        &mut self,
        obj: Shared<crate::value::ObjectInstance>,
        name: Name,
        key: Name,
        args: ArgPack,
        span: Span,
    ) -> EvalResult {
        let runtime = {
            let instance = obj.borrow();
            if instance.destroyed {
                if key == self.names.free {
                    // Free is idempotent.
                    return Ok(Value::Nil);
                }
                return Err(
                    errors::destroyed_instance(self.interner().lookup(name)).with_span(span)
                );
            }
            instance.class
        };

        if key == self.names.free || key == self.names.destroy {
            return self.release_instance(&obj, span);
        }
        if key == self.names.classname && args.is_empty() {
            let class_name = self.interner().lookup(self.registry.class(runtime).name);
            return Ok(Value::str(class_name));
        }
        if key == self.names.classtype && args.is_empty() {
            return Ok(Value::ClassRef(runtime));
        }

        let receiver = Value::Object(obj.clone());
        let inst = self
            .registry
            .find_methods(runtime, key, MethodSlot::Instance, self.interner());
        if !inst.is_empty() {
            return self.invoke_candidates(
                name,
                &with_owners(inst),
                Some(receiver),
                args,
                Some(runtime),
                None,
                span,
            );
        }

        let class_methods =
            self.registry
                .find_methods(runtime, key, MethodSlot::ClassMethod, self.interner());
        if !class_methods.is_empty() {
            return self.invoke_candidates(
                name,
                &with_owners(class_methods),
                Some(Value::ClassRef(runtime)),
                args,
                None,
                None,
                span,
            );
        }

        // A field holding a function pointer is callable through the
        // instance.
        let field = obj.borrow().fields.get(&key).cloned();
        if let Some(field) = field {
            let field = self.force(field, span)?;
            if let Value::FunctionPtr(fp) = field {
                return self.call_function_ptr(&fp, args, span);
            }
        }

        self.helper_dispatch(receiver, name, key, args, span)
    }

    fn record_dispatch(
        &mut self,
        rec: RecordValue,
        name: Name,
        key: Name,
        args: ArgPack,
        span: Span,
    ) -> EvalResult {
        let methods = self.registry.record_methods(rec.type_id, key, false);
        if !methods.is_empty() {
            // Copy-then-bind: the method works on its own copy of the
            // record; caller state is untouched.
            let self_cell = Shared::new(Value::Record(rec.clone()));
            let candidates: Candidates = methods.into_iter().map(|d| (None, d)).collect();
            return self.invoke_candidates(
                name,
                &candidates,
                Some(Value::VarRef(self_cell)),
                args,
                None,
                None,
                span,
            );
        }
        let statics = self.registry.record_methods(rec.type_id, key, true);
        if !statics.is_empty() {
            let candidates: Candidates = statics.into_iter().map(|d| (None, d)).collect();
            return self.invoke_candidates(name, &candidates, None, args, None, None, span);
        }
        self.helper_dispatch(Value::Record(rec), name, key, args, span)
    }

    /// Last resort: native helper methods keyed by the receiver's type key.
    fn helper_dispatch(
        &mut self,
        receiver: Value,
        name: Name,
        key: Name,
        args: ArgPack,
        span: Span,
    ) -> EvalResult {
        // Objects search their class chain so helpers attach to ancestors.
        let found = if let Some(obj) = receiver.as_object() {
            let chain = self.registry.class_chain(obj.borrow().class);
            chain.into_iter().find_map(|cid| {
                let type_key = self.registry.class(cid).key;
                self.helpers.lookup(type_key, key)
            })
        } else {
            let type_key = self.value_type_key(&receiver);
            self.helpers.lookup(type_key, key)
        };
        if let Some(f) = found {
            let values = self.pack_to_values(args, span)?;
            return f(self, &receiver, &values);
        }
        Err(errors::method_not_found(
            self.interner().lookup(name),
            &self.describe_value_type(&receiver),
        )
        .with_span(span))
    }

    /// `inherited` / `inherited Name(args)`: resolve starting at the parent
    /// of the method's static class, never redirecting through the VMT.
    pub(crate) fn eval_inherited(
        &mut self,
        name: Option<(Name, Name)>,
        args: ExprRange,
        span: Span,
    ) -> EvalResult {
        let (display, key) = match name {
            Some((display, key)) => (display, key),
            None => {
                let Some(key) = self.current_method else {
                    return Err(errors::inherited_unavailable().with_span(span));
                };
                (key, key)
            }
        };
        let arg_ids = self.arena().list(args).to_vec();
        self.inherited_dispatch(display, key, ArgPack::Exprs(arg_ids), span)
    }

    /// Embedder form of `inherited Name(args)`: arguments are already
    /// evaluated. Fails like the keyword when no method context with a
    /// parent class is active.
    pub fn call_inherited_method(&mut self, name: &str, args: &[Value]) -> EvalResult {
        let display = self.interner().intern(name);
        let key = self.interner().intern_ci(name);
        self.inherited_dispatch(display, key, ArgPack::Values(args.to_vec()), Span::DUMMY)
    }

    fn inherited_dispatch(
        &mut self,
        display: Name,
        key: Name,
        args: ArgPack,
        span: Span,
    ) -> EvalResult {
        let Some(current) = self.current_class else {
            return Err(errors::inherited_unavailable().with_span(span));
        };
        let Some(parent) = self.registry.class(current).parent else {
            return Err(errors::inherited_unavailable().with_span(span));
        };
        let receiver = self.current_self.clone();

        let inst = self
            .registry
            .find_methods(parent, key, MethodSlot::Instance, self.interner());
        if !inst.is_empty() {
            return self.invoke_candidates(
                display,
                &with_owners(inst),
                receiver,
                args,
                None,
                None,
                span,
            );
        }

        let ctors = self
            .registry
            .find_methods(parent, key, MethodSlot::Constructor, self.interner());
        if !ctors.is_empty() {
            // Ancestor constructor body runs on the instance under
            // construction; no new allocation.
            let seed = receiver.clone();
            return self.invoke_candidates(
                display,
                &with_owners(ctors),
                receiver,
                args,
                None,
                seed,
                span,
            );
        }

        let class_methods =
            self.registry
                .find_methods(parent, key, MethodSlot::ClassMethod, self.interner());
        if !class_methods.is_empty() {
            return self.invoke_candidates(
                display,
                &with_owners(class_methods),
                Some(Value::ClassRef(parent)),
                args,
                None,
                None,
                span,
            );
        }

        Err(errors::method_not_found(
            self.interner().lookup(display),
            self.interner().lookup(self.registry.class(parent).name),
        )
        .with_span(span))
    }

    /// Capture a bound method reference as a first-class value.
    ///
    /// Virtual methods resolve through the receiver's runtime class at
    /// capture time; the pointer then calls that implementation directly.
    pub fn method_pointer(&mut self, receiver: Value, name: &str) -> EvalResult {
        let key = self.interner().intern_ci(name);
        let (candidates, vmt_runtime) = match &receiver {
            Value::Object(obj) => {
                let runtime = obj.borrow().class;
                let inst =
                    self.registry
                        .find_methods(runtime, key, MethodSlot::Instance, self.interner());
                if inst.is_empty() {
                    let class_methods = self.registry.find_methods(
                        runtime,
                        key,
                        MethodSlot::ClassMethod,
                        self.interner(),
                    );
                    (with_owners(class_methods), None)
                } else {
                    (with_owners(inst), Some(runtime))
                }
            }
            Value::ClassRef(cid) => {
                let class_methods =
                    self.registry
                        .find_methods(*cid, key, MethodSlot::ClassMethod, self.interner());
                (with_owners(class_methods), None)
            }
            other => {
                return Err(errors::not_callable(&self.describe_value_type(other)));
            }
        };
        let Some((owner, decl)) = candidates.first().cloned() else {
            return Err(errors::method_not_found(
                name,
                &self.describe_value_type(&receiver),
            ));
        };
        let (owner, decl) = match (vmt_runtime, decl.binding.is_virtual()) {
            (Some(runtime), true) => {
                let sig = SigKey::of(&decl, self.interner());
                match self.registry.virtual_target(runtime, &sig, self.interner()) {
                    Some((impl_owner, impl_decl)) => (Some(impl_owner), impl_decl),
                    None => (owner, decl),
                }
            }
            _ => (owner, decl),
        };
        Ok(Value::FunctionPtr(Rc::new(FunctionPtrValue {
            decl,
            bound_self: Some(receiver),
            owner,
        })))
    }

    pub(crate) fn call_function_ptr(
        &mut self,
        fp: &Rc<FunctionPtrValue>,
        args: ArgPack,
        span: Span,
    ) -> EvalResult {
        self.execute_decl(
            fp.owner,
            &fp.decl,
            fp.bound_self.clone(),
            &args,
            None,
            span,
        )
    }

    /// Apply a user-defined operator overload, if one is registered for
    /// these operand values. `Ok(None)` falls back to the builtin.
    pub(crate) fn apply_operator(
        &mut self,
        kind: OperatorKind,
        operands: &[Value],
        span: Span,
    ) -> Result<Option<Value>, EvalError> {
        let Some(entry) = self.registry.find_operator(self.interner(), kind, operands) else {
            return Ok(None);
        };
        let result = if entry.class_bound {
            let owner = entry.owner.ok_or_else(|| {
                errors::registration("class-bound operator entry without an owning class")
                    .with_span(span)
            })?;
            self.execute_decl(
                Some(owner),
                &entry.decl,
                Some(Value::ClassRef(owner)),
                &ArgPack::Values(operands.to_vec()),
                None,
                span,
            )?
        } else {
            let self_operand = operands[entry.self_index].clone();
            let self_binding = match self_operand {
                Value::Record(rec) => Value::VarRef(Shared::new(Value::Record(rec))),
                other => other,
            };
            let rest: Vec<Value> = operands
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != entry.self_index)
                .map(|(_, v)| v.clone())
                .collect();
            self.execute_decl(
                entry.owner,
                &entry.decl,
                Some(self_binding),
                &ArgPack::Values(rest),
                None,
                span,
            )?
        };
        Ok(Some(result))
    }

    /// Apply a registered binary operator overload to evaluated operands.
    /// `Ok(None)` means no overload matched and the builtin meaning stands.
    pub fn try_binary_operator(
        &mut self,
        op: BinaryOp,
        left: Value,
        right: Value,
    ) -> Result<Option<Value>, EvalError> {
        self.apply_operator(OperatorKind::Binary(op), &[left, right], Span::DUMMY)
    }

    /// Unary counterpart of [`Interpreter::try_binary_operator`].
    pub fn try_unary_operator(
        &mut self,
        op: UnaryOp,
        operand: Value,
    ) -> Result<Option<Value>, EvalError> {
        self.apply_operator(OperatorKind::Unary(op), &[operand], Span::DUMMY)
    }

    /// Pick a candidate and run it.
    ///
    /// Single candidates bind directly from argument expressions. Larger
    /// sets evaluate the arguments once, score, and bind the cached
    /// values; positions that are lazy in every candidate skip evaluation
    /// and travel as thunks instead.
    pub(crate) fn invoke_candidates(
        &mut self,
        name: Name,
        candidates: &[(Option<ClassId>, Rc<MethodDecl>)],
        self_binding: Option<Value>,
        args: ArgPack,
        vmt_runtime: Option<ClassId>,
        result_seed: Option<Value>,
        span: Span,
    ) -> EvalResult {
        debug_assert!(!candidates.is_empty());
        let (index, args) = if candidates.len() == 1 {
            (0, args)
        } else {
            let values = self.pack_for_scoring(args, candidates, span)?;
            let decls: Vec<&MethodDecl> =
                candidates.iter().map(|(_, decl)| decl.as_ref()).collect();
            match resolve_overload(&decls, &values, &self.registry, self.interner()) {
                ResolveOutcome::Selected(i) => (i, ArgPack::Values(values)),
                ResolveOutcome::Ambiguous(i, j) => {
                    return Err(errors::ambiguous_overload(
                        self.interner().lookup(name),
                        &describe_decl(decls[i], self.interner()),
                        &describe_decl(decls[j], self.interner()),
                    )
                    .with_span(span));
                }
                ResolveOutcome::NoMatch => {
                    return Err(errors::arity_mismatch(
                        self.interner().lookup(name),
                        &expected_arities(&decls),
                        values.len(),
                    )
                    .with_span(span));
                }
            }
        };

        let (mut owner, mut decl) = candidates[index].clone();
        if !decl.arity_matches(args.len()) {
            return Err(errors::arity_mismatch(
                self.interner().lookup(name),
                &expected_arities(&[decl.as_ref()]),
                args.len(),
            )
            .with_span(span));
        }

        // Virtual redirection: the statically resolved declaration names
        // the slot; the receiver's runtime class picks the implementation.
        if let Some(runtime) = vmt_runtime {
            if decl.binding.is_virtual() {
                let sig = SigKey::of(&decl, self.interner());
                if let Some((impl_owner, impl_decl)) =
                    self.registry.virtual_target(runtime, &sig, self.interner())
                {
                    owner = Some(impl_owner);
                    decl = impl_decl;
                }
            }
        }

        self.execute_decl(owner, &decl, self_binding, &args, result_seed, span)
    }

    /// Run one declaration: build the callee environment (class scope,
    /// `Self`, parameters, `Result` slot), enter the frame, evaluate the
    /// body, and read the result back.
    pub(crate) fn execute_decl(
        &mut self,
        owner: Option<ClassId>,
        decl: &Rc<MethodDecl>,
        self_binding: Option<Value>,
        args: &ArgPack,
        result_seed: Option<Value>,
        span: Span,
    ) -> EvalResult {
        let mut call_env = self.env.child();
        call_env.push_scope();
        if let Some(owner) = owner {
            self.inject_class_scope(&mut call_env, owner)?;
        }
        if let Some(self_value) = &self_binding {
            call_env.define(self.names.self_, self_value.clone(), Mutability::Immutable);
        }
        self.bind_params(&mut call_env, decl, args, span)?;

        let result_cell = if decl.has_result() || result_seed.is_some() {
            let cell = Shared::new(result_seed.unwrap_or(Value::Nil));
            call_env.define(
                self.names.result,
                Value::VarRef(cell.clone()),
                Mutability::Mutable,
            );
            // The function name aliases the Result slot inside the body.
            if decl.key != self.names.result {
                call_env.define(decl.key, Value::VarRef(cell.clone()), Mutability::Mutable);
            }
            Some(cell)
        } else {
            None
        };

        let frame = CallFrame {
            name: self.qualified_name(owner, decl),
            call_span: span,
        };
        let mut call = self.enter_call(frame, call_env, owner, self_binding, Some(decl.key))?;
        let body_outcome = call.eval(decl.body);
        drop(call);
        body_outcome?;

        let result = match result_cell {
            Some(cell) => cell.get_clone(),
            None => Value::Nil,
        };
        Ok(match &decl.return_type {
            Some(ty) => implicit_convert(result, ty),
            None => result,
        })
    }

    fn bind_params(
        &mut self,
        call_env: &mut Environment,
        decl: &MethodDecl,
        args: &ArgPack,
        span: Span,
    ) -> Result<(), EvalError> {
        let argc = args.len();
        for (i, param) in decl.params.iter().enumerate() {
            let bound = if i < argc {
                match args {
                    ArgPack::Exprs(ids) => {
                        let id = ids[i];
                        if param.lazy {
                            Value::Thunk(Shared::new(ThunkState {
                                expr: id,
                                env: self.env.clone(),
                                forced: None,
                            }))
                        } else if param.by_ref {
                            match self.lvalue_cell(id, span)? {
                                Some(cell) => Value::VarRef(cell),
                                None => {
                                    return Err(errors::invalid_assignment_target()
                                        .with_span(self.arena().span(id)));
                                }
                            }
                        } else {
                            let value = self.eval_forced(id, span)?;
                            implicit_convert(value, &param.ty)
                        }
                    }
                    ArgPack::Values(values) => {
                        let value = values[i].clone();
                        if param.by_ref {
                            match value {
                                cell @ Value::VarRef(_) => cell,
                                other => Value::VarRef(Shared::new(other)),
                            }
                        } else if param.lazy {
                            // Deferred positions arrive as thunks and stay
                            // deferred; embedder-supplied values are already
                            // evaluated and bind as-is.
                            value
                        } else {
                            implicit_convert(value, &param.ty)
                        }
                    }
                }
            } else {
                // Trailing default, evaluated in the caller's environment.
                let Some(default) = param.default else {
                    return Err(errors::arity_mismatch(
                        self.interner().lookup(decl.name),
                        &expected_arities(&[decl]),
                        argc,
                    )
                    .with_span(span));
                };
                let value = self.eval_forced(default, span)?;
                implicit_convert(value, &param.ty)
            };
            call_env.define(param.key, bound, Mutability::Mutable);
        }
        Ok(())
    }

    fn eval_args(&mut self, ids: &[ExprId], span: Span) -> Result<Vec<Value>, EvalError> {
        let mut values = Vec::with_capacity(ids.len());
        for id in ids {
            values.push(self.eval_forced(*id, span)?);
        }
        Ok(values)
    }

    fn pack_to_values(&mut self, args: ArgPack, span: Span) -> Result<Vec<Value>, EvalError> {
        match args {
            ArgPack::Exprs(ids) => self.eval_args(&ids, span),
            ArgPack::Values(values) => Ok(values),
        }
    }

    /// Evaluate arguments once for overload scoring, except positions that
    /// every candidate declares lazy: those become thunks here, score as
    /// compatible-by-declaration, and bind deferred like any lazy argument.
    fn pack_for_scoring(
        &mut self,
        args: ArgPack,
        candidates: &[(Option<ClassId>, Rc<MethodDecl>)],
        span: Span,
    ) -> Result<Vec<Value>, EvalError> {
        let ids = match args {
            ArgPack::Exprs(ids) => ids,
            ArgPack::Values(values) => return Ok(values),
        };
        let mut values = Vec::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if lazy_in_every_candidate(candidates, i) {
                values.push(Value::Thunk(Shared::new(ThunkState {
                    expr: *id,
                    env: self.env.clone(),
                    forced: None,
                })));
            } else {
                values.push(self.eval_forced(*id, span)?);
            }
        }
        Ok(values)
    }
}

/// A position stays deferred only when every candidate that can receive an
/// argument there declares the parameter lazy. A single eager candidate
/// forces evaluation: its scoring needs the value.
fn lazy_in_every_candidate(
    candidates: &[(Option<ClassId>, Rc<MethodDecl>)],
    index: usize,
) -> bool {
    let mut any = false;
    for (_, decl) in candidates {
        if let Some(param) = decl.params.get(index) {
            if !param.lazy {
                return false;
            }
            any = true;
        }
    }
    any
}

/// Human-readable arity expectation across candidates, e.g. `1, 2 or 3`.
fn expected_arities(decls: &[&MethodDecl]) -> String {
    let mut counts: Vec<usize> = Vec::new();
    for decl in decls {
        for n in decl.required_params()..=decl.params.len() {
            if !counts.contains(&n) {
                counts.push(n);
            }
        }
    }
    counts.sort_unstable();
    match counts.as_slice() {
        [] => "none".to_string(),
        [one] => one.to_string(),
        [init @ .., last] => {
            let head = init
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            format!("{head} or {last}")
        }
    }
}
