//! Expression evaluation.
//!
//! `eval` is the single recursion point; it grows the native stack before
//! descending, then matches on the node kind. Call-shaped nodes hand off to
//! the dispatch module; everything else is handled here, including member
//! reads and writes, which share the receiver classification with dispatch.

use lapis_ir::{BinaryOp, ExprId, ExprKind, Name, Span, UnaryOp};

use crate::environment::{AssignError, Mutability};
use crate::errors::{self, EvalError, EvalResult};
use crate::operators::OperatorKind;
use crate::shared::Shared;
use crate::stack::ensure_sufficient_stack;
use crate::value::{ThunkState, Value};

use super::Interpreter;

impl<'a> Interpreter<'a> {
    /// Evaluate one expression.
    pub fn eval(&mut self, id: ExprId) -> EvalResult {
        ensure_sufficient_stack(|| self.eval_inner(id))
    }

    fn eval_inner(&mut self, id: ExprId) -> EvalResult {
        let span = self.arena().span(id);
        // Node kinds hold only ids, ranges and interned names; cloning out
        // releases the arena borrow for the recursive calls below.
        let kind = self.arena().kind(id).clone();
        match kind {
            ExprKind::Int(n) => Ok(Value::Int(n)),
            ExprKind::Float(bits) => Ok(Value::Float(f64::from_bits(bits))),
            ExprKind::Str(name) => Ok(Value::str(self.interner().lookup(name))),
            ExprKind::Bool(b) => Ok(Value::Bool(b)),
            ExprKind::Nil => Ok(Value::Nil),
            ExprKind::Ident { name, key } => self.eval_ident(name, key, span),
            ExprKind::Field { base, name, key } => {
                let base_value = self.eval(base)?;
                match self.member_read(&base_value, name, key, span)? {
                    Some(value) => Ok(value),
                    None => Err(errors::undefined_field(
                        self.interner().lookup(name),
                        &self.describe_value_type(&base_value),
                    )
                    .with_span(span)),
                }
            }
            ExprKind::Index { base, index } => {
                let base_value = self.eval_forced(base, span)?;
                let index_value = self.eval_forced(index, span)?;
                self.index_read(&base_value, &index_value, span)
            }
            ExprKind::Call {
                receiver,
                name,
                key,
                args,
            } => self.eval_call_expr(receiver, name, key, args, span),
            ExprKind::Inherited { name, args } => self.eval_inherited(name, args, span),
            ExprKind::Binary { op, lhs, rhs } => self.eval_binary(op, lhs, rhs, span),
            ExprKind::Unary { op, operand } => self.eval_unary(op, operand, span),
            ExprKind::Assign { target, value } => {
                let v = self.eval_forced(value, span)?;
                self.assign_to(target, v, span)?;
                Ok(Value::Nil)
            }
            ExprKind::Block(range) => {
                for child in self.arena().list(range).to_vec() {
                    self.eval(child)?;
                }
                Ok(Value::Nil)
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let test = self.eval_forced(cond, span)?;
                let test = self.expect_bool(&test, span)?;
                if test {
                    self.eval(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.eval(else_branch)
                } else {
                    Ok(Value::Nil)
                }
            }
            ExprKind::While { cond, body } => {
                loop {
                    let test = self.eval_forced(cond, span)?;
                    if !self.expect_bool(&test, span)? {
                        break;
                    }
                    self.eval(body)?;
                }
                Ok(Value::Nil)
            }
            ExprKind::Raise { value } => {
                let payload = self.eval_forced(value, span)?;
                let class = self.describe_value_type(&payload);
                Err(errors::user_exception(&class, payload)
                    .with_span(span)
                    .with_backtrace(self.call_stack.capture()))
            }
            ExprKind::Try {
                body,
                handlers,
                finally,
            } => {
                let mut outcome = self.eval(body);
                if let Err(err) = outcome {
                    if handlers.len > 0 {
                        outcome = self.run_handlers(err, handlers);
                    } else {
                        outcome = Err(err);
                    }
                }
                if let Some(finally) = finally {
                    // The cleanup block runs on every exit path; an error it
                    // raises replaces the in-flight one.
                    self.eval(finally)?;
                }
                outcome
            }
            ExprKind::ArrayLit(range) => {
                let ids = self.arena().list(range).to_vec();
                let mut items = Vec::with_capacity(ids.len());
                for child in ids {
                    let v = self.eval_forced(child, span)?;
                    items.push(v);
                }
                Ok(Value::array(items))
            }
        }
    }

    fn eval_ident(&mut self, name: Name, key: Name, span: Span) -> EvalResult {
        if let Some(value) = self.env.lookup(key) {
            return self.force(value, span);
        }
        // Inside a method body, bare identifiers reach the receiver's
        // fields, properties, constants and class vars without `Self.`.
        if let Some(receiver) = self.current_self.clone() {
            if let Some(value) = self.member_read(&receiver, name, key, span)? {
                return Ok(value);
            }
        }
        if let Some(cid) = self.registry.lookup_class(key) {
            return Ok(Value::ClassRef(cid));
        }
        Err(errors::undefined_variable(self.interner().lookup(name)).with_span(span))
    }

    /// Evaluate and look through cells/thunks in one step.
    pub(crate) fn eval_forced(&mut self, id: ExprId, span: Span) -> EvalResult {
        let value = self.eval(id)?;
        self.force(value, span)
    }

    /// Look through aliasing cells and force lazy thunks.
    pub(crate) fn force(&mut self, value: Value, span: Span) -> EvalResult {
        match value {
            Value::VarRef(cell) => {
                let inner = cell.get_clone();
                self.force(inner, span)
            }
            Value::Thunk(state) => self.force_thunk(&state),
            other => Ok(other),
        }
    }

    fn force_thunk(&mut self, state: &Shared<ThunkState>) -> EvalResult {
        let (expr, env) = {
            let s = state.borrow();
            if let Some(value) = &s.forced {
                return Ok(value.clone());
            }
            (s.expr, s.env.clone())
        };
        let mut swapped = self.with_env(env);
        let value = swapped.eval(expr)?;
        drop(swapped);
        state.borrow_mut().forced = Some(value.clone());
        Ok(value)
    }

    fn expect_bool(&self, value: &Value, span: Span) -> Result<bool, EvalError> {
        value.as_bool().ok_or_else(|| {
            errors::type_mismatch("boolean", &self.describe_value_type(value)).with_span(span)
        })
    }

    /// Resolve `base.key` to a value. `Ok(None)` means the receiver has no
    /// such member; callers render the error with their own context.
    pub(crate) fn member_read(
        &mut self,
        base: &Value,
        name: Name,
        key: Name,
        span: Span,
    ) -> Result<Option<Value>, EvalError> {
        match base {
            Value::Object(obj) => {
                let class = {
                    let instance = obj.borrow();
                    if instance.destroyed {
                        return Err(
                            errors::destroyed_instance(self.interner().lookup(name)).with_span(span)
                        );
                    }
                    instance.class
                };
                if key == self.names.classname {
                    let class_name = self.interner().lookup(self.registry.class(class).name);
                    return Ok(Some(Value::str(class_name)));
                }
                if key == self.names.classtype {
                    return Ok(Some(Value::ClassRef(class)));
                }
                if let Some(field) = obj.borrow().fields.get(&key).cloned() {
                    return Ok(Some(self.force(field, span)?));
                }
                if let Some(prop) = self.registry.find_property(class, key) {
                    return self.property_read(base, &prop, span).map(Some);
                }
                if let Some(result) = self.class_constant(class, key) {
                    return result.map(Some);
                }
                if let Some(cell) = self.registry.find_class_var(class, key) {
                    return Ok(Some(cell.get_clone()));
                }
                Ok(None)
            }
            Value::ClassRef(cid) => {
                if key == self.names.classname {
                    let class_name = self.interner().lookup(self.registry.class(*cid).name);
                    return Ok(Some(Value::str(class_name)));
                }
                if key == self.names.classtype {
                    return Ok(Some(Value::ClassRef(*cid)));
                }
                if let Some(result) = self.class_constant(*cid, key) {
                    return result.map(Some);
                }
                if let Some(cell) = self.registry.find_class_var(*cid, key) {
                    return Ok(Some(cell.get_clone()));
                }
                Ok(None)
            }
            Value::Record(rec) => Ok(rec.fields.get(&key).cloned()),
            Value::Interface(iv) => match &iv.object {
                Some(obj) => {
                    let as_object = Value::Object(obj.clone());
                    self.member_read(&as_object, name, key, span)
                }
                None => Err(errors::nil_receiver(self.interner().lookup(name)).with_span(span)),
            },
            Value::VarRef(cell) => {
                let inner = cell.get_clone();
                self.member_read(&inner, name, key, span)
            }
            Value::Nil => Err(errors::nil_receiver(self.interner().lookup(name)).with_span(span)),
            _ => Ok(None),
        }
    }

    fn property_read(
        &mut self,
        receiver: &Value,
        prop: &crate::registry::PropertyInfo,
        span: Span,
    ) -> EvalResult {
        match &prop.read {
            crate::registry::PropAccess::Field(field_key) => {
                match self.member_read(receiver, prop.name, *field_key, span)? {
                    Some(value) => Ok(value),
                    None => Err(errors::undefined_field(
                        self.interner().lookup(prop.name),
                        &self.describe_value_type(receiver),
                    )
                    .with_span(span)),
                }
            }
            crate::registry::PropAccess::Method(method_key) => {
                self.call_method_with_values(receiver.clone(), *method_key, &[], span)
            }
            crate::registry::PropAccess::None => Err(errors::undefined_field(
                self.interner().lookup(prop.name),
                &self.describe_value_type(receiver),
            )
            .with_span(span)),
        }
    }

    fn index_read(&self, base: &Value, index: &Value, span: Span) -> EvalResult {
        let Value::Array(items) = base else {
            return Err(
                errors::type_mismatch("array", &self.describe_value_type(base)).with_span(span)
            );
        };
        let Some(i) = index.as_int() else {
            return Err(
                errors::type_mismatch("integer", &self.describe_value_type(index)).with_span(span)
            );
        };
        let items = items.borrow();
        usize::try_from(i)
            .ok()
            .and_then(|i| items.get(i).cloned())
            .ok_or_else(|| errors::index_out_of_bounds(i, items.len()).with_span(span))
    }

    fn assign_to(&mut self, target: ExprId, value: Value, span: Span) -> Result<(), EvalError> {
        let kind = self.arena().kind(target).clone();
        match kind {
            ExprKind::Ident { name, key } => match self.env.assign(key, value.clone()) {
                Ok(()) => Ok(()),
                Err(AssignError::Immutable) => {
                    Err(errors::constant_assignment(self.interner().lookup(name)).with_span(span))
                }
                Err(AssignError::Undefined) => {
                    // Field assignment without `Self.` inside a method body.
                    if let Some(receiver) = self.current_self.clone() {
                        if self.member_write(&receiver, name, key, value.clone(), span)? {
                            return Ok(());
                        }
                    }
                    self.env.define(key, value, Mutability::Mutable);
                    Ok(())
                }
            },
            ExprKind::Field { base, name, key } => {
                let base_value = self.eval(base)?;
                match &base_value {
                    Value::Record(_) => {
                        // Records are values: mutate through the place, not
                        // the copy `eval` returned.
                        let Some(cell) = self.lvalue_cell(base, span)? else {
                            return Err(errors::invalid_assignment_target().with_span(span));
                        };
                        let mut slot = cell.borrow_mut();
                        let Value::Record(rec) = &mut *slot else {
                            return Err(errors::invalid_assignment_target().with_span(span));
                        };
                        rec.fields.insert(key, value);
                        Ok(())
                    }
                    _ => {
                        if self.member_write(&base_value, name, key, value, span)? {
                            Ok(())
                        } else {
                            Err(errors::undefined_field(
                                self.interner().lookup(name),
                                &self.describe_value_type(&base_value),
                            )
                            .with_span(span))
                        }
                    }
                }
            }
            ExprKind::Index { base, index } => {
                let base_value = self.eval_forced(base, span)?;
                let index_value = self.eval_forced(index, span)?;
                let Value::Array(items) = &base_value else {
                    return Err(errors::type_mismatch("array", &self.describe_value_type(&base_value))
                        .with_span(span));
                };
                let Some(i) = index_value.as_int() else {
                    return Err(errors::type_mismatch(
                        "integer",
                        &self.describe_value_type(&index_value),
                    )
                    .with_span(span));
                };
                let mut items = items.borrow_mut();
                let len = items.len();
                match usize::try_from(i).ok().filter(|i| *i < len) {
                    Some(i) => {
                        items[i] = value;
                        Ok(())
                    }
                    None => Err(errors::index_out_of_bounds(i, len).with_span(span)),
                }
            }
            _ => Err(errors::invalid_assignment_target().with_span(span)),
        }
    }

    /// Write `value` to `base.key`. Returns `false` when the receiver has
    /// no such member.
    fn member_write(
        &mut self,
        base: &Value,
        name: Name,
        key: Name,
        value: Value,
        span: Span,
    ) -> Result<bool, EvalError> {
        match base {
            Value::Object(obj) => {
                let class = {
                    let instance = obj.borrow();
                    if instance.destroyed {
                        return Err(
                            errors::destroyed_instance(self.interner().lookup(name)).with_span(span)
                        );
                    }
                    instance.class
                };
                {
                    let mut instance = obj.borrow_mut();
                    if let Some(slot) = instance.fields.get_mut(&key) {
                        if let Value::VarRef(cell) = slot {
                            let cell = cell.clone();
                            drop(instance);
                            *cell.borrow_mut() = value;
                        } else {
                            *slot = value;
                        }
                        return Ok(true);
                    }
                }
                if let Some(prop) = self.registry.find_property(class, key) {
                    return match &prop.write {
                        crate::registry::PropAccess::Field(field_key) => {
                            self.member_write(base, prop.name, *field_key, value, span)
                        }
                        crate::registry::PropAccess::Method(method_key) => {
                            self.call_method_with_values(
                                base.clone(),
                                *method_key,
                                &[value],
                                span,
                            )?;
                            Ok(true)
                        }
                        crate::registry::PropAccess::None => {
                            Err(errors::constant_assignment(self.interner().lookup(prop.name))
                                .with_span(span))
                        }
                    };
                }
                if let Some(cell) = self.registry.find_class_var(class, key) {
                    *cell.borrow_mut() = value;
                    return Ok(true);
                }
                Ok(false)
            }
            Value::ClassRef(cid) => {
                if let Some(cell) = self.registry.find_class_var(*cid, key) {
                    *cell.borrow_mut() = value;
                    return Ok(true);
                }
                if self.registry.find_constant(*cid, key).is_some() {
                    return Err(
                        errors::constant_assignment(self.interner().lookup(name)).with_span(span)
                    );
                }
                Ok(false)
            }
            Value::Interface(iv) => match &iv.object {
                Some(obj) => {
                    let as_object = Value::Object(obj.clone());
                    self.member_write(&as_object, name, key, value, span)
                }
                None => Err(errors::nil_receiver(self.interner().lookup(name)).with_span(span)),
            },
            Value::VarRef(cell) => {
                // Value types mutate in place inside their cell; reference
                // types dispatch on the aliased value.
                {
                    let mut inner = cell.borrow_mut();
                    if let Value::Record(rec) = &mut *inner {
                        if rec.fields.contains_key(&key) {
                            rec.fields.insert(key, value);
                            return Ok(true);
                        }
                        return Ok(false);
                    }
                }
                let inner = cell.get_clone();
                self.member_write(&inner, name, key, value, span)
            }
            Value::Nil => Err(errors::nil_receiver(self.interner().lookup(name)).with_span(span)),
            _ => Ok(false),
        }
    }

    /// The aliasing cell behind an lvalue expression, for `var` parameters
    /// and record-in-place mutation. Identifiers promote their binding;
    /// object fields promote in the instance. Other shapes have no cell.
    pub(crate) fn lvalue_cell(
        &mut self,
        expr: ExprId,
        span: Span,
    ) -> Result<Option<Shared<Value>>, EvalError> {
        let kind = self.arena().kind(expr).clone();
        match kind {
            ExprKind::Ident { key, .. } => {
                if let Some(cell) = self.env.cell(key) {
                    return Ok(Some(cell));
                }
                // Out-parameter style: materialize the variable on first use.
                self.env.define(key, Value::Nil, Mutability::Mutable);
                Ok(self.env.cell(key))
            }
            ExprKind::Field { base, name, key } => {
                let base_value = self.eval_forced(base, span)?;
                let Value::Object(obj) = &base_value else {
                    return Ok(None);
                };
                let mut instance = obj.borrow_mut();
                if instance.destroyed {
                    return Err(
                        errors::destroyed_instance(self.interner().lookup(name)).with_span(span)
                    );
                }
                let Some(slot) = instance.fields.get_mut(&key) else {
                    return Ok(None);
                };
                if let Value::VarRef(cell) = slot {
                    return Ok(Some(cell.clone()));
                }
                let cell = Shared::new(std::mem::replace(slot, Value::Nil));
                *slot = Value::VarRef(cell.clone());
                Ok(Some(cell))
            }
            _ => Ok(None),
        }
    }

    fn run_handlers(
        &mut self,
        err: EvalError,
        handlers: lapis_ir::HandlerRange,
    ) -> EvalResult {
        let handlers = self.arena().handler_list(handlers).to_vec();
        for handler in handlers {
            let matches = match handler.class_key {
                None => true,
                Some(class_key) => self.exception_matches(&err, class_key),
            };
            if !matches {
                continue;
            }
            let bound = err
                .exception
                .clone()
                .unwrap_or_else(|| Value::str(&err.message));
            let mut scope = self.scoped();
            if let Some(var_key) = handler.var_key {
                scope.env.define(var_key, bound, Mutability::Mutable);
            }
            return scope.eval(handler.body);
        }
        Err(err)
    }

    /// Hierarchy-aware `on E: TClass` test against the raised payload.
    fn exception_matches(&self, err: &EvalError, class_key: Name) -> bool {
        let Some(Value::Object(obj)) = &err.exception else {
            return false;
        };
        let Some(wanted) = self.registry.lookup_class(class_key) else {
            return false;
        };
        self.registry.is_subclass_of(obj.borrow().class, wanted)
    }

    fn eval_binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId, span: Span) -> EvalResult {
        let left = self.eval_forced(lhs, span)?;

        // Short-circuit boolean forms before touching the right operand.
        if let Value::Bool(b) = left {
            match op {
                BinaryOp::And if !b => return Ok(Value::Bool(false)),
                BinaryOp::Or if b => return Ok(Value::Bool(true)),
                _ => {}
            }
        }

        let right = self.eval_forced(rhs, span)?;

        if is_user_operand(&left) || is_user_operand(&right) {
            if let Some(value) =
                self.apply_operator(OperatorKind::Binary(op), &[left.clone(), right.clone()], span)?
            {
                return Ok(value);
            }
        }

        self.builtin_binary(op, left, right, span)
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: ExprId, span: Span) -> EvalResult {
        let value = self.eval_forced(operand, span)?;

        if is_user_operand(&value) {
            if let Some(result) =
                self.apply_operator(OperatorKind::Unary(op), &[value.clone()], span)?
            {
                return Ok(result);
            }
        }

        match (op, &value) {
            (UnaryOp::Neg, Value::Int(n)) => match n.checked_neg() {
                Some(v) => Ok(Value::Int(v)),
                None => Err(errors::integer_overflow(op.as_symbol()).with_span(span)),
            },
            (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
            (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (UnaryOp::Neg, _) => Err(errors::type_mismatch(
                "number",
                &self.describe_value_type(&value),
            )
            .with_span(span)),
            (UnaryOp::Not, _) => Err(errors::type_mismatch(
                "boolean",
                &self.describe_value_type(&value),
            )
            .with_span(span)),
        }
    }

    fn builtin_binary(
        &mut self,
        op: BinaryOp,
        left: Value,
        right: Value,
        span: Span,
    ) -> EvalResult {
        use BinaryOp::*;
        match op {
            Add => match (&left, &right) {
                (Value::Str(_), _) | (_, Value::Str(_)) => {
                    Ok(Value::str(format!("{left}{right}")))
                }
                _ => self.numeric_binary(op, &left, &right, span),
            },
            Sub | Mul => self.numeric_binary(op, &left, &right, span),
            Div => {
                let (a, b) = self.numeric_operands(&left, &right, span)?;
                if b == 0.0 {
                    return Err(errors::division_by_zero().with_span(span));
                }
                Ok(Value::Float(a / b))
            }
            IntDiv | Mod => {
                let (Some(a), Some(b)) = (left.as_int(), right.as_int()) else {
                    return Err(errors::type_mismatch(
                        "integer",
                        &self.describe_value_type(if left.as_int().is_none() {
                            &left
                        } else {
                            &right
                        }),
                    )
                    .with_span(span));
                };
                if b == 0 {
                    return Err(errors::division_by_zero().with_span(span));
                }
                let result = if op == IntDiv {
                    a.checked_div(b)
                } else {
                    a.checked_rem(b)
                };
                match result {
                    Some(v) => Ok(Value::Int(v)),
                    // i64::MIN div -1 is the one remaining way out of range.
                    None => Err(errors::integer_overflow(op.as_symbol()).with_span(span)),
                }
            }
            Eq => Ok(Value::Bool(left == right)),
            NotEq => Ok(Value::Bool(left != right)),
            Lt | LtEq | Gt | GtEq => self.compare(op, &left, &right, span),
            And | Or | Xor => {
                let (Some(a), Some(b)) = (left.as_bool(), right.as_bool()) else {
                    return Err(errors::type_mismatch(
                        "boolean",
                        &self.describe_value_type(if left.as_bool().is_none() {
                            &left
                        } else {
                            &right
                        }),
                    )
                    .with_span(span));
                };
                Ok(Value::Bool(match op {
                    And => a && b,
                    Or => a || b,
                    _ => a != b,
                }))
            }
        }
    }

    fn numeric_binary(
        &self,
        op: BinaryOp,
        left: &Value,
        right: &Value,
        span: Span,
    ) -> EvalResult {
        if let (Value::Int(a), Value::Int(b)) = (left, right) {
            let result = match op {
                BinaryOp::Add => a.checked_add(*b),
                BinaryOp::Sub => a.checked_sub(*b),
                _ => a.checked_mul(*b),
            };
            return match result {
                Some(v) => Ok(Value::Int(v)),
                None => Err(errors::integer_overflow(op.as_symbol()).with_span(span)),
            };
        }
        let (a, b) = self.numeric_operands(left, right, span)?;
        Ok(Value::Float(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            _ => a * b,
        }))
    }

    fn numeric_operands(
        &self,
        left: &Value,
        right: &Value,
        span: Span,
    ) -> Result<(f64, f64), EvalError> {
        match (left.as_float(), right.as_float()) {
            (Some(a), Some(b)) => Ok((a, b)),
            (None, _) => Err(errors::type_mismatch("number", &self.describe_value_type(left))
                .with_span(span)),
            (_, None) => Err(errors::type_mismatch("number", &self.describe_value_type(right))
                .with_span(span)),
        }
    }

    fn compare(&self, op: BinaryOp, left: &Value, right: &Value, span: Span) -> EvalResult {
        let ordering = match (left, right) {
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            _ => {
                let (a, b) = self.numeric_operands(left, right, span)?;
                a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
            }
        };
        Ok(Value::Bool(match op {
            BinaryOp::Lt => ordering.is_lt(),
            BinaryOp::LtEq => ordering.is_le(),
            BinaryOp::Gt => ordering.is_gt(),
            _ => ordering.is_ge(),
        }))
    }
}

/// Operands that can carry user-defined operator overloads.
fn is_user_operand(value: &Value) -> bool {
    matches!(
        value,
        Value::Object(_) | Value::Record(_) | Value::Interface(_) | Value::Enum { .. }
    )
}
