//! Shared builders for evaluator tests.
//!
//! Tests assemble little programs directly against the IR: an [`Ast`] owns
//! the interner and arena, expression helpers allocate nodes, and the
//! declaration helpers produce [`MethodDecl`]s ready for registration. The
//! interpreter is then built over the finished arena.

use lapis_ir::{
    Binding, BinaryOp, ExceptHandler, ExprArena, ExprId, ExprKind, HandlerRange, MethodDecl,
    MethodKind, Param, Span, StringInterner, TypeSpec, UnaryOp,
};

pub(crate) struct Ast {
    pub interner: StringInterner,
    pub arena: ExprArena,
}

impl Ast {
    pub fn new() -> Self {
        Ast {
            interner: StringInterner::new(),
            arena: ExprArena::new(),
        }
    }

    // --- expressions ---

    pub fn int(&mut self, v: i64) -> ExprId {
        self.arena.alloc(ExprKind::Int(v), Span::DUMMY)
    }

    pub fn string(&mut self, s: &str) -> ExprId {
        let name = self.interner.intern(s);
        self.arena.alloc(ExprKind::Str(name), Span::DUMMY)
    }

    pub fn boolean(&mut self, v: bool) -> ExprId {
        self.arena.alloc(ExprKind::Bool(v), Span::DUMMY)
    }

    pub fn ident(&mut self, name: &str) -> ExprId {
        let kind = ExprKind::Ident {
            name: self.interner.intern(name),
            key: self.interner.intern_ci(name),
        };
        self.arena.alloc(kind, Span::DUMMY)
    }

    pub fn field(&mut self, base: ExprId, name: &str) -> ExprId {
        let kind = ExprKind::Field {
            base,
            name: self.interner.intern(name),
            key: self.interner.intern_ci(name),
        };
        self.arena.alloc(kind, Span::DUMMY)
    }

    /// `receiver.Name(args)`, or a bare `Name(args)` when `receiver` is
    /// `None`.
    pub fn call(&mut self, receiver: Option<ExprId>, name: &str, args: &[ExprId]) -> ExprId {
        let range = self.arena.alloc_list(args);
        let kind = ExprKind::Call {
            receiver,
            name: self.interner.intern(name),
            key: self.interner.intern_ci(name),
            args: range,
        };
        self.arena.alloc(kind, Span::DUMMY)
    }

    /// `Recv.Name(args)` with an identifier receiver.
    pub fn method_call(&mut self, recv: &str, name: &str, args: &[ExprId]) -> ExprId {
        let recv = self.ident(recv);
        self.call(Some(recv), name, args)
    }

    /// `inherited` / `inherited Name(args)`.
    pub fn inherited(&mut self, name: Option<&str>, args: &[ExprId]) -> ExprId {
        let range = self.arena.alloc_list(args);
        let kind = ExprKind::Inherited {
            name: name.map(|n| (self.interner.intern(n), self.interner.intern_ci(n))),
            args: range,
        };
        self.arena.alloc(kind, Span::DUMMY)
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.arena
            .alloc(ExprKind::Binary { op, lhs, rhs }, Span::DUMMY)
    }

    pub fn unary(&mut self, op: UnaryOp, operand: ExprId) -> ExprId {
        self.arena.alloc(ExprKind::Unary { op, operand }, Span::DUMMY)
    }

    pub fn assign(&mut self, target: ExprId, value: ExprId) -> ExprId {
        self.arena
            .alloc(ExprKind::Assign { target, value }, Span::DUMMY)
    }

    /// `name := value`.
    pub fn set(&mut self, name: &str, value: ExprId) -> ExprId {
        let target = self.ident(name);
        self.assign(target, value)
    }

    /// `Result := value`.
    pub fn set_result(&mut self, value: ExprId) -> ExprId {
        self.set("Result", value)
    }

    pub fn block(&mut self, stmts: &[ExprId]) -> ExprId {
        let range = self.arena.alloc_list(stmts);
        self.arena.alloc(ExprKind::Block(range), Span::DUMMY)
    }

    pub fn if_else(&mut self, cond: ExprId, then_branch: ExprId, else_branch: ExprId) -> ExprId {
        self.arena.alloc(
            ExprKind::If {
                cond,
                then_branch,
                else_branch: Some(else_branch),
            },
            Span::DUMMY,
        )
    }

    pub fn while_loop(&mut self, cond: ExprId, body: ExprId) -> ExprId {
        self.arena.alloc(ExprKind::While { cond, body }, Span::DUMMY)
    }

    pub fn raise(&mut self, value: ExprId) -> ExprId {
        self.arena.alloc(ExprKind::Raise { value }, Span::DUMMY)
    }

    pub fn try_except(
        &mut self,
        body: ExprId,
        handlers: Vec<ExceptHandler>,
        finally: Option<ExprId>,
    ) -> ExprId {
        let handlers = self.arena.alloc_handlers(handlers);
        self.arena.alloc(
            ExprKind::Try {
                body,
                handlers,
                finally,
            },
            Span::DUMMY,
        )
    }

    pub fn try_finally(&mut self, body: ExprId, finally: ExprId) -> ExprId {
        let handlers = HandlerRange::default();
        self.arena.alloc(
            ExprKind::Try {
                body,
                handlers,
                finally: Some(finally),
            },
            Span::DUMMY,
        )
    }

    /// `on var: Class do body` arm; `class` of `None` is a catch-all.
    pub fn handler(&mut self, class: Option<&str>, var: Option<&str>, body: ExprId) -> ExceptHandler {
        ExceptHandler {
            class_key: class.map(|c| self.interner.intern_ci(c)),
            var_key: var.map(|v| self.interner.intern_ci(v)),
            body,
        }
    }

    pub fn array_lit(&mut self, items: &[ExprId]) -> ExprId {
        let range = self.arena.alloc_list(items);
        self.arena.alloc(ExprKind::ArrayLit(range), Span::DUMMY)
    }

    // --- declarations ---

    pub fn named(&self, name: &str) -> TypeSpec {
        TypeSpec::Named(self.interner.intern_ci(name))
    }

    pub fn param(&self, name: &str, ty: TypeSpec) -> Param {
        Param::new(self.interner.intern(name), self.interner.intern_ci(name), ty)
    }

    pub fn var_param(&self, name: &str, ty: TypeSpec) -> Param {
        let mut p = self.param(name, ty);
        p.by_ref = true;
        p
    }

    pub fn lazy_param(&self, name: &str, ty: TypeSpec) -> Param {
        let mut p = self.param(name, ty);
        p.lazy = true;
        p
    }

    pub fn defaulted_param(&self, name: &str, ty: TypeSpec, default: ExprId) -> Param {
        let mut p = self.param(name, ty);
        p.default = Some(default);
        p
    }

    pub fn routine(
        &self,
        name: &str,
        kind: MethodKind,
        binding: Binding,
        params: Vec<Param>,
        return_type: Option<TypeSpec>,
        body: ExprId,
    ) -> MethodDecl {
        MethodDecl {
            name: self.interner.intern(name),
            key: self.interner.intern_ci(name),
            params,
            return_type,
            kind,
            binding,
            is_class_method: false,
            is_overload: false,
            body,
            span: Span::DUMMY,
        }
    }

    pub fn function(
        &self,
        name: &str,
        params: Vec<Param>,
        return_type: TypeSpec,
        body: ExprId,
    ) -> MethodDecl {
        self.routine(
            name,
            MethodKind::Function,
            Binding::Static,
            params,
            Some(return_type),
            body,
        )
    }

    pub fn virtual_function(
        &self,
        name: &str,
        params: Vec<Param>,
        return_type: TypeSpec,
        body: ExprId,
    ) -> MethodDecl {
        self.routine(
            name,
            MethodKind::Function,
            Binding::Virtual,
            params,
            Some(return_type),
            body,
        )
    }

    pub fn override_function(
        &self,
        name: &str,
        params: Vec<Param>,
        return_type: TypeSpec,
        body: ExprId,
    ) -> MethodDecl {
        self.routine(
            name,
            MethodKind::Function,
            Binding::Override,
            params,
            Some(return_type),
            body,
        )
    }

    pub fn procedure(&self, name: &str, params: Vec<Param>, body: ExprId) -> MethodDecl {
        self.routine(name, MethodKind::Procedure, Binding::Static, params, None, body)
    }

    pub fn class_function(
        &self,
        name: &str,
        params: Vec<Param>,
        return_type: TypeSpec,
        body: ExprId,
    ) -> MethodDecl {
        let mut decl = self.function(name, params, return_type, body);
        decl.is_class_method = true;
        decl
    }

    pub fn class_procedure(&self, name: &str, params: Vec<Param>, body: ExprId) -> MethodDecl {
        let mut decl = self.procedure(name, params, body);
        decl.is_class_method = true;
        decl
    }

    pub fn constructor(&self, name: &str, params: Vec<Param>, body: ExprId) -> MethodDecl {
        self.routine(
            name,
            MethodKind::Constructor,
            Binding::Static,
            params,
            None,
            body,
        )
    }

    pub fn destructor(&self, binding: Binding, body: ExprId) -> MethodDecl {
        self.routine("Destroy", MethodKind::Destructor, binding, Vec::new(), None, body)
    }
}
