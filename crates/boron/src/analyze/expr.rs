//! Expression typing.
//!
//! `analyze_expression` decorates each node with `(type, const value)` and,
//! when an expected type is threaded down, records an implicit cast on the
//! node via `resolve_type_compatibility`. An `Invalid` result is absorbing:
//! it silences further diagnostics about the same subexpression.

use num_bigint::BigInt;

use crate::{
    analyze::{ExprInfo, FnId, ReturnKnowledge},
    ast::{BinOp, DeferKind, NodeId, NodeKind, PrefixOp},
    bignum::{BigNum, BigNumError},
    intern::StringId,
    run::Compilation,
    scope::{ScopeId, VarId, Variable},
    types::{TypeId, TypeKind},
    value::{CastOp, ConstPayload, ConstVal},
};

impl Compilation {
    /// Analyzes `node` in `scope`, coercing toward `expected` when given.
    /// Returns the effective type (post-implicit-cast).
    pub fn analyze_expression(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        expected: Option<TypeId>,
    ) -> TypeId {
        // re-analysis is a no-op: the node keeps its decoration and only
        // the expected-type coercion is (re)applied
        let ty = match self.expr_info_opt(node) {
            Some(info) => info.ty,
            None => self.analyze_expr_raw(node, scope, expected),
        };
        match expected {
            Some(expected)
                if !self.types.is_invalid(ty) && !self.types.is_invalid(expected) =>
            {
                self.resolve_type_compatibility(node, expected)
            }
            _ => ty,
        }
    }

    /// Analyzes a type expression: must be a compile-time `type` value.
    pub fn analyze_type_expr(&mut self, node: NodeId, scope: ScopeId) -> TypeId {
        let meta = self.types.builtin.meta_type;
        let ty = self.analyze_expression(node, scope, None);
        if self.types.is_invalid(ty) {
            return self.types.builtin.invalid;
        }
        if self.types.canonical(ty) != meta {
            let name = self.types.name(ty).to_owned();
            self.add_error(node, format!("expected type expression, got '{name}'"));
            return self.types.builtin.invalid;
        }
        match self.expr_const(node).and_then(ConstVal::as_type) {
            Some(target) => target,
            None => {
                self.add_error(node, "unable to evaluate constant expression".to_owned());
                self.types.builtin.invalid
            }
        }
    }

    pub(crate) fn decorate(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        ty: TypeId,
        const_val: Option<ConstVal>,
        variable: Option<VarId>,
    ) -> TypeId {
        self.set_expr_info(
            node,
            ExprInfo {
                ty,
                const_val,
                cast: None,
                variable,
                return_knowledge: ReturnKnowledge::Skip,
                scope,
            },
        );
        ty
    }

    fn decorate_invalid(&mut self, node: NodeId, scope: ScopeId) -> TypeId {
        let invalid = self.types.builtin.invalid;
        self.decorate(node, scope, invalid, None, None)
    }

    fn error_invalid(&mut self, node: NodeId, scope: ScopeId, msg: String) -> TypeId {
        self.add_error(node, msg);
        self.decorate_invalid(node, scope)
    }

    fn analyze_expr_raw(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        expected: Option<TypeId>,
    ) -> TypeId {
        match self.ast.kind(node) {
            NodeKind::IntLit(value) => {
                let value = value.clone();
                let ty = self.types.builtin.num_lit_int;
                self.decorate(
                    node,
                    scope,
                    ty,
                    Some(ConstVal::num(BigNum::Int(BigInt::from(value)))),
                    None,
                )
            }
            NodeKind::FloatLit(value) => {
                let value = *value;
                let ty = self.types.builtin.num_lit_float;
                self.decorate(node, scope, ty, Some(ConstVal::num(BigNum::Float(value))), None)
            }
            NodeKind::BoolLit(value) => {
                let value = *value;
                let ty = self.types.builtin.bool_;
                self.decorate(node, scope, ty, Some(ConstVal::bool_(value)), None)
            }
            NodeKind::CharLit(byte) => {
                let byte = *byte;
                let ty = self.types.builtin.u8_;
                self.decorate(
                    node,
                    scope,
                    ty,
                    Some(ConstVal::num(BigNum::from_u64(u64::from(byte)))),
                    None,
                )
            }
            NodeKind::StrLit(id) => {
                let id = *id;
                let len = self.interner.get(id).len() as u64;
                let u8_ty = self.types.builtin.u8_;
                let ty = self.types.get_array(u8_ty, len);
                self.decorate(node, scope, ty, Some(ConstVal::new(ConstPayload::Str(id))), None)
            }
            NodeKind::NullLit => {
                let Some(expected) = expected else {
                    return self.error_invalid(
                        node,
                        scope,
                        "unable to determine type of null literal".to_owned(),
                    );
                };
                let canonical = self.types.canonical(expected);
                if !matches!(self.types.kind(canonical), TypeKind::Maybe { .. }) {
                    let name = self.types.name(expected).to_owned();
                    return self.error_invalid(
                        node,
                        scope,
                        format!("expected type '{name}', got null literal"),
                    );
                }
                let ty = self.decorate(
                    node,
                    scope,
                    expected,
                    Some(ConstVal::new(ConstPayload::Maybe(None))),
                    None,
                );
                self.expr_info_mut(node).return_knowledge = ReturnKnowledge::KnownNull;
                ty
            }
            NodeKind::UndefinedLit => {
                let ty = expected.unwrap_or(self.types.builtin.undef_lit);
                self.decorate(node, scope, ty, Some(ConstVal::undef()), None)
            }
            NodeKind::Symbol(name) => {
                let name = *name;
                self.analyze_symbol(node, scope, name)
            }
            NodeKind::PrefixOpExpr { op, operand } => {
                let (op, operand) = (*op, *operand);
                self.analyze_prefix_op(node, scope, op, operand, expected)
            }
            NodeKind::BinOpExpr { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                self.analyze_bin_op(node, scope, op, lhs, rhs, expected)
            }
            NodeKind::UnwrapErrExpr {
                target,
                err_name,
                err_span,
                fallback,
            } => {
                let (target, err_name, err_span, fallback) =
                    (*target, *err_name, *err_span, *fallback);
                self.analyze_unwrap_err(node, scope, target, err_name, err_span, fallback)
            }
            NodeKind::Call { callee, args } => {
                let (callee, args) = (*callee, args.clone());
                self.analyze_call(node, scope, callee, &args)
            }
            NodeKind::IntrinsicCall { name, args } => {
                let (name, args) = (*name, args.clone());
                self.analyze_intrinsic(node, scope, name, &args, expected)
            }
            NodeKind::FieldAccess { target, name } => {
                let (target, name) = (*target, *name);
                self.analyze_field_access(node, scope, target, name)
            }
            NodeKind::ArrayAccess { target, index } => {
                let (target, index) = (*target, *index);
                self.analyze_array_access(node, scope, target, index)
            }
            NodeKind::SliceExpr { target, start, end } => {
                let (target, start, end) = (*target, *start, *end);
                self.analyze_slice_expr(node, scope, target, start, end)
            }
            NodeKind::StructInit { ty, fields } => {
                let (ty, fields) = (*ty, fields.clone());
                self.analyze_struct_init(node, scope, ty, &fields)
            }
            NodeKind::ArrayInit { ty, elems } => {
                let (ty, elems) = (*ty, elems.clone());
                self.analyze_array_init(node, scope, ty, &elems)
            }
            NodeKind::ArrayType { size, is_const, elem } => {
                let (size, is_const, elem) = (*size, *is_const, *elem);
                self.analyze_array_type(node, scope, size, is_const, elem)
            }
            NodeKind::PointerType { is_const, child } => {
                let (is_const, child) = (*is_const, *child);
                let child_ty = self.analyze_type_expr(child, scope);
                if self.types.is_invalid(child_ty) {
                    return self.decorate_invalid(node, scope);
                }
                let ptr = self.types.get_pointer(child_ty, is_const);
                let meta = self.types.builtin.meta_type;
                self.decorate(node, scope, meta, Some(ConstVal::type_(ptr)), None)
            }
            NodeKind::PureErrorType => {
                let meta = self.types.builtin.meta_type;
                let err = self.types.builtin.pure_error;
                self.decorate(node, scope, meta, Some(ConstVal::type_(err)), None)
            }
            NodeKind::Block { stmts } => {
                let stmts = stmts.clone();
                self.analyze_block(node, scope, &stmts, expected)
            }
            NodeKind::Return { value } => {
                let value = *value;
                self.analyze_return(node, scope, value)
            }
            NodeKind::Defer { kind, body } => {
                let (kind, body) = (*kind, *body);
                self.analyze_defer(node, scope, kind, body)
            }
            NodeKind::Break => {
                if self.scopes.enclosing_loop(scope).is_none() {
                    return self.error_invalid(node, scope, "'break' outside loop".to_owned());
                }
                let ty = self.types.builtin.unreachable_;
                self.decorate(node, scope, ty, None, None)
            }
            NodeKind::Continue => {
                if self.scopes.enclosing_loop(scope).is_none() {
                    return self.error_invalid(node, scope, "'continue' outside loop".to_owned());
                }
                let ty = self.types.builtin.unreachable_;
                self.decorate(node, scope, ty, None, None)
            }
            NodeKind::If {
                cond,
                then_body,
                else_body,
            } => {
                let (cond, then_body, else_body) = (*cond, *then_body, *else_body);
                self.analyze_if(node, scope, cond, then_body, else_body, expected)
            }
            NodeKind::IfMaybe {
                bind_name,
                expr,
                then_body,
                else_body,
                ..
            } => {
                let (bind_name, expr, then_body, else_body) =
                    (*bind_name, *expr, *then_body, *else_body);
                self.analyze_if_maybe(node, scope, bind_name, expr, then_body, else_body, expected)
            }
            NodeKind::While { cond, body } => {
                let (cond, body) = (*cond, *body);
                self.analyze_while(node, scope, cond, body)
            }
            NodeKind::For {
                elem_name,
                index_name,
                iterable,
                body,
                ..
            } => {
                let (elem_name, index_name, iterable, body) =
                    (*elem_name, *index_name, *iterable, *body);
                self.analyze_for(node, scope, elem_name, index_name, iterable, body)
            }
            NodeKind::Switch { target, prongs } => {
                let (target, prongs) = (*target, prongs.clone());
                self.analyze_switch(node, scope, target, &prongs, expected)
            }
            NodeKind::VarDecl { .. } => self.analyze_local_var_decl(node, scope),
            NodeKind::Asm { .. } => {
                self.error_invalid(node, scope, "inline assembly is not supported".to_owned())
            }
            _ => self.error_invalid(node, scope, "invalid expression".to_owned()),
        }
    }

    // ===== names =====

    fn analyze_symbol(&mut self, node: NodeId, scope: ScopeId, name: StringId) -> TypeId {
        if let Some(var) = self.scopes.find_var(scope, name) {
            let entry = self.scopes.var(var);
            let (ty, decl_node, is_const) = (entry.ty, entry.decl_node, entry.is_const);
            let const_val = if is_const {
                self.decl_const.get(&decl_node).cloned().flatten()
            } else {
                None
            };
            return self.decorate(node, scope, ty, const_val, Some(var));
        }
        if let Some(primitive) = self.primitive_type(name) {
            let meta = self.types.builtin.meta_type;
            return self.decorate(node, scope, meta, Some(ConstVal::type_(primitive)), None);
        }
        if let Some(decl) = self.scopes.find_decl(scope, name) {
            return self.analyze_decl_ref(node, scope, decl);
        }
        let import = self.ast.import_of(node);
        if self.imports.get(import).any_imports_failed {
            // a broken import already produced the real error
            return self.decorate_invalid(node, scope);
        }
        let text = self.interner.get(name).to_owned();
        self.error_invalid(node, scope, format!("use of undeclared identifier '{text}'"))
    }

    /// Types a reference to a resolved (or resolvable) top-level decl.
    pub(crate) fn analyze_decl_ref(&mut self, node: NodeId, scope: ScopeId, decl: NodeId) -> TypeId {
        // container references never force layout: the type entry exists
        // from the scan phase, so pointers to incomplete containers work.
        // Layout is forced by `ensure_container_complete` at use sites.
        if !matches!(
            self.ast.kind(decl),
            NodeKind::StructDecl { .. } | NodeKind::EnumDecl { .. }
        ) {
            self.resolve_top_level_decl(decl);
        }
        match self.ast.kind(decl) {
            NodeKind::VarDecl { .. } => match self.decl_vars.get(&decl) {
                Some(&var) => {
                    let entry = self.scopes.var(var);
                    let (ty, is_const) = (entry.ty, entry.is_const);
                    let const_val = if is_const {
                        self.decl_const.get(&decl).cloned().flatten()
                    } else {
                        None
                    };
                    self.decorate(node, scope, ty, const_val, Some(var))
                }
                None => self.decorate_invalid(node, scope),
            },
            NodeKind::FnDef { proto, .. } | NodeKind::FnDecl { proto } => {
                match self.proto_fns.get(proto) {
                    Some(&fn_id) => {
                        let ty = self.fn_entry(fn_id).fn_type;
                        self.decorate(
                            node,
                            scope,
                            ty,
                            Some(ConstVal::new(ConstPayload::Fn(fn_id))),
                            None,
                        )
                    }
                    None => self.decorate_invalid(node, scope),
                }
            }
            NodeKind::StructDecl { .. } | NodeKind::EnumDecl { .. } | NodeKind::TypeAliasDecl { .. } => {
                match self.decl_types.get(&decl) {
                    Some(&ty) => {
                        let meta = self.types.builtin.meta_type;
                        self.decorate(node, scope, meta, Some(ConstVal::type_(ty)), None)
                    }
                    None => self.decorate_invalid(node, scope),
                }
            }
            NodeKind::ErrorValueDecl { .. } => match self.decl_const.get(&decl).cloned().flatten() {
                Some(value) => {
                    let ty = self.types.builtin.pure_error;
                    self.decorate(node, scope, ty, Some(value), None)
                }
                None => self.decorate_invalid(node, scope),
            },
            _ => self.decorate_invalid(node, scope),
        }
    }

    // ===== prefix and binary operators =====

    fn analyze_prefix_op(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        op: PrefixOp,
        operand: NodeId,
        expected: Option<TypeId>,
    ) -> TypeId {
        match op {
            PrefixOp::Negation => {
                let ty = self.analyze_expression(operand, scope, expected);
                if self.types.is_invalid(ty) {
                    return self.decorate_invalid(node, scope);
                }
                let canonical = self.types.canonical(ty);
                let allowed = matches!(
                    self.types.kind(canonical),
                    TypeKind::Int { is_signed: true, .. }
                        | TypeKind::Float { .. }
                        | TypeKind::NumLitInt
                        | TypeKind::NumLitFloat
                );
                if !allowed {
                    let name = self.types.name(ty).to_owned();
                    return self.error_invalid(node, scope, format!("invalid negation type: '{name}'"));
                }
                let const_val = self.expr_const(operand).map(|v| {
                    let mut out = match v.as_num() {
                        Some(num) => ConstVal::num(num.negate()),
                        None => ConstVal::undef(),
                    };
                    out.depends_on_compile_var = v.depends_on_compile_var;
                    out
                });
                self.decorate(node, scope, ty, const_val, None)
            }
            PrefixOp::BoolNot => {
                let bool_ty = self.types.builtin.bool_;
                let ty = self.analyze_expression(operand, scope, Some(bool_ty));
                if self.types.is_invalid(ty) {
                    return self.decorate_invalid(node, scope);
                }
                let const_val = self
                    .expr_const(operand)
                    .and_then(|v| v.as_bool().map(|b| (ConstVal::bool_(!b), v.depends_on_compile_var)))
                    .map(|(mut out, dep)| {
                        out.depends_on_compile_var = dep;
                        out
                    });
                self.decorate(node, scope, bool_ty, const_val, None)
            }
            PrefixOp::BinNot => {
                let ty = self.analyze_expression(operand, scope, expected);
                if self.types.is_invalid(ty) {
                    return self.decorate_invalid(node, scope);
                }
                let canonical = self.types.canonical(ty);
                let TypeKind::Int { is_signed, bits } = *self.types.kind(canonical) else {
                    let name = self.types.name(ty).to_owned();
                    return self.error_invalid(
                        node,
                        scope,
                        format!("unable to perform binary not on type '{name}'"),
                    );
                };
                let const_val = self.expr_const(operand).and_then(|v| {
                    let dep = v.depends_on_compile_var;
                    v.as_num().and_then(|n| n.bit_not(bits, is_signed)).map(|n| {
                        let mut out = ConstVal::num(n);
                        out.depends_on_compile_var = dep;
                        out
                    })
                });
                self.decorate(node, scope, ty, const_val, None)
            }
            PrefixOp::AddressOf { is_const } => {
                let operand_ty = self.analyze_expression(operand, scope, None);
                if self.types.is_invalid(operand_ty) {
                    return self.decorate_invalid(node, scope);
                }
                // `&T` over a type yields the pointer type as a value
                if self.types.canonical(operand_ty) == self.types.builtin.meta_type {
                    let Some(inner) = self.expr_const(operand).and_then(ConstVal::as_type) else {
                        return self.decorate_invalid(node, scope);
                    };
                    let ptr = self.types.get_pointer(inner, is_const);
                    let meta = self.types.builtin.meta_type;
                    return self.decorate(node, scope, meta, Some(ConstVal::type_(ptr)), None);
                }
                if !self.is_lvalue(operand) {
                    return self.error_invalid(
                        node,
                        scope,
                        "expected an addressable value".to_owned(),
                    );
                }
                let ptr = self.types.get_pointer(operand_ty, is_const);
                self.decorate(node, scope, ptr, None, None)
            }
            PrefixOp::Dereference => {
                let operand_ty = self.analyze_expression(operand, scope, None);
                if self.types.is_invalid(operand_ty) {
                    return self.decorate_invalid(node, scope);
                }
                let canonical = self.types.canonical(operand_ty);
                let TypeKind::Pointer { child, .. } = *self.types.kind(canonical) else {
                    let name = self.types.name(operand_ty).to_owned();
                    return self.error_invalid(
                        node,
                        scope,
                        format!("indirection requires pointer operand ('{name}' invalid)"),
                    );
                };
                self.decorate(node, scope, child, None, None)
            }
            PrefixOp::MaybeType => {
                let child = self.analyze_type_expr(operand, scope);
                if self.types.is_invalid(child) {
                    return self.decorate_invalid(node, scope);
                }
                let ty = self.types.get_maybe(child);
                let meta = self.types.builtin.meta_type;
                self.decorate(node, scope, meta, Some(ConstVal::type_(ty)), None)
            }
            PrefixOp::ErrorUnionType => {
                let child = self.analyze_type_expr(operand, scope);
                if self.types.is_invalid(child) {
                    return self.decorate_invalid(node, scope);
                }
                let ty = self.types.get_error_union(child);
                let meta = self.types.builtin.meta_type;
                self.decorate(node, scope, meta, Some(ConstVal::type_(ty)), None)
            }
            PrefixOp::UnwrapError => {
                let operand_ty = self.analyze_expression(operand, scope, None);
                if self.types.is_invalid(operand_ty) {
                    return self.decorate_invalid(node, scope);
                }
                let canonical = self.types.canonical(operand_ty);
                let TypeKind::ErrorUnion { child } = *self.types.kind(canonical) else {
                    let name = self.types.name(operand_ty).to_owned();
                    return self.error_invalid(
                        node,
                        scope,
                        format!("expected error union type, got '{name}'"),
                    );
                };
                let const_val = self.expr_const(operand).cloned().and_then(|v| match v.payload {
                    ConstPayload::Err { tag: 0, payload } => payload.map(|p| *p),
                    _ => None,
                });
                self.decorate(node, scope, child, const_val, None)
            }
            PrefixOp::UnwrapMaybe => {
                let operand_ty = self.analyze_expression(operand, scope, None);
                if self.types.is_invalid(operand_ty) {
                    return self.decorate_invalid(node, scope);
                }
                let canonical = self.types.canonical(operand_ty);
                let TypeKind::Maybe { child } = *self.types.kind(canonical) else {
                    let name = self.types.name(operand_ty).to_owned();
                    return self.error_invalid(node, scope, format!("expected maybe type, got '{name}'"));
                };
                let const_val = self.expr_const(operand).cloned().and_then(|v| match v.payload {
                    ConstPayload::Maybe(Some(inner)) => Some(*inner),
                    _ => None,
                });
                self.decorate(node, scope, child, const_val, None)
            }
        }
    }

    fn analyze_bin_op(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
        expected: Option<TypeId>,
    ) -> TypeId {
        if op.is_assignment() {
            return self.analyze_assignment(node, scope, op, lhs, rhs);
        }
        match op {
            BinOp::BoolOr | BinOp::BoolAnd => {
                let bool_ty = self.types.builtin.bool_;
                let lhs_ty = self.analyze_expression(lhs, scope, Some(bool_ty));
                let rhs_ty = self.analyze_expression(rhs, scope, Some(bool_ty));
                if self.types.is_invalid(lhs_ty) || self.types.is_invalid(rhs_ty) {
                    return self.decorate_invalid(node, scope);
                }
                let const_val = match (self.expr_const(lhs), self.expr_const(rhs)) {
                    (Some(a), Some(b)) => match (a.as_bool(), b.as_bool()) {
                        (Some(a_val), Some(b_val)) => {
                            let result = if op == BinOp::BoolOr {
                                a_val || b_val
                            } else {
                                a_val && b_val
                            };
                            Some(ConstVal::bool_(result).inherit_compile_var([a, b]))
                        }
                        _ => None,
                    },
                    _ => None,
                };
                self.decorate(node, scope, bool_ty, const_val, None)
            }
            BinOp::CmpEq
            | BinOp::CmpNotEq
            | BinOp::CmpLessThan
            | BinOp::CmpGreaterThan
            | BinOp::CmpLessOrEq
            | BinOp::CmpGreaterOrEq => self.analyze_comparison(node, scope, op, lhs, rhs),
            BinOp::Add | BinOp::Sub | BinOp::Mult | BinOp::Div | BinOp::Mod => {
                self.analyze_arithmetic(node, scope, op, lhs, rhs, expected)
            }
            BinOp::BinAnd | BinOp::BinOr | BinOp::BinXor => {
                self.analyze_bitwise(node, scope, op, lhs, rhs, expected)
            }
            BinOp::BitShiftLeft | BinOp::BitShiftRight => {
                self.analyze_shift(node, scope, op, lhs, rhs)
            }
            BinOp::UnwrapMaybe => self.analyze_unwrap_maybe_binary(node, scope, lhs, rhs),
            _ => unreachable!("assignment handled above"),
        }
    }

    fn analyze_assignment(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> TypeId {
        let lhs_ty = self.analyze_lvalue(lhs, scope, true);
        if self.types.is_invalid(lhs_ty) {
            self.analyze_expression(rhs, scope, None);
            return self.decorate_invalid(node, scope);
        }
        if let Some(compound) = op.compound_op() {
            let canonical = self.types.canonical(lhs_ty);
            let numeric_ok = match compound {
                BinOp::Add | BinOp::Sub | BinOp::Mult | BinOp::Div | BinOp::Mod => matches!(
                    self.types.kind(canonical),
                    TypeKind::Int { .. } | TypeKind::Float { .. }
                ),
                _ => matches!(self.types.kind(canonical), TypeKind::Int { .. }),
            };
            if !numeric_ok {
                let name = self.types.name(lhs_ty).to_owned();
                self.add_error(node, format!("invalid operand type: '{name}'"));
            }
        }
        let rhs_ty = self.analyze_expression(rhs, scope, Some(lhs_ty));
        if self.types.is_invalid(rhs_ty) {
            return self.decorate_invalid(node, scope);
        }
        let void = self.types.builtin.void;
        self.decorate(node, scope, void, None, None)
    }

    fn analyze_comparison(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> TypeId {
        let bool_ty = self.types.builtin.bool_;
        self.analyze_expression(lhs, scope, None);
        self.analyze_expression(rhs, scope, None);
        let peer = self.resolve_peer_types(node, scope, &[lhs, rhs]);
        if self.types.is_invalid(peer) {
            return self.decorate_invalid(node, scope);
        }
        let canonical = self.types.canonical(peer);
        let ordering_op = matches!(
            op,
            BinOp::CmpLessThan | BinOp::CmpGreaterThan | BinOp::CmpLessOrEq | BinOp::CmpGreaterOrEq
        );
        let comparable = match self.types.kind(canonical) {
            TypeKind::Int { .. } | TypeKind::Float { .. } | TypeKind::NumLitInt | TypeKind::NumLitFloat => true,
            TypeKind::Bool | TypeKind::PureError | TypeKind::Enum { .. } | TypeKind::Pointer { .. } => {
                !ordering_op
            }
            _ => false,
        };
        if !comparable {
            let name = self.types.name(peer).to_owned();
            return self.error_invalid(node, scope, format!("operator not allowed for type '{name}'"));
        }
        let const_val = self.fold_comparison(op, lhs, rhs);
        self.decorate(node, scope, bool_ty, const_val, None)
    }

    fn fold_comparison(&mut self, op: BinOp, lhs: NodeId, rhs: NodeId) -> Option<ConstVal> {
        let a = self.expr_const(lhs)?;
        let b = self.expr_const(rhs)?;
        let dep = a.depends_on_compile_var || b.depends_on_compile_var;
        let result = match (&a.payload, &b.payload) {
            (ConstPayload::Num(x), ConstPayload::Num(y)) => {
                let ord = x.compare(y);
                match op {
                    BinOp::CmpEq => ord.is_eq(),
                    BinOp::CmpNotEq => !ord.is_eq(),
                    BinOp::CmpLessThan => ord.is_lt(),
                    BinOp::CmpGreaterThan => ord.is_gt(),
                    BinOp::CmpLessOrEq => ord.is_le(),
                    BinOp::CmpGreaterOrEq => ord.is_ge(),
                    _ => return None,
                }
            }
            (ConstPayload::Bool(x), ConstPayload::Bool(y)) => match op {
                BinOp::CmpEq => x == y,
                BinOp::CmpNotEq => x != y,
                _ => return None,
            },
            (
                ConstPayload::Err { tag: x, .. },
                ConstPayload::Err { tag: y, .. },
            ) => match op {
                BinOp::CmpEq => x == y,
                BinOp::CmpNotEq => x != y,
                _ => return None,
            },
            (
                ConstPayload::Enum { tag: x, .. },
                ConstPayload::Enum { tag: y, .. },
            ) => match op {
                BinOp::CmpEq => x == y,
                BinOp::CmpNotEq => x != y,
                _ => return None,
            },
            _ => return None,
        };
        let mut out = ConstVal::bool_(result);
        out.depends_on_compile_var = dep;
        Some(out)
    }

    fn analyze_arithmetic(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
        expected: Option<TypeId>,
    ) -> TypeId {
        self.analyze_expression(lhs, scope, expected);
        self.analyze_expression(rhs, scope, expected);
        // string concatenation is spelled `+` on constant u8 strings and
        // resolves before peer typing (the operand lengths may differ)
        if op == BinOp::Add {
            if let Some(result) = self.try_concat_strings(node, scope, lhs, rhs) {
                return result;
            }
        }
        let peer = self.resolve_peer_types(node, scope, &[lhs, rhs]);
        if self.types.is_invalid(peer) {
            return self.decorate_invalid(node, scope);
        }
        let canonical = self.types.canonical(peer);
        let numeric = matches!(
            self.types.kind(canonical),
            TypeKind::Int { .. } | TypeKind::Float { .. } | TypeKind::NumLitInt | TypeKind::NumLitFloat
        );
        if !numeric {
            let name = self.types.name(peer).to_owned();
            return self.error_invalid(node, scope, format!("invalid operand type: '{name}'"));
        }
        let const_val = match self.fold_arithmetic(node, op, peer, lhs, rhs) {
            Ok(value) => value,
            // the fold reported an error; the result type poisons
            Err(()) => return self.decorate_invalid(node, scope),
        };
        self.decorate(node, scope, peer, const_val, None)
    }

    fn fold_arithmetic(
        &mut self,
        node: NodeId,
        op: BinOp,
        result_ty: TypeId,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<Option<ConstVal>, ()> {
        let (Some(a), Some(b)) = (self.expr_const(lhs).cloned(), self.expr_const(rhs).cloned())
        else {
            return Ok(None);
        };
        let (Some(x), Some(y)) = (a.as_num(), b.as_num()) else {
            return Ok(None);
        };
        let result = match op {
            BinOp::Add => Ok(x.add(y)),
            BinOp::Sub => Ok(x.sub(y)),
            BinOp::Mult => Ok(x.mul(y)),
            BinOp::Div => x.div(y),
            BinOp::Mod => x.rem(y),
            _ => return Ok(None),
        };
        let value = match result {
            Ok(value) => value,
            Err(BigNumError::DivByZero) => {
                self.add_error(node, "division by zero".to_owned());
                return Err(());
            }
            Err(BigNumError::ShiftTooLarge) => return Ok(None),
        };
        let canonical = self.types.canonical(result_ty);
        if let TypeKind::Int { is_signed, bits } = *self.types.kind(canonical) {
            if !value.fits_in_bits(bits, is_signed) {
                self.add_error(node, "operation caused overflow".to_owned());
                return Err(());
            }
        }
        Ok(Some(ConstVal::num(value).inherit_compile_var([&a, &b])))
    }

    /// Constant `[]const u8` + `[]const u8` concatenation.
    fn try_concat_strings(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Option<TypeId> {
        let u8_ty = self.types.builtin.u8_;
        let lhs_ok = self.const_str_bytes(lhs);
        let rhs_ok = self.const_str_bytes(rhs);
        let (a, b) = (lhs_ok?, rhs_ok?);
        let mut joined = a;
        joined.push_str(&b);
        let id = self.interner.intern(&joined);
        let len = joined.len() as u64;
        let array_ty = self.types.get_array(u8_ty, len);
        let slice_ty = self.types.get_slice(u8_ty, true);
        let array_val = ConstVal::new(ConstPayload::Str(id));
        let value = ConstVal::new(ConstPayload::Slice {
            array: Box::new(array_val),
            len,
        });
        let _ = array_ty;
        Some(self.decorate(node, scope, slice_ty, Some(value), None))
    }

    fn const_str_bytes(&self, node: NodeId) -> Option<String> {
        let value = self.expr_const(node)?;
        match &value.payload {
            ConstPayload::Str(id) => Some(self.interner.get(*id).to_owned()),
            ConstPayload::Slice { array, .. } => match &array.payload {
                ConstPayload::Str(id) => Some(self.interner.get(*id).to_owned()),
                _ => None,
            },
            _ => None,
        }
    }

    fn analyze_bitwise(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
        expected: Option<TypeId>,
    ) -> TypeId {
        self.analyze_expression(lhs, scope, expected);
        self.analyze_expression(rhs, scope, expected);
        let peer = self.resolve_peer_types(node, scope, &[lhs, rhs]);
        if self.types.is_invalid(peer) {
            return self.decorate_invalid(node, scope);
        }
        let canonical = self.types.canonical(peer);
        if !matches!(self.types.kind(canonical), TypeKind::Int { .. } | TypeKind::NumLitInt) {
            let name = self.types.name(peer).to_owned();
            return self.error_invalid(node, scope, format!("invalid operand type: '{name}'"));
        }
        let const_val = (|| {
            let a = self.expr_const(lhs)?.clone();
            let b = self.expr_const(rhs)?.clone();
            let result = match op {
                BinOp::BinAnd => a.as_num()?.bit_and(b.as_num()?),
                BinOp::BinOr => a.as_num()?.bit_or(b.as_num()?),
                BinOp::BinXor => a.as_num()?.bit_xor(b.as_num()?),
                _ => None,
            }?;
            Some(ConstVal::num(result).inherit_compile_var([&a, &b]))
        })();
        self.decorate(node, scope, peer, const_val, None)
    }

    fn analyze_shift(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> TypeId {
        let lhs_ty = self.analyze_expression(lhs, scope, None);
        let rhs_ty = self.analyze_expression(rhs, scope, None);
        if self.types.is_invalid(lhs_ty) || self.types.is_invalid(rhs_ty) {
            return self.decorate_invalid(node, scope);
        }
        let lhs_int = matches!(
            self.types.kind(self.types.canonical(lhs_ty)),
            TypeKind::Int { .. } | TypeKind::NumLitInt
        );
        let rhs_int = matches!(
            self.types.kind(self.types.canonical(rhs_ty)),
            TypeKind::Int { .. } | TypeKind::NumLitInt
        );
        if !lhs_int || !rhs_int {
            let name = self
                .types
                .name(if lhs_int { rhs_ty } else { lhs_ty })
                .to_owned();
            return self.error_invalid(node, scope, format!("invalid operand type: '{name}'"));
        }
        let const_val = (|| {
            let a = self.expr_const(lhs)?.clone();
            let b = self.expr_const(rhs)?.clone();
            let result = match op {
                BinOp::BitShiftLeft => a.as_num()?.shl(b.as_num()?).ok()?,
                BinOp::BitShiftRight => a.as_num()?.shr(b.as_num()?).ok()?,
                _ => return None,
            };
            Some(ConstVal::num(result).inherit_compile_var([&a, &b]))
        })();
        self.decorate(node, scope, lhs_ty, const_val, None)
    }

    /// `a ?? b` — unwrap or evaluate the fallback.
    fn analyze_unwrap_maybe_binary(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        lhs: NodeId,
        rhs: NodeId,
    ) -> TypeId {
        let lhs_ty = self.analyze_expression(lhs, scope, None);
        if self.types.is_invalid(lhs_ty) {
            self.analyze_expression(rhs, scope, None);
            return self.decorate_invalid(node, scope);
        }
        let canonical = self.types.canonical(lhs_ty);
        let TypeKind::Maybe { child } = *self.types.kind(canonical) else {
            let name = self.types.name(lhs_ty).to_owned();
            return self.error_invalid(node, scope, format!("expected maybe type, got '{name}'"));
        };
        let rhs_ty = self.analyze_expression(rhs, scope, Some(child));
        if self.types.is_invalid(rhs_ty) {
            return self.decorate_invalid(node, scope);
        }
        let const_val = self.expr_const(lhs).cloned().and_then(|v| match v.payload {
            ConstPayload::Maybe(Some(inner)) => Some(*inner),
            ConstPayload::Maybe(None) => self.expr_const(rhs).cloned(),
            _ => None,
        });
        self.decorate(node, scope, child, const_val, None)
    }

    /// `a %% b` / `a %% err => b`.
    fn analyze_unwrap_err(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        target: NodeId,
        err_name: Option<StringId>,
        _err_span: crate::span::Span,
        fallback: NodeId,
    ) -> TypeId {
        let target_ty = self.analyze_expression(target, scope, None);
        if self.types.is_invalid(target_ty) {
            return self.decorate_invalid(node, scope);
        }
        let canonical = self.types.canonical(target_ty);
        let TypeKind::ErrorUnion { child } = *self.types.kind(canonical) else {
            let name = self.types.name(target_ty).to_owned();
            return self.error_invalid(
                node,
                scope,
                format!("expected error union type, got '{name}'"),
            );
        };
        // the error binding lives in its own scope around the fallback
        let fallback_scope = self.scopes.new_scope(Some(scope), node, self.ast.import_of(node));
        if let Some(err_name) = err_name {
            let pure_error = self.types.builtin.pure_error;
            let var = self.scopes.add_variable(Variable {
                name: err_name,
                ty: pure_error,
                is_const: true,
                decl_node: node,
                scope: fallback_scope,
                src_arg_index: None,
                gen_arg_index: None,
            });
            self.bound_vars.insert(node, var);
            if let Some(fn_id) = self.scopes.get(scope).fn_entry {
                self.fn_entry_mut(fn_id).variables.push(var);
            }
        }
        let fallback_ty = self.analyze_expression(fallback, fallback_scope, Some(child));
        if self.types.is_invalid(fallback_ty) {
            return self.decorate_invalid(node, scope);
        }
        let const_val = self.expr_const(target).cloned().and_then(|v| match v.payload {
            ConstPayload::Err { tag: 0, payload } => payload.map(|p| *p),
            ConstPayload::Err { .. } => self.expr_const(fallback).cloned(),
            _ => None,
        });
        self.decorate(node, scope, child, const_val, None)
    }

    // ===== lvalues =====

    /// Whether the analyzed node denotes an addressable location.
    fn is_lvalue(&self, node: NodeId) -> bool {
        match self.ast.kind(node) {
            NodeKind::Symbol(_) => self.expr_info(node).variable.is_some(),
            NodeKind::FieldAccess { .. } | NodeKind::ArrayAccess { .. } => true,
            NodeKind::PrefixOpExpr {
                op: PrefixOp::Dereference,
                ..
            } => true,
            _ => false,
        }
    }

    /// Analyzes an assignment target; verifies addressability and, when
    /// `require_mut`, writability.
    pub(crate) fn analyze_lvalue(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        require_mut: bool,
    ) -> TypeId {
        let ty = self.analyze_expression(node, scope, None);
        if self.types.is_invalid(ty) {
            return ty;
        }
        if !self.is_lvalue(node) {
            return self.error_invalid(node, scope, "invalid assignment target".to_owned());
        }
        if require_mut {
            if let Some(var) = self.expr_info(node).variable {
                if self.scopes.var(var).is_const {
                    let name = self.interner.get(self.scopes.var(var).name).to_owned();
                    self.add_error(node, format!("cannot assign to constant '{name}'"));
                }
            }
            if let NodeKind::PrefixOpExpr {
                op: PrefixOp::Dereference,
                operand,
            } = self.ast.kind(node)
            {
                let operand_ty = self.expr_type(*operand);
                if let TypeKind::Pointer { is_const: true, .. } =
                    self.types.kind(self.types.canonical(operand_ty))
                {
                    self.add_error(node, "cannot assign through const pointer".to_owned());
                }
            }
        }
        ty
    }

    // ===== calls, fields, indexing =====

    fn analyze_call(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        callee: NodeId,
        args: &[NodeId],
    ) -> TypeId {
        // enum member construction: `Shape.Circle(radius)`
        if let Some(result) = self.try_enum_constructor(node, scope, callee, args) {
            return result;
        }
        let callee_ty = self.analyze_expression(callee, scope, None);
        if self.types.is_invalid(callee_ty) {
            for &arg in args {
                self.analyze_expression(arg, scope, None);
            }
            return self.decorate_invalid(node, scope);
        }
        let canonical = self.types.canonical(callee_ty);

        // a type used as a callee is an explicit cast
        if canonical == self.types.builtin.meta_type {
            let Some(target) = self.expr_const(callee).and_then(ConstVal::as_type) else {
                return self.decorate_invalid(node, scope);
            };
            if args.len() != 1 {
                return self.error_invalid(
                    node,
                    scope,
                    "cast expression expects exactly one parameter".to_owned(),
                );
            }
            return self.analyze_cast_expr(node, scope, target, args[0]);
        }

        let TypeKind::Fn(fn_type) = self.types.kind(canonical) else {
            let name = self.types.name(callee_ty).to_owned();
            return self.error_invalid(node, scope, format!("type '{name}' not a function"));
        };
        let fn_type = fn_type.clone();

        let expected_count = fn_type.params.len();
        if (fn_type.is_var_args && args.len() < expected_count)
            || (!fn_type.is_var_args && args.len() != expected_count)
        {
            return self.error_invalid(
                node,
                scope,
                format!(
                    "expected {expected_count} argument{}, got {}",
                    if expected_count == 1 { "" } else { "s" },
                    args.len()
                ),
            );
        }
        for (idx, &arg) in args.iter().enumerate() {
            let expected = fn_type.params.get(idx).map(|p| p.ty);
            self.analyze_expression(arg, scope, expected);
        }
        self.decorate(node, scope, fn_type.return_type, None, None)
    }

    /// Builds an enum value from `Enum.Member(payload)` call syntax.
    fn try_enum_constructor(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        callee: NodeId,
        args: &[NodeId],
    ) -> Option<TypeId> {
        let NodeKind::FieldAccess { target, name } = self.ast.kind(callee) else {
            return None;
        };
        let (target, name) = (*target, *name);
        let target_ty = self.analyze_expression(target, scope, None);
        if self.types.canonical(target_ty) != self.types.builtin.meta_type {
            // re-analysis below in the main call path is fine: decoration
            // is idempotent for the same scope
            return None;
        }
        let enum_ty = self.expr_const(target).and_then(ConstVal::as_type)?;
        let canonical = self.types.canonical(enum_ty);
        let TypeKind::Enum { fields, .. } = self.types.kind(canonical) else {
            return None;
        };
        let field = fields.iter().find(|f| f.name == name)?.clone();
        if !self.types.has_bits(field.ty) {
            self.add_error(node, "enum member has no payload".to_owned());
            return Some(self.decorate_invalid(node, scope));
        }
        if args.len() != 1 {
            self.add_error(node, "enum member expects exactly one payload".to_owned());
            return Some(self.decorate_invalid(node, scope));
        }
        self.decorate(callee, scope, enum_ty, None, None);
        let arg_ty = self.analyze_expression(args[0], scope, Some(field.ty));
        if self.types.is_invalid(arg_ty) {
            return Some(self.decorate_invalid(node, scope));
        }
        self.enum_ctors.insert(node, (field.value, field.ty));
        let const_val = self.expr_const(args[0]).cloned().map(|payload| {
            let dep = payload.depends_on_compile_var;
            let mut out = ConstVal::new(ConstPayload::Enum {
                tag: field.value,
                payload: Some(Box::new(payload)),
            });
            out.depends_on_compile_var = dep;
            out
        });
        Some(self.decorate(node, scope, enum_ty, const_val, None))
    }

    fn analyze_field_access(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        target: NodeId,
        name: StringId,
    ) -> TypeId {
        let target_ty = self.analyze_expression(target, scope, None);
        if self.types.is_invalid(target_ty) {
            return self.decorate_invalid(node, scope);
        }
        let mut canonical = self.types.canonical(target_ty);
        // one implicit deref through a pointer target
        if let TypeKind::Pointer { child, .. } = *self.types.kind(canonical) {
            canonical = self.types.canonical(child);
        }
        match self.types.kind(canonical).clone() {
            TypeKind::Struct { .. } => {
                self.ensure_container_complete(canonical, node);
                let TypeKind::Struct { fields, .. } = self.types.kind(canonical).clone() else {
                    return self.decorate_invalid(node, scope);
                };
                match fields.iter().find(|f| f.name == name) {
                    Some(field) => {
                        let field_ty = field.ty;
                        let src_index = field.src_index;
                        let const_val = self.expr_const(target).cloned().and_then(|v| {
                            match v.payload {
                                ConstPayload::Struct(vals) => vals.get(src_index).cloned(),
                                _ => None,
                            }
                        });
                        self.decorate(node, scope, field_ty, const_val, None)
                    }
                    None => {
                        let field_name = self.interner.get(name).to_owned();
                        let type_name = self.types.name(canonical).to_owned();
                        self.error_invalid(
                            node,
                            scope,
                            format!("no member named '{field_name}' in '{type_name}'"),
                        )
                    }
                }
            }
            TypeKind::Array { len, .. } => {
                if self.interner.get(name) == "len" {
                    let usize_ty = self.types.builtin.usize_;
                    self.decorate(
                        node,
                        scope,
                        usize_ty,
                        Some(ConstVal::num(BigNum::from_u64(len))),
                        None,
                    )
                } else {
                    let field_name = self.interner.get(name).to_owned();
                    self.error_invalid(node, scope, format!("no member named '{field_name}' in array"))
                }
            }
            TypeKind::Slice { child, is_const } => match self.interner.get(name) {
                "len" => {
                    let isize_ty = self.types.builtin.isize_;
                    let const_val = self.expr_const(target).cloned().and_then(|v| match v.payload {
                        ConstPayload::Slice { len, .. } => {
                            Some(ConstVal::num(BigNum::from_u64(len)))
                        }
                        _ => None,
                    });
                    self.decorate(node, scope, isize_ty, const_val, None)
                }
                "ptr" => {
                    let ptr_ty = self.types.get_pointer(child, is_const);
                    self.decorate(node, scope, ptr_ty, None, None)
                }
                other => {
                    let msg = format!("no member named '{other}' in slice");
                    self.error_invalid(node, scope, msg)
                }
            },
            TypeKind::MetaType => {
                let Some(inner) = self.expr_const(target).and_then(ConstVal::as_type) else {
                    return self.decorate_invalid(node, scope);
                };
                self.analyze_type_member(node, scope, inner, name)
            }
            TypeKind::Namespace => {
                let Some(import) = self.expr_const(target).and_then(ConstVal::as_import) else {
                    return self.decorate_invalid(node, scope);
                };
                let Some(member_scope) = self.imports.get(import).scope else {
                    return self.decorate_invalid(node, scope);
                };
                let decl = self.scopes.get(member_scope).decls.get(&name).copied();
                match decl {
                    Some(decl) if self.decl_is_pub(decl) => {
                        self.analyze_decl_ref(node, scope, decl)
                    }
                    Some(decl) => {
                        let field_name = self.interner.get(name).to_owned();
                        let idx = self.add_error(
                            node,
                            format!("'{field_name}' is private"),
                        );
                        self.add_note(idx, decl, "declared here".to_owned());
                        self.decorate_invalid(node, scope)
                    }
                    None => {
                        if self.imports.get(import).any_imports_failed {
                            return self.decorate_invalid(node, scope);
                        }
                        let field_name = self.interner.get(name).to_owned();
                        self.error_invalid(
                            node,
                            scope,
                            format!("no member named '{field_name}' in namespace"),
                        )
                    }
                }
            }
            _ => {
                let type_name = self.types.name(target_ty).to_owned();
                self.error_invalid(node, scope, format!("type '{type_name}' has no members"))
            }
        }
    }

    /// `Enum.Member` without a payload; `Type.something` in general.
    fn analyze_type_member(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        ty: TypeId,
        name: StringId,
    ) -> TypeId {
        let canonical = self.types.canonical(ty);
        self.ensure_container_complete(canonical, node);
        if let TypeKind::Enum { fields, .. } = self.types.kind(canonical) {
            match fields.iter().find(|f| f.name == name) {
                Some(field) => {
                    let (value, payload_ty) = (field.value, field.ty);
                    if self.types.has_bits(payload_ty) {
                        let member = self.interner.get(name).to_owned();
                        return self.error_invalid(
                            node,
                            scope,
                            format!("enum member '{member}' requires a payload"),
                        );
                    }
                    return self.decorate(
                        node,
                        scope,
                        ty,
                        Some(ConstVal::new(ConstPayload::Enum {
                            tag: value,
                            payload: None,
                        })),
                        None,
                    );
                }
                None => {
                    let member = self.interner.get(name).to_owned();
                    let type_name = self.types.name(canonical).to_owned();
                    return self.error_invalid(
                        node,
                        scope,
                        format!("no member named '{member}' in '{type_name}'"),
                    );
                }
            }
        }
        let type_name = self.types.name(ty).to_owned();
        self.error_invalid(node, scope, format!("type '{type_name}' has no members"))
    }

    fn analyze_array_access(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        target: NodeId,
        index: NodeId,
    ) -> TypeId {
        let target_ty = self.analyze_expression(target, scope, None);
        let usize_ty = self.types.builtin.usize_;
        let index_ty = self.analyze_expression(index, scope, Some(usize_ty));
        if self.types.is_invalid(target_ty) || self.types.is_invalid(index_ty) {
            return self.decorate_invalid(node, scope);
        }
        let canonical = self.types.canonical(target_ty);
        let elem_ty = match *self.types.kind(canonical) {
            TypeKind::Array { child, len } => {
                if let Some(idx) = self.expr_const(index).and_then(|v| v.as_num()?.to_u64()) {
                    if idx >= len {
                        self.add_error(index, format!("index {idx} outside array of size {len}"));
                    }
                }
                child
            }
            TypeKind::Slice { child, .. } => child,
            TypeKind::Pointer { child, .. } => child,
            _ => {
                let name = self.types.name(target_ty).to_owned();
                return self.error_invalid(node, scope, format!("array access of non-array type '{name}'"));
            }
        };
        let const_val = (|| {
            let idx = self.expr_const(index)?.as_num()?.to_u64()?;
            let target_val = self.expr_const(target)?;
            match &target_val.payload {
                ConstPayload::Array(elems) => elems.get(idx as usize).cloned(),
                ConstPayload::Str(id) => {
                    let byte = *self.interner.get(*id).as_bytes().get(idx as usize)?;
                    Some(ConstVal::num(BigNum::from_u64(u64::from(byte))))
                }
                _ => None,
            }
        })();
        self.decorate(node, scope, elem_ty, const_val, None)
    }

    fn analyze_slice_expr(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        target: NodeId,
        start: NodeId,
        end: Option<NodeId>,
    ) -> TypeId {
        let target_ty = self.analyze_expression(target, scope, None);
        let usize_ty = self.types.builtin.usize_;
        self.analyze_expression(start, scope, Some(usize_ty));
        if let Some(end) = end {
            self.analyze_expression(end, scope, Some(usize_ty));
        }
        if self.types.is_invalid(target_ty) {
            return self.decorate_invalid(node, scope);
        }
        let canonical = self.types.canonical(target_ty);
        let (child, is_const) = match *self.types.kind(canonical) {
            TypeKind::Array { child, .. } => (child, false),
            TypeKind::Slice { child, is_const } => (child, is_const),
            TypeKind::Pointer { child, is_const } => (child, is_const),
            _ => {
                let name = self.types.name(target_ty).to_owned();
                return self.error_invalid(node, scope, format!("slice of non-array type '{name}'"));
            }
        };
        if end.is_none() && !matches!(*self.types.kind(canonical), TypeKind::Array { .. } | TypeKind::Slice { .. }) {
            self.add_error(node, "open-ended slice requires a known length".to_owned());
        }
        let slice_ty = self.types.get_slice(child, is_const);
        self.decorate(node, scope, slice_ty, None, None)
    }

    fn analyze_struct_init(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        ty_node: NodeId,
        field_inits: &[crate::ast::FieldInit],
    ) -> TypeId {
        let ty = self.analyze_type_expr(ty_node, scope);
        if self.types.is_invalid(ty) {
            for init in field_inits {
                self.analyze_expression(init.value, scope, None);
            }
            return self.decorate_invalid(node, scope);
        }
        let canonical = self.types.canonical(ty);
        if !self.ensure_container_complete(canonical, node) {
            return self.decorate_invalid(node, scope);
        }
        let TypeKind::Struct { fields, .. } = self.types.kind(canonical).clone() else {
            let name = self.types.name(ty).to_owned();
            return self.error_invalid(node, scope, format!("type '{name}' does not support initialization"));
        };

        let mut seen: Vec<Option<NodeId>> = vec![None; fields.len()];
        let mut ok = true;
        for init in field_inits {
            let Some(field) = fields.iter().find(|f| f.name == init.name) else {
                let field_name = self.interner.get(init.name).to_owned();
                let type_name = self.types.name(canonical).to_owned();
                self.add_error(
                    init.value,
                    format!("no member named '{field_name}' in '{type_name}'"),
                );
                ok = false;
                self.analyze_expression(init.value, scope, None);
                continue;
            };
            if seen[field.src_index].is_some() {
                let field_name = self.interner.get(init.name).to_owned();
                self.add_error(init.value, format!("duplicate field '{field_name}'"));
                ok = false;
                continue;
            }
            seen[field.src_index] = Some(init.value);
            let field_ty = field.ty;
            let value_ty = self.analyze_expression(init.value, scope, Some(field_ty));
            if self.types.is_invalid(value_ty) {
                ok = false;
            }
        }
        for (idx, slot) in seen.iter().enumerate() {
            if slot.is_none() {
                let field_name = self.interner.get(fields[idx].name).to_owned();
                self.add_error(node, format!("missing field: '{field_name}'"));
                ok = false;
            }
        }
        if !ok {
            return self.decorate_invalid(node, scope);
        }
        let const_val = (|| {
            let mut vals = Vec::with_capacity(fields.len());
            let mut dep = false;
            for slot in &seen {
                let value = self.expr_const((*slot)?)?;
                dep |= value.depends_on_compile_var;
                vals.push(value.clone());
            }
            let mut out = ConstVal::new(ConstPayload::Struct(vals));
            out.depends_on_compile_var = dep;
            Some(out)
        })();
        self.decorate(node, scope, ty, const_val, None)
    }

    fn analyze_array_init(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        ty_node: NodeId,
        elems: &[NodeId],
    ) -> TypeId {
        let NodeKind::ArrayType { size, elem, .. } = self.ast.kind(ty_node) else {
            return self.decorate_invalid(node, scope);
        };
        let (size, elem) = (*size, *elem);
        let elem_ty = self.analyze_type_expr(elem, scope);
        if self.types.is_invalid(elem_ty) {
            for &e in elems {
                self.analyze_expression(e, scope, None);
            }
            return self.decorate_invalid(node, scope);
        }
        if let Some(size_node) = size {
            let usize_ty = self.types.builtin.usize_;
            self.analyze_expression(size_node, scope, Some(usize_ty));
            let declared = self.expr_const(size_node).and_then(|v| v.as_num()?.to_u64());
            if let Some(declared) = declared {
                if declared != elems.len() as u64 {
                    self.add_error(
                        node,
                        format!("expected {declared} elements, got {}", elems.len()),
                    );
                }
            }
        }
        let mut ok = true;
        for &e in elems {
            let ty = self.analyze_expression(e, scope, Some(elem_ty));
            if self.types.is_invalid(ty) {
                ok = false;
            }
        }
        if !ok {
            return self.decorate_invalid(node, scope);
        }
        let array_ty = self.types.get_array(elem_ty, elems.len() as u64);
        let const_val = (|| {
            let mut vals = Vec::with_capacity(elems.len());
            let mut dep = false;
            for &e in elems {
                let value = self.expr_const(e)?;
                dep |= value.depends_on_compile_var;
                vals.push(value.clone());
            }
            let mut out = ConstVal::new(ConstPayload::Array(vals));
            out.depends_on_compile_var = dep;
            Some(out)
        })();
        self.decorate(node, scope, array_ty, const_val, None)
    }

    fn analyze_array_type(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        size: Option<NodeId>,
        is_const: bool,
        elem: NodeId,
    ) -> TypeId {
        let elem_ty = self.analyze_type_expr(elem, scope);
        if self.types.is_invalid(elem_ty) {
            return self.decorate_invalid(node, scope);
        }
        let meta = self.types.builtin.meta_type;
        match size {
            Some(size_node) => {
                let usize_ty = self.types.builtin.usize_;
                let size_ty = self.analyze_expression(size_node, scope, Some(usize_ty));
                if self.types.is_invalid(size_ty) {
                    return self.decorate_invalid(node, scope);
                }
                let Some(len) = self.expr_const(size_node).and_then(|v| v.as_num()?.to_u64()) else {
                    return self.error_invalid(
                        node,
                        scope,
                        "unable to evaluate constant expression".to_owned(),
                    );
                };
                self.ensure_container_complete(elem_ty, node);
                let ty = self.types.get_array(elem_ty, len);
                self.decorate(node, scope, meta, Some(ConstVal::type_(ty)), None)
            }
            None => {
                let ty = self.types.get_slice(elem_ty, is_const);
                self.decorate(node, scope, meta, Some(ConstVal::type_(ty)), None)
            }
        }
    }

    // ===== statements and control =====

    fn analyze_local_var_decl(&mut self, node: NodeId, scope: ScopeId) -> TypeId {
        let NodeKind::VarDecl {
            name,
            is_const,
            ty,
            init,
            ..
        } = self.ast.kind(node)
        else {
            return self.decorate_invalid(node, scope);
        };
        let (name, is_const, ty, init) = (*name, *is_const, *ty, *init);

        // shadowing within the same function is a redefinition
        if let Some(existing) = self.scopes.find_var(scope, name) {
            let existing_node = self.scopes.var(existing).decl_node;
            let text = self.interner.get(name).to_owned();
            let idx = self.add_error(node, format!("redeclaration of variable '{text}'"));
            self.add_note(idx, existing_node, "previous declaration is here".to_owned());
        }

        let (var_ty, const_val) = self.analyze_var_decl_parts(node, scope, ty, init, is_const, false);
        let var = self.scopes.add_variable(Variable {
            name,
            ty: var_ty,
            is_const,
            decl_node: node,
            scope,
            src_arg_index: None,
            gen_arg_index: None,
        });
        self.decl_vars.insert(node, var);
        self.decl_const.insert(node, const_val);
        if let Some(fn_id) = self.scopes.get(scope).fn_entry {
            self.fn_entry_mut(fn_id).variables.push(var);
        }
        let void = self.types.builtin.void;
        self.decorate(node, scope, void, None, Some(var))
    }

    fn analyze_block(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        stmts: &[NodeId],
        expected: Option<TypeId>,
    ) -> TypeId {
        let import = self.ast.import_of(node);
        let child_scope = self.scopes.new_scope(Some(scope), node, import);
        self.block_scopes.insert(node, child_scope);
        let void = self.types.builtin.void;
        let mut result = void;
        for (idx, &stmt) in stmts.iter().enumerate() {
            let is_last = idx == stmts.len() - 1;
            let stmt_expected = if is_last { expected } else { None };
            let ty = self.analyze_expression(stmt, child_scope, stmt_expected);
            if is_last {
                result = ty;
            }
        }
        self.decorate(node, scope, result, None, None)
    }

    fn analyze_return(&mut self, node: NodeId, scope: ScopeId, value: Option<NodeId>) -> TypeId {
        let Some(fn_id) = self.scopes.get(scope).fn_entry else {
            return self.error_invalid(node, scope, "return expression outside function definition".to_owned());
        };
        let fn_type = self.fn_entry(fn_id).fn_type;
        let TypeKind::Fn(fn_type_id) = self.types.kind(fn_type).clone() else {
            return self.decorate_invalid(node, scope);
        };
        let ret_ty = fn_type_id.return_type;
        let unreachable_ = self.types.builtin.unreachable_;

        let knowledge = match value {
            Some(value_node) => {
                let value_ty = self.analyze_expression(value_node, scope, Some(ret_ty));
                if self.types.is_invalid(value_ty) {
                    return self.decorate_invalid(node, scope);
                }
                self.return_knowledge_for(value_node, ret_ty)
            }
            None => {
                let void = self.types.builtin.void;
                if self.types.canonical(ret_ty) != void {
                    let name = self.types.name(ret_ty).to_owned();
                    self.add_error(node, format!("expected type '{name}', got 'void'"));
                }
                ReturnKnowledge::KnownUnconditional
            }
        };
        let ty = self.decorate(node, scope, unreachable_, None, None);
        self.expr_info_mut(node).return_knowledge = knowledge;
        self.check_conditional_defers(node, scope, knowledge);
        ty
    }

    /// What the defer unwinder can assume about this return value.
    fn return_knowledge_for(&self, value: NodeId, ret_ty: TypeId) -> ReturnKnowledge {
        let canonical = self.types.canonical(ret_ty);
        match self.types.kind(canonical) {
            TypeKind::ErrorUnion { .. } => {
                if let Some(val) = self.expr_const(value) {
                    if !val.depends_on_compile_var {
                        return match &val.payload {
                            ConstPayload::Err { tag: 0, .. } => ReturnKnowledge::KnownNonError,
                            ConstPayload::Err { .. } => ReturnKnowledge::KnownError,
                            _ => ReturnKnowledge::Unknown,
                        };
                    }
                }
                match self.expr_info(value).cast.map(|c| c.op) {
                    Some(CastOp::ErrorWrap) => ReturnKnowledge::KnownNonError,
                    Some(CastOp::PureErrorWrap) => ReturnKnowledge::KnownError,
                    _ => ReturnKnowledge::Unknown,
                }
            }
            TypeKind::Maybe { .. } => {
                if let Some(val) = self.expr_const(value) {
                    if !val.depends_on_compile_var {
                        return match &val.payload {
                            ConstPayload::Maybe(None) => ReturnKnowledge::KnownNull,
                            ConstPayload::Maybe(Some(_)) => ReturnKnowledge::KnownNonNull,
                            _ => ReturnKnowledge::Unknown,
                        };
                    }
                }
                match self.expr_info(value).cast.map(|c| c.op) {
                    Some(CastOp::MaybeWrap) => ReturnKnowledge::KnownNonNull,
                    _ => ReturnKnowledge::Unknown,
                }
            }
            _ => ReturnKnowledge::KnownUnconditional,
        }
    }

    /// Runtime-unknown returns through conditional defers are rejected (the
    /// unwinder cannot decide which bodies to run).
    fn check_conditional_defers(&mut self, node: NodeId, scope: ScopeId, knowledge: ReturnKnowledge) {
        if knowledge != ReturnKnowledge::Unknown {
            return;
        }
        let chain = self.scopes.chain_to_fn(scope);
        let mut conditional = None;
        for scope_id in chain {
            for &defer in &self.scopes.get(scope_id).defers {
                if let NodeKind::Defer { kind, .. } = self.ast.kind(defer) {
                    if *kind != DeferKind::Unconditional {
                        conditional = Some(defer);
                    }
                }
            }
        }
        if let Some(defer) = conditional {
            let idx = self.add_error(
                node,
                "cannot return a runtime-known error or maybe value through conditional defers"
                    .to_owned(),
            );
            self.add_note(idx, defer, "conditional defer is here".to_owned());
        }
    }

    fn analyze_defer(&mut self, node: NodeId, scope: ScopeId, kind: DeferKind, body: NodeId) -> TypeId {
        match kind {
            DeferKind::Error => {
                let fn_ret = self.current_fn_return_type(scope);
                if !matches!(
                    fn_ret.map(|ty| self.types.kind(self.types.canonical(ty)).clone()),
                    Some(TypeKind::ErrorUnion { .. })
                ) {
                    self.add_error(
                        node,
                        "errdefer in function that does not return an error".to_owned(),
                    );
                }
            }
            DeferKind::Maybe => {
                let fn_ret = self.current_fn_return_type(scope);
                if !matches!(
                    fn_ret.map(|ty| self.types.kind(self.types.canonical(ty)).clone()),
                    Some(TypeKind::Maybe { .. })
                ) {
                    self.add_error(
                        node,
                        "maybedefer in function that does not return a maybe".to_owned(),
                    );
                }
            }
            DeferKind::Unconditional => {}
        }
        self.scopes.get_mut(scope).defers.push(node);
        // the body runs in its own scope at scope exit
        let import = self.ast.import_of(node);
        let defer_scope = self.scopes.new_scope(Some(scope), node, import);
        self.analyze_expression(body, defer_scope, None);
        let void = self.types.builtin.void;
        self.decorate(node, scope, void, None, None)
    }

    fn current_fn_return_type(&self, scope: ScopeId) -> Option<TypeId> {
        let fn_id = self.scopes.get(scope).fn_entry?;
        match self.types.kind(self.fn_entry(fn_id).fn_type) {
            TypeKind::Fn(fn_type_id) => Some(fn_type_id.return_type),
            _ => None,
        }
    }

    fn analyze_if(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        cond: NodeId,
        then_body: NodeId,
        else_body: Option<NodeId>,
        expected: Option<TypeId>,
    ) -> TypeId {
        let bool_ty = self.types.builtin.bool_;
        let cond_ty = self.analyze_expression(cond, scope, Some(bool_ty));
        let import = self.ast.import_of(node);

        let then_scope = self.scopes.new_scope(Some(scope), then_body, import);
        self.analyze_expression(then_body, then_scope, expected);
        if let Some(else_body) = else_body {
            let else_scope = self.scopes.new_scope(Some(scope), else_body, import);
            self.analyze_expression(else_body, else_scope, expected);
        }
        if self.types.is_invalid(cond_ty) {
            return self.decorate_invalid(node, scope);
        }

        let result_ty = match else_body {
            Some(else_body) => self.resolve_peer_types(node, scope, &[then_body, else_body]),
            None => self.types.builtin.void,
        };
        if self.types.is_invalid(result_ty) {
            return self.decorate_invalid(node, scope);
        }

        // a constant condition folds to the chosen branch
        let const_val = (|| {
            let cond_val = self.expr_const(cond)?;
            let dep = cond_val.depends_on_compile_var;
            let taken = if cond_val.as_bool()? {
                Some(then_body)
            } else {
                else_body
            };
            let mut out = match taken {
                Some(branch) => self.expr_const(branch)?.clone(),
                None => ConstVal::unit(),
            };
            out.depends_on_compile_var |= dep;
            Some(out)
        })();
        self.decorate(node, scope, result_ty, const_val, None)
    }

    fn analyze_if_maybe(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        bind_name: StringId,
        expr: NodeId,
        then_body: NodeId,
        else_body: Option<NodeId>,
        expected: Option<TypeId>,
    ) -> TypeId {
        let expr_ty = self.analyze_expression(expr, scope, None);
        let import = self.ast.import_of(node);
        if self.types.is_invalid(expr_ty) {
            return self.decorate_invalid(node, scope);
        }
        let canonical = self.types.canonical(expr_ty);
        let TypeKind::Maybe { child } = *self.types.kind(canonical) else {
            let name = self.types.name(expr_ty).to_owned();
            return self.error_invalid(node, scope, format!("expected maybe type, got '{name}'"));
        };

        let then_scope = self.scopes.new_scope(Some(scope), then_body, import);
        let var = self.scopes.add_variable(Variable {
            name: bind_name,
            ty: child,
            is_const: true,
            decl_node: node,
            scope: then_scope,
            src_arg_index: None,
            gen_arg_index: None,
        });
        self.bound_vars.insert(node, var);
        if let Some(fn_id) = self.scopes.get(scope).fn_entry {
            self.fn_entry_mut(fn_id).variables.push(var);
        }
        self.analyze_expression(then_body, then_scope, expected);
        if let Some(else_body) = else_body {
            let else_scope = self.scopes.new_scope(Some(scope), else_body, import);
            self.analyze_expression(else_body, else_scope, expected);
        }
        let result_ty = match else_body {
            Some(else_body) => self.resolve_peer_types(node, scope, &[then_body, else_body]),
            None => self.types.builtin.void,
        };
        self.decorate(node, scope, result_ty, None, None)
    }

    fn analyze_while(&mut self, node: NodeId, scope: ScopeId, cond: NodeId, body: NodeId) -> TypeId {
        let bool_ty = self.types.builtin.bool_;
        self.analyze_expression(cond, scope, Some(bool_ty));
        let import = self.ast.import_of(node);
        let body_scope = self.scopes.new_scope(Some(scope), body, import);
        self.scopes.get_mut(body_scope).parent_loop = Some(node);
        self.analyze_expression(body, body_scope, None);
        let void = self.types.builtin.void;
        self.decorate(node, scope, void, None, None)
    }

    fn analyze_for(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        elem_name: StringId,
        index_name: Option<StringId>,
        iterable: NodeId,
        body: NodeId,
    ) -> TypeId {
        let iterable_ty = self.analyze_expression(iterable, scope, None);
        let import = self.ast.import_of(node);
        if self.types.is_invalid(iterable_ty) {
            return self.decorate_invalid(node, scope);
        }
        let canonical = self.types.canonical(iterable_ty);
        let elem_ty = match *self.types.kind(canonical) {
            TypeKind::Array { child, .. } => child,
            TypeKind::Slice { child, .. } => child,
            _ => {
                let name = self.types.name(iterable_ty).to_owned();
                return self.error_invalid(
                    node,
                    scope,
                    format!("for loop requires array or slice, got '{name}'"),
                );
            }
        };
        let body_scope = self.scopes.new_scope(Some(scope), body, import);
        self.scopes.get_mut(body_scope).parent_loop = Some(node);
        let elem_var = self.scopes.add_variable(Variable {
            name: elem_name,
            ty: elem_ty,
            is_const: true,
            decl_node: node,
            scope: body_scope,
            src_arg_index: None,
            gen_arg_index: None,
        });
        self.bound_vars.insert(node, elem_var);
        if let Some(fn_id) = self.scopes.get(scope).fn_entry {
            self.fn_entry_mut(fn_id).variables.push(elem_var);
        }
        if let Some(index_name) = index_name {
            let usize_ty = self.types.builtin.usize_;
            let index_var = self.scopes.add_variable(Variable {
                name: index_name,
                ty: usize_ty,
                is_const: true,
                decl_node: node,
                scope: body_scope,
                src_arg_index: None,
                gen_arg_index: None,
            });
            self.index_vars.insert(node, index_var);
            if let Some(fn_id) = self.scopes.get(scope).fn_entry {
                self.fn_entry_mut(fn_id).variables.push(index_var);
            }
        }
        self.analyze_expression(body, body_scope, None);
        let void = self.types.builtin.void;
        self.decorate(node, scope, void, None, None)
    }

    // ===== switch =====

    fn analyze_switch(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        target: NodeId,
        prongs: &[NodeId],
        expected: Option<TypeId>,
    ) -> TypeId {
        let target_ty = self.analyze_expression(target, scope, None);
        if self.types.is_invalid(target_ty) {
            return self.decorate_invalid(node, scope);
        }
        let canonical = self.types.canonical(target_ty);
        let import = self.ast.import_of(node);

        enum Domain {
            Enum,
            Int,
            Bool,
        }
        let domain = match self.types.kind(canonical) {
            TypeKind::Enum { .. } => Domain::Enum,
            TypeKind::Int { .. } | TypeKind::NumLitInt => Domain::Int,
            TypeKind::Bool => Domain::Bool,
            _ => {
                let name = self.types.name(target_ty).to_owned();
                return self.error_invalid(node, scope, format!("invalid switch target type '{name}'"));
            }
        };

        let enum_fields = match self.types.kind(canonical) {
            TypeKind::Enum { fields, .. } => fields.clone(),
            _ => Vec::new(),
        };

        let mut handled_tags: Vec<Option<NodeId>> = vec![None; enum_fields.len()];
        let mut seen_ints: Vec<(BigNum, NodeId)> = Vec::new();
        let mut seen_bools: [Option<NodeId>; 2] = [None, None];
        let mut else_prong: Option<NodeId> = None;
        let mut ok = true;
        let mut bodies = Vec::with_capacity(prongs.len());

        for &prong in prongs {
            let NodeKind::SwitchProng {
                items,
                is_else,
                capture,
                body,
                ..
            } = self.ast.kind(prong)
            else {
                continue;
            };
            let items = items.clone();
            let (is_else, capture, body) = (*is_else, *capture, *body);

            if is_else {
                if let Some(previous) = else_prong {
                    let idx = self.add_error(prong, "multiple else prongs in switch".to_owned());
                    self.add_note(idx, previous, "previous else prong is here".to_owned());
                    ok = false;
                }
                else_prong = Some(prong);
            }

            // the items of one prong, decorated with their const values
            let mut prong_payload_ty: Option<TypeId> = None;
            let mut payload_uniform = true;
            for &item in &items {
                match domain {
                    Domain::Enum => {
                        let tag = self.analyze_enum_switch_item(item, scope, canonical, &enum_fields);
                        let Some(tag) = tag else {
                            ok = false;
                            continue;
                        };
                        let field = &enum_fields[tag as usize];
                        match prong_payload_ty {
                            None => prong_payload_ty = Some(field.ty),
                            Some(existing) if existing == field.ty => {}
                            Some(_) => payload_uniform = false,
                        }
                        if let Some(previous) = handled_tags[tag as usize] {
                            let idx = self.add_error(item, "duplicate switch value".to_owned());
                            self.add_note(idx, previous, "previous value is here".to_owned());
                            ok = false;
                        } else {
                            handled_tags[tag as usize] = Some(item);
                        }
                    }
                    Domain::Int => {
                        if let NodeKind::SwitchRange { start, end } = self.ast.kind(item) {
                            let (start, end) = (*start, *end);
                            self.analyze_expression(start, scope, Some(target_ty));
                            self.analyze_expression(end, scope, Some(target_ty));
                            let bounds = (
                                self.expr_const(start).and_then(|v| v.as_num().cloned()),
                                self.expr_const(end).and_then(|v| v.as_num().cloned()),
                            );
                            let (Some(lo), Some(hi)) = bounds else {
                                self.add_error(item, "unable to evaluate constant expression".to_owned());
                                ok = false;
                                continue;
                            };
                            if lo.compare(&hi).is_gt() {
                                self.add_error(item, "range start greater than end".to_owned());
                                ok = false;
                            }
                            self.decorate(item, scope, target_ty, None, None);
                        } else {
                            self.analyze_expression(item, scope, Some(target_ty));
                            let Some(value) = self.expr_const(item).and_then(|v| v.as_num().cloned())
                            else {
                                self.add_error(item, "unable to evaluate constant expression".to_owned());
                                ok = false;
                                continue;
                            };
                            if let Some((_, previous)) =
                                seen_ints.iter().find(|(seen, _)| seen.compare(&value).is_eq())
                            {
                                let previous = *previous;
                                let idx = self.add_error(item, "duplicate switch value".to_owned());
                                self.add_note(idx, previous, "previous value is here".to_owned());
                                ok = false;
                            } else {
                                seen_ints.push((value, item));
                            }
                        }
                    }
                    Domain::Bool => {
                        self.analyze_expression(item, scope, Some(target_ty));
                        let Some(value) = self.expr_const(item).and_then(ConstVal::as_bool) else {
                            self.add_error(item, "unable to evaluate constant expression".to_owned());
                            ok = false;
                            continue;
                        };
                        let slot = usize::from(value);
                        if let Some(previous) = seen_bools[slot] {
                            let idx = self.add_error(item, "duplicate switch value".to_owned());
                            self.add_note(idx, previous, "previous value is here".to_owned());
                            ok = false;
                        } else {
                            seen_bools[slot] = Some(item);
                        }
                    }
                }
            }

            let prong_scope = self.scopes.new_scope(Some(scope), prong, import);
            if let Some(capture_name) = capture {
                // a capture binds the shared payload, or the scrutinee when
                // the payload types differ (or for the else prong)
                let capture_ty = match (is_else, prong_payload_ty, payload_uniform) {
                    (false, Some(payload), true) if self.types.has_bits(payload) => payload,
                    _ => target_ty,
                };
                let var = self.scopes.add_variable(Variable {
                    name: capture_name,
                    ty: capture_ty,
                    is_const: true,
                    decl_node: prong,
                    scope: prong_scope,
                    src_arg_index: None,
                    gen_arg_index: None,
                });
                self.bound_vars.insert(prong, var);
                if let Some(fn_id) = self.scopes.get(scope).fn_entry {
                    self.fn_entry_mut(fn_id).variables.push(var);
                }
            }
            let body_ty = self.analyze_expression(body, prong_scope, expected);
            self.decorate(prong, scope, body_ty, None, None);
            bodies.push(body);
        }

        // exhaustiveness without an else prong
        if else_prong.is_none() {
            match domain {
                Domain::Enum => {
                    for (idx, slot) in handled_tags.iter().enumerate() {
                        if slot.is_none() {
                            let member = self.interner.get(enum_fields[idx].name).to_owned();
                            self.add_error(
                                node,
                                format!("enumeration value '{member}' not handled in switch"),
                            );
                            ok = false;
                        }
                    }
                }
                Domain::Int => {
                    self.add_error(node, "switch must handle all possibilities".to_owned());
                    ok = false;
                }
                Domain::Bool => {
                    if seen_bools.iter().any(Option::is_none) {
                        self.add_error(node, "switch must handle all possibilities".to_owned());
                        ok = false;
                    }
                }
            }
        }
        if !ok {
            return self.decorate_invalid(node, scope);
        }

        let result_ty = self.resolve_peer_types(node, scope, &bodies);
        if self.types.is_invalid(result_ty) {
            return self.decorate_invalid(node, scope);
        }

        // constant scrutinee folds to the matching prong
        let const_val = (|| {
            let target_val = self.expr_const(target)?.clone();
            let chosen = self.find_const_prong(prongs, &target_val, else_prong)?;
            let NodeKind::SwitchProng { body, .. } = self.ast.kind(chosen) else {
                return None;
            };
            let mut out = self.expr_const(*body)?.clone();
            out.depends_on_compile_var |= target_val.depends_on_compile_var;
            Some(out)
        })();
        self.decorate(node, scope, result_ty, const_val, None)
    }

    /// Resolves one enum-switch item to its tag; bare member names resolve
    /// against the enum.
    fn analyze_enum_switch_item(
        &mut self,
        item: NodeId,
        scope: ScopeId,
        enum_ty: TypeId,
        fields: &[crate::types::EnumField],
    ) -> Option<u64> {
        if let NodeKind::Symbol(name) = self.ast.kind(item) {
            let name = *name;
            if let Some(field) = fields.iter().find(|f| f.name == name) {
                let tag = field.value;
                self.decorate(
                    item,
                    scope,
                    enum_ty,
                    Some(ConstVal::new(ConstPayload::Enum { tag, payload: None })),
                    None,
                );
                return Some(tag);
            }
        }
        let ty = self.analyze_expression(item, scope, Some(enum_ty));
        if self.types.is_invalid(ty) {
            return None;
        }
        match self.expr_const(item).map(|v| &v.payload) {
            Some(ConstPayload::Enum { tag, .. }) => Some(*tag),
            _ => {
                self.add_error(item, "unable to evaluate constant expression".to_owned());
                None
            }
        }
    }

    /// The prong a constant scrutinee selects.
    pub fn find_const_prong(
        &self,
        prongs: &[NodeId],
        target_val: &ConstVal,
        else_prong: Option<NodeId>,
    ) -> Option<NodeId> {
        for &prong in prongs {
            let NodeKind::SwitchProng { items, is_else, .. } = self.ast.kind(prong) else {
                continue;
            };
            if *is_else {
                continue;
            }
            for &item in items {
                if let NodeKind::SwitchRange { start, end } = self.ast.kind(item) {
                    let (Some(lo), Some(hi)) = (
                        self.expr_const(*start).and_then(|v| v.as_num()),
                        self.expr_const(*end).and_then(|v| v.as_num()),
                    ) else {
                        continue;
                    };
                    if let Some(value) = target_val.as_num() {
                        if !value.compare(lo).is_lt() && !value.compare(hi).is_gt() {
                            return Some(prong);
                        }
                    }
                    continue;
                }
                let Some(item_val) = self.expr_const(item) else {
                    continue;
                };
                let matches = match (&target_val.payload, &item_val.payload) {
                    (ConstPayload::Num(a), ConstPayload::Num(b)) => a.compare(b).is_eq(),
                    (ConstPayload::Bool(a), ConstPayload::Bool(b)) => a == b,
                    (ConstPayload::Enum { tag: a, .. }, ConstPayload::Enum { tag: b, .. }) => a == b,
                    _ => false,
                };
                if matches {
                    return Some(prong);
                }
            }
        }
        else_prong
    }

    // ===== function bodies =====

    /// Analyzes one function definition's body.
    pub fn analyze_fn_body(&mut self, fn_id: FnId) {
        let entry = self.fn_entry(fn_id);
        let (proto, body, import, fn_type) = (
            entry.proto_node,
            entry.body_node,
            entry.import,
            entry.fn_type,
        );
        let Some(body) = body else {
            return;
        };
        let TypeKind::Fn(fn_type_id) = self.types.kind(fn_type).clone() else {
            return;
        };
        let import_scope = self.imports.get(import).scope.expect("import scope missing");
        let fn_scope = self.scopes.new_scope(Some(import_scope), body, import);
        self.scopes.get_mut(fn_scope).fn_entry = Some(fn_id);
        self.fn_entry_mut(fn_id).body_scope = Some(fn_scope);

        // bind parameters
        let NodeKind::FnProto { params, .. } = self.ast.kind(proto) else {
            return;
        };
        let params = params.clone();
        let mut gen_index = 0u32;
        for (src_index, &param) in params.iter().enumerate() {
            let NodeKind::ParamDecl { name, .. } = self.ast.kind(param) else {
                continue;
            };
            let Some(name) = *name else {
                continue;
            };
            let param_ty = fn_type_id.params[src_index].ty;
            let has_bits = self.types.has_bits(param_ty);
            let var = self.scopes.add_variable(Variable {
                name,
                ty: param_ty,
                is_const: true,
                decl_node: param,
                scope: fn_scope,
                src_arg_index: Some(src_index as u32),
                gen_arg_index: has_bits.then(|| {
                    let idx = gen_index;
                    gen_index += 1;
                    idx
                }),
            });
            self.fn_entry_mut(fn_id).variables.push(var);
        }

        let ret_ty = fn_type_id.return_type;
        let canonical_ret = self.types.canonical(ret_ty);
        let expected = if canonical_ret == self.types.builtin.void
            || canonical_ret == self.types.builtin.unreachable_
        {
            None
        } else {
            Some(ret_ty)
        };
        self.analyze_expression(body, fn_scope, expected);
    }
}
