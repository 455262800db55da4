//! Expression lowering: lvalues, operators, calls, aggregates, runtime
//! intrinsics.

use std::str::FromStr;

use crate::{
    analyze::{ImplicitCast, Intrinsic},
    ast::{BinOp, NodeId, NodeKind, PrefixOp},
    codegen::Cg,
    ir::{
        builder::{FloatPred, IntPred},
        CallConv, ValueRef,
    },
    run::Compilation,
    types::{TypeId, TypeKind},
    value::CastOp,
};

impl Compilation {
    /// Attaches the node's source location to subsequently emitted
    /// instructions.
    pub(crate) fn set_loc(&self, cg: &mut Cg, node: NodeId) {
        let Some(&scope) = cg.di_scope_stack.last() else {
            return;
        };
        let import = self.ast.import_of(node);
        let span = self.ast.span(node);
        let loc = self.imports.get(import).line_offsets.locate(span.start);
        let md = cg.module.di.create_location(loc.line, loc.column, scope);
        cg.b.set_location(md);
    }

    /// Emits an expression. `None` means the value has no runtime
    /// representation (void, zero-bit, or diverged).
    pub(crate) fn gen_expr(&mut self, cg: &mut Cg, node: NodeId) -> Option<ValueRef> {
        let info = self.expr_info(node);
        let (ty, cast, const_val) = (info.ty, info.cast, info.const_val.clone());

        // fully folded expressions materialize as constants
        if let Some(value) = &const_val {
            if !self.types.has_bits(ty) {
                return None;
            }
            if let Some(materialized) = self.gen_const(cg, ty, value) {
                return Some(materialized);
            }
            // constants without an inline form (payload enums) fall through
            // to the runtime path
        }

        let raw = self.gen_raw(cg, node);
        match cast {
            Some(cast) => self.gen_cast_value(cg, raw, cast),
            None => raw,
        }
    }

    fn gen_raw(&mut self, cg: &mut Cg, node: NodeId) -> Option<ValueRef> {
        match self.ast.kind(node) {
            NodeKind::Symbol(_) => {
                let info = self.expr_info(node);
                let var = info.variable?;
                let var_ty = self.scopes.var(var).ty;
                if !self.types.has_bits(var_ty) {
                    return None;
                }
                let ptr = cg.var_ptrs.get(&var)?.clone();
                Some(self.value_at(cg, &ptr, var_ty))
            }
            NodeKind::FieldAccess { .. } | NodeKind::ArrayAccess { .. } => {
                let ptr = self.gen_lvalue(cg, node)?;
                let ty = self.raw_type(node);
                Some(self.value_at(cg, &ptr, ty))
            }
            NodeKind::PrefixOpExpr { op, operand } => {
                let (op, operand) = (*op, *operand);
                self.gen_prefix(cg, node, op, operand)
            }
            NodeKind::BinOpExpr { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                self.gen_bin_op(cg, node, op, lhs, rhs)
            }
            NodeKind::UnwrapErrExpr {
                target, fallback, ..
            } => {
                let (target, fallback) = (*target, *fallback);
                self.gen_unwrap_err(cg, node, target, fallback)
            }
            NodeKind::Call { callee, args } => {
                let (callee, args) = (*callee, args.clone());
                self.gen_call(cg, node, callee, &args)
            }
            NodeKind::IntrinsicCall { name, args } => {
                let (name, args) = (*name, args.clone());
                self.gen_intrinsic(cg, node, name, &args)
            }
            NodeKind::StructInit { fields, .. } => {
                let fields = fields.clone();
                self.gen_struct_init(cg, node, &fields)
            }
            NodeKind::ArrayInit { elems, .. } => {
                let elems = elems.clone();
                self.gen_array_init(cg, node, &elems)
            }
            NodeKind::SliceExpr { target, start, end } => {
                let (target, start, end) = (*target, *start, *end);
                self.gen_slice_expr(cg, node, target, start, end)
            }
            NodeKind::Block { stmts } => {
                let stmts = stmts.clone();
                self.gen_block(cg, node, &stmts)
            }
            NodeKind::Return { value } => {
                let value = *value;
                self.gen_return(cg, node, value)
            }
            NodeKind::Defer { .. } => {
                // the body runs at scope exit, not here
                None
            }
            NodeKind::Break => {
                let scope = self.expr_info(node).scope;
                self.run_defers_to_loop(cg, scope);
                let target = cg.loop_stack.last().expect("break outside loop").break_block;
                cg.b.build_br(&mut cg.module, target);
                None
            }
            NodeKind::Continue => {
                let scope = self.expr_info(node).scope;
                self.run_defers_to_loop(cg, scope);
                let target = cg
                    .loop_stack
                    .last()
                    .expect("continue outside loop")
                    .continue_block;
                cg.b.build_br(&mut cg.module, target);
                None
            }
            NodeKind::VarDecl { .. } => self.gen_local_var(cg, node),
            NodeKind::If {
                cond,
                then_body,
                else_body,
            } => {
                let (cond, then_body, else_body) = (*cond, *then_body, *else_body);
                self.gen_if(cg, node, cond, then_body, else_body)
            }
            NodeKind::IfMaybe {
                expr,
                then_body,
                else_body,
                ..
            } => {
                let (expr, then_body, else_body) = (*expr, *then_body, *else_body);
                self.gen_if_maybe(cg, node, expr, then_body, else_body)
            }
            NodeKind::While { cond, body } => {
                let (cond, body) = (*cond, *body);
                self.gen_while(cg, node, cond, body)
            }
            NodeKind::For {
                iterable, body, ..
            } => {
                let (iterable, body) = (*iterable, *body);
                self.gen_for(cg, node, iterable, body)
            }
            NodeKind::Switch { target, prongs } => {
                let (target, prongs) = (*target, prongs.clone());
                self.gen_switch(cg, node, target, &prongs)
            }
            // literals and type expressions always fold
            _ => None,
        }
    }

    /// The node's type before its recorded cast.
    fn raw_type(&self, node: NodeId) -> TypeId {
        match self.expr_info(node).cast {
            Some(cast) => cast.from,
            None => self.expr_info(node).ty,
        }
    }

    /// Reads an expression value out of a storage address: handle types
    /// stay as the pointer, scalars load.
    pub(crate) fn value_at(&mut self, cg: &mut Cg, ptr: &ValueRef, ty: TypeId) -> ValueRef {
        if self.types.is_handle_type(ty) {
            ptr.clone()
        } else {
            cg.b.build_load(&mut cg.module, ptr)
        }
    }

    /// Stores a value into `dst`: memcpy for handle types, store otherwise.
    pub(crate) fn store_value(&mut self, cg: &mut Cg, dst: &ValueRef, value: &ValueRef, ty: TypeId) {
        if self.types.is_handle_type(ty) {
            let entry = self.types.get(self.types.canonical(ty));
            let (size, align) = (entry.abi_size, entry.abi_align);
            let len_ty = cg.module.types.int(64);
            let len = cg.module.const_int(len_ty, size);
            cg.b.build_memcpy(&mut cg.module, dst, value, &len, align);
        } else {
            cg.b.build_store(&mut cg.module, value, dst);
        }
    }

    /// Allocates stack storage for a value of `ty`.
    pub(crate) fn alloca_for(&mut self, cg: &mut Cg, ty: TypeId) -> ValueRef {
        let canonical = self.types.canonical(ty);
        let type_ref = self.type_ref(cg, canonical);
        let align = self.types.get(canonical).abi_align;
        cg.b.build_alloca(&mut cg.module, type_ref, align)
    }

    // ===== lvalues =====

    pub(crate) fn gen_lvalue(&mut self, cg: &mut Cg, node: NodeId) -> Option<ValueRef> {
        match self.ast.kind(node) {
            NodeKind::Symbol(_) => {
                let var = self.expr_info(node).variable?;
                cg.var_ptrs.get(&var).cloned()
            }
            NodeKind::FieldAccess { target, name } => {
                let (target, name) = (*target, *name);
                let mut target_ty = self.types.canonical(self.expr_type(target));
                let base = self.gen_expr(cg, target)?;
                if let TypeKind::Pointer { child, .. } = *self.types.kind(target_ty) {
                    // the loaded pointer value is already the address
                    target_ty = self.types.canonical(child);
                }
                match self.types.kind(target_ty).clone() {
                    TypeKind::Struct { fields, .. } => {
                        let field = fields.iter().find(|f| f.name == name)?;
                        let gen_index = field.gen_index?;
                        let field_ref = self.type_ref(cg, field.ty);
                        Some(cg.b.build_struct_gep(&mut cg.module, &base, gen_index, field_ref))
                    }
                    TypeKind::Slice { child, .. } => {
                        let field_name = self.interner.get(name).to_owned();
                        if field_name == "ptr" {
                            let child_ref = self.type_ref(cg, child);
                            let ptr_ty = cg.module.types.ptr(child_ref);
                            Some(cg.b.build_struct_gep(&mut cg.module, &base, 0, ptr_ty))
                        } else {
                            let len_ty = cg.module.types.int(self.types.ptr_bits());
                            Some(cg.b.build_struct_gep(&mut cg.module, &base, 1, len_ty))
                        }
                    }
                    _ => None,
                }
            }
            NodeKind::ArrayAccess { target, index } => {
                let (target, index) = (*target, *index);
                let target_ty = self.types.canonical(self.expr_type(target));
                let index_val = self.gen_expr(cg, index)?;
                match *self.types.kind(target_ty) {
                    TypeKind::Array { child, .. } => {
                        let base = self.gen_expr(cg, target)?;
                        let child_ref = self.type_ref(cg, child);
                        let i64_ty = cg.module.types.int(64);
                        let zero = cg.module.const_int(i64_ty, 0);
                        Some(cg.b.build_gep(&mut cg.module, &base, &[zero, index_val], child_ref))
                    }
                    TypeKind::Slice { child, .. } => {
                        let slice_ptr = self.gen_expr(cg, target)?;
                        let child_ref = self.type_ref(cg, child);
                        let elem_ptr_ty = cg.module.types.ptr(child_ref);
                        let ptr_field =
                            cg.b.build_struct_gep(&mut cg.module, &slice_ptr, 0, elem_ptr_ty);
                        let data_ptr = cg.b.build_load(&mut cg.module, &ptr_field);
                        Some(cg.b.build_gep(&mut cg.module, &data_ptr, &[index_val], child_ref))
                    }
                    TypeKind::Pointer { child, .. } => {
                        let base = self.gen_expr(cg, target)?;
                        let child_ref = self.type_ref(cg, child);
                        Some(cg.b.build_gep(&mut cg.module, &base, &[index_val], child_ref))
                    }
                    _ => None,
                }
            }
            NodeKind::PrefixOpExpr {
                op: PrefixOp::Dereference,
                operand,
            } => self.gen_expr(cg, *operand),
            _ => None,
        }
    }

    // ===== operators =====

    fn gen_prefix(
        &mut self,
        cg: &mut Cg,
        node: NodeId,
        op: PrefixOp,
        operand: NodeId,
    ) -> Option<ValueRef> {
        match op {
            PrefixOp::Negation => {
                let value = self.gen_expr(cg, operand)?;
                let ty = self.types.canonical(self.expr_type(operand));
                if matches!(self.types.kind(ty), TypeKind::Float { .. }) {
                    Some(cg.b.build_fneg(&mut cg.module, &value))
                } else {
                    Some(cg.b.build_neg(&mut cg.module, &value))
                }
            }
            PrefixOp::BoolNot => {
                let value = self.gen_expr(cg, operand)?;
                let true_val = cg.module.const_bool(true);
                Some(cg.b.build_xor(&mut cg.module, &value, &true_val))
            }
            PrefixOp::BinNot => {
                let value = self.gen_expr(cg, operand)?;
                Some(cg.b.build_not(&mut cg.module, &value))
            }
            PrefixOp::AddressOf { .. } => self.gen_lvalue(cg, operand),
            PrefixOp::Dereference => {
                let ptr = self.gen_expr(cg, operand)?;
                let ty = self.raw_type(node);
                Some(self.value_at(cg, &ptr, ty))
            }
            PrefixOp::UnwrapError => self.gen_unwrap_err_checked(cg, node, operand),
            PrefixOp::UnwrapMaybe => self.gen_unwrap_maybe_checked(cg, node, operand),
            // type constructors fold at compile time
            PrefixOp::MaybeType | PrefixOp::ErrorUnionType => None,
        }
    }

    fn gen_bin_op(
        &mut self,
        cg: &mut Cg,
        node: NodeId,
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Option<ValueRef> {
        if op.is_assignment() {
            return self.gen_assign(cg, node, op, lhs, rhs);
        }
        match op {
            BinOp::BoolAnd | BinOp::BoolOr => self.gen_short_circuit(cg, op, lhs, rhs),
            BinOp::UnwrapMaybe => self.gen_unwrap_maybe_or(cg, node, lhs, rhs),
            BinOp::CmpEq
            | BinOp::CmpNotEq
            | BinOp::CmpLessThan
            | BinOp::CmpGreaterThan
            | BinOp::CmpLessOrEq
            | BinOp::CmpGreaterOrEq => {
                let lhs_val = self.gen_expr(cg, lhs)?;
                let rhs_val = self.gen_expr(cg, rhs)?;
                let operand_ty = self.types.canonical(self.expr_type(lhs));
                match self.types.kind(operand_ty) {
                    TypeKind::Float { .. } => {
                        let pred = match op {
                            BinOp::CmpEq => FloatPred::Oeq,
                            BinOp::CmpNotEq => FloatPred::One,
                            BinOp::CmpLessThan => FloatPred::Olt,
                            BinOp::CmpGreaterThan => FloatPred::Ogt,
                            BinOp::CmpLessOrEq => FloatPred::Ole,
                            _ => FloatPred::Oge,
                        };
                        Some(cg.b.build_fcmp(&mut cg.module, pred, &lhs_val, &rhs_val))
                    }
                    kind => {
                        let signed = matches!(kind, TypeKind::Int { is_signed: true, .. });
                        let pred = match (op, signed) {
                            (BinOp::CmpEq, _) => IntPred::Eq,
                            (BinOp::CmpNotEq, _) => IntPred::Ne,
                            (BinOp::CmpLessThan, true) => IntPred::Slt,
                            (BinOp::CmpLessThan, false) => IntPred::Ult,
                            (BinOp::CmpGreaterThan, true) => IntPred::Sgt,
                            (BinOp::CmpGreaterThan, false) => IntPred::Ugt,
                            (BinOp::CmpLessOrEq, true) => IntPred::Sle,
                            (BinOp::CmpLessOrEq, false) => IntPred::Ule,
                            (BinOp::CmpGreaterOrEq, true) => IntPred::Sge,
                            (_, false) => IntPred::Uge,
                            (_, true) => IntPred::Sge,
                        };
                        // enums with a bare tag compare directly; tagged
                        // unions compare their tag field
                        let (lhs_val, rhs_val) = if matches!(kind, TypeKind::Enum { .. }) {
                            (
                                self.enum_tag_value(cg, &lhs_val, operand_ty),
                                self.enum_tag_value(cg, &rhs_val, operand_ty),
                            )
                        } else {
                            (lhs_val, rhs_val)
                        };
                        Some(cg.b.build_icmp(&mut cg.module, pred, &lhs_val, &rhs_val))
                    }
                }
            }
            _ => {
                let lhs_val = self.gen_expr(cg, lhs)?;
                let rhs_val = self.gen_expr(cg, rhs)?;
                let ty = self.types.canonical(self.expr_type(node));
                Some(self.gen_arith_op(cg, op, ty, &lhs_val, &rhs_val))
            }
        }
    }

    pub(crate) fn gen_arith_op(
        &mut self,
        cg: &mut Cg,
        op: BinOp,
        ty: TypeId,
        lhs: &ValueRef,
        rhs: &ValueRef,
    ) -> ValueRef {
        let kind = self.types.kind(self.types.canonical(ty)).clone();
        let is_float = matches!(kind, TypeKind::Float { .. });
        let signed = matches!(kind, TypeKind::Int { is_signed: true, .. });
        let m = &mut cg.module;
        match op {
            BinOp::Add if is_float => cg.b.build_fadd(m, lhs, rhs),
            BinOp::Add => cg.b.build_add(m, lhs, rhs),
            BinOp::Sub if is_float => cg.b.build_fsub(m, lhs, rhs),
            BinOp::Sub => cg.b.build_sub(m, lhs, rhs),
            BinOp::Mult if is_float => cg.b.build_fmul(m, lhs, rhs),
            BinOp::Mult => cg.b.build_mul(m, lhs, rhs),
            BinOp::Div if is_float => cg.b.build_fdiv(m, lhs, rhs),
            BinOp::Div if signed => cg.b.build_sdiv(m, lhs, rhs),
            BinOp::Div => cg.b.build_udiv(m, lhs, rhs),
            BinOp::Mod if is_float => cg.b.build_frem(m, lhs, rhs),
            BinOp::Mod if signed => cg.b.build_srem(m, lhs, rhs),
            BinOp::Mod => cg.b.build_urem(m, lhs, rhs),
            BinOp::BinAnd => cg.b.build_and(m, lhs, rhs),
            BinOp::BinOr => cg.b.build_or(m, lhs, rhs),
            BinOp::BinXor => cg.b.build_xor(m, lhs, rhs),
            BinOp::BitShiftLeft => cg.b.build_shl(m, lhs, rhs),
            BinOp::BitShiftRight if signed => cg.b.build_ashr(m, lhs, rhs),
            BinOp::BitShiftRight => cg.b.build_lshr(m, lhs, rhs),
            _ => unreachable!("non-arithmetic operator"),
        }
    }

    fn gen_short_circuit(
        &mut self,
        cg: &mut Cg,
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Option<ValueRef> {
        let func = cg.cur_func.expect("no current function");
        let lhs_val = self.gen_expr(cg, lhs)?;
        let lhs_block = cg.b.current_block();
        let rhs_block = cg.module.append_block(func, "rhs");
        let end_block = cg.module.append_block(func, "bool_end");
        if op == BinOp::BoolAnd {
            cg.b.build_cond_br(&mut cg.module, &lhs_val, rhs_block, end_block);
        } else {
            cg.b.build_cond_br(&mut cg.module, &lhs_val, end_block, rhs_block);
        }
        cg.b.position_at_end(rhs_block);
        let rhs_val = self.gen_expr(cg, rhs);
        let rhs_end = cg.b.current_block();
        let rhs_diverged = cg.module.block_is_terminated(rhs_end);
        if !rhs_diverged {
            cg.b.build_br(&mut cg.module, end_block);
        }
        cg.b.position_at_end(end_block);
        let short_val = cg.module.const_bool(op == BinOp::BoolOr);
        let i1 = cg.module.types.int(1);
        let mut incoming = vec![(short_val, lhs_block)];
        if let (Some(rhs_val), false) = (rhs_val, rhs_diverged) {
            incoming.push((rhs_val, rhs_end));
        }
        Some(cg.b.build_phi(&mut cg.module, i1, &incoming))
    }

    fn gen_assign(
        &mut self,
        cg: &mut Cg,
        _node: NodeId,
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Option<ValueRef> {
        let lhs_ty = self.expr_type(lhs);
        if !self.types.has_bits(lhs_ty) {
            // still evaluate the right side for effects
            self.gen_expr(cg, rhs);
            return None;
        }
        let dst = self.gen_lvalue(cg, lhs)?;
        match op.compound_op() {
            Some(compound) => {
                let old = cg.b.build_load(&mut cg.module, &dst);
                let rhs_val = self.gen_expr(cg, rhs)?;
                let new = self.gen_arith_op(cg, compound, lhs_ty, &old, &rhs_val);
                cg.b.build_store(&mut cg.module, &new, &dst);
            }
            None => {
                let rhs_val = self.gen_expr(cg, rhs)?;
                self.store_value(cg, &dst, &rhs_val, lhs_ty);
            }
        }
        None
    }

    // ===== casts =====

    fn gen_cast_value(
        &mut self,
        cg: &mut Cg,
        value: Option<ValueRef>,
        cast: ImplicitCast,
    ) -> Option<ValueRef> {
        let from = self.types.canonical(cast.from);
        let to = self.types.canonical(cast.target);
        match cast.op {
            CastOp::Noop => value,
            CastOp::WidenOrShorten => {
                let value = value?;
                match (self.types.kind(from).clone(), self.types.kind(to).clone()) {
                    (
                        TypeKind::Int { is_signed, bits: from_bits },
                        TypeKind::Int { bits: to_bits, .. },
                    ) => {
                        let to_ref = self.type_ref(cg, to);
                        Some(if to_bits < from_bits {
                            cg.b.build_trunc(&mut cg.module, &value, to_ref)
                        } else if to_bits > from_bits && is_signed {
                            cg.b.build_sext(&mut cg.module, &value, to_ref)
                        } else if to_bits > from_bits {
                            cg.b.build_zext(&mut cg.module, &value, to_ref)
                        } else {
                            value
                        })
                    }
                    (TypeKind::Float { bits: from_bits }, TypeKind::Float { bits: to_bits }) => {
                        let to_ref = self.type_ref(cg, to);
                        Some(if to_bits < from_bits {
                            cg.b.build_fptrunc(&mut cg.module, &value, to_ref)
                        } else if to_bits > from_bits {
                            cg.b.build_fpext(&mut cg.module, &value, to_ref)
                        } else {
                            value
                        })
                    }
                    _ => Some(value),
                }
            }
            CastOp::BoolToInt => {
                let value = value?;
                let to_ref = self.type_ref(cg, to);
                Some(cg.b.build_zext(&mut cg.module, &value, to_ref))
            }
            CastOp::PtrToInt => {
                let value = value?;
                let to_ref = self.type_ref(cg, to);
                Some(cg.b.build_ptrtoint(&mut cg.module, &value, to_ref))
            }
            CastOp::IntToPtr => {
                let value = value?;
                let to_ref = self.type_ref(cg, to);
                Some(cg.b.build_inttoptr(&mut cg.module, &value, to_ref))
            }
            CastOp::IntToFloat => {
                let value = value?;
                let to_ref = self.type_ref(cg, to);
                let signed = matches!(self.types.kind(from), TypeKind::Int { is_signed: true, .. });
                Some(if signed {
                    cg.b.build_sitofp(&mut cg.module, &value, to_ref)
                } else {
                    cg.b.build_uitofp(&mut cg.module, &value, to_ref)
                })
            }
            CastOp::FloatToInt => {
                let value = value?;
                let to_ref = self.type_ref(cg, to);
                let signed = matches!(self.types.kind(to), TypeKind::Int { is_signed: true, .. });
                Some(if signed {
                    cg.b.build_fptosi(&mut cg.module, &value, to_ref)
                } else {
                    cg.b.build_fptoui(&mut cg.module, &value, to_ref)
                })
            }
            CastOp::PointerReinterpret => {
                let value = value?;
                let to_ref = self.type_ref(cg, to);
                Some(cg.b.build_bitcast(&mut cg.module, &value, to_ref))
            }
            CastOp::ToUnknownSizeArray => {
                // build the {ptr, len} pair in a temporary
                let value = value?;
                let TypeKind::Array { child, len } = *self.types.kind(from) else {
                    return Some(value);
                };
                let slice_ptr = self.alloca_for(cg, to);
                let child_ref = self.type_ref(cg, child);
                let i64_ty = cg.module.types.int(64);
                let zero = cg.module.const_int(i64_ty, 0);
                let first =
                    cg.b.build_gep(&mut cg.module, &value, &[zero.clone(), zero], child_ref);
                let elem_ptr_ty = cg.module.types.ptr(child_ref);
                let ptr_slot = cg.b.build_struct_gep(&mut cg.module, &slice_ptr, 0, elem_ptr_ty);
                cg.b.build_store(&mut cg.module, &first, &ptr_slot);
                let len_ty = cg.module.types.int(self.types.ptr_bits());
                let len_slot = cg.b.build_struct_gep(&mut cg.module, &slice_ptr, 1, len_ty);
                let len_val = cg.module.const_int(len_ty, len);
                cg.b.build_store(&mut cg.module, &len_val, &len_slot);
                Some(slice_ptr)
            }
            CastOp::MaybeWrap => {
                let TypeKind::Maybe { child } = *self.types.kind(to) else {
                    return value;
                };
                if self.types.maybe_is_pointer(child) {
                    return value;
                }
                let storage = self.alloca_for(cg, to);
                if self.types.has_bits(child) {
                    let child_ref = self.type_ref(cg, child);
                    let value_slot = cg.b.build_struct_gep(&mut cg.module, &storage, 0, child_ref);
                    if let Some(value) = value {
                        self.store_value(cg, &value_slot, &value, child);
                    }
                    let i1 = cg.module.types.int(1);
                    let flag_slot = cg.b.build_struct_gep(&mut cg.module, &storage, 1, i1);
                    let true_val = cg.module.const_bool(true);
                    cg.b.build_store(&mut cg.module, &true_val, &flag_slot);
                } else {
                    let true_val = cg.module.const_bool(true);
                    cg.b.build_store(&mut cg.module, &true_val, &storage);
                }
                Some(storage)
            }
            CastOp::ErrorWrap => {
                let TypeKind::ErrorUnion { child } = *self.types.kind(to) else {
                    return value;
                };
                let tag_ty = cg.module.types.int(crate::types::ERR_TAG_BITS);
                let ok_tag = cg.module.const_int(tag_ty, 0);
                if !self.types.has_bits(child) {
                    return Some(ok_tag);
                }
                let storage = self.alloca_for(cg, to);
                let tag_slot = cg.b.build_struct_gep(&mut cg.module, &storage, 0, tag_ty);
                cg.b.build_store(&mut cg.module, &ok_tag, &tag_slot);
                if let Some(value) = value {
                    let child_ref = self.type_ref(cg, child);
                    let payload_slot =
                        cg.b.build_struct_gep(&mut cg.module, &storage, 1, child_ref);
                    self.store_value(cg, &payload_slot, &value, child);
                }
                Some(storage)
            }
            CastOp::PureErrorWrap => {
                let value = value?;
                let TypeKind::ErrorUnion { child } = *self.types.kind(to) else {
                    return Some(value);
                };
                if !self.types.has_bits(child) {
                    return Some(value);
                }
                let storage = self.alloca_for(cg, to);
                let tag_ty = cg.module.types.int(crate::types::ERR_TAG_BITS);
                let tag_slot = cg.b.build_struct_gep(&mut cg.module, &storage, 0, tag_ty);
                cg.b.build_store(&mut cg.module, &value, &tag_slot);
                Some(storage)
            }
            CastOp::ErrToInt => {
                let value = value?;
                // the value is already the bare tag for pure errors and
                // collapsed error unions
                let to_ref = self.type_ref(cg, to);
                let to_bits = cg.module.types.int_bits(to_ref).unwrap_or(64);
                if to_bits > crate::types::ERR_TAG_BITS {
                    Some(cg.b.build_zext(&mut cg.module, &value, to_ref))
                } else if to_bits < crate::types::ERR_TAG_BITS {
                    Some(cg.b.build_trunc(&mut cg.module, &value, to_ref))
                } else {
                    Some(value)
                }
            }
        }
    }

    // ===== calls =====

    fn gen_call(
        &mut self,
        cg: &mut Cg,
        node: NodeId,
        callee: NodeId,
        args: &[NodeId],
    ) -> Option<ValueRef> {
        // enum member construction
        if let Some(&(tag, payload_ty)) = self.enum_ctors.get(&node) {
            return self.gen_enum_ctor(cg, node, tag, payload_ty, args);
        }
        // explicit casts route the argument through the node's cast
        let callee_ty = self.types.canonical(self.expr_type(callee));
        if callee_ty == self.types.builtin.meta_type {
            return self.gen_expr(cg, args[0]);
        }

        let callee_info = self.expr_info(callee);
        let direct = callee_info
            .const_val
            .as_ref()
            .and_then(|v| match v.payload {
                crate::value::ConstPayload::Fn(fn_id) => Some(fn_id),
                _ => None,
            });

        let TypeKind::Fn(fn_type_id) = self.types.kind(callee_ty).clone() else {
            return None;
        };
        let ret_ty = fn_type_id.return_type;
        let sret = self.types.is_handle_type(ret_ty);

        let mut ir_args = Vec::new();
        let ret_slot = if sret {
            let slot = self.alloca_for(cg, ret_ty);
            ir_args.push(slot.clone());
            Some(slot)
        } else {
            None
        };
        for (idx, &arg) in args.iter().enumerate() {
            let param_ty = fn_type_id.params.get(idx).map(|p| p.ty);
            let zero_bit = param_ty.is_some_and(|ty| !self.types.has_bits(ty));
            let value = self.gen_expr(cg, arg);
            if zero_bit {
                continue;
            }
            if let Some(value) = value {
                ir_args.push(value);
            }
        }

        self.set_loc(cg, node);
        let result = match direct {
            Some(fn_id) => {
                let lowering = cg.fn_lowerings.get(&fn_id).expect("callee not declared").clone();
                cg.b.build_call(&mut cg.module, lowering.func, &ir_args)
            }
            None => {
                let callee_val = self.gen_expr(cg, callee)?;
                let cc = if fn_type_id.is_extern {
                    CallConv::C
                } else if fn_type_id.is_cold {
                    CallConv::Cold
                } else {
                    CallConv::Fast
                };
                cg.b.build_indirect_call(&mut cg.module, &callee_val, &ir_args, cc)
            }
        };
        if self.types.canonical(ret_ty) == self.types.builtin.unreachable_ {
            cg.b.build_unreachable(&mut cg.module);
            return None;
        }
        match ret_slot {
            Some(slot) => Some(slot),
            None => result,
        }
    }

    fn gen_enum_ctor(
        &mut self,
        cg: &mut Cg,
        node: NodeId,
        tag: u64,
        payload_ty: TypeId,
        args: &[NodeId],
    ) -> Option<ValueRef> {
        let enum_ty = self.expr_info(node).ty;
        let canonical = self.types.canonical(enum_ty);
        let TypeKind::Enum { tag_type, .. } = self.types.kind(canonical).clone() else {
            return None;
        };
        let storage = self.alloca_for(cg, enum_ty);
        let tag_ref = self.type_ref(cg, tag_type);
        let tag_slot = cg.b.build_struct_gep(&mut cg.module, &storage, 0, tag_ref);
        let tag_val = cg.module.const_int(tag_ref, tag);
        cg.b.build_store(&mut cg.module, &tag_val, &tag_slot);

        let payload_val = self.gen_expr(cg, args[0]);
        if let Some(payload_val) = payload_val {
            // the union area is typed as the largest payload; go through
            // the variant's own layout
            let payloads = self.types.enum_payload_types(canonical);
            let largest_ref = self.type_ref(cg, payloads[0]);
            let union_slot = cg.b.build_struct_gep(&mut cg.module, &storage, 1, largest_ref);
            let variant_ref = self.type_ref(cg, payload_ty);
            let variant_ptr_ty = cg.module.types.ptr(variant_ref);
            let variant_slot = cg.b.build_bitcast(&mut cg.module, &union_slot, variant_ptr_ty);
            self.store_value(cg, &variant_slot, &payload_val, payload_ty);
        }
        Some(storage)
    }

    /// The tag of an enum value, whether or not it carries payloads.
    pub(crate) fn enum_tag_value(&mut self, cg: &mut Cg, value: &ValueRef, enum_ty: TypeId) -> ValueRef {
        let canonical = self.types.canonical(enum_ty);
        let TypeKind::Enum { tag_type, .. } = self.types.kind(canonical).clone() else {
            return value.clone();
        };
        if self.types.enum_payload_types(canonical).is_empty() {
            return value.clone();
        }
        let tag_ref = self.type_ref(cg, tag_type);
        let tag_slot = cg.b.build_struct_gep(&mut cg.module, value, 0, tag_ref);
        cg.b.build_load(&mut cg.module, &tag_slot)
    }

    // ===== runtime intrinsics =====

    fn gen_intrinsic(
        &mut self,
        cg: &mut Cg,
        node: NodeId,
        name: crate::intern::StringId,
        args: &[NodeId],
    ) -> Option<ValueRef> {
        let text = self.interner.get(name).to_owned();
        let intrinsic = Intrinsic::from_str(&text).ok()?;
        match intrinsic {
            Intrinsic::AddWithOverflow | Intrinsic::SubWithOverflow | Intrinsic::MulWithOverflow => {
                let op = match intrinsic {
                    Intrinsic::AddWithOverflow => "add",
                    Intrinsic::SubWithOverflow => "sub",
                    _ => "mul",
                };
                let target = self.expr_const(args[0]).and_then(crate::value::ConstVal::as_type)?;
                let signed = matches!(
                    self.types.kind(self.types.canonical(target)),
                    TypeKind::Int { is_signed: true, .. }
                );
                let lhs = self.gen_expr(cg, args[1])?;
                let rhs = self.gen_expr(cg, args[2])?;
                let out_ptr = self.gen_expr(cg, args[3])?;
                self.set_loc(cg, node);
                let agg = cg.b.build_overflow_op(&mut cg.module, op, signed, &lhs, &rhs);
                let result = cg.b.build_extract_value(&mut cg.module, &agg, 0, lhs.ty);
                cg.b.build_store(&mut cg.module, &result, &out_ptr);
                let i1 = cg.module.types.int(1);
                Some(cg.b.build_extract_value(&mut cg.module, &agg, 1, i1))
            }
            Intrinsic::Memcpy => {
                let dest = self.gen_expr(cg, args[0])?;
                let src = self.gen_expr(cg, args[1])?;
                let len = self.gen_expr(cg, args[2])?;
                cg.b.build_memcpy(&mut cg.module, &dest, &src, &len, 1);
                None
            }
            Intrinsic::Memset => {
                let dest = self.gen_expr(cg, args[0])?;
                let byte = self.gen_expr(cg, args[1])?;
                let len = self.gen_expr(cg, args[2])?;
                cg.b.build_memset(&mut cg.module, &dest, &byte, &len, 1);
                None
            }
            Intrinsic::Ctz | Intrinsic::Clz => {
                let value = self.gen_expr(cg, args[1])?;
                let leading = intrinsic == Intrinsic::Clz;
                Some(cg.b.build_count_zeros(&mut cg.module, leading, &value))
            }
            Intrinsic::ConstEval => self.gen_expr(cg, args[0]),
            // everything else folded during analysis
            _ => None,
        }
    }

    // ===== aggregates =====

    fn gen_struct_init(
        &mut self,
        cg: &mut Cg,
        node: NodeId,
        field_inits: &[crate::ast::FieldInit],
    ) -> Option<ValueRef> {
        let ty = self.raw_type(node);
        let canonical = self.types.canonical(ty);
        if !self.types.has_bits(canonical) {
            for init in field_inits {
                self.gen_expr(cg, init.value);
            }
            return None;
        }
        let TypeKind::Struct { fields, .. } = self.types.kind(canonical).clone() else {
            return None;
        };
        let storage = self.alloca_for(cg, canonical);
        for init in field_inits {
            let Some(field) = fields.iter().find(|f| f.name == init.name) else {
                continue;
            };
            let value = self.gen_expr(cg, init.value);
            let Some(gen_index) = field.gen_index else {
                continue;
            };
            if let Some(value) = value {
                let field_ref = self.type_ref(cg, field.ty);
                let slot = cg.b.build_struct_gep(&mut cg.module, &storage, gen_index, field_ref);
                self.store_value(cg, &slot, &value, field.ty);
            }
        }
        Some(storage)
    }

    fn gen_array_init(&mut self, cg: &mut Cg, node: NodeId, elems: &[NodeId]) -> Option<ValueRef> {
        let ty = self.raw_type(node);
        let canonical = self.types.canonical(ty);
        if !self.types.has_bits(canonical) {
            for &elem in elems {
                self.gen_expr(cg, elem);
            }
            return None;
        }
        let TypeKind::Array { child, .. } = *self.types.kind(canonical) else {
            return None;
        };
        let storage = self.alloca_for(cg, canonical);
        let child_ref = self.type_ref(cg, child);
        let i64_ty = cg.module.types.int(64);
        for (idx, &elem) in elems.iter().enumerate() {
            let value = self.gen_expr(cg, elem);
            if let Some(value) = value {
                let zero = cg.module.const_int(i64_ty, 0);
                let index = cg.module.const_int(i64_ty, idx as u64);
                let slot = cg.b.build_gep(&mut cg.module, &storage, &[zero, index], child_ref);
                self.store_value(cg, &slot, &value, child);
            }
        }
        Some(storage)
    }

    fn gen_slice_expr(
        &mut self,
        cg: &mut Cg,
        node: NodeId,
        target: NodeId,
        start: NodeId,
        end: Option<NodeId>,
    ) -> Option<ValueRef> {
        let slice_ty = self.raw_type(node);
        let target_ty = self.types.canonical(self.expr_type(target));
        let TypeKind::Slice { child, .. } = *self.types.kind(self.types.canonical(slice_ty)) else {
            return None;
        };
        let child_ref = self.type_ref(cg, child);
        let len_ty = cg.module.types.int(self.types.ptr_bits());

        let target_val = self.gen_expr(cg, target)?;
        let start_val = self.gen_expr(cg, start)?;

        // base element pointer and total length of the target
        let (base_ptr, total_len) = match *self.types.kind(target_ty) {
            TypeKind::Array { len, .. } => {
                let i64_ty = cg.module.types.int(64);
                let zero = cg.module.const_int(i64_ty, 0);
                let first = cg.b.build_gep(
                    &mut cg.module,
                    &target_val,
                    &[zero.clone(), zero],
                    child_ref,
                );
                let total = cg.module.const_int(len_ty, len);
                (first, total)
            }
            TypeKind::Slice { .. } => {
                let elem_ptr_ty = cg.module.types.ptr(child_ref);
                let ptr_slot = cg.b.build_struct_gep(&mut cg.module, &target_val, 0, elem_ptr_ty);
                let data = cg.b.build_load(&mut cg.module, &ptr_slot);
                let len_slot = cg.b.build_struct_gep(&mut cg.module, &target_val, 1, len_ty);
                let total = cg.b.build_load(&mut cg.module, &len_slot);
                (data, total)
            }
            TypeKind::Pointer { .. } => {
                let undef_len = cg.module.const_undef(len_ty);
                (target_val, undef_len)
            }
            _ => return None,
        };

        let storage = self.alloca_for(cg, slice_ty);
        let new_ptr = cg.b.build_gep(&mut cg.module, &base_ptr, &[start_val.clone()], child_ref);
        let elem_ptr_ty = cg.module.types.ptr(child_ref);
        let ptr_slot = cg.b.build_struct_gep(&mut cg.module, &storage, 0, elem_ptr_ty);
        cg.b.build_store(&mut cg.module, &new_ptr, &ptr_slot);

        let end_val = match end {
            Some(end) => self.gen_expr(cg, end)?,
            None => total_len,
        };
        let new_len = cg.b.build_sub(&mut cg.module, &end_val, &start_val);
        let len_slot = cg.b.build_struct_gep(&mut cg.module, &storage, 1, len_ty);
        cg.b.build_store(&mut cg.module, &new_len, &len_slot);
        Some(storage)
    }

    fn gen_local_var(&mut self, cg: &mut Cg, node: NodeId) -> Option<ValueRef> {
        let var = *self.decl_vars.get(&node)?;
        let ty = self.scopes.var(var).ty;
        let NodeKind::VarDecl { init, .. } = self.ast.kind(node) else {
            return None;
        };
        let init = *init;
        if !self.types.has_bits(ty) {
            if let Some(init) = init {
                self.gen_expr(cg, init);
            }
            return None;
        }
        self.set_loc(cg, node);
        let storage = self.alloca_for(cg, ty);
        // poison fresh stack slots in safe builds
        if !self.config.release {
            let entry = self.types.get(self.types.canonical(ty));
            let size = entry.abi_size;
            let i8_ty = cg.module.types.int(8);
            let pattern = cg.module.const_int(i8_ty, 0xaa);
            let len_ty = cg.module.types.int(64);
            let len = cg.module.const_int(len_ty, size);
            let align = entry.abi_align;
            cg.b.build_memset(&mut cg.module, &storage, &pattern, &len, align);
        }
        cg.var_ptrs.insert(var, storage.clone());
        self.emit_local_debug(cg, var, &storage, node);
        if let Some(init) = init {
            let skip_store = matches!(self.ast.kind(init), NodeKind::UndefinedLit);
            if !skip_store {
                if let Some(value) = self.gen_expr(cg, init) {
                    self.store_value(cg, &storage, &value, ty);
                }
            }
        }
        None
    }
}
