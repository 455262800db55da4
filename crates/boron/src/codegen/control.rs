//! Control-flow lowering: function bodies, blocks, branches, loops,
//! switches, returns with defer unwinding, and runtime safety checks.

use crate::{
    analyze::{FnId, ReturnKnowledge},
    ast::{DeferKind, NodeId, NodeKind},
    codegen::{Cg, LoopBlocks},
    ir::{builder::IntPred, TypeRef, ValueRef},
    run::Compilation,
    scope::{ScopeId, VarId},
    types::{TypeId, TypeKind},
    value::ConstPayload,
};

impl Compilation {
    /// The IR type a value of `ty` has in expression position (pointers
    /// for handle types).
    fn ir_value_type(&mut self, cg: &mut Cg, ty: TypeId) -> TypeRef {
        let type_ref = self.type_ref(cg, ty);
        if self.types.is_handle_type(ty) {
            cg.module.types.ptr(type_ref)
        } else {
            type_ref
        }
    }

    pub(crate) fn emit_fn_body(&mut self, cg: &mut Cg, fn_id: FnId) {
        let entry = self.fn_entry(fn_id);
        let (body, import, fn_type, symbol, proto) = (
            entry.body_node.expect("emit_fn_body without body"),
            entry.import,
            entry.fn_type,
            entry.symbol_name.clone(),
            entry.proto_node,
        );
        let internal = entry.internal_linkage;
        let lowering = cg.fn_lowerings.get(&fn_id).expect("fn not declared").clone();
        let TypeKind::Fn(fn_type_id) = self.types.kind(fn_type).clone() else {
            return;
        };

        cg.cur_fn = Some(fn_id);
        cg.cur_func = Some(lowering.func);
        cg.cur_ret_ptr = if lowering.sret {
            Some(cg.module.param_value(lowering.func, 0))
        } else {
            None
        };

        // subprogram debug info
        cg.di_scope_stack.clear();
        if cg.emit_debug_info {
            let file = self.di_file(cg, import);
            let span = self.ast.span(proto);
            let line = self.imports.get(import).line_offsets.locate(span.start).line;
            let sub_ty = {
                let mut types = vec![None];
                for param in &fn_type_id.params {
                    if self.types.has_bits(param.ty) {
                        types.push(Some(self.di_type(cg, param.ty, import)));
                    }
                }
                cg.module.di.create_subroutine_type(&types)
            };
            let subprogram =
                cg.module
                    .di
                    .create_subprogram(file, &symbol, &symbol, line, sub_ty, internal);
            cg.module.set_subprogram(lowering.func, subprogram);
            cg.di_scope_stack.push(subprogram);
        }

        let entry_block = cg.module.append_block(lowering.func, "entry");
        cg.b.position_at_end(entry_block);

        // parameter storage
        let variables = self.fn_entry(fn_id).variables.clone();
        for var in variables {
            let Some(src_index) = self.scopes.var(var).src_arg_index else {
                continue;
            };
            let Some(ir_index) = lowering.param_map[src_index as usize] else {
                continue;
            };
            let param_val = cg.module.param_value(lowering.func, ir_index as usize);
            let var_ty = self.scopes.var(var).ty;
            if self.types.is_handle_type(var_ty) {
                cg.var_ptrs.insert(var, param_val);
            } else {
                let storage = self.alloca_for(cg, var_ty);
                cg.b.build_store(&mut cg.module, &param_val, &storage);
                cg.var_ptrs.insert(var, storage.clone());
                self.emit_param_debug(cg, var, &storage, proto, src_index + 1);
            }
        }

        let body_val = self.gen_expr(cg, body);
        if !cg.module.block_is_terminated(cg.b.current_block()) {
            // implicit return of the body value
            self.emit_ret(cg, fn_type_id.return_type, body_val);
        }
        cg.b.clear_location();
        cg.cur_fn = None;
        cg.cur_func = None;
        cg.cur_ret_ptr = None;
    }

    fn emit_ret(&mut self, cg: &mut Cg, ret_ty: TypeId, value: Option<ValueRef>) {
        if let Some(ret_ptr) = cg.cur_ret_ptr.clone() {
            if let Some(value) = value {
                self.store_value(cg, &ret_ptr, &value, ret_ty);
            }
            cg.b.build_ret_void(&mut cg.module);
            return;
        }
        let canonical = self.types.canonical(ret_ty);
        if canonical == self.types.builtin.unreachable_ {
            cg.b.build_unreachable(&mut cg.module);
            return;
        }
        if !self.types.has_bits(canonical) {
            cg.b.build_ret_void(&mut cg.module);
            return;
        }
        match value {
            Some(value) => cg.b.build_ret(&mut cg.module, &value),
            None => {
                let ty = self.type_ref(cg, canonical);
                let undef = cg.module.const_undef(ty);
                cg.b.build_ret(&mut cg.module, &undef);
            }
        }
    }

    fn emit_param_debug(
        &mut self,
        cg: &mut Cg,
        var: VarId,
        storage: &ValueRef,
        proto: NodeId,
        arg_index: u32,
    ) {
        if !cg.emit_debug_info {
            return;
        }
        let Some(&scope) = cg.di_scope_stack.last() else {
            return;
        };
        let import = self.ast.import_of(proto);
        let file = self.di_file(cg, import);
        let span = self.ast.span(self.scopes.var(var).decl_node);
        let loc = self.imports.get(import).line_offsets.locate(span.start);
        let ty = self.scopes.var(var).ty;
        if !self.types.has_bits(ty) {
            return;
        }
        let di_ty = self.di_type(cg, ty, import);
        let name = self.interner.get(self.scopes.var(var).name).to_owned();
        let di_var = cg
            .module
            .di
            .create_parameter_variable(scope, &name, arg_index, file, loc.line, di_ty);
        let md_loc = cg.module.di.create_location(loc.line, loc.column, scope);
        cg.b.build_dbg_declare(&mut cg.module, storage, di_var, md_loc);
    }

    pub(crate) fn emit_local_debug(
        &mut self,
        cg: &mut Cg,
        var: VarId,
        storage: &ValueRef,
        node: NodeId,
    ) {
        if !cg.emit_debug_info {
            return;
        }
        let Some(&scope) = cg.di_scope_stack.last() else {
            return;
        };
        let import = self.ast.import_of(node);
        let file = self.di_file(cg, import);
        let span = self.ast.span(node);
        let loc = self.imports.get(import).line_offsets.locate(span.start);
        let ty = self.scopes.var(var).ty;
        if !self.types.has_bits(ty) {
            return;
        }
        let di_ty = self.di_type(cg, ty, import);
        let name = self.interner.get(self.scopes.var(var).name).to_owned();
        let di_var = cg
            .module
            .di
            .create_auto_variable(scope, &name, file, loc.line, di_ty);
        let md_loc = cg.module.di.create_location(loc.line, loc.column, scope);
        cg.b.build_dbg_declare(&mut cg.module, storage, di_var, md_loc);
    }

    // ===== blocks and defers =====

    pub(crate) fn gen_block(&mut self, cg: &mut Cg, node: NodeId, stmts: &[NodeId]) -> Option<ValueRef> {
        // each block is a lexical scope in the debug info
        let pushed_di_scope = match cg.di_scope_stack.last() {
            Some(&parent) if cg.emit_debug_info => {
                let import = self.ast.import_of(node);
                let file = self.di_file(cg, import);
                let span = self.ast.span(node);
                let loc = self.imports.get(import).line_offsets.locate(span.start);
                let block_scope = cg
                    .module
                    .di
                    .create_lexical_block(parent, file, loc.line, loc.column);
                cg.di_scope_stack.push(block_scope);
                true
            }
            _ => false,
        };

        let mut last = None;
        for &stmt in stmts {
            if cg.module.block_is_terminated(cg.b.current_block()) {
                break;
            }
            self.set_loc(cg, stmt);
            last = self.gen_expr(cg, stmt);
        }
        // fall-through scope exit runs this block's unconditional defers
        if !cg.module.block_is_terminated(cg.b.current_block()) {
            if let Some(&scope) = self.block_scopes.get(&node) {
                self.run_defers(cg, scope, |kind| kind == DeferKind::Unconditional);
            }
        }
        if pushed_di_scope {
            cg.di_scope_stack.pop();
        }
        last
    }

    /// Unconditional defers between a `break`/`continue` and its loop body
    /// run before the jump.
    pub(crate) fn run_defers_to_loop(&mut self, cg: &mut Cg, from_scope: ScopeId) {
        let Some(loop_node) = self.scopes.get(from_scope).parent_loop else {
            return;
        };
        let mut current = Some(from_scope);
        while let Some(id) = current {
            let scope = self.scopes.get(id);
            if scope.parent_loop != Some(loop_node) {
                break;
            }
            let parent = scope.parent;
            self.run_defers(cg, id, |kind| kind == DeferKind::Unconditional);
            current = parent;
        }
    }

    fn run_defers(&mut self, cg: &mut Cg, scope: ScopeId, want: impl Fn(DeferKind) -> bool) {
        let defers: Vec<NodeId> = self.scopes.get(scope).defers.iter().rev().copied().collect();
        for defer in defers {
            let NodeKind::Defer { kind, body } = self.ast.kind(defer) else {
                continue;
            };
            if want(*kind) {
                let body = *body;
                self.gen_expr(cg, body);
            }
        }
    }

    // ===== return =====

    pub(crate) fn gen_return(&mut self, cg: &mut Cg, node: NodeId, value: Option<NodeId>) -> Option<ValueRef> {
        let info = self.expr_info(node);
        let (knowledge, scope) = (info.return_knowledge, info.scope);
        let value_val = match value {
            Some(value) => self.gen_expr(cg, value),
            None => None,
        };
        self.set_loc(cg, node);

        // unwind defers innermost-first out to the function scope
        let chain = self.scopes.chain_to_fn(scope);
        for defer_scope in chain {
            self.run_defers(cg, defer_scope, |kind| match kind {
                DeferKind::Unconditional => true,
                DeferKind::Error => knowledge == ReturnKnowledge::KnownError,
                DeferKind::Maybe => knowledge == ReturnKnowledge::KnownNull,
            });
        }

        let ret_ty = cg
            .cur_fn
            .and_then(|fn_id| match self.types.kind(self.fn_entry(fn_id).fn_type) {
                TypeKind::Fn(fn_type_id) => Some(fn_type_id.return_type),
                _ => None,
            })
            .unwrap_or(self.types.builtin.void);
        self.emit_ret(cg, ret_ty, value_val);
        None
    }

    // ===== if =====

    pub(crate) fn gen_if(
        &mut self,
        cg: &mut Cg,
        node: NodeId,
        cond: NodeId,
        then_body: NodeId,
        else_body: Option<NodeId>,
    ) -> Option<ValueRef> {
        // a compile-time-known condition emits only the taken branch
        if let Some(cond_val) = self.expr_const(cond).and_then(crate::value::ConstVal::as_bool) {
            return if cond_val {
                self.gen_expr(cg, then_body)
            } else {
                else_body.and_then(|body| self.gen_expr(cg, body))
            };
        }
        let func = cg.cur_func.expect("no current function");
        let cond_val = self.gen_expr(cg, cond)?;
        let then_block = cg.module.append_block(func, "then");
        let end_block = cg.module.append_block(func, "endif");
        let else_block = match else_body {
            Some(_) => cg.module.append_block(func, "else"),
            None => end_block,
        };
        cg.b.build_cond_br(&mut cg.module, &cond_val, then_block, else_block);

        cg.b.position_at_end(then_block);
        let then_val = self.gen_expr(cg, then_body);
        let then_end = cg.b.current_block();
        let then_flows = !cg.module.block_is_terminated(then_end);
        if then_flows {
            cg.b.build_br(&mut cg.module, end_block);
        }

        let mut else_edge = None;
        if let Some(else_body) = else_body {
            cg.b.position_at_end(else_block);
            let else_val = self.gen_expr(cg, else_body);
            let else_end = cg.b.current_block();
            let else_flows = !cg.module.block_is_terminated(else_end);
            if else_flows {
                cg.b.build_br(&mut cg.module, end_block);
            }
            if else_flows {
                else_edge = Some((else_val, else_end));
            }
        }

        cg.b.position_at_end(end_block);
        if else_body.is_none() {
            return None;
        }
        if !then_flows && else_edge.is_none() {
            // both branches diverge
            cg.b.build_unreachable(&mut cg.module);
            return None;
        }
        let result_ty = self.expr_type(node);
        if !self.types.has_bits(result_ty) {
            return None;
        }
        let phi_ty = self.ir_value_type(cg, result_ty);
        let mut incoming = Vec::new();
        if let (true, Some(value)) = (then_flows, then_val) {
            incoming.push((value, then_end));
        }
        if let Some((Some(value), block)) = else_edge {
            incoming.push((value, block));
        }
        match incoming.len() {
            0 => None,
            1 => Some(incoming.remove(0).0),
            _ => Some(cg.b.build_phi(&mut cg.module, phi_ty, &incoming)),
        }
    }

    pub(crate) fn gen_if_maybe(
        &mut self,
        cg: &mut Cg,
        node: NodeId,
        expr: NodeId,
        then_body: NodeId,
        else_body: Option<NodeId>,
    ) -> Option<ValueRef> {
        let func = cg.cur_func.expect("no current function");
        let maybe_ty = self.types.canonical(self.expr_type(expr));
        let TypeKind::Maybe { child } = *self.types.kind(maybe_ty) else {
            return None;
        };
        let maybe_val = self.gen_expr(cg, expr)?;
        let nonnull = self.maybe_is_present(cg, &maybe_val, maybe_ty);

        let then_block = cg.module.append_block(func, "then");
        let end_block = cg.module.append_block(func, "endif");
        let else_block = match else_body {
            Some(_) => cg.module.append_block(func, "else"),
            None => end_block,
        };
        cg.b.build_cond_br(&mut cg.module, &nonnull, then_block, else_block);

        cg.b.position_at_end(then_block);
        // bind the payload for the then branch
        if let Some(&bound) = self.bound_vars.get(&node) {
            if self.types.has_bits(child) {
                let payload_ptr = self.maybe_payload_ptr(cg, &maybe_val, maybe_ty);
                cg.var_ptrs.insert(bound, payload_ptr);
            }
        }
        let then_val = self.gen_expr(cg, then_body);
        let then_end = cg.b.current_block();
        let then_flows = !cg.module.block_is_terminated(then_end);
        if then_flows {
            cg.b.build_br(&mut cg.module, end_block);
        }

        let mut else_edge = None;
        if let Some(else_body) = else_body {
            cg.b.position_at_end(else_block);
            let else_val = self.gen_expr(cg, else_body);
            let else_end = cg.b.current_block();
            if !cg.module.block_is_terminated(else_end) {
                cg.b.build_br(&mut cg.module, end_block);
                else_edge = Some((else_val, else_end));
            }
        }

        cg.b.position_at_end(end_block);
        if else_body.is_none() {
            return None;
        }
        let result_ty = self.expr_type(node);
        if !self.types.has_bits(result_ty) {
            return None;
        }
        if !then_flows && else_edge.is_none() {
            cg.b.build_unreachable(&mut cg.module);
            return None;
        }
        let phi_ty = self.ir_value_type(cg, result_ty);
        let mut incoming = Vec::new();
        if let (true, Some(value)) = (then_flows, then_val) {
            incoming.push((value, then_end));
        }
        if let Some((Some(value), block)) = else_edge {
            incoming.push((value, block));
        }
        match incoming.len() {
            0 => None,
            1 => Some(incoming.remove(0).0),
            _ => Some(cg.b.build_phi(&mut cg.module, phi_ty, &incoming)),
        }
    }

    /// `maybe value is present` test for either representation.
    fn maybe_is_present(&mut self, cg: &mut Cg, value: &ValueRef, maybe_ty: TypeId) -> ValueRef {
        let TypeKind::Maybe { child } = *self.types.kind(self.types.canonical(maybe_ty)) else {
            return cg.module.const_bool(true);
        };
        if self.types.maybe_is_pointer(child) {
            let null = cg.module.const_null(value.ty);
            cg.b.build_icmp(&mut cg.module, IntPred::Ne, value, &null)
        } else if self.types.has_bits(child) {
            let i1 = cg.module.types.int(1);
            let flag_slot = cg.b.build_struct_gep(&mut cg.module, value, 1, i1);
            cg.b.build_load(&mut cg.module, &flag_slot)
        } else {
            cg.b.build_load(&mut cg.module, value)
        }
    }

    /// Address (or value, for pointer-maybes) of the payload.
    fn maybe_payload_ptr(&mut self, cg: &mut Cg, value: &ValueRef, maybe_ty: TypeId) -> ValueRef {
        let TypeKind::Maybe { child } = *self.types.kind(self.types.canonical(maybe_ty)) else {
            return value.clone();
        };
        if self.types.maybe_is_pointer(child) {
            // the pointer is the payload; give the binding its own slot
            let storage = self.alloca_for(cg, child);
            cg.b.build_store(&mut cg.module, value, &storage);
            storage
        } else {
            let child_ref = self.type_ref(cg, child);
            cg.b.build_struct_gep(&mut cg.module, value, 0, child_ref)
        }
    }

    // ===== loops =====

    pub(crate) fn gen_while(&mut self, cg: &mut Cg, _node: NodeId, cond: NodeId, body: NodeId) -> Option<ValueRef> {
        let func = cg.cur_func.expect("no current function");
        let cond_block = cg.module.append_block(func, "while_cond");
        let body_block = cg.module.append_block(func, "while_body");
        let end_block = cg.module.append_block(func, "while_end");
        cg.b.build_br(&mut cg.module, cond_block);

        cg.b.position_at_end(cond_block);
        let const_true = self.expr_const(cond).and_then(crate::value::ConstVal::as_bool) == Some(true);
        if const_true {
            cg.b.build_br(&mut cg.module, body_block);
        } else {
            match self.gen_expr(cg, cond) {
                Some(cond_val) => {
                    cg.b.build_cond_br(&mut cg.module, &cond_val, body_block, end_block);
                }
                None => cg.b.build_br(&mut cg.module, end_block),
            }
        }

        cg.loop_stack.push(LoopBlocks {
            continue_block: cond_block,
            break_block: end_block,
        });
        cg.b.position_at_end(body_block);
        self.gen_expr(cg, body);
        if !cg.module.block_is_terminated(cg.b.current_block()) {
            cg.b.build_br(&mut cg.module, cond_block);
        }
        cg.loop_stack.pop();

        cg.b.position_at_end(end_block);
        None
    }

    pub(crate) fn gen_for(&mut self, cg: &mut Cg, node: NodeId, iterable: NodeId, body: NodeId) -> Option<ValueRef> {
        let func = cg.cur_func.expect("no current function");
        let iter_ty = self.types.canonical(self.expr_type(iterable));
        let iter_val = self.gen_expr(cg, iterable)?;
        let usize_ty = self.types.builtin.usize_;
        let len_ref = self.type_ref(cg, usize_ty);

        let (elem_ty, len_val) = match *self.types.kind(iter_ty) {
            TypeKind::Array { child, len } => (child, cg.module.const_int(len_ref, len)),
            TypeKind::Slice { child, .. } => {
                // the length comes from the slice header
                let len_slot = cg.b.build_struct_gep(&mut cg.module, &iter_val, 1, len_ref);
                (child, cg.b.build_load(&mut cg.module, &len_slot))
            }
            _ => return None,
        };

        // hidden index variable
        let index_storage = cg.b.build_alloca(&mut cg.module, len_ref, 8);
        let zero = cg.module.const_int(len_ref, 0);
        cg.b.build_store(&mut cg.module, &zero, &index_storage);

        let cond_block = cg.module.append_block(func, "for_cond");
        let body_block = cg.module.append_block(func, "for_body");
        let incr_block = cg.module.append_block(func, "for_incr");
        let end_block = cg.module.append_block(func, "for_end");
        cg.b.build_br(&mut cg.module, cond_block);

        cg.b.position_at_end(cond_block);
        let index = cg.b.build_load(&mut cg.module, &index_storage);
        let in_range = cg.b.build_icmp(&mut cg.module, IntPred::Ult, &index, &len_val);
        cg.b.build_cond_br(&mut cg.module, &in_range, body_block, end_block);

        cg.b.position_at_end(body_block);
        let index = cg.b.build_load(&mut cg.module, &index_storage);
        let elem_ref = self.type_ref(cg, elem_ty);
        let elem_ptr = match *self.types.kind(iter_ty) {
            TypeKind::Array { .. } => {
                let i64_ty = cg.module.types.int(64);
                let zero = cg.module.const_int(i64_ty, 0);
                cg.b.build_gep(&mut cg.module, &iter_val, &[zero, index.clone()], elem_ref)
            }
            _ => {
                let elem_ptr_ty = cg.module.types.ptr(elem_ref);
                let ptr_slot = cg.b.build_struct_gep(&mut cg.module, &iter_val, 0, elem_ptr_ty);
                let data = cg.b.build_load(&mut cg.module, &ptr_slot);
                cg.b.build_gep(&mut cg.module, &data, &[index.clone()], elem_ref)
            }
        };
        if let Some(&elem_var) = self.bound_vars.get(&node) {
            cg.var_ptrs.insert(elem_var, elem_ptr);
        }
        if let Some(&index_var) = self.index_vars.get(&node) {
            cg.var_ptrs.insert(index_var, index_storage.clone());
        }

        cg.loop_stack.push(LoopBlocks {
            continue_block: incr_block,
            break_block: end_block,
        });
        self.gen_expr(cg, body);
        if !cg.module.block_is_terminated(cg.b.current_block()) {
            cg.b.build_br(&mut cg.module, incr_block);
        }
        cg.loop_stack.pop();

        cg.b.position_at_end(incr_block);
        let index = cg.b.build_load(&mut cg.module, &index_storage);
        let one = cg.module.const_int(len_ref, 1);
        let next = cg.b.build_add(&mut cg.module, &index, &one);
        cg.b.build_store(&mut cg.module, &next, &index_storage);
        cg.b.build_br(&mut cg.module, cond_block);

        cg.b.position_at_end(end_block);
        None
    }

    // ===== switch =====

    pub(crate) fn gen_switch(
        &mut self,
        cg: &mut Cg,
        node: NodeId,
        target: NodeId,
        prongs: &[NodeId],
    ) -> Option<ValueRef> {
        let target_ty = self.types.canonical(self.expr_type(target));

        // compile-time-known scrutinee: emit only the chosen prong
        if let Some(target_val) = self.expr_const(target).cloned() {
            let else_prong = prongs.iter().copied().find(|&p| {
                matches!(self.ast.kind(p), NodeKind::SwitchProng { is_else: true, .. })
            });
            let chosen = self.find_const_prong(prongs, &target_val, else_prong)?;
            let NodeKind::SwitchProng { capture, body, .. } = self.ast.kind(chosen) else {
                return None;
            };
            let (capture, body) = (*capture, *body);
            if capture.is_some() {
                if let Some(&bound) = self.bound_vars.get(&chosen) {
                    let bound_ty = self.scopes.var(bound).ty;
                    if self.types.has_bits(bound_ty) {
                        let capture_val = match &target_val.payload {
                            ConstPayload::Enum { payload: Some(payload), .. } => {
                                self.gen_const(cg, bound_ty, payload)
                            }
                            _ => self.gen_const(cg, bound_ty, &target_val),
                        };
                        if let Some(capture_val) = capture_val {
                            let storage = self.alloca_for(cg, bound_ty);
                            self.store_value(cg, &storage, &capture_val, bound_ty);
                            cg.var_ptrs.insert(bound, storage);
                        }
                    }
                }
            }
            return self.gen_expr(cg, body);
        }

        let func = cg.cur_func.expect("no current function");
        let target_val = self.gen_expr(cg, target)?;
        let tag_val = match self.types.kind(target_ty) {
            TypeKind::Enum { .. } => self.enum_tag_value(cg, &target_val, target_ty),
            _ => target_val.clone(),
        };

        let end_block = cg.module.append_block(func, "switch_end");
        let mut else_block = None;
        let mut cases = Vec::new();
        let mut prong_blocks = Vec::with_capacity(prongs.len());
        for &prong in prongs {
            let block = cg.module.append_block(func, "prong");
            prong_blocks.push(block);
            let NodeKind::SwitchProng { items, is_else, .. } = self.ast.kind(prong) else {
                continue;
            };
            if *is_else {
                else_block = Some(block);
                continue;
            }
            for &item in items.clone().iter() {
                match self.ast.kind(item) {
                    NodeKind::SwitchRange { start, end } => {
                        let (start, end) = (*start, *end);
                        let (Some(lo), Some(hi)) = (
                            self.expr_const(start).and_then(|v| v.as_num()?.to_u64()),
                            self.expr_const(end).and_then(|v| v.as_num()?.to_u64()),
                        ) else {
                            continue;
                        };
                        for tag in lo..=hi {
                            let case = cg.module.const_int(tag_val.ty, tag);
                            cases.push((case, block));
                        }
                    }
                    _ => {
                        let Some(value) = self.expr_const(item) else {
                            continue;
                        };
                        let tag = match &value.payload {
                            ConstPayload::Enum { tag, .. } => *tag,
                            ConstPayload::Bool(b) => u64::from(*b),
                            ConstPayload::Num(n) => {
                                let bits = cg.module.types.int_bits(tag_val.ty).unwrap_or(64);
                                n.to_twos_complement(bits)
                            }
                            _ => continue,
                        };
                        let case = cg.module.const_int(tag_val.ty, tag);
                        cases.push((case, block));
                    }
                }
            }
        }

        // an else-less switch is exhaustive; falling through is a safety
        // violation
        let default_block = match else_block {
            Some(block) => block,
            None => {
                let trap_block = cg.module.append_block(func, "switch_trap");
                let current = cg.b.current_block();
                cg.b.position_at_end(trap_block);
                if !self.config.release {
                    cg.b.build_debugtrap(&mut cg.module);
                }
                cg.b.build_unreachable(&mut cg.module);
                cg.b.position_at_end(current);
                trap_block
            }
        };
        cg.b.build_switch(&mut cg.module, &tag_val, default_block, &cases);

        let mut incoming = Vec::new();
        for (&prong, &block) in prongs.iter().zip(&prong_blocks) {
            let NodeKind::SwitchProng {
                items, capture, body, ..
            } = self.ast.kind(prong)
            else {
                continue;
            };
            let items = items.clone();
            let (capture, body) = (*capture, *body);
            cg.b.position_at_end(block);
            if capture.is_some() {
                if let Some(&bound) = self.bound_vars.get(&prong) {
                    let bound_ty = self.scopes.var(bound).ty;
                    if bound_ty == self.expr_type(target) || items.is_empty() {
                        // capture of the whole scrutinee
                        if self.types.is_handle_type(bound_ty) {
                            cg.var_ptrs.insert(bound, target_val.clone());
                        } else if self.types.has_bits(bound_ty) {
                            let storage = self.alloca_for(cg, bound_ty);
                            cg.b.build_store(&mut cg.module, &target_val, &storage);
                            cg.var_ptrs.insert(bound, storage);
                        }
                    } else if self.types.has_bits(bound_ty) {
                        // payload capture reads the union field through the
                        // variant's layout
                        let payloads = self.types.enum_payload_types(target_ty);
                        if let Some(&largest) = payloads.first() {
                            let largest_ref = self.type_ref(cg, largest);
                            let union_slot =
                                cg.b.build_struct_gep(&mut cg.module, &target_val, 1, largest_ref);
                            let variant_ref = self.type_ref(cg, bound_ty);
                            let variant_ptr_ty = cg.module.types.ptr(variant_ref);
                            let variant_slot =
                                cg.b.build_bitcast(&mut cg.module, &union_slot, variant_ptr_ty);
                            cg.var_ptrs.insert(bound, variant_slot);
                        }
                    }
                }
            }
            let value = self.gen_expr(cg, body);
            let prong_end = cg.b.current_block();
            if !cg.module.block_is_terminated(prong_end) {
                cg.b.build_br(&mut cg.module, end_block);
                incoming.push((value, prong_end));
            }
        }

        cg.b.position_at_end(end_block);
        let result_ty = self.expr_type(node);
        if !self.types.has_bits(result_ty) {
            return None;
        }
        let flowing: Vec<(ValueRef, crate::ir::BlockRef)> = incoming
            .into_iter()
            .filter_map(|(value, block)| value.map(|v| (v, block)))
            .collect();
        match flowing.len() {
            0 => None,
            1 => Some(flowing[0].0.clone()),
            _ => {
                let phi_ty = self.ir_value_type(cg, result_ty);
                Some(cg.b.build_phi(&mut cg.module, phi_ty, &flowing))
            }
        }
    }

    // ===== error and maybe unwrapping =====

    /// The `{tag, payload-address}` pair of an error-union value.
    fn error_union_parts(
        &mut self,
        cg: &mut Cg,
        value: &ValueRef,
        ty: TypeId,
    ) -> (ValueRef, Option<ValueRef>) {
        let TypeKind::ErrorUnion { child } = *self.types.kind(self.types.canonical(ty)) else {
            return (value.clone(), None);
        };
        if !self.types.has_bits(child) {
            return (value.clone(), None);
        }
        let tag_ty = cg.module.types.int(crate::types::ERR_TAG_BITS);
        let tag_slot = cg.b.build_struct_gep(&mut cg.module, value, 0, tag_ty);
        let tag = cg.b.build_load(&mut cg.module, &tag_slot);
        let child_ref = self.type_ref(cg, child);
        let payload = cg.b.build_struct_gep(&mut cg.module, value, 1, child_ref);
        (tag, Some(payload))
    }

    /// `a %% b` / `a %% err => b`.
    pub(crate) fn gen_unwrap_err(
        &mut self,
        cg: &mut Cg,
        node: NodeId,
        target: NodeId,
        fallback: NodeId,
    ) -> Option<ValueRef> {
        let func = cg.cur_func.expect("no current function");
        let target_ty = self.types.canonical(self.expr_type(target));
        let TypeKind::ErrorUnion { child } = *self.types.kind(target_ty) else {
            return None;
        };
        let target_val = self.gen_expr(cg, target)?;
        let (tag, payload_ptr) = self.error_union_parts(cg, &target_val, target_ty);
        let zero = cg.module.const_int(tag.ty, 0);
        let is_ok = cg.b.build_icmp(&mut cg.module, IntPred::Eq, &tag, &zero);

        let ok_block = cg.module.append_block(func, "unwrap_ok");
        let err_block = cg.module.append_block(func, "unwrap_err");
        let end_block = cg.module.append_block(func, "unwrap_end");
        cg.b.build_cond_br(&mut cg.module, &is_ok, ok_block, err_block);

        cg.b.position_at_end(ok_block);
        let ok_val = match &payload_ptr {
            Some(ptr) => Some(self.value_at(cg, ptr, child)),
            None => None,
        };
        let ok_end = cg.b.current_block();
        cg.b.build_br(&mut cg.module, end_block);

        cg.b.position_at_end(err_block);
        // the named binding receives the tag
        if let Some(&bound) = self.bound_vars.get(&node) {
            let pure_error = self.types.builtin.pure_error;
            let storage = self.alloca_for(cg, pure_error);
            cg.b.build_store(&mut cg.module, &tag, &storage);
            cg.var_ptrs.insert(bound, storage);
        }
        let fallback_val = self.gen_expr(cg, fallback);
        let err_end = cg.b.current_block();
        let fallback_flows = !cg.module.block_is_terminated(err_end);
        if fallback_flows {
            cg.b.build_br(&mut cg.module, end_block);
        }

        cg.b.position_at_end(end_block);
        if !self.types.has_bits(child) {
            return None;
        }
        let phi_ty = self.ir_value_type(cg, child);
        let mut incoming = Vec::new();
        if let Some(ok_val) = ok_val {
            incoming.push((ok_val, ok_end));
        }
        if let (true, Some(value)) = (fallback_flows, fallback_val) {
            incoming.push((value, err_end));
        }
        match incoming.len() {
            0 => None,
            1 => Some(incoming.remove(0).0),
            _ => Some(cg.b.build_phi(&mut cg.module, phi_ty, &incoming)),
        }
    }

    fn emit_trap_check(&mut self, cg: &mut Cg, ok_cond: &ValueRef, name: &str) {
        let func = cg.cur_func.expect("no current function");
        let ok_block = cg.module.append_block(func, name);
        let trap_block = cg.module.append_block(func, "trap");
        cg.b.build_cond_br(&mut cg.module, ok_cond, ok_block, trap_block);
        cg.b.position_at_end(trap_block);
        cg.b.build_debugtrap(&mut cg.module);
        cg.b.build_unreachable(&mut cg.module);
        cg.b.position_at_end(ok_block);
    }

    /// `%%a` — unwrap an error union, trapping on error in safe builds.
    pub(crate) fn gen_unwrap_err_checked(
        &mut self,
        cg: &mut Cg,
        _node: NodeId,
        operand: NodeId,
    ) -> Option<ValueRef> {
        let target_ty = self.types.canonical(self.expr_type(operand));
        let TypeKind::ErrorUnion { child } = *self.types.kind(target_ty) else {
            return None;
        };
        let value = self.gen_expr(cg, operand)?;
        let (tag, payload_ptr) = self.error_union_parts(cg, &value, target_ty);
        if !self.config.release {
            let zero = cg.module.const_int(tag.ty, 0);
            let is_ok = cg.b.build_icmp(&mut cg.module, IntPred::Eq, &tag, &zero);
            self.emit_trap_check(cg, &is_ok, "unwrap_ok");
        }
        match payload_ptr {
            Some(ptr) => Some(self.value_at(cg, &ptr, child)),
            None => None,
        }
    }

    /// `??a` — unwrap a maybe, trapping on null in safe builds.
    pub(crate) fn gen_unwrap_maybe_checked(
        &mut self,
        cg: &mut Cg,
        _node: NodeId,
        operand: NodeId,
    ) -> Option<ValueRef> {
        let maybe_ty = self.types.canonical(self.expr_type(operand));
        let TypeKind::Maybe { child } = *self.types.kind(maybe_ty) else {
            return None;
        };
        let value = self.gen_expr(cg, operand)?;
        if !self.config.release {
            let present = self.maybe_is_present(cg, &value, maybe_ty);
            self.emit_trap_check(cg, &present, "unwrap_ok");
        }
        if !self.types.has_bits(child) {
            return None;
        }
        let payload = self.maybe_payload_ptr(cg, &value, maybe_ty);
        Some(self.value_at(cg, &payload, child))
    }

    /// `a ?? b`.
    pub(crate) fn gen_unwrap_maybe_or(
        &mut self,
        cg: &mut Cg,
        _node: NodeId,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Option<ValueRef> {
        let func = cg.cur_func.expect("no current function");
        let maybe_ty = self.types.canonical(self.expr_type(lhs));
        let TypeKind::Maybe { child } = *self.types.kind(maybe_ty) else {
            return None;
        };
        let maybe_val = self.gen_expr(cg, lhs)?;
        let present = self.maybe_is_present(cg, &maybe_val, maybe_ty);

        let some_block = cg.module.append_block(func, "maybe_some");
        let none_block = cg.module.append_block(func, "maybe_none");
        let end_block = cg.module.append_block(func, "maybe_end");
        cg.b.build_cond_br(&mut cg.module, &present, some_block, none_block);

        cg.b.position_at_end(some_block);
        let some_val = if self.types.has_bits(child) {
            let payload = self.maybe_payload_ptr(cg, &maybe_val, maybe_ty);
            Some(self.value_at(cg, &payload, child))
        } else {
            None
        };
        let some_end = cg.b.current_block();
        cg.b.build_br(&mut cg.module, end_block);

        cg.b.position_at_end(none_block);
        let none_val = self.gen_expr(cg, rhs);
        let none_end = cg.b.current_block();
        let none_flows = !cg.module.block_is_terminated(none_end);
        if none_flows {
            cg.b.build_br(&mut cg.module, end_block);
        }

        cg.b.position_at_end(end_block);
        if !self.types.has_bits(child) {
            return None;
        }
        let phi_ty = self.ir_value_type(cg, child);
        let mut incoming = Vec::new();
        if let Some(value) = some_val {
            incoming.push((value, some_end));
        }
        if let (true, Some(value)) = (none_flows, none_val) {
            incoming.push((value, none_end));
        }
        match incoming.len() {
            0 => None,
            1 => Some(incoming.remove(0).0),
            _ => Some(cg.b.build_phi(&mut cg.module, phi_ty, &incoming)),
        }
    }
}
