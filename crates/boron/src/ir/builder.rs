//! Block-scoped instruction builder.
//!
//! Holds a current function and insertion block; every `build_*` method
//! appends one instruction line and returns the result value. The current
//! debug location, when set, is attached to each appended instruction.

use super::{BlockRef, CallConv, FuncRef, Module, TypeRef, ValueRef, di::MdId};

/// Integer comparison predicates; signedness baked in by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntPred {
    Eq,
    Ne,
    Slt,
    Sgt,
    Sle,
    Sge,
    Ult,
    Ugt,
    Ule,
    Uge,
}

impl IntPred {
    fn keyword(self) -> &'static str {
        match self {
            IntPred::Eq => "eq",
            IntPred::Ne => "ne",
            IntPred::Slt => "slt",
            IntPred::Sgt => "sgt",
            IntPred::Sle => "sle",
            IntPred::Sge => "sge",
            IntPred::Ult => "ult",
            IntPred::Ugt => "ugt",
            IntPred::Ule => "ule",
            IntPred::Uge => "uge",
        }
    }
}

/// Float comparison predicates (ordered forms).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatPred {
    Oeq,
    One,
    Olt,
    Ogt,
    Ole,
    Oge,
}

impl FloatPred {
    fn keyword(self) -> &'static str {
        match self {
            FloatPred::Oeq => "oeq",
            FloatPred::One => "one",
            FloatPred::Olt => "olt",
            FloatPred::Ogt => "ogt",
            FloatPred::Ole => "ole",
            FloatPred::Oge => "oge",
        }
    }
}

/// Builder positioned at the end of one basic block.
#[derive(Debug)]
pub struct Builder {
    func: Option<FuncRef>,
    block: Option<BlockRef>,
    /// Current `!dbg` location metadata.
    loc: Option<MdId>,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            func: None,
            block: None,
            loc: None,
        }
    }

    pub fn position_at_end(&mut self, block: BlockRef) {
        self.func = Some(block.func);
        self.block = Some(block);
    }

    pub fn current_block(&self) -> BlockRef {
        self.block.expect("builder not positioned")
    }

    pub fn set_location(&mut self, loc: MdId) {
        self.loc = Some(loc);
    }

    pub fn clear_location(&mut self) {
        self.loc = None;
    }

    fn append(&mut self, module: &mut Module, line: String, terminator: bool) {
        let block = self.block.expect("builder not positioned");
        let with_loc = match self.loc {
            Some(loc) => format!("{line}, !dbg !{}", loc.raw()),
            None => line,
        };
        let block_data = module.block_mut(block);
        debug_assert!(
            !block_data.terminated,
            "instruction appended after terminator"
        );
        if block_data.terminated {
            return;
        }
        block_data.lines.push(with_loc);
        if terminator {
            block_data.terminated = true;
        }
    }

    fn emit(&mut self, module: &mut Module, result_ty: TypeRef, body: String) -> ValueRef {
        let func = self.func.expect("builder not positioned");
        let temp = module.mint_temp(func);
        self.append(module, format!("{temp} = {body}"), false);
        ValueRef::new(result_ty, temp)
    }

    // ===== memory =====

    pub fn build_alloca(&mut self, module: &mut Module, ty: TypeRef, align: u64) -> ValueRef {
        let text = module.types.text(ty);
        let ptr_ty = module.types.ptr(ty);
        let align = align.max(1);
        self.emit(module, ptr_ty, format!("alloca {text}, align {align}"))
    }

    pub fn build_load(&mut self, module: &mut Module, ptr: &ValueRef) -> ValueRef {
        let pointee = module.types.pointee(ptr.ty);
        let pointee_text = module.types.text(pointee);
        let ptr_text = ptr.typed(&module.types);
        self.emit(module, pointee, format!("load {pointee_text}, {ptr_text}"))
    }

    pub fn build_store(&mut self, module: &mut Module, value: &ValueRef, ptr: &ValueRef) {
        debug_assert_eq!(
            module.types.pointee(ptr.ty),
            value.ty,
            "store type mismatch"
        );
        let line = format!(
            "store {}, {}",
            value.typed(&module.types),
            ptr.typed(&module.types)
        );
        self.append(module, line, false);
    }

    /// `getelementptr inbounds` with the result pointee supplied by the
    /// caller (field types are known to the emitter).
    pub fn build_gep(
        &mut self,
        module: &mut Module,
        ptr: &ValueRef,
        indices: &[ValueRef],
        result_pointee: TypeRef,
    ) -> ValueRef {
        let base = module.types.pointee(ptr.ty);
        let base_text = module.types.text(base);
        let mut body = format!("getelementptr inbounds {base_text}, {}", ptr.typed(&module.types));
        for index in indices {
            body.push_str(", ");
            body.push_str(&index.typed(&module.types));
        }
        let result_ty = module.types.ptr(result_pointee);
        self.emit(module, result_ty, body)
    }

    /// GEP `[0, field_index]` into a struct-typed pointer.
    pub fn build_struct_gep(
        &mut self,
        module: &mut Module,
        ptr: &ValueRef,
        field_index: u32,
        field_ty: TypeRef,
    ) -> ValueRef {
        let i32_ty = module.types.int(32);
        let zero = module.const_int(i32_ty, 0);
        let idx = module.const_int(i32_ty, u64::from(field_index));
        self.build_gep(module, ptr, &[zero, idx], field_ty)
    }

    // ===== arithmetic =====

    fn binary(
        &mut self,
        module: &mut Module,
        op: &str,
        lhs: &ValueRef,
        rhs: &ValueRef,
    ) -> ValueRef {
        debug_assert_eq!(lhs.ty, rhs.ty, "binary operand type mismatch");
        let body = format!("{op} {}, {}", lhs.typed(&module.types), rhs.text);
        self.emit(module, lhs.ty, body)
    }

    pub fn build_add(&mut self, m: &mut Module, a: &ValueRef, b: &ValueRef) -> ValueRef {
        self.binary(m, "add", a, b)
    }

    pub fn build_sub(&mut self, m: &mut Module, a: &ValueRef, b: &ValueRef) -> ValueRef {
        self.binary(m, "sub", a, b)
    }

    pub fn build_mul(&mut self, m: &mut Module, a: &ValueRef, b: &ValueRef) -> ValueRef {
        self.binary(m, "mul", a, b)
    }

    pub fn build_sdiv(&mut self, m: &mut Module, a: &ValueRef, b: &ValueRef) -> ValueRef {
        self.binary(m, "sdiv", a, b)
    }

    pub fn build_udiv(&mut self, m: &mut Module, a: &ValueRef, b: &ValueRef) -> ValueRef {
        self.binary(m, "udiv", a, b)
    }

    pub fn build_srem(&mut self, m: &mut Module, a: &ValueRef, b: &ValueRef) -> ValueRef {
        self.binary(m, "srem", a, b)
    }

    pub fn build_urem(&mut self, m: &mut Module, a: &ValueRef, b: &ValueRef) -> ValueRef {
        self.binary(m, "urem", a, b)
    }

    pub fn build_fadd(&mut self, m: &mut Module, a: &ValueRef, b: &ValueRef) -> ValueRef {
        self.binary(m, "fadd", a, b)
    }

    pub fn build_fsub(&mut self, m: &mut Module, a: &ValueRef, b: &ValueRef) -> ValueRef {
        self.binary(m, "fsub", a, b)
    }

    pub fn build_fmul(&mut self, m: &mut Module, a: &ValueRef, b: &ValueRef) -> ValueRef {
        self.binary(m, "fmul", a, b)
    }

    pub fn build_fdiv(&mut self, m: &mut Module, a: &ValueRef, b: &ValueRef) -> ValueRef {
        self.binary(m, "fdiv", a, b)
    }

    pub fn build_frem(&mut self, m: &mut Module, a: &ValueRef, b: &ValueRef) -> ValueRef {
        self.binary(m, "frem", a, b)
    }

    pub fn build_and(&mut self, m: &mut Module, a: &ValueRef, b: &ValueRef) -> ValueRef {
        self.binary(m, "and", a, b)
    }

    pub fn build_or(&mut self, m: &mut Module, a: &ValueRef, b: &ValueRef) -> ValueRef {
        self.binary(m, "or", a, b)
    }

    pub fn build_xor(&mut self, m: &mut Module, a: &ValueRef, b: &ValueRef) -> ValueRef {
        self.binary(m, "xor", a, b)
    }

    pub fn build_shl(&mut self, m: &mut Module, a: &ValueRef, b: &ValueRef) -> ValueRef {
        self.binary(m, "shl", a, b)
    }

    pub fn build_lshr(&mut self, m: &mut Module, a: &ValueRef, b: &ValueRef) -> ValueRef {
        self.binary(m, "lshr", a, b)
    }

    pub fn build_ashr(&mut self, m: &mut Module, a: &ValueRef, b: &ValueRef) -> ValueRef {
        self.binary(m, "ashr", a, b)
    }

    pub fn build_neg(&mut self, module: &mut Module, value: &ValueRef) -> ValueRef {
        let zero = module.const_int(value.ty, 0);
        self.build_sub(module, &zero, value)
    }

    pub fn build_fneg(&mut self, module: &mut Module, value: &ValueRef) -> ValueRef {
        let body = format!("fneg {}", value.typed(&module.types));
        self.emit(module, value.ty, body)
    }

    pub fn build_not(&mut self, module: &mut Module, value: &ValueRef) -> ValueRef {
        let ones = module.const_all_ones(value.ty);
        self.build_xor(module, value, &ones)
    }

    // ===== comparisons =====

    pub fn build_icmp(
        &mut self,
        module: &mut Module,
        pred: IntPred,
        lhs: &ValueRef,
        rhs: &ValueRef,
    ) -> ValueRef {
        let i1 = module.types.int(1);
        let body = format!(
            "icmp {} {}, {}",
            pred.keyword(),
            lhs.typed(&module.types),
            rhs.text
        );
        self.emit(module, i1, body)
    }

    pub fn build_fcmp(
        &mut self,
        module: &mut Module,
        pred: FloatPred,
        lhs: &ValueRef,
        rhs: &ValueRef,
    ) -> ValueRef {
        let i1 = module.types.int(1);
        let body = format!(
            "fcmp {} {}, {}",
            pred.keyword(),
            lhs.typed(&module.types),
            rhs.text
        );
        self.emit(module, i1, body)
    }

    // ===== conversions =====

    fn convert(
        &mut self,
        module: &mut Module,
        op: &str,
        value: &ValueRef,
        to: TypeRef,
    ) -> ValueRef {
        let to_text = module.types.text(to);
        let body = format!("{op} {} to {to_text}", value.typed(&module.types));
        self.emit(module, to, body)
    }

    pub fn build_bitcast(&mut self, m: &mut Module, v: &ValueRef, to: TypeRef) -> ValueRef {
        if v.ty == to {
            return v.clone();
        }
        self.convert(m, "bitcast", v, to)
    }

    pub fn build_trunc(&mut self, m: &mut Module, v: &ValueRef, to: TypeRef) -> ValueRef {
        self.convert(m, "trunc", v, to)
    }

    pub fn build_zext(&mut self, m: &mut Module, v: &ValueRef, to: TypeRef) -> ValueRef {
        self.convert(m, "zext", v, to)
    }

    pub fn build_sext(&mut self, m: &mut Module, v: &ValueRef, to: TypeRef) -> ValueRef {
        self.convert(m, "sext", v, to)
    }

    pub fn build_fptrunc(&mut self, m: &mut Module, v: &ValueRef, to: TypeRef) -> ValueRef {
        self.convert(m, "fptrunc", v, to)
    }

    pub fn build_fpext(&mut self, m: &mut Module, v: &ValueRef, to: TypeRef) -> ValueRef {
        self.convert(m, "fpext", v, to)
    }

    pub fn build_fptosi(&mut self, m: &mut Module, v: &ValueRef, to: TypeRef) -> ValueRef {
        self.convert(m, "fptosi", v, to)
    }

    pub fn build_fptoui(&mut self, m: &mut Module, v: &ValueRef, to: TypeRef) -> ValueRef {
        self.convert(m, "fptoui", v, to)
    }

    pub fn build_sitofp(&mut self, m: &mut Module, v: &ValueRef, to: TypeRef) -> ValueRef {
        self.convert(m, "sitofp", v, to)
    }

    pub fn build_uitofp(&mut self, m: &mut Module, v: &ValueRef, to: TypeRef) -> ValueRef {
        self.convert(m, "uitofp", v, to)
    }

    pub fn build_ptrtoint(&mut self, m: &mut Module, v: &ValueRef, to: TypeRef) -> ValueRef {
        self.convert(m, "ptrtoint", v, to)
    }

    pub fn build_inttoptr(&mut self, m: &mut Module, v: &ValueRef, to: TypeRef) -> ValueRef {
        self.convert(m, "inttoptr", v, to)
    }

    // ===== control flow =====

    pub fn build_br(&mut self, module: &mut Module, dest: BlockRef) {
        let label = module.block_label(dest);
        self.append(module, format!("br label %{label}"), true);
    }

    pub fn build_cond_br(
        &mut self,
        module: &mut Module,
        cond: &ValueRef,
        then_block: BlockRef,
        else_block: BlockRef,
    ) {
        let then_label = module.block_label(then_block);
        let else_label = module.block_label(else_block);
        let line = format!(
            "br {}, label %{then_label}, label %{else_label}",
            cond.typed(&module.types)
        );
        self.append(module, line, true);
    }

    pub fn build_switch(
        &mut self,
        module: &mut Module,
        value: &ValueRef,
        default: BlockRef,
        cases: &[(ValueRef, BlockRef)],
    ) {
        let default_label = module.block_label(default);
        let mut line = format!(
            "switch {}, label %{default_label} [",
            value.typed(&module.types)
        );
        for (case_value, case_block) in cases {
            let case_label = module.block_label(*case_block);
            line.push_str(&format!(
                " {}, label %{case_label}",
                case_value.typed(&module.types)
            ));
        }
        line.push_str(" ]");
        self.append(module, line, true);
    }

    pub fn build_phi(
        &mut self,
        module: &mut Module,
        ty: TypeRef,
        incoming: &[(ValueRef, BlockRef)],
    ) -> ValueRef {
        let ty_text = module.types.text(ty);
        let mut parts = Vec::new();
        for (value, block) in incoming {
            let label = module.block_label(*block);
            parts.push(format!("[ {}, %{label} ]", value.text));
        }
        self.emit(module, ty, format!("phi {ty_text} {}", parts.join(", ")))
    }

    pub fn build_ret(&mut self, module: &mut Module, value: &ValueRef) {
        let line = format!("ret {}", value.typed(&module.types));
        self.append(module, line, true);
    }

    pub fn build_ret_void(&mut self, module: &mut Module) {
        self.append(module, "ret void".to_owned(), true);
    }

    pub fn build_unreachable(&mut self, module: &mut Module) {
        self.append(module, "unreachable".to_owned(), true);
    }

    // ===== calls =====

    pub fn build_call(
        &mut self,
        module: &mut Module,
        func: FuncRef,
        args: &[ValueRef],
    ) -> Option<ValueRef> {
        let ret = module.fn_return_type(func);
        let cc = module.fn_call_conv(func);
        let name = module.fn_name(func).to_owned();
        let ret_text = module.types.text(ret);
        let arg_text: Vec<String> = args.iter().map(|a| a.typed(&module.types)).collect();
        let body = format!(
            "call {}{} @{name}({})",
            cc.keyword(),
            ret_text,
            arg_text.join(", ")
        );
        if ret_text == "void" {
            self.append(module, body, false);
            None
        } else {
            Some(self.emit(module, ret, body))
        }
    }

    /// Call through a function-pointer value.
    pub fn build_indirect_call(
        &mut self,
        module: &mut Module,
        callee: &ValueRef,
        args: &[ValueRef],
        cc: CallConv,
    ) -> Option<ValueRef> {
        let fn_ty = module.types.pointee(callee.ty);
        let ret = module.types.fn_return(fn_ty).expect("call through non-function");
        let ret_text = module.types.text(ret);
        let arg_text: Vec<String> = args.iter().map(|a| a.typed(&module.types)).collect();
        let body = format!(
            "call {}{ret_text} {}({})",
            cc.keyword(),
            callee.text,
            arg_text.join(", ")
        );
        if ret_text == "void" {
            self.append(module, body, false);
            None
        } else {
            Some(self.emit(module, ret, body))
        }
    }

    // ===== intrinsics =====

    pub fn build_memcpy(
        &mut self,
        module: &mut Module,
        dest: &ValueRef,
        src: &ValueRef,
        len: &ValueRef,
        align: u64,
    ) {
        let i8ptr = {
            let i8_ty = module.types.int(8);
            module.types.ptr(i8_ty)
        };
        let dest_cast = self.build_bitcast(module, dest, i8ptr);
        let src_cast = self.build_bitcast(module, src, i8ptr);
        module.declare_intrinsic(
            "llvm.memcpy.p0i8.p0i8.i64",
            "declare void @llvm.memcpy.p0i8.p0i8.i64(i8*, i8*, i64, i1)".to_owned(),
        );
        let line = format!(
            "call void @llvm.memcpy.p0i8.p0i8.i64(i8* align {align} {}, i8* align {align} {}, {}, i1 false)",
            dest_cast.text,
            src_cast.text,
            len.typed(&module.types)
        );
        self.append(module, line, false);
    }

    pub fn build_memset(
        &mut self,
        module: &mut Module,
        dest: &ValueRef,
        byte: &ValueRef,
        len: &ValueRef,
        align: u64,
    ) {
        let i8ptr = {
            let i8_ty = module.types.int(8);
            module.types.ptr(i8_ty)
        };
        let dest_cast = self.build_bitcast(module, dest, i8ptr);
        module.declare_intrinsic(
            "llvm.memset.p0i8.i64",
            "declare void @llvm.memset.p0i8.i64(i8*, i8, i64, i1)".to_owned(),
        );
        let line = format!(
            "call void @llvm.memset.p0i8.i64(i8* align {align} {}, {}, {}, i1 false)",
            dest_cast.text,
            byte.typed(&module.types),
            len.typed(&module.types)
        );
        self.append(module, line, false);
    }

    /// `{sa,ua,ss,us,sm,um}` overflow arithmetic; returns the `{T, i1}`
    /// aggregate.
    pub fn build_overflow_op(
        &mut self,
        module: &mut Module,
        op: &str,
        signed: bool,
        lhs: &ValueRef,
        rhs: &ValueRef,
    ) -> ValueRef {
        let bits = module.types.int_bits(lhs.ty).expect("overflow op on non-int");
        let sign = if signed { 's' } else { 'u' };
        let symbol = format!("llvm.{sign}{op}.with.overflow.i{bits}");
        module.declare_intrinsic(
            &symbol,
            format!("declare {{ i{bits}, i1 }} @{symbol}(i{bits}, i{bits})"),
        );
        let i1 = module.types.int(1);
        let agg_ty = module.types.anon_struct(vec![lhs.ty, i1]);
        let body = format!(
            "call {{ i{bits}, i1 }} @{symbol}({}, {})",
            lhs.typed(&module.types),
            rhs.typed(&module.types)
        );
        self.emit(module, agg_ty, body)
    }

    pub fn build_extract_value(
        &mut self,
        module: &mut Module,
        agg: &ValueRef,
        index: u32,
        elem_ty: TypeRef,
    ) -> ValueRef {
        let body = format!("extractvalue {}, {index}", agg.typed(&module.types));
        self.emit(module, elem_ty, body)
    }

    /// `llvm.ctlz` / `llvm.cttz`.
    pub fn build_count_zeros(
        &mut self,
        module: &mut Module,
        leading: bool,
        value: &ValueRef,
    ) -> ValueRef {
        let bits = module.types.int_bits(value.ty).expect("count zeros on non-int");
        let which = if leading { "ctlz" } else { "cttz" };
        let symbol = format!("llvm.{which}.i{bits}");
        module.declare_intrinsic(&symbol, format!("declare i{bits} @{symbol}(i{bits}, i1)"));
        let body = format!("call i{bits} @{symbol}({}, i1 false)", value.typed(&module.types));
        self.emit(module, value.ty, body)
    }

    pub fn build_debugtrap(&mut self, module: &mut Module) {
        module.declare_intrinsic("llvm.debugtrap", "declare void @llvm.debugtrap()".to_owned());
        self.append(module, "call void @llvm.debugtrap()".to_owned(), false);
    }

    /// `llvm.dbg.declare` binding an alloca to a local-variable entry.
    pub fn build_dbg_declare(
        &mut self,
        module: &mut Module,
        storage: &ValueRef,
        variable: MdId,
        loc: MdId,
    ) {
        module.declare_intrinsic(
            "llvm.dbg.declare",
            "declare void @llvm.dbg.declare(metadata, metadata, metadata)".to_owned(),
        );
        let line = format!(
            "call void @llvm.dbg.declare(metadata {}, metadata !{}, metadata !DIExpression()), !dbg !{}",
            storage.typed(&module.types),
            variable.raw(),
            loc.raw()
        );
        // bypass append() so the declare keeps its own location
        let block = self.block.expect("builder not positioned");
        module.block_mut(block).lines.push(line);
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}
