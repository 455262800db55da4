//! IR emission.
//!
//! Runs only when analysis produced no diagnostics. Conventions:
//! - expressions of handle types (structs, arrays, slices, maybes with
//!   payload, error unions with payload) are represented as pointers to
//!   storage; scalars are SSA values
//! - a function whose return type is a handle type returns `void` and
//!   takes an sret pointer as its first parameter
//! - zero-bit values produce no IR at all

mod control;
mod expr;

use ahash::AHashMap;

use crate::{
    analyze::FnId,
    imports::ImportId,
    intern::StringId,
    ir::{
        builder::Builder,
        di::{DwarfEncoding, MdId},
        BlockRef, CallConv, FuncRef, Linkage, Module, ParamInfo, TypeRef, ValueRef,
    },
    run::Compilation,
    scope::VarId,
    types::{TypeId, TypeKind, ERR_TAG_BITS},
    value::{ConstPayload, ConstVal},
};

/// How one function's signature lowers to IR.
#[derive(Debug, Clone)]
pub(crate) struct FnLowering {
    pub func: FuncRef,
    /// The return value is written through an sret pointer parameter.
    pub sret: bool,
    /// Source parameter index to IR parameter index; `None` for zero-bit
    /// parameters.
    pub param_map: Vec<Option<u32>>,
}

/// Loop targets for `break`/`continue`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopBlocks {
    pub continue_block: BlockRef,
    pub break_block: BlockRef,
}

/// All mutable emitter state.
pub(crate) struct Cg {
    pub module: Module,
    pub b: Builder,
    type_refs: AHashMap<TypeId, TypeRef>,
    di_types: AHashMap<TypeId, MdId>,
    di_files: AHashMap<ImportId, MdId>,
    pub fn_lowerings: AHashMap<FnId, FnLowering>,
    /// Storage address per variable; set per-iteration for loop bindings.
    pub var_ptrs: AHashMap<VarId, ValueRef>,
    /// Constant string byte arrays, shared by interned id.
    str_globals: AHashMap<StringId, ValueRef>,
    /// Symbols already emitted; internal fns and globals mangle on clash,
    /// extern declarations are shared.
    used_symbols: ahash::AHashSet<String>,
    extern_fns: AHashMap<String, FuncRef>,
    pub loop_stack: Vec<LoopBlocks>,
    pub cur_fn: Option<FnId>,
    pub cur_func: Option<FuncRef>,
    pub cur_ret_ptr: Option<ValueRef>,
    /// Debug scope stack; last is the current scope for locations.
    pub di_scope_stack: Vec<MdId>,
    emit_debug_info: bool,
}

impl Cg {
    fn new(module: Module, emit_debug_info: bool) -> Self {
        Self {
            module,
            b: Builder::new(),
            type_refs: AHashMap::new(),
            di_types: AHashMap::new(),
            di_files: AHashMap::new(),
            fn_lowerings: AHashMap::new(),
            var_ptrs: AHashMap::new(),
            str_globals: AHashMap::new(),
            used_symbols: ahash::AHashSet::new(),
            extern_fns: AHashMap::new(),
            loop_stack: Vec::new(),
            cur_fn: None,
            cur_func: None,
            cur_ret_ptr: None,
            di_scope_stack: Vec::new(),
            emit_debug_info,
        }
    }
}

impl Compilation {
    /// Lowers the whole analyzed program to one IR module.
    pub fn emit_module(&mut self) -> Module {
        let root = self.root_import.expect("no root import");
        let module_name = self.imports.get(root).display_path();
        let module = Module::new(&module_name, self.config.target.triple());
        let mut cg = Cg::new(module, !self.config.strip_debug);

        if cg.emit_debug_info {
            let file = self.di_file(&mut cg, root);
            cg.module.di.create_compile_unit(file, self.config.release);
        }

        // declare every function first so calls resolve in one pass
        for fn_idx in 0..self.fns.len() {
            let fn_id = FnId::new(fn_idx);
            if self.fn_entry(fn_id).is_test && !self.config.is_test {
                continue;
            }
            self.declare_fn(&mut cg, fn_id);
        }

        self.emit_globals(&mut cg);

        for fn_idx in 0..self.fns.len() {
            let fn_id = FnId::new(fn_idx);
            let entry = self.fn_entry(fn_id);
            if entry.body_node.is_none() || (entry.is_test && !self.config.is_test) {
                continue;
            }
            self.emit_fn_body(&mut cg, fn_id);
        }

        cg.module
    }

    // ===== type lowering =====

    /// The IR type for a non-zero-bit boron type.
    pub(crate) fn type_ref(&self, cg: &mut Cg, ty: TypeId) -> TypeRef {
        let canonical = self.types.canonical(ty);
        debug_assert!(self.types.has_bits(canonical), "type_ref of zero-bit type");
        if let Some(&existing) = cg.type_refs.get(&canonical) {
            return existing;
        }
        let type_ref = match self.types.kind(canonical).clone() {
            TypeKind::Bool => cg.module.types.int(1),
            TypeKind::Int { bits, .. } => cg.module.types.int(bits),
            TypeKind::Float { bits } => cg.module.types.float(bits),
            TypeKind::PureError => cg.module.types.int(ERR_TAG_BITS),
            TypeKind::Pointer { child, .. } => {
                let child_ref = self.type_ref(cg, child);
                cg.module.types.ptr(child_ref)
            }
            TypeKind::Array { child, len } => {
                let child_ref = self.type_ref(cg, child);
                cg.module.types.array(child_ref, len)
            }
            TypeKind::Slice { child, .. } => {
                let child_ref = self.type_ref(cg, child);
                let ptr_ty = cg.module.types.ptr(child_ref);
                let len_ty = cg.module.types.int(self.types.ptr_bits());
                cg.module.types.anon_struct(vec![ptr_ty, len_ty])
            }
            TypeKind::Maybe { child } => {
                if self.types.maybe_is_pointer(child) {
                    self.type_ref(cg, child)
                } else if self.types.has_bits(child) {
                    let child_ref = self.type_ref(cg, child);
                    let bool_ref = cg.module.types.int(1);
                    cg.module.types.anon_struct(vec![child_ref, bool_ref])
                } else {
                    cg.module.types.int(1)
                }
            }
            TypeKind::ErrorUnion { child } => {
                let tag = cg.module.types.int(ERR_TAG_BITS);
                if self.types.has_bits(child) {
                    let child_ref = self.type_ref(cg, child);
                    cg.module.types.anon_struct(vec![tag, child_ref])
                } else {
                    tag
                }
            }
            TypeKind::Fn(fn_type_id) => {
                let fn_ty = self.lower_fn_type(cg, &fn_type_id);
                cg.module.types.ptr(fn_ty)
            }
            TypeKind::Struct { fields, .. } => {
                let name = self.types.name(canonical).to_owned();
                let named = cg.module.types.named_struct(&name);
                // insert before recursing so self-references terminate
                cg.type_refs.insert(canonical, named);
                let body: Vec<TypeRef> = fields
                    .iter()
                    .filter(|f| f.gen_index.is_some())
                    .map(|f| self.type_ref(cg, f.ty))
                    .collect();
                cg.module.types.set_struct_body(named, body);
                return named;
            }
            TypeKind::Enum { tag_type, .. } => {
                let payloads = self.types.enum_payload_types(canonical);
                let tag_ref = self.type_ref(cg, tag_type);
                match payloads.first() {
                    // tag plus the union, represented by its largest member
                    Some(&largest) => {
                        let name = self.types.name(canonical).to_owned();
                        let named = cg.module.types.named_struct(&name);
                        cg.type_refs.insert(canonical, named);
                        let largest_ref = self.type_ref(cg, largest);
                        cg.module.types.set_struct_body(named, vec![tag_ref, largest_ref]);
                        return named;
                    }
                    None => tag_ref,
                }
            }
            TypeKind::Invalid
            | TypeKind::MetaType
            | TypeKind::Namespace
            | TypeKind::Void
            | TypeKind::Unreachable
            | TypeKind::NumLitInt
            | TypeKind::NumLitFloat
            | TypeKind::UndefLit
            | TypeKind::TypeDecl { .. } => unreachable!("type_ref of compile-only type"),
        };
        cg.type_refs.insert(canonical, type_ref);
        type_ref
    }

    /// Lowers a function type, applying the sret/pointer-parameter rules.
    pub(crate) fn lower_fn_type(&self, cg: &mut Cg, fn_type_id: &crate::types::FnTypeId) -> TypeRef {
        let (ret, params, _) = self.lower_signature(cg, fn_type_id);
        let param_tys: Vec<TypeRef> = params.iter().map(|p| p.ty).collect();
        cg.module.types.func(ret, param_tys, fn_type_id.is_var_args)
    }

    /// Shared signature lowering: returns (ret type, IR params, sret flag).
    fn lower_signature(
        &self,
        cg: &mut Cg,
        fn_type_id: &crate::types::FnTypeId,
    ) -> (TypeRef, Vec<ParamInfo>, bool) {
        let ret_ty = fn_type_id.return_type;
        let ret_canonical = self.types.canonical(ret_ty);
        let ret_unreachable = ret_canonical == self.types.builtin.unreachable_;
        let sret = self.types.is_handle_type(ret_ty);
        let mut params = Vec::new();
        if sret {
            let pointee = self.type_ref(cg, ret_ty);
            let ptr = cg.module.types.ptr(pointee);
            params.push(ParamInfo {
                ty: ptr,
                attrs: vec!["sret".to_owned(), "nonnull".to_owned()],
            });
        }
        for param in &fn_type_id.params {
            if !self.types.has_bits(param.ty) {
                continue;
            }
            if self.types.is_handle_type(param.ty) {
                let pointee = self.type_ref(cg, param.ty);
                let ptr = cg.module.types.ptr(pointee);
                let mut attrs = vec!["byval".to_owned()];
                if param.is_noalias {
                    attrs.push("noalias".to_owned());
                }
                params.push(ParamInfo { ty: ptr, attrs });
            } else {
                let ty = self.type_ref(cg, param.ty);
                let mut attrs = Vec::new();
                if param.is_noalias {
                    attrs.push("noalias".to_owned());
                }
                params.push(ParamInfo { ty, attrs });
            }
        }
        let ret = if sret || !self.types.has_bits(ret_ty) || ret_unreachable {
            cg.module.types.void()
        } else {
            self.type_ref(cg, ret_ty)
        };
        (ret, params, sret)
    }

    fn declare_fn(&mut self, cg: &mut Cg, fn_id: FnId) {
        let entry = self.fn_entry(fn_id);
        let TypeKind::Fn(fn_type_id) = self.types.kind(entry.fn_type).clone() else {
            return;
        };
        let mut symbol = entry.symbol_name.clone();
        let (is_extern, is_export, is_inline, is_naked, is_cold, internal, has_body) = (
            entry.is_extern,
            entry.is_export,
            entry.is_inline,
            entry.is_naked,
            entry.is_cold,
            entry.internal_linkage,
            entry.body_node.is_some(),
        );
        // extern declarations with the same symbol share one IR function
        if is_extern {
            if let Some(&existing) = cg.extern_fns.get(&symbol) {
                let sret = self.types.is_handle_type(fn_type_id.return_type);
                let mut param_map = Vec::with_capacity(fn_type_id.params.len());
                let mut next = u32::from(sret);
                for param in &fn_type_id.params {
                    if self.types.has_bits(param.ty) {
                        param_map.push(Some(next));
                        next += 1;
                    } else {
                        param_map.push(None);
                    }
                }
                cg.fn_lowerings.insert(fn_id, FnLowering { func: existing, sret, param_map });
                self.fn_entry_mut(fn_id).fn_value = Some(existing);
                return;
            }
        } else if !is_export && symbol != "main" && cg.used_symbols.contains(&symbol) {
            // internal symbols mangle on clashes across imports
            symbol = format!("{symbol}.{}", fn_id.index());
        }
        cg.used_symbols.insert(symbol.clone());

        let (ret, params, sret) = self.lower_signature(cg, &fn_type_id);

        let cc = if is_extern || is_export || symbol == "main" {
            CallConv::C
        } else if is_cold {
            CallConv::Cold
        } else {
            CallConv::Fast
        };
        let linkage = if internal && has_body {
            Linkage::Internal
        } else {
            Linkage::External
        };
        let func = cg.module.add_function(
            &symbol,
            ret,
            params,
            fn_type_id.is_var_args,
            cc,
            linkage,
            has_body,
        );
        cg.module.add_fn_attr(func, "nounwind");
        if is_naked {
            cg.module.add_fn_attr(func, "naked");
        }
        if is_cold {
            cg.module.add_fn_attr(func, "cold");
        }
        if is_inline {
            cg.module.add_fn_attr(func, "alwaysinline");
        }
        if self.types.canonical(fn_type_id.return_type) == self.types.builtin.unreachable_ {
            cg.module.add_fn_attr(func, "noreturn");
        }

        // source-to-IR parameter mapping: sret shifts everything by one
        let mut param_map = Vec::with_capacity(fn_type_id.params.len());
        let mut next = u32::from(sret);
        for param in &fn_type_id.params {
            if self.types.has_bits(param.ty) {
                param_map.push(Some(next));
                next += 1;
            } else {
                param_map.push(None);
            }
        }
        cg.fn_lowerings.insert(fn_id, FnLowering { func, sret, param_map });
        self.fn_entry_mut(fn_id).fn_value = Some(func);
        if is_extern {
            cg.extern_fns.insert(symbol, func);
        }
    }

    // ===== globals =====

    fn emit_globals(&mut self, cg: &mut Cg) {
        let globals: Vec<(VarId, crate::ast::NodeId)> = self
            .decl_vars
            .iter()
            .map(|(&decl, &var)| (var, decl))
            .filter(|&(var, _)| {
                let scope = self.scopes.var(var).scope;
                self.scopes.get(scope).fn_entry.is_none()
            })
            .collect();
        for (var, decl) in globals {
            let ty = self.scopes.var(var).ty;
            if !self.types.has_bits(ty) || self.types.canonical(ty) == self.types.builtin.meta_type
            {
                continue;
            }
            let Some(value) = self.decl_const.get(&decl).cloned().flatten() else {
                continue;
            };
            let Some(init) = self.gen_const_inline(cg, ty, &value) else {
                continue;
            };
            let mut name = self.interner.get(self.scopes.var(var).name).to_owned();
            if cg.used_symbols.contains(&name) {
                name = format!("{name}.{}", var.index());
            }
            cg.used_symbols.insert(name.clone());
            let is_const = self.scopes.var(var).is_const;
            let ptr = cg
                .module
                .add_global(Some(&name), &init, is_const, Linkage::Internal);
            cg.var_ptrs.insert(var, ptr);
        }
    }

    // ===== constants =====

    /// Emits a constant as a usable expression value: scalars inline,
    /// handle types as pointers to private unnamed globals.
    pub(crate) fn gen_const(&mut self, cg: &mut Cg, ty: TypeId, value: &ConstVal) -> Option<ValueRef> {
        let canonical = self.types.canonical(ty);
        if !self.types.has_bits(canonical) {
            return None;
        }
        if self.types.is_handle_type(canonical) {
            // string byte arrays are shared by interned id
            if let ConstPayload::Str(id) = value.payload {
                if let Some(existing) = cg.str_globals.get(&id) {
                    return Some(existing.clone());
                }
                let bytes = self.interner.get(id).as_bytes().to_vec();
                let init = cg.module.const_string(&bytes);
                let ptr = cg.module.add_global(None, &init, true, Linkage::Private);
                cg.str_globals.insert(id, ptr.clone());
                return Some(ptr);
            }
            let init = self.gen_const_inline(cg, ty, value)?;
            let ptr = cg.module.add_global(None, &init, true, Linkage::Private);
            return Some(ptr);
        }
        self.gen_const_inline(cg, ty, value)
    }

    /// Builds the inline constant form (no globals) for a value of `ty`.
    pub(crate) fn gen_const_inline(
        &mut self,
        cg: &mut Cg,
        ty: TypeId,
        value: &ConstVal,
    ) -> Option<ValueRef> {
        let canonical = self.types.canonical(ty);
        if !self.types.has_bits(canonical) {
            return None;
        }
        let type_ref = self.type_ref(cg, canonical);
        if value.is_undef() {
            return Some(cg.module.const_undef(type_ref));
        }
        match self.types.kind(canonical).clone() {
            TypeKind::Bool => Some(cg.module.const_bool(value.as_bool()?)),
            TypeKind::Int { bits, .. } => {
                let pattern = value.as_num()?.to_twos_complement(bits);
                Some(cg.module.const_int(type_ref, pattern))
            }
            TypeKind::PureError => match &value.payload {
                ConstPayload::Err { tag, .. } => Some(cg.module.const_int(type_ref, *tag)),
                _ => None,
            },
            TypeKind::Float { .. } => Some(cg.module.const_float(type_ref, value.as_num()?.to_f64())),
            TypeKind::Pointer { .. } => match &value.payload {
                ConstPayload::Maybe(None) => Some(cg.module.const_null(type_ref)),
                _ => None,
            },
            TypeKind::Fn(_) => match value.payload {
                ConstPayload::Fn(fn_id) => {
                    let lowering = cg.fn_lowerings.get(&fn_id)?.clone();
                    Some(cg.module.fn_pointer(lowering.func))
                }
                _ => None,
            },
            TypeKind::Array { child, .. } => match &value.payload {
                ConstPayload::Array(elems) => {
                    let elem_ref = self.type_ref(cg, child);
                    let mut parts = Vec::with_capacity(elems.len());
                    for elem in elems {
                        parts.push(self.gen_const_inline(cg, child, elem)?);
                    }
                    Some(cg.module.const_array(elem_ref, &parts))
                }
                ConstPayload::Str(id) => {
                    let bytes = self.interner.get(*id).as_bytes().to_vec();
                    Some(cg.module.const_string(&bytes))
                }
                _ => None,
            },
            TypeKind::Struct { fields, .. } => match &value.payload {
                ConstPayload::Struct(vals) => {
                    let mut parts = Vec::new();
                    for field in fields.iter().filter(|f| f.gen_index.is_some()) {
                        parts.push(self.gen_const_inline(cg, field.ty, &vals[field.src_index])?);
                    }
                    Some(cg.module.const_struct(type_ref, &parts))
                }
                _ => None,
            },
            TypeKind::Slice { child, is_const } => match &value.payload {
                ConstPayload::Slice { array, len } => {
                    let u8ish_array_ty = self.types.get_array(child, *len);
                    let array_ptr = self.gen_const(cg, u8ish_array_ty, array)?;
                    let elem_ptr = cg.module.const_gep_first(&array_ptr, 0);
                    let len_ty = cg.module.types.int(self.types.ptr_bits());
                    let len_val = cg.module.const_int(len_ty, *len);
                    let _ = is_const;
                    Some(cg.module.const_struct(type_ref, &[elem_ptr, len_val]))
                }
                _ => None,
            },
            TypeKind::Maybe { child } => match &value.payload {
                ConstPayload::Maybe(inner) => {
                    if self.types.maybe_is_pointer(child) {
                        match inner {
                            None => Some(cg.module.const_null(type_ref)),
                            Some(inner) => self.gen_const_inline(cg, child, inner),
                        }
                    } else if self.types.has_bits(child) {
                        let (payload, present) = match inner {
                            Some(inner) => (self.gen_const_inline(cg, child, inner)?, true),
                            None => {
                                let child_ref = self.type_ref(cg, child);
                                (cg.module.const_undef(child_ref), false)
                            }
                        };
                        let flag = cg.module.const_bool(present);
                        Some(cg.module.const_struct(type_ref, &[payload, flag]))
                    } else {
                        Some(cg.module.const_bool(inner.is_some()))
                    }
                }
                _ => None,
            },
            TypeKind::ErrorUnion { child } => match &value.payload {
                ConstPayload::Err { tag, payload } => {
                    let tag_ty = cg.module.types.int(ERR_TAG_BITS);
                    let tag_val = cg.module.const_int(tag_ty, *tag);
                    if self.types.has_bits(child) {
                        let payload_val = match payload {
                            Some(payload) => self.gen_const_inline(cg, child, payload)?,
                            None => {
                                let child_ref = self.type_ref(cg, child);
                                cg.module.const_undef(child_ref)
                            }
                        };
                        Some(cg.module.const_struct(type_ref, &[tag_val, payload_val]))
                    } else {
                        Some(tag_val)
                    }
                }
                _ => None,
            },
            // enums with payloads fall back to runtime construction
            TypeKind::Enum { tag_type, .. } => match &value.payload {
                ConstPayload::Enum { tag, payload: None } => {
                    let payloads = self.types.enum_payload_types(canonical);
                    if payloads.is_empty() {
                        let tag_ref = self.type_ref(cg, tag_type);
                        Some(cg.module.const_int(tag_ref, *tag))
                    } else {
                        None
                    }
                }
                _ => None,
            },
            _ => None,
        }
    }

    // ===== debug info =====

    pub(crate) fn di_file(&self, cg: &mut Cg, import: ImportId) -> MdId {
        if let Some(&existing) = cg.di_files.get(&import) {
            return existing;
        }
        let path = self.imports.get(import).absolute_path.clone();
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let directory = path
            .parent()
            .map(|d| d.display().to_string())
            .unwrap_or_default();
        let file = cg.module.di.create_file(&filename, &directory);
        cg.di_files.insert(import, file);
        file
    }

    /// The debug type for a non-zero-bit type, built on demand. Composite
    /// types go through the replaceable-forward-declaration pattern so
    /// recursion through pointers terminates.
    pub(crate) fn di_type(&self, cg: &mut Cg, ty: TypeId, import: ImportId) -> MdId {
        let canonical = self.types.canonical(ty);
        if let Some(&existing) = cg.di_types.get(&canonical) {
            return existing;
        }
        let entry_size = self.types.get(canonical).abi_size * 8;
        let name = self.types.name(canonical).to_owned();
        let id = match self.types.kind(canonical).clone() {
            TypeKind::Bool => cg
                .module
                .di
                .create_basic_type("bool", 8, DwarfEncoding::Boolean),
            TypeKind::Int { is_signed, bits } => {
                let encoding = match (is_signed, bits) {
                    (true, 8) => DwarfEncoding::SignedChar,
                    (false, 8) => DwarfEncoding::UnsignedChar,
                    (true, _) => DwarfEncoding::Signed,
                    (false, _) => DwarfEncoding::Unsigned,
                };
                cg.module.di.create_basic_type(&name, u64::from(bits), encoding)
            }
            TypeKind::Float { bits } => {
                cg.module
                    .di
                    .create_basic_type(&name, u64::from(bits), DwarfEncoding::Float)
            }
            TypeKind::PureError => cg.module.di.create_basic_type(
                &name,
                u64::from(ERR_TAG_BITS),
                DwarfEncoding::Unsigned,
            ),
            TypeKind::Pointer { child, .. } => {
                let pointee = if self.types.has_bits(child) {
                    Some(self.di_type(cg, child, import))
                } else {
                    None
                };
                cg.module
                    .di
                    .create_pointer_type(pointee, u64::from(self.types.ptr_bits()), &name)
            }
            TypeKind::Array { child, len } => {
                let base = self.di_type(cg, child, import);
                cg.module.di.create_array_type(base, len, entry_size)
            }
            TypeKind::Struct { fields, .. } => {
                let placeholder = cg.module.di.create_replaceable_composite(&name);
                cg.di_types.insert(canonical, placeholder);
                let file = self.di_file(cg, import);
                let mut members = Vec::new();
                for field in fields.iter().filter(|f| f.gen_index.is_some()) {
                    let base = self.di_type(cg, field.ty, import);
                    let field_size = self.types.get(field.ty).abi_size * 8;
                    let member = cg.module.di.create_member_type(
                        placeholder,
                        self.interner.get(field.name),
                        file,
                        0,
                        field_size,
                        field.offset * 8,
                        base,
                    );
                    members.push(member);
                }
                let align = self.types.get(canonical).abi_align * 8;
                let text = cg
                    .module
                    .di
                    .struct_type_text(&name, file, 0, entry_size, align, &members);
                cg.module.di.replace_composite(placeholder, text);
                return placeholder;
            }
            TypeKind::Enum { fields, tag_type, .. } => {
                let file = self.di_file(cg, import);
                let payloads = self.types.enum_payload_types(canonical);
                if payloads.is_empty() {
                    let mut enumerators = Vec::new();
                    for field in &fields {
                        let enumerator = cg
                            .module
                            .di
                            .create_enumerator(self.interner.get(field.name), field.value);
                        enumerators.push(enumerator);
                    }
                    cg.module
                        .di
                        .create_enumeration_type(&name, file, 0, entry_size, &enumerators)
                } else {
                    // tag + union composite
                    let placeholder = cg.module.di.create_replaceable_composite(&name);
                    cg.di_types.insert(canonical, placeholder);
                    let tag_di = self.di_type(cg, tag_type, import);
                    let tag_size = self.types.get(tag_type).abi_size * 8;
                    let tag_member = cg.module.di.create_member_type(
                        placeholder,
                        "tag",
                        file,
                        0,
                        tag_size,
                        0,
                        tag_di,
                    );
                    let mut union_members = Vec::new();
                    for &payload in &payloads {
                        let base = self.di_type(cg, payload, import);
                        let size = self.types.get(payload).abi_size * 8;
                        let member = cg.module.di.create_member_type(
                            placeholder,
                            self.types.name(payload),
                            file,
                            0,
                            size,
                            0,
                            base,
                        );
                        union_members.push(member);
                    }
                    let union_text =
                        cg.module
                            .di
                            .union_type_text(&format!("{name}.payload"), file, 0, entry_size, &union_members);
                    let union_placeholder = cg.module.di.create_replaceable_composite(&format!("{name}.payload"));
                    cg.module.di.replace_composite(union_placeholder, union_text);
                    let payload_member = cg.module.di.create_member_type(
                        placeholder,
                        "payload",
                        file,
                        0,
                        entry_size - tag_size,
                        tag_size,
                        union_placeholder,
                    );
                    let align = self.types.get(canonical).abi_align * 8;
                    let text = cg.module.di.struct_type_text(
                        &name,
                        file,
                        0,
                        entry_size,
                        align,
                        &[tag_member, payload_member],
                    );
                    cg.module.di.replace_composite(placeholder, text);
                    return placeholder;
                }
            }
            TypeKind::Slice { child, .. } => {
                let placeholder = cg.module.di.create_replaceable_composite(&name);
                cg.di_types.insert(canonical, placeholder);
                let file = self.di_file(cg, import);
                let elem = self.di_type(cg, child, import);
                let ptr_bits = u64::from(self.types.ptr_bits());
                let ptr_di = cg.module.di.create_pointer_type(Some(elem), ptr_bits, "ptr");
                let len_base = cg
                    .module
                    .di
                    .create_basic_type("isize", ptr_bits, DwarfEncoding::Signed);
                let ptr_member =
                    cg.module
                        .di
                        .create_member_type(placeholder, "ptr", file, 0, ptr_bits, 0, ptr_di);
                let len_member = cg.module.di.create_member_type(
                    placeholder,
                    "len",
                    file,
                    0,
                    ptr_bits,
                    ptr_bits,
                    len_base,
                );
                let text = cg.module.di.struct_type_text(
                    &name,
                    file,
                    0,
                    entry_size,
                    ptr_bits,
                    &[ptr_member, len_member],
                );
                cg.module.di.replace_composite(placeholder, text);
                return placeholder;
            }
            TypeKind::Maybe { child } | TypeKind::ErrorUnion { child } => {
                // rendered as an opaque-ish struct wrapper around the child
                let placeholder = cg.module.di.create_replaceable_composite(&name);
                cg.di_types.insert(canonical, placeholder);
                let file = self.di_file(cg, import);
                let mut members = Vec::new();
                if self.types.has_bits(child) {
                    let base = self.di_type(cg, child, import);
                    let size = self.types.get(child).abi_size * 8;
                    members.push(cg.module.di.create_member_type(
                        placeholder,
                        "value",
                        file,
                        0,
                        size,
                        0,
                        base,
                    ));
                }
                let align = self.types.get(canonical).abi_align.max(1) * 8;
                let text = cg
                    .module
                    .di
                    .struct_type_text(&name, file, 0, entry_size, align, &members);
                cg.module.di.replace_composite(placeholder, text);
                return placeholder;
            }
            TypeKind::Fn(_) => cg.module.di.create_pointer_type(
                None,
                u64::from(self.types.ptr_bits()),
                &name,
            ),
            _ => cg
                .module
                .di
                .create_basic_type(&name, entry_size, DwarfEncoding::Unsigned),
        };
        cg.di_types.insert(canonical, id);
        id
    }
}
