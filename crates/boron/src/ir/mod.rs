//! In-memory LLVM-style IR, rendered as textual `.ll`.
//!
//! The emitter drives this through [`builder::Builder`], which appends
//! instructions to basic blocks and mints `%tN` temporaries. Types are
//! interned in a [`TypeStore`] and referenced by [`TypeRef`]; values carry
//! their type plus their rendered form, so constants and instruction
//! results compose uniformly.
//!
//! Builder-level verification (type mismatches, instructions after a
//! terminator) is `debug_assert!`-only: debug builds abort, release builds
//! skip the check.

pub mod builder;
pub mod di;
mod print;

use ahash::AHashMap;
use indexmap::IndexMap;

/// Handle to an interned IR type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeRef(u32);

impl TypeRef {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TypeDesc {
    Void,
    Int(u32),
    Float(u32),
    Ptr(TypeRef),
    Array(TypeRef, u64),
    Struct(Vec<TypeRef>),
    /// Named struct; body attached later via `set_struct_body`.
    Named(u32),
    Fn {
        ret: TypeRef,
        params: Vec<TypeRef>,
        var_args: bool,
    },
}

#[derive(Debug)]
struct NamedStruct {
    name: String,
    body: Option<Vec<TypeRef>>,
}

/// Interning store for IR types.
#[derive(Debug, Default)]
pub struct TypeStore {
    descs: Vec<TypeDesc>,
    dedup: AHashMap<TypeDesc, TypeRef>,
    named: Vec<NamedStruct>,
}

impl TypeStore {
    fn intern(&mut self, desc: TypeDesc) -> TypeRef {
        if let Some(&id) = self.dedup.get(&desc) {
            return id;
        }
        let id = TypeRef(u32::try_from(self.descs.len()).expect("ir type overflow"));
        self.descs.push(desc.clone());
        self.dedup.insert(desc, id);
        id
    }

    pub fn void(&mut self) -> TypeRef {
        self.intern(TypeDesc::Void)
    }

    pub fn int(&mut self, bits: u32) -> TypeRef {
        self.intern(TypeDesc::Int(bits))
    }

    pub fn float(&mut self, bits: u32) -> TypeRef {
        self.intern(TypeDesc::Float(bits))
    }

    pub fn ptr(&mut self, pointee: TypeRef) -> TypeRef {
        self.intern(TypeDesc::Ptr(pointee))
    }

    pub fn array(&mut self, elem: TypeRef, len: u64) -> TypeRef {
        self.intern(TypeDesc::Array(elem, len))
    }

    pub fn anon_struct(&mut self, fields: Vec<TypeRef>) -> TypeRef {
        self.intern(TypeDesc::Struct(fields))
    }

    /// Creates a named struct with no body yet; recursive types point at it
    /// before the body is set. Name clashes get a numeric suffix.
    pub fn named_struct(&mut self, name: &str) -> TypeRef {
        let mut unique = name.to_owned();
        if self.named.iter().any(|n| n.name == unique) {
            unique = format!("{name}.{}", self.named.len());
        }
        let named_idx = u32::try_from(self.named.len()).expect("named struct overflow");
        self.named.push(NamedStruct {
            name: unique,
            body: None,
        });
        let id = TypeRef(u32::try_from(self.descs.len()).expect("ir type overflow"));
        self.descs.push(TypeDesc::Named(named_idx));
        id
    }

    pub fn set_struct_body(&mut self, ty: TypeRef, fields: Vec<TypeRef>) {
        let TypeDesc::Named(idx) = self.descs[ty.index()] else {
            panic!("set_struct_body on unnamed type");
        };
        self.named[idx as usize].body = Some(fields);
    }

    pub fn func(&mut self, ret: TypeRef, params: Vec<TypeRef>, var_args: bool) -> TypeRef {
        self.intern(TypeDesc::Fn { ret, params, var_args })
    }

    /// The pointee of a pointer type.
    pub fn pointee(&self, ty: TypeRef) -> TypeRef {
        match &self.descs[ty.index()] {
            TypeDesc::Ptr(pointee) => *pointee,
            other => panic!("pointee of non-pointer type {other:?}"),
        }
    }

    pub fn is_float(&self, ty: TypeRef) -> bool {
        matches!(self.descs[ty.index()], TypeDesc::Float(_))
    }

    pub fn int_bits(&self, ty: TypeRef) -> Option<u32> {
        match self.descs[ty.index()] {
            TypeDesc::Int(bits) => Some(bits),
            _ => None,
        }
    }

    pub fn fn_return(&self, ty: TypeRef) -> Option<TypeRef> {
        match &self.descs[ty.index()] {
            TypeDesc::Fn { ret, .. } => Some(*ret),
            _ => None,
        }
    }

    /// Renders the type in `.ll` syntax.
    pub fn text(&self, ty: TypeRef) -> String {
        match &self.descs[ty.index()] {
            TypeDesc::Void => "void".to_owned(),
            TypeDesc::Int(bits) => format!("i{bits}"),
            TypeDesc::Float(32) => "float".to_owned(),
            TypeDesc::Float(_) => "double".to_owned(),
            TypeDesc::Ptr(pointee) => format!("{}*", self.text(*pointee)),
            TypeDesc::Array(elem, len) => format!("[{len} x {}]", self.text(*elem)),
            TypeDesc::Struct(fields) => {
                let inner: Vec<String> = fields.iter().map(|&f| self.text(f)).collect();
                format!("{{ {} }}", inner.join(", "))
            }
            TypeDesc::Named(idx) => format!("%{}", self.named[*idx as usize].name),
            TypeDesc::Fn { ret, params, var_args } => {
                let mut inner: Vec<String> = params.iter().map(|&p| self.text(p)).collect();
                if *var_args {
                    inner.push("...".to_owned());
                }
                format!("{} ({})", self.text(*ret), inner.join(", "))
            }
        }
    }
}

/// A typed IR value: a constant, global, parameter, or instruction result.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRef {
    pub ty: TypeRef,
    pub text: String,
}

impl ValueRef {
    pub fn new(ty: TypeRef, text: impl Into<String>) -> Self {
        Self {
            ty,
            text: text.into(),
        }
    }

    /// `type value` form used inside instructions.
    pub fn typed(&self, types: &TypeStore) -> String {
        format!("{} {}", types.text(self.ty), self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    External,
    Internal,
    /// `private unnamed_addr` constants.
    Private,
}

impl Linkage {
    fn keyword(self) -> &'static str {
        match self {
            Linkage::External => "",
            Linkage::Internal => "internal ",
            Linkage::Private => "private ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallConv {
    C,
    Fast,
    Cold,
}

impl CallConv {
    fn keyword(self) -> &'static str {
        match self {
            CallConv::C => "",
            CallConv::Fast => "fastcc ",
            CallConv::Cold => "coldcc ",
        }
    }
}

/// Handle to a function in the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncRef(u32);

impl FuncRef {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a basic block, scoped to its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    func: FuncRef,
    block: u32,
}

#[derive(Debug)]
pub(crate) struct BasicBlock {
    label: String,
    lines: Vec<String>,
    terminated: bool,
}

#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub ty: TypeRef,
    pub attrs: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct Function {
    name: String,
    ret: TypeRef,
    params: Vec<ParamInfo>,
    var_args: bool,
    cc: CallConv,
    linkage: Linkage,
    /// Function-level attribute keywords (`noreturn`, `nounwind`, ...).
    attrs: Vec<String>,
    blocks: Vec<BasicBlock>,
    next_temp: u32,
    is_definition: bool,
    di_subprogram: Option<di::MdId>,
}

#[derive(Debug)]
struct Global {
    name: String,
    ty: TypeRef,
    init: String,
    constant: bool,
    linkage: Linkage,
    unnamed_addr: bool,
}

/// Handle to a module-level global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalRef(u32);

/// One LLVM module per compilation.
#[derive(Debug)]
pub struct Module {
    pub types: TypeStore,
    pub di: di::DebugInfo,
    functions: Vec<Function>,
    globals: Vec<Global>,
    /// Intrinsic `declare` lines, keyed by symbol name.
    intrinsic_decls: IndexMap<String, String>,
    triple: String,
    next_global: u32,
}

impl Module {
    pub fn new(module_name: &str, triple: String) -> Self {
        Self {
            types: TypeStore::default(),
            di: di::DebugInfo::new(module_name),
            functions: Vec::new(),
            globals: Vec::new(),
            intrinsic_decls: IndexMap::new(),
            triple,
            next_global: 0,
        }
    }

    pub fn add_function(
        &mut self,
        name: &str,
        ret: TypeRef,
        params: Vec<ParamInfo>,
        var_args: bool,
        cc: CallConv,
        linkage: Linkage,
        is_definition: bool,
    ) -> FuncRef {
        let id = FuncRef(u32::try_from(self.functions.len()).expect("function overflow"));
        self.functions.push(Function {
            name: name.to_owned(),
            ret,
            params,
            var_args,
            cc,
            linkage,
            attrs: Vec::new(),
            blocks: Vec::new(),
            next_temp: 0,
            is_definition,
            di_subprogram: None,
        });
        id
    }

    pub fn add_fn_attr(&mut self, func: FuncRef, attr: &str) {
        let attrs = &mut self.functions[func.index()].attrs;
        if !attrs.iter().any(|a| a == attr) {
            attrs.push(attr.to_owned());
        }
    }

    pub fn set_subprogram(&mut self, func: FuncRef, subprogram: di::MdId) {
        self.functions[func.index()].di_subprogram = Some(subprogram);
    }

    pub fn fn_name(&self, func: FuncRef) -> &str {
        &self.functions[func.index()].name
    }

    pub fn fn_return_type(&self, func: FuncRef) -> TypeRef {
        self.functions[func.index()].ret
    }

    pub fn fn_call_conv(&self, func: FuncRef) -> CallConv {
        self.functions[func.index()].cc
    }

    /// The `%N` value for a parameter inside the function body.
    pub fn param_value(&self, func: FuncRef, index: usize) -> ValueRef {
        let function = &self.functions[func.index()];
        ValueRef::new(function.params[index].ty, format!("%{index}"))
    }

    /// The function as a callable/storable pointer value.
    pub fn fn_pointer(&mut self, func: FuncRef) -> ValueRef {
        let function = &self.functions[func.index()];
        let param_tys: Vec<TypeRef> = function.params.iter().map(|p| p.ty).collect();
        let (ret, var_args, name) = (function.ret, function.var_args, function.name.clone());
        let fn_ty = self.types.func(ret, param_tys, var_args);
        let ptr_ty = self.types.ptr(fn_ty);
        ValueRef::new(ptr_ty, format!("@{name}"))
    }

    pub fn append_block(&mut self, func: FuncRef, name: &str) -> BlockRef {
        let function = &mut self.functions[func.index()];
        let block_idx = u32::try_from(function.blocks.len()).expect("block overflow");
        let label = format!("{name}{block_idx}");
        function.blocks.push(BasicBlock {
            label,
            lines: Vec::new(),
            terminated: false,
        });
        BlockRef {
            func,
            block: block_idx,
        }
    }

    pub fn block_label(&self, block: BlockRef) -> String {
        self.functions[block.func.index()].blocks[block.block as usize]
            .label
            .clone()
    }

    pub fn block_is_terminated(&self, block: BlockRef) -> bool {
        self.functions[block.func.index()].blocks[block.block as usize].terminated
    }

    pub(crate) fn block_mut(&mut self, block: BlockRef) -> &mut BasicBlock {
        &mut self.functions[block.func.index()].blocks[block.block as usize]
    }

    pub(crate) fn mint_temp(&mut self, func: FuncRef) -> String {
        let function = &mut self.functions[func.index()];
        let id = function.next_temp;
        function.next_temp += 1;
        format!("%t{id}")
    }

    /// Adds a module-level global, generating a name when none is given.
    pub fn add_global(
        &mut self,
        name: Option<&str>,
        init: &ValueRef,
        constant: bool,
        linkage: Linkage,
    ) -> ValueRef {
        let name = match name {
            Some(name) => name.to_owned(),
            None => {
                let id = self.next_global;
                self.next_global += 1;
                format!("const{id}")
            }
        };
        let ptr_ty = self.types.ptr(init.ty);
        self.globals.push(Global {
            name: name.clone(),
            ty: init.ty,
            init: init.text.clone(),
            constant,
            linkage,
            unnamed_addr: linkage == Linkage::Private,
        });
        ValueRef::new(ptr_ty, format!("@{name}"))
    }

    pub(crate) fn declare_intrinsic(&mut self, symbol: &str, decl_line: String) {
        self.intrinsic_decls.entry(symbol.to_owned()).or_insert(decl_line);
    }

    // ===== constants =====

    pub fn const_int(&mut self, ty: TypeRef, twos_complement: u64) -> ValueRef {
        let bits = self.types.int_bits(ty).expect("const_int on non-int");
        // render as the signed interpretation, which is how LLVM prints
        let text = if bits < 64 {
            let shift = 64 - bits;
            (((twos_complement << shift) as i64) >> shift).to_string()
        } else {
            (twos_complement as i64).to_string()
        };
        ValueRef::new(ty, text)
    }

    pub fn const_bool(&mut self, value: bool) -> ValueRef {
        let ty = self.types.int(1);
        ValueRef::new(ty, if value { "true" } else { "false" })
    }

    pub fn const_float(&mut self, ty: TypeRef, value: f64) -> ValueRef {
        // hex float form round-trips exactly for both float and double
        let bits = if self.types.text(ty) == "float" {
            f64::from(value as f32).to_bits()
        } else {
            value.to_bits()
        };
        ValueRef::new(ty, format!("0x{bits:016X}"))
    }

    pub fn const_null(&mut self, ptr_ty: TypeRef) -> ValueRef {
        ValueRef::new(ptr_ty, "null")
    }

    pub fn const_undef(&mut self, ty: TypeRef) -> ValueRef {
        ValueRef::new(ty, "undef")
    }

    pub fn const_all_ones(&mut self, ty: TypeRef) -> ValueRef {
        let bits = self.types.int_bits(ty).expect("all_ones on non-int");
        self.const_int(ty, if bits >= 64 { u64::MAX } else { (1 << bits) - 1 })
    }

    pub fn const_struct(&mut self, ty: TypeRef, fields: &[ValueRef]) -> ValueRef {
        let inner: Vec<String> = fields.iter().map(|f| f.typed(&self.types)).collect();
        ValueRef::new(ty, format!("{{ {} }}", inner.join(", ")))
    }

    pub fn const_array(&mut self, elem_ty: TypeRef, elems: &[ValueRef]) -> ValueRef {
        let ty = self.types.array(elem_ty, elems.len() as u64);
        let inner: Vec<String> = elems.iter().map(|e| e.typed(&self.types)).collect();
        ValueRef::new(ty, format!("[{}]", inner.join(", ")))
    }

    pub fn const_string(&mut self, bytes: &[u8]) -> ValueRef {
        let i8_ty = self.types.int(8);
        let ty = self.types.array(i8_ty, bytes.len() as u64);
        let mut text = String::from("c\"");
        for &byte in bytes {
            match byte {
                b'"' | b'\\' => text.push_str(&format!("\\{byte:02X}")),
                0x20..=0x7e => text.push(byte as char),
                _ => text.push_str(&format!("\\{byte:02X}")),
            }
        }
        text.push('"');
        ValueRef::new(ty, text)
    }

    /// `getelementptr` constant expression addressing an element of a
    /// constant array global.
    pub fn const_gep_first(&mut self, global: &ValueRef, index: u64) -> ValueRef {
        let array_ty = self.types.pointee(global.ty);
        let TypeDesc::Array(elem, _) = self.types.descs[array_ty.index()].clone() else {
            panic!("const_gep_first on non-array global");
        };
        let elem_ptr = self.types.ptr(elem);
        let array_text = self.types.text(array_ty);
        let global_text = self.types.text(global.ty);
        ValueRef::new(
            elem_ptr,
            format!(
                "getelementptr inbounds ({array_text}, {global_text} {}, i64 0, i64 {index})",
                global.text
            ),
        )
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_texts() {
        let mut types = TypeStore::default();
        let i32_ = types.int(32);
        let ptr = types.ptr(i32_);
        let arr = types.array(i32_, 4);
        let st = types.anon_struct(vec![ptr, i32_]);
        assert_eq!(types.text(i32_), "i32");
        assert_eq!(types.text(ptr), "i32*");
        assert_eq!(types.text(arr), "[4 x i32]");
        assert_eq!(types.text(st), "{ i32*, i32 }");
        let void_ = types.void();
        let f = types.func(void_, vec![i32_], false);
        assert_eq!(types.text(f), "void (i32)");
    }

    #[test]
    fn named_struct_body() {
        let mut types = TypeStore::default();
        let st = types.named_struct("Point");
        let i32_ = types.int(32);
        types.set_struct_body(st, vec![i32_, i32_]);
        assert_eq!(types.text(st), "%Point");
    }

    #[test]
    fn const_int_signed_rendering() {
        let mut module = Module::new("t", "x86_64-unknown-linux-gnu".into());
        let i8_ty = module.types.int(8);
        let value = module.const_int(i8_ty, 0xff);
        assert_eq!(value.text, "-1");
        let value = module.const_int(i8_ty, 5);
        assert_eq!(value.text, "5");
    }

    #[test]
    fn const_string_escaping() {
        let mut module = Module::new("t", "t".into());
        let value = module.const_string(b"hi\n");
        assert_eq!(value.text, "c\"hi\\0A\"");
        assert_eq!(module.types.text(value.ty), "[3 x i8]");
    }

    #[test]
    fn interning_shares_types() {
        let mut types = TypeStore::default();
        let a = types.int(64);
        let b = types.int(64);
        assert_eq!(a, b);
        let pa = types.ptr(a);
        let pb = types.ptr(b);
        assert_eq!(pa, pb);
    }
}
