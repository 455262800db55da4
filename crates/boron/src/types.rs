//! The type registry.
//!
//! All constructed types are interned in one central store and referenced by
//! [`TypeId`] handles; equal shapes share identity, so type equality during
//! analysis is integer comparison. Nominal containers (structs, enums) are
//! pre-allocated incomplete and filled in when their field types resolve,
//! which is how self-referential types through pointers work.
//!
//! Type construction cannot fail: `Invalid` is a distinguished entry that
//! propagates through every operation and absorbs further diagnostics.

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::intern::{Interner, StringId};

/// Handle into the type registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FnParam {
    pub ty: TypeId,
    pub is_noalias: bool,
}

/// The full identity of a function type; hashed for interning.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FnTypeId {
    pub is_extern: bool,
    pub is_naked: bool,
    pub is_cold: bool,
    pub is_var_args: bool,
    pub params: Vec<FnParam>,
    pub return_type: TypeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: StringId,
    pub ty: TypeId,
    /// Index in the source declaration.
    pub src_index: usize,
    /// Index in the runtime layout; `None` for zero-bit fields, which are
    /// omitted from the generated struct.
    pub gen_index: Option<u32>,
    /// Byte offset in the runtime layout; meaningless for zero-bit fields.
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumField {
    pub name: StringId,
    /// Payload type; `void` for plain members.
    pub ty: TypeId,
    /// Tag value, assigned in declaration order.
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Invalid,
    /// The type of types.
    MetaType,
    /// The type of an import reference.
    Namespace,
    Void,
    Unreachable,
    Bool,
    Int { is_signed: bool, bits: u32 },
    Float { bits: u32 },
    /// Untyped integer literal, unified with a context type on use.
    NumLitInt,
    /// Untyped float literal.
    NumLitFloat,
    /// The type of `undefined` before unification.
    UndefLit,
    Pointer { child: TypeId, is_const: bool },
    Array { child: TypeId, len: u64 },
    /// `[]T` / `[]const T`; laid out as `{ ptr: *T, len: isize }`.
    Slice { child: TypeId, is_const: bool },
    Maybe { child: TypeId },
    ErrorUnion { child: TypeId },
    /// The bare error tag, no payload.
    PureError,
    Fn(FnTypeId),
    Struct {
        name: StringId,
        fields: Vec<StructField>,
        complete: bool,
        invalid: bool,
    },
    Enum {
        name: StringId,
        fields: Vec<EnumField>,
        tag_type: TypeId,
        complete: bool,
    },
    /// Transparent named alias; layout-transparent but preserves the name
    /// in diagnostics.
    TypeDecl { name: StringId, child: TypeId },
}

#[derive(Debug)]
pub struct TypeEntry {
    pub kind: TypeKind,
    /// Rendered name for diagnostics, e.g. `?*const u8`.
    pub name: String,
    /// True when values of this type have no runtime representation.
    pub zero_bits: bool,
    pub abi_size: u64,
    pub abi_align: u64,
}

/// Pre-allocated ids for the built-in types.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinTypes {
    pub invalid: TypeId,
    pub meta_type: TypeId,
    pub namespace: TypeId,
    pub void: TypeId,
    pub unreachable_: TypeId,
    pub bool_: TypeId,
    pub num_lit_int: TypeId,
    pub num_lit_float: TypeId,
    pub undef_lit: TypeId,
    pub pure_error: TypeId,
    pub f32_: TypeId,
    pub f64_: TypeId,
    pub isize_: TypeId,
    pub usize_: TypeId,
    pub u8_: TypeId,
    /// Integer type of the error tag; bounds the number of error values.
    pub err_tag_type: TypeId,
}

#[derive(Debug)]
pub struct TypeRegistry {
    entries: Vec<TypeEntry>,
    int_table: AHashMap<(bool, u32), TypeId>,
    pointer_table: AHashMap<(TypeId, bool), TypeId>,
    slice_table: AHashMap<(TypeId, bool), TypeId>,
    array_table: AHashMap<(TypeId, u64), TypeId>,
    maybe_table: AHashMap<TypeId, TypeId>,
    error_union_table: AHashMap<TypeId, TypeId>,
    fn_table: AHashMap<FnTypeId, TypeId>,
    pub builtin: BuiltinTypes,
    ptr_bits: u32,
}

impl TypeRegistry {
    pub fn new(ptr_bits: u32) -> Self {
        let mut registry = TypeRegistry {
            entries: Vec::new(),
            int_table: AHashMap::new(),
            pointer_table: AHashMap::new(),
            slice_table: AHashMap::new(),
            array_table: AHashMap::new(),
            maybe_table: AHashMap::new(),
            error_union_table: AHashMap::new(),
            fn_table: AHashMap::new(),
            // patched below once the entries exist
            builtin: BuiltinTypes {
                invalid: TypeId(0),
                meta_type: TypeId(0),
                namespace: TypeId(0),
                void: TypeId(0),
                unreachable_: TypeId(0),
                bool_: TypeId(0),
                num_lit_int: TypeId(0),
                num_lit_float: TypeId(0),
                undef_lit: TypeId(0),
                pure_error: TypeId(0),
                f32_: TypeId(0),
                f64_: TypeId(0),
                isize_: TypeId(0),
                usize_: TypeId(0),
                u8_: TypeId(0),
                err_tag_type: TypeId(0),
            },
            ptr_bits,
        };

        let zero_sized = |kind: TypeKind, name: &str| TypeEntry {
            kind,
            name: name.to_owned(),
            zero_bits: true,
            abi_size: 0,
            abi_align: 0,
        };
        registry.builtin.invalid = registry.push(zero_sized(TypeKind::Invalid, "(invalid)"));
        registry.builtin.meta_type = registry.push(zero_sized(TypeKind::MetaType, "type"));
        registry.builtin.namespace = registry.push(zero_sized(TypeKind::Namespace, "(namespace)"));
        registry.builtin.void = registry.push(zero_sized(TypeKind::Void, "void"));
        registry.builtin.unreachable_ =
            registry.push(zero_sized(TypeKind::Unreachable, "unreachable"));
        registry.builtin.bool_ = registry.push(TypeEntry {
            kind: TypeKind::Bool,
            name: "bool".to_owned(),
            zero_bits: false,
            abi_size: 1,
            abi_align: 1,
        });
        registry.builtin.num_lit_int =
            registry.push(zero_sized(TypeKind::NumLitInt, "(integer literal)"));
        registry.builtin.num_lit_float =
            registry.push(zero_sized(TypeKind::NumLitFloat, "(float literal)"));
        registry.builtin.undef_lit = registry.push(zero_sized(TypeKind::UndefLit, "(undefined)"));
        registry.builtin.pure_error = registry.push(TypeEntry {
            kind: TypeKind::PureError,
            name: "error".to_owned(),
            zero_bits: false,
            abi_size: u64::from(ERR_TAG_BITS / 8),
            abi_align: u64::from(ERR_TAG_BITS / 8),
        });
        registry.builtin.f32_ = registry.push(TypeEntry {
            kind: TypeKind::Float { bits: 32 },
            name: "f32".to_owned(),
            zero_bits: false,
            abi_size: 4,
            abi_align: 4,
        });
        registry.builtin.f64_ = registry.push(TypeEntry {
            kind: TypeKind::Float { bits: 64 },
            name: "f64".to_owned(),
            zero_bits: false,
            abi_size: 8,
            abi_align: 8,
        });
        // fixed-width integers intern first so the pointer-sized aliases
        // share their entries (and their names)
        for bits in [8u32, 16, 32, 64] {
            registry.get_int(true, bits);
            registry.get_int(false, bits);
        }
        registry.builtin.isize_ = registry.get_int(true, ptr_bits);
        registry.builtin.usize_ = registry.get_int(false, ptr_bits);
        registry.builtin.u8_ = registry.get_int(false, 8);
        registry.builtin.err_tag_type = registry.get_int(false, ERR_TAG_BITS);
        registry
    }

    fn push(&mut self, entry: TypeEntry) -> TypeId {
        let id = TypeId(u32::try_from(self.entries.len()).expect("type registry overflow"));
        self.entries.push(entry);
        id
    }

    pub fn get(&self, id: TypeId) -> &TypeEntry {
        &self.entries[id.index()]
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.entries[id.index()].kind
    }

    pub fn name(&self, id: TypeId) -> &str {
        &self.entries[id.index()].name
    }

    pub fn ptr_bits(&self) -> u32 {
        self.ptr_bits
    }

    pub fn is_invalid(&self, id: TypeId) -> bool {
        id == self.builtin.invalid
    }

    pub fn has_bits(&self, id: TypeId) -> bool {
        !self.entries[id.index()].zero_bits
    }

    /// Walks through typedecl chains to the canonical type.
    pub fn canonical(&self, id: TypeId) -> TypeId {
        let mut current = id;
        while let TypeKind::TypeDecl { child, .. } = self.kind(current) {
            current = *child;
        }
        current
    }

    /// Whether values are manipulated by address in generated code.
    pub fn is_handle_type(&self, id: TypeId) -> bool {
        let id = self.canonical(id);
        if !self.has_bits(id) {
            return false;
        }
        match self.kind(id) {
            TypeKind::Struct { .. } | TypeKind::Array { .. } | TypeKind::Slice { .. } => true,
            TypeKind::Maybe { child } => !self.maybe_is_pointer(*child),
            TypeKind::ErrorUnion { child } => self.has_bits(*child),
            // an enum with any payload lowers to a tag+union pair
            TypeKind::Enum { fields, .. } => fields.iter().any(|f| self.has_bits(f.ty)),
            _ => false,
        }
    }

    /// `?T` collapses to the null bit pattern when `T` is a pointer or
    /// function type.
    pub fn maybe_is_pointer(&self, child: TypeId) -> bool {
        matches!(
            self.kind(self.canonical(child)),
            TypeKind::Pointer { .. } | TypeKind::Fn(_)
        )
    }

    pub fn get_int(&mut self, is_signed: bool, bits: u32) -> TypeId {
        if let Some(&id) = self.int_table.get(&(is_signed, bits)) {
            return id;
        }
        let name = format!("{}{bits}", if is_signed { 'i' } else { 'u' });
        let size = u64::from(bits.div_ceil(8));
        let id = self.push(TypeEntry {
            kind: TypeKind::Int { is_signed, bits },
            name,
            zero_bits: false,
            abi_size: size,
            abi_align: size,
        });
        self.int_table.insert((is_signed, bits), id);
        id
    }

    pub fn get_pointer(&mut self, child: TypeId, is_const: bool) -> TypeId {
        if let Some(&id) = self.pointer_table.get(&(child, is_const)) {
            return id;
        }
        let name = format!(
            "*{} {}",
            if is_const { "const" } else { "mut" },
            self.name(child)
        );
        // a pointer to a zero-bit type carries no information, but a
        // pointer to a container still being laid out assumes bits (this
        // is what lets self-referential types intern their pointers)
        let child_canonical = self.canonical(child);
        let child_zero = match self.kind(child_canonical) {
            TypeKind::Struct { complete: false, .. } | TypeKind::Enum { complete: false, .. } => {
                false
            }
            _ => !self.has_bits(child_canonical),
        };
        let ptr_size = u64::from(self.ptr_bits / 8);
        let id = self.push(TypeEntry {
            kind: TypeKind::Pointer { child, is_const },
            name,
            zero_bits: child_zero,
            abi_size: ptr_size,
            abi_align: ptr_size,
        });
        self.pointer_table.insert((child, is_const), id);
        id
    }

    pub fn get_array(&mut self, child: TypeId, len: u64) -> TypeId {
        if let Some(&id) = self.array_table.get(&(child, len)) {
            return id;
        }
        let name = format!("[{len}]{}", self.name(child));
        let child_entry = self.get(child);
        let zero_bits = len == 0 || child_entry.zero_bits;
        let (size, align) = if zero_bits {
            (0, 0)
        } else {
            (child_entry.abi_size * len, child_entry.abi_align)
        };
        let id = self.push(TypeEntry {
            kind: TypeKind::Array { child, len },
            name,
            zero_bits,
            abi_size: size,
            abi_align: align,
        });
        self.array_table.insert((child, len), id);
        id
    }

    pub fn get_slice(&mut self, child: TypeId, is_const: bool) -> TypeId {
        if let Some(&id) = self.slice_table.get(&(child, is_const)) {
            return id;
        }
        let name = format!(
            "[]{}{}",
            if is_const { "const " } else { "" },
            self.name(child)
        );
        let ptr_size = u64::from(self.ptr_bits / 8);
        let id = self.push(TypeEntry {
            kind: TypeKind::Slice { child, is_const },
            name,
            zero_bits: false,
            abi_size: ptr_size * 2,
            abi_align: ptr_size,
        });
        self.slice_table.insert((child, is_const), id);
        id
    }

    pub fn get_maybe(&mut self, child: TypeId) -> TypeId {
        if let Some(&id) = self.maybe_table.get(&child) {
            return id;
        }
        let name = format!("?{}", self.name(child));
        let (size, align) = if self.maybe_is_pointer(child) {
            let entry = self.get(self.canonical(child));
            (entry.abi_size, entry.abi_align)
        } else if self.has_bits(child) {
            let entry = self.get(child);
            // `{ value: T, present: bool }`
            let align = entry.abi_align.max(1);
            (align_forward(entry.abi_size + 1, align), align)
        } else {
            // just the present flag
            (1, 1)
        };
        let id = self.push(TypeEntry {
            kind: TypeKind::Maybe { child },
            name,
            zero_bits: false,
            abi_size: size,
            abi_align: align,
        });
        self.maybe_table.insert(child, id);
        id
    }

    pub fn get_error_union(&mut self, child: TypeId) -> TypeId {
        if let Some(&id) = self.error_union_table.get(&child) {
            return id;
        }
        let name = format!("%{}", self.name(child));
        let tag_size = u64::from(ERR_TAG_BITS / 8);
        let (size, align) = if self.has_bits(child) {
            let entry = self.get(child);
            let align = entry.abi_align.max(tag_size);
            (align_forward(tag_size, entry.abi_align.max(1)) + entry.abi_size, align)
        } else {
            // collapses to the bare tag
            (tag_size, tag_size)
        };
        let id = self.push(TypeEntry {
            kind: TypeKind::ErrorUnion { child },
            name,
            zero_bits: false,
            abi_size: align_forward(size, align),
            abi_align: align,
        });
        self.error_union_table.insert(child, id);
        id
    }

    pub fn get_fn(&mut self, fn_type_id: FnTypeId) -> TypeId {
        if let Some(&id) = self.fn_table.get(&fn_type_id) {
            return id;
        }
        let mut name = String::new();
        if fn_type_id.is_extern {
            name.push_str("extern ");
        }
        name.push_str("fn(");
        for (idx, param) in fn_type_id.params.iter().enumerate() {
            if idx != 0 {
                name.push_str(", ");
            }
            if param.is_noalias {
                name.push_str("noalias ");
            }
            name.push_str(self.name(param.ty));
        }
        if fn_type_id.is_var_args {
            if !fn_type_id.params.is_empty() {
                name.push_str(", ");
            }
            name.push_str("...");
        }
        name.push(')');
        let return_type = fn_type_id.return_type;
        if return_type != self.builtin.void {
            name.push_str(" -> ");
            name.push_str(self.name(return_type));
        }
        let ptr_size = u64::from(self.ptr_bits / 8);
        let id = self.push(TypeEntry {
            kind: TypeKind::Fn(fn_type_id.clone()),
            name,
            zero_bits: false,
            abi_size: ptr_size,
            abi_align: ptr_size,
        });
        self.fn_table.insert(fn_type_id, id);
        id
    }

    /// Pre-allocates an incomplete struct so self-references through
    /// pointers resolve; fields are committed by `complete_struct`.
    pub fn new_struct(&mut self, name: StringId, interner: &Interner) -> TypeId {
        self.push(TypeEntry {
            kind: TypeKind::Struct {
                name,
                fields: Vec::new(),
                complete: false,
                invalid: false,
            },
            name: interner.get(name).to_owned(),
            zero_bits: true,
            abi_size: 0,
            abi_align: 0,
        })
    }

    /// Commits the field list and layout of a pre-allocated struct.
    ///
    /// Zero-bit fields get no `gen_index` and are left out of the runtime
    /// layout.
    pub fn complete_struct(&mut self, id: TypeId, mut fields: Vec<StructField>) {
        let mut offset = 0u64;
        let mut align = 0u64;
        let mut gen_index = 0u32;
        let mut any_bits = false;
        for field in &mut fields {
            if self.has_bits(field.ty) {
                let entry = self.get(field.ty);
                offset = align_forward(offset, entry.abi_align);
                field.offset = offset;
                field.gen_index = Some(gen_index);
                gen_index += 1;
                offset += entry.abi_size;
                align = align.max(entry.abi_align);
                any_bits = true;
            } else {
                field.gen_index = None;
            }
        }
        let size = if any_bits { align_forward(offset, align) } else { 0 };
        let entry = &mut self.entries[id.index()];
        entry.zero_bits = !any_bits;
        entry.abi_size = size;
        entry.abi_align = align;
        match &mut entry.kind {
            TypeKind::Struct {
                fields: slot,
                complete,
                ..
            } => {
                *slot = fields;
                *complete = true;
            }
            _ => unreachable!("complete_struct on non-struct"),
        }
    }

    pub fn mark_struct_invalid(&mut self, id: TypeId) {
        if let TypeKind::Struct { invalid, complete, .. } = &mut self.entries[id.index()].kind {
            *invalid = true;
            *complete = true;
        }
    }

    pub fn new_enum(&mut self, name: StringId, interner: &Interner) -> TypeId {
        self.push(TypeEntry {
            kind: TypeKind::Enum {
                name,
                fields: Vec::new(),
                tag_type: self.builtin.invalid,
                complete: false,
            },
            name: interner.get(name).to_owned(),
            zero_bits: true,
            abi_size: 0,
            abi_align: 0,
        })
    }

    /// Commits an enum's members.
    ///
    /// An enum whose payloads are all zero-bit collapses to its tag
    /// integer; otherwise the layout is `{ tag, union-of-largest-payload }`.
    pub fn complete_enum(&mut self, id: TypeId, fields: Vec<EnumField>) {
        let tag_bits = smallest_unsigned_bits(fields.len().saturating_sub(1) as u64);
        let tag_type = self.get_int(false, tag_bits);
        let tag_entry_size = self.get(tag_type).abi_size;

        let mut payload_size = 0u64;
        let mut payload_align = 0u64;
        for field in &fields {
            if self.has_bits(field.ty) {
                let entry = self.get(field.ty);
                payload_size = payload_size.max(entry.abi_size);
                payload_align = payload_align.max(entry.abi_align);
            }
        }
        let (size, align) = if payload_size == 0 {
            (tag_entry_size, tag_entry_size)
        } else {
            let align = tag_entry_size.max(payload_align);
            (
                align_forward(align_forward(tag_entry_size, payload_align) + payload_size, align),
                align,
            )
        };
        let zero_bits = fields.is_empty();
        let entry = &mut self.entries[id.index()];
        entry.zero_bits = zero_bits;
        entry.abi_size = if zero_bits { 0 } else { size };
        entry.abi_align = if zero_bits { 0 } else { align };
        match &mut entry.kind {
            TypeKind::Enum {
                fields: slot,
                tag_type: tag_slot,
                complete,
                ..
            } => {
                *slot = fields;
                *tag_slot = tag_type;
                *complete = true;
            }
            _ => unreachable!("complete_enum on non-enum"),
        }
    }

    pub fn get_typedecl(&mut self, name: StringId, child: TypeId, interner: &Interner) -> TypeId {
        let child_entry = self.get(child);
        let (zero_bits, abi_size, abi_align) =
            (child_entry.zero_bits, child_entry.abi_size, child_entry.abi_align);
        self.push(TypeEntry {
            kind: TypeKind::TypeDecl { name, child },
            name: interner.get(name).to_owned(),
            zero_bits,
            abi_size,
            abi_align,
        })
    }

    /// The payload types an enum's runtime union must cover, largest first.
    pub fn enum_payload_types(&self, id: TypeId) -> SmallVec<[TypeId; 4]> {
        let TypeKind::Enum { fields, .. } = self.kind(id) else {
            return SmallVec::new();
        };
        let mut out: SmallVec<[TypeId; 4]> = fields
            .iter()
            .map(|f| f.ty)
            .filter(|&ty| self.has_bits(ty))
            .collect();
        out.sort_by_key(|&ty| std::cmp::Reverse(self.get(ty).abi_size));
        out.dedup();
        out
    }
}

/// Error tag width; bounds the number of distinct error values.
pub const ERR_TAG_BITS: u32 = 16;

fn align_forward(value: u64, align: u64) -> u64 {
    if align <= 1 {
        return value;
    }
    value.div_ceil(align) * align
}

/// Smallest power-of-two unsigned width holding `max_value`.
fn smallest_unsigned_bits(max_value: u64) -> u32 {
    let needed = 64 - max_value.leading_zeros();
    match needed {
        0..=8 => 8,
        9..=16 => 16,
        17..=32 => 32,
        _ => 64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::new(64)
    }

    #[test]
    fn interned_constructors_share_identity() {
        let mut reg = registry();
        let i32_ = reg.get_int(true, 32);
        assert_eq!(reg.get_pointer(i32_, true), reg.get_pointer(i32_, true));
        assert_ne!(reg.get_pointer(i32_, true), reg.get_pointer(i32_, false));
        assert_eq!(reg.get_array(i32_, 3), reg.get_array(i32_, 3));
        assert_ne!(reg.get_array(i32_, 3), reg.get_array(i32_, 4));
        assert_eq!(reg.get_slice(i32_, true), reg.get_slice(i32_, true));
        assert_eq!(reg.get_maybe(i32_), reg.get_maybe(i32_));
        assert_eq!(reg.get_error_union(i32_), reg.get_error_union(i32_));
        let fn_id = FnTypeId {
            is_extern: false,
            is_naked: false,
            is_cold: false,
            is_var_args: false,
            params: vec![FnParam {
                ty: i32_,
                is_noalias: false,
            }],
            return_type: i32_,
        };
        assert_eq!(reg.get_fn(fn_id.clone()), reg.get_fn(fn_id.clone()));
        // the full id participates in interning, including attributes
        let cold = FnTypeId {
            is_cold: true,
            ..fn_id.clone()
        };
        assert_ne!(reg.get_fn(cold), reg.get_fn(fn_id));
    }

    #[test]
    fn zero_bit_rules() {
        let mut reg = registry();
        let i32_ = reg.get_int(true, 32);
        let void = reg.builtin.void;
        assert!(!reg.has_bits(void));
        let arr_i32_0 = reg.get_array(i32_, 0);
        assert!(!reg.has_bits(arr_i32_0));
        let arr_void_5 = reg.get_array(void, 5);
        assert!(!reg.has_bits(arr_void_5));
        let arr_i32_5 = reg.get_array(i32_, 5);
        assert!(reg.has_bits(arr_i32_5));
    }

    #[test]
    fn maybe_of_pointer_is_pointer_sized() {
        let mut reg = registry();
        let u8_ = reg.builtin.u8_;
        let ptr = reg.get_pointer(u8_, false);
        let maybe_ptr = reg.get_maybe(ptr);
        assert_eq!(reg.get(maybe_ptr).abi_size, 8);
        assert!(!reg.is_handle_type(maybe_ptr));
        let i32_ = reg.get_int(true, 32);
        let maybe_int = reg.get_maybe(i32_);
        assert_eq!(reg.get(maybe_int).abi_size, 8);
        assert!(reg.is_handle_type(maybe_int));
    }

    #[test]
    fn error_union_of_void_collapses_to_tag() {
        let mut reg = registry();
        let void = reg.builtin.void;
        let eu = reg.get_error_union(void);
        assert_eq!(reg.get(eu).abi_size, u64::from(ERR_TAG_BITS / 8));
        assert!(!reg.is_handle_type(eu));
        let i64_ = reg.get_int(true, 64);
        let eu_payload = reg.get_error_union(i64_);
        assert!(reg.is_handle_type(eu_payload));
        assert_eq!(reg.get(eu_payload).abi_size, 16);
    }

    #[test]
    fn struct_layout_skips_zero_bit_fields() {
        let mut reg = registry();
        let mut interner = Interner::new();
        let name = interner.intern("S");
        let a = interner.intern("a");
        let b = interner.intern("b");
        let c = interner.intern("c");
        let i32_ = reg.get_int(true, 32);
        let void = reg.builtin.void;
        let id = reg.new_struct(name, &interner);
        reg.complete_struct(
            id,
            vec![
                StructField {
                    name: a,
                    ty: i32_,
                    src_index: 0,
                    gen_index: None,
                    offset: 0,
                },
                StructField {
                    name: b,
                    ty: void,
                    src_index: 1,
                    gen_index: None,
                    offset: 0,
                },
                StructField {
                    name: c,
                    ty: i32_,
                    src_index: 2,
                    gen_index: None,
                    offset: 0,
                },
            ],
        );
        let TypeKind::Struct { fields, complete, .. } = reg.kind(id) else {
            panic!("expected struct");
        };
        assert!(*complete);
        assert_eq!(fields[0].gen_index, Some(0));
        assert_eq!(fields[1].gen_index, None);
        assert_eq!(fields[2].gen_index, Some(1));
        assert_eq!(reg.get(id).abi_size, 8);
    }

    #[test]
    fn enum_with_no_payload_collapses_to_tag() {
        let mut reg = registry();
        let mut interner = Interner::new();
        let name = interner.intern("E");
        let a = interner.intern("A");
        let b = interner.intern("B");
        let void = reg.builtin.void;
        let id = reg.new_enum(name, &interner);
        reg.complete_enum(
            id,
            vec![
                EnumField { name: a, ty: void, value: 0 },
                EnumField { name: b, ty: void, value: 1 },
            ],
        );
        assert_eq!(reg.get(id).abi_size, 1);
        let TypeKind::Enum { tag_type, .. } = reg.kind(id) else {
            panic!("expected enum");
        };
        assert_eq!(*reg.kind(*tag_type), TypeKind::Int { is_signed: false, bits: 8 });
    }

    #[test]
    fn typedecl_is_transparent() {
        let mut reg = registry();
        let mut interner = Interner::new();
        let name = interner.intern("Byte");
        let u8_ = reg.builtin.u8_;
        let alias = reg.get_typedecl(name, u8_, &interner);
        assert_eq!(reg.canonical(alias), u8_);
        assert_eq!(reg.name(alias), "Byte");
        assert_eq!(reg.get(alias).abi_size, 1);
    }
}
