//! Semantic analysis: declaration resolution and expression typing.
//!
//! The submodules add `impl Compilation` blocks:
//! - [`decl`]: two-phase top-level scanning and on-demand declaration
//!   resolution with cycle detection
//! - [`expr`]: recursive expression typing against an optional expected
//!   type, const collection, control expressions
//! - [`cast`]: the implicit-cast lattice, explicit cast operators, and
//!   peer type resolution
//! - [`intrinsic`]: the `@name(...)` compile-time builtins

pub mod cast;
pub mod decl;
pub mod expr;
pub mod intrinsic;

use strum::{Display, EnumString};

use crate::{
    ast::NodeId,
    imports::ImportId,
    intern::StringId,
    scope::{ScopeId, VarId},
    types::TypeId,
    value::{CastOp, ConstVal},
};

/// Handle into the function table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FnId(u32);

impl FnId {
    pub(crate) fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("fn table overflow"))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One function, extern or defined.
#[derive(Debug)]
pub struct FnEntry {
    pub symbol_name: String,
    pub import: ImportId,
    pub proto_node: NodeId,
    pub def_node: Option<NodeId>,
    pub body_node: Option<NodeId>,
    pub fn_type: TypeId,
    pub is_extern: bool,
    pub is_inline: bool,
    pub is_test: bool,
    pub is_cold: bool,
    pub is_naked: bool,
    pub is_export: bool,
    pub internal_linkage: bool,
    /// Scope of the body block, set when the body is analyzed.
    pub body_scope: Option<ScopeId>,
    /// Locals and parameters, in declaration order.
    pub variables: Vec<VarId>,
    /// IR function, filled in by the emitter.
    pub fn_value: Option<crate::ir::FuncRef>,
}

/// What the analyzer learned about how an expression leaves the function,
/// used by the defer unwinder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnKnowledge {
    /// Not a return path.
    #[default]
    Skip,
    /// Returns, but the error/null-ness is only known at runtime.
    Unknown,
    KnownError,
    KnownNonError,
    KnownNull,
    KnownNonNull,
    KnownUnconditional,
}

/// An implicit cast recorded on an expression; the node's effective type is
/// the target and its const value is post-cast. The pre-cast type is kept
/// for the emitter (signedness of conversions, payload layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImplicitCast {
    pub op: CastOp,
    pub from: TypeId,
    pub target: TypeId,
}

/// Decoration attached to each analyzed expression node.
#[derive(Debug, Clone)]
pub struct ExprInfo {
    pub ty: TypeId,
    pub const_val: Option<ConstVal>,
    pub cast: Option<ImplicitCast>,
    /// Set when the expression names a variable, for lvalue emission.
    pub variable: Option<VarId>,
    pub return_knowledge: ReturnKnowledge,
    /// The scope the expression was analyzed in; the emitter unwinds
    /// defers from here on returns.
    pub scope: ScopeId,
}

/// Per-declaration resolution state; `InProgress` on re-entry means the
/// declaration depends on itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveState {
    #[default]
    Unresolved,
    InProgress,
    Ok,
    Invalid,
}

/// An `error Name;` declaration. Values are allocated monotonically from 1
/// and deduplicated by name; tag 0 means "no error".
#[derive(Debug, Clone, Copy)]
pub struct ErrorValueEntry {
    pub name: StringId,
    pub value: u64,
    pub decl_node: NodeId,
}

/// The compile-time builtins, recognized by name at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Intrinsic {
    Sizeof,
    Alignof,
    MinValue,
    MaxValue,
    MemberCount,
    Typeof,
    AddWithOverflow,
    SubWithOverflow,
    MulWithOverflow,
    Memcpy,
    Memset,
    Ctz,
    Clz,
    CompileVar,
    ConstEval,
    Import,
    CImport,
    CInclude,
    CDefine,
    CUndef,
}

/// The `@compile_var` keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum CompileVar {
    IsBigEndian,
    IsRelease,
    IsTest,
    Os,
    Arch,
    Environ,
}
