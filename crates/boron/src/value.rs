//! Compile-time values.
//!
//! Every analyzed expression may carry a [`ConstVal`]; absence means "not a
//! constant expression". The payload is a sum keyed by the expression's
//! type. Values born from `@compile_var` carry a sticky flag so downstream
//! branches know they are allowed to fold.

use crate::{analyze::FnId, bignum::BigNum, imports::ImportId, intern::StringId, types::TypeId};

/// How an expression's value is transformed when an implicit or explicit
/// cast applies. Exactly one op is chosen per cast site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    Noop,
    WidenOrShorten,
    BoolToInt,
    PtrToInt,
    IntToPtr,
    IntToFloat,
    FloatToInt,
    PointerReinterpret,
    ToUnknownSizeArray,
    MaybeWrap,
    ErrorWrap,
    PureErrorWrap,
    ErrToInt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstPayload {
    /// Zero-bit value (void, empty containers).
    Unit,
    /// The `undefined` literal, any type.
    Undef,
    Num(BigNum),
    Bool(bool),
    Type(TypeId),
    Fn(FnId),
    /// One value per source field.
    Struct(Vec<ConstVal>),
    Array(Vec<ConstVal>),
    /// Constant byte array from a string literal; shared by `StringId` so
    /// equal strings reuse one global.
    Str(StringId),
    /// Pointer at a constant: the pointed-at values and the index pointed to.
    Ptr { elems: Vec<ConstVal>, index: u64 },
    /// Slice of a constant array: `{ ptr, len }`.
    Slice { array: Box<ConstVal>, len: u64 },
    Enum {
        tag: u64,
        payload: Option<Box<ConstVal>>,
    },
    /// Error union or pure error. Tag 0 means "no error" and the payload is
    /// present; nonzero tags carry no payload.
    Err {
        tag: u64,
        payload: Option<Box<ConstVal>>,
    },
    /// Maybe: `None` is null.
    Maybe(Option<Box<ConstVal>>),
    Import(ImportId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstVal {
    pub payload: ConstPayload,
    /// Set when the value was influenced by a `@compile_var` query;
    /// propagates through arithmetic.
    pub depends_on_compile_var: bool,
}

impl ConstVal {
    pub fn new(payload: ConstPayload) -> Self {
        Self {
            payload,
            depends_on_compile_var: false,
        }
    }

    pub fn unit() -> Self {
        Self::new(ConstPayload::Unit)
    }

    pub fn undef() -> Self {
        Self::new(ConstPayload::Undef)
    }

    pub fn num(value: BigNum) -> Self {
        Self::new(ConstPayload::Num(value))
    }

    pub fn bool_(value: bool) -> Self {
        Self::new(ConstPayload::Bool(value))
    }

    pub fn type_(ty: TypeId) -> Self {
        Self::new(ConstPayload::Type(ty))
    }

    pub fn compile_var(payload: ConstPayload) -> Self {
        Self {
            payload,
            depends_on_compile_var: true,
        }
    }

    pub fn is_undef(&self) -> bool {
        matches!(self.payload, ConstPayload::Undef)
    }

    pub fn as_num(&self) -> Option<&BigNum> {
        match &self.payload {
            ConstPayload::Num(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.payload {
            ConstPayload::Bool(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<TypeId> {
        match self.payload {
            ConstPayload::Type(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn as_import(&self) -> Option<ImportId> {
        match self.payload {
            ConstPayload::Import(import) => Some(import),
            _ => None,
        }
    }

    /// Marks the result of an operation over `inputs` as compile-var
    /// dependent if any input was.
    pub fn inherit_compile_var<'a>(mut self, inputs: impl IntoIterator<Item = &'a ConstVal>) -> Self {
        if inputs.into_iter().any(|v| v.depends_on_compile_var) {
            self.depends_on_compile_var = true;
        }
        self
    }
}
