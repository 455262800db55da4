//! Constant-value transforms for cast operators.
//!
//! Arithmetic and comparison folding live next to the expression analyzer;
//! this module holds the `CastOp`-keyed payload transforms shared by
//! implicit and explicit casts. Re-evaluating a cast of the same constant
//! yields an equal value, which the emitter relies on when it materializes
//! module-level constants.

use crate::{
    bignum::BigNum,
    run::Compilation,
    types::{TypeId, TypeKind},
    value::{CastOp, ConstPayload, ConstVal},
};

impl Compilation {
    /// Applies a cast operator to a constant value; `None` means the result
    /// is not compile-time computable (pointer reinterpretation and
    /// friends).
    pub fn eval_const_cast(
        &mut self,
        value: &ConstVal,
        op: CastOp,
        target: TypeId,
    ) -> Option<ConstVal> {
        if value.is_undef() {
            // undefined survives any cast as undefined
            return Some(value.clone());
        }
        let dep = value.depends_on_compile_var;
        let mut out = match op {
            CastOp::Noop => value.clone(),
            CastOp::WidenOrShorten => {
                let num = value.as_num()?;
                let canonical = self.types.canonical(target);
                match *self.types.kind(canonical) {
                    TypeKind::Int { is_signed, bits } => {
                        ConstVal::num(num.wrap_to(bits, is_signed))
                    }
                    TypeKind::Float { .. } => ConstVal::num(num.clone()),
                    _ => return None,
                }
            }
            CastOp::BoolToInt => ConstVal::num(BigNum::from_u64(u64::from(value.as_bool()?))),
            CastOp::IntToFloat => ConstVal::num(value.as_num()?.as_float_kind()),
            CastOp::FloatToInt => ConstVal::num(value.as_num()?.as_int_kind()),
            CastOp::PtrToInt | CastOp::IntToPtr | CastOp::PointerReinterpret => return None,
            CastOp::ToUnknownSizeArray => {
                let len = match &value.payload {
                    ConstPayload::Array(elems) => elems.len() as u64,
                    ConstPayload::Str(id) => self.interner.get(*id).len() as u64,
                    _ => return None,
                };
                ConstVal::new(ConstPayload::Slice {
                    array: Box::new(value.clone()),
                    len,
                })
            }
            CastOp::MaybeWrap => {
                let inner = self.coerce_payload_to_child(value, target)?;
                ConstVal::new(ConstPayload::Maybe(Some(Box::new(inner))))
            }
            CastOp::ErrorWrap => {
                let inner = self.coerce_payload_to_child(value, target)?;
                ConstVal::new(ConstPayload::Err {
                    tag: 0,
                    payload: Some(Box::new(inner)),
                })
            }
            CastOp::PureErrorWrap => match &value.payload {
                ConstPayload::Err { tag, .. } => ConstVal::new(ConstPayload::Err {
                    tag: *tag,
                    payload: None,
                }),
                _ => return None,
            },
            CastOp::ErrToInt => match &value.payload {
                ConstPayload::Err { tag, .. } => ConstVal::num(BigNum::from_u64(*tag)),
                _ => return None,
            },
        };
        out.depends_on_compile_var |= dep;
        Some(out)
    }

    /// Number literals wrapped into `?T` / `%T` first coerce to the child
    /// type; everything else wraps unchanged.
    fn coerce_payload_to_child(&mut self, value: &ConstVal, wrapper: TypeId) -> Option<ConstVal> {
        let canonical = self.types.canonical(wrapper);
        let child = match self.types.kind(canonical) {
            TypeKind::Maybe { child } | TypeKind::ErrorUnion { child } => *child,
            _ => return Some(value.clone()),
        };
        match (&value.payload, self.types.kind(self.types.canonical(child))) {
            (ConstPayload::Num(num), TypeKind::Float { .. }) => {
                Some(ConstVal::num(num.as_float_kind()))
            }
            _ => Some(value.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;

    fn comp() -> Compilation {
        Compilation::new(BuildConfig::default())
    }

    #[test]
    fn bool_to_int() {
        let mut c = comp();
        let i32_ = c.types.get_int(true, 32);
        let value = ConstVal::bool_(true);
        let out = c.eval_const_cast(&value, CastOp::BoolToInt, i32_).unwrap();
        assert_eq!(out.as_num().unwrap().to_u64(), Some(1));
    }

    #[test]
    fn maybe_wrap_preserves_compile_var_flag() {
        let mut c = comp();
        let i32_ = c.types.get_int(true, 32);
        let maybe = c.types.get_maybe(i32_);
        let mut value = ConstVal::num(BigNum::from_u64(7));
        value.depends_on_compile_var = true;
        let out = c.eval_const_cast(&value, CastOp::MaybeWrap, maybe).unwrap();
        assert!(out.depends_on_compile_var);
        assert!(matches!(out.payload, ConstPayload::Maybe(Some(_))));
    }

    #[test]
    fn shorten_wraps_to_width() {
        let mut c = comp();
        let i8_ = c.types.get_int(true, 8);
        let value = ConstVal::num(BigNum::from_i64(255));
        let out = c
            .eval_const_cast(&value, CastOp::WidenOrShorten, i8_)
            .unwrap();
        assert_eq!(out.as_num().unwrap().to_i64(), Some(-1));
    }

    #[test]
    fn err_to_int_reads_the_tag() {
        let mut c = comp();
        let u16_ = c.types.get_int(false, 16);
        let value = ConstVal::new(ConstPayload::Err { tag: 3, payload: None });
        let out = c.eval_const_cast(&value, CastOp::ErrToInt, u16_).unwrap();
        assert_eq!(out.as_num().unwrap().to_u64(), Some(3));
    }

    #[test]
    fn array_to_slice_builds_ptr_len_pair() {
        let mut c = comp();
        let u8_ = c.types.builtin.u8_;
        let slice = c.types.get_slice(u8_, true);
        let id = c.interner.intern("abc");
        let value = ConstVal::new(ConstPayload::Str(id));
        let out = c
            .eval_const_cast(&value, CastOp::ToUnknownSizeArray, slice)
            .unwrap();
        let ConstPayload::Slice { len, .. } = out.payload else {
            panic!("expected slice payload");
        };
        assert_eq!(len, 3);
    }
}
