//! Arbitrary-precision numbers for compile-time arithmetic.
//!
//! Number literals are unsized until unified with a context type, so the
//! evaluator computes with [`BigInt`] (and `f64` for float-kind values) and
//! only checks bit-width fit when a concrete integer type is chosen.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

/// Errors surfaced to the analyzer as diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BigNumError {
    DivByZero,
    /// Shift amounts and similar operands must fit in a machine word.
    ShiftTooLarge,
}

/// A compile-time numeric value: integer or float kind.
#[derive(Debug, Clone, PartialEq)]
pub enum BigNum {
    Int(BigInt),
    Float(f64),
}

impl BigNum {
    pub fn zero_int() -> Self {
        BigNum::Int(BigInt::ZERO)
    }

    pub fn from_u64(value: u64) -> Self {
        BigNum::Int(BigInt::from(value))
    }

    pub fn from_i64(value: i64) -> Self {
        BigNum::Int(BigInt::from(value))
    }

    pub fn is_int(&self) -> bool {
        matches!(self, BigNum::Int(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, BigNum::Float(_))
    }

    pub fn is_zero(&self) -> bool {
        match self {
            BigNum::Int(value) => value.is_zero(),
            BigNum::Float(value) => *value == 0.0,
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            BigNum::Int(value) => value.is_negative(),
            BigNum::Float(value) => *value < 0.0,
        }
    }

    /// Integer payload; the analyzer only calls this after checking the kind.
    pub fn as_int(&self) -> Option<&BigInt> {
        match self {
            BigNum::Int(value) => Some(value),
            BigNum::Float(_) => None,
        }
    }

    pub fn to_u64(&self) -> Option<u64> {
        self.as_int().and_then(ToPrimitive::to_u64)
    }

    pub fn to_i64(&self) -> Option<i64> {
        self.as_int().and_then(ToPrimitive::to_i64)
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            BigNum::Int(value) => value.to_f64().unwrap_or(f64::INFINITY),
            BigNum::Float(value) => *value,
        }
    }

    /// Converts to float kind, used by int→float casts.
    pub fn as_float_kind(&self) -> BigNum {
        BigNum::Float(self.to_f64())
    }

    /// Converts to int kind, truncating toward zero, used by float→int casts.
    pub fn as_int_kind(&self) -> BigNum {
        match self {
            BigNum::Int(value) => BigNum::Int(value.clone()),
            BigNum::Float(value) => BigNum::Int(BigInt::from(value.trunc() as i128)),
        }
    }

    /// Whether this value is representable in a `bits`-wide integer of the
    /// given signedness. Float-kind values fit only if they are whole.
    pub fn fits_in_bits(&self, bits: u32, is_signed: bool) -> bool {
        let int_value;
        let value = match self {
            BigNum::Int(value) => value,
            BigNum::Float(value) => {
                if value.fract() != 0.0 {
                    return false;
                }
                int_value = BigInt::from(value.trunc() as i128);
                &int_value
            }
        };
        if is_signed {
            let min = -(BigInt::from(1) << (bits - 1));
            let max = (BigInt::from(1) << (bits - 1)) - 1;
            *value >= min && *value <= max
        } else {
            if value.is_negative() {
                return false;
            }
            let max = (BigInt::from(1) << bits) - 1;
            *value <= max
        }
    }

    pub fn negate(&self) -> BigNum {
        match self {
            BigNum::Int(value) => BigNum::Int(-value),
            BigNum::Float(value) => BigNum::Float(-value),
        }
    }

    /// `~x` needs the concrete width and signedness of the operand type.
    pub fn bit_not(&self, bits: u32, is_signed: bool) -> Option<BigNum> {
        let value = self.as_int()?;
        if is_signed {
            Some(BigNum::Int(-(value.clone() + 1u32)))
        } else {
            let mask = (BigInt::from(1) << bits) - 1;
            Some(BigNum::Int(mask - value))
        }
    }

    pub fn add(&self, other: &BigNum) -> BigNum {
        self.arith(other, |a, b| a + b, |a, b| a + b)
    }

    pub fn sub(&self, other: &BigNum) -> BigNum {
        self.arith(other, |a, b| a - b, |a, b| a - b)
    }

    pub fn mul(&self, other: &BigNum) -> BigNum {
        self.arith(other, |a, b| a * b, |a, b| a * b)
    }

    pub fn div(&self, other: &BigNum) -> Result<BigNum, BigNumError> {
        if other.is_zero() {
            return Err(BigNumError::DivByZero);
        }
        Ok(self.arith(other, |a, b| a / b, |a, b| a / b))
    }

    /// `%` uses remainder semantics for both kinds.
    pub fn rem(&self, other: &BigNum) -> Result<BigNum, BigNumError> {
        if other.is_zero() {
            return Err(BigNumError::DivByZero);
        }
        Ok(self.arith(other, |a, b| a % b, |a, b| a % b))
    }

    fn arith(
        &self,
        other: &BigNum,
        int_op: fn(&BigInt, &BigInt) -> BigInt,
        float_op: fn(f64, f64) -> f64,
    ) -> BigNum {
        match (self, other) {
            (BigNum::Int(a), BigNum::Int(b)) => BigNum::Int(int_op(a, b)),
            _ => BigNum::Float(float_op(self.to_f64(), other.to_f64())),
        }
    }

    fn bit_op(
        &self,
        other: &BigNum,
        op: fn(&BigInt, &BigInt) -> BigInt,
    ) -> Option<BigNum> {
        Some(BigNum::Int(op(self.as_int()?, other.as_int()?)))
    }

    pub fn bit_and(&self, other: &BigNum) -> Option<BigNum> {
        self.bit_op(other, |a, b| a & b)
    }

    pub fn bit_or(&self, other: &BigNum) -> Option<BigNum> {
        self.bit_op(other, |a, b| a | b)
    }

    pub fn bit_xor(&self, other: &BigNum) -> Option<BigNum> {
        self.bit_op(other, |a, b| a ^ b)
    }

    pub fn shl(&self, other: &BigNum) -> Result<BigNum, BigNumError> {
        let amount = other.to_u64().ok_or(BigNumError::ShiftTooLarge)?;
        let amount = usize::try_from(amount).map_err(|_| BigNumError::ShiftTooLarge)?;
        match self {
            BigNum::Int(value) => Ok(BigNum::Int(value << amount)),
            BigNum::Float(_) => Err(BigNumError::ShiftTooLarge),
        }
    }

    pub fn shr(&self, other: &BigNum) -> Result<BigNum, BigNumError> {
        let amount = other.to_u64().ok_or(BigNumError::ShiftTooLarge)?;
        let amount = usize::try_from(amount).map_err(|_| BigNumError::ShiftTooLarge)?;
        match self {
            BigNum::Int(value) => Ok(BigNum::Int(value >> amount)),
            BigNum::Float(_) => Err(BigNumError::ShiftTooLarge),
        }
    }

    pub fn compare(&self, other: &BigNum) -> Ordering {
        match (self, other) {
            (BigNum::Int(a), BigNum::Int(b)) => a.cmp(b),
            _ => self
                .to_f64()
                .partial_cmp(&other.to_f64())
                .unwrap_or(Ordering::Equal),
        }
    }

    /// Truncates to the given integer width, reinterpreting the bit
    /// pattern under the target signedness (explicit shortening casts).
    pub fn wrap_to(&self, bits: u32, is_signed: bool) -> BigNum {
        if self.fits_in_bits(bits, is_signed) {
            return self.as_int_kind();
        }
        let pattern = self.to_twos_complement(bits);
        if is_signed {
            if bits >= 64 {
                BigNum::from_i64(pattern as i64)
            } else if (pattern >> (bits - 1)) & 1 == 1 {
                BigNum::from_i64((pattern as i64) - (1i64 << bits))
            } else {
                BigNum::from_u64(pattern)
            }
        } else {
            BigNum::from_u64(pattern)
        }
    }

    /// Wraps to the two's complement bit pattern of the given width, used
    /// when emitting an IR constant for a sized integer.
    pub fn to_twos_complement(&self, bits: u32) -> u64 {
        let value = match self {
            BigNum::Int(value) => value.clone(),
            BigNum::Float(value) => BigInt::from(value.trunc() as i128),
        };
        let modulus = BigInt::from(1) << bits.min(64);
        let wrapped = ((value % &modulus) + &modulus) % &modulus;
        wrapped.to_u64().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_arith() {
        let a = BigNum::from_i64(10);
        let b = BigNum::from_i64(3);
        assert_eq!(a.add(&b), BigNum::from_i64(13));
        assert_eq!(a.sub(&b), BigNum::from_i64(7));
        assert_eq!(a.mul(&b), BigNum::from_i64(30));
        assert_eq!(a.div(&b).unwrap(), BigNum::from_i64(3));
        assert_eq!(a.rem(&b).unwrap(), BigNum::from_i64(1));
    }

    #[test]
    fn div_by_zero() {
        let a = BigNum::from_i64(1);
        assert_eq!(a.div(&BigNum::zero_int()), Err(BigNumError::DivByZero));
        assert_eq!(a.rem(&BigNum::zero_int()), Err(BigNumError::DivByZero));
    }

    #[test]
    fn mixed_kind_promotes_to_float() {
        let a = BigNum::from_i64(1);
        let b = BigNum::Float(0.5);
        assert_eq!(a.add(&b), BigNum::Float(1.5));
    }

    #[test]
    fn fits_in_bits_boundaries() {
        assert!(BigNum::from_i64(127).fits_in_bits(8, true));
        assert!(!BigNum::from_i64(128).fits_in_bits(8, true));
        assert!(BigNum::from_i64(-128).fits_in_bits(8, true));
        assert!(!BigNum::from_i64(-129).fits_in_bits(8, true));
        assert!(BigNum::from_i64(255).fits_in_bits(8, false));
        assert!(!BigNum::from_i64(256).fits_in_bits(8, false));
        assert!(!BigNum::from_i64(-1).fits_in_bits(8, false));
        assert!(BigNum::Float(3.0).fits_in_bits(8, false));
        assert!(!BigNum::Float(3.5).fits_in_bits(8, false));
    }

    #[test]
    fn twos_complement_wrapping() {
        assert_eq!(BigNum::from_i64(-1).to_twos_complement(8), 0xff);
        assert_eq!(BigNum::from_i64(-128).to_twos_complement(8), 0x80);
        assert_eq!(BigNum::from_i64(5).to_twos_complement(32), 5);
    }

    #[test]
    fn bit_not_widths() {
        assert_eq!(
            BigNum::from_i64(0).bit_not(8, false).unwrap(),
            BigNum::from_i64(255)
        );
        assert_eq!(
            BigNum::from_i64(0).bit_not(8, true).unwrap(),
            BigNum::from_i64(-1)
        );
    }

    #[test]
    fn float_rem_is_remainder() {
        let a = BigNum::Float(5.5);
        let b = BigNum::Float(2.0);
        assert_eq!(a.rem(&b).unwrap(), BigNum::Float(1.5));
    }
}
