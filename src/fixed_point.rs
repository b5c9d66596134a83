/*
 * Fixed-point arithmetic for MLFQS scheduling math
 *
 * The MLFQS formulas (load average, recent_cpu, priority) need fractional
 * values but the kernel has no floating-point unit usable from interrupt
 * context. We use a signed Q17.14 format instead: the integer value `x`
 * represents the real number `x / 2^14`. Multiplication and division widen
 * to 64 bits before rescaling so that intermediate products don't overflow
 * the 32-bit representation.
 */

const FRACTIONAL_BITS: u32 = 14;
const SCALE: i32 = 1 << FRACTIONAL_BITS;

/// A Q17.14 signed fixed-point number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Fixed(i32);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);

    /// Converts an integer to fixed-point representation.
    pub const fn from_int(n: i32) -> Fixed {
        Fixed(n * SCALE)
    }

    /// Truncates toward zero.
    pub const fn to_int_trunc(self) -> i32 {
        self.0 / SCALE
    }

    /// Rounds to the nearest integer, ties away from zero.
    pub const fn to_int_round(self) -> i32 {
        if self.0 >= 0 {
            (self.0 + SCALE / 2) / SCALE
        } else {
            (self.0 - SCALE / 2) / SCALE
        }
    }

    /// Raw Q17.14 representation, for callers that need to inspect bits directly.
    pub const fn raw(self) -> i32 {
        self.0
    }

    pub const fn from_raw(raw: i32) -> Fixed {
        Fixed(raw)
    }

    pub fn mul(self, other: Fixed) -> Fixed {
        let product = (self.0 as i64) * (other.0 as i64) / (SCALE as i64);
        Fixed(product as i32)
    }

    pub fn mul_int(self, n: i32) -> Fixed {
        Fixed(self.0 * n)
    }

    pub fn div(self, other: Fixed) -> Fixed {
        let quotient = (self.0 as i64) * (SCALE as i64) / (other.0 as i64);
        Fixed(quotient as i32)
    }

    pub fn div_int(self, n: i32) -> Fixed {
        Fixed(self.0 / n)
    }
}

impl core::ops::Add for Fixed {
    type Output = Fixed;
    fn add(self, rhs: Fixed) -> Fixed {
        Fixed(self.0 + rhs.0)
    }
}

impl core::ops::Sub for Fixed {
    type Output = Fixed;
    fn sub(self, rhs: Fixed) -> Fixed {
        Fixed(self.0 - rhs.0)
    }
}

impl core::ops::Neg for Fixed {
    type Output = Fixed;
    fn neg(self) -> Fixed {
        Fixed(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_roundtrip() {
        assert_eq!(Fixed::from_int(5).to_int_trunc(), 5);
        assert_eq!(Fixed::from_int(-5).to_int_trunc(), -5);
        assert_eq!(Fixed::from_int(0).to_int_trunc(), 0);
    }

    #[test]
    fn rounding_ties_away_from_zero() {
        // 1.5 in fixed point: 1 * SCALE + SCALE/2
        let one_and_half = Fixed::from_raw(SCALE + SCALE / 2);
        assert_eq!(one_and_half.to_int_round(), 2);
        let neg_one_and_half = Fixed::from_raw(-(SCALE + SCALE / 2));
        assert_eq!(neg_one_and_half.to_int_round(), -2);
    }

    #[test]
    fn add_sub() {
        let a = Fixed::from_int(3);
        let b = Fixed::from_int(2);
        assert_eq!((a + b).to_int_trunc(), 5);
        assert_eq!((a - b).to_int_trunc(), 1);
    }

    #[test]
    fn mul_div_widen_to_64_bits() {
        let big = Fixed::from_int(20000);
        let half = Fixed::from_int(1).div_int(2);
        // widened multiply must not overflow i32 in the intermediate product
        let result = big.mul(half);
        assert_eq!(result.to_int_trunc(), 10000);
    }

    #[test]
    fn div_recovers_operand() {
        let a = Fixed::from_int(10);
        let b = Fixed::from_int(4);
        let q = a.div(b);
        assert_eq!(q.to_int_round(), 3); // 2.5 rounds away from zero to 3
    }

    #[test]
    fn scale_factor_is_shift_not_xor() {
        // The source draft wrote `2 ^ 14` (bitwise xor = 12 in C), not a power
        // of two. Pin the real value to guard against ever regressing to that.
        assert_eq!(SCALE, 16384);
    }

    #[test]
    fn boundary_values_do_not_panic() {
        let max = Fixed::from_raw(i32::MAX);
        let min = Fixed::from_raw(i32::MIN);
        let _ = max.to_int_trunc();
        let _ = min.to_int_trunc();
        let _ = max.mul(Fixed::from_int(1));
    }
}
