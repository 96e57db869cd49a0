//! Decimal numbers used by constant folding.
//!
//! Values are stored as `coefficient * 10^exponent` with a `BigInt`
//! coefficient, the same shape the runtime's decimal type uses. Folding only
//! ever needs exact arithmetic: any operation that cannot produce an exact
//! result within a bounded precision reports an error, and the fold that
//! requested it leaves the AST subtree unchanged for the VM to evaluate at
//! runtime. There are no rounding modes and no special values here.

use std::{
    cmp::Ordering,
    fmt,
    ops::Neg,
    str::FromStr,
};

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Pow, Signed, Zero};

/// Extra quotient digits tried before a division is declared inexact.
const DIV_SCALE: u32 = 34;

/// Largest exponent distance bridged when aligning two operands.
///
/// Beyond this the scaled coefficient would explode; the operation is
/// reported as an error instead and the fold is abandoned.
const MAX_ALIGN: i64 = 64;

/// Error from a decimal parse or an operation folding cannot do exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalError {
    message: &'static str,
}

impl DecimalError {
    const fn new(message: &'static str) -> Self {
        Self { message }
    }
}

impl fmt::Display for DecimalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)
    }
}

impl std::error::Error for DecimalError {}

/// An exact decimal number: `coefficient * 10^exponent`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Decimal {
    coefficient: BigInt,
    exponent: i32,
}

impl Decimal {
    /// Parses a decimal literal: optional sign, digits, optional fraction,
    /// optional `e`/`E` exponent.
    pub fn parse(text: &str) -> Result<Self, DecimalError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DecimalError::new("empty decimal literal"));
        }

        let (mantissa, exp10) = match text.find(['e', 'E']) {
            Some(pos) => {
                let exp: i32 = text[pos + 1..]
                    .parse()
                    .map_err(|_| DecimalError::new("malformed decimal exponent"))?;
                (&text[..pos], exp)
            }
            None => (text, 0),
        };

        let (sign, digits_part) = match mantissa.as_bytes().first() {
            Some(b'-') => (-1, &mantissa[1..]),
            Some(b'+') => (1, &mantissa[1..]),
            _ => (1, mantissa),
        };

        let (int_part, frac_part) = match digits_part.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits_part, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DecimalError::new("decimal literal has no digits"));
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DecimalError::new("invalid digit in decimal literal"));
        }

        let mut digits = String::with_capacity(int_part.len() + frac_part.len());
        digits.push_str(int_part);
        digits.push_str(frac_part);
        let mut coefficient = BigInt::from_str(&digits).map_err(|_| DecimalError::new("invalid decimal literal"))?;
        if sign < 0 {
            coefficient = -coefficient;
        }

        let frac_len = i32::try_from(frac_part.len()).map_err(|_| DecimalError::new("fraction too long"))?;
        let exponent = exp10
            .checked_sub(frac_len)
            .ok_or(DecimalError::new("decimal exponent out of range"))?;

        Ok(Self { coefficient, exponent }.normalized())
    }

    fn normalized(mut self) -> Self {
        if self.coefficient.is_zero() {
            self.exponent = 0;
            return self;
        }
        let ten = BigInt::from(10);
        while (&self.coefficient % &ten).is_zero() {
            self.coefficient /= &ten;
            self.exponent += 1;
        }
        self
    }

    /// True when the value is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.coefficient.is_zero()
    }

    /// Scales both coefficients to the smaller exponent.
    fn aligned(&self, other: &Self) -> Result<(BigInt, BigInt, i32), DecimalError> {
        let common = self.exponent.min(other.exponent);
        let self_shift = i64::from(self.exponent) - i64::from(common);
        let other_shift = i64::from(other.exponent) - i64::from(common);
        if self_shift > MAX_ALIGN || other_shift > MAX_ALIGN {
            return Err(DecimalError::new("operand exponents too far apart"));
        }
        let a = &self.coefficient * pow10(self_shift.unsigned_abs() as u32);
        let b = &other.coefficient * pow10(other_shift.unsigned_abs() as u32);
        Ok((a, b, common))
    }

    pub fn add(&self, other: &Self) -> Result<Self, DecimalError> {
        let (a, b, exponent) = self.aligned(other)?;
        Ok(Self {
            coefficient: a + b,
            exponent,
        }
        .normalized())
    }

    pub fn sub(&self, other: &Self) -> Result<Self, DecimalError> {
        let (a, b, exponent) = self.aligned(other)?;
        Ok(Self {
            coefficient: a - b,
            exponent,
        }
        .normalized())
    }

    pub fn mul(&self, other: &Self) -> Result<Self, DecimalError> {
        let exponent = self
            .exponent
            .checked_add(other.exponent)
            .ok_or(DecimalError::new("decimal exponent out of range"))?;
        Ok(Self {
            coefficient: &self.coefficient * &other.coefficient,
            exponent,
        }
        .normalized())
    }

    /// Exact division: the quotient must terminate within [`DIV_SCALE`]
    /// extra digits, otherwise the division is refused.
    pub fn div(&self, other: &Self) -> Result<Self, DecimalError> {
        if other.is_zero() {
            return Err(DecimalError::new("division by zero"));
        }
        let mut numerator = self.coefficient.clone();
        for scale in 0..=DIV_SCALE {
            let (quotient, remainder) = numerator.div_rem(&other.coefficient);
            if remainder.is_zero() {
                let exponent = i64::from(self.exponent) - i64::from(other.exponent) - i64::from(scale);
                let exponent =
                    i32::try_from(exponent).map_err(|_| DecimalError::new("decimal exponent out of range"))?;
                return Ok(Self {
                    coefficient: quotient,
                    exponent,
                }
                .normalized());
            }
            numerator *= 10;
        }
        Err(DecimalError::new("quotient does not terminate"))
    }

    /// Raises to a small non-negative integer power by repeated
    /// multiplication.
    pub fn pow(&self, exp: i64) -> Result<Self, DecimalError> {
        if !(0..=32).contains(&exp) {
            return Err(DecimalError::new("unsupported decimal exponent"));
        }
        let mut result = Self::from(1);
        for _ in 0..exp {
            result = result.mul(self)?;
        }
        Ok(result)
    }

    /// Numeric comparison independent of representation.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        let sign_cmp = sign_of(&self.coefficient).cmp(&sign_of(&other.coefficient));
        if sign_cmp != Ordering::Equal {
            return sign_cmp;
        }
        if self.coefficient.is_zero() {
            return Ordering::Equal;
        }
        // Same sign: decide by magnitude order (digit count + exponent)
        // before attempting alignment, so wildly different exponents never
        // force a huge scaled coefficient.
        let self_mag = digit_count(&self.coefficient) + i64::from(self.exponent);
        let other_mag = digit_count(&other.coefficient) + i64::from(other.exponent);
        let negative = self.coefficient.is_negative();
        if self_mag != other_mag {
            let by_mag = self_mag.cmp(&other_mag);
            return if negative { by_mag.reverse() } else { by_mag };
        }
        match self.aligned(other) {
            Ok((a, b, _)) => a.cmp(&b),
            // Equal adjusted magnitude keeps exponents close; this arm is
            // unreachable for normalized values but stays total.
            Err(_) => Ordering::Equal,
        }
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self {
            coefficient: BigInt::from(value),
            exponent: 0,
        }
        .normalized()
    }
}

impl Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal {
            coefficient: -self.coefficient,
            exponent: self.exponent,
        }
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.coefficient.is_negative() {
            f.write_str("-")?;
        }
        let digits = self.coefficient.magnitude().to_string();
        if self.exponent >= 0 {
            f.write_str(&digits)?;
            for _ in 0..self.exponent {
                f.write_str("0")?;
            }
            return Ok(());
        }
        let frac_len = self.exponent.unsigned_abs() as usize;
        if digits.len() > frac_len {
            let split = digits.len() - frac_len;
            write!(f, "{}.{}", &digits[..split], &digits[split..])
        } else {
            write!(f, "0.{}{}", "0".repeat(frac_len - digits.len()), digits)
        }
    }
}

fn pow10(exp: u32) -> BigInt {
    Pow::pow(BigInt::from(10), exp)
}

fn sign_of(value: &BigInt) -> i8 {
    if value.is_zero() {
        0
    } else if value.is_negative() {
        -1
    } else {
        1
    }
}

fn digit_count(value: &BigInt) -> i64 {
    value.magnitude().to_string().len() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(text: &str) -> Decimal {
        Decimal::parse(text).expect("literal should parse")
    }

    #[test]
    fn parses_point_and_exponent_forms() {
        assert_eq!(dec("12.5").to_string(), "12.5");
        assert_eq!(dec("1e3").to_string(), "1000");
        assert_eq!(dec("2.5e-3").to_string(), "0.0025");
        assert_eq!(dec("-0.50").to_string(), "-0.5");
        assert_eq!(dec(".5").to_string(), "0.5");
    }

    #[test]
    fn rejects_garbage() {
        assert!(Decimal::parse("").is_err());
        assert!(Decimal::parse("abc").is_err());
        assert!(Decimal::parse("1.2.3").is_err());
        assert!(Decimal::parse("1e").is_err());
    }

    #[test]
    fn arithmetic_is_exact() {
        assert_eq!(dec("0.1").add(&dec("0.2")).unwrap(), dec("0.3"));
        assert_eq!(dec("1").sub(&dec("2.5")).unwrap(), dec("-1.5"));
        assert_eq!(dec("1.5").mul(&dec("4")).unwrap(), dec("6"));
        assert_eq!(dec("1").div(&dec("8")).unwrap(), dec("0.125"));
    }

    #[test]
    fn inexact_division_is_refused() {
        assert!(dec("1").div(&dec("3")).is_err());
        assert!(dec("1").div(&dec("0")).is_err());
    }

    #[test]
    fn comparison_ignores_representation() {
        assert_eq!(dec("1.50"), dec("1.5"));
        assert!(dec("2.5") > dec("2.4999"));
        assert!(dec("-3") < dec("0.1"));
        assert!(dec("1e30") > dec("999999"));
        assert!(dec("-1e30") < dec("-999999"));
    }

    #[test]
    fn pow_small_integers() {
        assert_eq!(dec("1.1").pow(2).unwrap(), dec("1.21"));
        assert_eq!(dec("2").pow(0).unwrap(), dec("1"));
        assert!(dec("2").pow(-1).is_err());
    }
}
