use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use std::fmt;

/// Fractional digits shown for numbers whose decimal expansion does not terminate.
const MAX_FRACTION_DIGITS: usize = 20;

/// Exact decimal number. Literals like `0.5` are stored as the rational
/// `1/2`, so arithmetic never rounds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Number(BigRational);

impl Number {
    /// Parses a literal of the form `digits` or `digits.digits`.
    pub fn parse(text: &str) -> Option<Number> {
        let (int_part, frac_part) = match text.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (text, ""),
        };
        let digits = format!("{}{}", int_part, frac_part);
        let numer = BigInt::parse_bytes(digits.as_bytes(), 10)?;
        let denom = num_traits::pow(BigInt::from(10), frac_part.len());
        Some(Number(BigRational::new(numer, denom)))
    }

    pub fn zero() -> Number {
        Number(BigRational::zero())
    }

    pub fn is_integer(&self) -> bool {
        self.0.is_integer()
    }

    pub fn to_i64(&self) -> Option<i64> {
        if self.0.is_integer() {
            self.0.to_integer().to_i64()
        } else {
            None
        }
    }

    pub fn negate(&self) -> Number {
        Number(-self.0.clone())
    }

    pub fn add(&self, other: &Number) -> Number {
        Number(&self.0 + &other.0)
    }

    pub fn sub(&self, other: &Number) -> Number {
        Number(&self.0 - &other.0)
    }

    pub fn mul(&self, other: &Number) -> Number {
        Number(&self.0 * &other.0)
    }

    /// `None` when dividing by zero.
    pub fn checked_div(&self, other: &Number) -> Option<Number> {
        if other.0.is_zero() {
            None
        } else {
            Some(Number(&self.0 / &other.0))
        }
    }

    /// Integer powers only; a fractional result of a fractional exponent
    /// could not be represented exactly.
    pub fn pow(&self, exponent: &Number) -> Result<Number, String> {
        if !exponent.is_integer() {
            return Err(format!("Exponent must be an integer, got {}", exponent));
        }
        let magnitude = exponent
            .0
            .to_integer()
            .abs()
            .to_u32()
            .ok_or_else(|| format!("Exponent {} is too large", exponent))?;

        let mut result = BigRational::one();
        let mut base = self.0.clone();
        let mut remaining = magnitude;
        while remaining > 0 {
            if remaining & 1 == 1 {
                result = &result * &base;
            }
            base = &base * &base;
            remaining >>= 1;
        }

        if exponent.0.is_negative() {
            if result.is_zero() {
                return Err("Division by zero in negative power".to_string());
            }
            result = result.recip();
        }
        Ok(Number(result))
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number(BigRational::from_integer(BigInt::from(value)))
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0.is_integer() {
            return write!(f, "{}", self.0.to_integer());
        }

        let sign = if self.0.is_negative() { "-" } else { "" };
        let magnitude = self.0.abs();
        let denom = magnitude.denom();
        let ten = BigInt::from(10);

        let mut remainder = magnitude.numer() % denom;
        let mut digits = String::new();
        while !remainder.is_zero() && digits.len() < MAX_FRACTION_DIGITS {
            remainder *= &ten;
            digits.push_str(&(&remainder / denom).to_string());
            remainder = &remainder % denom;
        }

        write!(f, "{}{}.{}", sign, magnitude.to_integer(), digits)
    }
}
