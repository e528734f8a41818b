//! Deterministic fixed-point decimal
//!
//! Every yield, saturation and price figure that takes part in consensus is a
//! `Fixed`: a signed 128-bit integer scaled by 10^12. Independent nodes must
//! arrive at bit-identical results, so no floating point is involved anywhere.
//!
//! Rounding rules:
//! - parsing keeps the first 12 fractional digits and drops the rest
//! - `*` and `checked_div` truncate toward zero at the 12th digit
//! - `round_dp` rounds half away from zero
//! - `to_amount` truncates below one base unit

use crate::types::{Amount, COIN};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

/// Fractional digits carried by `Fixed`
pub const FIXED_DECIMALS: u32 = 12;

const SCALE: i128 = 1_000_000_000_000;

/// Raw units per base unit of an `Amount` (10^12 / 10^8)
const RAW_PER_BASE_UNIT: i128 = SCALE / COIN as i128;

/// Signed fixed-point decimal with 12 fractional digits
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fixed(i128);

impl Fixed {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(SCALE);

    /// Build from the raw scaled representation
    pub const fn from_raw(raw: i128) -> Self {
        Self(raw)
    }

    /// Raw scaled representation
    pub const fn raw(self) -> i128 {
        self.0
    }

    pub const fn from_int(n: i64) -> Self {
        Self(n as i128 * SCALE)
    }

    /// `num / den`, truncated. Zero when `den` is zero.
    pub fn from_ratio(num: i64, den: i64) -> Self {
        if den == 0 {
            return Self::ZERO;
        }
        Self(num as i128 * SCALE / den as i128)
    }

    /// Coin quantity of an amount expressed in base units
    pub fn from_amount(amount: Amount) -> Self {
        Self(amount as i128 * RAW_PER_BASE_UNIT)
    }

    /// Base units of a coin quantity, truncated and saturated to `i64`
    pub fn to_amount(self) -> Amount {
        (self.0 / RAW_PER_BASE_UNIT).clamp(i64::MIN as i128, i64::MAX as i128) as Amount
    }

    /// Whole part, truncated toward zero
    pub fn trunc_int(self) -> i64 {
        (self.0 / SCALE).clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /// Parse a plain decimal (`-12.5`, `0.0001`, `7`). Exponents are not accepted.
    pub fn parse(text: &str) -> Option<Self> {
        let s = text.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }

        let mut raw: i128 = 0;
        for b in int_part.bytes() {
            raw = raw.checked_mul(10)?.checked_add((b - b'0') as i128)?;
        }
        raw = raw.checked_mul(SCALE)?;

        let mut place = SCALE / 10;
        for b in frac_part.bytes().take(FIXED_DECIMALS as usize) {
            raw = raw.checked_add((b - b'0') as i128 * place)?;
            place /= 10;
        }

        Some(Self(if negative { -raw } else { raw }))
    }

    /// Parse and round to `places` fractional digits
    pub fn parse_dp(text: &str, places: u32) -> Option<Self> {
        Self::parse(text).map(|v| v.round_dp(places))
    }

    /// Round half away from zero to `places` fractional digits
    pub fn round_dp(self, places: u32) -> Self {
        if places >= FIXED_DECIMALS {
            return self;
        }
        let unit = 10i128.pow(FIXED_DECIMALS - places);
        let rem = self.0 % unit;
        let base = self.0 - rem;
        if rem.unsigned_abs() * 2 >= unit as u128 {
            Self(base.saturating_add(unit * self.0.signum()))
        } else {
            Self(base)
        }
    }

    /// Truncate toward zero to `places` fractional digits
    pub fn trunc_dp(self, places: u32) -> Self {
        if places >= FIXED_DECIMALS {
            return self;
        }
        let unit = 10i128.pow(FIXED_DECIMALS - places);
        Self(self.0 - self.0 % unit)
    }

    /// Truncating division; `None` on division by zero
    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        if rhs.0 == 0 {
            return None;
        }
        let quotient = match self.0.checked_mul(SCALE) {
            Some(n) => n / rhs.0,
            None => {
                let q = self.0 / rhs.0;
                let r = self.0 % rhs.0;
                q.checked_mul(SCALE)?.checked_add(r.checked_mul(SCALE)? / rhs.0)?
            }
        };
        Some(Self(quotient))
    }

    pub fn mul_int(self, n: i64) -> Self {
        Self(self.0.saturating_mul(n as i128))
    }

    pub fn div_int(self, n: i64) -> Option<Self> {
        if n == 0 {
            return None;
        }
        Some(Self(self.0 / n as i128))
    }

    pub fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Render rounded to exactly `places` fractional digits
    pub fn to_string_dp(self, places: u32) -> String {
        let places = places.min(FIXED_DECIMALS);
        let rounded = self.round_dp(places);
        let sign = if rounded.0 < 0 { "-" } else { "" };
        let abs = rounded.0.unsigned_abs();
        let int = abs / SCALE as u128;
        if places == 0 {
            return format!("{sign}{int}");
        }
        let frac = (abs % SCALE as u128) / 10u128.pow(FIXED_DECIMALS - places);
        format!("{sign}{int}.{frac:0width$}", width = places as usize)
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = self.to_string_dp(FIXED_DECIMALS);
        let trimmed = full.trim_end_matches('0').trim_end_matches('.');
        write!(f, "{}", trimmed)
    }
}

impl fmt::Debug for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fixed({})", self)
    }
}

impl FromStr for Fixed {
    type Err = crate::error::CovenantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::error::CovenantError::InvalidInput(s.to_string()))
    }
}

impl Add for Fixed {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Fixed {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Fixed {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Fixed {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Neg for Fixed {
    type Output = Self;
    fn neg(self) -> Self {
        Self(self.0.saturating_neg())
    }
}

/// Truncating multiplication. The whole and fractional parts of the left
/// operand are multiplied separately so amounts in the millions times prices
/// with 12 digits stay inside `i128`.
impl Mul for Fixed {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        let whole = self.0 / SCALE;
        let frac = self.0 % SCALE;
        Self(
            whole
                .saturating_mul(rhs.0)
                .saturating_add(frac.saturating_mul(rhs.0) / SCALE),
        )
    }
}

impl std::iter::Sum for Fixed {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, v| acc + v)
    }
}

impl Serialize for Fixed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

struct FixedVisitor;

impl<'de> Visitor<'de> for FixedVisitor {
    type Value = Fixed;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal number or decimal string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Fixed, E> {
        Fixed::parse(v).ok_or_else(|| E::custom(format!("invalid decimal: {v}")))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Fixed, E> {
        Ok(Fixed::from_int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Fixed, E> {
        i64::try_from(v)
            .map(Fixed::from_int)
            .map_err(|_| E::custom("decimal out of range"))
    }

    // Configuration files only; consensus values never pass through f64.
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Fixed, E> {
        self.visit_str(&v.to_string())
    }
}

impl<'de> Deserialize<'de> for Fixed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FixedVisitor)
    }
}
