//! # Currency
//!
//! Fixed-point monetary amounts with saturating arithmetic.
//!
//! The representable range is `[-32768.99, 32767.99]` with a precision of
//! one hundredth of the base unit. The sign applies to the whole amount
//! (sign-magnitude): `-10.99` is ten units and ninety-nine hundredths below
//! zero, so `-10.99 + 1.20 = -9.79`.
//!
//! Arithmetic never wraps. Results beyond either end of the range clamp to
//! [`Currency::MAX`] or [`Currency::MIN`], which makes `+` and `-` total
//! functions that interrupt-context callers can use without an error path.

use core::fmt;
use core::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use core::str::FromStr;

/// Largest amount in hundredths (`32767.99`).
const MAX_CENTS: i32 = 32_767 * 100 + 99;
/// Smallest amount in hundredths (`-32768.99`).
const MIN_CENTS: i32 = -(32_768 * 100 + 99);

/// A monetary amount: signed major units plus 0–99 minor units.
///
/// Stored as signed total hundredths, which keeps sub-unit negative amounts
/// such as `-0.50` representable. [`major`](Self::major) and
/// [`minor`](Self::minor) give the fixed-point view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Currency {
    cents: i32,
}

impl Currency {
    /// Zero balance.
    pub const ZERO: Self = Self { cents: 0 };
    /// `32767.99`, the saturation ceiling.
    pub const MAX: Self = Self { cents: MAX_CENTS };
    /// `-32768.99`, the saturation floor.
    pub const MIN: Self = Self { cents: MIN_CENTS };

    /// Build an amount from major and minor units.
    ///
    /// A negative `major` makes the whole amount negative. Minor units
    /// above 99 carry into the major units; the result saturates.
    pub const fn new(major: i16, minor: u8) -> Self {
        let magnitude = (major as i32).abs() * 100 + minor as i32;
        if major < 0 {
            Self::from_cents(-magnitude)
        } else {
            Self::from_cents(magnitude)
        }
    }

    /// Build an amount from total hundredths, saturating at the range ends.
    pub const fn from_cents(cents: i32) -> Self {
        let cents = if cents > MAX_CENTS {
            MAX_CENTS
        } else if cents < MIN_CENTS {
            MIN_CENTS
        } else {
            cents
        };
        Self { cents }
    }

    /// Total amount in hundredths.
    #[inline]
    pub const fn cents(self) -> i32 {
        self.cents
    }

    /// Whole base units, carrying the sign of the amount.
    #[inline]
    pub const fn major(self) -> i16 {
        (self.cents / 100) as i16
    }

    /// Unsigned hundredths, always in `[0, 99]`.
    #[inline]
    pub const fn minor(self) -> u8 {
        (self.cents % 100).unsigned_abs() as u8
    }

    #[inline]
    pub const fn is_negative(self) -> bool {
        self.cents < 0
    }

    /// `self + rhs`, clamped to `[MIN, MAX]`.
    ///
    /// Both operands are widened before adding, so the minor-unit carry and
    /// a major-unit overflow of the same sign are caught in one comparison,
    /// including the case where the majors sum to exactly `32767` and the
    /// carry pushes the total over.
    #[inline]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self::from_cents(self.cents + rhs.cents)
    }

    /// `self - rhs`, clamped to `[MIN, MAX]`.
    #[inline]
    pub const fn saturating_sub(self, rhs: Self) -> Self {
        Self::from_cents(self.cents - rhs.cents)
    }
}

impl Add for Currency {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Currency {
    fn add_assign(&mut self, rhs: Self) {
        *self = self.saturating_add(rhs);
    }
}

impl Sub for Currency {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.saturating_sub(rhs)
    }
}

impl SubAssign for Currency {
    fn sub_assign(&mut self, rhs: Self) {
        *self = self.saturating_sub(rhs);
    }
}

impl Neg for Currency {
    type Output = Self;

    /// Negating `MIN` saturates to `MAX`.
    fn neg(self) -> Self {
        Self::from_cents(-self.cents)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negative() {
            f.write_str("-")?;
        }
        let magnitude = self.cents.unsigned_abs();
        write!(f, "{}.{:02}", magnitude / 100, magnitude % 100)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Currency {
    fn format(&self, f: defmt::Formatter) {
        let magnitude = self.cents.unsigned_abs();
        let minor = magnitude % 100;
        defmt::write!(
            f,
            "{}{}.{}{}",
            if self.is_negative() { "-" } else { "" },
            magnitude / 100,
            minor / 10,
            minor % 10
        );
    }
}

/// Failure to read an amount from console text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseCurrencyError {
    /// Nothing but whitespace or a sign.
    Empty,
    /// Not of the form `[-]digits[.d[d]]`.
    Invalid,
    /// Outside `[-32768.99, 32767.99]`.
    OutOfRange,
}

impl fmt::Display for ParseCurrencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Empty => "empty amount",
            Self::Invalid => "malformed amount",
            Self::OutOfRange => "amount out of range",
        })
    }
}

impl FromStr for Currency {
    type Err = ParseCurrencyError;

    /// Parse `[-|+]digits[.d[d]]`, e.g. `12`, `-3.5`, `0.05`, `.20`.
    ///
    /// Unlike arithmetic, parsing does not saturate: an out-of-range amount
    /// is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        if digits.is_empty() {
            return Err(ParseCurrencyError::Empty);
        }

        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if (whole.is_empty() && fraction.is_empty()) || fraction.len() > 2 {
            return Err(ParseCurrencyError::Invalid);
        }
        if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(ParseCurrencyError::Invalid);
        }

        let mut major: i32 = 0;
        for digit in whole.bytes() {
            major = major * 10 + i32::from(digit - b'0');
            if major > 32_768 {
                return Err(ParseCurrencyError::OutOfRange);
            }
        }

        let minor = fraction
            .bytes()
            .chain(core::iter::repeat(b'0'))
            .take(2)
            .fold(0, |acc, digit| acc * 10 + i32::from(digit - b'0'));

        let magnitude = major * 100 + minor;
        let cents = if negative { -magnitude } else { magnitude };
        if !(MIN_CENTS..=MAX_CENTS).contains(&cents) {
            return Err(ParseCurrencyError::OutOfRange);
        }
        Ok(Self { cents })
    }
}
