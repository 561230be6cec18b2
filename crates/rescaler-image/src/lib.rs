use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pixel budget targeted by [`Dimensions::rescale`].
pub const AREA_LIMIT: u64 = 4_000_000;

/// Largest area two `u32` sides can span.
pub const MAX_AREA_LIMIT: u64 = u32::MAX as u64 * u32::MAX as u64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DimensionError {
    #[error("invalid dimension {input:?}: {reason}")]
    InvalidDimension { input: String, reason: &'static str },
    #[error("aspect ratio is undefined for a zero-area image")]
    DivisionUndefined,
    #[error("area limit {limit} yields a side beyond {max} pixels")]
    LimitOutOfRange { limit: u64, max: u32 },
}

/// A dimension as it arrives from a loosely typed caller (JSON, form fields, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DimensionValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl DimensionValue {
    /// Converts to whole pixels, truncating any fractional part toward zero.
    pub fn to_pixels(&self) -> Result<u32, DimensionError> {
        match self {
            Self::Integer(value) => u32::try_from(*value).map_err(|_| self.invalid("out of range")),
            Self::Float(value) => truncate_to_pixels(*value).ok_or_else(|| self.invalid("not a finite pixel count")),
            Self::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Err(self.invalid("empty"));
                }
                if let Ok(value) = trimmed.parse::<i64>() {
                    return u32::try_from(value).map_err(|_| self.invalid("out of range"));
                }
                let value = trimmed.parse::<f64>().map_err(|_| self.invalid("not numeric"))?;
                truncate_to_pixels(value).ok_or_else(|| self.invalid("not a finite pixel count"))
            }
        }
    }

    fn invalid(&self, reason: &'static str) -> DimensionError {
        DimensionError::InvalidDimension {
            input: self.to_string(),
            reason,
        }
    }
}

fn truncate_to_pixels(value: f64) -> Option<u32> {
    if !value.is_finite() {
        return None;
    }
    let truncated = value.trunc();
    if truncated < 0.0 || truncated > f64::from(u32::MAX) {
        return None;
    }
    Some(truncated as u32)
}

impl Display for DimensionValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{}", value),
            Self::Float(value) => write!(f, "{}", value),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<u32> for DimensionValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i32> for DimensionValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for DimensionValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u64> for DimensionValue {
    fn from(value: u64) -> Self {
        i64::try_from(value)
            .map(Self::Integer)
            .unwrap_or(Self::Float(value as f64))
    }
}

impl From<f32> for DimensionValue {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<f64> for DimensionValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for DimensionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for DimensionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Aspect ratio in lowest terms, plus the divider that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReducedRatio {
    pub height: u32,
    pub width: u32,
    pub divider: u32,
}

impl Display for ReducedRatio {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.height, self.width)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub height: u32,
    pub width: u32,
}

impl Dimensions {
    pub const fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    /// Builds dimensions from loosely typed values, see [`DimensionValue::to_pixels`].
    pub fn parse(height: impl Into<DimensionValue>, width: impl Into<DimensionValue>) -> Result<Self, DimensionError> {
        Ok(Self {
            height: height.into().to_pixels()?,
            width: width.into().to_pixels()?,
        })
    }

    pub fn area(&self) -> u64 {
        u64::from(self.height) * u64::from(self.width)
    }

    pub fn exceeds_limit(&self) -> bool {
        self.needs_rescale(AREA_LIMIT)
    }

    pub fn needs_rescale(&self, limit: u64) -> bool {
        self.area() > limit
    }

    pub fn ratio(&self) -> Result<ReducedRatio, DimensionError> {
        let divider = greatest_common_divisor(i64::from(self.height), i64::from(self.width));
        if divider == 0 {
            return Err(DimensionError::DivisionUndefined);
        }
        // gcd of two u32 values never exceeds u32::MAX
        let divider = divider as u32;
        let ratio = ReducedRatio {
            height: self.height / divider,
            width: self.width / divider,
            divider,
        };
        tracing::trace!(dimensions = %self, %ratio, divider, "reduced aspect ratio");
        Ok(ratio)
    }

    /// Applies `k = sqrt(AREA_LIMIT / (h' * w'))` to the reduced ratio `h':w'`
    /// and floors each side. The result is applied unconditionally, so small
    /// images grow toward the limit; flooring can land well below it, and a
    /// very lopsided ratio (`4294967295x1`) collapses the short side to 0.
    pub fn rescale(self) -> Result<Self, DimensionError> {
        self.rescale_to(AREA_LIMIT)
    }

    pub fn rescale_to(self, limit: u64) -> Result<Self, DimensionError> {
        let ratio = self.ratio()?;
        let units = u64::from(ratio.height) * u64::from(ratio.width);
        if units == 0 {
            return Err(DimensionError::DivisionUndefined);
        }
        let scale = (limit as f64 / units as f64).sqrt();
        let height = (scale * f64::from(ratio.height)).floor();
        let width = (scale * f64::from(ratio.width)).floor();
        let max = f64::from(u32::MAX);
        if height > max || width > max {
            return Err(DimensionError::LimitOutOfRange { limit, max: u32::MAX });
        }
        let rescaled = Self {
            height: height as u32,
            width: width as u32,
        };
        tracing::trace!(from = %self, to = %rescaled, limit, "rescaled dimensions");
        Ok(rescaled)
    }
}

impl Display for Dimensions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

/// Euclid's algorithm over absolute values. `gcd(0, 0)` is `0`.
pub fn greatest_common_divisor(a: i64, b: i64) -> u64 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        let remainder = a % b;
        a = b;
        b = remainder;
    }
    a
}

pub fn estimate_rgba_bytes(size: &Dimensions) -> u64 {
    size.area().saturating_mul(4)
}
