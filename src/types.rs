//! Core data types shared by processors, boxes and stores

use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer triple in XYZ order
pub type Xyz = [i64; 3];

/// Element types a volume may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DataType {
    /// Unsigned 8-bit integer (raw intensities, masks)
    U8 = 0,
    /// Unsigned 64-bit integer (segmentation labels)
    U64 = 1,
    /// 32-bit floating point (probabilities, filtered data)
    F32 = 2,
}

impl DataType {
    /// Size in bytes of this data type
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::U8 => 1,
            DataType::U64 => 8,
            DataType::F32 => 4,
        }
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::F32)
    }

    /// Check if this is an integer type
    pub fn is_integer(&self) -> bool {
        !self.is_float()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::U8 => "uint8",
            DataType::U64 => "uint64",
            DataType::F32 => "float32",
        };
        f.write_str(name)
    }
}

/// A per-axis requirement that is either binding or merely a preference.
///
/// Processors use this for their tile size and context. A `Fixed` tile size
/// must be honoured exactly by the caller; a `Suggested` one lets the caller
/// pick any compatible size. "No preference" is expressed as `Option::None`
/// at the use site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XyzHint {
    Fixed(Xyz),
    Suggested(Xyz),
}

impl XyzHint {
    /// Zero on every axis, as a suggestion
    pub const ZERO: XyzHint = XyzHint::Suggested([0, 0, 0]);

    /// The XYZ values regardless of tagging
    pub fn values(&self) -> Xyz {
        match self {
            XyzHint::Fixed(v) | XyzHint::Suggested(v) => *v,
        }
    }

    pub fn is_suggested(&self) -> bool {
        matches!(self, XyzHint::Suggested(_))
    }

    /// Elementwise sum; stays a suggestion only if both sides are.
    pub fn sum(&self, other: &XyzHint) -> XyzHint {
        let a = self.values();
        let b = other.values();
        let total = [a[0] + b[0], a[1] + b[1], a[2] + b[2]];
        match (self, other) {
            (XyzHint::Suggested(_), XyzHint::Suggested(_)) => XyzHint::Suggested(total),
            _ => XyzHint::Fixed(total),
        }
    }
}

/// Whether a processor emits one or many subvolumes per input tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputNum {
    Single,
    Multi,
}

/// Physical voxel size, XYZ order (nanometres by convention)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelSize(pub [f64; 3]);

impl PixelSize {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self([x, y, z])
    }

    pub fn x(&self) -> f64 {
        self.0[0]
    }

    pub fn y(&self) -> f64 {
        self.0[1]
    }

    pub fn z(&self) -> f64 {
        self.0[2]
    }

    /// Multiply each axis by the given factor
    pub fn scaled(&self, factors: [f64; 3]) -> Self {
        Self([
            self.0[0] * factors[0],
            self.0[1] * factors[1],
            self.0[2] * factors[2],
        ])
    }

    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|v| v.is_finite() && *v > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_sizes() {
        assert_eq!(DataType::U8.size_in_bytes(), 1);
        assert_eq!(DataType::U64.size_in_bytes(), 8);
        assert_eq!(DataType::F32.size_in_bytes(), 4);
        assert!(DataType::F32.is_float());
        assert!(DataType::U64.is_integer());
    }

    #[test]
    fn test_data_type_serde_names() {
        let json = serde_json::to_string(&DataType::U64).unwrap();
        assert_eq!(json, "\"u64\"");
        assert_eq!(DataType::F32.to_string(), "float32");
    }

    #[test]
    fn test_hint_sum_keeps_suggestion_only_when_both_suggested() {
        let a = XyzHint::Suggested([1, 2, 3]);
        let b = XyzHint::Suggested([1, 0, 0]);
        assert_eq!(a.sum(&b), XyzHint::Suggested([2, 2, 3]));

        let c = XyzHint::Fixed([1, 1, 1]);
        assert_eq!(a.sum(&c), XyzHint::Fixed([2, 3, 4]));
        assert_eq!(c.sum(&a), XyzHint::Fixed([2, 3, 4]));
    }

    #[test]
    fn test_pixel_size_scaling() {
        let p = PixelSize::new(8.0, 8.0, 33.0);
        assert_eq!(p.scaled([2.0, 2.0, 1.0]), PixelSize::new(16.0, 16.0, 33.0));
        assert!(p.is_valid());
        assert!(!PixelSize::new(0.0, 1.0, 1.0).is_valid());
    }
}
