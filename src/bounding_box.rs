//! Axis-aligned integer boxes in volume coordinates

use crate::error::{ProcessingError, Result};
use crate::types::Xyz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Axis-aligned 3D box, XYZ order, half-open `[start, start + size)`.
///
/// Besides its geometry a box remembers on which sides it touches the outer
/// bounds of the volume it was cut from. Equality and hashing only consider
/// geometry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    start: Xyz,
    size: Xyz,
    #[serde(default)]
    is_border_start: [bool; 3],
    #[serde(default)]
    is_border_end: [bool; 3],
}

impl BoundingBox {
    /// Create a box from start and size
    pub fn new(start: Xyz, size: Xyz) -> Result<Self> {
        if let Some(axis) = size.iter().position(|&s| s < 0) {
            return Err(ProcessingError::InvalidBox(format!(
                "size[{}] must be >= 0, not {}",
                axis, size[axis]
            )));
        }
        for axis in 0..3 {
            start[axis].checked_add(size[axis]).ok_or_else(|| {
                ProcessingError::InvalidBox(format!("start[{axis}] too large for size"))
            })?;
        }

        Ok(Self {
            start,
            size,
            is_border_start: [false; 3],
            is_border_end: [false; 3],
        })
    }

    /// Create a box from inclusive start and exclusive end
    pub fn from_start_end(start: Xyz, end: Xyz) -> Result<Self> {
        Self::new(
            start,
            [end[0] - start[0], end[1] - start[1], end[2] - start[2]],
        )
    }

    pub fn start(&self) -> Xyz {
        self.start
    }

    pub fn size(&self) -> Xyz {
        self.size
    }

    pub fn end(&self) -> Xyz {
        [
            self.start[0] + self.size[0],
            self.start[1] + self.size[1],
            self.start[2] + self.size[2],
        ]
    }

    /// Number of voxels covered
    pub fn volume(&self) -> u64 {
        self.size.iter().map(|&s| s as u64).product()
    }

    pub fn is_empty(&self) -> bool {
        self.size.iter().any(|&s| s == 0)
    }

    /// Spatial extent as an array shape, ZYX order
    pub fn zyx_shape(&self) -> [usize; 3] {
        [
            self.size[2] as usize,
            self.size[1] as usize,
            self.size[0] as usize,
        ]
    }

    /// Per-axis flags: start coincides with the outer volume's start
    pub fn is_border_start(&self) -> [bool; 3] {
        self.is_border_start
    }

    /// Per-axis flags: end coincides with the outer volume's end
    pub fn is_border_end(&self) -> [bool; 3] {
        self.is_border_end
    }

    /// Set the border flags explicitly
    pub fn with_border_flags(mut self, start: [bool; 3], end: [bool; 3]) -> Self {
        self.is_border_start = start;
        self.is_border_end = end;
        self
    }

    /// Derive the border flags from the outer volume this box was cut from
    pub fn with_borders_of(self, outer: &BoundingBox) -> Self {
        let end = self.end();
        let outer_end = outer.end();
        let start_flags = [
            self.start[0] == outer.start[0],
            self.start[1] == outer.start[1],
            self.start[2] == outer.start[2],
        ];
        let end_flags = [
            end[0] == outer_end[0],
            end[1] == outer_end[1],
            end[2] == outer_end[2],
        ];
        self.with_border_flags(start_flags, end_flags)
    }

    /// New box with `start_delta` added to the start and `end_delta` to the
    /// end. Positive start deltas and negative end deltas shrink the box.
    /// Border flags are carried over.
    pub fn adjusted_by(&self, start_delta: Xyz, end_delta: Xyz) -> Result<Self> {
        let end = self.end();
        let new_start = [
            self.start[0] + start_delta[0],
            self.start[1] + start_delta[1],
            self.start[2] + start_delta[2],
        ];
        let new_end = [
            end[0] + end_delta[0],
            end[1] + end_delta[1],
            end[2] + end_delta[2],
        ];
        Ok(Self::from_start_end(new_start, new_end)?
            .with_border_flags(self.is_border_start, self.is_border_end))
    }

    /// Whether `other` lies entirely inside this box
    pub fn contains(&self, other: &BoundingBox) -> bool {
        let end = self.end();
        let other_end = other.end();
        (0..3).all(|i| other.start[i] >= self.start[i] && other_end[i] <= end[i])
    }

    /// Overlapping region of two boxes, if any
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let end = self.end();
        let other_end = other.end();
        let mut start = [0; 3];
        let mut new_end = [0; 3];
        for i in 0..3 {
            start[i] = self.start[i].max(other.start[i]);
            new_end[i] = end[i].min(other_end[i]);
            if new_end[i] <= start[i] {
                return None;
            }
        }
        BoundingBox::from_start_end(start, new_end).ok()
    }

    /// Offset of `other`'s start relative to this box's start, ZYX order
    pub fn zyx_offset_of(&self, other: &BoundingBox) -> Result<[usize; 3]> {
        if !self.contains(other) {
            return Err(ProcessingError::OutOfBounds(format!(
                "{} is not inside {}",
                other, self
            )));
        }
        Ok([
            (other.start[2] - self.start[2]) as usize,
            (other.start[1] - self.start[1]) as usize,
            (other.start[0] - self.start[0]) as usize,
        ])
    }

    /// Scale by per-axis factors: start rounds down, end rounds up.
    pub fn scale(&self, factors: [f64; 3]) -> Result<Self> {
        let end = self.end();
        let mut new_start = [0; 3];
        let mut new_end = [0; 3];
        for i in 0..3 {
            new_start[i] = (self.start[i] as f64 * factors[i]).floor() as i64;
            new_end[i] = (end[i] as f64 * factors[i]).ceil() as i64;
        }
        Self::from_start_end(new_start, new_end)
    }
}

impl PartialEq for BoundingBox {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.size == other.size
    }
}

impl Eq for BoundingBox {}

impl Hash for BoundingBox {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.start.hash(state);
        self.size.hash(state);
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BoundingBox(start={:?}, size={:?})",
            self.start, self.size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_size_rejected() {
        assert!(BoundingBox::new([0, 0, 0], [1, -1, 1]).is_err());
        assert!(BoundingBox::new([0, 0, 0], [0, 0, 0]).unwrap().is_empty());
    }

    #[test]
    fn test_end_and_shape() {
        let b = BoundingBox::new([1, 2, 3], [10, 20, 30]).unwrap();
        assert_eq!(b.end(), [11, 22, 33]);
        assert_eq!(b.zyx_shape(), [30, 20, 10]);
        assert_eq!(b.volume(), 6000);
    }

    #[test]
    fn test_adjusted_by_shrinks_and_grows() {
        let b = BoundingBox::new([0, 0, 0], [10, 10, 10]).unwrap();
        let shrunk = b.adjusted_by([1, 2, 3], [-1, -2, -3]).unwrap();
        assert_eq!(shrunk.start(), [1, 2, 3]);
        assert_eq!(shrunk.size(), [8, 6, 4]);

        let grown = b.adjusted_by([-2, -2, -2], [2, 2, 2]).unwrap();
        assert_eq!(grown.start(), [-2, -2, -2]);
        assert_eq!(grown.size(), [14, 14, 14]);

        assert!(b.adjusted_by([6, 0, 0], [-6, 0, 0]).is_err());
    }

    #[test]
    fn test_border_flags_from_outer() {
        let outer = BoundingBox::new([0, 0, 0], [100, 100, 100]).unwrap();
        let b = BoundingBox::new([0, 40, 90], [10, 10, 10])
            .unwrap()
            .with_borders_of(&outer);
        assert_eq!(b.is_border_start(), [true, false, false]);
        assert_eq!(b.is_border_end(), [false, false, true]);

        // Flags survive adjustment
        let adjusted = b.adjusted_by([0, 1, 1], [0, -1, -1]).unwrap();
        assert_eq!(adjusted.is_border_start(), [true, false, false]);
    }

    #[test]
    fn test_equality_ignores_flags() {
        let a = BoundingBox::new([0, 0, 0], [4, 4, 4]).unwrap();
        let b = a.with_border_flags([true; 3], [true; 3]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_intersection_and_contains() {
        let a = BoundingBox::new([0, 0, 0], [10, 10, 10]).unwrap();
        let b = BoundingBox::new([5, 5, 5], [10, 10, 10]).unwrap();
        let i = a.intersection(&b).unwrap();
        assert_eq!(i, BoundingBox::new([5, 5, 5], [5, 5, 5]).unwrap());
        assert!(a.contains(&i));
        assert!(!a.contains(&b));

        let far = BoundingBox::new([20, 0, 0], [1, 1, 1]).unwrap();
        assert!(a.intersection(&far).is_none());
    }

    #[test]
    fn test_zyx_offset() {
        let outer = BoundingBox::new([10, 20, 30], [10, 10, 10]).unwrap();
        let inner = BoundingBox::new([11, 22, 33], [2, 2, 2]).unwrap();
        assert_eq!(outer.zyx_offset_of(&inner).unwrap(), [3, 2, 1]);
        assert!(inner.zyx_offset_of(&outer).is_err());
    }

    #[test]
    fn test_scale() {
        let b = BoundingBox::new([3, 3, 2], [5, 5, 4]).unwrap();
        let scaled = b.scale([0.5, 0.5, 1.0]).unwrap();
        assert_eq!(scaled.start(), [1, 1, 2]);
        assert_eq!(scaled.end(), [4, 4, 6]);
    }

    #[test]
    fn test_serde_defaults_border_flags() {
        let b: BoundingBox =
            serde_json::from_str(r#"{"start":[0,0,0],"size":[4,5,6]}"#).unwrap();
        assert_eq!(b.size(), [4, 5, 6]);
        assert_eq!(b.is_border_start(), [false; 3]);
    }
}
