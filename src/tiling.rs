//! Tiling of a bounding box into overlapping subvolume boxes

use crate::bounding_box::BoundingBox;
use crate::error::{ProcessingError, Result};
use crate::types::Xyz;
use crate::utils::ceil_div;
use serde::{Deserialize, Serialize};

/// Cuts an outer box into tiles of `box_size` that overlap by `box_overlap`.
///
/// Consecutive tiles are `box_size - box_overlap` apart. Tiles on the far
/// side are clipped to the outer box. Every tile carries border flags
/// relative to the outer box, which is what border-aware cropping keys on.
///
/// With an effective context whose front + back equals `box_overlap`, the
/// cropped tiles cover the (cropped) outer box without gaps or overlap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxGenerator {
    outer_box: BoundingBox,
    box_size: Xyz,
    box_overlap: Xyz,
}

impl BoxGenerator {
    /// Create a new generator
    pub fn new(outer_box: BoundingBox, box_size: Xyz, box_overlap: Xyz) -> Result<Self> {
        for axis in 0..3 {
            if box_size[axis] <= 0 {
                return Err(ProcessingError::Configuration(format!(
                    "box size must be positive, got {:?}",
                    box_size
                )));
            }
            if box_overlap[axis] < 0 || box_overlap[axis] >= box_size[axis] {
                return Err(ProcessingError::Configuration(format!(
                    "box overlap {:?} must be non-negative and smaller than box size {:?}",
                    box_overlap, box_size
                )));
            }
        }

        Ok(Self {
            outer_box,
            box_size,
            box_overlap,
        })
    }

    pub fn outer_box(&self) -> &BoundingBox {
        &self.outer_box
    }

    pub fn box_size(&self) -> Xyz {
        self.box_size
    }

    pub fn box_overlap(&self) -> Xyz {
        self.box_overlap
    }

    /// Distance between the starts of neighbouring tiles
    pub fn stride(&self) -> Xyz {
        [
            self.box_size[0] - self.box_overlap[0],
            self.box_size[1] - self.box_overlap[1],
            self.box_size[2] - self.box_overlap[2],
        ]
    }

    /// Number of tiles along each axis
    pub fn box_count(&self) -> Xyz {
        let outer = self.outer_box.size();
        let stride = self.stride();
        let mut count = [0; 3];
        for axis in 0..3 {
            count[axis] = if outer[axis] == 0 {
                0
            } else if outer[axis] <= self.box_size[axis] {
                1
            } else {
                ceil_div(outer[axis] - self.box_overlap[axis], stride[axis])
            };
        }
        count
    }

    /// Total number of tiles
    pub fn num_boxes(&self) -> usize {
        self.box_count().iter().map(|&c| c as usize).product()
    }

    /// Convert a tile index to tile coordinates (X varies fastest)
    pub fn index_to_coords(&self, index: usize) -> Xyz {
        let count = self.box_count();
        let x = count[0] as usize;
        let y = count[1] as usize;
        [
            (index % x) as i64,
            ((index / x) % y) as i64,
            (index / (x * y)) as i64,
        ]
    }

    /// Convert tile coordinates to a tile index
    pub fn coords_to_index(&self, coords: Xyz) -> usize {
        let count = self.box_count();
        (coords[0] + count[0] * (coords[1] + count[1] * coords[2])) as usize
    }

    /// The tile at `index`, or `None` past the end
    pub fn generate(&self, index: usize) -> Option<BoundingBox> {
        if index >= self.num_boxes() {
            return None;
        }
        let coords = self.index_to_coords(index);
        let stride = self.stride();
        let outer_start = self.outer_box.start();
        let outer_end = self.outer_box.end();

        let mut start = [0; 3];
        let mut end = [0; 3];
        for axis in 0..3 {
            start[axis] = outer_start[axis] + coords[axis] * stride[axis];
            end[axis] = (start[axis] + self.box_size[axis]).min(outer_end[axis]);
        }

        BoundingBox::from_start_end(start, end)
            .ok()
            .map(|b| b.with_borders_of(&self.outer_box))
    }

    /// All tiles in index order
    pub fn iter(&self) -> impl Iterator<Item = BoundingBox> + '_ {
        (0..self.num_boxes()).filter_map(move |i| self.generate(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_generator() -> BoxGenerator {
        let outer = BoundingBox::new([0, 0, 0], [23, 20, 12]).unwrap();
        BoxGenerator::new(outer, [12, 12, 12], [2, 2, 2]).unwrap()
    }

    #[test]
    fn test_box_count() {
        let generator = create_test_generator();
        // ceil((23-2)/10), ceil((20-2)/10), single box on z
        assert_eq!(generator.box_count(), [3, 2, 1]);
        assert_eq!(generator.num_boxes(), 6);
    }

    #[test]
    fn test_index_conversion() {
        let generator = create_test_generator();
        for index in 0..generator.num_boxes() {
            let coords = generator.index_to_coords(index);
            assert_eq!(generator.coords_to_index(coords), index);
        }
        assert_eq!(generator.index_to_coords(4), [1, 1, 0]);
    }

    #[test]
    fn test_generated_boxes_are_clipped() {
        let generator = create_test_generator();
        let boxes: Vec<_> = generator.iter().collect();
        assert_eq!(boxes.len(), 6);

        assert_eq!(boxes[0].start(), [0, 0, 0]);
        assert_eq!(boxes[0].size(), [12, 12, 12]);

        // Last box along X starts at 20 and is clipped to 3 voxels
        assert_eq!(boxes[2].start(), [20, 0, 0]);
        assert_eq!(boxes[2].size(), [3, 12, 12]);

        assert_eq!(boxes[5].start(), [20, 10, 0]);
        assert_eq!(boxes[5].end(), [23, 20, 12]);
        assert!(generator.generate(6).is_none());
    }

    #[test]
    fn test_border_flags() {
        let generator = create_test_generator();
        let first = generator.generate(0).unwrap();
        assert_eq!(first.is_border_start(), [true, true, true]);
        assert_eq!(first.is_border_end(), [false, false, true]);

        let middle = generator.generate(1).unwrap();
        assert_eq!(middle.is_border_start(), [false, true, true]);
        assert_eq!(middle.is_border_end(), [false, false, true]);

        let last = generator.generate(5).unwrap();
        assert_eq!(last.is_border_start(), [false, false, true]);
        assert_eq!(last.is_border_end(), [true, true, true]);
    }

    #[test]
    fn test_offset_outer_box() {
        let outer = BoundingBox::new([100, 50, 7], [10, 10, 10]).unwrap();
        let generator = BoxGenerator::new(outer, [6, 10, 10], [2, 0, 0]).unwrap();
        let boxes: Vec<_> = generator.iter().collect();
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].start(), [100, 50, 7]);
        assert_eq!(boxes[1].start(), [104, 50, 7]);
        assert_eq!(boxes[1].end(), [110, 60, 17]);
    }

    #[test]
    fn test_invalid_parameters() {
        let outer = BoundingBox::new([0, 0, 0], [10, 10, 10]).unwrap();
        assert!(BoxGenerator::new(outer, [0, 4, 4], [0, 0, 0]).is_err());
        assert!(BoxGenerator::new(outer, [4, 4, 4], [4, 0, 0]).is_err());
        assert!(BoxGenerator::new(outer, [4, 4, 4], [-1, 0, 0]).is_err());
    }

    #[test]
    fn test_empty_outer_box() {
        let outer = BoundingBox::new([0, 0, 0], [0, 10, 10]).unwrap();
        let generator = BoxGenerator::new(outer, [4, 4, 4], [0, 0, 0]).unwrap();
        assert_eq!(generator.num_boxes(), 0);
        assert_eq!(generator.iter().count(), 0);
    }
}
