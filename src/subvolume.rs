//! Subvolumes: a (C, Z, Y, X) array paired with the box it covers

use crate::bounding_box::BoundingBox;
use crate::error::{ProcessingError, Result};
use crate::types::DataType;
use ndarray::{s, Array4, ArrayView4};
use num_traits::AsPrimitive;

/// Apply the same expression to whichever typed array a [`VoxelArray`]
/// holds, rewrapping the result in the same variant.
macro_rules! map_voxels {
    ($value:expr, $arr:ident => $body:expr) => {
        match $value {
            VoxelArray::U8($arr) => VoxelArray::U8($body),
            VoxelArray::U64($arr) => VoxelArray::U64($body),
            VoxelArray::F32($arr) => VoxelArray::F32($body),
        }
    };
}

pub(crate) use map_voxels;

/// Four-dimensional voxel data, axes (channel, Z, Y, X).
#[derive(Debug, Clone, PartialEq)]
pub enum VoxelArray {
    U8(Array4<u8>),
    U64(Array4<u64>),
    F32(Array4<f32>),
}

impl VoxelArray {
    /// Zero-filled array of the given type and (C, Z, Y, X) shape
    pub fn zeros(data_type: DataType, shape: [usize; 4]) -> Self {
        match data_type {
            DataType::U8 => VoxelArray::U8(Array4::zeros(shape)),
            DataType::U64 => VoxelArray::U64(Array4::zeros(shape)),
            DataType::F32 => VoxelArray::F32(Array4::zeros(shape)),
        }
    }

    /// Array filled with `value`, converted to the element type
    pub fn filled(data_type: DataType, shape: [usize; 4], value: f64) -> Self {
        match data_type {
            DataType::U8 => VoxelArray::U8(Array4::from_elem(shape, value.as_())),
            DataType::U64 => VoxelArray::U64(Array4::from_elem(shape, value.as_())),
            DataType::F32 => VoxelArray::F32(Array4::from_elem(shape, value.as_())),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            VoxelArray::U8(_) => DataType::U8,
            VoxelArray::U64(_) => DataType::U64,
            VoxelArray::F32(_) => DataType::F32,
        }
    }

    /// Full (C, Z, Y, X) shape
    pub fn shape(&self) -> [usize; 4] {
        let dims = match self {
            VoxelArray::U8(a) => a.dim(),
            VoxelArray::U64(a) => a.dim(),
            VoxelArray::F32(a) => a.dim(),
        };
        [dims.0, dims.1, dims.2, dims.3]
    }

    pub fn num_channels(&self) -> usize {
        self.shape()[0]
    }

    /// (Z, Y, X) shape
    pub fn spatial_shape(&self) -> [usize; 3] {
        let [_, z, y, x] = self.shape();
        [z, y, x]
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out the spatial region starting at `offset` with extent `shape`,
    /// both ZYX. All channels are kept.
    pub fn extract(&self, offset: [usize; 3], shape: [usize; 3]) -> Result<VoxelArray> {
        let spatial = self.spatial_shape();
        for axis in 0..3 {
            if offset[axis] + shape[axis] > spatial[axis] {
                return Err(ProcessingError::OutOfBounds(format!(
                    "region offset {:?} shape {:?} exceeds array shape {:?}",
                    offset, shape, spatial
                )));
            }
        }
        let [z0, y0, x0] = offset;
        let [z1, y1, x1] = [z0 + shape[0], y0 + shape[1], x0 + shape[2]];
        Ok(map_voxels!(self, a => a.slice(s![.., z0..z1, y0..y1, x0..x1]).to_owned()))
    }

    /// Remove `front` voxels from the start and `back` voxels from the end of
    /// each spatial axis (ZYX order). The channel axis is untouched.
    pub fn crop_spatial(&self, front: [usize; 3], back: [usize; 3]) -> Result<VoxelArray> {
        let spatial = self.spatial_shape();
        let mut shape = [0; 3];
        for axis in 0..3 {
            shape[axis] = spatial[axis]
                .checked_sub(front[axis] + back[axis])
                .ok_or_else(|| {
                    ProcessingError::GeometryMismatch(format!(
                        "cannot crop {}+{} from axis of length {}",
                        front[axis], back[axis], spatial[axis]
                    ))
                })?;
        }
        self.extract(front, shape)
    }

    /// Overwrite the region at `offset` (ZYX) with `other`
    pub fn paste(&mut self, offset: [usize; 3], other: &VoxelArray) -> Result<()> {
        if self.data_type() != other.data_type() {
            return Err(ProcessingError::DataTypeMismatch {
                expected: self.data_type(),
                actual: other.data_type(),
            });
        }
        if self.num_channels() != other.num_channels() {
            return Err(ProcessingError::GeometryMismatch(format!(
                "channel count {} does not match {}",
                other.num_channels(),
                self.num_channels()
            )));
        }
        let spatial = self.spatial_shape();
        let extent = other.spatial_shape();
        for axis in 0..3 {
            if offset[axis] + extent[axis] > spatial[axis] {
                return Err(ProcessingError::OutOfBounds(format!(
                    "paste at {:?} of {:?} exceeds {:?}",
                    offset, extent, spatial
                )));
            }
        }
        let [z0, y0, x0] = offset;
        let [z1, y1, x1] = [z0 + extent[0], y0 + extent[1], x0 + extent[2]];
        match (self, other) {
            (VoxelArray::U8(dst), VoxelArray::U8(src)) => {
                dst.slice_mut(s![.., z0..z1, y0..y1, x0..x1]).assign(src)
            }
            (VoxelArray::U64(dst), VoxelArray::U64(src)) => {
                dst.slice_mut(s![.., z0..z1, y0..y1, x0..x1]).assign(src)
            }
            (VoxelArray::F32(dst), VoxelArray::F32(src)) => {
                dst.slice_mut(s![.., z0..z1, y0..y1, x0..x1]).assign(src)
            }
            _ => unreachable!("data types checked above"),
        }
        Ok(())
    }

    /// Single channel `c` as a one-channel array
    pub fn channel(&self, c: usize) -> Result<VoxelArray> {
        if c >= self.num_channels() {
            return Err(ProcessingError::OutOfBounds(format!(
                "channel {} of {}",
                c,
                self.num_channels()
            )));
        }
        Ok(map_voxels!(self, a => a.slice(s![c..c + 1, .., .., ..]).to_owned()))
    }

    /// Lossy conversion to f32 (u64 labels above 2^24 lose precision)
    pub fn to_f32(&self) -> Array4<f32> {
        match self {
            VoxelArray::U8(a) => cast_array(a.view()),
            VoxelArray::U64(a) => cast_array(a.view()),
            VoxelArray::F32(a) => a.clone(),
        }
    }

    pub fn to_f64(&self) -> Array4<f64> {
        match self {
            VoxelArray::U8(a) => cast_array(a.view()),
            VoxelArray::U64(a) => cast_array(a.view()),
            VoxelArray::F32(a) => cast_array(a.view()),
        }
    }

    /// Little-endian bytes in logical (C, Z, Y, X) order
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.len() * self.data_type().size_in_bytes());
        match self {
            VoxelArray::U8(a) => bytes.extend(a.iter().copied()),
            VoxelArray::U64(a) => a.iter().for_each(|v| bytes.extend_from_slice(&v.to_le_bytes())),
            VoxelArray::F32(a) => a.iter().for_each(|v| bytes.extend_from_slice(&v.to_le_bytes())),
        }
        bytes
    }

    /// Inverse of [`VoxelArray::to_le_bytes`]
    pub fn from_le_bytes(data_type: DataType, shape: [usize; 4], bytes: &[u8]) -> Result<Self> {
        let count: usize = shape.iter().product();
        let expected = count * data_type.size_in_bytes();
        if bytes.len() != expected {
            return Err(ProcessingError::GeometryMismatch(format!(
                "expected {} bytes for shape {:?} of {}, got {}",
                expected,
                shape,
                data_type,
                bytes.len()
            )));
        }
        let shape_err = |e: ndarray::ShapeError| ProcessingError::GeometryMismatch(e.to_string());
        Ok(match data_type {
            DataType::U8 => {
                VoxelArray::U8(Array4::from_shape_vec(shape, bytes.to_vec()).map_err(shape_err)?)
            }
            DataType::U64 => {
                let values = bytes
                    .chunks_exact(8)
                    .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect();
                VoxelArray::U64(Array4::from_shape_vec(shape, values).map_err(shape_err)?)
            }
            DataType::F32 => {
                let values = bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                VoxelArray::F32(Array4::from_shape_vec(shape, values).map_err(shape_err)?)
            }
        })
    }
}

fn cast_array<T, U>(view: ArrayView4<'_, T>) -> Array4<U>
where
    T: AsPrimitive<U>,
    U: Copy + 'static,
{
    view.mapv(|v| v.as_())
}

impl From<Array4<u8>> for VoxelArray {
    fn from(a: Array4<u8>) -> Self {
        VoxelArray::U8(a)
    }
}

impl From<Array4<u64>> for VoxelArray {
    fn from(a: Array4<u64>) -> Self {
        VoxelArray::U64(a)
    }
}

impl From<Array4<f32>> for VoxelArray {
    fn from(a: Array4<f32>) -> Self {
        VoxelArray::F32(a)
    }
}

/// A tile of volume data and the box it represents.
///
/// The array's spatial shape always equals the box size in ZYX order.
#[derive(Debug, Clone, PartialEq)]
pub struct Subvolume {
    data: VoxelArray,
    bbox: BoundingBox,
}

impl Subvolume {
    /// Pair data with a box, rejecting any shape disagreement
    pub fn new(data: impl Into<VoxelArray>, bbox: BoundingBox) -> Result<Self> {
        let data = data.into();
        check_geometry(&data, &bbox)?;
        Ok(Self { data, bbox })
    }

    pub fn data(&self) -> &VoxelArray {
        &self.data
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    pub fn num_channels(&self) -> usize {
        self.data.num_channels()
    }

    pub fn into_parts(self) -> (VoxelArray, BoundingBox) {
        (self.data, self.bbox)
    }
}

/// Fail unless `data`'s spatial shape matches `bbox` (ZYX vs XYZ)
pub fn check_geometry(data: &VoxelArray, bbox: &BoundingBox) -> Result<()> {
    let expected = bbox.zyx_shape();
    let actual = data.spatial_shape();
    if expected != actual {
        return Err(ProcessingError::GeometryMismatch(format!(
            "array spatial shape {:?} (ZYX) does not match {} (expected {:?})",
            actual, bbox, expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn ramp(shape: [usize; 4]) -> Array4<u64> {
        Array4::from_shape_fn(shape, |(c, z, y, x)| (c * 1000 + z * 100 + y * 10 + x) as u64)
    }

    #[test]
    fn test_subvolume_geometry_checked() {
        let bbox = BoundingBox::new([0, 0, 0], [4, 3, 2]).unwrap();
        assert!(Subvolume::new(Array4::<u8>::zeros([1, 2, 3, 4]), bbox).is_ok());

        let err = Subvolume::new(Array4::<u8>::zeros([1, 4, 3, 2]), bbox).unwrap_err();
        assert!(matches!(err, ProcessingError::GeometryMismatch(_)));
    }

    #[test]
    fn test_crop_spatial() {
        let array = VoxelArray::from(ramp([2, 5, 5, 5]));
        let cropped = array.crop_spatial([1, 0, 2], [1, 2, 0]).unwrap();
        assert_eq!(cropped.shape(), [2, 3, 3, 3]);
        match cropped {
            VoxelArray::U64(a) => {
                assert_eq!(a[[0, 0, 0, 0]], 102);
                assert_eq!(a[[1, 2, 2, 2]], 1000 + 300 + 20 + 4);
            }
            other => panic!("unexpected {:?}", other.data_type()),
        }

        assert!(array.crop_spatial([3, 0, 0], [3, 0, 0]).is_err());
    }

    #[test]
    fn test_paste_and_extract() {
        let mut canvas = VoxelArray::zeros(DataType::F32, [1, 4, 4, 4]);
        let patch = VoxelArray::filled(DataType::F32, [1, 2, 2, 2], 7.0);
        canvas.paste([1, 1, 1], &patch).unwrap();
        assert_eq!(canvas.extract([1, 1, 1], [2, 2, 2]).unwrap(), patch);
        assert_eq!(
            canvas.extract([0, 0, 0], [1, 1, 1]).unwrap(),
            VoxelArray::zeros(DataType::F32, [1, 1, 1, 1])
        );

        let wrong_type = VoxelArray::zeros(DataType::U8, [1, 1, 1, 1]);
        assert!(matches!(
            canvas.paste([0, 0, 0], &wrong_type),
            Err(ProcessingError::DataTypeMismatch { .. })
        ));
        assert!(canvas.paste([3, 3, 3], &patch).is_err());
    }

    #[test]
    fn test_channel_selection() {
        let array = VoxelArray::from(ramp([3, 2, 2, 2]));
        let c2 = array.channel(2).unwrap();
        assert_eq!(c2.shape(), [1, 2, 2, 2]);
        assert!(array.channel(3).is_err());
    }

    #[test]
    fn test_le_bytes_layout() {
        let array = VoxelArray::from(ramp([1, 1, 2, 2]));
        let bytes = array.to_le_bytes();
        assert_eq!(bytes.len(), 4 * 8);
        assert_eq!(&bytes[8..16], &1u64.to_le_bytes());
        let back = VoxelArray::from_le_bytes(DataType::U64, [1, 1, 2, 2], &bytes).unwrap();
        assert_eq!(back, array);

        assert!(VoxelArray::from_le_bytes(DataType::F32, [1, 1, 2, 2], &bytes).is_err());
    }
}
