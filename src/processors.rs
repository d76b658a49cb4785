//! Built-in processors
//!
//! Small, composable transforms that cover the different shapes of the
//! [`Processor`] contract: halo-consuming filters, type-changing maps,
//! resampling, multi-output and data-independent processors.

use crate::bounding_box::BoundingBox;
use crate::error::{ProcessingError, Result};
use crate::processor::{ProcessOutput, Processor};
use crate::subvolume::{map_voxels, Subvolume, VoxelArray};
use crate::types::{DataType, OutputNum, PixelSize, Xyz, XyzHint};
use ndarray::{s, Array4};
use serde::Deserialize;

fn default_true() -> bool {
    true
}

/// Passes tiles through unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Identity {}

impl Processor for Identity {
    fn process(&self, subvol: Subvolume) -> Result<ProcessOutput> {
        Ok(ProcessOutput::Single(subvol))
    }
}

/// Mean over a cubic neighbourhood of `radius` voxels, as float32.
///
/// Needs `radius` voxels of context on every side. Near the edge of a tile
/// the neighbourhood is clamped to the tile, which is only correct where the
/// tile edge is also the volume edge; elsewhere that band is halo and gets
/// cropped.
#[derive(Debug, Clone, Deserialize)]
pub struct MeanFilter {
    pub radius: i64,
    #[serde(default = "default_true")]
    pub crop_at_borders: bool,
}

impl MeanFilter {
    pub fn new(radius: i64) -> Self {
        Self {
            radius,
            crop_at_borders: true,
        }
    }

    pub fn keep_borders(mut self) -> Self {
        self.crop_at_borders = false;
        self
    }

    fn filter(&self, input: &Array4<f32>) -> Array4<f32> {
        let r = self.radius.max(0) as usize;
        let (_, nz, ny, nx) = input.dim();
        Array4::from_shape_fn(input.dim(), |(c, z, y, x)| {
            let window = input.slice(s![
                c,
                z.saturating_sub(r)..(z + r + 1).min(nz),
                y.saturating_sub(r)..(y + r + 1).min(ny),
                x.saturating_sub(r)..(x + r + 1).min(nx)
            ]);
            let (sum, count) = window
                .iter()
                .fold((0.0f64, 0usize), |(sum, n), &v| (sum + v as f64, n + 1));
            (sum / count as f64) as f32
        })
    }
}

impl Processor for MeanFilter {
    fn output_type(&self, _input_type: DataType) -> DataType {
        DataType::F32
    }

    fn name_parts(&self) -> Vec<String> {
        vec!["MeanFilter".to_string(), format!("r{}", self.radius)]
    }

    fn context(&self) -> (XyzHint, XyzHint) {
        let r = self.radius;
        (XyzHint::Fixed([r, r, r]), XyzHint::Fixed([r, r, r]))
    }

    fn crop_at_borders(&self) -> bool {
        self.crop_at_borders
    }

    fn validate(&self) -> Result<()> {
        if self.radius < 0 {
            return Err(ProcessingError::InvalidArguments {
                name: "MeanFilter".to_string(),
                reason: format!("radius must be non-negative, got {}", self.radius),
            });
        }
        Ok(())
    }

    fn process(&self, subvol: Subvolume) -> Result<ProcessOutput> {
        self.validate()?;
        let (data, bbox) = subvol.into_parts();
        let filtered = self.filter(&data.to_f32());
        Ok(ProcessOutput::Single(Subvolume::new(filtered, bbox)?))
    }
}

/// Binarizes data: 1 where the value exceeds `value`, else 0
#[derive(Debug, Clone, Deserialize)]
pub struct Threshold {
    pub value: f64,
}

impl Processor for Threshold {
    fn output_type(&self, _input_type: DataType) -> DataType {
        DataType::U8
    }

    fn name_parts(&self) -> Vec<String> {
        vec!["Threshold".to_string(), format!("{}", self.value)]
    }

    fn process(&self, subvol: Subvolume) -> Result<ProcessOutput> {
        let (data, bbox) = subvol.into_parts();
        let mask = data.to_f64().mapv(|v| u8::from(v > self.value));
        Ok(ProcessOutput::Single(Subvolume::new(mask, bbox)?))
    }
}

/// Keeps every `factor`-th voxel in X and Y
#[derive(Debug, Clone, Deserialize)]
pub struct DownsampleXy {
    pub factor: i64,
}

fn ceil_div_euclid(v: i64, f: i64) -> i64 {
    -(-v).div_euclid(f)
}

impl Processor for DownsampleXy {
    fn name_parts(&self) -> Vec<String> {
        vec!["DownsampleXy".to_string(), format!("x{}", self.factor)]
    }

    fn pixelsize(&self, input_pixel_size: PixelSize) -> PixelSize {
        let f = self.factor as f64;
        input_pixel_size.scaled([f, f, 1.0])
    }

    fn subvolume_size(&self) -> Option<XyzHint> {
        Some(XyzHint::Suggested([self.factor * 64, self.factor * 64, 64]))
    }

    /// Output voxel `j` is input voxel `j * factor`, so an input box
    /// `[a, b)` keeps output voxels `[ceil(a / f), ceil(b / f))`.
    fn expected_output_box(&self, bbox: &BoundingBox) -> BoundingBox {
        let f = self.factor.max(1);
        let start = bbox.start();
        let end = bbox.end();
        let out_start = [ceil_div_euclid(start[0], f), ceil_div_euclid(start[1], f), start[2]];
        let out_end = [ceil_div_euclid(end[0], f), ceil_div_euclid(end[1], f), end[2]];
        BoundingBox::from_start_end(out_start, out_end)
            .unwrap_or(*bbox)
            .with_border_flags(bbox.is_border_start(), bbox.is_border_end())
    }

    fn subvolume_alignment(&self) -> Xyz {
        [self.factor.max(1), self.factor.max(1), 1]
    }

    fn validate(&self) -> Result<()> {
        if self.factor < 1 {
            return Err(ProcessingError::InvalidArguments {
                name: "DownsampleXy".to_string(),
                reason: format!("factor must be >= 1, got {}", self.factor),
            });
        }
        Ok(())
    }

    fn process(&self, subvol: Subvolume) -> Result<ProcessOutput> {
        self.validate()?;
        let start = subvol.bbox().start();
        if start[0].rem_euclid(self.factor) != 0 || start[1].rem_euclid(self.factor) != 0 {
            return Err(ProcessingError::GeometryMismatch(format!(
                "tile start {:?} is not aligned to downsampling factor {}",
                start, self.factor
            )));
        }
        let out_box = self.expected_output_box(subvol.bbox());
        let step = self.factor as isize;
        let data = map_voxels!(subvol.data(), a => a.slice(s![.., .., ..;step, ..;step]).to_owned());
        Ok(ProcessOutput::Single(Subvolume::new(data, out_box)?))
    }
}

/// Emits one single-channel subvolume per input channel
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SplitChannels {}

impl Processor for SplitChannels {
    fn output_num(&self) -> OutputNum {
        OutputNum::Multi
    }

    fn num_channels(&self, _input_channels: usize) -> usize {
        1
    }

    fn process(&self, subvol: Subvolume) -> Result<ProcessOutput> {
        let outputs = (0..subvol.num_channels())
            .map(|c| Subvolume::new(subvol.data().channel(c)?, *subvol.bbox()))
            .collect::<Result<Vec<_>>>()?;
        Ok(ProcessOutput::Multi(outputs))
    }
}

/// Produces a constant volume with the input's geometry and type
#[derive(Debug, Clone, Deserialize)]
pub struct Fill {
    pub value: f64,
}

impl Processor for Fill {
    fn name_parts(&self) -> Vec<String> {
        vec!["Fill".to_string(), format!("{}", self.value)]
    }

    fn ignores_input_data(&self) -> bool {
        true
    }

    fn process(&self, subvol: Subvolume) -> Result<ProcessOutput> {
        let data = VoxelArray::filled(subvol.data_type(), subvol.data().shape(), self.value);
        Ok(ProcessOutput::Single(Subvolume::new(data, *subvol.bbox())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(start: [i64; 3], size: [i64; 3]) -> BoundingBox {
        BoundingBox::new(start, size).unwrap()
    }

    fn ramp(b: BoundingBox, channels: usize) -> Subvolume {
        let [z, y, x] = b.zyx_shape();
        let data = Array4::from_shape_fn([channels, z, y, x], |(c, z, y, x)| {
            (c * 1000 + z * 100 + y * 10 + x) as u64
        });
        Subvolume::new(data, b).unwrap()
    }

    fn single(output: ProcessOutput) -> Subvolume {
        match output {
            ProcessOutput::Single(subvol) => subvol,
            ProcessOutput::Multi(_) => panic!("expected a single output"),
        }
    }

    #[test]
    fn test_identity() {
        let input = ramp(bbox([0, 0, 0], [3, 3, 3]), 1);
        let output = single(Identity::default().process(input.clone()).unwrap());
        assert_eq!(output, input);
        assert_eq!(Identity::default().name_parts(), vec!["Identity"]);
    }

    #[test]
    fn test_mean_filter_constant_input() {
        let b = bbox([0, 0, 0], [5, 5, 5]);
        let input = Subvolume::new(VoxelArray::filled(DataType::U8, [1, 5, 5, 5], 4.0), b).unwrap();
        let filter = MeanFilter::new(1);
        assert_eq!(filter.overlap(), XyzHint::Fixed([2, 2, 2]));
        assert_eq!(filter.output_type(DataType::U8), DataType::F32);

        let output = single(filter.process(input).unwrap());
        assert_eq!(output.data(), &VoxelArray::filled(DataType::F32, [1, 5, 5, 5], 4.0));
    }

    #[test]
    fn test_mean_filter_averages_neighbourhood() {
        let b = bbox([0, 0, 0], [3, 1, 1]);
        let data = Array4::from_shape_vec([1, 1, 1, 3], vec![0.0f32, 3.0, 6.0]).unwrap();
        let output = single(MeanFilter::new(1).process(Subvolume::new(data, b).unwrap()).unwrap());
        match output.data() {
            VoxelArray::F32(a) => {
                assert_eq!(a[[0, 0, 0, 0]], 1.5);
                assert_eq!(a[[0, 0, 0, 1]], 3.0);
                assert_eq!(a[[0, 0, 0, 2]], 4.5);
            }
            other => panic!("unexpected {:?}", other.data_type()),
        }
    }

    #[test]
    fn test_threshold() {
        let input = ramp(bbox([0, 0, 0], [4, 1, 1]), 1);
        let output = single(Threshold { value: 1.5 }.process(input).unwrap());
        assert_eq!(output.data_type(), DataType::U8);
        match output.data() {
            VoxelArray::U8(a) => assert_eq!(a.iter().copied().collect::<Vec<_>>(), vec![0, 0, 1, 1]),
            other => panic!("unexpected {:?}", other.data_type()),
        }
    }

    #[test]
    fn test_downsample_xy() {
        let p = DownsampleXy { factor: 2 };
        let input_box = bbox([4, 8, 3], [5, 4, 2]);
        let expected = p.expected_output_box(&input_box);
        assert_eq!(expected.start(), [2, 4, 3]);
        assert_eq!(expected.size(), [3, 2, 2]);

        let output = single(p.process(ramp(input_box, 1)).unwrap());
        assert_eq!(*output.bbox(), expected);
        match output.data() {
            VoxelArray::U64(a) => {
                assert_eq!(a.dim(), (1, 2, 2, 3));
                assert_eq!(a[[0, 1, 1, 2]], 100 + 20 + 4);
            }
            other => panic!("unexpected {:?}", other.data_type()),
        }

        assert_eq!(
            p.pixelsize(PixelSize::new(8.0, 8.0, 30.0)),
            PixelSize::new(16.0, 16.0, 30.0)
        );
        assert!(p.process(ramp(bbox([1, 0, 0], [4, 4, 1]), 1)).is_err());
    }

    #[test]
    fn test_downsample_output_boxes_abut() {
        let p = DownsampleXy { factor: 2 };
        let left = p.expected_output_box(&bbox([1, 0, 0], [6, 4, 1]));
        let right = p.expected_output_box(&bbox([7, 0, 0], [6, 4, 1]));
        assert_eq!(left.end()[0], right.start()[0]);
        assert_eq!(left, bbox([1, 0, 0], [3, 2, 1]));
        assert_eq!(p.subvolume_alignment(), [2, 2, 1]);
    }

    #[test]
    fn test_invalid_arguments_fail_validation() {
        assert!(matches!(
            DownsampleXy { factor: 0 }.validate(),
            Err(ProcessingError::InvalidArguments { .. })
        ));
        assert!(DownsampleXy { factor: -3 }.validate().is_err());
        assert!(DownsampleXy { factor: 3 }.validate().is_ok());
        assert!(matches!(
            MeanFilter::new(-1).validate(),
            Err(ProcessingError::InvalidArguments { .. })
        ));
        assert!(MeanFilter::new(0).validate().is_ok());
    }

    #[test]
    fn test_split_channels() {
        let p = SplitChannels::default();
        assert_eq!(p.output_num(), OutputNum::Multi);
        assert_eq!(p.num_channels(3), 1);

        let outputs = p.process(ramp(bbox([0, 0, 0], [2, 2, 2]), 3)).unwrap().into_vec();
        assert_eq!(outputs.len(), 3);
        assert!(outputs.iter().all(|s| s.num_channels() == 1));
        match outputs[2].data() {
            VoxelArray::U64(a) => assert_eq!(a[[0, 0, 0, 0]], 2000),
            other => panic!("unexpected {:?}", other.data_type()),
        }
    }

    #[test]
    fn test_fill_ignores_input() {
        let p = Fill { value: 9.0 };
        assert!(p.ignores_input_data());
        let output = single(p.process(ramp(bbox([0, 0, 0], [2, 2, 2]), 1)).unwrap());
        assert_eq!(output.data(), &VoxelArray::filled(DataType::U64, [1, 2, 2, 2], 9.0));
    }
}
