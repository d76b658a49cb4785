//! Subvolume processors and the halo arithmetic around them.
//!
//! A [`Processor`] transforms one tile at a time. It declares how much
//! context ("halo") it needs on each side of a tile; the caller tiles the
//! volume with at least that much overlap and, once a tile has been
//! processed, crops the halo back off with an [`EffectiveConfig`].
//!
//! The effective configuration is produced exactly once per pipeline by
//! [`Processor::set_effective_subvol_and_overlap`] and is immutable
//! afterwards, so it can be shared freely across worker threads.

use crate::bounding_box::BoundingBox;
use crate::error::{ProcessingError, Result};
use crate::subvolume::{check_geometry, Subvolume, VoxelArray};
use crate::types::{DataType, OutputNum, PixelSize, Xyz, XyzHint};
use log::debug;

/// What a call to [`Processor::process`] produced
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutput {
    Single(Subvolume),
    Multi(Vec<Subvolume>),
}

impl ProcessOutput {
    pub fn into_vec(self) -> Vec<Subvolume> {
        match self {
            ProcessOutput::Single(subvol) => vec![subvol],
            ProcessOutput::Multi(subvols) => subvols,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ProcessOutput::Single(_) => 1,
            ProcessOutput::Multi(subvols) => subvols.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A transform applied independently to each tile of a volume.
///
/// Everything except [`Processor::process`] documents input/output
/// requirements and naming, and has a sensible default.
pub trait Processor: Send + Sync {
    /// Element type produced for a given input element type
    fn output_type(&self, input_type: DataType) -> DataType {
        input_type
    }

    /// Whether `process` produces one or several subvolumes per input
    fn output_num(&self) -> OutputNum {
        OutputNum::Single
    }

    /// Tokens used to name jobs and outputs, usually the processor name
    /// followed by its salient parameters.
    fn name_parts(&self) -> Vec<String> {
        let full = std::any::type_name::<Self>();
        let short = full.rsplit("::").next().unwrap_or(full);
        vec![short.to_string()]
    }

    /// `name_parts` joined with underscores
    fn name(&self) -> String {
        self.name_parts().join("_")
    }

    /// Output voxel size for a given input voxel size. Resampling
    /// processors must override this.
    fn pixelsize(&self, input_pixel_size: PixelSize) -> PixelSize {
        input_pixel_size
    }

    fn num_channels(&self, input_channels: usize) -> usize {
        input_channels
    }

    /// Transform one tile.
    ///
    /// The result still contains the halo; the caller removes it with
    /// [`EffectiveConfig::crop_box_and_data`]. For [`OutputNum::Single`]
    /// the returned box must equal `expected_output_box(subvol.bbox())`.
    fn process(&self, subvol: Subvolume) -> Result<ProcessOutput> {
        let _ = subvol;
        Err(ProcessingError::NotImplemented(self.name()))
    }

    /// Tile size required (`Fixed`) or preferred (`Suggested`) by `process`
    fn subvolume_size(&self) -> Option<XyzHint> {
        None
    }

    /// Front and back context needed on each axis, XYZ order
    fn context(&self) -> (XyzHint, XyzHint) {
        (XyzHint::ZERO, XyzHint::ZERO)
    }

    /// Total overlap implied by `context`, keeping its tagging
    fn overlap(&self) -> XyzHint {
        let (front, back) = self.context();
        front.sum(&back)
    }

    /// If false, no halo is cropped on tile sides that lie on the border of
    /// the processed volume.
    fn crop_at_borders(&self) -> bool {
        true
    }

    /// True if only the geometry and type of the input matter, not its
    /// contents. Callers may then pass placeholder data.
    fn ignores_input_data(&self) -> bool {
        false
    }

    /// Box `process` will return for a given input box.
    ///
    /// Resampling processors must keep this monotone: mapping two adjacent
    /// input boxes has to give two adjacent output boxes, since the caller
    /// also maps cropped tile boxes through it.
    fn expected_output_box(&self, bbox: &BoundingBox) -> BoundingBox {
        *bbox
    }

    /// Tile starts and strides must be multiples of this, per axis
    fn subvolume_alignment(&self) -> Xyz {
        [1, 1, 1]
    }

    /// Check constructor arguments before any tile is processed
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Fix the tile size and overlap this processor will run with.
    ///
    /// If `overlap` equals [`Processor::overlap`] the processor's own,
    /// possibly asymmetric, context is used. Otherwise the overlap is split
    /// evenly with any odd remainder going to the back. An overlap below
    /// the processor's minimum is rejected.
    fn set_effective_subvol_and_overlap(
        &self,
        subvol_size: Xyz,
        overlap: Xyz,
    ) -> Result<EffectiveConfig> {
        EffectiveConfig::new(self, subvol_size, overlap)
    }
}

/// Front and back halo, XYZ order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Context {
    pub front: Xyz,
    pub back: Xyz,
}

impl Context {
    pub fn new(front: Xyz, back: Xyz) -> Self {
        Self { front, back }
    }

    /// Even split of a total overlap, remainder to the back
    pub fn split(overlap: Xyz) -> Self {
        let front = [overlap[0] / 2, overlap[1] / 2, overlap[2] / 2];
        let back = [
            overlap[0] - front[0],
            overlap[1] - front[1],
            overlap[2] - front[2],
        ];
        Self { front, back }
    }

    pub fn total(&self) -> Xyz {
        [
            self.front[0] + self.back[0],
            self.front[1] + self.back[1],
            self.front[2] + self.back[2],
        ]
    }
}

/// Tile size, overlap and halo a processor runs with.
///
/// Produced once by [`Processor::set_effective_subvol_and_overlap`];
/// read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveConfig {
    subvol_size: Xyz,
    overlap: Xyz,
    context: Context,
    crop_at_borders: bool,
}

impl EffectiveConfig {
    pub fn new<P: Processor + ?Sized>(processor: &P, subvol_size: Xyz, overlap: Xyz) -> Result<Self> {
        if subvol_size.iter().any(|&s| s <= 0) {
            return Err(ProcessingError::Configuration(format!(
                "subvolume size must be positive, got {:?}",
                subvol_size
            )));
        }
        if overlap.iter().any(|&o| o < 0) {
            return Err(ProcessingError::Configuration(format!(
                "overlap must be non-negative, got {:?}",
                overlap
            )));
        }

        let (declared_front, declared_back) = processor.context();
        if declared_front
            .values()
            .iter()
            .chain(declared_back.values().iter())
            .any(|&c| c < 0)
        {
            return Err(ProcessingError::Configuration(format!(
                "processor {} declares negative context {:?} / {:?}",
                processor.name(),
                declared_front.values(),
                declared_back.values()
            )));
        }

        let declared = processor.overlap().values();
        if (0..3).any(|i| overlap[i] < declared[i]) {
            return Err(ProcessingError::InsufficientOverlap {
                assigned: overlap,
                required: declared,
            });
        }

        let context = if overlap == declared {
            let (front, back) = processor.context();
            Context::new(front.values(), back.values())
        } else {
            Context::split(overlap)
        };
        let total = context.total();
        if (0..3).any(|i| total[i] > subvol_size[i]) {
            return Err(ProcessingError::DegenerateCrop {
                front: context.front,
                back: context.back,
                size: subvol_size,
            });
        }

        debug!(
            "{}: subvolume {:?}, overlap {:?}, context front {:?} back {:?}",
            processor.name(),
            subvol_size,
            overlap,
            context.front,
            context.back
        );

        Ok(Self {
            subvol_size,
            overlap,
            context,
            crop_at_borders: processor.crop_at_borders(),
        })
    }

    pub fn subvol_size(&self) -> Xyz {
        self.subvol_size
    }

    pub fn overlap(&self) -> Xyz {
        self.overlap
    }

    pub fn context(&self) -> Context {
        self.context
    }

    pub fn crop_at_borders(&self) -> bool {
        self.crop_at_borders
    }

    /// Halo to remove from `bbox`, with border sides zeroed when the
    /// processor does not crop at borders.
    pub fn context_for_box(&self, bbox: &BoundingBox) -> Context {
        let mut context = self.context;
        if !self.crop_at_borders {
            let border_start = bbox.is_border_start();
            let border_end = bbox.is_border_end();
            for axis in 0..3 {
                if border_start[axis] {
                    context.front[axis] = 0;
                }
                if border_end[axis] {
                    context.back[axis] = 0;
                }
            }
        }
        context
    }

    /// `bbox` with its halo removed
    pub fn crop_box(&self, bbox: &BoundingBox) -> Result<BoundingBox> {
        let context = self.context_for_box(bbox);
        let size = bbox.size();
        let total = context.total();
        if (0..3).any(|i| total[i] > size[i]) {
            return Err(ProcessingError::DegenerateCrop {
                front: context.front,
                back: context.back,
                size,
            });
        }
        let back = context.back;
        bbox.adjusted_by(context.front, [-back[0], -back[1], -back[2]])
    }

    /// Crop both `bbox` and the matching (C, Z, Y, X) `data`
    pub fn crop_box_and_data(&self, bbox: &BoundingBox, data: &VoxelArray) -> Result<Subvolume> {
        check_geometry(data, bbox)?;
        let cropped_box = self.crop_box(bbox)?;
        let context = self.context_for_box(bbox);
        let front = to_zyx(context.front);
        let back = to_zyx(context.back);
        let cropped = data.crop_spatial(front, back)?;
        Subvolume::new(cropped, cropped_box)
    }

    /// Convenience wrapper over [`EffectiveConfig::crop_box_and_data`]
    pub fn crop_subvolume(&self, subvol: &Subvolume) -> Result<Subvolume> {
        self.crop_box_and_data(subvol.bbox(), subvol.data())
    }

    /// Output-space box kept from the tile `input_box`: the cropped input
    /// box mapped through [`Processor::expected_output_box`].
    pub fn crop_output_box<P: Processor + ?Sized>(
        &self,
        processor: &P,
        input_box: &BoundingBox,
    ) -> Result<BoundingBox> {
        Ok(processor.expected_output_box(&self.crop_box(input_box)?))
    }

    /// Crop `output`, produced by `processor` from the tile `input_box`.
    ///
    /// Processors that keep geometry are cropped by the context directly.
    /// For resampling processors the context is measured in input voxels,
    /// so the kept region is taken from [`EffectiveConfig::crop_output_box`].
    pub fn crop_output<P: Processor + ?Sized>(
        &self,
        processor: &P,
        input_box: &BoundingBox,
        output: &Subvolume,
    ) -> Result<Subvolume> {
        let expected = processor.expected_output_box(input_box);
        if *output.bbox() != expected {
            return Err(ProcessingError::GeometryMismatch(format!(
                "{} returned {}, expected {}",
                processor.name(),
                output.bbox(),
                expected
            )));
        }
        if expected == *input_box {
            return self.crop_box_and_data(input_box, output.data());
        }

        let kept = self.crop_output_box(processor, input_box)?;
        let offset = expected.zyx_offset_of(&kept)?;
        let data = output.data().extract(offset, kept.zyx_shape())?;
        Subvolume::new(data, kept)
    }
}

fn to_zyx(v: Xyz) -> [usize; 3] {
    [v[2] as usize, v[1] as usize, v[0] as usize]
}
