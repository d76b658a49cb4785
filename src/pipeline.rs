//! Tiling driver: runs a processor over every tile of a volume

use crate::bounding_box::BoundingBox;
use crate::config::ProcessVolumeConfig;
use crate::error::{ProcessingError, Result};
use crate::io::IOManager;
use crate::metadata::{Volume, VolumeMetadata};
use crate::processor::{EffectiveConfig, Processor};
use crate::registry::ProcessorRegistry;
use crate::store::VolumeStore;
use crate::subvolume::{Subvolume, VoxelArray};
use crate::tiling::BoxGenerator;
use crate::types::{OutputNum, Xyz, XyzHint};
use crate::utils::format_bytes;
use futures::future::try_join_all;
use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;

/// Counters reported after a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingSummary {
    /// Input tiles processed
    pub tiles: usize,
    /// Cropped subvolumes written
    pub output_subvolumes: usize,
    /// Spatial voxels written, summed over outputs
    pub voxels_written: u64,
    /// Uncompressed bytes written
    pub bytes_written: usize,
}

impl fmt::Display for ProcessingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tiles, {} output subvolumes, {} voxels ({})",
            self.tiles,
            self.output_subvolumes,
            self.voxels_written,
            format_bytes(self.bytes_written)
        )
    }
}

/// Runs one processor over a set of bounding boxes, tile by tile.
///
/// Tiles are cut with the effective overlap, read from an input store,
/// processed off the async runtime, cropped back to their share of the
/// volume and written to the output store(s).
pub struct VolumeProcessor {
    processor: Arc<dyn Processor>,
    effective: EffectiveConfig,
    bounding_boxes: Vec<BoundingBox>,
    batch_size: usize,
}

impl VolumeProcessor {
    pub fn new(
        processor: Arc<dyn Processor>,
        bounding_boxes: Vec<BoundingBox>,
        subvolume_size: Xyz,
        overlap: Xyz,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(ProcessingError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        processor.validate()?;
        let subvolume_size = Self::resolve_subvolume_size(processor.as_ref(), subvolume_size);
        let effective = processor.set_effective_subvol_and_overlap(subvolume_size, overlap)?;
        if (0..3).any(|i| overlap[i] >= subvolume_size[i]) {
            return Err(ProcessingError::Configuration(format!(
                "overlap {:?} must be smaller than subvolume size {:?}",
                overlap, subvolume_size
            )));
        }
        check_alignment(processor.as_ref(), &bounding_boxes, subvolume_size, overlap)?;
        Ok(Self {
            processor,
            effective,
            bounding_boxes,
            batch_size,
        })
    }

    /// Build the processor named in `config` and set up the run
    pub fn from_config(config: &ProcessVolumeConfig, registry: &ProcessorRegistry) -> Result<Self> {
        config.validate()?;
        let processor: Arc<dyn Processor> = Arc::from(registry.get_processor(&config.processor)?);
        info!(
            "Using processor {} for {} -> {}",
            processor.name(),
            config.input_volume.path,
            config.output_volume.path
        );
        Self::new(
            processor,
            config.bounding_boxes.clone(),
            config.subvolume_size,
            config.overlap,
            config.batch_size,
        )
    }

    /// Tile size to run with: a `Fixed` processor size wins over `configured`
    pub fn resolve_subvolume_size(processor: &dyn Processor, configured: Xyz) -> Xyz {
        match processor.subvolume_size() {
            Some(XyzHint::Fixed(size)) => {
                if size != configured {
                    warn!(
                        "{} requires subvolume size {:?}, ignoring configured {:?}",
                        processor.name(),
                        size,
                        configured
                    );
                }
                size
            }
            Some(XyzHint::Suggested(_)) | None => configured,
        }
    }

    pub fn processor(&self) -> &dyn Processor {
        self.processor.as_ref()
    }

    pub fn effective(&self) -> &EffectiveConfig {
        &self.effective
    }

    pub fn bounding_boxes(&self) -> &[BoundingBox] {
        &self.bounding_boxes
    }

    /// Every input tile, box by box, with border flags relative to its box
    pub fn tiles(&self) -> Result<Vec<BoundingBox>> {
        let mut tiles = Vec::new();
        for bbox in &self.bounding_boxes {
            let generator =
                BoxGenerator::new(*bbox, self.effective.subvol_size(), self.effective.overlap())?;
            tiles.extend(generator.iter());
        }
        Ok(tiles)
    }

    /// Tiles grouped into chunks of `batch_size`
    pub fn batches(&self) -> Result<Vec<Vec<BoundingBox>>> {
        Ok(self
            .tiles()?
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect())
    }

    /// Process and crop a single tile synchronously
    pub fn process_tile(&self, subvol: Subvolume) -> Result<Vec<Subvolume>> {
        let tile = *subvol.bbox();
        process_tile(self.processor.as_ref(), &self.effective, tile, subvol)
    }

    /// Process every tile from `input`, writing output `i` of each tile to
    /// `outputs[i]`.
    pub async fn run(
        &self,
        input: Arc<dyn VolumeStore>,
        outputs: &[Arc<dyn VolumeStore>],
    ) -> Result<ProcessingSummary> {
        self.check_outputs(input.as_ref(), outputs)?;
        let batches = self.batches()?;
        let num_tiles: usize = batches.iter().map(Vec::len).sum();
        info!(
            "Processing {} tiles in {} batches with {}",
            num_tiles,
            batches.len(),
            self.processor.name()
        );

        let mut summary = ProcessingSummary::default();
        for (batch_index, batch) in batches.into_iter().enumerate() {
            debug!("Batch {}: {} tiles", batch_index, batch.len());
            let futures: Vec<_> = batch
                .into_iter()
                .map(|tile| {
                    let input = Arc::clone(&input);
                    let processor = Arc::clone(&self.processor);
                    let effective = self.effective;

                    async move {
                        let subvol = if processor.ignores_input_data() {
                            let [z, y, x] = tile.zyx_shape();
                            let data =
                                VoxelArray::zeros(input.data_type(), [input.num_channels(), z, y, x]);
                            Subvolume::new(data, tile)?
                        } else {
                            input.read(&tile).await?
                        };
                        let cropped = tokio::task::spawn_blocking(move || {
                            process_tile(processor.as_ref(), &effective, tile, subvol)
                        })
                        .await??;
                        Ok::<_, ProcessingError>(cropped)
                    }
                })
                .collect();

            let results = try_join_all(futures).await?;
            for tile_outputs in results {
                summary.tiles += 1;
                for (index, subvol) in tile_outputs.iter().enumerate() {
                    let store = outputs.get(index).ok_or_else(|| {
                        ProcessingError::Configuration(format!(
                            "{} produced output {} but only {} output stores were given",
                            self.processor.name(),
                            index,
                            outputs.len()
                        ))
                    })?;
                    store.write(subvol).await?;
                    summary.output_subvolumes += 1;
                    summary.voxels_written += subvol.bbox().volume();
                    summary.bytes_written += subvol.data().len() * subvol.data_type().size_in_bytes();
                }
            }
        }

        info!("Finished {}: {}", self.processor.name(), summary);
        Ok(summary)
    }

    fn check_outputs(&self, input: &dyn VolumeStore, outputs: &[Arc<dyn VolumeStore>]) -> Result<()> {
        if outputs.is_empty() {
            return Err(ProcessingError::Configuration(
                "at least one output store is required".to_string(),
            ));
        }
        if self.processor.output_num() == OutputNum::Single && outputs.len() > 1 {
            warn!(
                "{} has a single output; {} extra output stores are unused",
                self.processor.name(),
                outputs.len() - 1
            );
        }

        let expected_type = self.processor.output_type(input.data_type());
        let expected_channels = self.processor.num_channels(input.num_channels());
        for store in outputs {
            if store.data_type() != expected_type {
                return Err(ProcessingError::DataTypeMismatch {
                    expected: expected_type,
                    actual: store.data_type(),
                });
            }
            if store.num_channels() != expected_channels {
                return Err(ProcessingError::GeometryMismatch(format!(
                    "output store holds {} channels, {} produces {}",
                    store.num_channels(),
                    self.processor.name(),
                    expected_channels
                )));
            }
        }
        Ok(())
    }

    /// Metadata of the output volume given the input's
    pub fn output_metadata(&self, input: &VolumeMetadata) -> Result<VolumeMetadata> {
        let whole = BoundingBox::new([0, 0, 0], input.volume_size)?;
        let mut meta = VolumeMetadata::new(
            self.processor.expected_output_box(&whole).size(),
            self.processor.pixelsize(input.pixel_size),
            self.bounding_boxes
                .iter()
                .map(|b| self.processor.expected_output_box(b))
                .collect(),
        );
        if let Some(data_type) = input.data_type {
            meta = meta.with_data_type(self.processor.output_type(data_type));
        }
        if let Some(channels) = input.num_channels {
            meta = meta.with_num_channels(self.processor.num_channels(channels));
        }
        Ok(meta)
    }

    /// Write the output volume's metadata next to `output_path`
    pub async fn save_output_metadata(
        &self,
        output_path: &str,
        input: &VolumeMetadata,
        io: &dyn IOManager,
    ) -> Result<Volume> {
        let volume = Volume::new(output_path, self.output_metadata(input)?);
        volume.save_metadata(io).await?;
        Ok(volume)
    }
}

/// Tile starts must land on the processor's alignment grid: every box start
/// and the stride between tiles.
fn check_alignment(
    processor: &dyn Processor,
    bounding_boxes: &[BoundingBox],
    subvolume_size: Xyz,
    overlap: Xyz,
) -> Result<()> {
    let align = processor.subvolume_alignment();
    if align.iter().any(|&a| a < 1) {
        return Err(ProcessingError::Configuration(format!(
            "{} declares invalid alignment {:?}",
            processor.name(),
            align
        )));
    }
    let stride = [
        subvolume_size[0] - overlap[0],
        subvolume_size[1] - overlap[1],
        subvolume_size[2] - overlap[2],
    ];
    if (0..3).any(|i| stride[i] % align[i] != 0) {
        return Err(ProcessingError::Configuration(format!(
            "tile stride {:?} is not a multiple of {:?} required by {}",
            stride,
            align,
            processor.name()
        )));
    }
    for bbox in bounding_boxes {
        let start = bbox.start();
        if (0..3).any(|i| start[i].rem_euclid(align[i]) != 0) {
            return Err(ProcessingError::Configuration(format!(
                "{} does not start on the {:?} grid required by {}",
                bbox,
                align,
                processor.name()
            )));
        }
    }
    Ok(())
}

/// Run `processor` on one tile and crop every result back to the tile's
/// share of the output volume.
fn process_tile(
    processor: &dyn Processor,
    effective: &EffectiveConfig,
    tile: BoundingBox,
    subvol: Subvolume,
) -> Result<Vec<Subvolume>> {
    processor
        .process(subvol)?
        .into_vec()
        .iter()
        .map(|out| effective.crop_output(processor, &tile, out))
        .collect()
}
