//! Job configuration for processing a volume

use crate::bounding_box::BoundingBox;
use crate::error::{ProcessingError, Result};
use crate::io::create_io_manager;
use crate::registry::ProcessorConfig;
use crate::store::ChunkStore;
use crate::types::{DataType, Xyz};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn default_batch_size() -> usize {
    1
}

fn default_num_channels() -> usize {
    1
}

/// Where a volume lives and what it holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeDescriptor {
    /// Location of the volume (path, `file://` or `memory://` URL)
    pub path: String,

    pub data_type: DataType,

    #[serde(default = "default_num_channels")]
    pub num_channels: usize,

    /// Extent in voxels, XYZ order
    pub volume_size: Xyz,
}

impl VolumeDescriptor {
    /// The whole volume as a box anchored at the origin
    pub fn bounds(&self) -> Result<BoundingBox> {
        BoundingBox::new([0, 0, 0], self.volume_size)
    }

    /// Open the chunk store at `path` with this volume's layout
    pub fn open_store(&self) -> Result<ChunkStore> {
        let io = Arc::from(create_io_manager(&self.path)?);
        Ok(ChunkStore::new(
            io,
            self.bounds()?,
            self.data_type,
            self.num_channels,
        ))
    }
}

/// A complete processing job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessVolumeConfig {
    pub input_volume: VolumeDescriptor,

    pub output_volume: VolumeDescriptor,

    /// Directory for metadata and job artifacts
    pub output_dir: PathBuf,

    /// Regions of the input to process
    pub bounding_boxes: Vec<BoundingBox>,

    pub processor: ProcessorConfig,

    /// Tile size, XYZ order
    pub subvolume_size: Xyz,

    /// Total overlap between neighbouring tiles, XYZ order
    pub overlap: Xyz,

    /// Number of tiles processed concurrently
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl ProcessVolumeConfig {
    /// Parse and validate a JSON config
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ProcessingError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.subvolume_size.iter().any(|&s| s <= 0) {
            return Err(ProcessingError::Configuration(format!(
                "subvolume_size must be positive, got {:?}",
                self.subvolume_size
            )));
        }
        if self.overlap.iter().any(|&o| o < 0) {
            return Err(ProcessingError::Configuration(format!(
                "overlap must be non-negative, got {:?}",
                self.overlap
            )));
        }
        if self.bounding_boxes.is_empty() {
            return Err(ProcessingError::Configuration(
                "at least one bounding box is required".to_string(),
            ));
        }
        for descriptor in [&self.input_volume, &self.output_volume] {
            if descriptor.num_channels == 0 {
                return Err(ProcessingError::Configuration(format!(
                    "volume {} has no channels",
                    descriptor.path
                )));
            }
            descriptor.bounds()?;
        }

        let input_bounds = self.input_volume.bounds()?;
        for bbox in &self.bounding_boxes {
            // Deserialization bypasses the constructor checks
            BoundingBox::new(bbox.start(), bbox.size())?;
            if !input_bounds.contains(bbox) {
                return Err(ProcessingError::Configuration(format!(
                    "{} lies outside the input volume {}",
                    bbox, input_bounds
                )));
            }
        }
        Ok(())
    }
}
