//! Metadata for volumetric data

use crate::bounding_box::BoundingBox;
use crate::error::{ProcessingError, Result};
use crate::io::IOManager;
use crate::types::{DataType, PixelSize, Xyz};
use crate::utils::metadata_path;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Metadata associated with a volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeMetadata {
    /// Volume size in voxels, XYZ order
    pub volume_size: Xyz,

    /// Voxel size in nm, XYZ order
    pub pixel_size: PixelSize,

    /// Regions of the volume holding valid data
    pub bounding_boxes: Vec<BoundingBox>,

    /// Element type, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,

    /// Channel count, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_channels: Option<usize>,
}

impl VolumeMetadata {
    /// Create new metadata
    pub fn new(volume_size: Xyz, pixel_size: PixelSize, bounding_boxes: Vec<BoundingBox>) -> Self {
        Self {
            volume_size,
            pixel_size,
            bounding_boxes,
            data_type: None,
            num_channels: None,
        }
    }

    /// Set the element type
    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    /// Set the channel count
    pub fn with_num_channels(mut self, num_channels: usize) -> Self {
        self.num_channels = Some(num_channels);
        self
    }

    /// Scale volume size, pixel size and boxes by per-axis factors.
    ///
    /// Sizes are multiplied (truncating) and pixel sizes divided, so a factor
    /// of 0.5 halves the voxel count and doubles the voxel size.
    pub fn scale(&self, factors: [f64; 3]) -> Result<Self> {
        if factors.iter().any(|f| !f.is_finite() || *f <= 0.0) {
            return Err(ProcessingError::Configuration(format!(
                "scale factors must be positive, got {:?}",
                factors
            )));
        }
        let mut volume_size = [0; 3];
        let mut pixel_size = [0.0; 3];
        for axis in 0..3 {
            volume_size[axis] = (self.volume_size[axis] as f64 * factors[axis]) as i64;
            pixel_size[axis] = self.pixel_size.0[axis] / factors[axis];
        }
        let bounding_boxes = self
            .bounding_boxes
            .iter()
            .map(|b| b.scale(factors))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            volume_size,
            pixel_size: PixelSize(pixel_size),
            bounding_boxes,
            data_type: self.data_type,
            num_channels: self.num_channels,
        })
    }

    /// Scale X and Y by `factor`, leaving Z untouched
    pub fn scale_xy(&self, factor: f64) -> Result<Self> {
        self.scale([factor, factor, 1.0])
    }
}

/// A volume location together with its metadata
#[derive(Debug, Clone)]
pub struct Volume {
    pub path: PathBuf,
    pub meta: VolumeMetadata,
}

impl Volume {
    pub fn new(path: impl AsRef<Path>, meta: VolumeMetadata) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            meta,
        }
    }

    /// Where the metadata JSON lives: `<parent>/<stem>.metadata.json`
    pub fn metadata_path(&self) -> PathBuf {
        metadata_path(&self.path)
    }

    /// Write the metadata as pretty JSON through `io`
    pub async fn save_metadata(&self, io: &dyn IOManager) -> Result<()> {
        let path = self.metadata_path();
        let json = serde_json::to_vec_pretty(&self.meta)?;
        io.write(&path.to_string_lossy(), &json).await?;
        info!("Wrote volume metadata to {}", path.display());
        Ok(())
    }

    /// Read back metadata written by [`Volume::save_metadata`]
    pub async fn load(path: impl AsRef<Path>, io: &dyn IOManager) -> Result<Self> {
        let path = path.as_ref();
        let bytes = io.read(&metadata_path(path).to_string_lossy()).await?;
        let meta: VolumeMetadata = serde_json::from_slice(&bytes)?;
        Ok(Self::new(path, meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{FileSystemIOManager, MemoryIOManager};
    use tempfile::TempDir;

    fn create_test_metadata() -> VolumeMetadata {
        VolumeMetadata::new(
            [1000, 800, 300],
            PixelSize::new(8.0, 8.0, 33.0),
            vec![BoundingBox::new([0, 0, 0], [1000, 800, 300]).unwrap()],
        )
        .with_data_type(DataType::U8)
    }

    #[test]
    fn test_scale_xy() {
        let meta = create_test_metadata();
        let scaled = meta.scale_xy(0.5).unwrap();
        assert_eq!(scaled.volume_size, [500, 400, 300]);
        assert_eq!(scaled.pixel_size, PixelSize::new(16.0, 16.0, 33.0));
        assert_eq!(scaled.bounding_boxes[0].size(), [500, 400, 300]);
        assert_eq!(scaled.data_type, Some(DataType::U8));
    }

    #[test]
    fn test_scale_rejects_non_positive() {
        let meta = create_test_metadata();
        assert!(meta.scale([0.0, 1.0, 1.0]).is_err());
        assert!(meta.scale([1.0, f64::NAN, 1.0]).is_err());
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(create_test_metadata()).unwrap();
        assert_eq!(json["volume_size"], serde_json::json!([1000, 800, 300]));
        assert_eq!(json["pixel_size"], serde_json::json!([8.0, 8.0, 33.0]));
        assert!(json.get("num_channels").is_none());
    }

    #[tokio::test]
    async fn test_save_and_load_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let io = FileSystemIOManager::new(temp_dir.path());
        let volume = Volume::new("outputs/segmentation", create_test_metadata());
        volume.save_metadata(&io).await.unwrap();

        assert!(temp_dir
            .path()
            .join("outputs/segmentation.metadata.json")
            .exists());

        let loaded = Volume::load("outputs/segmentation", &io).await.unwrap();
        assert_eq!(loaded.meta, volume.meta);
    }

    #[tokio::test]
    async fn test_load_missing_metadata() {
        let io = MemoryIOManager::new();
        assert!(matches!(
            Volume::load("nowhere", &io).await,
            Err(ProcessingError::NotFound(_))
        ));
    }
}
