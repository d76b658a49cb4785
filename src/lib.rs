//! Voltile - halo-aware tiling for volumetric data
//!
//! Large 3D volumes (electron microscopy stacks, segmentations, probability
//! maps) are processed as overlapping tiles. Each tile carries extra context
//! around its core so that neighbourhood operations stay correct at tile
//! seams; after processing, the context is cropped away and the cropped
//! tiles fit together without gaps.
//!
//! # Features
//!
//! - [`Processor`] trait with declared context, tile size and output shape
//! - Overlap reconciliation into an immutable [`EffectiveConfig`]
//! - Border-aware cropping of boxes and (C, Z, Y, X) arrays
//! - Processor registry with built-in filters, configured from JSON
//! - Async tiling driver over pluggable volume stores
//!
//! Box coordinates are XYZ; arrays are laid out (channel, Z, Y, X).
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use voltile::{BoundingBox, DataType, MemoryVolumeStore, VolumeProcessor, VolumeStore};
//! use voltile::processors::MeanFilter;
//!
//! # async fn example(input: Arc<dyn VolumeStore>) -> voltile::Result<()> {
//! let bounds = input.bounds();
//! let output: Arc<dyn VolumeStore> =
//!     Arc::new(MemoryVolumeStore::zeros(bounds, DataType::F32, 1));
//! let runner = VolumeProcessor::new(
//!     Arc::new(MeanFilter::new(2)),
//!     vec![bounds],
//!     [128, 128, 64],
//!     [4, 4, 4],
//!     4,
//! )?;
//! let summary = runner.run(input, &[output]).await?;
//! println!("{}", summary);
//! # Ok(())
//! # }
//! ```

pub mod bounding_box;
pub mod codec;
pub mod config;
pub mod error;
pub mod io;
pub mod metadata;
pub mod pipeline;
pub mod processor;
pub mod processors;
pub mod registry;
pub mod store;
pub mod subvolume;
pub mod tiling;
pub mod types;
pub mod utils;

// Re-exports
pub use bounding_box::BoundingBox;
pub use codec::ChunkCodec;
pub use config::{ProcessVolumeConfig, VolumeDescriptor};
pub use error::{ProcessingError, Result};
pub use io::{create_io_manager, IOManager, StorageBackend};
pub use metadata::{Volume, VolumeMetadata};
pub use pipeline::{ProcessingSummary, VolumeProcessor};
pub use processor::{Context, EffectiveConfig, ProcessOutput, Processor};
pub use registry::{ProcessorConfig, ProcessorRegistry};
pub use store::{ChunkStore, MemoryVolumeStore, VolumeStore};
pub use subvolume::{Subvolume, VoxelArray};
pub use tiling::BoxGenerator;
pub use types::{DataType, OutputNum, PixelSize, Xyz, XyzHint};

/// Version of the voltile crate
pub const VOLTILE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VOLTILE_VERSION.is_empty());
    }
}
