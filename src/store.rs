//! Volume stores: where tiles are read from and results written to

use crate::bounding_box::BoundingBox;
use crate::codec::ChunkCodec;
use crate::error::{ProcessingError, Result};
use crate::io::IOManager;
use crate::subvolume::{check_geometry, Subvolume, VoxelArray};
use crate::types::DataType;
use crate::utils::chunk_path;
use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Box-addressed access to a volume
#[async_trait]
pub trait VolumeStore: Send + Sync {
    /// Element type of the stored data
    fn data_type(&self) -> DataType;

    fn num_channels(&self) -> usize;

    /// Extent of the stored volume
    fn bounds(&self) -> BoundingBox;

    /// Materialize the data covering `bbox`
    async fn read(&self, bbox: &BoundingBox) -> Result<Subvolume>;

    /// Persist `subvol` at its box
    async fn write(&self, subvol: &Subvolume) -> Result<()>;
}

fn check_compatible(store: &dyn VolumeStore, subvol: &Subvolume) -> Result<()> {
    if subvol.data_type() != store.data_type() {
        return Err(ProcessingError::DataTypeMismatch {
            expected: store.data_type(),
            actual: subvol.data_type(),
        });
    }
    if subvol.num_channels() != store.num_channels() {
        return Err(ProcessingError::GeometryMismatch(format!(
            "subvolume has {} channels, store holds {}",
            subvol.num_channels(),
            store.num_channels()
        )));
    }
    if !store.bounds().contains(subvol.bbox()) {
        return Err(ProcessingError::OutOfBounds(format!(
            "{} outside store bounds {}",
            subvol.bbox(),
            store.bounds()
        )));
    }
    Ok(())
}

/// A whole volume held in memory
pub struct MemoryVolumeStore {
    bounds: BoundingBox,
    data: RwLock<VoxelArray>,
}

impl MemoryVolumeStore {
    /// Wrap existing data covering `bounds`
    pub fn new(data: impl Into<VoxelArray>, bounds: BoundingBox) -> Result<Self> {
        let data = data.into();
        check_geometry(&data, &bounds)?;
        Ok(Self {
            bounds,
            data: RwLock::new(data),
        })
    }

    /// Zero-filled store
    pub fn zeros(bounds: BoundingBox, data_type: DataType, num_channels: usize) -> Self {
        let [z, y, x] = bounds.zyx_shape();
        Self {
            bounds,
            data: RwLock::new(VoxelArray::zeros(data_type, [num_channels, z, y, x])),
        }
    }

    /// Copy of the full volume
    pub fn snapshot(&self) -> VoxelArray {
        self.data.read().clone()
    }
}

#[async_trait]
impl VolumeStore for MemoryVolumeStore {
    fn data_type(&self) -> DataType {
        self.data.read().data_type()
    }

    fn num_channels(&self) -> usize {
        self.data.read().num_channels()
    }

    fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    async fn read(&self, bbox: &BoundingBox) -> Result<Subvolume> {
        let offset = self.bounds.zyx_offset_of(bbox)?;
        let data = self.data.read().extract(offset, bbox.zyx_shape())?;
        Subvolume::new(data, *bbox)
    }

    async fn write(&self, subvol: &Subvolume) -> Result<()> {
        check_compatible(self, subvol)?;
        let offset = self.bounds.zyx_offset_of(subvol.bbox())?;
        self.data.write().paste(offset, subvol.data())
    }
}

/// Header stored in front of each chunk payload
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChunkHeader {
    start: [i64; 3],
    size: [i64; 3],
    data_type: DataType,
    num_channels: usize,
    codec: ChunkCodec,
    payload_len: usize,
}

/// Persists every written subvolume as one encoded chunk.
///
/// Each chunk is `[u32 LE header length][bincode header][payload]`, keyed by
/// its box. Only boxes that were written can be read back.
pub struct ChunkStore {
    io: Arc<dyn IOManager>,
    bounds: BoundingBox,
    data_type: DataType,
    num_channels: usize,
    codec: ChunkCodec,
    level: u8,
}

impl ChunkStore {
    pub fn new(
        io: Arc<dyn IOManager>,
        bounds: BoundingBox,
        data_type: DataType,
        num_channels: usize,
    ) -> Self {
        Self {
            io,
            bounds,
            data_type,
            num_channels,
            codec: ChunkCodec::default(),
            level: 3,
        }
    }

    /// Set the payload codec and its level
    pub fn with_codec(mut self, codec: ChunkCodec, level: u8) -> Self {
        self.codec = codec;
        self.level = level;
        self
    }

    /// Names of all chunks written so far
    pub async fn list_chunks(&self) -> Result<Vec<String>> {
        self.io.list("chunks").await
    }

    fn encode_chunk(&self, subvol: &Subvolume) -> Result<Vec<u8>> {
        let raw = subvol.data().to_le_bytes();
        let payload = self.codec.encode(&raw, self.level)?;
        let header = ChunkHeader {
            start: subvol.bbox().start(),
            size: subvol.bbox().size(),
            data_type: subvol.data_type(),
            num_channels: subvol.num_channels(),
            codec: self.codec,
            payload_len: raw.len(),
        };
        let header_bytes = bincode::serialize(&header)?;
        let header_len = u32::try_from(header_bytes.len())
            .map_err(|_| ProcessingError::Serialization("chunk header too large".to_string()))?;

        let mut chunk = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        chunk.extend_from_slice(&header_len.to_le_bytes());
        chunk.extend_from_slice(&header_bytes);
        chunk.extend_from_slice(&payload);
        Ok(chunk)
    }

    fn decode_chunk(bytes: &[u8]) -> Result<Subvolume> {
        let truncated = || ProcessingError::Serialization("truncated chunk".to_string());
        let len_bytes: [u8; 4] = bytes
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(truncated)?;
        let header_len = u32::from_le_bytes(len_bytes) as usize;
        let header_bytes = bytes.get(4..4 + header_len).ok_or_else(truncated)?;
        let header: ChunkHeader = bincode::deserialize(header_bytes)?;

        let raw = header
            .codec
            .decode(&bytes[4 + header_len..], Some(header.payload_len))?;
        let bbox = BoundingBox::new(header.start, header.size)?;
        let [z, y, x] = bbox.zyx_shape();
        let data = VoxelArray::from_le_bytes(header.data_type, [header.num_channels, z, y, x], &raw)?;
        Subvolume::new(data, bbox)
    }
}

#[async_trait]
impl VolumeStore for ChunkStore {
    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn num_channels(&self) -> usize {
        self.num_channels
    }

    fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    async fn read(&self, bbox: &BoundingBox) -> Result<Subvolume> {
        let bytes = self.io.read(&chunk_path(bbox)).await?;
        Self::decode_chunk(&bytes)
    }

    async fn write(&self, subvol: &Subvolume) -> Result<()> {
        check_compatible(self, subvol)?;
        let chunk = self.encode_chunk(subvol)?;
        let path = chunk_path(subvol.bbox());
        debug!("Writing {} ({} bytes)", path, chunk.len());
        self.io.write(&path, &chunk).await
    }
}
