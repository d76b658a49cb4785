//! End-to-end runs of the tiling driver from a JSON job description

use ndarray::Array4;
use std::sync::Arc;
use tempfile::TempDir;
use voltile::io::FileSystemIOManager;
use voltile::{
    BoundingBox, ChunkCodec, DataType, MemoryVolumeStore, PixelSize,
    ProcessOutput, ProcessVolumeConfig, ProcessingError, Processor, ProcessorRegistry, Volume,
    VolumeMetadata, VolumeProcessor, VolumeStore, VoxelArray,
};

const JOB: &str = r#"{
    "input_volume": {"path": "raw", "data_type": "u8", "volume_size": [24, 20, 12]},
    "output_volume": {"path": "smooth", "data_type": "f32", "volume_size": [24, 20, 12]},
    "output_dir": "jobs/smooth",
    "bounding_boxes": [{"start": [0, 0, 0], "size": [24, 20, 12]}],
    "processor": {"name": "MeanFilter", "args": {"radius": 1, "crop_at_borders": false}},
    "subvolume_size": [10, 10, 8],
    "overlap": [2, 2, 2],
    "batch_size": 3
}"#;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn raw_volume(bounds: BoundingBox) -> MemoryVolumeStore {
    let [z, y, x] = bounds.zyx_shape();
    let data = Array4::from_shape_fn([1, z, y, x], |(_, z, y, x)| ((x * x + 3 * y + 11 * z) % 256) as u8);
    MemoryVolumeStore::new(data, bounds).unwrap()
}

#[tokio::test]
async fn test_mean_filter_job_writes_seamless_chunks() {
    init_logging();
    let config = ProcessVolumeConfig::from_json_str(JOB).unwrap();
    let registry = ProcessorRegistry::with_builtins();
    let runner = VolumeProcessor::from_config(&config, &registry).unwrap();
    assert_eq!(runner.processor().name(), "MeanFilter_r1");

    let bounds = config.input_volume.bounds().unwrap();
    let input: Arc<dyn VolumeStore> = Arc::new(raw_volume(bounds));

    let temp_dir = TempDir::new().unwrap();
    let mut descriptor = config.output_volume.clone();
    descriptor.path = format!("file://{}", temp_dir.path().join("smooth").display());
    let output = Arc::new(descriptor.open_store().unwrap().with_codec(ChunkCodec::Zstd, 3));
    let outputs: Vec<Arc<dyn VolumeStore>> = vec![output.clone()];

    let summary = runner.run(Arc::clone(&input), &outputs).await.unwrap();
    let tiles = runner.tiles().unwrap();
    assert_eq!(summary.tiles, tiles.len());
    assert_eq!(summary.voxels_written, bounds.volume());
    assert_eq!(output.list_chunks().await.unwrap().len(), tiles.len());

    let whole = match runner.processor().process(input.read(&bounds).await.unwrap()).unwrap() {
        ProcessOutput::Single(subvol) => subvol,
        ProcessOutput::Multi(_) => panic!("expected a single output"),
    };
    let mut assembled = VoxelArray::zeros(DataType::F32, [1, 12, 20, 24]);
    for tile in &tiles {
        let cropped = runner.effective().crop_box(tile).unwrap();
        let chunk = output.read(&cropped).await.unwrap();
        assembled
            .paste(bounds.zyx_offset_of(&cropped).unwrap(), chunk.data())
            .unwrap();
    }
    assert_eq!(&assembled, whole.data());
}

#[tokio::test]
async fn test_job_metadata_written_next_to_output() {
    init_logging();
    let config = ProcessVolumeConfig::from_json_str(
        &JOB.replace(r#""name": "MeanFilter", "args": {"radius": 1, "crop_at_borders": false}"#,
            r#""name": "DownsampleXy", "args": {"factor": 2}"#)
            .replace(r#""overlap": [2, 2, 2]"#, r#""overlap": [0, 0, 0]"#),
    )
    .unwrap();
    let runner = VolumeProcessor::from_config(&config, &ProcessorRegistry::with_builtins()).unwrap();

    let temp_dir = TempDir::new().unwrap();
    let io = FileSystemIOManager::new(temp_dir.path());
    let input_meta = VolumeMetadata::new(
        config.input_volume.volume_size,
        PixelSize::new(8.0, 8.0, 40.0),
        config.bounding_boxes.clone(),
    )
    .with_data_type(config.input_volume.data_type);

    runner
        .save_output_metadata(&config.output_volume.path, &input_meta, &io)
        .await
        .unwrap();
    let loaded = Volume::load(&config.output_volume.path, &io).await.unwrap();
    assert_eq!(loaded.meta.volume_size, [12, 10, 12]);
    assert_eq!(loaded.meta.pixel_size, PixelSize::new(16.0, 16.0, 40.0));
    assert_eq!(loaded.meta.data_type, Some(DataType::U8));
}

#[test]
fn test_job_with_too_little_overlap_is_rejected() {
    let config =
        ProcessVolumeConfig::from_json_str(&JOB.replace(r#""overlap": [2, 2, 2]"#, r#""overlap": [2, 0, 2]"#))
            .unwrap();
    let err = VolumeProcessor::from_config(&config, &ProcessorRegistry::with_builtins())
        .err()
        .unwrap();
    assert!(matches!(err, ProcessingError::InsufficientOverlap { .. }));
    assert!(err.is_configuration());
}
