//! Utility functions

use crate::bounding_box::BoundingBox;

/// Integer division rounding up, for non-negative numerator and positive divisor
pub fn ceil_div(numerator: i64, divisor: i64) -> i64 {
    debug_assert!(numerator >= 0 && divisor > 0);
    (numerator + divisor - 1) / divisor
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Storage key for the chunk holding exactly `bbox`
pub fn chunk_path(bbox: &BoundingBox) -> String {
    let start = bbox.start();
    let size = bbox.size();
    format!(
        "chunks/{}_{}_{}-{}_{}_{}.chunk",
        start[0], start[1], start[2], size[0], size[1], size[2]
    )
}

/// Path of the JSON metadata file stored next to a volume
pub fn metadata_path(volume_path: &std::path::Path) -> std::path::PathBuf {
    let stem = volume_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = format!("{}.metadata.json", stem);
    match volume_path.parent() {
        Some(parent) => parent.join(file_name),
        None => std::path::PathBuf::from(file_name),
    }
}
