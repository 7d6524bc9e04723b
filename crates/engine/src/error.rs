use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open image {path}: {source}")]
    OpenImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image {path}: {source}")]
    DecodeImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(
        "collision map {collision} is {collision_size:?} but visual map {visual} is {visual_size:?}"
    )]
    MapSizeMismatch {
        visual: PathBuf,
        visual_size: (u32, u32),
        collision: PathBuf,
        collision_size: (u32, u32),
    },
    #[error("occupancy length mismatch: expected {expected}, got {actual}")]
    OccupancyLength { expected: usize, actual: usize },
    #[error("pixel buffer length mismatch: expected {expected} bytes, got {actual}")]
    PixelBufferLength { expected: usize, actual: usize },
    #[error("behavior module '{name}' could not be found")]
    ModuleNotFound { name: String },
    #[error("behavior module '{name}' does not export a factory")]
    MissingFactory { name: String },
}
