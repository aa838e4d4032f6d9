use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to open video source {location}: {source}")]
    Open {
        location: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("no video stream in {0}")]
    NoVideoStream(String),
    #[error("failed to decode video: {0}")]
    Decode(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("feed is already running")]
    AlreadyStarted,
}
