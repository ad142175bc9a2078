use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Export failed: {0}")]
    ExecutionFailure(#[from] crate::ffmpeg::FfmpegError),

    #[error("An export is already running on this session")]
    ExportInProgress,

    #[error("No image selected")]
    SegmentationInputMissing,

    #[error("Invalid pixel buffer: {0}")]
    InvalidPixelBuffer(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MediaError>;
