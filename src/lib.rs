//! nexus_media - declarative video edits compiled to FFmpeg runs
//!
//! Turns a set of independent edit options (trim, aspect crop, color grade,
//! auto-enhance, caption, voice effect, sticker overlay) into one ordered
//! FFmpeg argument list, coordinates the engine session that runs it, and
//! cuts transparent stickers from photos by corner-color segmentation.
//! Exports shell out to the system `ffmpeg` binary (LGPL-safe, no linking).

mod args;
mod config;
mod engine;
mod error;
mod export;
mod ffmpeg;
mod filters;
mod pipeline;
mod progress;
mod request;
mod segment;
mod validation;

pub mod metrics;
pub mod organ;
pub mod presets;

pub use args::{assemble, EngineArguments, InputNames};
pub use config::EngineConfig;
pub use engine::{EngineLifecycle, EngineState, MediaEngine, RatioCallback};
pub use error::{MediaError, Result};
pub use export::{plan, EditSession, ExportedAsset};
pub use ffmpeg::{FfmpegCommand, FfmpegEngine, FfmpegError};
pub use filters::{
    resolve_color_filter, resolve_crop, resolve_enhance_chain, resolve_voice_effect, AspectRatio,
    AudioFragment, ColorFilter, Fragment, FragmentKind, TextOverlay, VoiceEffect,
};
pub use pipeline::{compile, CompiledPipeline};
pub use progress::{ProgressTracker, Status, StatusSink};
pub use request::{normalize_trim, EditRequest, Position, StickerAsset};
pub use segment::{
    color_distance, fit_width, is_background, make_sticker, segment, RgbColor,
    SegmentationResult, Sticker,
};
