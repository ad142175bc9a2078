//! Engine configuration

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Directory backing the engine's named files.
    pub work_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            work_dir: std::env::temp_dir().join("nexus_media"),
        }
    }
}
