//! FFmpeg command builder and the system-binary engine

use crate::args::EngineArguments;
use crate::config::EngineConfig;
use crate::engine::{MediaEngine, RatioCallback};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FfmpegError {
    #[error("FFmpeg not found: {0}")]
    NotInstalled(String),

    #[error("FFmpeg execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Invalid output: {0}")]
    InvalidOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ordered token builder for one engine invocation.
pub struct FfmpegCommand {
    args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new() -> Self {
        Self { args: Vec::new() }
    }

    pub fn input(mut self, name: &str) -> Self {
        self.args.push("-i".to_string());
        self.args.push(name.to_string());
        self
    }

    pub fn seek_start(self, seconds: f64) -> Self {
        self.flag("-ss", &format_seconds(seconds))
    }

    pub fn seek_end(self, seconds: f64) -> Self {
        self.flag("-to", &format_seconds(seconds))
    }

    pub fn video_filter(self, chain: &str) -> Self {
        self.flag("-vf", chain)
    }

    pub fn audio_filter(self, chain: &str) -> Self {
        self.flag("-af", chain)
    }

    pub fn filter_complex(self, graph: &str) -> Self {
        self.flag("-filter_complex", graph)
    }

    pub fn map(self, selector: &str) -> Self {
        self.flag("-map", selector)
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    pub fn output(mut self, name: &str) -> Self {
        self.args.push(name.to_string());
        self
    }

    pub fn build(self) -> EngineArguments {
        EngineArguments::new(self.args)
    }

    fn flag(mut self, flag: &str, value: &str) -> Self {
        self.args.push(flag.to_string());
        self.args.push(value.to_string());
        self
    }
}

impl Default for FfmpegCommand {
    fn default() -> Self {
        Self::new()
    }
}

/// Seconds rendered the shortest way: `10`, `2.5`.
pub fn format_seconds(seconds: f64) -> String {
    if seconds.fract() == 0.0 && seconds.abs() < 1e15 {
        format!("{}", seconds as i64)
    } else {
        format!("{}", seconds)
    }
}

/// Engine backed by the system `ffmpeg` binary.
///
/// Engine file names map to files inside the configured work directory.
pub struct FfmpegEngine {
    config: EngineConfig,
}

impl FfmpegEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, FfmpegError> {
        let file_name = Path::new(name)
            .file_name()
            .filter(|f| f.to_str() == Some(name))
            .ok_or_else(|| FfmpegError::InvalidOutput(format!("Invalid engine file name: {}", name)))?;
        Ok(self.config.work_dir.join(file_name))
    }

    /// Duration the run is expected to produce, for progress estimation.
    async fn expected_duration(&self, args: &[String]) -> Option<f64> {
        let input = args
            .windows(2)
            .find(|w| w[0] == "-i")
            .map(|w| w[1].clone())?;
        let start = flag_seconds(args, "-ss").unwrap_or(0.0);
        let end = match flag_seconds(args, "-to") {
            Some(end) => end,
            None => self.probe_duration(&input).await?,
        };
        let span = end - start;
        (span > 0.0).then_some(span)
    }

    async fn probe_duration(&self, name: &str) -> Option<f64> {
        let output = Command::new(&self.config.ffprobe_path)
            .current_dir(&self.config.work_dir)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
                name,
            ])
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }

        String::from_utf8_lossy(&output.stdout).trim().parse::<f64>().ok()
    }
}

fn flag_seconds(args: &[String], flag: &str) -> Option<f64> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse::<f64>().ok())
}

/// Microseconds from an `out_time_us=`/`out_time_ms=` progress line.
fn parse_out_time(line: &str) -> Option<f64> {
    let (key, value) = line.split_once('=')?;
    match key.trim() {
        // ffmpeg reports out_time_ms in microseconds as well
        "out_time_us" | "out_time_ms" => value.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn initialize(&self) -> Result<(), FfmpegError> {
        let output = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await
            .map_err(|e| FfmpegError::NotInstalled(format!("{}: {}", self.config.ffmpeg_path.display(), e)))?;

        if !output.status.success() {
            return Err(FfmpegError::NotInstalled(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        Ok(())
    }

    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), FfmpegError> {
        let path = self.resolve(name)?;
        tokio::fs::write(&path, bytes).await?;
        debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    async fn run(&self, args: &[String], progress: RatioCallback) -> Result<(), FfmpegError> {
        let duration = self.expected_duration(args).await;

        let mut child = Command::new(&self.config.ffmpeg_path)
            .current_dir(&self.config.work_dir)
            .args(["-hide_banner", "-y", "-nostats", "-progress", "pipe:1"])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FfmpegError::ExecutionFailed(e.to_string()))?;

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut text).await;
            }
            text
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let (Some(micros), Some(total)) = (parse_out_time(&line), duration) {
                            progress(micros / 1_000_000.0 / total);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        // the session is released on return, so the encoder must be gone first
                        let _ = child.kill().await;
                        return Err(e.into());
                    }
                }
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            warn!("ffmpeg exited with {}", status);
            return Err(FfmpegError::ExecutionFailed(stderr.trim().to_string()));
        }

        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, FfmpegError> {
        let path = self.resolve(name)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| FfmpegError::InvalidOutput(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_builder_preserves_order() {
        let args = FfmpegCommand::new()
            .input("input.mp4")
            .seek_start(2.5)
            .seek_end(10.0)
            .video_filter("hue=s=0")
            .args(&["-c:v", "libx264"])
            .output("output.mp4")
            .build();

        assert_eq!(
            args.as_slice(),
            &["-i", "input.mp4", "-ss", "2.5", "-to", "10", "-vf", "hue=s=0", "-c:v", "libx264", "output.mp4"]
        );
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(10.0), "10");
        assert_eq!(format_seconds(0.25), "0.25");
    }

    #[test]
    fn test_parse_out_time() {
        assert_eq!(parse_out_time("out_time_us=1500000"), Some(1_500_000.0));
        assert_eq!(parse_out_time("out_time_ms=20"), Some(20.0));
        assert_eq!(parse_out_time("frame=12"), None);
        assert_eq!(parse_out_time("out_time_us=N/A"), None);
    }

    #[test]
    fn test_engine_file_names_stay_in_work_dir() {
        let engine = FfmpegEngine::new(EngineConfig {
            work_dir: PathBuf::from("/tmp/work"),
            ..EngineConfig::default()
        });
        assert_eq!(engine.resolve("input.mp4").unwrap(), PathBuf::from("/tmp/work/input.mp4"));
        assert!(engine.resolve("../etc/passwd").is_err());
        assert!(engine.resolve("").is_err());
    }

    #[cfg(unix)]
    fn scripted_binary(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    fn scripted_engine(dir: &Path, body: &str) -> FfmpegEngine {
        FfmpegEngine::new(EngineConfig {
            ffmpeg_path: scripted_binary(dir, body),
            ffprobe_path: PathBuf::from("/nonexistent/ffprobe"),
            work_dir: dir.to_path_buf(),
        })
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reports_progress_and_reaps_child() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = scripted_engine(
            dir.path(),
            "echo out_time_us=500000\necho out_time_ms=1500000\necho progress=end",
        );

        let ratios = Arc::new(std::sync::Mutex::new(Vec::new()));
        let ratios_clone = Arc::clone(&ratios);
        let progress: RatioCallback = Arc::new(move |r: f64| ratios_clone.lock().unwrap().push(r));

        let args: Vec<String> = ["-i", "input.mp4", "-to", "2", "output.mp4"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        engine.run(&args, progress).await.unwrap();

        assert_eq!(*ratios.lock().unwrap(), vec![0.25, 0.75]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_failure_carries_stderr() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = scripted_engine(dir.path(), "echo 'Unknown encoder' >&2\nexit 1");

        let args = vec!["output.mp4".to_string()];
        let err = engine.run(&args, Arc::new(|_: f64| {})).await.unwrap_err();
        match err {
            FfmpegError::ExecutionFailed(stderr) => assert_eq!(stderr, "Unknown encoder"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_flag_seconds() {
        let args: Vec<String> = ["-i", "a.mp4", "-ss", "3", "-to", "9.5"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(flag_seconds(&args, "-ss"), Some(3.0));
        assert_eq!(flag_seconds(&args, "-to"), Some(9.5));
        assert_eq!(flag_seconds(&args, "-t"), None);
    }
}
