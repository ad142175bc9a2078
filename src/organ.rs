//! UMA Organ Interface for nexus_media
//!
//! Exposes the export compiler, the engine session and the sticker maker
//! as named operations using the stimulus/response pattern.
//!
//! ## Available Operations
//!
//! 1. `video.export` - Compile edits and run them through the engine
//! 2. `video.plan` - Compile edits to engine arguments without running
//! 3. `sticker.remove_background` - Transparent PNG sticker from a photo
//! 4. `engine.load` - Load the engine session (no-op when ready)
//! 5. `engine.status` - Current engine session state
//! 6. `media.capabilities` - Capability card query
//!
//! Operation failures never escape `stimulate`: they come back as
//! `Response { ok: false, .. }` carrying a user-facing message.
//!
//! ## Example
//!
//! ```rust,no_run
//! use nexus_media::organ::{MediaOrgan, Organ, Stimulus};
//! use serde_json::json;
//! use std::collections::HashMap;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let organ = MediaOrgan::new();
//!
//! let response = organ.stimulate(Stimulus {
//!     op: "video.export".to_string(),
//!     input: json!({
//!         "video_path": "clip.mp4",
//!         "output_path": "/tmp/export.mp4",
//!         "aspect_ratio": "9:16",
//!         "color_filter": "cinema",
//!     }),
//!     context: HashMap::new(),
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::EngineConfig;
use crate::engine::{EngineState, MediaEngine};
use crate::error::MediaError;
use crate::export::{plan, EditSession};
use crate::ffmpeg::FfmpegEngine;
use crate::metrics::Metrics;
use crate::pipeline::compile;
use crate::progress::{Status, StatusSink};
use crate::request::{EditRequest, StickerAsset};
use crate::segment::make_sticker;
use crate::validation::validate_input;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error};

/// UMA Stimulus - input to organ operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stimulus {
    pub op: String,
    pub input: Value,
    #[serde(default)]
    pub context: HashMap<String, String>,
}

/// UMA Response - output from organ operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    pub output: Value,
    pub latency_ms: u64,
    pub cost: Option<f64>,
}

/// Organ trait - stimulus/response surface of the service
#[async_trait]
pub trait Organ: Send + Sync {
    async fn stimulate(&self, stimulus: Stimulus) -> Result<Response, OrganError>;
    fn describe(&self) -> OrganCard;
}

/// Organ-level errors
#[derive(Debug, Error)]
pub enum OrganError {
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error(transparent)]
    Media(#[from] MediaError),
}

impl OrganError {
    /// Stable error tag for responses.
    pub fn kind(&self) -> &'static str {
        match self {
            OrganError::UnsupportedOperation(_) => "UnsupportedOperation",
            OrganError::InvalidInput(_) => "InvalidInput",
            OrganError::SerializationError(_) => "SerializationError",
            OrganError::Media(MediaError::EngineUnavailable(_)) => "EngineUnavailable",
            OrganError::Media(MediaError::ExecutionFailure(_)) => "ExecutionFailure",
            OrganError::Media(MediaError::ExportInProgress) => "ExportInProgress",
            OrganError::Media(MediaError::SegmentationInputMissing) => "SegmentationInputMissing",
            OrganError::Media(MediaError::InvalidPixelBuffer(_)) => "InvalidPixelBuffer",
            OrganError::Media(MediaError::Image(_)) => "ImageError",
            OrganError::Media(MediaError::Io(_)) => "IoError",
        }
    }

    /// Message safe to show the user; engine causes stay in the log.
    pub fn user_message(&self) -> String {
        match self {
            OrganError::Media(MediaError::EngineUnavailable(_)) => Status::EngineFailed.to_string(),
            OrganError::Media(MediaError::ExecutionFailure(_)) => Status::ExportFailed.to_string(),
            OrganError::Media(MediaError::SegmentationInputMissing) => Status::NoImageSelected.to_string(),
            other => other.to_string(),
        }
    }
}

/// Organ capability card
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganCard {
    pub name: String,
    pub version: String,
    pub description: String,
    pub division: String,
    pub subsystem: String,
    pub tags: Vec<String>,
    pub execution_modes: Vec<String>,
    pub functions: Vec<FunctionCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

/// Function capability card
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCard {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub examples: Vec<String>,
    pub idempotent: bool,
    pub side_effects: Vec<String>,
    pub input_schema: Option<Value>,
    pub output_schema: Value,
}

/// Video editing organ
pub struct MediaOrgan<E: MediaEngine = FfmpegEngine> {
    session: EditSession<E>,
    metrics: Arc<Metrics>,
}

impl MediaOrgan<FfmpegEngine> {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_engine(Arc::new(FfmpegEngine::new(config)))
    }
}

impl Default for MediaOrgan<FfmpegEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: MediaEngine> MediaOrgan<E> {
    pub fn with_engine(engine: Arc<E>) -> Self {
        Self {
            session: EditSession::new(engine),
            metrics: Metrics::new(),
        }
    }

    /// Same as [`Self::with_engine`], forwarding every status update to `sink`.
    pub fn with_status(engine: Arc<E>, sink: StatusSink) -> Self {
        Self {
            session: EditSession::with_status(engine, sink),
            metrics: Metrics::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn session(&self) -> &EditSession<E> {
        &self.session
    }

    /// Handle video.export operation
    async fn handle_video_export(&self, input: Value) -> Result<Value, OrganError> {
        let video_path = required_str(&input, "video_path")?;
        let output_path = required_str(&input, "output_path")?;

        let video = tokio::fs::read(video_path).await.map_err(MediaError::Io)?;
        let mut request = EditRequest::from_form(&input);
        if let Some(sticker_path) = input["sticker_path"].as_str() {
            let sticker = tokio::fs::read(sticker_path).await.map_err(MediaError::Io)?;
            request = request.with_sticker(StickerAsset::new(sticker));
        }

        let asset = self.session.export(&video, &request).await?;
        tokio::fs::write(output_path, &asset.bytes)
            .await
            .map_err(MediaError::Io)?;

        Ok(json!({
            "exported": true,
            "output_path": output_path,
            "asset": asset.name,
            "size_bytes": asset.bytes.len(),
            "args": asset.args,
        }))
    }

    /// Handle video.plan operation
    fn handle_video_plan(&self, input: Value) -> Result<Value, OrganError> {
        let mut request = EditRequest::from_form(&input);
        if input["sticker_path"].is_string() {
            // only presence matters for planning
            request = request.with_sticker(StickerAsset::new(Vec::new()));
        }

        let pipeline = compile(&request);
        Ok(json!({
            "args": plan(&request),
            "video_filters": pipeline.video_filters().iter().map(|f| f.render()).collect::<Vec<_>>(),
            "audio_filter": pipeline.render_audio_chain(),
            "composite": pipeline.requires_overlay_compositing(),
            "request": request,
        }))
    }

    /// Handle sticker.remove_background operation
    async fn handle_sticker(&self, input: Value) -> Result<Value, OrganError> {
        let image = match input["input_path"].as_str() {
            Some(path) => Some(tokio::fs::read(path).await.map_err(MediaError::Io)?),
            None => None,
        };

        let sticker = make_sticker(image.as_deref(), self.session.status())?;

        let output_path = required_str(&input, "output_path")?;
        tokio::fs::write(output_path, &sticker.png)
            .await
            .map_err(MediaError::Io)?;

        Ok(json!({
            "asset": sticker.name,
            "output_path": output_path,
            "width": sticker.width,
            "height": sticker.height,
            "background": sticker.background,
            "cleared_pixels": sticker.cleared_pixels,
        }))
    }

    /// Handle engine.load operation
    async fn handle_engine_load(&self) -> Result<Value, OrganError> {
        self.session.lifecycle().begin_load().await?;
        Ok(json!(self.session.lifecycle().state()))
    }

    fn handle_engine_status(&self) -> Result<Value, OrganError> {
        let state = self.session.lifecycle().state();
        Ok(serde_json::to_value(&state)?)
    }

    /// Handle media.capabilities operation
    fn handle_capabilities(&self) -> Result<Value, OrganError> {
        let card = self.describe();
        serde_json::to_value(&card).map_err(OrganError::SerializationError)
    }

    async fn dispatch(&self, op: &str, input: Value) -> Result<Value, OrganError> {
        let card = self.describe();
        let function = card
            .functions
            .iter()
            .find(|f| f.name == op)
            .ok_or_else(|| OrganError::UnsupportedOperation(op.to_string()));

        match function {
            Ok(function) => {
                if let Some(schema) = &function.input_schema {
                    validate_input(&input, schema).map_err(OrganError::InvalidInput)?;
                }
            }
            Err(e) if op != "metrics" => return Err(e),
            Err(_) => {}
        }

        match op {
            "video.export" => self.handle_video_export(input).await,
            "video.plan" => self.handle_video_plan(input),
            "sticker.remove_background" => self.handle_sticker(input).await,
            "engine.load" => self.handle_engine_load().await,
            "engine.status" => self.handle_engine_status(),
            "media.capabilities" => self.handle_capabilities(),
            "metrics" => Ok(json!(self.metrics.snapshot())),
            other => Err(OrganError::UnsupportedOperation(other.to_string())),
        }
    }

    fn available_operations(&self) -> Vec<String> {
        let mut ops: Vec<String> = self.describe().functions.into_iter().map(|f| f.name).collect();
        ops.push("metrics".to_string());
        ops
    }
}

fn required_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, OrganError> {
    input[key]
        .as_str()
        .ok_or_else(|| OrganError::InvalidInput(format!("Missing {}", key)))
}

/// Form fields shared by `video.export` and `video.plan`.
fn edit_properties() -> Value {
    json!({
        "sticker_path": { "type": "string", "description": "Prepared sticker PNG to overlay (optional)" },
        "trim_start": { "type": ["number", "string"], "description": "Start time in seconds (default: 0)" },
        "trim_end": { "type": ["number", "string"], "description": "End time in seconds; ignored unless after trim_start" },
        "aspect_ratio": { "type": "string", "description": "none, 16:9, 9:16 or 1:1" },
        "color_filter": { "type": "string", "description": "none, vivid, cinema, bw, warm or cool" },
        "enhance": { "type": ["boolean", "string"], "description": "Apply the auto-enhance recipe" },
        "text": { "type": "string", "description": "Burned-in caption" },
        "text_x": { "type": ["integer", "string"], "description": "Caption x (default: 40)" },
        "text_y": { "type": ["integer", "string"], "description": "Caption y (default: 60)" },
        "text_size": { "type": ["integer", "string"], "description": "Caption font size (default: 44)" },
        "voice": { "type": "string", "description": "none, robot, deep, chipmunk or echo" },
        "sticker_x": { "type": ["integer", "string"], "description": "Sticker x (default: 100)" },
        "sticker_y": { "type": ["integer", "string"], "description": "Sticker y (default: 100)" }
    })
}

fn export_input_schema() -> Value {
    let mut properties = edit_properties();
    properties["video_path"] = json!({ "type": "string", "description": "Path to source video" });
    properties["output_path"] = json!({ "type": "string", "description": "Where to write the exported MP4" });
    json!({
        "type": "object",
        "properties": properties,
        "required": ["video_path", "output_path"]
    })
}

#[async_trait]
impl<E: MediaEngine> Organ for MediaOrgan<E> {
    async fn stimulate(&self, stimulus: Stimulus) -> Result<Response, OrganError> {
        let start = Instant::now();
        let op = stimulus.op.clone();

        let result = self.dispatch(&op, stimulus.input).await;
        let latency = start.elapsed().as_millis() as u64;
        self.metrics.record_request(&op, result.is_ok(), latency);

        let response = match result {
            Ok(output) => Response {
                ok: true,
                output,
                latency_ms: latency,
                cost: None,
            },
            Err(OrganError::UnsupportedOperation(op)) => Response {
                ok: false,
                output: json!({
                    "error": "UnsupportedOperation",
                    "op": op,
                    "available_operations": self.available_operations(),
                }),
                latency_ms: latency,
                cost: None,
            },
            Err(e) => {
                error!("{} failed: {}", op, e);
                Response {
                    ok: false,
                    output: json!({
                        "error": e.kind(),
                        "message": e.user_message(),
                    }),
                    latency_ms: latency,
                    cost: None,
                }
            }
        };

        debug!("{} -> ok={} in {}ms", op, response.ok, latency);
        Ok(response)
    }

    fn describe(&self) -> OrganCard {
        OrganCard {
            name: "nexus_media".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Compiles declarative video edits into FFmpeg runs and cuts transparent stickers from photos".to_string(),
            division: "media".to_string(),
            subsystem: "editing".to_string(),
            tags: vec![
                "media".to_string(),
                "video".to_string(),
                "audio".to_string(),
                "ffmpeg".to_string(),
                "editing".to_string(),
                "filters".to_string(),
                "sticker".to_string(),
                "background-removal".to_string(),
            ],
            execution_modes: vec![
                "embedded".to_string(),
                "server".to_string(),
            ],
            author: Some("Nexus Media Team".to_string()),
            repository: None,
            functions: vec![
                FunctionCard {
                    name: "video.export".to_string(),
                    description: "Trim, crop, grade, caption, voice-shift and sticker-overlay a video in one FFmpeg run".to_string(),
                    tags: vec!["video".to_string(), "export".to_string(), "filters".to_string()],
                    examples: vec![
                        "Crop a landscape clip to 9:16 with a cinema grade".to_string(),
                        "Add a caption and a deep voice to the first 15 seconds".to_string(),
                        "Overlay a transparent sticker at 100,100".to_string(),
                    ],
                    idempotent: true,
                    side_effects: vec!["writes video file".to_string(), "invokes ffmpeg".to_string()],
                    input_schema: Some(export_input_schema()),
                    output_schema: json!({
                        "type": "object",
                        "properties": {
                            "exported": { "type": "boolean" },
                            "output_path": { "type": "string" },
                            "asset": { "type": "string" },
                            "size_bytes": { "type": "integer" },
                            "args": { "type": "array", "items": { "type": "string" } }
                        }
                    }),
                },
                FunctionCard {
                    name: "video.plan".to_string(),
                    description: "Compile edits to the FFmpeg argument list without running the engine".to_string(),
                    tags: vec!["video".to_string(), "dry-run".to_string(), "filters".to_string()],
                    examples: vec![
                        "Preview the filter chain for a 1:1 black and white export".to_string(),
                        "Check whether a sticker switches to the overlay graph".to_string(),
                    ],
                    idempotent: true,
                    side_effects: vec![],
                    input_schema: Some(json!({
                        "type": "object",
                        "properties": edit_properties()
                    })),
                    output_schema: json!({
                        "type": "object",
                        "properties": {
                            "args": { "type": "array", "items": { "type": "string" } },
                            "video_filters": { "type": "array", "items": { "type": "string" } },
                            "audio_filter": { "type": ["string", "null"] },
                            "composite": { "type": "boolean" }
                        }
                    }),
                },
                FunctionCard {
                    name: "sticker.remove_background".to_string(),
                    description: "Clear pixels matching the corner background color and save a transparent PNG sticker".to_string(),
                    tags: vec!["image".to_string(), "sticker".to_string(), "background-removal".to_string()],
                    examples: vec![
                        "Cut a logo photographed on a white sheet".to_string(),
                        "Prepare a sticker for video.export".to_string(),
                    ],
                    idempotent: true,
                    side_effects: vec!["writes image file".to_string()],
                    input_schema: Some(json!({
                        "type": "object",
                        "properties": {
                            "input_path": { "type": "string", "description": "Photo to cut the sticker from" },
                            "output_path": { "type": "string", "description": "Where to write the PNG" }
                        },
                        "required": ["output_path"]
                    })),
                    output_schema: json!({
                        "type": "object",
                        "properties": {
                            "asset": { "type": "string" },
                            "output_path": { "type": "string" },
                            "width": { "type": "integer" },
                            "height": { "type": "integer" },
                            "background": { "type": "object" },
                            "cleared_pixels": { "type": "integer" }
                        }
                    }),
                },
                FunctionCard {
                    name: "engine.load".to_string(),
                    description: "Load the FFmpeg engine session; waits on a load already in flight".to_string(),
                    tags: vec!["engine".to_string(), "lifecycle".to_string()],
                    examples: vec!["Warm up the engine before the first export".to_string()],
                    idempotent: true,
                    side_effects: vec!["invokes ffmpeg".to_string()],
                    input_schema: None,
                    output_schema: json!({
                        "type": "object",
                        "properties": { "state": { "type": "string" } }
                    }),
                },
                FunctionCard {
                    name: "engine.status".to_string(),
                    description: "Report the engine session state and any load failure".to_string(),
                    tags: vec!["engine".to_string(), "lifecycle".to_string()],
                    examples: vec!["Check whether the engine is ready".to_string()],
                    idempotent: true,
                    side_effects: vec![],
                    input_schema: None,
                    output_schema: json!({
                        "type": "object",
                        "properties": {
                            "state": { "type": "string" },
                            "error": { "type": "string" }
                        }
                    }),
                },
                FunctionCard {
                    name: "media.capabilities".to_string(),
                    description: "Return organ capability card with all available functions and metadata".to_string(),
                    tags: vec!["metadata".to_string(), "discovery".to_string(), "mcp".to_string()],
                    examples: vec![
                        "Discover available editing operations".to_string(),
                        "Query organ capabilities for orchestration".to_string(),
                    ],
                    idempotent: true,
                    side_effects: vec![],
                    input_schema: None,
                    output_schema: json!({
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "version": { "type": "string" },
                            "functions": { "type": "array" }
                        }
                    }),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::ScriptedEngine;

    fn organ() -> MediaOrgan<ScriptedEngine> {
        MediaOrgan::with_engine(Arc::new(ScriptedEngine::default()))
    }

    fn stimulus(op: &str, input: Value) -> Stimulus {
        Stimulus {
            op: op.to_string(),
            input,
            context: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_organ_capabilities() {
        let response = organ().stimulate(stimulus("media.capabilities", json!({}))).await.unwrap();
        assert!(response.ok);
        assert_eq!(response.output["name"], "nexus_media");
    }

    #[tokio::test]
    async fn test_unsupported_operation() {
        let response = organ().stimulate(stimulus("invalid.operation", json!({}))).await.unwrap();
        assert!(!response.ok);
        assert_eq!(response.output["error"], "UnsupportedOperation");
        assert!(response.output["available_operations"]
            .as_array()
            .unwrap()
            .contains(&json!("video.export")));
    }

    #[tokio::test]
    async fn test_engine_load_and_status() {
        let organ = organ();
        let status = organ.stimulate(stimulus("engine.status", json!({}))).await.unwrap();
        assert_eq!(status.output, json!({"state": "unloaded"}));

        let loaded = organ.stimulate(stimulus("engine.load", json!({}))).await.unwrap();
        assert!(loaded.ok);
        assert_eq!(loaded.output, json!({"state": "ready"}));
    }

    #[tokio::test]
    async fn test_engine_failure_message() {
        let engine = Arc::new(ScriptedEngine::default());
        engine.fail_init.store(true, std::sync::atomic::Ordering::SeqCst);
        let organ = MediaOrgan::with_engine(engine);

        let response = organ.stimulate(stimulus("engine.load", json!({}))).await.unwrap();
        assert!(!response.ok);
        assert_eq!(response.output["error"], "EngineUnavailable");
        assert_eq!(response.output["message"], "Engine: failed to load (check internet)");

        let status = organ.stimulate(stimulus("engine.status", json!({}))).await.unwrap();
        assert_eq!(status.output["state"], "failed");
        assert_eq!(status.output["error"], "FFmpeg not found: offline");
    }

    #[tokio::test]
    async fn test_export_surfaces_intermediate_progress() {
        let dir = tempfile::TempDir::new().unwrap();
        let video_path = dir.path().join("clip.mp4");
        std::fs::write(&video_path, b"video").unwrap();

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink: StatusSink = Arc::new(move |s: &Status| seen_clone.lock().unwrap().push(s.clone()));
        let organ = MediaOrgan::with_status(Arc::new(ScriptedEngine::default()), sink);

        let response = organ
            .stimulate(stimulus(
                "video.export",
                json!({
                    "video_path": video_path.to_str().unwrap(),
                    "output_path": dir.path().join("out.mp4").to_str().unwrap()
                }),
            ))
            .await
            .unwrap();
        assert!(response.ok, "{:?}", response.output);

        let messages: Vec<String> = seen.lock().unwrap().iter().map(|s| s.to_string()).collect();
        assert!(messages.contains(&"Exporting HQ... keep tab open".to_string()));
        assert!(messages.contains(&"Exporting... 25%".to_string()));
        assert!(messages.contains(&"Exporting... 80%".to_string()));
        assert_eq!(messages.last().map(String::as_str), Some("Done! Video exported."));
    }

    #[tokio::test]
    async fn test_sticker_statuses_reach_sink() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink: StatusSink = Arc::new(move |s: &Status| seen_clone.lock().unwrap().push(s.clone()));
        let organ = MediaOrgan::with_status(Arc::new(ScriptedEngine::default()), sink);

        let response = organ
            .stimulate(stimulus("sticker.remove_background", json!({ "output_path": "/tmp/unused.png" })))
            .await
            .unwrap();
        assert!(!response.ok);
        assert_eq!(*seen.lock().unwrap(), vec![Status::NoImageSelected]);
    }

    #[test]
    fn test_organ_card() {
        let card = organ().describe();
        assert_eq!(card.name, "nexus_media");
        assert_eq!(card.subsystem, "editing");
        assert_eq!(card.functions.len(), 6);
        assert!(card.tags.contains(&"sticker".to_string()));
    }
}
