//! Edit request model and form normalization.
//!
//! Form values arrive as strings or numbers. Anything missing or unparseable
//! takes its documented default instead of failing the export.

use crate::filters::{AspectRatio, ColorFilter, VoiceEffect};
use crate::presets;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

/// Opaque handle to a prepared sticker image (PNG bytes).
#[derive(Clone, PartialEq, Eq)]
pub struct StickerAsset {
    bytes: Arc<Vec<u8>>,
}

impl StickerAsset {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(bytes),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for StickerAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StickerAsset")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Full parameter set at export time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditRequest {
    pub trim_start: f64,
    pub trim_end: Option<f64>,
    pub aspect_ratio: AspectRatio,
    pub color_filter: ColorFilter,
    pub enhance_enabled: bool,
    pub overlay_text: String,
    pub text_position: Position,
    pub text_size: u32,
    pub voice_effect: VoiceEffect,
    #[serde(skip)]
    pub sticker_asset: Option<StickerAsset>,
    pub sticker_position: Position,
}

impl Default for EditRequest {
    fn default() -> Self {
        Self {
            trim_start: 0.0,
            trim_end: None,
            aspect_ratio: AspectRatio::Original,
            color_filter: ColorFilter::Off,
            enhance_enabled: false,
            overlay_text: String::new(),
            text_position: Position {
                x: presets::DEFAULT_TEXT_X,
                y: presets::DEFAULT_TEXT_Y,
            },
            text_size: presets::DEFAULT_TEXT_SIZE,
            voice_effect: VoiceEffect::Off,
            sticker_asset: None,
            sticker_position: Position {
                x: presets::DEFAULT_STICKER_X,
                y: presets::DEFAULT_STICKER_Y,
            },
        }
    }
}

impl EditRequest {
    /// Build a request from form-style JSON.
    ///
    /// Recognized keys: `trim_start`, `trim_end`, `aspect_ratio`, `color_filter`,
    /// `enhance`, `text`, `text_x`, `text_y`, `text_size`, `voice`, `sticker_x`,
    /// `sticker_y`. The sticker itself is attached separately.
    pub fn from_form(form: &Value) -> Self {
        let trim_start = parse_number(&form["trim_start"])
            .filter(|v| *v > 0.0)
            .unwrap_or(0.0);
        let (trim_start, trim_end) = normalize_trim(trim_start, parse_number(&form["trim_end"]));

        let text_size = parse_integer(&form["text_size"])
            .filter(|v| *v > 0)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(presets::DEFAULT_TEXT_SIZE);

        Self {
            trim_start,
            trim_end,
            aspect_ratio: AspectRatio::parse(form["aspect_ratio"].as_str().unwrap_or("")),
            color_filter: ColorFilter::parse(form["color_filter"].as_str().unwrap_or("")),
            enhance_enabled: parse_flag(&form["enhance"]),
            overlay_text: form["text"].as_str().unwrap_or("").to_string(),
            text_position: Position {
                x: parse_integer(&form["text_x"]).unwrap_or(presets::DEFAULT_TEXT_X),
                y: parse_integer(&form["text_y"]).unwrap_or(presets::DEFAULT_TEXT_Y),
            },
            text_size,
            voice_effect: VoiceEffect::parse(form["voice"].as_str().unwrap_or("")),
            sticker_asset: None,
            sticker_position: Position {
                x: parse_integer(&form["sticker_x"]).unwrap_or(presets::DEFAULT_STICKER_X),
                y: parse_integer(&form["sticker_y"]).unwrap_or(presets::DEFAULT_STICKER_Y),
            },
        }
    }

    pub fn with_sticker(mut self, sticker: StickerAsset) -> Self {
        self.sticker_asset = Some(sticker);
        self
    }

    /// Trim end that survives validation against `trim_start`.
    pub fn effective_trim_end(&self) -> Option<f64> {
        normalize_trim(self.trim_start, self.trim_end).1
    }
}

/// Drop a trim end that does not come after the start.
///
/// Returns the normalized pair; the end is `None` when it was discarded.
pub fn normalize_trim(start: f64, end: Option<f64>) -> (f64, Option<f64>) {
    let start = if start.is_finite() && start > 0.0 { start } else { 0.0 };
    let end = end.filter(|e| e.is_finite() && *e > start);
    (start, end)
}

fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

fn parse_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "on" | "1" | "yes"),
        Value::Number(n) => n.as_i64().map(|v| v != 0).unwrap_or(false),
        _ => false,
    }
}
