//! Filter descriptor resolvers
//!
//! Each UI option resolves to an optional typed [`Fragment`]. `None` means the
//! option contributes nothing to the chain. Fragments are rendered to ffmpeg
//! filter syntax only when arguments are assembled.

use crate::presets;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    Original,
    Landscape16x9,
    Portrait9x16,
    Square,
}

impl AspectRatio {
    /// Unknown values fall back to [`AspectRatio::Original`].
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "16:9" => AspectRatio::Landscape16x9,
            "9:16" => AspectRatio::Portrait9x16,
            "1:1" => AspectRatio::Square,
            _ => AspectRatio::Original,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AspectRatio::Original => "none",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Square => "1:1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorFilter {
    #[default]
    Off,
    Vivid,
    Cinema,
    BlackWhite,
    Warm,
    Cool,
}

impl ColorFilter {
    /// Unknown values fall back to [`ColorFilter::Off`].
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "vivid" => ColorFilter::Vivid,
            "cinema" => ColorFilter::Cinema,
            "bw" => ColorFilter::BlackWhite,
            "warm" => ColorFilter::Warm,
            "cool" => ColorFilter::Cool,
            _ => ColorFilter::Off,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ColorFilter::Off => "none",
            ColorFilter::Vivid => "vivid",
            ColorFilter::Cinema => "cinema",
            ColorFilter::BlackWhite => "bw",
            ColorFilter::Warm => "warm",
            ColorFilter::Cool => "cool",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VoiceEffect {
    #[default]
    Off,
    Robot,
    Deep,
    Chipmunk,
    Echo,
}

impl VoiceEffect {
    /// Unknown values fall back to [`VoiceEffect::Off`].
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "robot" => VoiceEffect::Robot,
            "deep" => VoiceEffect::Deep,
            "chipmunk" => VoiceEffect::Chipmunk,
            "echo" => VoiceEffect::Echo,
            _ => VoiceEffect::Off,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            VoiceEffect::Off => "none",
            VoiceEffect::Robot => "robot",
            VoiceEffect::Deep => "deep",
            VoiceEffect::Chipmunk => "chipmunk",
            VoiceEffect::Echo => "echo",
        }
    }
}

/// Burned-in caption. `text` is stored unescaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextOverlay {
    pub text: String,
    pub x: i64,
    pub y: i64,
    pub size: u32,
}

/// Ordering slot of a video fragment inside the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FragmentKind {
    Crop,
    Enhance,
    Color,
    Text,
}

/// One unit of video filter syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Crop(AspectRatio),
    Enhance,
    Color(ColorFilter),
    Text(TextOverlay),
}

impl Fragment {
    pub fn kind(&self) -> FragmentKind {
        match self {
            Fragment::Crop(_) => FragmentKind::Crop,
            Fragment::Enhance => FragmentKind::Enhance,
            Fragment::Color(_) => FragmentKind::Color,
            Fragment::Text(_) => FragmentKind::Text,
        }
    }

    /// Render to ffmpeg filter syntax.
    pub fn render(&self) -> String {
        match self {
            Fragment::Crop(ratio) => crop_expression(*ratio).unwrap_or(presets::IDENTITY_FILTER).to_string(),
            Fragment::Enhance => format!(
                "{},{},{}",
                presets::ENHANCE_DENOISE,
                presets::ENHANCE_SHARPEN,
                presets::ENHANCE_LIFT
            ),
            Fragment::Color(filter) => grade_expression(*filter).unwrap_or(presets::IDENTITY_FILTER).to_string(),
            Fragment::Text(overlay) => format!(
                "drawtext=text='{}':x={}:y={}:fontsize={}:{}",
                escape_text(&overlay.text),
                overlay.x,
                overlay.y,
                overlay.size,
                presets::TEXT_STYLE
            ),
        }
    }
}

/// Audio chain fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFragment {
    Voice(VoiceEffect),
}

impl AudioFragment {
    pub fn render(&self) -> String {
        match self {
            AudioFragment::Voice(effect) => voice_expression(*effect).unwrap_or("anull").to_string(),
        }
    }
}

fn crop_expression(ratio: AspectRatio) -> Option<&'static str> {
    match ratio {
        AspectRatio::Original => None,
        AspectRatio::Landscape16x9 => Some(presets::CROP_16_9),
        AspectRatio::Portrait9x16 => Some(presets::CROP_9_16),
        AspectRatio::Square => Some(presets::CROP_1_1),
    }
}

fn grade_expression(filter: ColorFilter) -> Option<&'static str> {
    match filter {
        ColorFilter::Off => None,
        ColorFilter::Vivid => Some(presets::GRADE_VIVID),
        ColorFilter::Cinema => Some(presets::GRADE_CINEMA),
        ColorFilter::BlackWhite => Some(presets::GRADE_BW),
        ColorFilter::Warm => Some(presets::GRADE_WARM),
        ColorFilter::Cool => Some(presets::GRADE_COOL),
    }
}

fn voice_expression(effect: VoiceEffect) -> Option<&'static str> {
    match effect {
        VoiceEffect::Off => None,
        VoiceEffect::Robot => Some(presets::VOICE_ROBOT),
        VoiceEffect::Deep => Some(presets::VOICE_DEEP),
        VoiceEffect::Chipmunk => Some(presets::VOICE_CHIPMUNK),
        VoiceEffect::Echo => Some(presets::VOICE_ECHO),
    }
}

/// Escape the drawtext quote delimiter.
pub fn escape_text(text: &str) -> String {
    text.replace('\'', "\\'")
}

pub fn resolve_crop(ratio: AspectRatio) -> Option<Fragment> {
    crop_expression(ratio).map(|_| Fragment::Crop(ratio))
}

pub fn resolve_color_filter(filter: ColorFilter) -> Option<Fragment> {
    grade_expression(filter).map(|_| Fragment::Color(filter))
}

pub fn resolve_enhance_chain(enabled: bool) -> Option<Fragment> {
    enabled.then_some(Fragment::Enhance)
}

pub fn resolve_voice_effect(effect: VoiceEffect) -> Option<AudioFragment> {
    voice_expression(effect).map(|_| AudioFragment::Voice(effect))
}
