//! Pipeline compiler
//!
//! Turns an [`EditRequest`] into an ordered video chain, an optional audio
//! chain, and the decision whether a sticker must be composited.

use crate::filters::{
    resolve_color_filter, resolve_crop, resolve_enhance_chain, resolve_voice_effect,
    AudioFragment, Fragment, TextOverlay,
};
use crate::presets;
use crate::request::EditRequest;

/// Compiled form of one export attempt. Built fresh, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPipeline {
    video_filters: Vec<Fragment>,
    audio_filter: Option<AudioFragment>,
    requires_overlay_compositing: bool,
    text_fragment_injected: bool,
}

impl CompiledPipeline {
    /// Video fragments, crop then enhance then color then text.
    pub fn video_filters(&self) -> &[Fragment] {
        &self.video_filters
    }

    pub fn audio_filter(&self) -> Option<&AudioFragment> {
        self.audio_filter.as_ref()
    }

    pub fn requires_overlay_compositing(&self) -> bool {
        self.requires_overlay_compositing
    }

    pub fn text_fragment_injected(&self) -> bool {
        self.text_fragment_injected
    }

    /// Comma-joined video chain, or `None` when there is nothing to apply.
    pub fn render_video_chain(&self) -> Option<String> {
        if self.video_filters.is_empty() {
            return None;
        }
        Some(
            self.video_filters
                .iter()
                .map(Fragment::render)
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    /// Video chain for a named graph stage, which cannot be empty.
    pub fn render_graph_stage(&self) -> String {
        self.render_video_chain()
            .unwrap_or_else(|| presets::IDENTITY_FILTER.to_string())
    }

    pub fn render_audio_chain(&self) -> Option<String> {
        self.audio_filter.as_ref().map(AudioFragment::render)
    }
}

pub fn compile(request: &EditRequest) -> CompiledPipeline {
    let text = request.overlay_text.trim();
    let text_fragment = (!text.is_empty()).then(|| {
        Fragment::Text(TextOverlay {
            text: text.to_string(),
            x: request.text_position.x,
            y: request.text_position.y,
            size: request.text_size,
        })
    });
    let text_fragment_injected = text_fragment.is_some();

    let video_filters: Vec<Fragment> = [
        resolve_crop(request.aspect_ratio),
        resolve_enhance_chain(request.enhance_enabled),
        resolve_color_filter(request.color_filter),
        text_fragment,
    ]
    .into_iter()
    .flatten()
    .collect();

    CompiledPipeline {
        video_filters,
        audio_filter: resolve_voice_effect(request.voice_effect),
        requires_overlay_compositing: request.sticker_asset.is_some(),
        text_fragment_injected,
    }
}
