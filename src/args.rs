//! Argument assembler
//!
//! Two shapes are produced:
//! - simple: one input, a linear `-vf` chain
//! - composite: video plus sticker, `-filter_complex` overlay graph

use crate::ffmpeg::FfmpegCommand;
use crate::pipeline::CompiledPipeline;
use crate::presets;
use crate::request::EditRequest;
use serde::Serialize;

/// Ordered instruction tokens for one engine run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EngineArguments(Vec<String>);

impl EngineArguments {
    pub fn new(args: Vec<String>) -> Self {
        Self(args)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Number of times a flag token appears.
    pub fn count(&self, flag: &str) -> usize {
        self.0.iter().filter(|a| *a == flag).count()
    }

    /// Value following the first occurrence of `flag`.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.0
            .windows(2)
            .find(|w| w[0] == flag)
            .map(|w| w[1].as_str())
    }
}

/// Engine file names for the inputs of one export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputNames {
    pub video: String,
    /// Only declared when the pipeline composites a sticker.
    pub sticker: String,
}

impl Default for InputNames {
    fn default() -> Self {
        Self {
            video: presets::INPUT_VIDEO_NAME.to_string(),
            sticker: presets::INPUT_STICKER_NAME.to_string(),
        }
    }
}

pub fn assemble(
    pipeline: &CompiledPipeline,
    request: &EditRequest,
    inputs: &InputNames,
    output: &str,
) -> EngineArguments {
    let composite = pipeline.requires_overlay_compositing();

    let mut cmd = FfmpegCommand::new().input(&inputs.video);
    if composite {
        cmd = cmd.input(&inputs.sticker);
    }

    if request.trim_start > 0.0 {
        cmd = cmd.seek_start(request.trim_start);
    }
    if let Some(end) = request.effective_trim_end() {
        cmd = cmd.seek_end(end);
    }

    if composite {
        let graph = format!(
            "[0:v]{}[v0];[v0][1:v]overlay={}:{}[v]",
            pipeline.render_graph_stage(),
            request.sticker_position.x,
            request.sticker_position.y
        );
        cmd = cmd.filter_complex(&graph).map("[v]").map("0:a?");
    } else if let Some(chain) = pipeline.render_video_chain() {
        cmd = cmd.video_filter(&chain);
    }

    if let Some(audio) = pipeline.render_audio_chain() {
        cmd = cmd.audio_filter(&audio);
    }

    cmd.args(presets::ENCODE_ARGS).output(output).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{AspectRatio, ColorFilter, VoiceEffect};
    use crate::pipeline::compile;
    use crate::request::StickerAsset;

    fn build(request: &EditRequest) -> EngineArguments {
        assemble(&compile(request), request, &InputNames::default(), presets::OUTPUT_VIDEO_NAME)
    }

    #[test]
    fn test_pass_through_has_no_filters() {
        let args = build(&EditRequest::default());
        assert_eq!(args.count("-vf"), 0);
        assert_eq!(args.count("-af"), 0);
        assert_eq!(args.count("-filter_complex"), 0);
        assert_eq!(args.count("-ss"), 0);
        assert_eq!(args.count("-to"), 0);
        assert_eq!(&args.as_slice()[..2], &["-i", "input.mp4"]);
        assert_eq!(args.as_slice().last().map(String::as_str), Some("output.mp4"));
    }

    #[test]
    fn test_trim_tokens() {
        let args = build(&EditRequest {
            trim_start: 10.0,
            trim_end: Some(20.0),
            ..EditRequest::default()
        });
        let ss = args.as_slice().iter().position(|a| a == "-ss").unwrap();
        let to = args.as_slice().iter().position(|a| a == "-to").unwrap();
        assert!(ss < to);
        assert_eq!(args.value_of("-ss"), Some("10"));
        assert_eq!(args.value_of("-to"), Some("20"));

        let args = build(&EditRequest {
            trim_start: 10.0,
            trim_end: Some(5.0),
            ..EditRequest::default()
        });
        assert_eq!(args.count("-to"), 0);

        let args = build(&EditRequest {
            trim_end: Some(5.0),
            ..EditRequest::default()
        });
        assert_eq!(args.count("-ss"), 0);
        assert_eq!(args.value_of("-to"), Some("5"));
    }

    #[test]
    fn test_square_bw_end_to_end() {
        let args = build(&EditRequest {
            aspect_ratio: AspectRatio::Square,
            color_filter: ColorFilter::BlackWhite,
            ..EditRequest::default()
        });
        assert_eq!(args.count("-vf"), 1);
        assert_eq!(args.value_of("-vf"), Some("crop='min(iw,ih)':'min(iw,ih)',hue=s=0"));
        assert_eq!(args.count("-af"), 0);
        assert_eq!(args.count("-ss"), 0);
        assert_eq!(args.count("-filter_complex"), 0);
    }

    #[test]
    fn test_composite_shape_with_no_video_fragments() {
        let mut request = EditRequest::default().with_sticker(StickerAsset::new(vec![0]));
        request.sticker_position.x = 12;
        request.sticker_position.y = -7;

        let args = build(&request);
        assert_eq!(args.count("-i"), 2);
        assert_eq!(args.count("-filter_complex"), 1);
        assert_eq!(args.count("-map"), 2);
        assert_eq!(args.count("-vf"), 0);
        assert_eq!(
            args.value_of("-filter_complex"),
            Some("[0:v]null[v0];[v0][1:v]overlay=12:-7[v]")
        );

        let maps: Vec<&str> = args
            .as_slice()
            .windows(2)
            .filter(|w| w[0] == "-map")
            .map(|w| w[1].as_str())
            .collect();
        assert_eq!(maps, vec!["[v]", "0:a?"]);
    }

    #[test]
    fn test_composite_shape_with_every_fragment() {
        let request = EditRequest {
            aspect_ratio: AspectRatio::Portrait9x16,
            enhance_enabled: true,
            color_filter: ColorFilter::Cinema,
            overlay_text: "hey".to_string(),
            voice_effect: VoiceEffect::Deep,
            ..EditRequest::default()
        }
        .with_sticker(StickerAsset::new(vec![0]));

        let args = build(&request);
        assert_eq!(args.count("-filter_complex"), 1);
        assert_eq!(args.count("-map"), 2);
        assert_eq!(args.value_of("-af"), Some(presets::VOICE_DEEP));

        let graph = args.value_of("-filter_complex").unwrap();
        assert!(graph.starts_with("[0:v]crop="));
        assert!(graph.ends_with("[v0];[v0][1:v]overlay=100:100[v]"));
    }

    #[test]
    fn test_text_escaping_round_trips() {
        let original = "Rock 'n' roll";
        let args = build(&EditRequest {
            overlay_text: original.to_string(),
            ..EditRequest::default()
        });
        let chain = args.value_of("-vf").unwrap();
        let body = chain
            .strip_prefix("drawtext=text='")
            .and_then(|rest| rest.split("':x=").next())
            .unwrap();
        assert!(body.contains("\\'n\\'"));
        assert_eq!(body.replace("\\'", "'"), original);
    }

    #[test]
    fn test_encode_tokens_trail_filters() {
        let args = build(&EditRequest {
            voice_effect: VoiceEffect::Echo,
            ..EditRequest::default()
        });
        let tokens = args.as_slice();
        let af = tokens.iter().position(|a| a == "-af").unwrap();
        let codec = tokens.iter().position(|a| a == "-c:v").unwrap();
        assert!(af < codec);
        assert_eq!(&tokens[tokens.len() - 1 - presets::ENCODE_ARGS.len()..tokens.len() - 1], presets::ENCODE_ARGS);
    }

    #[test]
    fn test_assemble_is_byte_identical() {
        let request = EditRequest {
            trim_start: 1.5,
            aspect_ratio: AspectRatio::Landscape16x9,
            overlay_text: "same".to_string(),
            ..EditRequest::default()
        }
        .with_sticker(StickerAsset::new(vec![9]));
        assert_eq!(build(&request), build(&request));
    }
}
