//! Fixed recipes and defaults.
//!
//! Every "magic number" the compiler, assembler and sticker maker rely on
//! lives here so tests can refer to them by name.

// ============================================================================
// Video grading
// ============================================================================

/// Auto-enhance: mild denoise, unsharp-mask sharpen, then a small lift.
pub const ENHANCE_DENOISE: &str = "hqdn3d=1.5:1.5:6:6";
pub const ENHANCE_SHARPEN: &str = "unsharp=5:5:0.8:3:3:0.4";
pub const ENHANCE_LIFT: &str = "eq=contrast=1.18:brightness=0.01:saturation=1.10";

pub const GRADE_VIVID: &str = "eq=contrast=1.2:saturation=1.35:brightness=0.02";
pub const GRADE_CINEMA: &str = "eq=contrast=1.25:saturation=1.15:brightness=-0.02";
pub const GRADE_BW: &str = "hue=s=0";
pub const GRADE_WARM: &str = "eq=contrast=1.1:saturation=1.2, colorbalance=rs=0.05:gs=0.02:bs=-0.03";
pub const GRADE_COOL: &str = "eq=contrast=1.1:saturation=1.15, colorbalance=rs=-0.03:gs=0.01:bs=0.05";

pub const CROP_16_9: &str = "crop='if(gt(a,16/9),ih*16/9,iw)':'if(gt(a,16/9),ih,iw*9/16)'";
pub const CROP_9_16: &str = "crop='if(gt(a,9/16),ih*9/16,iw)':'if(gt(a,9/16),ih,iw*16/9)'";
pub const CROP_1_1: &str = "crop='min(iw,ih)':'min(iw,ih)'";

/// Pass-through stage used when the overlay graph has nothing else to apply.
pub const IDENTITY_FILTER: &str = "null";

// ============================================================================
// Text overlay
// ============================================================================

pub const TEXT_STYLE: &str = "fontcolor=white:box=1:boxcolor=black@0.5:boxborderw=12";
pub const DEFAULT_TEXT_X: i64 = 40;
pub const DEFAULT_TEXT_Y: i64 = 60;
pub const DEFAULT_TEXT_SIZE: u32 = 44;

// ============================================================================
// Voice
// ============================================================================

pub const VOICE_ROBOT: &str = "afftfilt=real='hypot(re,im)':imag='0',atempo=1.0";
pub const VOICE_DEEP: &str = "asetrate=44100*0.85,atempo=1.176";
pub const VOICE_CHIPMUNK: &str = "asetrate=44100*1.25,atempo=0.8";
pub const VOICE_ECHO: &str = "aecho=0.8:0.9:1000:0.3";

// ============================================================================
// Sticker
// ============================================================================

pub const DEFAULT_STICKER_X: i64 = 100;
pub const DEFAULT_STICKER_Y: i64 = 100;

/// RGB distance below which a pixel is treated as background.
pub const BACKGROUND_THRESHOLD: f64 = 45.0;

/// Stickers are scaled down (never up) to at most this width.
pub const STICKER_MAX_WIDTH: u32 = 900;

// ============================================================================
// Engine I/O
// ============================================================================

pub const INPUT_VIDEO_NAME: &str = "input.mp4";
pub const INPUT_STICKER_NAME: &str = "sticker.png";
pub const OUTPUT_VIDEO_NAME: &str = "output.mp4";

pub const EXPORT_ASSET_NAME: &str = "export.mp4";
pub const STICKER_ASSET_NAME: &str = "sticker.png";

/// Trailing encode tokens, identical for every export.
pub const ENCODE_ARGS: &[&str] = &[
    "-c:v", "libx264",
    "-preset", "slow",
    "-crf", "18",
    "-pix_fmt", "yuv420p",
    "-movflags", "+faststart",
    "-r", "30",
    "-b:v", "10000k",
    "-c:a", "aac",
    "-b:a", "192k",
];

/// Export progress is capped below 100 until the output has been read back.
pub const EXPORT_PROGRESS_CAP: u8 = 99;
