//! User-visible status updates and export progress

use crate::presets;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Status {
    EngineLoading { percent: u8, preloading: bool },
    EngineReady,
    EngineFailed,
    Preparing,
    ExportingHq,
    Exporting { percent: u8 },
    Finalizing,
    Done,
    ExportFailed,
    RemovingBackground,
    StickerReady,
    NoImageSelected,
}

impl Status {
    /// Percentage shown on the engine bar, if this status drives it.
    pub fn engine_percent(&self) -> Option<u8> {
        match self {
            Status::EngineLoading { percent, .. } => Some(*percent),
            Status::EngineReady => Some(100),
            Status::EngineFailed => Some(0),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::EngineLoading { preloading: true, .. } => write!(f, "Engine: preparing..."),
            Status::EngineLoading { preloading: false, .. } => write!(f, "Engine: loading..."),
            Status::EngineReady => write!(f, "Engine: ready"),
            Status::EngineFailed => write!(f, "Engine: failed to load (check internet)"),
            Status::Preparing => write!(f, "Preparing video..."),
            Status::ExportingHq => write!(f, "Exporting HQ... keep tab open"),
            Status::Exporting { percent } => write!(f, "Exporting... {}%", percent),
            Status::Finalizing => write!(f, "Finalizing download..."),
            Status::Done => write!(f, "Done! Video exported."),
            Status::ExportFailed => write!(f, "Export failed. Try a shorter video or restart."),
            Status::RemovingBackground => write!(f, "Removing background..."),
            Status::StickerReady => write!(f, "Sticker ready. You can export or download it."),
            Status::NoImageSelected => write!(f, "No image selected."),
        }
    }
}

pub type StatusSink = Arc<dyn Fn(&Status) + Send + Sync>;

/// Emit a status to the optional sink and the log.
pub fn emit(sink: Option<&StatusSink>, status: Status) {
    info!("{}", status);
    if let Some(sink) = sink {
        sink(&status);
    }
}

/// Maps the engine's best-effort ratio to a non-decreasing percentage.
pub struct ProgressTracker {
    last: AtomicU8,
    sink: Option<StatusSink>,
}

impl ProgressTracker {
    pub fn new(sink: Option<StatusSink>) -> Arc<Self> {
        Arc::new(Self {
            last: AtomicU8::new(0),
            sink,
        })
    }

    /// Record a ratio in `0..=1` and return the percentage now shown.
    pub fn report(&self, ratio: f64) -> u8 {
        let percent = to_percent(ratio);
        let previous = self.last.fetch_max(percent, Ordering::Relaxed);
        if percent > previous {
            emit(self.sink.as_ref(), Status::Exporting { percent });
            percent
        } else {
            previous
        }
    }

    pub fn percent(&self) -> u8 {
        self.last.load(Ordering::Relaxed)
    }
}

fn to_percent(ratio: f64) -> u8 {
    if !ratio.is_finite() {
        return 0;
    }
    (ratio * 100.0)
        .floor()
        .clamp(0.0, presets::EXPORT_PROGRESS_CAP as f64) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_percent_mapping() {
        assert_eq!(to_percent(-0.5), 0);
        assert_eq!(to_percent(0.123), 12);
        assert_eq!(to_percent(1.0), 99);
        assert_eq!(to_percent(7.0), 99);
        assert_eq!(to_percent(f64::NAN), 0);
    }

    #[test]
    fn test_progress_never_decreases() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink: StatusSink = Arc::new(move |s: &Status| seen_clone.lock().unwrap().push(s.clone()));

        let tracker = ProgressTracker::new(Some(sink));
        assert_eq!(tracker.report(0.30), 30);
        assert_eq!(tracker.report(0.10), 30);
        assert_eq!(tracker.report(0.55), 55);
        assert_eq!(tracker.report(0.55), 55);
        assert_eq!(tracker.percent(), 55);
        assert_eq!(ProgressTracker::new(None).report(0.4), 40);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![Status::Exporting { percent: 30 }, Status::Exporting { percent: 55 }]
        );
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(Status::Exporting { percent: 42 }.to_string(), "Exporting... 42%");
        assert_eq!(Status::ExportingHq.to_string(), "Exporting HQ... keep tab open");
        assert_eq!(Status::EngineReady.engine_percent(), Some(100));
        assert_eq!(Status::Done.engine_percent(), None);
    }
}
