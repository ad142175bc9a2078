//! Metrics and observability for nexus_media

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Global metrics collector
#[derive(Default)]
pub struct Metrics {
    pub total_requests: AtomicU64,
    pub successful_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub total_latency_ms: AtomicU64,

    // Per-operation counters
    pub video_export_count: AtomicU64,
    pub video_plan_count: AtomicU64,
    pub sticker_count: AtomicU64,
    pub engine_load_count: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_request(&self, op: &str, success: bool, latency_ms: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }

        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);

        let counter = match op {
            "video.export" => &self.video_export_count,
            "video.plan" => &self.video_plan_count,
            "sticker.remove_background" => &self.sticker_count,
            "engine.load" => &self.engine_load_count,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_requests.load(Ordering::Relaxed);
        let failed = self.failed_requests.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_requests: total,
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: failed,
            error_rate: if total > 0 { failed as f64 / total as f64 } else { 0.0 },
            avg_latency_ms: if total > 0 { total_latency / total } else { 0 },
            operations: OperationMetrics {
                video_export: self.video_export_count.load(Ordering::Relaxed),
                video_plan: self.video_plan_count.load(Ordering::Relaxed),
                sticker_remove_background: self.sticker_count.load(Ordering::Relaxed),
                engine_load: self.engine_load_count.load(Ordering::Relaxed),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub error_rate: f64,
    pub avg_latency_ms: u64,
    pub operations: OperationMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMetrics {
    pub video_export: u64,
    pub video_plan: u64,
    pub sticker_remove_background: u64,
    pub engine_load: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let metrics = Metrics::new();
        metrics.record_request("video.export", true, 40);
        metrics.record_request("video.export", false, 20);
        metrics.record_request("sticker.remove_background", true, 0);
        metrics.record_request("media.capabilities", true, 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 4);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.avg_latency_ms, 15);
        assert_eq!(snapshot.error_rate, 0.25);
        assert_eq!(snapshot.operations.video_export, 2);
        assert_eq!(snapshot.operations.sticker_remove_background, 1);
        assert_eq!(snapshot.operations.video_plan, 0);
    }
}
