use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for the OCR pipeline (§4.7). `high_watermark` tracks the
/// deepest the queue has ever been, independent of its current depth.
#[derive(Default)]
pub struct OcrStats {
    total_enqueued: AtomicU64,
    total_processed: AtomicU64,
    total_rejected: AtomicU64,
    high_watermark: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct OcrStatsSnapshot {
    pub total_enqueued: u64,
    pub total_processed: u64,
    pub total_rejected: u64,
    pub high_watermark: u64,
    pub queue_capacity: usize,
}

impl OcrStats {
    pub fn record_enqueued(&self, current_depth: u64) {
        self.total_enqueued.fetch_add(1, Ordering::Relaxed);
        self.high_watermark.fetch_max(current_depth, Ordering::Relaxed);
    }

    pub fn record_processed(&self) {
        self.total_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.total_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, queue_capacity: usize) -> OcrStatsSnapshot {
        OcrStatsSnapshot {
            total_enqueued: self.total_enqueued.load(Ordering::Relaxed),
            total_processed: self.total_processed.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
            high_watermark: self.high_watermark.load(Ordering::Relaxed),
            queue_capacity,
        }
    }

    /// True once the high watermark has reached 90% of capacity — used to
    /// trigger a "queue nearly full" warning log.
    pub fn near_capacity(&self, queue_capacity: usize) -> bool {
        let watermark = self.high_watermark.load(Ordering::Relaxed) as f64;
        watermark >= queue_capacity as f64 * 0.9
    }
}
