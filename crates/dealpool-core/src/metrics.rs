//! In-process admission metrics.
//!
//! Plain atomic counters, cheap enough to live on the hot join path. The
//! snapshot type is serde-friendly so callers can ship it to whatever
//! telemetry sink they run.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A counter that only increases.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Counters for the admission controller.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub admissions_confirmed: Counter,
    pub admissions_waitlisted: Counter,
    pub rejections_capacity: Counter,
    pub rejections_stage_closed: Counter,
    pub sequence_conflicts: Counter,
    pub cancellations: Counter,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            admissions_confirmed: self.admissions_confirmed.get(),
            admissions_waitlisted: self.admissions_waitlisted.get(),
            rejections_capacity: self.rejections_capacity.get(),
            rejections_stage_closed: self.rejections_stage_closed.get(),
            sequence_conflicts: self.sequence_conflicts.get(),
            cancellations: self.cancellations.get(),
        }
    }
}

/// Point-in-time view of [`EngineMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub admissions_confirmed: u64,
    pub admissions_waitlisted: u64,
    pub rejections_capacity: u64,
    pub rejections_stage_closed: u64,
    pub sequence_conflicts: u64,
    pub cancellations: u64,
}
