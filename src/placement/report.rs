//! Batch reports and lifetime placement statistics

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::core::Error;
use crate::core::types::Result;

/// Summary of one placement batch
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub placed: usize,
    pub failed: usize,
    /// Requests never attempted because the batch was cancelled or timed out
    pub abandoned: usize,
    pub cancelled: bool,
    pub timed_out: bool,
    pub failures_by_type: BTreeMap<String, usize>,
    /// Failures keyed by error kind ("no_suitable_position", "provider_failure", ...)
    pub failures_by_kind: BTreeMap<String, usize>,
    /// Positions evaluated across every request
    pub total_attempts: u64,
    /// `total_attempts / placed`; 0 when nothing was placed
    pub attempts_per_success: f32,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn new(total: usize) -> Self {
        Self { total, ..Default::default() }
    }

    /// Fraction of requests placed
    pub fn success_rate(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.placed as f32 / self.total as f32
    }

    pub fn is_complete(&self) -> bool {
        self.placed + self.failed + self.abandoned == self.total
    }

    /// `Err(Cancelled)` for a cancelled batch, the report otherwise
    pub fn into_result(self) -> Result<Self> {
        if self.cancelled {
            Err(Error::Cancelled)
        } else {
            Ok(self)
        }
    }

    pub(crate) fn record_failure(&mut self, object_type: &str, kind: &str) {
        self.failed += 1;
        *self.failures_by_type.entry(object_type.to_string()).or_default() += 1;
        *self.failures_by_kind.entry(kind.to_string()).or_default() += 1;
    }

    pub(crate) fn finish(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
        self.attempts_per_success = if self.placed > 0 {
            self.total_attempts as f32 / self.placed as f32
        } else {
            0.0
        };
    }
}

/// Per-type counters accumulated across batches
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PlacementStats {
    pub batches: usize,
    pub placed_by_type: BTreeMap<String, usize>,
    pub failed_by_type: BTreeMap<String, usize>,
    pub total_attempts: u64,
}

impl PlacementStats {
    pub fn total_placed(&self) -> usize {
        self.placed_by_type.values().sum()
    }

    pub fn total_failed(&self) -> usize {
        self.failed_by_type.values().sum()
    }

    pub(crate) fn record_placed(&mut self, object_type: &str) {
        *self.placed_by_type.entry(object_type.to_string()).or_default() += 1;
    }

    pub(crate) fn record_failed(&mut self, object_type: &str) {
        *self.failed_by_type.entry(object_type.to_string()).or_default() += 1;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
