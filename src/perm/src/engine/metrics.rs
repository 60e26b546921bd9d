//! Gate decision counters

use super::decision::DenialCode;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the gate counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Requests forwarded after a decision
    pub forwarded: u64,

    /// Requests without an attached permission (forwarded untouched)
    pub transparent: u64,

    /// Denials per code
    pub denied: BTreeMap<&'static str, u64>,

    /// Role-based permissions forwarded with no access control registry
    pub role_gaps: u64,

    /// Entity decisions on a verb with no classified operations
    pub unclassified: u64,
}

impl MetricsSnapshot {
    pub fn total_denied(&self) -> u64 {
        self.denied.values().sum()
    }

    pub fn denied_with(&self, code: DenialCode) -> u64 {
        self.denied.get(code.as_str()).copied().unwrap_or(0)
    }

    /// Share of decided requests that were denied
    pub fn denial_rate(&self) -> f64 {
        let denied = self.total_denied();
        let total = denied + self.forwarded;
        if total == 0 {
            0.0
        } else {
            denied as f64 / total as f64
        }
    }
}

/// Lock-free gate counters
#[derive(Debug, Default)]
pub struct GateMetrics {
    forwarded: AtomicU64,
    transparent: AtomicU64,
    denied: [AtomicU64; DenialCode::ALL.len()],
    role_gaps: AtomicU64,
    unclassified: AtomicU64,
}

impl GateMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_forward(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transparent(&self) {
        self.transparent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_denial(&self, code: DenialCode) {
        if let Some(index) = DenialCode::ALL.iter().position(|c| *c == code) {
            self.denied[index].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_role_gap(&self) {
        self.role_gaps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unclassified(&self) {
        self.unclassified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let denied = DenialCode::ALL
            .iter()
            .zip(self.denied.iter())
            .map(|(code, count)| (code.as_str(), count.load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > 0)
            .collect();

        MetricsSnapshot {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            transparent: self.transparent.load(Ordering::Relaxed),
            denied,
            role_gaps: self.role_gaps.load(Ordering::Relaxed),
            unclassified: self.unclassified.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = GateMetrics::new();
        metrics.record_forward();
        metrics.record_forward();
        metrics.record_transparent();
        metrics.record_denial(DenialCode::FailOwn);
        metrics.record_denial(DenialCode::FailOwn);
        metrics.record_denial(DenialCode::NoPrior);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.forwarded, 2);
        assert_eq!(snapshot.transparent, 1);
        assert_eq!(snapshot.denied_with(DenialCode::FailOwn), 2);
        assert_eq!(snapshot.denied_with(DenialCode::FailAllow), 0);
        assert_eq!(snapshot.total_denied(), 3);
        assert!((snapshot.denial_rate() - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_denial_rate() {
        assert_eq!(GateMetrics::new().snapshot().denial_rate(), 0.0);
    }
}
