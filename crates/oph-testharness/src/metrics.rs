//! ---
//! oph_section: "11-simulation"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Prometheus counters describing harness activity."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
use std::sync::Arc;

use prometheus::{self, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

use crate::Result;

/// Counters published while a harness drives an operator.
#[derive(Clone)]
pub struct HarnessMetrics {
    elements_processed: IntCounterVec,
    watermarks_processed: IntCounterVec,
    records_emitted: IntCounterVec,
    snapshots_taken: IntCounterVec,
    snapshots_failed: IntCounterVec,
    restores: IntCounterVec,
    restores_failed: IntCounterVec,
    snapshot_bytes: HistogramVec,
    registry: Arc<Registry>,
}

impl HarnessMetrics {
    /// Register all harness metrics with the provided registry.
    pub fn new(registry: Arc<Registry>) -> Result<Self> {
        let elements_processed = IntCounterVec::new(
            Opts::new(
                "oph_elements_processed_total",
                "Records pushed into the operator under test",
            ),
            &["operator"],
        )?;
        registry.register(Box::new(elements_processed.clone()))?;

        let watermarks_processed = IntCounterVec::new(
            Opts::new(
                "oph_watermarks_processed_total",
                "Watermarks pushed into the operator under test",
            ),
            &["operator"],
        )?;
        registry.register(Box::new(watermarks_processed.clone()))?;

        let records_emitted = IntCounterVec::new(
            Opts::new(
                "oph_records_emitted_total",
                "Records captured from the operator output",
            ),
            &["operator"],
        )?;
        registry.register(Box::new(records_emitted.clone()))?;

        let snapshots_taken = IntCounterVec::new(
            Opts::new(
                "oph_snapshots_taken_total",
                "Operator snapshots sealed into a state handle",
            ),
            &["operator"],
        )?;
        registry.register(Box::new(snapshots_taken.clone()))?;

        let snapshots_failed = IntCounterVec::new(
            Opts::new(
                "oph_snapshots_failed_total",
                "Operator snapshots that did not produce a state handle",
            ),
            &["operator"],
        )?;
        registry.register(Box::new(snapshots_failed.clone()))?;

        let restores = IntCounterVec::new(
            Opts::new(
                "oph_restores_total",
                "State handles restored into the operator",
            ),
            &["operator"],
        )?;
        registry.register(Box::new(restores.clone()))?;

        let restores_failed = IntCounterVec::new(
            Opts::new(
                "oph_restores_failed_total",
                "State handles the operator failed to restore",
            ),
            &["operator"],
        )?;
        registry.register(Box::new(restores_failed.clone()))?;

        let histogram_opts = HistogramOpts::new(
            "oph_snapshot_size_bytes",
            "Size of sealed operator snapshots",
        )
        .buckets(prometheus::exponential_buckets(16.0, 4.0, 10)?);
        let snapshot_bytes = HistogramVec::new(histogram_opts, &["operator"])?;
        registry.register(Box::new(snapshot_bytes.clone()))?;

        Ok(Self {
            elements_processed,
            watermarks_processed,
            records_emitted,
            snapshots_taken,
            snapshots_failed,
            restores,
            restores_failed,
            snapshot_bytes,
            registry,
        })
    }

    /// Metrics registered on a private registry.
    pub fn standalone() -> Result<Self> {
        Self::new(Arc::new(Registry::new()))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn record_element(&self, operator: &str) {
        self.elements_processed.with_label_values(&[operator]).inc();
    }

    pub fn record_watermark(&self, operator: &str) {
        self.watermarks_processed
            .with_label_values(&[operator])
            .inc();
    }

    pub fn record_emitted(&self, operator: &str) {
        self.records_emitted.with_label_values(&[operator]).inc();
    }

    /// Record a sealed snapshot and its size.
    pub fn record_snapshot(&self, operator: &str, bytes: u64) {
        self.snapshots_taken.with_label_values(&[operator]).inc();
        self.snapshot_bytes
            .with_label_values(&[operator])
            .observe(bytes as f64);
    }

    pub fn record_snapshot_failed(&self, operator: &str) {
        self.snapshots_failed.with_label_values(&[operator]).inc();
    }

    pub fn record_restore(&self, operator: &str) {
        self.restores.with_label_values(&[operator]).inc();
    }

    pub fn record_restore_failed(&self, operator: &str) {
        self.restores_failed.with_label_values(&[operator]).inc();
    }

    pub fn elements_processed(&self, operator: &str) -> u64 {
        self.elements_processed
            .with_label_values(&[operator])
            .get()
    }

    pub fn watermarks_processed(&self, operator: &str) -> u64 {
        self.watermarks_processed
            .with_label_values(&[operator])
            .get()
    }

    pub fn records_emitted(&self, operator: &str) -> u64 {
        self.records_emitted.with_label_values(&[operator]).get()
    }

    pub fn snapshots_taken(&self, operator: &str) -> u64 {
        self.snapshots_taken.with_label_values(&[operator]).get()
    }

    pub fn snapshots_failed(&self, operator: &str) -> u64 {
        self.snapshots_failed.with_label_values(&[operator]).get()
    }

    pub fn restores(&self, operator: &str) -> u64 {
        self.restores.with_label_values(&[operator]).get()
    }

    pub fn restores_failed(&self, operator: &str) -> u64 {
        self.restores_failed.with_label_values(&[operator]).get()
    }
}

impl std::fmt::Debug for HarnessMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarnessMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_scoped_per_operator() {
        let metrics = HarnessMetrics::standalone().unwrap();
        metrics.record_element("Counter");
        metrics.record_element("Counter");
        metrics.record_element("Map");
        metrics.record_snapshot("Counter", 128);

        assert_eq!(metrics.elements_processed("Counter"), 2);
        assert_eq!(metrics.elements_processed("Map"), 1);
        assert_eq!(metrics.snapshots_taken("Counter"), 1);
        assert_eq!(metrics.snapshots_taken("Map"), 0);

        let families = metrics.registry().gather();
        assert!(families
            .iter()
            .any(|family| family.get_name() == "oph_snapshot_size_bytes"));
    }

    #[test]
    fn registering_twice_on_one_registry_fails() {
        let registry = Arc::new(Registry::new());
        HarnessMetrics::new(Arc::clone(&registry)).unwrap();
        let err = HarnessMetrics::new(registry).unwrap_err();
        assert!(matches!(err, crate::HarnessError::Metrics(_)));
    }
}
