//! ---
//! oph_section: "11-simulation"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Capturing output sink handed to the operator under test."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
use std::sync::Arc;

use oph_common::{ExecutionConfig, TypeCopier};
use oph_operator::{Output, StreamElement, StreamRecord, Watermark};
use parking_lot::Mutex;

use crate::metrics::HarnessMetrics;

/// Ordered, shared list of everything the operator emitted.
///
/// Clones share the same list. Timer callbacks may emit from another thread,
/// so the list sits behind a mutex.
#[derive(Debug)]
pub struct OutputCollector<T> {
    elements: Arc<Mutex<Vec<StreamElement<T>>>>,
}

impl<T> Clone for OutputCollector<T> {
    fn clone(&self) -> Self {
        Self {
            elements: Arc::clone(&self.elements),
        }
    }
}

impl<T> Default for OutputCollector<T> {
    fn default() -> Self {
        Self {
            elements: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T> OutputCollector<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, element: StreamElement<T>) {
        self.elements.lock().push(element);
    }

    pub fn len(&self) -> usize {
        self.elements.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.lock().is_empty()
    }

    pub fn clear(&self) {
        self.elements.lock().clear();
    }

    /// Remove and return everything captured so far.
    pub fn drain(&self) -> Vec<StreamElement<T>> {
        std::mem::take(&mut *self.elements.lock())
    }
}

impl<T: Clone> OutputCollector<T> {
    /// Copy of the captured elements in emission order.
    pub fn elements(&self) -> Vec<StreamElement<T>> {
        self.elements.lock().clone()
    }

    /// Captured records only, watermarks skipped.
    pub fn records(&self) -> Vec<StreamRecord<T>> {
        self.elements
            .lock()
            .iter()
            .filter_map(|element| element.as_record().cloned())
            .collect()
    }

    pub fn watermarks(&self) -> Vec<Watermark> {
        self.elements
            .lock()
            .iter()
            .filter_map(StreamElement::as_watermark)
            .collect()
    }
}

/// Output handed to the operator at setup.
///
/// Every collected record is copied with the copier registered for `T` in the
/// execution config, so later mutation of the operator's buffer never shows
/// up in captured output. The copier is looked up on the first record and
/// reused afterwards.
pub struct MockOutput<T> {
    collector: OutputCollector<T>,
    execution_config: Arc<ExecutionConfig>,
    copier: Option<TypeCopier<T>>,
    metrics: Option<(HarnessMetrics, &'static str)>,
}

impl<T: Clone + 'static> MockOutput<T> {
    pub fn new(collector: OutputCollector<T>, execution_config: Arc<ExecutionConfig>) -> Self {
        Self {
            collector,
            execution_config,
            copier: None,
            metrics: None,
        }
    }

    /// Count emitted records against `operator`.
    pub fn with_metrics(mut self, metrics: HarnessMetrics, operator: &'static str) -> Self {
        self.metrics = Some((metrics, operator));
        self
    }

    /// Whether the copier has been resolved yet.
    pub fn has_resolved_copier(&self) -> bool {
        self.copier.is_some()
    }

    fn copier(&mut self) -> &TypeCopier<T> {
        let config = &self.execution_config;
        self.copier.get_or_insert_with(|| config.copier_for::<T>())
    }
}

impl<T: Clone + Send + 'static> Output<T> for MockOutput<T> {
    fn collect(&mut self, record: &StreamRecord<T>) {
        let value = self.copier().copy(record.value());
        self.collector.push(StreamElement::Record(record.map(value)));
        if let Some((metrics, operator)) = &self.metrics {
            metrics.record_emitted(operator);
        }
    }

    fn emit_watermark(&mut self, mark: Watermark) {
        self.collector.push(StreamElement::Watermark(mark));
    }
}

impl<T: 'static> std::fmt::Debug for MockOutput<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockOutput")
            .field("captured", &self.collector.len())
            .field("copier", &self.copier.as_ref().map(TypeCopier::type_name))
            .finish()
    }
}
