//! ---
//! oph_section: "15-testing-qa-runbook"
//! oph_subsection: "integration-tests"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Operator scenarios exercised through the full harness stack."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use oph_common::{HarnessConfig, StreamConfig};
use oph_operator::{
    CheckpointedOperator, OneInputStreamOperator, Output, StreamElement, StreamOperator,
    StreamRecord, StreamTask, Watermark,
};
use oph_state::CheckpointStateOutputStream;
use oph_testharness::util::{assert_output_equals, assert_output_equals_sorted};
use oph_testharness::{
    HarnessMetrics, HarnessOptions, HarnessState, OneInputStreamOperatorTestHarness,
};
use prometheus::Registry;

type Keyed = (String, i64);

fn options() -> HarnessOptions {
    HarnessOptions::new().config(HarnessConfig::default())
}

/// Running sum per key. The key is selected before each element.
#[derive(Default)]
struct KeyedSum {
    current_key: Option<String>,
    sums: BTreeMap<String, i64>,
    output: Option<Box<dyn Output<Keyed>>>,
}

impl StreamOperator<Keyed> for KeyedSum {
    fn setup(
        &mut self,
        _task: Arc<dyn StreamTask>,
        _config: &StreamConfig,
        output: Box<dyn Output<Keyed>>,
    ) -> anyhow::Result<()> {
        self.output = Some(output);
        Ok(())
    }

    fn as_checkpointed(&mut self) -> Option<&mut dyn CheckpointedOperator> {
        Some(self)
    }
}

impl OneInputStreamOperator<Keyed, Keyed> for KeyedSum {
    fn set_key_context_element1(&mut self, record: &StreamRecord<Keyed>) -> anyhow::Result<()> {
        self.current_key = Some(record.value().0.clone());
        Ok(())
    }

    fn process_element(&mut self, record: StreamRecord<Keyed>) -> anyhow::Result<()> {
        let key = self
            .current_key
            .take()
            .ok_or_else(|| anyhow::anyhow!("no key context for {:?}", record.value()))?;
        let sum = self.sums.entry(key.clone()).or_insert(0);
        *sum += record.value().1;
        let emitted = record.map((key, *sum));
        if let Some(output) = self.output.as_mut() {
            output.collect(&emitted);
        }
        Ok(())
    }

    fn process_watermark(&mut self, mark: Watermark) -> anyhow::Result<()> {
        if let Some(output) = self.output.as_mut() {
            output.emit_watermark(mark);
        }
        Ok(())
    }
}

impl CheckpointedOperator for KeyedSum {
    fn snapshot_state(
        &mut self,
        out: &mut dyn CheckpointStateOutputStream,
        _checkpoint_id: u64,
        _timestamp: i64,
    ) -> anyhow::Result<()> {
        serde_json::to_writer(out, &self.sums)?;
        Ok(())
    }

    fn restore_state(&mut self, input: &mut dyn Read) -> anyhow::Result<()> {
        self.sums = serde_json::from_reader(input)?;
        Ok(())
    }
}

/// Buffers records until a watermark passes them, then emits in event-time
/// order. Whatever is left is flushed on close.
#[derive(Default)]
struct EventTimeSorter {
    pending: Vec<StreamRecord<String>>,
    output: Option<Box<dyn Output<String>>>,
}

impl EventTimeSorter {
    fn emit_until(&mut self, watermark: i64) {
        self.pending.sort_by_key(StreamRecord::timestamp);
        let split = self
            .pending
            .iter()
            .position(|record| record.timestamp() > watermark)
            .unwrap_or(self.pending.len());
        let ready: Vec<_> = self.pending.drain(..split).collect();
        if let Some(output) = self.output.as_mut() {
            for record in &ready {
                output.collect(record);
            }
        }
    }
}

impl StreamOperator<String> for EventTimeSorter {
    fn setup(
        &mut self,
        _task: Arc<dyn StreamTask>,
        _config: &StreamConfig,
        output: Box<dyn Output<String>>,
    ) -> anyhow::Result<()> {
        self.output = Some(output);
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.emit_until(i64::MAX);
        Ok(())
    }
}

impl OneInputStreamOperator<String, String> for EventTimeSorter {
    fn process_element(&mut self, record: StreamRecord<String>) -> anyhow::Result<()> {
        self.pending.push(record);
        Ok(())
    }

    fn process_watermark(&mut self, mark: Watermark) -> anyhow::Result<()> {
        self.emit_until(mark.timestamp());
        if let Some(output) = self.output.as_mut() {
            output.emit_watermark(mark);
        }
        Ok(())
    }
}

/// Reports what the runtime context tells it at open.
#[derive(Default)]
struct ContextReporter {
    task: Option<Arc<dyn StreamTask>>,
    checkpointing: bool,
    output: Option<Box<dyn Output<String>>>,
}

impl StreamOperator<String> for ContextReporter {
    fn setup(
        &mut self,
        task: Arc<dyn StreamTask>,
        config: &StreamConfig,
        output: Box<dyn Output<String>>,
    ) -> anyhow::Result<()> {
        self.checkpointing = config.is_checkpointing_enabled();
        self.task = Some(task);
        self.output = Some(output);
        Ok(())
    }

    fn open(&mut self) -> anyhow::Result<()> {
        let task = self
            .task
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("open before setup"))?;
        let env = task.environment();
        let facts = vec![
            format!("task={}", task.name()),
            format!("env={}", env.task_name()),
            format!("memory={}", env.memory_size()),
            format!("buffer={}", env.buffer_size()),
            format!(
                "parallelism={}/{}#{}",
                env.parallelism(),
                env.max_parallelism(),
                env.subtask_index()
            ),
            format!("checkpointing={}", self.checkpointing),
            format!(
                "split={}",
                env.input_split_provider().next_input_split().is_some()
            ),
            format!(
                "operator={}",
                task.configuration().operator_name().unwrap_or("")
            ),
        ];
        if let Some(output) = self.output.as_mut() {
            for fact in facts {
                output.collect(&StreamRecord::new(fact));
            }
        }
        Ok(())
    }
}

impl OneInputStreamOperator<String, String> for ContextReporter {
    fn process_element(&mut self, _record: StreamRecord<String>) -> anyhow::Result<()> {
        Ok(())
    }

    fn process_watermark(&mut self, _mark: Watermark) -> anyhow::Result<()> {
        Ok(())
    }
}

fn keyed(key: &str, amount: i64, timestamp: i64) -> StreamRecord<Keyed> {
    StreamRecord::with_timestamp((key.to_owned(), amount), timestamp)
}

#[test]
fn keyed_sums_survive_restore() {
    oph_logging::init();
    let mut first: OneInputStreamOperatorTestHarness<Keyed, Keyed, _> =
        OneInputStreamOperatorTestHarness::with_options(KeyedSum::default(), options()).unwrap();
    first.open().unwrap();
    first
        .process_elements(vec![keyed("a", 1, 1), keyed("b", 10, 2), keyed("a", 2, 3)])
        .unwrap();
    let handle = first.snapshot(4, 40).unwrap();
    first.close().unwrap();

    let mut second: OneInputStreamOperatorTestHarness<Keyed, Keyed, _> =
        OneInputStreamOperatorTestHarness::with_options(KeyedSum::default(), options()).unwrap();
    second.setup().unwrap();
    second.restore(&handle).unwrap();
    second.open().unwrap();
    second
        .process_elements(vec![keyed("b", 5, 5), keyed("a", 4, 6)])
        .unwrap();
    second.process_watermark(Watermark::new(6)).unwrap();

    let expected: Vec<StreamElement<Keyed>> = vec![
        keyed("a", 7, 6).into(),
        keyed("b", 15, 5).into(),
        Watermark::new(6).into(),
    ];
    assert_output_equals_sorted("keyed", &expected, &second.output(), |left, right| {
        left.value().cmp(right.value())
    });
    second.close().unwrap();
}

#[test]
fn sorter_releases_records_as_watermarks_pass() {
    let mut harness: OneInputStreamOperatorTestHarness<String, String, _> =
        OneInputStreamOperatorTestHarness::with_options(EventTimeSorter::default(), options())
            .unwrap();
    harness.open().unwrap();
    for (value, ts) in [("c", 3), ("a", 1), ("d", 7), ("b", 2)] {
        harness
            .process_element(StreamRecord::with_timestamp(value.to_owned(), ts))
            .unwrap();
    }
    harness.process_watermark(Watermark::new(3)).unwrap();
    harness
        .process_element(StreamRecord::with_timestamp("e".to_owned(), 5))
        .unwrap();

    let expected: Vec<StreamElement<String>> = vec![
        StreamRecord::with_timestamp("a".to_owned(), 1).into(),
        StreamRecord::with_timestamp("b".to_owned(), 2).into(),
        StreamRecord::with_timestamp("c".to_owned(), 3).into(),
        Watermark::new(3).into(),
    ];
    assert_output_equals("before close", &expected, &harness.output());

    harness.close().unwrap();
    assert_eq!(harness.state(), HarnessState::Closed);
    let values = harness.extract_output_values();
    assert_eq!(values, vec!["a", "b", "c", "e", "d"]);
}

#[test]
fn runtime_context_reports_mock_environment() {
    let mut harness: OneInputStreamOperatorTestHarness<String, String, _> =
        OneInputStreamOperatorTestHarness::with_options(ContextReporter::default(), options())
            .unwrap();
    harness.environment().input_splits().add_input_splits(1);
    harness.open().unwrap();

    assert_eq!(
        harness.extract_output_values(),
        vec![
            "task=Mock Task",
            "env=MockTwoInputTask",
            "memory=3145728",
            "buffer=1024",
            "parallelism=1/10#0",
            "checkpointing=true",
            "split=true",
            "operator=ContextReporter",
        ]
    );
    assert_eq!(harness.environment().input_splits().remaining(), 0);
    harness.close().unwrap();
}

#[test]
fn metrics_track_a_full_checkpoint_cycle() {
    let registry = Arc::new(Registry::new());
    let metrics = HarnessMetrics::new(Arc::clone(&registry)).unwrap();

    let mut harness: OneInputStreamOperatorTestHarness<Keyed, Keyed, _> =
        OneInputStreamOperatorTestHarness::with_options(KeyedSum::default(), options()).unwrap();
    harness.attach_metrics(metrics.clone());
    harness.open().unwrap();
    harness
        .process_elements(vec![keyed("a", 1, 1), keyed("a", 1, 2)])
        .unwrap();
    harness.process_watermark(Watermark::new(2)).unwrap();
    let handle = harness.snapshot(1, 10).unwrap();
    harness.restore(&handle).unwrap();
    harness.close().unwrap();

    assert_eq!(metrics.elements_processed("KeyedSum"), 2);
    assert_eq!(metrics.records_emitted("KeyedSum"), 2);
    assert_eq!(metrics.watermarks_processed("KeyedSum"), 1);
    assert_eq!(metrics.snapshots_taken("KeyedSum"), 1);
    assert_eq!(metrics.restores("KeyedSum"), 1);

    let names: Vec<String> = registry
        .gather()
        .iter()
        .map(|family| family.get_name().to_owned())
        .collect();
    assert!(names.contains(&"oph_snapshots_taken_total".to_owned()));
    assert!(names.contains(&"oph_snapshot_size_bytes".to_owned()));
}
