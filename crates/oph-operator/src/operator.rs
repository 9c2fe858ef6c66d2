//! ---
//! oph_section: "05-operator-api"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Operator lifecycle contracts and stream element types."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
use std::io::Read;
use std::sync::Arc;

use anyhow::Result;
use oph_common::StreamConfig;
use oph_state::CheckpointStateOutputStream;

use crate::element::{StreamRecord, Watermark};
use crate::output::Output;
use crate::task::StreamTask;

/// Lifecycle shared by every stream operator emitting values of type `OUT`.
///
/// The driver calls `setup` once, then `open`, then any number of processing
/// calls, then `close` followed by `dispose`. Every call happens while the
/// task's checkpoint lock is held.
pub trait StreamOperator<OUT>: Send {
    /// Hand the operator its runtime context and output sink.
    fn setup(
        &mut self,
        task: Arc<dyn StreamTask>,
        config: &StreamConfig,
        output: Box<dyn Output<OUT>>,
    ) -> Result<()>;

    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Flush buffered data. Emissions are still allowed here.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release resources. Called after `close`, and also on failure paths.
    fn dispose(&mut self) -> Result<()> {
        Ok(())
    }

    fn notify_of_completed_checkpoint(&mut self, _checkpoint_id: u64) -> Result<()> {
        Ok(())
    }

    /// Processing-time timer registered through the task has fired.
    fn on_processing_time(&mut self, _timestamp: i64) -> Result<()> {
        Ok(())
    }

    /// Checkpointed-state capability. Operators that can snapshot and
    /// restore their state return `Some(self)`.
    fn as_checkpointed(&mut self) -> Option<&mut dyn CheckpointedOperator> {
        None
    }
}

/// Operator consuming a single input stream of `IN` values.
pub trait OneInputStreamOperator<IN, OUT>: StreamOperator<OUT> {
    /// Select the key context for the upcoming element. Keyed operators use
    /// this to scope their state; others ignore it.
    fn set_key_context_element1(&mut self, _record: &StreamRecord<IN>) -> Result<()> {
        Ok(())
    }

    fn process_element(&mut self, record: StreamRecord<IN>) -> Result<()>;

    fn process_watermark(&mut self, mark: Watermark) -> Result<()>;
}

/// Capability of writing operator state into a checkpoint and reading it
/// back.
pub trait CheckpointedOperator {
    fn snapshot_state(
        &mut self,
        out: &mut dyn CheckpointStateOutputStream,
        checkpoint_id: u64,
        timestamp: i64,
    ) -> Result<()>;

    fn restore_state(&mut self, input: &mut dyn Read) -> Result<()>;
}

/// Short type name of operator type `O`, paths and generics stripped. Used
/// to name the operator in logs, metrics and its checkpoint streams.
pub fn operator_type_name<O: ?Sized>() -> &'static str {
    short_type_name(std::any::type_name::<O>())
}

fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
