//! ---
//! oph_section: "02-checkpointing"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Checkpoint stream abstractions and state backends."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use oph_common::JobId;

use crate::Result;

/// Shared, immutable reference to persisted checkpoint data.
pub type StateHandle = Arc<dyn StreamStateHandle>;

/// Pluggable storage for checkpoint data.
pub trait StateBackend: Send + Sync + fmt::Debug {
    /// Create the stream factory used by one operator of one job.
    fn create_stream_factory(
        &self,
        job_id: &JobId,
        operator_identifier: &str,
    ) -> Result<Box<dyn CheckpointStreamFactory>>;
}

/// Opens output streams for individual checkpoints.
pub trait CheckpointStreamFactory: Send + Sync + fmt::Debug {
    /// Open a fresh output stream for the given checkpoint.
    fn create_checkpoint_state_output_stream(
        &self,
        checkpoint_id: u64,
        timestamp: i64,
    ) -> Result<Box<dyn CheckpointStateOutputStream>>;
}

/// Output stream receiving the serialized state of one checkpoint.
///
/// Closing the stream through [`close_and_get_handle`] seals the data and
/// yields its handle. Dropping the stream without closing it releases its
/// resources and discards everything written so far.
///
/// [`close_and_get_handle`]: CheckpointStateOutputStream::close_and_get_handle
pub trait CheckpointStateOutputStream: Write + Send {
    /// Number of bytes written so far.
    fn position(&self) -> u64;

    /// Seal the stream and return a handle to its contents.
    fn close_and_get_handle(self: Box<Self>) -> Result<StateHandle>;
}

/// Handle to the bytes of a completed checkpoint.
pub trait StreamStateHandle: Send + Sync + fmt::Debug {
    /// Open a new reader positioned at the start of the state.
    fn open_input_stream(&self) -> Result<Box<dyn Read + Send>>;

    /// Size of the state in bytes.
    fn state_size(&self) -> u64;

    /// Release the underlying state. Later reads fail.
    fn discard_state(&self) -> Result<()>;

    /// Content digest, when the backend computes one.
    fn checksum(&self) -> Option<String> {
        None
    }
}
