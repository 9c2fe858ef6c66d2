//! ---
//! oph_section: "02-checkpointing"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Checkpoint stream abstractions and state backends."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

use oph_common::JobId;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::backend::{
    CheckpointStateOutputStream, CheckpointStreamFactory, StateBackend, StateHandle,
    StreamStateHandle,
};
use crate::{Result, StateError};

/// Default upper bound on a single in-memory checkpoint (5 MiB).
pub const DEFAULT_MAX_STATE_SIZE: usize = 5 * 1024 * 1024;

/// State backend keeping every checkpoint in process memory.
///
/// Nothing is persisted; the bytes live as long as some handle references
/// them.
#[derive(Debug, Clone)]
pub struct MemoryStateBackend {
    max_state_size: usize,
}

impl MemoryStateBackend {
    /// Backend with the default 5 MiB limit.
    pub fn new() -> Self {
        Self::with_max_state_size(DEFAULT_MAX_STATE_SIZE)
    }

    /// Backend rejecting checkpoints larger than `max_state_size` bytes.
    pub fn with_max_state_size(max_state_size: usize) -> Self {
        Self { max_state_size }
    }

    /// Configured upper bound in bytes.
    pub fn max_state_size(&self) -> usize {
        self.max_state_size
    }
}

impl Default for MemoryStateBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StateBackend for MemoryStateBackend {
    fn create_stream_factory(
        &self,
        job_id: &JobId,
        operator_identifier: &str,
    ) -> Result<Box<dyn CheckpointStreamFactory>> {
        debug!(job_id = %job_id, operator = operator_identifier, "creating in-memory checkpoint stream factory");
        Ok(Box::new(MemCheckpointStreamFactory {
            max_state_size: self.max_state_size,
        }))
    }
}

/// Stream factory producing [`MemoryCheckpointOutputStream`]s.
#[derive(Debug, Clone)]
pub struct MemCheckpointStreamFactory {
    max_state_size: usize,
}

impl MemCheckpointStreamFactory {
    /// Factory with the given size limit.
    pub fn new(max_state_size: usize) -> Self {
        Self { max_state_size }
    }
}

impl CheckpointStreamFactory for MemCheckpointStreamFactory {
    fn create_checkpoint_state_output_stream(
        &self,
        checkpoint_id: u64,
        timestamp: i64,
    ) -> Result<Box<dyn CheckpointStateOutputStream>> {
        Ok(Box::new(MemoryCheckpointOutputStream::new(
            checkpoint_id,
            timestamp,
            self.max_state_size,
        )))
    }
}

/// Output stream buffering checkpoint bytes in memory.
#[derive(Debug)]
pub struct MemoryCheckpointOutputStream {
    checkpoint_id: u64,
    timestamp: i64,
    max_size: usize,
    buffer: Vec<u8>,
    sealed: bool,
}

impl MemoryCheckpointOutputStream {
    /// Open an empty stream for one checkpoint.
    pub fn new(checkpoint_id: u64, timestamp: i64, max_size: usize) -> Self {
        Self {
            checkpoint_id,
            timestamp,
            max_size,
            buffer: Vec::new(),
            sealed: false,
        }
    }
}

impl Write for MemoryCheckpointOutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CheckpointStateOutputStream for MemoryCheckpointOutputStream {
    fn position(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn close_and_get_handle(mut self: Box<Self>) -> Result<StateHandle> {
        self.sealed = true;
        let size = self.buffer.len();
        if size > self.max_size {
            return Err(StateError::StateTooLarge {
                size,
                max: self.max_size,
            });
        }
        let name = format!("checkpoint-{}-{}", self.checkpoint_id, self.timestamp);
        let data = std::mem::take(&mut self.buffer);
        Ok(Arc::new(ByteStreamStateHandle::new(name, data)))
    }
}

impl Drop for MemoryCheckpointOutputStream {
    fn drop(&mut self) {
        if !self.sealed {
            trace!(
                checkpoint_id = self.checkpoint_id,
                discarded_bytes = self.buffer.len(),
                "checkpoint output stream dropped before close"
            );
        }
    }
}

/// Handle to checkpoint bytes held in memory.
#[derive(Debug)]
pub struct ByteStreamStateHandle {
    name: String,
    size: u64,
    checksum: String,
    data: Mutex<Option<Arc<[u8]>>>,
}

impl ByteStreamStateHandle {
    /// Wrap the given bytes.
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        let checksum = compute_checksum(&data);
        Self {
            name: name.into(),
            size: data.len() as u64,
            checksum,
            data: Mutex::new(Some(Arc::from(data))),
        }
    }

    /// Handle name, derived from checkpoint id and timestamp.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether [`StreamStateHandle::discard_state`] has been called.
    pub fn is_discarded(&self) -> bool {
        self.data.lock().is_none()
    }
}

impl StreamStateHandle for ByteStreamStateHandle {
    fn open_input_stream(&self) -> Result<Box<dyn Read + Send>> {
        let data = self
            .data
            .lock()
            .clone()
            .ok_or_else(|| StateError::Discarded {
                handle: self.name.clone(),
            })?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn state_size(&self) -> u64 {
        self.size
    }

    fn discard_state(&self) -> Result<()> {
        self.data.lock().take();
        Ok(())
    }

    fn checksum(&self) -> Option<String> {
        Some(self.checksum.clone())
    }
}

fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
