//! ---
//! oph_section: "02-checkpointing"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Checkpoint stream abstractions and state backends."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Checkpoint storage for operators under test.
//!
//! A [`StateBackend`] hands out a [`CheckpointStreamFactory`] per job and
//! operator. The factory opens one [`CheckpointStateOutputStream`] per
//! checkpoint; closing that stream yields a [`StateHandle`] which can later be
//! reopened for reading during restore.

/// Result alias used throughout the state crate.
pub type Result<T> = std::result::Result<T, StateError>;

/// Error type for checkpoint storage.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Wrapper for IO errors raised by checkpoint streams.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Raised when a checkpoint exceeds what the backend is willing to hold.
    #[error("checkpoint state of {size} bytes exceeds the maximum of {max} bytes")]
    StateTooLarge {
        /// Size of the rejected state.
        size: usize,
        /// Configured upper bound.
        max: usize,
    },
    /// Raised when reading from a handle whose state was already discarded.
    #[error("state handle '{handle}' has been discarded")]
    Discarded {
        /// Name of the discarded handle.
        handle: String,
    },
    /// Failure reported by a custom backend implementation.
    #[error("state backend failure: {0}")]
    Backend(String),
}

pub mod backend;
pub mod memory;

pub use backend::{
    CheckpointStateOutputStream, CheckpointStreamFactory, StateBackend, StateHandle,
    StreamStateHandle,
};
pub use memory::{
    ByteStreamStateHandle, MemCheckpointStreamFactory, MemoryCheckpointOutputStream,
    MemoryStateBackend, DEFAULT_MAX_STATE_SIZE,
};
