//! ---
//! oph_section: "01-core-functionality"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Shared primitives for the operator test harness."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
//! Core shared primitives for the operator test harness workspace.
//! This crate exposes harness configuration loading, the raw and typed task
//! configuration maps, the execution config with its copier registry, and the
//! synthetic job identity handed to state backends.

pub mod config;
pub mod configuration;
pub mod execution;
pub mod job;

pub use config::HarnessConfig;
pub use configuration::{Configuration, StreamConfig, TimeCharacteristic};
pub use execution::{ExecutionConfig, TypeCopier};
pub use job::JobId;
