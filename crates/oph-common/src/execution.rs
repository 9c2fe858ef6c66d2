//! ---
//! oph_section: "01-core-functionality"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Shared primitives for the operator test harness."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

fn default_auto_watermark_interval_ms() -> u64 {
    200
}

fn default_max_parallelism() -> i32 {
    -1
}

/// Produces independent copies of runtime values of type `T`.
pub struct TypeCopier<T> {
    copy: Arc<dyn Fn(&T) -> T + Send + Sync>,
    type_name: &'static str,
}

impl<T: 'static> TypeCopier<T> {
    pub fn new<F>(copy: F) -> Self
    where
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        Self {
            copy: Arc::new(copy),
            type_name: type_name::<T>(),
        }
    }

    /// Copier backed by the value's `Clone` implementation.
    pub fn cloning() -> Self
    where
        T: Clone,
    {
        Self::new(T::clone)
    }
}

impl<T> TypeCopier<T> {
    pub fn copy(&self, value: &T) -> T {
        (self.copy)(value)
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl<T> Clone for TypeCopier<T> {
    fn clone(&self) -> Self {
        Self {
            copy: Arc::clone(&self.copy),
            type_name: self.type_name,
        }
    }
}

impl<T> fmt::Debug for TypeCopier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeCopier")
            .field("type_name", &self.type_name)
            .finish()
    }
}

#[derive(Clone, Default)]
struct CopierRegistry {
    copiers: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for CopierRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopierRegistry")
            .field("registered", &self.copiers.len())
            .finish()
    }
}

/// Job-wide execution settings, including the copier lookup used when
/// emitted values must be detached from operator-owned buffers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub object_reuse: bool,
    #[serde(default = "default_auto_watermark_interval_ms")]
    pub auto_watermark_interval_ms: u64,
    /// `-1` leaves the decision to the runtime.
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: i32,
    #[serde(default)]
    pub global_job_parameters: IndexMap<String, String>,
    #[serde(skip)]
    copiers: CopierRegistry,
}

impl ExecutionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).with_context(|| "failed to parse execution config")
    }

    /// Register a custom copier for values of type `T`, replacing the
    /// `Clone`-based default.
    pub fn register_copier<T, F>(&mut self, copy: F) -> &mut Self
    where
        T: 'static,
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        self.copiers
            .copiers
            .insert(TypeId::of::<T>(), Arc::new(TypeCopier::<T>::new(copy)));
        self
    }

    pub fn has_registered_copier<T: 'static>(&self) -> bool {
        self.copiers.copiers.contains_key(&TypeId::of::<T>())
    }

    /// Resolve the copier for runtime values of type `T`.
    pub fn copier_for<T: Clone + 'static>(&self) -> TypeCopier<T> {
        self.copiers
            .copiers
            .get(&TypeId::of::<T>())
            .and_then(|entry| (**entry).downcast_ref::<TypeCopier<T>>())
            .cloned()
            .unwrap_or_else(TypeCopier::cloning)
    }

    pub fn set_global_job_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.global_job_parameters.insert(key.into(), value.into());
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            object_reuse: false,
            auto_watermark_interval_ms: default_auto_watermark_interval_ms(),
            max_parallelism: default_max_parallelism(),
            global_job_parameters: IndexMap::new(),
            copiers: CopierRegistry::default(),
        }
    }
}
