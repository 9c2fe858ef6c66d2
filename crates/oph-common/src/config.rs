//! ---
//! oph_section: "01-core-functionality"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Shared primitives for the operator test harness."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

fn default_task_name() -> String {
    "MockTwoInputTask".to_owned()
}

fn default_mock_task_name() -> String {
    "Mock Task".to_owned()
}

fn default_memory_size() -> u64 {
    3 * 1024 * 1024
}

fn default_buffer_size() -> usize {
    1024
}

fn default_max_parallelism() -> u32 {
    10
}

fn default_parallelism() -> u32 {
    1
}

fn default_checkpointing_enabled() -> bool {
    true
}

fn default_snapshot_operator_name() -> String {
    "test_op".to_owned()
}

fn default_max_state_size() -> usize {
    5 * 1024 * 1024
}

fn default_timer_thread_name() -> String {
    "oph-timer".to_owned()
}

/// Fixed facts the harness feeds into the mock task and its environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Task name reported by the mock environment.
    #[serde(default = "default_task_name")]
    pub task_name: String,
    /// Name reported by the mock stream task itself.
    #[serde(default = "default_mock_task_name")]
    pub mock_task_name: String,
    /// Managed memory budget in bytes.
    #[serde(default = "default_memory_size")]
    pub memory_size: u64,
    /// Network buffer size in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
    #[serde(default)]
    pub subtask_index: u32,
    #[serde(default = "default_checkpointing_enabled")]
    pub checkpointing_enabled: bool,
    /// Operator name used when opening snapshot streams.
    #[serde(default = "default_snapshot_operator_name")]
    pub snapshot_operator_name: String,
    /// Upper bound on a single in-memory state handle.
    #[serde(default = "default_max_state_size")]
    pub max_state_size: usize,
    #[serde(default = "default_timer_thread_name")]
    pub timer_thread_name: String,
}

impl HarnessConfig {
    pub const ENV_CONFIG_PATH: &'static str = "OPH_HARNESS_CONFIG";

    /// Load configuration, honouring the `OPH_HARNESS_CONFIG` override and
    /// falling back to the built-in defaults.
    pub fn load() -> Result<Self> {
        match std::env::var(Self::ENV_CONFIG_PATH) {
            Ok(path) if !path.trim().is_empty() => Self::from_path(PathBuf::from(path)),
            _ => Ok(Self::default()),
        }
    }

    /// Parse a configuration file. `.yaml`/`.yml` files are read as YAML,
    /// everything else as TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(config_path = %path.display(), "loading harness configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents),
            _ => Self::from_toml_str(&contents),
        }
        .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: HarnessConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: HarnessConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(anyhow!("parallelism must be at least 1"));
        }
        if self.parallelism > self.max_parallelism {
            return Err(anyhow!(
                "parallelism {} exceeds max parallelism {}",
                self.parallelism,
                self.max_parallelism
            ));
        }
        if self.subtask_index >= self.parallelism {
            return Err(anyhow!(
                "subtask index {} out of range for parallelism {}",
                self.subtask_index,
                self.parallelism
            ));
        }
        if self.snapshot_operator_name.trim().is_empty() {
            return Err(anyhow!("snapshot operator name must not be empty"));
        }
        Ok(())
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            task_name: default_task_name(),
            mock_task_name: default_mock_task_name(),
            memory_size: default_memory_size(),
            buffer_size: default_buffer_size(),
            max_parallelism: default_max_parallelism(),
            parallelism: default_parallelism(),
            subtask_index: 0,
            checkpointing_enabled: default_checkpointing_enabled(),
            snapshot_operator_name: default_snapshot_operator_name(),
            max_state_size: default_max_state_size(),
            timer_thread_name: default_timer_thread_name(),
        }
    }
}

impl std::str::FromStr for HarnessConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(content).with_context(|| "failed to parse harness configuration")
    }
}
