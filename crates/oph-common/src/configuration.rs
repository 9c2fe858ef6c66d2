//! ---
//! oph_section: "01-core-functionality"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Shared primitives for the operator test harness."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Raw, untyped key/value configuration handed to a task.
///
/// Values are kept as strings and parsed on access, mirroring how task
/// configuration travels through a job graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    entries: IndexMap<String, String>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.set_string(key, value.to_string());
    }

    /// Read a boolean, returning `default` when the key is absent or unparsable.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.parsed(key).unwrap_or(default)
    }

    pub fn set_i64(&mut self, key: impl Into<String>, value: i64) {
        self.set_string(key, value.to_string());
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.parsed(key).unwrap_or(default)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.entries.get(key).and_then(|raw| raw.trim().parse().ok())
    }
}

/// Notion of time an operator is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeCharacteristic {
    #[default]
    ProcessingTime,
    IngestionTime,
    EventTime,
}

impl TimeCharacteristic {
    fn as_str(&self) -> &'static str {
        match self {
            TimeCharacteristic::ProcessingTime => "processing-time",
            TimeCharacteristic::IngestionTime => "ingestion-time",
            TimeCharacteristic::EventTime => "event-time",
        }
    }
}

impl fmt::Display for TimeCharacteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeCharacteristic {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "processing-time" => Ok(TimeCharacteristic::ProcessingTime),
            "ingestion-time" => Ok(TimeCharacteristic::IngestionTime),
            "event-time" => Ok(TimeCharacteristic::EventTime),
            other => Err(format!("unknown time characteristic '{other}'")),
        }
    }
}

/// Typed view over the raw [`Configuration`] of a streaming task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamConfig {
    config: Configuration,
}

impl StreamConfig {
    pub const CHECKPOINTING_ENABLED: &'static str = "checkpointing";
    pub const OPERATOR_NAME: &'static str = "operatorName";
    pub const TIME_CHARACTERISTIC: &'static str = "timechar";

    pub fn new(config: Configuration) -> Self {
        Self { config }
    }

    pub fn set_checkpointing_enabled(&mut self, enabled: bool) {
        self.config.set_bool(Self::CHECKPOINTING_ENABLED, enabled);
    }

    pub fn is_checkpointing_enabled(&self) -> bool {
        self.config.get_bool(Self::CHECKPOINTING_ENABLED, false)
    }

    pub fn set_operator_name(&mut self, name: impl Into<String>) {
        self.config.set_string(Self::OPERATOR_NAME, name);
    }

    pub fn operator_name(&self) -> Option<&str> {
        self.config.get_string(Self::OPERATOR_NAME)
    }

    pub fn set_time_characteristic(&mut self, characteristic: TimeCharacteristic) {
        self.config
            .set_string(Self::TIME_CHARACTERISTIC, characteristic.to_string());
    }

    pub fn time_characteristic(&self) -> TimeCharacteristic {
        self.config
            .get_string(Self::TIME_CHARACTERISTIC)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    /// The raw configuration backing this view.
    pub fn configuration(&self) -> &Configuration {
        &self.config
    }
}
