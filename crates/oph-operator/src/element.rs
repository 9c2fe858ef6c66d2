//! ---
//! oph_section: "05-operator-api"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Operator lifecycle contracts and stream element types."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};

/// A value flowing through a stream, optionally stamped with an event time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamRecord<T> {
    value: T,
    timestamp: Option<i64>,
}

impl<T> StreamRecord<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            timestamp: None,
        }
    }

    pub fn with_timestamp(value: T, timestamp: i64) -> Self {
        Self {
            value,
            timestamp: Some(timestamp),
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// Event time of the record, or `i64::MIN` when it carries none.
    pub fn timestamp(&self) -> i64 {
        self.timestamp.unwrap_or(i64::MIN)
    }

    pub fn has_timestamp(&self) -> bool {
        self.timestamp.is_some()
    }

    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = Some(timestamp);
    }

    pub fn erase_timestamp(&mut self) {
        self.timestamp = None;
    }

    /// Swap in a new value, keeping the timestamp. Used by operators that
    /// recycle one output record across emissions.
    pub fn replace(&mut self, value: T) -> T {
        std::mem::replace(&mut self.value, value)
    }

    /// Build a record with another value and the same timestamp.
    pub fn map<U>(&self, value: U) -> StreamRecord<U> {
        StreamRecord {
            value,
            timestamp: self.timestamp,
        }
    }
}

impl<T: fmt::Display> fmt::Display for StreamRecord<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timestamp {
            Some(ts) => write!(f, "Record @ {} : {}", ts, self.value),
            None => write!(f, "Record @ (undef) : {}", self.value),
        }
    }
}

/// Progress marker: no record with a smaller timestamp follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Watermark {
    timestamp: i64,
}

impl Watermark {
    /// Watermark signalling the end of event time.
    pub const MAX: Watermark = Watermark {
        timestamp: i64::MAX,
    };

    pub const fn new(timestamp: i64) -> Self {
        Self { timestamp }
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Watermark @ {}", self.timestamp)
    }
}

/// One captured emission: either a record or a watermark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamElement<T> {
    Record(StreamRecord<T>),
    Watermark(Watermark),
}

impl<T> StreamElement<T> {
    pub fn is_record(&self) -> bool {
        matches!(self, StreamElement::Record(_))
    }

    pub fn is_watermark(&self) -> bool {
        matches!(self, StreamElement::Watermark(_))
    }

    pub fn as_record(&self) -> Option<&StreamRecord<T>> {
        match self {
            StreamElement::Record(record) => Some(record),
            StreamElement::Watermark(_) => None,
        }
    }

    pub fn as_watermark(&self) -> Option<Watermark> {
        match self {
            StreamElement::Watermark(mark) => Some(*mark),
            StreamElement::Record(_) => None,
        }
    }

    pub fn into_record(self) -> Option<StreamRecord<T>> {
        match self {
            StreamElement::Record(record) => Some(record),
            StreamElement::Watermark(_) => None,
        }
    }
}

impl<T> From<StreamRecord<T>> for StreamElement<T> {
    fn from(record: StreamRecord<T>) -> Self {
        StreamElement::Record(record)
    }
}

impl<T> From<Watermark> for StreamElement<T> {
    fn from(mark: Watermark) -> Self {
        StreamElement::Watermark(mark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_timestamp_reads_as_min() {
        let mut record = StreamRecord::new("a");
        assert!(!record.has_timestamp());
        assert_eq!(record.timestamp(), i64::MIN);
        record.set_timestamp(4);
        assert_eq!(record.timestamp(), 4);
        record.erase_timestamp();
        assert!(!record.has_timestamp());
    }

    #[test]
    fn replace_keeps_timestamp() {
        let mut record = StreamRecord::with_timestamp(1u32, 9);
        assert_eq!(record.replace(2), 1);
        assert_eq!(record, StreamRecord::with_timestamp(2, 9));
        assert_eq!(record.map("two"), StreamRecord::with_timestamp("two", 9));
    }

    #[test]
    fn element_accessors_discriminate() {
        let record: StreamElement<&str> = StreamRecord::with_timestamp("x", 1).into();
        let mark: StreamElement<&str> = Watermark::new(3).into();
        assert!(record.is_record());
        assert_eq!(record.as_watermark(), None);
        assert_eq!(mark.as_watermark(), Some(Watermark::new(3)));
        assert!(mark.as_record().is_none());
        assert_eq!(format!("{}", Watermark::new(3)), "Watermark @ 3");
    }

    #[test]
    fn elements_serialize_with_variant_tags() {
        let element: StreamElement<String> = StreamRecord::with_timestamp("a".to_owned(), 1).into();
        let json = serde_json::to_value(&element).unwrap();
        assert_eq!(json["Record"]["timestamp"], 1);
        let back: StreamElement<String> = serde_json::from_value(json).unwrap();
        assert_eq!(back, element);
    }
}
