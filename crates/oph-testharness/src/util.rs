//! ---
//! oph_section: "11-simulation"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Assertion helpers over captured operator output."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
//! Helpers for asserting on captured output.
use std::cmp::Ordering;
use std::fmt::Debug;

use oph_operator::{StreamElement, StreamRecord, Watermark};

/// Records from `output`, watermarks dropped.
pub fn get_stream_records_from_output<T: Clone>(output: &[StreamElement<T>]) -> Vec<StreamRecord<T>> {
    output
        .iter()
        .filter_map(|element| element.as_record().cloned())
        .collect()
}

/// Bare record values from `output`, timestamps and watermarks dropped.
pub fn get_raw_elements_from_output<T: Clone>(output: &[StreamElement<T>]) -> Vec<T> {
    output
        .iter()
        .filter_map(|element| element.as_record().map(|record| record.value().clone()))
        .collect()
}

fn watermarks<T>(output: &[StreamElement<T>]) -> Vec<Watermark> {
    output.iter().filter_map(StreamElement::as_watermark).collect()
}

/// Compare captured output element by element, in order.
#[track_caller]
pub fn assert_output_equals<T>(message: &str, expected: &[StreamElement<T>], actual: &[StreamElement<T>])
where
    T: PartialEq + Debug,
{
    assert_eq!(
        expected.len(),
        actual.len(),
        "{message}: output length differs\nexpected: {expected:?}\nactual:   {actual:?}"
    );
    for (index, (want, got)) in expected.iter().zip(actual).enumerate() {
        assert_eq!(want, got, "{message}: element {index} differs");
    }
}

/// Compare captured output where records may arrive in any order.
///
/// Watermarks must match in order; records are sorted with `compare` on both
/// sides before comparing.
#[track_caller]
pub fn assert_output_equals_sorted<T, F>(
    message: &str,
    expected: &[StreamElement<T>],
    actual: &[StreamElement<T>],
    mut compare: F,
) where
    T: Clone + PartialEq + Debug,
    F: FnMut(&StreamRecord<T>, &StreamRecord<T>) -> Ordering,
{
    assert_eq!(
        expected.len(),
        actual.len(),
        "{message}: output length differs\nexpected: {expected:?}\nactual:   {actual:?}"
    );
    assert_eq!(
        watermarks(expected),
        watermarks(actual),
        "{message}: watermarks differ"
    );

    let mut expected_records = get_stream_records_from_output(expected);
    let mut actual_records = get_stream_records_from_output(actual);
    expected_records.sort_by(&mut compare);
    actual_records.sort_by(&mut compare);
    assert_eq!(expected_records, actual_records, "{message}: records differ");
}
