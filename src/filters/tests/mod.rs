//! Tests for the filter stages
//!
//! Each stage is exercised on small half-hourly tables built by the fixtures
//! below.

pub mod hampel_tests;

// Test helper functions and fixtures
use crate::events::RecordingSink;
use crate::models::{FilterId, FilterKind, FluxTable};
use crate::registry::FilterRegistry;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

/// Timestamp in June 2023
pub fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 6, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

/// Half-hourly table starting 2023-06-01 00:00 with the given columns
pub fn create_test_table(columns: &[(&str, Vec<Option<f64>>)]) -> FluxTable {
    let len = columns.first().map(|(_, values)| values.len()).unwrap_or(0);
    let mut table = FluxTable::uniform(at(1, 0, 0), TimeDelta::minutes(30), len).unwrap();
    for (name, values) in columns {
        table.with_column(*name, values.clone()).unwrap();
    }
    table
}

/// Wrap every value in `Some`
pub fn present(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().copied().map(Some).collect()
}

/// Fresh registry and recording sink
pub fn create_test_context() -> (FilterRegistry, RecordingSink) {
    (FilterRegistry::new(), RecordingSink::new())
}

/// Stamped flag column for `variable` and `kind`, cloned out of the table
pub fn flag_of(table: &FluxTable, variable: &str, kind: FilterKind) -> Vec<bool> {
    table
        .flag(&FilterId::new(variable, kind))
        .unwrap_or_else(|| panic!("no {kind} flag for {variable}"))
        .to_vec()
}

/// Row indices where `flag` is false
pub fn rejected_rows(flag: &[bool]) -> Vec<usize> {
    flag.iter()
        .enumerate()
        .filter_map(|(row, pass)| (!pass).then_some(row))
        .collect()
}
