//! Core data structures and types for flux quality control.
//!
//! Defines the regularized time-series table, filter identifiers and kinds,
//! and the closed date ranges used by range-based filters.

use crate::constants::SECONDS_PER_DAY;
use crate::error::{FluxQcError, Result};
use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

/// Filter families that can stamp a flag column
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    QualityCode,
    SignalStrength,
    Humidity,
    Rain,
    NightRange,
    DayRange,
    Winter,
    AbsoluteBound,
    Quantile,
    WindowDeviation,
    MadHampel,
    Manual,
}

impl FilterKind {
    /// Short name used in exported column names
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::QualityCode => "quality",
            FilterKind::SignalStrength => "signal_strength",
            FilterKind::Humidity => "humidity",
            FilterKind::Rain => "rain",
            FilterKind::NightRange => "night",
            FilterKind::DayRange => "day",
            FilterKind::Winter => "winter",
            FilterKind::AbsoluteBound => "absolute",
            FilterKind::Quantile => "quantile",
            FilterKind::WindowDeviation => "window",
            FilterKind::MadHampel => "madhampel",
            FilterKind::Manual => "manual",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one filter instance stamped for one variable
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FilterId {
    pub variable: String,
    pub kind: FilterKind,
    pub tag: Option<String>,
}

impl FilterId {
    pub fn new(variable: impl Into<String>, kind: FilterKind) -> Self {
        Self {
            variable: variable.into(),
            kind,
            tag: None,
        }
    }

    pub fn tagged(variable: impl Into<String>, kind: FilterKind, tag: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            kind,
            tag: Some(tag.into()),
        }
    }

    /// Flat column name used when the table is exported
    pub fn column_name(&self) -> String {
        match &self.tag {
            Some(tag) => format!("{}_{}_{}filter", self.variable, self.kind, tag),
            None => format!("{}_{}filter", self.variable, self.kind),
        }
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.column_name())
    }
}

/// Closed date range `[start, stop]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDateTime,
    pub stop: NaiveDateTime,
}

impl DateRange {
    pub fn new(start: NaiveDateTime, stop: NaiveDateTime) -> Self {
        Self { start, stop }
    }

    /// Reject ranges whose start lies after their stop
    pub fn validate(&self, variable: &str) -> Result<()> {
        if self.start > self.stop {
            return Err(FluxQcError::InvalidDateRange {
                variable: variable.to_string(),
                start: self.start,
                stop: self.stop,
            });
        }
        Ok(())
    }

    /// Clip to `[first, last]`, `None` when the range misses the coverage entirely
    pub fn clip_to(&self, first: NaiveDateTime, last: NaiveDateTime) -> Option<DateRange> {
        if self.stop < first || self.start > last {
            return None;
        }
        Some(DateRange {
            start: self.start.max(first),
            stop: self.stop.min(last),
        })
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", self.start, self.stop)
    }
}

/// A named numeric column of the table
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Regularized time-series table
///
/// Timestamps are strictly increasing with one constant step. Measurement
/// columns keep their insertion order; flag columns are keyed by [`FilterId`]
/// and hold `true` where the filter did not reject the sample.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxTable {
    timestamps: Vec<NaiveDateTime>,
    frequency: TimeDelta,
    columns: Vec<Measurement>,
    flags: BTreeMap<FilterId, Vec<bool>>,
}

impl FluxTable {
    /// Create an empty-column table on a uniform timeline
    pub fn uniform(start: NaiveDateTime, frequency: TimeDelta, len: usize) -> Result<Self> {
        if frequency <= TimeDelta::zero() {
            return Err(FluxQcError::NonUniformTimeline {
                row: 0,
                reason: format!("frequency must be positive, got {frequency}"),
            });
        }
        let timestamps = (0..len)
            .map(|i| start + frequency * i as i32)
            .collect::<Vec<_>>();
        Ok(Self {
            timestamps,
            frequency,
            columns: Vec::new(),
            flags: BTreeMap::new(),
        })
    }

    /// Create a table from explicit timestamps, checking the uniform-step invariant
    pub fn from_timestamps(timestamps: Vec<NaiveDateTime>, frequency: TimeDelta) -> Result<Self> {
        if frequency <= TimeDelta::zero() {
            return Err(FluxQcError::NonUniformTimeline {
                row: 0,
                reason: format!("frequency must be positive, got {frequency}"),
            });
        }
        for (row, pair) in timestamps.windows(2).enumerate() {
            if pair[1] - pair[0] != frequency {
                return Err(FluxQcError::NonUniformTimeline {
                    row: row + 1,
                    reason: format!(
                        "step {} differs from frequency {}",
                        pair[1] - pair[0],
                        frequency
                    ),
                });
            }
        }
        Ok(Self {
            timestamps,
            frequency,
            columns: Vec::new(),
            flags: BTreeMap::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn frequency(&self) -> TimeDelta {
        self.frequency
    }

    /// Number of samples in one day at the table frequency (at least 1)
    pub fn samples_per_day(&self) -> usize {
        let seconds = self.frequency.num_seconds().max(1);
        ((SECONDS_PER_DAY / seconds) as usize).max(1)
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamps.last().copied()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut [Option<f64>]> {
        self.columns
            .iter_mut()
            .find(|c| c.name == name)
            .map(|c| c.values.as_mut_slice())
    }

    /// Insert a column, replacing any existing column with the same name
    pub fn with_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<&mut Self> {
        let name = name.into();
        if values.len() != self.len() {
            return Err(FluxQcError::LengthMismatch {
                name,
                expected: self.len(),
                found: values.len(),
            });
        }
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.values = values,
            None => self.columns.push(Measurement { name, values }),
        }
        Ok(self)
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.columns
    }

    pub fn flag(&self, id: &FilterId) -> Option<&[bool]> {
        self.flags.get(id).map(|f| f.as_slice())
    }

    pub fn flags(&self) -> impl Iterator<Item = (&FilterId, &[bool])> {
        self.flags.iter().map(|(id, f)| (id, f.as_slice()))
    }

    /// Stamp a flag column, returning true when an existing column was replaced
    pub(crate) fn stamp_flag(&mut self, id: FilterId, flag: Vec<bool>) -> Result<bool> {
        if flag.len() != self.len() {
            return Err(FluxQcError::LengthMismatch {
                name: id.column_name(),
                expected: self.len(),
                found: flag.len(),
            });
        }
        Ok(self.flags.insert(id, flag).is_some())
    }

    /// Row indices covered by a closed date range
    pub fn rows_in(&self, range: &DateRange) -> Range<usize> {
        let start = self.timestamps.partition_point(|t| *t < range.start);
        let stop = self.timestamps.partition_point(|t| *t <= range.stop);
        start..stop.max(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_filter_id_column_name() {
        let plain = FilterId::new("co2_flux", FilterKind::QualityCode);
        assert_eq!(plain.column_name(), "co2_flux_qualityfilter");

        let tagged = FilterId::tagged("ch4_flux", FilterKind::SignalStrength, "ch4");
        assert_eq!(tagged.column_name(), "ch4_flux_signal_strength_ch4filter");
    }

    #[test]
    fn test_uniform_table_timeline() {
        let table = FluxTable::uniform(at(1, 0, 0), TimeDelta::minutes(30), 4).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.last_timestamp(), Some(at(1, 1, 30)));
        assert_eq!(table.samples_per_day(), 48);
    }

    #[test]
    fn test_from_timestamps_rejects_gap() {
        let result = FluxTable::from_timestamps(
            vec![at(1, 0, 0), at(1, 0, 30), at(1, 2, 0)],
            TimeDelta::minutes(30),
        );
        match result {
            Err(FluxQcError::NonUniformTimeline { row, .. }) => assert_eq!(row, 2),
            other => panic!("Expected NonUniformTimeline, got {other:?}"),
        }
    }

    #[test]
    fn test_with_column_length_checked() {
        let mut table = FluxTable::uniform(at(1, 0, 0), TimeDelta::minutes(30), 3).unwrap();
        assert!(table.with_column("h", vec![Some(1.0); 3]).is_ok());
        assert!(matches!(
            table.with_column("le", vec![Some(1.0); 2]),
            Err(FluxQcError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_date_range_clip_and_rows() {
        let table = FluxTable::uniform(at(1, 0, 0), TimeDelta::minutes(30), 48).unwrap();
        let first = table.first_timestamp().unwrap();
        let last = table.last_timestamp().unwrap();

        let straddling = DateRange::new(at(1, 22, 0), at(3, 0, 0));
        let clipped = straddling.clip_to(first, last).unwrap();
        assert_eq!(clipped.stop, last);
        assert_eq!(table.rows_in(&clipped), 44..48);

        let outside = DateRange::new(at(5, 0, 0), at(6, 0, 0));
        assert!(outside.clip_to(first, last).is_none());
    }

    #[test]
    fn test_date_range_reversed_is_invalid() {
        let reversed = DateRange::new(at(2, 0, 0), at(1, 0, 0));
        assert!(matches!(
            reversed.validate("nee"),
            Err(FluxQcError::InvalidDateRange { .. })
        ));
    }
}
