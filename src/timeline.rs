//! Timestamp regularization.
//!
//! Turns a freshly imported series into a [`FluxTable`] on a strictly uniform
//! timeline: unparseable timestamps are dropped, duplicates collapse to their
//! first occurrence, the sampling frequency is detected, and the data is
//! reindexed from the first to the last valid timestamp with gaps left as
//! missing values.

use crate::config::RegularizationConfig;
use crate::constants::OFF_GRID_TOLERANCE;
use crate::error::{FluxQcError, Result};
use crate::models::{FluxTable, Measurement};
use chrono::{NaiveDateTime, TimeDelta};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Imported series before regularization
///
/// A `None` timestamp marks a row whose time could not be parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSeries {
    pub timestamps: Vec<Option<NaiveDateTime>>,
    pub columns: Vec<Measurement>,
}

impl RawSeries {
    pub fn new(timestamps: Vec<Option<NaiveDateTime>>) -> Self {
        Self {
            timestamps,
            columns: Vec::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> Result<Self> {
        let name = name.into();
        if values.len() != self.timestamps.len() {
            return Err(FluxQcError::LengthMismatch {
                name,
                expected: self.timestamps.len(),
                found: values.len(),
            });
        }
        self.columns.push(Measurement { name, values });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Progress of a regularization run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegularizationStage {
    Raw,
    Deduped,
    FrequencyDetected,
    Regularized,
}

/// What regularization changed
#[derive(Debug, Clone, PartialEq)]
pub struct RegularizationReport {
    pub stage: RegularizationStage,
    pub input_rows: usize,
    pub unparseable_rows: Vec<usize>,
    pub duplicate_rows: Vec<usize>,
    pub off_grid_rows: Vec<usize>,
    pub gap_rows: usize,
    pub output_rows: usize,
    pub frequency: Option<TimeDelta>,
}

impl RegularizationReport {
    fn new(input_rows: usize) -> Self {
        Self {
            stage: RegularizationStage::Raw,
            input_rows,
            unparseable_rows: Vec::new(),
            duplicate_rows: Vec::new(),
            off_grid_rows: Vec::new(),
            gap_rows: 0,
            output_rows: 0,
            frequency: None,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} rows in, {} out | frequency {} min | {} unparseable, {} duplicate, {} off-grid dropped | {} gap rows inserted",
            self.input_rows,
            self.output_rows,
            self.frequency.map(|f| f.num_minutes()).unwrap_or(0),
            self.unparseable_rows.len(),
            self.duplicate_rows.len(),
            self.off_grid_rows.len(),
            self.gap_rows
        )
    }
}

/// Render at most ten row numbers for log messages
fn preview_rows(rows: &[usize]) -> String {
    let shown: Vec<String> = rows.iter().take(10).map(|r| r.to_string()).collect();
    if rows.len() > 10 {
        format!("{}, ... ({} total)", shown.join(", "), rows.len())
    } else {
        shown.join(", ")
    }
}

/// Detect the sampling step of sorted, unique timestamps
///
/// Scans successive windows of `window` consecutive deltas and returns the
/// step of the first window whose deltas are all equal. Series shorter than
/// one window are judged on all of their deltas.
pub fn detect_frequency(
    sorted: &[NaiveDateTime],
    window: usize,
    horizon: usize,
) -> Result<TimeDelta> {
    if sorted.len() < 2 {
        return Err(FluxQcError::TooFewTimestamps {
            count: sorted.len(),
        });
    }
    let deltas: Vec<TimeDelta> = sorted.windows(2).map(|w| w[1] - w[0]).collect();
    let window = window.max(1).min(deltas.len());

    for start in 0..horizon {
        let Some(candidate) = deltas.get(start..start + window) else {
            break;
        };
        let step = candidate[0];
        if step > TimeDelta::zero() && candidate.iter().all(|d| *d == step) {
            debug!(
                "Frequency {} min detected from deltas starting at row {}",
                step.num_minutes(),
                start
            );
            return Ok(step);
        }
    }

    Err(FluxQcError::FrequencyUndetected { window, horizon })
}

/// Regularizes imported series onto a uniform timeline
#[derive(Debug, Clone, Default)]
pub struct Regularizer {
    config: RegularizationConfig,
}

impl Regularizer {
    pub fn new(config: RegularizationConfig) -> Self {
        Self { config }
    }

    /// Turn a raw series into a table on a uniform timeline
    ///
    /// # Arguments
    ///
    /// * `raw` - Parsed timestamps and measurement columns in file order
    ///
    /// # Returns
    ///
    /// The regularized table and a report of dropped and inserted rows
    ///
    /// # Errors
    ///
    /// Fails when no timestamp parses, when the frequency cannot be detected,
    /// or when more than one timestamp lies off the grid
    pub fn regularize(&self, raw: RawSeries) -> Result<(FluxTable, RegularizationReport)> {
        let mut report = RegularizationReport::new(raw.len());

        // Raw: drop rows without a parseable timestamp
        let mut rows: Vec<(usize, NaiveDateTime)> = Vec::with_capacity(raw.len());
        for (row, ts) in raw.timestamps.iter().enumerate() {
            match ts {
                Some(ts) => rows.push((row, *ts)),
                None => report.unparseable_rows.push(row),
            }
        }
        if !report.unparseable_rows.is_empty() {
            warn!(
                "Excluded {} rows with unparseable timestamps: {}",
                report.unparseable_rows.len(),
                preview_rows(&report.unparseable_rows)
            );
        }

        // Deduped: first occurrence wins
        let mut seen = HashSet::with_capacity(rows.len());
        rows.retain(|(row, ts)| {
            if seen.insert(*ts) {
                true
            } else {
                report.duplicate_rows.push(*row);
                false
            }
        });
        if !report.duplicate_rows.is_empty() {
            warn!(
                "Dropped {} rows with duplicate timestamps: {}",
                report.duplicate_rows.len(),
                preview_rows(&report.duplicate_rows)
            );
        }
        report.stage = RegularizationStage::Deduped;

        if rows.is_empty() {
            return Err(FluxQcError::EmptyTable);
        }
        rows.sort_by_key(|(_, ts)| *ts);

        // FrequencyDetected
        let frequency = match self.config.frequency_minutes {
            Some(minutes) if minutes > 0 => TimeDelta::minutes(minutes),
            Some(minutes) => {
                return Err(FluxQcError::configuration(format!(
                    "frequency_minutes must be positive, got {minutes}"
                )));
            }
            None => {
                let sorted: Vec<NaiveDateTime> = rows.iter().map(|(_, ts)| *ts).collect();
                detect_frequency(
                    &sorted,
                    self.config.detection_window,
                    self.config.search_horizon,
                )?
            }
        };
        report.frequency = Some(frequency);
        report.stage = RegularizationStage::FrequencyDetected;

        // Off-grid timestamps relative to the first valid timestamp
        let first = rows[0].1;
        let step_ms = frequency.num_milliseconds();
        let on_grid = |ts: NaiveDateTime| (ts - first).num_milliseconds() % step_ms == 0;
        let off_grid: Vec<(usize, NaiveDateTime)> =
            rows.iter().copied().filter(|(_, ts)| !on_grid(*ts)).collect();
        if off_grid.len() > OFF_GRID_TOLERANCE {
            return Err(FluxQcError::IrregularTimestamps {
                count: off_grid.len(),
                frequency_minutes: frequency.num_minutes(),
                first: off_grid[0].1,
            });
        }
        for (row, ts) in &off_grid {
            warn!(
                "Dropped row {} with timestamp {} not on the {}-minute grid",
                row,
                ts,
                frequency.num_minutes()
            );
            report.off_grid_rows.push(*row);
        }
        rows.retain(|(_, ts)| on_grid(*ts));

        // Regularized: reindex onto first..=last
        let last = rows.last().map(|(_, ts)| *ts).unwrap_or(first);
        let len = ((last - first).num_milliseconds() / step_ms) as usize + 1;
        let mut table = FluxTable::uniform(first, frequency, len)?;

        let positions: Vec<(usize, usize)> = rows
            .iter()
            .map(|(row, ts)| (*row, ((*ts - first).num_milliseconds() / step_ms) as usize))
            .collect();
        for column in raw.columns {
            let mut values = vec![None; len];
            for (row, position) in &positions {
                values[*position] = column.values[*row];
            }
            table.with_column(column.name, values)?;
        }

        report.gap_rows = len - positions.len();
        report.output_rows = len;
        report.stage = RegularizationStage::Regularized;
        info!("Regularization complete: {}", report.summary());

        Ok((table, report))
    }
}
