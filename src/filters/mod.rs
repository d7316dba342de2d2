//! Filter stages for flux quality control
//!
//! Each stage reads the table and the registry, computes one boolean flag
//! column per filter instance and registers it. Stages never fail the run for
//! data reasons: a missing variable or companion column is reported and
//! skipped, and a bad parameter or date range only aborts that variable.
//!
//! # Stages
//!
//! - [`derived`] - virtual variables built from two raw columns
//! - [`quality`] - upstream quality-code threshold
//! - [`meteo`] - signal strength, humidity, rain and day/night ranges
//! - [`manual`] - winter ranges and operator overrides over date ranges
//! - [`bounds`] - absolute bounds with clamping
//! - [`statistical`] - quantile clip and rolling window deviation
//! - [`hampel`] - MAD pre-pass followed by a Hampel identifier
//!
//! Statistical stages estimate their cutoffs from the rows that currently
//! pass the variable's combined mask, but always stamp a full-length column.
//! Rows outside that subset are stamped `true`.

pub mod bounds;
pub mod derived;
pub mod hampel;
pub mod manual;
pub mod meteo;
pub mod quality;
pub mod statistical;

#[cfg(test)]
pub mod tests;

use crate::config::FilterConfig;
use crate::error::{FluxQcError, Result};
use crate::events::{EventSink, FilterEvent, SkipReason};
use crate::models::{DateRange, FilterId, FluxTable};
use crate::registry::FilterRegistry;
use std::fmt;

pub use bounds::apply_absolute_bounds;
pub use derived::derive_virtual_variables;
pub use hampel::apply_mad_hampel;
pub use manual::{apply_manual_overrides, apply_winter_ranges};
pub use meteo::{apply_day_night, apply_humidity, apply_rain, apply_signal_strength};
pub use quality::apply_quality_codes;
pub use statistical::{apply_quantile_clip, apply_window_deviation};

/// Pipeline stages in application order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterStage {
    VirtualVariables,
    QualityCode,
    SignalStrength,
    Humidity,
    Rain,
    DayNight,
    Winter,
    AbsoluteBound,
    Quantile,
    WindowDeviation,
    MadHampel,
    Manual,
}

impl FilterStage {
    /// Fixed order in which the processor applies the stages
    pub const ORDER: [FilterStage; 12] = [
        FilterStage::VirtualVariables,
        FilterStage::QualityCode,
        FilterStage::SignalStrength,
        FilterStage::Humidity,
        FilterStage::Rain,
        FilterStage::DayNight,
        FilterStage::Winter,
        FilterStage::AbsoluteBound,
        FilterStage::Quantile,
        FilterStage::WindowDeviation,
        FilterStage::MadHampel,
        FilterStage::Manual,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FilterStage::VirtualVariables => "virtual-variables",
            FilterStage::QualityCode => "quality-code",
            FilterStage::SignalStrength => "signal-strength",
            FilterStage::Humidity => "humidity",
            FilterStage::Rain => "rain",
            FilterStage::DayNight => "day-night",
            FilterStage::Winter => "winter",
            FilterStage::AbsoluteBound => "absolute-bound",
            FilterStage::Quantile => "quantile",
            FilterStage::WindowDeviation => "window-deviation",
            FilterStage::MadHampel => "mad-hampel",
            FilterStage::Manual => "manual",
        }
    }

    /// True when the configuration gives this stage anything to do
    pub fn is_configured(&self, config: &FilterConfig) -> bool {
        match self {
            FilterStage::VirtualVariables => !config.virtual_variables.is_empty(),
            FilterStage::QualityCode => !config.quality.is_empty(),
            FilterStage::SignalStrength => !config.signal_strength.is_empty(),
            FilterStage::Humidity => config.humidity.is_some(),
            FilterStage::Rain => config.rain.is_some(),
            FilterStage::DayNight => config.day_night.is_some(),
            FilterStage::Winter => !config.winter.is_empty(),
            FilterStage::AbsoluteBound => !config.absolute.bounds.is_empty(),
            FilterStage::Quantile => !config.quantile.is_empty(),
            FilterStage::WindowDeviation => !config.window.is_empty(),
            FilterStage::MadHampel => !config.mad_hampel.is_empty(),
            FilterStage::Manual => !config.manual.is_empty(),
        }
    }
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One flag column stamped by a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedFilter {
    pub id: FilterId,
    /// Rows the filter could judge (inputs present)
    pub evaluated: usize,
    /// Rows the filter rejected
    pub rejected: usize,
}

/// What one stage did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub stage: FilterStage,
    pub applied: Vec<AppliedFilter>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

impl StageOutcome {
    pub fn new(stage: FilterStage) -> Self {
        Self {
            stage,
            applied: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn rejected(&self) -> usize {
        self.applied.iter().map(|a| a.rejected).sum()
    }
}

/// Bookkeeping shared by every stage: events, outcome and registration
pub(crate) struct StageRun<'a> {
    stage: FilterStage,
    events: &'a mut dyn EventSink,
    outcome: StageOutcome,
}

impl<'a> StageRun<'a> {
    pub(crate) fn start(stage: FilterStage, events: &'a mut dyn EventSink) -> Self {
        events.emit(FilterEvent::StageStarted { stage });
        Self {
            stage,
            events,
            outcome: StageOutcome::new(stage),
        }
    }

    pub(crate) fn stage(&self) -> FilterStage {
        self.stage
    }

    pub(crate) fn emit(&mut self, event: FilterEvent) {
        self.events.emit(event);
    }

    pub(crate) fn skip(&mut self, variable: &str, reason: SkipReason) {
        self.outcome.skipped.push(variable.to_string());
        self.events.emit(FilterEvent::Skipped {
            stage: self.stage,
            variable: variable.to_string(),
            reason,
        });
    }

    /// Abort one variable's invocation; only stage-local errors are absorbed
    pub(crate) fn fail(&mut self, variable: &str, error: FluxQcError) -> Result<()> {
        if !error.is_stage_local() {
            return Err(error);
        }
        self.outcome.failed.push(variable.to_string());
        self.events.emit(FilterEvent::VariableFailed {
            stage: self.stage,
            variable: variable.to_string(),
            error: error.to_string(),
        });
        Ok(())
    }

    pub(crate) fn range_skipped(&mut self, variable: &str, range: DateRange) {
        self.events.emit(FilterEvent::RangeSkipped {
            stage: self.stage,
            variable: variable.to_string(),
            range,
        });
    }

    /// Register `flag` under `id` and record how many rows it rejected
    pub(crate) fn stamp(
        &mut self,
        table: &mut FluxTable,
        registry: &mut FilterRegistry,
        id: FilterId,
        flag: Vec<bool>,
        evaluated: usize,
        detail: String,
    ) -> Result<()> {
        let rejected = flag.iter().filter(|pass| !**pass).count();
        registry.register(table, id.clone(), flag, &mut *self.events)?;
        self.events.emit(FilterEvent::FilterApplied {
            id: id.clone(),
            evaluated,
            rejected,
            detail,
        });
        self.outcome.applied.push(AppliedFilter {
            id,
            evaluated,
            rejected,
        });
        Ok(())
    }

    pub(crate) fn finish(mut self) -> StageOutcome {
        let rejected = self.outcome.rejected();
        self.events.emit(FilterEvent::StageFinished {
            stage: self.stage,
            filters: self.outcome.applied.len(),
            rejected,
        });
        self.outcome
    }
}

/// Apply `predicate` to every present value, `true` where it is missing
pub(crate) fn flag_present(
    values: &[Option<f64>],
    mut predicate: impl FnMut(usize, f64) -> bool,
) -> (Vec<bool>, usize) {
    let mut evaluated = 0;
    let flag = values
        .iter()
        .enumerate()
        .map(|(row, value)| match value {
            Some(v) => {
                evaluated += 1;
                predicate(row, *v)
            }
            None => true,
        })
        .collect();
    (flag, evaluated)
}
