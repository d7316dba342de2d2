//! Filter orchestration with a fixed stage order.
//!
//! Threads one table and one registry through every configured stage. Later
//! stages observe the combined masks left by earlier ones, so the order in
//! [`FilterStage::ORDER`] is part of the result.

pub mod loader;
pub mod summary;
pub mod writer;

#[cfg(test)]
pub mod tests;

use crate::config::FilterConfig;
use crate::error::Result;
use crate::events::EventSink;
use crate::filters::{self, StageOutcome};
use crate::models::FluxTable;
use crate::registry::FilterRegistry;

pub use crate::filters::FilterStage;
pub use summary::QcSummary;

/// Result of a full quality-control run
#[derive(Debug, Clone)]
pub struct QcOutcome {
    pub table: FluxTable,
    pub registry: FilterRegistry,
    pub outcomes: Vec<StageOutcome>,
}

impl QcOutcome {
    pub fn summary(&self) -> QcSummary {
        QcSummary::from_outcome(self)
    }
}

/// Runs the configured filter stages in order
#[derive(Debug, Clone, Default)]
pub struct FilterProcessor {
    config: FilterConfig,
}

impl FilterProcessor {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Stages that have something configured, in application order
    pub fn stages_enabled(&self) -> Vec<FilterStage> {
        FilterStage::ORDER
            .into_iter()
            .filter(|stage| stage.is_configured(&self.config))
            .collect()
    }

    /// Run every configured stage on a fresh registry
    pub fn run(&self, table: FluxTable, events: &mut dyn EventSink) -> Result<QcOutcome> {
        self.run_with_progress(table, events, |_| {})
    }

    /// Run every configured stage, calling `on_stage` after each one
    pub fn run_with_progress(
        &self,
        mut table: FluxTable,
        events: &mut dyn EventSink,
        mut on_stage: impl FnMut(&StageOutcome),
    ) -> Result<QcOutcome> {
        let mut registry = FilterRegistry::new();
        let mut outcomes = Vec::new();

        for stage in self.stages_enabled() {
            let outcome = self.apply_stage(stage, &mut table, &mut registry, events)?;
            on_stage(&outcome);
            outcomes.push(outcome);
        }

        Ok(QcOutcome {
            table,
            registry,
            outcomes,
        })
    }

    /// Apply a single stage to an existing table and registry
    ///
    /// An unconfigured stage does nothing and reports an empty outcome.
    pub fn apply_stage(
        &self,
        stage: FilterStage,
        table: &mut FluxTable,
        registry: &mut FilterRegistry,
        events: &mut dyn EventSink,
    ) -> Result<StageOutcome> {
        let config = &self.config;
        match stage {
            FilterStage::VirtualVariables => {
                filters::derive_virtual_variables(table, &config.virtual_variables, events)
            }
            FilterStage::QualityCode => {
                filters::apply_quality_codes(table, registry, config, events)
            }
            FilterStage::SignalStrength => {
                filters::apply_signal_strength(table, registry, &config.signal_strength, events)
            }
            FilterStage::Humidity => match &config.humidity {
                Some(rule) => filters::apply_humidity(table, registry, rule, events),
                None => Ok(StageOutcome::new(stage)),
            },
            FilterStage::Rain => match &config.rain {
                Some(rule) => filters::apply_rain(table, registry, rule, events),
                None => Ok(StageOutcome::new(stage)),
            },
            FilterStage::DayNight => match &config.day_night {
                Some(day_night) => filters::apply_day_night(table, registry, day_night, events),
                None => Ok(StageOutcome::new(stage)),
            },
            FilterStage::Winter => {
                filters::apply_winter_ranges(table, registry, &config.winter, events)
            }
            FilterStage::AbsoluteBound => {
                filters::apply_absolute_bounds(table, registry, &config.absolute, events)
            }
            FilterStage::Quantile => {
                filters::apply_quantile_clip(table, registry, &config.quantile, events)
            }
            FilterStage::WindowDeviation => {
                filters::apply_window_deviation(table, registry, &config.window, events)
            }
            FilterStage::MadHampel => {
                filters::apply_mad_hampel(table, registry, &config.mad_hampel, events)
            }
            FilterStage::Manual => {
                filters::apply_manual_overrides(table, registry, &config.manual, events)
            }
        }
    }
}
