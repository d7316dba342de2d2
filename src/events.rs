//! Structured event channel for filter stages.
//!
//! Filter stages never log directly. They report what they did through an
//! [`EventSink`], which the caller chooses: [`TracingSink`] forwards events to
//! `tracing`, [`RecordingSink`] keeps them for audit and tests.

use crate::models::{DateRange, FilterId};
use crate::filters::FilterStage;
use tracing::{debug, info, warn};

/// Why a stage did not evaluate a variable
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The target variable is not a column of the table
    MissingVariable,
    /// A companion column (quality code, signal strength, rain, ...) is absent
    MissingCompanion(String),
    /// The variable has no samples left to compute a statistic from
    NoEligibleSamples,
    /// A derived variable would replace a column already in the input
    AlreadyPresent,
}

/// Events emitted while the filter pipeline runs
#[derive(Debug, Clone, PartialEq)]
pub enum FilterEvent {
    StageStarted {
        stage: FilterStage,
    },
    StageFinished {
        stage: FilterStage,
        filters: usize,
        rejected: usize,
    },
    FilterApplied {
        id: FilterId,
        evaluated: usize,
        rejected: usize,
        detail: String,
    },
    FilterOverwritten {
        id: FilterId,
    },
    ValuesClamped {
        variable: String,
        count: usize,
        bound: f64,
    },
    VariableDerived {
        variable: String,
        primary: String,
        secondary: String,
    },
    Skipped {
        stage: FilterStage,
        variable: String,
        reason: SkipReason,
    },
    RangeSkipped {
        stage: FilterStage,
        variable: String,
        range: DateRange,
    },
    VariableFailed {
        stage: FilterStage,
        variable: String,
        error: String,
    },
}

impl FilterEvent {
    /// True for events that deserve operator attention
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            FilterEvent::FilterOverwritten { .. }
                | FilterEvent::Skipped { .. }
                | FilterEvent::RangeSkipped { .. }
                | FilterEvent::VariableFailed { .. }
        )
    }
}

/// Receiver of pipeline events
pub trait EventSink {
    fn emit(&mut self, event: FilterEvent);
}

/// Forwards every event to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&mut self, event: FilterEvent) {
        match event {
            FilterEvent::StageStarted { stage } => debug!(stage = %stage, "Stage started"),
            FilterEvent::StageFinished {
                stage,
                filters,
                rejected,
            } => info!(
                stage = %stage,
                filters,
                rejected,
                "Stage finished"
            ),
            FilterEvent::FilterApplied {
                id,
                evaluated,
                rejected,
                detail,
            } => info!(
                variable = %id.variable,
                filter = %id,
                evaluated,
                rejected,
                "Filter applied ({})",
                detail
            ),
            FilterEvent::FilterOverwritten { id } => {
                warn!(filter = %id, "Filter already registered, flag column overwritten")
            }
            FilterEvent::ValuesClamped {
                variable,
                count,
                bound,
            } => info!(variable = %variable, count, bound, "Values clamped to bound"),
            FilterEvent::VariableDerived {
                variable,
                primary,
                secondary,
            } => info!(
                variable = %variable,
                "Derived as {} + {}",
                primary,
                secondary
            ),
            FilterEvent::Skipped {
                stage,
                variable,
                reason,
            } => warn!(
                stage = %stage,
                variable = %variable,
                "Skipped: {:?}",
                reason
            ),
            FilterEvent::RangeSkipped {
                stage,
                variable,
                range,
            } => warn!(
                stage = %stage,
                variable = %variable,
                "Date range {} lies outside the data, skipped",
                range
            ),
            FilterEvent::VariableFailed {
                stage,
                variable,
                error,
            } => warn!(
                stage = %stage,
                variable = %variable,
                "Filter aborted: {}",
                error
            ),
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub events: Vec<FilterEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &FilterEvent> {
        self.events.iter().filter(|e| e.is_warning())
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: FilterEvent) {
        self.events.push(event);
    }
}
