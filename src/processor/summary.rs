//! Per-variable and per-stage rejection counts of a finished run.

use super::{FilterStage, QcOutcome};
use crate::models::FilterId;

/// Counts for one filtered variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSummary {
    pub variable: String,
    /// Rows with a value
    pub present: usize,
    /// Rows with a value that pass the combined mask
    pub valid: usize,
    /// Rejections per filter instance, in registration order
    pub filters: Vec<(FilterId, usize)>,
}

impl VariableSummary {
    /// Share of present values that survived, in percent
    pub fn valid_percent(&self) -> f64 {
        if self.present == 0 {
            0.0
        } else {
            self.valid as f64 / self.present as f64 * 100.0
        }
    }
}

/// Counts for one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSummary {
    pub stage: FilterStage,
    pub filters: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Summary of a quality-control run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QcSummary {
    pub rows: usize,
    pub stages: Vec<StageSummary>,
    pub variables: Vec<VariableSummary>,
}

impl QcSummary {
    pub fn from_outcome(outcome: &QcOutcome) -> Self {
        let table = &outcome.table;
        let registry = &outcome.registry;

        let stages = outcome
            .outcomes
            .iter()
            .map(|o| StageSummary {
                stage: o.stage,
                filters: o.applied.len(),
                rejected: o.rejected(),
                skipped: o.skipped.len(),
                failed: o.failed.len(),
            })
            .collect();

        let variables = registry
            .variables()
            .map(|variable| {
                let mask = registry.combined_mask(table, variable);
                let values = table.column(variable).unwrap_or_default();
                let present = values.iter().filter(|v| v.is_some()).count();
                let valid = values
                    .iter()
                    .zip(&mask)
                    .filter(|(v, pass)| v.is_some() && **pass)
                    .count();
                let filters = registry
                    .filters_for(variable)
                    .iter()
                    .map(|id| {
                        let rejected = table
                            .flag(id)
                            .map_or(0, |flag| flag.iter().filter(|pass| !**pass).count());
                        (id.clone(), rejected)
                    })
                    .collect();
                VariableSummary {
                    variable: variable.to_string(),
                    present,
                    valid,
                    filters,
                }
            })
            .collect();

        Self {
            rows: table.len(),
            stages,
            variables,
        }
    }

    pub fn total_rejected(&self) -> usize {
        self.stages.iter().map(|s| s.rejected).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.stages.iter().map(|s| s.failed).sum()
    }
}
