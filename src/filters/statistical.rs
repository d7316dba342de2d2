//! Distribution-based filters estimated on the current pass subset.
//!
//! The subset is taken from every filter already registered for the variable
//! except the one being computed, so a re-run reproduces the first result.

use super::{FilterStage, StageOutcome, StageRun};
use crate::config::{QuantileRule, WindowRule};
use crate::error::{FluxQcError, Result};
use crate::events::{EventSink, SkipReason};
use crate::models::{FilterId, FilterKind, FluxTable};
use crate::registry::FilterRegistry;
use crate::rolling::{RollingWindow, deviation_bands};
use std::collections::BTreeMap;

/// Quantile of sorted data with linear interpolation between order statistics
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = position.floor() as usize;
    let hi = position.ceil() as usize;
    let fraction = position - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * fraction)
}

/// Present, finite values on the rows of `subset`
fn subset_values(values: &[Option<f64>], subset: &[usize]) -> Vec<f64> {
    subset
        .iter()
        .filter_map(|row| values[*row])
        .filter(|v| v.is_finite())
        .collect()
}

/// Reject values below the lower or above the upper quantile
///
/// Quantiles are computed from the variable's current pass subset only.
///
/// # Returns
///
/// Stage outcome; a variable with no samples left is skipped
pub fn apply_quantile_clip(
    table: &mut FluxTable,
    registry: &mut FilterRegistry,
    rules: &BTreeMap<String, QuantileRule>,
    events: &mut dyn EventSink,
) -> Result<StageOutcome> {
    let mut run = StageRun::start(FilterStage::Quantile, events);

    for (variable, rule) in rules {
        let Some(values) = table.column(variable) else {
            run.skip(variable, SkipReason::MissingVariable);
            continue;
        };
        if !(0.0..=1.0).contains(&rule.lower)
            || !(0.0..=1.0).contains(&rule.upper)
            || rule.lower >= rule.upper
        {
            let error = FluxQcError::invalid_parameter(
                run.stage().name(),
                variable.as_str(),
                format!(
                    "need 0 <= lower < upper <= 1, got [{}, {}]",
                    rule.lower, rule.upper
                ),
            );
            run.fail(variable, error)?;
            continue;
        }

        let id = FilterId::new(variable.as_str(), FilterKind::Quantile);
        let subset = registry.upstream_subset(table, &id);
        let mut sample = subset_values(values, &subset);
        sample.sort_by(f64::total_cmp);
        let (Some(low), Some(high)) = (quantile(&sample, rule.lower), quantile(&sample, rule.upper))
        else {
            run.skip(variable, SkipReason::NoEligibleSamples);
            continue;
        };

        let mut flag = vec![true; table.len()];
        for row in subset {
            if let Some(v) = values[row] {
                flag[row] = v >= low && v <= high;
            }
        }
        run.stamp(
            table,
            registry,
            id,
            flag,
            sample.len(),
            format!("[{low:.4}, {high:.4}]"),
        )?;
    }

    Ok(run.finish())
}

/// Reject values deviating from the rolling mean by more than `sigmas`
/// rolling standard deviations of the residuals
///
/// Only rows in the current pass subset feed the rolling statistics. Rows
/// where the window holds too few samples get no band and pass.
///
/// # Arguments
///
/// * `table` - Regularized table; its frequency sets the samples per day
/// * `registry` - Registry providing the pass subset and recording the flag
/// * `rules` - Window length, sigma multiplier and minimum daily samples
/// * `events` - Sink receiving skip and rejection events
///
/// # Returns
///
/// Stage outcome with one window filter per configured variable
pub fn apply_window_deviation(
    table: &mut FluxTable,
    registry: &mut FilterRegistry,
    rules: &BTreeMap<String, WindowRule>,
    events: &mut dyn EventSink,
) -> Result<StageOutcome> {
    let mut run = StageRun::start(FilterStage::WindowDeviation, events);
    let samples_per_day = table.samples_per_day();

    for (variable, rule) in rules {
        let Some(values) = table.column(variable) else {
            run.skip(variable, SkipReason::MissingVariable);
            continue;
        };
        if rule.days == 0 || rule.sigmas <= 0.0 {
            let error = FluxQcError::invalid_parameter(
                run.stage().name(),
                variable.as_str(),
                format!(
                    "window needs days > 0 and sigmas > 0, got {} days and {} sigmas",
                    rule.days, rule.sigmas
                ),
            );
            run.fail(variable, error)?;
            continue;
        }

        let id = FilterId::new(variable.as_str(), FilterKind::WindowDeviation);
        let eligible = registry.upstream_mask(table, &id);
        let window = RollingWindow::new(rule.days, samples_per_day, rule.min_daily_samples)
            .with_anchor(rule.anchor);
        let bands = deviation_bands(values, &eligible, &window);

        let mut flag = vec![true; table.len()];
        let mut evaluated = 0;
        for (row, band) in bands.iter().enumerate() {
            if !eligible[row] {
                continue;
            }
            if let (Some(v), Some(band)) = (values[row], band) {
                evaluated += 1;
                flag[row] = band.contains(v, rule.sigmas);
            }
        }
        run.stamp(
            table,
            registry,
            id,
            flag,
            evaluated,
            format!("{} days, {} sigmas", rule.days, rule.sigmas),
        )?;
    }

    Ok(run.finish())
}
