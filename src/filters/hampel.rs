//! Robust outlier detection: global MAD pre-pass, then a Hampel identifier.
//!
//! Both steps scale the median absolute deviation by 1.4826 so it estimates
//! the standard deviation of normally distributed data. A zero MAD gives no
//! scale estimate and never rejects.

use super::{FilterStage, StageOutcome, StageRun};
use crate::config::HampelRule;
use crate::constants::MAD_TO_SIGMA;
use crate::error::{FluxQcError, Result};
use crate::events::{EventSink, SkipReason};
use crate::models::{FilterId, FilterKind, FluxTable};
use crate::registry::FilterRegistry;
use std::collections::BTreeMap;

/// Median of `values`, reordering them in place
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Median absolute deviation around `center`
pub fn mad(values: &[f64], center: f64) -> Option<f64> {
    let mut deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&mut deviations)
}

/// True where `value` lies more than `z` scaled MADs from `center`
fn is_outlier(value: f64, center: f64, mad: f64, z: f64) -> bool {
    let scale = MAD_TO_SIGMA * mad;
    scale > 0.0 && (value - center).abs() > z * scale
}

/// Hampel identifier over a sliding window of `half_window` neighbours on
/// each side, truncated at the ends
///
/// Returns `true` for outliers.
pub fn hampel_outliers(values: &[f64], half_window: usize, z: f64) -> Vec<bool> {
    let n = values.len();
    let mut scratch = Vec::with_capacity(2 * half_window + 1);
    (0..n)
        .map(|k| {
            let lo = k.saturating_sub(half_window);
            let hi = (k + half_window + 1).min(n);
            scratch.clear();
            scratch.extend_from_slice(&values[lo..hi]);
            let Some(center) = median(&mut scratch) else {
                return false;
            };
            match mad(&scratch, center) {
                Some(spread) => is_outlier(values[k], center, spread, z),
                None => false,
            }
        })
        .collect()
}

/// Reject gross outliers against the global median, then local outliers
/// against a sliding median
///
/// Both steps see only the current pass subset; the Hampel window slides
/// over the samples that survived the pre-pass, in time order.
///
/// # Arguments
///
/// * `table` - Regularized table
/// * `registry` - Registry providing the pass subset and recording the flag
/// * `rules` - MAD threshold, Hampel threshold and half window per variable
/// * `events` - Sink receiving skip and rejection events
///
/// # Returns
///
/// Stage outcome; a zero half window fails only its own variable
pub fn apply_mad_hampel(
    table: &mut FluxTable,
    registry: &mut FilterRegistry,
    rules: &BTreeMap<String, HampelRule>,
    events: &mut dyn EventSink,
) -> Result<StageOutcome> {
    let mut run = StageRun::start(FilterStage::MadHampel, events);

    for (variable, rule) in rules {
        let Some(values) = table.column(variable) else {
            run.skip(variable, SkipReason::MissingVariable);
            continue;
        };
        if rule.mad_z <= 0.0 || rule.hampel_z <= 0.0 || rule.half_window == 0 {
            let error = FluxQcError::invalid_parameter(
                run.stage().name(),
                variable.as_str(),
                format!(
                    "need positive thresholds and window, got mad_z {}, hampel_z {}, half_window {}",
                    rule.mad_z, rule.hampel_z, rule.half_window
                ),
            );
            run.fail(variable, error)?;
            continue;
        }

        let id = FilterId::new(variable.as_str(), FilterKind::MadHampel);
        let samples: Vec<(usize, f64)> = registry
            .upstream_subset(table, &id)
            .into_iter()
            .filter_map(|row| values[row].filter(|v| v.is_finite()).map(|v| (row, v)))
            .collect();
        let mut sorted: Vec<f64> = samples.iter().map(|(_, v)| *v).collect();
        let Some(center) = median(&mut sorted) else {
            run.skip(variable, SkipReason::NoEligibleSamples);
            continue;
        };
        let spread = mad(&sorted, center).unwrap_or(0.0);

        let mut flag = vec![true; table.len()];
        let mut survivors = Vec::with_capacity(samples.len());
        for (row, v) in &samples {
            if is_outlier(*v, center, spread, rule.mad_z) {
                flag[*row] = false;
            } else {
                survivors.push((*row, *v));
            }
        }
        let global_rejected = samples.len() - survivors.len();

        let survivor_values: Vec<f64> = survivors.iter().map(|(_, v)| *v).collect();
        let outliers = hampel_outliers(&survivor_values, rule.half_window, rule.hampel_z);
        for ((row, _), outlier) in survivors.iter().zip(outliers) {
            if outlier {
                flag[*row] = false;
            }
        }

        run.stamp(
            table,
            registry,
            id,
            flag,
            samples.len(),
            format!(
                "median {center:.4}, MAD {spread:.4}, {global_rejected} rejected by pre-pass"
            ),
        )?;
    }

    Ok(run.finish())
}
