//! Absolute bounds with clamping for saturating sensors.

use super::{FilterStage, StageOutcome, StageRun, flag_present};
use crate::config::AbsoluteConfig;
use crate::error::{FluxQcError, Result};
use crate::events::{EventSink, FilterEvent, SkipReason};
use crate::models::{FilterId, FilterKind, FluxTable};
use crate::registry::FilterRegistry;

/// Clamp values beyond `bound` in place, returning how many changed
fn clamp(values: &mut [Option<f64>], bound: f64, upper: bool) -> usize {
    let mut count = 0;
    for value in values.iter_mut().flatten() {
        let beyond = if upper { *value > bound } else { *value < bound };
        if beyond {
            *value = bound;
            count += 1;
        }
    }
    count
}

/// Reject values outside `[min, max]`, both ends inclusive
///
/// Variables listed in `clamp_upper` have values above `max` set to `max`,
/// and those in `clamp_lower` have values below `min` set to `min`, before
/// the bound check runs. Clamping is reported through the event sink.
///
/// # Arguments
///
/// * `table` - Regularized table; clamped values are written back into it
/// * `registry` - Registry recording the absolute filter of each variable
/// * `config` - Bounds keyed by variable plus the clamp lists
/// * `events` - Sink receiving clamp and rejection events
///
/// # Returns
///
/// Stage outcome with the applied filters and their rejection counts
pub fn apply_absolute_bounds(
    table: &mut FluxTable,
    registry: &mut FilterRegistry,
    config: &AbsoluteConfig,
    events: &mut dyn EventSink,
) -> Result<StageOutcome> {
    let mut run = StageRun::start(FilterStage::AbsoluteBound, events);

    for (variable, rule) in &config.bounds {
        if let (Some(min), Some(max)) = (rule.min, rule.max)
            && min > max
        {
            run.fail(
                variable,
                FluxQcError::invalid_parameter(
                    run.stage().name(),
                    variable.as_str(),
                    format!("min {min} exceeds max {max}"),
                ),
            )?;
            continue;
        }
        let Some(values) = table.column_mut(variable) else {
            run.skip(variable, SkipReason::MissingVariable);
            continue;
        };

        let mut clamped = Vec::new();
        if let Some(max) = rule.max
            && config.clamp_upper.contains(variable)
        {
            clamped.push((clamp(values, max, true), max));
        }
        if let Some(min) = rule.min
            && config.clamp_lower.contains(variable)
        {
            clamped.push((clamp(values, min, false), min));
        }
        for (count, bound) in clamped {
            if count > 0 {
                run.emit(FilterEvent::ValuesClamped {
                    variable: variable.clone(),
                    count,
                    bound,
                });
            }
        }

        let (flag, evaluated) = flag_present(values, |_, v| {
            rule.min.is_none_or(|min| v >= min) && rule.max.is_none_or(|max| v <= max)
        });
        run.stamp(
            table,
            registry,
            FilterId::new(variable.as_str(), FilterKind::AbsoluteBound),
            flag,
            evaluated,
            format!(
                "[{}, {}]",
                rule.min.map_or("-inf".to_string(), |v| v.to_string()),
                rule.max.map_or("inf".to_string(), |v| v.to_string())
            ),
        )?;
    }

    Ok(run.finish())
}
