//! Filters driven by companion meteorological or instrument columns.
//!
//! Each filter computes one flag from a companion column and stamps it on
//! every variable it applies to. A missing companion value never rejects.

use super::{FilterStage, StageOutcome, StageRun, flag_present};
use crate::config::{DayNightConfig, HumidityRule, RainRule, SignalStrengthRule};
use crate::error::{FluxQcError, Result};
use crate::events::{EventSink, SkipReason};
use crate::models::{FilterId, FilterKind, FluxTable};
use crate::registry::FilterRegistry;
use std::collections::BTreeMap;

/// Stamp one shared companion flag on each listed variable
#[allow(clippy::too_many_arguments)]
fn stamp_on_variables(
    run: &mut StageRun<'_>,
    table: &mut FluxTable,
    registry: &mut FilterRegistry,
    variables: &[String],
    kind: FilterKind,
    tag: Option<&str>,
    flag: &[bool],
    evaluated: usize,
    detail: &str,
) -> Result<()> {
    for variable in variables {
        if !table.has_column(variable) {
            run.skip(variable, SkipReason::MissingVariable);
            continue;
        }
        let id = match tag {
            Some(tag) => FilterId::tagged(variable.as_str(), kind, tag),
            None => FilterId::new(variable.as_str(), kind),
        };
        run.stamp(
            table,
            registry,
            id,
            flag.to_vec(),
            evaluated,
            detail.to_string(),
        )?;
    }
    Ok(())
}

fn skip_all(run: &mut StageRun<'_>, variables: &[String], companion: &str) {
    for variable in variables {
        run.skip(
            variable,
            SkipReason::MissingCompanion(companion.to_string()),
        );
    }
}

/// Reject samples whose analyzer signal strength is below the channel minimum
///
/// # Arguments
///
/// * `channels` - Signal column rules keyed by channel; each lists the
///   variables sharing that analyzer
///
/// # Returns
///
/// Stage outcome listing one applied filter per affected variable
pub fn apply_signal_strength(
    table: &mut FluxTable,
    registry: &mut FilterRegistry,
    channels: &BTreeMap<String, SignalStrengthRule>,
    events: &mut dyn EventSink,
) -> Result<StageOutcome> {
    let mut run = StageRun::start(FilterStage::SignalStrength, events);

    for (channel, rule) in channels {
        let Some(strength) = table.column(&rule.column) else {
            skip_all(&mut run, &rule.variables, &rule.column);
            continue;
        };
        let (flag, evaluated) = flag_present(strength, |_, s| s >= rule.min);
        stamp_on_variables(
            &mut run,
            table,
            registry,
            &rule.variables,
            FilterKind::SignalStrength,
            Some(channel),
            &flag,
            evaluated,
            &format!("{} >= {}", rule.column, rule.min),
        )?;
    }

    Ok(run.finish())
}

/// Reject samples taken while relative humidity exceeds the ceiling
///
/// A missing humidity column skips the whole stage.
pub fn apply_humidity(
    table: &mut FluxTable,
    registry: &mut FilterRegistry,
    rule: &HumidityRule,
    events: &mut dyn EventSink,
) -> Result<StageOutcome> {
    let mut run = StageRun::start(FilterStage::Humidity, events);

    let Some(humidity) = table.column(&rule.column) else {
        skip_all(&mut run, &rule.variables, &rule.column);
        return Ok(run.finish());
    };
    let (flag, evaluated) = flag_present(humidity, |_, rh| rh <= rule.max);
    stamp_on_variables(
        &mut run,
        table,
        registry,
        &rule.variables,
        FilterKind::Humidity,
        None,
        &flag,
        evaluated,
        &format!("{} <= {}", rule.column, rule.max),
    )?;

    Ok(run.finish())
}

/// Rain flag: each sample above `limit` rejects itself and the next
/// `forward` samples, truncated at the end of the series
pub fn rain_flag(precipitation: &[Option<f64>], limit: f64, forward: usize) -> (Vec<bool>, usize) {
    let n = precipitation.len();
    let mut flag = vec![true; n];
    let mut evaluated = 0;
    for (row, value) in precipitation.iter().enumerate() {
        let Some(p) = value else { continue };
        evaluated += 1;
        if *p > limit {
            let end = (row + forward + 1).min(n);
            flag[row..end].fill(false);
        }
    }
    (flag, evaluated)
}

/// Reject rain samples and the settling period after them
///
/// # Arguments
///
/// * `table` - Table holding the precipitation column named by `rule`
/// * `registry` - Registry recording one rain filter per listed variable
/// * `rule` - Precipitation column, limit, forward sample count and variables
/// * `events` - Sink receiving skip and rejection events
///
/// # Returns
///
/// Stage outcome; empty when the precipitation column is absent
pub fn apply_rain(
    table: &mut FluxTable,
    registry: &mut FilterRegistry,
    rule: &RainRule,
    events: &mut dyn EventSink,
) -> Result<StageOutcome> {
    let mut run = StageRun::start(FilterStage::Rain, events);

    let Some(precipitation) = table.column(&rule.column) else {
        skip_all(&mut run, &rule.variables, &rule.column);
        return Ok(run.finish());
    };
    let (flag, evaluated) = rain_flag(precipitation, rule.limit, rule.forward_samples);
    stamp_on_variables(
        &mut run,
        table,
        registry,
        &rule.variables,
        FilterKind::Rain,
        None,
        &flag,
        evaluated,
        &format!(
            "{} > {} plus {} samples",
            rule.column, rule.limit, rule.forward_samples
        ),
    )?;

    Ok(run.finish())
}

/// Night-time range and day-time ceiling split by insolation
///
/// Rows with insolation below the threshold are night: the variable must lie
/// within `[min, max]`. Other rows are day: the variable must not exceed its
/// maximum. Rows without insolation are never rejected.
///
/// # Returns
///
/// Stage outcome with one day/night filter per configured variable
pub fn apply_day_night(
    table: &mut FluxTable,
    registry: &mut FilterRegistry,
    config: &DayNightConfig,
    events: &mut dyn EventSink,
) -> Result<StageOutcome> {
    let mut run = StageRun::start(FilterStage::DayNight, events);
    let stage = run.stage().name();

    let Some(insolation) = table.column(&config.insolation_column) else {
        let companion = config.insolation_column.clone();
        let night: Vec<String> = if config.night_enabled {
            config.night.keys().cloned().collect()
        } else {
            Vec::new()
        };
        let day: Vec<String> = if config.day_enabled {
            config.day.keys().cloned().collect()
        } else {
            Vec::new()
        };
        skip_all(&mut run, &night, &companion);
        skip_all(&mut run, &day, &companion);
        return Ok(run.finish());
    };
    let is_night: Vec<Option<bool>> = insolation
        .iter()
        .map(|value| value.map(|s| s < config.threshold))
        .collect();

    if config.night_enabled {
        for (variable, range) in &config.night {
            if range.min > range.max {
                run.fail(
                    variable,
                    FluxQcError::invalid_parameter(
                        stage,
                        variable.as_str(),
                        format!("night min {} exceeds max {}", range.min, range.max),
                    ),
                )?;
                continue;
            }
            let Some(values) = table.column(variable) else {
                run.skip(variable, SkipReason::MissingVariable);
                continue;
            };
            let (flag, evaluated) = flag_present(values, |row, v| match is_night[row] {
                Some(true) => v >= range.min && v <= range.max,
                _ => true,
            });
            run.stamp(
                table,
                registry,
                FilterId::new(variable.as_str(), FilterKind::NightRange),
                flag,
                evaluated,
                format!("night range [{}, {}]", range.min, range.max),
            )?;
        }
    }

    if config.day_enabled {
        for (variable, max) in &config.day {
            let Some(values) = table.column(variable) else {
                run.skip(variable, SkipReason::MissingVariable);
                continue;
            };
            let (flag, evaluated) = flag_present(values, |row, v| match is_night[row] {
                Some(false) => v <= *max,
                _ => true,
            });
            run.stamp(
                table,
                registry,
                FilterId::new(variable.as_str(), FilterKind::DayRange),
                flag,
                evaluated,
                format!("day max {max}"),
            )?;
        }
    }

    Ok(run.finish())
}
